//! Post-deploy code generation.
//!
//! After a live deployment the active product and price keys are handed to
//! code generators so application code can reference them.

use async_trait::async_trait;
use chrono::Utc;
use serde::Serialize;
use std::path::{Path, PathBuf};
use tracing::info;

use crate::error::{BillingError, Result, StoreError};
use crate::store::ActiveKeys;

/// Consumer of the final active key lists.
#[async_trait]
pub trait CodeGenerator: Send + Sync {
    /// Name for logs.
    fn name(&self) -> &'static str;

    /// Regenerates output for `keys`.
    ///
    /// # Errors
    ///
    /// Returns an error if the output cannot be written.
    async fn generate(&self, keys: &ActiveKeys) -> Result<()>;
}

/// Document written by [`KeyManifestWriter`].
#[derive(Debug, Serialize)]
struct KeyManifest<'a> {
    generated_at: String,
    products: &'a ActiveKeys,
}

/// Writes active keys to a JSON manifest.
#[derive(Debug, Clone)]
pub struct KeyManifestWriter {
    path: PathBuf,
}

impl KeyManifestWriter {
    /// Creates a writer targeting `path`.
    #[must_use]
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    /// Target path.
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }
}

#[async_trait]
impl CodeGenerator for KeyManifestWriter {
    fn name(&self) -> &'static str {
        "key-manifest"
    }

    async fn generate(&self, keys: &ActiveKeys) -> Result<()> {
        let manifest = KeyManifest {
            generated_at: Utc::now().to_rfc3339(),
            products: keys,
        };
        let content = serde_json::to_string_pretty(&manifest)
            .map_err(|e| StoreError::serialization(format!("Failed to serialize key manifest: {e}")))?;

        if let Some(parent) = self.path.parent()
            && !parent.as_os_str().is_empty()
        {
            tokio::fs::create_dir_all(parent).await?;
        }

        let tmp = self.path.with_extension("json.tmp");
        tokio::fs::write(&tmp, content).await?;
        tokio::fs::rename(&tmp, &self.path).await.map_err(|e| {
            BillingError::Store(StoreError::WriteFailed {
                message: format!("Failed to write {}: {e}", self.path.display()),
            })
        })?;

        info!("Wrote key manifest to {}", self.path.display());
        Ok(())
    }
}
