//! Resolution of price changes the provider cannot apply in place.
//!
//! When a price diff touches an immutable field the operator picks one of
//! three outcomes: archive the old price and recreate it under the same key,
//! keep it and create a duplicate under a new key, or cancel the deployment.

use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::fmt;
use std::io::{BufRead, Write};
use std::str::FromStr;
use tracing::info;

use crate::error::{BillingError, DeployError, Result};
use crate::pipeline::PriceChange;

/// Rejected duplicate keys tolerated before giving up.
pub const MAX_DUPLICATE_KEY_ATTEMPTS: u32 = 5;

/// How to handle an immutable price change.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ImmutableStrategy {
    /// Archive the existing price and create a replacement under the same key.
    #[default]
    Archive,
    /// Keep the existing price and create a new one under another key.
    Duplicate,
    /// Abort the deployment.
    Cancel,
}

impl ImmutableStrategy {
    /// Lowercase name.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Archive => "archive",
            Self::Duplicate => "duplicate",
            Self::Cancel => "cancel",
        }
    }
}

impl fmt::Display for ImmutableStrategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ImmutableStrategy {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "a" | "archive" => Ok(Self::Archive),
            "d" | "duplicate" => Ok(Self::Duplicate),
            "c" | "cancel" => Ok(Self::Cancel),
            other => Err(format!("unknown strategy '{other}'")),
        }
    }
}

/// A resolved immutable change, ready for execution.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub enum Resolution {
    /// Replace the price under its current key.
    Archive,
    /// Create a new price under `key`.
    Duplicate {
        /// The new type key.
        key: String,
    },
}

impl Resolution {
    /// The strategy this resolution came from.
    #[must_use]
    pub const fn strategy(&self) -> ImmutableStrategy {
        match self {
            Self::Archive => ImmutableStrategy::Archive,
            Self::Duplicate { .. } => ImmutableStrategy::Duplicate,
        }
    }
}

/// Source of operator decisions.
pub trait StrategyPrompt: Send + Sync {
    /// Picks a strategy for an immutable change.
    ///
    /// # Errors
    ///
    /// Returns an error if no answer can be obtained.
    fn choose_strategy(&self, change: &PriceChange) -> Result<ImmutableStrategy>;

    /// Asks for a new type key, offering `suggestion`.
    ///
    /// # Errors
    ///
    /// Returns an error if no answer can be obtained.
    fn duplicate_key(&self, change: &PriceChange, suggestion: &str) -> Result<String>;

    /// Shows a message to the operator.
    fn notify(&self, message: &str);
}

/// Answers every question with the same strategy.
///
/// Duplicates take the suggested key.
#[derive(Debug, Clone, Copy, Default)]
pub struct FixedStrategy {
    strategy: ImmutableStrategy,
}

impl FixedStrategy {
    /// Creates a non-interactive prompt.
    #[must_use]
    pub const fn new(strategy: ImmutableStrategy) -> Self {
        Self { strategy }
    }
}

impl StrategyPrompt for FixedStrategy {
    fn choose_strategy(&self, _change: &PriceChange) -> Result<ImmutableStrategy> {
        Ok(self.strategy)
    }

    fn duplicate_key(&self, _change: &PriceChange, suggestion: &str) -> Result<String> {
        Ok(suggestion.to_string())
    }

    fn notify(&self, message: &str) {
        info!("{message}");
    }
}

/// Interactive prompt on stderr and stdin.
#[derive(Debug, Clone, Copy, Default)]
pub struct TerminalPrompt;

impl TerminalPrompt {
    fn ask(question: &str) -> Result<String> {
        let mut stderr = std::io::stderr();
        write!(stderr, "{question} ")?;
        stderr.flush()?;

        let mut answer = String::new();
        let read = std::io::stdin().lock().read_line(&mut answer)?;
        if read == 0 {
            return Err(BillingError::internal("standard input closed while prompting"));
        }
        Ok(answer.trim().to_string())
    }
}

impl StrategyPrompt for TerminalPrompt {
    fn choose_strategy(&self, change: &PriceChange) -> Result<ImmutableStrategy> {
        loop {
            let answer = Self::ask(&format!(
                "Price '{}/{}': [a]rchive and recreate, [d]uplicate under a new key, or [c]ancel? [a]",
                change.product_key, change.key
            ))?;
            if answer.is_empty() {
                return Ok(ImmutableStrategy::Archive);
            }
            match answer.parse() {
                Ok(strategy) => return Ok(strategy),
                Err(message) => self.notify(&message),
            }
        }
    }

    fn duplicate_key(&self, _change: &PriceChange, suggestion: &str) -> Result<String> {
        let answer = Self::ask(&format!("New price key [{suggestion}]:"))?;
        if answer.is_empty() {
            Ok(suggestion.to_string())
        } else {
            Ok(answer)
        }
    }

    fn notify(&self, message: &str) {
        let _ = writeln!(std::io::stderr(), "{message}");
    }
}

/// Smallest `{base}_{n}` with `n >= 1` not in `taken`.
#[must_use]
pub fn suggest_key(base: &str, taken: &BTreeSet<String>) -> String {
    let mut n: u32 = 1;
    loop {
        let candidate = format!("{base}_{n}");
        if !taken.contains(&candidate) {
            return candidate;
        }
        n += 1;
    }
}

/// Drives the prompt to a resolution.
pub struct StrategyResolver<'a> {
    prompt: &'a dyn StrategyPrompt,
}

impl<'a> StrategyResolver<'a> {
    /// Creates a resolver backed by `prompt`.
    #[must_use]
    pub const fn new(prompt: &'a dyn StrategyPrompt) -> Self {
        Self { prompt }
    }

    /// Resolves an immutable change.
    ///
    /// `taken` holds every type key in use for the product; duplicate keys
    /// must not collide with it.
    ///
    /// # Errors
    ///
    /// Returns [`DeployError::Cancelled`] when the operator cancels, and
    /// [`DeployError::InvalidDuplicateKey`] when no acceptable key is given.
    pub fn resolve(&self, change: &PriceChange, taken: &BTreeSet<String>) -> Result<Resolution> {
        self.prompt.notify(&format!(
            "Price '{}/{}' changes fields the provider cannot update: {}",
            change.product_key,
            change.key,
            change.immutable_fields.join(", ")
        ));

        match self.prompt.choose_strategy(change)? {
            ImmutableStrategy::Archive => Ok(Resolution::Archive),
            ImmutableStrategy::Cancel => Err(DeployError::Cancelled {
                reason: format!(
                    "immutable change to price '{}/{}' was declined",
                    change.product_key, change.key
                ),
            }
            .into()),
            ImmutableStrategy::Duplicate => self.duplicate(change, taken),
        }
    }

    fn duplicate(&self, change: &PriceChange, taken: &BTreeSet<String>) -> Result<Resolution> {
        let suggestion = suggest_key(&change.key, taken);

        for _ in 0..MAX_DUPLICATE_KEY_ATTEMPTS {
            let answer = self.prompt.duplicate_key(change, &suggestion)?;
            let key = answer.trim();
            if key.is_empty() {
                self.prompt.notify("The key must not be empty");
            } else if taken.contains(key) {
                self.prompt
                    .notify(&format!("Key '{key}' is already used by this product"));
            } else if !is_valid_key(key) {
                self.prompt.notify(&format!(
                    "Key '{key}' may only contain lowercase letters, digits, '_' and '-'"
                ));
            } else {
                return Ok(Resolution::Duplicate {
                    key: key.to_string(),
                });
            }
        }

        Err(DeployError::InvalidDuplicateKey {
            price_key: change.key.clone(),
            attempts: MAX_DUPLICATE_KEY_ATTEMPTS,
        }
        .into())
    }
}

fn is_valid_key(key: &str) -> bool {
    key.chars()
        .all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || c == '_' || c == '-')
}
