// ============================================================================
// Strict linting - Dangerous or non-idiomatic practices are forbidden
// ============================================================================

#![deny(unsafe_code)]                 // Unsafe code is forbidden
#![deny(missing_docs)]                // All public items must be documented
#![warn(dead_code)]                   // Unused code is reported
#![deny(non_camel_case_types)]        // Types must follow CamelCase convention

// Additional strictness - Leave nothing unchecked
#![warn(unused_imports)]              // Unused imports are reported
#![warn(unused_variables)]            // Unused variables are reported
#![deny(unused_must_use)]             // Must handle Result and Option explicitly
#![deny(non_snake_case)]              // Variables and functions must be snake_case
#![deny(non_upper_case_globals)]      // Constants must be UPPER_CASE
#![deny(nonstandard_style)]           // Non-standard code style is forbidden
#![forbid(unsafe_op_in_unsafe_fn)]    // Unsafe ops in unsafe fns are forbidden

// Clippy lints (warnings only)
#![warn(clippy::all)]                 // All standard Clippy lints
#![warn(clippy::pedantic)]            // Very strict Clippy lints
#![warn(clippy::nursery)]             // Experimental lints
#![warn(clippy::unwrap_used)]         // unwrap() warning
#![warn(clippy::expect_used)]         // expect() warning
#![warn(clippy::panic)]               // panic!() warning
#![warn(clippy::print_stdout)]        // println!() warning
#![warn(clippy::todo)]                // TODO warning
#![warn(clippy::unimplemented)]       // unimplemented!() warning
#![warn(clippy::missing_const_for_fn)] // Force const when possible
#![warn(clippy::unwrap_in_result)]    // unwrap() in Result warning
#![warn(clippy::module_inception)]    // Module with same name as crate warning
#![warn(clippy::redundant_clone)]     // Useless clones warning
#![warn(clippy::shadow_unrelated)]    // Shadowing unrelated variables warning
#![warn(clippy::too_many_arguments)]  // Limit function arguments
#![warn(clippy::cognitive_complexity)] // Limit cognitive complexity
#![cfg_attr(test, allow(clippy::unwrap_used, clippy::expect_used, clippy::panic))]

// Safety and robustness lints
#![deny(overflowing_literals)]        // Overflowing literals are forbidden
#![deny(arithmetic_overflow)]         // Arithmetic overflow is forbidden

// ============================================================================
// Crate Documentation
// ============================================================================

//! # Billing Deploy
//!
//! A declarative, idempotent deployment system for billing products and prices.
//!
//! ## Overview
//!
//! The catalog is described as code in a YAML file and deployed to the
//! billing provider (Stripe) on demand:
//!
//! - Products and prices are keyed by stable business keys
//! - Each run diffs the desired catalog against a local record of what was deployed
//! - Only the differences are sent to the provider
//! - Resources removed from the file are archived, never deleted
//!
//! ## Architecture
//!
//! A deployment is a fixed sequence of stages over one shared context:
//!
//! 1. **Detect**: compare definitions with the local store (read only)
//! 2. **Process**: create, update, replace or archive on the provider
//! 3. **Post-deploy**: hand the final active keys to code generators
//!
//! A dry run executes the detect stages only.
//!
//! Prices whose provider fields cannot change in place (amount, currency,
//! interval, trial) are resolved by archiving and recreating them, by
//! creating a duplicate under a new key, or by cancelling the run.
//!
//! ## Modules
//!
//! - [`config`]: Catalog parsing, validation and fingerprinting
//! - [`store`]: Local catalog store
//! - [`provider`]: Provider contracts and the Stripe client
//! - [`planner`]: Field projection, diffing and immutability rules
//! - [`pipeline`]: Change records and the ordered deployment stages
//! - [`resolver`]: Immutable price change resolution
//! - [`services`]: Per-resource provider synchronization
//! - [`deployer`]: Deployment entry point
//! - [`importer`]: Import of an existing provider catalog
//! - [`codegen`]: Post-deploy key manifest
//! - [`cli`]: Command-line interface
//!
//! ## Example
//!
//! ```yaml
//! provider:
//!   name: stripe
//!   api_key_env: STRIPE_SECRET
//!
//! products:
//!   pro:
//!     name: Pro
//!     prices:
//!       monthly:
//!         amount: 999
//!         currency: eur
//!         recurring:
//!           interval: month
//!         trialPeriodDays: 14
//! ```

// ============================================================================
// Modules
// ============================================================================

pub mod cli;
pub mod codegen;
pub mod config;
pub mod deployer;
pub mod error;
pub mod importer;
pub mod pipeline;
pub mod planner;
pub mod provider;
pub mod resolver;
pub mod services;
pub mod store;

// ============================================================================
// Re-exports
// ============================================================================

pub use cli::{Cli, Commands, OutputFormatter};
pub use codegen::{CodeGenerator, KeyManifestWriter};
pub use config::{BillingConfig, ConfigHasher, ConfigParser, ConfigValidator};
pub use deployer::{DeployOptions, Deployer};
pub use error::{BillingError, Result};
pub use importer::{ImportOptions, ImportReport, Importer};
pub use pipeline::{ChangeSet, ChangeType, DeployContext, Pipeline, Stage};
pub use provider::{ProviderClient, ProviderKind, StripeClient, build_provider};
pub use resolver::{FixedStrategy, ImmutableStrategy, StrategyPrompt, TerminalPrompt};
pub use store::{CatalogStore, LocalCatalogStore};
