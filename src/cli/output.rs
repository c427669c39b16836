//! Output formatting for CLI commands.
//!
//! This module provides formatting utilities for displaying
//! information to the user in various formats.

use colored::Colorize;
use serde_json::Value;
use std::fmt::Write;
use tabled::{Table, Tabled};

use crate::config::{BillingConfig, ConfigHasher, ValidationResult};
use crate::importer::ImportReport;
use crate::pipeline::{ChangeCounts, ChangeSet, ChangeType};
use crate::planner::FieldChanges;
use crate::store::CatalogSnapshot;

use super::commands::OutputFormat;

/// Output formatter for CLI.
#[derive(Debug)]
pub struct OutputFormatter {
    /// Output format.
    format: OutputFormat,
}

/// Change row for table display.
#[derive(Tabled)]
struct ChangeRow {
    #[tabled(rename = "Action")]
    action: String,
    #[tabled(rename = "Resource")]
    resource: String,
    #[tabled(rename = "Changes")]
    changes: String,
}

/// Catalog row for table display.
#[derive(Tabled)]
struct CatalogRow {
    #[tabled(rename = "Product")]
    product: String,
    #[tabled(rename = "Price")]
    price: String,
    #[tabled(rename = "Amount")]
    amount: String,
    #[tabled(rename = "Interval")]
    interval: String,
    #[tabled(rename = "Provider ID")]
    provider_id: String,
}

/// Imported product row for table display.
#[derive(Tabled)]
struct ImportRow {
    #[tabled(rename = "Product")]
    product: String,
    #[tabled(rename = "Provider ID")]
    provider_id: String,
    #[tabled(rename = "Prices")]
    prices: String,
}

impl OutputFormatter {
    /// Creates a new output formatter.
    #[must_use]
    pub const fn new(format: OutputFormat) -> Self {
        Self { format }
    }

    /// Formats the result of a deployment.
    #[must_use]
    pub fn format_changes(&self, changes: &ChangeSet) -> String {
        match self.format {
            OutputFormat::Json => serde_json::to_string_pretty(&ChangeSetJson::from(changes)).unwrap_or_default(),
            OutputFormat::Text => Self::format_changes_text(changes),
        }
    }

    fn format_changes_text(changes: &ChangeSet) -> String {
        if !changes.has_changes() {
            return format!("{} Catalog is up to date.\n", "✓".green());
        }

        let mut output = String::new();
        let heading = if changes.is_dry_run() {
            "Proposed changes (dry run)"
        } else {
            "Applied changes"
        };
        let _ = write!(
            output,
            "\n{heading}\n   Config hash: {}\n\n",
            ConfigHasher::short(changes.config_hash())
        );

        let products = changes.products().iter().filter(|c| c.change_type.is_pending()).map(|c| ChangeRow {
            action: Self::format_change_type(c.change_type),
            resource: c.key.clone(),
            changes: Self::format_fields(&c.changes),
        });
        let prices = changes.prices().iter().filter(|c| c.change_type.is_pending()).map(|c| ChangeRow {
            action: Self::format_change_type(c.change_type),
            resource: format!("{}/{}", c.product_key, c.key),
            changes: Self::format_fields(&c.changes),
        });
        let rows: Vec<ChangeRow> = products.chain(prices).collect();
        output.push_str(&Table::new(rows).to_string());
        output.push('\n');

        let immutable: Vec<_> = changes.immutable_price_changes().collect();
        if !immutable.is_empty() {
            let _ = write!(output, "\n{} Immutable price changes:\n", "⚠".yellow());
            for change in immutable {
                let resolution = match (&change.strategy, &change.duplicate_key) {
                    (_, Some(key)) => format!("duplicated as '{key}'"),
                    (Some(strategy), None) => strategy.to_string(),
                    (None, None) => String::from("needs a strategy"),
                };
                let _ = writeln!(
                    output,
                    "   - {}/{} ({}): {resolution}",
                    change.product_key,
                    change.key,
                    change.immutable_fields.join(", ")
                );
            }
        }

        let duplicates: Vec<_> = changes.duplicates().collect();
        if !duplicates.is_empty() {
            let _ = writeln!(
                output,
                "\nAdd these keys to the configuration or the next deploy archives them:"
            );
            for change in duplicates {
                let _ = writeln!(
                    output,
                    "   - {}/{}",
                    change.product_key,
                    change.duplicate_key.as_deref().unwrap_or_default()
                );
            }
        }

        let summary = changes.summary();
        let _ = write!(
            output,
            "\nProducts: {}\nPrices:   {}\n",
            Self::format_counts(&summary.products),
            Self::format_counts(&summary.prices)
        );
        output
    }

    /// Formats a validation result.
    #[must_use]
    pub fn format_validation(&self, config: &BillingConfig, result: &ValidationResult) -> String {
        match self.format {
            OutputFormat::Json => {
                let json = serde_json::json!({
                    "valid": result.is_valid(),
                    "products": config.products.len(),
                    "prices": config.total_prices(),
                    "provider": config.provider.name,
                    "warnings": result.warnings,
                });
                serde_json::to_string_pretty(&json).unwrap_or_default()
            }
            OutputFormat::Text => {
                let mut output = format!("{} Configuration is valid!\n", "✓".green());
                if !result.warnings.is_empty() {
                    output.push_str("\nWarnings:\n");
                    for warning in &result.warnings {
                        let _ = writeln!(output, "  - {warning}");
                    }
                }
                output.push_str("\nConfiguration summary:\n");
                let _ = writeln!(output, "  Provider: {}", config.provider.name);
                let _ = writeln!(output, "  Products: {}", config.products.len());
                let _ = writeln!(output, "  Prices: {}", config.total_prices());
                output
            }
        }
    }

    /// Formats the local catalog.
    #[must_use]
    pub fn format_status(&self, snapshot: &CatalogSnapshot) -> String {
        match self.format {
            OutputFormat::Json => serde_json::to_string_pretty(snapshot).unwrap_or_default(),
            OutputFormat::Text => {
                let mut output = String::new();
                let _ = write!(
                    output,
                    "\nCatalog (last updated {})\n\n",
                    snapshot.last_updated.format("%Y-%m-%d %H:%M")
                );

                let rows: Vec<CatalogRow> = snapshot
                    .products
                    .iter()
                    .filter(|p| p.active)
                    .flat_map(|product| {
                        snapshot
                            .prices
                            .iter()
                            .filter(move |p| p.active && p.product_id == product.id)
                            .map(move |price| CatalogRow {
                                product: product.key.clone(),
                                price: price.key.clone(),
                                amount: format!("{} {}", price.amount, price.currency),
                                interval: price.recurring.as_ref().map_or_else(
                                    || String::from("one-off"),
                                    |r| format!("{} {}", r.interval_count, r.interval.as_str()),
                                ),
                                provider_id: price.provider_id.clone(),
                            })
                    })
                    .collect();

                if rows.is_empty() {
                    output.push_str("   No active prices.\n");
                } else {
                    output.push_str(&Table::new(rows).to_string());
                    output.push('\n');
                }

                let _ = write!(
                    output,
                    "\n{} active products, {} active prices ({} archived rows)\n",
                    snapshot.active_product_count(),
                    snapshot.active_price_count(),
                    snapshot.products.len() + snapshot.prices.len()
                        - snapshot.active_product_count()
                        - snapshot.active_price_count()
                );
                output
            }
        }
    }

    /// Formats an import report.
    #[must_use]
    pub fn format_import(&self, report: &ImportReport, quiet: bool) -> String {
        match self.format {
            OutputFormat::Json => serde_json::to_string_pretty(report).unwrap_or_default(),
            OutputFormat::Text => {
                let mut output = String::new();
                if !quiet && !report.products.is_empty() {
                    let rows: Vec<ImportRow> = report
                        .products
                        .iter()
                        .map(|p| ImportRow {
                            product: p.key.clone(),
                            provider_id: p.provider_id.clone(),
                            prices: p.prices.keys().cloned().collect::<Vec<_>>().join(", "),
                        })
                        .collect();
                    output.push_str(&Table::new(rows).to_string());
                    output.push('\n');
                }

                let _ = write!(
                    output,
                    "\n{} Imported {} products and {} prices",
                    "✓".green(),
                    report.products.len(),
                    report.price_count()
                );
                if !report.skipped.is_empty() {
                    let _ = write!(output, " ({} skipped)", report.skipped.len());
                }
                output.push('\n');
                if report.stored {
                    output.push_str("   Written to the local store\n");
                }
                if let Some(path) = &report.config_path {
                    let _ = writeln!(output, "   Catalog written to {}", path.display());
                }
                output
            }
        }
    }

    /// Formats a change type with color.
    fn format_change_type(change_type: ChangeType) -> String {
        match change_type {
            ChangeType::Created => "+create".green().to_string(),
            ChangeType::Updated => "~update".yellow().to_string(),
            ChangeType::Archived => "-archive".red().to_string(),
            ChangeType::Unchanged => "unchanged".dimmed().to_string(),
        }
    }

    fn format_counts(counts: &ChangeCounts) -> String {
        format!(
            "{} created, {} updated, {} archived, {} unchanged",
            counts.created.to_string().green(),
            counts.updated.to_string().yellow(),
            counts.archived.to_string().red(),
            counts.unchanged
        )
    }

    fn format_fields(changes: &FieldChanges) -> String {
        changes
            .iter()
            .map(|(field, change)| {
                format!(
                    "{field}: {} -> {}",
                    Self::truncate(&Self::format_value(&change.old), 24),
                    Self::truncate(&Self::format_value(&change.new), 24)
                )
            })
            .collect::<Vec<_>>()
            .join("\n")
    }

    fn format_value(value: &Value) -> String {
        match value {
            Value::Null => String::from("-"),
            Value::String(s) => s.clone(),
            other => other.to_string(),
        }
    }

    /// Truncates a string to a maximum number of characters.
    fn truncate(s: &str, max_len: usize) -> String {
        if s.chars().count() <= max_len {
            s.to_string()
        } else {
            let head: String = s.chars().take(max_len - 3).collect();
            format!("{head}...")
        }
    }
}

// JSON serialization helpers

#[derive(serde::Serialize)]
struct ChangeSetJson<'a> {
    dry_run: bool,
    config_hash: &'a str,
    summary: crate::pipeline::ChangeSummary,
    products: &'a [crate::pipeline::ProductChange],
    prices: &'a [crate::pipeline::PriceChange],
}

impl<'a> From<&'a ChangeSet> for ChangeSetJson<'a> {
    fn from(changes: &'a ChangeSet) -> Self {
        Self {
            dry_run: changes.is_dry_run(),
            config_hash: changes.config_hash(),
            summary: changes.summary(),
            products: changes.products(),
            prices: changes.prices(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::PriceDefinition;
    use crate::pipeline::PriceChange;
    use crate::planner::FieldChange;
    use serde_json::json;

    fn change_set() -> ChangeSet {
        let definition = PriceDefinition {
            amount: 1299,
            currency: "eur".into(),
            recurring: None,
            nickname: None,
            metadata: None,
            trial_period_days: None,
            stripe: None,
        };
        let mut price = PriceChange::created("pro", "monthly", &definition);
        price.change_type = ChangeType::Updated;
        price.changes.insert(
            "amount".into(),
            FieldChange {
                old: json!(999),
                new: json!(1299),
            },
        );
        price.immutable_fields = vec!["amount".into()];
        ChangeSet::new(Vec::new(), vec![price], true, "abcdef0123456789".into())
    }

    #[test]
    fn test_text_lists_field_changes() {
        colored::control::set_override(false);
        let text = OutputFormatter::new(OutputFormat::Text).format_changes(&change_set());
        assert!(text.contains("dry run"));
        assert!(text.contains("pro/monthly"));
        assert!(text.contains("amount: 999 -> 1299"));
        assert!(text.contains("needs a strategy"));
    }

    #[test]
    fn test_json_mirrors_change_set() {
        let text = OutputFormatter::new(OutputFormat::Json).format_changes(&change_set());
        let json: Value = serde_json::from_str(&text).unwrap();
        assert_eq!(json["dry_run"], json!(true));
        assert_eq!(json["summary"]["prices"]["updated"], json!(1));
        assert_eq!(json["prices"][0]["change_type"], json!("updated"));
        assert_eq!(json["prices"][0]["changes"]["amount"]["new"], json!(1299));
    }

    #[test]
    fn test_up_to_date() {
        colored::control::set_override(false);
        let empty = ChangeSet::new(Vec::new(), Vec::new(), false, String::new());
        let text = OutputFormatter::new(OutputFormat::Text).format_changes(&empty);
        assert!(text.contains("up to date"));
    }

    #[test]
    fn test_truncate_respects_char_boundaries() {
        assert_eq!(OutputFormatter::truncate("short", 10), "short");
        assert_eq!(OutputFormatter::truncate("€€€€€€€€€€€€", 6), "€€€...");
    }
}
