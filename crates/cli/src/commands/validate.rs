//! `validate` command implementation.

use anyhow::{Context, Result};
use serde::Serialize;
use tracing::info;

use crate::cli::ValidateArgs;

/// Validation result for JSON output
#[derive(Serialize)]
struct ValidationResult {
    valid: bool,
    config_path: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    error: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    warnings: Option<Vec<String>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    summary: Option<ConfigSummary>,
}

#[derive(Serialize)]
struct ConfigSummary {
    version: String,
    source_count: usize,
    context_type_count: usize,
    push_source_count: usize,
    pull_source_count: usize,
    validity_window_s: f64,
    request_timeout_s: f64,
}

/// Execute the `validate` command
pub fn run_validate(args: &ValidateArgs) -> Result<()> {
    info!(config = %args.config.display(), "Validating configuration");

    let result = validate_config(args);

    if args.json {
        let json = serde_json::to_string_pretty(&result)
            .context("Failed to serialize validation result")?;
        println!("{}", json);
    } else {
        print_validation_result(&result);
    }

    if result.valid {
        Ok(())
    } else {
        anyhow::bail!("Configuration validation failed")
    }
}

fn validate_config(args: &ValidateArgs) -> ValidationResult {
    let config_path = args.config.display().to_string();

    // Check file exists
    if !args.config.exists() {
        return ValidationResult {
            valid: false,
            config_path,
            error: Some(format!("File not found: {}", args.config.display())),
            warnings: None,
            summary: None,
        };
    }

    // Try to load and validate
    match config_loader::ConfigLoader::load_from_path(&args.config) {
        Ok(blueprint) => {
            let warnings = collect_warnings(&blueprint);
            let context_type_count = count_context_types(&blueprint);
            let push_source_count = blueprint
                .sources
                .iter()
                .filter(|s| s.mode == contracts::SourceMode::Push)
                .count();

            ValidationResult {
                valid: true,
                config_path,
                error: None,
                warnings: if warnings.is_empty() {
                    None
                } else {
                    Some(warnings)
                },
                summary: Some(ConfigSummary {
                    version: format!("{:?}", blueprint.version),
                    source_count: blueprint.sources.len(),
                    context_type_count,
                    push_source_count,
                    pull_source_count: blueprint.sources.len() - push_source_count,
                    validity_window_s: blueprint.broker.validity_window_s,
                    request_timeout_s: blueprint.broker.request_timeout_s,
                }),
            }
        }
        Err(e) => ValidationResult {
            valid: false,
            config_path,
            error: Some(e.to_string()),
            warnings: None,
            summary: None,
        },
    }
}

/// Count distinct context types across all source declarations
fn count_context_types(blueprint: &contracts::BrokerBlueprint) -> usize {
    let mut types = std::collections::HashSet::new();
    for source in &blueprint.sources {
        for context_type in &source.context_types {
            types.insert(context_type.as_str());
        }
    }
    types.len()
}

/// Collect configuration warnings (non-fatal issues)
fn collect_warnings(blueprint: &contracts::BrokerBlueprint) -> Vec<String> {
    let mut warnings = Vec::new();

    // Check for empty source list
    if blueprint.sources.is_empty() {
        warnings.push("No sources configured - every request will be unsupported".to_string());
    }

    for source in &blueprint.sources {
        match source.mode {
            contracts::SourceMode::Push => {
                // Snapshots expire between pushes when the interval outlasts the window
                if source.push_interval_ms as f64 / 1000.0 > blueprint.broker.validity_window_s {
                    warnings.push(format!(
                        "Source '{}' push interval ({}ms) exceeds validity window ({}s) - snapshots will expire between pushes",
                        source.id, source.push_interval_ms, blueprint.broker.validity_window_s
                    ));
                }
            }
            contracts::SourceMode::Pull => {
                if source.pull_delay_ms as f64 / 1000.0 >= blueprint.broker.request_timeout_s {
                    warnings.push(format!(
                        "Source '{}' pull delay ({}ms) reaches the request timeout ({}s) - requests will time out",
                        source.id, source.pull_delay_ms, blueprint.broker.request_timeout_s
                    ));
                }
            }
        }

        if source.payload.is_none() {
            warnings.push(format!(
                "Source '{}' has no payload configured - deliveries will carry an empty payload",
                source.id
            ));
        }
    }

    warnings
}

fn print_validation_result(result: &ValidationResult) {
    if result.valid {
        println!("✓ Configuration is valid: {}", result.config_path);

        if let Some(ref summary) = result.summary {
            println!("\n  Version: {}", summary.version);
            println!(
                "  Sources: {} ({} push, {} pull)",
                summary.source_count, summary.push_source_count, summary.pull_source_count
            );
            println!("  Context types: {}", summary.context_type_count);
            println!("  Validity window: {}s", summary.validity_window_s);
            println!("  Request timeout: {}s", summary.request_timeout_s);
        }

        if let Some(ref warnings) = result.warnings {
            println!("\n⚠ Warnings:");
            for warning in warnings {
                println!("  - {}", warning);
            }
        }
    } else {
        println!("✗ Configuration is invalid: {}", result.config_path);
        if let Some(ref error) = result.error {
            println!("\n  Error: {}", error);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    fn write_config(content: &str) -> tempfile::NamedTempFile {
        let mut file = tempfile::Builder::new()
            .suffix(".toml")
            .tempfile()
            .unwrap();
        file.write_all(content.as_bytes()).unwrap();
        file
    }

    #[test]
    fn test_validate_valid_config() {
        let file = write_config(
            r#"
[[sources]]
id = "battery_monitor"
context_types = ["battery"]
mode = "push"
payload = "87%"
"#,
        );
        let args = ValidateArgs {
            config: file.path().to_path_buf(),
            json: false,
        };
        let result = validate_config(&args);
        assert!(result.valid);
        assert_eq!(result.summary.unwrap().source_count, 1);
    }

    #[test]
    fn test_validate_missing_file() {
        let args = ValidateArgs {
            config: "/nonexistent/config.toml".into(),
            json: false,
        };
        let result = validate_config(&args);
        assert!(!result.valid);
        assert!(result.error.unwrap().contains("File not found"));
    }

    #[test]
    fn test_validate_duplicate_ids_rejected() {
        let file = write_config(
            r#"
[[sources]]
id = "dup"
context_types = ["battery"]
payload = "a"

[[sources]]
id = "dup"
context_types = ["location"]
payload = "b"
"#,
        );
        let args = ValidateArgs {
            config: file.path().to_path_buf(),
            json: false,
        };
        let result = validate_config(&args);
        assert!(!result.valid);
        assert!(result.error.unwrap().contains("duplicate"));
    }

    #[test]
    fn test_warning_for_slow_pull_source() {
        let file = write_config(
            r#"
[broker]
request_timeout_s = 1.0

[[sources]]
id = "slow"
context_types = ["location"]
mode = "pull"
payload = "52.5,13.4"
pull_delay_ms = 1500
"#,
        );
        let args = ValidateArgs {
            config: file.path().to_path_buf(),
            json: false,
        };
        let result = validate_config(&args);
        assert!(result.valid);
        let warnings = result.warnings.unwrap();
        assert!(warnings.iter().any(|w| w.contains("time out")), "{warnings:?}");
    }
}
