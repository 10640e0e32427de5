//! `clusterproof config` command handler

use std::io::Write;
use std::path::Path;

use serde::Serialize;
use tracing::info;

use clusterproof_core::config::{HarnessConfig, ScenarioConfig};

use crate::cli::{ConfigAction, ConfigArgs};
use crate::error::CliError;
use crate::output::{OutputWriter, Render};

/// Sections accepted by `config show --section`.
pub const SECTIONS: [&str; 7] = [
    "general",
    "gcp",
    "cluster",
    "retry",
    "stages",
    "tools",
    "scenarios",
];

/// Execute the `config` command.
pub async fn execute(
    args: ConfigArgs,
    config_path: &Path,
    writer: &OutputWriter,
) -> Result<(), CliError> {
    match args.action {
        ConfigAction::Validate => execute_validate(config_path, writer).await,
        ConfigAction::Show { section } => execute_show(config_path, section, writer).await,
    }
}

/// Load and validate the configuration file, reporting any error.
///
/// # Errors
///
/// Returns `CliError::Config` if the file is missing, malformed or invalid.
async fn execute_validate(config_path: &Path, writer: &OutputWriter) -> Result<(), CliError> {
    info!(path = %config_path.display(), "validating configuration");

    let report = validation_report(config_path, HarnessConfig::load(config_path).await);
    writer.render(&report)?;

    if !report.valid {
        return Err(CliError::Config("configuration is invalid".to_owned()));
    }

    Ok(())
}

/// Display the effective configuration (file + env overrides + defaults).
///
/// # Errors
///
/// Returns `CliError::Harness` if loading fails or `CliError::Command` if the
/// section name is unknown.
async fn execute_show(
    config_path: &Path,
    section: Option<String>,
    writer: &OutputWriter,
) -> Result<(), CliError> {
    info!(path = %config_path.display(), "loading configuration");

    let config = HarnessConfig::load(config_path).await?;
    let report = config_report(&config, config_path, section.as_deref())?;
    writer.render(&report)?;

    Ok(())
}

pub fn validation_report(
    config_path: &Path,
    result: Result<HarnessConfig, clusterproof_core::HarnessError>,
) -> ConfigValidationReport {
    let source = config_path.display().to_string();
    match result {
        Ok(config) => ConfigValidationReport {
            source,
            valid: true,
            scenarios: config.scenarios.iter().map(|s| s.name.clone()).collect(),
            errors: Vec::new(),
        },
        Err(e) => ConfigValidationReport {
            source,
            valid: false,
            scenarios: Vec::new(),
            errors: vec![e.to_string()],
        },
    }
}

/// Build the report for `config show`, optionally narrowed to one section.
pub fn config_report(
    config: &HarnessConfig,
    config_path: &Path,
    section: Option<&str>,
) -> Result<ConfigReport, CliError> {
    // TOML has no top-level array, so the scenario list is wrapped in a table.
    #[derive(Serialize)]
    struct Scenarios<'a> {
        scenarios: &'a [ScenarioConfig],
    }

    let config_toml = match section {
        None => to_toml(config),
        Some("general") => to_toml(&config.general),
        Some("gcp") => to_toml(&config.gcp),
        Some("cluster") => to_toml(&config.cluster),
        Some("retry") => to_toml(&config.retry),
        Some("stages") => to_toml(&config.stages),
        Some("tools") => to_toml(&config.tools),
        Some("scenarios") => to_toml(&Scenarios {
            scenarios: &config.scenarios,
        }),
        Some(other) => {
            return Err(CliError::Command(format!(
                "unknown section: {} (expected: {})",
                other,
                SECTIONS.join(", ")
            )));
        }
    };

    Ok(ConfigReport {
        source: config_path.display().to_string(),
        section: section.map(str::to_owned),
        config_toml,
    })
}

fn to_toml<T: Serialize + ?Sized>(value: &T) -> String {
    toml::to_string_pretty(value).unwrap_or_else(|e| format!("(serialization error: {})", e))
}

/// Configuration display report.
///
/// `config_toml` is only used for text rendering.
#[derive(Debug, Serialize)]
pub struct ConfigReport {
    pub source: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub section: Option<String>,
    #[serde(skip)]
    pub config_toml: String,
}

impl Render for ConfigReport {
    fn render_text(&self, w: &mut dyn Write) -> std::io::Result<()> {
        use colored::Colorize;

        if let Some(ref section) = self.section {
            let section_label = format!("[{}]", section);
            writeln!(
                w,
                "Configuration {} (source: {})",
                section_label.bold(),
                self.source
            )?;
        } else {
            writeln!(w, "Configuration (source: {})", self.source.bold())?;
        }

        writeln!(w)?;
        write!(w, "{}", self.config_toml)?;

        Ok(())
    }
}

/// Configuration validation report.
#[derive(Serialize)]
pub struct ConfigValidationReport {
    pub source: String,
    pub valid: bool,
    /// Names of the configured scenarios (empty if invalid).
    pub scenarios: Vec<String>,
    pub errors: Vec<String>,
}

impl Render for ConfigValidationReport {
    fn render_text(&self, w: &mut dyn Write) -> std::io::Result<()> {
        use colored::Colorize;

        writeln!(w, "Config Validation: {}", self.source.bold())?;

        if self.valid {
            writeln!(w, "  Result: {}", "VALID".green().bold())?;
            if self.scenarios.is_empty() {
                writeln!(w, "  Scenarios: {}", "none configured".yellow())?;
            } else {
                writeln!(w, "  Scenarios: {}", self.scenarios.join(", "))?;
            }
        } else {
            writeln!(w, "  Result: {}", "INVALID".red().bold())?;
            for err in &self.errors {
                writeln!(w, "  Error: {}", err.red())?;
            }
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn render(report: &impl Render) -> String {
        let mut buffer = Vec::new();
        report
            .render_text(&mut buffer)
            .expect("text rendering should succeed");
        String::from_utf8(buffer).expect("valid UTF-8")
    }

    #[test]
    fn test_config_report_full_config_has_every_section() {
        let config = HarnessConfig::default();
        let report = config_report(&config, Path::new("test.toml"), None).unwrap();

        let output = render(&report);
        assert!(output.contains("test.toml"));
        for section in ["[general]", "[cluster]", "[retry]", "[tools]"] {
            assert!(output.contains(section), "missing {section}");
        }
    }

    #[test]
    fn test_config_report_single_section() {
        let config = HarnessConfig::default();
        let report = config_report(&config, Path::new("test.toml"), Some("retry")).unwrap();

        let output = render(&report);
        assert!(output.contains("[retry]"));
        assert!(output.contains("membership_attempts = 30"));
        assert!(!output.contains("log_level"));
    }

    #[test]
    fn test_config_report_scenarios_section_is_valid_toml() {
        let config = HarnessConfig::parse(
            r#"
[[scenarios]]
name = "root-example"
example_dir = "."
packer_template = "examples/consul-image/consul.json"
build_name = "ubuntu-18-image"
"#,
        )
        .unwrap();
        let report = config_report(&config, Path::new("c.toml"), Some("scenarios")).unwrap();

        assert!(report.config_toml.contains("[[scenarios]]"));
        assert!(report.config_toml.contains("root-example"));
    }

    #[test]
    fn test_config_report_unknown_section() {
        let config = HarnessConfig::default();
        let err = config_report(&config, Path::new("c.toml"), Some("ebpf")).unwrap_err();
        assert!(matches!(err, CliError::Command(_)));
        assert!(err.to_string().contains("scenarios"));
    }

    #[test]
    fn test_config_report_json_skips_toml_body() {
        let config = HarnessConfig::default();
        let report = config_report(&config, Path::new("test.toml"), Some("gcp")).unwrap();

        let json = serde_json::to_string(&report).unwrap();
        let parsed: serde_json::Value = serde_json::from_str(&json).unwrap();
        assert_eq!(parsed["source"].as_str(), Some("test.toml"));
        assert_eq!(parsed["section"].as_str(), Some("gcp"));
        assert!(parsed.get("config_toml").is_none());
    }

    #[test]
    fn test_validation_report_valid_lists_scenarios() {
        let config = HarnessConfig::parse(
            r#"
[[scenarios]]
name = "consul-cluster"
example_dir = "examples/consul-cluster"
packer_template = "examples/consul-image/consul.json"
build_name = "ubuntu-18-image"
"#,
        )
        .unwrap();
        let report = validation_report(Path::new("ok.toml"), Ok(config));

        let output = render(&report);
        assert!(report.valid);
        assert!(output.contains("VALID"));
        assert!(output.contains("consul-cluster"));
        assert!(!output.contains("Error:"));
    }

    #[test]
    fn test_validation_report_invalid_shows_error() {
        let err = HarnessConfig::parse("[general\nlog_level = 1").unwrap_err();
        let report = validation_report(Path::new("bad.toml"), Err(err));

        let output = render(&report);
        assert!(!report.valid);
        assert!(output.contains("INVALID"));
        assert!(output.contains("failed to parse config"));
    }
}
