//! clusterproof.toml integration tests
//!
//! - clusterproof.toml.example parsing
//! - partial configs
//! - environment override precedence, stage skipping included
//! - empty and malformed files

use std::path::PathBuf;

use clusterproof_core::config::HarnessConfig;
use clusterproof_core::error::{ConfigError, HarnessError};
use clusterproof_core::stage::{STAGE_DEPLOY, STAGE_SETUP_IMAGE, STAGE_TEARDOWN, STAGE_VALIDATE};

const EXAMPLE: &str = include_str!("../../../clusterproof.toml.example");

// =============================================================================
// clusterproof.toml.example
// =============================================================================

#[test]
fn example_config_parses_and_validates() {
    let config = HarnessConfig::parse(EXAMPLE).expect("example config should parse");
    config
        .validate()
        .expect("example config should pass validation");
}

#[test]
fn example_config_matches_defaults() {
    let config = HarnessConfig::parse(EXAMPLE).expect("should parse");
    let defaults = HarnessConfig::default();

    assert_eq!(config.general.log_level, defaults.general.log_level);
    assert_eq!(config.general.log_format, defaults.general.log_format);
    assert_eq!(config.cluster.server_size, defaults.cluster.server_size);
    assert_eq!(config.cluster.client_size, defaults.cluster.client_size);
    assert_eq!(config.cluster.query_port, defaults.cluster.query_port);
    assert_eq!(
        config.retry.membership_attempts,
        defaults.retry.membership_attempts
    );
    assert_eq!(
        config.retry.convergence_interval_secs,
        defaults.retry.convergence_interval_secs
    );
    assert_eq!(config.tools.packer, defaults.tools.packer);
}

#[test]
fn example_config_defines_two_scenarios() {
    let config = HarnessConfig::parse(EXAMPLE).expect("should parse");
    assert_eq!(config.scenarios.len(), 2);

    let root = config.scenario("root-example").expect("root-example scenario");
    assert_eq!(root.example_dir, PathBuf::from("examples/root-example"));
    assert_eq!(root.build_name, "ubuntu-18-image");
    assert!(config.scenario("missing").is_none());
}

// =============================================================================
// Partial / invalid files
// =============================================================================

#[test]
fn stage_skip_list_becomes_stage_config() {
    let config = HarnessConfig::parse(
        r#"
[stages]
skip = ["setup_image", "teardown"]
"#,
    )
    .expect("should parse");

    let stages = config.stage_config();
    assert!(stages.is_skipped(STAGE_SETUP_IMAGE));
    assert!(stages.is_skipped(STAGE_TEARDOWN));
    assert!(!stages.is_skipped(STAGE_DEPLOY));
}

#[test]
fn wrong_type_is_a_parse_error() {
    let err = HarnessConfig::parse(
        r#"
[cluster]
server_size = "three"
"#,
    )
    .unwrap_err();
    assert!(matches!(
        err,
        HarnessError::Config(ConfigError::ParseFailed { .. })
    ));
}

#[tokio::test]
async fn empty_file_loads_defaults() {
    let dir = tempfile::TempDir::new().expect("temp dir");
    let path = dir.path().join("clusterproof.toml");
    std::fs::write(&path, "").expect("write");

    let config = HarnessConfig::from_file(&path).await.expect("should load");
    assert_eq!(config.cluster.expected_members(), 7);
}

#[tokio::test]
async fn invalid_value_in_file_fails_validation() {
    let dir = tempfile::TempDir::new().expect("temp dir");
    let path = dir.path().join("clusterproof.toml");
    std::fs::write(&path, "[general]\nlog_format = \"xml\"\n").expect("write");

    let err = HarnessConfig::from_file(&path).await.unwrap_err();
    assert!(err.to_string().contains("general.log_format"));
}

// =============================================================================
// Environment overrides
// =============================================================================

fn clear_env() {
    // SAFETY: callers are #[serial], no other thread reads the environment.
    unsafe {
        for key in [
            "CLUSTERPROOF_GCP_PROJECT",
            "CLUSTERPROOF_STAGES_SKIP",
            "CLUSTERPROOF_CLUSTER_SERVER_SIZE",
            "GOOGLE_CLOUD_PROJECT_ID",
            "GOOGLE_CLOUD_PROJECT",
            "GOOGLE_PROJECT",
            "GOOGLE_CLOUD_REGION",
            "SKIP_deploy",
            "SKIP_validate",
        ] {
            std::env::remove_var(key);
        }
    }
}

#[test]
#[serial_test::serial]
fn env_overrides_take_precedence_over_file() {
    clear_env();
    // SAFETY: serialized test.
    unsafe {
        std::env::set_var("CLUSTERPROOF_CLUSTER_SERVER_SIZE", "5");
        std::env::set_var("CLUSTERPROOF_GCP_PROJECT", "from-env");
    }

    let mut config = HarnessConfig::parse(
        r#"
[gcp]
project = "from-file"

[cluster]
server_size = 3
"#,
    )
    .expect("should parse");
    config.apply_env_overrides();

    assert_eq!(config.cluster.server_size, 5);
    assert_eq!(config.gcp.project, "from-env");
    clear_env();
}

#[test]
#[serial_test::serial]
fn google_project_env_fills_empty_project_only() {
    clear_env();
    // SAFETY: serialized test.
    unsafe {
        std::env::set_var("GOOGLE_CLOUD_PROJECT_ID", "gcp-env-project");
        std::env::set_var("GOOGLE_CLOUD_REGION", "us-east1");
    }

    let mut empty = HarnessConfig::default();
    empty.apply_env_overrides();
    assert_eq!(empty.gcp.project, "gcp-env-project");
    assert_eq!(empty.gcp.region, "us-east1");

    let mut configured = HarnessConfig::parse("[gcp]\nproject = \"pinned\"\nregion = \"europe-west1\"")
        .expect("should parse");
    configured.apply_env_overrides();
    assert_eq!(configured.gcp.project, "pinned");
    assert_eq!(configured.gcp.region, "europe-west1");
    clear_env();
}

#[test]
#[serial_test::serial]
fn skip_env_vars_are_read_once_into_config() {
    clear_env();
    // SAFETY: serialized test.
    unsafe {
        std::env::set_var("CLUSTERPROOF_STAGES_SKIP", "setup_image, deploy");
        std::env::set_var("SKIP_validate", "true");
    }

    let mut config = HarnessConfig::default();
    config.apply_env_overrides();
    clear_env();

    let stages = config.stage_config();
    assert!(stages.is_skipped(STAGE_SETUP_IMAGE));
    assert!(stages.is_skipped(STAGE_DEPLOY));
    assert!(stages.is_skipped(STAGE_VALIDATE));
    assert!(!stages.is_skipped(STAGE_TEARDOWN));
    config.validate().expect("known stage names validate");
}
