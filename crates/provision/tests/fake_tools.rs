//! Integration tests -- the adapters against stand-in `terraform` and
//! `packer` shell scripts that record their arguments.
//!
//! Everything runs inside a single test so no other test thread forks while
//! a freshly written script is still open for writing.

#![cfg(unix)]

use std::collections::BTreeMap;
use std::os::unix::fs::PermissionsExt;
use std::path::{Path, PathBuf};

use clusterproof_core::error::ToolError;
use clusterproof_core::provider::{IacEngine, ImageBuilder};
use clusterproof_core::types::{IacOptions, ImageBuildRequest, outputs, vars};
use clusterproof_provision::{Packer, Terraform, VAR_FILE};

const FAKE_TERRAFORM: &str = r#"#!/bin/sh
echo "$@" >> "$(dirname "$0")/terraform.log"
case "$1" in
  output) echo "consul-server-ab12" ;;
  destroy) [ -f clusterproof.auto.tfvars.json ] || exit 7 ;;
esac
"#;

const FAKE_PACKER: &str = r#"#!/bin/sh
echo "$@" >> "$(dirname "$0")/packer.log"
echo "1571234560,,ui,say,==> ubuntu-18-image: done"
echo "1571234564,ubuntu-18-image,artifact,0,id,consul-ubuntu-18-bbbb"
"#;

const FAILING_TOOL: &str = "#!/bin/sh\necho 'Error: quota exceeded' >&2\nexit 1\n";

fn install(dir: &Path, name: &str, body: &str) -> PathBuf {
    let path = dir.join(name);
    std::fs::write(&path, body).unwrap();
    std::fs::set_permissions(&path, std::fs::Permissions::from_mode(0o755)).unwrap();
    path
}

fn log(dir: &Path, name: &str) -> Vec<String> {
    std::fs::read_to_string(dir.join(name))
        .unwrap_or_default()
        .lines()
        .map(str::to_owned)
        .collect()
}

#[tokio::test]
async fn adapters_drive_tools_with_expected_arguments() {
    let bin = tempfile::tempdir().unwrap();
    let iac_dir = tempfile::tempdir().unwrap();

    let terraform = Terraform::new(install(bin.path(), "terraform", FAKE_TERRAFORM).display().to_string());
    let packer = Packer::new(install(bin.path(), "packer", FAKE_PACKER).display().to_string());
    let failing = Terraform::new(install(bin.path(), "failing", FAILING_TOOL).display().to_string());

    // terraform: apply writes the var file, output reads one value, destroy reuses vars
    let options = IacOptions::new(iac_dir.path())
        .var(vars::PROJECT, "proj")
        .var(vars::ZONE, "us-east1-b");

    terraform.init_and_apply(&options).await.unwrap();
    assert!(iac_dir.path().join(VAR_FILE).exists());

    let group = terraform
        .output(&options, outputs::SERVER_INSTANCE_GROUP)
        .await
        .unwrap();
    assert_eq!(group, "consul-server-ab12");

    terraform.destroy(&options).await.unwrap();

    let calls = log(bin.path(), "terraform.log");
    assert_eq!(calls.len(), 4, "{calls:?}");
    assert_eq!(calls[0], "init -no-color -input=false");
    assert!(calls[1].starts_with("apply -no-color -auto-approve -input=false -var-file="));
    assert!(calls[1].ends_with(VAR_FILE));
    assert_eq!(calls[2], "output -no-color -raw instance_group_name");
    assert!(calls[3].starts_with("destroy -no-color -auto-approve"));

    // packer: artifact id comes from machine-readable output
    let request = ImageBuildRequest {
        template_path: PathBuf::from("consul.json"),
        build_name: "ubuntu-18-image".to_owned(),
        vars: BTreeMap::from([("project_id".to_owned(), "proj".to_owned())]),
    };
    let image = packer.build(&request).await.unwrap();
    assert_eq!(image, "consul-ubuntu-18-bbbb");
    assert_eq!(
        log(bin.path(), "packer.log"),
        vec!["build -machine-readable -only=ubuntu-18-image -var project_id=proj consul.json"]
    );

    // a build name the output does not mention is an output error
    let other = ImageBuildRequest {
        build_name: "centos-image".to_owned(),
        ..request
    };
    assert!(matches!(
        packer.build(&other).await.unwrap_err(),
        ToolError::Output { .. }
    ));

    // non-zero exit surfaces stderr and is not retried
    let err = failing.init_and_apply(&options).await.unwrap_err();
    match err {
        ToolError::Failed { action, stderr, .. } => {
            assert_eq!(action, "init");
            assert!(stderr.contains("quota exceeded"));
        }
        other => panic!("expected Failed, got {other:?}"),
    }
}
