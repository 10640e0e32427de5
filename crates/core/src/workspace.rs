//! Workspace store -- an isolated config copy plus persisted artifacts.
//!
//! Terraform keeps mutable state files next to its configuration, so two
//! runs sharing one config tree would corrupt each other. Every run therefore
//! works on a private copy created by [`Workspace::create`].
//!
//! Artifacts produced by one stage and consumed by a later one (zone, image
//! id, IaC variables) are persisted as JSON files under
//! `<workspace>/.test-data/`, so a later process that reopens the workspace
//! with [`Workspace::open`] can resume with skipped stages.
//!
//! ```text
//! <temp>/clusterproof-XXXXXX/            copy of source_root
//!   └── examples/root-example/           Workspace::dir()
//!         ├── main.tf
//!         └── .test-data/
//!               ├── GcpZone.json
//!               ├── Artifact.json
//!               └── IacOptions.json
//! ```

use std::fs;
use std::path::{Path, PathBuf};

use serde::Serialize;
use serde::de::DeserializeOwned;
use tracing::{debug, info};

use crate::error::WorkspaceError;
use crate::types::IacOptions;

/// Directory (inside the workspace) holding persisted artifacts.
pub const TEST_DATA_DIR: &str = ".test-data";

/// Zone selected by the image stage.
pub const KEY_ZONE: &str = "GcpZone";
/// Identifier of the built machine image.
pub const KEY_ARTIFACT: &str = "Artifact";
/// IaC variable set used for deploy, reread by validate and teardown.
pub const KEY_IAC_OPTIONS: &str = "IacOptions";
/// Root of the copied tree, so a reopened workspace can still be cleaned up.
const KEY_ROOT: &str = "WorkspaceRoot";

/// One run's private working directory and artifact store.
#[derive(Debug, Clone)]
pub struct Workspace {
    root: PathBuf,
    dir: PathBuf,
}

impl Workspace {
    /// Copy `source_root` into a fresh uniquely named directory under
    /// `temp_root` and return the workspace at `<copy>/<sub_path>`.
    ///
    /// Hidden entries (`.git`, `.terraform`, `.test-data`, ...) and Terraform
    /// state files are not copied. The directory outlives the process; remove
    /// it with [`Workspace::cleanup`].
    pub fn create(
        source_root: &Path,
        sub_path: &Path,
        temp_root: &Path,
    ) -> Result<Self, WorkspaceError> {
        let source_dir = source_root.join(sub_path);
        if !source_dir.is_dir() {
            return Err(WorkspaceError::SourceNotFound {
                path: source_dir.display().to_string(),
            });
        }

        fs::create_dir_all(temp_root).map_err(|e| io_err(temp_root, e))?;
        let root = tempfile::Builder::new()
            .prefix("clusterproof-")
            .tempdir_in(temp_root)
            .map_err(|e| io_err(temp_root, e))?
            .keep();

        copy_tree(source_root, &root, &root)?;

        let workspace = Self {
            dir: root.join(sub_path),
            root,
        };
        fs::create_dir_all(&workspace.dir).map_err(|e| io_err(&workspace.dir, e))?;
        workspace.save(KEY_ROOT, &workspace.root)?;

        info!(
            source = %source_dir.display(),
            workspace = %workspace.dir.display(),
            "created workspace"
        );
        Ok(workspace)
    }

    /// Reopen a workspace created by an earlier invocation.
    pub fn open(dir: impl Into<PathBuf>) -> Result<Self, WorkspaceError> {
        let dir = dir.into();
        if !dir.is_dir() {
            return Err(WorkspaceError::NotFound {
                path: dir.display().to_string(),
            });
        }
        let mut workspace = Self {
            root: dir.clone(),
            dir,
        };
        if let Some(root) = workspace.try_load::<PathBuf>(KEY_ROOT)? {
            workspace.root = root;
        }
        info!(workspace = %workspace.dir.display(), "reopened workspace");
        Ok(workspace)
    }

    /// Directory the external tools run in.
    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Top of the copied tree.
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Persist `value` under `key`, replacing any previous value.
    pub fn save<T: Serialize + ?Sized>(&self, key: &str, value: &T) -> Result<(), WorkspaceError> {
        let path = self.key_path(key)?;
        let data_dir = self.dir.join(TEST_DATA_DIR);
        fs::create_dir_all(&data_dir).map_err(|e| io_err(&data_dir, e))?;

        let bytes = serde_json::to_vec_pretty(value).map_err(|e| WorkspaceError::Serde {
            key: key.to_owned(),
            reason: e.to_string(),
        })?;

        let tmp = path.with_extension("json.tmp");
        fs::write(&tmp, bytes).map_err(|e| io_err(&tmp, e))?;
        fs::rename(&tmp, &path).map_err(|e| io_err(&path, e))?;

        debug!(key, path = %path.display(), "saved artifact");
        Ok(())
    }

    /// Load `key` if it was saved.
    pub fn try_load<T: DeserializeOwned>(&self, key: &str) -> Result<Option<T>, WorkspaceError> {
        let path = self.key_path(key)?;
        let bytes = match fs::read(&path) {
            Ok(bytes) => bytes,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(io_err(&path, e)),
        };
        serde_json::from_slice(&bytes)
            .map(Some)
            .map_err(|e| WorkspaceError::Serde {
                key: key.to_owned(),
                reason: e.to_string(),
            })
    }

    /// Load `key`; a missing key means the producing stage never ran.
    pub fn load<T: DeserializeOwned>(&self, key: &str) -> Result<T, WorkspaceError> {
        self.try_load(key)?
            .ok_or_else(|| WorkspaceError::MissingArtifact {
                key: key.to_owned(),
                workspace: self.dir.display().to_string(),
            })
    }

    pub fn save_string(&self, key: &str, value: &str) -> Result<(), WorkspaceError> {
        self.save(key, value)
    }

    pub fn load_string(&self, key: &str) -> Result<String, WorkspaceError> {
        self.load(key)
    }

    pub fn save_artifact_id(&self, id: &str) -> Result<(), WorkspaceError> {
        self.save(KEY_ARTIFACT, id)
    }

    pub fn load_artifact_id(&self) -> Result<String, WorkspaceError> {
        self.load(KEY_ARTIFACT)
    }

    pub fn save_iac_options(&self, options: &IacOptions) -> Result<(), WorkspaceError> {
        self.save(KEY_IAC_OPTIONS, options)
    }

    pub fn load_iac_options(&self) -> Result<IacOptions, WorkspaceError> {
        self.load(KEY_IAC_OPTIONS)
    }

    /// Names of every persisted artifact, sorted.
    pub fn keys(&self) -> Result<Vec<String>, WorkspaceError> {
        let data_dir = self.dir.join(TEST_DATA_DIR);
        let entries = match fs::read_dir(&data_dir) {
            Ok(entries) => entries,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(io_err(&data_dir, e)),
        };

        let mut keys = Vec::new();
        for entry in entries {
            let entry = entry.map_err(|e| io_err(&data_dir, e))?;
            let name = entry.file_name();
            if let Some(key) = name.to_str().and_then(|n| n.strip_suffix(".json")) {
                if key != KEY_ROOT {
                    keys.push(key.to_owned());
                }
            }
        }
        keys.sort();
        Ok(keys)
    }

    /// Remove the whole copied tree.
    pub fn cleanup(self) -> Result<(), WorkspaceError> {
        fs::remove_dir_all(&self.root).map_err(|e| io_err(&self.root, e))?;
        info!(workspace = %self.root.display(), "removed workspace");
        Ok(())
    }

    fn key_path(&self, key: &str) -> Result<PathBuf, WorkspaceError> {
        let valid = !key.is_empty()
            && key
                .chars()
                .all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '-');
        if !valid {
            return Err(WorkspaceError::InvalidKey {
                key: key.to_owned(),
            });
        }
        Ok(self.dir.join(TEST_DATA_DIR).join(format!("{key}.json")))
    }
}

/// Entries never copied into a workspace.
fn is_excluded(name: &str) -> bool {
    name.starts_with('.') || name.ends_with(".tfstate") || name.ends_with(".tfstate.backup")
}

fn copy_tree(src: &Path, dst: &Path, copy_root: &Path) -> Result<(), WorkspaceError> {
    fs::create_dir_all(dst).map_err(|e| io_err(dst, e))?;

    for entry in fs::read_dir(src).map_err(|e| io_err(src, e))? {
        let entry = entry.map_err(|e| io_err(src, e))?;
        let path = entry.path();
        let name = entry.file_name();
        if name.to_str().is_some_and(is_excluded) || path == copy_root {
            continue;
        }

        let target = dst.join(&name);
        let meta = fs::metadata(&path).map_err(|e| io_err(&path, e))?;
        if meta.is_dir() {
            if entry.file_type().map_err(|e| io_err(&path, e))?.is_symlink() {
                debug!(path = %path.display(), "skipping symlinked directory");
                continue;
            }
            copy_tree(&path, &target, copy_root)?;
        } else {
            fs::copy(&path, &target).map_err(|e| io_err(&path, e))?;
        }
    }
    Ok(())
}

fn io_err(path: &Path, source: std::io::Error) -> WorkspaceError {
    WorkspaceError::Io {
        path: path.display().to_string(),
        source,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use std::collections::BTreeMap;

    use tempfile::TempDir;

    fn source_tree() -> TempDir {
        let src = TempDir::new().unwrap();
        let example = src.path().join("examples/root-example");
        fs::create_dir_all(&example).unwrap();
        fs::write(example.join("main.tf"), "module \"x\" {}").unwrap();
        fs::write(example.join("terraform.tfstate"), "{}").unwrap();
        fs::create_dir_all(example.join(".terraform")).unwrap();
        fs::write(example.join(".terraform/plugin"), "bin").unwrap();
        fs::create_dir_all(src.path().join("modules/consul-cluster")).unwrap();
        fs::write(src.path().join("modules/consul-cluster/main.tf"), "").unwrap();
        src
    }

    #[test]
    fn create_copies_tree_and_skips_state() {
        let src = source_tree();
        let tmp = TempDir::new().unwrap();

        let ws = Workspace::create(src.path(), Path::new("examples/root-example"), tmp.path())
            .unwrap();

        assert!(ws.dir().ends_with("examples/root-example"));
        assert!(ws.dir().join("main.tf").is_file());
        assert!(!ws.dir().join("terraform.tfstate").exists());
        assert!(!ws.dir().join(".terraform").exists());
        assert!(ws.root().join("modules/consul-cluster/main.tf").is_file());
        assert!(ws.root().starts_with(tmp.path()));
    }

    #[test]
    fn create_fails_for_missing_sub_path() {
        let src = source_tree();
        let tmp = TempDir::new().unwrap();
        let err = Workspace::create(src.path(), Path::new("examples/nope"), tmp.path())
            .unwrap_err();
        assert!(matches!(err, WorkspaceError::SourceNotFound { .. }));
    }

    #[test]
    fn save_and_load_roundtrip_structured_value() {
        let tmp = TempDir::new().unwrap();
        let ws = Workspace::open(tmp.path()).unwrap();

        let mut vars = BTreeMap::new();
        vars.insert("gcp_zone".to_owned(), serde_json::json!("us-east1-b"));
        vars.insert("consul_server_cluster_size".to_owned(), serde_json::json!(3));
        let options = IacOptions {
            dir: tmp.path().to_path_buf(),
            vars,
        };
        ws.save_iac_options(&options).unwrap();

        assert_eq!(ws.load_iac_options().unwrap(), options);
    }

    #[test]
    fn load_missing_key_is_fatal() {
        let tmp = TempDir::new().unwrap();
        let ws = Workspace::open(tmp.path()).unwrap();

        assert_eq!(ws.try_load::<String>(KEY_ZONE).unwrap(), None);
        let err = ws.load_artifact_id().unwrap_err();
        assert!(matches!(
            err,
            WorkspaceError::MissingArtifact { ref key, .. } if key == KEY_ARTIFACT
        ));
    }

    #[test]
    fn keys_must_not_escape_store() {
        let tmp = TempDir::new().unwrap();
        let ws = Workspace::open(tmp.path()).unwrap();
        let err = ws.save_string("../evil", "x").unwrap_err();
        assert!(matches!(err, WorkspaceError::InvalidKey { .. }));
        assert!(ws.load_string("").is_err());
    }

    #[test]
    fn reopened_workspace_sees_saved_values_and_root() {
        let src = source_tree();
        let tmp = TempDir::new().unwrap();
        let ws = Workspace::create(src.path(), Path::new("examples/root-example"), tmp.path())
            .unwrap();
        ws.save_string(KEY_ZONE, "europe-west1-c").unwrap();

        let reopened = Workspace::open(ws.dir()).unwrap();
        assert_eq!(reopened.load_string(KEY_ZONE).unwrap(), "europe-west1-c");
        assert_eq!(reopened.root(), ws.root());
        assert_eq!(reopened.keys().unwrap(), vec![KEY_ZONE.to_owned()]);
    }

    #[test]
    fn open_missing_directory_fails() {
        let err = Workspace::open("/nonexistent/clusterproof/ws").unwrap_err();
        assert!(matches!(err, WorkspaceError::NotFound { .. }));
    }

    #[test]
    fn cleanup_removes_copied_tree() {
        let src = source_tree();
        let tmp = TempDir::new().unwrap();
        let ws = Workspace::create(src.path(), Path::new("examples/root-example"), tmp.path())
            .unwrap();
        let root = ws.root().to_path_buf();

        ws.cleanup().unwrap();
        assert!(!root.exists());
        assert!(src.path().join("examples/root-example/main.tf").exists());
    }

    #[test]
    fn corrupt_artifact_reports_serde_error() {
        let tmp = TempDir::new().unwrap();
        let ws = Workspace::open(tmp.path()).unwrap();
        fs::create_dir_all(tmp.path().join(TEST_DATA_DIR)).unwrap();
        fs::write(tmp.path().join(TEST_DATA_DIR).join("Artifact.json"), "{not json").unwrap();
        assert!(matches!(
            ws.load_artifact_id().unwrap_err(),
            WorkspaceError::Serde { .. }
        ));
    }
}
