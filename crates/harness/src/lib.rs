//! Staged acceptance test of a deployed Consul cluster.
//!
//! [`ClusterScenario`] sequences `setup_image`, `deploy`, `validate` and
//! `teardown` through a [`StageRunner`](clusterproof_core::StageRunner),
//! persisting every hand-off in the run's [`TestContext`] workspace. The
//! teardown is held by a [`TeardownGuard`] from the moment an image exists.

pub mod context;
pub mod lifecycle;
pub mod scenario;

pub use context::TestContext;
pub use lifecycle::{TeardownGuard, teardown};
pub use scenario::{ClusterScenario, ScenarioOutcome, Toolset, VALIDATED_OUTPUTS, ValidatedGroup};
