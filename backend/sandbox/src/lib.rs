pub mod direct;
pub mod docker;
pub mod executor;
mod process;

pub use direct::{DirectOptions, DirectRunner};
pub use docker::{DockerBackend, build_run_args};
pub use executor::{IsolationBackend, SandboxConfig, SandboxExecutor, SandboxResult, WorkspaceMount};
