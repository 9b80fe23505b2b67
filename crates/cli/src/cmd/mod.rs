mod audit;
mod build;
mod project;

pub use audit::cmd_audit;
pub use build::{BuildFlags, cmd_build};
pub use project::Project;
