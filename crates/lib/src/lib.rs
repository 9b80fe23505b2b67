//! sake-lib: the build engine behind `sake`.
//!
//! This crate provides everything between a Sakefile on disk and a finished
//! build:
//! - `sakefile`: locating, macro-expanding and parsing Sakefiles
//! - `audit`: structural checks on the parsed document
//! - `graph`: the target dependency graph and its orderings
//! - `shastore`: the `.shastore` file of recorded digests
//! - `execute`: deciding what is stale and running it

pub mod audit;
pub mod execute;
pub mod graph;
pub mod sakefile;
pub mod shastore;
pub mod util;

pub use audit::{AuditError, AuditWarning, check_integrity};
pub use execute::{BuildError, BuildOptions, BuildReport, build_this_graph};
pub use graph::{BuildGraph, GraphError, Target, TargetId};
pub use sakefile::{Sakefile, SakefileError, find_sakefile};
pub use shastore::HashStore;
