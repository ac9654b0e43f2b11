//! Shared building blocks for the redis-ctrl workspace.
//!
//! Errors here cover everything outside the reconcile path itself:
//! reading configuration, loading entry manifests, and validating what
//! was loaded. The reconcile path has its own taxonomy in
//! `redis-ctrl-reconciler`.

pub mod error;
pub mod result;

pub use error::Error;
pub use result::{Result, ResultExt};
