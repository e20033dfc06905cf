//! Test harness for a kernel-level ACL enforcer.
//!
//! The harness builds a synthetic world (users, groups and a directory tree),
//! loads per-scenario ACL rules into the enforcer and then performs
//! filesystem operations under switched identities, checking each outcome
//! against what the scenario expects.

pub mod config;
pub mod enforcer;
pub mod errors;
pub mod fixture;
pub mod fs_op;
pub mod identity;
pub mod runner;

pub use config::HarnessConfig;
pub use enforcer::{Enforcer, SettrusteesEnforcer};
pub use errors::{HarnessError, HarnessResult};
pub use identity::{Credentials, ProcessCredentials};
pub use runner::{Harness, Summary};
