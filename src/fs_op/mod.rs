//! Filesystem side of the harness: the fixture tree, its teardown walk,
//! mount resolution and the operations scenario steps perform.

pub mod create;
pub mod fixture;
pub mod mount;
pub mod ops;
pub mod remove;
pub mod stat;

pub use fixture::{FilesystemFixture, FsEntry};
pub use mount::MountResolution;
pub use ops::Operation;
