//! Offline consistency checker.
//!
//! The checks only see a volume through `FsckBackend`, so they run the same
//! against a mounted image or an in-memory mock.

pub mod checks;
pub mod fsck_backend;
pub mod fsck_types;

#[cfg(test)]
mod mock;

pub use checks::run_fsck;
pub use fsck_backend::FsckBackend;
pub use fsck_types::FsckReport;
