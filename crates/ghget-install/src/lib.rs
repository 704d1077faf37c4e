//! The install pipeline: download the selected asset, run the optional
//! pre-install script, then invoke the installer.
//!
//! Process execution sits behind the [`Runner`] trait so the coordinator can
//! be driven by [`ProcessRunner`] in production and by recording fakes in
//! tests.

pub mod command;
mod coordinator;
mod error;
mod runner;

pub use coordinator::{InstallCoordinator, Pipeline};
pub use error::{InstallError, Result};
pub use runner::{ProcessRunner, Runner};
