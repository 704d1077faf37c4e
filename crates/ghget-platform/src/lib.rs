pub use error::{Error, Result};

pub mod arch;
pub mod dir;
mod error;
pub mod paths;

pub use paths::{AppPaths, sanitize_segment};
