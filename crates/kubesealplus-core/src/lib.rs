//! kubesealplus core - shared functionality for the kubesealplus tool
//!
//! Standard paths and subprocess helpers that are independent of the
//! SealedSecret domain.

pub mod paths;
pub mod process;

pub use paths::Paths;
pub use process::{run_with_timeout, ProcessError};
