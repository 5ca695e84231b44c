pub mod config;
pub mod doctor;
pub mod error;
pub mod exec;
pub mod io;
pub mod keys;
pub mod maintain;
pub mod mirror;
pub mod paths;
pub mod shortcuts;
pub mod tree;
pub mod tune;
pub mod workflow;

pub use error::{OpsError, Result};
