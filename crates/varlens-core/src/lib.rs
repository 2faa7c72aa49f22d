pub mod config;
pub mod error;
pub mod types;

pub use config::VarlensConfig;
pub use error::{Result, VarlensError};
pub use types::*;
