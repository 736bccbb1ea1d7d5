pub mod config;
pub mod error;

pub use config::LsmConfig;
pub use error::{DispatchError, LsmError, Result};
