pub mod config;
pub mod error;
pub mod ids;
pub mod message;
pub mod trace;

pub use error::{Error, ErrorCode, Result};
