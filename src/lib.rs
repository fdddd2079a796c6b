#![forbid(unsafe_code)]

pub mod config;
pub mod errors;
pub mod http;
pub mod mcp;
pub mod mode;
pub mod render;
pub mod session;
pub mod transport;

pub use config::GlobalConfig;
pub use errors::{AppError, Result};
