//! Model Context Protocol server layer.

pub mod handler;
pub mod transport;
