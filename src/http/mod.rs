//! HTTP surface: routing, error rendering, and the listener.

pub mod response;
pub mod route;
pub mod server;
