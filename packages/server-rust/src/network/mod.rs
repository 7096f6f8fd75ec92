//! Network configuration, middleware, lifecycle and global handlers.

pub mod config;
pub mod handlers;
pub mod lifecycle;
pub mod middleware;
pub mod module;

pub use config::*;
pub use handlers::AppState;
pub use module::NetworkModule;
pub use lifecycle::{Lifecycle, Phase, Readiness};
