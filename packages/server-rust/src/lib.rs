//! Coman server: module registry, versioned and legacy HTTP routes, console
//! operations and the scheduler lifespan.

pub mod app;
pub mod cli;
pub mod config;
pub mod logging;
pub mod module;
pub mod modules;
pub mod network;
pub mod openapi;
pub mod registry;
pub mod scheduler;

pub use app::{App, Lifespan};
pub use config::{LogFormat, Settings};
pub use module::{EndpointSpec, Handler, HandlerError, Module, ModuleBase, ModuleDescriptor};
pub use network::{NetworkConfig, NetworkModule};
pub use registry::{load_modules, Core, LoadReport, ModulePackage};
pub use scheduler::{Scheduler, SchedulerError, SchedulerState};
