//! Built-in modules. Each submits a [`crate::registry::ModulePackage`] and is
//! discovered by [`crate::registry::load_modules`].

pub mod analysis;
pub mod manager;
pub mod orchestrator;
pub mod resources;
pub mod store;
pub mod text;
pub mod webscraper;

pub use store::JsonStore;
