//! Module abstraction: route declaration, legacy mirroring and console
//! dispatch.

pub mod base;
pub mod handler;
pub mod http;
pub mod operation;
pub mod route;

pub use base::{KeyCollision, ModuleBase, ModuleDescriptor, OperationIndex, RegisteredRoute};
pub use handler::{Handler, HandlerError, HandlerResult};
pub use operation::{run_console_future, ConsoleOperation, OperationError, OperationSummary};
pub use route::{normalize_methods, EndpointSpec, ModuleRouter, RouteRecord};

use coman_core::Arguments;
use serde_json::Value;

use crate::scheduler::Scheduler;

// ---------------------------------------------------------------------------
// Module trait
// ---------------------------------------------------------------------------

/// A named capability unit contributing routes and, optionally, scheduled
/// jobs.
///
/// Implementors own a [`ModuleBase`] populated during construction; every
/// other method has a default that delegates to it. The route table is
/// read-only once the module is handed to the core.
pub trait Module: Send + Sync + 'static {
    fn base(&self) -> &ModuleBase;

    /// Adds cron jobs to the shared scheduler. Failures are logged by the
    /// application composer and never abort startup.
    ///
    /// # Errors
    ///
    /// Implementations return any error raised while registering jobs.
    fn register_schedules(&self, _scheduler: &Scheduler) -> anyhow::Result<()> {
        Ok(())
    }

    fn name(&self) -> &str {
        self.base().name()
    }

    fn description(&self) -> &str {
        self.base().description()
    }

    fn version(&self) -> &str {
        self.base().version()
    }

    /// Versioned router followed by the legacy router, if enabled.
    fn routers(&self) -> Vec<&ModuleRouter> {
        self.base().routers()
    }

    fn describe_console_operations(&self) -> Vec<OperationSummary> {
        self.base().describe_operations()
    }

    /// # Errors
    ///
    /// Lookup, binding and handler failures, see [`OperationError`].
    fn invoke_console_operation(
        &self,
        name: &str,
        arguments: &Arguments,
    ) -> Result<Value, OperationError> {
        self.base().invoke_operation(name, arguments)
    }
}

/// A module with no state beyond its routes.
impl Module for ModuleBase {
    fn base(&self) -> &ModuleBase {
        self
    }
}
