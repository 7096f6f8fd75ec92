//! Host CPU and memory snapshot.

use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use serde_json::{json, Value};
use sysinfo::System;

use crate::module::{EndpointSpec, Handler, HandlerResult, Module, ModuleBase, ModuleDescriptor};
use crate::registry::{Core, ModulePackage};

/// CPU usage is measured as the difference between two refreshes this far
/// apart.
const CPU_SAMPLE: Duration = Duration::from_millis(300);

fn snapshot(system: &Mutex<System>) -> HandlerResult {
    let mut system = system.lock();
    system.refresh_cpu_usage();
    std::thread::sleep(CPU_SAMPLE.max(sysinfo::MINIMUM_CPU_UPDATE_INTERVAL));
    system.refresh_cpu_usage();
    system.refresh_memory();

    Ok(json!({
        "cpu_percent": round1(f64::from(system.global_cpu_usage())),
        "mem": memory_report(
            system.total_memory(),
            system.available_memory(),
            system.used_memory(),
            system.free_memory(),
        ),
    }))
}

/// Byte counts plus the share of memory not available, in percent.
fn memory_report(total: u64, available: u64, used: u64, free: u64) -> Value {
    #[allow(clippy::cast_precision_loss)]
    let percent = if total == 0 {
        0.0
    } else {
        total.saturating_sub(available) as f64 / total as f64 * 100.0
    };
    json!({
        "total": total,
        "available": available,
        "percent": round1(percent),
        "used": used,
        "free": free,
    })
}

fn round1(value: f64) -> f64 {
    (value * 10.0).round() / 10.0
}

/// # Errors
///
/// Never fails; the signature matches [`crate::registry::ModuleConstructor`].
pub fn build(_core: &Core) -> anyhow::Result<Arc<dyn Module>> {
    let system = Arc::new(Mutex::new(System::new()));
    let mut base = ModuleBase::new(ModuleDescriptor::new("resources", "CPU/Mem snapshot"));
    base.register(
        EndpointSpec::get("/snapshot", Handler::sync(move |_| snapshot(&system)))
            .name("snapshot")
            .summary("Sample CPU usage and report memory"),
    );
    Ok(Arc::new(base))
}

inventory::submit! {
    ModulePackage::new("resources", build)
}

#[cfg(test)]
mod tests {
    use serde_json::Map;

    use super::*;
    use crate::config::Settings;

    #[test]
    fn memory_percent_counts_unavailable_share() {
        assert_eq!(
            memory_report(1000, 250, 700, 100),
            json!({"total": 1000, "available": 250, "percent": 75.0, "used": 700, "free": 100})
        );
        assert_eq!(memory_report(0, 0, 0, 0)["percent"], 0.0);
    }

    #[test]
    fn snapshot_via_console() {
        let module = build(&Core::new(Settings::default())).unwrap();
        let snapshot = module.invoke_console_operation("snapshot", &Map::new()).unwrap();
        let cpu = snapshot["cpu_percent"].as_f64().unwrap();
        assert!((0.0..=100.0).contains(&cpu));
        let mem = &snapshot["mem"];
        assert!(mem["total"].as_u64().unwrap() > 0);
        assert!(mem["available"].as_u64().unwrap() <= mem["total"].as_u64().unwrap());
    }
}
