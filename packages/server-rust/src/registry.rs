//! Process-wide core context and module discovery.
//!
//! Module packages announce themselves at link time with
//! `inventory::submit!`; [`load_modules`] instantiates every announced
//! package against the shared [`Core`]. One failing package never prevents
//! the others from loading.

use std::collections::HashMap;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::Arc;

use arc_swap::ArcSwapOption;
use tracing::{info, warn};

use crate::config::Settings;
use crate::module::operation::panic_message;
use crate::module::Module;
use crate::scheduler::Scheduler;

/// Builds a module against the shared core.
pub type ModuleConstructor = fn(&Core) -> anyhow::Result<Arc<dyn Module>>;

/// A discoverable module package.
#[derive(Debug, Clone, Copy)]
pub struct ModulePackage {
    pub package: &'static str,
    pub entry: Option<ModuleConstructor>,
}

impl ModulePackage {
    #[must_use]
    pub const fn new(package: &'static str, entry: ModuleConstructor) -> Self {
        Self {
            package,
            entry: Some(entry),
        }
    }

    /// A package that ships no module entry point; the loader skips it.
    #[must_use]
    pub const fn without_entry(package: &'static str) -> Self {
        Self {
            package,
            entry: None,
        }
    }
}

inventory::collect!(ModulePackage);

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum RegistryError {
    #[error("module '{0}' is already registered")]
    DuplicateModule(String),
}

// ---------------------------------------------------------------------------
// Core
// ---------------------------------------------------------------------------

/// Loaded modules, shared settings and the scheduler handle.
///
/// Populated once at startup; read-only afterwards apart from attaching the
/// scheduler.
pub struct Core {
    modules: Vec<Arc<dyn Module>>,
    by_name: HashMap<String, usize>,
    settings: Arc<Settings>,
    scheduler: ArcSwapOption<Scheduler>,
    skipped: Vec<SkippedPackage>,
}

impl Core {
    #[must_use]
    pub fn new(settings: Settings) -> Self {
        Self {
            modules: Vec::new(),
            by_name: HashMap::new(),
            settings: Arc::new(settings),
            scheduler: ArcSwapOption::empty(),
            skipped: Vec::new(),
        }
    }

    /// Adds a module under its declared name.
    ///
    /// # Errors
    ///
    /// Returns [`RegistryError::DuplicateModule`] if the name is taken; the
    /// existing module is kept.
    pub fn register(&mut self, module: Arc<dyn Module>) -> Result<(), RegistryError> {
        let name = module.name().to_string();
        if self.by_name.contains_key(&name) {
            return Err(RegistryError::DuplicateModule(name));
        }
        self.by_name.insert(name, self.modules.len());
        self.modules.push(module);
        Ok(())
    }

    #[must_use]
    pub fn get(&self, name: &str) -> Option<&Arc<dyn Module>> {
        self.by_name.get(name).map(|&idx| &self.modules[idx])
    }

    /// Modules in registration order.
    #[must_use]
    pub fn modules(&self) -> &[Arc<dyn Module>] {
        &self.modules
    }

    #[must_use]
    pub fn module_names(&self) -> Vec<String> {
        self.modules.iter().map(|m| m.name().to_string()).collect()
    }

    #[must_use]
    pub fn settings(&self) -> &Arc<Settings> {
        &self.settings
    }

    /// Packages the loader could not turn into modules.
    #[must_use]
    pub fn skipped_packages(&self) -> &[SkippedPackage] {
        &self.skipped
    }

    pub fn attach_scheduler(&self, scheduler: Arc<Scheduler>) {
        self.scheduler.store(Some(scheduler));
    }

    #[must_use]
    pub fn scheduler(&self) -> Option<Arc<Scheduler>> {
        self.scheduler.load_full()
    }

    /// Stops the scheduler if one was attached. Never fails.
    pub fn shutdown(&self) {
        if let Some(scheduler) = self.scheduler.load_full() {
            scheduler.shutdown();
        }
    }
}

impl std::fmt::Debug for Core {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Core")
            .field("modules", &self.module_names())
            .field("scheduler", &self.scheduler.load().is_some())
            .finish_non_exhaustive()
    }
}

// ---------------------------------------------------------------------------
// Loader
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SkippedPackage {
    pub package: String,
    pub reason: String,
}

/// Outcome of a discovery pass.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LoadReport {
    pub loaded: Vec<String>,
    pub skipped: Vec<SkippedPackage>,
}

/// Instantiates every package submitted through `inventory`.
pub fn load_modules(core: &mut Core) -> LoadReport {
    load_modules_from(core, inventory::iter::<ModulePackage>)
}

/// Instantiates the given packages in package-name order.
pub fn load_modules_from<'a, I>(core: &mut Core, packages: I) -> LoadReport
where
    I: IntoIterator<Item = &'a ModulePackage>,
{
    let mut packages: Vec<&ModulePackage> = packages.into_iter().collect();
    packages.sort_by_key(|p| p.package);

    let mut report = LoadReport::default();
    for package in packages {
        match instantiate(core, package) {
            Ok(module) => {
                let name = module.name().to_string();
                for collision in module.base().operations().collisions() {
                    warn!(
                        module = %name,
                        key = %collision.key,
                        kept = %collision.kept,
                        ignored = %collision.ignored,
                        "operation key collision, first registrant kept"
                    );
                }
                match core.register(module) {
                    Ok(()) => {
                        info!(package = package.package, module = %name, "module loaded");
                        report.loaded.push(name);
                    }
                    Err(err) => skip(&mut report, package, err.to_string()),
                }
            }
            Err(reason) => skip(&mut report, package, reason),
        }
    }
    core.skipped.extend(report.skipped.iter().cloned());
    report
}

fn instantiate(core: &Core, package: &ModulePackage) -> Result<Arc<dyn Module>, String> {
    let entry = package
        .entry
        .ok_or_else(|| "package has no module entry point".to_string())?;
    match catch_unwind(AssertUnwindSafe(|| entry(core))) {
        Ok(Ok(module)) => Ok(module),
        Ok(Err(err)) => Err(format!("{err:#}")),
        Err(panic) => Err(format!(
            "module constructor panicked: {}",
            panic_message(panic.as_ref())
        )),
    }
}

fn skip(report: &mut LoadReport, package: &ModulePackage, reason: String) {
    warn!(package = package.package, %reason, "module package skipped");
    report.skipped.push(SkippedPackage {
        package: package.package.to_string(),
        reason,
    });
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;
    use crate::module::{EndpointSpec, Handler, ModuleBase, ModuleDescriptor};

    fn build_sample(_core: &Core) -> anyhow::Result<Arc<dyn Module>> {
        let mut base = ModuleBase::new(ModuleDescriptor::new("sample", "Sample module"));
        base.register(EndpointSpec::get("/sample", Handler::sync(|_| Ok(json!(1)))).name("sample"));
        Ok(Arc::new(base))
    }

    fn build_other(_core: &Core) -> anyhow::Result<Arc<dyn Module>> {
        Ok(Arc::new(ModuleBase::new(ModuleDescriptor::new("other", "Other"))))
    }

    fn build_failing(_core: &Core) -> anyhow::Result<Arc<dyn Module>> {
        anyhow::bail!("missing dependency")
    }

    fn build_panicking(_core: &Core) -> anyhow::Result<Arc<dyn Module>> {
        panic!("boom")
    }

    fn core() -> Core {
        Core::new(Settings::default())
    }

    #[test]
    fn broken_package_does_not_block_others() {
        let mut core = core();
        let packages = [
            ModulePackage::new("a_broken", build_failing),
            ModulePackage::new("b_panics", build_panicking),
            ModulePackage::without_entry("c_empty"),
            ModulePackage::new("d_sample", build_sample),
        ];
        let report = load_modules_from(&mut core, &packages);

        assert_eq!(report.loaded, vec!["sample"]);
        assert_eq!(report.skipped.len(), 3);
        assert_eq!(report.skipped[0].reason, "missing dependency");
        assert_eq!(report.skipped[1].reason, "module constructor panicked: boom");
        assert_eq!(report.skipped[2].reason, "package has no module entry point");
        assert!(core.get("sample").is_some());
        assert_eq!(core.skipped_packages(), report.skipped.as_slice());
    }

    #[test]
    fn packages_load_in_name_order() {
        let mut core = core();
        let packages = [
            ModulePackage::new("z_sample", build_sample),
            ModulePackage::new("a_other", build_other),
        ];
        load_modules_from(&mut core, &packages);
        assert_eq!(core.module_names(), vec!["other", "sample"]);
    }

    #[test]
    fn duplicate_module_names_are_caught() {
        let mut core = core();
        let packages = [
            ModulePackage::new("first", build_sample),
            ModulePackage::new("second", build_sample),
        ];
        let report = load_modules_from(&mut core, &packages);
        assert_eq!(report.loaded, vec!["sample"]);
        assert_eq!(report.skipped[0].package, "second");
        assert_eq!(report.skipped[0].reason, "module 'sample' is already registered");
    }

    #[test]
    fn register_reports_duplicate() {
        let mut core = core();
        let module = build_sample(&Core::new(Settings::default())).unwrap();
        core.register(Arc::clone(&module)).unwrap();
        assert_eq!(
            core.register(module),
            Err(RegistryError::DuplicateModule("sample".to_string()))
        );
    }

    #[test]
    fn shutdown_without_scheduler_is_safe() {
        let core = core();
        core.shutdown();
        core.attach_scheduler(Arc::new(Scheduler::new()));
        core.shutdown();
        core.shutdown();
        assert!(core.scheduler().is_some());
    }

    #[test]
    fn loaded_module_is_invokable() {
        let mut core = core();
        load_modules_from(&mut core, &[ModulePackage::new("sample", build_sample)]);
        let module = core.get("sample").unwrap();
        let result = module
            .invoke_console_operation("sample", &serde_json::Map::new())
            .unwrap();
        assert_eq!(result, json!(1));
    }

    #[test]
    fn builtin_packages_are_discovered() {
        let mut core = core();
        let report = load_modules(&mut core);
        for name in [
            "analysis",
            "manager",
            "orchestrator",
            "resources",
            "text",
            "webscraper",
        ] {
            assert!(report.loaded.iter().any(|loaded| loaded == name), "{name} not loaded");
        }
        assert!(report.skipped.is_empty());
    }
}
