//! Semantic version metadata for the Coman platform.
//!
//! Modules inherit the umbrella [`COMAN_VERSION`] unless an override is listed
//! in [`MODULE_VERSIONS`].

use chrono::NaiveDate;

/// Umbrella version of the Coman platform following `SemVer`.
pub const COMAN_VERSION: &str = "1.0.0";

/// Current public API major version exposed via HTTP routes (`/v{major}/...`).
pub const API_MAJOR_VERSION: u32 = 1;

/// Per-module semantic version overrides as `(module_name, version)` pairs.
pub const MODULE_VERSIONS: &[(&str, &str)] = &[];

/// Planned sunset date for unversioned legacy HTTP routes.
#[must_use]
pub fn legacy_route_removal_date() -> NaiveDate {
    NaiveDate::from_ymd_opt(2025, 9, 30).unwrap_or(NaiveDate::MAX)
}

/// Returns the semantic version string for a module.
#[must_use]
pub fn module_version(module_name: &str) -> &'static str {
    MODULE_VERSIONS
        .iter()
        .find(|(name, _)| *name == module_name)
        .map_or(COMAN_VERSION, |(_, version)| version)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unknown_module_inherits_platform_version() {
        assert_eq!(module_version("text"), COMAN_VERSION);
    }

    #[test]
    fn legacy_removal_date_is_iso_formatted() {
        assert_eq!(legacy_route_removal_date().to_string(), "2025-09-30");
    }
}
