//! Build version descriptor.
//!
//! Release builds inject `IDPJSON_VERSION`, `IDPJSON_BUILD_DATE` and
//! `IDPJSON_COMMIT` at compile time. The descriptor is assembled once per
//! process and never mutated afterwards.

use once_cell::sync::Lazy;
use std::fmt;

/// Version, build date and commit hash of this plugin build.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VersionInfo {
    pub version: &'static str,
    pub build_date: &'static str,
    pub commit: &'static str,
}

static VERSION: Lazy<VersionInfo> = Lazy::new(|| VersionInfo {
    version: option_env!("IDPJSON_VERSION").unwrap_or(env!("CARGO_PKG_VERSION")),
    build_date: option_env!("IDPJSON_BUILD_DATE").unwrap_or("unknown"),
    commit: option_env!("IDPJSON_COMMIT").unwrap_or("unknown"),
});

/// Get the version descriptor of the running build.
pub fn version() -> &'static VersionInfo {
    &VERSION
}

impl fmt::Display for VersionInfo {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ({}, {})", self.version, self.commit, self.build_date)
    }
}
