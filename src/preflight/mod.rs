//! Preflight checks for the host tools the builder itself runs.
//!
//! Extraction, patching and the autotools build steps shell out to `tar`,
//! `patch` and `make`. Checking for them up front turns a failure deep in the
//! first unpack into a single message naming the packages to install.
//!
//! ```rust,ignore
//! use toolchain_builder::preflight::{command_exists, check_required_tools};
//!
//! if !command_exists("patch") {
//!     println!("patch not installed");
//! }
//! check_required_tools(&[("tar", "tar"), ("bzip2", "bzip2")])?;
//! ```

use anyhow::{bail, Result};

/// Check if a command exists on `PATH`.
pub fn command_exists(cmd: &str) -> bool {
    which::which(cmd).is_ok()
}

/// Host tools used by unpack, patch, build and install.
///
/// Each tuple is (command_name, package_name).
pub const REQUIRED_TOOLS: &[(&str, &str)] = &[
    ("tar", "tar"),
    ("patch", "patch"),
    ("make", "make"),
];

/// Check that specific tools are available.
///
/// Fails listing every missing tool with the package that provides it.
pub fn check_required_tools(tools: &[(&str, &str)]) -> Result<()> {
    let missing: Vec<_> = tools
        .iter()
        .filter(|(tool, _)| !command_exists(tool))
        .collect();

    if !missing.is_empty() {
        let msg = missing
            .iter()
            .map(|(t, p)| format!("  {} (install: {})", t, p))
            .collect::<Vec<_>>()
            .join("\n");
        bail!("Missing required host tools:\n{}", msg);
    }

    Ok(())
}

/// Check every tool in [`REQUIRED_TOOLS`].
pub fn check_host_tools() -> Result<()> {
    check_required_tools(REQUIRED_TOOLS)
}
