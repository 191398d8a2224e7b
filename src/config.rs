//! `toolchain-builder.toml`: where to build and where the inputs live.

use anyhow::{Context, Result};
use serde::Deserialize;
use std::fs;
use std::path::{Component, Path, PathBuf};

use crate::error::BuildError;
use crate::source::InputSearchPath;

pub const CONFIG_FILE_NAME: &str = "toolchain-builder.toml";

const DEFAULT_SEARCH_DIRS: &[&str] = &[
    "third_party/gcc",
    "third_party/binutils",
    "third_party/newlib",
    "native_client/tools/patches",
];

/// Resolved configuration. All paths are absolute.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Config {
    /// Parent of `source/`, `shared/` and `split/`.
    pub base_dir: PathBuf,
    /// Checkout holding `native_client/` and `third_party/`.
    pub sdk_root: PathBuf,
    pub search_dirs: Vec<PathBuf>,
    pub target: String,
    pub jobs: usize,
}

#[derive(Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
struct ConfigToml {
    paths: Option<PathsToml>,
    toolchain: Option<ToolchainToml>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
struct PathsToml {
    base_dir: Option<String>,
    sdk_root: Option<String>,
    search_dirs: Option<Vec<String>>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
struct ToolchainToml {
    target: Option<String>,
    jobs: Option<usize>,
}

impl Config {
    /// Load `<dir>/toolchain-builder.toml`, or the defaults if it does not exist.
    pub fn load(dir: &Path) -> Result<Self> {
        let config_path = dir.join(CONFIG_FILE_NAME);
        if !config_path.exists() {
            return Self::resolve(dir, &config_path, ConfigToml::default());
        }

        let contents = fs::read_to_string(&config_path)
            .with_context(|| format!("reading config '{}'", config_path.display()))?;
        Self::parse(dir, &config_path, &contents)
    }

    /// Parse config text; relative paths resolve against `dir`.
    pub fn parse(dir: &Path, config_path: &Path, contents: &str) -> Result<Self> {
        let parsed: ConfigToml =
            toml::from_str(contents).map_err(|err| BuildError::InvalidConfig {
                path: config_path.to_path_buf(),
                reason: err.message().to_string(),
            })?;
        Self::resolve(dir, config_path, parsed)
    }

    fn resolve(dir: &Path, config_path: &Path, parsed: ConfigToml) -> Result<Self> {
        let paths = parsed.paths.unwrap_or_default();
        let toolchain = parsed.toolchain.unwrap_or_default();

        let base_dir = resolve_path(dir, paths.base_dir.as_deref().unwrap_or("."));
        let sdk_root = resolve_path(dir, paths.sdk_root.as_deref().unwrap_or("src"));
        let search_dirs = match paths.search_dirs {
            Some(dirs) => dirs.iter().map(|d| resolve_path(&sdk_root, d)).collect(),
            None => DEFAULT_SEARCH_DIRS
                .iter()
                .map(|d| resolve_path(&sdk_root, d))
                .collect(),
        };

        let target = toolchain.target.unwrap_or_else(|| "nacl".to_string());
        if target.trim().is_empty() {
            return Err(invalid(config_path, "toolchain.target must not be empty"));
        }
        let jobs = toolchain.jobs.unwrap_or(4);
        if jobs == 0 {
            return Err(invalid(config_path, "toolchain.jobs must be at least 1"));
        }

        Ok(Self {
            base_dir,
            sdk_root,
            search_dirs,
            target,
            jobs,
        })
    }

    pub fn search_path(&self) -> InputSearchPath {
        InputSearchPath::new(self.search_dirs.iter().cloned())
    }

    pub fn nacl_dir(&self) -> PathBuf {
        self.sdk_root.join("native_client")
    }

    pub fn lock_path(&self) -> PathBuf {
        self.base_dir.join(crate::lock::LOCK_FILE_NAME)
    }
}

fn invalid(config_path: &Path, reason: &str) -> anyhow::Error {
    BuildError::InvalidConfig {
        path: config_path.to_path_buf(),
        reason: reason.to_string(),
    }
    .into()
}

/// `path` against `root`, with `.` and `..` folded away lexically.
///
/// Prefixes derived from these paths end up in `$DESTDIR$prefix`, which only
/// lines up with the staged tree when the prefix has no dotted segments.
fn resolve_path(root: &Path, path: &str) -> PathBuf {
    normalize(&root.join(path))
}

fn normalize(path: &Path) -> PathBuf {
    let mut normalized = PathBuf::new();
    for component in path.components() {
        match component {
            Component::CurDir => {}
            Component::ParentDir => match normalized.components().next_back() {
                Some(Component::Normal(_)) => {
                    normalized.pop();
                }
                Some(Component::RootDir) | Some(Component::Prefix(_)) => {}
                _ => normalized.push(component),
            },
            other => normalized.push(other),
        }
    }
    normalized
}
