//! Destdir capture and promotion of a component's installed files.
//!
//! Build systems install into `$DESTDIR/$prefix/...`. [`StagingInstaller`]
//! points the install at a scratch root next to the component's install
//! directory, strips the prefix path segments from the captured tree, makes
//! the result the component's install directory, and then unions it onto the
//! live prefix.
//!
//! ```text
//! install/binutils.tmp/<prefix>/bin/nacl-as   (captured)
//! install/binutils/bin/nacl-as                (promoted)
//! <prefix>/bin/nacl-as                        (unioned)
//! ```

pub mod filesystem;

use std::fs;
use std::path::{Component, Path, PathBuf};

use anyhow::{Context, Result};

use crate::error::BuildError;
use filesystem::{copy_onto, remove_tree, sibling_with_suffix};

const CAPTURE_SUFFIX: &str = ".tmp";

/// Installs one component through a destdir capture.
#[derive(Debug, Clone)]
pub struct StagingInstaller {
    prefix: PathBuf,
    install_dir: PathBuf,
}

impl StagingInstaller {
    /// `prefix` must be absolute and free of `.` and `..` segments, since
    /// the install step resolves `$DESTDIR$prefix` through the filesystem.
    pub fn new(prefix: impl Into<PathBuf>, install_dir: impl Into<PathBuf>) -> Result<Self> {
        let prefix = prefix.into();
        if !prefix.has_root() {
            return Err(BuildError::RelativePrefix { prefix }.into());
        }
        if prefix
            .components()
            .any(|c| matches!(c, Component::CurDir | Component::ParentDir))
        {
            return Err(BuildError::UnnormalizedPrefix { prefix }.into());
        }
        Ok(Self {
            prefix,
            install_dir: install_dir.into(),
        })
    }

    /// Scratch root handed to the install step (`<install_dir>.tmp`).
    pub fn capture_root(&self) -> PathBuf {
        sibling_with_suffix(&self.install_dir, CAPTURE_SUFFIX)
    }

    /// Where the install step is expected to put files under `root`.
    pub fn staged_prefix(&self, root: &Path) -> PathBuf {
        root.join(relative_prefix(&self.prefix))
    }

    /// Run `install` against a fresh capture root, then promote and union the result.
    ///
    /// If `install` fails, the previous install directory and prefix are untouched.
    pub fn install<F>(&self, install: F) -> Result<()>
    where
        F: FnOnce(&Path) -> Result<()>,
    {
        let root = self.capture_root();
        remove_tree(&root)?;

        install(&root)
            .with_context(|| format!("installing into capture root '{}'", root.display()))?;

        remove_tree(&self.install_dir)?;

        let captured = self.staged_prefix(&root);
        if !captured.exists() {
            return Err(BuildError::MissingPrefixCapture { expected: captured }.into());
        }
        if let Some(parent) = self.install_dir.parent() {
            fs::create_dir_all(parent)
                .with_context(|| format!("creating '{}'", parent.display()))?;
        }
        fs::rename(&captured, &self.install_dir).with_context(|| {
            format!(
                "promoting '{}' to '{}'",
                captured.display(),
                self.install_dir.display()
            )
        })?;

        remove_tree(&root)?;

        fs::create_dir_all(&self.prefix)
            .with_context(|| format!("creating prefix '{}'", self.prefix.display()))?;
        copy_onto(&self.install_dir, &self.prefix).with_context(|| {
            format!(
                "copying '{}' onto prefix '{}'",
                self.install_dir.display(),
                self.prefix.display()
            )
        })
    }
}

/// Destdir-style install of `install` under `prefix`, promoted to `install_dir`.
pub fn install_destdir<F>(prefix: &Path, install_dir: &Path, install: F) -> Result<()>
where
    F: FnOnce(&Path) -> Result<()>,
{
    StagingInstaller::new(prefix, install_dir)?.install(install)
}

/// `prefix` without its root (`/usr/local` -> `usr/local`).
fn relative_prefix(prefix: &Path) -> PathBuf {
    prefix
        .components()
        .filter(|c| !matches!(c, Component::RootDir | Component::Prefix(_)))
        .collect()
}
