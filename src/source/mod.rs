//! Directory sources: recipes for producing a freshly populated source tree.
//!
//! A [`DirectorySource`] is a pure value. [`DirectorySource::populate`] writes
//! the tree into an existing, empty directory; on failure that directory is in
//! an undefined state and the caller must not expose it under a permanent name
//! (see [`crate::module::Module::unpack`]).
//!
//! # Archive layering
//!
//! Upstream tarballs follow the "single versioned top directory" convention
//! (`gcc-4.2.2/...`). Layered sources extract several archives on top of each
//! other so that split distributions (a compiler's core and its C++ front end)
//! merge into one tree. After extraction the single top-level directory is
//! lifted away:
//!
//! ```text
//! dest/gcc-4.2.2/{gcc,libstdc++-v3,configure}  ->  dest/{gcc,libstdc++-v3,configure}
//! ```

mod inputs;

pub use inputs::InputSearchPath;

use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};

use crate::error::{build_error, BuildError};
use crate::process::{CommandRunner, Invocation};

/// Name the archive's top directory is moved to while its children are lifted.
const UNWRAP_PLACEHOLDER: &str = ".toolchain-builder-unwrap";

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DirectorySource {
    /// Produces nothing; the component's tree comes from another tool.
    Empty,
    /// A single archive with one top-level directory.
    Archive(PathBuf),
    /// Several archives extracted in order into the same directory.
    LayeredArchive(Vec<PathBuf>),
    /// Another source with a `-p1` patch applied on top.
    Patched {
        inner: Box<DirectorySource>,
        patch: PathBuf,
    },
}

impl DirectorySource {
    pub fn archive(path: impl Into<PathBuf>) -> Self {
        DirectorySource::Archive(path.into())
    }

    pub fn layered(paths: impl IntoIterator<Item = PathBuf>) -> Self {
        DirectorySource::LayeredArchive(paths.into_iter().collect())
    }

    /// Wrap this source so `patch` is applied after it populates.
    pub fn patched(self, patch: impl Into<PathBuf>) -> Self {
        DirectorySource::Patched {
            inner: Box::new(self),
            patch: patch.into(),
        }
    }

    /// Write the tree into `dest_dir`, which must exist and be empty.
    pub fn populate(&self, runner: &dyn CommandRunner, dest_dir: &Path) -> Result<()> {
        ensure_empty_dir(dest_dir)?;
        self.write_tree(runner, dest_dir)
    }

    fn write_tree(&self, runner: &dyn CommandRunner, dest_dir: &Path) -> Result<()> {
        match self {
            DirectorySource::Empty => Ok(()),
            DirectorySource::Archive(archive) => {
                extract_layers(runner, std::slice::from_ref(archive), dest_dir)
            }
            DirectorySource::LayeredArchive(archives) => {
                extract_layers(runner, archives, dest_dir)
            }
            DirectorySource::Patched { inner, patch } => {
                inner.write_tree(runner, dest_dir)?;
                apply_patch(runner, patch, dest_dir)
            }
        }
    }
}

fn ensure_empty_dir(dir: &Path) -> Result<()> {
    let mut entries =
        fs::read_dir(dir).with_context(|| format!("reading directory '{}'", dir.display()))?;
    if entries.next().is_some() {
        return Err(BuildError::DestinationNotEmpty {
            path: dir.to_path_buf(),
        }
        .into());
    }
    Ok(())
}

fn extract_layers(runner: &dyn CommandRunner, archives: &[PathBuf], dest_dir: &Path) -> Result<()> {
    for archive in archives {
        let extract = Invocation::new("tar")
            .arg("-C")
            .arg(dest_dir)
            .arg("-xf")
            .arg(archive);
        runner
            .run(&extract)
            .with_context(|| format!("extracting '{}'", archive.display()))?;
    }
    unwrap_single_top_dir(dest_dir)
}

/// Replace `dir/<top>/*` with `dir/*`, requiring `<top>` to be the only entry.
pub fn unwrap_single_top_dir(dir: &Path) -> Result<()> {
    let mut entries = Vec::new();
    for entry in
        fs::read_dir(dir).with_context(|| format!("listing extracted tree '{}'", dir.display()))?
    {
        let entry = entry.with_context(|| format!("listing extracted tree '{}'", dir.display()))?;
        entries.push(entry);
    }

    let [top] = entries.as_slice() else {
        let mut names: Vec<String> = entries
            .iter()
            .map(|e| e.file_name().to_string_lossy().into_owned())
            .collect();
        names.sort();
        return Err(BuildError::ArchiveLayout {
            dir: dir.to_path_buf(),
            entries: names,
        }
        .into());
    };

    if !top.file_type()?.is_dir() {
        return Err(BuildError::ArchiveLayout {
            dir: dir.to_path_buf(),
            entries: vec![top.file_name().to_string_lossy().into_owned()],
        }
        .into());
    }

    // Park the wrapper under a reserved name so a child sharing its name can move up.
    let wrapper = dir.join(UNWRAP_PLACEHOLDER);
    fs::rename(top.path(), &wrapper).with_context(|| {
        format!(
            "moving archive top directory '{}' aside",
            top.path().display()
        )
    })?;

    for child in
        fs::read_dir(&wrapper).with_context(|| format!("reading '{}'", wrapper.display()))?
    {
        let child = child?;
        let target = dir.join(child.file_name());
        fs::rename(child.path(), &target).with_context(|| {
            format!(
                "lifting '{}' to '{}'",
                child.path().display(),
                target.display()
            )
        })?;
    }

    fs::remove_dir(&wrapper)
        .with_context(|| format!("removing emptied wrapper '{}'", wrapper.display()))?;
    Ok(())
}

fn apply_patch(runner: &dyn CommandRunner, patch: &Path, dest_dir: &Path) -> Result<()> {
    let invocation = Invocation::new("patch")
        .arg("--batch")
        .arg("-d")
        .arg(dest_dir)
        .arg("-p1")
        .arg("-i")
        .arg(patch);

    // Only a patch run that exited unsuccessfully is a rejection.
    runner.run(&invocation).map_err(|err| {
        if matches!(build_error(&err), Some(BuildError::CommandFailed { .. })) {
            err.context(BuildError::PatchRejected {
                patch: patch.to_path_buf(),
                dest: dest_dir.to_path_buf(),
            })
        } else {
            err.context(format!("running patch on '{}'", dest_dir.display()))
        }
    })
}
