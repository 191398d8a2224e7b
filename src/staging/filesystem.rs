//! Filesystem helpers for staging and promotion.

use anyhow::{bail, Context, Result};
use std::ffi::OsString;
use std::fs;
use std::path::{Path, PathBuf};
use walkdir::WalkDir;

/// `path` with `suffix` appended to its final component (`install/gcc` -> `install/gcc.tmp`).
pub fn sibling_with_suffix(path: &Path, suffix: &str) -> PathBuf {
    let mut name = OsString::from(path.as_os_str());
    name.push(suffix);
    PathBuf::from(name)
}

/// Remove a file, symlink or directory tree if it exists.
pub fn remove_tree(path: &Path) -> Result<()> {
    let Ok(meta) = fs::symlink_metadata(path) else {
        return Ok(());
    };
    if meta.is_dir() {
        fs::remove_dir_all(path)
            .with_context(|| format!("removing directory '{}'", path.display()))?;
    } else {
        fs::remove_file(path).with_context(|| format!("removing '{}'", path.display()))?;
    }
    Ok(())
}

/// Copy every child of `src` into `dst`, merging into existing directories.
///
/// - directories merge with existing directories
/// - regular files overwrite same-named files
/// - symlinks are recreated, never followed
///
/// File and directory modes are kept. Directory modes are applied after the
/// whole tree is copied, so read-only directories still receive their
/// contents. Timestamps are not preserved.
pub fn copy_onto(src: &Path, dst: &Path) -> Result<()> {
    fs::create_dir_all(dst).with_context(|| format!("creating '{}'", dst.display()))?;
    let mut dirs = Vec::new();

    for entry in WalkDir::new(src).min_depth(1).follow_links(false) {
        let entry = entry.with_context(|| format!("walking '{}'", src.display()))?;
        let rel = entry
            .path()
            .strip_prefix(src)
            .with_context(|| format!("relativizing '{}'", entry.path().display()))?;
        let target = dst.join(rel);
        let file_type = entry.file_type();

        if file_type.is_dir() {
            if target.is_symlink() || target.is_file() {
                bail!(
                    "cannot merge directory '{}' over non-directory '{}'",
                    entry.path().display(),
                    target.display()
                );
            }
            fs::create_dir_all(&target)
                .with_context(|| format!("creating '{}'", target.display()))?;
            dirs.push((entry.path().to_path_buf(), target));
        } else if file_type.is_symlink() {
            let link = fs::read_link(entry.path())
                .with_context(|| format!("reading symlink '{}'", entry.path().display()))?;
            replace_non_dir(&target)?;
            std::os::unix::fs::symlink(&link, &target)
                .with_context(|| format!("creating symlink '{}'", target.display()))?;
        } else {
            replace_non_dir(&target)?;
            fs::copy(entry.path(), &target).with_context(|| {
                format!(
                    "copying '{}' to '{}'",
                    entry.path().display(),
                    target.display()
                )
            })?;
        }
    }

    // Deepest first, so a parent never loses write access before its children are done.
    for (src_dir, target) in dirs.iter().rev() {
        copy_permissions(src_dir, target)?;
    }
    Ok(())
}

fn replace_non_dir(target: &Path) -> Result<()> {
    let Ok(meta) = fs::symlink_metadata(target) else {
        return Ok(());
    };
    if meta.is_dir() {
        bail!(
            "cannot overwrite directory '{}' with a non-directory",
            target.display()
        );
    }
    fs::remove_file(target).with_context(|| format!("replacing '{}'", target.display()))
}

fn copy_permissions(src: &Path, dst: &Path) -> Result<()> {
    let perms = fs::metadata(src)
        .with_context(|| format!("reading metadata of '{}'", src.display()))?
        .permissions();
    fs::set_permissions(dst, perms)
        .with_context(|| format!("setting permissions on '{}'", dst.display()))
}
