//! Locating third-party archives and patches.

use std::path::PathBuf;

use anyhow::Result;

use crate::error::BuildError;

/// Ordered list of directories searched for input files. First match wins.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InputSearchPath {
    dirs: Vec<PathBuf>,
}

impl InputSearchPath {
    pub fn new(dirs: impl IntoIterator<Item = PathBuf>) -> Self {
        Self {
            dirs: dirs.into_iter().collect(),
        }
    }

    /// Resolve `name` against the search directories.
    pub fn find(&self, name: &str) -> Result<PathBuf> {
        for dir in &self.dirs {
            let candidate = dir.join(name);
            if candidate.exists() {
                return Ok(candidate);
            }
        }
        Err(BuildError::InputNotFound {
            name: name.to_string(),
            searched: self.dirs.clone(),
        }
        .into())
    }

    /// Resolve every name, failing on the first one that is missing.
    pub fn find_all(&self, names: &[&str]) -> Result<Vec<PathBuf>> {
        names.iter().map(|name| self.find(name)).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::{build_error, ErrorKind};
    use std::fs;
    use tempfile::TempDir;

    #[test]
    fn test_find_prefers_earlier_directories() {
        let temp = TempDir::new().unwrap();
        let first = temp.path().join("third_party/gcc");
        let second = temp.path().join("tools/patches");
        fs::create_dir_all(&first).unwrap();
        fs::create_dir_all(&second).unwrap();
        fs::write(first.join("gcc.patch"), "a").unwrap();
        fs::write(second.join("gcc.patch"), "b").unwrap();
        fs::write(second.join("newlib.patch"), "c").unwrap();

        let search = InputSearchPath::new([first.clone(), second.clone()]);

        assert_eq!(search.find("gcc.patch").unwrap(), first.join("gcc.patch"));
        assert_eq!(
            search.find("newlib.patch").unwrap(),
            second.join("newlib.patch")
        );
    }

    #[test]
    fn test_missing_input_is_reported_with_search_dirs() {
        let temp = TempDir::new().unwrap();
        let search = InputSearchPath::new([temp.path().to_path_buf()]);

        let err = search
            .find_all(&["binutils-2.20.tar.bz2"])
            .unwrap_err();

        assert_eq!(
            build_error(&err).map(|e| e.kind()),
            Some(ErrorKind::InputNotFound)
        );
        assert!(err.to_string().contains("binutils-2.20.tar.bz2"));
        assert!(err.to_string().contains(&temp.path().display().to_string()));
    }
}
