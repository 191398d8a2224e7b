//! How a module is configured, built and installed.

use std::collections::BTreeMap;
use std::path::PathBuf;

use crate::process::{EnvVars, Invocation};

/// Phase behavior of a [`super::Module`].
#[derive(Debug, Clone)]
pub enum Recipe {
    /// `configure && make && make install DESTDIR=...`
    Autotools(Autotools),
    /// Nothing to configure or build; a third-party tool installs into a directory.
    ToolDriven(ToolDriven),
    /// Compile a small program with the installed toolchain.
    SmokeTest(SmokeTest),
}

#[derive(Debug, Clone)]
pub struct Autotools {
    /// Run in the source directory before `configure`.
    pub pre_configure: Vec<Invocation>,
    /// Extra environment for `configure` only (`CC`, `CFLAGS`).
    pub configure_env: EnvVars,
    /// `--name` or `--name=value`.
    pub options: BTreeMap<String, Option<String>>,
    /// `--name=<absolute path of tool>`, resolved on the module's `PATH`.
    pub tool_options: BTreeMap<String, String>,
    pub make_args: Vec<String>,
    pub install_target: String,
}

impl Default for Autotools {
    fn default() -> Self {
        Self {
            pre_configure: Vec::new(),
            configure_env: EnvVars::new(),
            options: BTreeMap::new(),
            tool_options: BTreeMap::new(),
            make_args: Vec::new(),
            install_target: "install".to_string(),
        }
    }
}

impl Autotools {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn pre_configure(mut self, invocation: Invocation) -> Self {
        self.pre_configure.push(invocation);
        self
    }

    pub fn configure_env(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.configure_env.set(key, value);
        self
    }

    pub fn flag(mut self, name: impl Into<String>) -> Self {
        self.options.insert(name.into(), None);
        self
    }

    pub fn option(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.options.insert(name.into(), Some(value.into()));
        self
    }

    pub fn tool_option(mut self, name: impl Into<String>, tool: impl Into<String>) -> Self {
        self.tool_options.insert(name.into(), tool.into());
        self
    }

    pub fn make_args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.make_args = args.into_iter().map(Into::into).collect();
        self
    }

    pub fn install_target(mut self, target: impl Into<String>) -> Self {
        self.install_target = target.into();
        self
    }

    /// Configure options rendered as command-line arguments, in name order.
    pub fn option_args(&self) -> Vec<String> {
        self.options
            .iter()
            .map(|(name, value)| match value {
                Some(value) => format!("--{}={}", name, value),
                None => format!("--{}", name),
            })
            .collect()
    }
}

#[derive(Debug, Clone)]
pub struct ToolDriven {
    /// Working directory for the tool.
    pub tool_dir: PathBuf,
    pub program: String,
    pub args: Vec<String>,
    /// Prefix of the argument naming the output directory (`naclsdk_mode=custom:`).
    pub destination_arg: String,
}

#[derive(Debug, Clone)]
pub struct SmokeTest {
    pub file_name: String,
    pub contents: String,
    /// Program and arguments, run in the build directory.
    pub compile: Vec<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_option_args() {
        let recipe = Autotools::new()
            .option("target", "nacl")
            .flag("disable-shared")
            .option("enable-languages", "c,c++");

        assert_eq!(
            recipe.option_args(),
            vec![
                "--disable-shared",
                "--enable-languages=c,c++",
                "--target=nacl"
            ]
        );
        assert_eq!(recipe.install_target, "install");
    }
}
