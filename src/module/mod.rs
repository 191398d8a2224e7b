//! One buildable toolchain component and its phases.
//!
//! A [`Module`] owns its source, build and install directories and carries an
//! environment snapshot computed by the plan assembler. Its phases run in
//! the order `unpack`, `configure`, `build`, `install`:
//!
//! - `unpack` populates `<source_dir>.temp` and renames it into place, and is
//!   skipped when `source_dir` already exists.
//! - `configure` and `build` always re-run.
//! - `install` goes through a [`StagingInstaller`] destdir capture.

mod recipe;

pub use recipe::{Autotools, Recipe, SmokeTest, ToolDriven};

use std::fs;
use std::path::{Path, PathBuf};
use std::rc::Rc;

use anyhow::{bail, Context, Result};

use crate::action::ActionNode;
use crate::error::BuildError;
use crate::log::Log;
use crate::process::{CommandRunner, EnvVars, Invocation};
use crate::source::DirectorySource;
use crate::staging::filesystem::{remove_tree, sibling_with_suffix};
use crate::staging::StagingInstaller;

const UNPACK_SUFFIX: &str = ".temp";

/// Leaf names of a module's node, in execution order.
pub const PHASES: [&str; 4] = ["unpack", "configure", "build", "install"];

/// Directories a module works in.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ModuleDirs {
    pub source_dir: PathBuf,
    pub build_dir: PathBuf,
    /// Absolute; may be shared with other modules.
    pub prefix: PathBuf,
    pub install_dir: PathBuf,
}

pub struct Module {
    name: String,
    source: DirectorySource,
    recipe: Recipe,
    dirs: ModuleDirs,
    env: EnvVars,
    runner: Rc<dyn CommandRunner>,
}

impl Module {
    pub fn new(
        name: impl Into<String>,
        source: DirectorySource,
        recipe: Recipe,
        dirs: ModuleDirs,
        env: EnvVars,
        runner: Rc<dyn CommandRunner>,
    ) -> Self {
        Self {
            name: name.into(),
            source,
            recipe,
            dirs,
            env,
            runner,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn dirs(&self) -> &ModuleDirs {
        &self.dirs
    }

    pub fn env(&self) -> &EnvVars {
        &self.env
    }

    /// Populate `source_dir` unless it already exists.
    pub fn unpack(&self, log: &Log) -> Result<()> {
        let source_dir = &self.dirs.source_dir;
        if source_dir.exists() {
            log.line(format_args!(
                "[{}] source '{}' already present, skipping unpack",
                self.name,
                source_dir.display()
            ));
            return Ok(());
        }

        let temp_dir = sibling_with_suffix(source_dir, UNPACK_SUFFIX);
        if fs::symlink_metadata(&temp_dir).is_ok() {
            log.line(format_args!(
                "[{}] removing stale unpack directory '{}'",
                self.name,
                temp_dir.display()
            ));
            remove_tree(&temp_dir)?;
        }
        fs::create_dir_all(&temp_dir)
            .with_context(|| format!("creating '{}'", temp_dir.display()))?;

        self.source
            .populate(&*self.runner, &temp_dir)
            .with_context(|| format!("populating '{}'", temp_dir.display()))?;

        fs::rename(&temp_dir, source_dir).with_context(|| {
            format!(
                "renaming '{}' to '{}'",
                temp_dir.display(),
                source_dir.display()
            )
        })
    }

    pub fn configure(&self, _log: &Log) -> Result<()> {
        let Recipe::Autotools(recipe) = &self.recipe else {
            return Ok(());
        };

        for pre in &recipe.pre_configure {
            let invocation = pre
                .clone()
                .current_dir(&self.dirs.source_dir)
                .envs(&self.env);
            self.runner
                .run(&invocation)
                .with_context(|| format!("preparing source tree for {}", self.name))?;
        }

        self.create_build_dir()?;

        let mut tool_args = Vec::new();
        for (option, tool) in &recipe.tool_options {
            let path = self.resolve_tool(tool)?;
            tool_args.push(format!("--{}={}", option, path.display()));
        }

        let configure = Invocation::new(self.dirs.source_dir.join("configure"))
            .arg(format!("--prefix={}", self.dirs.prefix.display()))
            .args(recipe.option_args())
            .args(tool_args)
            .current_dir(&self.dirs.build_dir)
            .envs(&self.env)
            .envs(&recipe.configure_env);
        self.runner
            .run(&configure)
            .with_context(|| format!("configuring {}", self.name))
    }

    pub fn build(&self, _log: &Log) -> Result<()> {
        match &self.recipe {
            Recipe::Autotools(recipe) => {
                let make = Invocation::new("make")
                    .args(&recipe.make_args)
                    .current_dir(&self.dirs.build_dir)
                    .envs(&self.env);
                self.runner
                    .run(&make)
                    .with_context(|| format!("building {}", self.name))
            }
            Recipe::SmokeTest(test) => {
                let Some((program, args)) = test.compile.split_first() else {
                    bail!("smoke test {} has no compile command", self.name);
                };
                self.create_build_dir()?;
                let source = self.dirs.build_dir.join(&test.file_name);
                fs::write(&source, &test.contents)
                    .with_context(|| format!("writing '{}'", source.display()))?;

                let compile = Invocation::new(program)
                    .args(args)
                    .current_dir(&self.dirs.build_dir)
                    .envs(&self.env);
                self.runner
                    .run(&compile)
                    .with_context(|| format!("compiling '{}'", source.display()))
            }
            Recipe::ToolDriven(_) => Ok(()),
        }
    }

    pub fn install(&self, _log: &Log) -> Result<()> {
        let installer = StagingInstaller::new(&self.dirs.prefix, &self.dirs.install_dir)?;

        let result = match &self.recipe {
            Recipe::Autotools(recipe) => installer.install(|root| {
                let make = Invocation::new("make")
                    .arg(&recipe.install_target)
                    .arg(format!("DESTDIR={}", root.display()))
                    .current_dir(&self.dirs.build_dir)
                    .envs(&self.env);
                self.runner.run(&make)
            }),
            Recipe::ToolDriven(tool) => {
                self.create_build_dir()?;
                installer.install(|root| {
                    let destination = installer.staged_prefix(root);
                    let invocation = Invocation::new(&tool.program)
                        .args(&tool.args)
                        .arg(format!("{}{}", tool.destination_arg, destination.display()))
                        .current_dir(&tool.tool_dir)
                        .envs(&self.env);
                    self.runner.run(&invocation)
                })
            }
            Recipe::SmokeTest(_) => Ok(()),
        };
        result.with_context(|| format!("installing {}", self.name))
    }

    /// This module's node: one leaf per phase.
    pub fn actions(self: &Rc<Self>) -> Result<ActionNode> {
        let mut node = ActionNode::new(self.name.clone())?;

        let module = Rc::clone(self);
        node.leaf(PHASES[0], move |log| module.unpack(log))?;
        let module = Rc::clone(self);
        node.leaf(PHASES[1], move |log| module.configure(log))?;
        let module = Rc::clone(self);
        node.leaf(PHASES[2], move |log| module.build(log))?;
        let module = Rc::clone(self);
        node.leaf(PHASES[3], move |log| module.install(log))?;

        Ok(node)
    }

    fn create_build_dir(&self) -> Result<()> {
        fs::create_dir_all(&self.dirs.build_dir)
            .with_context(|| format!("creating '{}'", self.dirs.build_dir.display()))
    }

    /// Absolute path of `tool` on this module's `PATH`.
    fn resolve_tool(&self, tool: &str) -> Result<PathBuf> {
        let search = self.env.get("PATH").unwrap_or_default();
        which::which_in(tool, Some(search), cwd_or_root()).map_err(|_| {
            anyhow::Error::from(BuildError::ToolNotFound {
                name: tool.to_string(),
                path: search.to_string(),
            })
        })
    }
}

fn cwd_or_root() -> PathBuf {
    std::env::current_dir().unwrap_or_else(|_| Path::new("/").to_path_buf())
}
