//! Turns an ordered list of module declarations into the full action tree.
//!
//! Two topologies are assembled side by side under the root `all`:
//!
//! - `shared`: every module installs into one prefix, and that prefix's
//!   `bin` is prepended to `PATH` once.
//! - `split`: every module gets its own prefix and build directory. Each
//!   module's `PATH` holds its own `bin` and those of all modules declared
//!   before it, newest first.
//!
//! On-disk layout under `base_dir`:
//!
//! ```text
//! source/<module>/
//! shared/prefix/
//! shared/build/<module>/
//! shared/install/<module>/
//! split/prefix/<module>/
//! split/build/<module>/
//! ```
//!
//! Sources are unpacked once and shared by both topologies, and so are the
//! per-module install directories.

use std::path::PathBuf;
use std::rc::Rc;

use anyhow::Result;

use crate::action::ActionNode;
use crate::error::BuildError;
use crate::module::{Module, ModuleDirs, Recipe};
use crate::process::{prepend_search_path, CommandRunner, EnvVars};
use crate::source::DirectorySource;

pub const ROOT: &str = "all";
pub const SHARED: &str = "shared";
pub const SPLIT: &str = "split";

/// A module as declared, before directories and environment are assigned.
#[derive(Debug, Clone)]
pub struct ModuleSpec {
    pub name: String,
    pub source: DirectorySource,
    pub recipe: Recipe,
}

impl ModuleSpec {
    pub fn new(name: impl Into<String>, source: DirectorySource, recipe: Recipe) -> Self {
        Self {
            name: name.into(),
            source,
            recipe,
        }
    }
}

/// Directory layout under a build root.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Layout {
    base_dir: PathBuf,
}

impl Layout {
    pub fn new(base_dir: impl Into<PathBuf>) -> Self {
        Self {
            base_dir: base_dir.into(),
        }
    }

    pub fn source_dir(&self, name: &str) -> PathBuf {
        self.base_dir.join("source").join(name)
    }

    pub fn shared_prefix(&self) -> PathBuf {
        self.base_dir.join("shared/prefix")
    }

    pub fn install_dir(&self, name: &str) -> PathBuf {
        self.base_dir.join("shared/install").join(name)
    }

    pub fn shared_dirs(&self, name: &str) -> ModuleDirs {
        ModuleDirs {
            source_dir: self.source_dir(name),
            build_dir: self.base_dir.join("shared/build").join(name),
            prefix: self.shared_prefix(),
            install_dir: self.install_dir(name),
        }
    }

    pub fn split_prefix(&self, name: &str) -> PathBuf {
        self.base_dir.join("split/prefix").join(name)
    }

    pub fn split_dirs(&self, name: &str) -> ModuleDirs {
        ModuleDirs {
            source_dir: self.source_dir(name),
            build_dir: self.base_dir.join("split/build").join(name),
            prefix: self.split_prefix(name),
            install_dir: self.install_dir(name),
        }
    }
}

pub struct PlanAssembler {
    layout: Layout,
    ambient_path: String,
    runner: Rc<dyn CommandRunner>,
}

impl PlanAssembler {
    /// `ambient_path` is the `PATH` every module's search path is built on.
    pub fn new(
        base_dir: impl Into<PathBuf>,
        ambient_path: impl Into<String>,
        runner: Rc<dyn CommandRunner>,
    ) -> Self {
        Self {
            layout: Layout::new(base_dir),
            ambient_path: ambient_path.into(),
            runner,
        }
    }

    pub fn layout(&self) -> &Layout {
        &self.layout
    }

    /// `all` with `shared` and `split` children.
    pub fn assemble(&self, specs: &[ModuleSpec]) -> Result<ActionNode> {
        let mut root = ActionNode::new(ROOT)?;
        root.push(self.topology_node(SHARED, self.shared_modules(specs)?)?)?;
        root.push(self.topology_node(SPLIT, self.split_modules(specs)?)?)?;
        Ok(root)
    }

    /// Modules for the shared-prefix topology.
    pub fn shared_modules(&self, specs: &[ModuleSpec]) -> Result<Vec<Rc<Module>>> {
        check_unique(SHARED, specs)?;
        let path = prepend_search_path(&self.ambient_path, &self.layout.shared_prefix().join("bin"));
        let env = EnvVars::new().with("PATH", path);

        Ok(specs
            .iter()
            .map(|spec| self.module(spec, self.layout.shared_dirs(&spec.name), env.clone()))
            .collect())
    }

    /// Modules for the per-module-prefix topology.
    pub fn split_modules(&self, specs: &[ModuleSpec]) -> Result<Vec<Rc<Module>>> {
        check_unique(SPLIT, specs)?;
        let mut path = self.ambient_path.clone();
        let mut modules = Vec::with_capacity(specs.len());

        for spec in specs {
            path = prepend_search_path(&path, &self.layout.split_prefix(&spec.name).join("bin"));
            let env = EnvVars::new().with("PATH", path.clone());
            modules.push(self.module(spec, self.layout.split_dirs(&spec.name), env));
        }

        Ok(modules)
    }

    fn module(&self, spec: &ModuleSpec, dirs: ModuleDirs, env: EnvVars) -> Rc<Module> {
        Rc::new(Module::new(
            spec.name.clone(),
            spec.source.clone(),
            spec.recipe.clone(),
            dirs,
            env,
            Rc::clone(&self.runner),
        ))
    }

    fn topology_node(&self, name: &str, modules: Vec<Rc<Module>>) -> Result<ActionNode> {
        let mut node = ActionNode::new(name)?;
        for module in &modules {
            node.push(module.actions()?)?;
        }
        Ok(node)
    }
}

fn check_unique(topology: &str, specs: &[ModuleSpec]) -> Result<()> {
    for (i, spec) in specs.iter().enumerate() {
        if specs[..i].iter().any(|earlier| earlier.name == spec.name) {
            return Err(BuildError::DuplicateAction {
                parent: format!("{}/{}", ROOT, topology),
                name: spec.name.clone(),
            }
            .into());
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::{build_error, ErrorKind};
    use crate::log::Log;
    use crate::module::{Autotools, SmokeTest};
    use crate::process::testing::{assignment, RecordingRunner};
    use crate::process::Invocation;
    use std::fs;
    use std::path::Path;
    use tempfile::TempDir;

    fn autotools(name: &str) -> ModuleSpec {
        ModuleSpec::new(
            name,
            DirectorySource::Empty,
            Recipe::Autotools(Autotools::new().make_args(["-j2"])),
        )
    }

    fn assembler(base: &Path, runner: &Rc<RecordingRunner>) -> PlanAssembler {
        let runner: Rc<dyn CommandRunner> = runner.clone();
        PlanAssembler::new(base, "/usr/bin:/bin", runner)
    }

    /// Pretends `make install` writes `bin/shared-tool` naming the module it was built for.
    fn fake_make_install(invocation: &Invocation) -> Result<()> {
        let Some(dest) = assignment(invocation, "DESTDIR") else {
            return Ok(());
        };
        let build_dir = invocation.get_current_dir().unwrap();
        let module = build_dir.file_name().unwrap().to_string_lossy().into_owned();
        let layout_base = build_dir.ancestors().nth(3).unwrap();
        let topology = build_dir.ancestors().nth(2).unwrap().file_name().unwrap();
        let prefix = if topology == "shared" {
            layout_base.join("shared/prefix")
        } else {
            layout_base.join("split/prefix").join(&module)
        };

        let bin = Path::new(dest)
            .join(prefix.strip_prefix("/")?)
            .join("bin");
        fs::create_dir_all(&bin)?;
        fs::write(bin.join("shared-tool"), format!("from {}", module))?;
        Ok(())
    }

    #[test]
    fn test_layout() {
        let layout = Layout::new("/b");

        assert_eq!(
            layout.shared_dirs("binutils"),
            ModuleDirs {
                source_dir: "/b/source/binutils".into(),
                build_dir: "/b/shared/build/binutils".into(),
                prefix: "/b/shared/prefix".into(),
                install_dir: "/b/shared/install/binutils".into(),
            }
        );
        assert_eq!(
            layout.split_dirs("newlib"),
            ModuleDirs {
                source_dir: "/b/source/newlib".into(),
                build_dir: "/b/split/build/newlib".into(),
                prefix: "/b/split/prefix/newlib".into(),
                install_dir: "/b/shared/install/newlib".into(),
            }
        );
    }

    #[test]
    fn test_shared_path_is_prepended_once() {
        let runner = Rc::new(RecordingRunner::new());
        let modules = assembler(Path::new("/b"), &runner)
            .shared_modules(&[autotools("binutils"), autotools("pregcc")])
            .unwrap();

        for module in &modules {
            assert_eq!(
                module.env().get("PATH"),
                Some("/b/shared/prefix/bin:/usr/bin:/bin")
            );
        }
    }

    #[test]
    fn test_split_path_accumulates_in_declaration_order() {
        let runner = Rc::new(RecordingRunner::new());
        let modules = assembler(Path::new("/b"), &runner)
            .split_modules(&[autotools("binutils"), autotools("pregcc"), autotools("newlib")])
            .unwrap();

        let paths: Vec<_> = modules.iter().map(|m| m.env().get("PATH").unwrap()).collect();
        assert_eq!(
            paths,
            vec![
                "/b/split/prefix/binutils/bin:/usr/bin:/bin",
                "/b/split/prefix/pregcc/bin:/b/split/prefix/binutils/bin:/usr/bin:/bin",
                "/b/split/prefix/newlib/bin:/b/split/prefix/pregcc/bin:/b/split/prefix/binutils/bin:/usr/bin:/bin",
            ]
        );
    }

    #[test]
    fn test_empty_ambient_path() {
        let runner: Rc<dyn CommandRunner> = Rc::new(RecordingRunner::new());
        let modules = PlanAssembler::new("/b", "", runner)
            .shared_modules(&[autotools("binutils")])
            .unwrap();

        assert_eq!(modules[0].env().get("PATH"), Some("/b/shared/prefix/bin"));
    }

    #[test]
    fn test_tree_shape() {
        let runner = Rc::new(RecordingRunner::new());
        let tree = assembler(Path::new("/b"), &runner)
            .assemble(&[autotools("binutils"), autotools("pregcc")])
            .unwrap();

        let paths = tree.paths();
        assert_eq!(paths[0], "all");
        assert_eq!(paths[1], "all/shared");
        assert_eq!(paths[2], "all/shared/binutils");
        assert_eq!(paths[3], "all/shared/binutils/unpack");
        assert!(paths.contains(&"all/split/pregcc/install".to_string()));
        // root + 2 topologies + 2 modules * (node + 4 phases) * 2 topologies
        assert_eq!(paths.len(), 1 + 2 + 2 * 5 * 2);
    }

    #[test]
    fn test_duplicate_module_names_rejected() {
        let runner = Rc::new(RecordingRunner::new());
        let err = assembler(Path::new("/b"), &runner)
            .assemble(&[autotools("gcc"), autotools("binutils"), autotools("gcc")])
            .unwrap_err();

        assert_eq!(build_error(&err).map(|e| e.kind()), Some(ErrorKind::Usage));
    }

    #[test]
    fn test_shared_run_last_module_wins() {
        let temp = TempDir::new().unwrap();
        let runner = Rc::new(RecordingRunner::scripted(fake_make_install));
        let plan = assembler(temp.path(), &runner);
        let tree = plan.assemble(&[autotools("x"), autotools("y")]).unwrap();

        tree.run_path("shared", &Log::discard()).unwrap();

        let layout = plan.layout();
        assert_eq!(
            fs::read_to_string(layout.shared_prefix().join("bin/shared-tool")).unwrap(),
            "from y"
        );
        assert_eq!(
            fs::read_to_string(layout.install_dir("x").join("bin/shared-tool")).unwrap(),
            "from x"
        );
        assert!(layout.source_dir("x").is_dir());
        assert!(!temp.path().join("split").exists());

        // configure, make, make install per module
        let programs: Vec<String> = runner.argvs().iter().map(|a| a[0].clone()).collect();
        assert_eq!(programs.len(), 6);
        assert!(programs[0].ends_with("source/x/configure"));
        assert_eq!(programs[1], "make");
    }

    #[test]
    fn test_split_run_installs_per_module_prefix() {
        let temp = TempDir::new().unwrap();
        let runner = Rc::new(RecordingRunner::scripted(fake_make_install));
        let plan = assembler(temp.path(), &runner);
        let tree = plan.assemble(&[autotools("x"), autotools("y")]).unwrap();

        tree.run_path("all/split", &Log::discard()).unwrap();

        let layout = plan.layout();
        for name in ["x", "y"] {
            assert_eq!(
                fs::read_to_string(layout.split_prefix(name).join("bin/shared-tool")).unwrap(),
                format!("from {}", name)
            );
        }
        assert!(!layout.shared_prefix().exists());
    }

    #[test]
    fn test_failing_module_stops_the_topology() {
        let temp = TempDir::new().unwrap();
        let runner = Rc::new(RecordingRunner::scripted(|inv| {
            if inv.argv().iter().any(|a| a == "-j2") {
                anyhow::bail!("make: *** [all] Error 2");
            }
            Ok(())
        }));
        let smoke = ModuleSpec::new(
            "test",
            DirectorySource::Empty,
            Recipe::SmokeTest(SmokeTest {
                file_name: "hellow.c".into(),
                contents: String::new(),
                compile: vec!["nacl-gcc".into()],
            }),
        );
        let tree = assembler(temp.path(), &runner)
            .assemble(&[autotools("binutils"), smoke])
            .unwrap();

        let err = tree.run(&Log::discard()).unwrap_err();

        assert_eq!(err.to_string(), "action 'all/shared/binutils/build' failed");
        assert!(!runner.argvs().iter().any(|a| a[0] == "nacl-gcc"));
    }
}
