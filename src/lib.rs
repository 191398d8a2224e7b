//! Staged, resumable builds of a cross toolchain from third-party source archives.
//!
//! The build is a tree of named actions. Each toolchain component is a
//! [`module::Module`] contributing four leaves (`unpack`, `configure`,
//! `build`, `install`), and the [`plan::PlanAssembler`] lays the modules
//! out twice: once sharing a single install prefix and once with a prefix
//! per module.
//!
//! # Architecture
//!
//! ```text
//! catalog ──> plan ──> action tree ("all/shared/binutils/configure")
//!               │
//!               └── module ──┬── source   (archive extraction, layering, patching)
//!                            ├── staging  (destdir capture, promotion, union copy)
//!                            └── process  (every external command)
//! ```
//!
//! Nothing above [`process`] spawns processes itself, so the whole engine can
//! be driven by a recording runner in tests.
//!
//! # Example
//!
//! ```rust,ignore
//! use std::rc::Rc;
//! use toolchain_builder::catalog::{toolchain_modules, ToolchainInputs};
//! use toolchain_builder::{Config, HostRunner, Log, PlanAssembler};
//!
//! let config = Config::load(&std::env::current_dir()?)?;
//! let specs = toolchain_modules(&ToolchainInputs::from_config(&config))?;
//! let tree = PlanAssembler::new(&config.base_dir, "/usr/bin:/bin", Rc::new(HostRunner))
//!     .assemble(&specs)?;
//! tree.run_path("shared/binutils", &Log::stderr())?;
//! ```

pub mod action;
pub mod catalog;
pub mod config;
pub mod error;
pub mod lock;
pub mod log;
pub mod module;
pub mod plan;
pub mod preflight;
pub mod process;
pub mod source;
pub mod staging;

pub use action::{Action, ActionItem, ActionNode, ActionState};
pub use config::Config;
pub use error::{build_error, BuildError, ErrorKind};
pub use lock::BuildLock;
pub use log::Log;
pub use module::{Module, ModuleDirs, Recipe};
pub use plan::{Layout, ModuleSpec, PlanAssembler};
pub use process::{CommandRunner, EnvVars, HostRunner, Invocation, VerboseRunner};
pub use source::{DirectorySource, InputSearchPath};
pub use staging::{install_destdir, StagingInstaller};
