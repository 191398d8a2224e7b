use std::rc::Rc;

use anyhow::{bail, Context, Result};
use toolchain_builder::catalog::{toolchain_modules, ToolchainInputs};
use toolchain_builder::preflight::check_host_tools;
use toolchain_builder::{
    build_error, ActionNode, BuildError, BuildLock, CommandRunner, Config, HostRunner, Log,
    PlanAssembler, VerboseRunner,
};

fn usage() -> &'static str {
    "Usage:\n  toolchain-builder [run]            build everything\n  toolchain-builder [run] <path>     build one sub-tree, e.g. shared/binutils/configure\n  toolchain-builder list [--json]    show the action tree\n  toolchain-builder help"
}

fn main() -> Result<()> {
    let args: Vec<String> = std::env::args().skip(1).collect();

    match args.as_slice() {
        [] => run(""),
        [run_cmd] if run_cmd == "run" => run(""),
        [run_cmd, path] if run_cmd == "run" => run(path),
        [list_cmd] if list_cmd == "list" => list(false),
        [list_cmd, json] if list_cmd == "list" && json == "--json" => list(true),
        [help] if matches!(help.as_str(), "help" | "--help" | "-h") => {
            println!("{}", usage());
            Ok(())
        }
        [path] if !path.starts_with('-') => run(path),
        _ => bail!(usage()),
    }
}

fn load_plan(log: &Log) -> Result<(Config, ActionNode)> {
    let cwd = std::env::current_dir().context("resolving current directory")?;
    let config = Config::load(&cwd)?;
    let specs = toolchain_modules(&ToolchainInputs::from_config(&config))
        .context("resolving toolchain inputs")?;

    let ambient_path = std::env::var("PATH").unwrap_or_default();
    let runner: Rc<dyn CommandRunner> = Rc::new(VerboseRunner::new(HostRunner, log.clone()));
    let tree = PlanAssembler::new(config.base_dir.clone(), ambient_path, runner).assemble(&specs)?;
    Ok((config, tree))
}

fn list(json: bool) -> Result<()> {
    let (_, tree) = load_plan(&Log::discard())?;
    if json {
        let paths = serde_json::to_string_pretty(&tree.paths()).context("encoding action paths")?;
        println!("{}", paths);
    } else {
        print!("{}", tree.render_tree());
    }
    Ok(())
}

fn run(path: &str) -> Result<()> {
    let log = Log::stderr();
    let (config, tree) = load_plan(&log)?;
    if !tree.contains(path) {
        return Err(BuildError::UnknownAction {
            path: path.to_string(),
        }
        .into());
    }

    check_host_tools()?;
    let lock = BuildLock::acquire(&config.lock_path())?;
    log.line(format_args!(
        "locked build root '{}' ({})",
        config.base_dir.display(),
        lock.path().display()
    ));

    let target = if path.is_empty() { tree.name() } else { path };
    log.line(format_args!("running '{}'", target));

    match tree.run_path(path, &log) {
        Ok(()) => {
            log.line(format_args!("'{}' complete", target));
            Ok(())
        }
        Err(err) => {
            if let Some(kind) = build_error(&err).map(BuildError::kind) {
                log.line(format_args!("'{}' stopped: {}", target, kind));
            }
            Err(err)
        }
    }
}
