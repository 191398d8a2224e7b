//! External command execution.
//!
//! Every process this crate starts goes through a [`CommandRunner`]. An
//! [`Invocation`] is a structured argument list (no shell in between), an
//! optional working directory and a set of environment overrides.
//!
//! Runners compose by wrapping: [`VerboseRunner`] logs each invocation and
//! then delegates to the runner it wraps.
//!
//! ```rust,ignore
//! use toolchain_builder::process::{HostRunner, Invocation, VerboseRunner, CommandRunner};
//!
//! let runner = VerboseRunner::new(HostRunner, log.clone());
//! runner.run(&Invocation::new("make").arg("-j4").current_dir(&build_dir))?;
//! ```

mod env;

pub use env::{prepend_search_path, EnvVars};

use std::ffi::{OsStr, OsString};
use std::fmt;
use std::path::{Path, PathBuf};
use std::process::{Command, Stdio};
use std::rc::Rc;

use anyhow::{Context, Result};

use crate::error::BuildError;
use crate::log::Log;

/// One external program run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Invocation {
    program: OsString,
    args: Vec<OsString>,
    cwd: Option<PathBuf>,
    env: EnvVars,
}

impl Invocation {
    pub fn new(program: impl AsRef<OsStr>) -> Self {
        Self {
            program: program.as_ref().to_os_string(),
            args: Vec::new(),
            cwd: None,
            env: EnvVars::new(),
        }
    }

    pub fn arg(mut self, arg: impl AsRef<OsStr>) -> Self {
        self.args.push(arg.as_ref().to_os_string());
        self
    }

    pub fn args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<OsStr>,
    {
        self.args
            .extend(args.into_iter().map(|a| a.as_ref().to_os_string()));
        self
    }

    pub fn current_dir(mut self, dir: impl AsRef<Path>) -> Self {
        self.cwd = Some(dir.as_ref().to_path_buf());
        self
    }

    pub fn env(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.env.set(key, value);
        self
    }

    pub fn envs(mut self, vars: &EnvVars) -> Self {
        self.env = self.env.merged(vars);
        self
    }

    pub fn program(&self) -> &OsStr {
        &self.program
    }

    pub fn get_args(&self) -> &[OsString] {
        &self.args
    }

    pub fn get_current_dir(&self) -> Option<&Path> {
        self.cwd.as_deref()
    }

    pub fn get_env(&self) -> &EnvVars {
        &self.env
    }

    /// Program followed by its arguments, lossily converted for matching in tests and logs.
    pub fn argv(&self) -> Vec<String> {
        std::iter::once(&self.program)
            .chain(self.args.iter())
            .map(|a| a.to_string_lossy().into_owned())
            .collect()
    }
}

impl fmt::Display for Invocation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if let Some(dir) = &self.cwd {
            write!(f, "cd {} && ", quote(&dir.display().to_string()))?;
        }
        for (key, value) in self.env.iter() {
            write!(f, "{}={} ", key, quote(value))?;
        }
        let argv = self.argv();
        let quoted: Vec<_> = argv.iter().map(|a| quote(a)).collect();
        write!(f, "{}", quoted.join(" "))
    }
}

fn quote(arg: &str) -> String {
    if !arg.is_empty()
        && arg
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || "-_./=:,+@%".contains(c))
    {
        arg.to_string()
    } else {
        format!("'{}'", arg.replace('\'', r"'\''"))
    }
}

/// Runs external programs; fails if the program cannot start or exits non-zero.
pub trait CommandRunner {
    fn run(&self, invocation: &Invocation) -> Result<()>;
}

impl<R: CommandRunner + ?Sized> CommandRunner for &R {
    fn run(&self, invocation: &Invocation) -> Result<()> {
        (**self).run(invocation)
    }
}

impl<R: CommandRunner + ?Sized> CommandRunner for Box<R> {
    fn run(&self, invocation: &Invocation) -> Result<()> {
        (**self).run(invocation)
    }
}

impl<R: CommandRunner + ?Sized> CommandRunner for Rc<R> {
    fn run(&self, invocation: &Invocation) -> Result<()> {
        (**self).run(invocation)
    }
}

/// Spawns processes on the host, inheriting stdout/stderr.
#[derive(Debug, Clone, Copy, Default)]
pub struct HostRunner;

impl CommandRunner for HostRunner {
    fn run(&self, invocation: &Invocation) -> Result<()> {
        let mut cmd = Command::new(&invocation.program);
        cmd.args(&invocation.args)
            .stdin(Stdio::null())
            .stdout(Stdio::inherit())
            .stderr(Stdio::inherit());
        if let Some(dir) = &invocation.cwd {
            cmd.current_dir(dir);
        }
        for (key, value) in invocation.env.iter() {
            cmd.env(key, value);
        }

        let status = cmd
            .status()
            .with_context(|| format!("starting '{}'", invocation))?;

        if !status.success() {
            return Err(BuildError::CommandFailed {
                command: invocation.to_string(),
                status: status.to_string(),
            }
            .into());
        }
        Ok(())
    }
}

/// Logs each invocation before handing it to the wrapped runner.
pub struct VerboseRunner<R> {
    inner: R,
    log: Log,
}

impl<R: CommandRunner> VerboseRunner<R> {
    pub fn new(inner: R, log: Log) -> Self {
        Self { inner, log }
    }
}

impl<R: CommandRunner> CommandRunner for VerboseRunner<R> {
    fn run(&self, invocation: &Invocation) -> Result<()> {
        self.log.line(format_args!("$ {}", invocation));
        self.inner.run(invocation)
    }
}


#[cfg(test)]
mod tests {
    use super::testing::*;
    use super::*;
    use crate::error::{build_error, ErrorKind};
    use std::fs;
    use tempfile::TempDir;

    #[test]
    fn test_invocation_display_quotes_arguments() {
        let inv = Invocation::new("make")
            .args(["install", "DESTDIR=/tmp/x y"])
            .current_dir("/build")
            .env("CFLAGS", "-O2 -g");

        assert_eq!(
            inv.to_string(),
            "cd /build && CFLAGS='-O2 -g' make install 'DESTDIR=/tmp/x y'"
        );
    }

    #[test]
    fn test_host_runner_success_and_cwd() {
        if !host_has("sh") {
            return;
        }
        let temp = TempDir::new().unwrap();
        let inv = Invocation::new("sh")
            .args(["-c", "printf '%s' \"$GREETING\" > out.txt"])
            .current_dir(temp.path())
            .env("GREETING", "hello");

        HostRunner.run(&inv).unwrap();

        assert_eq!(
            fs::read_to_string(temp.path().join("out.txt")).unwrap(),
            "hello"
        );
    }

    #[test]
    fn test_host_runner_reports_exit_status() {
        if !host_has("sh") {
            return;
        }
        let err = HostRunner
            .run(&Invocation::new("sh").args(["-c", "exit 3"]))
            .unwrap_err();

        let typed = build_error(&err).expect("typed error");
        assert_eq!(typed.kind(), ErrorKind::ExternalCommandFailure);
        assert!(err.to_string().contains("sh -c"));
    }

    #[test]
    fn test_host_runner_missing_program() {
        let result = HostRunner.run(&Invocation::new("definitely_not_a_real_command_12345"));
        assert!(result.is_err());
    }

    #[test]
    fn test_verbose_runner_logs_then_delegates() {
        let (log, buffer) = Log::buffer();
        let inner = RecordingRunner::new();
        let runner = VerboseRunner::new(&inner, log);

        runner
            .run(&Invocation::new("tar").args(["-xf", "a.tar"]))
            .unwrap();

        assert_eq!(buffer.lines(), vec!["[build] $ tar -xf a.tar"]);
        assert_eq!(inner.argvs(), vec![vec!["tar", "-xf", "a.tar"]]);
    }
}
