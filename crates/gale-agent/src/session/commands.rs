//! Handlers for the built-in build commands.

use std::collections::HashSet;
use std::path::PathBuf;

use gale_protocol::{commands, BuildCommand, BuildResult};
use tracing::warn;

use crate::console::DEFAULT_MASK;
use crate::executor::{self, ExecRequest};
use crate::nunit;
use crate::AgentError;

use super::BuildSession;

impl BuildSession {
    /// Execute children in order, gating each by its own `runIf`. An `end`
    /// child stops the iteration.
    pub(crate) async fn compose(&mut self, cmd: &BuildCommand) -> crate::Result<bool> {
        for child in &cmd.children {
            if child.is(commands::END) {
                break;
            }
            self.process(child).await;
        }
        // Child failures already folded into the running status.
        Ok(true)
    }

    /// Print each argument on its own line.
    pub(crate) async fn echo(&mut self, cmd: &BuildCommand) -> crate::Result<bool> {
        for arg in &cmd.args {
            self.console.write(arg);
        }
        Ok(true)
    }

    /// `(name, value, secure)` layers a variable on the OS environment for
    /// subsequent subprocesses; `(name)` alone exports the agent's current
    /// OS value. Secure values are masked in the console line.
    pub(crate) async fn export(&mut self, cmd: &BuildCommand) -> crate::Result<bool> {
        let Some(name) = cmd.args.first() else {
            return Ok(true);
        };

        let (value, secure) = match cmd.args.len() {
            1 => (std::env::var(name).unwrap_or_default(), false),
            _ => (
                cmd.args[1].clone(),
                cmd.args.get(2).is_some_and(|s| s == "true"),
            ),
        };

        let displayed = if secure { DEFAULT_MASK } else { value.as_str() };
        let line = if self.ctx.env.contains_key(name) {
            format!("overriding environment variable '{name}' with value '{displayed}'")
        } else {
            format!("setting environment variable '{name}' to value '{displayed}'")
        };
        self.console.write(&line);

        self.ctx.env.insert(name.clone(), value);
        Ok(true)
    }

    /// Run `args[0]` as a subprocess with the remaining args.
    pub(crate) async fn exec(&mut self, cmd: &BuildCommand) -> crate::Result<bool> {
        let Some(program) = cmd.args.first() else {
            return Err(AgentError::Build("exec requires a program".to_string()));
        };

        let request = ExecRequest {
            program,
            args: &cmd.args[1..],
            env: &self.ctx.env,
            working_dir: &self.ctx.wd,
        };
        let success = executor::run(request, &self.console, &self.cancel).await?;
        Ok(success)
    }

    /// Create a directory and its parents; succeeds if it already exists.
    pub(crate) async fn mkdirs(&mut self, cmd: &BuildCommand) -> crate::Result<bool> {
        let Some(path) = cmd.args.first() else {
            return Ok(true);
        };
        tokio::fs::create_dir_all(self.ctx.wd.join(path)).await?;
        Ok(true)
    }

    /// Remove every direct child of the working directory whose name is not
    /// in the allow-list. An allowed child's subtree is preserved intact.
    pub(crate) async fn cleandir(&mut self, cmd: &BuildCommand) -> crate::Result<bool> {
        let keep: HashSet<&str> = cmd.args.iter().map(String::as_str).collect();

        let mut entries = tokio::fs::read_dir(&self.ctx.wd).await?;
        while let Some(entry) = entries.next_entry().await? {
            let name = entry.file_name();
            if keep.contains(name.to_string_lossy().as_ref()) {
                continue;
            }
            let path = entry.path();
            if entry.file_type().await?.is_dir() {
                tokio::fs::remove_dir_all(&path).await?;
            } else {
                tokio::fs::remove_file(&path).await?;
            }
        }
        Ok(true)
    }

    /// Print `ERROR: <message>` and mark the build failed.
    pub(crate) async fn fail(&mut self, cmd: &BuildCommand) -> crate::Result<bool> {
        let message = cmd.args.first().map(String::as_str).unwrap_or_default();
        self.console.write(&format!("ERROR: {message}"));
        Ok(false)
    }

    /// Register a secret for console masking; the mask defaults to
    /// `********`.
    pub(crate) async fn secret(&mut self, cmd: &BuildCommand) -> crate::Result<bool> {
        let Some(plain) = cmd.args.first() else {
            return Ok(true);
        };
        let mask = cmd.args.get(1).map(String::as_str).unwrap_or("");
        self.console.add_secret(plain, mask);
        Ok(true)
    }

    /// Resolve `args[0]` as a glob under the working directory and upload
    /// every match rooted at the destination prefix `args[1]`.
    pub(crate) async fn upload_artifact(&mut self, cmd: &BuildCommand) -> crate::Result<bool> {
        let Some(source) = cmd.args.first() else {
            return Ok(true);
        };
        let destination = cmd.args.get(1).cloned().unwrap_or_default();

        let pattern = self.ctx.wd.join(source);
        let matches: Vec<PathBuf> = glob::glob(&pattern.to_string_lossy())
            .map_err(|e| AgentError::Build(format!("invalid artifact pattern '{source}': {e}")))?
            .filter_map(|m| m.ok())
            .collect();
        if matches.is_empty() {
            return Err(AgentError::Build(format!(
                "no artifact files matched '{source}'"
            )));
        }

        let target = if destination.is_empty() {
            "[defaultRoot]".to_string()
        } else {
            destination.clone()
        };
        for path in matches {
            self.console.write(&format!(
                "Uploading artifacts from {} to {target}",
                path.display()
            ));
            self.artifacts.upload(&path, &destination).await?;
        }
        Ok(true)
    }

    /// Fetch one artifact file from the server into the working directory.
    pub(crate) async fn download_artifact(&mut self, cmd: &BuildCommand) -> crate::Result<bool> {
        let Some(source) = cmd.args.first() else {
            return Ok(true);
        };
        let destination = cmd.args.get(1).map(String::as_str).unwrap_or(source);
        self.artifacts
            .download(source, &self.ctx.wd.join(destination))
            .await?;
        Ok(true)
    }

    /// Parse NUnit report files matched under the working directory, merge
    /// them into the job's running totals, and print a summary line.
    pub(crate) async fn generate_test_report(&mut self, cmd: &BuildCommand) -> crate::Result<bool> {
        if cmd.args.is_empty() {
            return Ok(true);
        }

        for pattern in &cmd.args {
            let full = self.ctx.wd.join(pattern);
            let paths = match glob::glob(&full.to_string_lossy()) {
                Ok(paths) => paths,
                Err(e) => {
                    warn!("invalid test report pattern '{pattern}': {e}");
                    continue;
                }
            };
            for path in paths.filter_map(|p| p.ok()) {
                if !path.is_file() {
                    continue;
                }
                match nunit::read(&path) {
                    Ok(report) => self.test_totals.merge(&report),
                    Err(e) => warn!("skipping unreadable test report {path:?}: {e}"),
                }
            }
        }

        let summary = self.test_totals.summary();
        self.console.write(&summary);
        Ok(true)
    }

    /// Terminal marker; `compose` stops before dispatching it.
    pub(crate) async fn end(&mut self, _cmd: &BuildCommand) -> crate::Result<bool> {
        Ok(true)
    }

    /// Wrapper whose success is its nested command's outcome; used inside
    /// `test` predicate evaluation.
    pub(crate) async fn test(&mut self, cmd: &BuildCommand) -> crate::Result<bool> {
        let Some(inner) = cmd.children.first() else {
            return Ok(true);
        };
        let saved = self.ctx.running;
        self.ctx.running = BuildResult::Passed;
        self.process(inner).await;
        let truthy = self.ctx.running == BuildResult::Passed;
        self.ctx.running = saved;
        Ok(truthy)
    }
}
