use async_trait::async_trait;
use std::fmt::{Display, Formatter};
use tracing::{debug, info};

use crate::model::Error;

/// A single external program invocation
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommandSpec {
    pub program: String,
    pub args: Vec<String>,
}

impl CommandSpec {
    pub fn new(program: &str) -> Self {
        CommandSpec {
            program: program.to_owned(),
            args: Vec::new(),
        }
    }

    /// Runs `script` through `bash -c`
    pub fn shell(script: &str) -> Self {
        CommandSpec::new("bash").arg("-c").arg(script)
    }

    pub fn arg(mut self, arg: impl Into<String>) -> Self {
        self.args.push(arg.into());
        self
    }

    pub fn args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.args.extend(args.into_iter().map(Into::into));
        self
    }
}

impl Display for CommandSpec {
    fn fmt(&self, f: &mut Formatter) -> std::fmt::Result {
        write!(f, "{}", self.program)?;
        for arg in &self.args {
            write!(f, " {arg}")?;
        }
        Ok(())
    }
}

/// Executes the `helm`, `oc` and shell invocations a rollout needs
#[async_trait]
pub trait CommandRunner: Send + Sync {
    /// Runs the command to completion and returns its standard output.
    /// A non-zero exit status is reported as [`Error::CommandError`].
    async fn run(&self, command: &CommandSpec) -> Result<String, Error>;
}

#[derive(Debug, Clone, Default)]
pub struct ProcessRunner;

#[async_trait]
impl CommandRunner for ProcessRunner {
    async fn run(&self, command: &CommandSpec) -> Result<String, Error> {
        info!("Running `{command}`");
        let output = tokio::process::Command::new(&command.program)
            .args(&command.args)
            .output()
            .await
            .map_err(|error| Error::CommandError(format!("could not start `{}`: {error}", command.program)))?;

        let stdout = String::from_utf8_lossy(&output.stdout).into_owned();
        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(Error::CommandError(format!("`{command}` exited with {}: {}", output.status, stderr.trim())));
        }
        for line in stdout.lines() {
            debug!("{}: {line}", command.program);
        }
        Ok(stdout)
    }
}
