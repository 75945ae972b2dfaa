use async_trait::async_trait;
use rhdh_deployer::{
    command::{CommandRunner, CommandSpec},
    model::Error,
};
use std::sync::Mutex;

use super::Journal;

/// Records every command instead of running it
#[derive(Default)]
pub(crate) struct MockCommandRunner {
    journal: Journal,
    commands: Mutex<Vec<String>>,
    /// Commands containing the first element print the second
    outputs: Vec<(String, String)>,
    /// Commands containing any of these fail
    failures: Vec<String>,
}

impl MockCommandRunner {
    pub(crate) fn new(journal: &Journal) -> Self {
        MockCommandRunner {
            journal: journal.clone(),
            ..MockCommandRunner::default()
        }
    }

    pub(crate) fn with_output(mut self, pattern: &str, output: &str) -> Self {
        self.outputs.push((pattern.to_owned(), output.to_owned()));
        self
    }

    pub(crate) fn failing_on(mut self, pattern: &str) -> Self {
        self.failures.push(pattern.to_owned());
        self
    }

    pub(crate) fn commands(&self) -> Vec<String> {
        self.commands.lock().unwrap().clone()
    }
}

#[async_trait]
impl CommandRunner for MockCommandRunner {
    async fn run(&self, command: &CommandSpec) -> Result<String, Error> {
        let rendered = command.to_string();
        self.commands.lock().unwrap().push(rendered.clone());
        self.journal.record(format!("run {rendered}"));
        if self.failures.iter().any(|pattern| rendered.contains(pattern.as_str())) {
            return Err(Error::CommandError(format!("`{rendered}` exited with exit status: 1")));
        }
        let output = self
            .outputs
            .iter()
            .find(|(pattern, _)| rendered.contains(pattern.as_str()))
            .map(|(_, output)| output.clone())
            .unwrap_or_default();
        Ok(output)
    }
}
