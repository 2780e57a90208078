//! Scripted [`ProcessRunner`] for tests across the workspace.
//!
//! Enabled with the `test-util` feature. Responses are matched by command-line
//! prefix; unmatched invocations succeed with empty output.

use std::collections::HashSet;
use std::sync::Mutex;

use async_trait::async_trait;

use crate::error::ProcessError;
use crate::process::{Invocation, ProcessOutput, ProcessRunner};

#[derive(Default)]
pub struct RecordingRunner {
    calls: Mutex<Vec<Invocation>>,
    responses: Mutex<Vec<(String, ProcessOutput)>>,
    programs: Mutex<HashSet<String>>,
}

impl RecordingRunner {
    pub fn new() -> Self {
        Self::default()
    }

    /// Reply with `output` to every invocation whose command line starts with `prefix`.
    /// Later registrations win.
    pub fn respond(&self, prefix: &str, output: ProcessOutput) -> &Self {
        self.responses
            .lock()
            .expect("responses lock")
            .push((prefix.to_string(), output));
        self
    }

    /// Make [`ProcessRunner::exists`] report `program` as installed.
    pub fn with_program(&self, program: &str) -> &Self {
        self.programs
            .lock()
            .expect("programs lock")
            .insert(program.to_string());
        self
    }

    pub fn calls(&self) -> Vec<Invocation> {
        self.calls.lock().expect("calls lock").clone()
    }

    /// Command lines of every recorded invocation, in order.
    pub fn command_lines(&self) -> Vec<String> {
        self.calls().iter().map(Invocation::command_line).collect()
    }

    /// Number of recorded invocations whose command line starts with `prefix`.
    pub fn count(&self, prefix: &str) -> usize {
        self.command_lines()
            .iter()
            .filter(|line| line.starts_with(prefix))
            .count()
    }

    fn reply(&self, invocation: &Invocation) -> ProcessOutput {
        self.calls
            .lock()
            .expect("calls lock")
            .push(invocation.clone());
        let line = invocation.command_line();
        self.responses
            .lock()
            .expect("responses lock")
            .iter()
            .rev()
            .find(|(prefix, _)| line.starts_with(prefix.as_str()))
            .map(|(_, output)| output.clone())
            .unwrap_or_else(|| ProcessOutput::ok(""))
    }
}

#[async_trait]
impl ProcessRunner for RecordingRunner {
    async fn run(&self, invocation: &Invocation) -> Result<ProcessOutput, ProcessError> {
        Ok(self.reply(invocation))
    }

    async fn run_quiet(&self, invocation: &Invocation) -> Result<ProcessOutput, ProcessError> {
        Ok(self.reply(invocation))
    }

    fn exists(&self, program: &str) -> bool {
        self.programs
            .lock()
            .expect("programs lock")
            .contains(program)
    }
}
