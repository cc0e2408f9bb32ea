//! Command execution seam
//!
//! The dispatcher runs each task's work unit through [`CommandRunner`], a
//! narrow "run command, stream output, return exit code" interface. Tests
//! substitute fake runners that return scripted exit codes without spawning
//! processes; a deadline-aware wrapper is the intended extension point for
//! task timeouts, which the dispatcher itself does not enforce.

use futures_util::future::BoxFuture;
use std::path::Path;
use std::process::Stdio;
use std::sync::Arc;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::process::Command;

use crate::plan::ParsedTask;

/// Callback receiving streamed log lines during dispatch
pub type LogSink = Arc<dyn Fn(&str) + Send + Sync>;

/// Send one line to the sink
pub(crate) fn emit(sink: &LogSink, line: &str) {
    (**sink)(line)
}

/// Runs one task's command inside its workspace
pub trait CommandRunner: Send + Sync {
    /// Execute the work unit for `task` with `cwd` as working directory,
    /// streaming output lines to `sink`. Resolves to the process exit code.
    fn run<'a>(
        &'a self,
        task: &'a ParsedTask,
        cwd: &'a Path,
        sink: &'a LogSink,
    ) -> BoxFuture<'a, std::io::Result<i32>>;
}

/// Spawns an external command per task via tokio, piping stdout and stderr
/// line by line into the log sink.
///
/// The task's identity is exposed to the command through the
/// `DISPATCH_TASK_ID` and `DISPATCH_TASK_TITLE` environment variables.
pub struct ProcessRunner {
    program: String,
    args: Vec<String>,
}

impl ProcessRunner {
    pub fn new<S: Into<String>>(program: S, args: Vec<String>) -> Self {
        Self {
            program: program.into(),
            args,
        }
    }
}

impl CommandRunner for ProcessRunner {
    fn run<'a>(
        &'a self,
        task: &'a ParsedTask,
        cwd: &'a Path,
        sink: &'a LogSink,
    ) -> BoxFuture<'a, std::io::Result<i32>> {
        Box::pin(async move {
            emit(sink, &format!("[Task {}] Executing: {}", task.id, task.title));

            let mut child = Command::new(&self.program)
                .args(&self.args)
                .current_dir(cwd)
                .env("DISPATCH_TASK_ID", &task.id)
                .env("DISPATCH_TASK_TITLE", &task.title)
                .stdin(Stdio::null())
                .stdout(Stdio::piped())
                .stderr(Stdio::piped())
                .spawn()?;

            let stdout_reader = child.stdout.take().map(|out| {
                let sink = Arc::clone(sink);
                let task_id = task.id.clone();
                tokio::spawn(async move {
                    let mut lines = BufReader::new(out).lines();
                    while let Ok(Some(line)) = lines.next_line().await {
                        emit(&sink, &format!("  [{}] {}", task_id, line));
                    }
                })
            });

            let stderr_reader = child.stderr.take().map(|err| {
                let sink = Arc::clone(sink);
                let task_id = task.id.clone();
                tokio::spawn(async move {
                    let mut lines = BufReader::new(err).lines();
                    while let Ok(Some(line)) = lines.next_line().await {
                        emit(&sink, &format!("  [{}] ERR: {}", task_id, line));
                    }
                })
            });

            let status = child.wait().await?;

            // Drain the readers before reporting the exit code
            if let Some(reader) = stdout_reader {
                let _ = reader.await;
            }
            if let Some(reader) = stderr_reader {
                let _ = reader.await;
            }

            Ok(status.code().unwrap_or(-1))
        })
    }
}
