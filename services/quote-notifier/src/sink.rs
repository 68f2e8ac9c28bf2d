//! Command-backed secret sink
//!
//! Runs the configured command once per rotated credential with the
//! credential name appended as the last argument and the value on stdin,
//! so the value never appears in a process listing.

use std::future::Future;
use std::pin::Pin;
use std::process::Stdio;

use common::Secret;
use kakao_auth::{Error, Result, SecretSink};
use tokio::io::AsyncWriteExt;
use tokio::process::Command;
use tracing::debug;

/// Sink that shells out, e.g. to `gh secret set <NAME>`.
#[derive(Debug, Clone)]
pub struct CommandSink {
    program: String,
    args: Vec<String>,
}

impl CommandSink {
    /// Build from an argv list. Returns `None` for an empty list.
    pub fn from_argv(argv: &[String]) -> Option<Self> {
        let (program, args) = argv.split_first()?;
        Some(Self {
            program: program.clone(),
            args: args.to_vec(),
        })
    }
}

impl SecretSink for CommandSink {
    fn persist<'a>(
        &'a self,
        name: &'a str,
        value: &'a Secret<String>,
    ) -> Pin<Box<dyn Future<Output = Result<()>> + Send + 'a>> {
        Box::pin(async move {
            let mut child = Command::new(&self.program)
                .args(&self.args)
                .arg(name)
                .stdin(Stdio::piped())
                .stdout(Stdio::null())
                .stderr(Stdio::piped())
                .kill_on_drop(true)
                .spawn()
                .map_err(|e| Error::Sink(format!("failed to start {}: {e}", self.program)))?;

            if let Some(mut stdin) = child.stdin.take() {
                stdin
                    .write_all(value.expose().as_bytes())
                    .await
                    .map_err(|e| Error::Sink(format!("failed to write {name} to {}: {e}", self.program)))?;
                // Dropping stdin closes the pipe so the command sees EOF
            }

            let output = child
                .wait_with_output()
                .await
                .map_err(|e| Error::Sink(format!("failed to wait for {}: {e}", self.program)))?;
            if !output.status.success() {
                let stderr = String::from_utf8_lossy(&output.stderr);
                return Err(Error::Sink(format!(
                    "{} exited with {} while storing {name}: {}",
                    self.program,
                    output.status,
                    stderr.trim()
                )));
            }

            debug!(name, program = %self.program, "credential persisted by external command");
            Ok(())
        })
    }
}
