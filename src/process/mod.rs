use std::process::Stdio;
use std::time::Duration;

use anyhow::Context;
use async_trait::async_trait;

use crate::Result;

/// Captured output of a finished subprocess.
#[derive(Debug, Clone)]
pub struct ProcessOutput {
    pub success: bool,
    pub stdout: String,
    pub stderr: String,
}

impl ProcessOutput {
    /// Stdout if the process exited successfully, otherwise an error
    /// carrying stderr.
    pub fn stdout_or_err(self, what: &str) -> Result<String> {
        if self.success {
            Ok(self.stdout)
        } else {
            anyhow::bail!("{} failed: {}", what, self.stderr.trim());
        }
    }
}

/// Subprocess execution seam. Extractor and transcription logic talk to
/// yt-dlp/ffmpeg/ffprobe only through this trait so tests can substitute
/// fakes without the binaries present.
#[async_trait]
pub trait ProcessRunner: Send + Sync {
    /// Run a program to completion, capturing stdout and stderr. The call
    /// is bounded by `timeout`; a process that overruns is killed.
    async fn run(&self, program: &str, args: &[String], timeout: Duration) -> Result<ProcessOutput>;
}

/// Production runner backed by `tokio::process`.
pub struct TokioRunner;

#[async_trait]
impl ProcessRunner for TokioRunner {
    async fn run(&self, program: &str, args: &[String], timeout: Duration) -> Result<ProcessOutput> {
        tracing::debug!("Running {} {}", program, args.join(" "));

        let child = tokio::process::Command::new(program)
            .args(args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .with_context(|| format!("Failed to spawn {}", program))?;

        let waited = tokio::time::timeout(timeout, child.wait_with_output()).await;

        let output = match waited {
            Ok(result) => result.with_context(|| format!("Failed to run {}", program))?,
            Err(_) => {
                // kill_on_drop reaps the child when the future is dropped
                anyhow::bail!("{} timed out after {:?}", program, timeout);
            }
        };

        Ok(ProcessOutput {
            success: output.status.success(),
            stdout: String::from_utf8_lossy(&output.stdout).to_string(),
            stderr: String::from_utf8_lossy(&output.stderr).to_string(),
        })
    }
}

/// Check whether a command responds to `--version`.
pub async fn command_available(runner: &dyn ProcessRunner, program: &str) -> bool {
    runner
        .run(program, &["--version".to_string()], Duration::from_secs(10))
        .await
        .map(|output| output.success)
        .unwrap_or(false)
}

#[cfg(test)]
pub mod testing {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Mutex;

    /// Scripted fake runner: each invocation is matched against its
    /// program name and answered from a queue of canned outputs. Also
    /// records every call for order/count assertions.
    pub struct FakeRunner {
        outputs: Mutex<Vec<(String, Result<ProcessOutput>)>>,
        pub calls: Mutex<Vec<(String, Vec<String>)>>,
        pub call_count: AtomicUsize,
    }

    impl FakeRunner {
        pub fn new() -> Self {
            Self {
                outputs: Mutex::new(Vec::new()),
                calls: Mutex::new(Vec::new()),
                call_count: AtomicUsize::new(0),
            }
        }

        pub fn expect(self, program: &str, output: ProcessOutput) -> Self {
            self.outputs
                .lock()
                .unwrap()
                .push((program.to_string(), Ok(output)));
            self
        }

        pub fn expect_err(self, program: &str, message: &str) -> Self {
            self.outputs
                .lock()
                .unwrap()
                .push((program.to_string(), Err(anyhow::anyhow!(message.to_string()))));
            self
        }
    }

    pub fn ok_output(stdout: &str) -> ProcessOutput {
        ProcessOutput {
            success: true,
            stdout: stdout.to_string(),
            stderr: String::new(),
        }
    }

    pub fn failed_output(stderr: &str) -> ProcessOutput {
        ProcessOutput {
            success: false,
            stdout: String::new(),
            stderr: stderr.to_string(),
        }
    }

    #[async_trait]
    impl ProcessRunner for FakeRunner {
        async fn run(
            &self,
            program: &str,
            args: &[String],
            _timeout: Duration,
        ) -> Result<ProcessOutput> {
            self.call_count.fetch_add(1, Ordering::SeqCst);
            self.calls
                .lock()
                .unwrap()
                .push((program.to_string(), args.to_vec()));

            let mut outputs = self.outputs.lock().unwrap();
            if outputs.is_empty() {
                anyhow::bail!("FakeRunner: unexpected invocation of {}", program);
            }
            let (expected, result) = outputs.remove(0);
            assert_eq!(
                expected, program,
                "FakeRunner: expected {} but {} was invoked",
                expected, program
            );
            result
        }
    }
}
