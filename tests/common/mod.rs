//! Shared integration-test harness for spawning `quickdraw play` as a child
//! process and talking to it over stdin/stdout.

#![allow(dead_code)]

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde_json::Value;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::process::{Child, Command};

/// Default timeout for reading a single line from the process.
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(5);

/// Environment variables that would change the loaded configuration.
const CONFIG_ENV: [&str; 3] = ["QUICKDRAW_NICKNAME", "QUICKDRAW_TIME_UNIT", "QUICKDRAW_CONFIG"];

/// A running `quickdraw play` process.
///
/// The child process is killed on drop via `kill_on_drop(true)`.
#[allow(clippy::missing_panics_doc)]
pub struct QuickdrawProcess {
    child: Child,
    stdin: tokio::process::ChildStdin,
    reader: BufReader<tokio::process::ChildStdout>,
    seen: Vec<Value>,
}

impl QuickdrawProcess {
    /// Spawns `quickdraw play` with the given YAML config.
    #[allow(clippy::missing_panics_doc)]
    pub fn spawn_play(config_path: &Path) -> Self {
        let mut command = Command::new(env!("CARGO_BIN_EXE_quickdraw"));
        command
            .args([
                "play",
                "--config",
                config_path.to_str().expect("non-UTF-8 config path"),
                "--chat",
                "1",
                "--quiet",
            ])
            .stdin(std::process::Stdio::piped())
            .stdout(std::process::Stdio::piped())
            .stderr(std::process::Stdio::null())
            .kill_on_drop(true);
        for var in CONFIG_ENV {
            command.env_remove(var);
        }
        let mut child = command.spawn().expect("failed to spawn quickdraw");

        let stdin = child.stdin.take().expect("stdin not captured");
        let stdout = child.stdout.take().expect("stdout not captured");

        Self {
            child,
            stdin,
            reader: BufReader::new(stdout),
            seen: Vec::new(),
        }
    }

    /// Runs a one-shot command to completion and returns its output.
    #[allow(clippy::missing_panics_doc)]
    pub fn spawn_command(args: &[&str]) -> std::process::Output {
        let mut command = std::process::Command::new(env!("CARGO_BIN_EXE_quickdraw"));
        command.args(args);
        for var in CONFIG_ENV {
            command.env_remove(var);
        }
        command.output().expect("failed to run quickdraw")
    }

    /// Writes one command line to stdin.
    #[allow(clippy::missing_panics_doc)]
    pub async fn send_line(&mut self, line: &str) {
        self.stdin
            .write_all(format!("{line}\n").as_bytes())
            .await
            .expect("failed to write to stdin");
        self.stdin.flush().await.expect("failed to flush stdin");
    }

    /// Reads one NDJSON line from stdout.
    ///
    /// Panics on EOF, I/O error, or if nothing arrives within `timeout`.
    #[allow(clippy::missing_panics_doc)]
    pub async fn read_message(&mut self, timeout: Duration) -> Value {
        let mut line = String::new();
        let result = tokio::time::timeout(timeout, async {
            loop {
                line.clear();
                let n = self
                    .reader
                    .read_line(&mut line)
                    .await
                    .expect("read_line I/O error");
                assert!(n > 0, "unexpected EOF from quickdraw");
                let trimmed = line.trim();
                if !trimmed.is_empty() {
                    return serde_json::from_str::<Value>(trimmed)
                        .unwrap_or_else(|e| panic!("invalid JSON from quickdraw: {e}\nline: {line}"));
                }
            }
        })
        .await;
        let msg = result.expect("timed out waiting for output from quickdraw");
        self.seen.push(msg.clone());
        msg
    }

    /// Reads lines until one satisfies `predicate` and returns it.
    #[allow(clippy::missing_panics_doc)]
    pub async fn expect<F>(&mut self, what: &str, predicate: F) -> Value
    where
        F: Fn(&Value) -> bool,
    {
        let deadline = tokio::time::Instant::now() + DEFAULT_TIMEOUT;
        loop {
            let remaining = deadline.saturating_duration_since(tokio::time::Instant::now());
            assert!(!remaining.is_zero(), "never saw {what}; got {:?}", self.seen);
            let msg = self.read_message(remaining).await;
            if predicate(&msg) {
                return msg;
            }
        }
    }

    /// Waits for a notice whose text contains `needle`.
    pub async fn expect_notice(&mut self, needle: &str) -> Value {
        self.expect(&format!("notice containing {needle:?}"), |m| {
            m["type"] == "notice" && m["text"].as_str().is_some_and(|t| t.contains(needle))
        })
        .await
    }

    /// Waits for a reply line.
    pub async fn expect_reply(&mut self) -> Value {
        self.expect("reply", |m| m["type"] == "reply").await
    }

    /// Waits for a restriction line.
    pub async fn expect_restrict(&mut self) -> Value {
        self.expect("restrict", |m| m["type"] == "restrict").await
    }

    /// Closes stdin and waits for the process to exit.
    ///
    /// Returns whether it exited successfully.
    #[allow(clippy::missing_panics_doc)]
    pub async fn shutdown(self) -> bool {
        let Self {
            mut child, stdin, ..
        } = self;

        // Drop stdin to signal EOF
        drop(stdin);

        match tokio::time::timeout(DEFAULT_TIMEOUT, child.wait()).await {
            Ok(status) => status.map(|s| s.success()).unwrap_or(false),
            Err(_) => {
                child.kill().await.expect("failed to kill child");
                false
            }
        }
    }

    /// Returns the path to a test fixture.
    #[must_use]
    pub fn fixture_path(name: &str) -> PathBuf {
        PathBuf::from(env!("CARGO_MANIFEST_DIR"))
            .join("tests/fixtures")
            .join(name)
    }
}
