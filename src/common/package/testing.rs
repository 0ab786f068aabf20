//! Scripted stand-ins for the process and network boundaries.

use async_trait::async_trait;
use std::collections::{HashMap, HashSet};
use std::path::Path;
use std::sync::Mutex;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use super::release::{FetchError, Fetcher, ReleaseAsset};
use super::scheduler::InstallObserver;
use crate::common::process::{CommandError, CommandOutput, CommandRunner, CommandSpec};

/// Observer that ignores every event.
pub struct NoopObserver;

impl InstallObserver for NoopObserver {}

struct Response {
    prefix: String,
    output: CommandOutput,
}

/// Answers commands by the first registered prefix of their command line.
/// Unmatched commands succeed with empty output.
#[derive(Default)]
pub struct FakeRunner {
    responses: Vec<Response>,
    commands: HashSet<String>,
    delay: Option<Duration>,
    calls: Mutex<Vec<String>>,
    in_flight: AtomicUsize,
    max_in_flight: AtomicUsize,
}

impl FakeRunner {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn respond(mut self, prefix: &str, code: i32, stdout: &str) -> Self {
        self.responses.push(Response {
            prefix: prefix.to_string(),
            output: CommandOutput {
                code: Some(code),
                stdout: stdout.to_string(),
                stderr: String::new(),
            },
        });
        self
    }

    pub fn fail(mut self, prefix: &str, stderr: &str) -> Self {
        self.responses.push(Response {
            prefix: prefix.to_string(),
            output: CommandOutput {
                code: Some(1),
                stdout: String::new(),
                stderr: stderr.to_string(),
            },
        });
        self
    }

    /// Executables reported present by `command_exists`.
    pub fn with_commands<I, S>(mut self, names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.commands.extend(names.into_iter().map(Into::into));
        self
    }

    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    pub fn calls(&self) -> Vec<String> {
        self.calls.lock().unwrap().clone()
    }

    pub fn count_prefix(&self, prefix: &str) -> usize {
        self.calls().iter().filter(|c| c.starts_with(prefix)).count()
    }

    /// Position of the first call starting with `prefix`.
    pub fn position(&self, prefix: &str) -> Option<usize> {
        self.calls().iter().position(|c| c.starts_with(prefix))
    }

    pub fn max_concurrency(&self) -> usize {
        self.max_in_flight.load(Ordering::SeqCst)
    }

    /// Commands started whose future has not been dropped yet.
    pub fn in_flight(&self) -> usize {
        self.in_flight.load(Ordering::SeqCst)
    }
}

/// Counts a command as running until its future completes or is dropped.
struct InFlight<'a>(&'a AtomicUsize);

impl Drop for InFlight<'_> {
    fn drop(&mut self) {
        self.0.fetch_sub(1, Ordering::SeqCst);
    }
}

#[async_trait]
impl CommandRunner for FakeRunner {
    async fn output(&self, cmd: &CommandSpec) -> Result<CommandOutput, CommandError> {
        let line = cmd.command_line();
        self.calls.lock().unwrap().push(line.clone());

        let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        let _running = InFlight(&self.in_flight);
        self.max_in_flight.fetch_max(now, Ordering::SeqCst);

        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }

        Ok(self
            .responses
            .iter()
            .find(|r| line.starts_with(&r.prefix))
            .map(|r| r.output.clone())
            .unwrap_or_else(|| CommandOutput {
                code: Some(0),
                ..Default::default()
            }))
    }

    fn command_exists(&self, name: &str) -> bool {
        self.commands.contains(name)
    }
}

/// Serves canned release listings and writes fixed bytes on download.
#[derive(Default)]
pub struct FakeFetcher {
    releases: HashMap<String, Vec<ReleaseAsset>>,
    downloads: Mutex<Vec<String>>,
    interrupt_downloads: bool,
}

impl FakeFetcher {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_release(mut self, repo: &str, asset_names: &[&str]) -> Self {
        let assets = asset_names
            .iter()
            .map(|name| ReleaseAsset {
                name: name.to_string(),
                browser_download_url: format!("https://github.com/{}/releases/download/{}", repo, name),
            })
            .collect();
        self.releases.insert(repo.to_string(), assets);
        self
    }

    /// Downloads write a partial file and then fail.
    pub fn with_interrupted_downloads(mut self) -> Self {
        self.interrupt_downloads = true;
        self
    }

    pub fn downloads(&self) -> Vec<String> {
        self.downloads.lock().unwrap().clone()
    }
}

#[async_trait]
impl Fetcher for FakeFetcher {
    async fn latest_release_assets(&self, repo: &str) -> Result<Vec<ReleaseAsset>, FetchError> {
        self.releases
            .get(repo)
            .cloned()
            .ok_or_else(|| FetchError::Status {
                url: format!("https://api.github.com/repos/{}/releases/latest", repo),
                status: 404,
            })
    }

    async fn download(&self, url: &str, dest: &Path) -> Result<(), FetchError> {
        self.downloads.lock().unwrap().push(url.to_string());
        let io_error = |source| FetchError::Io {
            path: dest.to_path_buf(),
            source,
        };
        if self.interrupt_downloads {
            tokio::fs::write(dest, b"#!/bin/sh\nech").await.map_err(io_error)?;
            return Err(FetchError::Io {
                path: dest.to_path_buf(),
                source: std::io::Error::new(std::io::ErrorKind::ConnectionReset, "connection reset"),
            });
        }
        tokio::fs::write(dest, b"#!/bin/sh\necho fake\n")
            .await
            .map_err(io_error)
    }
}
