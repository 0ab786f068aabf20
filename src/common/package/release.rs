//! GitHub release lookup and asset downloads for manual installs.

use async_trait::async_trait;
use futures_util::StreamExt;
use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::time::Duration;
use thiserror::Error;
use tokio::io::AsyncWriteExt;

use crate::ui::prelude::*;

const GITHUB_API_URL: &str = "https://api.github.com/repos";

const CONNECT_TIMEOUT: Duration = Duration::from_secs(30);
/// Longest a transfer may sit without receiving data
const READ_TIMEOUT: Duration = Duration::from_secs(60);

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct ReleaseAsset {
    pub name: String,
    pub browser_download_url: String,
}

#[derive(Deserialize)]
struct GitHubRelease {
    assets: Vec<ReleaseAsset>,
}

#[derive(Debug, Error)]
pub enum FetchError {
    #[error("creating HTTP client: {0}")]
    Client(#[source] reqwest::Error),

    #[error("requesting {url}: {source}")]
    Request {
        url: String,
        #[source]
        source: reqwest::Error,
    },

    #[error("{url} returned HTTP {status}")]
    Status { url: String, status: u16 },

    #[error("writing {}: {source}", .path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("no asset ending in `{pattern}` in the latest release of {repo}")]
    NoMatchingAsset { repo: String, pattern: String },

    #[error("several assets end in `{pattern}` in {repo}: {}", .names.join(", "))]
    AmbiguousAsset {
        repo: String,
        pattern: String,
        names: Vec<String>,
    },
}

/// Source of release metadata and downloads.
#[async_trait]
pub trait Fetcher: Send + Sync {
    /// Assets of the latest release of `repo` (`owner/name`).
    async fn latest_release_assets(&self, repo: &str) -> Result<Vec<ReleaseAsset>, FetchError>;

    /// Download `url` into the file at `dest`, replacing it.
    async fn download(&self, url: &str, dest: &Path) -> Result<(), FetchError>;
}

/// Pick the single asset whose filename ends with `pattern`.
pub fn select_asset<'a>(
    repo: &str,
    pattern: &str,
    assets: &'a [ReleaseAsset],
) -> Result<&'a ReleaseAsset, FetchError> {
    let matches: Vec<&ReleaseAsset> = assets.iter().filter(|a| a.name.ends_with(pattern)).collect();
    match matches.as_slice() {
        [single] => Ok(single),
        [] => Err(FetchError::NoMatchingAsset {
            repo: repo.to_string(),
            pattern: pattern.to_string(),
        }),
        many => Err(FetchError::AmbiguousAsset {
            repo: repo.to_string(),
            pattern: pattern.to_string(),
            names: many.iter().map(|a| a.name.clone()).collect(),
        }),
    }
}

/// Talks to the GitHub REST API. Sends `GITHUB_TOKEN` when set to avoid
/// the anonymous rate limit.
pub struct HttpFetcher {
    client: reqwest::Client,
    token: Option<String>,
}

impl HttpFetcher {
    /// `timeout` bounds each request including its body, like the
    /// per-command timeout bounds subprocesses.
    pub fn new(timeout: Duration) -> Result<Self, FetchError> {
        let client = reqwest::Client::builder()
            .user_agent(format!("dotinstall/{}", env!("CARGO_PKG_VERSION")))
            .connect_timeout(CONNECT_TIMEOUT.min(timeout))
            .read_timeout(READ_TIMEOUT.min(timeout))
            .timeout(timeout)
            .build()
            .map_err(FetchError::Client)?;
        let token = std::env::var("GITHUB_TOKEN")
            .ok()
            .filter(|t| !t.trim().is_empty());
        Ok(Self { client, token })
    }

    async fn get(&self, url: &str) -> Result<reqwest::Response, FetchError> {
        let mut request = self.client.get(url);
        if let Some(token) = &self.token {
            request = request.bearer_auth(token);
        }
        let response = request.send().await.map_err(|source| FetchError::Request {
            url: url.to_string(),
            source,
        })?;

        if !response.status().is_success() {
            return Err(FetchError::Status {
                url: url.to_string(),
                status: response.status().as_u16(),
            });
        }
        Ok(response)
    }
}

#[async_trait]
impl Fetcher for HttpFetcher {
    async fn latest_release_assets(&self, repo: &str) -> Result<Vec<ReleaseAsset>, FetchError> {
        let url = format!("{}/{}/releases/latest", GITHUB_API_URL, repo);
        emit(Level::Debug, "release.lookup", &format!("GET {}", url), None);

        let release: GitHubRelease = self
            .get(&url)
            .await?
            .json()
            .await
            .map_err(|source| FetchError::Request { url, source })?;
        Ok(release.assets)
    }

    async fn download(&self, url: &str, dest: &Path) -> Result<(), FetchError> {
        emit(
            Level::Debug,
            "release.download",
            &format!("{} -> {}", url, dest.display()),
            None,
        );
        let io_error = |source| FetchError::Io {
            path: dest.to_path_buf(),
            source,
        };

        let response = self.get(url).await?;
        let mut file = tokio::fs::File::create(dest).await.map_err(io_error)?;
        let mut stream = response.bytes_stream();
        while let Some(chunk) = stream.next().await {
            let chunk = chunk.map_err(|source| FetchError::Request {
                url: url.to_string(),
                source,
            })?;
            file.write_all(&chunk).await.map_err(io_error)?;
        }
        file.flush().await.map_err(io_error)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn asset(name: &str) -> ReleaseAsset {
        ReleaseAsset {
            name: name.to_string(),
            browser_download_url: format!("https://example.com/{}", name),
        }
    }

    #[test]
    fn test_select_single_match() {
        let assets = vec![
            asset("zebar-v2.0.0-x64.msi"),
            asset("zebar-v2.0.0-universal.dmg"),
            asset("zebar-v2.0.0-amd64.deb"),
        ];
        let picked = select_asset("glzr-io/zebar", ".dmg", &assets).unwrap();
        assert_eq!(picked.name, "zebar-v2.0.0-universal.dmg");
    }

    #[test]
    fn test_select_rejects_zero_and_many() {
        let assets = vec![asset("tool-arm64.deb"), asset("tool-amd64.deb")];
        assert!(matches!(
            select_asset("o/tool", ".rpm", &assets),
            Err(FetchError::NoMatchingAsset { .. })
        ));

        let err = select_asset("o/tool", ".deb", &assets).unwrap_err();
        assert!(matches!(err, FetchError::AmbiguousAsset { ref names, .. } if names.len() == 2));
        assert!(err.to_string().contains("tool-arm64.deb, tool-amd64.deb"));

        let picked = select_asset("o/tool", "amd64.deb", &assets).unwrap();
        assert_eq!(picked.name, "tool-amd64.deb");
    }

    #[tokio::test]
    async fn test_download_from_silent_server_times_out() {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        // Accept connections and never answer
        tokio::spawn(async move {
            let mut held = Vec::new();
            while let Ok((socket, _)) = listener.accept().await {
                held.push(socket);
            }
        });

        let fetcher = HttpFetcher::new(Duration::from_millis(300)).unwrap();
        let dir = tempfile::tempdir().unwrap();
        let url = format!("http://{}/tool.AppImage", addr);

        let outcome = tokio::time::timeout(
            Duration::from_secs(5),
            fetcher.download(&url, &dir.path().join("tool")),
        )
        .await
        .expect("download should give up on its own");
        assert!(matches!(outcome, Err(FetchError::Request { .. })));
    }

    #[test]
    fn test_release_json_shape() {
        let json = r#"{"tag_name": "v1", "assets": [
            {"name": "a.AppImage", "browser_download_url": "https://x/a.AppImage", "size": 3}
        ]}"#;
        let release: GitHubRelease = serde_json::from_str(json).unwrap();
        assert_eq!(release.assets, vec![ReleaseAsset {
            name: "a.AppImage".into(),
            browser_download_url: "https://x/a.AppImage".into(),
        }]);
    }
}
