//! Release-tag updater backed by GitHub releases.
//!
//! State lives under `state_dir`:
//! - `.version` holds the installed version (absent → the crate version)
//! - `next/.version` holds a version staged for the next boot
//!
//! The check compares the latest release tag with `.version` and stages a
//! newer one; the boot-time apply promotes a staged version. Fetching the
//! release payload itself is left to the delivery tooling that populates
//! `next/`.
//!
//! Unauthenticated release queries are capped at 60 an hour. A configured
//! `GITHUB_TOKEN` raises the cap; hitting it is logged as a warning and
//! answered as "no update" until the window resets.

use std::{
    fs, io,
    path::{Path, PathBuf},
    time::Duration,
};

use anyhow::{anyhow, bail, Context, Result};
use reqwest::{header::ACCEPT, Client, Response, StatusCode, Url};
use serde::Deserialize;
use tracing::{debug, info, warn};

use crate::{updates::Updater, Config};

const VERSION_FILE: &str = ".version";
const NEXT_DIR: &str = "next";
const RATE_LIMIT_REMAINING: &str = "x-ratelimit-remaining";
const RATE_LIMIT_RESET: &str = "x-ratelimit-reset";

// ---

#[derive(Debug, Deserialize)]
struct Release {
    tag_name: String,
}

/// Map `https://github.com/<owner>/<repo>` to its latest-release API URL.
pub fn github_release_api_url(project_url: &str) -> Result<Url> {
    // ---
    let url = Url::parse(project_url)?;

    match url.host_str() {
        Some("github.com") | Some("www.github.com") => {}
        other => bail!("expected a github.com project URL, got host {:?}", other),
    }

    let segments: Vec<&str> = url
        .path_segments()
        .map(|s| s.filter(|seg| !seg.is_empty()).collect())
        .unwrap_or_default();

    let [owner, repo] = segments.as_slice() else {
        bail!("expected https://github.com/<owner>/<repo>, got {}", project_url);
    };
    let repo = repo.trim_end_matches(".git");

    Url::parse(&format!(
        "https://api.github.com/repos/{owner}/{repo}/releases/latest"
    ))
    .map_err(|e| anyhow!("building release API URL: {}", e))
}

/// `true` if `latest` is a higher version than `current`.
///
/// Dotted numeric versions (with an optional `v` prefix) compare numerically;
/// anything else counts as newer whenever it differs.
fn is_newer(latest: &str, current: &str) -> bool {
    // ---
    fn numeric(v: &str) -> Option<Vec<u64>> {
        v.trim_start_matches('v')
            .split('.')
            .map(|part| part.parse().ok())
            .collect()
    }

    match (numeric(latest), numeric(current)) {
        (Some(l), Some(c)) => l > c,
        _ => latest != current,
    }
}

pub struct GithubUpdater {
    // ---
    client: Client,
    release_url: Url,
    state_dir: PathBuf,
    token: Option<String>,
}

impl GithubUpdater {
    // ---
    pub fn new(release_url: Url, state_dir: impl Into<PathBuf>, timeout: Duration) -> Result<Self> {
        // ---
        let client = Client::builder()
            .timeout(timeout)
            .user_agent(concat!("soil-moisture-agent/", env!("CARGO_PKG_VERSION")))
            .build()?;

        Ok(Self {
            client,
            release_url,
            state_dir: state_dir.into(),
            token: None,
        })
    }

    pub fn from_config(cfg: &Config) -> Result<Self> {
        let release_url = github_release_api_url(&cfg.update_url)?;
        let updater = Self::new(release_url, &cfg.state_dir, cfg.http_timeout)?;
        Ok(match &cfg.github_token {
            Some(token) => updater.with_token(token.clone()),
            None => updater,
        })
    }

    /// Authenticate release queries with `Authorization: Bearer <token>`.
    pub fn with_token(mut self, token: impl Into<String>) -> Self {
        self.token = Some(token.into());
        self
    }

    /// Installed version, defaulting to the running binary's own.
    pub fn current_version(&self) -> Result<String> {
        // ---
        Ok(read_version(&self.state_dir.join(VERSION_FILE))?
            .unwrap_or_else(|| env!("CARGO_PKG_VERSION").to_string()))
    }

    /// Version waiting in `next/`, if any.
    pub fn staged_version(&self) -> Result<Option<String>> {
        read_version(&self.next_dir().join(VERSION_FILE))
    }

    fn next_dir(&self) -> PathBuf {
        self.state_dir.join(NEXT_DIR)
    }

    /// Latest release tag, or `None` while the API rate limit is exhausted.
    async fn latest_version(&self) -> Result<Option<String>> {
        // ---
        let mut request = self
            .client
            .get(self.release_url.clone())
            .header(ACCEPT, "application/vnd.github+json");
        if let Some(token) = &self.token {
            request = request.bearer_auth(token);
        }

        let response = request.send().await.context("querying latest release")?;

        if is_rate_limited(&response) {
            let reset = header_str(&response, RATE_LIMIT_RESET).unwrap_or("unknown");
            warn!(
                status = %response.status(),
                reset,
                "GitHub rate limit reached, skipping update check"
            );
            return Ok(None);
        }

        let body = response.error_for_status()?.text().await?;
        let release: Release = serde_json::from_str(&body)
            .with_context(|| format!("unexpected release payload: {body}"))?;

        Ok(Some(release.tag_name))
    }
}

impl Updater for GithubUpdater {
    async fn apply_pending_if_available(&mut self) -> Result<bool> {
        // ---
        let Some(version) = self.staged_version()? else {
            debug!("No staged update");
            return Ok(false);
        };

        fs::create_dir_all(&self.state_dir)
            .with_context(|| format!("creating {}", self.state_dir.display()))?;
        fs::write(self.state_dir.join(VERSION_FILE), &version)?;
        fs::remove_dir_all(self.next_dir())?;

        info!("Installed staged version {}", version);
        Ok(true)
    }

    async fn check_available_for_next_reboot(&mut self) -> Result<bool> {
        // ---
        let current = self.current_version()?;
        let Some(latest) = self.latest_version().await? else {
            return Ok(false);
        };
        info!("Checking version... current: {}, latest: {}", current, latest);

        if !is_newer(&latest, &current) {
            return Ok(false);
        }

        let next = self.next_dir();
        fs::create_dir_all(&next).with_context(|| format!("creating {}", next.display()))?;
        fs::write(next.join(VERSION_FILE), &latest)?;

        info!("Version {} staged for next boot", latest);
        Ok(true)
    }
}

/// 429, or a 403 that GitHub marks as an exhausted quota.
fn is_rate_limited(response: &Response) -> bool {
    // ---
    match response.status() {
        StatusCode::TOO_MANY_REQUESTS => true,
        StatusCode::FORBIDDEN => header_str(response, RATE_LIMIT_REMAINING) == Some("0"),
        _ => false,
    }
}

fn header_str<'a>(response: &'a Response, name: &str) -> Option<&'a str> {
    response.headers().get(name)?.to_str().ok()
}

fn read_version(path: &Path) -> Result<Option<String>> {
    // ---
    match fs::read_to_string(path) {
        Ok(text) => {
            let version = text.trim();
            Ok((!version.is_empty()).then(|| version.to_string()))
        }
        Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(None),
        Err(e) => Err(e).with_context(|| format!("reading {}", path.display())),
    }
}

#[cfg(test)]
mod tests {
    // ---
    use super::*;

    #[test]
    fn test_release_api_url() {
        // ---
        let url = github_release_api_url("https://github.com/acme/soil-agent").unwrap();
        assert_eq!(
            url.as_str(),
            "https://api.github.com/repos/acme/soil-agent/releases/latest"
        );

        let url = github_release_api_url("https://github.com/acme/soil-agent.git/").unwrap();
        assert_eq!(
            url.as_str(),
            "https://api.github.com/repos/acme/soil-agent/releases/latest"
        );
    }

    #[test]
    fn test_release_api_url_rejects_other_shapes() {
        // ---
        assert!(github_release_api_url("https://gitlab.com/acme/soil-agent").is_err());
        assert!(github_release_api_url("https://github.com/acme").is_err());
        assert!(github_release_api_url("https://github.com/acme/soil/tree/main").is_err());
        assert!(github_release_api_url("not a url").is_err());
    }

    #[test]
    fn test_version_ordering() {
        // ---
        assert!(is_newer("v1.2.0", "1.1.9"));
        assert!(is_newer("1.10.0", "1.9.0"));
        assert!(!is_newer("v1.2.0", "v1.2.0"));
        assert!(!is_newer("1.0.0", "1.2.0"));
        assert!(is_newer("nightly-2", "nightly-1"));
        assert!(!is_newer("nightly-1", "nightly-1"));
    }
}
