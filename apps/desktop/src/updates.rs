//! Release check against the project's GitHub releases.

use semver::Version;
use serde::Deserialize;
use tracing::{debug, info};

/// Latest-release endpoint of the GitHub API.
pub const RELEASES_API: &str = "https://api.github.com/repos/hassdesk/hassdesk/releases/latest";
/// Page opened when the user accepts an update.
pub const RELEASES_PAGE: &str = "https://github.com/hassdesk/hassdesk/releases/latest";

/// Errors from checking for updates.
#[derive(Debug, thiserror::Error)]
pub enum UpdateError {
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("invalid version: {0}")]
    Version(#[from] semver::Error),
}

#[derive(Debug, Deserialize)]
struct LatestRelease {
    tag_name: String,
}

/// A release newer than the running build.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Update {
    pub current: Version,
    pub latest: Version,
}

/// Parses a release tag such as `v1.4.0`.
pub fn parse_tag(tag: &str) -> Result<Version, semver::Error> {
    Version::parse(tag.trim().trim_start_matches('v'))
}

/// Compares a release tag with the running version.
pub fn newer_release(tag: &str, current: &str) -> Result<Option<Update>, UpdateError> {
    let latest = parse_tag(tag)?;
    let current = Version::parse(current)?;
    Ok((latest > current).then_some(Update { current, latest }))
}

#[derive(Debug, Clone)]
pub struct UpdateChecker {
    http: reqwest::Client,
    api_url: String,
}

impl UpdateChecker {
    pub fn new() -> Result<Self, UpdateError> {
        let http = reqwest::Client::builder()
            .user_agent(concat!("hassdesk/", env!("CARGO_PKG_VERSION")))
            .build()?;
        Ok(Self {
            http,
            api_url: RELEASES_API.into(),
        })
    }

    /// Fetches the latest release and returns it if it is newer.
    pub async fn check(&self) -> Result<Option<Update>, UpdateError> {
        let release: LatestRelease = self
            .http
            .get(&self.api_url)
            .send()
            .await?
            .error_for_status()?
            .json()
            .await?;
        debug!(tag = %release.tag_name, "latest release");

        let update = newer_release(&release.tag_name, env!("CARGO_PKG_VERSION"))?;
        if update.is_none() {
            info!("already on the latest release");
        }
        Ok(update)
    }
}
