use std::collections::HashSet;
use std::time::Duration;

use serde::{Deserialize, Serialize};

/// mDNS service type announced by Home Assistant.
pub const SERVICE_TYPE: &str = "_home-assistant._tcp";

/// How long a discovery scan listens for announcements.
pub const DEFAULT_COLLECTION_WINDOW: Duration = Duration::from_millis(1500);

/// One resolved Home Assistant announcement.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Announcement {
    /// mDNS instance name (informational).
    pub name: String,
    pub internal_url: Option<String>,
    pub external_url: Option<String>,
}

impl Announcement {
    /// Advertised URLs, internal first. Empty strings are skipped.
    pub fn urls(&self) -> impl Iterator<Item = &str> {
        [self.internal_url.as_deref(), self.external_url.as_deref()]
            .into_iter()
            .flatten()
            .filter(|url| !url.is_empty())
    }

    /// Returns true if either advertised URL equals `url`.
    pub fn advertises(&self, url: &str) -> bool {
        self.urls().any(|u| u == url)
    }
}

/// Collects advertised URLs that are not already known.
///
/// Each URL is reported once, in the order it was first announced.
#[derive(Debug, Clone, Default)]
pub struct Aggregator {
    known: HashSet<String>,
    found: Vec<String>,
}

impl Aggregator {
    pub fn new<I, S>(known: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            known: known.into_iter().map(Into::into).collect(),
            found: Vec::new(),
        }
    }

    /// Records the novel URLs of one announcement.
    pub fn push(&mut self, announcement: &Announcement) {
        for url in announcement.urls() {
            if self.known.insert(url.to_string()) {
                self.found.push(url.to_string());
            }
        }
    }

    pub fn found(&self) -> &[String] {
        &self.found
    }

    pub fn into_urls(self) -> Vec<String> {
        self.found
    }
}
