//! Local network discovery of Home Assistant instances.
//!
//! Home Assistant announces itself over mDNS as `_home-assistant._tcp`
//! with `internal_url` / `external_url` TXT records. A scan listens for a
//! fixed collection window and reports the URLs the caller does not
//! already know.

pub mod client;
pub mod types;

pub use client::{AnnouncementSource, BrowseFuture, Client, discover};
pub use types::{Aggregator, Announcement, DEFAULT_COLLECTION_WINDOW, SERVICE_TYPE};

/// Errors for discovery operations.
#[derive(Debug, thiserror::Error)]
pub enum DiscoveryError {
    #[error("mDNS error: {0}")]
    Mdns(String),
}
