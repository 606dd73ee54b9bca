use std::future::Future;
use std::pin::Pin;
use std::time::Duration;

use mdns_sd::{ServiceDaemon, ServiceEvent};
use tracing::{debug, warn};

use crate::DiscoveryError;
use crate::types::{Aggregator, Announcement, SERVICE_TYPE};

/// Future returned by [`AnnouncementSource::browse`].
pub type BrowseFuture =
    Pin<Box<dyn Future<Output = Result<Vec<Announcement>, DiscoveryError>> + Send + 'static>>;

/// Anything that can listen for instance announcements for a while.
pub trait AnnouncementSource: Send + Sync {
    /// Collects every announcement resolved within `window`.
    fn browse(&self, window: Duration) -> BrowseFuture;
}

/// Browses the local network for Home Assistant via mDNS/DNS-SD.
#[derive(Debug, Clone)]
pub struct Client {
    service_type: String,
}

impl Client {
    pub fn new() -> Self {
        Self {
            service_type: format!("{SERVICE_TYPE}.local."),
        }
    }

    /// Performs a one-time mDNS query and returns every resolved announcement.
    pub async fn browse_once(&self, window: Duration) -> Result<Vec<Announcement>, DiscoveryError> {
        let daemon = ServiceDaemon::new()
            .map_err(|e| DiscoveryError::Mdns(format!("failed to create mDNS daemon: {e}")))?;

        let receiver = daemon
            .browse(&self.service_type)
            .map_err(|e| DiscoveryError::Mdns(format!("failed to browse mDNS: {e}")))?;

        let deadline = tokio::time::sleep(window);
        tokio::pin!(deadline);

        let mut found = Vec::new();
        loop {
            tokio::select! {
                () = &mut deadline => break,
                event = receiver.recv_async() => match event {
                    Ok(event) => {
                        if let Some(announcement) = parse_event(&event) {
                            debug!(name = %announcement.name, "home assistant announced");
                            found.push(announcement);
                        }
                    }
                    Err(_) => {
                        warn!("mDNS browse channel closed early");
                        break;
                    }
                },
            }
        }

        let _ = daemon.shutdown();
        Ok(found)
    }
}

impl Default for Client {
    fn default() -> Self {
        Self::new()
    }
}

impl AnnouncementSource for Client {
    fn browse(&self, window: Duration) -> BrowseFuture {
        let client = self.clone();
        Box::pin(async move { client.browse_once(window).await })
    }
}

/// Listens for `window` and returns advertised URLs missing from `known`.
///
/// A failing mDNS stack is not an error for callers: it yields no URLs.
pub async fn discover(
    source: &dyn AnnouncementSource,
    known: &[String],
    window: Duration,
) -> Vec<String> {
    match source.browse(window).await {
        Ok(announcements) => {
            let mut aggregator = Aggregator::new(known.iter().cloned());
            for announcement in &announcements {
                aggregator.push(announcement);
            }
            aggregator.into_urls()
        }
        Err(e) => {
            warn!("discovery failed: {e}");
            Vec::new()
        }
    }
}

/// Extracts the advertised URLs from a resolved mDNS service.
fn parse_event(event: &ServiceEvent) -> Option<Announcement> {
    let ServiceEvent::ServiceResolved(info) = event else {
        return None;
    };

    let mut announcement = Announcement {
        name: info.get_fullname().to_string(),
        ..Announcement::default()
    };

    for property in info.get_properties().iter() {
        let val = property.val_str();
        if val.is_empty() {
            continue;
        }
        match property.key() {
            "internal_url" => announcement.internal_url = Some(val.to_string()),
            "external_url" => announcement.external_url = Some(val.to_string()),
            _ => {}
        }
    }

    Some(announcement)
}
