//! Selection of an alternative instance when the current one degrades.

use std::time::Duration;

use hassdesk_discovery::{Announcement, AnnouncementSource};
use tracing::{debug, info, warn};

use crate::probe::{Prober, probe_outcome};

/// Orders failover candidates, excluding `current`.
///
/// Known instances that are currently announced come first, then the
/// remaining known instances, then announced URLs nobody has added yet.
pub fn failover_candidates(
    current: &str,
    known: &[String],
    announced: &[Announcement],
) -> Vec<String> {
    fn push(url: &str, current: &str, out: &mut Vec<String>) {
        if url != current && !out.iter().any(|c| c == url) {
            out.push(url.to_string());
        }
    }

    let is_announced = |url: &str| announced.iter().any(|a| a.advertises(url));
    let (live, quiet): (Vec<&String>, Vec<&String>) =
        known.iter().partition(|u| is_announced(u.as_str()));

    let mut candidates = Vec::new();
    for url in live.into_iter().chain(quiet) {
        push(url, current, &mut candidates);
    }
    for url in announced.iter().flat_map(Announcement::urls) {
        push(url, current, &mut candidates);
    }
    candidates
}

/// Scans the network for `window`, then probes candidates one at a time.
///
/// Returns the first candidate answering 200. Discovery errors only shrink
/// the candidate list.
pub async fn find_alternative(
    prober: &dyn Prober,
    source: &dyn AnnouncementSource,
    current: &str,
    known: &[String],
    window: Duration,
) -> Option<String> {
    let announced = match source.browse(window).await {
        Ok(announced) => announced,
        Err(e) => {
            warn!("failover discovery failed: {e}");
            Vec::new()
        }
    };

    let candidates = failover_candidates(current, known, &announced);
    debug!(count = candidates.len(), "failover candidates");

    for url in candidates {
        let outcome = probe_outcome(prober, &url).await;
        if outcome.is_healthy() {
            info!(url = %url, "found reachable alternative instance");
            return Some(url);
        }
        debug!(url = %url, %outcome, "failover candidate unavailable");
    }
    None
}
