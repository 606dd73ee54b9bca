//! Single-shot HTTP health probe.

use std::future::Future;
use std::pin::Pin;
use std::time::Duration;

use reqwest::Url;
use reqwest::redirect::Policy;
use tracing::trace;

use crate::ProbeError;
use crate::types::ProbeOutcome;

/// Path every Home Assistant serves without authentication.
pub const HEALTH_PATH: &str = "/auth/providers";

/// Upper bound for one probe, connect included.
pub const PROBE_TIMEOUT: Duration = Duration::from_secs(10);

/// Future returned by [`Prober::probe`].
pub type ProbeFuture = Pin<Box<dyn Future<Output = Result<u16, ProbeError>> + Send + 'static>>;

/// Issues one health request against an instance.
///
/// Resolves with the status code of any completed response and fails only
/// when no response arrived. Implementations never retry.
pub trait Prober: Send + Sync {
    fn probe(&self, url: &str) -> ProbeFuture;
}

/// Builds the health URL for an instance: same scheme and authority,
/// fixed path.
pub fn health_url(instance: &str) -> Result<Url, ProbeError> {
    let base = Url::parse(instance).map_err(|e| ProbeError::InvalidUrl(format!("{instance}: {e}")))?;
    if !matches!(base.scheme(), "http" | "https") {
        return Err(ProbeError::InvalidUrl(format!(
            "{instance}: unsupported scheme {}",
            base.scheme()
        )));
    }
    base.join(HEALTH_PATH)
        .map_err(|e| ProbeError::InvalidUrl(format!("{instance}: {e}")))
}

/// Runs a probe and folds any error into a [`ProbeOutcome`].
pub async fn probe_outcome(prober: &dyn Prober, url: &str) -> ProbeOutcome {
    match prober.probe(url).await {
        Ok(status) => ProbeOutcome::Status(status),
        Err(e) => ProbeOutcome::TransportError(e.to_string()),
    }
}

/// [`Prober`] backed by `reqwest`.
///
/// Redirects are not followed: a redirect is a completed, non-200 answer.
#[derive(Debug, Clone)]
pub struct HttpProber {
    http: reqwest::Client,
}

impl HttpProber {
    pub fn new() -> Result<Self, ProbeError> {
        let http = reqwest::Client::builder()
            .redirect(Policy::none())
            .timeout(PROBE_TIMEOUT)
            .user_agent(concat!("hassdesk/", env!("CARGO_PKG_VERSION")))
            .build()?;
        Ok(Self { http })
    }
}

impl Prober for HttpProber {
    fn probe(&self, url: &str) -> ProbeFuture {
        let http = self.http.clone();
        let target = health_url(url);
        Box::pin(async move {
            let target = target?;
            let resp = http.get(target.clone()).send().await?;
            let status = resp.status().as_u16();
            trace!(url = %target, status, "probe completed");
            Ok(status)
        })
    }
}
