//! Readiness detection for preview processes.
//!
//! Two independent signals race under an absolute deadline: phrases printed
//! by the dev server, and an HTTP probe against the bound port that starts
//! after a delay. The output match is only a latency optimization; the probe
//! catches servers whose banner is not recognised.

use std::net::{IpAddr, SocketAddr};
use std::time::Duration;

use async_trait::async_trait;
use regex::{Regex, RegexSet, RegexSetBuilder};
use url::Url;

/// Output phrasings that mean the server is accepting connections.
pub const READY_PATTERNS: &[&str] = &[
    r"\bready in\b",
    r"ready - started server on",
    r"started server on",
    r"\blocal:\s+https?://",
    r"compiled successfully",
    r"\blistening (?:on|at)\b",
];

/// Output phrasings that mean the port was already bound.
pub const PORT_IN_USE_PATTERNS: &[&str] = &[
    r"EADDRINUSE",
    r"address already in use",
    r"port \d+ is (?:already )?in use",
];

const ANSI_ESCAPE: &str = r"\x1b\[[0-9;?]*[ -/]*[@-~]";

/// What a line of output says about readiness.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutputSignal {
    Ready,
    PortInUse,
}

/// Compiled output matchers.
#[derive(Debug, Clone)]
pub struct ReadinessPatterns {
    ready: RegexSet,
    port_in_use: RegexSet,
    ansi: Regex,
}

impl ReadinessPatterns {
    /// Compile the built-in patterns plus `extra` readiness patterns.
    ///
    /// # Errors
    ///
    /// Returns an error if any pattern is not a valid regex.
    pub fn new(extra: &[String]) -> Result<Self, regex::Error> {
        let ready = RegexSetBuilder::new(
            READY_PATTERNS
                .iter()
                .copied()
                .chain(extra.iter().map(String::as_str)),
        )
        .case_insensitive(true)
        .build()?;
        let port_in_use = RegexSetBuilder::new(PORT_IN_USE_PATTERNS)
            .case_insensitive(true)
            .build()?;

        Ok(Self {
            ready,
            port_in_use,
            ansi: Regex::new(ANSI_ESCAPE)?,
        })
    }

    /// Remove terminal color codes from a line.
    #[must_use]
    pub fn strip_ansi(&self, line: &str) -> String {
        self.ansi.replace_all(line, "").into_owned()
    }

    /// Classify an already-stripped line of output.
    #[must_use]
    pub fn classify(&self, line: &str) -> Option<OutputSignal> {
        if self.port_in_use.is_match(line) {
            Some(OutputSignal::PortInUse)
        } else if self.ready.is_match(line) {
            Some(OutputSignal::Ready)
        } else {
            None
        }
    }
}

/// Checks whether something answers HTTP at a URL.
#[async_trait]
pub trait HttpProbe: Send + Sync {
    /// Return `true` if any HTTP response was received.
    async fn check(&self, url: &Url) -> bool;
}

/// [`HttpProbe`] backed by `reqwest`.
#[derive(Debug, Clone)]
pub struct ReqwestProbe {
    client: reqwest::Client,
}

impl ReqwestProbe {
    /// Create a probe whose requests give up after `request_timeout`.
    ///
    /// # Errors
    ///
    /// Returns an error if the HTTP client cannot be built.
    pub fn new(request_timeout: Duration) -> Result<Self, reqwest::Error> {
        let client = reqwest::Client::builder()
            .timeout(request_timeout)
            .redirect(reqwest::redirect::Policy::none())
            .no_proxy()
            .build()?;
        Ok(Self { client })
    }
}

#[async_trait]
impl HttpProbe for ReqwestProbe {
    async fn check(&self, url: &Url) -> bool {
        match self.client.get(url.clone()).send().await {
            Ok(response) => {
                tracing::trace!(%url, status = %response.status(), "Probe answered");
                true
            }
            Err(e) => {
                tracing::trace!(%url, error = %e, "Probe failed");
                false
            }
        }
    }
}

/// Build the URL probed for a port bound on `host`.
///
/// # Errors
///
/// Returns an error if the resulting URL does not parse.
pub fn probe_url(host: IpAddr, port: u16) -> Result<Url, url::ParseError> {
    Url::parse(&format!("http://{}/", SocketAddr::new(host, port)))
}

/// Schedule of the delayed HTTP probe.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ProbePlan {
    pub delay: Duration,
    pub retries: u32,
    pub interval: Duration,
}

/// Wait `plan.delay`, then probe up to `plan.retries` times.
///
/// Returns `true` on the first answered probe.
pub async fn run_probe(probe: &dyn HttpProbe, url: &Url, plan: ProbePlan) -> bool {
    tokio::time::sleep(plan.delay).await;

    for attempt in 1..=plan.retries {
        if probe.check(url).await {
            tracing::debug!(%url, attempt, "HTTP probe succeeded");
            return true;
        }
        if attempt < plan.retries {
            tokio::time::sleep(plan.interval).await;
        }
    }

    tracing::debug!(%url, retries = plan.retries, "HTTP probe budget exhausted");
    false
}
