use std::borrow::Cow;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use http::Extensions;
use reqwest::Url;
use reqwest_middleware::{Middleware, Next};
use tokio::sync::Mutex;
use tokio::time::{Instant, sleep_until};
use tracing::debug;

use crate::config::Settings;

const FALLBACK_INTERVAL: Duration = Duration::from_millis(100);

/// Minimum spacing between requests whose URL starts with `prefix`.
#[derive(Clone, Debug)]
pub(crate) struct SourceLimit {
    pub source: &'static str,
    pub prefix: Cow<'static, str>,
    pub interval: Duration,
}

impl SourceLimit {
    fn from_env(
        source: &'static str,
        env_var: &'static str,
        default_prefix: &'static str,
        interval: Duration,
    ) -> Self {
        Self {
            source,
            prefix: crate::sources::env_base(default_prefix, env_var),
            interval,
        }
    }
}

/// Hands out request slots per upstream. Each caller reserves the next free slot
/// under the lock and sleeps outside it, so concurrent callers queue in arrival order.
#[derive(Debug)]
pub(crate) struct RateLimiter {
    limits: Vec<SourceLimit>,
    fallback: Duration,
    next_slot: Mutex<HashMap<String, Instant>>,
}

impl RateLimiter {
    pub(crate) fn from_settings(settings: &Settings) -> Self {
        use super::{chembl, clinicaltrials, llm, openfda, opentargets, pubmed};

        let limits = vec![
            SourceLimit::from_env(
                clinicaltrials::CTGOV_API,
                clinicaltrials::CTGOV_BASE_ENV,
                clinicaltrials::CTGOV_BASE,
                Duration::from_millis(250),
            ),
            SourceLimit::from_env(
                pubmed::PUBMED_API,
                pubmed::PUBMED_BASE_ENV,
                pubmed::PUBMED_BASE,
                eutils_interval(settings.ncbi_api_key.is_some()),
            ),
            SourceLimit::from_env(
                opentargets::OPENTARGETS_API,
                opentargets::OPENTARGETS_BASE_ENV,
                opentargets::OPENTARGETS_BASE,
                Duration::from_millis(500),
            ),
            SourceLimit::from_env(
                openfda::OPENFDA_API,
                openfda::OPENFDA_BASE_ENV,
                openfda::OPENFDA_BASE,
                Duration::from_millis(250),
            ),
            SourceLimit::from_env(
                chembl::CHEMBL_API,
                chembl::CHEMBL_BASE_ENV,
                chembl::CHEMBL_BASE,
                Duration::from_millis(200),
            ),
            SourceLimit::from_env(
                llm::ANTHROPIC_API,
                llm::ANTHROPIC_BASE_ENV,
                llm::ANTHROPIC_BASE,
                Duration::ZERO,
            ),
        ];
        Self::new(limits, FALLBACK_INTERVAL)
    }

    pub(crate) fn new(limits: Vec<SourceLimit>, fallback: Duration) -> Self {
        Self {
            limits,
            fallback,
            next_slot: Mutex::new(HashMap::new()),
        }
    }

    /// Longest matching prefix wins; unmatched URLs share one bucket per origin.
    fn bucket(&self, url: &Url) -> (String, Duration) {
        let full = url.as_str();
        if let Some(limit) = self
            .limits
            .iter()
            .filter(|l| full.starts_with(l.prefix.as_ref()))
            .max_by_key(|l| l.prefix.len())
        {
            return (limit.source.to_string(), limit.interval);
        }

        let origin = format!(
            "{}://{}",
            url.scheme(),
            url.host_str().unwrap_or("unknown-host")
        );
        (origin, self.fallback)
    }

    pub(crate) async fn acquire(&self, url: &Url) {
        let (bucket, interval) = self.bucket(url);
        if interval.is_zero() {
            return;
        }

        let slot = {
            let mut slots = self.next_slot.lock().await;
            let now = Instant::now();
            let slot = slots.get(&bucket).copied().filter(|s| *s > now).unwrap_or(now);
            slots.insert(bucket.clone(), slot + interval);
            slot
        };
        if slot > Instant::now() {
            debug!(bucket = %bucket, "Rate limited; waiting for slot");
            sleep_until(slot).await;
        }
    }
}

fn eutils_interval(has_api_key: bool) -> Duration {
    // NCBI allows 3 req/sec without a key, 10 with one.
    if has_api_key {
        Duration::from_millis(100)
    } else {
        Duration::from_millis(334)
    }
}

#[derive(Clone, Debug)]
pub(crate) struct RateLimitMiddleware {
    limiter: Arc<RateLimiter>,
}

impl RateLimitMiddleware {
    pub(crate) fn new(limiter: Arc<RateLimiter>) -> Self {
        Self { limiter }
    }
}

#[async_trait::async_trait]
impl Middleware for RateLimitMiddleware {
    async fn handle(
        &self,
        req: reqwest::Request,
        extensions: &mut Extensions,
        next: Next<'_>,
    ) -> reqwest_middleware::Result<reqwest::Response> {
        self.limiter.acquire(req.url()).await;
        next.run(req, extensions).await
    }
}
