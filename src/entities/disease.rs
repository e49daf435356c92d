//! Disease-term normalization for PubMed queries.
//!
//! The LLM proposes a term, a blocklist rejects collapses to a bare disease
//! class, and, when a drug is known, the literature count decides whether a
//! broader term is worth using. At most two LLM calls and two counts per term.

use std::sync::Arc;
use std::time::Duration;

use minijinja::context;
use serde_json::json;
use tracing::{debug, info, warn};

use crate::error::ScoutError;
use crate::render::prompt;
use crate::sources::llm::LlmClient;
use crate::sources::pubmed::LiteratureCount;
use crate::utils::cache::TtlCache;

/// Minimum PubMed hits for a drug+disease query to count as useful.
pub const MIN_RESULTS: u64 = 3;

/// Delay between batch items, sized for the NCBI keyless rate limit.
pub const BATCH_DELAY: Duration = Duration::from_millis(350);

pub const BROADENING_BLOCKLIST: [&str; 9] = [
    "cancer",
    "tumor",
    "tumour",
    "neoplasm",
    "malignancy",
    "disease",
    "disorder",
    "syndrome",
    "condition",
];

const BROADEN_SUFFIX: &str = " (generalize to a broader disease category)";
const NORMALIZED_CACHE_NS: &str = "disease_norm";
const FINAL_CACHE_NS: &str = "disease_norm_final";
const ORGAN_CACHE_NS: &str = "organ_term";

/// True when every `OR`-separated term of `answer` is a blocklisted word.
pub fn is_overly_broad(answer: &str) -> bool {
    answer
        .split(" OR ")
        .map(|t| t.trim().to_lowercase())
        .all(|t| BROADENING_BLOCKLIST.contains(&t.as_str()))
}

fn clean_answer(raw: &str) -> String {
    raw.trim()
        .trim_matches('"')
        .trim_matches('\'')
        .to_string()
}

pub struct DiseaseNormalizer {
    llm: Arc<dyn LlmClient>,
    literature: Arc<dyn LiteratureCount>,
    cache: TtlCache,
    batch_delay: Duration,
}

impl DiseaseNormalizer {
    pub fn new(
        llm: Arc<dyn LlmClient>,
        literature: Arc<dyn LiteratureCount>,
        cache: TtlCache,
    ) -> Self {
        Self {
            llm,
            literature,
            cache,
            batch_delay: BATCH_DELAY,
        }
    }

    pub fn with_batch_delay(mut self, delay: Duration) -> Self {
        self.batch_delay = delay;
        self
    }

    async fn cache_put(&self, namespace: &str, params: &serde_json::Value, value: &str) {
        if let Err(err) = self.cache.set(namespace, params, &value, None).await {
            warn!(namespace, "Cache write failed: {err}");
        }
    }

    /// One LLM round: raw term in, trimmed PubMed term out.
    pub async fn llm_normalize_disease(&self, raw_term: &str) -> Result<String, ScoutError> {
        let params = json!({ "raw_term": raw_term });
        if let Some(hit) = self.cache.get::<String>(NORMALIZED_CACHE_NS, &params).await {
            return Ok(hit);
        }

        let prompt = prompt::render(prompt::NORMALIZE_DISEASE, context! { raw_term })?;
        let normalized = clean_answer(&self.llm.complete(&prompt).await?);

        self.cache_put(NORMALIZED_CACHE_NS, &params, &normalized).await;
        Ok(normalized)
    }

    /// Primary organ or tissue of a disease, e.g. "colorectal cancer" -> "colon".
    pub async fn extract_organ_term(&self, disease_name: &str) -> Result<String, ScoutError> {
        let params = json!({ "disease_name": disease_name });
        if let Some(hit) = self.cache.get::<String>(ORGAN_CACHE_NS, &params).await {
            return Ok(hit);
        }

        let prompt = prompt::render(prompt::ORGAN_TERM, context! { disease_name })?;
        let organ = clean_answer(&self.llm.complete(&prompt).await?).to_lowercase();

        self.cache_put(ORGAN_CACHE_NS, &params, &organ).await;
        Ok(organ)
    }

    pub async fn normalize_for_pubmed(
        &self,
        raw_term: &str,
        drug_name: Option<&str>,
    ) -> Result<String, ScoutError> {
        let drug_name = drug_name.map(str::trim).filter(|d| !d.is_empty());
        let params = json!({ "raw_term": raw_term, "drug_name": drug_name });
        if let Some(hit) = self.cache.get::<String>(FINAL_CACHE_NS, &params).await {
            return Ok(hit);
        }

        let mut normalized = self.llm_normalize_disease(raw_term).await?;
        if normalized.is_empty() || is_overly_broad(&normalized) {
            info!(
                term = raw_term,
                rejected = %normalized,
                "Rejected over-broad normalization, keeping raw term"
            );
            normalized = raw_term.to_string();
        }

        if let Some(drug) = drug_name {
            let count = self
                .literature
                .count(&format!("{drug} AND ({normalized})"))
                .await;
            if count < MIN_RESULTS {
                let broader = self
                    .llm_normalize_disease(&format!("{normalized}{BROADEN_SUFFIX}"))
                    .await?;
                if broader.is_empty() || is_overly_broad(&broader) {
                    info!(
                        term = %normalized,
                        rejected = %broader,
                        "Rejected over-broad fallback"
                    );
                } else {
                    let broader_count = self
                        .literature
                        .count(&format!("{drug} AND ({broader})"))
                        .await;
                    if broader_count >= MIN_RESULTS {
                        normalized = broader;
                    } else {
                        debug!(
                            term = %normalized,
                            broader = %broader,
                            count = broader_count,
                            "Broader term still below minimum hits"
                        );
                    }
                }
            }
        }

        info!(term = raw_term, normalized = %normalized, "Normalized disease term");
        self.cache_put(FINAL_CACHE_NS, &params, &normalized).await;
        Ok(normalized)
    }

    /// Sequential on purpose: the literature count sits behind a per-second limit.
    pub async fn normalize_batch(
        &self,
        terms: &[String],
        drug_name: Option<&str>,
    ) -> Result<Vec<(String, String)>, ScoutError> {
        let mut out: Vec<(String, String)> = Vec::with_capacity(terms.len());
        for term in terms {
            if out.iter().any(|(raw, _)| raw == term) {
                continue;
            }
            let normalized = self.normalize_for_pubmed(term, drug_name).await?;
            out.push((term.clone(), normalized));
            if !self.batch_delay.is_zero() {
                tokio::time::sleep(self.batch_delay).await;
            }
        }
        Ok(out)
    }
}
