//! Domain values and the workflows the CLI drives.

pub mod adverse_event;
pub mod disease;
pub mod drug;
pub mod landscape;
pub mod literature;
pub mod trial;

use std::sync::Arc;

use tracing::debug;

use crate::config::Settings;
use crate::entities::disease::DiseaseNormalizer;
use crate::error::ScoutError;
use crate::sources::chembl::ChemblClient;
use crate::sources::clinicaltrials::ClinicalTrialsClient;
use crate::sources::llm::{AnthropicClient, LlmClient};
use crate::sources::openfda::OpenFdaClient;
use crate::sources::opentargets::OpenTargetsClient;
use crate::sources::pubmed::{LiteratureCount, PubMedClient};
use crate::utils::cache::TtlCache;

/// Long-lived clients and the answer cache, built once per process.
pub struct Services {
    pub trials: ClinicalTrialsClient,
    pub opentargets: OpenTargetsClient,
    pub chembl: ChemblClient,
    pub openfda: OpenFdaClient,
    pub pubmed: Arc<PubMedClient>,
    pub llm: Arc<dyn LlmClient>,
    /// Cheaper model for term normalization and organ lookup.
    pub small_llm: Arc<dyn LlmClient>,
    pub literature: Arc<dyn LiteratureCount>,
    pub cache: TtlCache,
}

impl Services {
    pub fn from_settings(settings: &Settings) -> Result<Self, ScoutError> {
        let http = crate::sources::build_client(settings)?;
        let cache = if settings.http_cache {
            TtlCache::new(settings.cache_dir.join("answers"), settings.cache_ttl)
        } else {
            TtlCache::disabled()
        };

        let llm = AnthropicClient::new(
            http.clone(),
            settings.anthropic_api_key.clone(),
            settings.llm_model.clone(),
        );
        let small_llm = AnthropicClient::new(
            http.clone(),
            settings.anthropic_api_key.clone(),
            settings.small_llm_model.clone(),
        );
        debug!(
            model = llm.model(),
            small_model = small_llm.model(),
            cache = cache.is_enabled(),
            "Services ready"
        );

        let pubmed = Arc::new(PubMedClient::new(
            http.clone(),
            settings.ncbi_api_key.clone(),
            cache.clone(),
        ));

        Ok(Self {
            trials: ClinicalTrialsClient::new(http.clone()),
            opentargets: OpenTargetsClient::new(http.clone()),
            chembl: ChemblClient::new(http.clone()),
            openfda: OpenFdaClient::new(http, settings.openfda_api_key.clone()),
            literature: pubmed.clone(),
            pubmed,
            llm: Arc::new(llm),
            small_llm: Arc::new(small_llm),
            cache,
        })
    }

    pub fn disease_normalizer(&self) -> DiseaseNormalizer {
        DiseaseNormalizer::new(
            self.small_llm.clone(),
            self.literature.clone(),
            self.cache.clone(),
        )
    }

    /// Every HTTP client points at `base`; one wiremock server can stand in for all of them.
    #[cfg(test)]
    pub(crate) fn for_test(
        base: String,
        llm: Arc<dyn LlmClient>,
        literature: Arc<dyn LiteratureCount>,
        cache: TtlCache,
    ) -> Self {
        Self {
            trials: ClinicalTrialsClient::new_for_test(base.clone()),
            opentargets: OpenTargetsClient::new_for_test(base.clone()),
            chembl: ChemblClient::new_for_test(base.clone()),
            openfda: OpenFdaClient::new_for_test(base.clone(), None),
            pubmed: Arc::new(PubMedClient::new_for_test(base, cache.clone())),
            llm: llm.clone(),
            small_llm: llm,
            literature,
            cache,
        }
    }
}

#[cfg(test)]
pub(crate) mod fakes {
    use std::collections::HashMap;
    use std::sync::Mutex;

    use async_trait::async_trait;

    use crate::error::ScoutError;
    use crate::sources::llm::LlmClient;
    use crate::sources::pubmed::LiteratureCount;

    /// Answers keyed by the last non-empty line of the prompt.
    pub(crate) struct FakeLlm {
        answers: HashMap<String, String>,
        prompts: Mutex<Vec<String>>,
        called_at: Mutex<Vec<tokio::time::Instant>>,
    }

    impl FakeLlm {
        pub(crate) fn new(answers: &[(&str, &str)]) -> Self {
            Self {
                answers: answers
                    .iter()
                    .map(|(k, v)| (k.to_string(), v.to_string()))
                    .collect(),
                prompts: Mutex::new(Vec::new()),
                called_at: Mutex::new(Vec::new()),
            }
        }

        pub(crate) fn prompts(&self) -> Vec<String> {
            self.prompts.lock().unwrap().clone()
        }

        pub(crate) fn called_at(&self) -> Vec<tokio::time::Instant> {
            self.called_at.lock().unwrap().clone()
        }
    }

    #[async_trait]
    impl LlmClient for FakeLlm {
        async fn complete(&self, prompt: &str) -> Result<String, ScoutError> {
            self.prompts.lock().unwrap().push(prompt.to_string());
            self.called_at.lock().unwrap().push(tokio::time::Instant::now());
            let key = prompt
                .lines()
                .rev()
                .find(|l| !l.trim().is_empty())
                .unwrap_or_default()
                .trim();
            self.answers
                .get(key)
                .cloned()
                .ok_or_else(|| ScoutError::Api {
                    api: "anthropic".into(),
                    message: format!("no canned answer for {key:?}"),
                    status: Some(500),
                })
        }
    }

    /// Fixed hit counts; unknown queries count 0.
    pub(crate) struct FakeCounts {
        counts: HashMap<String, u64>,
        queries: Mutex<Vec<String>>,
    }

    impl FakeCounts {
        pub(crate) fn new(counts: &[(&str, u64)]) -> Self {
            Self {
                counts: counts.iter().map(|(k, v)| (k.to_string(), *v)).collect(),
                queries: Mutex::new(Vec::new()),
            }
        }

        pub(crate) fn queries(&self) -> Vec<String> {
            self.queries.lock().unwrap().clone()
        }
    }

    #[async_trait]
    impl LiteratureCount for FakeCounts {
        async fn count(&self, query: &str) -> u64 {
            self.queries.lock().unwrap().push(query.to_string());
            self.counts.get(query).copied().unwrap_or(0)
        }
    }
}
