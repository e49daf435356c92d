use std::borrow::Cow;

use serde::Deserialize;
use serde::de::DeserializeOwned;
use tracing::debug;

use crate::error::ScoutError;

pub(crate) const OPENFDA_BASE: &str = "https://api.fda.gov";
pub(crate) const OPENFDA_API: &str = "openfda";
pub(crate) const OPENFDA_BASE_ENV: &str = "INDICATION_SCOUT_OPENFDA_BASE";
/// Largest `limit` the drug event endpoint accepts.
pub const OPENFDA_MAX_LIMIT: usize = 1000;
const REACTION_COUNT_FIELD: &str = "patient.reaction.reactionmeddrapt.exact";

pub struct OpenFdaClient {
    client: reqwest_middleware::ClientWithMiddleware,
    base: Cow<'static, str>,
    api_key: Option<String>,
}

impl OpenFdaClient {
    pub fn new(client: reqwest_middleware::ClientWithMiddleware, api_key: Option<String>) -> Self {
        Self {
            client,
            base: crate::sources::env_base(OPENFDA_BASE, OPENFDA_BASE_ENV),
            api_key: api_key
                .map(|v| v.trim().to_string())
                .filter(|v| !v.is_empty()),
        }
    }

    #[cfg(test)]
    pub(crate) fn new_for_test(base: String, api_key: Option<String>) -> Self {
        Self {
            client: crate::sources::test_client(),
            base: Cow::Owned(base),
            api_key,
        }
    }

    /// openFDA answers 404 when nothing matches the search; that reads as `None`.
    async fn get_json_optional<T: DeserializeOwned>(
        &self,
        req: reqwest_middleware::RequestBuilder,
    ) -> Result<Option<T>, ScoutError> {
        let resp = req
            .send()
            .await
            .map_err(|err| crate::sources::transport_error(OPENFDA_API, err))?;
        let status = resp.status();
        let bytes = crate::sources::read_limited_body(resp, OPENFDA_API).await?;

        if status.as_u16() == 404 {
            return Ok(None);
        }
        if !status.is_success() {
            return Err(crate::sources::status_error(OPENFDA_API, status, &bytes));
        }

        serde_json::from_slice(&bytes)
            .map(Some)
            .map_err(|source| ScoutError::ApiJson {
                api: OPENFDA_API.to_string(),
                source,
            })
    }

    fn event_request(&self, drug_name: &str, limit: usize) -> reqwest_middleware::RequestBuilder {
        let url = crate::sources::join_endpoint(&self.base, "drug/event.json");
        let search = medicinal_product_query(drug_name);
        let limit = limit.min(OPENFDA_MAX_LIMIT).to_string();
        let mut req = self
            .client
            .get(&url)
            .query(&[("search", search.as_str()), ("limit", limit.as_str())]);
        if let Some(key) = self.api_key.as_deref() {
            req = req.query(&[("api_key", key)]);
        }
        req
    }

    /// Most frequently reported MedDRA reaction terms for a drug.
    pub async fn reaction_counts(
        &self,
        drug_name: &str,
        limit: usize,
    ) -> Result<Vec<OpenFdaCountBucket>, ScoutError> {
        let drug_name = validate_drug(drug_name)?;
        let req = self
            .event_request(drug_name, limit)
            .query(&[("count", REACTION_COUNT_FIELD)]);
        let resp: Option<OpenFdaCountResponse> = self.get_json_optional(req).await?;
        let buckets = resp.map(|r| r.results).unwrap_or_default();
        debug!(source = OPENFDA_API, drug = drug_name, buckets = buckets.len(), "FAERS counts");
        Ok(buckets)
    }

    /// Individual FAERS reports that list the drug as a medicinal product.
    pub async fn events(
        &self,
        drug_name: &str,
        limit: usize,
    ) -> Result<Vec<FaersEventResult>, ScoutError> {
        let drug_name = validate_drug(drug_name)?;
        let req = self.event_request(drug_name, limit);
        let resp: Option<OpenFdaResponse<FaersEventResult>> = self.get_json_optional(req).await?;
        Ok(resp.map(|r| r.results).unwrap_or_default())
    }
}

fn validate_drug(drug_name: &str) -> Result<&str, ScoutError> {
    let drug_name = drug_name.trim();
    if drug_name.is_empty() {
        return Err(ScoutError::InvalidArgument("Drug name is required".into()));
    }
    if drug_name.len() > 256 {
        return Err(ScoutError::InvalidArgument("Drug name is too long".into()));
    }
    Ok(drug_name)
}

/// Exact-phrase match on the reported product name.
pub(crate) fn medicinal_product_query(drug_name: &str) -> String {
    let escaped = drug_name.replace('\\', "\\\\").replace('"', "\\\"");
    format!("patient.drug.medicinalproduct:\"{escaped}\"")
}

#[derive(Debug, Deserialize)]
pub struct OpenFdaResponse<T> {
    #[serde(default = "Vec::new")]
    pub results: Vec<T>,
}

#[derive(Debug, Deserialize)]
pub struct OpenFdaCountResponse {
    #[serde(default)]
    pub results: Vec<OpenFdaCountBucket>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct OpenFdaCountBucket {
    pub term: String,
    pub count: u64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct FaersEventResult {
    #[serde(default)]
    pub serious: Option<String>,
    #[serde(default)]
    pub companynumb: Option<String>,
    #[serde(default)]
    pub patient: Option<FaersPatient>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct FaersPatient {
    #[serde(default)]
    pub reaction: Vec<FaersReaction>,
    #[serde(default)]
    pub drug: Vec<FaersDrug>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct FaersReaction {
    #[serde(default)]
    pub reactionmeddrapt: Option<String>,
    #[serde(default)]
    pub reactionoutcome: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct FaersDrug {
    #[serde(default)]
    pub medicinalproduct: Option<String>,
    #[serde(default)]
    pub drugindication: Option<String>,
}
