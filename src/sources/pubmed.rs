use std::borrow::Cow;

use async_trait::async_trait;
use serde::Deserialize;
use tracing::{debug, warn};

use crate::entities::literature::PubmedAbstract;
use crate::error::ScoutError;
use crate::utils::cache::TtlCache;
use crate::utils::date::DateCutoff;

pub(crate) const PUBMED_BASE: &str = "https://eutils.ncbi.nlm.nih.gov/entrez/eutils";
pub(crate) const PUBMED_API: &str = "pubmed";
pub(crate) const PUBMED_BASE_ENV: &str = "INDICATION_SCOUT_PUBMED_BASE";
const COUNT_CACHE_NS: &str = "pubmed_count";
const SEARCH_CACHE_NS: &str = "pubmed_search";
/// PMIDs per `efetch` request.
pub const FETCH_BATCH_SIZE: usize = 100;
// `mindate` and `maxdate` only work as a pair.
const EARLIEST_PUB_DATE: &str = "1800/01/01";

/// Advisory hit count for a literature query. Never fails: problems read as zero hits.
#[async_trait]
pub trait LiteratureCount: Send + Sync {
    async fn count(&self, query: &str) -> u64;
}

pub struct PubMedClient {
    client: reqwest_middleware::ClientWithMiddleware,
    base: Cow<'static, str>,
    api_key: Option<String>,
    cache: TtlCache,
}

impl PubMedClient {
    pub fn new(
        client: reqwest_middleware::ClientWithMiddleware,
        api_key: Option<String>,
        cache: TtlCache,
    ) -> Self {
        Self {
            client,
            base: crate::sources::env_base(PUBMED_BASE, PUBMED_BASE_ENV),
            api_key,
            cache,
        }
    }

    #[cfg(test)]
    pub(crate) fn new_for_test(base: String, cache: TtlCache) -> Self {
        Self {
            client: crate::sources::test_client(),
            base: Cow::Owned(base),
            api_key: None,
            cache,
        }
    }

    fn esearch_params<'a>(
        &'a self,
        query: &'a str,
        retmax: &'a str,
        maxdate: Option<&'a str>,
    ) -> Vec<(&'a str, &'a str)> {
        let mut params: Vec<(&str, &str)> = vec![
            ("db", "pubmed"),
            ("term", query),
            ("retmode", "json"),
            ("retmax", retmax),
        ];
        if let Some(maxdate) = maxdate {
            params.extend([
                ("datetype", "pdat"),
                ("mindate", EARLIEST_PUB_DATE),
                ("maxdate", maxdate),
            ]);
        }
        if let Some(key) = self.api_key.as_deref() {
            params.push(("api_key", key));
        }
        params
    }

    /// Raw `esearch` hit count, optionally limited to articles published on or before
    /// `date_before`. Every failure is returned to the caller.
    pub async fn esearch_count(
        &self,
        query: &str,
        date_before: Option<&DateCutoff>,
    ) -> Result<u64, ScoutError> {
        let url = crate::sources::join_endpoint(&self.base, "esearch.fcgi");
        let maxdate = date_before.map(eutils_date);
        let params = self.esearch_params(query, "0", maxdate.as_deref());

        let resp: ESearchResponse =
            crate::sources::send_json(PUBMED_API, self.client.get(&url).query(&params)).await?;
        let Some(result) = resp.esearchresult else {
            return Ok(0);
        };
        parse_count(result.count.as_ref())
    }

    /// PMIDs matching `query`, best match first as PubMed orders them. Cached per
    /// query, limit and cutoff.
    pub async fn search(
        &self,
        query: &str,
        max_results: usize,
        date_before: Option<&DateCutoff>,
    ) -> Result<Vec<String>, ScoutError> {
        let query = query.trim();
        if query.is_empty() {
            return Err(ScoutError::InvalidArgument("Query is required".into()));
        }
        let cache_params = serde_json::json!({
            "query": query,
            "max_results": max_results,
            "date_before": date_before.map(DateCutoff::as_str),
        });
        if let Some(hit) = self.cache.get::<Vec<String>>(SEARCH_CACHE_NS, &cache_params).await {
            return Ok(hit);
        }

        let url = crate::sources::join_endpoint(&self.base, "esearch.fcgi");
        let retmax = max_results.to_string();
        let maxdate = date_before.map(eutils_date);
        let params = self.esearch_params(query, &retmax, maxdate.as_deref());
        let resp: ESearchResponse =
            crate::sources::send_json(PUBMED_API, self.client.get(&url).query(&params)).await?;
        let pmids = resp.esearchresult.map(|r| r.idlist).unwrap_or_default();
        debug!(source = PUBMED_API, query, hits = pmids.len(), "PubMed search");

        if let Err(err) = self.cache.set(SEARCH_CACHE_NS, &cache_params, &pmids, None).await {
            warn!(source = PUBMED_API, "Failed to cache PubMed search: {err}");
        }
        Ok(pmids)
    }

    /// Titles, abstracts and indexing terms for `pmids`, fetched in batches of
    /// [`FETCH_BATCH_SIZE`]. Records without a PMID are dropped.
    pub async fn fetch_abstracts(&self, pmids: &[String]) -> Result<Vec<PubmedAbstract>, ScoutError> {
        let url = crate::sources::join_endpoint(&self.base, "efetch.fcgi");
        let mut articles = Vec::with_capacity(pmids.len());
        for batch in pmids.chunks(FETCH_BATCH_SIZE) {
            let ids = batch.join(",");
            let mut params: Vec<(&str, &str)> = vec![
                ("db", "pubmed"),
                ("id", ids.as_str()),
                ("retmode", "xml"),
                ("rettype", "abstract"),
            ];
            if let Some(key) = self.api_key.as_deref() {
                params.push(("api_key", key));
            }
            let (bytes, _) =
                crate::sources::send_bytes(PUBMED_API, self.client.get(&url).query(&params))
                    .await?;
            let xml = String::from_utf8_lossy(&bytes);
            articles.extend(crate::transform::article::parse_pubmed_xml(&xml)?);
        }
        Ok(articles)
    }
}

// E-utilities dates are slash-separated.
fn eutils_date(cutoff: &DateCutoff) -> String {
    cutoff.as_str().replace('-', "/")
}

#[async_trait]
impl LiteratureCount for PubMedClient {
    async fn count(&self, query: &str) -> u64 {
        let params = serde_json::json!({ "query": query });
        if let Some(hit) = self.cache.get::<u64>(COUNT_CACHE_NS, &params).await {
            return hit;
        }

        match self.esearch_count(query, None).await {
            Ok(count) => {
                debug!(source = PUBMED_API, query, count, "PubMed count");
                if let Err(err) = self.cache.set(COUNT_CACHE_NS, &params, &count, None).await {
                    warn!(source = PUBMED_API, "Failed to cache PubMed count: {err}");
                }
                count
            }
            Err(err) => {
                warn!(source = PUBMED_API, query, "PubMed count failed: {err}");
                0
            }
        }
    }
}

#[derive(Debug, Deserialize)]
struct ESearchResponse {
    esearchresult: Option<ESearchResult>,
}

#[derive(Debug, Deserialize)]
struct ESearchResult {
    count: Option<serde_json::Value>,
    #[serde(default)]
    idlist: Vec<String>,
}

// E-utilities reports the count as a string; accept a bare number too.
fn parse_count(value: Option<&serde_json::Value>) -> Result<u64, ScoutError> {
    match value {
        None | Some(serde_json::Value::Null) => Ok(0),
        Some(serde_json::Value::Number(n)) => n
            .as_u64()
            .ok_or_else(|| ScoutError::api(PUBMED_API, format!("Invalid count: {n}"))),
        Some(serde_json::Value::String(s)) => s
            .trim()
            .parse::<u64>()
            .map_err(|_| ScoutError::api(PUBMED_API, format!("Invalid count: {s}"))),
        Some(other) => Err(ScoutError::api(
            PUBMED_API,
            format!("Unexpected count value: {other}"),
        )),
    }
}
