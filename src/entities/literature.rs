//! PubMed literature search: hit counts, ranked PMIDs and parsed abstracts.

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::ScoutError;
use crate::sources::pubmed::PubMedClient;
use crate::utils::date::DateCutoff;

pub const DEFAULT_MAX_RESULTS: usize = 50;

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PubmedAbstract {
    pub pmid: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    #[serde(rename = "abstract", skip_serializing_if = "Option::is_none")]
    pub abstract_text: Option<String>,
    #[serde(default)]
    pub authors: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub journal: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub pub_date: Option<String>,
    #[serde(default)]
    pub mesh_terms: Vec<String>,
    #[serde(default)]
    pub keywords: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LiteratureSearch {
    pub query: String,
    pub total: u64,
    pub articles: Vec<PubmedAbstract>,
}

/// Total hits plus the top `max_results` abstracts, both bounded by `date_before`.
pub async fn search_literature(
    client: &PubMedClient,
    query: &str,
    max_results: usize,
    date_before: Option<&DateCutoff>,
) -> Result<LiteratureSearch, ScoutError> {
    let query = query.trim();
    let (total, pmids) = tokio::try_join!(
        client.esearch_count(query, date_before),
        client.search(query, max_results, date_before),
    )?;
    let articles = client.fetch_abstracts(&pmids).await?;
    debug!(query, total, fetched = articles.len(), "Literature search");
    Ok(LiteratureSearch {
        query: query.to_string(),
        total,
        articles,
    })
}

/// Hit count for a query, with failures returned rather than read as zero.
pub async fn count_literature(
    client: &PubMedClient,
    query: &str,
    date_before: Option<&DateCutoff>,
) -> Result<u64, ScoutError> {
    let query = query.trim();
    if query.is_empty() {
        return Err(ScoutError::InvalidArgument("Query is required".into()));
    }
    client.esearch_count(query, date_before).await
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::utils::cache::TtlCache;
    use wiremock::matchers::{method, path, query_param};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    #[tokio::test]
    async fn search_literature_counts_searches_and_fetches() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/esearch.fcgi"))
            .and(query_param("retmax", "0"))
            .and(query_param("maxdate", "2020/01/01"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "esearchresult": {"count": "88"}
            })))
            .expect(1)
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/esearch.fcgi"))
            .and(query_param("retmax", "2"))
            .and(query_param("maxdate", "2020/01/01"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "esearchresult": {"count": "88", "idlist": ["111", "222"]}
            })))
            .expect(1)
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/efetch.fcgi"))
            .and(query_param("id", "111,222"))
            .respond_with(ResponseTemplate::new(200).set_body_string(
                "<PubmedArticleSet>\
                 <PubmedArticle><MedlineCitation><PMID>111</PMID><Article><ArticleTitle>A</ArticleTitle></Article></MedlineCitation></PubmedArticle>\
                 <PubmedArticle><MedlineCitation><PMID>222</PMID><Article><ArticleTitle>B</ArticleTitle></Article></MedlineCitation></PubmedArticle>\
                 </PubmedArticleSet>",
            ))
            .expect(1)
            .mount(&server)
            .await;

        let client = PubMedClient::new_for_test(server.uri(), TtlCache::disabled());
        let cutoff = DateCutoff::parse("2020").unwrap();
        let result = search_literature(&client, " semaglutide AND alcohol use disorder ", 2, Some(&cutoff))
            .await
            .unwrap();
        assert_eq!(result.query, "semaglutide AND alcohol use disorder");
        assert_eq!(result.total, 88);
        let ids: Vec<&str> = result.articles.iter().map(|a| a.pmid.as_str()).collect();
        assert_eq!(ids, vec!["111", "222"]);
    }

    #[tokio::test]
    async fn count_literature_surfaces_errors() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/esearch.fcgi"))
            .respond_with(ResponseTemplate::new(429).set_body_string("slow down"))
            .mount(&server)
            .await;

        let client = PubMedClient::new_for_test(server.uri(), TtlCache::disabled());
        let err = count_literature(&client, "metformin", None).await.unwrap_err();
        assert_eq!(err.status(), Some(429));

        let err = count_literature(&client, " ", None).await.unwrap_err();
        assert!(matches!(err, ScoutError::InvalidArgument(_)));
    }

    #[test]
    fn abstract_field_serializes_as_abstract() {
        let article = PubmedAbstract {
            pmid: "1".into(),
            abstract_text: Some("Text".into()),
            ..Default::default()
        };
        let json = serde_json::to_value(&article).unwrap();
        assert_eq!(json["abstract"], "Text");
        assert!(json.get("title").is_none());
    }
}
