//! Post-marketing safety signal from the FDA Adverse Event Reporting System (FAERS).

use serde::{Deserialize, Serialize};

use crate::error::ScoutError;
use crate::sources::openfda::OpenFdaClient;
use crate::transform;

pub const DEFAULT_REACTION_LIMIT: usize = 10;
pub const DEFAULT_EVENT_LIMIT: usize = 10;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReactionCount {
    pub term: String,
    pub count: u64,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct FaersEvent {
    pub medicinal_product: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub drug_indication: Option<String>,
    pub reaction: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reaction_outcome: Option<String>,
    /// `"1"` for serious reports, `"2"` otherwise.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub serious: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub company_numb: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AdverseEventSummary {
    pub drug: String,
    pub top_reactions: Vec<ReactionCount>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub events: Vec<FaersEvent>,
}

pub async fn get_top_reactions(
    client: &OpenFdaClient,
    drug_name: &str,
    limit: usize,
) -> Result<Vec<ReactionCount>, ScoutError> {
    Ok(client
        .reaction_counts(drug_name, limit)
        .await?
        .into_iter()
        .map(transform::adverse_event::from_count_bucket)
        .collect())
}

pub async fn get_events(
    client: &OpenFdaClient,
    drug_name: &str,
    limit: usize,
) -> Result<Vec<FaersEvent>, ScoutError> {
    Ok(client
        .events(drug_name, limit)
        .await?
        .into_iter()
        .map(transform::adverse_event::from_faers_event)
        .collect())
}

/// Top reactions, plus `event_limit` individual reports when asked for.
pub async fn summarize(
    client: &OpenFdaClient,
    drug_name: &str,
    reaction_limit: usize,
    event_limit: usize,
) -> Result<AdverseEventSummary, ScoutError> {
    let (top_reactions, events) = if event_limit == 0 {
        (get_top_reactions(client, drug_name, reaction_limit).await?, Vec::new())
    } else {
        tokio::try_join!(
            get_top_reactions(client, drug_name, reaction_limit),
            get_events(client, drug_name, event_limit),
        )?
    };
    Ok(AdverseEventSummary {
        drug: drug_name.trim().to_string(),
        top_reactions,
        events,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use wiremock::matchers::{method, path, query_param, query_param_is_missing};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    async fn mount_faers(server: &MockServer) {
        Mock::given(method("GET"))
            .and(path("/drug/event.json"))
            .and(query_param("count", "patient.reaction.reactionmeddrapt.exact"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "results": [{"term": "NAUSEA", "count": 812}, {"term": "DIARRHOEA", "count": 640}]
            })))
            .expect(1)
            .mount(server)
            .await;
        Mock::given(method("GET"))
            .and(path("/drug/event.json"))
            .and(query_param_is_missing("count"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "results": [{
                    "serious": "2",
                    "patient": {
                        "drug": [{"medicinalproduct": "SEMAGLUTIDE", "drugindication": "Obesity"}],
                        "reaction": [{"reactionmeddrapt": "Nausea", "reactionoutcome": "3"}]
                    }
                }]
            })))
            .mount(server)
            .await;
    }

    #[tokio::test]
    async fn summarize_joins_counts_and_events() {
        let server = MockServer::start().await;
        mount_faers(&server).await;

        let client = OpenFdaClient::new_for_test(server.uri(), None);
        let summary = summarize(&client, " semaglutide ", 10, 5).await.unwrap();
        assert_eq!(summary.drug, "semaglutide");
        assert_eq!(
            summary.top_reactions,
            vec![
                ReactionCount { term: "NAUSEA".into(), count: 812 },
                ReactionCount { term: "DIARRHOEA".into(), count: 640 },
            ]
        );
        assert_eq!(summary.events.len(), 1);
        assert_eq!(summary.events[0].reaction_outcome.as_deref(), Some("Recovering/Resolving"));
        assert_eq!(summary.events[0].drug_indication.as_deref(), Some("Obesity"));
    }

    #[tokio::test]
    async fn summarize_without_events_skips_report_query() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/drug/event.json"))
            .and(query_param("count", "patient.reaction.reactionmeddrapt.exact"))
            .and(query_param("limit", "3"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "results": [{"term": "NAUSEA", "count": 1}]
            })))
            .expect(1)
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/drug/event.json"))
            .and(query_param_is_missing("count"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({"results": []})))
            .expect(0)
            .mount(&server)
            .await;

        let client = OpenFdaClient::new_for_test(server.uri(), None);
        let summary = summarize(&client, "metformin", 3, 0).await.unwrap();
        assert_eq!(summary.top_reactions.len(), 1);
        assert!(summary.events.is_empty());
        let json = serde_json::to_value(&summary).unwrap();
        assert!(json.get("events").is_none());
    }
}
