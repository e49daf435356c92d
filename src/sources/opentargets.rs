use std::borrow::Cow;

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::error::ScoutError;

pub(crate) const OPENTARGETS_BASE: &str = "https://api.platform.opentargets.org/api/v4";
pub(crate) const OPENTARGETS_API: &str = "opentargets";
pub(crate) const OPENTARGETS_BASE_ENV: &str = "INDICATION_SCOUT_OPENTARGETS_BASE";

pub struct OpenTargetsClient {
    client: reqwest_middleware::ClientWithMiddleware,
    base: Cow<'static, str>,
}

impl OpenTargetsClient {
    pub fn new(client: reqwest_middleware::ClientWithMiddleware) -> Self {
        Self {
            client,
            base: crate::sources::env_base(OPENTARGETS_BASE, OPENTARGETS_BASE_ENV),
        }
    }

    #[cfg(test)]
    pub(crate) fn new_for_test(base: String) -> Self {
        Self {
            client: crate::sources::test_client(),
            base: Cow::Owned(base),
        }
    }

    async fn graphql<T: DeserializeOwned>(
        &self,
        query: &'static str,
        variables: serde_json::Value,
    ) -> Result<Option<T>, ScoutError> {
        let url = crate::sources::join_endpoint(&self.base, "graphql");
        let body = GraphQlRequest { query, variables };
        let resp: GraphQlResponse<T> =
            crate::sources::send_json(OPENTARGETS_API, self.client.post(&url).json(&body))
                .await?;

        if let Some(errors) = resp.errors {
            let msg = errors
                .into_iter()
                .filter_map(|e| e.message)
                .collect::<Vec<_>>()
                .join("; ");
            if !msg.is_empty() {
                return Err(ScoutError::api(OPENTARGETS_API, msg));
            }
        }
        Ok(resp.data)
    }

    /// Resolves a drug name to its ChEMBL id via the platform search.
    pub async fn search_drug_id(&self, name: &str) -> Result<String, ScoutError> {
        let name = name.trim();
        if name.is_empty() {
            return Err(ScoutError::InvalidArgument("Drug name is required".into()));
        }

        let data: Option<SearchData> = self
            .graphql(
                r#"
query SearchDrug($query: String!) {
  search(queryString: $query, entityNames: ["drug"], page: {index: 0, size: 1}) {
    hits {
      id
      entity
    }
  }
}
"#,
                serde_json::json!({ "query": name }),
            )
            .await?;

        data.and_then(|d| d.search)
            .and_then(|s| {
                s.hits
                    .into_iter()
                    .find(|h| h.entity.as_deref() == Some("drug"))
            })
            .and_then(|h| h.id)
            .map(|id| id.trim().to_string())
            .filter(|id| !id.is_empty())
            .ok_or_else(|| ScoutError::NotFound {
                entity: "drug".into(),
                id: name.to_string(),
                suggestion: "Check the spelling or try the generic (INN) drug name.".into(),
            })
    }

    pub async fn drug(&self, chembl_id: &str) -> Result<OpenTargetsDrug, ScoutError> {
        let chembl_id = chembl_id.trim();
        if chembl_id.is_empty() {
            return Err(ScoutError::InvalidArgument(
                "OpenTargets requires chemblId".into(),
            ));
        }

        let data: Option<DrugData> = self
            .graphql(
                r#"
query DrugProfile($chemblId: String!) {
  drug(chemblId: $chemblId) {
    id
    name
    synonyms
    tradeNames
    drugType
    mechanismsOfAction {
      rows {
        mechanismOfAction
        actionType
        targets {
          id
          approvedSymbol
        }
      }
    }
    indications {
      rows {
        maxPhaseForIndication
        disease {
          id
          name
        }
      }
    }
  }
}
"#,
                serde_json::json!({ "chemblId": chembl_id }),
            )
            .await?;

        let Some(node) = data.and_then(|d| d.drug) else {
            return Err(ScoutError::NotFound {
                entity: "drug".into(),
                id: chembl_id.to_string(),
                suggestion: "No Open Targets drug record for this ChEMBL id.".into(),
            });
        };

        let mut mechanisms = Vec::new();
        match node.mechanisms_of_action {
            Some(moa) => {
                for row in moa.rows {
                    let Some(mechanism) = clean(row.mechanism_of_action) else {
                        continue;
                    };
                    let targets = row
                        .targets
                        .into_iter()
                        .filter_map(|t| {
                            Some(OpenTargetsTarget {
                                id: clean(t.id)?,
                                approved_symbol: clean(t.approved_symbol)?,
                            })
                        })
                        .collect();
                    mechanisms.push(OpenTargetsMechanism {
                        mechanism_of_action: mechanism,
                        action_type: clean(row.action_type),
                        targets,
                    });
                }
            }
            None => warn_missing_field("DrugProfile", "data.drug.mechanismsOfAction"),
        }

        let indications = match node.indications {
            Some(ind) => ind
                .rows
                .into_iter()
                .filter_map(|row| {
                    let disease = row.disease?;
                    Some(OpenTargetsIndication {
                        disease_id: clean(disease.id)?,
                        disease_name: clean(disease.name)?,
                        max_phase: row.max_phase_for_indication.unwrap_or(0.0),
                    })
                })
                .collect(),
            None => {
                warn_missing_field("DrugProfile", "data.drug.indications");
                Vec::new()
            }
        };

        Ok(OpenTargetsDrug {
            chembl_id: clean(node.id).unwrap_or_else(|| chembl_id.to_string()),
            name: clean(node.name).unwrap_or_else(|| chembl_id.to_string()),
            synonyms: clean_all(node.synonyms),
            trade_names: clean_all(node.trade_names),
            drug_type: clean(node.drug_type).unwrap_or_default(),
            mechanisms,
            indications,
        })
    }
}

fn clean(value: Option<String>) -> Option<String> {
    value
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

fn clean_all(values: Option<Vec<String>>) -> Vec<String> {
    values
        .unwrap_or_default()
        .into_iter()
        .filter_map(|v| clean(Some(v)))
        .collect()
}

fn warn_missing_field(operation: &str, field: &str) {
    warn!(
        source = OPENTARGETS_API,
        operation = operation,
        field = field,
        "Missing expected GraphQL field; degrading response"
    );
}

#[derive(Debug, Clone, Default)]
pub struct OpenTargetsDrug {
    pub chembl_id: String,
    pub name: String,
    pub synonyms: Vec<String>,
    pub trade_names: Vec<String>,
    pub drug_type: String,
    pub mechanisms: Vec<OpenTargetsMechanism>,
    pub indications: Vec<OpenTargetsIndication>,
}

#[derive(Debug, Clone)]
pub struct OpenTargetsMechanism {
    pub mechanism_of_action: String,
    pub action_type: Option<String>,
    pub targets: Vec<OpenTargetsTarget>,
}

#[derive(Debug, Clone)]
pub struct OpenTargetsTarget {
    pub id: String,
    pub approved_symbol: String,
}

/// Approved or investigational indication; `max_phase` runs 0 to 4.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OpenTargetsIndication {
    pub disease_id: String,
    pub disease_name: String,
    pub max_phase: f64,
}

#[derive(Debug, Serialize)]
struct GraphQlRequest {
    query: &'static str,
    variables: serde_json::Value,
}

#[derive(Debug, Deserialize)]
struct GraphQlResponse<T> {
    data: Option<T>,
    errors: Option<Vec<GraphQlError>>,
}

#[derive(Debug, Deserialize)]
struct GraphQlError {
    message: Option<String>,
}

#[derive(Debug, Deserialize)]
struct SearchData {
    search: Option<SearchResult>,
}

#[derive(Debug, Deserialize)]
struct SearchResult {
    #[serde(default)]
    hits: Vec<SearchHit>,
}

#[derive(Debug, Deserialize)]
struct SearchHit {
    id: Option<String>,
    entity: Option<String>,
}

#[derive(Debug, Deserialize)]
struct DrugData {
    drug: Option<DrugNode>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct DrugNode {
    id: Option<String>,
    name: Option<String>,
    synonyms: Option<Vec<String>>,
    trade_names: Option<Vec<String>>,
    drug_type: Option<String>,
    mechanisms_of_action: Option<MechanismsOfAction>,
    indications: Option<Indications>,
}

#[derive(Debug, Deserialize)]
struct Indications {
    #[serde(default)]
    rows: Vec<IndicationRow>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct IndicationRow {
    max_phase_for_indication: Option<f64>,
    disease: Option<DiseaseNode>,
}

#[derive(Debug, Deserialize)]
struct DiseaseNode {
    id: Option<String>,
    name: Option<String>,
}

#[derive(Debug, Deserialize)]
struct MechanismsOfAction {
    #[serde(default)]
    rows: Vec<MechanismRow>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct MechanismRow {
    mechanism_of_action: Option<String>,
    action_type: Option<String>,
    #[serde(default)]
    targets: Vec<TargetNode>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct TargetNode {
    id: Option<String>,
    approved_symbol: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use wiremock::matchers::{body_string_contains, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    #[tokio::test]
    async fn search_drug_id_returns_first_drug_hit() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/graphql"))
            .and(body_string_contains("SearchDrug"))
            .and(body_string_contains("\"query\":\"metformin\""))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "data": {"search": {"hits": [{"id": "CHEMBL1431", "entity": "drug"}]}}
            })))
            .mount(&server)
            .await;

        let client = OpenTargetsClient::new_for_test(server.uri());
        assert_eq!(client.search_drug_id("metformin").await.unwrap(), "CHEMBL1431");
    }

    #[tokio::test]
    async fn search_drug_id_without_hits_is_not_found() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/graphql"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "data": {"search": {"hits": []}}
            })))
            .mount(&server)
            .await;

        let client = OpenTargetsClient::new_for_test(server.uri());
        let err = client.search_drug_id("notadrug").await.unwrap_err();
        assert!(matches!(err, ScoutError::NotFound { .. }));
    }

    #[tokio::test]
    async fn graphql_errors_become_api_errors() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/graphql"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "data": null,
                "errors": [{"message": "Syntax Error"}]
            })))
            .mount(&server)
            .await;

        let client = OpenTargetsClient::new_for_test(server.uri());
        let err = client.drug("CHEMBL1431").await.unwrap_err();
        assert!(err.to_string().contains("Syntax Error"));
    }

    #[tokio::test]
    async fn drug_maps_mechanisms_and_targets() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/graphql"))
            .and(body_string_contains("DrugProfile"))
            .and(body_string_contains("\"chemblId\":\"CHEMBL1431\""))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "data": {
                    "drug": {
                        "id": "CHEMBL1431",
                        "name": "METFORMIN",
                        "synonyms": ["Metformin", " "],
                        "tradeNames": ["Glucophage"],
                        "drugType": "Small molecule",
                        "mechanismsOfAction": {
                            "rows": [
                                {
                                    "mechanismOfAction": "Electron transport complex I inhibitor",
                                    "actionType": "INHIBITOR",
                                    "targets": [
                                        {"id": "ENSG00000004779", "approvedSymbol": "NDUFAB1"},
                                        {"id": "ENSG00000023228", "approvedSymbol": null}
                                    ]
                                },
                                {"mechanismOfAction": null, "targets": []}
                            ]
                        }
                    }
                }
            })))
            .mount(&server)
            .await;

        let client = OpenTargetsClient::new_for_test(server.uri());
        let drug = client.drug("CHEMBL1431").await.unwrap();
        assert_eq!(drug.name, "METFORMIN");
        assert_eq!(drug.synonyms, vec!["Metformin"]);
        assert_eq!(drug.trade_names, vec!["Glucophage"]);
        assert_eq!(drug.drug_type, "Small molecule");
        assert_eq!(drug.mechanisms.len(), 1);
        assert_eq!(drug.mechanisms[0].targets.len(), 1);
        assert_eq!(drug.mechanisms[0].targets[0].approved_symbol, "NDUFAB1");
        assert_eq!(drug.mechanisms[0].action_type.as_deref(), Some("INHIBITOR"));
    }

    #[tokio::test]
    async fn drug_degrades_when_mechanisms_missing() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/graphql"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "data": {"drug": {"id": "CHEMBL25", "name": "ASPIRIN"}}
            })))
            .mount(&server)
            .await;

        let client = OpenTargetsClient::new_for_test(server.uri());
        let drug = client.drug("CHEMBL25").await.unwrap();
        assert!(drug.mechanisms.is_empty());
        assert!(drug.synonyms.is_empty());
        assert!(drug.indications.is_empty());
    }

    #[tokio::test]
    async fn drug_maps_indications_and_skips_rows_without_disease() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/graphql"))
            .and(body_string_contains("maxPhaseForIndication"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "data": {
                    "drug": {
                        "id": "CHEMBL1431",
                        "name": "METFORMIN",
                        "mechanismsOfAction": {"rows": []},
                        "indications": {
                            "rows": [
                                {
                                    "maxPhaseForIndication": 4.0,
                                    "disease": {"id": "EFO_0001360", "name": "type 2 diabetes mellitus"}
                                },
                                {
                                    "maxPhaseForIndication": 2.0,
                                    "disease": {"id": "EFO_0000365", "name": "colorectal adenocarcinoma"}
                                },
                                {"maxPhaseForIndication": 1.0, "disease": null}
                            ]
                        }
                    }
                }
            })))
            .mount(&server)
            .await;

        let client = OpenTargetsClient::new_for_test(server.uri());
        let drug = client.drug("CHEMBL1431").await.unwrap();
        assert_eq!(drug.indications.len(), 2);
        assert_eq!(drug.indications[0].disease_name, "type 2 diabetes mellitus");
        assert_eq!(drug.indications[0].max_phase, 4.0);
        assert_eq!(drug.indications[1].disease_id, "EFO_0000365");
    }
}
