use std::borrow::Cow;

use serde::{Deserialize, Serialize};

use crate::error::ScoutError;

pub(crate) const CHEMBL_BASE: &str = "https://www.ebi.ac.uk/chembl/api/data";
pub(crate) const CHEMBL_API: &str = "chembl";
pub(crate) const CHEMBL_BASE_ENV: &str = "INDICATION_SCOUT_CHEMBL_BASE";

pub struct ChemblClient {
    client: reqwest_middleware::ClientWithMiddleware,
    base: Cow<'static, str>,
}

impl ChemblClient {
    pub fn new(client: reqwest_middleware::ClientWithMiddleware) -> Self {
        Self {
            client,
            base: crate::sources::env_base(CHEMBL_BASE, CHEMBL_BASE_ENV),
        }
    }

    #[cfg(test)]
    pub(crate) fn new_for_test(base: String) -> Self {
        Self {
            client: crate::sources::test_client(),
            base: Cow::Owned(base),
        }
    }

    fn endpoint(&self, path: &str) -> String {
        crate::sources::join_endpoint(&self.base, path)
    }

    pub async fn molecule(&self, chembl_id: &str) -> Result<ChemblMolecule, ScoutError> {
        let chembl_id = chembl_id.trim();
        if chembl_id.is_empty() {
            return Err(ScoutError::InvalidArgument("ChEMBL ID is required".into()));
        }

        let url = self.endpoint(&format!("molecule/{chembl_id}.json"));
        let resp = crate::sources::send_json::<ChemblMolecule>(CHEMBL_API, self.client.get(&url))
            .await;
        match resp {
            Err(err) if err.status() == Some(404) => Err(ScoutError::NotFound {
                entity: "molecule".into(),
                id: chembl_id.to_string(),
                suggestion: "Check the ChEMBL id (e.g. CHEMBL1431).".into(),
            }),
            other => other,
        }
    }

    /// ATC hierarchy for one level-5 code, e.g. `A10BA02`.
    pub async fn atc_description(&self, atc_code: &str) -> Result<AtcDescription, ScoutError> {
        let atc_code = atc_code.trim();
        if atc_code.is_empty() {
            return Err(ScoutError::InvalidArgument("ATC code is required".into()));
        }

        let url = self.endpoint(&format!("atc_class/{atc_code}.json"));
        crate::sources::send_json(CHEMBL_API, self.client.get(&url)).await
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct ChemblMolecule {
    pub molecule_chembl_id: String,
    pub molecule_type: Option<String>,
    #[serde(default)]
    pub atc_classifications: Vec<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct AtcDescription {
    pub level1: String,
    pub level1_description: String,
    pub level2: String,
    pub level2_description: String,
    pub level3: String,
    pub level3_description: String,
    pub level4: String,
    pub level4_description: String,
    pub level5: String,
    pub who_name: String,
}

#[cfg(test)]
mod tests {
    use super::*;
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    #[tokio::test]
    async fn molecule_reads_atc_classifications() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/molecule/CHEMBL1431.json"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "molecule_chembl_id": "CHEMBL1431",
                "molecule_type": "Small molecule",
                "max_phase": "4.0",
                "atc_classifications": ["A10BA02"]
            })))
            .mount(&server)
            .await;

        let client = ChemblClient::new_for_test(server.uri());
        let molecule = client.molecule("CHEMBL1431").await.unwrap();
        assert_eq!(molecule.molecule_chembl_id, "CHEMBL1431");
        assert_eq!(molecule.atc_classifications, vec!["A10BA02"]);
    }

    #[tokio::test]
    async fn molecule_404_is_not_found() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/molecule/CHEMBL0.json"))
            .respond_with(ResponseTemplate::new(404).set_body_string("not found"))
            .mount(&server)
            .await;

        let client = ChemblClient::new_for_test(server.uri());
        let err = client.molecule("CHEMBL0").await.unwrap_err();
        assert!(matches!(err, ScoutError::NotFound { .. }));
    }

    #[tokio::test]
    async fn atc_description_maps_levels() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/atc_class/A10BA02.json"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "level1": "A",
                "level1_description": "ALIMENTARY TRACT AND METABOLISM",
                "level2": "A10",
                "level2_description": "DRUGS USED IN DIABETES",
                "level3": "A10B",
                "level3_description": "BLOOD GLUCOSE LOWERING DRUGS, EXCL. INSULINS",
                "level4": "A10BA",
                "level4_description": "Biguanides",
                "level5": "A10BA02",
                "who_name": "metformin"
            })))
            .mount(&server)
            .await;

        let client = ChemblClient::new_for_test(server.uri());
        let atc = client.atc_description("A10BA02").await.unwrap();
        assert_eq!(atc.level4_description, "Biguanides");
        assert_eq!(atc.who_name, "metformin");
    }

    #[tokio::test]
    async fn atc_description_rejects_empty_code() {
        let client = ChemblClient::new_for_test("http://127.0.0.1".into());
        let err = client.atc_description(" ").await.unwrap_err();
        assert!(matches!(err, ScoutError::InvalidArgument(_)));
    }
}
