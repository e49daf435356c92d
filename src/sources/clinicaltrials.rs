use std::borrow::Cow;

use serde::Deserialize;

use crate::error::ScoutError;
use crate::utils::date::DateCutoff;

pub(crate) const CTGOV_BASE: &str = "https://clinicaltrials.gov/api/v2";
pub(crate) const CTGOV_API: &str = "clinicaltrials";
pub(crate) const CTGOV_BASE_ENV: &str = "INDICATION_SCOUT_CTGOV_BASE";

/// Registry page size; a page shorter than this ends pagination.
pub const PAGE_SIZE: usize = 100;

#[derive(Clone)]
pub struct ClinicalTrialsClient {
    client: reqwest_middleware::ClientWithMiddleware,
    base: Cow<'static, str>,
}

/// Filters for one `/studies` request. Date and phase filters are embedded in `query.term`.
#[derive(Debug, Clone, Default)]
pub struct CtGovSearchParams {
    pub condition: Option<String>,
    pub intervention: Option<String>,
    pub term: Option<String>,
    pub date_before: Option<DateCutoff>,
    pub phase_filter: Option<String>,
    pub status_filter: Option<String>,
    pub page_size: usize,
    pub page_token: Option<String>,
}

impl CtGovSearchParams {
    pub(crate) fn to_query(&self) -> Vec<(&'static str, String)> {
        let mut query: Vec<(&'static str, String)> = vec![
            ("format", "json".to_string()),
            ("pageSize", self.page_size.max(1).to_string()),
            ("countTotal", "true".to_string()),
        ];

        if let Some(v) = non_empty(self.condition.as_deref()) {
            query.push(("query.cond", v.to_string()));
        }
        if let Some(v) = non_empty(self.intervention.as_deref()) {
            query.push(("query.intr", v.to_string()));
        }

        let mut term_parts: Vec<String> = Vec::new();
        if let Some(v) = non_empty(self.term.as_deref()) {
            term_parts.push(v.to_string());
        }
        if let Some(cutoff) = &self.date_before {
            term_parts.push(format!("AREA[StudyFirstPostDate]RANGE[MIN, {cutoff}]"));
        }
        if let Some(v) = non_empty(self.phase_filter.as_deref()) {
            term_parts.push(format!("AREA[Phase]{v}"));
        }
        if !term_parts.is_empty() {
            query.push(("query.term", term_parts.join(" ")));
        }

        if let Some(v) = non_empty(self.status_filter.as_deref()) {
            query.push(("filter.overallStatus", v.to_string()));
        }
        if let Some(v) = non_empty(self.page_token.as_deref()) {
            query.push(("pageToken", v.to_string()));
        }
        query
    }
}

fn non_empty(value: Option<&str>) -> Option<&str> {
    value.map(str::trim).filter(|v| !v.is_empty())
}

impl ClinicalTrialsClient {
    pub fn new(client: reqwest_middleware::ClientWithMiddleware) -> Self {
        Self {
            client,
            base: crate::sources::env_base(CTGOV_BASE, CTGOV_BASE_ENV),
        }
    }

    #[cfg(test)]
    pub(crate) fn new_for_test(base: String) -> Self {
        Self {
            client: crate::sources::test_client(),
            base: Cow::Owned(base),
        }
    }

    pub async fn search(
        &self,
        params: &CtGovSearchParams,
    ) -> Result<CtGovSearchResponse, ScoutError> {
        let url = crate::sources::join_endpoint(&self.base, "studies");
        let req = self.client.get(&url).query(&params.to_query());
        crate::sources::send_json(CTGOV_API, req).await
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CtGovSearchResponse {
    #[serde(default)]
    pub studies: Vec<CtGovStudy>,
    pub next_page_token: Option<String>,
    pub total_count: Option<usize>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CtGovStudy {
    pub protocol_section: Option<CtGovProtocolSection>,
    #[serde(default)]
    pub has_results: bool,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CtGovProtocolSection {
    pub identification_module: Option<CtGovIdentificationModule>,
    pub status_module: Option<CtGovStatusModule>,
    pub design_module: Option<CtGovDesignModule>,
    pub description_module: Option<CtGovDescriptionModule>,
    pub conditions_module: Option<CtGovConditionsModule>,
    pub sponsor_collaborators_module: Option<CtGovSponsorCollaboratorsModule>,
    pub arms_interventions_module: Option<CtGovArmsInterventionsModule>,
    pub outcomes_module: Option<CtGovOutcomesModule>,
    pub references_module: Option<CtGovReferencesModule>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CtGovIdentificationModule {
    pub nct_id: Option<String>,
    pub brief_title: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CtGovStatusModule {
    pub overall_status: Option<String>,
    pub why_stopped: Option<String>,
    pub start_date_struct: Option<CtGovDateStruct>,
    pub primary_completion_date_struct: Option<CtGovDateStruct>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct CtGovDateStruct {
    pub date: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CtGovDesignModule {
    pub study_type: Option<String>,
    #[serde(default)]
    pub phases: Vec<String>,
    pub enrollment_info: Option<CtGovEnrollmentInfo>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct CtGovEnrollmentInfo {
    pub count: Option<u32>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CtGovDescriptionModule {
    pub brief_summary: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct CtGovConditionsModule {
    #[serde(default)]
    pub conditions: Vec<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CtGovSponsorCollaboratorsModule {
    pub lead_sponsor: Option<CtGovOrganization>,
    #[serde(default)]
    pub collaborators: Vec<CtGovOrganization>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct CtGovOrganization {
    pub name: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct CtGovArmsInterventionsModule {
    #[serde(default)]
    pub interventions: Vec<CtGovIntervention>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct CtGovIntervention {
    #[serde(rename = "type")]
    pub intervention_type: Option<String>,
    pub name: Option<String>,
    pub description: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CtGovOutcomesModule {
    #[serde(default)]
    pub primary_outcomes: Vec<CtGovOutcome>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CtGovOutcome {
    pub measure: Option<String>,
    pub time_frame: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct CtGovReferencesModule {
    #[serde(default)]
    pub references: Vec<CtGovReference>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct CtGovReference {
    pub pmid: Option<String>,
}
