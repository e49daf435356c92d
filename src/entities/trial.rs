use std::fmt;

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::ScoutError;
use crate::sources::clinicaltrials::{ClinicalTrialsClient, CtGovSearchParams, PAGE_SIZE};
use crate::transform;
use crate::utils::date::DateCutoff;

pub const DEFAULT_SEARCH_MAX_RESULTS: usize = 200;
pub const DEFAULT_TERMINATED_MAX_RESULTS: usize = 100;
pub(crate) const TERMINAL_STATUS_FILTER: &str = "TERMINATED,WITHDRAWN,SUSPENDED";
pub(crate) const UNKNOWN_DRUG: &str = "Unknown";

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Trial {
    pub nct_id: String,
    pub title: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub brief_summary: Option<String>,
    pub phase: String,
    pub overall_status: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub why_stopped: Option<String>,
    #[serde(default)]
    pub conditions: Vec<String>,
    #[serde(default)]
    pub interventions: Vec<Intervention>,
    pub sponsor: String,
    #[serde(default)]
    pub collaborators: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub enrollment: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub start_date: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub completion_date: Option<String>,
    pub study_type: String,
    #[serde(default)]
    pub primary_outcomes: Vec<PrimaryOutcome>,
    pub results_posted: bool,
    #[serde(default)]
    pub references: Vec<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Intervention {
    pub intervention_type: String,
    pub intervention_name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
}

impl Intervention {
    pub fn is_drug(&self) -> bool {
        matches!(self.intervention_type.as_str(), "Drug" | "Biological")
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PrimaryOutcome {
    pub measure: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub time_frame: Option<String>,
}

impl Trial {
    /// First Drug or Biological intervention, if any.
    pub fn primary_drug(&self) -> Option<&Intervention> {
        self.interventions.iter().find(|i| i.is_drug())
    }

    pub fn primary_drug_name(&self) -> &str {
        self.primary_drug()
            .map(|i| i.intervention_name.as_str())
            .unwrap_or(UNKNOWN_DRUG)
    }

    pub fn primary_drug_type(&self) -> Option<&str> {
        self.primary_drug().map(|i| i.intervention_type.as_str())
    }
}

/// Rank over phase labels; higher is more advanced. Unrecognized labels rank 0.
pub fn phase_rank(phase: &str) -> u8 {
    match phase {
        "Not Applicable" => 0,
        "Early Phase 1" => 1,
        "Phase 1" => 2,
        "Phase 1/Phase 2" => 3,
        "Phase 2" => 4,
        "Phase 2/Phase 3" => 5,
        "Phase 3" => 6,
        "Phase 3/Phase 4" => 7,
        "Phase 4" => 8,
        _ => 0,
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StopCategory {
    Efficacy,
    Safety,
    Enrollment,
    Business,
    Other,
    Unknown,
}

impl StopCategory {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Efficacy => "efficacy",
            Self::Safety => "safety",
            Self::Enrollment => "enrollment",
            Self::Business => "business",
            Self::Other => "other",
            Self::Unknown => "unknown",
        }
    }
}

impl fmt::Display for StopCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// Order is precedence: the first phrase found in the text decides.
const STOP_KEYWORDS: &[(&str, StopCategory)] = &[
    ("efficacy", StopCategory::Efficacy),
    ("futility", StopCategory::Efficacy),
    ("lack of efficacy", StopCategory::Efficacy),
    ("no benefit", StopCategory::Efficacy),
    ("safety", StopCategory::Safety),
    ("adverse", StopCategory::Safety),
    ("toxicity", StopCategory::Safety),
    ("side effect", StopCategory::Safety),
    ("enrollment", StopCategory::Enrollment),
    ("accrual", StopCategory::Enrollment),
    ("recruitment", StopCategory::Enrollment),
    ("business", StopCategory::Business),
    ("strategic", StopCategory::Business),
    ("funding", StopCategory::Business),
    ("commercial", StopCategory::Business),
];

pub fn classify_stop_reason(why_stopped: Option<&str>) -> StopCategory {
    let Some(text) = why_stopped.filter(|s| !s.is_empty()) else {
        return StopCategory::Unknown;
    };
    let lower = text.to_lowercase();
    STOP_KEYWORDS
        .iter()
        .find(|(keyword, _)| lower.contains(keyword))
        .map(|(_, category)| *category)
        .unwrap_or(StopCategory::Other)
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TerminatedTrial {
    pub nct_id: String,
    pub title: String,
    pub drug_name: Option<String>,
    pub condition: Option<String>,
    pub phase: String,
    pub why_stopped: Option<String>,
    pub stop_category: StopCategory,
    pub enrollment: Option<u32>,
    pub sponsor: String,
    pub start_date: Option<String>,
    pub termination_date: Option<String>,
    #[serde(default)]
    pub references: Vec<String>,
}

impl From<Trial> for TerminatedTrial {
    fn from(trial: Trial) -> Self {
        let drug_name = trial.primary_drug().map(|i| i.intervention_name.clone());
        let stop_category = classify_stop_reason(trial.why_stopped.as_deref());
        Self {
            drug_name,
            condition: trial.conditions.into_iter().next(),
            nct_id: trial.nct_id,
            title: trial.title,
            phase: trial.phase,
            why_stopped: trial.why_stopped,
            stop_category,
            enrollment: trial.enrollment,
            sponsor: trial.sponsor,
            start_date: trial.start_date,
            termination_date: trial.completion_date,
            references: trial.references,
        }
    }
}

/// Follows `nextPageToken` until `max_results` trials are collected, the token runs out,
/// or a short page comes back. `None` fetches everything.
pub(crate) async fn fetch_pages(
    client: &ClinicalTrialsClient,
    mut params: CtGovSearchParams,
    max_results: Option<usize>,
) -> Result<Vec<Trial>, ScoutError> {
    params.page_size = PAGE_SIZE;
    params.page_token = None;

    let mut trials: Vec<Trial> = Vec::new();
    while max_results.is_none_or(|max| trials.len() < max) {
        let resp = client.search(&params).await?;
        let page_len = resp.studies.len();
        trials.extend(resp.studies.iter().map(transform::trial::from_ctgov_study));
        debug!(page_len, collected = trials.len(), "Fetched trial page");

        match resp.next_page_token.filter(|t| !t.is_empty()) {
            Some(token) if page_len >= PAGE_SIZE => params.page_token = Some(token),
            _ => break,
        }
    }

    if let Some(max) = max_results {
        trials.truncate(max);
    }
    Ok(trials)
}

pub(crate) fn required<'a>(value: &'a str, what: &str) -> Result<&'a str, ScoutError> {
    let value = value.trim();
    if value.is_empty() {
        return Err(ScoutError::InvalidArgument(format!("{what} is required")));
    }
    Ok(value)
}

/// Trials for a drug, optionally narrowed to a condition, a posting cutoff and a phase filter.
pub async fn search_trials(
    client: &ClinicalTrialsClient,
    drug: &str,
    condition: Option<&str>,
    date_before: Option<&DateCutoff>,
    phase_filter: Option<&str>,
    max_results: usize,
) -> Result<Vec<Trial>, ScoutError> {
    let drug = required(drug, "Drug")?;
    let condition = condition.map(|c| required(c, "Condition")).transpose()?;
    let params = CtGovSearchParams {
        intervention: Some(drug.to_string()),
        condition: condition.map(str::to_string),
        date_before: date_before.cloned(),
        phase_filter: phase_filter.map(str::to_string),
        ..Default::default()
    };
    fetch_pages(client, params, Some(max_results)).await
}

/// All trials for a condition (no drug filter).
pub(crate) async fn fetch_condition_trials(
    client: &ClinicalTrialsClient,
    condition: &str,
    date_before: Option<&DateCutoff>,
    max_results: Option<usize>,
    phase_filter: Option<&str>,
) -> Result<Vec<Trial>, ScoutError> {
    let condition = required(condition, "Condition")?;
    let params = CtGovSearchParams {
        condition: Some(condition.to_string()),
        date_before: date_before.cloned(),
        phase_filter: phase_filter.map(str::to_string),
        ..Default::default()
    };
    fetch_pages(client, params, max_results).await
}

/// Registry total for a drug and/or condition, without fetching records.
pub async fn count_trials(
    client: &ClinicalTrialsClient,
    drug: Option<&str>,
    condition: Option<&str>,
    date_before: Option<&DateCutoff>,
) -> Result<usize, ScoutError> {
    let params = CtGovSearchParams {
        intervention: drug.map(str::to_string),
        condition: condition.map(str::to_string),
        date_before: date_before.cloned(),
        page_size: 1,
        ..Default::default()
    };
    let resp = client.search(&params).await?;
    Ok(resp.total_count.unwrap_or(0))
}

/// Terminated, withdrawn or suspended trials matching a free-text query, classified by stop reason.
pub async fn get_terminated(
    client: &ClinicalTrialsClient,
    query: &str,
    date_before: Option<&DateCutoff>,
    max_results: usize,
) -> Result<Vec<TerminatedTrial>, ScoutError> {
    let query = required(query, "Query")?;
    let params = CtGovSearchParams {
        term: Some(query.to_string()),
        date_before: date_before.cloned(),
        status_filter: Some(TERMINAL_STATUS_FILTER.to_string()),
        ..Default::default()
    };
    let trials = fetch_pages(client, params, Some(max_results)).await?;
    Ok(trials.into_iter().map(TerminatedTrial::from).collect())
}
