//! Competitive landscape and whitespace detection over clinical-trial records.
//!
//! Both views are built from the same parsed [`Trial`] values: whitespace asks whether a
//! drug-condition pair has any trials at all (and, if not, who else is active in the
//! condition); the landscape groups a condition's drug trials by sponsor and drug.

use std::collections::{BTreeMap, BTreeSet, HashMap, HashSet};

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::entities::trial::{
    Trial, UNKNOWN_DRUG, count_trials, fetch_condition_trials, phase_rank, required,
    search_trials,
};
use crate::error::ScoutError;
use crate::sources::clinicaltrials::ClinicalTrialsClient;
use crate::utils::date::DateCutoff;

pub const DEFAULT_TOP_N: usize = 50;
const EXACT_MATCH_LIMIT: usize = 50;
const CONDITION_FETCH_LIMIT: usize = 500;
const CONDITION_DRUG_LIMIT: usize = 50;
const WHITESPACE_PHASE_FILTER: &str = "(PHASE2 OR PHASE3 OR PHASE4)";
const LANDSCAPE_PHASE_FILTER: &str = "(EARLY_PHASE1 OR PHASE1 OR PHASE2 OR PHASE3 OR PHASE4)";
const RECENT_START_FLOOR: &str = "2024";
const ACTIVE_STATUSES: [&str; 3] = [
    "RECRUITING",
    "ACTIVE_NOT_RECRUITING",
    "ENROLLING_BY_INVITATION",
];

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConditionDrug {
    pub nct_id: String,
    pub drug_name: String,
    pub condition: String,
    pub phase: String,
    pub status: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WhitespaceResult {
    pub is_whitespace: bool,
    pub exact_match_count: usize,
    pub drug_only_trials: usize,
    pub condition_only_trials: usize,
    #[serde(default)]
    pub condition_drugs: Vec<ConditionDrug>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CompetitorEntry {
    pub sponsor: String,
    pub drug_name: String,
    pub drug_type: Option<String>,
    pub max_phase: String,
    pub trial_count: usize,
    pub statuses: BTreeSet<String>,
    pub total_enrollment: u64,
    pub most_recent_start: Option<String>,
}

impl CompetitorEntry {
    fn seed(trial: &Trial, drug_name: &str) -> Self {
        Self {
            sponsor: trial.sponsor.clone(),
            drug_name: drug_name.to_string(),
            drug_type: trial.primary_drug_type().map(str::to_string),
            max_phase: trial.phase.clone(),
            trial_count: 0,
            statuses: BTreeSet::new(),
            total_enrollment: 0,
            most_recent_start: None,
        }
    }

    fn fold(&mut self, trial: &Trial) {
        self.trial_count += 1;
        self.statuses.insert(trial.overall_status.clone());
        self.total_enrollment += u64::from(trial.enrollment.unwrap_or(0));

        if phase_rank(&trial.phase) > phase_rank(&self.max_phase) {
            self.max_phase = trial.phase.clone();
        }
        if let Some(start) = trial.start_date.as_deref()
            && self
                .most_recent_start
                .as_deref()
                .is_none_or(|current| start > current)
        {
            self.most_recent_start = Some(start.to_string());
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RecentStart {
    pub nct_id: String,
    pub sponsor: String,
    pub drug: String,
    pub phase: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConditionLandscape {
    /// Every input trial, drug or not.
    pub total_trial_count: usize,
    pub competitors: Vec<CompetitorEntry>,
    /// Drug and biological trials only.
    pub phase_distribution: BTreeMap<String, usize>,
    pub recent_starts: Vec<RecentStart>,
}

fn is_active(status: &str) -> bool {
    ACTIVE_STATUSES.contains(&status)
}

/// Is anyone running trials for this drug in this condition?
///
/// The exact-match search and both registry counts run concurrently. Only when the
/// exact match comes back empty are the condition's phase 2+ trials scanned for
/// competing drugs.
pub async fn detect_whitespace(
    client: &ClinicalTrialsClient,
    drug: &str,
    condition: &str,
    date_before: Option<&DateCutoff>,
) -> Result<WhitespaceResult, ScoutError> {
    // A blank condition would silently widen every query to the whole registry.
    let drug = required(drug, "Drug")?;
    let condition = required(condition, "Condition")?;
    let (exact, drug_only_trials, condition_only_trials) = tokio::try_join!(
        search_trials(
            client,
            drug,
            Some(condition),
            date_before,
            None,
            EXACT_MATCH_LIMIT
        ),
        count_trials(client, Some(drug), None, date_before),
        count_trials(client, None, Some(condition), date_before),
    )?;

    let mut condition_drugs = Vec::new();
    if exact.is_empty() {
        let condition_trials = fetch_condition_trials(
            client,
            condition,
            date_before,
            Some(CONDITION_FETCH_LIMIT),
            Some(WHITESPACE_PHASE_FILTER),
        )
        .await?;
        condition_drugs = rank_condition_drugs(&condition_trials);
        debug!(
            condition,
            scanned = condition_trials.len(),
            kept = condition_drugs.len(),
            "Collected condition drugs"
        );
    }

    Ok(WhitespaceResult {
        is_whitespace: exact.is_empty(),
        exact_match_count: exact.len(),
        drug_only_trials,
        condition_only_trials,
        condition_drugs,
    })
}

/// One candidate per trial (its first drug/biological intervention), most advanced and
/// active first, unique by drug name, capped at 50.
pub fn rank_condition_drugs(trials: &[Trial]) -> Vec<ConditionDrug> {
    let mut candidates: Vec<ConditionDrug> = trials
        .iter()
        .filter_map(|t| {
            let drug = t.primary_drug()?;
            Some(ConditionDrug {
                nct_id: t.nct_id.clone(),
                drug_name: drug.intervention_name.clone(),
                condition: t.conditions.first().cloned().unwrap_or_default(),
                phase: t.phase.clone(),
                status: t.overall_status.clone(),
            })
        })
        .collect();

    candidates.sort_by(|a, b| {
        let key_a = (phase_rank(&a.phase), is_active(&a.status));
        let key_b = (phase_rank(&b.phase), is_active(&b.status));
        key_b.cmp(&key_a)
    });

    let mut seen: HashSet<String> = HashSet::new();
    candidates
        .into_iter()
        .filter(|cd| seen.insert(cd.drug_name.clone()))
        .take(CONDITION_DRUG_LIMIT)
        .collect()
}

/// Competitive landscape for a condition across early phase 1 through phase 4.
pub async fn get_landscape(
    client: &ClinicalTrialsClient,
    condition: &str,
    date_before: Option<&DateCutoff>,
    top_n: usize,
) -> Result<ConditionLandscape, ScoutError> {
    let trials = fetch_condition_trials(
        client,
        condition,
        date_before,
        None,
        Some(LANDSCAPE_PHASE_FILTER),
    )
    .await?;
    debug!(condition, trials = trials.len(), "Aggregating landscape");
    Ok(aggregate_landscape(&trials, top_n))
}

/// Groups drug trials by (sponsor, drug) and ranks groups by max phase, then enrollment.
pub fn aggregate_landscape(trials: &[Trial], top_n: usize) -> ConditionLandscape {
    let mut phase_distribution: BTreeMap<String, usize> = BTreeMap::new();
    let mut recent_starts: Vec<RecentStart> = Vec::new();
    let mut competitors: Vec<CompetitorEntry> = Vec::new();
    let mut index: HashMap<(String, String), usize> = HashMap::new();

    for trial in trials {
        let drug_name = trial.primary_drug_name();
        if drug_name == UNKNOWN_DRUG {
            continue;
        }

        *phase_distribution.entry(trial.phase.clone()).or_default() += 1;

        // String comparison: partial dates such as "2024" or "2024-03" count.
        if trial
            .start_date
            .as_deref()
            .is_some_and(|start| start >= RECENT_START_FLOOR)
        {
            recent_starts.push(RecentStart {
                nct_id: trial.nct_id.clone(),
                sponsor: trial.sponsor.clone(),
                drug: drug_name.to_string(),
                phase: trial.phase.clone(),
            });
        }

        let key = (trial.sponsor.clone(), drug_name.to_string());
        let slot = *index.entry(key).or_insert_with(|| {
            competitors.push(CompetitorEntry::seed(trial, drug_name));
            competitors.len() - 1
        });
        competitors[slot].fold(trial);
    }

    competitors.sort_by(|a, b| {
        let key_a = (phase_rank(&a.max_phase), a.total_enrollment);
        let key_b = (phase_rank(&b.max_phase), b.total_enrollment);
        key_b.cmp(&key_a)
    });
    competitors.truncate(top_n);

    ConditionLandscape {
        total_trial_count: trials.len(),
        competitors,
        phase_distribution,
        recent_starts,
    }
}
