use crate::entities::trial::{Intervention, PrimaryOutcome, Trial};
use crate::sources::clinicaltrials::{CtGovDateStruct, CtGovStudy};

pub(crate) const NOT_APPLICABLE: &str = "Not Applicable";
const DEFAULT_STUDY_TYPE: &str = "Interventional";

fn phase_label(code: &str) -> &str {
    match code {
        "EARLY_PHASE1" => "Early Phase 1",
        "PHASE1" => "Phase 1",
        "PHASE2" => "Phase 2",
        "PHASE3" => "Phase 3",
        "PHASE4" => "Phase 4",
        "NA" => NOT_APPLICABLE,
        other => other,
    }
}

/// `["PHASE2", "PHASE3"]` -> `"Phase 2/Phase 3"`. Unknown codes are kept as-is.
pub fn normalize_phase(phases: &[String]) -> String {
    if phases.is_empty() {
        return NOT_APPLICABLE.to_string();
    }
    phases
        .iter()
        .map(|p| phase_label(p))
        .collect::<Vec<_>>()
        .join("/")
}

/// `"DIETARY_SUPPLEMENT"` -> `"Dietary Supplement"`.
pub fn normalize_intervention_type(raw: &str) -> String {
    let mut out = String::with_capacity(raw.len());
    let mut prev_alpha = false;
    for c in raw.chars() {
        let c = if c == '_' { ' ' } else { c };
        if prev_alpha {
            out.extend(c.to_lowercase());
        } else {
            out.extend(c.to_uppercase());
        }
        prev_alpha = c.is_alphabetic();
    }
    out
}

fn extract_date(date: Option<&CtGovDateStruct>) -> Option<String> {
    date.and_then(|d| d.date.clone())
}

pub fn from_ctgov_study(study: &CtGovStudy) -> Trial {
    let p = study.protocol_section.as_ref();
    let ident = p.and_then(|p| p.identification_module.as_ref());
    let status = p.and_then(|p| p.status_module.as_ref());
    let design = p.and_then(|p| p.design_module.as_ref());
    let sponsors = p.and_then(|p| p.sponsor_collaborators_module.as_ref());

    let interventions = p
        .and_then(|p| p.arms_interventions_module.as_ref())
        .map(|m| {
            m.interventions
                .iter()
                .map(|i| Intervention {
                    intervention_type: normalize_intervention_type(
                        i.intervention_type.as_deref().unwrap_or_default(),
                    ),
                    intervention_name: i.name.clone().unwrap_or_default(),
                    description: i.description.clone(),
                })
                .collect()
        })
        .unwrap_or_default();

    let primary_outcomes = p
        .and_then(|p| p.outcomes_module.as_ref())
        .map(|m| {
            m.primary_outcomes
                .iter()
                .map(|o| PrimaryOutcome {
                    measure: o.measure.clone().unwrap_or_default(),
                    time_frame: o.time_frame.clone(),
                })
                .collect()
        })
        .unwrap_or_default();

    // References without a PMID are dropped.
    let references = p
        .and_then(|p| p.references_module.as_ref())
        .map(|m| {
            m.references
                .iter()
                .filter_map(|r| r.pmid.as_deref())
                .filter(|pmid| !pmid.is_empty())
                .map(str::to_string)
                .collect()
        })
        .unwrap_or_default();

    Trial {
        nct_id: ident
            .and_then(|m| m.nct_id.clone())
            .unwrap_or_default(),
        title: ident
            .and_then(|m| m.brief_title.clone())
            .unwrap_or_default(),
        brief_summary: p
            .and_then(|p| p.description_module.as_ref())
            .and_then(|m| m.brief_summary.clone()),
        phase: normalize_phase(design.map(|d| d.phases.as_slice()).unwrap_or_default()),
        overall_status: status
            .and_then(|m| m.overall_status.clone())
            .unwrap_or_default(),
        why_stopped: status.and_then(|m| m.why_stopped.clone()),
        conditions: p
            .and_then(|p| p.conditions_module.as_ref())
            .map(|m| m.conditions.clone())
            .unwrap_or_default(),
        interventions,
        sponsor: sponsors
            .and_then(|m| m.lead_sponsor.as_ref())
            .and_then(|s| s.name.clone())
            .unwrap_or_default(),
        collaborators: sponsors
            .map(|m| {
                m.collaborators
                    .iter()
                    .map(|c| c.name.clone().unwrap_or_default())
                    .collect()
            })
            .unwrap_or_default(),
        enrollment: design
            .and_then(|d| d.enrollment_info.as_ref())
            .and_then(|e| e.count),
        start_date: extract_date(status.and_then(|m| m.start_date_struct.as_ref())),
        completion_date: extract_date(
            status.and_then(|m| m.primary_completion_date_struct.as_ref()),
        ),
        study_type: design
            .and_then(|d| d.study_type.as_deref())
            .filter(|s| !s.is_empty())
            .unwrap_or(DEFAULT_STUDY_TYPE)
            .to_string(),
        primary_outcomes,
        results_posted: study.has_results,
        references,
    }
}
