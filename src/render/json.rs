use serde::Serialize;

use crate::error::ScoutError;

pub fn to_pretty<T: Serialize>(value: &T) -> Result<String, ScoutError> {
    Ok(serde_json::to_string_pretty(value)?)
}

#[cfg(test)]
mod tests {
    use super::to_pretty;
    use crate::entities::landscape::aggregate_landscape;
    use crate::entities::trial::{Intervention, StopCategory, TerminatedTrial, Trial};

    #[test]
    fn to_pretty_serializes_with_indentation() {
        let json = to_pretty(&serde_json::json!({"drug": "metformin", "count": 3})).unwrap();
        assert!(json.contains('\n'));
        assert!(json.contains("\"drug\": \"metformin\""));
    }

    #[test]
    fn stop_category_renders_lowercase() {
        let trial = Trial {
            nct_id: "NCT00000001".into(),
            why_stopped: Some("Sponsor strategic decision".into()),
            ..Default::default()
        };
        let terminated = TerminatedTrial::from(trial);
        assert_eq!(terminated.stop_category, StopCategory::Business);
        let json = to_pretty(&terminated).unwrap();
        assert!(json.contains("\"stop_category\": \"business\""));
    }

    #[test]
    fn landscape_renders_phase_distribution_as_object() {
        let trial = Trial {
            nct_id: "NCT00000002".into(),
            phase: "Phase 2".into(),
            sponsor: "Pfizer".into(),
            interventions: vec![Intervention {
                intervention_type: "Drug".into(),
                intervention_name: "Metformin".into(),
                description: None,
            }],
            ..Default::default()
        };
        let json = to_pretty(&aggregate_landscape(&[trial], 10)).unwrap();
        assert!(json.contains("\"Phase 2\": 1"));
        assert!(json.contains("\"sponsor\": \"Pfizer\""));
    }
}
