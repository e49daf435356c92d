use crate::entities::adverse_event::{FaersEvent, ReactionCount};
use crate::sources::openfda::{FaersEventResult, OpenFdaCountBucket};

/// FAERS `reactionoutcome` code -> label. Codes outside 1-6 have no label.
pub fn reaction_outcome_label(code: &str) -> Option<&'static str> {
    match code.trim() {
        "1" => Some("Recovered/Resolved"),
        "2" => Some("Not Recovered/Not Resolved"),
        "3" => Some("Recovering/Resolving"),
        "4" => Some("Recovered/Resolved with Sequelae"),
        "5" => Some("Fatal"),
        "6" => Some("Unknown"),
        _ => None,
    }
}

pub fn from_count_bucket(bucket: OpenFdaCountBucket) -> ReactionCount {
    ReactionCount {
        term: bucket.term,
        count: bucket.count,
    }
}

/// One row per report: the first listed drug and the first listed reaction.
pub fn from_faers_event(raw: FaersEventResult) -> FaersEvent {
    let (first_drug, first_reaction) = match raw.patient {
        Some(patient) => (
            patient.drug.into_iter().next(),
            patient.reaction.into_iter().next(),
        ),
        None => (None, None),
    };
    let (medicinal_product, drug_indication) = first_drug
        .map(|d| (d.medicinalproduct.unwrap_or_default(), d.drugindication))
        .unwrap_or_default();
    let (reaction, reaction_outcome) = first_reaction
        .map(|r| {
            let outcome = r
                .reactionoutcome
                .as_deref()
                .and_then(reaction_outcome_label)
                .map(str::to_string);
            (r.reactionmeddrapt.unwrap_or_default(), outcome)
        })
        .unwrap_or_default();

    FaersEvent {
        medicinal_product,
        drug_indication,
        reaction,
        reaction_outcome,
        serious: raw.serious,
        company_numb: raw.companynumb,
    }
}
