use std::collections::HashSet;
use std::sync::OnceLock;

use minijinja::context;
use regex::Regex;
use serde::{Deserialize, Serialize};
use serde_json::json;
use tracing::{debug, warn};

use crate::entities::Services;
use crate::error::ScoutError;
use crate::render::prompt;
use crate::sources::chembl::AtcDescription;
use crate::sources::opentargets::{OpenTargetsDrug, OpenTargetsIndication};

const EXPAND_CACHE_NS: &str = "expand_search_terms";

const SALT_SUFFIXES: [&str; 17] = [
    " hydrochloride",
    " hydrobromide",
    " sulfate",
    " succinate",
    " chloride",
    " dimesylate",
    " tartrate",
    " citrate",
    " tosylate",
    " mesylate",
    " saccharate",
    " hemihydrate",
    " maleate",
    " phosphate",
    " malate",
    " esylate",
    " anhydrous",
];

/// Lowercases and strips one trailing salt form: `"Metformin Hydrochloride"` -> `"metformin"`.
pub fn normalize_drug_name(name: &str) -> String {
    let lower = name.to_lowercase();
    for suffix in SALT_SUFFIXES {
        if let Some(stem) = lower.strip_suffix(suffix) {
            return stem.trim().to_string();
        }
    }
    lower
}

/// One drug-target relationship, as reported by the mechanism-of-action rows.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DrugTarget {
    pub target_id: String,
    pub target_symbol: String,
    pub mechanism_of_action: String,
    pub action_type: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DrugData {
    pub chembl_id: String,
    pub name: String,
    pub synonyms: Vec<String>,
    pub trade_names: Vec<String>,
    pub drug_type: String,
    pub atc_classifications: Vec<String>,
    pub targets: Vec<DrugTarget>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TargetData {
    pub target_id: String,
    pub symbol: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RichDrugData {
    pub drug: DrugData,
    pub targets: Vec<TargetData>,
}

impl RichDrugData {
    /// Flattens mechanism rows into drug-target pairs and collects the distinct targets.
    pub fn from_sources(
        ot: OpenTargetsDrug,
        atc_classifications: Vec<String>,
        drug_type: String,
    ) -> Self {
        let mut drug_targets = Vec::new();
        let mut targets: Vec<TargetData> = Vec::new();
        for mechanism in ot.mechanisms {
            if mechanism.targets.is_empty() {
                drug_targets.push(DrugTarget {
                    mechanism_of_action: mechanism.mechanism_of_action.clone(),
                    action_type: mechanism.action_type.clone(),
                    ..Default::default()
                });
            }
            for target in mechanism.targets {
                drug_targets.push(DrugTarget {
                    target_id: target.id.clone(),
                    target_symbol: target.approved_symbol.clone(),
                    mechanism_of_action: mechanism.mechanism_of_action.clone(),
                    action_type: mechanism.action_type.clone(),
                });
                if !targets.iter().any(|t| t.target_id == target.id) {
                    targets.push(TargetData {
                        target_id: target.id,
                        symbol: target.approved_symbol,
                    });
                }
            }
        }

        Self {
            drug: DrugData {
                chembl_id: ot.chembl_id,
                name: ot.name,
                synonyms: ot.synonyms,
                trade_names: ot.trade_names,
                drug_type,
                atc_classifications,
                targets: drug_targets,
            },
            targets,
        }
    }
}

/// The drug facts the query expander works from.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DrugProfile {
    pub name: String,
    pub synonyms: Vec<String>,
    pub target_gene_symbols: Vec<String>,
    pub mechanisms_of_action: Vec<String>,
    pub atc_codes: Vec<String>,
    pub atc_descriptions: Vec<String>,
    pub drug_type: String,
}

fn dedup_ordered<I: IntoIterator<Item = String>>(items: I) -> Vec<String> {
    let mut seen = HashSet::new();
    items
        .into_iter()
        .filter(|item| !item.is_empty() && seen.insert(item.clone()))
        .collect()
}

impl DrugProfile {
    /// ATC levels 1 and 2 are too broad for queries; only levels 3 and 4 are kept.
    pub fn from_rich_drug_data(rich: &RichDrugData, atc: &[AtcDescription]) -> Self {
        let drug = &rich.drug;
        Self {
            name: drug.name.clone(),
            synonyms: dedup_ordered(
                drug.synonyms
                    .iter()
                    .chain(drug.trade_names.iter())
                    .cloned(),
            ),
            target_gene_symbols: dedup_ordered(rich.targets.iter().map(|t| t.symbol.clone())),
            mechanisms_of_action: dedup_ordered(
                drug.targets.iter().map(|t| t.mechanism_of_action.clone()),
            ),
            atc_codes: drug.atc_classifications.clone(),
            atc_descriptions: dedup_ordered(atc.iter().flat_map(|a| {
                [a.level3_description.clone(), a.level4_description.clone()]
            })),
            drug_type: drug.drug_type.clone(),
        }
    }
}

/// Open Targets search -> Open Targets drug -> ChEMBL molecule -> one ATC lookup per code.
pub async fn build_drug_profile(
    services: &Services,
    name: &str,
) -> Result<DrugProfile, ScoutError> {
    let chembl_id = services.opentargets.search_drug_id(name).await?;
    let (ot, molecule) = tokio::try_join!(
        services.opentargets.drug(&chembl_id),
        services.chembl.molecule(&chembl_id),
    )?;

    let mut atc = Vec::with_capacity(molecule.atc_classifications.len());
    for code in &molecule.atc_classifications {
        atc.push(services.chembl.atc_description(code).await?);
    }
    debug!(drug = name, chembl_id = %chembl_id, atc_codes = atc.len(), "Built drug profile");

    let drug_type = if ot.drug_type.is_empty() {
        molecule.molecule_type.clone().unwrap_or_default()
    } else {
        ot.drug_type.clone()
    };
    let rich = RichDrugData::from_sources(ot, molecule.atc_classifications, drug_type);
    Ok(DrugProfile::from_rich_drug_data(&rich, &atc))
}

/// Diseases the drug is approved for or trialled in, highest clinical phase first.
pub async fn get_drug_indications(
    services: &Services,
    name: &str,
) -> Result<Vec<OpenTargetsIndication>, ScoutError> {
    let chembl_id = services.opentargets.search_drug_id(name).await?;
    let mut indications = services.opentargets.drug(&chembl_id).await?.indications;
    indications.sort_by(|a, b| b.max_phase.total_cmp(&a.max_phase));
    Ok(indications)
}

fn json_array_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"(?s)\[.*?\]").expect("valid regex"))
}

/// First JSON string array in an LLM answer; otherwise the whole answer as one item.
pub fn parse_llm_list(text: &str) -> Vec<String> {
    if let Some(found) = json_array_re().find(text)
        && let Ok(items) = serde_json::from_str::<Vec<String>>(found.as_str())
    {
        return items;
    }
    let trimmed = text.trim();
    if trimmed.is_empty() {
        Vec::new()
    } else {
        vec![trimmed.to_string()]
    }
}

/// LLM-generated PubMed queries for a drug-disease pair, deduplicated case-insensitively.
pub async fn expand_search_terms(
    services: &Services,
    drug_name: &str,
    disease_name: &str,
    profile: &DrugProfile,
) -> Result<Vec<String>, ScoutError> {
    let params = json!({ "drug_name": drug_name, "disease_name": disease_name });
    if let Some(hit) = services
        .cache
        .get::<Vec<String>>(EXPAND_CACHE_NS, &params)
        .await
    {
        return Ok(hit);
    }

    let organ_term = services
        .disease_normalizer()
        .extract_organ_term(disease_name)
        .await?;
    let prompt = prompt::render(
        prompt::EXPAND_SEARCH_TERMS,
        context! {
            drug_name,
            disease_name,
            organ_term,
            targets => &profile.target_gene_symbols,
            atc_descriptions => &profile.atc_descriptions,
            mechanisms => &profile.mechanisms_of_action,
            synonyms => &profile.synonyms,
        },
    )?;
    let answer = services.llm.complete(&prompt).await?;

    let mut seen = HashSet::new();
    let queries: Vec<String> = parse_llm_list(&answer)
        .into_iter()
        .map(|q| q.trim().to_string())
        .filter(|q| !q.is_empty() && seen.insert(q.to_lowercase()))
        .collect();

    if let Err(err) = services
        .cache
        .set(EXPAND_CACHE_NS, &params, &queries, None)
        .await
    {
        warn!(namespace = EXPAND_CACHE_NS, "Cache write failed: {err}");
    }
    Ok(queries)
}
