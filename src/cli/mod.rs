use clap::{Args, Parser, Subcommand};
use serde::Serialize;

use crate::config::Settings;
use crate::entities::Services;
use crate::entities::{adverse_event, drug, landscape, literature, trial};
use crate::render::json::to_pretty;
use crate::utils::date::DateCutoff;

#[derive(Parser, Debug)]
#[command(
    name = "indication-scout",
    version,
    about = "Drug-repurposing evidence from ClinicalTrials.gov, Open Targets, ChEMBL and PubMed"
)]
pub struct Cli {
    /// Bypass the HTTP and answer caches
    #[arg(long, global = true)]
    pub no_cache: bool,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Clinical-trial search, whitespace detection and competitive landscapes
    #[command(subcommand)]
    Trials(TrialsCommand),
    /// Disease-term normalization for PubMed queries
    #[command(subcommand)]
    Disease(DiseaseCommand),
    /// Drug profiles and literature query expansion
    #[command(subcommand)]
    Drug(DrugCommand),
    /// PubMed searches and hit counts
    #[command(subcommand)]
    Literature(LiteratureCommand),
}

#[derive(Args, Debug, Clone)]
pub struct CutoffArg {
    /// Only trials first posted before this date (YYYY, YYYY-MM or YYYY-MM-DD)
    #[arg(long)]
    pub before: Option<DateCutoff>,
}

#[derive(Subcommand, Debug)]
pub enum TrialsCommand {
    /// Trials testing a drug, optionally for one condition
    Search {
        drug: String,
        #[arg(long)]
        condition: Option<String>,
        /// Registry phase expression, e.g. "(PHASE2 OR PHASE3)"
        #[arg(long)]
        phase: Option<String>,
        #[arg(long, default_value_t = trial::DEFAULT_SEARCH_MAX_RESULTS)]
        max_results: usize,
        #[command(flatten)]
        cutoff: CutoffArg,
    },
    /// Registry total for a drug and/or condition
    Count {
        #[arg(long)]
        drug: Option<String>,
        #[arg(long)]
        condition: Option<String>,
        #[command(flatten)]
        cutoff: CutoffArg,
    },
    /// Whether a drug-condition pair has been tested, and who competes if not
    Whitespace {
        drug: String,
        condition: String,
        #[command(flatten)]
        cutoff: CutoffArg,
    },
    /// Sponsors and drugs active in a condition, ranked by phase then enrollment
    Landscape {
        condition: String,
        #[arg(long, default_value_t = landscape::DEFAULT_TOP_N)]
        top_n: usize,
        #[command(flatten)]
        cutoff: CutoffArg,
    },
    /// Stopped trials matching a query, classified by stop reason
    Terminated {
        query: String,
        #[arg(long, default_value_t = trial::DEFAULT_TERMINATED_MAX_RESULTS)]
        max_results: usize,
        #[command(flatten)]
        cutoff: CutoffArg,
    },
}

#[derive(Subcommand, Debug)]
pub enum DiseaseCommand {
    /// Normalize one or more raw disease terms into PubMed search terms
    Normalize {
        #[arg(required = true)]
        terms: Vec<String>,
        /// Verify each term against PubMed hits for this drug
        #[arg(long)]
        drug: Option<String>,
    },
    /// Primary organ or tissue affected by a disease
    Organ { disease: String },
}

#[derive(Subcommand, Debug)]
pub enum DrugCommand {
    /// Synonyms, targets, mechanisms and ATC classes for a drug
    Profile { name: String },
    /// PubMed queries for a drug-disease pair
    Expand { drug: String, disease: String },
    /// Strip salt forms from a drug name
    Normalize { name: String },
    /// Diseases the drug is approved for or in trials for, by clinical phase
    Indications { name: String },
    /// Most reported FAERS reactions, plus sample reports
    AdverseEvents {
        name: String,
        #[arg(long, default_value_t = adverse_event::DEFAULT_REACTION_LIMIT)]
        reactions: usize,
        /// Individual reports to include; 0 skips them
        #[arg(long, default_value_t = adverse_event::DEFAULT_EVENT_LIMIT)]
        events: usize,
    },
}

#[derive(Subcommand, Debug)]
pub enum LiteratureCommand {
    /// Hit count plus parsed abstracts for the top matches
    Search {
        query: String,
        #[arg(long, default_value_t = literature::DEFAULT_MAX_RESULTS)]
        max_results: usize,
        /// Only articles published on or before this date
        #[arg(long)]
        before: Option<DateCutoff>,
    },
    /// PubMed hit count for a query
    Count {
        query: String,
        #[arg(long)]
        before: Option<DateCutoff>,
    },
}

#[derive(Serialize)]
struct NormalizedTerm {
    raw: String,
    normalized: String,
}

#[derive(Serialize)]
struct TrialCount {
    total: usize,
}

#[derive(Serialize)]
struct OrganTerm {
    disease: String,
    organ: String,
}

#[derive(Serialize)]
struct ExpandedQueries {
    drug: String,
    disease: String,
    queries: Vec<String>,
}

#[derive(Serialize)]
struct LiteratureHits {
    query: String,
    total: u64,
}

#[derive(Serialize)]
struct DrugName {
    raw: String,
    normalized: String,
}

pub async fn run(cli: Cli) -> anyhow::Result<String> {
    // Pure transforms need no network clients.
    if let Commands::Drug(DrugCommand::Normalize { name }) = &cli.command {
        return Ok(to_pretty(&DrugName {
            normalized: drug::normalize_drug_name(name),
            raw: name.clone(),
        })?);
    }

    let mut settings = Settings::from_env();
    if cli.no_cache {
        settings.http_cache = false;
    }
    let services = Services::from_settings(&settings)?;

    let out = match cli.command {
        Commands::Trials(cmd) => run_trials(&services, cmd).await?,
        Commands::Disease(cmd) => run_disease(&services, cmd).await?,
        Commands::Drug(cmd) => run_drug(&services, cmd).await?,
        Commands::Literature(cmd) => run_literature(&services, cmd).await?,
    };
    Ok(out)
}

async fn run_trials(services: &Services, cmd: TrialsCommand) -> anyhow::Result<String> {
    let client = &services.trials;
    let out = match cmd {
        TrialsCommand::Search {
            drug,
            condition,
            phase,
            max_results,
            cutoff,
        } => to_pretty(
            &trial::search_trials(
                client,
                &drug,
                condition.as_deref(),
                cutoff.before.as_ref(),
                phase.as_deref(),
                max_results,
            )
            .await?,
        )?,
        TrialsCommand::Count {
            drug,
            condition,
            cutoff,
        } => {
            if drug.is_none() && condition.is_none() {
                anyhow::bail!("trials count needs --drug and/or --condition");
            }
            let total = trial::count_trials(
                client,
                drug.as_deref(),
                condition.as_deref(),
                cutoff.before.as_ref(),
            )
            .await?;
            to_pretty(&TrialCount { total })?
        }
        TrialsCommand::Whitespace {
            drug,
            condition,
            cutoff,
        } => to_pretty(
            &landscape::detect_whitespace(client, &drug, &condition, cutoff.before.as_ref())
                .await?,
        )?,
        TrialsCommand::Landscape {
            condition,
            top_n,
            cutoff,
        } => to_pretty(
            &landscape::get_landscape(client, &condition, cutoff.before.as_ref(), top_n).await?,
        )?,
        TrialsCommand::Terminated {
            query,
            max_results,
            cutoff,
        } => to_pretty(
            &trial::get_terminated(client, &query, cutoff.before.as_ref(), max_results).await?,
        )?,
    };
    Ok(out)
}

async fn run_disease(services: &Services, cmd: DiseaseCommand) -> anyhow::Result<String> {
    let normalizer = services.disease_normalizer();
    let out = match cmd {
        DiseaseCommand::Normalize { terms, drug } => {
            let pairs = if let [term] = terms.as_slice() {
                let normalized = normalizer
                    .normalize_for_pubmed(term, drug.as_deref())
                    .await?;
                vec![(term.clone(), normalized)]
            } else {
                normalizer.normalize_batch(&terms, drug.as_deref()).await?
            };
            let rows: Vec<NormalizedTerm> = pairs
                .into_iter()
                .map(|(raw, normalized)| NormalizedTerm { raw, normalized })
                .collect();
            to_pretty(&rows)?
        }
        DiseaseCommand::Organ { disease } => {
            let organ = normalizer.extract_organ_term(&disease).await?;
            to_pretty(&OrganTerm { disease, organ })?
        }
    };
    Ok(out)
}

async fn run_drug(services: &Services, cmd: DrugCommand) -> anyhow::Result<String> {
    let out = match cmd {
        DrugCommand::Profile { name } => {
            to_pretty(&drug::build_drug_profile(services, &name).await?)?
        }
        DrugCommand::Expand {
            drug: drug_name,
            disease,
        } => {
            let profile = drug::build_drug_profile(services, &drug_name).await?;
            let queries =
                drug::expand_search_terms(services, &drug_name, &disease, &profile).await?;
            to_pretty(&ExpandedQueries {
                drug: drug_name,
                disease,
                queries,
            })?
        }
        DrugCommand::Normalize { name } => to_pretty(&DrugName {
            normalized: drug::normalize_drug_name(&name),
            raw: name,
        })?,
        DrugCommand::Indications { name } => {
            to_pretty(&drug::get_drug_indications(services, &name).await?)?
        }
        DrugCommand::AdverseEvents {
            name,
            reactions,
            events,
        } => to_pretty(
            &adverse_event::summarize(&services.openfda, &name, reactions, events).await?,
        )?,
    };
    Ok(out)
}

async fn run_literature(services: &Services, cmd: LiteratureCommand) -> anyhow::Result<String> {
    let client = services.pubmed.as_ref();
    let out = match cmd {
        LiteratureCommand::Search {
            query,
            max_results,
            before,
        } => to_pretty(
            &literature::search_literature(client, &query, max_results, before.as_ref()).await?,
        )?,
        LiteratureCommand::Count { query, before } => {
            let total = literature::count_literature(client, &query, before.as_ref()).await?;
            to_pretty(&LiteratureHits { query, total })?
        }
    };
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_whitespace_with_cutoff() {
        let cli = Cli::try_parse_from([
            "indication-scout",
            "trials",
            "whitespace",
            "metformin",
            "colorectal cancer",
            "--before",
            "2020-06",
        ])
        .unwrap();
        let Commands::Trials(TrialsCommand::Whitespace {
            drug,
            condition,
            cutoff,
        }) = cli.command
        else {
            panic!("expected trials whitespace");
        };
        assert_eq!(drug, "metformin");
        assert_eq!(condition, "colorectal cancer");
        assert_eq!(cutoff.before.unwrap().as_str(), "2020-06-01");
    }

    #[test]
    fn rejects_malformed_cutoff() {
        let err = Cli::try_parse_from([
            "indication-scout",
            "trials",
            "landscape",
            "gout",
            "--before",
            "June 2020",
        ])
        .unwrap_err();
        assert!(err.to_string().contains("--before"));
    }

    #[test]
    fn defaults_come_from_workflow_constants() {
        let cli = Cli::try_parse_from(["indication-scout", "trials", "landscape", "gout"]).unwrap();
        let Commands::Trials(TrialsCommand::Landscape { top_n, .. }) = cli.command else {
            panic!("expected trials landscape");
        };
        assert_eq!(top_n, 50);

        let cli = Cli::try_parse_from(["indication-scout", "trials", "search", "metformin"]).unwrap();
        let Commands::Trials(TrialsCommand::Search { max_results, .. }) = cli.command else {
            panic!("expected trials search");
        };
        assert_eq!(max_results, 200);
    }

    #[test]
    fn no_cache_is_global() {
        let cli = Cli::try_parse_from([
            "indication-scout",
            "disease",
            "normalize",
            "atopic eczema",
            "CML",
            "--drug",
            "tacrolimus",
            "--no-cache",
        ])
        .unwrap();
        assert!(cli.no_cache);
        let Commands::Disease(DiseaseCommand::Normalize { terms, drug }) = cli.command else {
            panic!("expected disease normalize");
        };
        assert_eq!(terms, vec!["atopic eczema", "CML"]);
        assert_eq!(drug.as_deref(), Some("tacrolimus"));
    }

    #[test]
    fn parses_adverse_events_limits() {
        let cli = Cli::try_parse_from([
            "indication-scout",
            "drug",
            "adverse-events",
            "semaglutide",
            "--events",
            "0",
        ])
        .unwrap();
        let Commands::Drug(DrugCommand::AdverseEvents {
            name,
            reactions,
            events,
        }) = cli.command
        else {
            panic!("expected drug adverse-events");
        };
        assert_eq!(name, "semaglutide");
        assert_eq!(reactions, 10);
        assert_eq!(events, 0);
    }

    #[test]
    fn parses_literature_search_with_cutoff() {
        let cli = Cli::try_parse_from([
            "indication-scout",
            "literature",
            "search",
            "metformin AND colorectal cancer",
            "--max-results",
            "5",
            "--before",
            "2018",
        ])
        .unwrap();
        let Commands::Literature(LiteratureCommand::Search {
            query,
            max_results,
            before,
        }) = cli.command
        else {
            panic!("expected literature search");
        };
        assert_eq!(query, "metformin AND colorectal cancer");
        assert_eq!(max_results, 5);
        assert_eq!(before.unwrap().as_str(), "2018-01-01");

        let cli =
            Cli::try_parse_from(["indication-scout", "literature", "search", "gout"]).unwrap();
        let Commands::Literature(LiteratureCommand::Search { max_results, .. }) = cli.command
        else {
            panic!("expected literature search");
        };
        assert_eq!(max_results, literature::DEFAULT_MAX_RESULTS);
    }

    #[tokio::test]
    async fn drug_normalize_runs_offline() {
        let cli = Cli::try_parse_from([
            "indication-scout",
            "drug",
            "normalize",
            "Imatinib Mesylate",
        ])
        .unwrap();
        let out = run(cli).await.unwrap();
        assert!(out.contains("\"normalized\": \"imatinib\""));
    }
}
