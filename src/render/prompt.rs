//! LLM prompt templates, embedded from `prompts/` and rendered with strict undefined.

use std::sync::OnceLock;

use minijinja::{Environment, ErrorKind, UndefinedBehavior};
use rust_embed::RustEmbed;
use serde::Serialize;

use crate::error::ScoutError;

pub(crate) const NORMALIZE_DISEASE: &str = "normalize_disease";
pub(crate) const ORGAN_TERM: &str = "organ_term";
pub(crate) const EXPAND_SEARCH_TERMS: &str = "expand_search_terms";

#[derive(RustEmbed)]
#[folder = "prompts/"]
struct EmbeddedPrompts;

static ENV: OnceLock<Environment<'static>> = OnceLock::new();

fn env() -> &'static Environment<'static> {
    ENV.get_or_init(|| {
        let mut env = Environment::new();
        env.set_undefined_behavior(UndefinedBehavior::Strict);
        env.set_loader(|name| {
            let Some(file) = EmbeddedPrompts::get(&format!("{name}.j2")) else {
                return Ok(None);
            };
            String::from_utf8(file.data.into_owned())
                .map(Some)
                .map_err(|_| {
                    minijinja::Error::new(
                        ErrorKind::InvalidOperation,
                        format!("prompt {name} is not valid UTF-8"),
                    )
                })
        });
        env
    })
}

pub(crate) fn render<S: Serialize>(name: &str, ctx: S) -> Result<String, ScoutError> {
    let template = env().get_template(name)?;
    Ok(template.render(ctx)?)
}

#[cfg(test)]
mod tests {
    use super::*;
    use minijinja::context;

    #[test]
    fn normalize_prompt_ends_with_term() {
        let prompt = render(NORMALIZE_DISEASE, context! { raw_term => "CML" }).unwrap();
        assert!(prompt.starts_with("Convert this disease term into a PubMed search term."));
        assert!(prompt.contains("renal tubular dysgenesis → kidney disease"));
        assert!(prompt.ends_with("Term: CML"));
    }

    #[test]
    fn missing_variable_is_an_error() {
        let err = render(NORMALIZE_DISEASE, context! {}).unwrap_err();
        assert!(matches!(err, ScoutError::Template(_)));
    }

    #[test]
    fn unknown_template_is_an_error() {
        let err = render("no_such_prompt", context! {}).unwrap_err();
        assert!(matches!(err, ScoutError::Template(_)));
    }

    #[test]
    fn organ_prompt_ends_with_disease() {
        let prompt = render(ORGAN_TERM, context! { disease_name => "colorectal cancer" }).unwrap();
        assert!(prompt.ends_with("Disease: colorectal cancer"));
    }

    #[test]
    fn expand_prompt_lists_profile_fields() {
        let prompt = render(
            EXPAND_SEARCH_TERMS,
            context! {
                drug_name => "metformin",
                disease_name => "colorectal cancer",
                organ_term => "colon",
                targets => vec!["PRKAB1", "NDUFA1"],
                atc_descriptions => vec!["Biguanides"],
                mechanisms => Vec::<String>::new(),
                synonyms => vec!["Glucophage"],
            },
        )
        .unwrap();
        assert!(prompt.contains("Target genes: PRKAB1, NDUFA1"));
        assert!(prompt.contains("Mechanisms of action: none"));
        assert!(prompt.contains("ATC classes: Biguanides"));
        assert!(prompt.contains("organ or tissue of the disease: colon"));
        assert!(prompt.ends_with("Return ONLY a JSON array of query strings."));
    }
}
