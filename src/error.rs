#[derive(thiserror::Error, Debug)]
#[non_exhaustive]
pub enum ScoutError {
    #[error("HTTP client initialization failed: {0}")]
    HttpClientInit(reqwest::Error),

    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("API error from {api}: {message}")]
    Api {
        api: String,
        message: String,
        status: Option<u16>,
    },

    #[error("API JSON error from {api}: {source}")]
    ApiJson {
        api: String,
        #[source]
        source: serde_json::Error,
    },

    #[error("{entity} '{id}' not found.\n\n{suggestion}")]
    NotFound {
        entity: String,
        id: String,
        suggestion: String,
    },

    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    #[error(
        "API key required: {api} requires {env_var} environment variable.\n\nTo set:\n  export {env_var}=your-key\n\nMore info: {docs_url}"
    )]
    ApiKeyRequired {
        api: String,
        env_var: String,
        docs_url: String,
    },

    #[error("Template error: {0}")]
    Template(#[from] minijinja::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl ScoutError {
    pub fn api(api: &str, message: impl Into<String>) -> Self {
        Self::Api {
            api: api.to_string(),
            message: message.into(),
            status: None,
        }
    }

    /// HTTP status attached to a data-source failure, if the upstream answered at all.
    pub fn status(&self) -> Option<u16> {
        match self {
            Self::Api { status, .. } => *status,
            Self::Http(err) | Self::HttpClientInit(err) => err.status().map(|s| s.as_u16()),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::ScoutError;

    #[test]
    fn not_found_display_includes_suggestion() {
        let err = ScoutError::NotFound {
            entity: "drug".to_string(),
            id: "notadrug".to_string(),
            suggestion: "Check the spelling or try a ChEMBL ID".to_string(),
        };

        let msg = err.to_string();
        assert!(msg.contains("drug 'notadrug' not found"));
        assert!(msg.contains("Check the spelling"));
    }

    #[test]
    fn api_key_required_display_includes_env_var_and_docs() {
        let err = ScoutError::ApiKeyRequired {
            api: "anthropic".to_string(),
            env_var: "ANTHROPIC_API_KEY".to_string(),
            docs_url: "https://docs.anthropic.com/".to_string(),
        };

        let msg = err.to_string();
        assert!(msg.contains("ANTHROPIC_API_KEY"));
        assert!(msg.contains("https://docs.anthropic.com/"));
    }

    #[test]
    fn api_error_carries_source_and_status() {
        let err = ScoutError::Api {
            api: "clinicaltrials".to_string(),
            message: "HTTP 503 Service Unavailable".to_string(),
            status: Some(503),
        };

        let msg = err.to_string();
        assert!(msg.contains("clinicaltrials"));
        assert!(msg.contains("HTTP 503"));
        assert_eq!(err.status(), Some(503));
    }

    #[test]
    fn api_helper_has_no_status() {
        let err = ScoutError::api("opentargets", "GraphQL errors: bad id");
        assert_eq!(err.status(), None);
        assert!(err.to_string().contains("GraphQL errors"));
    }
}
