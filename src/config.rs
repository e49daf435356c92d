//! Process-wide settings, read once at startup from the environment (and an optional `.env`).

use std::path::PathBuf;
use std::time::Duration;

pub(crate) const DEFAULT_CACHE_TTL: Duration = Duration::from_secs(5 * 86_400);
const DEFAULT_LLM_MODEL: &str = "claude-sonnet-4-6";
const DEFAULT_SMALL_LLM_MODEL: &str = "claude-haiku-4-5-20251001";

#[derive(Debug, Clone)]
pub struct Settings {
    pub anthropic_api_key: Option<String>,
    pub llm_model: String,
    pub small_llm_model: String,
    pub ncbi_api_key: Option<String>,
    pub openfda_api_key: Option<String>,
    pub cache_dir: PathBuf,
    pub cache_ttl: Duration,
    pub timeout: Duration,
    pub max_retries: u32,
    pub http_cache: bool,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            anthropic_api_key: None,
            llm_model: DEFAULT_LLM_MODEL.to_string(),
            small_llm_model: DEFAULT_SMALL_LLM_MODEL.to_string(),
            ncbi_api_key: None,
            openfda_api_key: None,
            cache_dir: default_cache_dir(),
            cache_ttl: DEFAULT_CACHE_TTL,
            timeout: Duration::from_secs(30),
            max_retries: 3,
            http_cache: true,
        }
    }
}

impl Settings {
    pub fn from_env() -> Self {
        let defaults = Self::default();
        Self {
            anthropic_api_key: env_string("ANTHROPIC_API_KEY"),
            llm_model: env_string("INDICATION_SCOUT_LLM_MODEL").unwrap_or(defaults.llm_model),
            small_llm_model: env_string("INDICATION_SCOUT_SMALL_LLM_MODEL")
                .unwrap_or(defaults.small_llm_model),
            ncbi_api_key: env_string("NCBI_API_KEY"),
            openfda_api_key: env_string("OPENFDA_API_KEY"),
            cache_dir: env_string("INDICATION_SCOUT_CACHE_DIR")
                .map(PathBuf::from)
                .unwrap_or(defaults.cache_dir),
            cache_ttl: env_string("INDICATION_SCOUT_CACHE_TTL_SECS")
                .and_then(|v| v.parse::<u64>().ok())
                .map(Duration::from_secs)
                .unwrap_or(defaults.cache_ttl),
            ..defaults
        }
    }
}

pub fn default_cache_dir() -> PathBuf {
    match dirs::cache_dir() {
        Some(dir) => dir.join("indication-scout"),
        None => std::env::temp_dir().join("indication-scout"),
    }
}

fn env_string(key: &str) -> Option<String> {
    std::env::var(key)
        .ok()
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_documented_values() {
        let settings = Settings::default();
        assert_eq!(settings.cache_ttl, Duration::from_secs(432_000));
        assert_eq!(settings.timeout, Duration::from_secs(30));
        assert_eq!(settings.max_retries, 3);
        assert!(settings.http_cache);
        assert!(settings.openfda_api_key.is_none());
        assert!(settings.cache_dir.ends_with("indication-scout"));
    }
}
