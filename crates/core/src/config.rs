use crate::error::ConfigError;
use url::Url;

pub const OPENAI_KEY_VAR: &str = "AZURE_OPENAI_KEY";
pub const OPENAI_ENDPOINT_VAR: &str = "AZURE_OPENAI_ENDPOINT";
pub const EMBEDDING_DEPLOYMENT_VAR: &str = "EMBEDDING_DEPLOYMENT_NAME";
pub const CHAT_DEPLOYMENT_VAR: &str = "CHAT_DEPLOYMENT_NAME";
pub const SEARCH_ENDPOINT_VAR: &str = "AZURE_SEARCH_SERVICE_ENDPOINT";
pub const SEARCH_INDEX_VAR: &str = "AZURE_SEARCH_INDEX_NAME";
pub const SEARCH_ADMIN_KEY_VAR: &str = "AZURE_SEARCH_ADMIN_KEY";

pub const EMBEDDINGS_API_VERSION: &str = "2023-12-01-preview";
pub const CHAT_API_VERSION: &str = "2023-05-15";
pub const SEARCH_API_VERSION: &str = "2023-11-01";
pub const DEFAULT_CHAT_DEPLOYMENT: &str = "gpt";

/// Credentials and deployment names for the Azure OpenAI resource.
#[derive(Debug, Clone)]
pub struct OpenAiConfig {
    pub endpoint: Url,
    pub api_key: String,
    pub embedding_deployment: Option<String>,
    pub chat_deployment: String,
}

impl OpenAiConfig {
    /// Builds the config from raw values, reporting every missing one at once.
    ///
    /// `require_embeddings` makes the embedding deployment mandatory; the chat
    /// deployment falls back to [`DEFAULT_CHAT_DEPLOYMENT`].
    pub fn from_values(
        endpoint: Option<String>,
        api_key: Option<String>,
        embedding_deployment: Option<String>,
        chat_deployment: Option<String>,
        require_embeddings: bool,
    ) -> Result<Self, ConfigError> {
        let endpoint = non_empty(endpoint);
        let api_key = non_empty(api_key);
        let embedding_deployment = non_empty(embedding_deployment);

        let mut missing = Vec::new();
        if endpoint.is_none() {
            missing.push(OPENAI_ENDPOINT_VAR);
        }
        if api_key.is_none() {
            missing.push(OPENAI_KEY_VAR);
        }
        if require_embeddings && embedding_deployment.is_none() {
            missing.push(EMBEDDING_DEPLOYMENT_VAR);
        }

        match (endpoint, api_key) {
            (Some(endpoint), Some(api_key)) if missing.is_empty() => Ok(Self {
                endpoint: parse_endpoint(OPENAI_ENDPOINT_VAR, &endpoint)?,
                api_key,
                embedding_deployment,
                chat_deployment: non_empty(chat_deployment)
                    .unwrap_or_else(|| DEFAULT_CHAT_DEPLOYMENT.to_string()),
            }),
            _ => Err(ConfigError::Missing(missing)),
        }
    }

    pub fn from_env(require_embeddings: bool) -> Result<Self, ConfigError> {
        Self::from_values(
            std::env::var(OPENAI_ENDPOINT_VAR).ok(),
            std::env::var(OPENAI_KEY_VAR).ok(),
            std::env::var(EMBEDDING_DEPLOYMENT_VAR).ok(),
            std::env::var(CHAT_DEPLOYMENT_VAR).ok(),
            require_embeddings,
        )
    }
}

/// Endpoint, index, and admin key of the Azure AI Search service.
#[derive(Debug, Clone)]
pub struct SearchServiceConfig {
    pub endpoint: Url,
    pub index_name: String,
    pub admin_key: String,
}

impl SearchServiceConfig {
    pub fn from_values(
        endpoint: Option<String>,
        index_name: Option<String>,
        admin_key: Option<String>,
    ) -> Result<Self, ConfigError> {
        let endpoint = non_empty(endpoint);
        let index_name = non_empty(index_name);
        let admin_key = non_empty(admin_key);

        match (endpoint, index_name, admin_key) {
            (Some(endpoint), Some(index_name), Some(admin_key)) => Ok(Self {
                endpoint: parse_endpoint(SEARCH_ENDPOINT_VAR, &endpoint)?,
                index_name,
                admin_key,
            }),
            (endpoint, index_name, admin_key) => {
                let missing = [
                    (endpoint.is_none(), SEARCH_ENDPOINT_VAR),
                    (index_name.is_none(), SEARCH_INDEX_VAR),
                    (admin_key.is_none(), SEARCH_ADMIN_KEY_VAR),
                ]
                .into_iter()
                .filter_map(|(absent, name)| absent.then_some(name))
                .collect();
                Err(ConfigError::Missing(missing))
            }
        }
    }

    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_values(
            std::env::var(SEARCH_ENDPOINT_VAR).ok(),
            std::env::var(SEARCH_INDEX_VAR).ok(),
            std::env::var(SEARCH_ADMIN_KEY_VAR).ok(),
        )
    }
}

fn non_empty(value: Option<String>) -> Option<String> {
    value.and_then(|value| {
        let trimmed = value.trim().to_string();
        if trimmed.is_empty() {
            None
        } else {
            Some(trimmed)
        }
    })
}

// A trailing slash keeps `Url::join` from dropping the last path segment.
fn parse_endpoint(name: &'static str, raw: &str) -> Result<Url, ConfigError> {
    let with_slash = if raw.ends_with('/') {
        raw.to_string()
    } else {
        format!("{raw}/")
    };

    Url::parse(&with_slash).map_err(|error| ConfigError::Invalid {
        name,
        details: error.to_string(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn search_config_reports_every_missing_value() {
        let error = SearchServiceConfig::from_values(None, Some("  ".to_string()), None)
            .expect_err("config must be rejected");

        assert_eq!(
            error,
            ConfigError::Missing(vec![
                SEARCH_ENDPOINT_VAR,
                SEARCH_INDEX_VAR,
                SEARCH_ADMIN_KEY_VAR
            ])
        );
    }

    #[test]
    fn search_config_normalizes_endpoint() {
        let config = SearchServiceConfig::from_values(
            Some("https://example.search.windows.net".to_string()),
            Some("docs".to_string()),
            Some("secret".to_string()),
        )
        .expect("config should be valid");

        assert_eq!(config.endpoint.as_str(), "https://example.search.windows.net/");
        assert_eq!(config.index_name, "docs");
    }

    #[test]
    fn openai_config_defaults_chat_deployment() {
        let config = OpenAiConfig::from_values(
            Some("https://example.openai.azure.com/".to_string()),
            Some("key".to_string()),
            None,
            None,
            false,
        )
        .expect("config should be valid");

        assert_eq!(config.chat_deployment, DEFAULT_CHAT_DEPLOYMENT);
        assert!(config.embedding_deployment.is_none());
    }

    #[test]
    fn openai_config_requires_embedding_deployment_when_asked() {
        let error = OpenAiConfig::from_values(
            Some("https://example.openai.azure.com/".to_string()),
            Some("key".to_string()),
            None,
            None,
            true,
        )
        .expect_err("embedding deployment is required");

        assert_eq!(error, ConfigError::Missing(vec![EMBEDDING_DEPLOYMENT_VAR]));
    }

    #[test]
    fn invalid_endpoint_is_reported() {
        let error = SearchServiceConfig::from_values(
            Some("not a url".to_string()),
            Some("docs".to_string()),
            Some("secret".to_string()),
        )
        .expect_err("endpoint must be a url");

        assert!(matches!(error, ConfigError::Invalid { name, .. } if name == SEARCH_ENDPOINT_VAR));
    }
}
