//! Providers reachable through the OpenAI-compatible chat API.

use super::*;

pub trait Router: Copy + Clone + Default + Send + Sync + 'static {
    /// Base url of router, e.g.
    /// - "https://openrouter.ai/api/v1"
    const BASE_URL: &str;
    /// Chat completion url of router, e.g.
    /// - "https://openrouter.ai/api/v1/chat/completions"
    const COMPLETION_URL: &str;
    /// The expected name of the API key as in an exported env variable, e.g.
    /// - "OPENROUTER_API_KEY"
    const API_KEY_NAME: &str;

    fn resolve_api_key() -> Result<String, std::env::VarError> {
        std::env::var(Self::API_KEY_NAME)
    }
}

#[derive(Copy, Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct OpenRouter;

impl Router for OpenRouter {
    const BASE_URL: &str = "https://openrouter.ai/api/v1";
    const COMPLETION_URL: &str = "https://openrouter.ai/api/v1/chat/completions";
    const API_KEY_NAME: &str = "OPENROUTER_API_KEY";
}

/// Chat completion url for an OpenAI-compatible base url.
pub fn completion_url(base_url: &str) -> Result<url::Url, LlmError> {
    let joined = format!("{}/chat/completions", base_url.trim_end_matches('/'));
    url::Url::parse(&joined).map_err(|e| LlmError::InvalidUrl(format!("{joined}: {e}")))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn completion_url_matches_router_const() {
        let url = completion_url(OpenRouter::BASE_URL).unwrap();
        assert_eq!(url.as_str(), OpenRouter::COMPLETION_URL);
        let trailing = completion_url("http://127.0.0.1:9000/v1/").unwrap();
        assert_eq!(trailing.as_str(), "http://127.0.0.1:9000/v1/chat/completions");
        assert!(completion_url("not a url").is_err());
    }
}
