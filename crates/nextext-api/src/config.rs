use std::path::PathBuf;

use url::Url;

use crate::error::{ClientError, Result};

const DEFAULT_API_BASE_URL: &str = "http://localhost:8000/api/v1";
const DEFAULT_CREDENTIAL_PATH: &str = "nextext-session.json";

/// Client configuration. The backend base address is the only value the
/// chat core needs; REST and channel endpoints are both derived from it.
#[derive(Debug, Clone)]
pub struct ClientConfig {
    api_base: String,
    pub credential_path: PathBuf,
}

impl ClientConfig {
    pub fn new(api_base_url: &str) -> Result<Self> {
        let parsed = Url::parse(api_base_url)
            .map_err(|e| ClientError::Config(format!("invalid base url '{}': {}", api_base_url, e)))?;
        if !matches!(parsed.scheme(), "http" | "https") {
            return Err(ClientError::Config(format!(
                "unsupported scheme '{}' in base url",
                parsed.scheme()
            )));
        }

        Ok(Self {
            api_base: api_base_url.strip_suffix('/').unwrap_or(api_base_url).to_string(),
            credential_path: PathBuf::from(DEFAULT_CREDENTIAL_PATH),
        })
    }

    /// Read `NEXTEXT_API_BASE_URL` and `NEXTEXT_CREDENTIAL_PATH`.
    pub fn from_env() -> Result<Self> {
        let base = std::env::var("NEXTEXT_API_BASE_URL").unwrap_or_else(|_| DEFAULT_API_BASE_URL.into());
        let mut config = Self::new(&base)?;
        if let Ok(path) = std::env::var("NEXTEXT_CREDENTIAL_PATH") {
            config.credential_path = PathBuf::from(path);
        }
        Ok(config)
    }

    pub fn api_base(&self) -> &str {
        &self.api_base
    }

    /// Absolute REST url for `path` (which starts with `/`).
    pub fn endpoint(&self, path: &str) -> String {
        format!("{}{}", self.api_base, path)
    }

    /// Chat channel url: the base with `http` swapped for `ws` and the
    /// credential carried as the `token` query parameter.
    pub fn channel_url(&self, token: &str) -> Result<Url> {
        let ws_base = match self.api_base.strip_prefix("http") {
            Some(rest) => format!("ws{}", rest),
            None => self.api_base.clone(),
        };
        let mut url = Url::parse(&format!("{}/chat/ws", ws_base))
            .map_err(|e| ClientError::Config(format!("invalid channel url: {}", e)))?;
        url.query_pairs_mut().append_pair("token", token);
        Ok(url)
    }
}
