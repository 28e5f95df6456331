use crate::cli::Args;
use crate::session::FileStorage;
use std::error::Error;
use std::fmt;
use std::path::PathBuf;
use url::Url;

#[derive(Debug)]
pub enum ConfigError {
    InvalidUrl(String, url::ParseError),
    UnsupportedScheme(String),
    InvalidLimit(usize),
}

impl fmt::Display for ConfigError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConfigError::InvalidUrl(raw, e) => write!(f, "Invalid API URL '{}': {}", raw, e),
            ConfigError::UnsupportedScheme(scheme) =>
                write!(f, "Unsupported API URL scheme '{}', expected http or https", scheme),
            ConfigError::InvalidLimit(limit) =>
                write!(f, "Retrieval limit must be at least 1 (got {})", limit),
        }
    }
}

impl Error for ConfigError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            ConfigError::InvalidUrl(_, e) => Some(e),
            _ => None,
        }
    }
}

/// Validated client settings derived from [`Args`].
#[derive(Debug, Clone)]
pub struct ClientConfig {
    pub base_url: Url,
    pub chat_route: String,
    pub limit: usize,
    pub session_path: PathBuf,
    pub check_health: bool,
}

impl ClientConfig {
    pub fn from_args(args: &Args) -> Result<Self, ConfigError> {
        let base_url = Url::parse(&args.api_url).map_err(|e|
            ConfigError::InvalidUrl(args.api_url.clone(), e)
        )?;
        match base_url.scheme() {
            "http" | "https" => {}
            other => {
                return Err(ConfigError::UnsupportedScheme(other.to_string()));
            }
        }
        if args.rag_limit == 0 {
            return Err(ConfigError::InvalidLimit(args.rag_limit));
        }

        let session_path = args.session_path
            .as_ref()
            .map(PathBuf::from)
            .unwrap_or_else(FileStorage::default_path);

        Ok(Self {
            base_url,
            chat_route: args.chat_route.clone(),
            limit: args.rag_limit,
            session_path,
            check_health: !args.skip_health_check,
        })
    }
}
