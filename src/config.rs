//! Run configuration.
//!
//! The bearer token lives in an INI file (`[Yelp] AccessToken = ...`);
//! everything else is passed explicitly by the caller.

use crate::batch::DEFAULT_BATCH_SIZE;
use crate::dataset::MEAL_SUBQUOTA;
use crate::search::DEFAULT_API_URL;
use std::path::{Path, PathBuf};
use std::time::Duration;
use thiserror::Error;

pub const DEFAULT_CONFIG_PATH: &str = "config.ini";
pub const DEFAULT_REIMBURSEMENTS_PATH: &str = "data/2016-11-19-reimbursements.xz";
pub const DEFAULT_COMPANIES_PATH: &str = "data/2016-09-03-companies.xz";
pub const DEFAULT_OUTPUT_PATH: &str = "data/yelp-companies.xz";

const YELP_SECTION: &str = "Yelp";
const ACCESS_TOKEN_KEY: &str = "AccessToken";

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Configuration file not found at {0}")]
    FileNotFound(PathBuf),

    #[error("Failed to parse configuration file {path}: {message}")]
    ParseError { path: PathBuf, message: String },

    #[error("Section [{0}] missing from configuration file")]
    MissingSection(String),

    #[error("Key '{key}' missing from section [{section}]")]
    MissingKey { section: String, key: String },

    #[error("Configuration field '{field}' cannot be empty")]
    EmptyRequired { field: String },

    #[error("Batch size must be at least 1")]
    InvalidBatchSize,
}

/// API credential
#[derive(Clone, PartialEq)]
pub struct Credentials {
    pub access_token: String,
}

// Keep the token out of logs
impl std::fmt::Debug for Credentials {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Credentials")
            .field("access_token", &"<redacted>")
            .finish()
    }
}

impl Credentials {
    pub fn new(access_token: &str) -> Result<Self, ConfigError> {
        let access_token = access_token.trim();
        if access_token.is_empty() {
            return Err(ConfigError::EmptyRequired {
                field: ACCESS_TOKEN_KEY.to_string(),
            });
        }
        Ok(Credentials {
            access_token: access_token.to_string(),
        })
    }

    /// Read `[Yelp] AccessToken` from an INI file
    pub fn from_ini(path: &Path) -> Result<Self, ConfigError> {
        if !path.exists() {
            return Err(ConfigError::FileNotFound(path.to_path_buf()));
        }

        let ini = ini::Ini::load_from_file(path).map_err(|e| ConfigError::ParseError {
            path: path.to_path_buf(),
            message: e.to_string(),
        })?;

        let section = ini
            .section(Some(YELP_SECTION))
            .ok_or_else(|| ConfigError::MissingSection(YELP_SECTION.to_string()))?;

        // Option names ignore case, section names don't
        let token = section
            .iter()
            .find(|(key, _)| key.eq_ignore_ascii_case(ACCESS_TOKEN_KEY))
            .map(|(_, value)| value)
            .ok_or_else(|| ConfigError::MissingKey {
                section: YELP_SECTION.to_string(),
                key: ACCESS_TOKEN_KEY.to_string(),
            })?;

        Self::new(token)
    }
}

/// Everything one enrichment run needs
#[derive(Debug, Clone)]
pub struct RunConfig {
    pub reimbursements_path: PathBuf,
    pub companies_path: PathBuf,
    pub output_path: PathBuf,
    pub credentials: Credentials,
    /// Companies fetched per run
    pub batch_size: usize,
    /// Reimbursement category that selects companies
    pub category: String,
    pub api_url: String,
    /// `None` waits on the API indefinitely
    pub timeout: Option<Duration>,
}

impl RunConfig {
    /// Defaults matching the `data/` layout of the published datasets
    pub fn new(credentials: Credentials) -> Self {
        RunConfig {
            reimbursements_path: PathBuf::from(DEFAULT_REIMBURSEMENTS_PATH),
            companies_path: PathBuf::from(DEFAULT_COMPANIES_PATH),
            output_path: PathBuf::from(DEFAULT_OUTPUT_PATH),
            credentials,
            batch_size: DEFAULT_BATCH_SIZE,
            category: MEAL_SUBQUOTA.to_string(),
            api_url: DEFAULT_API_URL.to_string(),
            timeout: None,
        }
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.batch_size == 0 {
            return Err(ConfigError::InvalidBatchSize);
        }
        if self.credentials.access_token.trim().is_empty() {
            return Err(ConfigError::EmptyRequired {
                field: ACCESS_TOKEN_KEY.to_string(),
            });
        }
        if self.category.trim().is_empty() {
            return Err(ConfigError::EmptyRequired {
                field: "category".to_string(),
            });
        }
        if self.api_url.trim().is_empty() {
            return Err(ConfigError::EmptyRequired {
                field: "api_url".to_string(),
            });
        }
        Ok(())
    }
}
