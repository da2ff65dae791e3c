use serde::Deserialize;
use std::fmt;
use std::path::{Path, PathBuf};
use teloxide::types::UserId;

/// Errors that can occur when loading configuration.
#[derive(Debug)]
pub enum ConfigError {
    /// Failed to read the config file.
    ReadFile { path: PathBuf, source: std::io::Error },
    /// Failed to parse JSON.
    ParseJson { path: PathBuf, source: serde_json::Error },
    /// Validation error.
    Validation(String),
}

impl fmt::Display for ConfigError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::ReadFile { path, source } => {
                write!(f, "failed to read config file '{}': {}", path.display(), source)
            }
            Self::ParseJson { path, source } => {
                write!(f, "failed to parse config file '{}': {}", path.display(), source)
            }
            Self::Validation(msg) => write!(f, "config validation error: {}", msg),
        }
    }
}

impl std::error::Error for ConfigError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::ReadFile { source, .. } => Some(source),
            Self::ParseJson { source, .. } => Some(source),
            Self::Validation(_) => None,
        }
    }
}

#[derive(Deserialize)]
struct ConfigFile {
    /// Staff accounts: may claim conversations and run admin commands.
    owner_ids: Vec<u64>,
    telegram_bot_token: String,
    /// Public channel advertised from the main menu.
    channel_link: Option<String>,
    /// Invoice API base URL (e.g. "https://pay.example.com/api"). Payments
    /// are disabled when absent.
    payment_api_url: Option<String>,
    #[serde(default)]
    payment_api_key: String,
    #[serde(default = "default_currency")]
    currency: String,
    /// Directory for state files (database, logs). Defaults to current directory.
    data_dir: Option<String>,
    /// Max rows returned by the history command.
    #[serde(default = "default_history_limit")]
    history_limit: usize,
}

fn default_currency() -> String {
    "USD".to_string()
}

fn default_history_limit() -> usize {
    20
}

pub struct Config {
    /// Operator IDs. Every one of them may claim conversations and run
    /// admin commands.
    pub owner_ids: Vec<UserId>,
    pub telegram_bot_token: String,
    pub channel_link: Option<String>,
    /// Invoice API base URL; payments disabled when `None`.
    pub payment_api_url: Option<String>,
    pub payment_api_key: String,
    pub currency: String,
    /// Directory for state files (database, logs).
    pub data_dir: PathBuf,
    pub history_limit: usize,
}

impl Config {
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let config_path = path.as_ref().to_path_buf();
        let content = std::fs::read_to_string(&config_path)
            .map_err(|e| ConfigError::ReadFile { path: config_path.clone(), source: e })?;
        let file: ConfigFile = serde_json::from_str(&content)
            .map_err(|e| ConfigError::ParseJson { path: config_path.clone(), source: e })?;

        // Validate required fields
        if file.owner_ids.is_empty() {
            return Err(ConfigError::Validation("owner_ids must contain at least one operator ID".into()));
        }
        if file.telegram_bot_token.is_empty() {
            return Err(ConfigError::Validation("telegram_bot_token is required".into()));
        }
        // Telegram tokens are formatted as {bot_id}:{secret} where bot_id is numeric
        let token_parts: Vec<&str> = file.telegram_bot_token.split(':').collect();
        if token_parts.len() != 2 || token_parts[0].parse::<u64>().is_err() || token_parts[1].is_empty() {
            return Err(ConfigError::Validation(
                "telegram_bot_token appears invalid (expected format: 123456789:ABCdefGHI...)".into()
            ));
        }
        if file.payment_api_url.is_some() && file.payment_api_key.is_empty() {
            return Err(ConfigError::Validation(
                "payment_api_key is required when payment_api_url is set".into()
            ));
        }

        let data_dir = file
            .data_dir
            .map(PathBuf::from)
            .unwrap_or_else(|| PathBuf::from("."));

        Ok(Self {
            owner_ids: file.owner_ids.into_iter().map(UserId).collect(),
            telegram_bot_token: file.telegram_bot_token,
            channel_link: file.channel_link,
            payment_api_url: file.payment_api_url,
            payment_api_key: file.payment_api_key,
            currency: file.currency,
            data_dir,
            history_limit: file.history_limit,
        })
    }

    pub fn is_owner(&self, user_id: UserId) -> bool {
        self.owner_ids.contains(&user_id)
    }

    /// Operator IDs as plain i64s, for the broadcast loop.
    pub fn operator_ids(&self) -> impl Iterator<Item = i64> + '_ {
        self.owner_ids.iter().map(|id| id.0 as i64)
    }
}
