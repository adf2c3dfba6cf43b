use std::path::PathBuf;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use strum::{Display, EnumString, IntoStaticStr, VariantNames};

use super::error::{Result, SweepError};
use crate::{DEFAULT_BACKUP_DIR, DEFAULT_CONTENT_TYPE, DEFAULT_LOCALE, MIGRATION_TAG};


/// Content stack tier a command runs against.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Display, EnumString,
    IntoStaticStr, VariantNames,
)]
pub enum Environment {
    #[strum(serialize = "dev")]
    #[serde(rename = "dev")]
    Dev,
    #[strum(serialize = "USBC")]
    #[serde(rename = "USBC")]
    Usbc,
    #[strum(serialize = "USBD")]
    #[serde(rename = "USBD")]
    Usbd,
    #[strum(serialize = "CABC")]
    #[serde(rename = "CABC")]
    Cabc,
    #[strum(serialize = "CABD")]
    #[serde(rename = "CABD")]
    Cabd,
}

impl Environment {
    pub fn suffix(&self) -> &'static str {
        self.into()
    }
}


/// Credentials and endpoint for one environment's management API.
#[derive(Debug, Clone)]
pub struct StackConfig {
    pub environment: Environment,
    pub api_key: String,
    pub management_token: String,
    pub base_url: String,
    pub environment_uid: Option<String>,
    pub auth_token: Option<String>,
    pub locale: String,

    pub timeout: u64,
    pub max_retries: u32,
    pub retry_delay_ms: u64,
    pub rate_limit_delay_ms: u64,
}

impl StackConfig {
    pub fn new(
        environment: Environment,
        api_key: &str,
        management_token: &str,
        base_url: &str,
    ) -> Self {
        Self {
            environment,
            api_key: api_key.to_string(),
            management_token: management_token.to_string(),
            base_url: base_url.trim_end_matches('/').to_string(),
            environment_uid: None,
            auth_token: None,
            locale: DEFAULT_LOCALE.to_string(),

            timeout: 30,
            max_retries: 3,
            retry_delay_ms: 2000,
            rate_limit_delay_ms: 100,
        }
    }

    /// Reads `CONTENTSTACK_*_<ENV>` variables for `environment`.
    pub fn from_env(environment: Environment) -> Result<Self> {
        let suffix = environment.suffix();
        let required = [
            format!("CONTENTSTACK_API_KEY_{}", suffix),
            format!("CONTENTSTACK_MANAGEMENT_TOKEN_{}", suffix),
            format!("CONTENTSTACK_BASE_URL_{}", suffix),
        ];

        let missing: Vec<&str> = required
            .iter()
            .filter(|name| std::env::var(name.as_str()).map(|v| v.trim().is_empty()).unwrap_or(true))
            .map(|name| name.as_str())
            .collect();

        if !missing.is_empty() {
            return Err(SweepError::Config(format!(
                "Missing required environment variables: {}",
                missing.join(", ")
            )));
        }

        let var = |name: &str| std::env::var(name).unwrap_or_default();
        let mut config = Self::new(
            environment,
            &var(&required[0]),
            &var(&required[1]),
            &var(&required[2]),
        );

        if let Ok(uid) = std::env::var(format!("CONTENTSTACK_ENVIRONMENT_UID_{}", suffix)) {
            config.environment_uid = Some(uid);
        }
        if let Ok(token) = std::env::var("CONTENTSTACK_AUTH_TOKEN") {
            config.auth_token = Some(token);
        }

        Ok(config)
    }

    pub fn with_settings(mut self, settings: &SweepSettings) -> Self {
        self.max_retries = settings.max_retries;
        self.retry_delay_ms = settings.retry_delay_ms;
        self.rate_limit_delay_ms = settings.rate_limit_delay_ms;
        self
    }
}


/// Run tunables, layered from `entry-sweep.toml` and `SWEEP_*` variables.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SweepSettings {
    pub backup_dir: PathBuf,
    pub default_content_type: String,
    pub migration_tag: String,
    pub child_delay_ms: u64,
    pub delete_delay_ms: u64,
    pub max_retries: u32,
    pub retry_delay_ms: u64,
    pub rate_limit_delay_ms: u64,
    pub entry_reuse_enabled: bool,
    pub handle_duplicate_page_id: bool,
}

impl Default for SweepSettings {
    fn default() -> Self {
        Self {
            backup_dir: PathBuf::from(DEFAULT_BACKUP_DIR),
            default_content_type: DEFAULT_CONTENT_TYPE.to_string(),
            migration_tag: MIGRATION_TAG.to_string(),
            child_delay_ms: 100,
            delete_delay_ms: 100,
            max_retries: 3,
            retry_delay_ms: 2000,
            rate_limit_delay_ms: 100,
            entry_reuse_enabled: true,
            handle_duplicate_page_id: false,
        }
    }
}

impl SweepSettings {
    pub fn load() -> Result<Self> {
        let settings = config::Config::builder()
            .add_source(config::File::with_name("entry-sweep").required(false))
            .add_source(config::Environment::with_prefix("SWEEP").try_parsing(true))
            .build()?
            .try_deserialize::<SweepSettings>()?;

        Ok(settings)
    }

    pub fn child_delay(&self) -> Duration {
        Duration::from_millis(self.child_delay_ms)
    }

    pub fn delete_delay(&self) -> Duration {
        Duration::from_millis(self.delete_delay_ms)
    }
}
