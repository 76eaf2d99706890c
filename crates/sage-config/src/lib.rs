//! Profile and provider configuration for sage.
//!
//! A configuration names the providers that can be reached and the profiles
//! that pick one of them:
//!
//! - [`SageConfig`] — Profiles, provider settings, and the default profile
//! - [`Profile`] — A provider + account + model triple
//! - [`ProviderSettings`] — Accounts and an optional base URL override for one provider
//! - [`AccountSettings`] — Where an account's API key comes from
//!
//! # Loading from JSON
//!
//! ```rust
//! use sage_config::SageConfig;
//!
//! let config = SageConfig::from_json(r#"{
//!     "default_profile": "fast",
//!     "profiles": {
//!         "fast": { "provider": "openai", "model": "gpt-4o-mini" }
//!     },
//!     "providers": {
//!         "openai": { "accounts": { "default": { "api_key_env": "OPENAI_API_KEY" } } }
//!     }
//! }"#).unwrap();
//!
//! let profile = config.profile(None).unwrap();
//! assert_eq!(profile.model, "gpt-4o-mini");
//! assert_eq!(profile.account, "default");
//! ```
//!
//! # From the environment
//!
//! ```rust,ignore
//! // OPENAI_API_KEY, ANTHROPIC_API_KEY, OLLAMA_HOST, SAGE_PROFILE, SAGE_MODEL
//! let config = SageConfig::from_env();
//! ```

use std::collections::HashMap;
use std::fs;
use std::path::Path;

use secrecy::{ExposeSecret, SecretString};
use serde::{Deserialize, Serialize};

/// Account name used when a profile does not name one.
pub const DEFAULT_ACCOUNT: &str = "default";

/// Errors that can occur when loading or resolving a configuration.
#[derive(thiserror::Error, Debug)]
pub enum ConfigError {
    /// Failed to read a configuration file.
    #[error("Failed to read config file '{path}': {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },

    /// Failed to parse JSON configuration.
    #[error("Failed to parse config: {0}")]
    Parse(#[from] serde_json::Error),

    /// No profile was named and no default is set.
    #[error("No profile specified and no default profile set")]
    NoDefaultProfile,

    /// Requested profile does not exist.
    #[error("Profile not found: '{0}'")]
    ProfileNotFound(String),

    /// A profile points at a provider with no settings.
    #[error("Provider not configured: '{0}'")]
    ProviderNotConfigured(String),

    /// A profile points at an account the provider does not have.
    #[error("Account '{account}' not found for provider '{provider}'")]
    AccountNotFound { provider: String, account: String },
}

impl ConfigError {
    /// Creates an IO error with path context.
    pub fn io(path: impl Into<String>, source: std::io::Error) -> Self {
        Self::Io { path: path.into(), source }
    }
}

/// A named selection of provider, account, and model.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Profile {
    pub provider: String,
    #[serde(default = "default_account")]
    pub account: String,
    pub model: String,
}

fn default_account() -> String {
    DEFAULT_ACCOUNT.to_string()
}

impl Profile {
    pub fn new(provider: impl Into<String>, model: impl Into<String>) -> Self {
        Self {
            provider: provider.into(),
            account: default_account(),
            model: model.into(),
        }
    }

    pub fn with_account(mut self, account: impl Into<String>) -> Self {
        self.account = account.into();
        self
    }
}

/// Source of an account's API key.
///
/// An inline `api_key` wins over `api_key_env`. Inline keys are never written
/// back by [`SageConfig::to_json`].
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AccountSettings {
    #[serde(default, skip_serializing)]
    pub api_key: Option<SecretString>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub api_key_env: Option<String>,
}

impl AccountSettings {
    /// An account whose key is read from `var` at resolution time.
    pub fn from_env_var(var: impl Into<String>) -> Self {
        Self { api_key: None, api_key_env: Some(var.into()) }
    }

    /// An account with the key held in memory.
    pub fn inline(api_key: impl Into<String>) -> Self {
        Self { api_key: Some(SecretString::from(api_key.into())), api_key_env: None }
    }

    fn resolve(&self) -> Option<SecretString> {
        if let Some(key) = self.api_key.as_ref().filter(|k| !k.expose_secret().is_empty()) {
            return Some(key.clone());
        }
        self.api_key_env
            .as_deref()
            .and_then(|var| std::env::var(var).ok())
            .filter(|key| !key.is_empty())
            .map(SecretString::from)
    }
}

/// Settings for one provider.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ProviderSettings {
    #[serde(default)]
    pub accounts: HashMap<String, AccountSettings>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub base_url: Option<String>,
}

impl ProviderSettings {
    pub fn with_account(mut self, name: impl Into<String>, account: AccountSettings) -> Self {
        self.accounts.insert(name.into(), account);
        self
    }

    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = Some(base_url.into());
        self
    }

    /// Resolves the API key of `account`.
    ///
    /// A provider with no accounts at all is keyless and yields `None`.
    /// Otherwise the account must exist; it yields `None` when its key is
    /// unset or empty.
    pub fn api_key(&self, provider: &str, account: &str) -> Result<Option<SecretString>, ConfigError> {
        if self.accounts.is_empty() {
            return Ok(None);
        }
        let settings = self.accounts.get(account).ok_or_else(|| ConfigError::AccountNotFound {
            provider: provider.to_string(),
            account: account.to_string(),
        })?;
        Ok(settings.resolve())
    }
}

/// Complete sage configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SageConfig {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub default_profile: Option<String>,
    #[serde(default)]
    pub profiles: HashMap<String, Profile>,
    #[serde(default)]
    pub providers: HashMap<String, ProviderSettings>,
}

impl SageConfig {
    /// Loads a configuration from a JSON file.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let content = fs::read_to_string(path)
            .map_err(|e| ConfigError::io(path.display().to_string(), e))?;
        Self::from_json(&content)
    }

    /// Parses a configuration from a JSON string.
    pub fn from_json(json: &str) -> Result<Self, ConfigError> {
        Ok(serde_json::from_str(json)?)
    }

    /// Serializes this configuration to a JSON string.
    pub fn to_json(&self) -> Result<String, ConfigError> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    /// Builds a configuration from the process environment.
    ///
    /// | Variable | Effect |
    /// |----------|--------|
    /// | `OPENAI_API_KEY` | Adds the `openai` provider and profile |
    /// | `ANTHROPIC_API_KEY` | Adds the `anthropic` provider and profile |
    /// | `OLLAMA_HOST` | Base URL of the always-present `ollama` provider |
    /// | `SAGE_PROFILE` | Default profile (else the first of openai, anthropic, ollama) |
    /// | `SAGE_MODEL` | Model of the default profile |
    pub fn from_env() -> Self {
        Self::from_vars(|name| std::env::var(name).ok())
    }

    /// Same as [`SageConfig::from_env`] with a custom variable lookup.
    pub fn from_vars(var: impl Fn(&str) -> Option<String>) -> Self {
        let var = |name: &str| var(name).filter(|v| !v.is_empty());
        let mut config = Self::default();

        let hosted = [
            ("openai", "OPENAI_API_KEY", "gpt-4o"),
            ("anthropic", "ANTHROPIC_API_KEY", "claude-sonnet-4-20250514"),
        ];
        for (provider, key_var, model) in hosted {
            if var(key_var).is_some() {
                config.providers.insert(
                    provider.to_string(),
                    ProviderSettings::default()
                        .with_account(DEFAULT_ACCOUNT, AccountSettings::from_env_var(key_var)),
                );
                config.profiles.insert(provider.to_string(), Profile::new(provider, model));
            }
        }

        let mut ollama = ProviderSettings::default();
        if let Some(host) = var("OLLAMA_HOST") {
            ollama = ollama.with_base_url(host);
        }
        config.providers.insert("ollama".to_string(), ollama);
        config.profiles.insert("ollama".to_string(), Profile::new("ollama", "llama3"));

        let default = var("SAGE_PROFILE").or_else(|| {
            ["openai", "anthropic", "ollama"]
                .into_iter()
                .find(|name| config.profiles.contains_key(*name))
                .map(str::to_string)
        });

        if let (Some(name), Some(model)) = (&default, var("SAGE_MODEL")) {
            if let Some(profile) = config.profiles.get_mut(name) {
                profile.model = model;
            }
        }
        config.default_profile = default;
        config
    }

    /// Returns the named profile, or the default profile when `name` is `None`.
    pub fn profile(&self, name: Option<&str>) -> Result<&Profile, ConfigError> {
        let name = match name.filter(|n| !n.is_empty()) {
            Some(name) => name,
            None => self
                .default_profile
                .as_deref()
                .filter(|n| !n.is_empty())
                .ok_or(ConfigError::NoDefaultProfile)?,
        };
        self.profiles
            .get(name)
            .ok_or_else(|| ConfigError::ProfileNotFound(name.to_string()))
    }

    /// Returns the settings for `name`.
    pub fn provider(&self, name: &str) -> Result<&ProviderSettings, ConfigError> {
        self.providers
            .get(name)
            .ok_or_else(|| ConfigError::ProviderNotConfigured(name.to_string()))
    }

    /// Returns the profile names in sorted order.
    pub fn profile_names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.profiles.keys().cloned().collect();
        names.sort();
        names
    }
}

#[cfg(test)]
mod tests {
    use std::io::Write;

    use super::*;

    const CONFIG: &str = r#"{
        "default_profile": "work",
        "profiles": {
            "work": { "provider": "anthropic", "account": "team", "model": "claude-sonnet-4-20250514" },
            "local": { "provider": "ollama", "model": "llama3" }
        },
        "providers": {
            "anthropic": {
                "accounts": {
                    "team": { "api_key": "sk-ant-inline" },
                    "personal": { "api_key_env": "SAGE_CONFIG_TEST_UNSET_VAR" }
                }
            },
            "ollama": { "base_url": "http://gpu-box:11434" }
        }
    }"#;

    fn env(vars: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let vars: HashMap<String, String> =
            vars.iter().map(|(k, v)| (k.to_string(), v.to_string())).collect();
        move |name| vars.get(name).cloned()
    }

    #[test]
    fn resolves_named_and_default_profiles() {
        let config = SageConfig::from_json(CONFIG).unwrap();

        let work = config.profile(None).unwrap();
        assert_eq!(work.provider, "anthropic");
        assert_eq!(work.account, "team");

        let local = config.profile(Some("local")).unwrap();
        assert_eq!(local.account, DEFAULT_ACCOUNT);
        assert_eq!(config.profile_names(), vec!["local", "work"]);
    }

    #[test]
    fn unknown_profile_and_missing_default() {
        let config = SageConfig::from_json(CONFIG).unwrap();
        assert!(matches!(
            config.profile(Some("nope")),
            Err(ConfigError::ProfileNotFound(name)) if name == "nope"
        ));

        let empty = SageConfig::default();
        assert!(matches!(empty.profile(None), Err(ConfigError::NoDefaultProfile)));
    }

    #[test]
    fn resolves_account_keys() {
        let config = SageConfig::from_json(CONFIG).unwrap();
        let anthropic = config.provider("anthropic").unwrap();

        let key = anthropic.api_key("anthropic", "team").unwrap().unwrap();
        assert_eq!(key.expose_secret(), "sk-ant-inline");

        assert!(anthropic.api_key("anthropic", "personal").unwrap().is_none());
        assert!(matches!(
            anthropic.api_key("anthropic", "ghost"),
            Err(ConfigError::AccountNotFound { .. })
        ));

        let ollama = config.provider("ollama").unwrap();
        assert!(ollama.api_key("ollama", DEFAULT_ACCOUNT).unwrap().is_none());
        assert_eq!(ollama.base_url.as_deref(), Some("http://gpu-box:11434"));

        assert!(matches!(
            config.provider("openai"),
            Err(ConfigError::ProviderNotConfigured(name)) if name == "openai"
        ));
    }

    #[test]
    fn env_var_account_reads_the_variable() {
        std::env::set_var("SAGE_CONFIG_TEST_KEY", "sk-from-env");
        let settings = ProviderSettings::default()
            .with_account(DEFAULT_ACCOUNT, AccountSettings::from_env_var("SAGE_CONFIG_TEST_KEY"));

        let key = settings.api_key("openai", DEFAULT_ACCOUNT).unwrap().unwrap();
        assert_eq!(key.expose_secret(), "sk-from-env");
    }

    #[test]
    fn inline_keys_are_not_serialized() {
        let config = SageConfig::from_json(CONFIG).unwrap();
        let json = config.to_json().unwrap();

        assert!(!json.contains("sk-ant-inline"));
        assert!(json.contains("SAGE_CONFIG_TEST_UNSET_VAR"));

        let reloaded = SageConfig::from_json(&json).unwrap();
        assert_eq!(reloaded.profiles, config.profiles);
        assert_eq!(reloaded.default_profile.as_deref(), Some("work"));
    }

    #[test]
    fn from_file_and_missing_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(CONFIG.as_bytes()).unwrap();

        let config = SageConfig::from_file(file.path()).unwrap();
        assert_eq!(config.profiles.len(), 2);

        let err = SageConfig::from_file("/definitely/not/here.json").unwrap_err();
        assert!(matches!(err, ConfigError::Io { .. }));
    }

    #[test]
    fn invalid_json_is_a_parse_error() {
        assert!(matches!(SageConfig::from_json("{"), Err(ConfigError::Parse(_))));
    }

    #[test]
    fn environment_with_keys() {
        let config = SageConfig::from_vars(env(&[
            ("OPENAI_API_KEY", "sk-openai"),
            ("ANTHROPIC_API_KEY", "sk-ant"),
            ("OLLAMA_HOST", "http://10.0.0.5:11434"),
        ]));

        assert_eq!(config.default_profile.as_deref(), Some("openai"));
        assert_eq!(config.profile_names(), vec!["anthropic", "ollama", "openai"]);
        assert_eq!(
            config.provider("openai").unwrap().accounts[DEFAULT_ACCOUNT].api_key_env.as_deref(),
            Some("OPENAI_API_KEY")
        );
        assert_eq!(
            config.provider("ollama").unwrap().base_url.as_deref(),
            Some("http://10.0.0.5:11434")
        );
    }

    #[test]
    fn environment_without_keys_falls_back_to_ollama() {
        let config = SageConfig::from_vars(env(&[("SAGE_MODEL", "qwen2.5:7b")]));

        let profile = config.profile(None).unwrap();
        assert_eq!(profile.provider, "ollama");
        assert_eq!(profile.model, "qwen2.5:7b");
        assert!(config.provider("ollama").unwrap().base_url.is_none());
    }

    #[test]
    fn environment_profile_override() {
        let config = SageConfig::from_vars(env(&[
            ("OPENAI_API_KEY", "sk-openai"),
            ("ANTHROPIC_API_KEY", "sk-ant"),
            ("SAGE_PROFILE", "anthropic"),
        ]));

        assert_eq!(config.profile(None).unwrap().model, "claude-sonnet-4-20250514");
    }
}
