use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

use crate::webauthn::{cose, CryptoProvider, DefaultCryptoProvider, WebAuthnSettings};

/// Directory holding a `Settings.toml` that overrides `./Settings.toml`
pub const CONFIG_DIR_ENV: &str = "PASSKEY_RP_CONFIG_DIR";

const SETTINGS_FILE: &str = "Settings.toml";

#[derive(Debug, thiserror::Error)]
pub enum SettingsError {
    #[error("cannot read {path}: {source}")]
    Read {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("cannot parse {path}: {message}")]
    Parse { path: PathBuf, message: String },
    #[error("invalid setting {field}: {message}")]
    Invalid {
        field: &'static str,
        message: String,
    },
}

fn invalid(field: &'static str, message: impl Into<String>) -> SettingsError {
    SettingsError::Invalid {
        field,
        message: message.into(),
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, Default, PartialEq, Eq)]
#[serde(default)]
pub struct Settings {
    pub application: ApplicationSettings,
    pub webauthn: WebAuthnSettings,
    pub storage: StorageSettings,
    pub logging: LoggingSettings,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct ApplicationSettings {
    pub host: String,
    pub port: u16,
    /// Comma-separated list of origins allowed by CORS
    pub cors_origins: String,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, Default, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum StorageBackend {
    /// Records are lost on restart
    #[default]
    Memory,
    /// One JSON file per credential under `storage.path`
    File,
}

impl std::str::FromStr for StorageBackend {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "memory" => Ok(Self::Memory),
            "file" => Ok(Self::File),
            other => Err(format!("unknown storage backend \"{other}\"")),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct StorageSettings {
    pub backend: StorageBackend,
    pub path: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct LoggingSettings {
    pub level: String,
}

impl Default for ApplicationSettings {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 8080,
            cors_origins: "http://localhost:3000".to_string(),
        }
    }
}

impl Default for StorageSettings {
    fn default() -> Self {
        Self {
            backend: StorageBackend::Memory,
            path: "credentials".to_string(),
        }
    }
}

impl Default for LoggingSettings {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
        }
    }
}

impl Settings {
    /// Load settings from configuration files and environment variables
    ///
    /// Also loads `.env` and initializes the logger.
    ///
    /// # Errors
    ///
    /// Returns an error if:
    /// - A settings file exists but cannot be read or parsed
    /// - A resulting value fails validation
    pub fn load() -> Result<Self, SettingsError> {
        Self::load_env_file();

        // Load base settings from TOML or defaults
        let mut settings = Self::load_base_settings()?;

        // Apply environment variable overrides
        Self::apply_env_overrides(&mut settings);

        settings.init_logging();
        settings.validate()?;
        Ok(settings)
    }

    /// Load base settings from TOML file(s) or use defaults
    ///
    /// Settings are loaded with the following priority (highest to lowest):
    /// 1. Environment variables (applied separately after loading base settings)
    /// 2. Settings.toml in `PASSKEY_RP_CONFIG_DIR` (if specified and exists)
    /// 3. Settings.toml in current directory (if exists)
    /// 4. Default values
    ///
    /// # Errors
    ///
    /// Returns an error if an existing settings file cannot be read or parsed.
    fn load_base_settings() -> Result<Self, SettingsError> {
        let mut settings = Self::default();

        let default_config_path = PathBuf::from(SETTINGS_FILE);
        if default_config_path.exists() {
            settings = Self::from_file(&default_config_path)?;
            println!("✓ Loaded settings from {}", default_config_path.display());
        }

        if let Ok(config_dir) = std::env::var(CONFIG_DIR_ENV) {
            let config_path = Path::new(&config_dir).join(SETTINGS_FILE);
            if config_path.exists() {
                settings = Self::from_file(&config_path)?;
                println!("✓ Overriding settings from {}", config_path.display());
            } else {
                println!(
                    "ℹ {CONFIG_DIR_ENV} set but no Settings.toml found at: {}",
                    config_path.display()
                );
            }
        }

        Ok(settings)
    }

    /// Parse a single TOML settings file
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read or is not valid TOML.
    pub fn from_file(path: &Path) -> Result<Self, SettingsError> {
        let content = fs::read_to_string(path).map_err(|source| SettingsError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        basic_toml::from_str(&content).map_err(|e| SettingsError::Parse {
            path: path.to_path_buf(),
            message: e.to_string(),
        })
    }

    /// Apply environment variable overrides; unparsable values are ignored
    pub fn apply_env_overrides(settings: &mut Self) {
        Self::apply_application_env_overrides(&mut settings.application);
        Self::apply_webauthn_env_overrides(&mut settings.webauthn);
        Self::apply_storage_env_overrides(&mut settings.storage);
        Self::apply_logging_env_overrides(&mut settings.logging);
    }

    fn apply_application_env_overrides(app_settings: &mut ApplicationSettings) {
        if let Ok(host) = std::env::var("HOST") {
            app_settings.host = host;
        }
        if let Ok(port_str) = std::env::var("PORT") {
            if let Ok(port) = port_str.parse::<u16>() {
                app_settings.port = port;
            }
        }
        if let Ok(cors_origins) = std::env::var("CORS_ORIGINS") {
            app_settings.cors_origins = cors_origins;
        }
    }

    fn apply_webauthn_env_overrides(webauthn: &mut WebAuthnSettings) {
        if let Ok(rp_name) = std::env::var("RP_NAME") {
            webauthn.rp_name = rp_name;
        }
        if let Ok(rp_id) = std::env::var("RP_ID") {
            let rp_id = rp_id.trim().to_string();
            webauthn.rp_id = (!rp_id.is_empty()).then_some(rp_id);
        }
        if let Ok(origins) = std::env::var("RP_ORIGINS") {
            webauthn.allowed_origins = split_list(&origins);
        }
        Self::apply_numeric_env_override("CEREMONY_TIMEOUT_SECONDS", &mut webauthn.timeout_seconds);
        Self::apply_numeric_env_override(
            "CHALLENGE_TTL_SECONDS",
            &mut webauthn.challenge_ttl_seconds,
        );
        if let Ok(algorithms) = std::env::var("SUPPORTED_ALGORITHMS") {
            let parsed: Result<Vec<i64>, _> =
                split_list(&algorithms).iter().map(|a| a.parse::<i64>()).collect();
            if let Ok(parsed) = parsed {
                webauthn.supported_algorithms = parsed;
            }
        }
        if let Ok(policy) = std::env::var("DUPLICATE_POLICY") {
            if let Ok(policy) = policy.parse() {
                webauthn.duplicate_policy = policy;
            }
        }
    }

    fn apply_storage_env_overrides(storage: &mut StorageSettings) {
        if let Ok(backend) = std::env::var("STORAGE_BACKEND") {
            if let Ok(backend) = backend.parse() {
                storage.backend = backend;
            }
        }
        if let Ok(path) = std::env::var("STORAGE_PATH") {
            storage.path = path;
        }
    }

    /// Apply environment overrides for logging settings
    fn apply_logging_env_overrides(logging_settings: &mut LoggingSettings) {
        if let Ok(log_level) = std::env::var("RUST_LOG") {
            logging_settings.level = log_level;
        }
    }

    /// Helper function to apply numeric environment variable overrides
    fn apply_numeric_env_override(env_var: &str, target: &mut u64) {
        if let Ok(value_str) = std::env::var(env_var) {
            if let Ok(value) = value_str.parse::<u64>() {
                *target = value;
            }
        }
    }

    /// Load environment variables from .env file
    fn load_env_file() {
        if let Ok(contents) = fs::read_to_string(".env") {
            for line in contents.lines() {
                let line = line.trim();
                if line.starts_with('#') {
                    continue;
                }
                if let Some((key, value)) = line.split_once('=') {
                    std::env::set_var(key.trim(), value.trim());
                }
            }
        }
    }

    /// Initialize `env_logger`; `RUST_LOG` wins over `logging.level`
    fn init_logging(&self) {
        let env = env_logger::Env::default().default_filter_or(self.logging.level.as_str());
        // A logger may already be installed (tests, embedding applications)
        let _ = env_logger::Builder::from_env(env).try_init();
    }

    /// Check values that serde alone cannot
    ///
    /// # Errors
    ///
    /// Returns [`SettingsError::Invalid`] naming the first offending field.
    pub fn validate(&self) -> Result<(), SettingsError> {
        let webauthn = &self.webauthn;

        if webauthn.rp_name.trim().is_empty() {
            return Err(invalid("webauthn.rp_name", "must not be empty"));
        }
        if webauthn.rp_id.as_deref().is_some_and(|id| id.trim().is_empty()) {
            return Err(invalid("webauthn.rp_id", "must not be empty when set"));
        }
        if webauthn.allowed_origins.is_empty() {
            return Err(invalid(
                "webauthn.allowed_origins",
                "at least one origin is required",
            ));
        }
        for origin in &webauthn.allowed_origins {
            Self::validate_origin(origin, webauthn.rp_id.as_deref())?;
        }
        if webauthn.challenge_length < 16 {
            return Err(invalid(
                "webauthn.challenge_length",
                "must be at least 16 bytes",
            ));
        }
        if !(1..=64).contains(&webauthn.user_handle_length) {
            return Err(invalid(
                "webauthn.user_handle_length",
                "must be between 1 and 64 bytes",
            ));
        }
        if webauthn.timeout_seconds == 0 {
            return Err(invalid("webauthn.timeout_seconds", "must be positive"));
        }
        if webauthn.challenge_ttl_seconds == 0 {
            return Err(invalid("webauthn.challenge_ttl_seconds", "must be positive"));
        }
        if webauthn.supported_algorithms.is_empty() {
            return Err(invalid(
                "webauthn.supported_algorithms",
                "at least one algorithm is required",
            ));
        }
        let crypto = DefaultCryptoProvider;
        if let Some(alg) = webauthn
            .supported_algorithms
            .iter()
            .find(|alg| !crypto.supports(**alg))
        {
            return Err(invalid(
                "webauthn.supported_algorithms",
                format!("algorithm {alg} ({}) cannot be verified", cose::name(*alg)),
            ));
        }
        if self.storage.backend == StorageBackend::File && self.storage.path.trim().is_empty() {
            return Err(invalid("storage.path", "required for the file backend"));
        }
        Ok(())
    }

    fn validate_origin(origin: &str, rp_id: Option<&str>) -> Result<(), SettingsError> {
        let parsed = url::Url::parse(origin)
            .map_err(|e| invalid("webauthn.allowed_origins", format!("{origin}: {e}")))?;
        let host = parsed.host_str().unwrap_or_default();
        let local = matches!(host, "localhost" | "127.0.0.1" | "[::1]");
        match parsed.scheme() {
            "https" => {}
            "http" if local => {}
            scheme => {
                return Err(invalid(
                    "webauthn.allowed_origins",
                    format!("{origin}: scheme {scheme} is only allowed for localhost"),
                ))
            }
        }
        if let Some(rp_id) = rp_id {
            if host != rp_id && !host.ends_with(&format!(".{rp_id}")) {
                return Err(invalid(
                    "webauthn.allowed_origins",
                    format!("{origin} is not within RP id {rp_id}"),
                ));
            }
        }
        Ok(())
    }

    /// Get the bind address for the server
    #[must_use]
    pub fn get_bind_address(&self) -> String {
        format!("{}:{}", self.application.host, self.application.port)
    }

    /// Get CORS origins as a vector of strings
    #[must_use]
    pub fn get_cors_origins(&self) -> Vec<String> {
        split_list(&self.application.cors_origins)
    }
}

fn split_list(value: &str) -> Vec<String> {
    value
        .split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(ToString::to_string)
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::webauthn::DuplicatePolicy;
    use serial_test::serial;

    // Helper function to clean all relevant environment variables for tests
    fn clean_env_vars() {
        for var in [
            "HOST",
            "PORT",
            "CORS_ORIGINS",
            "RP_NAME",
            "RP_ID",
            "RP_ORIGINS",
            "CEREMONY_TIMEOUT_SECONDS",
            "CHALLENGE_TTL_SECONDS",
            "SUPPORTED_ALGORITHMS",
            "DUPLICATE_POLICY",
            "STORAGE_BACKEND",
            "STORAGE_PATH",
            CONFIG_DIR_ENV,
        ] {
            std::env::remove_var(var);
        }
    }

    #[test]
    fn test_defaults_are_valid() {
        let settings = Settings::default();
        assert!(settings.validate().is_ok());
        // The default origin is checked, not skipped
        assert_eq!(
            settings.webauthn.allowed_origins,
            vec!["http://localhost:8080".to_string()]
        );
        assert_eq!(settings.get_bind_address(), "0.0.0.0:8080");
        assert_eq!(settings.storage.backend, StorageBackend::Memory);
    }

    #[test]
    #[serial]
    fn test_webauthn_env_overrides() {
        clean_env_vars();
        std::env::set_var("RP_NAME", "Example Corp");
        std::env::set_var("RP_ID", "example.com");
        std::env::set_var("RP_ORIGINS", "https://example.com, https://app.example.com");
        std::env::set_var("CEREMONY_TIMEOUT_SECONDS", "120");
        std::env::set_var("SUPPORTED_ALGORITHMS", "-7");
        std::env::set_var("DUPLICATE_POLICY", "overwrite");

        let mut settings = Settings::default();
        Settings::apply_env_overrides(&mut settings);

        assert_eq!(settings.webauthn.rp_name, "Example Corp");
        assert_eq!(settings.webauthn.rp_id.as_deref(), Some("example.com"));
        assert_eq!(
            settings.webauthn.allowed_origins,
            vec!["https://example.com", "https://app.example.com"]
        );
        assert_eq!(settings.webauthn.timeout_seconds, 120);
        assert_eq!(settings.webauthn.supported_algorithms, vec![-7]);
        assert_eq!(settings.webauthn.duplicate_policy, DuplicatePolicy::Overwrite);
        assert!(settings.validate().is_ok());

        clean_env_vars();
    }

    #[test]
    #[serial]
    fn test_invalid_env_values_are_ignored() {
        clean_env_vars();
        std::env::set_var("PORT", "not-a-port");
        std::env::set_var("CEREMONY_TIMEOUT_SECONDS", "-5");
        std::env::set_var("SUPPORTED_ALGORITHMS", "-7,abc");
        std::env::set_var("DUPLICATE_POLICY", "sometimes");
        std::env::set_var("STORAGE_BACKEND", "redis");

        let mut settings = Settings::default();
        Settings::apply_env_overrides(&mut settings);
        assert_eq!(settings, Settings {
            logging: settings.logging.clone(),
            ..Settings::default()
        });

        clean_env_vars();
    }

    #[test]
    #[serial]
    fn test_storage_env_overrides() {
        clean_env_vars();
        std::env::set_var("STORAGE_BACKEND", "File");
        std::env::set_var("STORAGE_PATH", "/var/lib/passkeys");

        let mut settings = Settings::default();
        Settings::apply_env_overrides(&mut settings);
        assert_eq!(settings.storage.backend, StorageBackend::File);
        assert_eq!(settings.storage.path, "/var/lib/passkeys");

        clean_env_vars();
    }

    #[test]
    fn test_validation_failures() {
        let cases: Vec<(&str, Box<dyn Fn(&mut Settings)>)> = vec![
            ("webauthn.rp_name", Box::new(|s: &mut Settings| s.webauthn.rp_name = " ".into())),
            (
                "webauthn.allowed_origins",
                Box::new(|s: &mut Settings| s.webauthn.allowed_origins.clear()),
            ),
            (
                "webauthn.allowed_origins",
                Box::new(|s: &mut Settings| s.webauthn.allowed_origins = vec!["not a url".into()]),
            ),
            (
                "webauthn.allowed_origins",
                Box::new(|s: &mut Settings| s.webauthn.allowed_origins = vec!["http://example.com".into()]),
            ),
            ("webauthn.challenge_length", Box::new(|s: &mut Settings| s.webauthn.challenge_length = 8)),
            ("webauthn.user_handle_length", Box::new(|s: &mut Settings| s.webauthn.user_handle_length = 65)),
            ("webauthn.timeout_seconds", Box::new(|s: &mut Settings| s.webauthn.timeout_seconds = 0)),
            (
                "webauthn.supported_algorithms",
                Box::new(|s: &mut Settings| s.webauthn.supported_algorithms = vec![-7, -35]),
            ),
            (
                "webauthn.supported_algorithms",
                Box::new(|s: &mut Settings| s.webauthn.supported_algorithms.clear()),
            ),
        ];
        for (expected_field, mutate) in cases {
            let mut settings = Settings::default();
            mutate(&mut settings);
            match settings.validate() {
                Err(SettingsError::Invalid { field, .. }) => assert_eq!(field, expected_field),
                other => panic!("expected {expected_field} to be rejected, got {other:?}"),
            }
        }
    }

    #[test]
    fn test_origin_must_match_rp_id() {
        let mut settings = Settings::default();
        settings.webauthn.rp_id = Some("example.com".into());
        settings.webauthn.allowed_origins = vec!["https://login.example.com".into()];
        assert!(settings.validate().is_ok());

        settings.webauthn.allowed_origins = vec!["https://example.org".into()];
        assert!(settings.validate().is_err());

        settings.webauthn.rp_id = None;
        settings.webauthn.allowed_origins = vec!["http://localhost:8080".into()];
        assert!(settings.validate().is_ok());
    }

    #[test]
    fn test_cors_origins_split() {
        let mut settings = Settings::default();
        settings.application.cors_origins = "https://a.test, https://b.test,".into();
        assert_eq!(
            settings.get_cors_origins(),
            vec!["https://a.test", "https://b.test"]
        );
    }

    #[test]
    #[serial]
    fn test_config_dir_precedence() {
        clean_env_vars();
        let dir = tempfile::tempdir().unwrap();
        fs::write(
            dir.path().join(SETTINGS_FILE),
            r#"
            [application]
            port = 9090

            [webauthn]
            rp_name = "From config dir"
            allowed_origins = ["https://login.example.com"]
            supported_algorithms = [-7]

            [storage]
            backend = "file"
            path = "/tmp/creds"
            "#,
        )
        .unwrap();
        std::env::set_var(CONFIG_DIR_ENV, dir.path());
        std::env::set_var("PORT", "7070");

        let settings = Settings::load().unwrap();
        assert_eq!(settings.webauthn.rp_name, "From config dir");
        assert_eq!(settings.webauthn.supported_algorithms, vec![-7]);
        assert_eq!(
            settings.webauthn.allowed_origins,
            vec!["https://login.example.com".to_string()]
        );
        assert_eq!(settings.storage.backend, StorageBackend::File);
        // Environment beats the file
        assert_eq!(settings.application.port, 7070);
        // Unset values fall back to defaults
        assert_eq!(settings.webauthn.challenge_length, 16);

        clean_env_vars();
    }

    #[test]
    #[serial]
    fn test_unparsable_file_is_an_error() {
        clean_env_vars();
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join(SETTINGS_FILE), "[webauthn\nrp_name = ").unwrap();
        std::env::set_var(CONFIG_DIR_ENV, dir.path());

        assert!(matches!(
            Settings::load(),
            Err(SettingsError::Parse { .. })
        ));

        clean_env_vars();
    }
}
