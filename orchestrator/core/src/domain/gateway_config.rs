// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

// Gateway Configuration Types
//
// Defines the configuration schema for a SiGa signing gateway node:
// - Kubernetes-style manifest format (apiVersion/kind/metadata/spec)
// - Mobile-ID and Smart-ID polling delays
// - Status reprocessing thresholds and schedule
// - Container lock and polling worker pool limits
// - TSA/OCSP endpoints used to attribute provider failures

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::domain::events::ProviderRequestKind;

pub const API_VERSION: &str = "siga/v1";
pub const KIND: &str = "SigningGatewayConfig";

/// Top-level Kubernetes-style gateway configuration manifest
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GatewayConfigManifest {
    /// API version (must be "siga/v1")
    #[serde(rename = "apiVersion")]
    pub api_version: String,

    /// Resource kind (must be "SigningGatewayConfig")
    pub kind: String,

    pub metadata: ManifestMetadata,

    pub spec: GatewayConfigSpec,
}

/// Manifest metadata (Kubernetes-style)
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ManifestMetadata {
    /// Gateway node name
    pub name: String,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub version: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub labels: Option<HashMap<String, String>>,
}

/// Gateway configuration specification (content under spec:)
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct GatewayConfigSpec {
    #[serde(default)]
    pub mobile_id: MobileIdConfig,

    #[serde(default)]
    pub smart_id: SmartIdConfig,

    #[serde(default)]
    pub status_reprocessing: ReprocessingConfig,

    #[serde(default)]
    pub locking: LockingConfig,

    #[serde(default)]
    pub executor: ExecutorConfig,

    #[serde(default)]
    pub endpoints: ServiceEndpoints,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub logging: Option<LoggingConfig>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MobileIdConfig {
    /// Delay before the first status poll after signing starts
    #[serde(with = "humantime_serde", default = "default_polling_delay")]
    pub status_polling_delay: Duration,
}

impl Default for MobileIdConfig {
    fn default() -> Self {
        Self {
            status_polling_delay: default_polling_delay(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SmartIdConfig {
    #[serde(with = "humantime_serde", default = "default_polling_delay")]
    pub status_polling_delay: Duration,

    /// Certificate level requested from Smart-ID ("QUALIFIED" or "ADVANCED")
    #[serde(default = "default_certificate_level")]
    pub certificate_level: String,
}

impl Default for SmartIdConfig {
    fn default() -> Self {
        Self {
            status_polling_delay: default_polling_delay(),
            certificate_level: default_certificate_level(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReprocessingConfig {
    /// Processing attempts after which a status check surfaces the stored error
    #[serde(default = "default_max_processing_attempts")]
    pub max_processing_attempts: u32,

    /// Age after which an OUTSTANDING entry is re-polled
    #[serde(with = "humantime_serde", default = "default_processing_timeout")]
    pub processing_timeout: Duration,

    /// Age after which an EXCEPTION entry is re-polled
    #[serde(with = "humantime_serde", default = "default_exception_timeout")]
    pub exception_timeout: Duration,

    #[serde(with = "humantime_serde", default = "default_fixed_rate")]
    pub fixed_rate: Duration,

    #[serde(with = "humantime_serde", default = "default_initial_delay")]
    pub initial_delay: Duration,
}

impl Default for ReprocessingConfig {
    fn default() -> Self {
        Self {
            max_processing_attempts: default_max_processing_attempts(),
            processing_timeout: default_processing_timeout(),
            exception_timeout: default_exception_timeout(),
            fixed_rate: default_fixed_rate(),
            initial_delay: default_initial_delay(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LockingConfig {
    /// Bounded wait for the container lock
    #[serde(with = "humantime_serde", default = "default_container_lock_timeout")]
    pub container_lock_timeout: Duration,
}

impl Default for LockingConfig {
    fn default() -> Self {
        Self {
            container_lock_timeout: default_container_lock_timeout(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExecutorConfig {
    /// Upper bound on concurrently running polling tasks
    #[serde(default = "default_max_concurrent_polls")]
    pub max_concurrent_polls: usize,

    /// How long shutdown waits for in-flight polls
    #[serde(with = "humantime_serde", default = "default_shutdown_timeout")]
    pub shutdown_timeout: Duration,
}

impl Default for ExecutorConfig {
    fn default() -> Self {
        Self {
            max_concurrent_polls: default_max_concurrent_polls(),
            shutdown_timeout: default_shutdown_timeout(),
        }
    }
}

/// Provider endpoints contacted by the signature engine during finalize
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ServiceEndpoints {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tsa_url: Option<String>,

    #[serde(default)]
    pub ocsp_urls: Vec<String>,
}

impl ServiceEndpoints {
    /// Classify an outbound request URL. Configured URLs win; otherwise the
    /// URL path decides.
    pub fn classify(&self, url: &str) -> ProviderRequestKind {
        if self.tsa_url.as_deref() == Some(url) {
            return ProviderRequestKind::Tsa;
        }
        if self.ocsp_urls.iter().any(|u| u == url) {
            return ProviderRequestKind::Ocsp;
        }

        let lower = url.to_ascii_lowercase();
        let path = lower
            .split_once("://")
            .map(|(_, rest)| rest)
            .unwrap_or(&lower);
        if path.contains("tsa") {
            ProviderRequestKind::Tsa
        } else if path.contains("ocsp") {
            ProviderRequestKind::Ocsp
        } else {
            ProviderRequestKind::Other
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Log level (trace, debug, info, warn, error)
    #[serde(default = "default_log_level")]
    pub level: String,

    /// Log format (text, json)
    #[serde(default = "default_log_format")]
    pub format: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            format: default_log_format(),
        }
    }
}

fn default_polling_delay() -> Duration {
    Duration::from_secs(5)
}

fn default_certificate_level() -> String {
    "QUALIFIED".to_string()
}

fn default_max_processing_attempts() -> u32 {
    10
}

fn default_processing_timeout() -> Duration {
    Duration::from_secs(30)
}

fn default_exception_timeout() -> Duration {
    Duration::from_secs(5)
}

fn default_fixed_rate() -> Duration {
    Duration::from_secs(5)
}

fn default_initial_delay() -> Duration {
    Duration::from_secs(5)
}

fn default_container_lock_timeout() -> Duration {
    Duration::from_secs(5)
}

fn default_max_concurrent_polls() -> usize {
    64
}

fn default_shutdown_timeout() -> Duration {
    Duration::from_secs(30)
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_log_format() -> String {
    "text".to_string()
}

impl Default for GatewayConfigManifest {
    fn default() -> Self {
        let hostname = hostname::get()
            .ok()
            .and_then(|h| h.into_string().ok())
            .unwrap_or_else(|| "siga-gateway".to_string());

        Self {
            api_version: API_VERSION.to_string(),
            kind: KIND.to_string(),
            metadata: ManifestMetadata {
                name: hostname,
                version: Some("1.0.0".to_string()),
                labels: None,
            },
            spec: GatewayConfigSpec::default(),
        }
    }
}

impl GatewayConfigManifest {
    /// Load configuration from YAML file
    pub fn from_yaml_file(path: impl AsRef<Path>) -> anyhow::Result<Self> {
        let content = std::fs::read_to_string(path)?;
        let config = serde_yaml::from_str(&content)?;
        Ok(config)
    }

    /// Save configuration to YAML file
    pub fn to_yaml_file(&self, path: impl AsRef<Path>) -> anyhow::Result<()> {
        let yaml = serde_yaml::to_string(self)?;
        std::fs::write(path, yaml)?;
        Ok(())
    }

    pub fn from_yaml_str(yaml: &str) -> anyhow::Result<Self> {
        let config = serde_yaml::from_str(yaml)?;
        Ok(config)
    }

    /// Discover configuration file using precedence order
    /// 1. SIGA_CONFIG_PATH environment variable
    /// 2. ./siga-config.yaml (working directory)
    /// 3. ~/.siga/config.yaml (user home)
    /// 4. /etc/siga/config.yaml (system, Unix) or C:\ProgramData\Siga\config.yaml (Windows)
    pub fn discover_config() -> Option<PathBuf> {
        Self::candidate_paths().into_iter().find(|p| p.exists())
    }

    /// Every location `discover_config` checks, in order.
    pub fn candidate_paths() -> Vec<PathBuf> {
        let mut paths = Vec::new();

        if let Ok(path) = std::env::var("SIGA_CONFIG_PATH") {
            paths.push(PathBuf::from(path));
        }

        paths.push(PathBuf::from("./siga-config.yaml"));

        if let Some(home) = dirs::home_dir() {
            paths.push(home.join(".siga").join("config.yaml"));
        }

        #[cfg(unix)]
        paths.push(PathBuf::from("/etc/siga/config.yaml"));
        #[cfg(windows)]
        paths.push(PathBuf::from("C:\\ProgramData\\Siga\\config.yaml"));

        paths
    }

    /// Load configuration with precedence: explicit path, discovered path, defaults
    pub fn load_or_default(cli_path: Option<PathBuf>) -> anyhow::Result<Self> {
        // Explicit CLI path (fail if missing/invalid)
        if let Some(path) = cli_path {
            tracing::info!("Loading configuration from explicit path: {:?}", path);
            let mut config = Self::from_yaml_file(&path).map_err(|e| {
                anyhow::anyhow!("Failed to load config at {:?}: {}", path, e)
            })?;
            config.apply_env_overrides();
            return Ok(config);
        }

        if let Some(config_path) = Self::discover_config() {
            tracing::info!("Loading configuration from discovered path: {:?}", config_path);
            let mut config = Self::from_yaml_file(config_path)?;
            config.apply_env_overrides();
            Ok(config)
        } else {
            tracing::warn!("No configuration file found in standard locations. Using defaults.");
            let mut config = Self::default();
            config.apply_env_overrides();
            Ok(config)
        }
    }

    /// Apply environment variable overrides to configuration
    pub fn apply_env_overrides(&mut self) {
        if let Ok(val) = std::env::var("SIGA_MAX_PROCESSING_ATTEMPTS") {
            match val.parse::<u32>() {
                Ok(attempts) => {
                    tracing::info!("Environment override: SIGA_MAX_PROCESSING_ATTEMPTS={}", attempts);
                    self.spec.status_reprocessing.max_processing_attempts = attempts;
                }
                Err(_) => {
                    tracing::warn!(
                        "Invalid value for SIGA_MAX_PROCESSING_ATTEMPTS: '{}'. Expected an integer. Ignoring.",
                        val
                    );
                }
            }
        }

        if let Ok(val) = std::env::var("SIGA_CONTAINER_LOCK_TIMEOUT_MS") {
            match val.parse::<u64>() {
                Ok(ms) => {
                    tracing::info!("Environment override: SIGA_CONTAINER_LOCK_TIMEOUT_MS={}", ms);
                    self.spec.locking.container_lock_timeout = Duration::from_millis(ms);
                }
                Err(_) => {
                    tracing::warn!(
                        "Invalid value for SIGA_CONTAINER_LOCK_TIMEOUT_MS: '{}'. Expected milliseconds. Ignoring.",
                        val
                    );
                }
            }
        }
    }

    /// Validate configuration
    pub fn validate(&self) -> anyhow::Result<()> {
        if self.api_version != API_VERSION {
            anyhow::bail!("Invalid apiVersion: '{}'. Must be '{}'", self.api_version, API_VERSION);
        }

        if self.kind != KIND {
            anyhow::bail!("Invalid kind: '{}'. Must be '{}'", self.kind, KIND);
        }

        if self.metadata.name.is_empty() {
            anyhow::bail!("metadata.name cannot be empty");
        }

        if self.spec.status_reprocessing.max_processing_attempts == 0 {
            anyhow::bail!("spec.status_reprocessing.max_processing_attempts must be at least 1");
        }

        if self.spec.executor.max_concurrent_polls == 0 {
            anyhow::bail!("spec.executor.max_concurrent_polls must be at least 1");
        }

        if self.spec.status_reprocessing.fixed_rate.is_zero() {
            anyhow::bail!("spec.status_reprocessing.fixed_rate must be greater than zero");
        }

        match self.spec.smart_id.certificate_level.as_str() {
            "QUALIFIED" | "ADVANCED" => {}
            other => anyhow::bail!(
                "Invalid spec.smart_id.certificate_level: '{}'. Must be QUALIFIED or ADVANCED",
                other
            ),
        }

        if let Some(logging) = &self.spec.logging {
            if !matches!(logging.format.as_str(), "text" | "json") {
                anyhow::bail!("Invalid logging.format: '{}'. Must be text or json", logging.format);
            }
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_default_manifest() {
        let manifest = GatewayConfigManifest::default();
        assert_eq!(manifest.api_version, API_VERSION);
        assert_eq!(manifest.kind, KIND);
        assert!(!manifest.metadata.name.is_empty());
        assert_eq!(manifest.spec.status_reprocessing.max_processing_attempts, 10);
        assert_eq!(manifest.spec.status_reprocessing.processing_timeout, Duration::from_secs(30));
        assert_eq!(manifest.spec.status_reprocessing.exception_timeout, Duration::from_secs(5));
        assert!(manifest.validate().is_ok());
    }

    #[test]
    fn test_yaml_with_humantime_durations() {
        let yaml = r#"
apiVersion: siga/v1
kind: SigningGatewayConfig
metadata:
  name: gateway-1
spec:
  mobile_id:
    status_polling_delay: 250ms
  status_reprocessing:
    max_processing_attempts: 3
    processing_timeout: 1m
  locking:
    container_lock_timeout: 2s
  endpoints:
    tsa_url: http://tsa.example.com/tsa
    ocsp_urls:
      - http://ocsp.example.com
"#;
        let manifest = GatewayConfigManifest::from_yaml_str(yaml).unwrap();

        assert_eq!(manifest.spec.mobile_id.status_polling_delay, Duration::from_millis(250));
        assert_eq!(manifest.spec.smart_id.status_polling_delay, Duration::from_secs(5));
        assert_eq!(manifest.spec.status_reprocessing.max_processing_attempts, 3);
        assert_eq!(manifest.spec.status_reprocessing.processing_timeout, Duration::from_secs(60));
        assert_eq!(manifest.spec.locking.container_lock_timeout, Duration::from_secs(2));
        assert!(manifest.validate().is_ok());
    }

    #[test]
    fn test_validation() {
        let mut manifest = GatewayConfigManifest::default();
        assert!(manifest.validate().is_ok());

        manifest.api_version = "wrong/v1".to_string();
        assert!(manifest.validate().is_err());
        manifest.api_version = API_VERSION.to_string();

        manifest.metadata.name = "".to_string();
        assert!(manifest.validate().is_err());
        manifest.metadata.name = "gateway".to_string();

        manifest.spec.status_reprocessing.max_processing_attempts = 0;
        assert!(manifest.validate().is_err());
        manifest.spec.status_reprocessing.max_processing_attempts = 10;

        manifest.spec.executor.max_concurrent_polls = 0;
        assert!(manifest.validate().is_err());
        manifest.spec.executor.max_concurrent_polls = 8;

        manifest.spec.smart_id.certificate_level = "WHATEVER".to_string();
        assert!(manifest.validate().is_err());
    }

    #[test]
    fn test_load_from_explicit_path() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        let yaml = serde_yaml::to_string(&GatewayConfigManifest::default()).unwrap();
        file.write_all(yaml.as_bytes()).unwrap();

        let loaded = GatewayConfigManifest::load_or_default(Some(file.path().to_path_buf())).unwrap();
        assert_eq!(loaded.kind, KIND);

        let missing = GatewayConfigManifest::load_or_default(Some(PathBuf::from("/nonexistent/siga.yaml")));
        assert!(missing.is_err());
    }

    #[test]
    fn test_endpoint_classification() {
        let endpoints = ServiceEndpoints {
            tsa_url: Some("http://demo.sk.ee/tsa".to_string()),
            ocsp_urls: vec!["http://aia.demo.sk.ee/esteid2018".to_string()],
        };

        assert_eq!(endpoints.classify("http://demo.sk.ee/tsa"), ProviderRequestKind::Tsa);
        assert_eq!(endpoints.classify("http://aia.demo.sk.ee/esteid2018"), ProviderRequestKind::Ocsp);
        assert_eq!(endpoints.classify("http://ocsp.example.com/check"), ProviderRequestKind::Ocsp);
        assert_eq!(endpoints.classify("http://crl.example.com/list"), ProviderRequestKind::Other);
    }
}
