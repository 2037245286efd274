// SPDX-License-Identifier: GPL-3.0-or-later
use std::path::Path;

use anyhow::{bail, Context, Result};
use declarr_domain::{DesiredState, IR_VERSION};
use figment::{
    providers::{Env, Format, Serialized, Toml},
    Figment,
};
use serde::{Deserialize, Serialize};
use tracing::info;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TelemetryConfig {
    pub log_level: String,
}

impl Default for TelemetryConfig {
    fn default() -> Self {
        Self {
            log_level: "info".to_string(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReconcileConfig {
    /// Label of the ownership tag; identical for every resource kind on
    /// one instance.
    pub ownership_label: String,
    /// Deadline for one instance's pass, in seconds.
    pub pass_timeout_secs: u64,
}

impl Default for ReconcileConfig {
    fn default() -> Self {
        Self {
            ownership_label: "declarr".to_string(),
            pass_timeout_secs: 600,
        }
    }
}

/// Connection descriptor for one managed service instance.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InstanceConfig {
    pub name: String,
    pub base_url: String,
    pub api_key: String,
    #[serde(default)]
    pub insecure_tls: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct AppConfig {
    pub telemetry: TelemetryConfig,
    pub reconcile: ReconcileConfig,
    #[serde(default)]
    pub instances: Vec<InstanceConfig>,
}

/// Load configuration from defaults, optional TOML file, and environment
/// overrides (prefix: DECLARR_).
pub fn load(config_path: Option<&Path>) -> Result<AppConfig> {
    let mut figment = Figment::from(Serialized::defaults(AppConfig::default()));

    if let Some(path) = config_path {
        figment = figment.merge(Toml::file(path));
    }

    figment = figment.merge(Env::prefixed("DECLARR_").split("__"));

    let config: AppConfig = figment.extract()?;
    info!(target: "config", instances = config.instances.len(), "configuration loaded");
    Ok(config)
}

/// Load and validate the desired-state file, then normalize managed
/// resource names so keys, ownership checks, and payloads agree.
pub fn load_desired(path: &Path) -> Result<DesiredState> {
    let mut desired: DesiredState = Figment::from(Toml::file(path))
        .extract()
        .with_context(|| format!("reading desired state from {}", path.display()))?;

    if desired.version != IR_VERSION {
        bail!(
            "desired state schema version {} is not supported (expected {})",
            desired.version,
            IR_VERSION
        );
    }

    desired.apply_managed_names();
    info!(target: "config", path = %path.display(), "desired state loaded");
    Ok(desired)
}
