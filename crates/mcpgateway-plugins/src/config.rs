//! Plugin chain definition, loaded from `PLUGIN_CONFIG_FILE`.

use crate::error::PluginError;
use crate::hooks::HookType;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::path::Path;

/// Execution mode for one plugin.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PluginMode {
    /// Violations block; plugin errors block
    #[default]
    Enforce,
    /// Violations block; plugin errors are logged and skipped
    EnforceIgnoreError,
    /// Violations are logged, the request continues
    Permissive,
    /// Plugin is skipped entirely
    Disabled,
}

/// Transport an external plugin speaks
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ExternalTransport {
    /// Spawned child process over stdio
    Stdio,
    /// Server-Sent Events
    Sse,
    /// MCP streamable HTTP
    Streamablehttp,
    /// WebSocket
    Websocket,
}

/// Where an external plugin lives
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExternalEndpoint {
    /// Transport to use
    pub transport: ExternalTransport,
    /// URL for network transports
    #[serde(skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,
    /// Script path for stdio transports
    #[serde(skip_serializing_if = "Option::is_none")]
    pub script: Option<String>,
}

/// One plugin's registration in the chain definition.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PluginSpec {
    /// Unique plugin name
    pub name: String,
    /// Hooks the plugin attaches to
    pub hooks: Vec<HookType>,
    /// Execution mode
    #[serde(default)]
    pub mode: PluginMode,
    /// Chain position; lower runs earlier
    #[serde(default)]
    pub priority: i32,
    /// Run conditions; empty means always
    #[serde(default)]
    pub conditions: crate::conditions::PluginConditions,
    /// Opaque plugin configuration
    #[serde(default)]
    pub config: Value,
    /// Whether the plugin may return `modified_payload`. Plugins that do
    /// are never scheduled into a parallel band.
    #[serde(default = "default_mutates")]
    pub mutates_payload: bool,
    /// Per-plugin deadline override in seconds
    #[serde(skip_serializing_if = "Option::is_none")]
    pub timeout_seconds: Option<u64>,
    /// External plugin endpoint; absent for native plugins
    #[serde(skip_serializing_if = "Option::is_none")]
    pub external: Option<ExternalEndpoint>,
}

fn default_mutates() -> bool {
    true
}

/// The whole chain definition file.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ChainConfig {
    /// Plugins, in declaration order (ties in `priority` keep this order)
    #[serde(default)]
    pub plugins: Vec<PluginSpec>,
    /// Allow equal-priority, non-mutating plugins to run concurrently
    #[serde(default)]
    pub parallel_execution_within_band: bool,
}

impl ChainConfig {
    /// Load and validate a chain definition from a YAML or JSON file.
    ///
    /// # Errors
    ///
    /// Returns `PluginError::Config` when the file is unreadable, fails to
    /// parse, or contains duplicate plugin names.
    pub fn load(path: &Path) -> Result<Self, PluginError> {
        let raw = std::fs::read_to_string(path)
            .map_err(|e| PluginError::Config(format!("cannot read {}: {e}", path.display())))?;
        let cfg: Self = serde_yaml::from_str(&raw)
            .map_err(|e| PluginError::Config(format!("cannot parse {}: {e}", path.display())))?;
        cfg.validate()?;
        Ok(cfg)
    }

    /// Validate the chain definition.
    ///
    /// # Errors
    ///
    /// Returns `PluginError::Config` on duplicate names or external
    /// entries without an address.
    pub fn validate(&self) -> Result<(), PluginError> {
        let mut seen = std::collections::HashSet::new();
        for spec in &self.plugins {
            if !seen.insert(spec.name.as_str()) {
                return Err(PluginError::Config(format!(
                    "duplicate plugin name {:?}",
                    spec.name
                )));
            }
            if let Some(external) = &spec.external {
                let has_address = match external.transport {
                    ExternalTransport::Stdio => external.script.is_some(),
                    _ => external.url.is_some(),
                };
                if !has_address {
                    return Err(PluginError::Config(format!(
                        "external plugin {:?} has no url/script for its transport",
                        spec.name
                    )));
                }
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn chain_file_roundtrip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("plugins.yaml");
        std::fs::write(
            &path,
            r#"
parallel_execution_within_band: true
plugins:
  - name: PIIFilterPlugin
    hooks: [tool_pre_invoke]
    mode: enforce
    priority: 10
    config:
      pattern: "123-45-6789"
  - name: AuditTap
    hooks: [tool_post_invoke]
    mode: permissive
    priority: 10
    mutates_payload: false
"#,
        )
        .unwrap();
        let cfg = ChainConfig::load(&path).unwrap();
        assert!(cfg.parallel_execution_within_band);
        assert_eq!(cfg.plugins.len(), 2);
        assert_eq!(cfg.plugins[0].mode, PluginMode::Enforce);
        assert!(!cfg.plugins[1].mutates_payload);
    }

    #[test]
    fn duplicate_names_rejected() {
        let cfg = ChainConfig {
            plugins: vec![
                PluginSpec {
                    name: "dup".into(),
                    hooks: vec![HookType::ToolPreInvoke],
                    mode: PluginMode::Enforce,
                    priority: 0,
                    conditions: Default::default(),
                    config: Value::Null,
                    mutates_payload: true,
                    timeout_seconds: None,
                    external: None,
                },
                PluginSpec {
                    name: "dup".into(),
                    hooks: vec![HookType::ToolPostInvoke],
                    mode: PluginMode::Enforce,
                    priority: 1,
                    conditions: Default::default(),
                    config: Value::Null,
                    mutates_payload: true,
                    timeout_seconds: None,
                    external: None,
                },
            ],
            parallel_execution_within_band: false,
        };
        assert!(cfg.validate().is_err());
    }

    #[test]
    fn external_needs_an_address() {
        let cfg = ChainConfig {
            plugins: vec![PluginSpec {
                name: "remote".into(),
                hooks: vec![HookType::ToolPreInvoke],
                mode: PluginMode::Enforce,
                priority: 0,
                conditions: Default::default(),
                config: Value::Null,
                mutates_payload: true,
                timeout_seconds: None,
                external: Some(ExternalEndpoint {
                    transport: ExternalTransport::Streamablehttp,
                    url: None,
                    script: None,
                }),
            }],
            parallel_execution_within_band: false,
        };
        assert!(cfg.validate().is_err());
    }
}
