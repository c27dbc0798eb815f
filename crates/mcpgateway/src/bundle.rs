//! Sanitized support bundle collection.
//!
//! Writes a redacted snapshot of the effective configuration, the
//! process/version info, and optionally the tail of the gateway's log
//! file. Secrets never leave the process: anything shaped like a
//! password, token or secret is masked before writing.

use anyhow::Context;
use mcpgateway_config::GatewayConfig;
use serde_json::json;
use std::path::{Path, PathBuf};

const MASK: &str = "******";

/// Collect the bundle into `output_dir/mcpgateway-support-<timestamp>`.
///
/// # Errors
///
/// Returns an error when the directory cannot be created or written.
pub fn collect(
    config: &GatewayConfig,
    output_dir: &Path,
    no_logs: bool,
    log_lines: usize,
) -> anyhow::Result<PathBuf> {
    let stamp = chrono::Utc::now().format("%Y%m%dT%H%M%SZ");
    let bundle_dir = output_dir.join(format!("mcpgateway-support-{stamp}"));
    std::fs::create_dir_all(&bundle_dir)
        .with_context(|| format!("creating {}", bundle_dir.display()))?;

    std::fs::write(
        bundle_dir.join("version.txt"),
        format!(
            "mcpgateway {}\nrustc-built: {}\nplatform: {}\n",
            env!("CARGO_PKG_VERSION"),
            option_env!("VERGEN_RUSTC_SEMVER").unwrap_or("unknown"),
            std::env::consts::OS,
        ),
    )?;

    std::fs::write(
        bundle_dir.join("config.json"),
        serde_json::to_string_pretty(&sanitized_config(config))?,
    )?;

    if !no_logs && config.logging.to_file {
        if let Some(tail) = latest_log_tail(&config.logging.file_dir, log_lines)? {
            std::fs::write(bundle_dir.join("logs.tail"), redact_lines(&tail))?;
        }
    }

    Ok(bundle_dir)
}

/// The effective configuration with credential material masked.
fn sanitized_config(config: &GatewayConfig) -> serde_json::Value {
    json!({
        "server": {"host": config.server.host, "port": config.server.port},
        "store": {
            "database_url": mask_url_credentials(&config.store.database_url),
            "pool_size": config.store.pool.size,
        },
        "cache_backend": format!("{:?}", config.cache_backend),
        "redis_url": config.redis_url.as_deref().map(mask_url_credentials),
        "jwt": {
            "secret": config.jwt.secret.as_deref().map(|_| MASK),
            "algorithm": config.jwt.algorithm,
            "require_token_expiration": config.jwt.require_token_expiration,
        },
        "federation": {
            "enabled": config.federation.enabled,
            "mdns_discovery": config.federation.mdns_discovery,
            "tool_name_separator": config.federation.tool_name_separator,
            "health_check_interval_s": config.federation.health_check_interval.as_secs(),
        },
        "plugins": {
            "enabled": config.plugins.enabled,
            "config_file": config.plugins.config_file,
            "timeout_s": config.plugins.timeout.as_secs(),
        },
        "elicitation": {
            "enabled": config.elicitation.enabled,
            "timeout_s": config.elicitation.timeout.as_secs(),
            "max_concurrent": config.elicitation.max_concurrent,
        },
        "flags": {
            "enable_header_passthrough": config.enable_header_passthrough,
            "enable_overwrite_base_headers": config.enable_overwrite_base_headers,
            "a2a_enabled": config.a2a_enabled,
            "compression_enabled": config.compression_enabled,
        },
        "default_passthrough_headers": config.default_passthrough_headers,
    })
}

/// Strip userinfo from a URL-shaped string.
fn mask_url_credentials(raw: &str) -> String {
    match url::Url::parse(raw) {
        Ok(mut parsed) => {
            if parsed.password().is_some() || !parsed.username().is_empty() {
                let _ = parsed.set_username(MASK);
                let _ = parsed.set_password(Some(MASK));
            }
            parsed.to_string()
        }
        Err(_) => raw.to_string(),
    }
}

/// Mask obvious secrets in log lines.
fn redact_lines(text: &str) -> String {
    let needles = ["password", "secret", "token", "apikey", "authorization"];
    text.lines()
        .map(|line| {
            let lower = line.to_ascii_lowercase();
            if needles.iter().any(|needle| lower.contains(needle)) {
                // keep the line shape, mask everything after the key
                match line.split_once(['=', ':']) {
                    Some((key, _)) => format!("{key}={MASK}"),
                    None => MASK.to_string(),
                }
            } else {
                line.to_string()
            }
        })
        .collect::<Vec<_>>()
        .join("\n")
}

/// The last `lines` lines of the most recent log file, if any.
fn latest_log_tail(dir: &Path, lines: usize) -> anyhow::Result<Option<String>> {
    let mut newest: Option<(std::time::SystemTime, PathBuf)> = None;
    let Ok(entries) = std::fs::read_dir(dir) else {
        return Ok(None);
    };
    for entry in entries.flatten() {
        let path = entry.path();
        if path.is_file() {
            let modified = entry.metadata()?.modified()?;
            if newest.as_ref().is_none_or(|(when, _)| modified > *when) {
                newest = Some((modified, path));
            }
        }
    }
    let Some((_, path)) = newest else {
        return Ok(None);
    };
    let contents = std::fs::read_to_string(&path)?;
    let tail: Vec<&str> = contents.lines().rev().take(lines).collect();
    Ok(Some(
        tail.into_iter().rev().collect::<Vec<_>>().join("\n"),
    ))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn config_snapshot_masks_secrets() {
        let mut config = GatewayConfig::default();
        config.jwt.secret = Some("super-secret".into());
        config.store.database_url = "postgres://user:pw@db.example.com/gw".into();
        let snapshot = sanitized_config(&config);
        assert_eq!(snapshot["jwt"]["secret"], MASK);
        let url = snapshot["store"]["database_url"].as_str().unwrap();
        assert!(!url.contains("pw"));
        assert!(url.contains(MASK));
    }

    #[test]
    fn log_redaction_masks_suspicious_lines() {
        let text = "normal line\nauthorization: Bearer abc123\nanother";
        let redacted = redact_lines(text);
        assert!(redacted.contains("normal line"));
        assert!(!redacted.contains("abc123"));
        assert!(redacted.contains(MASK));
    }

    #[test]
    fn bundle_writes_expected_files() {
        let dir = tempfile::tempdir().unwrap();
        let config = GatewayConfig::default();
        let bundle = collect(&config, dir.path(), true, 100).unwrap();
        assert!(bundle.join("version.txt").exists());
        assert!(bundle.join("config.json").exists());
    }
}
