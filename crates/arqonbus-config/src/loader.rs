use std::path::{Path, PathBuf};

use tracing::{debug, warn};

use crate::{env_subst::substitute_env, schema::ArqonConfig};

/// Standard config file names, checked in order.
const CONFIG_FILENAMES: &[&str] = &["arqonbus.toml", "arqonbus.yaml", "arqonbus.yml", "arqonbus.json"];

/// Load config from the given path (any supported format), with env
/// substitution applied before parsing.
pub fn load_config(path: &Path) -> anyhow::Result<ArqonConfig> {
    let raw = std::fs::read_to_string(path)
        .map_err(|e| anyhow::anyhow!("failed to read {}: {e}", path.display()))?;
    let raw = substitute_env(&raw);
    parse_config(&raw, path)
}

fn parse_config(raw: &str, path: &Path) -> anyhow::Result<ArqonConfig> {
    let ext = path
        .extension()
        .and_then(|e| e.to_str())
        .unwrap_or("toml")
        .to_lowercase();

    let config: ArqonConfig = match ext.as_str() {
        "toml" => toml::from_str(raw)?,
        "yaml" | "yml" => serde_yaml::from_str(raw)?,
        "json" => serde_json::from_str(raw)?,
        other => anyhow::bail!("unsupported config format: {other}"),
    };
    crate::validate::validate(&config)?;
    Ok(config)
}

/// Discover and load config from standard locations.
///
/// Search order:
/// 1. `./arqonbus.{toml,yaml,yml,json}` (project-local)
/// 2. `~/.config/arqonbus/arqonbus.{toml,yaml,yml,json}` (user-global)
///
/// Returns `ArqonConfig::default()` if no config file is found.
pub fn discover_and_load() -> ArqonConfig {
    if let Some(path) = find_config_file() {
        debug!(path = %path.display(), "loading config");
        match load_config(&path) {
            Ok(cfg) => return cfg,
            Err(e) => {
                warn!(path = %path.display(), error = %e, "failed to load config, using defaults");
            },
        }
    } else {
        debug!("no config file found, using defaults");
    }
    ArqonConfig::default()
}

fn find_config_file() -> Option<PathBuf> {
    for name in CONFIG_FILENAMES {
        let p = PathBuf::from(name);
        if p.exists() {
            return Some(p);
        }
    }

    if let Some(dirs) = directories::ProjectDirs::from("", "", "arqonbus") {
        let config_dir = dirs.config_dir();
        for name in CONFIG_FILENAMES {
            let p = config_dir.join(name);
            if p.exists() {
                return Some(p);
            }
        }
    }

    None
}

/// Returns the user-global config directory (`~/.config/arqonbus/`).
pub fn config_dir() -> Option<PathBuf> {
    directories::ProjectDirs::from("", "", "arqonbus").map(|d| d.config_dir().to_path_buf())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_toml() {
        let raw = r#"
            [server]
            port = 9999
        "#;
        let cfg = parse_config(raw, Path::new("x.toml")).unwrap();
        assert_eq!(cfg.server.port, 9999);
    }

    #[test]
    fn parses_yaml() {
        let raw = "server:\n  port: 7000\n";
        let cfg = parse_config(raw, Path::new("x.yaml")).unwrap();
        assert_eq!(cfg.server.port, 7000);
    }

    #[test]
    fn parses_json() {
        let raw = r#"{"server": {"port": 6000}}"#;
        let cfg = parse_config(raw, Path::new("x.json")).unwrap();
        assert_eq!(cfg.server.port, 6000);
    }

    #[test]
    fn unsupported_extension_errors() {
        assert!(parse_config("x", Path::new("x.ini")).is_err());
    }

    #[test]
    fn missing_file_falls_back_to_default_in_discover() {
        let dir = tempfile::tempdir().unwrap();
        std::env::set_current_dir(dir.path()).unwrap();
        let cfg = discover_and_load();
        assert_eq!(cfg.server.port, ArqonConfig::default().server.port);
    }

    #[test]
    fn env_substitution_applies_before_parse() {
        // SAFETY: test-only env mutation, no concurrent access to this var.
        unsafe {
            std::env::set_var("ARQONBUS_TEST_BIND", "10.0.0.5");
        }
        let raw = r#"
            [server]
            bind_address = "${ARQONBUS_TEST_BIND}"
        "#;
        let substituted = substitute_env(raw);
        let cfg = parse_config(&substituted, Path::new("x.toml")).unwrap();
        assert_eq!(cfg.server.bind_address, "10.0.0.5");
        unsafe {
            std::env::remove_var("ARQONBUS_TEST_BIND");
        }
    }
}
