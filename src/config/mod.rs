// cache-restore/src/config/mod.rs
use anyhow::Context;
use serde::Deserialize;
use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};

use crate::errors::{RestoreError, Result};
use crate::storage::Provider;

const DEFAULT_REGION: &str = "us-east-1";
const FALLBACK_DIR_NAME: &str = "cache-restore-fallback";

/// Optional JSON config file. Any field here is used only when the
/// matching `INPUT_*` variable is absent or empty.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct RawJsonConfig {
    pub provider: Option<String>,
    pub endpoint: Option<String>,
    pub bucket: Option<String>,
    pub root: Option<String>,
    pub key: Option<String>,
    pub path: Option<Vec<String>>,
    pub restore_keys: Option<Vec<String>>,
    pub use_fallback: Option<bool>,
    pub region: Option<String>,
    pub access_key_id: Option<String>,
    pub secret_access_key: Option<String>,
    pub fallback_dir: Option<PathBuf>,
}

#[derive(Debug, Clone)]
pub struct StaticCredentials {
    pub access_key_id: String,
    pub secret_access_key: String,
}

#[derive(Debug, Clone)]
pub struct StorageConfig {
    pub provider: Provider,
    pub endpoint: Option<String>,
    pub bucket: String,
    pub root: Option<String>,
    pub region: String,
    pub credentials: Option<StaticCredentials>,
}

/// Facts about the CI runner this restore runs on.
#[derive(Debug, Clone, Default)]
pub struct RunnerEnv {
    pub workspace: PathBuf,
    pub temp_root: Option<PathBuf>,
    pub server_url: Option<String>,
    pub state_file: Option<PathBuf>,
    pub output_file: Option<PathBuf>,
    pub debug: bool,
}

#[derive(Debug, Clone)]
pub struct RestoreConfig {
    pub storage: StorageConfig,
    pub key: String,
    pub paths: Vec<String>,
    pub restore_keys: Vec<String>,
    pub use_fallback: bool,
    pub fallback_dir: Option<PathBuf>,
    pub runner: RunnerEnv,
}

/// Read an action input the way runners export them: `INPUT_<NAME>`,
/// upper-cased, spaces turned into underscores, hyphens kept.
pub fn input(vars: &HashMap<String, String>, name: &str) -> Option<String> {
    let var = format!("INPUT_{}", name.replace(' ', "_").to_uppercase());
    vars.get(&var)
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

/// Multi-line input: one entry per line, trimmed, blanks dropped.
pub fn input_as_array(vars: &HashMap<String, String>, name: &str) -> Vec<String> {
    input(vars, name)
        .map(|value| split_lines(&value))
        .unwrap_or_default()
}

pub fn input_as_bool(vars: &HashMap<String, String>, name: &str) -> Option<bool> {
    input(vars, name).map(|v| v.eq_ignore_ascii_case("true"))
}

fn split_lines(value: &str) -> Vec<String> {
    value
        .lines()
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
        .collect()
}

fn non_empty(value: &Option<String>) -> Option<String> {
    value
        .as_ref()
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
}

fn required(value: Option<String>, name: &str) -> Result<String> {
    value.ok_or_else(|| RestoreError::Config(format!("Input required and not supplied: {}", name)))
}

impl RestoreConfig {
    pub fn from_env(vars: &HashMap<String, String>, file: Option<&RawJsonConfig>) -> Result<Self> {
        let default_file = RawJsonConfig::default();
        let file = file.unwrap_or(&default_file);

        let pick = |name: &str, fallback: &Option<String>| input(vars, name).or_else(|| non_empty(fallback));

        let provider: Provider = required(pick("provider", &file.provider), "provider")?.parse()?;
        let bucket = required(pick("bucket", &file.bucket), "bucket")?;
        let key = required(pick("key", &file.key), "key")?;

        let credentials = match (
            pick("access-key-id", &file.access_key_id),
            pick("secret-access-key", &file.secret_access_key),
        ) {
            (Some(access_key_id), Some(secret_access_key)) => Some(StaticCredentials {
                access_key_id,
                secret_access_key,
            }),
            (None, None) => None,
            _ => {
                return Err(RestoreError::Config(
                    "access-key-id and secret-access-key must be supplied together".to_string(),
                ));
            }
        };

        let storage = StorageConfig {
            provider,
            endpoint: pick("endpoint", &file.endpoint),
            bucket,
            root: pick("root", &file.root),
            region: pick("region", &file.region).unwrap_or_else(|| DEFAULT_REGION.to_string()),
            credentials,
        };

        let mut paths = input_as_array(vars, "path");
        if paths.is_empty() {
            paths = file.path.clone().unwrap_or_default();
        }
        let mut restore_keys = input_as_array(vars, "restore-keys");
        if restore_keys.is_empty() {
            restore_keys = file.restore_keys.clone().unwrap_or_default();
        }

        let use_fallback = input_as_bool(vars, "use-fallback")
            .or(file.use_fallback)
            .unwrap_or(false);

        let env_path = |name: &str| {
            vars.get(name)
                .filter(|v| !v.trim().is_empty())
                .map(PathBuf::from)
        };

        let fallback_dir = input(vars, "fallback-dir")
            .map(PathBuf::from)
            .or_else(|| file.fallback_dir.clone())
            .or_else(|| env_path("RUNNER_TOOL_CACHE").map(|p| p.join(FALLBACK_DIR_NAME)));

        let workspace = match env_path("GITHUB_WORKSPACE") {
            Some(path) => path,
            None => std::env::current_dir()?,
        };

        let runner = RunnerEnv {
            workspace,
            temp_root: env_path("RUNNER_TEMP"),
            server_url: vars.get("GITHUB_SERVER_URL").cloned(),
            state_file: env_path("GITHUB_STATE"),
            output_file: env_path("GITHUB_OUTPUT"),
            debug: vars.get("RUNNER_DEBUG").is_some_and(|v| v == "1"),
        };

        Ok(RestoreConfig {
            storage,
            key,
            paths,
            restore_keys,
            use_fallback,
            fallback_dir,
            runner,
        })
    }
}

pub fn load_json_config(config_path: &Path) -> anyhow::Result<RawJsonConfig> {
    let config_content = fs::read_to_string(config_path)
        .with_context(|| format!("Failed to read config file at {}", config_path.display()))?;
    serde_json::from_str(&config_content).with_context(|| {
        format!(
            "Failed to parse JSON from config file at {}",
            config_path.display()
        )
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn minimal_env() -> HashMap<String, String> {
        let mut env = HashMap::new();
        env.insert("INPUT_PROVIDER".to_string(), "s3".to_string());
        env.insert("INPUT_BUCKET".to_string(), "ci-cache".to_string());
        env.insert("INPUT_KEY".to_string(), "build-123".to_string());
        env.insert("GITHUB_WORKSPACE".to_string(), "/work".to_string());
        env
    }

    #[test]
    fn test_minimal_config() -> anyhow::Result<()> {
        let config = RestoreConfig::from_env(&minimal_env(), None)?;
        assert_eq!(config.storage.provider, Provider::S3);
        assert_eq!(config.storage.bucket, "ci-cache");
        assert_eq!(config.storage.region, "us-east-1");
        assert!(config.storage.credentials.is_none());
        assert_eq!(config.key, "build-123");
        assert!(config.restore_keys.is_empty());
        assert!(!config.use_fallback);
        assert_eq!(config.runner.workspace, PathBuf::from("/work"));
        assert!(!config.runner.debug);
        Ok(())
    }

    #[test]
    fn test_missing_required_inputs() {
        for name in ["INPUT_PROVIDER", "INPUT_BUCKET", "INPUT_KEY"] {
            let mut env = minimal_env();
            env.remove(name);
            let err = RestoreConfig::from_env(&env, None).unwrap_err();
            assert!(matches!(err, RestoreError::Config(_)), "{name}");
        }

        let mut env = minimal_env();
        env.insert("INPUT_KEY".to_string(), "   ".to_string());
        assert!(RestoreConfig::from_env(&env, None).is_err());
    }

    #[test]
    fn test_multiline_inputs() -> anyhow::Result<()> {
        let mut env = minimal_env();
        env.insert(
            "INPUT_RESTORE-KEYS".to_string(),
            "build-linux-\n\n  build-\n".to_string(),
        );
        env.insert("INPUT_PATH".to_string(), "target\n~/.cargo/registry".to_string());
        env.insert("INPUT_USE-FALLBACK".to_string(), "TRUE".to_string());

        let config = RestoreConfig::from_env(&env, None)?;
        assert_eq!(config.restore_keys, vec!["build-linux-", "build-"]);
        assert_eq!(config.paths, vec!["target", "~/.cargo/registry"]);
        assert!(config.use_fallback);
        Ok(())
    }

    #[test]
    fn test_use_fallback_requires_literal_true() -> anyhow::Result<()> {
        let mut env = minimal_env();
        env.insert("INPUT_USE-FALLBACK".to_string(), "yes".to_string());
        assert!(!RestoreConfig::from_env(&env, None)?.use_fallback);
        Ok(())
    }

    #[test]
    fn test_json_file_fills_gaps_only() -> anyhow::Result<()> {
        let raw: RawJsonConfig = serde_json::from_value(serde_json::json!({
            "provider": "fs",
            "bucket": "/var/cache/ci",
            "root": "nightly",
            "restore-keys": ["deps-"],
            "use-fallback": true
        }))?;

        let mut env = minimal_env();
        env.remove("INPUT_PROVIDER");
        let config = RestoreConfig::from_env(&env, Some(&raw))?;

        assert_eq!(config.storage.provider, Provider::Fs);
        // The environment wins over the file.
        assert_eq!(config.storage.bucket, "ci-cache");
        assert_eq!(config.storage.root.as_deref(), Some("nightly"));
        assert_eq!(config.restore_keys, vec!["deps-"]);
        assert!(config.use_fallback);
        Ok(())
    }

    #[test]
    fn test_partial_credentials_rejected() {
        let mut env = minimal_env();
        env.insert("INPUT_ACCESS-KEY-ID".to_string(), "AKIA".to_string());
        let err = RestoreConfig::from_env(&env, None).unwrap_err();
        assert!(matches!(err, RestoreError::Config(_)));

        env.insert("INPUT_SECRET-ACCESS-KEY".to_string(), "secret".to_string());
        let config = RestoreConfig::from_env(&env, None).unwrap();
        assert_eq!(config.storage.credentials.unwrap().access_key_id, "AKIA");
    }

    #[test]
    fn test_runner_environment() -> anyhow::Result<()> {
        let mut env = minimal_env();
        env.insert("RUNNER_TEMP".to_string(), "/tmp/runner".to_string());
        env.insert("RUNNER_TOOL_CACHE".to_string(), "/opt/hostedtoolcache".to_string());
        env.insert("RUNNER_DEBUG".to_string(), "1".to_string());
        env.insert("GITHUB_OUTPUT".to_string(), "/tmp/out".to_string());

        let config = RestoreConfig::from_env(&env, None)?;
        assert_eq!(config.runner.temp_root, Some(PathBuf::from("/tmp/runner")));
        assert_eq!(
            config.fallback_dir,
            Some(PathBuf::from("/opt/hostedtoolcache").join(FALLBACK_DIR_NAME))
        );
        assert!(config.runner.debug);
        assert_eq!(config.runner.output_file, Some(PathBuf::from("/tmp/out")));
        assert!(config.runner.state_file.is_none());
        Ok(())
    }
}
