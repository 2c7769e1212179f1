use anyhow::{anyhow, Context, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};

pub const DEFAULT_INDEX: &str = "data/index/knowledge_index.jsonl";
pub const DEFAULT_BENCHMARK: &str = "benchmarks/retrieval_benchmark.yaml";
pub const DEFAULT_TOP_K: usize = 8;
pub const DEFAULT_FAIL_BELOW: f64 = 0.80;

/// Picked up from the working directory when `--config` is not given
pub const CONFIG_FILE_NAME: &str = "kb.toml";

pub const ENV_INDEX: &str = "KB_INDEX";
pub const ENV_TOP_K: &str = "KB_TOP_K";

/// Optional settings file (TOML or JSON). Unknown keys are rejected.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct FileConfig {
    #[serde(default)]
    pub index: Option<PathBuf>,
    #[serde(default)]
    pub top_k: Option<usize>,
    #[serde(default)]
    pub benchmark: Option<PathBuf>,
    #[serde(default)]
    pub fail_below: Option<f64>,
    #[serde(default)]
    pub json_out: Option<PathBuf>,
    #[serde(default)]
    pub md_out: Option<PathBuf>,
}

impl FileConfig {
    /// Parse JSON first, then TOML.
    pub fn from_bytes(bytes: &[u8]) -> Result<Self> {
        let value: serde_json::Value = match serde_json::from_slice(bytes) {
            Ok(value) => value,
            Err(json_err) => {
                let utf8 =
                    std::str::from_utf8(bytes).map_err(|err| anyhow!("{json_err}; {err}"))?;
                let toml_value: toml::Value = toml::from_str(utf8).map_err(|toml_err| {
                    anyhow!(
                        "Config is not valid JSON or TOML ({json_err}); TOML parse error: {toml_err}"
                    )
                })?;
                serde_json::to_value(toml_value)
                    .map_err(|err| anyhow!("Failed to convert TOML config to JSON: {err}"))?
            }
        };
        let config: Self =
            serde_json::from_value(value).map_err(|err| anyhow!("Config parse error: {err}"))?;
        config.validate()?;
        Ok(config)
    }

    fn validate(&self) -> Result<()> {
        if let Some(threshold) = self.fail_below {
            if !(0.0..=1.0).contains(&threshold) {
                anyhow::bail!("Config fail_below must be within 0.0..=1.0 (got {threshold})");
            }
        }
        Ok(())
    }

    pub async fn load(path: &Path) -> Result<Self> {
        let bytes = tokio::fs::read(path)
            .await
            .with_context(|| format!("Failed to read config {}", path.display()))?;
        Self::from_bytes(&bytes).with_context(|| format!("Invalid config {}", path.display()))
    }

    /// An explicit path must exist; otherwise `kb.toml` in `cwd` is used when present.
    pub async fn discover(explicit: Option<&Path>, cwd: &Path) -> Result<Self> {
        if let Some(path) = explicit {
            return Self::load(path).await;
        }
        let implicit = cwd.join(CONFIG_FILE_NAME);
        if tokio::fs::try_exists(&implicit).await.unwrap_or(false) {
            log::debug!("Using config {}", implicit.display());
            return Self::load(&implicit).await;
        }
        Ok(Self::default())
    }
}

/// Values taken from `KB_*` environment variables
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct EnvOverrides {
    pub index: Option<PathBuf>,
    pub top_k: Option<usize>,
}

impl EnvOverrides {
    pub fn from_process() -> Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Blank values count as unset.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let read = |key: &str| lookup(key).filter(|value| !value.trim().is_empty());
        let top_k = match read(ENV_TOP_K) {
            Some(raw) => Some(
                raw.trim()
                    .parse::<usize>()
                    .with_context(|| format!("{ENV_TOP_K} must be a non-negative integer"))?,
            ),
            None => None,
        };
        Ok(Self {
            index: read(ENV_INDEX).map(PathBuf::from),
            top_k,
        })
    }
}

/// Resolution order for every setting: flag, environment, config file, default.
#[derive(Debug, Clone, Default)]
pub struct Settings {
    env: EnvOverrides,
    file: FileConfig,
}

impl Settings {
    #[must_use]
    pub const fn new(env: EnvOverrides, file: FileConfig) -> Self {
        Self { env, file }
    }

    pub async fn load(explicit: Option<&Path>) -> Result<Self> {
        let cwd = std::env::current_dir().context("Failed to resolve working directory")?;
        let file = FileConfig::discover(explicit, &cwd).await?;
        let env = EnvOverrides::from_process()?;
        Ok(Self::new(env, file))
    }

    #[must_use]
    pub fn index(&self, flag: Option<PathBuf>) -> PathBuf {
        flag.or_else(|| self.env.index.clone())
            .or_else(|| self.file.index.clone())
            .unwrap_or_else(|| PathBuf::from(DEFAULT_INDEX))
    }

    #[must_use]
    pub fn top_k(&self, flag: Option<usize>) -> usize {
        flag.or(self.env.top_k)
            .or(self.file.top_k)
            .unwrap_or(DEFAULT_TOP_K)
    }

    #[must_use]
    pub fn benchmark(&self, flag: Option<PathBuf>) -> PathBuf {
        flag.or_else(|| self.file.benchmark.clone())
            .unwrap_or_else(|| PathBuf::from(DEFAULT_BENCHMARK))
    }

    #[must_use]
    pub fn fail_below(&self, flag: Option<f64>) -> f64 {
        flag.or(self.file.fail_below).unwrap_or(DEFAULT_FAIL_BELOW)
    }

    #[must_use]
    pub fn json_out(&self, flag: Option<PathBuf>) -> Option<PathBuf> {
        flag.or_else(|| self.file.json_out.clone())
    }

    #[must_use]
    pub fn md_out(&self, flag: Option<PathBuf>) -> Option<PathBuf> {
        flag.or_else(|| self.file.md_out.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use std::collections::HashMap;

    fn env(pairs: &[(&str, &str)]) -> Result<EnvOverrides> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| ((*k).to_string(), (*v).to_string()))
            .collect();
        EnvOverrides::from_lookup(|key| map.get(key).cloned())
    }

    #[test]
    fn parses_toml_config() {
        let config = FileConfig::from_bytes(
            br#"
index = "idx/records.jsonl"
top_k = 12
fail_below = 0.9
"#,
        )
        .unwrap();
        assert_eq!(config.index, Some(PathBuf::from("idx/records.jsonl")));
        assert_eq!(config.top_k, Some(12));
        assert_eq!(config.fail_below, Some(0.9));
        assert_eq!(config.benchmark, None);
    }

    #[test]
    fn parses_json_config() {
        let config =
            FileConfig::from_bytes(br#"{"benchmark": "b.json", "md_out": "out/eval.md"}"#).unwrap();
        assert_eq!(config.benchmark, Some(PathBuf::from("b.json")));
        assert_eq!(config.md_out, Some(PathBuf::from("out/eval.md")));
    }

    #[test]
    fn rejects_unknown_keys() {
        let err = FileConfig::from_bytes(b"content_weight = 2.0\n").unwrap_err();
        assert!(format!("{err:#}").contains("content_weight"), "{err:#}");

        let err = FileConfig::from_bytes(br#"{"weights": {}}"#).unwrap_err();
        assert!(format!("{err:#}").contains("weights"), "{err:#}");
    }

    #[test]
    fn rejects_out_of_range_threshold() {
        assert!(FileConfig::from_bytes(b"fail_below = 1.5\n").is_err());
    }

    #[test]
    fn environment_overrides_blank_and_invalid_values() {
        let parsed = env(&[(ENV_INDEX, "env.jsonl"), (ENV_TOP_K, " 3 ")]).unwrap();
        assert_eq!(parsed.index, Some(PathBuf::from("env.jsonl")));
        assert_eq!(parsed.top_k, Some(3));

        assert_eq!(env(&[(ENV_INDEX, "  ")]).unwrap(), EnvOverrides::default());
        assert!(env(&[(ENV_TOP_K, "many")]).is_err());
    }

    #[test]
    fn precedence_is_flag_then_env_then_file_then_default() {
        let file = FileConfig {
            index: Some(PathBuf::from("file.jsonl")),
            top_k: Some(4),
            ..FileConfig::default()
        };
        let env = EnvOverrides {
            index: Some(PathBuf::from("env.jsonl")),
            top_k: None,
        };
        let settings = Settings::new(env, file);

        assert_eq!(settings.index(Some(PathBuf::from("flag.jsonl"))), PathBuf::from("flag.jsonl"));
        assert_eq!(settings.index(None), PathBuf::from("env.jsonl"));
        assert_eq!(settings.top_k(Some(2)), 2);
        assert_eq!(settings.top_k(None), 4);

        let defaults = Settings::default();
        assert_eq!(defaults.index(None), PathBuf::from(DEFAULT_INDEX));
        assert_eq!(defaults.top_k(None), DEFAULT_TOP_K);
        assert_eq!(defaults.benchmark(None), PathBuf::from(DEFAULT_BENCHMARK));
        assert_eq!(defaults.fail_below(None), DEFAULT_FAIL_BELOW);
        assert_eq!(defaults.json_out(None), None);
    }

    #[tokio::test]
    async fn discover_reads_implicit_config_file() {
        let dir = tempfile::tempdir().unwrap();
        assert_eq!(
            FileConfig::discover(None, dir.path()).await.unwrap(),
            FileConfig::default()
        );

        std::fs::write(dir.path().join(CONFIG_FILE_NAME), "top_k = 5\n").unwrap();
        let config = FileConfig::discover(None, dir.path()).await.unwrap();
        assert_eq!(config.top_k, Some(5));

        let missing = dir.path().join("missing.toml");
        assert!(FileConfig::discover(Some(&missing), dir.path()).await.is_err());
    }
}
