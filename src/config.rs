use anyhow::{Context, Result, anyhow, bail};
use chrono::NaiveTime;
use dirs::home_dir;
use serde::{Deserialize, Serialize};
use std::fs;
#[cfg(unix)]
use std::os::unix::fs::PermissionsExt;
use std::path::{Path, PathBuf};
use std::str::FromStr;

const APP_DIR: &str = ".activity_tracker";
const CONFIG_FILE: &str = "config.json";
const DEFAULT_SUMMARY_TIME: &str = "23:30";
pub const DEFAULT_POLLING_SECONDS: u64 = 5;
pub const DEFAULT_IDLE_THRESHOLD_SECONDS: u64 = 60;
pub const DEFAULT_SAMPLER_TIMEOUT_MS: u64 = 1000;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SummaryProvider {
    Ollama,
    OpenAi,
    Template,
}

impl FromStr for SummaryProvider {
    type Err = anyhow::Error;

    fn from_str(value: &str) -> Result<Self> {
        match value.trim().to_lowercase().as_str() {
            "ollama" => Ok(Self::Ollama),
            "openai" => Ok(Self::OpenAi),
            "template" | "fallback" | "none" => Ok(Self::Template),
            other => bail!("Unknown summary provider: {other}. Use ollama|openai|template"),
        }
    }
}

impl SummaryProvider {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Ollama => "ollama",
            Self::OpenAi => "openai",
            Self::Template => "template",
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub polling_seconds: u64,
    pub idle_threshold_seconds: u64,
    pub sampler_timeout_ms: u64,
    pub db_path: PathBuf,
    pub summary_dir: PathBuf,
    pub summary_time: String,
    pub api_port: u16,
    pub summary_provider: SummaryProvider,
    pub ollama_base_url: String,
    pub ollama_model: String,
    pub ai_api_key: Option<String>,
    pub ai_api_base_url: String,
    pub ai_model: String,
    pub ai_timeout_seconds: u64,
}

impl Default for Config {
    fn default() -> Self {
        let root = default_root_dir();

        Self {
            polling_seconds: DEFAULT_POLLING_SECONDS,
            idle_threshold_seconds: DEFAULT_IDLE_THRESHOLD_SECONDS,
            sampler_timeout_ms: DEFAULT_SAMPLER_TIMEOUT_MS,
            db_path: root.join("activity.db"),
            summary_dir: root.clone(),
            summary_time: DEFAULT_SUMMARY_TIME.to_string(),
            api_port: 5001,
            summary_provider: SummaryProvider::Ollama,
            ollama_base_url: "http://localhost:11434".to_string(),
            ollama_model: "llama3.2".to_string(),
            ai_api_key: None,
            ai_api_base_url: "https://api.openai.com/v1".to_string(),
            ai_model: "gpt-4o-mini".to_string(),
            ai_timeout_seconds: 60,
        }
    }
}

impl Config {
    pub fn config_path() -> PathBuf {
        default_root_dir().join(CONFIG_FILE)
    }

    pub fn load() -> Result<Self> {
        Self::load_from(&Self::config_path())
    }

    pub fn load_from(config_path: &Path) -> Result<Self> {
        let content = fs::read_to_string(config_path)
            .with_context(|| format!("Failed to read config file: {}", config_path.display()))?;

        let config: Self = serde_json::from_str(&content)
            .with_context(|| format!("Failed to parse config file: {}", config_path.display()))?;

        Ok(config.sanitized())
    }

    pub fn save(&self) -> Result<()> {
        self.save_to(&Self::config_path())
    }

    pub fn save_to(&self, config_path: &Path) -> Result<()> {
        if let Some(parent) = config_path.parent() {
            fs::create_dir_all(parent).with_context(|| {
                format!("Failed to create config directory: {}", parent.display())
            })?;
        }

        let content = serde_json::to_string_pretty(self).context("Failed to serialize config")?;
        fs::write(config_path, content)
            .with_context(|| format!("Failed to write config file: {}", config_path.display()))?;
        set_mode_600(config_path)?;

        Ok(())
    }

    pub fn ensure_bootstrap_files(&self) -> Result<()> {
        if let Some(parent) = self.db_path.parent() {
            fs::create_dir_all(parent)
                .with_context(|| format!("Failed to create DB directory: {}", parent.display()))?;
        }

        fs::create_dir_all(&self.summary_dir).with_context(|| {
            format!(
                "Failed to create summary directory: {}",
                self.summary_dir.display()
            )
        })?;

        Ok(())
    }

    pub fn parse_summary_time(&self) -> Result<NaiveTime> {
        parse_hhmm(&self.summary_time)
    }

    /// Env var wins over the stored key.
    pub fn resolve_api_key(&self) -> Option<String> {
        ["ACTIVITY_TRACKER_AI_API_KEY", "OPENAI_API_KEY"]
            .iter()
            .find_map(|name| {
                std::env::var(name)
                    .ok()
                    .filter(|value| !value.trim().is_empty())
            })
            .or_else(|| {
                self.ai_api_key
                    .clone()
                    .filter(|value| !value.trim().is_empty())
            })
    }

    pub fn set_value(&mut self, key: &str, value: &str) -> Result<()> {
        let normalized = normalize_config_key(key);

        match normalized {
            "polling_seconds" => {
                self.polling_seconds = value
                    .parse::<u64>()
                    .map_err(|_| anyhow!("polling_seconds must be a number"))?
                    .max(1);
            }
            "idle_threshold_seconds" => {
                self.idle_threshold_seconds = value
                    .parse::<u64>()
                    .map_err(|_| anyhow!("idle_threshold_seconds must be a number"))?;
            }
            "sampler_timeout_ms" => {
                self.sampler_timeout_ms = value
                    .parse::<u64>()
                    .map_err(|_| anyhow!("sampler_timeout_ms must be a number"))?
                    .max(100);
            }
            "db_path" => {
                self.db_path = expand_home(value);
            }
            "summary_dir" => {
                self.summary_dir = expand_home(value);
            }
            "summary_time" => {
                parse_hhmm(value)?;
                self.summary_time = value.to_string();
            }
            "api_port" => {
                self.api_port = value
                    .parse::<u16>()
                    .map_err(|_| anyhow!("api_port must be a number"))?;
            }
            "summary_provider" => {
                self.summary_provider = value.parse()?;
            }
            "ollama_base_url" => {
                self.ollama_base_url = value.trim().trim_end_matches('/').to_string();
            }
            "ollama_model" => {
                self.ollama_model = value.trim().to_string();
            }
            "ai_api_key" => {
                self.ai_api_key = (!value.trim().is_empty()).then_some(value.to_string());
            }
            "ai_api_base_url" => {
                self.ai_api_base_url = value.trim().trim_end_matches('/').to_string();
            }
            "ai_model" => {
                self.ai_model = value.trim().to_string();
            }
            "ai_timeout_seconds" => {
                self.ai_timeout_seconds = value
                    .parse::<u64>()
                    .map_err(|_| anyhow!("ai_timeout_seconds must be a number"))?
                    .max(5);
            }
            _ => {
                bail!(
                    "Unsupported config key: {key}. Supported keys: polling_seconds|collector.interval_seconds, idle_threshold_seconds|collector.idle_threshold, sampler_timeout_ms|collector.sampler_timeout_ms, db_path|db.path, summary_dir|summary.dir, summary_time|summary.time, api_port|api.port, summary_provider|summary.provider, ollama_base_url|ollama.base_url, ollama_model|ollama.model, ai_api_key|ai.api_key, ai_api_base_url|ai.base_url, ai_model|ai.model, ai_timeout_seconds|ai.timeout_seconds"
                );
            }
        }

        Ok(())
    }

    pub fn get_value(&self, key: &str) -> Option<String> {
        match normalize_config_key(key) {
            "polling_seconds" => Some(self.polling_seconds.to_string()),
            "idle_threshold_seconds" => Some(self.idle_threshold_seconds.to_string()),
            "sampler_timeout_ms" => Some(self.sampler_timeout_ms.to_string()),
            "db_path" => Some(self.db_path.display().to_string()),
            "summary_dir" => Some(self.summary_dir.display().to_string()),
            "summary_time" => Some(self.summary_time.clone()),
            "api_port" => Some(self.api_port.to_string()),
            "summary_provider" => Some(self.summary_provider.as_str().to_string()),
            "ollama_base_url" => Some(self.ollama_base_url.clone()),
            "ollama_model" => Some(self.ollama_model.clone()),
            "ai_api_key" => Some(
                self.ai_api_key
                    .as_ref()
                    .map(|_| "***set***".to_string())
                    .unwrap_or_else(|| "not_set".to_string()),
            ),
            "ai_api_base_url" => Some(self.ai_api_base_url.clone()),
            "ai_model" => Some(self.ai_model.clone()),
            "ai_timeout_seconds" => Some(self.ai_timeout_seconds.to_string()),
            _ => None,
        }
    }

    fn sanitized(mut self) -> Self {
        self.polling_seconds = self.polling_seconds.max(1);
        self.sampler_timeout_ms = self.sampler_timeout_ms.max(100);
        self.ai_timeout_seconds = self.ai_timeout_seconds.max(5);
        self
    }
}

fn normalize_config_key(key: &str) -> &str {
    match key {
        "polling_seconds" | "collector.interval_seconds" => "polling_seconds",
        "idle_threshold_seconds" | "collector.idle_threshold" => "idle_threshold_seconds",
        "sampler_timeout_ms" | "collector.sampler_timeout_ms" => "sampler_timeout_ms",
        "db_path" | "db.path" => "db_path",
        "summary_dir" | "summary.dir" => "summary_dir",
        "summary_time" | "summary.time" => "summary_time",
        "api_port" | "api.port" => "api_port",
        "summary_provider" | "summary.provider" => "summary_provider",
        "ollama_base_url" | "ollama.base_url" => "ollama_base_url",
        "ollama_model" | "ollama.model" => "ollama_model",
        "ai_api_key" | "ai.api_key" => "ai_api_key",
        "ai_api_base_url" | "ai.base_url" => "ai_api_base_url",
        "ai_model" | "ai.model" => "ai_model",
        "ai_timeout_seconds" | "ai.timeout_seconds" => "ai_timeout_seconds",
        _ => key,
    }
}

pub fn parse_hhmm(value: &str) -> Result<NaiveTime> {
    NaiveTime::parse_from_str(value, "%H:%M")
        .with_context(|| format!("Invalid time format: {value}. Example: 23:30 (24-hour format)",))
}

pub fn expand_home(raw: &str) -> PathBuf {
    raw.strip_prefix("~/")
        .and_then(|stripped| home_dir().map(|home| home.join(stripped)))
        .unwrap_or_else(|| PathBuf::from(raw))
}

fn default_root_dir() -> PathBuf {
    home_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join(APP_DIR)
}

fn set_mode_600(path: &Path) -> Result<()> {
    #[cfg(unix)]
    {
        fs::set_permissions(path, fs::Permissions::from_mode(0o600))
            .with_context(|| format!("Failed to set file permissions: {}", path.display()))?;
    }

    Ok(())
}
