use std::env;
use std::fs;
use std::path::Path;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

pub const DEFAULT_USER_AGENT: &str = "vitalbot/0.1";
pub const DEFAULT_SUMMARY: &str = "Updating section counts and WikiProject assessments";
pub const DEFAULT_SHUTOFF_PAGE: &str = "User:VitalBot/shutoff/{}";

#[derive(Debug, Clone, Deserialize, Serialize, Default, PartialEq, Eq)]
pub struct BotConfig {
    #[serde(default)]
    pub wiki: WikiSection,
    #[serde(default)]
    pub task: TaskSection,
}

#[derive(Debug, Clone, Deserialize, Serialize, Default, PartialEq, Eq)]
pub struct WikiSection {
    pub api_url: Option<String>,
    pub user_agent: Option<String>,
}

#[derive(Debug, Clone, Deserialize, Serialize, Default, PartialEq, Eq)]
pub struct TaskSection {
    pub summary: Option<String>,
    pub shutoff_page: Option<String>,
    pub task_number: Option<i32>,
    pub skip_assessment: Option<bool>,
}

impl BotConfig {
    /// Resolve the wiki API URL: env WIKI_API_URL > config > None.
    pub fn api_url(&self) -> Option<String> {
        if let Some(value) = env_value("WIKI_API_URL") {
            return Some(value);
        }
        self.wiki.api_url.clone()
    }

    /// Resolve user agent: env WIKI_USER_AGENT > config > default.
    pub fn user_agent(&self) -> String {
        env_value("WIKI_USER_AGENT")
            .or_else(|| self.wiki.user_agent.clone())
            .unwrap_or_else(|| DEFAULT_USER_AGENT.to_string())
    }

    /// Resolve the edit summary: env VITALBOT_SUMMARY > config > default.
    pub fn summary(&self) -> String {
        env_value("VITALBOT_SUMMARY")
            .or_else(|| self.task.summary.clone())
            .unwrap_or_else(|| DEFAULT_SUMMARY.to_string())
    }

    /// The shutoff page pattern; `{}` is replaced by the task number.
    pub fn shutoff_page(&self) -> String {
        self.task
            .shutoff_page
            .clone()
            .unwrap_or_else(|| DEFAULT_SHUTOFF_PAGE.to_string())
    }

    /// Task number for the shutoff switch. Negative numbers mark
    /// operator-space tasks that run without a switch; that is also the
    /// default, so an unconfigured bot does not silently refuse to edit.
    pub fn task_number(&self) -> i32 {
        self.task.task_number.unwrap_or(-1)
    }

    pub fn skip_assessment(&self) -> bool {
        if let Some(value) = env_value("VITALBOT_SKIP_ASSESSMENT") {
            return matches!(value.as_str(), "1" | "true" | "yes");
        }
        self.task.skip_assessment.unwrap_or(false)
    }
}

fn env_value(key: &str) -> Option<String> {
    let value = env::var(key).ok()?;
    let trimmed = value.trim().to_string();
    if trimmed.is_empty() { None } else { Some(trimmed) }
}

/// Load a BotConfig from a TOML file. Returns defaults if the file does not
/// exist.
pub fn load_config(config_path: &Path) -> Result<BotConfig> {
    if !config_path.exists() {
        return Ok(BotConfig::default());
    }
    let content = fs::read_to_string(config_path)
        .with_context(|| format!("failed to read {}", config_path.display()))?;
    let parsed: BotConfig = toml::from_str(&content)
        .with_context(|| format!("failed to parse {}", config_path.display()))?;
    Ok(parsed)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn default_config_uses_built_in_values() {
        let config = BotConfig::default();
        assert!(config.wiki.api_url.is_none());
        assert_eq!(config.summary(), DEFAULT_SUMMARY);
        assert_eq!(config.shutoff_page(), DEFAULT_SHUTOFF_PAGE);
        assert_eq!(config.task_number(), -1);
        assert!(!config.skip_assessment());
    }

    #[test]
    fn load_config_returns_default_for_missing_file() {
        let config = load_config(Path::new("/nonexistent/vitalbot.toml")).expect("load config");
        assert_eq!(config, BotConfig::default());
    }

    #[test]
    fn load_config_parses_both_sections() {
        let temp = tempdir().expect("tempdir");
        let config_path = temp.path().join("vitalbot.toml");
        fs::write(
            &config_path,
            r#"
[wiki]
api_url = "https://en.wikipedia.org/w/api.php"
user_agent = "vitalbot-test/1.0"

[task]
summary = "Test summary"
shutoff_page = "User:TestBot/shutoff/{}"
task_number = 3
skip_assessment = true
"#,
        )
        .expect("write config");

        let config = load_config(&config_path).expect("load config");
        assert_eq!(
            config.wiki.api_url.as_deref(),
            Some("https://en.wikipedia.org/w/api.php")
        );
        assert_eq!(config.user_agent(), "vitalbot-test/1.0");
        assert_eq!(config.summary(), "Test summary");
        assert_eq!(config.shutoff_page(), "User:TestBot/shutoff/{}");
        assert_eq!(config.task_number(), 3);
        assert!(config.skip_assessment());
    }

    #[test]
    fn load_config_tolerates_partial_toml() {
        let temp = tempdir().expect("tempdir");
        let config_path = temp.path().join("vitalbot.toml");
        fs::write(&config_path, "[task]\ntask_number = 7\n").expect("write config");

        let config = load_config(&config_path).expect("load config");
        assert_eq!(config.task_number(), 7);
        assert_eq!(config.summary(), DEFAULT_SUMMARY);
    }

    #[test]
    fn load_config_returns_error_for_invalid_toml() {
        let temp = tempdir().expect("tempdir");
        let config_path = temp.path().join("vitalbot.toml");
        fs::write(&config_path, "[task\nsummary = \"oops\"").expect("write config");
        let error = load_config(&config_path).expect_err("must fail");
        assert!(error.to_string().contains("failed to parse"));
    }
}
