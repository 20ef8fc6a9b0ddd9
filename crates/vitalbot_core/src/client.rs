//! Blocking MediaWiki API client: the bot's only I/O collaborator.

use std::thread::sleep;
use std::time::{Duration, Instant, SystemTime, UNIX_EPOCH};

use anyhow::{Context, Result, bail};
use reqwest::StatusCode;
use reqwest::blocking::Client;
use serde_json::Value;

use crate::assessment::{RedirectResolver, TalkPageProvider};
use crate::config::BotConfig;

/// Read/write page surface the transform runner drives. Kept as a trait so
/// the runner tests against an in-memory wiki.
pub trait ListPageApi {
    fn get_page_text(&mut self, title: &str) -> Result<Option<String>>;
    fn is_redirect(&mut self, title: &str) -> Result<bool>;
    fn edit_page(&mut self, title: &str, text: &str, summary: &str) -> Result<()>;
    fn request_count(&self) -> usize;
}

#[derive(Debug, Clone)]
pub struct MediaWikiClientConfig {
    pub api_url: String,
    pub user_agent: String,
    pub timeout_ms: u64,
    pub rate_limit_read_ms: u64,
    pub rate_limit_write_ms: u64,
    pub max_retries: usize,
    pub retry_delay_ms: u64,
}

impl MediaWikiClientConfig {
    pub fn from_config(config: &BotConfig) -> Self {
        Self {
            api_url: config.api_url().unwrap_or_default(),
            user_agent: config.user_agent(),
            timeout_ms: env_value_u64("WIKI_HTTP_TIMEOUT_MS", 30_000),
            rate_limit_read_ms: env_value_u64("WIKI_RATE_LIMIT_READ", 300),
            rate_limit_write_ms: env_value_u64("WIKI_RATE_LIMIT_WRITE", 1_000),
            max_retries: env_value_usize("WIKI_HTTP_RETRIES", 2),
            retry_delay_ms: env_value_u64("WIKI_HTTP_RETRY_DELAY_MS", 500),
        }
    }
}

#[derive(Debug)]
pub struct MediaWikiClient {
    client: Client,
    config: MediaWikiClientConfig,
    last_request_at: Option<Instant>,
    request_count: usize,
    csrf_token: Option<String>,
}

impl MediaWikiClient {
    pub fn new(config: MediaWikiClientConfig) -> Result<Self> {
        if config.api_url.trim().is_empty() {
            bail!("wiki API URL is not configured (set WIKI_API_URL or [wiki] api_url)");
        }
        let client = Client::builder()
            .timeout(Duration::from_millis(config.timeout_ms))
            .cookie_store(true)
            .build()
            .context("failed to build MediaWiki HTTP client")?;
        Ok(Self {
            client,
            config,
            last_request_at: None,
            request_count: 0,
            csrf_token: None,
        })
    }

    pub fn from_bot_config(config: &BotConfig) -> Result<Self> {
        Self::new(MediaWikiClientConfig::from_config(config))
    }

    /// One API round-trip with rate limiting, retry on transient failures,
    /// and MediaWiki error surfacing. Writes go through POST form encoding.
    fn request_json(&mut self, params: &[(&str, String)], write: bool) -> Result<Value> {
        let mut pairs = Vec::with_capacity(params.len() + 2);
        pairs.push(("format".to_string(), "json".to_string()));
        pairs.push(("formatversion".to_string(), "2".to_string()));
        for (key, value) in params {
            if !value.is_empty() {
                pairs.push(((*key).to_string(), value.clone()));
            }
        }

        for attempt in 0..=self.config.max_retries {
            self.apply_rate_limit(write);
            let request = if write {
                self.client.post(&self.config.api_url).form(&pairs)
            } else {
                self.client.get(&self.config.api_url).query(&pairs)
            };
            let response = request
                .header("User-Agent", self.config.user_agent.clone())
                .send();

            match response {
                Ok(response) => {
                    let status = response.status();
                    if !status.is_success() {
                        if attempt < self.config.max_retries && is_retryable_status(status) {
                            self.wait_before_retry(attempt);
                            continue;
                        }
                        bail!("MediaWiki API request failed with HTTP {status}");
                    }
                    let payload: Value = response
                        .json()
                        .context("failed to decode MediaWiki API JSON response")?;
                    if let Some(error) = payload.get("error") {
                        let code = error
                            .get("code")
                            .and_then(Value::as_str)
                            .unwrap_or("unknown_error");
                        let info = error
                            .get("info")
                            .and_then(Value::as_str)
                            .unwrap_or("unknown info");
                        bail!("MediaWiki API error [{code}]: {info}");
                    }
                    return Ok(payload);
                }
                Err(error) => {
                    if attempt < self.config.max_retries
                        && (error.is_timeout() || error.is_connect() || error.is_request())
                    {
                        self.wait_before_retry(attempt);
                        continue;
                    }
                    return Err(error).context("failed to call MediaWiki API");
                }
            }
        }
        bail!("MediaWiki API request exhausted retry budget")
    }

    fn apply_rate_limit(&mut self, write: bool) {
        let delay = Duration::from_millis(if write {
            self.config.rate_limit_write_ms
        } else {
            self.config.rate_limit_read_ms
        });
        if let Some(last) = self.last_request_at {
            let elapsed = last.elapsed();
            if elapsed < delay {
                sleep(delay - elapsed);
            }
        }
        self.last_request_at = Some(Instant::now());
        self.request_count += 1;
    }

    fn wait_before_retry(&self, attempt: usize) {
        let exponent = u32::try_from(attempt).unwrap_or(16);
        let base = self
            .config
            .retry_delay_ms
            .saturating_mul(2u64.saturating_pow(exponent));
        let jitter = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|duration| u64::from(duration.subsec_millis() % 100))
            .unwrap_or(0);
        sleep(Duration::from_millis(base.saturating_add(jitter)));
    }

    pub fn login(&mut self, username: &str, password: &str) -> Result<()> {
        let token_response = self.request_json(
            &[
                ("action", "query".to_string()),
                ("meta", "tokens".to_string()),
                ("type", "login".to_string()),
            ],
            false,
        )?;
        let login_token = token_response
            .pointer("/query/tokens/logintoken")
            .and_then(Value::as_str)
            .ok_or_else(|| anyhow::anyhow!("failed to get MediaWiki login token"))?
            .to_string();

        let response = self.request_json(
            &[
                ("action", "login".to_string()),
                ("lgname", username.to_string()),
                ("lgpassword", password.to_string()),
                ("lgtoken", login_token),
            ],
            true,
        )?;
        let result = response
            .pointer("/login/result")
            .and_then(Value::as_str)
            .unwrap_or("Unknown");
        if result != "Success" {
            bail!("MediaWiki login failed: {result}");
        }
        self.csrf_token = None;
        Ok(())
    }

    fn ensure_csrf_token(&mut self) -> Result<String> {
        if let Some(token) = &self.csrf_token {
            return Ok(token.clone());
        }
        let response = self.request_json(
            &[
                ("action", "query".to_string()),
                ("meta", "tokens".to_string()),
            ],
            false,
        )?;
        let token = response
            .pointer("/query/tokens/csrftoken")
            .and_then(Value::as_str)
            .ok_or_else(|| anyhow::anyhow!("failed to get MediaWiki csrf token"))?
            .to_string();
        self.csrf_token = Some(token.clone());
        Ok(token)
    }

    fn first_page<'a>(payload: &'a Value) -> Result<&'a Value> {
        payload
            .pointer("/query/pages/0")
            .ok_or_else(|| anyhow::anyhow!("invalid MediaWiki query response shape"))
    }
}

impl ListPageApi for MediaWikiClient {
    fn get_page_text(&mut self, title: &str) -> Result<Option<String>> {
        let payload = self.request_json(
            &[
                ("action", "query".to_string()),
                ("titles", title.to_string()),
                ("prop", "revisions".to_string()),
                ("rvprop", "content".to_string()),
                ("rvslots", "main".to_string()),
            ],
            false,
        )?;
        let page = Self::first_page(&payload)?;
        if page.get("missing").is_some() || page.get("invalid").is_some() {
            return Ok(None);
        }
        Ok(page
            .pointer("/revisions/0/slots/main/content")
            .and_then(Value::as_str)
            .map(str::to_string))
    }

    fn is_redirect(&mut self, title: &str) -> Result<bool> {
        let payload = self.request_json(
            &[
                ("action", "query".to_string()),
                ("titles", title.to_string()),
                ("prop", "info".to_string()),
            ],
            false,
        )?;
        let page = Self::first_page(&payload)?;
        Ok(page.get("redirect").is_some())
    }

    fn edit_page(&mut self, title: &str, text: &str, summary: &str) -> Result<()> {
        let token = self.ensure_csrf_token()?;
        let response = self.request_json(
            &[
                ("action", "edit".to_string()),
                ("title", title.to_string()),
                ("text", text.to_string()),
                ("summary", summary.to_string()),
                ("bot", "1".to_string()),
                ("token", token),
            ],
            true,
        )?;
        let result = response
            .pointer("/edit/result")
            .and_then(Value::as_str)
            .unwrap_or("Unknown");
        if result != "Success" {
            bail!("MediaWiki edit of {title} failed: {result}");
        }
        Ok(())
    }

    fn request_count(&self) -> usize {
        self.request_count
    }
}

impl TalkPageProvider for MediaWikiClient {
    fn get_text(&mut self, title: &str) -> Result<Option<String>> {
        self.get_page_text(title)
    }
}

impl RedirectResolver for MediaWikiClient {
    fn target_of(&mut self, title: &str) -> Result<Option<String>> {
        let payload = self.request_json(
            &[
                ("action", "query".to_string()),
                ("titles", title.to_string()),
                ("redirects", "1".to_string()),
            ],
            false,
        )?;
        Ok(payload
            .pointer("/query/redirects/0/to")
            .and_then(Value::as_str)
            .map(str::to_string))
    }
}

fn is_retryable_status(status: StatusCode) -> bool {
    status == StatusCode::TOO_MANY_REQUESTS || status.is_server_error()
}

fn env_value_u64(key: &str, default: u64) -> u64 {
    std::env::var(key)
        .ok()
        .and_then(|value| value.trim().parse().ok())
        .unwrap_or(default)
}

fn env_value_usize(key: &str, default: usize) -> usize {
    std::env::var(key)
        .ok()
        .and_then(|value| value.trim().parse().ok())
        .unwrap_or(default)
}
