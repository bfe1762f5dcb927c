use anyhow::{bail, Context, Result};
use chrono::FixedOffset;
use eternity_core::directory::default_job_roles;
use eternity_core::poll::DEFAULT_MAX_DURATION_HOURS;
use serde::Deserialize;
use std::time::Duration;

const DISCORD_TOKEN_ENV: &str = "ETERNITY_DISCORD_TOKEN";
const API_TOKEN_ENV: &str = "ETERNITY_API_TOKEN";

#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub database: DatabaseConfig,
    pub discord: DiscordConfig,
    #[serde(default)]
    pub directory: DirectoryConfig,
    pub polls: PollsConfig,
    #[serde(default)]
    pub roster: Option<RosterConfig>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ServerConfig {
    #[serde(default = "default_bind_address")]
    pub bind_address: String,
    /// Bearer token the gateway relay must present.
    #[serde(default)]
    pub api_token: String,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind_address: default_bind_address(),
            api_token: String::new(),
        }
    }
}

fn default_bind_address() -> String {
    "127.0.0.1:8090".to_string()
}

#[derive(Debug, Clone, Deserialize)]
pub struct DatabaseConfig {
    #[serde(default = "default_database_url")]
    pub url: String,
    #[serde(default = "default_max_connections")]
    pub max_connections: u32,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            url: default_database_url(),
            max_connections: default_max_connections(),
        }
    }
}

fn default_database_url() -> String {
    "sqlite://./data/eternity.db".to_string()
}

fn default_max_connections() -> u32 {
    5
}

#[derive(Debug, Clone, Deserialize)]
pub struct DiscordConfig {
    #[serde(default)]
    pub token: String,
    pub guild_id: i64,
    #[serde(default = "default_api_base")]
    pub api_base: String,
    #[serde(default = "default_request_timeout_secs")]
    pub request_timeout_secs: u64,
}

fn default_api_base() -> String {
    eternity_discord::DEFAULT_API_BASE.to_string()
}

fn default_request_timeout_secs() -> u64 {
    15
}

#[derive(Debug, Clone, Deserialize)]
pub struct DirectoryConfig {
    #[serde(default = "default_role_refresh_secs")]
    pub role_refresh_secs: u64,
    #[serde(default = "default_member_refresh_secs")]
    pub member_refresh_secs: u64,
    /// Job roles in display order; a member's first match is their job.
    #[serde(default = "default_job_roles")]
    pub job_roles: Vec<String>,
}

impl Default for DirectoryConfig {
    fn default() -> Self {
        Self {
            role_refresh_secs: default_role_refresh_secs(),
            member_refresh_secs: default_member_refresh_secs(),
            job_roles: default_job_roles(),
        }
    }
}

fn default_role_refresh_secs() -> u64 {
    6 * 60 * 60
}

fn default_member_refresh_secs() -> u64 {
    10 * 60
}

#[derive(Debug, Clone, Deserialize)]
pub struct PollsConfig {
    pub channel_id: i64,
    #[serde(default = "default_sweep_secs")]
    pub sweep_secs: u64,
    #[serde(default = "default_max_duration_hours")]
    pub max_duration_hours: i64,
    /// Offset deadlines are displayed in, in hours east of UTC.
    #[serde(default = "default_utc_offset_hours")]
    pub utc_offset_hours: i32,
}

fn default_sweep_secs() -> u64 {
    15
}

fn default_max_duration_hours() -> i64 {
    DEFAULT_MAX_DURATION_HOURS
}

fn default_utc_offset_hours() -> i32 {
    9
}

#[derive(Debug, Clone, Deserialize)]
pub struct RosterConfig {
    pub channel_id: i64,
    pub message_id: i64,
    #[serde(default = "default_roster_refresh_secs")]
    pub refresh_secs: u64,
}

fn default_roster_refresh_secs() -> u64 {
    30 * 60
}

impl Config {
    pub fn load(path: &str) -> Result<Self> {
        let raw = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read config file '{path}'"))?;
        let mut config = Self::parse(&raw)?;
        config.apply_env_overrides(|key| std::env::var(key).ok());
        config.validate()?;
        Ok(config)
    }

    pub fn parse(raw: &str) -> Result<Self> {
        toml::from_str(raw).context("invalid config file")
    }

    /// Secrets may come from the environment instead of the file.
    pub fn apply_env_overrides(&mut self, lookup: impl Fn(&str) -> Option<String>) {
        if let Some(token) = lookup(DISCORD_TOKEN_ENV).filter(|t| !t.is_empty()) {
            self.discord.token = token;
        }
        if let Some(token) = lookup(API_TOKEN_ENV).filter(|t| !t.is_empty()) {
            self.server.api_token = token;
        }
    }

    pub fn validate(&self) -> Result<()> {
        if self.discord.token.trim().is_empty() {
            bail!("discord.token is empty; set it in the config or {DISCORD_TOKEN_ENV}");
        }
        if self.server.api_token.trim().is_empty() {
            bail!("server.api_token is empty; set it in the config or {API_TOKEN_ENV}");
        }
        if self.discord.guild_id <= 0 {
            bail!("discord.guild_id must be a guild snowflake");
        }
        if self.polls.channel_id <= 0 {
            bail!("polls.channel_id must be a channel snowflake");
        }
        if self.directory.job_roles.is_empty() {
            bail!("directory.job_roles must name at least one role");
        }
        if self.polls.max_duration_hours < 1 {
            bail!("polls.max_duration_hours must be at least 1");
        }
        if self.display_offset().is_none() {
            bail!("polls.utc_offset_hours must be between -23 and 23");
        }
        let periods = [
            ("directory.role_refresh_secs", self.directory.role_refresh_secs),
            ("directory.member_refresh_secs", self.directory.member_refresh_secs),
            ("polls.sweep_secs", self.polls.sweep_secs),
            ("discord.request_timeout_secs", self.discord.request_timeout_secs),
        ];
        for (name, secs) in periods {
            if secs == 0 {
                bail!("{name} must be greater than zero");
            }
        }
        if let Some(roster) = &self.roster {
            if roster.refresh_secs == 0 {
                bail!("roster.refresh_secs must be greater than zero");
            }
        }
        Ok(())
    }

    pub fn display_offset(&self) -> Option<FixedOffset> {
        FixedOffset::east_opt(self.polls.utc_offset_hours.checked_mul(3600)?)
    }

    pub fn role_refresh_period(&self) -> Duration {
        Duration::from_secs(self.directory.role_refresh_secs)
    }

    pub fn member_refresh_period(&self) -> Duration {
        Duration::from_secs(self.directory.member_refresh_secs)
    }

    pub fn sweep_period(&self) -> Duration {
        Duration::from_secs(self.polls.sweep_secs)
    }
}
