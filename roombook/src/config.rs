//! Client configuration management.
//!
//! Configuration is loaded from a YAML file with environment variable overrides. The file path
//! defaults to `roombook.yaml` but can be specified via the `-f` flag or the `ROOMBOOK_CONFIG`
//! environment variable. A missing file is not an error; every field has a default.
//!
//! ## Loading Priority
//!
//! 1. **YAML config file** - Base configuration
//! 2. **Environment variables** - Variables prefixed with `ROOMBOOK_` override YAML values
//!
//! Nested values use double underscores, e.g. `ROOMBOOK_API__URL=https://rooms.example.com/api/`
//! or `ROOMBOOK_POLICY__MAX_DURATION=4h`.
//!
//! ## Example
//!
//! ```yaml
//! api:
//!   url: https://rooms.example.com/api/
//!   timeout: 10s
//!   email: ada@example.com
//! cache:
//!   ttl: 60s
//! policy:
//!   min_duration: 15m
//!   max_duration: 8h
//!   allow_past_self_update: false
//! drafts:
//!   title_min_len: 3
//!   utc_offset_minutes: 540
//! draft_dir: ~/.local/share/roombook/drafts
//! offline:
//!   rooms:
//!     - name: R101
//!       location: 1F
//!       capacity: 8
//!       equipment: [projector]
//! ```

use clap::Parser;
use figment::{
    Figment,
    providers::{Env, Format, Yaml},
};
use serde::{Deserialize, Serialize};
use std::{path::PathBuf, time::Duration};
use url::Url;

use crate::cli::Command;
use crate::draft::DraftRules;
use crate::models::rooms::RoomCreate;
use crate::policy::ConflictPolicy;

/// Longest time a cached answer may be served before it is re-fetched.
pub const MAX_CACHE_TTL: Duration = Duration::from_secs(5 * 60);

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
pub struct Args {
    /// Path to configuration file
    #[arg(short = 'f', long, env = "ROOMBOOK_CONFIG", default_value = "roombook.yaml")]
    pub config: String,

    /// Validate configuration and exit.
    #[arg(long)]
    pub validate: bool,

    /// Run against a local in-memory booking service instead of the configured API.
    #[arg(long)]
    pub offline: bool,

    #[command(subcommand)]
    pub command: Option<Command>,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default, deny_unknown_fields)]
pub struct Config {
    /// Remote booking service
    pub api: ApiConfig,
    /// Short-lived cache of rooms, users, bookings and availability answers
    pub cache: CacheConfig,
    /// Booking admission rules (used by the in-memory service)
    pub policy: ConflictPolicy,
    /// Field bounds for booking drafts
    pub drafts: DraftRules,
    /// Directory for recoverable drafts. Drafts are kept in memory when unset.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub draft_dir: Option<PathBuf>,
    /// Seed data for `--offline` runs
    pub offline: OfflineConfig,
}

/// Rooms available to the in-memory service used by `--offline`. The signed-in user is created
/// from `api.email` and `api.password` as an admin.
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(default, deny_unknown_fields)]
pub struct OfflineConfig {
    pub rooms: Vec<RoomCreate>,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default, deny_unknown_fields)]
pub struct ApiConfig {
    /// Base URL of the booking REST API
    pub url: Url,
    /// Per-request timeout
    #[serde(with = "humantime_serde")]
    pub timeout: Duration,
    /// Login email
    #[serde(skip_serializing_if = "Option::is_none")]
    pub email: Option<String>,
    /// Login password, usually provided through `ROOMBOOK_API__PASSWORD`
    #[serde(skip_serializing)]
    pub password: Option<String>,
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            url: Url::parse("http://localhost:8080/api/").unwrap(),
            timeout: Duration::from_secs(30),
            email: None,
            password: None,
        }
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default, deny_unknown_fields)]
pub struct CacheConfig {
    /// Time-to-live of cached entries (at most 5 minutes)
    #[serde(with = "humantime_serde")]
    pub ttl: Duration,
    /// Maximum number of entries per resource kind
    pub max_capacity: u64,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            ttl: Duration::from_secs(60),
            max_capacity: 1000,
        }
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            api: ApiConfig::default(),
            cache: CacheConfig::default(),
            policy: ConflictPolicy::default(),
            drafts: DraftRules::default(),
            draft_dir: None,
            offline: OfflineConfig::default(),
        }
    }
}

impl Config {
    #[allow(clippy::result_large_err)]
    pub fn load(args: &Args) -> Result<Self, figment::Error> {
        let config: Self = Self::figment(args).extract()?;
        config.validate().map_err(|e| figment::Error::from(e.to_string()))?;
        Ok(config)
    }

    pub fn figment(args: &Args) -> Figment {
        Figment::new()
            .merge(Yaml::file(&args.config))
            .merge(Env::prefixed("ROOMBOOK_").split("__").ignore(&["CONFIG", "NEW_USER_PASSWORD"]))
    }

    /// Validate the configuration for consistency
    pub fn validate(&self) -> anyhow::Result<()> {
        if self.api.timeout.is_zero() {
            anyhow::bail!("Config validation: api.timeout must be greater than zero");
        }
        if self.cache.ttl > MAX_CACHE_TTL {
            anyhow::bail!(
                "Config validation: cache.ttl ({}) must not exceed {}",
                humantime::format_duration(self.cache.ttl),
                humantime::format_duration(MAX_CACHE_TTL)
            );
        }
        if self.policy.min_duration.is_zero() || self.policy.min_duration > self.policy.max_duration {
            anyhow::bail!(
                "Config validation: policy.min_duration ({}) must be positive and not greater than policy.max_duration ({})",
                humantime::format_duration(self.policy.min_duration),
                humantime::format_duration(self.policy.max_duration)
            );
        }
        if self.drafts.title_min_len == 0 || self.drafts.title_min_len > self.drafts.title_max_len {
            anyhow::bail!(
                "Config validation: drafts.title_min_len ({}) must be between 1 and drafts.title_max_len ({})",
                self.drafts.title_min_len,
                self.drafts.title_max_len
            );
        }
        if self.drafts.offset().is_none() {
            anyhow::bail!(
                "Config validation: drafts.utc_offset_minutes ({}) is not a valid UTC offset",
                self.drafts.utc_offset_minutes
            );
        }
        Ok(())
    }
}
