//! Configuration for Turnstile
//!
//! CLI arguments and environment variable handling using clap.

use clap::Parser;
use std::net::SocketAddr;
use uuid::Uuid;

use crate::ledger::trend::TrendWeights;

/// Turnstile - wallet-gated meme card gateway
#[derive(Parser, Debug, Clone)]
#[command(name = "turnstile")]
#[command(about = "Wallet-gated meme card gateway")]
pub struct Args {
    /// Unique node identifier for this gateway instance
    #[arg(long, env = "NODE_ID", default_value_t = Uuid::new_v4())]
    pub node_id: Uuid,

    /// Address to listen on
    #[arg(long, env = "LISTEN", default_value = "0.0.0.0:8080")]
    pub listen: SocketAddr,

    /// Enable development mode (in-memory stores, stub image provider)
    #[arg(long, env = "DEV_MODE", action = clap::ArgAction::Set, default_value = "false")]
    pub dev_mode: bool,

    /// MongoDB connection URI
    #[arg(long, env = "MONGODB_URI", default_value = "mongodb://localhost:27017")]
    pub mongodb_uri: String,

    /// MongoDB database name
    #[arg(long, env = "MONGODB_DB", default_value = "turnstile")]
    pub mongodb_db: String,

    /// Challenge nonce TTL in seconds (clamped to [60, 3600] at issuance)
    #[arg(long, env = "NONCE_TTL_SECONDS", default_value = "300")]
    pub nonce_ttl_seconds: u64,

    /// Maximum hits per scope per minute window
    #[arg(long, env = "RATE_LIMIT_PER_MINUTE", default_value = "10")]
    pub rate_limit_per_minute: i64,

    /// Daily generation quota lock TTL in seconds (outlives one UTC day)
    #[arg(long, env = "DAILY_QUOTA_TTL_SECONDS", default_value = "90000")]
    pub daily_quota_ttl_seconds: u64,

    /// Image generation provider endpoint (required in production mode)
    #[arg(long, env = "IMAGE_PROVIDER_URL")]
    pub image_provider_url: Option<String>,

    /// Outbound request timeout in milliseconds
    #[arg(long, env = "REQUEST_TIMEOUT_MS", default_value = "30000")]
    pub request_timeout_ms: u64,

    /// Hour offset added to card age before trend decay
    #[arg(long, env = "TREND_AGE_OFFSET_HOURS", default_value = "2.0")]
    pub trend_age_offset_hours: f64,

    /// Exponent applied to card age in the trend denominator
    #[arg(long, env = "TREND_DECAY_EXPONENT", default_value = "1.5")]
    pub trend_decay_exponent: f64,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long, env = "LOG_LEVEL", default_value = "info")]
    pub log_level: String,
}

impl Args {
    /// Trend ranking weights from the configured decay constants
    pub fn trend_weights(&self) -> TrendWeights {
        TrendWeights {
            age_offset_hours: self.trend_age_offset_hours,
            decay_exponent: self.trend_decay_exponent,
        }
    }

    /// Validate configuration
    pub fn validate(&self) -> Result<(), String> {
        if !self.dev_mode && self.image_provider_url.is_none() {
            return Err("IMAGE_PROVIDER_URL is required in production mode".to_string());
        }

        if self.rate_limit_per_minute < 1 {
            return Err("RATE_LIMIT_PER_MINUTE must be at least 1".to_string());
        }

        // The quota lock must outlive the UTC day it covers.
        if self.daily_quota_ttl_seconds < 24 * 60 * 60 {
            return Err("DAILY_QUOTA_TTL_SECONDS must cover at least one day".to_string());
        }

        if self.trend_age_offset_hours <= 0.0 || self.trend_decay_exponent <= 0.0 {
            return Err("trend decay constants must be positive".to_string());
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn dev_args() -> Args {
        Args::parse_from(["turnstile", "--dev-mode", "true"])
    }

    #[test]
    fn dev_mode_needs_no_provider() {
        assert!(dev_args().validate().is_ok());
    }

    #[test]
    fn production_requires_provider_url() {
        let args = Args::parse_from(["turnstile"]);
        assert!(args.validate().is_err());

        let args = Args::parse_from([
            "turnstile",
            "--image-provider-url",
            "https://images.example.com/v1/generate",
        ]);
        assert!(args.validate().is_ok());
    }

    #[test]
    fn short_quota_ttl_is_rejected() {
        let args = Args::parse_from([
            "turnstile",
            "--dev-mode",
            "true",
            "--daily-quota-ttl-seconds",
            "3600",
        ]);
        assert!(args.validate().is_err());
    }

    #[test]
    fn trend_weights_come_from_config() {
        let args = Args::parse_from([
            "turnstile",
            "--dev-mode",
            "true",
            "--trend-age-offset-hours",
            "4.0",
        ]);
        let weights = args.trend_weights();
        assert_eq!(weights.age_offset_hours, 4.0);
        assert_eq!(weights.decay_exponent, 1.5);
    }
}
