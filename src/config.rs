//! Configuration module

use crate::error::HookError;
use crate::types::BPS;
use serde::{Deserialize, Serialize};

/// Main configuration struct
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Divergence analysis and capture settings
    pub capture: CaptureConfig,

    /// Dynamic fee override settings
    pub fee: FeeConfig,

    /// Backrun detection and execution settings
    pub backrun: BackrunConfig,

    /// LP donation gating
    pub donation: DonationConfig,

    /// Logging settings
    pub logging: LoggingConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CaptureConfig {
    /// Minimum divergence before capture applies, in bps
    pub min_divergence_bps: u64,
    /// Share of the captured value kept by the hook, in bps
    pub hook_share_bps: u64,
    /// Cap on capture as a fraction of the swap amount, in bps
    pub max_capture_ratio_bps: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FeeConfig {
    /// Clamp on the recommended fee, in pips (10_000 = 1%)
    pub max_fee_pips: u32,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BackrunConfig {
    /// Minimum post-trade dislocation worth recording, in bps
    pub min_dislocation_bps: u64,
    /// Keeper's share of backrun profit, in bps
    pub caller_share_bps: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DonationConfig {
    /// Both currencies must reach this balance before donation
    pub min_amount: u128,
    /// Minimum seconds between donations per pool
    pub min_interval_secs: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    pub level: String,
    pub json_output: bool,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            capture: CaptureConfig {
                min_divergence_bps: 50, // 0.5%
                hook_share_bps: 8_000,
                max_capture_ratio_bps: 1_000, // 10% of swap amount
            },
            fee: FeeConfig {
                max_fee_pips: 10_000, // 1%
            },
            backrun: BackrunConfig {
                min_dislocation_bps: 30,
                caller_share_bps: 2_000, // 80/20 split
            },
            donation: DonationConfig {
                min_amount: 1_000_000_000_000_000_000, // 1 unit at 18 decimals
                min_interval_secs: 3_600,
            },
            logging: LoggingConfig {
                level: "info".to_string(),
                json_output: false,
            },
        }
    }
}

impl Config {
    /// Load config from the path in `CAPTURE_CONFIG`, falling back to defaults
    pub fn from_env() -> anyhow::Result<Self> {
        let config_path =
            std::env::var("CAPTURE_CONFIG").unwrap_or_else(|_| "config/config.json".to_string());

        let config = if std::path::Path::new(&config_path).exists() {
            let content = std::fs::read_to_string(&config_path)?;
            serde_json::from_str(&content)?
        } else {
            Config::default()
        };
        Ok(config)
    }

    /// Save config to file
    pub fn save(&self, path: &str) -> anyhow::Result<()> {
        let content = serde_json::to_string_pretty(self)?;
        std::fs::write(path, content)?;
        Ok(())
    }

    /// Reject out-of-range basis-point values synchronously.
    pub fn validate(&self) -> Result<(), HookError> {
        check_bps("hook_share_bps", self.capture.hook_share_bps, BPS)?;
        check_bps("max_capture_ratio_bps", self.capture.max_capture_ratio_bps, BPS)?;
        check_bps("caller_share_bps", self.backrun.caller_share_bps, BPS)?;
        // Fees above 100% are nonsense even in pips.
        if self.fee.max_fee_pips > 1_000_000 {
            return Err(HookError::BpsOutOfRange {
                name: "max_fee_pips",
                value: self.fee.max_fee_pips as u64,
                max: 1_000_000,
            });
        }
        Ok(())
    }
}

fn check_bps(name: &'static str, value: u64, max: u64) -> Result<(), HookError> {
    if value > max {
        return Err(HookError::BpsOutOfRange { name, value, max });
    }
    Ok(())
}
