use serde::Deserialize;

use crate::error::ReconError;

// ---------------------------------------------------------------------------
// Top-level config
// ---------------------------------------------------------------------------

/// Engine configuration, parsed from TOML.
#[derive(Debug, Clone, Deserialize)]
pub struct EngineConfig {
    #[serde(default = "default_name")]
    pub name: String,
    #[serde(default)]
    pub tolerance: ToleranceConfig,
    #[serde(default)]
    pub thresholds: ThresholdConfig,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            name: default_name(),
            tolerance: ToleranceConfig::default(),
            thresholds: ThresholdConfig::default(),
        }
    }
}

fn default_name() -> String {
    "reconciliation".into()
}

// ---------------------------------------------------------------------------
// Tolerance + thresholds
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Deserialize)]
pub struct ToleranceConfig {
    /// Rounding slack on settlement splits and MRP checks, in paise.
    #[serde(default = "default_amount_paise")]
    pub amount_paise: i64,
}

impl Default for ToleranceConfig {
    fn default() -> Self {
        Self {
            amount_paise: default_amount_paise(),
        }
    }
}

fn default_amount_paise() -> i64 {
    100
}

/// Threshold rules that drive report recommendations.
#[derive(Debug, Clone, Deserialize)]
pub struct ThresholdConfig {
    /// Settlement rate below this emits the pending-settlement reminder.
    #[serde(default = "default_min_settlement_rate")]
    pub min_settlement_rate_pct: f64,
    /// Return rate above this emits the return-pattern reminder.
    #[serde(default = "default_max_return_rate")]
    pub max_return_rate_pct: f64,
}

impl Default for ThresholdConfig {
    fn default() -> Self {
        Self {
            min_settlement_rate_pct: default_min_settlement_rate(),
            max_return_rate_pct: default_max_return_rate(),
        }
    }
}

fn default_min_settlement_rate() -> f64 {
    80.0
}

fn default_max_return_rate() -> f64 {
    5.0
}

// ---------------------------------------------------------------------------
// Parse + validate
// ---------------------------------------------------------------------------

impl EngineConfig {
    pub fn from_toml(input: &str) -> Result<Self, ReconError> {
        let config: EngineConfig =
            toml::from_str(input).map_err(|e| ReconError::ConfigParse(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ReconError> {
        if self.tolerance.amount_paise < 0 {
            return Err(ReconError::ConfigValidation(format!(
                "tolerance.amount_paise must be non-negative, got {}",
                self.tolerance.amount_paise
            )));
        }
        for (field, value) in [
            (
                "thresholds.min_settlement_rate_pct",
                self.thresholds.min_settlement_rate_pct,
            ),
            (
                "thresholds.max_return_rate_pct",
                self.thresholds.max_return_rate_pct,
            ),
        ] {
            if !(0.0..=100.0).contains(&value) {
                return Err(ReconError::ConfigValidation(format!(
                    "{field} must be within 0..=100, got {value}"
                )));
            }
        }
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
