//! Runtime configuration
//!
//! Everything is read from the process environment (optionally seeded from a
//! `.env` file by the binaries). Tax coefficients encode one jurisdiction's
//! rules and are overridable here rather than baked into the formulas.

use crate::error::DashboardError;
use crate::Result;
use serde::{Deserialize, Serialize};
use std::env;
use std::str::FromStr;
use std::time::Duration;

pub const DEFAULT_PORT: u16 = 8080;
pub const DEFAULT_MODEL: &str = "gpt-4o-mini";
pub const DEFAULT_BASE_URL: &str = "https://api.openai.com/v1";
pub const DEFAULT_LLM_TIMEOUT_SECS: u64 = 120;
pub const DEFAULT_STREAM_IDLE_TIMEOUT_SECS: u64 = 60;
pub const DEFAULT_SESSION_IDLE_TTL_SECS: u64 = 3_600;

/// Coefficients of the furnished-rental tax comparison
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TaxParameters {
    /// Combined income-tax bracket plus social contributions
    pub marginal_rate: f64,
    /// Flat expense allowance of the micro regime (share of rent)
    pub micro_allowance: f64,
    /// Share of the purchase price attributable to the building (land excluded)
    pub building_share: f64,
    /// Yearly depreciation rate applied to the building share
    pub building_depreciation_rate: f64,
    /// Yearly depreciation rate applied to renovation work
    pub renovation_depreciation_rate: f64,
}

impl Default for TaxParameters {
    fn default() -> Self {
        Self {
            marginal_rate: 0.472,
            micro_allowance: 0.5,
            building_share: 0.85,
            building_depreciation_rate: 0.033,
            renovation_depreciation_rate: 0.10,
        }
    }
}

impl TaxParameters {
    /// Defaults overridden by any `TAX_*` variable present in the environment
    pub fn from_env() -> Result<Self> {
        let defaults = Self::default();

        Ok(Self {
            marginal_rate: env_or("TAX_MARGINAL_RATE", defaults.marginal_rate)?,
            micro_allowance: env_or("TAX_MICRO_ALLOWANCE", defaults.micro_allowance)?,
            building_share: env_or("TAX_BUILDING_SHARE", defaults.building_share)?,
            building_depreciation_rate: env_or(
                "TAX_BUILDING_DEPRECIATION_RATE",
                defaults.building_depreciation_rate,
            )?,
            renovation_depreciation_rate: env_or(
                "TAX_RENOVATION_DEPRECIATION_RATE",
                defaults.renovation_depreciation_rate,
            )?,
        })
    }

    pub fn validate(&self) -> Result<()> {
        let fields = [
            ("marginal_rate", self.marginal_rate),
            ("micro_allowance", self.micro_allowance),
            ("building_share", self.building_share),
            ("building_depreciation_rate", self.building_depreciation_rate),
            ("renovation_depreciation_rate", self.renovation_depreciation_rate),
        ];

        for (name, value) in fields {
            if !value.is_finite() || value < 0.0 {
                return Err(DashboardError::invalid_input(format!(
                    "tax parameter {} must be a non-negative number (got {})",
                    name, value
                )));
            }
        }

        Ok(())
    }
}

/// Settings for the OpenAI-compatible language-model endpoint
#[derive(Debug, Clone)]
pub struct LlmConfig {
    pub api_key: String,
    pub base_url: String,
    pub model: String,
    pub timeout: Duration,
}

/// Process-wide configuration
#[derive(Debug, Clone)]
pub struct AppConfig {
    pub port: u16,
    /// `None` when no API key is configured; AI routes are then disabled
    pub llm: Option<LlmConfig>,
    pub tax: TaxParameters,
    /// Untouched sessions are evicted after this long
    pub session_idle_ttl: Duration,
    /// Longest silence tolerated inside a streamed chat answer
    pub stream_idle_timeout: Duration,
}

impl AppConfig {
    pub fn from_env() -> Result<Self> {
        let port = match env::var("PORT").or_else(|_| env::var("API_PORT")) {
            Ok(raw) => raw
                .trim()
                .parse()
                .map_err(|_| DashboardError::Config(format!("invalid port: {}", raw)))?,
            Err(_) => DEFAULT_PORT,
        };

        let llm = match env::var("OPENAI_API_KEY") {
            Ok(key) if !key.trim().is_empty() => Some(LlmConfig {
                api_key: key.trim().to_string(),
                base_url: env::var("OPENAI_BASE_URL")
                    .unwrap_or_else(|_| DEFAULT_BASE_URL.to_string())
                    .trim_end_matches('/')
                    .to_string(),
                model: env::var("OPENAI_MODEL").unwrap_or_else(|_| DEFAULT_MODEL.to_string()),
                timeout: Duration::from_secs(env_or(
                    "LLM_TIMEOUT_SECS",
                    DEFAULT_LLM_TIMEOUT_SECS,
                )?),
            }),
            _ => None,
        };

        let tax = TaxParameters::from_env()?;
        tax.validate()?;

        Ok(Self {
            port,
            llm,
            tax,
            session_idle_ttl: positive_secs(
                "SESSION_IDLE_TTL_SECS",
                DEFAULT_SESSION_IDLE_TTL_SECS,
            )?,
            stream_idle_timeout: positive_secs(
                "STREAM_IDLE_TIMEOUT_SECS",
                DEFAULT_STREAM_IDLE_TIMEOUT_SECS,
            )?,
        })
    }
}

fn positive_secs(key: &str, default: u64) -> Result<Duration> {
    match env_or(key, default)? {
        0 => Err(DashboardError::Config(format!("{} must be greater than zero", key))),
        secs => Ok(Duration::from_secs(secs)),
    }
}

fn env_or<T: FromStr>(key: &str, default: T) -> Result<T> {
    match env::var(key) {
        Ok(raw) => raw
            .trim()
            .parse()
            .map_err(|_| DashboardError::Config(format!("{} has an invalid value: {}", key, raw))),
        Err(_) => Ok(default),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_tax_parameters() {
        let params = TaxParameters::default();
        assert_eq!(params.marginal_rate, 0.472);
        assert_eq!(params.micro_allowance, 0.5);
        assert!(params.validate().is_ok());
    }

    #[test]
    fn test_negative_parameter_rejected() {
        let params = TaxParameters {
            marginal_rate: -0.1,
            ..TaxParameters::default()
        };
        assert!(matches!(params.validate(), Err(DashboardError::InvalidInput(_))));
    }

    #[test]
    fn test_partial_override_deserializes() {
        let params: TaxParameters = serde_json::from_str(r#"{"marginal_rate": 0.3}"#).unwrap();
        assert_eq!(params.marginal_rate, 0.3);
        assert_eq!(params.building_share, 0.85);
    }

    #[test]
    fn test_env_override() {
        env::set_var("TAX_RENOVATION_DEPRECIATION_RATE", "0.2");
        let params = TaxParameters::from_env().unwrap();
        env::remove_var("TAX_RENOVATION_DEPRECIATION_RATE");
        assert_eq!(params.renovation_depreciation_rate, 0.2);
    }

    #[test]
    fn test_zero_duration_rejected() {
        env::set_var("TEST_ZERO_SECS", "0");
        let result = positive_secs("TEST_ZERO_SECS", 30);
        env::remove_var("TEST_ZERO_SECS");
        assert!(matches!(result, Err(DashboardError::Config(_))));
        assert_eq!(
            positive_secs("TEST_UNSET_SECS", 30).unwrap(),
            Duration::from_secs(30)
        );
    }
}
