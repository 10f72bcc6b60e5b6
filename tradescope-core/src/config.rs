//! Configuration file support for Tradescope
//!
//! Loads analysis settings from JSON files.
//!
//! Search order:
//! 1. Explicit path (--config CLI flag)
//! 2. `.tradescoperc.json` in the working directory
//! 3. `tradescope.config.json` in the working directory
//!
//! All fields are optional. CLI flags take precedence over config file values.

use crate::query::YearRange;
use crate::risk::RiskLevelThresholds;
use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

pub const DEFAULT_DATABASE: &str = "trade.db";
pub const DEFAULT_REFERENCE_MARKET: &str = "USA";
pub const DEFAULT_CURRENT_YEAR: i32 = 2023;
pub const DEFAULT_WINDOW_YEARS: u32 = 5;
pub const DEFAULT_TOP_SUPPLIERS: usize = 10;
pub const DEFAULT_STAKEHOLDER: &str = "generic stakeholder";

/// Tradescope configuration loaded from a JSON config file
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct TradescopeConfig {
    /// SQLite trade database (default: trade.db)
    #[serde(default)]
    pub database: Option<PathBuf>,

    /// Importer whose supply chain is analysed (default: USA)
    #[serde(default)]
    pub reference_market: Option<String>,

    /// Last year of the analysis window (default: 2023)
    #[serde(default)]
    pub current_year: Option<i32>,

    /// Years before `current_year` included in the window (default: 5)
    #[serde(default)]
    pub window_years: Option<u32>,

    /// Suppliers kept in the ranked supplier aggregate (default: 10)
    #[serde(default)]
    pub top_suppliers: Option<usize>,

    /// Custom risk level thresholds
    #[serde(default)]
    pub risk_levels: Option<RiskLevelConfig>,

    /// Default stakeholder role for narration prompts
    #[serde(default)]
    pub stakeholder: Option<String>,
}

/// Custom risk level thresholds on the 0-100 risk score
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct RiskLevelConfig {
    /// Score at or above which risk is low (default: 80)
    pub low: Option<f64>,
    /// Score at or above which risk is moderate (default: 60)
    pub moderate: Option<f64>,
}

/// Resolved configuration with defaults applied
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ResolvedConfig {
    pub database: PathBuf,
    pub reference_market: String,
    pub current_year: i32,
    pub window_years: u32,
    pub top_suppliers: usize,
    pub risk_low: f64,
    pub risk_moderate: f64,
    pub stakeholder: String,
    /// Path the config was loaded from (None if defaults)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub config_path: Option<PathBuf>,
}

impl TradescopeConfig {
    /// Validate the configuration for logical errors
    pub fn validate(&self) -> Result<()> {
        if let Some(ref market) = self.reference_market {
            if market.trim().is_empty() {
                anyhow::bail!("reference_market must not be empty");
            }
        }

        if self.window_years == Some(0) {
            anyhow::bail!("window_years must be at least 1");
        }

        if self.top_suppliers == Some(0) {
            anyhow::bail!("top_suppliers must be at least 1");
        }

        if let Some(ref db) = self.database {
            if db.as_os_str().is_empty() {
                anyhow::bail!("database must not be empty");
            }
        }

        // Thresholds are on the 0-100 score and must be ordered
        if let Some(ref r) = self.risk_levels {
            let defaults = RiskLevelThresholds::default();
            let low = r.low.unwrap_or(defaults.low);
            let moderate = r.moderate.unwrap_or(defaults.moderate);

            for (name, val) in [("low", low), ("moderate", moderate)] {
                if !(0.0..=100.0).contains(&val) {
                    anyhow::bail!(
                        "risk_levels.{} must be between 0 and 100 (got {})",
                        name,
                        val
                    );
                }
            }
            if moderate >= low {
                anyhow::bail!(
                    "risk_levels.moderate ({}) must be less than risk_levels.low ({})",
                    moderate,
                    low
                );
            }
        }

        Ok(())
    }

    /// Resolve config into the form used by the analyzer
    pub fn resolve(&self) -> Result<ResolvedConfig> {
        self.validate()?;

        let defaults = RiskLevelThresholds::default();
        let (risk_low, risk_moderate) = match &self.risk_levels {
            Some(r) => (
                r.low.unwrap_or(defaults.low),
                r.moderate.unwrap_or(defaults.moderate),
            ),
            None => (defaults.low, defaults.moderate),
        };

        Ok(ResolvedConfig {
            database: self
                .database
                .clone()
                .unwrap_or_else(|| PathBuf::from(DEFAULT_DATABASE)),
            reference_market: self
                .reference_market
                .clone()
                .unwrap_or_else(|| DEFAULT_REFERENCE_MARKET.to_string()),
            current_year: self.current_year.unwrap_or(DEFAULT_CURRENT_YEAR),
            window_years: self.window_years.unwrap_or(DEFAULT_WINDOW_YEARS),
            top_suppliers: self.top_suppliers.unwrap_or(DEFAULT_TOP_SUPPLIERS),
            risk_low,
            risk_moderate,
            stakeholder: self
                .stakeholder
                .clone()
                .unwrap_or_else(|| DEFAULT_STAKEHOLDER.to_string()),
            config_path: None,
        })
    }
}

impl ResolvedConfig {
    /// Build a ResolvedConfig with all defaults (no config file)
    pub fn defaults() -> Result<Self> {
        TradescopeConfig::default().resolve()
    }

    /// Inclusive analysis window ending at `current_year`
    pub fn years(&self) -> YearRange {
        YearRange::trailing(self.current_year, self.window_years)
    }

    pub fn risk_thresholds(&self) -> RiskLevelThresholds {
        RiskLevelThresholds {
            low: self.risk_low,
            moderate: self.risk_moderate,
        }
    }

    /// Serialize as pretty JSON (used by `config show`)
    pub fn to_json(&self) -> Result<String> {
        serde_json::to_string_pretty(self).context("failed to serialize config")
    }
}

/// Discover and load a config file from a directory
///
/// Search order:
/// 1. `.tradescoperc.json`
/// 2. `tradescope.config.json`
///
/// Returns `None` if no config file is found (use defaults).
pub fn discover_config(dir: &Path) -> Result<Option<(TradescopeConfig, PathBuf)>> {
    for name in [".tradescoperc.json", "tradescope.config.json"] {
        let path = dir.join(name);
        if path.exists() {
            let config = load_config_file(&path)?;
            return Ok(Some((config, path)));
        }
    }
    Ok(None)
}

/// Load config from an explicit file path
pub fn load_config_file(path: &Path) -> Result<TradescopeConfig> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("failed to read config file: {}", path.display()))?;

    let config: TradescopeConfig = serde_json::from_str(&content)
        .with_context(|| format!("failed to parse config file: {}", path.display()))?;

    config
        .validate()
        .with_context(|| format!("invalid config in: {}", path.display()))?;

    Ok(config)
}

/// Load and resolve config
///
/// If `config_path` is provided, loads from that file.
/// Otherwise, discovers config in `dir`.
/// Returns default config if nothing is found.
pub fn load_and_resolve(dir: &Path, config_path: Option<&Path>) -> Result<ResolvedConfig> {
    let (config, source_path) = if let Some(path) = config_path {
        let config = load_config_file(path)?;
        (config, Some(path.to_path_buf()))
    } else {
        match discover_config(dir)? {
            Some((config, path)) => (config, Some(path)),
            None => (TradescopeConfig::default(), None),
        }
    };

    let mut resolved = config.resolve()?;
    resolved.config_path = source_path;
    Ok(resolved)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;

    #[test]
    fn test_default_config_is_valid() {
        let config = TradescopeConfig::default();
        config.validate().expect("default config should be valid");
        let resolved = config.resolve().expect("default config should resolve");
        assert_eq!(resolved.database, PathBuf::from("trade.db"));
        assert_eq!(resolved.reference_market, "USA");
        assert_eq!(resolved.current_year, 2023);
        assert_eq!(resolved.window_years, 5);
        assert_eq!(resolved.top_suppliers, 10);
        assert_eq!(resolved.risk_low, 80.0);
        assert_eq!(resolved.risk_moderate, 60.0);
        assert_eq!(resolved.stakeholder, "generic stakeholder");
        assert_eq!(resolved.years(), YearRange::new(2018, 2023));
    }

    #[test]
    fn test_parse_minimal_config() {
        let config: TradescopeConfig = serde_json::from_str("{}").unwrap();
        config.validate().unwrap();
    }

    #[test]
    fn test_parse_full_config() {
        let json = r#"{
            "database": "data/baci.db",
            "reference_market": "Germany",
            "current_year": 2022,
            "window_years": 3,
            "top_suppliers": 5,
            "risk_levels": { "low": 70.0, "moderate": 40.0 },
            "stakeholder": "hospital procurement lead"
        }"#;
        let config: TradescopeConfig = serde_json::from_str(json).unwrap();
        let resolved = config.resolve().unwrap();
        assert_eq!(resolved.database, PathBuf::from("data/baci.db"));
        assert_eq!(resolved.reference_market, "Germany");
        assert_eq!(resolved.years(), YearRange::new(2019, 2022));
        assert_eq!(resolved.top_suppliers, 5);
        assert_eq!(
            resolved.risk_thresholds(),
            RiskLevelThresholds {
                low: 70.0,
                moderate: 40.0
            }
        );
        assert_eq!(resolved.stakeholder, "hospital procurement lead");
    }

    #[test]
    fn test_reject_unknown_fields() {
        let result: Result<TradescopeConfig, _> = serde_json::from_str(r#"{"min_lrs": 1}"#);
        assert!(result.is_err(), "unknown fields should be rejected");
        let result: Result<TradescopeConfig, _> =
            serde_json::from_str(r#"{"risk_levels": {"critical": 10}}"#);
        assert!(result.is_err());
    }

    #[test]
    fn test_reject_empty_reference_market() {
        let config: TradescopeConfig =
            serde_json::from_str(r#"{"reference_market": "  "}"#).unwrap();
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_reject_zero_window_and_top() {
        let config: TradescopeConfig = serde_json::from_str(r#"{"window_years": 0}"#).unwrap();
        assert!(config.validate().is_err());
        let config: TradescopeConfig = serde_json::from_str(r#"{"top_suppliers": 0}"#).unwrap();
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_reject_threshold_out_of_range() {
        let config: TradescopeConfig =
            serde_json::from_str(r#"{"risk_levels": {"low": 120.0}}"#).unwrap();
        assert!(config.validate().is_err());
        let config: TradescopeConfig =
            serde_json::from_str(r#"{"risk_levels": {"moderate": -5.0}}"#).unwrap();
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_reject_unordered_thresholds() {
        let config: TradescopeConfig =
            serde_json::from_str(r#"{"risk_levels": {"low": 50.0, "moderate": 60.0}}"#).unwrap();
        let err = config.validate().unwrap_err();
        assert!(err.to_string().contains("must be less than"));
    }

    #[test]
    fn test_partial_thresholds_use_defaults_for_rest() {
        let config: TradescopeConfig =
            serde_json::from_str(r#"{"risk_levels": {"moderate": 50.0}}"#).unwrap();
        let resolved = config.resolve().unwrap();
        assert_eq!(resolved.risk_low, 80.0);
        assert_eq!(resolved.risk_moderate, 50.0);
    }

    #[test]
    fn test_discover_rc_file() {
        let dir = tempfile::tempdir().unwrap();
        let config_path = dir.path().join(".tradescoperc.json");
        fs::write(&config_path, r#"{"top_suppliers": 3}"#).unwrap();

        let (config, path) = discover_config(dir.path()).unwrap().unwrap();
        assert_eq!(config.top_suppliers, Some(3));
        assert_eq!(path, config_path);
    }

    #[test]
    fn test_discover_priority_order() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(
            dir.path().join(".tradescoperc.json"),
            r#"{"reference_market": "Canada"}"#,
        )
        .unwrap();
        fs::write(
            dir.path().join("tradescope.config.json"),
            r#"{"reference_market": "Mexico"}"#,
        )
        .unwrap();

        let (config, _) = discover_config(dir.path()).unwrap().unwrap();
        assert_eq!(config.reference_market.as_deref(), Some("Canada"));
    }

    #[test]
    fn test_no_config_returns_none() {
        let dir = tempfile::tempdir().unwrap();
        assert!(discover_config(dir.path()).unwrap().is_none());
    }

    #[test]
    fn test_invalid_discovered_config_is_error() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(
            dir.path().join("tradescope.config.json"),
            r#"{"window_years": 0}"#,
        )
        .unwrap();
        let err = discover_config(dir.path()).unwrap_err();
        assert!(format!("{:#}", err).contains("window_years"));
    }

    #[test]
    fn test_load_and_resolve_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let resolved = load_and_resolve(dir.path(), None).unwrap();
        assert!(resolved.config_path.is_none());
        assert_eq!(resolved, ResolvedConfig::defaults().unwrap());
    }

    #[test]
    fn test_load_and_resolve_explicit_path() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("custom.json");
        fs::write(&path, r#"{"current_year": 2021, "window_years": 2}"#).unwrap();

        let resolved = load_and_resolve(dir.path(), Some(&path)).unwrap();
        assert_eq!(resolved.config_path, Some(path));
        assert_eq!(resolved.years(), YearRange::new(2019, 2021));
        assert_eq!(resolved.years().label(), "Past 2 Years");
    }

    #[test]
    fn test_show_json_includes_source() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("custom.json");
        fs::write(&path, "{}").unwrap();
        let json = load_and_resolve(dir.path(), Some(&path))
            .unwrap()
            .to_json()
            .unwrap();
        assert!(json.contains("\"config_path\""));
        assert!(json.contains("\"reference_market\": \"USA\""));
    }
}
