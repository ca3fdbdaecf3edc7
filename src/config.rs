use anyhow::{anyhow, Context, Result};
use once_cell::sync::Lazy;
use serde::Deserialize;
use std::collections::BTreeMap;
use std::env;
use std::fmt;
use std::fs::File;
use std::num::{ParseFloatError, ParseIntError};
use std::path::{Path, PathBuf};

const DEFAULT_ROUND: u32 = 1;
const DEFAULT_MINIMUM_CORRELATION_STAGE_TICKS: usize = 30;
const DEFAULT_MAXIMUM_CORRELATION_STAGE_TICKS: usize = 40;
const DEFAULT_FEE_PER_CONTRACT: f64 = 0.5;
const DEFAULT_QUOTE_HALF_SPREAD: f64 = 1.0;
const DEFAULT_REPLAY_INTERVAL_MS: u64 = 0;
const DEFAULT_UNIVERSE: &str = "HURON,SUPERIOR";

/// Names accepted by [`StrategyParams::apply_override`]. A trailing
/// `_OVERRIDE` is stripped before lookup.
pub const OVERRIDE_KEYS: [&str; 10] = [
    "MINIMUM_CORRELATION_STAGE_TICKS",
    "MAXIMUM_CORRELATION_STAGE_TICKS",
    "EMA_SHORT",
    "EMA_LONG",
    "TRIGGER_SIGNAL",
    "CLOSE_SIGNAL",
    "POSITION_CHANGE_ON_TRIGGER",
    "POSITION_DOUBLE_DOWN_RATE",
    "MAXIMUM_ABSOLUTE_CONTRACTS",
    "FEE_PER_CONTRACT",
];

static ROUND_PRESETS: Lazy<BTreeMap<u32, StrategyParams>> = Lazy::new(|| {
    let base = StrategyParams {
        minimum_correlation_stage_ticks: DEFAULT_MINIMUM_CORRELATION_STAGE_TICKS,
        maximum_correlation_stage_ticks: DEFAULT_MAXIMUM_CORRELATION_STAGE_TICKS,
        ema_short: 12,
        ema_long: 26,
        trigger_signal: 2.05,
        close_signal: 0.3,
        position_change_on_trigger: 10,
        position_double_down_rate: 5,
        maximum_absolute_contracts: 40,
        fee_per_contract: DEFAULT_FEE_PER_CONTRACT,
    };
    BTreeMap::from([
        (1, base.clone()),
        (
            2,
            StrategyParams {
                ema_short: 30,
                ema_long: 30,
                position_change_on_trigger: 15,
                maximum_absolute_contracts: 60,
                ..base.clone()
            },
        ),
        (
            3,
            StrategyParams {
                trigger_signal: 2.5,
                position_double_down_rate: 10,
                maximum_absolute_contracts: 100,
                ..base
            },
        ),
    ])
});

#[derive(Debug)]
pub enum ConfigError {
    ParseIntError(ParseIntError),
    ParseFloatError(ParseFloatError),
    InvalidValue(String),
    UnknownRound(u32),
    UnknownParameter(String),
}

impl fmt::Display for ConfigError {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            ConfigError::ParseIntError(e) => write!(f, "Parse int error: {}", e),
            ConfigError::ParseFloatError(e) => write!(f, "Parse float error: {}", e),
            ConfigError::InvalidValue(e) => write!(f, "Invalid value: {}", e),
            ConfigError::UnknownRound(r) => write!(f, "Unknown round: {}", r),
            ConfigError::UnknownParameter(k) => write!(f, "Unknown parameter: {}", k),
        }
    }
}

impl std::error::Error for ConfigError {}

impl From<ParseIntError> for ConfigError {
    fn from(err: ParseIntError) -> ConfigError {
        ConfigError::ParseIntError(err)
    }
}

impl From<ParseFloatError> for ConfigError {
    fn from(err: ParseFloatError) -> ConfigError {
        ConfigError::ParseFloatError(err)
    }
}

/// Tunables of one trading round. Built once before the round starts and
/// handed to the engine by value; nothing reassigns them mid-round.
#[derive(Debug, Clone, PartialEq)]
pub struct StrategyParams {
    pub minimum_correlation_stage_ticks: usize,
    pub maximum_correlation_stage_ticks: usize,
    pub ema_short: usize,
    pub ema_long: usize,
    pub trigger_signal: f64,
    pub close_signal: f64,
    pub position_change_on_trigger: i64,
    pub position_double_down_rate: i64,
    pub maximum_absolute_contracts: i64,
    // Cost charged per traded contract by the fee proxy. Reported only.
    pub fee_per_contract: f64,
}

impl Default for StrategyParams {
    fn default() -> Self {
        ROUND_PRESETS[&DEFAULT_ROUND].clone()
    }
}

impl StrategyParams {
    pub fn for_round(round: u32) -> Result<Self, ConfigError> {
        ROUND_PRESETS
            .get(&round)
            .cloned()
            .ok_or(ConfigError::UnknownRound(round))
    }

    /// Checks the parameter set as a whole. Stage lengths must leave enough
    /// ratio history to seed the EMA and fill the variance window by the time
    /// trading begins.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.minimum_correlation_stage_ticks < 2 {
            return Err(ConfigError::InvalidValue(format!(
                "minimum_correlation_stage_ticks must be > 1 (got {})",
                self.minimum_correlation_stage_ticks
            )));
        }
        if self.maximum_correlation_stage_ticks < self.minimum_correlation_stage_ticks {
            return Err(ConfigError::InvalidValue(format!(
                "maximum_correlation_stage_ticks ({}) < minimum_correlation_stage_ticks ({})",
                self.maximum_correlation_stage_ticks, self.minimum_correlation_stage_ticks
            )));
        }
        if self.ema_short == 0 {
            return Err(ConfigError::InvalidValue(
                "ema_short must be positive".to_string(),
            ));
        }
        if self.maximum_correlation_stage_ticks < self.ema_short + 1 {
            return Err(ConfigError::InvalidValue(format!(
                "maximum_correlation_stage_ticks ({}) leaves no room to seed an ema_short of {}",
                self.maximum_correlation_stage_ticks, self.ema_short
            )));
        }
        if self.maximum_correlation_stage_ticks < self.ema_long + 3 {
            return Err(ConfigError::InvalidValue(format!(
                "maximum_correlation_stage_ticks ({}) leaves no room for an ema_long window of {}",
                self.maximum_correlation_stage_ticks,
                self.ema_long + 2
            )));
        }
        if !self.trigger_signal.is_finite() || !self.close_signal.is_finite() {
            return Err(ConfigError::InvalidValue(
                "signal thresholds must be finite".to_string(),
            ));
        }
        if self.close_signal < 0.0 || self.trigger_signal <= self.close_signal {
            return Err(ConfigError::InvalidValue(format!(
                "require trigger_signal ({}) > close_signal ({}) >= 0",
                self.trigger_signal, self.close_signal
            )));
        }
        if self.position_change_on_trigger < 1 {
            return Err(ConfigError::InvalidValue(
                "position_change_on_trigger must be >= 1".to_string(),
            ));
        }
        if self.position_double_down_rate < 0 {
            return Err(ConfigError::InvalidValue(
                "position_double_down_rate must be >= 0".to_string(),
            ));
        }
        if self.maximum_absolute_contracts < 1 {
            return Err(ConfigError::InvalidValue(
                "maximum_absolute_contracts must be >= 1".to_string(),
            ));
        }
        if !self.fee_per_contract.is_finite() || self.fee_per_contract < 0.0 {
            return Err(ConfigError::InvalidValue(
                "fee_per_contract must be a non-negative number".to_string(),
            ));
        }
        Ok(())
    }

    /// Applies one string-encoded override. A value that fails to parse, or
    /// that leaves the parameter set invalid, is rejected and the previous
    /// value stays in place.
    pub fn apply_override(&mut self, key: &str, raw: &str) -> Result<(), ConfigError> {
        let mut candidate = self.clone();
        candidate.set_field(&normalize_override_key(key), raw.trim())?;
        candidate.validate()?;
        *self = candidate;
        Ok(())
    }

    /// Applies a set of overrides and returns how many took effect. Values
    /// that fail to parse are skipped; the parsed ones are validated together,
    /// so the set may move interdependent bounds in any key order. If the
    /// combined set is invalid none of it is applied.
    pub fn apply_overrides(&mut self, overrides: &BTreeMap<String, String>) -> usize {
        let mut candidate = self.clone();
        let mut accepted = Vec::new();
        for (key, raw) in overrides {
            let value = raw.trim();
            if value.is_empty() {
                continue;
            }
            match candidate.set_field(&normalize_override_key(key), value) {
                Ok(()) => accepted.push(format!("{}={}", key, value)),
                Err(e) => log::warn!("[CONFIG] {}: {} (keeping previous value)", key, e),
            }
        }
        if accepted.is_empty() {
            return 0;
        }
        if let Err(e) = candidate.validate() {
            log::warn!(
                "[CONFIG] overrides [{}] conflict: {} (keeping previous values)",
                accepted.join(", "),
                e
            );
            return 0;
        }
        log::info!("[CONFIG] overrides applied: {}", accepted.join(", "));
        *self = candidate;
        accepted.len()
    }

    fn set_field(&mut self, name: &str, value: &str) -> Result<(), ConfigError> {
        match name {
            "MINIMUM_CORRELATION_STAGE_TICKS" => {
                self.minimum_correlation_stage_ticks = value.parse()?
            }
            "MAXIMUM_CORRELATION_STAGE_TICKS" => {
                self.maximum_correlation_stage_ticks = value.parse()?
            }
            "EMA_SHORT" => self.ema_short = value.parse()?,
            "EMA_LONG" => self.ema_long = value.parse()?,
            "TRIGGER_SIGNAL" => self.trigger_signal = value.parse()?,
            "CLOSE_SIGNAL" => self.close_signal = value.parse()?,
            "POSITION_CHANGE_ON_TRIGGER" => self.position_change_on_trigger = value.parse()?,
            "POSITION_DOUBLE_DOWN_RATE" => self.position_double_down_rate = value.parse()?,
            "MAXIMUM_ABSOLUTE_CONTRACTS" => self.maximum_absolute_contracts = value.parse()?,
            "FEE_PER_CONTRACT" => self.fee_per_contract = value.parse()?,
            other => return Err(ConfigError::UnknownParameter(other.to_string())),
        }
        Ok(())
    }
}

/// Upper-cased parameter name without a trailing `_OVERRIDE`.
fn normalize_override_key(key: &str) -> String {
    let upper = key.trim().to_ascii_uppercase();
    upper
        .strip_suffix("_OVERRIDE")
        .map(str::to_string)
        .unwrap_or(upper)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReplayFormat {
    Csv,
    Jsonl,
}

impl std::str::FromStr for ReplayFormat {
    type Err = ();
    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "csv" => Ok(ReplayFormat::Csv),
            "jsonl" | "json" => Ok(ReplayFormat::Jsonl),
            _ => Err(()),
        }
    }
}

impl ReplayFormat {
    fn from_path(path: &str) -> Self {
        if path.ends_with(".jsonl") || path.ends_with(".json") {
            ReplayFormat::Jsonl
        } else {
            ReplayFormat::Csv
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
#[serde(untagged)]
enum StringOrVec {
    String(String),
    Vec(Vec<String>),
}

impl StringOrVec {
    fn into_vec(self) -> Vec<String> {
        match self {
            StringOrVec::String(value) => split_symbols(&value),
            StringOrVec::Vec(values) => values
                .into_iter()
                .map(|item| item.trim().to_string())
                .filter(|item| !item.is_empty())
                .collect(),
        }
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "snake_case")]
struct PairTradeYaml {
    round: Option<u32>,
    universe: Option<StringOrVec>,
    overrides: Option<BTreeMap<String, serde_yaml::Value>>,
    replay_file: Option<String>,
    replay_format: Option<String>,
    replay_interval_ms: Option<u64>,
    quote_half_spread: Option<f64>,
    pnl_log: Option<bool>,
    pnl_dir: Option<String>,
    pnl_tag: Option<String>,
}

/// Settings of the replay driver. The strategy tunables are derived from
/// `round` and `overrides` through [`PairTradeConfig::strategy_params`].
#[derive(Debug, Clone)]
pub struct PairTradeConfig {
    pub round: u32,
    pub universe: Vec<String>,
    pub overrides: BTreeMap<String, String>,
    pub replay_file: Option<String>,
    pub replay_format: ReplayFormat,
    pub replay_interval_ms: u64,
    pub quote_half_spread: f64,
    pub pnl_log: bool,
    pub pnl_dir: PathBuf,
    pub pnl_tag: Option<String>,
}

impl PairTradeConfig {
    pub fn from_env_or_yaml() -> Result<Self> {
        let config_path = env::var("PAIRTRADE_CONFIG_PATH")
            .ok()
            .filter(|value| !value.trim().is_empty());
        if let Some(path) = config_path {
            return Self::from_yaml_path(path);
        }
        Self::from_env()
    }

    pub fn from_yaml_path<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path_ref = path.as_ref();
        let file = File::open(path_ref)
            .with_context(|| format!("failed to open PairTrade config {}", path_ref.display()))?;
        let yaml: PairTradeYaml = serde_yaml::from_reader(file)
            .with_context(|| format!("failed to parse PairTrade config {}", path_ref.display()))?;
        let mut cfg = Self::from_yaml(yaml)?;
        cfg.apply_env_overrides()?;
        Ok(cfg)
    }

    fn from_yaml(yaml: PairTradeYaml) -> Result<Self> {
        let universe = yaml
            .universe
            .map(StringOrVec::into_vec)
            .unwrap_or_else(|| split_symbols(DEFAULT_UNIVERSE));
        let overrides = yaml
            .overrides
            .unwrap_or_default()
            .into_iter()
            .map(|(key, value)| (normalize_override_key(&key), yaml_scalar_to_string(value)))
            .collect();
        let replay_format = match (&yaml.replay_format, &yaml.replay_file) {
            (Some(raw), _) => raw
                .parse()
                .map_err(|_| anyhow!("invalid replay_format: {}", raw))?,
            (None, Some(file)) => ReplayFormat::from_path(file),
            (None, None) => ReplayFormat::Csv,
        };
        let cfg = PairTradeConfig {
            round: yaml.round.unwrap_or(DEFAULT_ROUND),
            universe,
            overrides,
            replay_file: yaml.replay_file,
            replay_format,
            replay_interval_ms: yaml
                .replay_interval_ms
                .unwrap_or(DEFAULT_REPLAY_INTERVAL_MS),
            quote_half_spread: yaml.quote_half_spread.unwrap_or(DEFAULT_QUOTE_HALF_SPREAD),
            pnl_log: yaml.pnl_log.unwrap_or(true),
            pnl_dir: yaml
                .pnl_dir
                .map(PathBuf::from)
                .unwrap_or_else(default_pnl_dir),
            pnl_tag: yaml.pnl_tag,
        };
        cfg.check_universe()?;
        Ok(cfg)
    }

    pub fn from_env() -> Result<Self> {
        let round = env::var("ROUND")
            .ok()
            .and_then(|v| v.parse().ok())
            .unwrap_or(DEFAULT_ROUND);
        let universe = env::var("UNIVERSE_SYMBOLS")
            .ok()
            .filter(|v| !v.trim().is_empty())
            .map(|v| split_symbols(&v))
            .unwrap_or_else(|| split_symbols(DEFAULT_UNIVERSE));
        let replay_file = env::var("REPLAY_FILE").ok().filter(|v| !v.trim().is_empty());
        let replay_format = env::var("REPLAY_FORMAT")
            .ok()
            .and_then(|v| v.parse().ok())
            .or_else(|| replay_file.as_deref().map(ReplayFormat::from_path))
            .unwrap_or(ReplayFormat::Csv);
        let replay_interval_ms = env::var("REPLAY_INTERVAL_MS")
            .ok()
            .and_then(|v| v.parse().ok())
            .unwrap_or(DEFAULT_REPLAY_INTERVAL_MS);
        let quote_half_spread = env::var("QUOTE_HALF_SPREAD")
            .ok()
            .and_then(|v| v.parse().ok())
            .unwrap_or(DEFAULT_QUOTE_HALF_SPREAD);
        let pnl_log = env::var("PAIRTRADE_PNL_LOG")
            .ok()
            .map(|v| parse_flag(&v))
            .unwrap_or(true);
        let pnl_dir = env::var("PAIRTRADE_PNL_DIR")
            .ok()
            .filter(|v| !v.trim().is_empty())
            .map(PathBuf::from)
            .unwrap_or_else(default_pnl_dir);
        let pnl_tag = env::var("PAIRTRADE_PNL_TAG")
            .ok()
            .filter(|v| !v.trim().is_empty());

        let cfg = Self {
            round,
            universe,
            overrides: overrides_from_env(),
            replay_file,
            replay_format,
            replay_interval_ms,
            quote_half_spread,
            pnl_log,
            pnl_dir,
            pnl_tag,
        };
        cfg.check_universe()?;
        Ok(cfg)
    }

    fn apply_env_overrides(&mut self) -> Result<()> {
        if let Ok(value) = env::var("ROUND") {
            if let Ok(parsed) = value.parse() {
                self.round = parsed;
            }
        }
        if let Ok(value) = env::var("UNIVERSE_SYMBOLS") {
            if !value.trim().is_empty() {
                self.universe = split_symbols(&value);
            }
        }
        if let Ok(value) = env::var("REPLAY_FILE") {
            if !value.trim().is_empty() {
                self.replay_format = ReplayFormat::from_path(&value);
                self.replay_file = Some(value);
            }
        }
        if let Ok(value) = env::var("REPLAY_FORMAT") {
            if let Ok(parsed) = value.parse() {
                self.replay_format = parsed;
            }
        }
        if let Ok(value) = env::var("REPLAY_INTERVAL_MS") {
            if let Ok(parsed) = value.parse() {
                self.replay_interval_ms = parsed;
            }
        }
        if let Ok(value) = env::var("QUOTE_HALF_SPREAD") {
            if let Ok(parsed) = value.parse() {
                self.quote_half_spread = parsed;
            }
        }
        if let Ok(value) = env::var("PAIRTRADE_PNL_LOG") {
            self.pnl_log = parse_flag(&value);
        }
        if let Ok(value) = env::var("PAIRTRADE_PNL_DIR") {
            if !value.trim().is_empty() {
                self.pnl_dir = PathBuf::from(value);
            }
        }
        if let Ok(value) = env::var("PAIRTRADE_PNL_TAG") {
            if !value.trim().is_empty() {
                self.pnl_tag = Some(value);
            }
        }
        self.merge_overrides(overrides_from_env());
        self.check_universe()
    }

    /// Later sources win: a key replaces any earlier spelling of the same
    /// parameter, with or without the `_OVERRIDE` suffix.
    fn merge_overrides(&mut self, incoming: BTreeMap<String, String>) {
        for (key, value) in incoming {
            self.overrides.insert(normalize_override_key(&key), value);
        }
    }

    fn check_universe(&self) -> Result<()> {
        if self.universe.len() < 2 {
            return Err(anyhow!(
                "universe needs at least two symbols (got {:?})",
                self.universe
            ));
        }
        Ok(())
    }

    /// Round preset plus overrides. An unknown round falls back to the
    /// default preset.
    pub fn strategy_params(&self) -> StrategyParams {
        let mut params = StrategyParams::for_round(self.round).unwrap_or_else(|e| {
            log::warn!("[CONFIG] {}; using round {} preset", e, DEFAULT_ROUND);
            StrategyParams::default()
        });
        params.apply_overrides(&self.overrides);
        params
    }
}

fn overrides_from_env() -> BTreeMap<String, String> {
    OVERRIDE_KEYS
        .iter()
        .filter_map(|key| {
            let var = format!("{}_OVERRIDE", key);
            env::var(&var)
                .ok()
                .filter(|v| !v.trim().is_empty())
                .map(|v| (normalize_override_key(key), v))
        })
        .collect()
}

fn yaml_scalar_to_string(value: serde_yaml::Value) -> String {
    match value {
        serde_yaml::Value::String(s) => s,
        serde_yaml::Value::Number(n) => n.to_string(),
        serde_yaml::Value::Bool(b) => b.to_string(),
        serde_yaml::Value::Null => String::new(),
        other => serde_yaml::to_string(&other)
            .map(|s| s.trim().to_string())
            .unwrap_or_default(),
    }
}

fn split_symbols(raw: &str) -> Vec<String> {
    raw.split(',')
        .map(|item| item.trim().to_string())
        .filter(|item| !item.is_empty())
        .collect()
}

fn parse_flag(raw: &str) -> bool {
    let v = raw.trim().to_ascii_lowercase();
    v == "1" || v == "true" || v == "yes"
}

fn default_pnl_dir() -> PathBuf {
    env::var("HOME")
        .ok()
        .map(|home| PathBuf::from(home).join("pairbot_pnl"))
        .unwrap_or_else(|| PathBuf::from("pairbot_pnl"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn round_presets_match_published_tables() {
        let r2 = StrategyParams::for_round(2).unwrap();
        assert_eq!(r2.maximum_absolute_contracts, 60);
        assert_eq!(r2.position_change_on_trigger, 15);
        assert_eq!((r2.ema_short, r2.ema_long), (30, 30));
        let r3 = StrategyParams::for_round(3).unwrap();
        assert_eq!(r3.trigger_signal, 2.5);
        assert_eq!(r3.position_double_down_rate, 10);
        for round in 1..=3 {
            StrategyParams::for_round(round).unwrap().validate().unwrap();
        }
        assert!(matches!(
            StrategyParams::for_round(7),
            Err(ConfigError::UnknownRound(7))
        ));
    }

    #[test]
    fn unparseable_override_keeps_previous_value() {
        let mut params = StrategyParams::default();
        let err = params.apply_override("EMA_SHORT_OVERRIDE", "twelve");
        assert!(matches!(err, Err(ConfigError::ParseIntError(_))));
        assert_eq!(params.ema_short, 12);
        let err = params.apply_override("TRIGGER_SIGNAL", "abc");
        assert!(matches!(err, Err(ConfigError::ParseFloatError(_))));
        assert_eq!(params.trigger_signal, 2.05);
    }

    #[test]
    fn override_that_breaks_invariants_is_rejected() {
        let mut params = StrategyParams::default();
        assert!(params.apply_override("CLOSE_SIGNAL", "3.0").is_err());
        assert_eq!(params.close_signal, 0.3);
        assert!(params.apply_override("EMA_LONG", "60").is_err());
        assert_eq!(params.ema_long, 26);
        assert!(params.apply_override("NOT_A_KNOB", "1").is_err());
    }

    #[test]
    fn apply_overrides_counts_only_accepted_values() {
        let mut params = StrategyParams::default();
        let overrides = BTreeMap::from([
            ("TRIGGER_SIGNAL_OVERRIDE".to_string(), " 2.4 ".to_string()),
            ("CLOSE_SIGNAL_OVERRIDE".to_string(), "".to_string()),
            ("POSITION_DOUBLE_DOWN_RATE".to_string(), "x".to_string()),
            ("MAXIMUM_ABSOLUTE_CONTRACTS".to_string(), "80".to_string()),
        ]);
        assert_eq!(params.apply_overrides(&overrides), 2);
        assert_eq!(params.trigger_signal, 2.4);
        assert_eq!(params.maximum_absolute_contracts, 80);
        assert_eq!(params.position_double_down_rate, 5);
    }

    #[test]
    fn yaml_config_builds_strategy_params() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(
            file,
            "round: 3\nuniverse: [AAA, BBB, CCC]\nreplay_file: ticks.jsonl\noverrides:\n  EMA_SHORT: 20\n  TRIGGER_SIGNAL: bad\npnl_log: false"
        )
        .unwrap();
        let yaml: PairTradeYaml =
            serde_yaml::from_reader(File::open(file.path()).unwrap()).unwrap();
        let cfg = PairTradeConfig::from_yaml(yaml).unwrap();
        assert_eq!(cfg.universe, vec!["AAA", "BBB", "CCC"]);
        assert_eq!(cfg.replay_format, ReplayFormat::Jsonl);
        assert!(!cfg.pnl_log);
        let params = cfg.strategy_params();
        assert_eq!(params.ema_short, 20);
        assert_eq!(params.trigger_signal, 2.5);
        assert_eq!(params.maximum_absolute_contracts, 100);
    }

    #[test]
    fn interdependent_overrides_apply_in_any_key_order() {
        let mut params = StrategyParams::default();
        let overrides = BTreeMap::from([
            ("EMA_LONG".to_string(), "40".to_string()),
            ("MAXIMUM_CORRELATION_STAGE_TICKS".to_string(), "50".to_string()),
        ]);
        assert_eq!(params.apply_overrides(&overrides), 2);
        assert_eq!(params.ema_long, 40);
        assert_eq!(params.maximum_correlation_stage_ticks, 50);

        let mut params = StrategyParams::default();
        let overrides = BTreeMap::from([
            ("EMA_LONG".to_string(), "10".to_string()),
            ("MINIMUM_CORRELATION_STAGE_TICKS".to_string(), "10".to_string()),
            ("MAXIMUM_CORRELATION_STAGE_TICKS_OVERRIDE".to_string(), "20".to_string()),
        ]);
        assert_eq!(params.apply_overrides(&overrides), 3);
        assert_eq!(params.minimum_correlation_stage_ticks, 10);
        assert_eq!(params.maximum_correlation_stage_ticks, 20);
        assert_eq!(params.ema_long, 10);
        params.validate().unwrap();
    }

    #[test]
    fn conflicting_override_set_keeps_previous_values() {
        let mut params = StrategyParams::default();
        let overrides = BTreeMap::from([
            ("EMA_SHORT".to_string(), "20".to_string()),
            ("MAXIMUM_CORRELATION_STAGE_TICKS".to_string(), "15".to_string()),
        ]);
        assert_eq!(params.apply_overrides(&overrides), 0);
        assert_eq!(params, StrategyParams::default());
    }

    #[test]
    fn env_override_replaces_yaml_override() {
        let yaml: PairTradeYaml =
            serde_yaml::from_str("overrides:\n  EMA_SHORT_OVERRIDE: 20\n  ema_long: 20").unwrap();
        let mut cfg = PairTradeConfig::from_yaml(yaml).unwrap();
        assert_eq!(cfg.overrides.get("EMA_SHORT").map(String::as_str), Some("20"));
        assert_eq!(cfg.overrides.get("EMA_LONG").map(String::as_str), Some("20"));

        cfg.merge_overrides(BTreeMap::from([("EMA_SHORT".to_string(), "15".to_string())]));
        assert_eq!(cfg.overrides.len(), 2);
        let params = cfg.strategy_params();
        assert_eq!(params.ema_short, 15);
        assert_eq!(params.ema_long, 20);

        env::set_var("EMA_SHORT_OVERRIDE", "17");
        let merged = cfg.apply_env_overrides();
        env::remove_var("EMA_SHORT_OVERRIDE");
        merged.unwrap();
        assert_eq!(cfg.strategy_params().ema_short, 17);
    }

    #[test]
    fn single_symbol_universe_is_rejected() {
        let yaml: PairTradeYaml = serde_yaml::from_str("universe: AAA").unwrap();
        assert!(PairTradeConfig::from_yaml(yaml).is_err());
    }
}
