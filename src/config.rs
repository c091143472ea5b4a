use crate::loader::CompositeLoader;
use log::Level;
use crate::symbols::{Metric, SymbolFlag, SymbolFlags};
use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use serde_yaml::{Mapping, Value};
use std::collections::BTreeMap;
use std::path::Path;

#[derive(Debug, Deserialize, Serialize, Clone, Default)]
pub struct Config {
    /// Score for composites that do not set one.
    #[serde(default)]
    pub unknown_weight: Option<f64>,
    pub logging: Option<LoggingConfig>,
    /// Primitive symbols produced by detection modules.
    #[serde(default)]
    pub symbols: BTreeMap<String, SymbolConfig>,
    /// Composite definitions in load order.
    #[serde(default)]
    pub composites: Mapping,
    /// Bulk composite maps, as paths or URLs.
    #[serde(default)]
    pub composites_maps: Vec<String>,
}

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct LoggingConfig {
    pub level: String,
}

#[derive(Debug, Deserialize, Serialize, Clone, Default)]
pub struct SymbolConfig {
    #[serde(default)]
    pub score: f64,
    #[serde(default)]
    pub flags: Vec<SymbolFlag>,
}

impl SymbolConfig {
    pub fn flags(&self) -> SymbolFlags {
        self.flags
            .iter()
            .fold(SymbolFlags::empty(), |acc, flag| acc | SymbolFlags::from(*flag))
    }
}

/// Outcome counts for the composites section of a configuration.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct ConfigLoadSummary {
    pub loaded: usize,
    /// Entries skipped without error, such as disabled composites.
    pub skipped: usize,
    pub failed: usize,
}

impl Config {
    pub fn load_from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = std::fs::read_to_string(&path).with_context(|| {
            format!("Failed to read config file: {}", path.as_ref().display())
        })?;
        Self::from_yaml(&content)
            .with_context(|| format!("Failed to parse config file: {}", path.as_ref().display()))
    }

    pub fn from_yaml(content: &str) -> Result<Self> {
        Ok(serde_yaml::from_str(content)?)
    }

    pub fn default_path() -> &'static str {
        "/etc/foff-composites.yaml"
    }

    /// The configured unknown weight, NaN when unset.
    pub fn unknown_weight(&self) -> f64 {
        self.unknown_weight.unwrap_or(f64::NAN)
    }

    /// Registry seeded with every configured primitive symbol.
    pub fn build_metric(&self) -> Metric {
        let mut metric = Metric::new();
        for (name, symbol) in &self.symbols {
            metric.declare(name, symbol.score, symbol.flags());
        }
        metric
    }

    /// Loads every configured composite.
    ///
    /// Configuration composites use verbose duplicate handling. Only
    /// error-level load failures count as failed.
    pub fn load_composites(&self, loader: &mut CompositeLoader<'_>) -> ConfigLoadSummary {
        let mut summary = ConfigLoadSummary::default();
        for (key, value) in &self.composites {
            let Some(name) = key.as_str() else {
                log::error!("composite name must be a string, got {key:?}");
                summary.failed += 1;
                continue;
            };
            match loader.add_from_value(name, value, false) {
                Ok(_) => summary.loaded += 1,
                Err(e) if e.level() == Level::Error => summary.failed += 1,
                Err(_) => summary.skipped += 1,
            }
        }
        summary
    }

    /// Sample configuration written by `--generate-config`.
    pub fn example() -> Self {
        let mut symbols = BTreeMap::new();
        symbols.insert(
            "BAYES_SPAM".to_string(),
            SymbolConfig {
                score: 5.0,
                flags: vec![SymbolFlag::Classifier],
            },
        );
        symbols.insert(
            "DMARC_POLICY_REJECT".to_string(),
            SymbolConfig {
                score: 2.0,
                flags: vec![SymbolFlag::Postfilter],
            },
        );
        symbols.insert(
            "HEADER_MISSING".to_string(),
            SymbolConfig {
                score: 1.0,
                flags: vec![],
            },
        );

        let mut bad_header = Mapping::new();
        bad_header.insert(
            "expression".into(),
            "HEADER_MISSING & !WHITELISTED".into(),
        );
        bad_header.insert("score".into(), 4.5.into());
        bad_header.insert("group".into(), "headers".into());
        bad_header.insert("policy".into(), "remove_weight".into());

        let mut composites = Mapping::new();
        composites.insert("BAD_HEADER".into(), Value::Mapping(bad_header));
        composites.insert(
            "BAD_HEADER_SPAM".into(),
            "BAD_HEADER & (BAYES_SPAM | DMARC_POLICY_REJECT)".into(),
        );

        Self {
            unknown_weight: Some(1.0),
            logging: Some(LoggingConfig {
                level: "info".to_string(),
            }),
            symbols,
            composites,
            composites_maps: vec![],
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::expression::BooleanEngine;
    use crate::store::CompositeStore;
    use std::io::Write;

    const SAMPLE: &str = r#"
unknown_weight: 1.0
logging:
  level: debug
symbols:
  BAYES_SPAM: { score: 5.0, flags: [classifier] }
  DMARC_POLICY_REJECT: { score: 2.0, flags: [postfilter] }
  NEURAL: { flags: [nostat, classifier] }
  HEADER_MISSING: { score: 1.0 }
composites:
  ZETA:
    expression: "HEADER_MISSING & !WHITELISTED"
    score: 4.5
    group: headers
  ALPHA: "ZETA & BAYES_SPAM"
  BROKEN:
    score: 1.0
  OFF:
    expression: "HEADER_MISSING"
    enabled: false
composites_maps:
  - /etc/foff/composites.map
"#;

    #[test]
    fn test_parse_sample() {
        let config = Config::from_yaml(SAMPLE).unwrap();
        assert_eq!(config.unknown_weight(), 1.0);
        assert_eq!(config.logging.as_ref().unwrap().level, "debug");
        assert_eq!(config.composites.len(), 4);
        assert_eq!(config.composites_maps, vec!["/etc/foff/composites.map"]);
        assert_eq!(
            config.symbols["NEURAL"].flags(),
            SymbolFlags::NOSTAT | SymbolFlags::CLASSIFIER
        );
    }

    #[test]
    fn test_missing_unknown_weight_is_nan() {
        let config = Config::from_yaml("composites: {}").unwrap();
        assert!(config.unknown_weight().is_nan());
        assert!(config.symbols.is_empty());
    }

    #[test]
    fn test_unknown_flag_rejected() {
        assert!(Config::from_yaml("symbols: { X: { flags: [prefilter] } }").is_err());
    }

    #[test]
    fn test_load_composites_in_order() {
        let config = Config::from_yaml(SAMPLE).unwrap();
        let engine = BooleanEngine::new().unwrap();
        let mut metric = config.build_metric();
        let mut store = CompositeStore::new();
        let mut loader = CompositeLoader::new(&mut store, &mut metric, &engine)
            .with_unknown_weight(config.unknown_weight());

        assert_eq!(
            config.load_composites(&mut loader),
            ConfigLoadSummary {
                loaded: 2,
                skipped: 1,
                failed: 1
            }
        );

        let names: Vec<_> = store.iter().map(|c| c.name()).collect();
        assert_eq!(names, vec!["ZETA", "ALPHA"]);
        assert_eq!(store.find("ALPHA").unwrap().score(), 1.0);

        store.process_dependencies(&metric);
        assert!(store.is_second_pass("ALPHA"));
        assert!(!store.is_second_pass("ZETA"));
    }

    #[test]
    fn test_disabled_composite_is_not_a_failure() {
        let config = Config::from_yaml(
            r#"
composites:
  GOOD: "A & B"
  OFF:
    expression: "C"
    enabled: false
"#,
        )
        .unwrap();
        let engine = BooleanEngine::new().unwrap();
        let mut metric = config.build_metric();
        let mut store = CompositeStore::new();
        let mut loader = CompositeLoader::new(&mut store, &mut metric, &engine);

        let summary = config.load_composites(&mut loader);
        assert_eq!(summary.loaded, 1);
        assert_eq!(summary.skipped, 1);
        assert_eq!(summary.failed, 0);
        assert!(!store.contains("OFF"));
    }

    #[test]
    fn test_load_from_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(SAMPLE.as_bytes()).unwrap();

        let config = Config::load_from_file(file.path()).unwrap();
        assert_eq!(config.symbols.len(), 4);

        let err = Config::load_from_file("/nonexistent/foff-composites.yaml").unwrap_err();
        assert!(err.to_string().contains("Failed to read config file"));
    }

    #[test]
    fn test_example_round_trips() {
        let yaml = serde_yaml::to_string(&Config::example()).unwrap();
        let config = Config::from_yaml(&yaml).unwrap();
        assert_eq!(config.composites.len(), 2);
        assert_eq!(config.symbols["BAYES_SPAM"].flags(), SymbolFlags::CLASSIFIER);
    }
}
