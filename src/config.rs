//! Pipeline configuration.
//!
//! ## TOML Format
//!
//! ```toml
//! passes = ["RemoveUnreachablePass", "RegAllocPass", "RegAllocPass#final"]
//!
//! [global]
//! jobs = 0                      # 0 = one per CPU
//! run_ir_checker = true
//! log_level = "info"
//! root_annotations = ["Lcom/example/Keep;"]
//!
//! [RegAllocPass]
//! use_linear_scan = false
//! max_spill_rounds = 8
//!
//! ["RegAllocPass#final"]
//! use_linear_scan = true
//! ```
//!
//! A pass instance named `Name#alias` reads the `"Name#alias"` table when
//! present and falls back to the `Name` table.

use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use std::path::Path;

use serde::de::DeserializeOwned;
use serde::Deserialize;
use tracing::warn;

/// Configuration error types
#[derive(Debug, Clone, PartialEq)]
pub enum ConfigError {
    /// The config file could not be read
    Io { path: String, message: String },
    /// The text is not valid TOML or does not match the schema
    Parse(String),
    /// A pass option has the wrong type
    Type {
        pass: String,
        key: String,
        message: String,
    },
    /// A pipeline entry names no registered pass
    UnknownPass(String),
    /// A value is well-typed but not acceptable
    Invalid(String),
}

impl fmt::Display for ConfigError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Io { path, message } => write!(f, "Cannot read {}: {}", path, message),
            Self::Parse(m) => write!(f, "Config parse error: {}", m),
            Self::Type { pass, key, message } => {
                write!(f, "Bad value for {}.{}: {}", pass, key, message)
            }
            Self::UnknownPass(name) => write!(f, "Unknown pass: {}", name),
            Self::Invalid(m) => write!(f, "Invalid config: {}", m),
        }
    }
}

impl std::error::Error for ConfigError {}

/// Settings shared by every pass.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct GlobalConfig {
    /// Worker threads for parallel walks; 0 means one per CPU.
    pub jobs: usize,
    /// Skip checks that only guard against verifier rejections.
    pub verify_none_mode: bool,
    pub run_property_checkers: bool,
    pub run_ir_checker: bool,
    pub log_level: String,
    /// Keep input class order on output; sort by descriptor otherwise.
    pub legacy_order: bool,
    /// Annotation types whose presence makes a class or member a root.
    pub root_annotations: Vec<String>,
}

impl Default for GlobalConfig {
    fn default() -> Self {
        Self {
            jobs: 0,
            verify_none_mode: false,
            run_property_checkers: true,
            run_ir_checker: true,
            log_level: "warn".to_string(),
            legacy_order: true,
            root_annotations: Vec::new(),
        }
    }
}

impl GlobalConfig {
    pub fn num_threads(&self) -> usize {
        crate::concurrent::resolve_num_threads(self.jobs)
    }
}

/// A pass pipeline with its global and per-pass settings.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct PipelineConfig {
    #[serde(default)]
    pub passes: Vec<String>,
    #[serde(default)]
    pub global: GlobalConfig,
    /// Every other top-level table, keyed by pass name.
    #[serde(flatten)]
    pub pass_configs: BTreeMap<String, toml::Table>,
}

impl PipelineConfig {
    pub fn new(passes: impl IntoIterator<Item = impl Into<String>>) -> Self {
        Self {
            passes: passes.into_iter().map(Into::into).collect(),
            ..Self::default()
        }
    }

    pub fn parse_toml(content: &str) -> Result<Self, ConfigError> {
        toml::from_str(content).map_err(|e| ConfigError::Parse(e.to_string()))
    }

    pub fn load_from_toml_path(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path).map_err(|e| ConfigError::Io {
            path: path.display().to_string(),
            message: e.to_string(),
        })?;
        Self::parse_toml(&content)
    }

    /// Options table for a pass instance (`Name` or `Name#alias`).
    pub fn pass_table(&self, instance: &str) -> Option<&toml::Table> {
        self.pass_configs.get(instance).or_else(|| {
            let base = instance.split('#').next()?;
            self.pass_configs.get(base)
        })
    }

    /// Set an option from code, creating the pass table when needed.
    pub fn set_pass_option(&mut self, pass: &str, key: &str, value: impl Into<toml::Value>) {
        self.pass_configs
            .entry(pass.to_string())
            .or_default()
            .insert(key.to_string(), value.into());
    }
}

/// Documentation of one bound option.
#[derive(Debug, Clone, PartialEq)]
pub struct OptionDoc {
    pub name: String,
    pub default: String,
    pub doc: String,
}

/// Binds a pass's options from its config table.
pub struct ConfigBinder<'a> {
    pass: String,
    table: Option<&'a toml::Table>,
    seen: BTreeSet<String>,
    docs: Vec<OptionDoc>,
    errors: Vec<ConfigError>,
}

impl<'a> ConfigBinder<'a> {
    pub fn new(pass: &str, table: Option<&'a toml::Table>) -> Self {
        Self {
            pass: pass.to_string(),
            table,
            seen: BTreeSet::new(),
            docs: Vec::new(),
            errors: Vec::new(),
        }
    }

    /// Set `out` from option `name`, or to `default` when absent.
    pub fn bind<T>(&mut self, name: &str, default: T, out: &mut T, doc: &str)
    where
        T: DeserializeOwned + fmt::Debug,
    {
        self.docs.push(OptionDoc {
            name: name.to_string(),
            default: format!("{:?}", default),
            doc: doc.to_string(),
        });
        self.seen.insert(name.to_string());
        *out = default;
        let Some(value) = self.table.and_then(|t| t.get(name)) else {
            return;
        };
        match value.clone().try_into::<T>() {
            Ok(v) => *out = v,
            Err(e) => self.errors.push(ConfigError::Type {
                pass: self.pass.clone(),
                key: name.to_string(),
                message: e.to_string(),
            }),
        }
    }

    /// Report unknown keys and return the option docs, or the first
    /// binding error.
    pub fn finish(self) -> Result<Vec<OptionDoc>, ConfigError> {
        if let Some(table) = self.table {
            for key in table.keys().filter(|k| !self.seen.contains(*k)) {
                warn!(target: "dexopt::config", pass = %self.pass, key = %key, "Unknown pass option");
            }
        }
        match self.errors.into_iter().next() {
            Some(e) => Err(e),
            None => Ok(self.docs),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_pipeline() {
        let cfg = PipelineConfig::parse_toml(
            r#"
            passes = ["RegAllocPass", "RegAllocPass#final"]

            [global]
            jobs = 2
            legacy_order = false

            [RegAllocPass]
            use_linear_scan = true

            ["RegAllocPass#final"]
            max_spill_rounds = 3
            "#,
        )
        .unwrap();
        assert_eq!(cfg.passes.len(), 2);
        assert_eq!(cfg.global.jobs, 2);
        assert!(!cfg.global.legacy_order);
        assert!(cfg.global.run_ir_checker);
        assert!(cfg.pass_table("RegAllocPass").unwrap().contains_key("use_linear_scan"));
        assert!(cfg.pass_table("RegAllocPass#final").unwrap().contains_key("max_spill_rounds"));
        assert!(cfg.pass_table("RegAllocPass#other").unwrap().contains_key("use_linear_scan"));
        assert!(cfg.pass_table("Nothing").is_none());
    }

    #[test]
    fn test_defaults() {
        let cfg = PipelineConfig::parse_toml("").unwrap();
        assert!(cfg.passes.is_empty());
        assert_eq!(cfg.global, GlobalConfig::default());
        assert!(cfg.global.num_threads() >= 1);
    }

    #[test]
    fn test_parse_errors() {
        assert!(matches!(
            PipelineConfig::parse_toml("passes = 3"),
            Err(ConfigError::Parse(_))
        ));
        let err = PipelineConfig::load_from_toml_path(Path::new("/nonexistent/dexopt.toml"));
        assert!(matches!(err, Err(ConfigError::Io { .. })));
    }

    #[test]
    fn test_binder() {
        let mut cfg = PipelineConfig::default();
        cfg.set_pass_option("P", "rounds", 4);
        cfg.set_pass_option("P", "flag", "yes");
        let mut rounds = 0u32;
        let mut name = String::new();
        let mut binder = ConfigBinder::new("P", cfg.pass_table("P"));
        binder.bind("rounds", 8u32, &mut rounds, "spill rounds");
        binder.bind("name", "x".to_string(), &mut name, "a name");
        let docs = binder.finish().unwrap();
        assert_eq!(rounds, 4);
        assert_eq!(name, "x");
        assert_eq!(docs.len(), 2);
        assert_eq!(docs[0].default, "8");

        let mut flag = false;
        let mut binder = ConfigBinder::new("P", cfg.pass_table("P"));
        binder.bind("flag", false, &mut flag, "a flag");
        assert!(matches!(binder.finish(), Err(ConfigError::Type { .. })));
    }
}
