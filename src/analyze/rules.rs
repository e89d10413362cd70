//! Versioned rule file: keyword dictionary, pattern table, scoring knobs and wording.
//!
//! Loaded once into an immutable `RuleSet` shared behind `Arc`. Reloads build a complete
//! new `RuleSet` first and only then swap the pointer, so a scoring run holding the old
//! `Arc` never sees a half-updated table and a broken file never replaces a good one.
//!
//! ```toml
//! version = "2025-03-01"
//!
//! [scoring]
//! combination = "additive"           # or "multiplicative"
//! tier_factors = { tier1 = 1.0, tier2 = 1.5, tier3 = 2.0 }
//! thresholds = { medium = 50.0, high = 100.0 }
//!
//! [[keywords]]
//! keyword = "반도체"
//! tier = 1
//! category = "technology"
//! weight = 10.0
//!
//! [[patterns]]
//! name = "tech_language"
//! score = 0.5
//! requires = [{ category = "technology" }, { category = "language" }]
//! ```

use serde::Deserialize;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::{Arc, PoisonError, RwLock};
use std::thread;
use std::time::{Duration, SystemTime};
use tracing::{info, warn};

use super::dictionary::{KeywordDictionary, KeywordSpec};
use super::patterns::{PatternSpec, PatternTable};
use super::scoring::{Narrative, ScoringConfig};
use crate::error::ConfigError;
use crate::metrics::{RULES_KEYWORDS, RULES_RELOADS_TOTAL};

pub const DEFAULT_RULES_CONFIG_PATH: &str = "config/rules.toml";
pub const ENV_RULES_CONFIG_PATH: &str = "RULES_CONFIG_PATH";
pub const ENV_RULES_HOT_RELOAD: &str = "RULES_HOT_RELOAD";

/// On-disk shape, before validation.
#[derive(Debug, Clone, Deserialize)]
pub struct RuleFile {
    #[serde(default = "default_version")]
    pub version: String,
    #[serde(default)]
    pub scoring: ScoringConfig,
    #[serde(default)]
    pub narrative: Narrative,
    #[serde(default)]
    pub keywords: Vec<KeywordSpec>,
    #[serde(default)]
    pub patterns: Vec<PatternSpec>,
}

fn default_version() -> String {
    "unversioned".to_string()
}

/// Validated, immutable rules for one scoring run.
#[derive(Debug, Clone)]
pub struct RuleSet {
    pub version: String,
    pub dictionary: KeywordDictionary,
    pub patterns: PatternTable,
    pub scoring: ScoringConfig,
    pub narrative: Narrative,
}

impl RuleSet {
    pub fn from_file(file: RuleFile) -> Result<Self, ConfigError> {
        file.scoring.validate()?;
        let dictionary = KeywordDictionary::from_specs(&file.keywords)?;
        let patterns = PatternTable::from_specs(&file.patterns, &dictionary)?;
        Ok(Self {
            version: file.version,
            dictionary,
            patterns,
            scoring: file.scoring,
            narrative: file.narrative,
        })
    }

    pub fn from_toml_str(s: &str) -> Result<Self, ConfigError> {
        let file: RuleFile = toml::from_str(s).map_err(|e| ConfigError::Parse(e.to_string()))?;
        Self::from_file(file)
    }

    pub fn from_json_str(s: &str) -> Result<Self, ConfigError> {
        let file: RuleFile =
            serde_json::from_str(s).map_err(|e| ConfigError::Parse(e.to_string()))?;
        Self::from_file(file)
    }

    /// Load by extension: `.toml` or `.json`.
    pub fn from_path(path: &Path) -> Result<Self, ConfigError> {
        let content = fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        let ext = path
            .extension()
            .and_then(|s| s.to_str())
            .unwrap_or_default()
            .to_ascii_lowercase();
        match ext.as_str() {
            "toml" => Self::from_toml_str(&content),
            "json" => Self::from_json_str(&content),
            other => Err(ConfigError::UnsupportedFormat(other.to_string())),
        }
    }
}

/// Shared pointer to the current rules. Readers clone the inner `Arc` and keep using it
/// for the whole run; writers swap the pointer.
#[derive(Debug, Clone)]
pub struct RulesHandle {
    inner: Arc<RwLock<Arc<RuleSet>>>,
}

impl RulesHandle {
    pub fn new(rules: RuleSet) -> Self {
        metrics::gauge!(RULES_KEYWORDS).set(rules.dictionary.len() as f64);
        Self {
            inner: Arc::new(RwLock::new(Arc::new(rules))),
        }
    }

    pub fn current(&self) -> Arc<RuleSet> {
        self.inner
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Swap in a new rule set, returning the previous one.
    pub fn replace(&self, rules: RuleSet) -> Arc<RuleSet> {
        let next = Arc::new(rules);
        metrics::gauge!(RULES_KEYWORDS).set(next.dictionary.len() as f64);
        let mut guard = self.inner.write().unwrap_or_else(PoisonError::into_inner);
        std::mem::replace(&mut *guard, next)
    }

    /// Rebuild from `path` and swap. On error the current rules stay in place.
    pub fn reload_from(&self, path: &Path) -> Result<Arc<RuleSet>, ConfigError> {
        match RuleSet::from_path(path) {
            Ok(rules) => {
                let version = rules.version.clone();
                let keywords = rules.dictionary.len();
                let patterns = rules.patterns.len();
                self.replace(rules);
                metrics::counter!(RULES_RELOADS_TOTAL, "outcome" => "ok").increment(1);
                info!(target: "rules", %version, keywords, patterns, path = %path.display(), "rules reloaded");
                Ok(self.current())
            }
            Err(e) => {
                metrics::counter!(RULES_RELOADS_TOTAL, "outcome" => "rejected").increment(1);
                warn!(target: "rules", error = %e, path = %path.display(), "rule reload rejected; keeping current rules");
                Err(e)
            }
        }
    }
}

/// Poll `path` every 2s and reload when its mtime advances.
/// The caller gates this on `RULES_HOT_RELOAD=1` (see `EngineSettings::hot_reload`).
pub fn start_hot_reload_thread(handle: RulesHandle, path: PathBuf) {
    info!(target: "rules", path = %path.display(), "rule hot reload enabled");

    thread::spawn(move || {
        let poll = Duration::from_secs(2);
        let mut last_mtime: Option<SystemTime> = fs::metadata(&path).and_then(|m| m.modified()).ok();

        loop {
            thread::sleep(poll);
            let Ok(mtime) = fs::metadata(&path).and_then(|m| m.modified()) else {
                continue;
            };
            if last_mtime.is_some_and(|prev| mtime <= prev) {
                continue;
            }
            last_mtime = Some(mtime);
            // errors are logged inside; the old rules keep serving
            let _ = handle.reload_from(&path);
        }
    });
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    const RULES: &str = r#"
version = "test-1"

[scoring]
combination = "additive"
tier_factors = { tier1 = 1.0, tier2 = 1.5, tier3 = 2.0 }
thresholds = { medium = 5.0, high = 10.0 }

[narrative.category_labels]
risk = "위험 키워드"

[[keywords]]
keyword = "유출"
tier = 3
category = "risk"
weight = 5.0

[[keywords]]
keyword = "반도체"
tier = 1
category = "technology"
weight = 1.0

[[patterns]]
name = "P1"
score = 2.0
requires = [{ category = "risk" }, { category = "technology" }]
"#;

    fn write_tmp(ext: &str, body: &str) -> tempfile::NamedTempFile {
        let mut f = tempfile::Builder::new().suffix(ext).tempfile().unwrap();
        f.write_all(body.as_bytes()).unwrap();
        f
    }

    #[test]
    fn parses_toml_rule_file() {
        let r = RuleSet::from_toml_str(RULES).unwrap();
        assert_eq!(r.version, "test-1");
        assert_eq!(r.dictionary.len(), 2);
        assert_eq!(r.patterns.len(), 1);
        assert_eq!(r.scoring.thresholds.high, 10.0);
        assert_eq!(r.narrative.category_labels["risk"], "위험 키워드");
        assert_eq!(r.narrative.recommendations.low.len(), 2);
    }

    #[test]
    fn loads_json_by_extension() {
        let json = r#"{
            "keywords": [{"keyword": "OLED", "tier": 1, "category": "technology", "weight": 8}],
            "patterns": []
        }"#;
        let f = write_tmp(".json", json);
        let r = RuleSet::from_path(f.path()).unwrap();
        assert_eq!(r.version, "unversioned");
        assert!(r.dictionary.lookup("oled").is_some());

        let f = write_tmp(".yaml", json);
        assert!(matches!(
            RuleSet::from_path(f.path()),
            Err(ConfigError::UnsupportedFormat(_))
        ));
    }

    #[test]
    fn invalid_rules_are_rejected_whole() {
        let bad = RULES.replace("medium = 5.0, high = 10.0", "medium = 10.0, high = 5.0");
        assert!(matches!(
            RuleSet::from_toml_str(&bad),
            Err(ConfigError::NonMonotonicThresholds { .. })
        ));
        let bad = RULES.replace("weight = 1.0", "weight = -1.0");
        assert!(matches!(
            RuleSet::from_toml_str(&bad),
            Err(ConfigError::InvalidWeight { .. })
        ));
        assert!(matches!(
            RuleSet::from_toml_str("keywords = 3"),
            Err(ConfigError::Parse(_))
        ));
    }

    #[test]
    fn failed_reload_keeps_current_rules() {
        let handle = RulesHandle::new(RuleSet::from_toml_str(RULES).unwrap());
        let held = handle.current();

        let broken = write_tmp(".toml", &RULES.replace("tier = 3", "tier = 7"));
        assert!(handle.reload_from(broken.path()).is_err());
        assert_eq!(handle.current().version, "test-1");

        let next = write_tmp(".toml", &RULES.replace("test-1", "test-2"));
        let swapped = handle.reload_from(next.path()).unwrap();
        assert_eq!(swapped.version, "test-2");
        assert_eq!(handle.current().version, "test-2");
        // a reader holding the old Arc is unaffected by the swap
        assert_eq!(held.version, "test-1");
    }

    #[test]
    fn missing_file_is_an_io_error() {
        let err = RuleSet::from_path(Path::new("/definitely/not/here/rules.toml")).unwrap_err();
        assert!(matches!(err, ConfigError::Io { .. }));
    }
}
