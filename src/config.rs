// File: src/config.rs
use crate::error::ConfigError;
use log::info;
use serde_json::Value;
use std::collections::BTreeSet;
use std::fs;
use std::path::Path;

/// One independently togglable group of feature-generation rules. The
/// `SourceTarget*` group mirrors the plain families but prefixes every key
/// with the source-side surface string, simulating a per-source-phrase
/// classifier inside one global model.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum FeatureFamily {
    Context,
    SourceInternal,
    SourceIndicator,
    TargetInternal,
    TargetIndicator,
    BagOfWords,
    Paired,
    Scores,
    MostFrequent,
    SourceTopic,
    SyntaxParent,
    SyntaxChildren,
    SourceTargetContext,
    SourceTargetInternal,
    SourceTargetBagOfWords,
    SourceTargetPaired,
    SourceTargetSyntax,
    SourceTargetMostFrequent,
    SourceTargetScore,
}

/// Canonical and legacy global key names. The legacy names come from the
/// historical flat-flag schema and map one to one onto the family tags.
fn family_for_key(key: &str) -> Option<FeatureFamily> {
    use FeatureFamily::*;
    Some(match key {
        "context" | "source-external" => Context,
        "source-internal" => SourceInternal,
        "source-indicator" | "indicator" => SourceIndicator,
        "target-internal" => TargetInternal,
        "target-indicator" => TargetIndicator,
        "bag-of-words" => BagOfWords,
        "paired" => Paired,
        "scores" | "score" => Scores,
        "most-frequent" => MostFrequent,
        "source-topic" => SourceTopic,
        "syntax-parent" => SyntaxParent,
        "syntax-children" => SyntaxChildren,
        "source-target-indicator-context" => SourceTargetContext,
        "source-target-indicator-internal" => SourceTargetInternal,
        "source-target-indicator-bag-of-words" => SourceTargetBagOfWords,
        "source-target-indicator-paired" => SourceTargetPaired,
        "source-target-indicator-syntax" => SourceTargetSyntax,
        "source-target-indicator-most-frequent" => SourceTargetMostFrequent,
        "source-target-indicator-score" => SourceTargetScore,
        _ => return None,
    })
}

/// The legacy local-model grouping: bare family keys select the
/// source-prefixed variants.
fn local_family_for_key(key: &str) -> Option<FeatureFamily> {
    use FeatureFamily::*;
    Some(match key {
        "context" => SourceTargetContext,
        "internal" => SourceTargetInternal,
        "bag-of-words" => SourceTargetBagOfWords,
        "paired" => SourceTargetPaired,
        "syntax" => SourceTargetSyntax,
        "most-frequent" => SourceTargetMostFrequent,
        "scores" | "score" => SourceTargetScore,
        _ => return None,
    })
}

#[derive(Debug, Clone, Copy)]
enum Schema {
    Global,
    Local,
}

/// Read-only snapshot of the enabled feature families and their parameters.
/// Built once per run and shared by every extractor instance. The default
/// value is the explicit unloaded state: no family enabled, window size 0.
#[derive(Debug, Clone, Default)]
pub struct ExtractorConfig {
    families: BTreeSet<FeatureFamily>,
    window_size: usize,
    factors: Vec<usize>,
    score_indexes: Vec<usize>,
    score_bins: Vec<f64>,
    binned_scores: bool,
    loaded: bool,
}

impl ExtractorConfig {
    /// Loads the global schema from a flat key/value JSON file.
    /// All-or-nothing: any malformed value, unknown key, missing required
    /// parameter, or non-ascending bin list fails the whole load.
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let text = read_config(path.as_ref())?;
        Self::load_str(&text)
    }

    /// Loads the legacy local-model flag grouping. Same contract as `load`,
    /// different key mapping.
    pub fn load_local<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let text = read_config(path.as_ref())?;
        Self::load_local_str(&text)
    }

    pub fn load_str(text: &str) -> Result<Self, ConfigError> {
        Self::parse(text, Schema::Global)
    }

    pub fn load_local_str(text: &str) -> Result<Self, ConfigError> {
        Self::parse(text, Schema::Local)
    }

    fn parse(text: &str, schema: Schema) -> Result<Self, ConfigError> {
        let root: Value = serde_json::from_str(text)?;
        let map = root.as_object().ok_or(ConfigError::NotAnObject)?;

        let mut cfg = Self::default();
        for (key, value) in map {
            match key.as_str() {
                "window-size" => cfg.window_size = as_usize(key, value)?,
                "factors" => cfg.factors = as_usize_list(key, value)?,
                "score-indexes" => cfg.score_indexes = as_usize_list(key, value)?,
                "score-bins" => cfg.score_bins = as_f64_list(key, value)?,
                "binned-scores" => cfg.binned_scores = as_bool(key, value)?,
                other => {
                    let family = match schema {
                        Schema::Global => family_for_key(other),
                        Schema::Local => local_family_for_key(other),
                    }
                    .ok_or_else(|| ConfigError::UnknownKey(other.to_string()))?;
                    if as_bool(key, value)? {
                        cfg.families.insert(family);
                    }
                }
            }
        }

        if !map.contains_key("window-size") {
            return Err(ConfigError::MissingParameter("window-size"));
        }
        if !map.contains_key("factors") {
            return Err(ConfigError::MissingParameter("factors"));
        }
        let scores_on = cfg.families.contains(&FeatureFamily::Scores)
            || cfg.families.contains(&FeatureFamily::SourceTargetScore);
        if scores_on && cfg.score_indexes.is_empty() {
            return Err(ConfigError::MissingParameter("score-indexes"));
        }
        if cfg.binned_scores && cfg.score_bins.is_empty() {
            return Err(ConfigError::MissingParameter("score-bins"));
        }
        if !cfg.score_bins.windows(2).all(|pair| pair[0] < pair[1]) {
            return Err(ConfigError::BinsNotAscending);
        }

        cfg.loaded = true;
        info!(
            "extractor config loaded: {} families, window {}",
            cfg.families.len(),
            cfg.window_size
        );
        Ok(cfg)
    }

    pub fn is_enabled(&self, family: FeatureFamily) -> bool {
        self.families.contains(&family)
    }

    pub fn families(&self) -> &BTreeSet<FeatureFamily> {
        &self.families
    }

    pub fn window_size(&self) -> usize {
        self.window_size
    }

    pub fn factors(&self) -> &[usize] {
        &self.factors
    }

    pub fn score_indexes(&self) -> &[usize] {
        &self.score_indexes
    }

    /// Ascending bin boundaries for score quantization.
    pub fn score_bins(&self) -> &[f64] {
        &self.score_bins
    }

    pub fn binned_scores(&self) -> bool {
        self.binned_scores
    }

    pub fn is_loaded(&self) -> bool {
        self.loaded
    }
}

fn read_config(path: &Path) -> Result<String, ConfigError> {
    fs::read_to_string(path).map_err(|source| ConfigError::Io {
        path: path.to_path_buf(),
        source,
    })
}

fn as_bool(key: &str, value: &Value) -> Result<bool, ConfigError> {
    value
        .as_bool()
        .ok_or_else(|| ConfigError::InvalidValue(key.to_string()))
}

fn as_usize(key: &str, value: &Value) -> Result<usize, ConfigError> {
    value
        .as_u64()
        .map(|n| n as usize)
        .ok_or_else(|| ConfigError::InvalidValue(key.to_string()))
}

fn as_usize_list(key: &str, value: &Value) -> Result<Vec<usize>, ConfigError> {
    let items = value
        .as_array()
        .ok_or_else(|| ConfigError::InvalidValue(key.to_string()))?;
    items.iter().map(|v| as_usize(key, v)).collect()
}

fn as_f64_list(key: &str, value: &Value) -> Result<Vec<f64>, ConfigError> {
    let items = value
        .as_array()
        .ok_or_else(|| ConfigError::InvalidValue(key.to_string()))?;
    items
        .iter()
        .map(|v| {
            v.as_f64()
                .ok_or_else(|| ConfigError::InvalidValue(key.to_string()))
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    const FULL: &str = r#"{
        "context": true,
        "source-internal": true,
        "source-indicator": true,
        "bag-of-words": true,
        "paired": true,
        "scores": true,
        "binned-scores": true,
        "window-size": 2,
        "factors": [0, 1],
        "score-indexes": [2],
        "score-bins": [0.2, 0.5, 0.8]
    }"#;

    #[test]
    fn full_config_loads() {
        let cfg = ExtractorConfig::load_str(FULL).unwrap();
        assert!(cfg.is_loaded());
        assert!(cfg.is_enabled(FeatureFamily::Context));
        assert!(cfg.is_enabled(FeatureFamily::Paired));
        assert!(!cfg.is_enabled(FeatureFamily::SourceTopic));
        assert_eq!(cfg.window_size(), 2);
        assert_eq!(cfg.factors(), &[0, 1]);
        assert_eq!(cfg.score_indexes(), &[2]);
        assert!(cfg.binned_scores());
    }

    #[test]
    fn default_state_is_fully_disabled() {
        let cfg = ExtractorConfig::default();
        assert!(!cfg.is_loaded());
        assert!(cfg.families().is_empty());
        assert_eq!(cfg.window_size(), 0);
        assert!(cfg.factors().is_empty());
        assert!(cfg.score_bins().is_empty());
    }

    #[rstest]
    #[case("source-external", FeatureFamily::Context)]
    #[case("indicator", FeatureFamily::SourceIndicator)]
    #[case("score", FeatureFamily::Scores)]
    #[case("source-target-indicator-paired", FeatureFamily::SourceTargetPaired)]
    fn legacy_global_names_map_onto_family_tags(
        #[case] key: &str,
        #[case] family: FeatureFamily,
    ) {
        let text = format!(r#"{{"{key}": true, "window-size": 1, "factors": [0], "score-indexes": [2]}}"#);
        let cfg = ExtractorConfig::load_str(&text).unwrap();
        assert!(cfg.is_enabled(family));
    }

    #[rstest]
    #[case("context", FeatureFamily::SourceTargetContext)]
    #[case("internal", FeatureFamily::SourceTargetInternal)]
    #[case("paired", FeatureFamily::SourceTargetPaired)]
    #[case("syntax", FeatureFamily::SourceTargetSyntax)]
    fn local_schema_selects_source_prefixed_families(
        #[case] key: &str,
        #[case] family: FeatureFamily,
    ) {
        let text = format!(r#"{{"{key}": true, "window-size": 1, "factors": [0]}}"#);
        let cfg = ExtractorConfig::load_local_str(&text).unwrap();
        assert!(cfg.is_enabled(family));
        assert!(!cfg.is_enabled(FeatureFamily::Context));
    }

    #[test]
    fn unknown_key_fails_the_whole_load() {
        let text = r#"{"context": true, "chunky-bacon": true, "window-size": 1, "factors": [0]}"#;
        assert!(matches!(
            ExtractorConfig::load_str(text),
            Err(ConfigError::UnknownKey(_))
        ));
    }

    #[test]
    fn non_ascending_bins_are_rejected() {
        let text = r#"{"window-size": 1, "factors": [0], "score-bins": [0.5, 0.2]}"#;
        assert!(matches!(
            ExtractorConfig::load_str(text),
            Err(ConfigError::BinsNotAscending)
        ));
    }

    #[test]
    fn equal_bins_are_rejected() {
        let text = r#"{"window-size": 1, "factors": [0], "score-bins": [0.2, 0.2]}"#;
        assert!(matches!(
            ExtractorConfig::load_str(text),
            Err(ConfigError::BinsNotAscending)
        ));
    }

    #[rstest]
    #[case(r#"{"factors": [0]}"#, "window-size")]
    #[case(r#"{"window-size": 1}"#, "factors")]
    #[case(r#"{"scores": true, "window-size": 1, "factors": [0]}"#, "score-indexes")]
    #[case(
        r#"{"binned-scores": true, "window-size": 1, "factors": [0]}"#,
        "score-bins"
    )]
    fn missing_required_parameters_are_reported(#[case] text: &str, #[case] param: &str) {
        match ExtractorConfig::load_str(text) {
            Err(ConfigError::MissingParameter(p)) => assert_eq!(p, param),
            other => panic!("expected missing `{param}`, got {other:?}"),
        }
    }

    #[test]
    fn wrong_value_types_are_rejected() {
        let text = r#"{"context": "yes", "window-size": 1, "factors": [0]}"#;
        assert!(matches!(
            ExtractorConfig::load_str(text),
            Err(ConfigError::InvalidValue(_))
        ));
        let text = r#"{"window-size": -3, "factors": [0]}"#;
        assert!(ExtractorConfig::load_str(text).is_err());
    }

    #[test]
    fn non_object_root_is_rejected() {
        assert!(matches!(
            ExtractorConfig::load_str("[1, 2]"),
            Err(ConfigError::NotAnObject)
        ));
        assert!(matches!(
            ExtractorConfig::load_str("not json at all"),
            Err(ConfigError::Parse(_))
        ));
    }
}
