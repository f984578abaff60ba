use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::{QuotaError, QuotaResult};

/// Which nodes the engine accounts for.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TrackingScope {
    /// Every node below the root is tracked; metadata is created on demand.
    #[default]
    Everywhere,
    /// Only nodes that are quota-aware or sit below a quota-aware node.
    QuotaAwareSubtrees,
}

/// Configuration for the quota engine.
///
/// Loadable from TOML; every field has a default, so an empty file is a
/// valid configuration.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct QuotaConfig {
    /// Which nodes events are processed for.
    pub scope: TrackingScope,
    /// Whether checked-in versions count towards the live document's total.
    pub include_versions: bool,
    /// Maximum number of ancestors one walk may visit before it is treated
    /// as a corrupt tree.
    pub max_walk_depth: usize,
}

impl Default for QuotaConfig {
    fn default() -> Self {
        Self {
            scope: TrackingScope::Everywhere,
            include_versions: false,
            max_walk_depth: 1024,
        }
    }
}

impl QuotaConfig {
    /// Parse and validate a TOML document.
    pub fn from_toml_str(s: &str) -> QuotaResult<Self> {
        let config: Self = toml::from_str(s).map_err(|e| QuotaError::Config(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    /// Read, parse, and validate a TOML file.
    pub fn load(path: impl AsRef<Path>) -> QuotaResult<Self> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path)
            .map_err(|e| QuotaError::Config(format!("{}: {e}", path.display())))?;
        Self::from_toml_str(&text)
    }

    /// Reject configurations the engine cannot run with.
    pub fn validate(&self) -> QuotaResult<()> {
        if self.max_walk_depth == 0 {
            return Err(QuotaError::Config(
                "max_walk_depth must be at least 1".into(),
            ));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config() {
        let c = QuotaConfig::default();
        assert_eq!(c.scope, TrackingScope::Everywhere);
        assert!(!c.include_versions);
        assert_eq!(c.max_walk_depth, 1024);
    }

    #[test]
    fn empty_toml_is_default() {
        assert_eq!(QuotaConfig::from_toml_str("").unwrap(), QuotaConfig::default());
    }

    #[test]
    fn parse_all_fields() {
        let c = QuotaConfig::from_toml_str(
            r#"
            scope = "quota_aware_subtrees"
            include_versions = true
            max_walk_depth = 64
            "#,
        )
        .unwrap();
        assert_eq!(c.scope, TrackingScope::QuotaAwareSubtrees);
        assert!(c.include_versions);
        assert_eq!(c.max_walk_depth, 64);
    }

    #[test]
    fn zero_depth_rejected() {
        let err = QuotaConfig::from_toml_str("max_walk_depth = 0").unwrap_err();
        assert!(matches!(err, QuotaError::Config(_)));
    }

    #[test]
    fn unknown_scope_rejected() {
        assert!(QuotaConfig::from_toml_str(r#"scope = "nowhere""#).is_err());
    }

    #[test]
    fn load_from_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("quota.toml");
        std::fs::write(&path, "include_versions = true\n").unwrap();
        let c = QuotaConfig::load(&path).unwrap();
        assert!(c.include_versions);
    }

    #[test]
    fn load_missing_file_is_config_error() {
        let dir = tempfile::tempdir().unwrap();
        let err = QuotaConfig::load(dir.path().join("missing.toml")).unwrap_err();
        assert!(matches!(err, QuotaError::Config(_)));
    }
}
