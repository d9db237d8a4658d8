use serde::Deserialize;
use std::path::Path;
use thiserror::Error;

#[derive(Debug, Error, PartialEq, Eq, Clone)]
pub enum ConfigError {
    #[error("Missing required parameter: {0}")]
    MissingParameter(&'static str),
    #[error("Invalid value for '{name}': {reason}")]
    InvalidParameter { name: &'static str, reason: String },
}

#[derive(Debug, Error)]
pub enum ConfigLoadError {
    #[error("File I/O error for '{path}': {source}")]
    Io {
        path: String,
        source: std::io::Error,
    },
    #[error("TOML parsing error for '{path}': {source}")]
    Toml {
        path: String,
        source: toml::de::Error,
    },
    #[error("Invalid configuration in '{path}': {source}")]
    Invalid { path: String, source: ConfigError },
}

/// How the finder enumerates candidate pairs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum FinderMode {
    /// Brute force at or below `brute_force_threshold` particles, trees above.
    #[default]
    Auto,
    Tree,
    BruteForce,
}

/// Construction parameters of a rigid-body sphere tree.
#[derive(Debug, Clone, Copy, PartialEq, Deserialize)]
#[serde(default)]
pub struct TreeParams {
    /// Largest number of particles a leaf node may hold.
    pub max_leaf_size: usize,
    /// Factor (>= 1) applied to every node radius.
    pub expansion: f64,
}

pub const DEFAULT_MAX_LEAF_SIZE: usize = 10;
pub const DEFAULT_EXPANSION: f64 = 1.0;
pub const DEFAULT_BRUTE_FORCE_THRESHOLD: usize = 32;

impl Default for TreeParams {
    fn default() -> Self {
        Self {
            max_leaf_size: DEFAULT_MAX_LEAF_SIZE,
            expansion: DEFAULT_EXPANSION,
        }
    }
}

impl TreeParams {
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.max_leaf_size == 0 {
            return Err(ConfigError::InvalidParameter {
                name: "max_leaf_size",
                reason: "must be at least 1".to_string(),
            });
        }
        if !self.expansion.is_finite() || self.expansion < 1.0 {
            return Err(ConfigError::InvalidParameter {
                name: "expansion",
                reason: format!("must be a finite factor >= 1.0, got {}", self.expansion),
            });
        }
        Ok(())
    }
}

fn default_brute_force_threshold() -> usize {
    DEFAULT_BRUTE_FORCE_THRESHOLD
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct FinderConfig {
    /// Query distance between particle surfaces.
    pub distance: f64,
    /// Extra margin that lets small motions reuse a cached pair list.
    #[serde(default)]
    pub slack: f64,
    #[serde(default)]
    pub mode: FinderMode,
    #[serde(default = "default_brute_force_threshold")]
    pub brute_force_threshold: usize,
    #[serde(default)]
    pub tree: TreeParams,
}

impl FinderConfig {
    /// A configuration with the given query distance and every other value at
    /// its default.
    pub fn with_distance(distance: f64) -> Self {
        Self {
            distance,
            slack: 0.0,
            mode: FinderMode::default(),
            brute_force_threshold: DEFAULT_BRUTE_FORCE_THRESHOLD,
            tree: TreeParams::default(),
        }
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if !self.distance.is_finite() {
            return Err(ConfigError::InvalidParameter {
                name: "distance",
                reason: format!("must be finite, got {}", self.distance),
            });
        }
        if !self.slack.is_finite() || self.slack < 0.0 {
            return Err(ConfigError::InvalidParameter {
                name: "slack",
                reason: format!("must be finite and non-negative, got {}", self.slack),
            });
        }
        self.tree.validate()
    }

    pub fn from_toml_str(content: &str) -> Result<Self, toml::de::Error> {
        toml::from_str(content)
    }

    pub fn load(path: &Path) -> Result<Self, ConfigLoadError> {
        let path_str = path.to_string_lossy().to_string();
        let content = std::fs::read_to_string(path).map_err(|e| ConfigLoadError::Io {
            path: path_str.clone(),
            source: e,
        })?;
        let config = Self::from_toml_str(&content).map_err(|e| ConfigLoadError::Toml {
            path: path_str.clone(),
            source: e,
        })?;
        config.validate().map_err(|e| ConfigLoadError::Invalid {
            path: path_str,
            source: e,
        })?;
        Ok(config)
    }
}

#[derive(Default)]
pub struct FinderConfigBuilder {
    distance: Option<f64>,
    slack: Option<f64>,
    mode: Option<FinderMode>,
    brute_force_threshold: Option<usize>,
    max_leaf_size: Option<usize>,
    expansion: Option<f64>,
}

impl FinderConfigBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn distance(mut self, distance: f64) -> Self {
        self.distance = Some(distance);
        self
    }
    pub fn slack(mut self, slack: f64) -> Self {
        self.slack = Some(slack);
        self
    }
    pub fn mode(mut self, mode: FinderMode) -> Self {
        self.mode = Some(mode);
        self
    }
    pub fn brute_force_threshold(mut self, threshold: usize) -> Self {
        self.brute_force_threshold = Some(threshold);
        self
    }
    pub fn max_leaf_size(mut self, size: usize) -> Self {
        self.max_leaf_size = Some(size);
        self
    }
    pub fn expansion(mut self, factor: f64) -> Self {
        self.expansion = Some(factor);
        self
    }

    pub fn build(self) -> Result<FinderConfig, ConfigError> {
        let config = FinderConfig {
            distance: self
                .distance
                .ok_or(ConfigError::MissingParameter("distance"))?,
            slack: self.slack.unwrap_or(0.0),
            mode: self.mode.unwrap_or_default(),
            brute_force_threshold: self
                .brute_force_threshold
                .unwrap_or(DEFAULT_BRUTE_FORCE_THRESHOLD),
            tree: TreeParams {
                max_leaf_size: self.max_leaf_size.unwrap_or(DEFAULT_MAX_LEAF_SIZE),
                expansion: self.expansion.unwrap_or(DEFAULT_EXPANSION),
            },
        };
        config.validate()?;
        Ok(config)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs::File;
    use std::io::Write;
    use tempfile::tempdir;

    #[test]
    fn builder_requires_distance() {
        assert_eq!(
            FinderConfigBuilder::new().slack(1.0).build(),
            Err(ConfigError::MissingParameter("distance"))
        );
    }

    #[test]
    fn builder_fills_defaults() {
        let config = FinderConfigBuilder::new().distance(2.0).build().unwrap();
        assert_eq!(config, FinderConfig::with_distance(2.0));
        assert_eq!(config.tree.max_leaf_size, 10);
        assert_eq!(config.mode, FinderMode::Auto);
    }

    #[test]
    fn builder_rejects_invalid_values() {
        let err = FinderConfigBuilder::new()
            .distance(1.0)
            .slack(-0.5)
            .build()
            .unwrap_err();
        assert!(matches!(err, ConfigError::InvalidParameter { name: "slack", .. }));

        let err = FinderConfigBuilder::new()
            .distance(1.0)
            .expansion(0.9)
            .build()
            .unwrap_err();
        assert!(matches!(err, ConfigError::InvalidParameter { name: "expansion", .. }));

        let err = FinderConfigBuilder::new()
            .distance(1.0)
            .max_leaf_size(0)
            .build()
            .unwrap_err();
        assert!(matches!(err, ConfigError::InvalidParameter { name: "max_leaf_size", .. }));
    }

    #[test]
    fn non_positive_distance_is_legal() {
        assert!(FinderConfigBuilder::new().distance(0.0).build().is_ok());
        assert!(FinderConfigBuilder::new().distance(-1.0).build().is_ok());
        assert!(FinderConfigBuilder::new().distance(f64::INFINITY).build().is_err());
    }

    #[test]
    fn load_succeeds_with_valid_toml() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("finder.toml");
        let mut file = File::create(&path).unwrap();
        writeln!(
            file,
            r#"
            distance = 2.5
            slack = 0.5
            mode = "brute-force"
            brute_force_threshold = 100

            [tree]
            max_leaf_size = 4
            "#
        )
        .unwrap();

        let config = FinderConfig::load(&path).unwrap();
        assert_eq!(config.distance, 2.5);
        assert_eq!(config.slack, 0.5);
        assert_eq!(config.mode, FinderMode::BruteForce);
        assert_eq!(config.brute_force_threshold, 100);
        assert_eq!(config.tree.max_leaf_size, 4);
        assert_eq!(config.tree.expansion, DEFAULT_EXPANSION);
    }

    #[test]
    fn load_uses_defaults_for_optional_sections() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("finder.toml");
        std::fs::write(&path, "distance = 1.0\n").unwrap();
        let config = FinderConfig::load(&path).unwrap();
        assert_eq!(config, FinderConfig::with_distance(1.0));
    }

    #[test]
    fn load_reports_missing_file() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("missing.toml");
        assert!(matches!(FinderConfig::load(&path), Err(ConfigLoadError::Io { .. })));
    }

    #[test]
    fn load_reports_malformed_toml() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("bad.toml");
        std::fs::write(&path, "distance = \"far\"\n").unwrap();
        assert!(matches!(FinderConfig::load(&path), Err(ConfigLoadError::Toml { .. })));
    }

    #[test]
    fn load_validates_values() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("invalid.toml");
        std::fs::write(&path, "distance = 1.0\nslack = -2.0\n").unwrap();
        assert!(matches!(
            FinderConfig::load(&path),
            Err(ConfigLoadError::Invalid { .. })
        ));
    }
}
