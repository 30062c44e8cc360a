//! Top-level configuration.
//!
//! Every stage config is a plain serde struct with defaults, so a partial
//! JSON file only overrides the fields it names.

use std::path::Path;

use crate::correlate::SearchConfig;
use crate::error::ParameterError;
use crate::occlusion::OcclusionConfig;
use crate::unwrap::UnwrapConfig;

/// Everything needed to turn a frame into a masked polar band.
#[derive(Debug, Clone, Default, PartialEq, serde::Serialize, serde::Deserialize)]
#[serde(default)]
pub struct GeometryConfig {
    pub unwrap: UnwrapConfig,
    pub occlusion: OcclusionConfig,
}

impl GeometryConfig {
    pub fn validate(&self) -> Result<(), ParameterError> {
        self.unwrap.validate()?;
        self.occlusion.validate()
    }

    /// `[n_radius, n_theta]` of every polar image built with this config.
    pub fn polar_shape(&self) -> [usize; 2] {
        [self.unwrap.radius_resolution, self.unwrap.theta_resolution]
    }
}

/// Full configuration of a torsion run.
#[derive(Debug, Clone, PartialEq, serde::Serialize, serde::Deserialize)]
#[serde(default)]
pub struct TorsionConfig {
    pub geometry: GeometryConfig,
    pub search: SearchConfig,
    /// Compute per-frame correlation surfaces on the rayon pool in batch
    /// runs.
    pub parallel: bool,
}

impl Default for TorsionConfig {
    fn default() -> Self {
        Self {
            geometry: GeometryConfig::default(),
            search: SearchConfig::default(),
            parallel: true,
        }
    }
}

impl TorsionConfig {
    /// Check every stage, including the search window against the polar
    /// shape.
    pub fn validate(&self) -> Result<(), ParameterError> {
        self.geometry.validate()?;
        self.search.validate_for(self.geometry.polar_shape())?;
        Ok(())
    }

    /// Load and validate a JSON config file.
    pub fn from_json_file(path: &Path) -> Result<Self, Box<dyn std::error::Error>> {
        let data = std::fs::read_to_string(path)?;
        let config: Self = serde_json::from_str(&data)?;
        config.validate()?;
        Ok(config)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_valid() {
        TorsionConfig::default().validate().unwrap();
    }

    #[test]
    fn partial_json_keeps_defaults() {
        let raw = r#"{ "search": { "max_angle_deg": 10.0 }, "parallel": false }"#;
        let cfg: TorsionConfig = serde_json::from_str(raw).unwrap();
        assert_eq!(cfg.search.max_angle_deg, 10.0);
        assert!(!cfg.parallel);
        assert_eq!(cfg.geometry, GeometryConfig::default());
        assert_eq!(cfg.search.min_coefficient, SearchConfig::DEFAULT_MIN_COEFFICIENT);
    }

    #[test]
    fn search_window_is_checked_against_polar_shape() {
        let mut cfg = TorsionConfig::default();
        cfg.geometry.unwrap.theta_resolution = 36;
        cfg.search.max_angle_deg = 190.0;
        let err = cfg.validate().unwrap_err();
        assert_eq!(err.param, "max_angle_deg");
    }

    #[test]
    fn round_trips_through_json_file() {
        let cfg = TorsionConfig {
            parallel: false,
            ..Default::default()
        };
        let path = std::env::temp_dir().join(format!("ocutorsion-config-{}.json", std::process::id()));
        std::fs::write(&path, serde_json::to_string_pretty(&cfg).unwrap()).unwrap();
        let loaded = TorsionConfig::from_json_file(&path).unwrap();
        let _ = std::fs::remove_file(&path);
        assert_eq!(loaded, cfg);
    }
}
