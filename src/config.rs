use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;

/// Strategy selection for a localization call.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MatchMode {
    /// Feature matching first, template-matching fallback on failure.
    #[default]
    Auto,
    /// Feature matching only, pass/fail against the threshold.
    Features,
    /// Template matching on Canny edge maps of both crops.
    Edges,
}

impl std::str::FromStr for MatchMode {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "auto" => Ok(Self::Auto),
            "features" => Ok(Self::Features),
            "edges" => Ok(Self::Edges),
            other => Err(anyhow::anyhow!("unknown match mode '{other}'")),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct MatcherConfig {
    pub feature: FeatureConfig,
    pub template: TemplateConfig,
    pub ransac: RansacConfig,
    pub analyze: AnalyzeConfig,
}

/// Keypoint detection and descriptor matching knobs.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct FeatureConfig {
    pub fast_threshold: u8,
    pub max_keypoints: usize,
    pub patch_size: u32,
    /// Keypoint floor below which a strategy aborts.
    pub min_keypoints: usize,
    /// Keypoint count under which detection is retried on a boosted copy.
    pub boost_keypoint_floor: usize,
    /// Pixel area at or under which inputs always get the boosted retry.
    pub small_image_area: u32,
    /// Nearest/second-nearest distance ratios tried in order.
    pub ratio_ladder: Vec<f64>,
    pub min_good_matches: usize,
}

impl Default for FeatureConfig {
    fn default() -> Self {
        Self {
            fast_threshold: 10,
            max_keypoints: 1500,
            patch_size: 31,
            min_keypoints: 8,
            boost_keypoint_floor: 12,
            small_image_area: 64 * 64,
            ratio_ladder: vec![0.75, 0.80, 0.85, 0.90, 0.95],
            min_good_matches: 8,
        }
    }
}

/// Rotation/scale sweep granularity for the template matcher.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TemplateConfig {
    /// The scale ladder has `scale_steps + 1` values spanning [min, max].
    pub scale_steps: usize,
    pub angle_step_deg: i32,
    pub canny_low: f32,
    pub canny_high: f32,
}

impl Default for TemplateConfig {
    fn default() -> Self {
        Self {
            scale_steps: 5,
            angle_step_deg: 2,
            canny_low: 50.0,
            canny_high: 150.0,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RansacConfig {
    pub max_iterations: usize,
    /// Reprojection inlier threshold in pixels.
    pub inlier_threshold: f64,
    pub min_inliers: usize,
    pub seed: u64,
}

impl Default for RansacConfig {
    fn default() -> Self {
        Self {
            max_iterations: 2000,
            inlier_threshold: 3.0,
            min_inliers: 4,
            seed: 0,
        }
    }
}

/// Per-invocation localization parameters.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AnalyzeConfig {
    pub mode: MatchMode,
    pub score_threshold: i32,
    pub rot_range_deg: i32,
    pub scale_min: f64,
    pub scale_max: f64,
}

impl Default for AnalyzeConfig {
    fn default() -> Self {
        Self {
            mode: MatchMode::Auto,
            score_threshold: 85,
            rot_range_deg: 10,
            scale_min: 0.95,
            scale_max: 1.05,
        }
    }
}

#[derive(Debug, Clone, Copy)]
pub enum ConfigFormat {
    Json,
    Toml,
}

impl MatcherConfig {
    pub fn load_from_file<P: AsRef<Path>>(path: P) -> crate::Result<Self> {
        let content = fs::read_to_string(path)?;

        let config: Self = if content.trim_start().starts_with('{') {
            serde_json::from_str(&content)?
        } else {
            toml::from_str(&content)?
        };
        Ok(config)
    }

    pub fn save_to_file<P: AsRef<Path>>(&self, path: P, format: ConfigFormat) -> crate::Result<()> {
        let content = match format {
            ConfigFormat::Json => serde_json::to_string_pretty(self)?,
            ConfigFormat::Toml => toml::to_string_pretty(self)?,
        };
        fs::write(path, content)?;
        Ok(())
    }

    pub fn validate(&self) -> Result<(), Vec<String>> {
        let mut errors = Vec::new();

        if self.feature.max_keypoints == 0 {
            errors.push("feature.max_keypoints must be positive".to_string());
        }
        if self.feature.patch_size < 5 {
            errors.push("feature.patch_size must be at least 5".to_string());
        }
        if self.feature.ratio_ladder.is_empty() {
            errors.push("feature.ratio_ladder must not be empty".to_string());
        }
        if self.feature.ratio_ladder.iter().any(|r| !(0.0..=1.0).contains(r)) {
            errors.push("feature.ratio_ladder entries must lie in [0, 1]".to_string());
        }
        if self.template.angle_step_deg <= 0 {
            errors.push("template.angle_step_deg must be positive".to_string());
        }
        if self.template.canny_low >= self.template.canny_high {
            errors.push("template.canny_low must be below canny_high".to_string());
        }
        if self.ransac.max_iterations == 0 {
            errors.push("ransac.max_iterations must be positive".to_string());
        }
        if self.ransac.inlier_threshold <= 0.0 {
            errors.push("ransac.inlier_threshold must be positive".to_string());
        }
        if !(0..=100).contains(&self.analyze.score_threshold) {
            errors.push("analyze.score_threshold must lie in [0, 100]".to_string());
        }
        if self.analyze.rot_range_deg < 0 {
            errors.push("analyze.rot_range_deg must be non-negative".to_string());
        }
        if self.analyze.scale_min <= 0.0 || self.analyze.scale_max <= 0.0 {
            errors.push("analyze scale range must be positive".to_string());
        }

        if errors.is_empty() {
            Ok(())
        } else {
            Err(errors)
        }
    }
}

pub fn load_config_or_default(config_path: Option<&Path>) -> MatcherConfig {
    let Some(path) = config_path else {
        return MatcherConfig::default();
    };

    match MatcherConfig::load_from_file(path) {
        Ok(config) => {
            if let Err(errors) = config.validate() {
                for error in &errors {
                    log::warn!("config: {error}");
                }
                log::warn!("config invalid, falling back to defaults");
                MatcherConfig::default()
            } else {
                config
            }
        }
        Err(e) => {
            log::warn!("failed to load config from {}: {e}", path.display());
            MatcherConfig::default()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_valid() {
        assert!(MatcherConfig::default().validate().is_ok());
    }

    #[test]
    fn bad_values_are_reported() {
        let mut config = MatcherConfig::default();
        config.template.angle_step_deg = 0;
        config.analyze.score_threshold = 150;
        let errors = config.validate().unwrap_err();
        assert_eq!(errors.len(), 2);
    }

    #[test]
    fn toml_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("matcher.toml");

        let mut config = MatcherConfig::default();
        config.analyze.rot_range_deg = 15;
        config.ransac.seed = 7;
        config.save_to_file(&path, ConfigFormat::Toml).unwrap();

        let loaded = MatcherConfig::load_from_file(&path).unwrap();
        assert_eq!(loaded.analyze.rot_range_deg, 15);
        assert_eq!(loaded.ransac.seed, 7);
    }

    #[test]
    fn json_is_sniffed_by_leading_brace() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("matcher.json");

        MatcherConfig::default()
            .save_to_file(&path, ConfigFormat::Json)
            .unwrap();
        let loaded = MatcherConfig::load_from_file(&path).unwrap();
        assert_eq!(loaded.analyze.score_threshold, 85);
    }

    #[test]
    fn mode_parses_from_str() {
        assert_eq!("AUTO".parse::<MatchMode>().unwrap(), MatchMode::Auto);
        assert_eq!(" edges ".parse::<MatchMode>().unwrap(), MatchMode::Edges);
        assert!("sift".parse::<MatchMode>().is_err());
    }
}
