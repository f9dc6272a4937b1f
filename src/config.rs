/* Pipeline configuration loaded from TOML */

use crate::{
    error::ConfigError,
    geom::parse_geometry::InvalidWktPolicy,
    pipeline::{aggregate::FloodMask, classify::ClassifierOptions, filter::BoundaryMatches},
};
use serde::Deserialize;
use std::{
    collections::HashSet,
    fs,
    path::{Path, PathBuf},
};

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct Policies {
    pub invalid_wkt: InvalidWktPolicy,
    pub boundary_matches: BoundaryMatches,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct PipelineConfig {
    pub buildings: PathBuf,
    pub boundary: PathBuf,
    #[serde(default)]
    pub classifier: ClassifierOptions,
    #[serde(default)]
    pub policies: Policies,
    /// Flood masks in the order their dates should appear in the trend.
    #[serde(default)]
    pub flood_mask: Vec<FloodMask>,
}

impl PipelineConfig {
    pub fn from_toml_str(content: &str) -> Result<Self, ConfigError> {
        let config: PipelineConfig = toml::from_str(content)?;
        config.validate()?;
        Ok(config)
    }

    // relative paths are taken from the directory holding the config file
    pub fn load_from_file(path: &Path) -> Result<Self, ConfigError> {
        let content = fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        let config = Self::from_toml_str(&content)?;

        let base = path.parent().unwrap_or_else(|| Path::new(""));
        Ok(config.resolve_paths(base))
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.classifier.chunk_size == 0 {
            return Err(ConfigError::ZeroChunkSize);
        }

        let mut seen = HashSet::new();
        for mask in &self.flood_mask {
            if !seen.insert(mask.date.as_str()) {
                return Err(ConfigError::DuplicateDate(mask.date.clone()));
            }
        }
        Ok(())
    }

    pub fn resolve_paths(mut self, base: &Path) -> Self {
        let resolve = |path: PathBuf| if path.is_relative() { base.join(path) } else { path };
        self.buildings = resolve(self.buildings);
        self.boundary = resolve(self.boundary);
        for mask in &mut self.flood_mask {
            mask.path = resolve(std::mem::take(&mut mask.path));
        }
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pipeline::classify::DEFAULT_CHUNK_SIZE;

    const FULL: &str = r#"
        buildings = "data/buildings.csv"
        boundary = "/srv/region/Khartoum.geojson"

        [classifier]
        chunk_size = 1000
        all_touched = true
        workers = 1

        [policies]
        invalid_wkt = "drop"
        boundary_matches = "per-polygon"

        [[flood_mask]]
        date = "2020-09-05"
        path = "masks/2020-09-05.tif"

        [[flood_mask]]
        date = "2020-08-30"
        path = "masks/2020-08-30.tif"
    "#;

    #[test]
    fn parses_all_sections() {
        let config = PipelineConfig::from_toml_str(FULL).unwrap();
        assert_eq!(config.classifier.chunk_size, 1000);
        assert!(config.classifier.all_touched);
        assert_eq!(config.classifier.nodata, 0.0);
        assert_eq!(config.policies.invalid_wkt, InvalidWktPolicy::Drop);
        assert_eq!(config.policies.boundary_matches, BoundaryMatches::PerPolygon);
        let dates: Vec<_> = config.flood_mask.iter().map(|mask| mask.date.as_str()).collect();
        assert_eq!(dates, ["2020-09-05", "2020-08-30"]);
    }

    #[test]
    fn defaults_apply_to_missing_sections() {
        let config = PipelineConfig::from_toml_str("buildings = \"b.csv\"\nboundary = \"r.geojson\"\n").unwrap();
        assert_eq!(config.classifier.chunk_size, DEFAULT_CHUNK_SIZE);
        assert_eq!(config.classifier.workers, 0);
        assert_eq!(config.policies, Policies::default());
        assert_eq!(config.policies.invalid_wkt, InvalidWktPolicy::Fail);
        assert_eq!(config.policies.boundary_matches, BoundaryMatches::Once);
        assert!(config.flood_mask.is_empty());
    }

    #[test]
    fn rejects_invalid_values() {
        let zero = "buildings = \"b.csv\"\nboundary = \"r.geojson\"\n[classifier]\nchunk_size = 0\n";
        assert!(matches!(PipelineConfig::from_toml_str(zero), Err(ConfigError::ZeroChunkSize)));

        let duplicate = "buildings = \"b.csv\"\nboundary = \"r.geojson\"\n\
                         [[flood_mask]]\ndate = \"2020-08-30\"\npath = \"a.tif\"\n\
                         [[flood_mask]]\ndate = \"2020-08-30\"\npath = \"b.tif\"\n";
        assert!(matches!(
            PipelineConfig::from_toml_str(duplicate),
            Err(ConfigError::DuplicateDate(date)) if date == "2020-08-30"
        ));

        let unknown = "buildings = \"b.csv\"\nboundary = \"r.geojson\"\n[policies]\ninvalid_wkt = \"ignore\"\n";
        assert!(matches!(PipelineConfig::from_toml_str(unknown), Err(ConfigError::Parse(_))));
    }

    #[test]
    fn resolves_relative_paths_against_the_config_directory() {
        let dir = std::env::temp_dir().join("floodmap_config");
        fs::create_dir_all(&dir).unwrap();
        let path = dir.join("floodmap.toml");
        fs::write(&path, FULL).unwrap();

        let config = PipelineConfig::load_from_file(&path).unwrap();
        assert_eq!(config.buildings, dir.join("data/buildings.csv"));
        assert_eq!(config.boundary, PathBuf::from("/srv/region/Khartoum.geojson"));
        assert_eq!(config.flood_mask[1].path, dir.join("masks/2020-08-30.tif"));
    }

    #[test]
    fn missing_file_is_an_io_error() {
        let path = std::env::temp_dir().join("floodmap_no_such_config.toml");
        assert!(matches!(PipelineConfig::load_from_file(&path), Err(ConfigError::Io { .. })));
    }
}
