/* Fixture files for end-to-end tests, written under the system temp directory */

use floodmap::prelude::*;
use std::{
    fs::{self, File},
    path::PathBuf,
};
use tiff::{
    encoder::{TiffEncoder, colortype::Gray8},
    tags::Tag,
};

pub struct Fixture {
    pub dir: PathBuf,
}

// north-up grid of square pixels
pub struct Grid {
    pub xmin: f64,
    pub ymax: f64,
    pub res: f64,
    pub width: u32,
    pub height: u32,
    pub epsg: u16,
}

impl Fixture {
    pub fn new(name: &str) -> Self {
        let dir = std::env::temp_dir().join(format!("floodmap_it_{name}"));
        let _ = fs::remove_dir_all(&dir);
        fs::create_dir_all(&dir).unwrap();
        Self { dir }
    }

    pub fn write(&self, file: &str, contents: &str) -> PathBuf {
        let path = self.dir.join(file);
        fs::write(&path, contents).unwrap();
        path
    }

    pub fn write_mask(&self, file: &str, grid: &Grid, data: &[u8]) -> PathBuf {
        assert_eq!(data.len(), (grid.width * grid.height) as usize);
        let key = if grid.epsg == 4326 { 2048u16 } else { 3072u16 };
        let geokeys = [1u16, 1, 0, 1, key, 0, 1, grid.epsg];

        let path = self.dir.join(file);
        let mut encoder = TiffEncoder::new(File::create(&path).unwrap()).unwrap();
        let mut image = encoder.new_image::<Gray8>(grid.width, grid.height).unwrap();
        image
            .encoder()
            .write_tag(Tag::ModelPixelScaleTag, &[grid.res, grid.res, 0.0][..])
            .unwrap();
        image
            .encoder()
            .write_tag(Tag::ModelTiepointTag, &[0.0, 0.0, 0.0, grid.xmin, grid.ymax, 0.0][..])
            .unwrap();
        image.encoder().write_tag(Tag::GeoKeyDirectoryTag, &geokeys[..]).unwrap();
        image.write_data(data).unwrap();
        path
    }

    // square region boundary in EPSG:4326
    pub fn write_boundary(&self, xmin: f64, ymin: f64, xmax: f64, ymax: f64) -> PathBuf {
        let geojson = format!(
            r#"{{"type": "FeatureCollection", "features": [{{"type": "Feature", "properties": {{"name": "region"}},
                "geometry": {{"type": "Polygon", "coordinates": [[[{xmin}, {ymin}], [{xmax}, {ymin}], [{xmax}, {ymax}], [{xmin}, {ymax}], [{xmin}, {ymin}]]]}}}}]}}"#
        );
        self.write("boundary.geojson", &geojson)
    }

    pub fn config(&self, buildings: PathBuf, boundary: PathBuf, masks: &[(&str, PathBuf)]) -> PipelineConfig {
        PipelineConfig {
            buildings,
            boundary,
            classifier: ClassifierOptions {
                workers: 2,
                ..ClassifierOptions::default()
            },
            policies: Policies::default(),
            flood_mask: masks
                .iter()
                .map(|(date, path)| FloodMask {
                    date: date.to_string(),
                    path: path.clone(),
                })
                .collect(),
        }
    }
}

pub fn ids(table: &BuildingTable) -> Vec<String> {
    table
        .attributes()
        .column("id")
        .unwrap()
        .as_materialized_series()
        .str()
        .unwrap()
        .into_iter()
        .flatten()
        .map(str::to_string)
        .collect()
}
