/*
Single-band GeoTIFF flood masks.
Only the header is read on open; pixel windows decode the strips or tiles they overlap.
*/

use crate::{
    error::RasterError,
    geom::{
        crs::Crs,
        raster::{FloodRaster, PixelWindow, RasterInfo, RasterSource},
    },
};
use ndarray::Array2;
use std::{
    fs::File,
    io::{BufReader, Read, Seek},
    path::Path,
    sync::Mutex,
};
use tiff::{
    ColorType,
    decoder::{Decoder, DecodingResult, Limits},
    tags::Tag,
};

const GT_RASTER_TYPE: u16 = 1025;
const GEOGRAPHIC_TYPE: u16 = 2048;
const PROJECTED_CS_TYPE: u16 = 3072;
const RASTER_PIXEL_IS_POINT: u16 = 2;

// strip/tile layout of the image, in pixels
#[derive(Debug, Clone, Copy)]
struct ChunkLayout {
    width: usize,
    height: usize,
    across: usize,
}

/// Flood mask read lazily from a GeoTIFF.
///
/// The decoder sits behind a mutex: workers share one file handle and only
/// decode the chunks their window overlaps.
pub struct GeoTiffRaster<R: Read + Seek> {
    info: RasterInfo,
    layout: ChunkLayout,
    decoder: Mutex<Decoder<R>>,
}

impl GeoTiffRaster<BufReader<File>> {
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self, RasterError> {
        let path = path.as_ref();
        let file = File::open(path).map_err(|source| RasterError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        let raster = Self::from_reader(BufReader::new(file))?;
        log::debug!(
            "Opened flood mask {:?}: {} x {} pixels in {}, chunks of {} x {}",
            path,
            raster.info.ncols,
            raster.info.nrows,
            raster.info.crs,
            raster.layout.width,
            raster.layout.height
        );
        Ok(raster)
    }
}

impl<R: Read + Seek> GeoTiffRaster<R> {
    pub fn from_reader(reader: R) -> Result<Self, RasterError> {
        let mut decoder = Decoder::new(reader)?.with_limits(Limits::unlimited());

        match decoder.colortype()? {
            ColorType::Gray(_) => (),
            other => return Err(RasterError::UnsupportedLayout(format!("{other:?}, expected a single band"))),
        }

        let (width, height) = decoder.dimensions()?;
        let info = read_georeference(&mut decoder, width as usize, height as usize)?;

        let (chunk_width, chunk_height) = decoder.chunk_dimensions();
        if chunk_width == 0 || chunk_height == 0 {
            return Err(RasterError::UnsupportedLayout("empty strips or tiles".to_string()));
        }
        let layout = ChunkLayout {
            width: chunk_width as usize,
            height: chunk_height as usize,
            across: info.ncols.div_ceil(chunk_width as usize),
        };

        Ok(Self {
            info,
            layout,
            decoder: Mutex::new(decoder),
        })
    }

    // whole band in memory, for previews
    pub fn load(&self) -> Result<FloodRaster, RasterError> {
        let window = PixelWindow {
            row_start: 0,
            row_end: self.info.nrows,
            col_start: 0,
            col_end: self.info.ncols,
        };
        FloodRaster::new(self.info.clone(), self.decode_window(&window)?)
    }

    fn decode_window(&self, window: &PixelWindow) -> Result<Array2<f64>, RasterError> {
        let mut band = Array2::zeros((window.nrows(), window.ncols()));
        if window.is_empty() {
            return Ok(band);
        }

        let mut decoder = self.decoder.lock().map_err(|_| RasterError::Poisoned)?;
        let layout = self.layout;
        for chunk_row in window.row_start / layout.height..=(window.row_end - 1) / layout.height {
            for chunk_col in window.col_start / layout.width..=(window.col_end - 1) / layout.width {
                let index = (chunk_row * layout.across + chunk_col) as u32;
                let (data_width, data_height) = decoder.chunk_data_dimensions(index);
                let (data_width, data_height) = (data_width as usize, data_height as usize);

                let samples = into_f64(decoder.read_chunk(index)?);
                if samples.len() != data_width * data_height {
                    return Err(RasterError::SampleCount {
                        expected: data_width * data_height,
                        actual: samples.len(),
                    });
                }

                // chunk origin in image pixels
                let (row0, col0) = (chunk_row * layout.height, chunk_col * layout.width);
                let cols = window.col_start.max(col0)..window.col_end.min(col0 + data_width);
                for y in window.row_start.max(row0)..window.row_end.min(row0 + data_height) {
                    for x in cols.clone() {
                        band[[y - window.row_start, x - window.col_start]] = samples[(y - row0) * data_width + (x - col0)];
                    }
                }
            }
        }

        Ok(band)
    }
}

impl<R: Read + Seek + Send> RasterSource for GeoTiffRaster<R> {
    fn info(&self) -> &RasterInfo {
        &self.info
    }

    fn read_window(&self, window: &PixelWindow) -> Result<Array2<f64>, RasterError> {
        if !self.info.contains_window(window) {
            return Err(RasterError::WindowOutOfBounds {
                row_start: window.row_start,
                row_end: window.row_end,
                col_start: window.col_start,
                col_end: window.col_end,
            });
        }
        self.decode_window(window)
    }
}

fn read_georeference<R: Read + Seek>(decoder: &mut Decoder<R>, ncols: usize, nrows: usize) -> Result<RasterInfo, RasterError> {
    let scale = decoder
        .find_tag(Tag::ModelPixelScaleTag)?
        .map(|value| value.into_f64_vec())
        .transpose()?
        .ok_or(RasterError::MissingGeoreference("ModelPixelScale tag is absent"))?;
    let tiepoint = decoder
        .find_tag(Tag::ModelTiepointTag)?
        .map(|value| value.into_f64_vec())
        .transpose()?
        .ok_or(RasterError::MissingGeoreference("ModelTiepoint tag is absent"))?;

    if scale.len() < 2 || tiepoint.len() < 6 {
        return Err(RasterError::MissingGeoreference("malformed pixel scale or tiepoint"));
    }
    let (xres, yres) = (scale[0], scale[1]);
    if !(xres > 0.0 && yres > 0.0) {
        return Err(RasterError::UnsupportedLayout(format!("pixel size {xres} x {yres}")));
    }

    let geokeys = match decoder.find_tag(Tag::GeoKeyDirectoryTag)? {
        Some(value) => value.into_u16_vec()?,
        None => Vec::new(),
    };

    let crs = match geokey(&geokeys, PROJECTED_CS_TYPE).or_else(|| geokey(&geokeys, GEOGRAPHIC_TYPE)) {
        Some(code) => Crs::from_epsg(u32::from(code))?,
        None => {
            log::warn!("Flood mask has no CRS geokey, assuming EPSG:4326");
            Crs::WGS84
        }
    };

    // tiepoint maps raster (i, j) onto model (x, y)
    let mut xmin = tiepoint[3] - tiepoint[0] * xres;
    let mut ymax = tiepoint[4] + tiepoint[1] * yres;
    if geokey(&geokeys, GT_RASTER_TYPE) == Some(RASTER_PIXEL_IS_POINT) {
        xmin -= xres / 2.0;
        ymax += yres / 2.0;
    }

    Ok(RasterInfo::from_origin(xmin, ymax, xres, yres, ncols, nrows, crs))
}

// short values stored inline in the key directory; header is 4 shorts, then 4 per key
fn geokey(directory: &[u16], key: u16) -> Option<u16> {
    directory
        .get(4..)?
        .chunks_exact(4)
        .find(|entry| entry[0] == key && entry[1] == 0)
        .map(|entry| entry[3])
}

fn into_f64(result: DecodingResult) -> Vec<f64> {
    match result {
        DecodingResult::U8(v) => v.into_iter().map(f64::from).collect(),
        DecodingResult::U16(v) => v.into_iter().map(f64::from).collect(),
        DecodingResult::U32(v) => v.into_iter().map(f64::from).collect(),
        DecodingResult::U64(v) => v.into_iter().map(|x| x as f64).collect(),
        DecodingResult::I8(v) => v.into_iter().map(f64::from).collect(),
        DecodingResult::I16(v) => v.into_iter().map(f64::from).collect(),
        DecodingResult::I32(v) => v.into_iter().map(f64::from).collect(),
        DecodingResult::I64(v) => v.into_iter().map(|x| x as f64).collect(),
        DecodingResult::F32(v) => v.into_iter().map(f64::from).collect(),
        DecodingResult::F64(v) => v,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;
    use tiff::encoder::{TiffEncoder, colortype::Gray8};

    fn encode(width: u32, height: u32, data: &[u8], geokeys: Option<&[u16]>, rows_per_strip: Option<u32>) -> Vec<u8> {
        let mut buffer = Cursor::new(Vec::new());
        {
            let mut encoder = TiffEncoder::new(&mut buffer).unwrap();
            let mut image = encoder.new_image::<Gray8>(width, height).unwrap();
            if let Some(rows) = rows_per_strip {
                image.rows_per_strip(rows).unwrap();
            }
            image
                .encoder()
                .write_tag(Tag::ModelPixelScaleTag, &[0.5f64, 0.5, 0.0][..])
                .unwrap();
            image
                .encoder()
                .write_tag(Tag::ModelTiepointTag, &[0.0f64, 0.0, 0.0, 10.0, 20.0, 0.0][..])
                .unwrap();
            if let Some(keys) = geokeys {
                image.encoder().write_tag(Tag::GeoKeyDirectoryTag, keys).unwrap();
            }
            image.write_data(data).unwrap();
        }
        buffer.into_inner()
    }

    fn open(bytes: Vec<u8>) -> Result<GeoTiffRaster<Cursor<Vec<u8>>>, RasterError> {
        GeoTiffRaster::from_reader(Cursor::new(bytes))
    }

    #[test]
    fn decodes_grid_and_samples() {
        let keys = [1u16, 1, 0, 1, GEOGRAPHIC_TYPE, 0, 1, 4326];
        let raster = open(encode(3, 2, &[0, 1, 1, 0, 0, 1], Some(&keys), None)).unwrap();

        let info = raster.info();
        assert_eq!((info.ncols, info.nrows), (3, 2));
        assert_eq!(info.crs, Crs::WGS84);
        assert!((info.xmin - 10.0).abs() < 1e-12);
        assert!((info.xmax - 11.5).abs() < 1e-12);
        assert!((info.ymin - 19.0).abs() < 1e-12);

        let band = raster.load().unwrap();
        assert_eq!(band.band()[[0, 1]], 1.0);
        assert_eq!(band.band()[[1, 0]], 0.0);
    }

    #[test]
    fn windows_decode_only_overlapping_strips() {
        // 4 x 6 pixels in three strips of two rows, value = pixel index
        let data: Vec<u8> = (0..24).collect();
        let raster = open(encode(4, 6, &data, None, Some(2))).unwrap();
        assert_eq!((raster.layout.width, raster.layout.height, raster.layout.across), (4, 2, 1));

        // rows 1..5 straddle all three strips
        let window = PixelWindow {
            row_start: 1,
            row_end: 5,
            col_start: 1,
            col_end: 3,
        };
        let band = raster.read_window(&window).unwrap();
        assert_eq!(band.dim(), (4, 2));
        for y in 0..4 {
            for x in 0..2 {
                assert_eq!(band[[y, x]], ((y + 1) * 4 + x + 1) as f64);
            }
        }

        // inside the last strip only
        let tail = PixelWindow {
            row_start: 5,
            row_end: 6,
            col_start: 3,
            col_end: 4,
        };
        assert_eq!(raster.read_window(&tail).unwrap()[[0, 0]], 23.0);

        // a full read agrees with the windowed ones
        assert_eq!(raster.load().unwrap().band()[[3, 2]], 14.0);
    }

    #[test]
    fn rejects_windows_outside_the_image() {
        let raster = open(encode(2, 2, &[1, 1, 1, 1], None, None)).unwrap();
        let window = PixelWindow {
            row_start: 0,
            row_end: 3,
            col_start: 0,
            col_end: 1,
        };
        assert!(matches!(
            raster.read_window(&window),
            Err(RasterError::WindowOutOfBounds { .. })
        ));
    }

    #[test]
    fn projected_key_wins_over_geographic() {
        let keys = [1u16, 1, 0, 2, GEOGRAPHIC_TYPE, 0, 1, 4326, PROJECTED_CS_TYPE, 0, 1, 32636];
        let raster = open(encode(1, 1, &[1], Some(&keys), None)).unwrap();
        assert_eq!(raster.info().crs, Crs::Epsg(32636));
    }

    #[test]
    fn missing_geokeys_default_to_wgs84() {
        let raster = open(encode(1, 1, &[0], None, None)).unwrap();
        assert_eq!(raster.info().crs, Crs::WGS84);
    }

    #[test]
    fn plain_tiff_is_not_georeferenced() {
        let mut buffer = Cursor::new(Vec::new());
        TiffEncoder::new(&mut buffer)
            .unwrap()
            .write_image::<Gray8>(1, 1, &[1])
            .unwrap();
        let result = open(buffer.into_inner());
        assert!(matches!(result, Err(RasterError::MissingGeoreference(_))));
    }

    #[test]
    fn reads_geokey_entries() {
        let keys = [1u16, 1, 0, 2, GT_RASTER_TYPE, 0, 1, 1, PROJECTED_CS_TYPE, 0, 1, 3857];
        assert_eq!(geokey(&keys, PROJECTED_CS_TYPE), Some(3857));
        assert_eq!(geokey(&keys, GEOGRAPHIC_TYPE), None);
        assert_eq!(geokey(&[], GEOGRAPHIC_TYPE), None);
    }
}
