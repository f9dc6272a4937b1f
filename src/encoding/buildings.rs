/* Read and write building tables as CSV */

use crate::error::LoadError;
use polars::prelude::*;
use std::{
    fs::File,
    io::{Cursor, Write},
    path::Path,
};

// every column is read as text, geometry parsing and attribute typing happen later
fn read_options() -> CsvReadOptions {
    CsvReadOptions::default()
        .with_has_header(true)
        .with_infer_schema_length(Some(0))
}

pub fn read_buildings_csv<P: AsRef<Path>>(path: P) -> Result<DataFrame, LoadError> {
    let path = path.as_ref();
    if !path.is_file() {
        return Err(LoadError::Io {
            path: path.to_path_buf(),
            source: std::io::Error::new(std::io::ErrorKind::NotFound, "building table not found"),
        });
    }

    let df = read_options()
        .try_into_reader_with_file_path(Some(path.to_path_buf()))?
        .finish()?;
    log::info!("Read {} buildings from {:?}", df.height(), path);
    Ok(df)
}

pub fn read_buildings_str(text: &str) -> Result<DataFrame, LoadError> {
    let cursor = Cursor::new(text.as_bytes().to_vec());
    Ok(read_options().into_reader_with_file_handle(cursor).finish()?)
}

pub fn write_csv<W: Write>(df: &mut DataFrame, writer: W) -> PolarsResult<()> {
    CsvWriter::new(writer).include_header(true).finish(df)
}

pub fn write_csv_file<P: AsRef<Path>>(df: &mut DataFrame, path: P) -> Result<(), LoadError> {
    let path = path.as_ref();
    let file = File::create(path).map_err(|source| LoadError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    write_csv(df, file)?;
    log::info!("Wrote {} rows to {:?}", df.height(), path);
    Ok(())
}
