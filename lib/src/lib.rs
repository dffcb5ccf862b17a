use parse_display::{Display, FromStr};
use polars::prelude::*;
use std::io::Cursor;
use std::path::Path;

pub mod aggregate;
mod error;
pub mod fetch;
pub mod progress;
pub mod raw;
pub mod view;
pub use aggregate::{build, BuildConfig, BuildReport, GameLogDf, Rejection};
pub use error::Error;
pub use view::Stat;

pub type Result<T> = std::result::Result<T, error::Error>;

/// The game context a source row's on-ice numbers were counted under.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Display, FromStr)]
#[display(style = "lowercase")]
pub enum Situation {
    All,
    Other,
}

pub fn load_csv<P: AsRef<Path>>(path: P) -> Result<DataFrame> {
    let df = CsvReadOptions::default()
        .with_has_header(true)
        .with_infer_schema_length(None)
        .try_into_reader_with_file_path(Some(path.as_ref().to_path_buf()))?
        .finish()?;
    Ok(df)
}

pub fn read_csv_bytes(bytes: &[u8]) -> Result<DataFrame> {
    let df = CsvReadOptions::default()
        .with_has_header(true)
        .with_infer_schema_length(None)
        .into_reader_with_file_handle(Cursor::new(bytes.to_vec()))
        .finish()?;
    Ok(df)
}

pub fn write_csv<P: AsRef<Path>>(df: &mut DataFrame, path: P) -> Result<()> {
    let mut file = std::fs::File::create(path)?;
    CsvWriter::new(&mut file).include_header(true).finish(df)?;
    Ok(())
}
