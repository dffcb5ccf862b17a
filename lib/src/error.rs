use polars::error::PolarsError;
use std::io::Error as IoError;
use std::path::PathBuf;

#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("Polars error: {0}")]
    Polars(#[from] PolarsError),

    #[error("IO error: {0}")]
    Io(#[from] IoError),

    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("empty")]
    EmptyTable,

    #[error("missing columns: {}", .0.join(", "))]
    MissingColumns(Vec<String>),

    #[error("missing both I_F_points and I_F_goals")]
    MissingStatistics,

    #[error("no rows with situation 'all' or 'other'")]
    NoSituation,

    #[error("duplicate player {0}: already read from another table")]
    DuplicatePlayer(String),

    #[error("no usable input: no CSV tables found in {}", .0.display())]
    NoInput(PathBuf),

    #[error("nothing to combine: all {0} source tables were rejected")]
    NothingToCombine(usize),

    #[error("unknown player: {0}")]
    UnknownPlayer(String),

    #[error("no players found in any season summary")]
    NoRoster,
}
