use crate::{error::Error, progress::Progress, raw::RawGamesDf, Result};
use derive_deref::Deref;
use itertools::Itertools;
use parse_display::Display;
use polars::prelude::*;
use std::collections::HashSet;
use std::fs;
use std::path::{Path, PathBuf};

pub const DEFAULT_INPUT_DIR: &str = "data_gbg";
pub const DEFAULT_OUTPUT: &str = "players_game_by_game.csv";

/// Column order of the combined table.
pub const OUTPUT_COLUMNS: [&str; 12] = [
    "playerId",
    "name",
    "season",
    "gameId",
    "gameDate",
    "I_F_points",
    "I_F_goals",
    "plusMinus",
    "gameNumber",
    "cum_points",
    "cum_goals",
    "cum_plusMinus",
];

#[derive(Debug, Clone)]
pub struct BuildConfig {
    pub input_dir: PathBuf,
    pub output: PathBuf,
}

impl Default for BuildConfig {
    fn default() -> Self {
        Self {
            input_dir: PathBuf::from(DEFAULT_INPUT_DIR),
            output: PathBuf::from(DEFAULT_OUTPUT),
        }
    }
}

/// A source table left out of the combined output, and why.
#[derive(Debug)]
pub struct Rejection {
    pub source: PathBuf,
    pub error: Error,
}

#[derive(Debug)]
pub struct BuildReport {
    pub accepted: Vec<PathBuf>,
    pub rejected: Vec<Rejection>,
    pub rows: usize,
    pub output: PathBuf,
}

/// How one source table fared, as shown next to it in progress output.
#[derive(Debug, Clone, PartialEq, Eq, Display)]
pub enum TableStatus {
    #[display("{0} games")]
    Accepted(usize),
    #[display("rejected: {0}")]
    Rejected(String),
}

/// Per-game frames of accepted tables, plus the rejections, accumulated one
/// source table at a time.
#[derive(Default)]
pub struct Aggregation {
    pub games: Vec<DataFrame>,
    pub accepted: Vec<PathBuf>,
    pub rejected: Vec<Rejection>,
    players: HashSet<String>,
}

impl Aggregation {
    /// Processes one source table. A table whose player was already read from
    /// an earlier table is rejected, so each game is counted once.
    pub fn add(&mut self, source: PathBuf, table: Result<RawGamesDf>) -> TableStatus {
        let players = &self.players;
        let result = table.and_then(RawGamesDf::per_game).and_then(|games| {
            let ids = player_ids(&games)?;
            match ids.iter().find(|id| players.contains(*id)) {
                Some(id) => Err(Error::DuplicatePlayer(id.clone())),
                None => Ok((games, ids)),
            }
        });

        match result {
            Ok((games, ids)) => {
                let count = games.height();
                self.players.extend(ids);
                self.games.push(games);
                self.accepted.push(source);
                TableStatus::Accepted(count)
            }
            Err(error) => {
                log::warn!("rejected {}: {}", source.display(), error);
                let status = TableStatus::Rejected(error.to_string());
                self.rejected.push(Rejection { source, error });
                status
            }
        }
    }

    /// Combines the accepted frames. Fails when every table was rejected.
    pub fn finish(self) -> Result<(GameLogDf, Vec<PathBuf>, Vec<Rejection>)> {
        if self.games.is_empty() {
            return Err(Error::NothingToCombine(self.rejected.len()));
        }
        let game_log = GameLogDf::combine(self.games)?;
        Ok((game_log, self.accepted, self.rejected))
    }
}

fn player_ids(games: &DataFrame) -> Result<Vec<String>> {
    let ids = games
        .column("playerId")?
        .str()?
        .into_iter()
        .flatten()
        .unique()
        .map(String::from)
        .collect();
    Ok(ids)
}

/// The combined game-by-game table: one row per player, season and game.
#[derive(Clone, Deref)]
pub struct GameLogDf(DataFrame);

impl GameLogDf {
    pub fn new(df: DataFrame) -> Self {
        GameLogDf(df)
    }

    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let df = crate::load_csv(path)?;
        Ok(GameLogDf(df))
    }

    /// Concatenates per-game frames, numbers the games of each player-season
    /// by date and adds running totals.
    pub fn combine(games: Vec<DataFrame>) -> Result<Self> {
        log::trace!("aggregate::combine");
        if games.is_empty() {
            return Err(Error::NothingToCombine(0));
        }

        let frames = games.into_iter().map(DataFrame::lazy).collect_vec();
        let df = concat(frames, UnionArgs::default())?
            .sort(
                ["playerId", "season", "gameDate", "gameId"],
                SortMultipleOptions::default()
                    .with_nulls_last(true)
                    .with_maintain_order(true),
            )
            .with_column(lit(1i64).alias("gameNumber"))
            .with_columns([
                running_total(col("gameNumber")),
                running_total(col("I_F_points")).alias("cum_points"),
                running_total(col("I_F_goals")).alias("cum_goals"),
                running_total(col("plusMinus")).alias("cum_plusMinus"),
            ])
            .sort(
                ["name", "season", "gameDate"],
                SortMultipleOptions::default()
                    .with_nulls_last(true)
                    .with_maintain_order(true),
            )
            .select(OUTPUT_COLUMNS.map(col))
            .collect()?;

        log::debug!("{} rows in combined table", df.height());
        Ok(GameLogDf(df))
    }

    pub fn write_csv<P: AsRef<Path>>(&mut self, path: P) -> Result<()> {
        let path = path.as_ref();
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent)?;
        }
        crate::write_csv(&mut self.0, path)
    }
}

/// Running sum within each player-season, in current row order.
fn running_total(expr: Expr) -> Expr {
    expr.cum_sum(false).over([col("playerId"), col("season")])
}

/// Lists the per-player tables in `dir`, in a stable order.
pub fn source_files(dir: &Path) -> Result<Vec<PathBuf>> {
    if !dir.is_dir() {
        return Err(Error::NoInput(dir.to_path_buf()));
    }

    let files = fs::read_dir(dir)?
        .filter_map(|entry| entry.ok())
        .map(|entry| entry.path())
        .filter(|path| path.is_file())
        .filter(|path| {
            path.extension()
                .is_some_and(|ext| ext.eq_ignore_ascii_case("csv"))
        })
        .sorted()
        .collect_vec();

    if files.is_empty() {
        return Err(Error::NoInput(dir.to_path_buf()));
    }
    Ok(files)
}

/// Combines in-memory source tables without touching the filesystem.
pub fn aggregate<I>(tables: I) -> Result<(GameLogDf, Vec<Rejection>)>
where
    I: IntoIterator<Item = (PathBuf, RawGamesDf)>,
{
    let aggregation = tables
        .into_iter()
        .fold(Aggregation::default(), |mut aggregation, (source, table)| {
            aggregation.add(source, Ok(table));
            aggregation
        });

    let (game_log, _, rejected) = aggregation.finish()?;
    Ok((game_log, rejected))
}

/// Reads every table under `config.input_dir`, combines the accepted ones and
/// overwrites `config.output` with the result.
pub fn build(config: &BuildConfig, progress: &mut dyn Progress) -> Result<BuildReport> {
    log::trace!("aggregate::build");
    let files = source_files(&config.input_dir)?;
    log::info!("{} source tables in {}", files.len(), config.input_dir.display());

    progress.begin(files.len());
    let mut aggregation = Aggregation::default();
    for path in files {
        let item = path
            .file_name()
            .map(|name| name.to_string_lossy().into_owned())
            .unwrap_or_else(|| path.display().to_string());
        let table = RawGamesDf::load(&path);
        let status = aggregation.add(path, table);
        progress.item_done(&item, &status.to_string());
    }
    progress.finish();

    let (mut game_log, accepted, rejected) = aggregation.finish()?;
    game_log.write_csv(&config.output)?;

    Ok(BuildReport {
        accepted,
        rejected,
        rows: game_log.height(),
        output: config.output.clone(),
    })
}
