use crate::{error::Error, Result, Situation};
use derive_deref::Deref;
use polars::{prelude::*, sql::SQLContext};
use std::path::Path;

/// Columns every source table must carry to be usable at all.
pub const IDENTITY_COLUMNS: [&str; 6] =
    ["playerId", "name", "season", "gameId", "gameDate", "situation"];

/// Per-game counting statistics. At least one must be present.
pub const STAT_COLUMNS: [&str; 2] = ["I_F_points", "I_F_goals"];

const ON_ICE_COLUMNS: [&str; 2] = ["OnIce_F_goals", "OnIce_A_goals"];

pub const GAME_DATE_FORMAT: &str = "%Y%m%d";

pub(crate) static PER_GAME_QUERY: &str = r#"
    SELECT
        "playerId",
        FIRST("name") AS "name",
        "season",
        "gameId",
        "gameDate",
        SUM("I_F_points") AS "I_F_points",
        SUM("I_F_goals") AS "I_F_goals",
        SUM("plusMinus") AS "plusMinus"
    FROM games
    GROUP BY "playerId", "season", "gameId", "gameDate"
"#;

/// One player's game-by-game table as downloaded: several rows per game,
/// one for each situation.
#[derive(Clone, Deref)]
pub struct RawGamesDf(DataFrame);

impl RawGamesDf {
    pub fn new(df: DataFrame) -> Self {
        RawGamesDf(df)
    }

    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        // polars refuses zero-byte files outright; report those as empty too
        if std::fs::metadata(path)?.len() == 0 {
            return Err(Error::EmptyTable);
        }
        let df = crate::load_csv(path)?;
        Ok(RawGamesDf(df))
    }

    fn has_column(&self, name: &str) -> bool {
        self.get_column_names().contains(&name)
    }

    pub fn validate(&self) -> Result<()> {
        if self.height() == 0 {
            return Err(Error::EmptyTable);
        }

        let missing: Vec<String> = IDENTITY_COLUMNS
            .into_iter()
            .filter(|name| !self.has_column(name))
            .map(String::from)
            .collect();
        if !missing.is_empty() {
            return Err(Error::MissingColumns(missing));
        }

        if !STAT_COLUMNS.into_iter().any(|name| self.has_column(name)) {
            return Err(Error::MissingStatistics);
        }
        Ok(())
    }

    /// Picks the one situation subset used for the whole table: "all" when
    /// any row carries it, otherwise "other".
    pub fn situation(&self) -> Result<Situation> {
        let situations = self.column("situation")?.cast(&DataType::String)?;
        let labels = situations.str()?;
        let present = |situation: Situation| {
            let label = situation.to_string();
            labels.into_iter().any(|value| value == Some(label.as_str()))
        };

        if present(Situation::All) {
            Ok(Situation::All)
        } else if present(Situation::Other) {
            Ok(Situation::Other)
        } else {
            Err(Error::NoSituation)
        }
    }

    fn plus_minus(&self) -> Expr {
        if ON_ICE_COLUMNS.into_iter().all(|name| self.has_column(name)) {
            col("OnIce_F_goals").cast(DataType::Float64)
                - col("OnIce_A_goals").cast(DataType::Float64)
        } else {
            log::debug!("no on-ice goal columns, plusMinus defaults to 0");
            lit(0.0)
        }
    }

    fn stat(&self, name: &str) -> Expr {
        if self.has_column(name) {
            col(name).cast(DataType::Float64)
        } else {
            lit(0.0)
        }
    }

    /// Collapses the table to one row per game for the chosen situation,
    /// with `plusMinus` derived and the statistics summed per game.
    pub fn per_game(self) -> Result<DataFrame> {
        log::trace!("raw::per_game");
        self.validate()?;
        let situation = self.situation()?;
        log::info!("using situation '{}' ({} source rows)", situation, self.height());

        let columns = [
            col("playerId").cast(DataType::String),
            col("name").cast(DataType::String),
            col("season").cast(DataType::Int64),
            col("gameId").cast(DataType::String),
            parse_game_date(col("gameDate")).alias("gameDate"),
            self.stat("I_F_points").alias("I_F_points"),
            self.stat("I_F_goals").alias("I_F_goals"),
            self.plus_minus().alias("plusMinus"),
        ];
        let selected = self
            .0
            .lazy()
            .filter(col("situation").cast(DataType::String).eq(lit(situation.to_string())))
            .select(columns);

        let mut ctx = SQLContext::new();
        ctx.register("games", selected);
        let df = ctx.execute(PER_GAME_QUERY)?.collect()?;
        log::debug!("{} games after collapsing situation rows", df.height());
        Ok(df)
    }
}

/// `YYYYMMDD` to a calendar date; anything else becomes null.
pub fn parse_game_date(expr: Expr) -> Expr {
    expr.cast(DataType::String).str().to_date(StrptimeOptions {
        format: Some(GAME_DATE_FORMAT.into()),
        strict: false,
        ..Default::default()
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sorted(df: DataFrame) -> DataFrame {
        df.lazy()
            .sort(["gameId"], SortMultipleOptions::default())
            .collect()
            .unwrap()
    }

    fn f64_values(df: &DataFrame, name: &str) -> Vec<Option<f64>> {
        df.column(name).unwrap().f64().unwrap().into_iter().collect()
    }

    #[test]
    fn prefers_all_situation_and_drops_other_rows() {
        let df = df!(
            "playerId" => [8478402i64, 8478402, 8478402],
            "name" => ["Connor McDavid", "Connor McDavid", "Connor McDavid"],
            "season" => [2023i64, 2023, 2023],
            "gameId" => [20001i64, 20001, 20002],
            "gameDate" => [20231010i64, 20231010, 20231012],
            "situation" => ["all", "other", "all"],
            "I_F_points" => [1.0, 5.0, 2.0],
            "I_F_goals" => [0.0, 3.0, 1.0],
            "OnIce_F_goals" => [2.0, 4.0, 1.0],
            "OnIce_A_goals" => [1.0, 0.0, 3.0],
        )
        .unwrap();

        let raw = RawGamesDf::new(df);
        assert_eq!(raw.situation().unwrap(), Situation::All);

        let games = sorted(raw.per_game().unwrap());
        assert_eq!(games.height(), 2);
        assert_eq!(f64_values(&games, "I_F_points"), [Some(1.0), Some(2.0)]);
        assert_eq!(f64_values(&games, "I_F_goals"), [Some(0.0), Some(1.0)]);
        assert_eq!(f64_values(&games, "plusMinus"), [Some(1.0), Some(-2.0)]);
    }

    #[test]
    fn falls_back_to_other_situation() {
        let df = df!(
            "playerId" => [1i64, 1],
            "name" => ["A", "A"],
            "season" => [2022i64, 2022],
            "gameId" => [1i64, 1],
            "gameDate" => [20221010i64, 20221010],
            "situation" => ["5on4", "other"],
            "I_F_points" => [3.0, 1.0],
        )
        .unwrap();

        let raw = RawGamesDf::new(df);
        assert_eq!(raw.situation().unwrap(), Situation::Other);
        let games = raw.per_game().unwrap();
        assert_eq!(f64_values(&games, "I_F_points"), [Some(1.0)]);
        // I_F_goals absent: filled with zeros
        assert_eq!(f64_values(&games, "I_F_goals"), [Some(0.0)]);
    }

    #[test]
    fn sums_split_rows_of_the_same_game() {
        let df = df!(
            "playerId" => [1i64, 1, 1],
            "name" => ["A", "A", "A"],
            "season" => [2023i64, 2023, 2023],
            "gameId" => [7i64, 7, 8],
            "gameDate" => [20230101i64, 20230101, 20230103],
            "situation" => ["all", "all", "all"],
            "I_F_points" => [1.0, 1.0, 0.0],
            "I_F_goals" => [1.0, 0.0, 0.0],
            "OnIce_F_goals" => [1.0, 1.0, 0.0],
            "OnIce_A_goals" => [0.0, 0.0, 2.0],
        )
        .unwrap();

        let games = sorted(RawGamesDf::new(df).per_game().unwrap());
        assert_eq!(games.height(), 2);
        assert_eq!(f64_values(&games, "I_F_points"), [Some(2.0), Some(0.0)]);
        assert_eq!(f64_values(&games, "plusMinus"), [Some(2.0), Some(-2.0)]);
    }

    #[test]
    fn name_variants_within_a_game_stay_one_row() {
        let df = df!(
            "playerId" => [1i64, 1, 1],
            "name" => ["A", "A.", "A"],
            "season" => [2023i64, 2023, 2023],
            "gameId" => [1i64, 1, 2],
            "gameDate" => [20230101i64, 20230101, 20230103],
            "situation" => ["all", "all", "all"],
            "I_F_points" => [1.0, 1.0, 2.0],
        )
        .unwrap();

        let games = sorted(RawGamesDf::new(df).per_game().unwrap());
        assert_eq!(games.height(), 2);
        assert_eq!(f64_values(&games, "I_F_points"), [Some(2.0), Some(2.0)]);
        let names = games.column("name").unwrap();
        assert!(names.str().unwrap().into_iter().all(|name| name.is_some()));
    }

    #[test]
    fn missing_on_ice_columns_zero_plus_minus() {
        let df = df!(
            "playerId" => [1i64, 1],
            "name" => ["A", "A"],
            "season" => [2023i64, 2023],
            "gameId" => [1i64, 2],
            "gameDate" => [20230101i64, 20230102],
            "situation" => ["all", "all"],
            "I_F_points" => [1.0, 2.0],
            "I_F_goals" => [1.0, 0.0],
        )
        .unwrap();

        let games = RawGamesDf::new(df).per_game().unwrap();
        assert_eq!(f64_values(&games, "plusMinus"), [Some(0.0), Some(0.0)]);
    }

    #[test]
    fn unparseable_date_is_kept_as_null() {
        let df = df!(
            "playerId" => [1i64, 1],
            "name" => ["A", "A"],
            "season" => [2023i64, 2023],
            "gameId" => [1i64, 2],
            "gameDate" => ["20230101", "not-a-date"],
            "situation" => ["all", "all"],
            "I_F_points" => [1.0, 2.0],
        )
        .unwrap();

        let games = sorted(RawGamesDf::new(df).per_game().unwrap());
        assert_eq!(games.height(), 2);
        let dates = games.column("gameDate").unwrap();
        assert_eq!(dates.dtype(), &DataType::Date);
        assert_eq!(dates.null_count(), 1);
        // 2023-01-01 as days since the epoch
        assert_eq!(dates.date().unwrap().get(0), Some(19358));
    }

    #[test]
    fn rejects_missing_identity_columns() {
        let df = df!(
            "playerId" => [1i64],
            "name" => ["A"],
            "season" => [2023i64],
            "I_F_points" => [1.0],
        )
        .unwrap();

        match RawGamesDf::new(df).validate() {
            Err(Error::MissingColumns(missing)) => {
                assert_eq!(missing, ["gameId", "gameDate", "situation"])
            }
            other => panic!("expected missing columns, got {:?}", other),
        }
    }

    #[test]
    fn rejects_table_without_statistics() {
        let df = df!(
            "playerId" => [1i64],
            "name" => ["A"],
            "season" => [2023i64],
            "gameId" => [1i64],
            "gameDate" => [20230101i64],
            "situation" => ["all"],
        )
        .unwrap();

        assert!(matches!(RawGamesDf::new(df).validate(), Err(Error::MissingStatistics)));
    }

    #[test]
    fn rejects_table_without_known_situation() {
        let df = df!(
            "playerId" => [1i64],
            "name" => ["A"],
            "season" => [2023i64],
            "gameId" => [1i64],
            "gameDate" => [20230101i64],
            "situation" => ["5on5"],
            "I_F_goals" => [1.0],
        )
        .unwrap();

        assert!(matches!(RawGamesDf::new(df).per_game(), Err(Error::NoSituation)));
    }
}
