use crate::{aggregate::GameLogDf, error::Error, Result};
use itertools::Itertools;
use parse_display::{Display, FromStr};
use polars::prelude::*;

/// The running totals a chart can plot.
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq, Display, FromStr)]
pub enum Stat {
    #[default]
    #[display("cum_points")]
    CumPoints,
    #[display("cum_goals")]
    CumGoals,
    #[display("cum_plusMinus")]
    CumPlusMinus,
}

/// One line of the chart: a season's running total by game number.
#[derive(Debug, Clone, PartialEq)]
pub struct SeasonSeries {
    pub season: i64,
    pub points: Vec<(i64, f64)>,
}

#[derive(Clone, Default)]
pub struct ViewFilter {
    filter_expr: Option<Expr>,
}

impl ViewFilter {
    pub fn new() -> Self {
        Self { filter_expr: None }
    }

    pub fn player(mut self, name: &str) -> Self {
        let expr = col("name").eq(lit(name));
        self.extend_filter(expr)
    }

    // An empty slice keeps every season
    pub fn seasons(mut self, seasons: &[i64]) -> Self {
        let expr = seasons
            .iter()
            .map(|season| col("season").eq(lit(*season)))
            .reduce(|acc, expr| acc.or(expr));

        match expr {
            Some(expr) => self.extend_filter(expr),
            None => self,
        }
    }

    // Combines the current filter with a new one using AND logic
    fn extend_filter(&mut self, new_expr: Expr) -> Self {
        self.filter_expr = match self.filter_expr.take() {
            Some(existing_expr) => Some(existing_expr.and(new_expr)),
            None => Some(new_expr),
        };
        self.clone()
    }

    pub fn build(self) -> Expr {
        self.filter_expr.unwrap_or_else(|| lit(true))
    }
}

impl GameLogDf {
    pub fn filter(&self, filter: Expr) -> Result<DataFrame> {
        let df = (**self).clone().lazy().filter(filter).collect()?;
        Ok(df)
    }

    /// Distinct player names, sorted.
    pub fn players(&self) -> Result<Vec<String>> {
        let names = self.column("name")?.cast(&DataType::String)?;
        let players = names
            .str()?
            .into_iter()
            .flatten()
            .unique()
            .sorted()
            .map(String::from)
            .collect();
        Ok(players)
    }

    /// Seasons the player appears in, ascending.
    pub fn seasons(&self, player: &str) -> Result<Vec<i64>> {
        let df = self.filter(ViewFilter::new().player(player).build())?;
        if df.height() == 0 {
            return Err(Error::UnknownPlayer(player.to_string()));
        }
        let seasons = df.column("season")?.cast(&DataType::Int64)?;
        let seasons = seasons.i64()?.into_iter().flatten().unique().sorted().collect();
        Ok(seasons)
    }

    /// The player's `stat` series for each requested season; every season
    /// when `seasons` is empty. Works only off the already-aggregated rows.
    pub fn season_series(
        &self,
        player: &str,
        stat: Stat,
        seasons: &[i64],
    ) -> Result<Vec<SeasonSeries>> {
        log::trace!("view::season_series");
        if !self.players()?.iter().any(|name| name == player) {
            return Err(Error::UnknownPlayer(player.to_string()));
        }

        let stat_name = stat.to_string();
        let filter = ViewFilter::new().player(player).seasons(seasons).build();
        let df = (**self)
            .clone()
            .lazy()
            .filter(filter)
            .select([
                col("season").cast(DataType::Int64),
                col("gameNumber").cast(DataType::Int64),
                col(&stat_name).cast(DataType::Float64),
            ])
            .sort(["season", "gameNumber"], SortMultipleOptions::default())
            .collect()?;
        log::debug!("{} rows for {} {}", df.height(), player, stat_name);

        let season_col = df.column("season")?.i64()?;
        let number_col = df.column("gameNumber")?.i64()?;
        let value_col = df.column(&stat_name)?.f64()?;

        let mut series: Vec<SeasonSeries> = Vec::new();
        for ((season, number), value) in season_col.into_iter().zip(number_col).zip(value_col) {
            let (Some(season), Some(number), Some(value)) = (season, number, value) else {
                continue;
            };
            match series.last_mut() {
                Some(current) if current.season == season => current.points.push((number, value)),
                _ => series.push(SeasonSeries {
                    season,
                    points: vec![(number, value)],
                }),
            }
        }
        Ok(series)
    }
}

/// Lays the series side by side: `gameNumber` and one column per season.
pub fn chart_table(series: &[SeasonSeries]) -> Result<DataFrame> {
    let join_args = JoinArgs::new(JoinType::Full).with_coalesce(JoinCoalesce::CoalesceColumns);

    let mut table: Option<DataFrame> = None;
    for line in series {
        let (numbers, values): (Vec<i64>, Vec<f64>) = line.points.iter().copied().unzip();
        let df = DataFrame::new(vec![
            Series::new("gameNumber", numbers),
            Series::new(&line.season.to_string(), values),
        ])?;
        table = Some(match table {
            Some(table) => table.join(&df, ["gameNumber"], ["gameNumber"], join_args.clone())?,
            None => df,
        });
    }

    match table {
        Some(table) => {
            let df = table
                .lazy()
                .sort(["gameNumber"], SortMultipleOptions::default())
                .collect()?;
            Ok(df)
        }
        None => Ok(DataFrame::default()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn game_log() -> GameLogDf {
        let df = df!(
            "playerId" => [1i64, 1, 1, 2],
            "name" => ["A", "A", "A", "B"],
            "season" => [2022i64, 2023, 2023, 2023],
            "gameId" => ["1", "2", "3", "4"],
            "gameNumber" => [1i64, 1, 2, 1],
            "cum_points" => [1.0, 0.0, 2.0, 5.0],
            "cum_goals" => [1.0, 0.0, 1.0, 3.0],
            "cum_plusMinus" => [-1.0, 1.0, 2.0, 0.0],
        )
        .unwrap();
        GameLogDf::new(df)
    }

    #[test]
    fn stat_names_match_output_columns() {
        assert_eq!(Stat::CumPlusMinus.to_string(), "cum_plusMinus");
        assert_eq!("cum_goals".parse::<Stat>().unwrap(), Stat::CumGoals);
        assert!("points".parse::<Stat>().is_err());
    }

    #[test]
    fn lists_players_and_their_seasons() {
        let log = game_log();
        assert_eq!(log.players().unwrap(), ["A", "B"]);
        assert_eq!(log.seasons("A").unwrap(), [2022, 2023]);
        assert!(matches!(log.seasons("C"), Err(Error::UnknownPlayer(_))));
    }

    #[test]
    fn one_series_per_selected_season() {
        let log = game_log();

        let all = log.season_series("A", Stat::CumPoints, &[]).unwrap();
        assert_eq!(
            all,
            [
                SeasonSeries { season: 2022, points: vec![(1, 1.0)] },
                SeasonSeries { season: 2023, points: vec![(1, 0.0), (2, 2.0)] },
            ]
        );

        let one = log.season_series("A", Stat::CumPlusMinus, &[2023]).unwrap();
        assert_eq!(one, [SeasonSeries { season: 2023, points: vec![(1, 1.0), (2, 2.0)] }]);
    }

    #[test]
    fn unknown_player_is_an_error() {
        let result = game_log().season_series("Nobody", Stat::CumGoals, &[]);
        assert!(matches!(result, Err(Error::UnknownPlayer(name)) if name == "Nobody"));
    }

    #[test]
    fn chart_table_aligns_seasons_on_game_number() {
        let series = [
            SeasonSeries { season: 2022, points: vec![(1, 1.0)] },
            SeasonSeries { season: 2023, points: vec![(1, 0.0), (2, 2.0)] },
        ];
        let table = chart_table(&series).unwrap();

        assert_eq!(table.get_column_names(), ["gameNumber", "2022", "2023"]);
        assert_eq!(table.height(), 2);
        let short: Vec<_> = table.column("2022").unwrap().f64().unwrap().into_iter().collect();
        assert_eq!(short, [Some(1.0), None]);
    }
}
