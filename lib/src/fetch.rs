use crate::{error::Error, progress::Progress, Result};
use parse_display::Display;
use polars::prelude::*;
use reqwest::blocking::Client;
use reqwest::StatusCode;
use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::thread;
use std::time::Duration;

pub const GAME_BY_GAME_URL: &str =
    "https://moneypuck.com/moneypuck/playerData/careers/gameByGame/regular/skaters/{player_id}.csv";
pub const SEASON_SUMMARY_URL: &str =
    "https://moneypuck.com/moneypuck/playerData/seasonSummary/{season}/regular/skaters.csv";

/// Bodies shorter than this are placeholder pages, not tables.
const MIN_BODY_LEN: usize = 100;

#[derive(Debug, Clone)]
pub struct FetchConfig {
    pub data_dir: PathBuf,
    /// `{player_id}` is replaced with the player's id.
    pub game_by_game_url: String,
    /// `{season}` is replaced with the season's start year.
    pub season_summary_url: String,
    pub seasons: Vec<u16>,
    /// Restricts roster discovery to these team codes when non-empty.
    pub teams: Vec<String>,
    pub max_players: Option<usize>,
    pub timeout: Duration,
    /// Pause after a request that reached the network.
    pub network_delay: Duration,
    /// Pause after a player that needed no download.
    pub local_delay: Duration,
    pub summary_delay: Duration,
    pub max_consecutive_failures: usize,
}

impl Default for FetchConfig {
    fn default() -> Self {
        Self {
            data_dir: PathBuf::from(crate::aggregate::DEFAULT_INPUT_DIR),
            game_by_game_url: GAME_BY_GAME_URL.to_string(),
            season_summary_url: SEASON_SUMMARY_URL.to_string(),
            seasons: vec![2024, 2023, 2022, 2021, 2020, 2019],
            teams: Vec::new(),
            max_players: None,
            timeout: Duration::from_secs(15),
            network_delay: Duration::from_millis(500),
            local_delay: Duration::from_millis(100),
            summary_delay: Duration::from_secs(1),
            max_consecutive_failures: 20,
        }
    }
}

#[derive(Copy, Clone, Debug, PartialEq, Eq, Display)]
#[display(style = "lowercase")]
pub enum TransientKind {
    Timeout,
    Network,
}

/// What happened to one player's table.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Display)]
pub enum FetchOutcome {
    #[display("already present")]
    AlreadyPresent,
    #[display("fetched")]
    Fetched,
    #[display("not found")]
    NotFound,
    #[display("invalid response")]
    InvalidResponse,
    #[display("transient failure ({0})")]
    TransientFailure(TransientKind),
}

impl From<reqwest::Error> for FetchOutcome {
    fn from(err: reqwest::Error) -> Self {
        log::debug!("request failed: {}", err);
        if err.is_timeout() {
            FetchOutcome::TransientFailure(TransientKind::Timeout)
        } else {
            FetchOutcome::TransientFailure(TransientKind::Network)
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Player {
    pub id: String,
    pub name: String,
    pub team: Option<String>,
}

impl Player {
    /// A player known only by id.
    pub fn from_id(id: &str) -> Self {
        Player {
            id: id.to_string(),
            name: id.to_string(),
            team: None,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FetchReport {
    pub fetched: usize,
    pub already_present: usize,
    pub not_found: usize,
    pub invalid: usize,
    pub timeouts: usize,
    pub network_errors: usize,
    /// Set when the loop stopped early after too many consecutive failures.
    pub aborted: bool,
}

impl FetchReport {
    fn record(&mut self, outcome: FetchOutcome) {
        match outcome {
            FetchOutcome::AlreadyPresent => self.already_present += 1,
            FetchOutcome::Fetched => self.fetched += 1,
            FetchOutcome::NotFound => self.not_found += 1,
            FetchOutcome::InvalidResponse => self.invalid += 1,
            FetchOutcome::TransientFailure(TransientKind::Timeout) => self.timeouts += 1,
            FetchOutcome::TransientFailure(TransientKind::Network) => self.network_errors += 1,
        }
    }

    /// Tables on disk the aggregator can use.
    pub fn usable(&self) -> usize {
        self.fetched + self.already_present
    }
}

pub struct Fetcher {
    client: Client,
    config: FetchConfig,
}

impl Fetcher {
    pub fn new(config: FetchConfig) -> Result<Self> {
        let client = Client::builder()
            .timeout(config.timeout)
            .user_agent(concat!("gbg/", env!("CARGO_PKG_VERSION")))
            .build()?;
        fs::create_dir_all(&config.data_dir)?;
        Ok(Fetcher { client, config })
    }

    pub fn config(&self) -> &FetchConfig {
        &self.config
    }

    pub fn table_path(&self, player_id: &str) -> PathBuf {
        self.config.data_dir.join(format!("{}.csv", player_id))
    }

    /// Downloads one player's table unless a usable copy is already on disk.
    /// Only local write failures are returned as errors.
    pub fn fetch(&self, player_id: &str) -> Result<FetchOutcome> {
        let path = self.table_path(player_id);
        if is_present(&path) {
            return Ok(FetchOutcome::AlreadyPresent);
        }

        let url = self.config.game_by_game_url.replace("{player_id}", player_id);
        log::debug!("GET {}", url);
        let response = match self.client.get(&url).send() {
            Ok(response) => response,
            Err(err) => return Ok(err.into()),
        };

        let status = response.status();
        if status == StatusCode::NOT_FOUND {
            return Ok(FetchOutcome::NotFound);
        }
        if !status.is_success() {
            log::debug!("{} answered {}", url, status);
            return Ok(FetchOutcome::TransientFailure(TransientKind::Network));
        }

        let body = match response.bytes() {
            Ok(body) => body,
            Err(err) => return Ok(err.into()),
        };

        let outcome = validate_body(&body);
        if outcome == FetchOutcome::Fetched {
            fs::write(&path, &body)?;
        }
        Ok(outcome)
    }

    /// Collects every player listed in the configured season summaries.
    /// A season that fails to download is reported and skipped.
    pub fn discover_players(&self, progress: &mut dyn Progress) -> Result<Vec<Player>> {
        log::trace!("fetch::discover_players");
        let mut players: Vec<Player> = Vec::new();
        let mut index: HashMap<String, usize> = HashMap::new();

        for &season in &self.config.seasons {
            match self.season_summary(season) {
                Ok(summary) => {
                    progress.log(&format!("{}-{}: {} rows", season, season + 1, summary.len()));
                    for player in summary {
                        if !self.config.teams.is_empty()
                            && !player
                                .team
                                .as_ref()
                                .is_some_and(|team| self.config.teams.contains(team))
                        {
                            continue;
                        }
                        match index.get(&player.id) {
                            Some(&i) => players[i].name = player.name,
                            None => {
                                index.insert(player.id.clone(), players.len());
                                players.push(player);
                            }
                        }
                    }
                }
                Err(err) => {
                    log::warn!("season summary {} failed: {}", season, err);
                    progress.log(&format!("{}-{}: failed - {}", season, season + 1, err));
                }
            }
            thread::sleep(self.config.summary_delay);
        }

        if players.is_empty() {
            return Err(Error::NoRoster);
        }
        log::info!("{} unique players", players.len());
        Ok(players)
    }

    fn season_summary(&self, season: u16) -> Result<Vec<Player>> {
        let url = self
            .config
            .season_summary_url
            .replace("{season}", &season.to_string());
        log::debug!("GET {}", url);
        let body = self.client.get(&url).send()?.error_for_status()?.bytes()?;
        let df = crate::read_csv_bytes(&body)?;
        summary_players(&df)
    }

    /// Fetches each player in turn, pausing between requests, and stops early
    /// after too many consecutive transient failures.
    pub fn fetch_all(
        &self,
        players: &[Player],
        progress: &mut dyn Progress,
    ) -> Result<FetchReport> {
        log::trace!("fetch::fetch_all");
        let players = match self.config.max_players {
            Some(max) => &players[..max.min(players.len())],
            None => players,
        };

        progress.begin(players.len());
        let mut report = FetchReport::default();
        let mut consecutive_failures = 0;

        for player in players {
            let outcome = self.fetch(&player.id)?;
            report.record(outcome);
            progress.item_done(&player.name, &outcome.to_string());

            if let FetchOutcome::TransientFailure(_) = outcome {
                consecutive_failures += 1;
                if consecutive_failures >= self.config.max_consecutive_failures {
                    progress.log(&format!(
                        "{} consecutive failures, stopping",
                        consecutive_failures
                    ));
                    report.aborted = true;
                    break;
                }
            } else {
                consecutive_failures = 0;
            }

            let delay = match outcome {
                FetchOutcome::Fetched | FetchOutcome::TransientFailure(_) => {
                    self.config.network_delay
                }
                _ => self.config.local_delay,
            };
            thread::sleep(delay);
        }

        progress.finish();
        Ok(report)
    }
}

/// A table on disk counts as present when it parses and has rows.
pub fn is_present(path: &Path) -> bool {
    path.is_file()
        && crate::load_csv(path)
            .map(|df| df.height() > 0)
            .unwrap_or(false)
}

/// Classifies a downloaded body before anything is written to disk.
pub fn validate_body(body: &[u8]) -> FetchOutcome {
    if body.len() < MIN_BODY_LEN {
        return FetchOutcome::NotFound;
    }
    match crate::read_csv_bytes(body) {
        Ok(df) if df.height() > 0 => FetchOutcome::Fetched,
        Ok(_) => FetchOutcome::NotFound,
        Err(err) => {
            log::debug!("body is not a table: {}", err);
            FetchOutcome::InvalidResponse
        }
    }
}

fn summary_players(df: &DataFrame) -> Result<Vec<Player>> {
    let ids = df.column("playerId")?.cast(&DataType::String)?;
    let names = df.column("name")?.cast(&DataType::String)?;
    let teams = match df.column("team") {
        Ok(teams) => Some(teams.cast(&DataType::String)?),
        Err(_) => None,
    };

    let ids = ids.str()?;
    let names = names.str()?;
    let teams = teams.as_ref().map(|teams| teams.str()).transpose()?;

    let players = (0..df.height())
        .filter_map(|i| {
            let id = ids.get(i)?;
            Some(Player {
                id: id.to_string(),
                name: names.get(i).unwrap_or(id).to_string(),
                team: teams.and_then(|teams| teams.get(i)).map(String::from),
            })
        })
        .collect();
    Ok(players)
}
