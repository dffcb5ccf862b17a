use anyhow::{bail, Result};
use clap::{Parser, Subcommand};
use gbg::{
    aggregate::{DEFAULT_INPUT_DIR, DEFAULT_OUTPUT},
    fetch::{FetchConfig, Fetcher, Player},
    progress::Progress,
    view::chart_table,
    BuildConfig, GameLogDf, Stat,
};
use itertools::Itertools;
use log::LevelFilter;
use simplelog::{ColorChoice, ConfigBuilder, TermLogger, TerminalMode};
use std::path::PathBuf;

#[derive(Parser, Debug)]
#[command(author, version, about = "Hockey game-by-game stats: fetch, combine, chart")]
struct Args {
    #[command(subcommand)]
    command: Option<Command>,

    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Combine the per-player tables into one game-by-game table (default)
    Build {
        #[arg(short = 'i', long = "input", value_name = "DIR", default_value = DEFAULT_INPUT_DIR)]
        input: PathBuf,

        #[arg(short = 'o', long = "output", value_name = "FILE", default_value = DEFAULT_OUTPUT)]
        output: PathBuf,
    },

    /// Download per-player game-by-game tables
    Fetch {
        #[arg(short = 'd', long = "dir", value_name = "DIR", default_value = DEFAULT_INPUT_DIR)]
        dir: PathBuf,

        /// Season summaries to discover players from (repeatable)
        #[arg(short = 's', long = "season")]
        seasons: Vec<u16>,

        /// Only players whose summary row lists this team code (repeatable)
        #[arg(short = 't', long = "team")]
        teams: Vec<String>,

        /// Skip discovery and fetch these player ids (repeatable)
        #[arg(short = 'p', long = "player-id")]
        player_ids: Vec<String>,

        #[arg(short = 'n', long)]
        max_players: Option<usize>,
    },

    /// List the players in the combined table
    Players {
        #[arg(short = 'i', long = "input", value_name = "FILE", default_value = DEFAULT_OUTPUT)]
        input: PathBuf,
    },

    /// Print one player's running totals, one column per season
    View {
        #[arg(short = 'p', long = "player")]
        player: String,

        #[arg(long, default_value_t = Stat::CumPoints)]
        stat: Stat,

        /// Seasons to compare (repeatable); all of the player's seasons by default
        #[arg(short = 's', long = "season")]
        seasons: Vec<i64>,

        #[arg(short = 'i', long = "input", value_name = "FILE", default_value = DEFAULT_OUTPUT)]
        input: PathBuf,

        /// Also write the chart table as CSV
        #[arg(short = 'o', long = "output", value_name = "FILE")]
        output: Option<PathBuf>,
    },
}

/// Prints one line per finished item.
#[derive(Default)]
struct StdoutProgress {
    total: usize,
    done: usize,
}

impl Progress for StdoutProgress {
    fn begin(&mut self, total: usize) {
        self.total = total;
        self.done = 0;
    }

    fn log(&mut self, msg: &str) {
        println!("{}", msg);
    }

    fn item_done(&mut self, item: &str, status: &str) {
        self.done += 1;
        println!("[{}/{}] {:<35} {}", self.done, self.total, item, status);
    }
}

fn rule() {
    println!("{}", "=".repeat(70));
}

fn build(input: PathBuf, output: PathBuf) -> Result<()> {
    let config = BuildConfig {
        input_dir: input,
        output,
    };
    println!("Combining tables from {}", config.input_dir.display());

    let report = gbg::build(&config, &mut StdoutProgress::default())?;

    rule();
    println!("Accepted: {}", report.accepted.len());
    println!("Rejected: {}", report.rejected.len());
    for rejection in &report.rejected {
        println!("  {}: {}", rejection.source.display(), rejection.error);
    }
    println!("Wrote {} rows to {}", report.rows, report.output.display());
    Ok(())
}

fn fetch(
    dir: PathBuf,
    seasons: Vec<u16>,
    teams: Vec<String>,
    player_ids: Vec<String>,
    max_players: Option<usize>,
) -> Result<()> {
    let mut config = FetchConfig {
        data_dir: dir,
        teams,
        max_players,
        ..Default::default()
    };
    if !seasons.is_empty() {
        config.seasons = seasons;
    }

    let fetcher = Fetcher::new(config)?;
    let mut progress = StdoutProgress::default();

    let players = if player_ids.is_empty() {
        println!(
            "Fetching players from seasons {}",
            fetcher.config().seasons.iter().join(", ")
        );
        fetcher.discover_players(&mut progress)?
    } else {
        player_ids.iter().map(|id| Player::from_id(id)).collect_vec()
    };

    println!(
        "Downloading {} players into {}",
        players.len(),
        fetcher.config().data_dir.display()
    );
    let report = fetcher.fetch_all(&players, &mut progress)?;

    rule();
    println!("Fetched:          {}", report.fetched);
    println!("Already present:  {}", report.already_present);
    println!("Not found:        {}", report.not_found);
    println!("Timeouts:         {}", report.timeouts);
    println!("Invalid/errors:   {}", report.invalid + report.network_errors);
    rule();
    println!("Usable tables: {}", report.usable());
    if report.aborted {
        bail!("stopped after too many consecutive failures");
    }
    Ok(())
}

fn players(input: PathBuf) -> Result<()> {
    let game_log = GameLogDf::load(input)?;
    for name in game_log.players()? {
        println!("{}", name);
    }
    Ok(())
}

fn view(
    player: String,
    stat: Stat,
    seasons: Vec<i64>,
    input: PathBuf,
    output: Option<PathBuf>,
) -> Result<()> {
    let game_log = GameLogDf::load(input)?;
    let series = game_log.season_series(&player, stat, &seasons)?;
    if series.is_empty() {
        bail!(
            "{} has no games in seasons {}",
            player,
            seasons.iter().join(", ")
        );
    }

    let mut table = chart_table(&series)?;
    println!("{} - {} by game number", player, stat);
    println!("{}", table);

    if let Some(output) = output {
        gbg::write_csv(&mut table, &output)?;
        println!("Wrote {}", output.display());
    }
    Ok(())
}

fn main() -> Result<()> {
    let args = Args::parse();

    // Set the default level based on verbosity
    let default_level = match args.verbose {
        0 => LevelFilter::Warn,
        1 => LevelFilter::Info,
        2 => LevelFilter::Debug,
        _ => LevelFilter::Trace,
    };

    let config = ConfigBuilder::new().add_filter_allow_str("gbg").build();
    TermLogger::init(
        default_level,
        config,
        TerminalMode::Mixed,
        ColorChoice::Auto,
    )?;

    log::trace!("Args {:#?}", args);

    let command = args.command.unwrap_or(Command::Build {
        input: PathBuf::from(DEFAULT_INPUT_DIR),
        output: PathBuf::from(DEFAULT_OUTPUT),
    });

    match command {
        Command::Build { input, output } => build(input, output),
        Command::Fetch {
            dir,
            seasons,
            teams,
            player_ids,
            max_players,
        } => fetch(dir, seasons, teams, player_ids, max_players),
        Command::Players { input } => players(input),
        Command::View {
            player,
            stat,
            seasons,
            input,
            output,
        } => view(player, stat, seasons, input, output),
    }
}
