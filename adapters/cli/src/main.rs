#![deny(
    unsafe_code,
    missing_docs,
    dead_code,
    unused_results,
    non_snake_case,
    unreachable_pub
)]

//! Command-line adapter that plays a Cafe Defence level headlessly.

mod ledger_file;

use std::{fs, path::PathBuf, str::FromStr, time::Duration};

use anyhow::{bail, Context, Result};
use cafe_defence_core::{
    Currency, CurrencyAmounts, Event, GamePhase, LevelDefinition, NullPresentation, TurretKind,
    Vec2,
};
use cafe_defence_session::{Session, SessionConfig};
use cafe_defence_system_combination::RecipeBook;
use cafe_defence_world::query;
use clap::Parser;
use log::{info, warn};

use crate::ledger_file::LedgerFile;

const DEFAULT_LEVEL: &str = include_str!("../levels/cafe.toml");

/// Plays a level without rendering and prints a summary.
#[derive(Debug, Parser)]
#[command(name = "cafe-defence", version, about)]
struct Cli {
    /// Level document; the bundled three-wave level is used when omitted.
    #[arg(long)]
    level: Option<PathBuf>,
    /// Session tuning document.
    #[arg(long)]
    config: Option<PathBuf>,
    /// Recipe book document; the built-in recipes are used when omitted.
    #[arg(long)]
    recipes: Option<PathBuf>,
    /// File holding the persisted currency balances.
    #[arg(long, default_value = "cafe-defence-ledger.toml")]
    ledger: PathBuf,
    /// Turrets to buy before the game starts, as `kind@x,y`.
    #[arg(long = "turret", value_name = "KIND@X,Y")]
    turrets: Vec<TurretOrder>,
    /// Coins granted on top of the persisted balance.
    #[arg(long, default_value_t = 0)]
    starting_coins: u64,
    /// Simulated time step in milliseconds.
    #[arg(long, default_value_t = 100)]
    step_ms: u64,
    /// Simulated seconds after which the run is suspended.
    #[arg(long, default_value_t = 600)]
    max_seconds: u64,
}

/// Turret purchase requested on the command line.
#[derive(Clone, Copy, Debug, PartialEq)]
struct TurretOrder {
    kind: TurretKind,
    position: Vec2,
}

impl FromStr for TurretOrder {
    type Err = String;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        let (kind, position) = value
            .split_once('@')
            .ok_or_else(|| format!("expected KIND@X,Y, got `{value}`"))?;
        let kind = kind.trim().parse::<TurretKind>().map_err(|err| err.to_string())?;
        let (x, y) = position
            .split_once(',')
            .ok_or_else(|| format!("expected X,Y, got `{position}`"))?;
        let coordinate = |text: &str| {
            text.trim()
                .parse::<f32>()
                .map_err(|err| format!("invalid coordinate `{text}`: {err}"))
        };
        Ok(Self {
            kind,
            position: Vec2::new(coordinate(x)?, coordinate(y)?),
        })
    }
}

#[derive(Debug, Default)]
struct RunSummary {
    waves_cleared: u32,
    kills: u32,
    drops: u32,
    simulated: Duration,
}

/// Entry point for the Cafe Defence command-line interface.
fn main() -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();
    let cli = Cli::parse();
    if cli.step_ms == 0 {
        bail!("--step-ms must be positive");
    }

    let level = load_level(cli.level.as_ref())?;
    let config = load_config(cli.config.as_ref())?;
    let recipes = load_recipes(cli.recipes.as_ref())?;
    let store = LedgerFile::new(&cli.ledger);
    info!("ledger at {}", store.path().display());

    let mut session = Session::new(&config, level, recipes, store, NullPresentation);
    println!("{}", query::welcome_banner(session.world()));
    if cli.starting_coins > 0 {
        let _ = session.credit(CurrencyAmounts::coins(cli.starting_coins));
    }

    for order in &cli.turrets {
        let Some(turret) = session.place_turret_for_sale(order.kind, order.position, 0.0) else {
            warn!("could not afford {} at {}", order.kind, order.position);
            continue;
        };
        let _ = session.end_placement(turret);
    }

    let summary = play(&mut session, Duration::from_millis(cli.step_ms), cli.max_seconds);
    report(&session, &summary);
    let torn_down = session.shutdown();
    info!("released pooled instances: {torn_down:?}");
    Ok(())
}

fn play(
    session: &mut Session<LedgerFile, NullPresentation>,
    step: Duration,
    max_seconds: u64,
) -> RunSummary {
    let mut summary = RunSummary::default();
    let limit = Duration::from_secs(max_seconds);
    let _ = session.start_game();

    while summary.simulated < limit && !session.phase().is_terminal() {
        for event in session.tick(step) {
            match event {
                Event::GamePhaseChanged {
                    to: GamePhase::WaveComplete,
                    ..
                } => summary.waves_cleared += 1,
                Event::EnemyDied { .. } => summary.kills += 1,
                Event::DropSpawned { drop, .. } => {
                    summary.drops += 1;
                    let _ = session.collect_drop(drop);
                }
                _ => {}
            }
        }
        summary.simulated += step;
    }
    summary
}

fn report(session: &Session<LedgerFile, NullPresentation>, summary: &RunSummary) {
    let balances = session.balances();
    println!("outcome:       {:?}", session.phase());
    println!(
        "waves cleared: {}/{}",
        summary.waves_cleared,
        session.level().total_waves().max(1)
    );
    println!("enemies slain: {}", summary.kills);
    println!("drops taken:   {}", summary.drops);
    println!(
        "cafe health:   {:.0}",
        query::cafe_health(session.world()).current()
    );
    println!("simulated:     {:.1}s", summary.simulated.as_secs_f32());
    println!(
        "balances:      {} coins, {} tech points, {} water points",
        balances.get(Currency::Coin),
        balances.get(Currency::TechPoint),
        balances.get(Currency::WaterPoint)
    );
}

fn load_level(path: Option<&PathBuf>) -> Result<LevelDefinition> {
    let contents = match path {
        Some(path) => fs::read_to_string(path)
            .with_context(|| format!("failed to read level at {}", path.display()))?,
        None => DEFAULT_LEVEL.to_owned(),
    };
    LevelDefinition::from_toml_str(&contents).context("failed to parse level document")
}

fn load_config(path: Option<&PathBuf>) -> Result<SessionConfig> {
    let Some(path) = path else {
        return Ok(SessionConfig::default());
    };
    let contents = fs::read_to_string(path)
        .with_context(|| format!("failed to read session config at {}", path.display()))?;
    SessionConfig::from_toml_str(&contents)
        .with_context(|| format!("invalid session config at {}", path.display()))
}

fn load_recipes(path: Option<&PathBuf>) -> Result<RecipeBook> {
    let Some(path) = path else {
        return Ok(RecipeBook::default());
    };
    let contents = fs::read_to_string(path)
        .with_context(|| format!("failed to read recipes at {}", path.display()))?;
    RecipeBook::from_toml_str(&contents)
        .with_context(|| format!("failed to parse recipes at {}", path.display()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn turret_orders_parse_kind_and_position() {
        let order: TurretOrder = "sniper@4.5,-2".parse().expect("valid order");
        assert_eq!(
            order,
            TurretOrder {
                kind: TurretKind::Sniper,
                position: Vec2::new(4.5, -2.0),
            }
        );
    }

    #[test]
    fn malformed_turret_orders_are_refused() {
        assert!("sniper".parse::<TurretOrder>().is_err());
        assert!("dragon@1,1".parse::<TurretOrder>().is_err());
        assert!("basic@1".parse::<TurretOrder>().is_err());
        assert!("basic@x,1".parse::<TurretOrder>().is_err());
    }

    #[test]
    fn bundled_level_parses() {
        let level = load_level(None).expect("bundled level");
        assert_eq!(level.total_waves(), 3);
        assert_eq!(level.spawn_points.len(), 2);
    }

    #[test]
    fn cli_arguments_are_consistent() {
        use clap::CommandFactory;
        Cli::command().debug_assert();
    }
}
