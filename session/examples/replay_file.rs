//! Replay a saved battle log on the mock engine.
//!
//! Usage: `cargo run --example replay_file -- path/to/battle.log [seed]`
//!
//! Parses the log, drives the mock engine through every turn, and prints the
//! per-turn reconciliation summary plus the snapshot count at the end.

use std::{env, fs};

use anyhow::{Context, Result};
use rewind_protocol::SideId;
use rewind_replay::ReplayScript;
use rewind_session::{Engine, FormatConfig, MockEngine, ReplayDriver};

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info".into()),
        )
        .init();

    let path = env::args()
        .nth(1)
        .context("usage: replay_file <battle.log> [seed]")?;
    let seed = env::args()
        .nth(2)
        .and_then(|s| s.parse().ok())
        .unwrap_or(1);

    let log = fs::read_to_string(&path).with_context(|| format!("failed to read {}", path))?;
    let script = ReplayScript::parse(&log)?;
    println!(
        "parsed {} turns, p1={} p2={}",
        script.turn_count, script.p1.username, script.p2.username
    );

    let config = FormatConfig {
        format_id: "gen9vgc2025regh".to_string(),
        game_type: "doubles".to_string(),
        bring_count: 4,
        seed,
    };
    let mut driver: ReplayDriver<MockEngine> = ReplayDriver::new(config)?;
    driver.run_script(&script)?;

    for side in [SideId::P1, SideId::P2] {
        let view = driver.engine().side_view(side);
        println!("{}:", side.as_str());
        for pokemon in &view.pokemon {
            let marker = if pokemon.fainted {
                "x"
            } else if pokemon.active {
                "*"
            } else {
                " "
            };
            println!(
                "  {} {:<20} {:>3}/{:<3} {}",
                marker, pokemon.species, pokemon.hp, pokemon.max_hp, pokemon.status
            );
        }
    }

    println!(
        "{} resumable snapshots (turn 0..={})",
        driver.engine().state_by_turn().len(),
        driver.engine().state_by_turn().len().saturating_sub(1),
    );

    if let Some(winner) = &script.winner {
        println!("recorded winner: {}", winner);
    }
    Ok(())
}
