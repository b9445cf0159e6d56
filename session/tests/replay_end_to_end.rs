//! End-to-end replay: parse a finished doubles log, drive the mock engine
//! through it, then rewind mid-replay and continue forward.

use rewind_protocol::SideId;
use rewind_replay::{ReplayScript, TurnBundle};
use rewind_session::{Engine, FormatConfig, MockEngine, ReplayDriver};

const P1_TEAM: &str = "Flutter Mane||boosterenergy|protosynthesis|moonblast,dazzlinggleam,shadowball,protect||||||50|]Ogerpon-Wellspring||wellspringmask|waterabsorb|ivycudgel,followme,spikyshield,swordsdance||||||50|]Amoonguss||rockyhelmet|regenerator|spore,pollenpuff,protect,clearsmog||||||50|]Incineroar||safetygoggles|intimidate|fakeout,knockoff,partingshot,flareblitz||||||50|";
const P2_TEAM: &str = "Porygon2||eviolite|download|trickroom,icebeam,recover,terablast||||||50|]Incineroar||safetygoggles|intimidate|fakeout,knockoff,uturn,flareblitz||||||50|]Amoonguss||rockyhelmet|regenerator|spore,pollenpuff,protect,clearsmog||||||50|]Dondozo||leftovers|unaware|wavecrash,orderup,protect,earthquake||||||50|";

fn game_log() -> String {
    format!(
        "\
|player|p1|Alice
|player|p2|Bob
|showteam|p1|{}
|showteam|p2|{}
|start
|switch|p1a: Flutter Mane|Flutter Mane, L50|160/160
|switch|p1b: Ogerpon|Ogerpon-Wellspring, L50, F|160/160
|switch|p2a: Porygon2|Porygon2, L50|160/160
|switch|p2b: Incineroar|Incineroar, L50, M|160/160
|turn|1
|move|p1a: Flutter Mane|Moonblast|p2a: Porygon2
|-damage|p2a: Porygon2|110/160
|move|p1b: Ogerpon|Ivy Cudgel|p2b: Incineroar
|-damage|p2b: Incineroar|80/160
|move|p2a: Porygon2|Trick Room
|move|p2b: Incineroar|Knock Off|p1a: Flutter Mane
|-damage|p1a: Flutter Mane|100/160
|upkeep
|turn|2
|move|p1b: Ogerpon|Ivy Cudgel|p2b: Incineroar
|-damage|p2b: Incineroar|0 fnt
|faint|p2b: Incineroar
|move|p1a: Flutter Mane|Moonblast|p2a: Porygon2
|-damage|p2a: Porygon2|60/160
|move|p2a: Porygon2|Ice Beam|p1b: Ogerpon
|-damage|p1b: Ogerpon|90/160
|upkeep
|switch|p2b: Amoonguss|Amoonguss, L50|160/160
|turn|3
|move|p1a: Flutter Mane|Moonblast|p2a: Porygon2
|-damage|p2a: Porygon2|20/160
|move|p2b: Amoonguss|Spore|p1a: Flutter Mane
|-status|p1a: Flutter Mane|slp
|move|p1b: Ogerpon|Ivy Cudgel|p2a: Porygon2
|-damage|p2a: Porygon2|0 fnt
|faint|p2a: Porygon2
|upkeep
|switch|p2a: Dondozo|Dondozo, L50|160/160
|turn|4
|cant|p1a: Flutter Mane|slp
|move|p1b: Ogerpon|Ivy Cudgel|p2a: Dondozo
|-damage|p2a: Dondozo|100/160
|move|p2a: Dondozo|Wave Crash|p1b: Ogerpon
|-damage|p1b: Ogerpon|30/160
|move|p2b: Amoonguss|Pollen Puff|p2a: Dondozo
|-heal|p2a: Dondozo|140/160
|upkeep
|win|Alice
",
        P1_TEAM, P2_TEAM
    )
}

fn config() -> FormatConfig {
    FormatConfig {
        format_id: "gen9vgc2025".to_string(),
        game_type: "doubles".to_string(),
        bring_count: 4,
        seed: 99,
    }
}

fn replayed_driver(script: &ReplayScript) -> ReplayDriver<MockEngine> {
    let mut driver: ReplayDriver<MockEngine> = ReplayDriver::new(config()).unwrap();
    driver.run_script(script).unwrap();
    driver
}

#[test]
fn test_script_reconstruction() {
    let script = ReplayScript::parse(&game_log()).unwrap();

    assert_eq!(script.turn_count, 4);
    assert_eq!(script.winner.as_deref(), Some("Alice"));
    assert_eq!(script.p1.preview_choice, "team 1234");
    assert_eq!(script.turns[1].forced_p2, "pass, switch 3");
    assert_eq!(script.turns[2].forced_p2, "switch 4, pass");
    assert_eq!(script.turns[3].p1_choice, "default, move ivycudgel 1");
}

#[test]
fn test_full_replay_keeps_snapshots_per_turn() {
    let script = ReplayScript::parse(&game_log()).unwrap();
    let driver = replayed_driver(&script);

    // Pre-battle snapshot plus one per completed turn
    assert_eq!(driver.engine().state_by_turn().len(), 5);
    assert_eq!(driver.turn(), 5);

    // Every turn boundary matches the recorded occupants
    for bundle in &script.turns {
        let snapshot = &driver.engine().state_by_turn()[bundle.turn as usize];
        for entry in &bundle.patch.active {
            let side_index = if entry.slot.starts_with("p1") { 0 } else { 1 };
            let position = (entry.slot.as_bytes()[2] - b'a') as usize;
            let species = snapshot["sides"][side_index]["pokemon"][position]["species"]
                .as_str()
                .unwrap();
            assert_eq!(
                species, entry.species,
                "turn {} slot {}",
                bundle.turn, entry.slot
            );
        }
    }
}

#[test]
fn test_replay_state_matches_patch() {
    let script = ReplayScript::parse(&game_log()).unwrap();
    let driver = replayed_driver(&script);

    // End of game: recorded HP survives the divergent simulation
    let p2 = driver.engine().side_view(SideId::P2);
    assert_eq!(p2.active_species(0), Some("dondozo"));
    assert_eq!(p2.active_species(1), Some("amoonguss"));
    let dondozo = &p2.pokemon[0];
    let percent = dondozo.hp * 100 / dondozo.max_hp;
    assert!((87..=88).contains(&percent), "dondozo at {}%", percent);

    let p1 = driver.engine().side_view(SideId::P1);
    let flutter = &p1.pokemon[0];
    assert_eq!(flutter.species, "fluttermane");
    assert_eq!(flutter.status, "slp");
}

#[test]
fn test_jump_to_turn_mid_replay() {
    let script = ReplayScript::parse(&game_log()).unwrap();
    let mut driver = replayed_driver(&script);

    let landed = driver.jump_to_turn(3).unwrap();
    assert_eq!(landed, 3);
    assert_eq!(driver.turn(), 4);

    // Active slots match the patch for turn 3
    let patch = &script.turns[2].patch;
    for entry in &patch.active {
        let side = if entry.slot.starts_with("p1") {
            SideId::P1
        } else {
            SideId::P2
        };
        let position = (entry.slot.as_bytes()[2] - b'a') as usize;
        let view = driver.engine().side_view(side);
        assert_eq!(
            view.active_species(position),
            Some(entry.species.as_str()),
            "slot {}",
            entry.slot
        );
    }

    // HP within a percentage point of the recorded values
    for entry in &patch.hp {
        let side = if entry.slot.starts_with("p1") {
            SideId::P1
        } else {
            SideId::P2
        };
        let position = (entry.slot.as_bytes()[2] - b'a') as usize;
        let view = driver.engine().side_view(side);
        let index = view.active[position].unwrap();
        let live = &view.pokemon[index];
        let percent = (live.hp * 100 + live.max_hp / 2) / live.max_hp;
        assert!(
            (percent as i32 - entry.percent as i32).abs() <= 1,
            "slot {} live {}% recorded {}%",
            entry.slot,
            percent,
            entry.percent
        );
    }

    // Replay proceeds from the restored state
    driver.replay_turn(&script.turns[3]).unwrap();
    assert_eq!(driver.turn(), 5);
}

#[test]
fn test_jump_is_idempotent() {
    let script = ReplayScript::parse(&game_log()).unwrap();
    let mut driver = replayed_driver(&script);

    driver.jump_to_turn(2).unwrap();
    let first = driver.export_state().unwrap();
    driver.jump_to_turn(2).unwrap();
    let second = driver.export_state().unwrap();
    assert_eq!(first.state, second.state);
    assert_eq!(first.turn, second.turn);
}

#[test]
fn test_export_load_round_trip() {
    let script = ReplayScript::parse(&game_log()).unwrap();
    let mut driver = replayed_driver(&script);

    let exported = driver.export_state().unwrap();
    driver.load_state(&exported).unwrap();
    let again = driver.export_state().unwrap();

    assert_eq!(exported.format_id, again.format_id);
    assert_eq!(exported.turn, again.turn);
    assert_eq!(exported.state, again.state);
    assert_eq!(exported.state_by_turn, again.state_by_turn);
}

#[test]
fn test_patch_application_is_idempotent() {
    let script = ReplayScript::parse(&game_log()).unwrap();
    let mut driver = replayed_driver(&script);

    let patch = &script.turns[3].patch;
    driver.patch_turn(patch).unwrap();
    let once = driver.export_state().unwrap();
    driver.patch_turn(patch).unwrap();
    let twice = driver.export_state().unwrap();
    assert_eq!(once.state, twice.state);
}

#[test]
fn test_unplayable_bundle_force_advances() {
    let script = ReplayScript::parse(&game_log()).unwrap();
    let mut driver: ReplayDriver<MockEngine> = ReplayDriver::new(config()).unwrap();
    driver.run_script(&script).unwrap();

    let before = driver.turn();
    let garbage = TurnBundle {
        turn: before as u32,
        p1_choice: "flail wildly".to_string(),
        p2_choice: "flail wildly".to_string(),
        ..Default::default()
    };
    driver.replay_turn(&garbage).unwrap();

    assert_eq!(driver.turn(), before + 1);
    assert_eq!(driver.engine().state_by_turn().len(), before + 1);
}
