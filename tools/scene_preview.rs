/// Scene Preview: interactive shell for spawning and playing through scenes.
///
/// Usage: scene_preview --templates <dir> --world <file> [--seed <n>] [--player <name>]
///
/// Commands:
///   spawn <template> [location]    spawn an active scene from a template
///   at <location>                  list actions visible at a location
///   npc <npc>                      list actions for an NPC
///   route <route>                  list path cards for a route
///   do <n> [fail]                  execute the n-th action from the last listing
///   coins <n> | stat <name> <n>    adjust the preview player
///   scenes                         list scenes and their state
///   check                          run playability over every active scene
///   day <n>                        advance the clock and expire scenes
///   help                           list commands
///   quit                           exit

use scene_engine::core::engine::SceneEngine;
use scene_engine::core::instantiator::SceneSpawnContext;
use scene_engine::core::rewards::RewardLedger;
use scene_engine::schema::action::SceneAction;
use scene_engine::schema::requirement::{Player, Stat};
use scene_engine::schema::template::ChoiceOutcome;
use std::io::{self, BufRead, Write};
use tracing_subscriber::EnvFilter;

fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_writer(std::io::stderr)
        .init();

    let args: Vec<String> = std::env::args().collect();

    if args.len() < 2 || args[1] == "--help" || args[1] == "-h" {
        print_usage();
        return;
    }

    let mut templates_dir = None;
    let mut world_file = None;
    let mut seed: u64 = 42;
    let mut player_name = "Traveler".to_string();

    let mut i = 1;
    while i < args.len() {
        match args[i].as_str() {
            "--templates" if i + 1 < args.len() => {
                i += 1;
                templates_dir = Some(args[i].clone());
            }
            "--world" if i + 1 < args.len() => {
                i += 1;
                world_file = Some(args[i].clone());
            }
            "--seed" if i + 1 < args.len() => {
                i += 1;
                seed = args[i].parse().unwrap_or(42);
            }
            "--player" if i + 1 < args.len() => {
                i += 1;
                player_name = args[i].clone();
            }
            _ => {
                eprintln!("Unknown argument: {}", args[i]);
                print_usage();
                std::process::exit(1);
            }
        }
        i += 1;
    }

    let ledger = RewardLedger::new();
    let mut builder = SceneEngine::builder()
        .seed(seed)
        .with_reward_applier(ledger.clone());
    if let Some(dir) = &templates_dir {
        builder = builder.templates_dir(dir);
    }
    if let Some(file) = &world_file {
        builder = builder.world_file(file);
    }
    let mut engine = match builder.build() {
        Ok(engine) => engine,
        Err(e) => {
            eprintln!("ERROR: {}", e);
            std::process::exit(1);
        }
    };

    println!(
        "Loaded {} templates: {}",
        engine.templates().len(),
        engine.templates().ids().join(", ")
    );
    println!("Seed: {}", seed);
    println!("Type 'help' for commands.\n");

    let mut player = Player::new(&player_name);
    let mut listed: Vec<SceneAction> = Vec::new();
    let mut rewards_seen = 0;

    let stdin = io::stdin();
    let mut stdout = io::stdout();

    loop {
        print!("scene> ");
        stdout.flush().ok();

        let mut line = String::new();
        if stdin.lock().read_line(&mut line).is_err() || line.is_empty() {
            break;
        }
        let line = line.trim();
        if line.is_empty() {
            continue;
        }

        let parts: Vec<&str> = line.split_whitespace().collect();
        let cmd = parts[0].to_lowercase();

        match cmd.as_str() {
            "quit" | "exit" | "q" => {
                println!("Goodbye.");
                break;
            }
            "help" | "h" | "?" => {
                print_help();
            }
            "spawn" => {
                if parts.len() < 2 {
                    println!("Usage: spawn <template> [location]");
                    continue;
                }
                let mut ctx = SceneSpawnContext::new(&player);
                if let Some(location) = parts.get(2) {
                    ctx = ctx.at_location(location);
                }
                match engine.spawn_scene(parts[1], &ctx) {
                    Ok(id) => {
                        if let Some(scene) = engine.world().scene(&id) {
                            println!("Spawned {}", scene.snapshot());
                        }
                    }
                    Err(e) => println!("ERROR: {}", e),
                }
            }
            "at" | "npc" | "route" => {
                if parts.len() < 2 {
                    println!("Usage: {} <id>", cmd);
                    continue;
                }
                let result = match cmd.as_str() {
                    "at" => engine.get_actions_at_location(parts[1], &player),
                    "npc" => engine.get_actions_for_npc(parts[1], &player),
                    _ => engine.get_path_cards_for_route(parts[1], &player),
                };
                match result {
                    Ok(actions) => {
                        listed = actions;
                        print_actions(&listed, &player);
                    }
                    Err(e) => println!("ERROR: {}", e),
                }
            }
            "do" => {
                let Some(index) = parts.get(1).and_then(|n| n.parse::<usize>().ok()) else {
                    println!("Usage: do <n> [fail]");
                    continue;
                };
                let Some(action) = index.checked_sub(1).and_then(|i| listed.get(i)) else {
                    println!("No action {} in the last listing.", index);
                    continue;
                };
                let outcome = if parts.get(2) == Some(&"fail") {
                    ChoiceOutcome::Failure
                } else {
                    ChoiceOutcome::Success
                };
                match engine.execute_action(&action.id, outcome, &player) {
                    Ok(summary) => {
                        println!("Resolved '{}' as {:?}", summary.choice_id, summary.outcome);
                        for id in &summary.promoted {
                            println!("  + activated {}", id);
                        }
                        for id in &summary.discarded {
                            println!("  - discarded {}", id);
                        }
                        match &summary.next_situation_id {
                            Some(next) => println!("  -> now at {}", next),
                            None => println!("  scene {} complete", summary.scene_id),
                        }
                        listed.clear();
                    }
                    Err(e) => println!("ERROR: {}", e),
                }
            }
            "coins" => match parts.get(1).and_then(|n| n.parse().ok()) {
                Some(n) => {
                    player.coins = n;
                    println!("Coins: {}", player.coins);
                }
                None => println!("Usage: coins <n>"),
            },
            "stat" => {
                let stat = parts.get(1).and_then(|s| parse_stat(s));
                let value = parts.get(2).and_then(|n| n.parse().ok());
                match (stat, value) {
                    (Some(stat), Some(value)) => {
                        player.stats.insert(stat, value);
                        println!("{:?}: {}", stat, value);
                    }
                    _ => println!("Usage: stat <insight|rapport|authority|diplomacy|cunning> <n>"),
                }
            }
            "scenes" => {
                if engine.world().scenes().is_empty() {
                    println!("No scenes.");
                }
                for scene in engine.world().scenes() {
                    println!("  {}", scene.snapshot());
                }
            }
            "check" => {
                let report = engine.check_all_scenes();
                if report.is_empty() {
                    println!("All active scenes are playable.");
                }
                for (id, issues) in report {
                    println!("{}:", id);
                    for issue in issues {
                        println!("  [{}] {}", issue.code(), issue);
                    }
                }
            }
            "day" => match parts.get(1).and_then(|n| n.parse().ok()) {
                Some(day) => {
                    let expired = engine.expire_scenes(day);
                    println!("Day {}: {} scene(s) expired", day, expired.len());
                }
                None => println!("Usage: day <n> (current: {})", engine.day()),
            },
            _ => {
                println!("Unknown command: {}. Type 'help' for commands.", cmd);
            }
        }

        for applied in ledger.entries().iter().skip(rewards_seen) {
            println!("  reward @ {}: {:?}", applied.situation_id, applied.reward.effects);
        }
        rewards_seen = ledger.len();
    }
}

fn print_actions(actions: &[SceneAction], player: &Player) {
    if actions.is_empty() {
        println!("(nothing here)");
        return;
    }
    for (i, action) in actions.iter().enumerate() {
        let lock = if action.is_available(player) { "" } else { " [locked]" };
        println!("{:>2}. {} ({:?}){}", i + 1, action.name, action.action_type(), lock);
        for preview in &action.previews {
            println!(
                "      {:?} -> {} at {} ({} situations)",
                preview.outcome, preview.display_name, preview.placement_type, preview.situation_count
            );
        }
    }
}

fn parse_stat(s: &str) -> Option<Stat> {
    match s.to_lowercase().as_str() {
        "insight" => Some(Stat::Insight),
        "rapport" => Some(Stat::Rapport),
        "authority" => Some(Stat::Authority),
        "diplomacy" => Some(Stat::Diplomacy),
        "cunning" => Some(Stat::Cunning),
        _ => None,
    }
}

fn print_usage() {
    println!("Usage: scene_preview --templates <dir> --world <file> [--seed <n>] [--player <name>]");
}

fn print_help() {
    println!("Commands:");
    println!("  spawn <template> [location]  spawn an active scene");
    println!("  at <location>                actions visible at a location");
    println!("  npc <npc>                    actions for an NPC");
    println!("  route <route>                path cards for a route");
    println!("  do <n> [fail]                execute the n-th listed action");
    println!("  coins <n>                    set the player's coins");
    println!("  stat <name> <n>              set a player stat");
    println!("  scenes                       list scenes");
    println!("  check                        playability report");
    println!("  day <n>                      advance the clock, expiring scenes");
    println!("  quit                         exit");
}
