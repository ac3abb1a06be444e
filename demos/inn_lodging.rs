/// Inn Lodging example: a two-scene main story with previewed side scenes.
///
/// A traveler arrives at the Salt & Lantern, bargains for a room, sleeps,
/// and sets out along the coast road.
///
/// Run with: cargo run --example inn_lodging

use scene_engine::core::engine::SceneEngine;
use scene_engine::core::instantiator::SceneSpawnContext;
use scene_engine::core::rewards::RewardLedger;
use scene_engine::schema::action::SceneAction;
use scene_engine::schema::requirement::{Player, Stat};
use scene_engine::schema::template::ChoiceOutcome;

fn main() {
    let ledger = RewardLedger::new();
    let mut engine = SceneEngine::builder()
        .seed(2026)
        .templates_dir("content/inn/templates")
        .world_file("content/inn/world.ron")
        .with_reward_applier(ledger.clone())
        .build()
        .expect("Failed to build engine");

    let mut player = Player::new("Wren");
    player.coins = 6;
    player.stats.insert(Stat::Rapport, 3);

    // --- Arrival ---
    let ctx = SceneSpawnContext::new(&player).at_location("common_room");
    let lodging = engine
        .spawn_scene("inn_lodging", &ctx)
        .expect("Failed to spawn inn_lodging");
    let actions = engine
        .get_actions_for_npc("elena", &player)
        .expect("Failed to query Elena");

    // Situations are described when first materialized.
    if let Some(scene) = engine.world().scene(&lodging) {
        println!("=== {} ===", scene.display_name);
        if let Some(text) = scene.current_situation().and_then(|s| s.description.as_deref()) {
            println!("{}\n", text);
        }
    }
    show("At the counter", &actions, &player);

    // Six coins is not enough for a room; talk the price down instead.
    let haggle = actions
        .iter()
        .find(|a| a.choice.id == "haggle")
        .expect("haggle action");
    let summary = engine
        .execute_action(&haggle.id, ChoiceOutcome::Success, &player)
        .expect("Failed to haggle");
    println!(
        "Haggled: {} scene(s) activated, {} discarded\n",
        summary.promoted.len(),
        summary.discarded.len()
    );

    // --- The room upstairs ---
    let room_id = engine
        .world()
        .scene(&lodging)
        .and_then(|s| s.markers.get("generated:private_room"))
        .map(str::to_string)
        .expect("private room marker");
    let rest = engine
        .get_actions_at_location(&room_id, &player)
        .expect("Failed to query room");
    println!("Upstairs: {} action(s); the night passes.\n", rest.len());

    // --- Settling in ---
    let actions = engine
        .get_actions_at_location("common_room", &player)
        .expect("Failed to query common room");
    show("Settling in", &actions, &player);
    let summary = engine
        .execute_action(&actions[0].id, ChoiceOutcome::Success, &player)
        .expect("Failed to turn in");
    println!("A1 complete: {}\n", summary.scene_completed);

    // --- The road ---
    let cards = engine
        .get_path_cards_for_route("coast_road", &player)
        .expect("Failed to query coast road");
    show("The Coast Road", &cards, &player);

    println!("=== Rewards applied ===");
    for applied in ledger.entries() {
        println!("  {}: {:?}", applied.situation_id, applied.reward.effects);
    }

    let issues = engine.check_all_scenes();
    println!("\nPlayability issues: {}", issues.len());
}

fn show(title: &str, actions: &[SceneAction], player: &Player) {
    println!("--- {} ---", title);
    for action in actions {
        let lock = if action.is_available(player) { "" } else { " (locked)" };
        println!("  * {}{}", action.name, lock);
        for preview in &action.previews {
            println!("      {:?}: {}", preview.outcome, preview.display_name);
        }
    }
    println!();
}
