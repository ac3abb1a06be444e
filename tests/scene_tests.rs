/// Scene engine integration tests: spawn, query and execute against RON fixtures.

use scene_engine::core::engine::{EngineError, ExecutionError, SceneEngine};
use scene_engine::core::instantiator::{SceneSpawnContext, SpawnError};
use scene_engine::core::placement::PlacementError;
use scene_engine::core::playability::check_playability;
use scene_engine::core::query::QueryError;
use scene_engine::core::rewards::RewardLedger;
use scene_engine::core::store::TemplateStore;
use scene_engine::core::validation::validate;
use scene_engine::schema::marker::EntityRef;
use scene_engine::schema::placement::Placement;
use scene_engine::schema::requirement::Player;
use scene_engine::schema::scene::SceneState;
use scene_engine::schema::template::{ChoiceOutcome, RewardEffect, StoryCategory};
use std::path::Path;

fn engine(ledger: &RewardLedger) -> SceneEngine {
    SceneEngine::builder()
        .seed(7)
        .with_templates(
            TemplateStore::load_from_ron(Path::new("tests/fixtures/templates.ron")).unwrap(),
        )
        .world_file("tests/fixtures/world.ron")
        .with_reward_applier(ledger.clone())
        .build()
        .unwrap()
}

#[test]
fn main_story_spawn_attaches_to_matching_npc() {
    let ledger = RewardLedger::new();
    let mut engine = engine(&ledger);
    let player = Player::new("Wren");

    let id = engine
        .spawn_scene("a1_gate", &SceneSpawnContext::new(&player).at_location("gate"))
        .unwrap();
    let scene = engine.world().scene(&id).unwrap();
    assert_eq!(scene.state, SceneState::Active);
    assert_eq!(scene.placement, Placement::Npc("warden".to_string()));
    assert_eq!(scene.category, StoryCategory::MainStory);
    assert!(scene.situations.iter().all(|s| s.is_deferred()));
    assert!(scene.current_situation().unwrap().description.is_none());
    assert!(engine.check_scene(&id).unwrap().is_empty());

    // Described once the player first looks.
    engine.get_actions_at_location("gate", &player).unwrap();
    let scene = engine.world().scene(&id).unwrap();
    assert_eq!(
        scene.current_situation().unwrap().description.as_deref(),
        Some("Warden Hale blocks the way into the city gate.")
    );
}

#[test]
fn repeated_queries_return_identical_actions() {
    let ledger = RewardLedger::new();
    let mut engine = engine(&ledger);
    let player = Player::new("Wren");
    engine
        .spawn_scene("a1_gate", &SceneSpawnContext::new(&player).at_location("gate"))
        .unwrap();

    let first = engine.get_actions_at_location("gate", &player).unwrap();
    let scene_count = engine.world().scenes().len();
    let action_count = engine.world().action_count();

    let second = engine.get_actions_at_location("gate", &player).unwrap();
    let via_npc = engine.get_actions_for_npc("warden", &player).unwrap();

    assert_eq!(first.len(), 2);
    assert_eq!(first, second);
    assert_eq!(first, via_npc);
    assert_eq!(engine.world().scenes().len(), scene_count);
    assert_eq!(engine.world().action_count(), action_count);
}

#[test]
fn previewed_child_resolves_its_markers() {
    let ledger = RewardLedger::new();
    let mut engine = engine(&ledger);
    let player = Player::new("Wren");
    engine
        .spawn_scene("a1_gate", &SceneSpawnContext::new(&player).at_location("gate"))
        .unwrap();
    let actions = engine.get_actions_at_location("gate", &player).unwrap();

    let bribe = &actions[0];
    assert_eq!(bribe.name, "Slip Warden Hale five coins");
    assert_eq!(bribe.previews.len(), 1);
    assert_eq!(bribe.previews[0].template_id, "smuggler_den");

    let child = engine.world().scene(&bribe.previews[0].scene_id).unwrap();
    assert_eq!(child.state, SceneState::Provisional);
    assert_eq!(child.placement, Placement::Npc("fence".to_string()));

    let safehouse = child.markers.get("generated:safehouse").unwrap().to_string();
    assert!(engine.world().location(&safehouse).is_some());
    assert_eq!(child.created_location_ids, vec![safehouse.clone()]);
    assert_eq!(
        child.situations[0].required_location_id,
        Some(EntityRef::Id(safehouse))
    );

    // Provisional scenes do not surface in queries of their own placement.
    assert!(engine.get_actions_for_npc("fence", &player).unwrap().is_empty());
}

#[test]
fn choosing_a_sibling_discards_previews_and_their_entities() {
    let ledger = RewardLedger::new();
    let mut engine = engine(&ledger);
    let player = Player::new("Wren");
    let a1 = engine
        .spawn_scene("a1_gate", &SceneSpawnContext::new(&player).at_location("gate"))
        .unwrap();
    let actions = engine.get_actions_at_location("gate", &player).unwrap();
    let child = actions[0].previews[0].scene_id.clone();
    let safehouse = engine
        .world()
        .scene(&child)
        .and_then(|s| s.markers.get("generated:safehouse"))
        .unwrap()
        .to_string();

    let summary = engine
        .execute_action(&actions[1].id, ChoiceOutcome::Success, &player)
        .unwrap();
    assert!(summary.promoted.is_empty());
    assert_eq!(summary.discarded, vec![child.clone()]);
    assert!(!summary.scene_completed);
    assert!(engine.world().scene(&child).is_none());
    assert!(engine.world().location(&safehouse).is_none());
    assert!(engine.world().action(&actions[0].id).is_none());

    let scene = engine.world().scene(&a1).unwrap();
    assert_eq!(scene.current_situation().unwrap().template_id, "inside");

    let next = engine.get_actions_at_location("gate", &player).unwrap();
    assert_eq!(next.len(), 1);
    assert_eq!(next[0].choice.id, "enter");
    assert_eq!(next[0].previews[0].template_id, "a2_market");
}

#[test]
fn main_story_chains_into_the_next_scene() {
    let ledger = RewardLedger::new();
    let mut engine = engine(&ledger);
    let mut player = Player::new("Wren");
    player.coins = 5;
    let a1 = engine
        .spawn_scene("a1_gate", &SceneSpawnContext::new(&player).at_location("gate"))
        .unwrap();

    let actions = engine.get_actions_at_location("gate", &player).unwrap();
    assert!(actions[0].is_available(&player));
    let summary = engine
        .execute_action(&actions[0].id, ChoiceOutcome::Success, &player)
        .unwrap();
    assert_eq!(summary.promoted.len(), 1);
    assert_eq!(ledger.entries()[0].reward.effects, vec![RewardEffect::Coins(-5)]);

    let den = engine.get_actions_for_npc("fence", &player).unwrap();
    assert_eq!(den.len(), 1);
    assert_eq!(den[0].name, "Follow Nim");

    let enter = engine.get_actions_at_location("gate", &player).unwrap();
    let enter = enter.iter().find(|a| a.choice.id == "enter").unwrap();
    let summary = engine
        .execute_action(&enter.id, ChoiceOutcome::Success, &player)
        .unwrap();
    assert!(summary.scene_completed);
    assert_eq!(engine.world().scene(&a1).unwrap().state, SceneState::Complete);

    let market = engine.get_actions_at_location("market", &player).unwrap();
    assert_eq!(market.len(), 1);
    assert_eq!(market[0].name, "Look around the market");
}

#[test]
fn executed_action_cannot_be_replayed() {
    let ledger = RewardLedger::new();
    let mut engine = engine(&ledger);
    let player = Player::new("Wren");
    engine
        .spawn_scene("a1_gate", &SceneSpawnContext::new(&player).at_location("gate"))
        .unwrap();
    let actions = engine.get_actions_at_location("gate", &player).unwrap();
    engine
        .execute_action(&actions[1].id, ChoiceOutcome::Success, &player)
        .unwrap();

    let err = engine
        .execute_action(&actions[1].id, ChoiceOutcome::Success, &player)
        .unwrap_err();
    assert!(matches!(
        err,
        EngineError::Execution(ExecutionError::UnknownAction(_))
    ));
    assert_eq!(ledger.len(), 1);
}

#[test]
fn auto_advance_applies_rewards_once_and_yields_no_actions() {
    let ledger = RewardLedger::new();
    let mut engine = engine(&ledger);
    let player = Player::new("Wren");
    let id = engine
        .spawn_scene("rest_stop", &SceneSpawnContext::new(&player).at_location("market"))
        .unwrap();

    assert!(engine.get_actions_at_location("market", &player).unwrap().is_empty());
    assert_eq!(ledger.len(), 1);
    assert_eq!(ledger.entries()[0].reward.effects, vec![RewardEffect::Resolve(2)]);

    assert!(engine.get_actions_at_location("market", &player).unwrap().is_empty());
    assert_eq!(ledger.len(), 1);
    assert_eq!(engine.world().scene(&id).unwrap().state, SceneState::Complete);
}

#[test]
fn auto_advance_then_offers_the_next_situation() {
    let ledger = RewardLedger::new();
    let mut engine = engine(&ledger);
    let player = Player::new("Wren");
    let id = engine
        .spawn_scene("dawn_watch", &SceneSpawnContext::new(&player).at_location("docks"))
        .unwrap();

    assert!(engine.get_actions_at_location("docks", &player).unwrap().is_empty());
    assert_eq!(ledger.len(), 1);

    let actions = engine.get_actions_at_location("docks", &player).unwrap();
    assert_eq!(actions.len(), 1);
    assert_eq!(actions[0].name, "Signal the boats");
    let scene = engine.world().scene(&id).unwrap();
    assert_eq!(
        scene.current_situation().unwrap().description.as_deref(),
        Some("Fog rolls in over the docks.")
    );
    assert_eq!(ledger.len(), 1);
}

#[test]
fn auto_advance_onto_an_unplayable_situation_is_refused() {
    let ledger = RewardLedger::new();
    let mut engine = engine(&ledger);
    let player = Player::new("Wren");
    let id = engine
        .spawn_scene("walk_on", &SceneSpawnContext::new(&player).at_location("market"))
        .unwrap();

    let err = engine.get_actions_at_location("market", &player).unwrap_err();
    match &err {
        EngineError::Query(QueryError::Playability(e)) => assert!(e.has_code("PLAY_006")),
        other => panic!("unexpected error: {}", other),
    }
    assert!(err.to_string().contains("ghost"), "{}", err);

    // Nothing moved and nothing was paid out.
    let scene = engine.world().scene(&id).unwrap();
    assert_eq!(scene.current_situation().unwrap().template_id, "set_off");
    assert!(scene.current_situation().unwrap().is_deferred());
    assert_eq!(ledger.len(), 0);

    assert!(engine.get_actions_at_location("market", &player).is_err());
    assert_eq!(ledger.len(), 0);
}

#[test]
fn self_transition_keeps_every_choice_playable() {
    let ledger = RewardLedger::new();
    let mut engine = engine(&ledger);
    let player = Player::new("Wren");
    let toll = engine
        .spawn_scene("toll_loop", &SceneSpawnContext::new(&player).at_location("gate"))
        .unwrap();
    let actions = engine.get_actions_at_location("gate", &player).unwrap();
    assert_eq!(actions.len(), 2);
    let (pay, argue) = (&actions[0], &actions[1]);
    let first_argue_preview = argue.previews[0].scene_id.clone();

    let summary = engine
        .execute_action(&pay.id, ChoiceOutcome::Success, &player)
        .unwrap();
    assert_eq!(summary.promoted, vec![pay.previews[0].scene_id.clone()]);
    assert_eq!(summary.discarded, vec![first_argue_preview.clone()]);
    assert_eq!(summary.next_situation_id.as_ref(), Some(&pay.situation_id));
    assert!(!summary.scene_completed);

    // The kept sibling points at a fresh, live preview.
    let refreshed = engine.world().action(&argue.id).unwrap().previews[0].scene_id.clone();
    assert_ne!(refreshed, first_argue_preview);
    assert_eq!(
        engine.world().scene(&refreshed).unwrap().state,
        SceneState::Provisional
    );

    let summary = engine
        .execute_action(&argue.id, ChoiceOutcome::Success, &player)
        .unwrap();
    assert_eq!(summary.promoted, vec![refreshed]);

    let again = engine
        .execute_action(&pay.id, ChoiceOutcome::Success, &player)
        .unwrap();
    assert_eq!(again.promoted.len(), 1);
    assert_ne!(again.promoted[0], pay.previews[0].scene_id);

    let rests = |state: SceneState| {
        engine
            .world()
            .scenes()
            .iter()
            .filter(|s| s.template_id == "rest_stop" && s.state == state)
            .count()
    };
    assert_eq!(rests(SceneState::Active), 3);
    assert_eq!(rests(SceneState::Provisional), 2);
    assert!(engine.check_scene(&toll).unwrap().is_empty());
}

#[test]
fn generated_npc_stands_where_the_player_met_it() {
    let ledger = RewardLedger::new();
    let player = Player::new("Wren");

    let cases = [
        (SceneSpawnContext::new(&player).with_npc("warden"), "gate"),
        (SceneSpawnContext::new(&player).on_route("marsh_track"), "market"),
    ];
    for (ctx, location) in cases {
        let mut engine = engine(&ledger);
        let id = engine.spawn_scene("stranger", &ctx).unwrap();
        let Placement::Npc(npc_id) = engine.world().scene(&id).unwrap().placement.clone() else {
            panic!("expected an NPC placement");
        };
        assert_eq!(
            engine.world().npc(&npc_id).unwrap().location_id.as_deref(),
            Some(location)
        );

        let actions = engine.get_actions_at_location(location, &player).unwrap();
        assert_eq!(actions.len(), 1);
        assert!(actions[0].name.starts_with("Point "), "{}", actions[0].name);
    }
}

#[test]
fn npc_with_nowhere_to_stand_is_refused() {
    let ledger = RewardLedger::new();
    let mut engine = engine(&ledger);
    let player = Player::new("Wren");
    let npcs_before = engine.world().npcs().count();

    let err = engine
        .spawn_scene("stranger", &SceneSpawnContext::new(&player))
        .unwrap_err();
    assert!(matches!(err, EngineError::Spawn(SpawnError::Playability(ref e)) if e.has_code("PLAY_010")));
    assert!(engine.world().scenes().is_empty());
    assert_eq!(engine.world().npcs().count(), npcs_before);
}

#[test]
fn gated_main_story_situation_is_a_soft_lock_risk() {
    let ledger = RewardLedger::new();
    let mut engine = engine(&ledger);
    let player = Player::new("Wren");
    let id = engine
        .spawn_scene("gated_talk", &SceneSpawnContext::new(&player).at_location("gate"))
        .unwrap();

    // Fine as a side story; the same situation on the main story has no
    // guaranteed way forward.
    let mut scene = engine.world().scene(&id).unwrap().clone();
    scene.category = StoryCategory::MainStory;
    scene.main_story_sequence = Some(3);
    let issues = check_playability(&scene, engine.templates(), engine.world());
    assert_eq!(issues.len(), 1);
    let message = issues[0].to_string();
    assert!(message.starts_with("SOFT LOCK RISK"), "{}", message);
    assert!(message.contains("(A3)"), "{}", message);
    assert!(message.contains("plead"), "{}", message);

    let mut template = engine.templates().get("gated_talk").unwrap().clone();
    template.category = StoryCategory::MainStory;
    template.main_story_sequence = Some(3);
    assert!(validate(&template).has_code("ASTORY_004"));
}

#[test]
fn unresolved_marker_rolls_back_the_whole_spawn() {
    let ledger = RewardLedger::new();
    let mut engine = engine(&ledger);
    let player = Player::new("Wren");
    let npcs_before = engine.world().npcs().count();

    let err = engine
        .spawn_scene("orphan_hideout", &SceneSpawnContext::new(&player).at_location("docks"))
        .unwrap_err();
    let text = err.to_string();
    assert!(text.contains("generated:safehouse"), "{}", text);
    assert!(matches!(err, EngineError::Spawn(SpawnError::Playability(ref e)) if e.has_code("PLAY_008")));

    assert!(engine.world().scenes().is_empty());
    assert_eq!(engine.world().npcs().count(), npcs_before);
}

#[test]
fn unsatisfied_route_filter_names_template_and_context() {
    let ledger = RewardLedger::new();
    let mut engine = engine(&ledger);
    let player = Player::new("Wren");

    let err = engine
        .spawn_scene("ambush", &SceneSpawnContext::new(&player).at_location("market"))
        .unwrap_err();
    match &err {
        EngineError::Spawn(SpawnError::Placement { template_id, source }) => {
            assert_eq!(template_id, "ambush");
            assert!(matches!(source, PlacementError::Unsatisfied { .. }));
        }
        other => panic!("unexpected error: {}", other),
    }
    let text = err.to_string();
    assert!(text.contains("Swamp"), "{}", text);
    assert!(text.contains("market"), "{}", text);
    assert!(engine.world().scenes().is_empty());
}

#[test]
fn route_scenes_surface_as_path_cards_and_at_their_origin() {
    let ledger = RewardLedger::new();
    let mut engine = engine(&ledger);
    let player = Player::new("Wren");
    let id = engine
        .spawn_scene("caravan", &SceneSpawnContext::new(&player).at_location("gate"))
        .unwrap();
    assert_eq!(
        engine.world().scene(&id).unwrap().placement,
        Placement::Route("north_road".to_string())
    );

    let cards = engine.get_path_cards_for_route("north_road", &player).unwrap();
    assert_eq!(cards.len(), 2);
    assert_eq!(cards[0].name, "Trade with the caravan on the north road");
    assert_eq!(engine.get_actions_at_location("gate", &player).unwrap(), cards);
    assert!(engine.get_actions_at_location("market", &player).unwrap().is_empty());
}

#[test]
fn scenes_expire_on_their_day() {
    let ledger = RewardLedger::new();
    let mut engine = engine(&ledger);
    let player = Player::new("Wren");
    let id = engine
        .spawn_scene("gated_talk", &SceneSpawnContext::new(&player).at_location("gate"))
        .unwrap();
    assert_eq!(engine.world().scene(&id).unwrap().expires_on_day, Some(2));

    assert!(engine.expire_scenes(1).is_empty());
    assert_eq!(engine.expire_scenes(2), vec![id.clone()]);
    assert!(engine.world().scene(&id).is_none());
    assert_eq!(engine.day(), 2);
}

#[test]
fn same_seed_same_world() {
    let run = || {
        let ledger = RewardLedger::new();
        let mut engine = engine(&ledger);
        let player = Player::new("Wren");
        engine
            .spawn_scene("a1_gate", &SceneSpawnContext::new(&player).at_location("gate"))
            .unwrap();
        engine
            .get_actions_at_location("gate", &player)
            .unwrap()
            .into_iter()
            .map(|a| a.id)
            .collect::<Vec<_>>()
    };
    assert_eq!(run(), run());
}

#[test]
fn inn_content_walkthrough() {
    let ledger = RewardLedger::new();
    let mut engine = SceneEngine::builder()
        .seed(2026)
        .templates_dir("content/inn/templates")
        .world_file("content/inn/world.ron")
        .with_reward_applier(ledger.clone())
        .build()
        .unwrap();
    assert!(engine.templates().validate_chain().is_valid);

    let player = Player::new("Wren");
    let lodging = engine
        .spawn_scene("inn_lodging", &SceneSpawnContext::new(&player).at_location("common_room"))
        .unwrap();

    let actions = engine.get_actions_for_npc("elena", &player).unwrap();
    assert_eq!(actions.len(), 3);
    assert_eq!(actions[0].name, "Pay Elena ten coins for a room");
    assert!(!actions[0].is_available(&player));
    assert_eq!(actions[1].previews.len(), 2);

    let work = &actions[2];
    let summary = engine
        .execute_action(&work.id, ChoiceOutcome::Success, &player)
        .unwrap();
    assert_eq!(summary.discarded.len(), 3);

    let settle = engine.get_actions_at_location("common_room", &player).unwrap();
    assert_eq!(settle.len(), 1);
    assert_eq!(settle[0].previews[0].template_id, "coast_departure");
    engine
        .execute_action(&settle[0].id, ChoiceOutcome::Success, &player)
        .unwrap();
    assert_eq!(engine.world().scene(&lodging).unwrap().state, SceneState::Complete);

    let cards = engine.get_path_cards_for_route("coast_road", &player).unwrap();
    assert_eq!(cards.len(), 2);
    assert_eq!(cards[0].name, "Walk the coast road");
    assert!(engine.check_all_scenes().is_empty());
}
