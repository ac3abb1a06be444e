//! WASM bindings for scene-engine, powering the browser template playground.

use wasm_bindgen::prelude::*;

use scene_engine::core::engine::SceneEngine;
use scene_engine::core::instantiator::SceneSpawnContext;
use scene_engine::core::rewards::RewardLedger;
use scene_engine::core::store::TemplateStore;
use scene_engine::core::validation::{validate, validate_main_story_chain, ValidationResult};
use scene_engine::core::world::WorldStore;
use scene_engine::schema::action::ActionId;
use scene_engine::schema::requirement::Player;
use scene_engine::schema::scene::SceneSnapshot;
use scene_engine::schema::template::{ChoiceOutcome, RewardEffect, SceneTemplate};

// ---------------------------------------------------------------------------
// Embedded demo content, compiled into the WASM binary
// ---------------------------------------------------------------------------
mod data {
    pub const MAIN_STORY: &str = include_str!("../../content/inn/templates/main_story.ron");
    pub const SIDE_SCENES: &str = include_str!("../../content/inn/templates/side_scenes.ron");
    pub const WORLD: &str = include_str!("../../content/inn/world.ron");
}

// ---------------------------------------------------------------------------
// JSON helper types for communication across the WASM boundary
// ---------------------------------------------------------------------------
#[derive(serde::Serialize)]
struct TemplateReport {
    id: String,
    #[serde(flatten)]
    result: ValidationResult,
}

#[derive(serde::Serialize)]
struct LintReport {
    is_valid: bool,
    templates: Vec<TemplateReport>,
    chain: ValidationResult,
}

#[derive(serde::Serialize)]
struct ExecutionInfo {
    scene_id: String,
    choice_id: String,
    promoted: Vec<String>,
    discarded: Vec<String>,
    next_situation_id: Option<String>,
    scene_completed: bool,
    rewards: Vec<Vec<RewardEffect>>,
}

#[derive(serde::Serialize)]
struct IssueInfo {
    scene_id: String,
    code: &'static str,
    message: String,
}

fn js_err(context: &str, e: impl std::fmt::Display) -> JsError {
    JsError::new(&format!("{context}: {e}"))
}

fn to_json<T: serde::Serialize>(value: &T) -> Result<String, JsError> {
    serde_json::to_string(value).map_err(|e| js_err("JSON error", e))
}

/// Validate a RON list of scene templates. Returns a JSON report with every
/// error per template plus the main-story chain check.
#[wasm_bindgen]
pub fn validate_templates(ron_src: &str) -> Result<String, JsError> {
    let templates: Vec<SceneTemplate> =
        ron::from_str(ron_src).map_err(|e| js_err("Template parse error", e))?;

    let reports: Vec<TemplateReport> = templates
        .iter()
        .map(|t| TemplateReport {
            id: t.id.clone(),
            result: validate(t),
        })
        .collect();
    let chain = validate_main_story_chain(&templates);

    to_json(&LintReport {
        is_valid: chain.is_valid && reports.iter().all(|r| r.result.is_valid),
        templates: reports,
        chain,
    })
}

// ---------------------------------------------------------------------------
// ScenePlayground: the main exported struct
// ---------------------------------------------------------------------------
#[wasm_bindgen]
pub struct ScenePlayground {
    engine: SceneEngine,
    ledger: RewardLedger,
    player: Player,
}

#[wasm_bindgen]
impl ScenePlayground {
    /// Create a playground over the embedded inn content.
    #[wasm_bindgen(constructor)]
    pub fn new(seed: u64) -> Result<ScenePlayground, JsError> {
        let mut templates = TemplateStore::parse_ron(data::MAIN_STORY)
            .map_err(|e| js_err("Template load error", e))?;
        templates.merge(
            TemplateStore::parse_ron(data::SIDE_SCENES)
                .map_err(|e| js_err("Template load error", e))?,
        );
        let world = WorldStore::parse_ron(data::WORLD).map_err(|e| js_err("World load error", e))?;

        let ledger = RewardLedger::new();
        let engine = SceneEngine::builder()
            .seed(seed)
            .with_templates(templates)
            .with_world(world)
            .with_reward_applier(ledger.clone())
            .build()
            .map_err(|e| js_err("Engine build error", e))?;

        Ok(ScenePlayground {
            engine,
            ledger,
            player: Player::new("Traveler"),
        })
    }

    /// Template ids as a JSON array.
    pub fn template_ids(&self) -> Result<String, JsError> {
        to_json(&self.engine.templates().ids())
    }

    /// Replace the player from JSON (name, coins, resolve, stats, ...).
    pub fn set_player(&mut self, player_json: &str) -> Result<(), JsError> {
        self.player = serde_json::from_str(player_json).map_err(|e| js_err("Invalid player JSON", e))?;
        Ok(())
    }

    /// Spawn an active scene; returns its snapshot as JSON.
    pub fn spawn(&mut self, template_id: &str, location_id: Option<String>) -> Result<String, JsError> {
        let mut ctx = SceneSpawnContext::new(&self.player);
        if let Some(location) = location_id.as_deref() {
            ctx = ctx.at_location(location);
        }
        let id = self
            .engine
            .spawn_scene(template_id, &ctx)
            .map_err(|e| js_err("Spawn error", e))?;
        let snapshot = self.engine.world().scene(&id).map(|s| s.snapshot());
        to_json(&snapshot)
    }

    /// Actions at a location as a JSON array.
    pub fn actions_at(&mut self, location_id: &str) -> Result<String, JsError> {
        let actions = self
            .engine
            .get_actions_at_location(location_id, &self.player)
            .map_err(|e| js_err("Query error", e))?;
        to_json(&actions)
    }

    pub fn actions_for_npc(&mut self, npc_id: &str) -> Result<String, JsError> {
        let actions = self
            .engine
            .get_actions_for_npc(npc_id, &self.player)
            .map_err(|e| js_err("Query error", e))?;
        to_json(&actions)
    }

    pub fn path_cards(&mut self, route_id: &str) -> Result<String, JsError> {
        let actions = self
            .engine
            .get_path_cards_for_route(route_id, &self.player)
            .map_err(|e| js_err("Query error", e))?;
        to_json(&actions)
    }

    /// Execute an action. `failed` resolves a challenge as a failure.
    pub fn execute(&mut self, action_id: &str, failed: bool) -> Result<String, JsError> {
        let outcome = if failed {
            ChoiceOutcome::Failure
        } else {
            ChoiceOutcome::Success
        };
        let rewards_before = self.ledger.len();
        let summary = self
            .engine
            .execute_action(&ActionId(action_id.to_string()), outcome, &self.player)
            .map_err(|e| js_err("Execution error", e))?;

        to_json(&ExecutionInfo {
            scene_id: summary.scene_id.to_string(),
            choice_id: summary.choice_id,
            promoted: summary.promoted.iter().map(|id| id.to_string()).collect(),
            discarded: summary.discarded.iter().map(|id| id.to_string()).collect(),
            next_situation_id: summary.next_situation_id.map(|id| id.to_string()),
            scene_completed: summary.scene_completed,
            rewards: self
                .ledger
                .entries()
                .into_iter()
                .skip(rewards_before)
                .map(|r| r.reward.effects)
                .collect(),
        })
    }

    /// Every scene in the world as a JSON array of snapshots.
    pub fn scenes(&self) -> Result<String, JsError> {
        let snapshots: Vec<SceneSnapshot> = self.engine.world().scenes().iter().map(|s| s.snapshot()).collect();
        to_json(&snapshots)
    }

    /// Playability issues across all active scenes.
    pub fn check(&self) -> Result<String, JsError> {
        let issues: Vec<IssueInfo> = self
            .engine
            .check_all_scenes()
            .into_iter()
            .flat_map(|(scene_id, issues)| {
                issues.into_iter().map(move |issue| IssueInfo {
                    scene_id: scene_id.to_string(),
                    code: issue.code(),
                    message: issue.to_string(),
                })
            })
            .collect();
        to_json(&issues)
    }

    /// Advance the clock; returns the ids of expired scenes.
    pub fn advance_day(&mut self, day: u32) -> Result<String, JsError> {
        let expired: Vec<String> = self
            .engine
            .expire_scenes(day)
            .iter()
            .map(|id| id.to_string())
            .collect();
        to_json(&expired)
    }
}
