/// Reward application seam. The engine decides *when* a reward fires; what
/// coins, bonds or states mean to the game is up to the applier.
use std::cell::RefCell;
use std::rc::Rc;
use tracing::debug;

use crate::schema::scene::{SceneId, Situation, SituationId};
use crate::schema::template::RewardTemplate;

pub trait RewardApplier {
    fn apply_reward(&mut self, reward: &RewardTemplate, situation: &Situation);
}

/// One reward handed to the applier.
#[derive(Debug, Clone, PartialEq)]
pub struct AppliedReward {
    pub situation_id: SituationId,
    pub reward: RewardTemplate,
}

impl AppliedReward {
    /// Scene id is the situation id's prefix.
    pub fn scene_id(&self) -> Option<SceneId> {
        self.situation_id
            .0
            .split_once("::")
            .map(|(scene, _)| SceneId(scene.to_string()))
    }
}

/// Records every applied reward. Clones share the same log, so a caller can
/// keep a handle while the engine owns the applier.
#[derive(Debug, Clone, Default)]
pub struct RewardLedger {
    entries: Rc<RefCell<Vec<AppliedReward>>>,
}

impl RewardLedger {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn entries(&self) -> Vec<AppliedReward> {
        self.entries.borrow().clone()
    }

    pub fn len(&self) -> usize {
        self.entries.borrow().len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.borrow().is_empty()
    }
}

impl RewardApplier for RewardLedger {
    fn apply_reward(&mut self, reward: &RewardTemplate, situation: &Situation) {
        debug!(
            situation = %situation.id,
            effects = reward.effects.len(),
            spawns = reward.scenes_to_spawn.len(),
            "reward applied"
        );
        self.entries.borrow_mut().push(AppliedReward {
            situation_id: situation.id.clone(),
            reward: reward.clone(),
        });
    }
}
