/// World entity store: typed repositories for locations, NPCs, routes,
/// items, scenes and materialized actions.
///
/// Every mutation is journaled while a `WorldTransaction` is open, so a
/// spawn or query that fails half-way can be undone in full.
use rustc_hash::FxHashMap;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::ops::{Deref, DerefMut};
use std::path::Path;
use thiserror::Error;
use tracing::{debug, info};

use crate::schema::action::{ActionId, SceneAction};
use crate::schema::entity::{Item, Location, Npc, Route};
use crate::schema::placement::{Placement, PlacementType};
use crate::schema::scene::{Scene, SceneId, SceneState, SituationId};

#[derive(Debug, Error)]
pub enum WorldError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("RON error: {0}")]
    Ron(#[from] ron::error::SpannedError),
    #[error("duplicate {kind} id '{id}'")]
    DuplicateEntity { kind: &'static str, id: String },
    #[error("route '{route}' references unknown location '{location}'")]
    DanglingRoute { route: String, location: String },
}

/// Authored world content, as loaded from a RON seed file.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct WorldSeed {
    #[serde(default)]
    pub locations: Vec<Location>,
    #[serde(default)]
    pub npcs: Vec<Npc>,
    #[serde(default)]
    pub routes: Vec<Route>,
    #[serde(default)]
    pub items: Vec<Item>,
}

#[derive(Debug, Clone)]
enum JournalEntry {
    LocationInserted(String),
    LocationRemoved(Location),
    NpcInserted(String),
    NpcRemoved(Npc),
    ItemInserted(String),
    ItemRemoved(Item),
    SceneInserted(SceneId),
    SceneReplaced(Scene),
    SceneRemoved { index: usize, scene: Scene },
    ActionInserted(ActionId),
    ActionRemoved(SceneAction),
    Serial(u64),
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct WorldStore {
    locations: BTreeMap<String, Location>,
    npcs: BTreeMap<String, Npc>,
    routes: BTreeMap<String, Route>,
    items: BTreeMap<String, Item>,
    /// Spawn order.
    scenes: Vec<Scene>,
    actions: FxHashMap<ActionId, SceneAction>,
    next_serial: u64,
    #[serde(skip)]
    journal: Vec<JournalEntry>,
    #[serde(skip)]
    depth: usize,
}

impl WorldStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_seed(seed: WorldSeed) -> Result<WorldStore, WorldError> {
        let mut world = WorldStore::new();
        for location in seed.locations {
            world.insert_location(location)?;
        }
        for npc in seed.npcs {
            world.insert_npc(npc)?;
        }
        for route in seed.routes {
            world.insert_route(route)?;
        }
        for item in seed.items {
            world.insert_item(item)?;
        }
        Ok(world)
    }

    pub fn parse_ron(input: &str) -> Result<WorldStore, WorldError> {
        let seed: WorldSeed = ron::from_str(input)?;
        Self::from_seed(seed)
    }

    pub fn load_from_ron(path: &Path) -> Result<WorldStore, WorldError> {
        let contents = std::fs::read_to_string(path)?;
        let world = Self::parse_ron(&contents)?;
        info!(
            path = %path.display(),
            locations = world.locations.len(),
            npcs = world.npcs.len(),
            routes = world.routes.len(),
            items = world.items.len(),
            "loaded world seed"
        );
        Ok(world)
    }

    // ---- transactions ----

    /// Open a transaction. Dropping the guard without `commit` undoes every
    /// mutation made through it.
    pub fn transaction(&mut self) -> WorldTransaction<'_> {
        self.depth += 1;
        let mark = self.journal.len();
        WorldTransaction {
            world: self,
            mark,
            committed: false,
        }
    }

    fn record(&mut self, entry: JournalEntry) {
        if self.depth > 0 {
            self.journal.push(entry);
        }
    }

    fn rollback_to(&mut self, mark: usize) {
        while self.journal.len() > mark {
            let Some(entry) = self.journal.pop() else {
                break;
            };
            match entry {
                JournalEntry::LocationInserted(id) => {
                    self.locations.remove(&id);
                }
                JournalEntry::LocationRemoved(location) => {
                    self.locations.insert(location.id.clone(), location);
                }
                JournalEntry::NpcInserted(id) => {
                    self.npcs.remove(&id);
                }
                JournalEntry::NpcRemoved(npc) => {
                    self.npcs.insert(npc.id.clone(), npc);
                }
                JournalEntry::ItemInserted(id) => {
                    self.items.remove(&id);
                }
                JournalEntry::ItemRemoved(item) => {
                    self.items.insert(item.id.clone(), item);
                }
                JournalEntry::SceneInserted(id) => {
                    self.scenes.retain(|s| s.id != id);
                }
                JournalEntry::SceneReplaced(old) => {
                    if let Some(slot) = self.scenes.iter_mut().find(|s| s.id == old.id) {
                        *slot = old;
                    }
                }
                JournalEntry::SceneRemoved { index, scene } => {
                    let index = index.min(self.scenes.len());
                    self.scenes.insert(index, scene);
                }
                JournalEntry::ActionInserted(id) => {
                    self.actions.remove(&id);
                }
                JournalEntry::ActionRemoved(action) => {
                    self.actions.insert(action.id.clone(), action);
                }
                JournalEntry::Serial(old) => {
                    self.next_serial = old;
                }
            }
        }
    }

    /// Fresh serial-suffixed id, e.g. `scene_lodging_3`.
    pub fn next_id(&mut self, prefix: &str) -> String {
        let old = self.next_serial;
        self.next_serial += 1;
        self.record(JournalEntry::Serial(old));
        format!("{}_{}", prefix, self.next_serial)
    }

    // ---- entities ----

    pub fn insert_location(&mut self, location: Location) -> Result<(), WorldError> {
        if self.locations.contains_key(&location.id) {
            return Err(WorldError::DuplicateEntity {
                kind: "location",
                id: location.id,
            });
        }
        self.record(JournalEntry::LocationInserted(location.id.clone()));
        self.locations.insert(location.id.clone(), location);
        Ok(())
    }

    pub fn insert_npc(&mut self, npc: Npc) -> Result<(), WorldError> {
        if self.npcs.contains_key(&npc.id) {
            return Err(WorldError::DuplicateEntity {
                kind: "NPC",
                id: npc.id,
            });
        }
        self.record(JournalEntry::NpcInserted(npc.id.clone()));
        self.npcs.insert(npc.id.clone(), npc);
        Ok(())
    }

    /// Routes are authored only; both endpoints must already exist.
    pub fn insert_route(&mut self, route: Route) -> Result<(), WorldError> {
        if self.routes.contains_key(&route.id) {
            return Err(WorldError::DuplicateEntity {
                kind: "route",
                id: route.id,
            });
        }
        for end in [&route.origin_location_id, &route.destination_location_id] {
            if !self.locations.contains_key(end) {
                return Err(WorldError::DanglingRoute {
                    route: route.id.clone(),
                    location: end.clone(),
                });
            }
        }
        self.routes.insert(route.id.clone(), route);
        Ok(())
    }

    pub fn insert_item(&mut self, item: Item) -> Result<(), WorldError> {
        if self.items.contains_key(&item.id) {
            return Err(WorldError::DuplicateEntity {
                kind: "item",
                id: item.id,
            });
        }
        self.record(JournalEntry::ItemInserted(item.id.clone()));
        self.items.insert(item.id.clone(), item);
        Ok(())
    }

    pub fn location(&self, id: &str) -> Option<&Location> {
        self.locations.get(id)
    }

    pub fn npc(&self, id: &str) -> Option<&Npc> {
        self.npcs.get(id)
    }

    pub fn route(&self, id: &str) -> Option<&Route> {
        self.routes.get(id)
    }

    pub fn item(&self, id: &str) -> Option<&Item> {
        self.items.get(id)
    }

    /// Iteration is in id order.
    pub fn locations(&self) -> impl Iterator<Item = &Location> {
        self.locations.values()
    }

    pub fn npcs(&self) -> impl Iterator<Item = &Npc> {
        self.npcs.values()
    }

    pub fn routes(&self) -> impl Iterator<Item = &Route> {
        self.routes.values()
    }

    pub fn items(&self) -> impl Iterator<Item = &Item> {
        self.items.values()
    }

    pub fn npcs_at<'a>(&'a self, location_id: &'a str) -> impl Iterator<Item = &'a Npc> {
        self.npcs
            .values()
            .filter(move |n| n.location_id.as_deref() == Some(location_id))
    }

    pub fn routes_from<'a>(&'a self, location_id: &'a str) -> impl Iterator<Item = &'a Route> {
        self.routes
            .values()
            .filter(move |r| r.origin_location_id == location_id)
    }

    pub fn has_entity(&self, kind: PlacementType, id: &str) -> bool {
        match kind {
            PlacementType::Location => self.locations.contains_key(id),
            PlacementType::Npc => self.npcs.contains_key(id),
            PlacementType::Route => self.routes.contains_key(id),
        }
    }

    pub fn has_placement(&self, placement: &Placement) -> bool {
        self.has_entity(placement.placement_type(), placement.id())
    }

    /// Display name of the entity a placement points at.
    pub fn placement_name(&self, placement: &Placement) -> Option<&str> {
        match placement {
            Placement::Location(id) => self.location(id).map(|l| l.name.as_str()),
            Placement::Npc(id) => self.npc(id).map(|n| n.name.as_str()),
            Placement::Route(id) => self.route(id).map(|r| r.name.as_str()),
        }
    }

    /// The location a placement sits at: the location itself, the NPC's
    /// current location, or the route's origin.
    pub fn placement_location_id<'a>(&'a self, placement: &'a Placement) -> Option<&'a str> {
        match placement {
            Placement::Location(id) => Some(id.as_str()),
            Placement::Npc(id) => self.npc(id).and_then(|n| n.location_id.as_deref()),
            Placement::Route(id) => self.route(id).map(|r| r.origin_location_id.as_str()),
        }
    }

    // ---- scenes ----

    pub fn scenes(&self) -> &[Scene] {
        &self.scenes
    }

    pub fn scene(&self, id: &SceneId) -> Option<&Scene> {
        self.scenes.iter().find(|s| &s.id == id)
    }

    pub fn insert_scene(&mut self, scene: Scene) {
        self.record(JournalEntry::SceneInserted(scene.id.clone()));
        self.scenes.push(scene);
    }

    /// Mutate a scene in place. The previous value is journaled.
    pub fn update_scene<R, F>(&mut self, id: &SceneId, update: F) -> Option<R>
    where
        F: FnOnce(&mut Scene) -> R,
    {
        let index = self.scenes.iter().position(|s| &s.id == id)?;
        if self.depth > 0 {
            let old = self.scenes[index].clone();
            self.journal.push(JournalEntry::SceneReplaced(old));
        }
        Some(update(&mut self.scenes[index]))
    }

    pub fn remove_scene(&mut self, id: &SceneId) -> Option<Scene> {
        let index = self.scenes.iter().position(|s| &s.id == id)?;
        let scene = self.scenes.remove(index);
        self.record(JournalEntry::SceneRemoved {
            index,
            scene: scene.clone(),
        });
        Some(scene)
    }

    /// Provisional scenes previewed by choices of `situation_id`.
    pub fn provisional_children(&self, situation_id: &SituationId) -> Vec<SceneId> {
        self.scenes
            .iter()
            .filter(|s| {
                s.state == SceneState::Provisional
                    && s.source_situation_id.as_ref() == Some(situation_id)
            })
            .map(|s| s.id.clone())
            .collect()
    }

    /// Remove a scene together with its actions, the entities it generated
    /// and any provisional scenes its own situations previewed.
    pub fn discard_scene(&mut self, id: &SceneId) -> Vec<SceneId> {
        let Some(scene) = self.remove_scene(id) else {
            return Vec::new();
        };
        let mut discarded = vec![scene.id.clone()];

        for situation in &scene.situations {
            for action_id in situation.action_ids() {
                self.remove_action(action_id);
            }
            for child in self.provisional_children(&situation.id) {
                discarded.extend(self.discard_scene(&child));
            }
        }

        let generated_npcs: Vec<String> = self
            .npcs
            .values()
            .filter(|n| n.origin.generated_by(&scene.id))
            .map(|n| n.id.clone())
            .collect();
        for npc_id in generated_npcs {
            if let Some(npc) = self.npcs.remove(&npc_id) {
                self.record(JournalEntry::NpcRemoved(npc));
            }
        }
        for location_id in &scene.created_location_ids {
            if let Some(location) = self.locations.remove(location_id) {
                self.record(JournalEntry::LocationRemoved(location));
            }
        }
        for item_id in &scene.created_item_ids {
            if let Some(item) = self.items.remove(item_id) {
                self.record(JournalEntry::ItemRemoved(item));
            }
        }

        debug!(scene = %scene.id, template = %scene.template_id, "discarded scene");
        discarded
    }

    /// Discard every non-complete scene whose expiry day has been reached.
    pub fn expire_scenes(&mut self, day: u32) -> Vec<SceneId> {
        let expired: Vec<SceneId> = self
            .scenes
            .iter()
            .filter(|s| s.state != SceneState::Complete && s.is_expired(day))
            .map(|s| s.id.clone())
            .collect();
        let mut removed = Vec::new();
        for id in expired {
            removed.extend(self.discard_scene(&id));
        }
        if !removed.is_empty() {
            info!(day, count = removed.len(), "expired scenes");
        }
        removed
    }

    // ---- actions ----

    pub fn action(&self, id: &ActionId) -> Option<&SceneAction> {
        self.actions.get(id)
    }

    pub fn contains_action(&self, id: &ActionId) -> bool {
        self.actions.contains_key(id)
    }

    pub fn insert_action(&mut self, action: SceneAction) {
        self.record(JournalEntry::ActionInserted(action.id.clone()));
        self.actions.insert(action.id.clone(), action);
    }

    /// Mutate an action in place. The previous value is journaled.
    pub fn update_action<R, F>(&mut self, id: &ActionId, update: F) -> Option<R>
    where
        F: FnOnce(&mut SceneAction) -> R,
    {
        let action = self.actions.get_mut(id)?;
        if self.depth > 0 {
            self.journal.push(JournalEntry::ActionRemoved(action.clone()));
        }
        Some(update(action))
    }

    pub fn remove_action(&mut self, id: &ActionId) -> Option<SceneAction> {
        let action = self.actions.remove(id)?;
        self.record(JournalEntry::ActionRemoved(action.clone()));
        Some(action)
    }

    pub fn action_count(&self) -> usize {
        self.actions.len()
    }
}

/// Scoped write access to a `WorldStore`. Rolls back on drop unless
/// `commit` was called.
pub struct WorldTransaction<'a> {
    world: &'a mut WorldStore,
    mark: usize,
    committed: bool,
}

impl WorldTransaction<'_> {
    pub fn commit(mut self) {
        self.committed = true;
    }
}

impl Deref for WorldTransaction<'_> {
    type Target = WorldStore;

    fn deref(&self) -> &WorldStore {
        self.world
    }
}

impl DerefMut for WorldTransaction<'_> {
    fn deref_mut(&mut self) -> &mut WorldStore {
        self.world
    }
}

impl Drop for WorldTransaction<'_> {
    fn drop(&mut self) {
        if !self.committed {
            self.world.rollback_to(self.mark);
            debug!("world transaction rolled back");
        }
        self.world.depth = self.world.depth.saturating_sub(1);
        if self.world.depth == 0 {
            self.world.journal.clear();
        }
    }
}
