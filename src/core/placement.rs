/// Placement resolution: turn a `PlacementFilter` into a concrete entity,
/// generating one when nothing in the world matches.
use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use thiserror::Error;
use tracing::debug;

use crate::core::instantiator::SceneSpawnContext;
use crate::core::world::{WorldError, WorldStore};
use crate::schema::entity::{EntityOrigin, Location, Npc};
use crate::schema::marker::marker_key;
use crate::schema::placement::{
    LocationRole, Placement, PlacementFilter, PlacementType, Proximity, SelectionStrategy,
};
use crate::schema::scene::SceneId;

#[derive(Debug, Error)]
pub enum PlacementError {
    #[error("no {placement_type} satisfies {filter} (spawn context: {context})")]
    Unsatisfied {
        placement_type: PlacementType,
        filter: String,
        context: String,
    },
    #[error("no placement filter and the spawn context names no entity (spawn context: {context})")]
    NoContext { context: String },
    #[error(transparent)]
    World(#[from] WorldError),
}

/// An entity minted to satisfy a filter.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GeneratedEntity {
    pub kind: PlacementType,
    pub id: String,
    /// Full `generated:<name>` key recorded in the scene's markers.
    pub marker_key: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedPlacement {
    pub placement: Placement,
    pub generated: Option<GeneratedEntity>,
}

const NPC_NAMES: &[&str] = &[
    "Aldric", "Brenna", "Corwin", "Dagny", "Edric", "Fenna", "Garrick", "Hilde", "Ivo", "Jorunn",
    "Kestrel", "Lorcan", "Maren", "Niall", "Orla", "Perrin",
];

fn location_name(role: LocationRole) -> &'static str {
    match role {
        LocationRole::Generic => "Quiet Corner",
        LocationRole::Hub => "Crossroads Square",
        LocationRole::Connective => "Narrow Passage",
        LocationRole::Rest => "Roadside Lodging",
        LocationRole::Boss => "Hollow Keep",
    }
}

/// Resolve where a new scene goes.
///
/// With a filter, matching entities are searched in id order and picked
/// per the filter's selection strategy. When nothing matches, a location or
/// NPC is generated unless the filter requires a pre-existing entity.
/// Routes are never generated. Without a filter, the scene attaches to the
/// most specific entity in the spawn context (NPC, then route, then location).
pub fn resolve_placement(
    world: &mut WorldStore,
    filter: Option<&PlacementFilter>,
    ctx: &SceneSpawnContext<'_>,
    scene_id: &SceneId,
    rng: &mut StdRng,
) -> Result<ResolvedPlacement, PlacementError> {
    let Some(filter) = filter else {
        return placement_from_context(ctx).map(|placement| ResolvedPlacement {
            placement,
            generated: None,
        });
    };

    let candidates = matching_ids(world, filter, ctx);
    let picked = match filter.selection {
        SelectionStrategy::First => candidates.first().cloned(),
        SelectionStrategy::Random => candidates.choose(rng).cloned(),
    };

    if let Some(id) = picked {
        debug!(
            kind = %filter.placement_type,
            id = %id,
            candidates = candidates.len(),
            "placement matched existing entity"
        );
        return Ok(ResolvedPlacement {
            placement: placement_of(filter.placement_type, id),
            generated: None,
        });
    }

    if filter.must_pre_exist || filter.placement_type == PlacementType::Route {
        return Err(PlacementError::Unsatisfied {
            placement_type: filter.placement_type,
            filter: filter.to_string(),
            context: ctx.to_string(),
        });
    }

    let generated = generate_entity(world, filter, ctx, scene_id, rng)?;
    debug!(kind = %generated.kind, id = %generated.id, marker = %generated.marker_key, "generated placement entity");
    Ok(ResolvedPlacement {
        placement: placement_of(generated.kind, generated.id.clone()),
        generated: Some(generated),
    })
}

fn placement_of(kind: PlacementType, id: String) -> Placement {
    match kind {
        PlacementType::Location => Placement::Location(id),
        PlacementType::Npc => Placement::Npc(id),
        PlacementType::Route => Placement::Route(id),
    }
}

fn placement_from_context(ctx: &SceneSpawnContext<'_>) -> Result<Placement, PlacementError> {
    if let Some(npc) = ctx.current_npc_id {
        return Ok(Placement::Npc(npc.to_string()));
    }
    if let Some(route) = ctx.current_route_id {
        return Ok(Placement::Route(route.to_string()));
    }
    if let Some(location) = ctx.current_location_id {
        return Ok(Placement::Location(location.to_string()));
    }
    Err(PlacementError::NoContext {
        context: ctx.to_string(),
    })
}

/// Ids of matching entities, sorted. `SameLocation` is ignored when the
/// context has no current location.
fn matching_ids(world: &WorldStore, filter: &PlacementFilter, ctx: &SceneSpawnContext<'_>) -> Vec<String> {
    let here = match filter.proximity {
        Proximity::SameLocation => ctx.current_location_id,
        Proximity::Anywhere => None,
    };
    match filter.placement_type {
        PlacementType::Location => world
            .locations()
            .filter(|l| here.map_or(true, |h| l.id == h))
            .filter(|l| filter.matches_location(l))
            .map(|l| l.id.clone())
            .collect(),
        PlacementType::Npc => world
            .npcs()
            .filter(|n| here.map_or(true, |h| n.location_id.as_deref() == Some(h)))
            .filter(|n| filter.matches_npc(n))
            .map(|n| n.id.clone())
            .collect(),
        PlacementType::Route => world
            .routes()
            .filter(|r| here.map_or(true, |h| r.origin_location_id == h))
            .filter(|r| filter.matches_route(r))
            .map(|r| r.id.clone())
            .collect(),
    }
}

/// Where a generated NPC stands: the context location, else the context
/// NPC's location, else the origin of the context route.
fn context_location_id(world: &WorldStore, ctx: &SceneSpawnContext<'_>) -> Option<String> {
    if let Some(id) = ctx.current_location_id {
        return Some(id.to_string());
    }
    let npc_location = ctx
        .current_npc_id
        .and_then(|id| world.npc(id))
        .and_then(|n| n.location_id.clone());
    npc_location.or_else(|| {
        ctx.current_route_id
            .and_then(|id| world.route(id))
            .map(|r| r.origin_location_id.clone())
    })
}

fn generate_entity(
    world: &mut WorldStore,
    filter: &PlacementFilter,
    ctx: &SceneSpawnContext<'_>,
    scene_id: &SceneId,
    rng: &mut StdRng,
) -> Result<GeneratedEntity, PlacementError> {
    let marker = filter.marker_name();
    let origin = EntityOrigin::Generated {
        scene_id: scene_id.clone(),
    };
    let kind = filter.placement_type;

    let id = match kind {
        PlacementType::Location => {
            let role = filter.location_roles.first().copied().unwrap_or_default();
            let id = world.next_id(&format!("loc_{}", marker));
            world.insert_location(Location {
                id: id.clone(),
                name: location_name(role).to_string(),
                role,
                tags: filter.location_tags.iter().cloned().collect(),
                origin,
            })?;
            id
        }
        PlacementType::Npc => {
            let location_id = context_location_id(world, ctx);
            let name = NPC_NAMES.choose(rng).copied().unwrap_or("Stranger");
            let id = world.next_id(&format!("npc_{}", marker));
            world.insert_npc(Npc {
                id: id.clone(),
                name: name.to_string(),
                profession: filter.professions.first().copied().unwrap_or_default(),
                personality: filter.personalities.first().copied().unwrap_or_default(),
                location_id,
                tags: filter.npc_tags.iter().cloned().collect(),
                origin,
            })?;
            id
        }
        PlacementType::Route => {
            return Err(PlacementError::Unsatisfied {
                placement_type: kind,
                filter: filter.to_string(),
                context: ctx.to_string(),
            })
        }
    };

    Ok(GeneratedEntity {
        kind,
        id,
        marker_key: marker_key(&marker),
    })
}
