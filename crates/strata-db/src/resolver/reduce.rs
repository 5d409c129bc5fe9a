//! Precedence reduction over per-realm scans.
//!
//! Pure: takes already loaded entities and `overrides` edges and decides,
//! for every logical name, which entity the caller sees.

use std::collections::{BTreeMap, HashMap};

use strata_core::RealmRef;
use strata_core::entities::{Entity, Relationship};
use strata_core::responses::{AccessPath, ResolvedEntity};

use crate::repos::EntityFilter;

/// Live entities of one visible realm.
#[derive(Debug, Clone, PartialEq)]
pub struct RealmScan {
    pub realm: RealmRef,
    pub entities: Vec<Entity>,
}

/// Outcome of reducing a caller's scans.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Resolution {
    /// Logical name to winning entity id.
    winners: BTreeMap<String, String>,
    /// Visible entity id to the logical name it was scanned under.
    names: HashMap<String, String>,
    /// Winning entities by id.
    resolved: BTreeMap<String, ResolvedEntity>,
}

impl Resolution {
    /// The winner of a logical name, following overrides.
    #[must_use]
    pub fn winner(&self, name: &str) -> Option<&ResolvedEntity> {
        self.winners.get(name).and_then(|id| self.resolved.get(id))
    }

    /// Map any visible entity id to the entity that wins its name.
    #[must_use]
    pub fn winner_of_id(&self, entity_id: &str) -> Option<&ResolvedEntity> {
        self.names.get(entity_id).and_then(|name| self.winner(name))
    }

    /// Ids of every visible entity, winners and losers alike.
    pub fn visible_ids(&self) -> impl Iterator<Item = &str> {
        self.names.keys().map(String::as_str)
    }

    /// Winners passing `filter`, one per entity, ordered by tier then name.
    ///
    /// The name condition matches a winner's own name or any name it won
    /// through an override.
    #[must_use]
    pub fn select(&self, filter: &EntityFilter) -> Vec<ResolvedEntity> {
        let mut selected: Vec<ResolvedEntity> = self
            .resolved
            .values()
            .filter(|r| {
                filter.name.as_deref().is_none_or(|n| {
                    r.entity.entity_name == n || r.overrides.iter().any(|o| o == n)
                })
            })
            .filter(|r| {
                filter
                    .kind
                    .as_deref()
                    .is_none_or(|k| r.entity.entity_kind == k)
            })
            .cloned()
            .collect();
        selected.sort_by(|a, b| {
            a.access_path
                .tier
                .cmp(&b.access_path.tier)
                .then_with(|| a.entity.entity_name.cmp(&b.entity.entity_name))
        });
        if let Some(limit) = filter.limit {
            selected.truncate(usize::try_from(limit).unwrap_or(usize::MAX));
        }
        selected
    }
}

/// Group scans by name and keep the highest-precedence entity of each.
///
/// Ties within a tier go to the lower realm id. `overrides` edges are then
/// applied: a winner W with an edge to an entity T in a strictly lower tier
/// takes over T's name, unless that name is already won at W's tier or
/// above. Edges whose endpoints are not visible are ignored.
#[must_use]
pub fn reduce(scans: Vec<RealmScan>, overrides: &[Relationship]) -> Resolution {
    let mut groups: BTreeMap<String, Vec<Entity>> = BTreeMap::new();
    let mut by_id: HashMap<String, Entity> = HashMap::new();
    for scan in scans {
        for entity in scan.entities {
            by_id.insert(entity.id.clone(), entity.clone());
            groups.entry(entity.entity_name.clone()).or_default().push(entity);
        }
    }

    let mut resolution = Resolution::default();
    for (name, mut members) in groups {
        members.sort_by(|a, b| a.realm.cmp(&b.realm));
        for member in &members {
            resolution.names.insert(member.id.clone(), name.clone());
        }
        let mut members = members.into_iter();
        let Some(winner) = members.next() else {
            continue;
        };
        let overrode = members.map(|m| m.realm).collect();
        resolution.winners.insert(name, winner.id.clone());
        resolution.resolved.insert(
            winner.id.clone(),
            ResolvedEntity {
                access_path: AccessPath {
                    realm: winner.realm.clone(),
                    tier: winner.realm.precedence(),
                    overrode,
                    via_override: false,
                },
                entity: winner,
                overrides: Vec::new(),
            },
        );
    }

    let mut edges: Vec<&Relationship> = overrides
        .iter()
        .filter(|e| e.relation_type.is_override())
        .filter(|e| resolution.resolved.contains_key(&e.from_entity_id))
        .collect();
    // Stronger overriders first, so a weaker edge cannot undo them.
    edges.sort_by(|a, b| {
        let ra = &by_id[&a.from_entity_id].realm;
        let rb = &by_id[&b.from_entity_id].realm;
        ra.cmp(rb).then_with(|| a.created_at.cmp(&b.created_at))
    });

    for edge in edges {
        // A displaced winner loses its own overrides too.
        if !resolution.resolved.contains_key(&edge.from_entity_id) {
            continue;
        }
        let Some(target) = by_id.get(&edge.to_entity_id) else {
            continue;
        };
        let overrider_tier = by_id[&edge.from_entity_id].realm.precedence();
        if target.realm.precedence() <= overrider_tier {
            continue;
        }
        let name = target.entity_name.clone();
        let Some(current_id) = resolution.winners.get(&name).cloned() else {
            continue;
        };
        let current_tier = resolution.resolved[&current_id].access_path.tier;
        if current_tier <= overrider_tier {
            continue;
        }

        let mut displaced = resolution
            .resolved
            .remove(&current_id)
            .map(|r| {
                let mut realms = vec![r.access_path.realm];
                realms.extend(r.access_path.overrode);
                realms
            })
            .unwrap_or_default();
        resolution.winners.insert(name.clone(), edge.from_entity_id.clone());
        if let Some(overrider) = resolution.resolved.get_mut(&edge.from_entity_id) {
            overrider.overrides.push(name);
            overrider.access_path.via_override = true;
            displaced.retain(|r| !overrider.access_path.overrode.contains(r));
            overrider.access_path.overrode.extend(displaced);
            overrider.access_path.overrode.sort();
        }
    }

    resolution
}
