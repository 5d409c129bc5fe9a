//! Breadth-first walks over the resolved graph.
//!
//! Every edge endpoint is mapped through the caller's resolution, so a hop
//! always lands on the entity that wins the target's name. Endpoints the
//! caller cannot see are dropped.

use std::collections::{BTreeMap, BTreeSet, HashSet, VecDeque};

use strata_core::RealmRef;
use strata_core::entities::RelationType;
use strata_core::responses::{ConnectionPath, ConnectionReport, TraversalNode, TraversalResult};

use super::Resolution;
use crate::error::MemoryError;
use crate::repos::relationship::{Direction, load_edges};
use crate::service::MemoryService;

/// Upper bound on `find_connections` hop counts.
pub const MAX_CONNECTION_HOPS: u32 = 5;
/// Paths returned when a target is named.
const MAX_PATHS: usize = 10;

/// Undirected neighbour lists keyed by winner id.
type Adjacency = BTreeMap<String, BTreeSet<(String, RelationType)>>;

/// Bounds for [`MemoryService::traverse`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TraversalOptions {
    pub max_depth: u32,
    /// Nodes returned at most, roots included.
    pub node_budget: u32,
    /// Edge types to follow. Empty follows every type.
    pub relation_types: Vec<RelationType>,
}

impl TraversalOptions {
    #[must_use]
    pub const fn new(max_depth: u32, node_budget: u32) -> Self {
        Self {
            max_depth,
            node_budget,
            relation_types: Vec::new(),
        }
    }

    #[must_use]
    pub fn following(mut self, relation_type: RelationType) -> Self {
        self.relation_types.push(relation_type);
        self
    }
}

fn root_id(resolution: &Resolution, name: &str) -> Result<String, MemoryError> {
    resolution
        .winner(name)
        .map(|r| r.entity.id.clone())
        .ok_or_else(|| MemoryError::EntityNotFound(name.to_string()))
}

/// `reverse_{type}` when that is still a valid relation type.
fn reversed(relation_type: &RelationType) -> RelationType {
    RelationType::new(format!("reverse_{relation_type}")).unwrap_or_else(|_| relation_type.clone())
}

impl MemoryService {
    /// Walk outgoing edges from `roots` (logical names), hop by hop.
    ///
    /// Precedence is re-applied on every hop and each entity is visited
    /// once. When the node budget runs out the result is marked
    /// `truncated`.
    ///
    /// # Errors
    ///
    /// Returns `MemoryError::EntityNotFound` when a root is not visible to
    /// the caller, plus anything [`MemoryService::resolution_for`] returns.
    pub async fn traverse(
        &self,
        caller: &RealmRef,
        roots: &[String],
        options: &TraversalOptions,
    ) -> Result<TraversalResult, MemoryError> {
        let (_, resolution) = self.resolution_for(caller).await?;
        let budget = usize::try_from(options.node_budget).unwrap_or(usize::MAX);

        let mut result = TraversalResult {
            nodes: Vec::new(),
            edges: Vec::new(),
            depth_reached: 0,
            truncated: false,
        };
        let mut visited: HashSet<String> = HashSet::new();
        let mut frontier: Vec<String> = Vec::new();

        for name in roots {
            let id = root_id(&resolution, name)?;
            if !visited.insert(id.clone()) {
                continue;
            }
            if result.nodes.len() >= budget {
                result.truncated = true;
                return Ok(result);
            }
            if let Some(resolved) = resolution.winner(name) {
                result.nodes.push(TraversalNode {
                    resolved: resolved.clone(),
                    depth: 0,
                });
            }
            frontier.push(id);
        }

        let conn = self.db().read().await;
        let mut seen_edges: HashSet<String> = HashSet::new();
        let mut depth = 0;
        while depth < options.max_depth && !frontier.is_empty() && !result.truncated {
            depth += 1;
            let edges =
                load_edges(&conn, &frontier, Direction::Outgoing, &options.relation_types)
                    .await?;

            let mut next = Vec::new();
            for edge in edges {
                let Some(target) = resolution.winner_of_id(&edge.to_entity_id) else {
                    continue;
                };
                let target_id = target.entity.id.clone();
                if !visited.contains(&target_id) {
                    if result.nodes.len() >= budget {
                        result.truncated = true;
                        break;
                    }
                    visited.insert(target_id.clone());
                    result.nodes.push(TraversalNode {
                        resolved: target.clone(),
                        depth,
                    });
                    result.depth_reached = depth;
                    next.push(target_id);
                }
                if seen_edges.insert(edge.id.clone()) {
                    result.edges.push(edge);
                }
            }
            frontier = next;
        }
        drop(conn);

        tracing::debug!(
            caller = %caller,
            nodes = result.nodes.len(),
            depth = result.depth_reached,
            truncated = result.truncated,
            "traversal finished"
        );
        Ok(result)
    }

    /// Paths between two logical names, following edges in both directions.
    ///
    /// With `to = None`, returns one shortest path to every entity reachable
    /// within `max_hops`. Otherwise returns up to ten simple paths to `to`,
    /// shortest first. Hops against an edge's direction are reported as
    /// `reverse_{type}`. `max_hops` is capped at five.
    ///
    /// The search stops early, marking the report `truncated`, once it has
    /// expanded `path_budget` partial paths or the neighbourhood outgrows
    /// `node_budget`. Paths found so far are still returned.
    ///
    /// # Errors
    ///
    /// Returns `MemoryError::EntityNotFound` when either endpoint is not
    /// visible to the caller.
    pub async fn find_connections(
        &self,
        caller: &RealmRef,
        from: &str,
        to: Option<&str>,
        max_hops: u32,
        relation_types: &[RelationType],
    ) -> Result<ConnectionReport, MemoryError> {
        let max_hops = max_hops.min(MAX_CONNECTION_HOPS);
        let (_, resolution) = self.resolution_for(caller).await?;
        let start = root_id(&resolution, from)?;
        let goal = to.map(|name| root_id(&resolution, name)).transpose()?;

        let (adjacency, mut truncated) = self
            .neighbourhood(&resolution, &start, max_hops, relation_types)
            .await?;
        let name_of = |id: &str| {
            resolution
                .winner_of_id(id)
                .map_or_else(|| id.to_string(), |r| r.entity.entity_name.clone())
        };

        let mut paths = Vec::new();
        let mut queue: VecDeque<(Vec<String>, Vec<RelationType>)> =
            VecDeque::from([(vec![start.clone()], Vec::new())]);
        let mut reached: HashSet<String> = HashSet::from([start.clone()]);
        let hop_limit = usize::try_from(max_hops).unwrap_or(usize::MAX);
        let path_budget = usize::try_from(self.settings().path_budget).unwrap_or(usize::MAX);
        let mut expanded = 0_usize;

        'search: while let Some((path, relations)) = queue.pop_front() {
            if relations.len() >= hop_limit {
                continue;
            }
            let Some(current) = path.last() else {
                continue;
            };
            let Some(neighbours) = adjacency.get(current) else {
                continue;
            };
            if expanded >= path_budget {
                truncated = true;
                break;
            }
            expanded += 1;
            for (next, relation) in neighbours {
                if path.contains(next) {
                    continue;
                }
                let mut next_path = path.clone();
                next_path.push(next.clone());
                let mut next_relations = relations.clone();
                next_relations.push(relation.clone());

                match &goal {
                    Some(goal) if next == goal => {
                        paths.push(ConnectionPath {
                            entities: next_path.iter().map(|id| name_of(id)).collect(),
                            relations: next_relations,
                        });
                        if paths.len() >= MAX_PATHS {
                            break 'search;
                        }
                    }
                    Some(_) => queue.push_back((next_path, next_relations)),
                    None => {
                        // One shortest path per reachable entity.
                        if reached.insert(next.clone()) {
                            paths.push(ConnectionPath {
                                entities: next_path.iter().map(|id| name_of(id)).collect(),
                                relations: next_relations.clone(),
                            });
                            queue.push_back((next_path, next_relations));
                        }
                    }
                }
            }
        }

        if truncated {
            tracing::warn!(
                caller = %caller,
                from,
                to,
                expanded,
                paths = paths.len(),
                "connection search hit its budget"
            );
        }
        Ok(ConnectionReport {
            from: from.to_string(),
            to: to.map(str::to_string),
            max_hops,
            paths,
            truncated,
        })
    }

    /// Undirected adjacency between resolved winners within `max_hops` of
    /// `start`. Neighbour lists are sorted for deterministic output. The
    /// flag is set when `node_budget` cut the expansion short.
    async fn neighbourhood(
        &self,
        resolution: &Resolution,
        start: &str,
        max_hops: u32,
        relation_types: &[RelationType],
    ) -> Result<(Adjacency, bool), MemoryError> {
        let mut adjacency = Adjacency::new();
        let mut expanded: HashSet<String> = HashSet::new();
        let mut frontier = vec![start.to_string()];
        let budget = usize::try_from(self.settings().node_budget).unwrap_or(usize::MAX);
        let conn = self.db().read().await;

        for _ in 0..max_hops {
            if frontier.is_empty() {
                break;
            }
            if expanded.len() >= budget {
                return Ok((adjacency, true));
            }
            // Edges are stored against the concrete ids, so a winner's losers
            // contribute their edges too.
            let ids: Vec<String> = resolution
                .visible_ids()
                .filter(|id| {
                    resolution
                        .winner_of_id(id)
                        .is_some_and(|w| frontier.contains(&w.entity.id))
                })
                .map(str::to_string)
                .collect();
            expanded.extend(frontier.drain(..));

            let mut edges = load_edges(&conn, &ids, Direction::Outgoing, relation_types).await?;
            edges.extend(load_edges(&conn, &ids, Direction::Incoming, relation_types).await?);

            for edge in edges {
                let (Some(from), Some(to)) = (
                    resolution.winner_of_id(&edge.from_entity_id),
                    resolution.winner_of_id(&edge.to_entity_id),
                ) else {
                    continue;
                };
                let (from, to) = (from.entity.id.clone(), to.entity.id.clone());
                if from == to {
                    continue;
                }
                adjacency
                    .entry(from.clone())
                    .or_default()
                    .insert((to.clone(), edge.relation_type.clone()));
                adjacency
                    .entry(to.clone())
                    .or_default()
                    .insert((from.clone(), reversed(&edge.relation_type)));
                for id in [from, to] {
                    if !expanded.contains(&id) && !frontier.contains(&id) {
                        frontier.push(id);
                    }
                }
            }
        }
        Ok((adjacency, false))
    }
}
