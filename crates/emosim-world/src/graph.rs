//! The location graph: nodes keyed by scenario-declared names, adjacency
//! held as ordered lists.
//!
//! Adjacency order matters: BFS expands neighbors in list order, which is
//! the stable tie-break for equal-length paths. Dynamically created
//! locations are wired bidirectionally to the location the creating agent
//! stood at.

use std::collections::{BTreeMap, BTreeSet, VecDeque};

use emosim_types::{Location, LocationEffects, LocationId};

use crate::error::WorldError;

/// Maximum BFS frontier depth (in hops) for pathfinding. Targets further
/// away than this are reported unreachable.
pub const MAX_SEARCH_DEPTH: usize = 5;

/// The world graph holding all locations.
#[derive(Debug, Clone, Default, serde::Serialize, serde::Deserialize)]
pub struct WorldGraph {
    /// All locations indexed by key.
    locations: BTreeMap<LocationId, Location>,
}

impl WorldGraph {
    /// Create an empty graph.
    pub const fn new() -> Self {
        Self {
            locations: BTreeMap::new(),
        }
    }

    /// Build a graph from scenario-declared locations.
    ///
    /// Adjacency referenced by `nearby` but not declared as a node is left
    /// dangling on purpose: the referenced location is created the first
    /// time an agent targets it.
    pub fn from_locations(locations: BTreeMap<LocationId, Location>) -> Self {
        Self { locations }
    }

    /// Add a location to the graph.
    ///
    /// # Errors
    ///
    /// Returns [`WorldError::DuplicateLocation`] if the key already exists.
    pub fn add_location(&mut self, id: LocationId, location: Location) -> Result<(), WorldError> {
        if self.locations.contains_key(&id) {
            return Err(WorldError::DuplicateLocation(id));
        }
        self.locations.insert(id, location);
        Ok(())
    }

    /// Get an immutable reference to a location.
    pub fn get(&self, id: &LocationId) -> Option<&Location> {
        self.locations.get(id)
    }

    /// Get a mutable reference to a location.
    pub fn get_mut(&mut self, id: &LocationId) -> Option<&mut Location> {
        self.locations.get_mut(id)
    }

    /// Whether a location key exists.
    pub fn contains(&self, id: &LocationId) -> bool {
        self.locations.contains_key(id)
    }

    /// Number of locations in the graph.
    pub fn len(&self) -> usize {
        self.locations.len()
    }

    /// Whether the graph has no locations.
    pub fn is_empty(&self) -> bool {
        self.locations.is_empty()
    }

    /// Iterate all locations.
    pub fn iter(&self) -> impl Iterator<Item = (&LocationId, &Location)> {
        self.locations.iter()
    }

    /// All location keys.
    pub fn location_ids(&self) -> Vec<LocationId> {
        self.locations.keys().cloned().collect()
    }

    /// The adjacency list of a location, in declaration order.
    pub fn neighbors(&self, id: &LocationId) -> &[LocationId] {
        match self.locations.get(id) {
            Some(location) => location.nearby.as_slice(),
            None => &[],
        }
    }

    /// Create a location dynamically, wired bidirectionally to `origin`.
    ///
    /// The new node gets the given semantic distance, no items, and the
    /// hazard flag cleared. If `origin` exists, the new location is
    /// appended to its adjacency list (and vice versa).
    ///
    /// # Errors
    ///
    /// Returns [`WorldError::DuplicateLocation`] if the key already exists.
    pub fn create_location(
        &mut self,
        id: LocationId,
        origin: &LocationId,
        distance: u8,
    ) -> Result<&Location, WorldError> {
        if self.locations.contains_key(&id) {
            return Err(WorldError::DuplicateLocation(id));
        }

        let nearby = if self.locations.contains_key(origin) {
            vec![origin.clone()]
        } else {
            Vec::new()
        };

        let location = Location {
            description: format!("A newly discovered area: {id}"),
            nearby,
            distance,
            items: Vec::new(),
            hidden_items: Vec::new(),
            hazard_affected: false,
            effects: LocationEffects::default(),
        };

        if let Some(origin_loc) = self.locations.get_mut(origin) {
            if !origin_loc.nearby.contains(&id) {
                origin_loc.nearby.push(id.clone());
            }
        }

        self.locations.insert(id.clone(), location);
        tracing::debug!(location = %id, origin = %origin, distance, "location created dynamically");
        // The entry was just inserted, so the lookup cannot fail.
        self.locations
            .get(&id)
            .ok_or(WorldError::LocationNotFound(id))
    }

    /// Breadth-first shortest path from `from` to `to`, inclusive of both
    /// endpoints, bounded by [`MAX_SEARCH_DEPTH`] hops.
    ///
    /// Neighbors are expanded in adjacency-list order, so among
    /// equal-length paths the one through earlier-listed neighbors wins.
    /// Returns `None` when the target is absent, unreachable, or beyond
    /// the depth bound.
    pub fn find_path(&self, from: &LocationId, to: &LocationId) -> Option<Vec<LocationId>> {
        if from == to {
            return Some(vec![from.clone()]);
        }
        if !self.locations.contains_key(to) {
            return None;
        }

        let mut visited: BTreeSet<&LocationId> = BTreeSet::new();
        let mut parent: BTreeMap<&LocationId, &LocationId> = BTreeMap::new();
        let mut queue: VecDeque<(&LocationId, usize)> = VecDeque::new();

        visited.insert(from);
        queue.push_back((from, 0));

        while let Some((current, depth)) = queue.pop_front() {
            if depth >= MAX_SEARCH_DEPTH {
                continue;
            }
            for neighbor in self.neighbors(current) {
                if !self.locations.contains_key(neighbor) || visited.contains(neighbor) {
                    continue;
                }
                visited.insert(neighbor);
                parent.insert(neighbor, current);
                if neighbor == to {
                    return Some(reconstruct_path(&parent, from, to));
                }
                queue.push_back((neighbor, depth + 1));
            }
        }

        None
    }
}

/// Walk the parent map back from `to` to `from`, producing the forward path.
fn reconstruct_path(
    parent: &BTreeMap<&LocationId, &LocationId>,
    from: &LocationId,
    to: &LocationId,
) -> Vec<LocationId> {
    let mut path = vec![to.clone()];
    let mut cursor = to;
    while cursor != from {
        match parent.get(cursor) {
            Some(prev) => {
                path.push((*prev).clone());
                cursor = prev;
            }
            None => break,
        }
    }
    path.reverse();
    path
}

#[cfg(test)]
mod tests {
    use super::*;

    fn location(nearby: &[&str]) -> Location {
        Location {
            description: String::from("test"),
            nearby: nearby.iter().map(|n| LocationId::from(*n)).collect(),
            distance: 1,
            items: Vec::new(),
            hidden_items: Vec::new(),
            hazard_affected: false,
            effects: LocationEffects::default(),
        }
    }

    fn chain_graph(names: &[&str]) -> WorldGraph {
        // a - b - c - ... linked both ways
        let mut graph = WorldGraph::new();
        for (i, name) in names.iter().enumerate() {
            let mut nearby = Vec::new();
            if i > 0 {
                nearby.push(names[i - 1]);
            }
            if i + 1 < names.len() {
                nearby.push(names[i + 1]);
            }
            graph
                .add_location(LocationId::from(*name), location(&nearby))
                .expect("add");
        }
        graph
    }

    #[test]
    fn path_to_self_is_single_node() {
        let graph = chain_graph(&["a", "b"]);
        let path = graph.find_path(&"a".into(), &"a".into()).expect("path");
        assert_eq!(path, vec![LocationId::from("a")]);
    }

    #[test]
    fn adjacent_path_has_two_nodes() {
        let graph = chain_graph(&["a", "b"]);
        let path = graph.find_path(&"a".into(), &"b".into()).expect("path");
        assert_eq!(path, vec![LocationId::from("a"), LocationId::from("b")]);
    }

    #[test]
    fn multi_hop_path_is_shortest() {
        let graph = chain_graph(&["a", "b", "c", "d"]);
        let path = graph.find_path(&"a".into(), &"d".into()).expect("path");
        assert_eq!(path.len(), 4);
        assert_eq!(path[0], LocationId::from("a"));
        assert_eq!(path[3], LocationId::from("d"));
    }

    #[test]
    fn path_beyond_depth_bound_is_none() {
        // 7 nodes in a chain: a..g is 6 hops, over the 5-hop bound.
        let graph = chain_graph(&["a", "b", "c", "d", "e", "f", "g"]);
        assert!(graph.find_path(&"a".into(), &"g".into()).is_none());
        // f is exactly 5 hops: allowed.
        assert!(graph.find_path(&"a".into(), &"f".into()).is_some());
    }

    #[test]
    fn missing_target_is_none() {
        let graph = chain_graph(&["a", "b"]);
        assert!(graph.find_path(&"a".into(), &"z".into()).is_none());
    }

    #[test]
    fn disconnected_target_is_none() {
        let mut graph = chain_graph(&["a", "b"]);
        graph
            .add_location(LocationId::from("island"), location(&[]))
            .expect("add");
        assert!(graph.find_path(&"a".into(), &"island".into()).is_none());
    }

    #[test]
    fn tie_break_follows_adjacency_order() {
        // Two equal-length routes a->b->d and a->c->d; b is listed first.
        let mut graph = WorldGraph::new();
        graph
            .add_location(LocationId::from("a"), location(&["b", "c"]))
            .expect("add");
        graph
            .add_location(LocationId::from("b"), location(&["a", "d"]))
            .expect("add");
        graph
            .add_location(LocationId::from("c"), location(&["a", "d"]))
            .expect("add");
        graph
            .add_location(LocationId::from("d"), location(&["b", "c"]))
            .expect("add");

        let path = graph.find_path(&"a".into(), &"d".into()).expect("path");
        assert_eq!(
            path,
            vec![
                LocationId::from("a"),
                LocationId::from("b"),
                LocationId::from("d")
            ]
        );
    }

    #[test]
    fn dangling_adjacency_is_skipped_until_created() {
        // a lists "ruins" as nearby but it is not declared.
        let mut graph = WorldGraph::new();
        graph
            .add_location(LocationId::from("a"), location(&["ruins"]))
            .expect("add");
        assert!(graph.find_path(&"a".into(), &"ruins".into()).is_none());

        graph
            .create_location(LocationId::from("ruins"), &"a".into(), 2)
            .expect("create");
        let path = graph.find_path(&"a".into(), &"ruins".into()).expect("path");
        assert_eq!(path.len(), 2);
    }

    #[test]
    fn created_location_is_bidirectional() {
        let mut graph = chain_graph(&["a"]);
        graph
            .create_location(LocationId::from("z"), &"a".into(), 1)
            .expect("create");
        assert!(graph.neighbors(&"a".into()).contains(&LocationId::from("z")));
        assert!(graph.neighbors(&"z".into()).contains(&LocationId::from("a")));
    }

    #[test]
    fn duplicate_creation_rejected() {
        let mut graph = chain_graph(&["a", "b"]);
        assert!(matches!(
            graph.create_location(LocationId::from("b"), &"a".into(), 1),
            Err(WorldError::DuplicateLocation(_))
        ));
    }
}
