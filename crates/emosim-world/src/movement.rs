//! Movement resolution: BFS pathfinding, dynamic creation, travel plans,
//! and per-step failure suppression.
//!
//! The resolver mutates only the graph (node creation); the caller applies
//! the outcome to the agent's dynamic state and emits the matching events.
//! The failed-movement cache guarantees at most one `movement_failed`
//! event per `(agent, target)` pair per tick; it must be cleared by the
//! engine at the start of every tick via [`MovementResolver::begin_step`].

use std::collections::BTreeSet;

use rand::rngs::SmallRng;
use rand::Rng;

use emosim_types::{AgentId, LocationId, TravelPlan};

use crate::graph::WorldGraph;

/// The result of resolving a move request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MoveOutcome {
    /// The target is the agent's current location; successful no-op,
    /// no event.
    AlreadyThere,
    /// The target was adjacent; the agent is now there.
    Moved {
        /// The new location.
        to: LocationId,
    },
    /// The target did not exist; it was created adjacent to the agent's
    /// location and the agent moved there.
    Created {
        /// The new location.
        to: LocationId,
    },
    /// The target is several hops away; the agent advanced one hop and
    /// carries a travel plan for the rest.
    Travelling {
        /// The hop the agent just moved to.
        next_hop: LocationId,
        /// The full path, inclusive of start and destination.
        path: Vec<LocationId>,
        /// The plan to store on the agent (hops still ahead).
        plan: TravelPlan,
    },
    /// No path within the search bound.
    Failed {
        /// Failure reason for the event payload.
        reason: &'static str,
        /// True when this (agent, target) pair already failed this tick;
        /// the caller must not emit another `movement_failed`.
        suppressed: bool,
    },
}

/// Resolves move requests against the world graph.
#[derive(Debug, Default)]
pub struct MovementResolver {
    /// (agent, target) pairs that already produced a failure event this
    /// tick.
    failed_this_step: BTreeSet<(AgentId, LocationId)>,
}

impl MovementResolver {
    /// Create a resolver with an empty failure cache.
    pub const fn new() -> Self {
        Self {
            failed_this_step: BTreeSet::new(),
        }
    }

    /// Clear the per-step failure cache. Called at the start of every tick.
    pub fn begin_step(&mut self) {
        self.failed_this_step.clear();
    }

    /// Resolve a move request for `agent` standing at `current` toward
    /// `target`.
    ///
    /// The seeded RNG supplies the semantic distance for dynamically
    /// created locations, keeping runs reproducible.
    pub fn resolve(
        &mut self,
        graph: &mut WorldGraph,
        agent: AgentId,
        current: &LocationId,
        target: &LocationId,
        rng: &mut SmallRng,
    ) -> MoveOutcome {
        if target == current {
            return MoveOutcome::AlreadyThere;
        }

        if !graph.contains(target) {
            let distance = rng.random_range(1..=3);
            match graph.create_location(target.clone(), current, distance) {
                Ok(_) => {
                    return MoveOutcome::Created {
                        to: target.clone(),
                    }
                }
                Err(err) => {
                    // Creation can only fail on a duplicate key, which the
                    // contains() check above excludes; treat defensively
                    // as unreachable rather than panic.
                    tracing::warn!(agent = %agent, target = %target, error = %err, "dynamic location creation failed");
                    return self.fail(agent, target.clone(), "unreachable");
                }
            }
        }

        let Some(path) = graph.find_path(current, target) else {
            return self.fail(agent, target.clone(), "unreachable");
        };

        if path.len() == 2 {
            return MoveOutcome::Moved {
                to: target.clone(),
            };
        }

        // Multi-hop: advance to the first hop, remember the rest.
        let next_hop = path[1].clone();
        let remaining: Vec<LocationId> = path[2..].to_vec();
        MoveOutcome::Travelling {
            next_hop,
            path: path.clone(),
            plan: TravelPlan {
                destination: target.clone(),
                remaining,
            },
        }
    }

    /// Record a failure, marking it suppressed if the pair already failed
    /// this tick.
    fn fail(&mut self, agent: AgentId, target: LocationId, reason: &'static str) -> MoveOutcome {
        let suppressed = !self.failed_this_step.insert((agent, target));
        MoveOutcome::Failed { reason, suppressed }
    }
}

/// Advance an in-progress travel plan by one hop.
///
/// Returns the location the agent is now at and whether it has arrived at
/// the destination. Returns `None` when the plan has no hops left (the
/// caller should clear it).
pub fn advance_travel(plan: &mut TravelPlan) -> Option<(LocationId, bool)> {
    if plan.remaining.is_empty() {
        return None;
    }
    let next = plan.remaining.remove(0);
    let arrived = plan.remaining.is_empty();
    Some((next, arrived))
}

#[cfg(test)]
mod tests {
    use super::*;
    use emosim_types::{Location, LocationEffects};
    use rand::SeedableRng;

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

    fn rng() -> SmallRng {
        SmallRng::seed_from_u64(7)
    }

    #[test]
    fn move_to_current_is_noop() {
        let mut graph = chain_graph(&["a", "b"]);
        let mut resolver = MovementResolver::new();
        let outcome = resolver.resolve(&mut graph, AgentId::new(), &"a".into(), &"a".into(), &mut rng());
        assert_eq!(outcome, MoveOutcome::AlreadyThere);
    }

    #[test]
    fn adjacent_move_teleports() {
        let mut graph = chain_graph(&["a", "b"]);
        let mut resolver = MovementResolver::new();
        let outcome = resolver.resolve(&mut graph, AgentId::new(), &"a".into(), &"b".into(), &mut rng());
        assert_eq!(outcome, MoveOutcome::Moved { to: "b".into() });
    }

    #[test]
    fn absent_target_is_created_with_seeded_distance() {
        let mut graph = chain_graph(&["a"]);
        let mut resolver = MovementResolver::new();
        let outcome = resolver.resolve(&mut graph, AgentId::new(), &"a".into(), &"z".into(), &mut rng());
        assert_eq!(outcome, MoveOutcome::Created { to: "z".into() });
        let created = graph.get(&"z".into()).expect("created");
        assert!((1..=3).contains(&created.distance));
        assert!(graph.neighbors(&"a".into()).contains(&LocationId::from("z")));

        // Same seed, same distance.
        let mut graph2 = chain_graph(&["a"]);
        let mut resolver2 = MovementResolver::new();
        let _ = resolver2.resolve(&mut graph2, AgentId::new(), &"a".into(), &"z".into(), &mut rng());
        assert_eq!(
            graph2.get(&"z".into()).expect("created").distance,
            created.distance
        );
    }

    #[test]
    fn multi_hop_produces_travel_plan() {
        let mut graph = chain_graph(&["a", "b", "c", "d"]);
        let mut resolver = MovementResolver::new();
        let outcome = resolver.resolve(&mut graph, AgentId::new(), &"a".into(), &"d".into(), &mut rng());
        let MoveOutcome::Travelling { next_hop, path, plan } = outcome else {
            panic!("expected Travelling outcome");
        };
        assert_eq!(next_hop, LocationId::from("b"));
        assert_eq!(path.len(), 4);
        assert_eq!(plan.destination, LocationId::from("d"));
        assert_eq!(
            plan.remaining,
            vec![LocationId::from("c"), LocationId::from("d")]
        );
    }

    #[test]
    fn travel_advances_one_hop_per_call() {
        let mut plan = TravelPlan {
            destination: "d".into(),
            remaining: vec!["c".into(), "d".into()],
        };
        let (loc, arrived) = advance_travel(&mut plan).expect("hop");
        assert_eq!(loc, LocationId::from("c"));
        assert!(!arrived);
        let (loc, arrived) = advance_travel(&mut plan).expect("hop");
        assert_eq!(loc, LocationId::from("d"));
        assert!(arrived);
        assert!(advance_travel(&mut plan).is_none());
    }

    #[test]
    fn repeated_failure_is_suppressed_within_step() {
        // "far" exists but is disconnected, so creation does not trigger.
        let mut graph = chain_graph(&["a", "b"]);
        graph
            .add_location(LocationId::from("far"), location(&[]))
            .expect("add");
        let mut resolver = MovementResolver::new();
        let agent = AgentId::new();

        let first = resolver.resolve(&mut graph, agent, &"a".into(), &"far".into(), &mut rng());
        assert_eq!(
            first,
            MoveOutcome::Failed {
                reason: "unreachable",
                suppressed: false
            }
        );

        let second = resolver.resolve(&mut graph, agent, &"a".into(), &"far".into(), &mut rng());
        assert_eq!(
            second,
            MoveOutcome::Failed {
                reason: "unreachable",
                suppressed: true
            }
        );
    }

    #[test]
    fn failure_cache_clears_between_steps() {
        let mut graph = chain_graph(&["a", "b"]);
        graph
            .add_location(LocationId::from("far"), location(&[]))
            .expect("add");
        let mut resolver = MovementResolver::new();
        let agent = AgentId::new();

        let _ = resolver.resolve(&mut graph, agent, &"a".into(), &"far".into(), &mut rng());
        resolver.begin_step();
        let outcome = resolver.resolve(&mut graph, agent, &"a".into(), &"far".into(), &mut rng());
        assert_eq!(
            outcome,
            MoveOutcome::Failed {
                reason: "unreachable",
                suppressed: false
            }
        );
    }

    #[test]
    fn different_agents_fail_independently() {
        let mut graph = chain_graph(&["a", "b"]);
        graph
            .add_location(LocationId::from("far"), location(&[]))
            .expect("add");
        let mut resolver = MovementResolver::new();

        let first = resolver.resolve(&mut graph, AgentId::new(), &"a".into(), &"far".into(), &mut rng());
        let second = resolver.resolve(&mut graph, AgentId::new(), &"a".into(), &"far".into(), &mut rng());
        for outcome in [first, second] {
            assert_eq!(
                outcome,
                MoveOutcome::Failed {
                    reason: "unreachable",
                    suppressed: false
                }
            );
        }
    }
}
