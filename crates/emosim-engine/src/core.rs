//! The mutable state of one run, owned exclusively by the engine.
//!
//! Everything an agent turn can touch lives here: world state, agent
//! instances, the bus, conversations, the coordinator, the loop detector,
//! the movement resolver, and the run's seeded RNG. External observers
//! only ever see this state through events and persisted records.

use std::collections::BTreeMap;

use rand::rngs::SmallRng;
use rand::SeedableRng;

use emosim_agents::AgentInstance;
use emosim_social::{ConversationManager, CooperationCoordinator, LoopDetector, MessageBus};
use emosim_types::{
    ActionRecord, AgentId, AgentRole, AgentSummary, DynamicsBound, LocationId, RunId, Scenario,
    StepMetrics,
};
use emosim_world::{MovementResolver, WorldState};

/// The engine-owned state of one run.
pub struct RunCore {
    /// The run this state belongs to.
    pub run_id: RunId,
    /// The world (graph, items, hazard, dynamics).
    pub world: WorldState,
    /// Declared bounds for environment-writable dynamics.
    pub dynamics: BTreeMap<String, DynamicsBound>,
    /// All agent instances.
    pub agents: BTreeMap<AgentId, AgentInstance>,
    /// Agent ids in template order (the deterministic schedule).
    pub order: Vec<AgentId>,
    /// The message bus.
    pub bus: MessageBus,
    /// Conversation manager.
    pub conversations: ConversationManager,
    /// Cooperation coordinator.
    pub coordinator: CooperationCoordinator,
    /// Loop detector.
    pub loops: LoopDetector,
    /// Movement resolver with the per-step failure cache.
    pub resolver: MovementResolver,
    /// The run's seeded RNG; the single source of randomness.
    pub rng: SmallRng,
    /// Current tick (0 before the first).
    pub current_step: u64,
    /// Human-readable events accumulated this tick.
    pub step_events: Vec<String>,
    /// Actions executed this tick.
    pub step_actions: Vec<ActionRecord>,
}

impl RunCore {
    /// Build the run state from a validated scenario.
    pub fn from_scenario(run_id: RunId, scenario: &Scenario, seed: u64) -> Self {
        let world = WorldState::from_initial(scenario.config.initial_state.clone());
        let mut bus = MessageBus::new(run_id);
        let mut agents = BTreeMap::new();
        let mut order = Vec::new();
        let mut coordinator = CooperationCoordinator::new();

        for template in &scenario.agent_templates {
            let agent = AgentInstance::from_template(template.clone());
            bus.register_agent(agent.id);
            bus.join_room(agent.id, agent.state.location.clone());
            if agent.role() == AgentRole::Human {
                coordinator.seed_goals(template.goals.iter().map(String::as_str));
            }
            order.push(agent.id);
            agents.insert(agent.id, agent);
        }

        Self {
            run_id,
            world,
            dynamics: scenario.config.dynamics.clone(),
            agents,
            order,
            bus,
            conversations: ConversationManager::new(),
            coordinator,
            loops: LoopDetector::new(),
            resolver: MovementResolver::new(),
            rng: SmallRng::seed_from_u64(seed),
            current_step: 0,
            step_events: Vec::new(),
            step_actions: Vec::new(),
        }
    }

    /// The display name of an agent.
    pub fn agent_name(&self, id: AgentId) -> String {
        self.agents
            .get(&id)
            .map_or_else(|| id.to_string(), |a| a.name().to_owned())
    }

    /// Find an agent by display name (exact, then case-insensitive).
    pub fn find_agent_by_name(&self, name: &str) -> Option<AgentId> {
        if let Some(agent) = self.agents.values().find(|a| a.name() == name) {
            return Some(agent.id);
        }
        let lower = name.to_lowercase();
        self.agents
            .values()
            .find(|a| a.name().to_lowercase() == lower)
            .map(|a| a.id)
    }

    /// Active agents at a location, excluding `except`.
    pub fn agents_at(&self, location: &LocationId, except: Option<AgentId>) -> Vec<AgentId> {
        self.agents
            .values()
            .filter(|a| a.can_act() && a.state.location == *location && Some(a.id) != except)
            .map(|a| a.id)
            .collect()
    }

    /// Locations of all active human agents (conversation scan input).
    pub fn active_human_locations(&self) -> BTreeMap<AgentId, LocationId> {
        self.agents
            .values()
            .filter(|a| a.can_act() && a.role() == AgentRole::Human)
            .map(|a| (a.id, a.state.location.clone()))
            .collect()
    }

    /// Agent ids with a given role, in template order.
    pub fn ids_with_role(&self, role: AgentRole) -> Vec<AgentId> {
        self.order
            .iter()
            .filter(|id| {
                self.agents
                    .get(*id)
                    .map_or(false, |a| a.role() == role)
            })
            .copied()
            .collect()
    }

    /// Count of active human agents.
    pub fn active_human_count(&self) -> usize {
        self.agents
            .values()
            .filter(|a| a.can_act() && a.role() == AgentRole::Human)
            .count()
    }

    /// Relocate an agent, keeping bus rooms, conversations, and arrival
    /// memory consistent.
    pub fn relocate_agent(&mut self, agent_id: AgentId, to: LocationId, reason: &str) {
        let Some(agent) = self.agents.get_mut(&agent_id) else {
            return;
        };
        let from = agent.state.location.clone();
        if from == to {
            return;
        }
        agent.state.location = to.clone();
        agent.memory.set_arrival(
            to.clone(),
            Some(from.clone()),
            reason.to_owned(),
            self.current_step,
        );
        self.bus.move_agent(agent_id, &from, to);
        self.conversations.agent_left(agent_id, &from);
    }

    /// One status line per agent, for the designer/environment context
    /// and the run summary.
    pub fn agents_overview(&self) -> Vec<String> {
        self.agents
            .values()
            .map(|a| {
                format!(
                    "{name} ({role:?}): health {health:.0}/10, stress {stress:.0}/10, at {location}{inactive}",
                    name = a.name(),
                    role = a.role(),
                    health = a.state.health,
                    stress = a.state.stress,
                    location = a.state.location,
                    inactive = if a.can_act() { "" } else { " [inactive]" },
                )
            })
            .collect()
    }

    /// Read-only agent summaries for persistence and the control API.
    pub fn agent_summaries(&self) -> Vec<AgentSummary> {
        self.agents.values().map(AgentInstance::summary).collect()
    }

    /// Compute the aggregate metrics for the current tick.
    pub fn step_metrics(&self) -> StepMetrics {
        let humans: Vec<&AgentInstance> = self
            .agents
            .values()
            .filter(|a| a.role() == AgentRole::Human && a.is_active)
            .collect();
        let count = humans.len().max(1) as f64;
        let avg_health = humans.iter().map(|a| a.state.health).sum::<f64>() / count;
        let avg_stress = humans.iter().map(|a| a.state.stress).sum::<f64>() / count;
        StepMetrics {
            avg_health,
            avg_stress,
            hazard_level: self.world.hazard_level,
            message_count: self.bus.message_count(),
            active_conversations: self.conversations.active_count(),
        }
    }

    /// Note a human-readable event for later contexts this tick.
    pub fn note_event(&mut self, text: String) {
        self.step_events.push(text);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use emosim_types::{
        AgentTemplate, BigFive, InitialState, Location, LocationEffects, Persona, WorldConfig,
    };

    fn scenario_with_two_humans() -> Scenario {
        let mut locations = BTreeMap::new();
        for name in ["room1", "room2"] {
            locations.insert(
                LocationId::from(name),
                Location {
                    description: String::from("a room"),
                    nearby: Vec::new(),
                    distance: 1,
                    items: Vec::new(),
                    hidden_items: Vec::new(),
                    hazard_affected: false,
                    effects: LocationEffects::default(),
                },
            );
        }
        let persona = Persona {
            age: 30,
            sex: String::from("female"),
            occupation: String::from("clerk"),
            backstory: String::new(),
            traits: BigFive::default(),
            modifiers: Default::default(),
            skills: Vec::new(),
        };
        let template = |name: &str| AgentTemplate {
            name: name.to_owned(),
            role: AgentRole::Human,
            model_id: String::from("test"),
            provider: String::from("openai"),
            persona: Some(persona.clone()),
            goals: vec![String::from("survive")],
            location: LocationId::from("room1"),
            health: 10.0,
            stress: 3.0,
            inventory: Vec::new(),
        };
        Scenario {
            id: Default::default(),
            name: String::from("test"),
            description: String::new(),
            config: WorldConfig {
                initial_state: InitialState {
                    locations,
                    ..InitialState::default()
                },
                ..WorldConfig::default()
            },
            agent_templates: vec![template("Ada"), template("Ben")],
        }
    }

    #[test]
    fn core_builds_agents_and_seeds_goals() {
        let core = RunCore::from_scenario(RunId::new(), &scenario_with_two_humans(), 42);
        assert_eq!(core.agents.len(), 2);
        assert_eq!(core.coordinator.shared_goals(), ["survive"]);
        assert_eq!(core.active_human_count(), 2);
    }

    #[test]
    fn find_agent_by_name_is_case_insensitive_fallback() {
        let core = RunCore::from_scenario(RunId::new(), &scenario_with_two_humans(), 42);
        assert!(core.find_agent_by_name("Ada").is_some());
        assert!(core.find_agent_by_name("ada").is_some());
        assert!(core.find_agent_by_name("Zed").is_none());
    }

    #[test]
    fn relocate_updates_location_and_arrival_memory() {
        let mut core = RunCore::from_scenario(RunId::new(), &scenario_with_two_humans(), 42);
        let ada = core.find_agent_by_name("Ada").expect("agent");
        core.relocate_agent(ada, LocationId::from("room2"), "moved toward the exit");
        let agent = core.agents.get(&ada).expect("agent");
        assert_eq!(agent.state.location, LocationId::from("room2"));
        let arrival = agent.memory.arrival().expect("arrival");
        assert_eq!(arrival.from, Some(LocationId::from("room1")));
    }

    #[test]
    fn metrics_average_over_active_humans() {
        let mut core = RunCore::from_scenario(RunId::new(), &scenario_with_two_humans(), 42);
        let ada = core.find_agent_by_name("Ada").expect("agent");
        if let Some(agent) = core.agents.get_mut(&ada) {
            agent.state.health = 4.0;
        }
        let metrics = core.step_metrics();
        assert!((metrics.avg_health - 7.0).abs() < 1e-9);
    }

    #[test]
    fn same_seed_same_rng_stream() {
        use rand::Rng;
        let mut a = RunCore::from_scenario(RunId::new(), &scenario_with_two_humans(), 7);
        let mut b = RunCore::from_scenario(RunId::new(), &scenario_with_two_humans(), 7);
        let xs: Vec<u32> = (0..8).map(|_| a.rng.random()).collect();
        let ys: Vec<u32> = (0..8).map(|_| b.rng.random()).collect();
        assert_eq!(xs, ys);
    }
}
