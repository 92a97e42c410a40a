//! Scenario templates: the immutable description a run is created from.
//!
//! A scenario carries the world configuration (initial state, dynamics
//! bounds, step limits) and the ordered agent templates. Validation is
//! performed once at load time so the engine never sees a malformed
//! scenario (validation errors surface to the caller, never to the tick
//! loop).

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::enums::AgentRole;
use crate::ids::{ItemId, LocationId, ScenarioId};
use crate::persona::Persona;

/// Upper bound for `hazard_level`.
pub const MAX_HAZARD_LEVEL: u8 = 10;

/// Inclusive range for a location's semantic distance.
pub const DISTANCE_RANGE: core::ops::RangeInclusive<u8> = 1..=3;

/// Errors raised by scenario validation.
#[derive(Debug, thiserror::Error)]
pub enum ScenarioError {
    /// `hazard_level` exceeds the 0-10 range.
    #[error("hazard_level {0} exceeds maximum of {MAX_HAZARD_LEVEL}")]
    HazardOutOfRange(u8),

    /// A location declares a distance outside 1-3.
    #[error("location '{location}' has distance {distance}, expected 1..=3")]
    DistanceOutOfRange {
        /// The offending location.
        location: LocationId,
        /// The declared distance.
        distance: u8,
    },

    /// A human agent template has no persona.
    #[error("human agent template '{0}' is missing a persona")]
    MissingPersona(String),

    /// A persona declares a trait outside `[0.0, 1.0]`.
    #[error("agent template '{0}' has a persona trait outside [0.0, 1.0]")]
    TraitOutOfRange(String),

    /// An agent's initial location is not declared in the world.
    #[error("agent template '{agent}' starts at undeclared location '{location}'")]
    UnknownStartLocation {
        /// The offending agent template.
        agent: String,
        /// The missing location key.
        location: LocationId,
    },

    /// An item referenced by a container has no definition.
    #[error("item '{0}' is referenced but never defined")]
    UndefinedItem(ItemId),

    /// The same item appears in more than one container.
    #[error("item '{0}' appears in more than one container")]
    DuplicateItemPlacement(ItemId),
}

/// Per-tick passive effects a location applies to human occupants.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct LocationEffects {
    /// Health delta applied each tick to occupants (clamped downstream).
    #[serde(default)]
    pub health_per_tick: f64,
    /// Stress delta applied each tick to occupants (clamped downstream).
    #[serde(default)]
    pub stress_per_tick: f64,
}

/// A node in the world graph.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Location {
    /// Prose description shown in agent context.
    pub description: String,
    /// Directly reachable locations, in scenario order. Order is the
    /// BFS tie-break, so it is a list rather than a set.
    #[serde(default)]
    pub nearby: Vec<LocationId>,
    /// Semantic travel cost, 1-3. Not a graph weight.
    #[serde(default = "default_distance")]
    pub distance: u8,
    /// Visible items present here.
    #[serde(default)]
    pub items: Vec<ItemId>,
    /// Items revealed only by the `search` action.
    #[serde(default)]
    pub hidden_items: Vec<ItemId>,
    /// Whether the world hazard bleeds health/stress here.
    #[serde(default)]
    pub hazard_affected: bool,
    /// Passive per-tick effects on occupants.
    #[serde(default)]
    pub effects: LocationEffects,
}

const fn default_distance() -> u8 {
    1
}

/// An item definition; placement lives in containers, not here.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Item {
    /// Display name.
    pub name: String,
    /// Prose description.
    #[serde(default)]
    pub description: String,
    /// Effect properties applied by `use` (for example `{"heal": 2}`).
    #[serde(default)]
    pub properties: BTreeMap<String, serde_json::Value>,
}

/// Declared bounds for a world-state key the environment agent may write.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct DynamicsBound {
    /// Minimum allowed value.
    pub min: f64,
    /// Maximum allowed value.
    pub max: f64,
}

/// The mutable world state a run starts from.
///
/// Reserved keys (`hazard_level`, `locations`, `items`, `time_of_day`,
/// `weather`) are typed; everything else the scenario defines lands in
/// `extra` and is only writable within the declared [`DynamicsBound`]s.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct InitialState {
    /// World hazard intensity, 0-10.
    #[serde(default)]
    pub hazard_level: u8,
    /// Location graph keyed by location id.
    #[serde(default)]
    pub locations: BTreeMap<LocationId, Location>,
    /// Item definitions keyed by item id.
    #[serde(default)]
    pub items: BTreeMap<ItemId, Item>,
    /// Narrative time of day, if the scenario tracks it.
    #[serde(default)]
    pub time_of_day: Option<String>,
    /// Narrative weather, if the scenario tracks it.
    #[serde(default)]
    pub weather: Option<String>,
    /// Scenario-defined dynamic values.
    #[serde(default, flatten)]
    pub extra: BTreeMap<String, serde_json::Value>,
}

/// World configuration for a scenario.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct WorldConfig {
    /// Initial world state.
    #[serde(default)]
    pub initial_state: InitialState,
    /// Bounds for the `extra` keys the environment agent may write.
    #[serde(default)]
    pub dynamics: BTreeMap<String, DynamicsBound>,
    /// Maximum number of ticks; `None` means run until a terminal
    /// condition (bounded by the engine's safety cap).
    #[serde(default)]
    pub max_steps: Option<u64>,
    /// Real-time delay between ticks, in milliseconds.
    #[serde(default = "default_tick_delay_ms")]
    pub tick_delay_ms: u64,
}

const fn default_tick_delay_ms() -> u64 {
    500
}

/// Template for one agent in a scenario.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AgentTemplate {
    /// Display name; also the address other agents use for direct messages.
    pub name: String,
    /// The agent's role.
    pub role: AgentRole,
    /// Model identifier passed to the oracle.
    #[serde(default = "default_model_id")]
    pub model_id: String,
    /// Provider tag (routing hint for the oracle layer).
    #[serde(default = "default_provider")]
    pub provider: String,
    /// Persona; required for `human` role.
    #[serde(default)]
    pub persona: Option<Persona>,
    /// Goals rendered into the agent's context.
    #[serde(default)]
    pub goals: Vec<String>,
    /// Starting location.
    pub location: LocationId,
    /// Starting health, 0-10.
    #[serde(default = "default_health")]
    pub health: f64,
    /// Starting stress, 0-10.
    #[serde(default = "default_stress")]
    pub stress: f64,
    /// Items carried from the start.
    #[serde(default)]
    pub inventory: Vec<ItemId>,
}

fn default_model_id() -> String {
    String::from("llama3.2")
}

fn default_provider() -> String {
    String::from("openai")
}

const fn default_health() -> f64 {
    10.0
}

const fn default_stress() -> f64 {
    3.0
}

/// An immutable scenario template.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Scenario {
    /// Scenario identifier.
    #[serde(default)]
    pub id: ScenarioId,
    /// Display name.
    pub name: String,
    /// Prose description.
    #[serde(default)]
    pub description: String,
    /// World configuration.
    #[serde(default)]
    pub config: WorldConfig,
    /// Ordered agent templates. Order is the deterministic schedule for
    /// environment agents.
    #[serde(default)]
    pub agent_templates: Vec<AgentTemplate>,
}

impl Scenario {
    /// Validate the scenario before a run is created from it.
    ///
    /// Checks value ranges, persona presence for humans, that start
    /// locations exist, and that every placed item is defined and sits in
    /// exactly one container.
    ///
    /// # Errors
    ///
    /// Returns the first [`ScenarioError`] found.
    pub fn validate(&self) -> Result<(), ScenarioError> {
        let state = &self.config.initial_state;

        if state.hazard_level > MAX_HAZARD_LEVEL {
            return Err(ScenarioError::HazardOutOfRange(state.hazard_level));
        }

        for (id, location) in &state.locations {
            if !DISTANCE_RANGE.contains(&location.distance) {
                return Err(ScenarioError::DistanceOutOfRange {
                    location: id.clone(),
                    distance: location.distance,
                });
            }
        }

        let mut placements: BTreeMap<&ItemId, u32> = BTreeMap::new();
        for location in state.locations.values() {
            for item in location.items.iter().chain(&location.hidden_items) {
                *placements.entry(item).or_insert(0) += 1;
            }
        }

        for template in &self.agent_templates {
            if template.role == AgentRole::Human {
                let Some(persona) = &template.persona else {
                    return Err(ScenarioError::MissingPersona(template.name.clone()));
                };
                if !persona.traits_in_range() {
                    return Err(ScenarioError::TraitOutOfRange(template.name.clone()));
                }
            }
            if !state.locations.contains_key(&template.location) {
                return Err(ScenarioError::UnknownStartLocation {
                    agent: template.name.clone(),
                    location: template.location.clone(),
                });
            }
            for item in &template.inventory {
                *placements.entry(item).or_insert(0) += 1;
            }
        }

        for (item, count) in placements {
            if !state.items.contains_key(item) {
                return Err(ScenarioError::UndefinedItem(item.clone()));
            }
            if count > 1 {
                return Err(ScenarioError::DuplicateItemPlacement(item.clone()));
            }
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::persona::Persona;

    fn minimal_location() -> Location {
        Location {
            description: String::from("A small room."),
            nearby: Vec::new(),
            distance: 1,
            items: Vec::new(),
            hidden_items: Vec::new(),
            hazard_affected: false,
            effects: LocationEffects::default(),
        }
    }

    fn minimal_persona() -> Persona {
        Persona {
            age: 30,
            sex: String::from("male"),
            occupation: String::from("clerk"),
            backstory: String::new(),
            traits: Default::default(),
            modifiers: Default::default(),
            skills: Vec::new(),
        }
    }

    fn minimal_scenario() -> Scenario {
        let mut locations = BTreeMap::new();
        locations.insert(LocationId::from("room1"), minimal_location());

        Scenario {
            id: ScenarioId::new(),
            name: String::from("test"),
            description: String::new(),
            config: WorldConfig {
                initial_state: InitialState {
                    locations,
                    ..InitialState::default()
                },
                ..WorldConfig::default()
            },
            agent_templates: vec![AgentTemplate {
                name: String::from("Ada"),
                role: AgentRole::Human,
                model_id: default_model_id(),
                provider: default_provider(),
                persona: Some(minimal_persona()),
                goals: Vec::new(),
                location: LocationId::from("room1"),
                health: 10.0,
                stress: 3.0,
                inventory: Vec::new(),
            }],
        }
    }

    #[test]
    fn minimal_scenario_validates() {
        assert!(minimal_scenario().validate().is_ok());
    }

    #[test]
    fn human_without_persona_rejected() {
        let mut scenario = minimal_scenario();
        scenario.agent_templates[0].persona = None;
        assert!(matches!(
            scenario.validate(),
            Err(ScenarioError::MissingPersona(_))
        ));
    }

    #[test]
    fn unknown_start_location_rejected() {
        let mut scenario = minimal_scenario();
        scenario.agent_templates[0].location = LocationId::from("void");
        assert!(matches!(
            scenario.validate(),
            Err(ScenarioError::UnknownStartLocation { .. })
        ));
    }

    #[test]
    fn hazard_out_of_range_rejected() {
        let mut scenario = minimal_scenario();
        scenario.config.initial_state.hazard_level = 11;
        assert!(matches!(
            scenario.validate(),
            Err(ScenarioError::HazardOutOfRange(11))
        ));
    }

    #[test]
    fn duplicated_item_placement_rejected() {
        let mut scenario = minimal_scenario();
        let kit = ItemId::from("first_aid_kit");
        scenario.config.initial_state.items.insert(
            kit.clone(),
            Item {
                name: String::from("First aid kit"),
                description: String::new(),
                properties: BTreeMap::new(),
            },
        );
        if let Some(loc) = scenario
            .config
            .initial_state
            .locations
            .get_mut(&LocationId::from("room1"))
        {
            loc.items.push(kit.clone());
        }
        scenario.agent_templates[0].inventory.push(kit);
        assert!(matches!(
            scenario.validate(),
            Err(ScenarioError::DuplicateItemPlacement(_))
        ));
    }

    #[test]
    fn undefined_item_rejected() {
        let mut scenario = minimal_scenario();
        scenario.agent_templates[0]
            .inventory
            .push(ItemId::from("phantom"));
        assert!(matches!(
            scenario.validate(),
            Err(ScenarioError::UndefinedItem(_))
        ));
    }

    #[test]
    fn scenario_roundtrips_through_json() {
        let scenario = minimal_scenario();
        let json = serde_json::to_string(&scenario).expect("serialize");
        let restored: Scenario = serde_json::from_str(&json).expect("deserialize");
        assert_eq!(scenario, restored);
    }
}
