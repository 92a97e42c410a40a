//! Agent dynamic state: the mutable part of an agent instance.

use serde::{Deserialize, Serialize};

use crate::ids::{AgentId, ItemId, LocationId};

/// Inclusive bounds for health and stress.
pub const VITAL_RANGE: core::ops::RangeInclusive<f64> = 0.0..=10.0;

/// Clamp a vital value into `[0, 10]`.
pub fn clamp_vital(value: f64) -> f64 {
    value.clamp(*VITAL_RANGE.start(), *VITAL_RANGE.end())
}

/// A multi-step journey in progress.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TravelPlan {
    /// Final destination.
    pub destination: LocationId,
    /// Hops still ahead of the agent, in order. The last entry is the
    /// destination.
    pub remaining: Vec<LocationId>,
}

/// The mutable state of an agent instance within a run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AgentDynamicState {
    /// Current location. An agent is at exactly one location.
    pub location: LocationId,
    /// Health, 0-10. Reaching 0 marks the agent inactive.
    pub health: f64,
    /// Stress, 0-10.
    pub stress: f64,
    /// Items carried. Each item lives in exactly one container.
    pub inventory: Vec<ItemId>,
    /// In-progress multi-step travel, if any.
    #[serde(default)]
    pub travel: Option<TravelPlan>,
}

impl AgentDynamicState {
    /// Apply a health delta, clamped. Returns the new value.
    pub fn adjust_health(&mut self, delta: f64) -> f64 {
        self.health = clamp_vital(self.health + delta);
        self.health
    }

    /// Apply a stress delta, clamped. Returns the new value.
    pub fn adjust_stress(&mut self, delta: f64) -> f64 {
        self.stress = clamp_vital(self.stress + delta);
        self.stress
    }
}

/// Read-only view of an agent served by the control API.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AgentSummary {
    /// Agent identifier.
    pub id: AgentId,
    /// Display name.
    pub name: String,
    /// Role, as a wire string.
    pub role: crate::enums::AgentRole,
    /// Whether the agent still takes turns.
    pub is_active: bool,
    /// Live dynamic state.
    pub state: AgentDynamicState,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn state_at(location: &str) -> AgentDynamicState {
        AgentDynamicState {
            location: LocationId::from(location),
            health: 10.0,
            stress: 3.0,
            inventory: Vec::new(),
            travel: None,
        }
    }

    #[test]
    fn health_clamps_at_bounds() {
        let mut state = state_at("room1");
        assert_eq!(state.adjust_health(5.0), 10.0);
        assert_eq!(state.adjust_health(-25.0), 0.0);
    }

    #[test]
    fn stress_clamps_at_bounds() {
        let mut state = state_at("room1");
        assert_eq!(state.adjust_stress(20.0), 10.0);
        assert_eq!(state.adjust_stress(-15.0), 0.0);
    }

    #[test]
    fn travel_plan_roundtrips() {
        let mut state = state_at("a");
        state.travel = Some(TravelPlan {
            destination: LocationId::from("d"),
            remaining: vec![LocationId::from("c"), LocationId::from("d")],
        });
        let json = serde_json::to_string(&state).expect("serialize");
        let restored: AgentDynamicState = serde_json::from_str(&json).expect("deserialize");
        assert_eq!(state, restored);
    }
}
