//! The mutable world state owned by the engine.
//!
//! Reserved keys (`hazard_level`, `locations`, `items`, `time_of_day`,
//! `weather`, `events`) are typed fields; scenario-defined dynamics live
//! in the `extra` bag and are writable only within their declared bounds.
//! Writes that violate a reserved key's type or a declared bound are
//! rejected per key; valid keys in the same update still apply.

use std::collections::BTreeMap;

use emosim_types::{DynamicsBound, InitialState, Item, ItemId, LocationId, MAX_HAZARD_LEVEL};

use crate::graph::WorldGraph;

/// Number of narrative events retained for agent context.
const EVENT_WINDOW: usize = 20;

/// Health lost per tick at a hazard-affected location, per hazard point.
const HAZARD_HEALTH_FACTOR: f64 = 0.03;

/// Stress gained per tick at a hazard-affected location, per hazard point.
const HAZARD_STRESS_FACTOR: f64 = 0.02;

/// Outcome of applying an `environment_update` action.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct UpdateOutcome {
    /// Keys that were applied.
    pub applied: Vec<String>,
    /// Keys that were rejected, with reasons.
    pub rejected: Vec<(String, String)>,
}

impl UpdateOutcome {
    /// Whether every key applied cleanly.
    pub fn is_clean(&self) -> bool {
        self.rejected.is_empty()
    }
}

/// The mutable world state for one run.
#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
pub struct WorldState {
    /// World hazard intensity, 0-10.
    pub hazard_level: u8,
    /// The location graph.
    pub graph: WorldGraph,
    /// Item definitions keyed by item id.
    pub items: BTreeMap<ItemId, Item>,
    /// Narrative time of day.
    pub time_of_day: Option<String>,
    /// Narrative weather.
    pub weather: Option<String>,
    /// Recent narrative events (bounded window).
    pub events: Vec<String>,
    /// Scenario-defined dynamic values.
    pub extra: BTreeMap<String, serde_json::Value>,
}

impl WorldState {
    /// Build the world state from a scenario's initial state.
    pub fn from_initial(initial: InitialState) -> Self {
        Self {
            hazard_level: initial.hazard_level.min(MAX_HAZARD_LEVEL),
            graph: WorldGraph::from_locations(initial.locations),
            items: initial.items,
            time_of_day: initial.time_of_day,
            weather: initial.weather,
            events: Vec::new(),
            extra: initial.extra,
        }
    }

    /// Look up an item definition.
    pub fn item(&self, id: &ItemId) -> Option<&Item> {
        self.items.get(id)
    }

    /// Append a narrative event, keeping the window bounded.
    pub fn push_event(&mut self, event: String) {
        self.events.push(event);
        if self.events.len() > EVENT_WINDOW {
            let excess = self.events.len() - EVENT_WINDOW;
            self.events.drain(..excess);
        }
    }

    /// Apply an `environment_update` parameter map.
    ///
    /// Recognized reserved keys: `hazard_level` (number 0-10),
    /// `time_of_day` (string), `weather` (string), `events` (array of
    /// strings, appended), `affected_locations` (array of location keys,
    /// marked hazard-affected). Any other key must have a declared
    /// [`DynamicsBound`] and a numeric value within it.
    pub fn apply_environment_update(
        &mut self,
        params: &BTreeMap<String, serde_json::Value>,
        dynamics: &BTreeMap<String, DynamicsBound>,
    ) -> UpdateOutcome {
        let mut outcome = UpdateOutcome::default();

        for (key, value) in params {
            let result = match key.as_str() {
                "hazard_level" => self.write_hazard(value),
                "time_of_day" => write_string(&mut self.time_of_day, value),
                "weather" => write_string(&mut self.weather, value),
                "events" => self.append_events(value),
                "affected_locations" => self.mark_affected(value),
                _ => self.write_dynamic(key, value, dynamics),
            };
            match result {
                Ok(()) => outcome.applied.push(key.clone()),
                Err(reason) => outcome.rejected.push((key.clone(), reason)),
            }
        }

        outcome
    }

    fn write_hazard(&mut self, value: &serde_json::Value) -> Result<(), String> {
        let Some(level) = value.as_f64() else {
            return Err(String::from("hazard_level must be a number"));
        };
        if !(0.0..=f64::from(MAX_HAZARD_LEVEL)).contains(&level) {
            return Err(format!("hazard_level {level} outside 0..=10"));
        }
        // Rounds toward zero; the scenario scale is coarse by design.
        self.hazard_level = level as u8;
        Ok(())
    }

    fn append_events(&mut self, value: &serde_json::Value) -> Result<(), String> {
        let Some(entries) = value.as_array() else {
            return Err(String::from("events must be an array of strings"));
        };
        for entry in entries {
            let Some(text) = entry.as_str() else {
                return Err(String::from("events must be an array of strings"));
            };
            self.push_event(text.to_owned());
        }
        Ok(())
    }

    fn mark_affected(&mut self, value: &serde_json::Value) -> Result<(), String> {
        let Some(entries) = value.as_array() else {
            return Err(String::from("affected_locations must be an array of keys"));
        };
        for entry in entries {
            let Some(key) = entry.as_str() else {
                return Err(String::from("affected_locations must be an array of keys"));
            };
            let id = LocationId::from(key);
            match self.graph.get_mut(&id) {
                Some(location) => location.hazard_affected = true,
                None => return Err(format!("unknown location '{key}'")),
            }
        }
        Ok(())
    }

    fn write_dynamic(
        &mut self,
        key: &str,
        value: &serde_json::Value,
        dynamics: &BTreeMap<String, DynamicsBound>,
    ) -> Result<(), String> {
        let Some(bound) = dynamics.get(key) else {
            return Err(format!("key '{key}' is not a declared dynamic"));
        };
        let Some(number) = value.as_f64() else {
            return Err(format!("dynamic '{key}' must be numeric"));
        };
        if number < bound.min || number > bound.max {
            return Err(format!(
                "dynamic '{key}' value {number} outside [{}, {}]",
                bound.min, bound.max
            ));
        }
        self.extra.insert(key.to_owned(), value.clone());
        Ok(())
    }

    /// Per-tick health delta for a human at a hazard-affected location.
    pub fn hazard_health_delta(&self) -> f64 {
        -(f64::from(self.hazard_level) * HAZARD_HEALTH_FACTOR)
    }

    /// Per-tick stress delta for a human at a hazard-affected location.
    pub fn hazard_stress_delta(&self) -> f64 {
        f64::from(self.hazard_level) * HAZARD_STRESS_FACTOR
    }

    /// Serialize the full state for a step snapshot.
    pub fn snapshot(&self) -> serde_json::Value {
        serde_json::to_value(self).unwrap_or(serde_json::Value::Null)
    }
}

fn write_string(slot: &mut Option<String>, value: &serde_json::Value) -> Result<(), String> {
    match value.as_str() {
        Some(text) => {
            *slot = Some(text.to_owned());
            Ok(())
        }
        None => Err(String::from("expected a string value")),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use emosim_types::{Location, LocationEffects};

    fn state_with_location(name: &str) -> WorldState {
        let mut initial = InitialState::default();
        initial.locations.insert(
            LocationId::from(name),
            Location {
                description: String::from("test"),
                nearby: Vec::new(),
                distance: 1,
                items: Vec::new(),
                hidden_items: Vec::new(),
                hazard_affected: false,
                effects: LocationEffects::default(),
            },
        );
        WorldState::from_initial(initial)
    }

    fn params(json: serde_json::Value) -> BTreeMap<String, serde_json::Value> {
        serde_json::from_value(json).expect("params")
    }

    #[test]
    fn hazard_update_applies_within_range() {
        let mut state = state_with_location("room1");
        let outcome = state.apply_environment_update(
            &params(serde_json::json!({"hazard_level": 7})),
            &BTreeMap::new(),
        );
        assert!(outcome.is_clean());
        assert_eq!(state.hazard_level, 7);
    }

    #[test]
    fn hazard_out_of_range_rejected_without_change() {
        let mut state = state_with_location("room1");
        let outcome = state.apply_environment_update(
            &params(serde_json::json!({"hazard_level": 14})),
            &BTreeMap::new(),
        );
        assert_eq!(outcome.rejected.len(), 1);
        assert_eq!(state.hazard_level, 0);
    }

    #[test]
    fn reserved_key_type_violation_rejected() {
        let mut state = state_with_location("room1");
        let outcome = state.apply_environment_update(
            &params(serde_json::json!({"weather": 3})),
            &BTreeMap::new(),
        );
        assert_eq!(outcome.rejected.len(), 1);
        assert!(state.weather.is_none());
    }

    #[test]
    fn valid_keys_apply_even_when_others_fail() {
        let mut state = state_with_location("room1");
        let outcome = state.apply_environment_update(
            &params(serde_json::json!({"hazard_level": 4, "weather": 3})),
            &BTreeMap::new(),
        );
        assert_eq!(outcome.applied, vec![String::from("hazard_level")]);
        assert_eq!(outcome.rejected.len(), 1);
        assert_eq!(state.hazard_level, 4);
    }

    #[test]
    fn undeclared_dynamic_rejected() {
        let mut state = state_with_location("room1");
        let outcome = state.apply_environment_update(
            &params(serde_json::json!({"water_depth": 2.5})),
            &BTreeMap::new(),
        );
        assert_eq!(outcome.rejected.len(), 1);
        assert!(!state.extra.contains_key("water_depth"));
    }

    #[test]
    fn declared_dynamic_applies_within_bounds() {
        let mut state = state_with_location("room1");
        let mut dynamics = BTreeMap::new();
        dynamics.insert(
            String::from("water_depth"),
            DynamicsBound { min: 0.0, max: 5.0 },
        );
        let outcome = state.apply_environment_update(
            &params(serde_json::json!({"water_depth": 2.5})),
            &dynamics,
        );
        assert!(outcome.is_clean());
        assert_eq!(
            state.extra.get("water_depth"),
            Some(&serde_json::json!(2.5))
        );

        let outcome = state.apply_environment_update(
            &params(serde_json::json!({"water_depth": 9.0})),
            &dynamics,
        );
        assert_eq!(outcome.rejected.len(), 1);
    }

    #[test]
    fn affected_locations_marked() {
        let mut state = state_with_location("room1");
        let outcome = state.apply_environment_update(
            &params(serde_json::json!({"affected_locations": ["room1"]})),
            &BTreeMap::new(),
        );
        assert!(outcome.is_clean());
        assert!(state.graph.get(&"room1".into()).expect("location").hazard_affected);
    }

    #[test]
    fn event_window_is_bounded() {
        let mut state = state_with_location("room1");
        for i in 0..30 {
            state.push_event(format!("event {i}"));
        }
        assert_eq!(state.events.len(), EVENT_WINDOW);
        assert_eq!(state.events.last().map(String::as_str), Some("event 29"));
    }

    #[test]
    fn hazard_deltas_scale_with_level() {
        let mut state = state_with_location("room1");
        state.hazard_level = 10;
        assert!((state.hazard_health_delta() + 0.3).abs() < 1e-9);
        assert!((state.hazard_stress_delta() - 0.2).abs() < 1e-9);
        state.hazard_level = 0;
        assert_eq!(state.hazard_health_delta(), 0.0);
    }
}
