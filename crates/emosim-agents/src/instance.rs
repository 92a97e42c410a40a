//! Agent instances: template plus mutable per-run state.

use emosim_types::{
    AgentDynamicState, AgentId, AgentRole, AgentSummary, AgentTemplate, Persona,
};

use crate::memory::AgentMemory;

/// An agent bound to a run.
#[derive(Debug, Clone)]
pub struct AgentInstance {
    /// Agent identifier.
    pub id: AgentId,
    /// The immutable template this agent was created from.
    pub template: AgentTemplate,
    /// Mutable dynamic state (location, vitals, inventory, travel).
    pub state: AgentDynamicState,
    /// The agent's memory.
    pub memory: AgentMemory,
    /// Whether the agent still takes turns. Health 0 clears this.
    pub is_active: bool,
}

impl AgentInstance {
    /// Instantiate an agent from its template.
    pub fn from_template(template: AgentTemplate) -> Self {
        let state = AgentDynamicState {
            location: template.location.clone(),
            health: template.health.clamp(0.0, 10.0),
            stress: template.stress.clamp(0.0, 10.0),
            inventory: template.inventory.clone(),
            travel: None,
        };
        Self {
            id: AgentId::new(),
            template,
            state,
            memory: AgentMemory::new(),
            is_active: true,
        }
    }

    /// The agent's display name.
    pub fn name(&self) -> &str {
        &self.template.name
    }

    /// The agent's role.
    pub const fn role(&self) -> AgentRole {
        self.template.role
    }

    /// The persona, for human agents.
    pub const fn persona(&self) -> Option<&Persona> {
        self.template.persona.as_ref()
    }

    /// Whether the agent is active and able to act (health above zero).
    pub fn can_act(&self) -> bool {
        self.is_active && self.state.health > 0.0
    }

    /// Mark the agent inactive (incapacitated or run over).
    pub fn deactivate(&mut self) {
        self.is_active = false;
    }

    /// The read-only view served by the control API.
    pub fn summary(&self) -> AgentSummary {
        AgentSummary {
            id: self.id,
            name: self.template.name.clone(),
            role: self.template.role,
            is_active: self.is_active,
            state: self.state.clone(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use emosim_types::LocationId;

    fn template(role: AgentRole) -> AgentTemplate {
        AgentTemplate {
            name: String::from("Ada"),
            role,
            model_id: String::from("test"),
            provider: String::from("openai"),
            persona: None,
            goals: Vec::new(),
            location: LocationId::from("room1"),
            health: 10.0,
            stress: 3.0,
            inventory: Vec::new(),
        }
    }

    #[test]
    fn instance_starts_active_at_template_location() {
        let agent = AgentInstance::from_template(template(AgentRole::Human));
        assert!(agent.can_act());
        assert_eq!(agent.state.location, LocationId::from("room1"));
        assert_eq!(agent.state.health, 10.0);
    }

    #[test]
    fn out_of_range_template_vitals_are_clamped() {
        let mut t = template(AgentRole::Human);
        t.health = 25.0;
        t.stress = -4.0;
        let agent = AgentInstance::from_template(t);
        assert_eq!(agent.state.health, 10.0);
        assert_eq!(agent.state.stress, 0.0);
    }

    #[test]
    fn zero_health_prevents_acting() {
        let mut agent = AgentInstance::from_template(template(AgentRole::Human));
        agent.state.health = 0.0;
        assert!(!agent.can_act());
    }

    #[test]
    fn deactivated_agent_cannot_act() {
        let mut agent = AgentInstance::from_template(template(AgentRole::Human));
        agent.deactivate();
        assert!(!agent.can_act());
    }

    #[test]
    fn summary_reflects_live_state() {
        let mut agent = AgentInstance::from_template(template(AgentRole::Environment));
        agent.state.stress = 6.0;
        let summary = agent.summary();
        assert_eq!(summary.role, AgentRole::Environment);
        assert_eq!(summary.state.stress, 6.0);
    }
}
