//! Agent memory: episodic sliding window, relationship tracking, and
//! arrival context.
//!
//! The episodic log keeps the last N events (default 50) as short
//! summaries. Relationships accumulate per other-agent: interaction
//! counts, a 0-10 trust level that drifts with the tone of interactions,
//! sentiment, and free-form notes. The arrival context remembers how the
//! agent got to its current location so the context assembler can remind
//! it.

use std::collections::{BTreeMap, VecDeque};

use serde::{Deserialize, Serialize};

use emosim_types::{AgentId, LocationId, Sentiment};

/// Words that nudge trust upward when received in a message.
const WARM_KEYWORDS: &[&str] = &["help", "thank", "thanks", "please", "together", "safe"];

/// Words that nudge trust downward when received in a message.
const COLD_KEYWORDS: &[&str] = &["liar", "useless", "shut up", "leave me", "your fault"];

/// Maximum retained conversation excerpts.
const EXCERPT_WINDOW: usize = 10;

/// Configuration for the agent memory system.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MemoryConfig {
    /// Episodic sliding-window length (default: 50 events).
    pub window: usize,
}

impl Default for MemoryConfig {
    fn default() -> Self {
        Self { window: 50 }
    }
}

/// One remembered event.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MemoryEvent {
    /// Tick the event happened.
    pub tick: u64,
    /// Event kind (`message`, `action`, `observation`).
    pub kind: String,
    /// One-line summary.
    pub summary: String,
}

/// Accumulated relationship with another agent.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Relationship {
    /// The other agent.
    pub agent_id: AgentId,
    /// The other agent's display name.
    pub agent_name: String,
    /// Tick of the first interaction.
    pub first_met_step: u64,
    /// Number of interactions so far.
    pub interaction_count: u32,
    /// Trust, 0-10 (starts at 5).
    pub trust_level: u8,
    /// Overall sentiment.
    pub sentiment: Sentiment,
    /// Free-form notes.
    pub notes: Vec<String>,
    /// Tick of the most recent interaction.
    pub last_interaction_step: u64,
}

/// How the agent arrived at its current location.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ArrivalContext {
    /// Where the agent is now.
    pub location: LocationId,
    /// Where it came from, if anywhere.
    pub from: Option<LocationId>,
    /// Why it moved (e.g. "moved toward shelter", "fled the flood").
    pub reason: String,
    /// Tick of arrival.
    pub step: u64,
}

/// The memory attached to one agent instance.
#[derive(Debug, Clone, Default)]
pub struct AgentMemory {
    config: MemoryConfig,
    events: VecDeque<MemoryEvent>,
    relationships: BTreeMap<AgentId, Relationship>,
    arrival: Option<ArrivalContext>,
    excerpts: VecDeque<String>,
}

impl AgentMemory {
    /// Create memory with the default window.
    pub fn new() -> Self {
        Self::with_config(MemoryConfig::default())
    }

    /// Create memory with an explicit configuration.
    pub fn with_config(config: MemoryConfig) -> Self {
        Self {
            config,
            events: VecDeque::new(),
            relationships: BTreeMap::new(),
            arrival: None,
            excerpts: VecDeque::new(),
        }
    }

    /// Record an event, sliding the window.
    pub fn record_event(&mut self, tick: u64, kind: &str, summary: String) {
        self.events.push_back(MemoryEvent {
            tick,
            kind: kind.to_owned(),
            summary,
        });
        while self.events.len() > self.config.window {
            self.events.pop_front();
        }
    }

    /// Record a message received from another agent and update the
    /// relationship: interaction count, recency, and a trust drift based
    /// on the message tone.
    pub fn record_message_from(
        &mut self,
        step: u64,
        sender: AgentId,
        sender_name: &str,
        content: &str,
    ) {
        self.record_event(step, "message", format!("{sender_name}: {content}"));

        let relationship = self.relationship_entry(sender, sender_name, step);
        relationship.interaction_count += 1;
        relationship.last_interaction_step = step;

        let lower = content.to_lowercase();
        if WARM_KEYWORDS.iter().any(|k| lower.contains(k)) {
            relationship.trust_level = (relationship.trust_level + 1).min(10);
        } else if COLD_KEYWORDS.iter().any(|k| lower.contains(k)) {
            relationship.trust_level = relationship.trust_level.saturating_sub(1);
        }
        relationship.sentiment = sentiment_for_trust(relationship.trust_level);
    }

    /// Record being helped by another agent: a strong positive signal.
    pub fn record_help_received(&mut self, step: u64, helper: AgentId, helper_name: &str) {
        self.record_event(step, "observation", format!("{helper_name} helped me"));
        let relationship = self.relationship_entry(helper, helper_name, step);
        relationship.interaction_count += 1;
        relationship.last_interaction_step = step;
        relationship.trust_level = (relationship.trust_level + 2).min(10);
        relationship.sentiment = sentiment_for_trust(relationship.trust_level);
        relationship.notes.push(format!("helped me at step {step}"));
    }

    /// Record an action the agent itself took.
    pub fn record_own_action(&mut self, tick: u64, summary: String) {
        self.record_event(tick, "action", summary);
    }

    /// Remember a conversation excerpt for later context.
    pub fn record_excerpt(&mut self, line: String) {
        self.excerpts.push_back(line);
        while self.excerpts.len() > EXCERPT_WINDOW {
            self.excerpts.pop_front();
        }
    }

    /// Set how the agent arrived at its current location.
    pub fn set_arrival(
        &mut self,
        location: LocationId,
        from: Option<LocationId>,
        reason: String,
        step: u64,
    ) {
        self.arrival = Some(ArrivalContext {
            location,
            from,
            reason,
            step,
        });
    }

    /// The arrival context, if recorded.
    pub fn arrival(&self) -> Option<&ArrivalContext> {
        self.arrival.as_ref()
    }

    /// The relationship with another agent, if any interaction happened.
    pub fn relationship(&self, agent: AgentId) -> Option<&Relationship> {
        self.relationships.get(&agent)
    }

    /// The most recent `limit` event summaries, oldest first.
    pub fn recent_events(&self, limit: usize) -> Vec<&MemoryEvent> {
        let skip = self.events.len().saturating_sub(limit);
        self.events.iter().skip(skip).collect()
    }

    /// Recent conversation excerpts, oldest first.
    pub fn excerpts(&self) -> impl Iterator<Item = &String> {
        self.excerpts.iter()
    }

    /// Render relationship context lines for the given co-located agents.
    pub fn relationship_lines(&self, agents: &[(AgentId, String)]) -> Vec<String> {
        let mut lines = Vec::new();
        for (id, name) in agents {
            let Some(rel) = self.relationships.get(id) else {
                continue;
            };
            let trust_desc = if rel.trust_level >= 7 {
                "I trust them"
            } else if rel.trust_level >= 4 {
                "I'm familiar with them"
            } else {
                "I'm wary of them"
            };
            lines.push(format!(
                "- {name}: {trust_desc}; {count} interactions, feeling {sentiment:?}.",
                count = rel.interaction_count,
                sentiment = rel.sentiment,
            ));
            if let Some(note) = rel.notes.last() {
                lines.push(format!("  Note: {note}"));
            }
        }
        lines
    }

    fn relationship_entry(
        &mut self,
        agent: AgentId,
        name: &str,
        step: u64,
    ) -> &mut Relationship {
        self.relationships.entry(agent).or_insert_with(|| Relationship {
            agent_id: agent,
            agent_name: name.to_owned(),
            first_met_step: step,
            interaction_count: 0,
            trust_level: 5,
            sentiment: Sentiment::Neutral,
            notes: Vec::new(),
            last_interaction_step: step,
        })
    }
}

/// Map a trust level onto a sentiment bucket.
const fn sentiment_for_trust(trust: u8) -> Sentiment {
    if trust >= 7 {
        Sentiment::Positive
    } else if trust <= 3 {
        Sentiment::Negative
    } else {
        Sentiment::Neutral
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn window_slides_oldest_events_out() {
        let mut memory = AgentMemory::with_config(MemoryConfig { window: 3 });
        for i in 0..5 {
            memory.record_event(i, "observation", format!("event {i}"));
        }
        let recent = memory.recent_events(10);
        assert_eq!(recent.len(), 3);
        assert_eq!(recent[0].summary, "event 2");
        assert_eq!(recent[2].summary, "event 4");
    }

    #[test]
    fn first_message_creates_neutral_relationship() {
        let mut memory = AgentMemory::new();
        let sender = AgentId::new();
        memory.record_message_from(1, sender, "Ben", "the bridge is out");
        let rel = memory.relationship(sender).expect("relationship");
        assert_eq!(rel.interaction_count, 1);
        assert_eq!(rel.trust_level, 5);
        assert_eq!(rel.sentiment, Sentiment::Neutral);
        assert_eq!(rel.first_met_step, 1);
    }

    #[test]
    fn warm_messages_raise_trust_toward_positive() {
        let mut memory = AgentMemory::new();
        let sender = AgentId::new();
        memory.record_message_from(1, sender, "Ben", "let me help you up");
        memory.record_message_from(2, sender, "Ben", "thanks for waiting");
        let rel = memory.relationship(sender).expect("relationship");
        assert_eq!(rel.trust_level, 7);
        assert_eq!(rel.sentiment, Sentiment::Positive);
        assert_eq!(rel.last_interaction_step, 2);
    }

    #[test]
    fn cold_messages_lower_trust() {
        let mut memory = AgentMemory::new();
        let sender = AgentId::new();
        for step in 0..3 {
            memory.record_message_from(step, sender, "Ben", "this is your fault");
        }
        let rel = memory.relationship(sender).expect("relationship");
        assert_eq!(rel.trust_level, 2);
        assert_eq!(rel.sentiment, Sentiment::Negative);
    }

    #[test]
    fn help_received_is_a_strong_boost_with_note() {
        let mut memory = AgentMemory::new();
        let helper = AgentId::new();
        memory.record_help_received(4, helper, "Cara");
        let rel = memory.relationship(helper).expect("relationship");
        assert_eq!(rel.trust_level, 7);
        assert_eq!(rel.notes.len(), 1);
    }

    #[test]
    fn relationship_lines_mention_known_agents_only() {
        let mut memory = AgentMemory::new();
        let known = AgentId::new();
        let stranger = AgentId::new();
        memory.record_message_from(1, known, "Ben", "hello");
        let lines = memory.relationship_lines(&[
            (known, String::from("Ben")),
            (stranger, String::from("Dana")),
        ]);
        assert_eq!(lines.len(), 1);
        assert!(lines[0].contains("Ben"));
    }

    #[test]
    fn arrival_context_is_remembered() {
        let mut memory = AgentMemory::new();
        memory.set_arrival(
            LocationId::from("roof"),
            Some(LocationId::from("room1")),
            String::from("fled the rising water"),
            3,
        );
        let arrival = memory.arrival().expect("arrival");
        assert_eq!(arrival.location, LocationId::from("roof"));
        assert_eq!(arrival.reason, "fled the rising water");
    }
}
