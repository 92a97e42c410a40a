//! Conversation lifecycle and round-robin turn allocation.
//!
//! Conversations are context, not gates: an agent may publish a message
//! whether or not it is its turn; the manager records what happened and
//! keeps the turn index, idle timers, and participant sets consistent.
//!
//! Lifecycle: the engine scans co-locations at the start of every tick and
//! creates a conversation wherever two or more active agents share a
//! location without a live one. Losing participants below two ends it;
//! two consecutive silent ticks pause it; any participant message resumes
//! it; a participant exceeding `max_turns_per_agent` ends it.

use std::collections::BTreeMap;

use emosim_types::{AgentId, ConversationId, ConversationStatus, LocationId, MessageId};

/// Default cap on turns per participant.
pub const DEFAULT_MAX_TURNS_PER_AGENT: u32 = 20;

/// Consecutive silent ticks after which a conversation pauses.
const IDLE_TICKS_TO_PAUSE: u32 = 2;

/// A conversation among co-located agents.
#[derive(Debug, Clone)]
pub struct Conversation {
    /// Conversation identifier.
    pub id: ConversationId,
    /// The location binding this conversation.
    pub location: LocationId,
    /// Participants in join order; the order is the turn order.
    pub participants: Vec<AgentId>,
    /// Index into `participants` (mod length) of the next speaker.
    pub current_speaker_index: usize,
    /// Turns taken per participant.
    pub turn_counts: BTreeMap<AgentId, u32>,
    /// Cap on turns per participant.
    pub max_turns_per_agent: u32,
    /// Lifecycle status.
    pub status: ConversationStatus,
    /// Messages spoken into this conversation.
    pub transcript: Vec<MessageId>,
    /// Consecutive ticks with no participant message.
    idle_ticks: u32,
    /// Whether any participant spoke this tick.
    spoke_this_tick: bool,
}

impl Conversation {
    fn new(location: LocationId, participants: Vec<AgentId>) -> Self {
        Self {
            id: ConversationId::new(),
            location,
            participants,
            current_speaker_index: 0,
            turn_counts: BTreeMap::new(),
            max_turns_per_agent: DEFAULT_MAX_TURNS_PER_AGENT,
            status: ConversationStatus::Active,
            transcript: Vec::new(),
            idle_ticks: 0,
            spoke_this_tick: false,
        }
    }

    /// The participant whose turn it is, if the conversation is live.
    pub fn current_speaker(&self) -> Option<AgentId> {
        if self.status == ConversationStatus::Ended || self.participants.is_empty() {
            return None;
        }
        self.participants
            .get(self.current_speaker_index % self.participants.len())
            .copied()
    }

    /// Whether it is `agent`'s turn.
    pub fn is_turn_of(&self, agent: AgentId) -> bool {
        self.current_speaker() == Some(agent)
    }

    /// Record the outcome of the current speaker's turn. The index
    /// advances whether or not the agent spoke (no starvation); exceeding
    /// the per-agent cap ends the conversation.
    pub fn take_turn(&mut self, agent: AgentId, spoke: bool) {
        if !self.is_turn_of(agent) {
            return;
        }
        let count = self.turn_counts.entry(agent).or_insert(0);
        *count += 1;
        if *count > self.max_turns_per_agent {
            self.status = ConversationStatus::Ended;
            return;
        }
        if !self.participants.is_empty() {
            self.current_speaker_index =
                (self.current_speaker_index + 1) % self.participants.len();
        }
        if spoke {
            self.spoke_this_tick = true;
        }
    }

    /// Record a message spoken by a participant (in or out of turn).
    /// Resumes a paused conversation.
    pub fn record_message(&mut self, agent: AgentId, message: MessageId) {
        if !self.participants.contains(&agent) {
            return;
        }
        self.transcript.push(message);
        self.spoke_this_tick = true;
        if self.status == ConversationStatus::Paused {
            self.status = ConversationStatus::Active;
        }
    }

    /// Add a participant (idempotent).
    pub fn add_participant(&mut self, agent: AgentId) {
        if !self.participants.contains(&agent) {
            self.participants.push(agent);
        }
    }

    /// Remove a participant; ends the conversation below two.
    pub fn remove_participant(&mut self, agent: AgentId) {
        if let Some(pos) = self.participants.iter().position(|p| *p == agent) {
            self.participants.remove(pos);
            // Keep the index pointing at the same next speaker.
            if pos < self.current_speaker_index && self.current_speaker_index > 0 {
                self.current_speaker_index -= 1;
            }
            if !self.participants.is_empty() {
                self.current_speaker_index %= self.participants.len();
            }
        }
        if self.participants.len() < 2 {
            self.status = ConversationStatus::Ended;
        }
    }

    /// Advance idle bookkeeping at the end of a tick.
    pub fn finish_tick(&mut self) {
        if self.status != ConversationStatus::Active {
            self.spoke_this_tick = false;
            return;
        }
        if self.spoke_this_tick {
            self.idle_ticks = 0;
        } else {
            self.idle_ticks += 1;
            if self.idle_ticks >= IDLE_TICKS_TO_PAUSE {
                self.status = ConversationStatus::Paused;
            }
        }
        self.spoke_this_tick = false;
    }
}

/// Manages all conversations in a run.
#[derive(Debug, Clone, Default)]
pub struct ConversationManager {
    conversations: BTreeMap<ConversationId, Conversation>,
    by_location: BTreeMap<LocationId, ConversationId>,
}

impl ConversationManager {
    /// Create an empty manager.
    pub fn new() -> Self {
        Self::default()
    }

    /// Scan agent locations and create conversations where two or more
    /// active agents share a location with no live conversation. Returns
    /// the conversations created.
    ///
    /// `locations` must contain only agents eligible to converse (active
    /// humans).
    pub fn scan_colocations(
        &mut self,
        locations: &BTreeMap<AgentId, LocationId>,
    ) -> Vec<ConversationId> {
        let mut by_location: BTreeMap<&LocationId, Vec<AgentId>> = BTreeMap::new();
        for (agent, location) in locations {
            by_location.entry(location).or_default().push(*agent);
        }

        let mut created = Vec::new();
        for (location, mut agents) in by_location {
            if agents.len() < 2 {
                continue;
            }
            if self.live_conversation_at(location).is_some() {
                continue;
            }
            agents.sort();
            let conversation = Conversation::new(location.clone(), agents);
            let id = conversation.id;
            tracing::debug!(conversation = %id, location = %location, "conversation created");
            self.by_location.insert(location.clone(), id);
            self.conversations.insert(id, conversation);
            created.push(id);
        }
        created
    }

    /// The live (active or paused) conversation at a location.
    pub fn live_conversation_at(&self, location: &LocationId) -> Option<&Conversation> {
        let id = self.by_location.get(location)?;
        self.conversations
            .get(id)
            .filter(|c| c.status != ConversationStatus::Ended)
    }

    /// Mutable access to the live conversation at a location.
    pub fn live_conversation_at_mut(&mut self, location: &LocationId) -> Option<&mut Conversation> {
        let id = *self.by_location.get(location)?;
        self.conversations
            .get_mut(&id)
            .filter(|c| c.status != ConversationStatus::Ended)
    }

    /// The live conversation `agent` participates in at `location`.
    pub fn conversation_of(&self, agent: AgentId, location: &LocationId) -> Option<&Conversation> {
        self.live_conversation_at(location)
            .filter(|c| c.participants.contains(&agent))
    }

    /// Handle an agent leaving a location: remove it from the local
    /// conversation (which may end it).
    pub fn agent_left(&mut self, agent: AgentId, location: &LocationId) {
        if let Some(conversation) = self.live_conversation_at_mut(location) {
            conversation.remove_participant(agent);
        }
    }

    /// Explicitly join the conversation at a location, if one is live.
    /// Returns whether a conversation was joined.
    pub fn join(&mut self, agent: AgentId, location: &LocationId) -> bool {
        match self.live_conversation_at_mut(location) {
            Some(conversation) => {
                conversation.add_participant(agent);
                true
            }
            None => false,
        }
    }

    /// Explicitly leave the conversation at a location. Returns whether
    /// the agent was a participant.
    pub fn leave(&mut self, agent: AgentId, location: &LocationId) -> bool {
        match self.live_conversation_at_mut(location) {
            Some(conversation) if conversation.participants.contains(&agent) => {
                conversation.remove_participant(agent);
                true
            }
            _ => false,
        }
    }

    /// End-of-tick pass: advance idle timers, then drop ended
    /// conversations. Returns the ids that ended.
    pub fn finish_tick(&mut self) -> Vec<ConversationId> {
        for conversation in self.conversations.values_mut() {
            conversation.finish_tick();
        }
        let ended: Vec<ConversationId> = self
            .conversations
            .iter()
            .filter(|(_, c)| c.status == ConversationStatus::Ended)
            .map(|(id, _)| *id)
            .collect();
        for id in &ended {
            if let Some(conversation) = self.conversations.remove(id) {
                if self.by_location.get(&conversation.location) == Some(id) {
                    self.by_location.remove(&conversation.location);
                }
            }
        }
        ended
    }

    /// All live conversations.
    pub fn live_conversations(&self) -> impl Iterator<Item = &Conversation> {
        self.conversations
            .values()
            .filter(|c| c.status != ConversationStatus::Ended)
    }

    /// Count of currently active conversations.
    pub fn active_count(&self) -> u64 {
        self.conversations
            .values()
            .filter(|c| c.status == ConversationStatus::Active)
            .count() as u64
    }
}
