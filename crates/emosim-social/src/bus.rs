//! The in-memory message bus: direct, room, and broadcast routing with an
//! ordered history.
//!
//! Delivery is synchronous within a tick: a message published by agent A
//! at step N lands in the inboxes of agents processed after A in the same
//! step, and in everyone else's at step N+1 (inboxes drain when the agent
//! takes its turn). No message is ever dropped; history is unbounded per
//! run and ordered by `(step_index, seq)`.

use std::collections::{BTreeMap, BTreeSet};

use chrono::Utc;
use emosim_types::{
    AgentId, LocationId, MessageId, MessageRecord, MessageTarget, MessageType, RunId,
};

/// A message before routing assigns identity, sequence, and timestamp.
#[derive(Debug, Clone)]
pub struct MessageDraft {
    /// Sender; `None` for system/narrator messages.
    pub from_agent_id: Option<AgentId>,
    /// Sender display name.
    pub from_name: String,
    /// Routing target.
    pub to_target: MessageTarget,
    /// Routing type; must agree with the target variant.
    pub message_type: MessageType,
    /// Message body.
    pub content: String,
    /// Optional metadata bag.
    pub metadata: BTreeMap<String, serde_json::Value>,
}

/// Filter for history queries. All criteria are conjunctive.
#[derive(Debug, Clone, Default)]
pub struct HistoryFilter {
    /// Match messages sent by or addressed to this agent.
    pub agent: Option<AgentId>,
    /// Match room messages for this location.
    pub room: Option<LocationId>,
    /// Inclusive step range.
    pub step_range: Option<(u64, u64)>,
    /// Keep at most this many, from the end (most recent).
    pub limit: Option<usize>,
}

/// The per-run message bus.
#[derive(Debug, Clone)]
pub struct MessageBus {
    run_id: RunId,
    /// Pending (undelivered-to-context) messages per agent, insertion order.
    inboxes: BTreeMap<AgentId, Vec<MessageRecord>>,
    /// Room membership, maintained by the engine on movement.
    rooms: BTreeMap<LocationId, BTreeSet<AgentId>>,
    /// Agents eligible for broadcast delivery.
    active: BTreeSet<AgentId>,
    /// Full ordered history.
    history: Vec<MessageRecord>,
    /// Monotonic publish sequence.
    seq: u64,
}

impl MessageBus {
    /// Create an empty bus for a run.
    pub const fn new(run_id: RunId) -> Self {
        Self {
            run_id,
            inboxes: BTreeMap::new(),
            rooms: BTreeMap::new(),
            active: BTreeSet::new(),
            history: Vec::new(),
            seq: 0,
        }
    }

    /// Register an agent for delivery.
    pub fn register_agent(&mut self, agent: AgentId) {
        self.active.insert(agent);
        self.inboxes.entry(agent).or_default();
    }

    /// Remove an agent from broadcast/room delivery (for example on
    /// incapacitation). Its inbox and history entries remain readable.
    pub fn deactivate_agent(&mut self, agent: AgentId) {
        self.active.remove(&agent);
        for members in self.rooms.values_mut() {
            members.remove(&agent);
        }
    }

    /// Subscribe an agent to a room.
    pub fn join_room(&mut self, agent: AgentId, room: LocationId) {
        self.rooms.entry(room).or_default().insert(agent);
    }

    /// Unsubscribe an agent from a room.
    pub fn leave_room(&mut self, agent: AgentId, room: &LocationId) {
        if let Some(members) = self.rooms.get_mut(room) {
            members.remove(&agent);
        }
    }

    /// Move an agent's room subscription in one call.
    pub fn move_agent(&mut self, agent: AgentId, from: &LocationId, to: LocationId) {
        self.leave_room(agent, from);
        self.join_room(agent, to);
    }

    /// Route a message and append it to history. Returns the stored
    /// record.
    ///
    /// Senders never receive their own message. Room and broadcast
    /// delivery go to the current membership at publish time.
    pub fn publish(&mut self, draft: MessageDraft, step_index: u64) -> MessageRecord {
        let record = MessageRecord {
            id: MessageId::new(),
            run_id: self.run_id,
            from_agent_id: draft.from_agent_id,
            from_name: draft.from_name,
            to_target: draft.to_target,
            message_type: draft.message_type,
            content: draft.content,
            metadata: draft.metadata,
            step_index,
            seq: self.seq,
            timestamp: Utc::now(),
        };
        self.seq += 1;

        let recipients: Vec<AgentId> = match (&record.message_type, &record.to_target) {
            (MessageType::Direct, MessageTarget::Agent(id)) => vec![*id],
            (MessageType::Room, MessageTarget::Room(room)) => self
                .rooms
                .get(room)
                .map(|members| members.iter().copied().collect())
                .unwrap_or_default(),
            (MessageType::Broadcast, _) => self.active.iter().copied().collect(),
            // Mismatched type/target combinations deliver to nobody but
            // still enter history for the audit trail.
            _ => Vec::new(),
        };

        for recipient in recipients {
            if Some(recipient) == record.from_agent_id {
                continue;
            }
            self.inboxes
                .entry(recipient)
                .or_default()
                .push(record.clone());
        }

        self.history.push(record.clone());
        record
    }

    /// Drain an agent's inbox in insertion order.
    pub fn take_inbox(&mut self, agent: AgentId) -> Vec<MessageRecord> {
        self.inboxes
            .get_mut(&agent)
            .map(std::mem::take)
            .unwrap_or_default()
    }

    /// Number of pending messages for an agent.
    pub fn inbox_len(&self, agent: AgentId) -> usize {
        self.inboxes.get(&agent).map_or(0, Vec::len)
    }

    /// Total messages published so far.
    pub fn message_count(&self) -> u64 {
        self.history.len() as u64
    }

    /// Query history, insertion-ordered by `(step_index, seq)`.
    pub fn history(&self, filter: &HistoryFilter) -> Vec<&MessageRecord> {
        let mut result: Vec<&MessageRecord> = self
            .history
            .iter()
            .filter(|m| {
                if let Some(agent) = filter.agent {
                    let sent_by = m.from_agent_id == Some(agent);
                    let sent_to = matches!(m.to_target, MessageTarget::Agent(id) if id == agent);
                    if !sent_by && !sent_to {
                        return false;
                    }
                }
                if let Some(room) = &filter.room {
                    if !matches!(&m.to_target, MessageTarget::Room(r) if r == room) {
                        return false;
                    }
                }
                if let Some((lo, hi)) = filter.step_range {
                    if m.step_index < lo || m.step_index > hi {
                        return false;
                    }
                }
                true
            })
            .collect();

        if let Some(limit) = filter.limit {
            if result.len() > limit {
                result.drain(..result.len() - limit);
            }
        }
        result
    }

    /// Full history slice (for evaluation and persistence).
    pub fn full_history(&self) -> &[MessageRecord] {
        &self.history
    }

    /// Messages published during one step, for persistence.
    pub fn messages_for_step(&self, step_index: u64) -> Vec<&MessageRecord> {
        self.history
            .iter()
            .filter(|m| m.step_index == step_index)
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn draft(from: AgentId, target: MessageTarget, message_type: MessageType) -> MessageDraft {
        MessageDraft {
            from_agent_id: Some(from),
            from_name: String::from("sender"),
            to_target: target,
            message_type,
            content: String::from("hello"),
            metadata: BTreeMap::new(),
        }
    }

    fn bus_with_agents(n: usize) -> (MessageBus, Vec<AgentId>) {
        let mut bus = MessageBus::new(RunId::new());
        let agents: Vec<AgentId> = (0..n).map(|_| AgentId::new()).collect();
        for &agent in &agents {
            bus.register_agent(agent);
        }
        (bus, agents)
    }

    #[test]
    fn direct_message_reaches_only_target() {
        let (mut bus, agents) = bus_with_agents(3);
        bus.publish(
            draft(agents[0], MessageTarget::Agent(agents[1]), MessageType::Direct),
            1,
        );
        assert_eq!(bus.inbox_len(agents[1]), 1);
        assert_eq!(bus.inbox_len(agents[0]), 0);
        assert_eq!(bus.inbox_len(agents[2]), 0);
    }

    #[test]
    fn room_message_reaches_room_members_except_sender() {
        let (mut bus, agents) = bus_with_agents(3);
        let room = LocationId::from("room1");
        bus.join_room(agents[0], room.clone());
        bus.join_room(agents[1], room.clone());
        bus.publish(
            draft(agents[0], MessageTarget::Room(room), MessageType::Room),
            1,
        );
        assert_eq!(bus.inbox_len(agents[0]), 0);
        assert_eq!(bus.inbox_len(agents[1]), 1);
        assert_eq!(bus.inbox_len(agents[2]), 0);
    }

    #[test]
    fn broadcast_reaches_all_active_except_sender() {
        let (mut bus, agents) = bus_with_agents(3);
        bus.deactivate_agent(agents[2]);
        bus.publish(
            draft(agents[0], MessageTarget::Broadcast, MessageType::Broadcast),
            1,
        );
        assert_eq!(bus.inbox_len(agents[0]), 0);
        assert_eq!(bus.inbox_len(agents[1]), 1);
        assert_eq!(bus.inbox_len(agents[2]), 0);
    }

    #[test]
    fn inbox_drains_in_insertion_order() {
        let (mut bus, agents) = bus_with_agents(2);
        for i in 0..3 {
            let mut d = draft(agents[0], MessageTarget::Agent(agents[1]), MessageType::Direct);
            d.content = format!("msg {i}");
            bus.publish(d, 1);
        }
        let inbox = bus.take_inbox(agents[1]);
        let contents: Vec<&str> = inbox.iter().map(|m| m.content.as_str()).collect();
        assert_eq!(contents, vec!["msg 0", "msg 1", "msg 2"]);
        assert!(bus.take_inbox(agents[1]).is_empty());
    }

    #[test]
    fn history_is_ordered_and_filterable() {
        let (mut bus, agents) = bus_with_agents(2);
        bus.publish(
            draft(agents[0], MessageTarget::Agent(agents[1]), MessageType::Direct),
            1,
        );
        bus.publish(
            draft(agents[1], MessageTarget::Broadcast, MessageType::Broadcast),
            2,
        );
        bus.publish(
            draft(agents[0], MessageTarget::Broadcast, MessageType::Broadcast),
            2,
        );

        let all = bus.history(&HistoryFilter::default());
        assert_eq!(all.len(), 3);
        assert!(all.windows(2).all(|w| w[0].seq < w[1].seq));

        let from_a = bus.history(&HistoryFilter {
            agent: Some(agents[0]),
            ..HistoryFilter::default()
        });
        assert_eq!(from_a.len(), 2);

        let step_two = bus.history(&HistoryFilter {
            step_range: Some((2, 2)),
            ..HistoryFilter::default()
        });
        assert_eq!(step_two.len(), 2);

        let limited = bus.history(&HistoryFilter {
            limit: Some(1),
            ..HistoryFilter::default()
        });
        assert_eq!(limited.len(), 1);
        assert_eq!(limited[0].seq, 2);
    }

    #[test]
    fn direct_history_matches_recipient_too() {
        let (mut bus, agents) = bus_with_agents(2);
        bus.publish(
            draft(agents[0], MessageTarget::Agent(agents[1]), MessageType::Direct),
            1,
        );
        let to_b = bus.history(&HistoryFilter {
            agent: Some(agents[1]),
            ..HistoryFilter::default()
        });
        assert_eq!(to_b.len(), 1);
    }

    #[test]
    fn system_message_has_no_sender() {
        let (mut bus, agents) = bus_with_agents(2);
        bus.publish(
            MessageDraft {
                from_agent_id: None,
                from_name: String::from("System"),
                to_target: MessageTarget::Broadcast,
                message_type: MessageType::Broadcast,
                content: String::from("the water is rising"),
                metadata: BTreeMap::new(),
            },
            1,
        );
        // Everyone receives it, nobody is "the sender".
        assert_eq!(bus.inbox_len(agents[0]), 1);
        assert_eq!(bus.inbox_len(agents[1]), 1);
    }

    #[test]
    fn messages_for_step_selects_exactly_that_step() {
        let (mut bus, agents) = bus_with_agents(2);
        bus.publish(
            draft(agents[0], MessageTarget::Broadcast, MessageType::Broadcast),
            1,
        );
        bus.publish(
            draft(agents[0], MessageTarget::Broadcast, MessageType::Broadcast),
            2,
        );
        assert_eq!(bus.messages_for_step(2).len(), 1);
    }
}
