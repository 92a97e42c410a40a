//! Behavioral loop detection.
//!
//! Keeps a short window per agent of recent `(action_type, target)` pairs
//! and conversation topics. When the same entry fills three or more of the
//! last five slots, a suggestion string is produced for the agent's next
//! context. Suggestions are advisory only; nothing here ever rewrites an
//! agent's output.

use std::collections::{BTreeMap, VecDeque};

use emosim_types::{ActionType, AgentId};

/// Window length for both action and topic tracking.
const WINDOW: usize = 5;

/// Occurrences within the window that count as a loop.
const REPEAT_THRESHOLD: usize = 3;

/// Keywords used to summarize message content into a topic.
const TOPIC_KEYWORDS: &[&str] = &[
    "rescue", "help", "move", "safety", "flood", "bridge", "shelter", "medical", "supplies",
    "coordinate", "plan", "danger", "evacuate", "food", "water",
];

/// Tracks repetition per agent and produces advisory suggestions.
#[derive(Debug, Clone, Default)]
pub struct LoopDetector {
    actions: BTreeMap<AgentId, VecDeque<(ActionType, Option<String>)>>,
    topics: BTreeMap<AgentId, VecDeque<String>>,
}

impl LoopDetector {
    /// Create an empty detector.
    pub fn new() -> Self {
        Self::default()
    }

    /// Record an executed action.
    pub fn record_action(&mut self, agent: AgentId, action_type: ActionType, target: Option<&str>) {
        let window = self.actions.entry(agent).or_default();
        window.push_back((action_type, target.map(ToOwned::to_owned)));
        if window.len() > WINDOW {
            window.pop_front();
        }
    }

    /// Record the topic of a message the agent sent.
    pub fn record_topic(&mut self, agent: AgentId, topic: String) {
        let window = self.topics.entry(agent).or_default();
        window.push_back(topic);
        if window.len() > WINDOW {
            window.pop_front();
        }
    }

    /// Produce a suggestion if the agent's recent behavior is looping.
    ///
    /// Action loops take precedence over topic loops; at most one
    /// suggestion is returned.
    pub fn suggestion_for(&self, agent: AgentId) -> Option<String> {
        if let Some(window) = self.actions.get(&agent) {
            if let Some((action_type, target)) = dominant(window.iter()) {
                let what = match target {
                    Some(target) => format!("{action_type:?} toward '{target}'"),
                    None => format!("{action_type:?}"),
                };
                return Some(format!(
                    "You appear to be repeating {what}; consider a different approach or one of the open tasks.",
                    what = what.to_lowercase()
                ));
            }
        }
        if let Some(window) = self.topics.get(&agent) {
            if let Some(topic) = dominant(window.iter()) {
                return Some(format!(
                    "You appear to be repeating the topic '{topic}'; consider moving the conversation forward."
                ));
            }
        }
        None
    }

    /// Summarize message content into a topic keyword.
    pub fn extract_topic(content: &str) -> String {
        let lower = content.to_lowercase();
        TOPIC_KEYWORDS
            .iter()
            .find(|keyword| lower.contains(*keyword))
            .map_or_else(|| String::from("general"), |k| (*k).to_owned())
    }
}

/// The entry occupying at least [`REPEAT_THRESHOLD`] of the window, if any.
fn dominant<'a, T: Eq + Clone + 'a>(entries: impl Iterator<Item = &'a T>) -> Option<T> {
    let items: Vec<&T> = entries.collect();
    for candidate in &items {
        let count = items.iter().filter(|e| ***e == **candidate).count();
        if count >= REPEAT_THRESHOLD {
            return Some((*candidate).clone());
        }
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn no_suggestion_below_threshold() {
        let mut detector = LoopDetector::new();
        let agent = AgentId::new();
        detector.record_action(agent, ActionType::Move, Some("bridge"));
        detector.record_action(agent, ActionType::Move, Some("bridge"));
        assert!(detector.suggestion_for(agent).is_none());
    }

    #[test]
    fn three_of_five_same_action_triggers_suggestion() {
        let mut detector = LoopDetector::new();
        let agent = AgentId::new();
        detector.record_action(agent, ActionType::Move, Some("bridge"));
        detector.record_action(agent, ActionType::Wait, None);
        detector.record_action(agent, ActionType::Move, Some("bridge"));
        detector.record_action(agent, ActionType::Move, Some("bridge"));
        let suggestion = detector.suggestion_for(agent).expect("suggestion");
        assert!(suggestion.contains("bridge"));
    }

    #[test]
    fn window_slides_old_entries_out() {
        let mut detector = LoopDetector::new();
        let agent = AgentId::new();
        for _ in 0..3 {
            detector.record_action(agent, ActionType::Move, Some("bridge"));
        }
        // Five fresh distinct actions push the repeats out of the window.
        detector.record_action(agent, ActionType::Wait, None);
        detector.record_action(agent, ActionType::Search, None);
        detector.record_action(agent, ActionType::Take, Some("rope"));
        detector.record_action(agent, ActionType::Reflect, None);
        detector.record_action(agent, ActionType::Speak, None);
        assert!(detector.suggestion_for(agent).is_none());
    }

    #[test]
    fn repeated_topic_triggers_suggestion() {
        let mut detector = LoopDetector::new();
        let agent = AgentId::new();
        for _ in 0..3 {
            detector.record_topic(agent, String::from("flood"));
        }
        let suggestion = detector.suggestion_for(agent).expect("suggestion");
        assert!(suggestion.contains("flood"));
    }

    #[test]
    fn agents_tracked_independently() {
        let mut detector = LoopDetector::new();
        let looping = AgentId::new();
        let fine = AgentId::new();
        for _ in 0..3 {
            detector.record_action(looping, ActionType::Wait, None);
        }
        detector.record_action(fine, ActionType::Wait, None);
        assert!(detector.suggestion_for(looping).is_some());
        assert!(detector.suggestion_for(fine).is_none());
    }

    #[test]
    fn topic_extraction_finds_keyword_or_general() {
        assert_eq!(
            LoopDetector::extract_topic("We should EVACUATE now!"),
            "evacuate"
        );
        assert_eq!(LoopDetector::extract_topic("nice weather today"), "general");
    }
}
