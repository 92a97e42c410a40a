//! System prompts and per-tick context assembly.
//!
//! The engine gathers a [`ContextBundle`] from the state it owns (world,
//! bus, coordinator, conversations) and this module renders it into the
//! prompt strings for the oracle. The human context follows a fixed
//! section order: world summary, own state, inbox, step events,
//! cooperation, loop suggestion, conversation transcript.

use std::fmt::Write as _;

use emosim_types::{AgentRole, ConversationStatus, MessageType, TaskId, TaskStatus};

use crate::instance::AgentInstance;

/// Messages from the inbox included in context.
const INBOX_LIMIT: usize = 10;

/// Step events included in context.
const EVENT_LIMIT: usize = 5;

/// What the agent can see of its current location.
#[derive(Debug, Clone, Default)]
pub struct LocationView {
    /// Location key.
    pub id: String,
    /// Prose description.
    pub description: String,
    /// Reachable locations, in adjacency order.
    pub nearby: Vec<String>,
    /// Visible item names here.
    pub items: Vec<String>,
    /// Names of other agents here.
    pub agents_here: Vec<String>,
}

/// One inbox message rendered into context.
#[derive(Debug, Clone)]
pub struct InboxLine {
    /// Sender display name.
    pub from: String,
    /// Routing type.
    pub message_type: MessageType,
    /// Message body.
    pub content: String,
}

/// A task as shown to agents.
#[derive(Debug, Clone)]
pub struct TaskView {
    /// Task identifier (agents reference it in accept/progress actions).
    pub id: TaskId,
    /// What needs doing.
    pub description: String,
    /// Urgency 1-10.
    pub priority: u8,
    /// Lifecycle status.
    pub status: TaskStatus,
    /// Progress 0-100.
    pub progress: u8,
}

/// An open vote as shown to agents.
#[derive(Debug, Clone)]
pub struct VoteView {
    /// What is being decided.
    pub proposal: String,
    /// The options, in tie-break order.
    pub options: Vec<String>,
}

/// Cooperation state visible to every agent.
#[derive(Debug, Clone, Default)]
pub struct CooperationView {
    /// Shared goals.
    pub shared_goals: Vec<String>,
    /// Open tasks, priority order.
    pub tasks: Vec<TaskView>,
    /// Votes accepting ballots this tick.
    pub votes: Vec<VoteView>,
}

/// The conversation the agent participates in, if any.
#[derive(Debug, Clone)]
pub struct ConversationView {
    /// Participant names.
    pub participants: Vec<String>,
    /// Whether it is this agent's turn to speak.
    pub is_my_turn: bool,
    /// Lifecycle status.
    pub status: ConversationStatus,
    /// Recent transcript lines (`Name: text`).
    pub transcript: Vec<String>,
}

/// Everything the engine hands over to build one agent's context.
#[derive(Debug, Clone, Default)]
pub struct ContextBundle {
    /// Current tick.
    pub step: u64,
    /// World hazard level.
    pub hazard_level: u8,
    /// Narrative time of day.
    pub time_of_day: Option<String>,
    /// Narrative weather.
    pub weather: Option<String>,
    /// The agent's current location view.
    pub location: LocationView,
    /// Relationship lines for the people present (from the agent's
    /// memory).
    pub relationships: Vec<String>,
    /// Pending messages.
    pub inbox: Vec<InboxLine>,
    /// Events emitted earlier this tick.
    pub step_events: Vec<String>,
    /// Cooperation state.
    pub cooperation: CooperationView,
    /// Loop-detector suggestion, if any.
    pub suggestion: Option<String>,
    /// Active conversation, if participating.
    pub conversation: Option<ConversationView>,
    /// Per-agent status lines (designer and environment context).
    pub agents_overview: Vec<String>,
    /// Actions executed earlier this tick (environment context).
    pub recent_actions: Vec<String>,
}

/// Build the system prompt for an agent, dispatched by role.
pub fn system_prompt(agent: &AgentInstance) -> String {
    match agent.role() {
        AgentRole::Human => human_system_prompt(agent),
        AgentRole::Environment => environment_system_prompt(),
        AgentRole::Designer => designer_system_prompt(agent),
        AgentRole::Evaluator => evaluator_system_prompt(),
    }
}

/// Build the per-tick context for an agent, dispatched by role.
pub fn build_context(agent: &AgentInstance, bundle: &ContextBundle) -> String {
    match agent.role() {
        AgentRole::Human => human_context(agent, bundle),
        AgentRole::Environment => environment_context(bundle),
        AgentRole::Designer => designer_context(bundle),
        // The evaluator gets a run summary through its own entry point;
        // a per-tick bundle degenerates to the designer view.
        AgentRole::Evaluator => designer_context(bundle),
    }
}

/// Build the one-shot evaluation context from the run summary and the
/// message history.
pub fn build_evaluation_context(
    run_summary: &serde_json::Value,
    transcript: &[String],
) -> String {
    let mut out = String::from("Simulation run complete. Evaluate the agents' performance.\n\n");
    let _ = writeln!(
        out,
        "Run summary:\n{}",
        serde_json::to_string_pretty(run_summary).unwrap_or_else(|_| String::from("{}"))
    );
    out.push_str("\nMessage history:\n");
    for line in transcript {
        let _ = writeln!(out, "- {line}");
    }
    out.push_str("\nProduce your evaluation as JSON.");
    out
}

// ---------------------------------------------------------------------------
// Human
// ---------------------------------------------------------------------------

fn human_system_prompt(agent: &AgentInstance) -> String {
    let persona_text = agent
        .persona()
        .map(|p| p.describe(agent.name()))
        .unwrap_or_else(|| format!("You are {}.", agent.name()));

    let mut goals = String::new();
    for goal in &agent.template.goals {
        let _ = writeln!(goals, "- {goal}");
    }
    if goals.is_empty() {
        goals.push_str("- Survive\n- Help others if possible\n");
    }

    format!(
        r#"{persona_text}

Your goals:
{goals}
Available actions: move, speak, help, take, drop, use, search, interact, wait, reflect,
join_conversation, leave_conversation, propose_task, accept_task, report_progress, call_for_vote.

Respond with JSON only:
{{
    "actions": [
        {{"action_type": "<action>", "target": "<location/person/item>", "parameters": {{}}}}
    ],
    "message": {{
        "content": "<what you say, in character>",
        "to_target": "<agent name, room name, or 'broadcast'>",
        "message_type": "direct|room|broadcast"
    }},
    "state_changes": {{"stress": <0-10 if changed>, "health": <0-10 if changed>}},
    "reasoning": "<brief internal thought process>"
}}

Stay in character. Your personality should influence your decisions."#
    )
}

fn human_context(agent: &AgentInstance, bundle: &ContextBundle) -> String {
    let mut out = String::new();
    let _ = writeln!(out, "Current situation (step {}):", bundle.step);
    out.push('\n');

    // World summary.
    out.push_str("Environment:\n");
    let hazard_note = if bundle.hazard_level >= 7 {
        " (danger!)"
    } else if bundle.hazard_level >= 4 {
        " (concerning)"
    } else {
        ""
    };
    let _ = writeln!(out, "- Hazard level: {}/10{hazard_note}", bundle.hazard_level);
    if let Some(weather) = &bundle.weather {
        let _ = writeln!(out, "- Weather: {weather}");
    }
    if let Some(time) = &bundle.time_of_day {
        let _ = writeln!(out, "- Time: {time}");
    }
    let _ = writeln!(out, "- Your location: {}", bundle.location.id);
    let _ = writeln!(out, "- Around you: {}", bundle.location.description);
    let _ = writeln!(out, "- Nearby places: {}", join_or_none(&bundle.location.nearby));
    let _ = writeln!(out, "- Items here: {}", join_or_none(&bundle.location.items));
    let _ = writeln!(
        out,
        "- People here: {}",
        join_or_none(&bundle.location.agents_here)
    );

    // Own state.
    out.push_str("\nYour current state:\n");
    let _ = writeln!(out, "- Health: {:.0}/10", agent.state.health);
    let _ = writeln!(out, "- Stress: {:.0}/10", agent.state.stress);
    let inventory: Vec<String> = agent
        .state
        .inventory
        .iter()
        .map(|i| i.to_string())
        .collect();
    let _ = writeln!(out, "- Inventory: {}", join_or_none(&inventory));
    if let Some(arrival) = agent.memory.arrival() {
        let _ = writeln!(out, "- You came here: {}", arrival.reason);
    }
    if let Some(travel) = &agent.state.travel {
        let _ = writeln!(out, "- You are travelling toward {}", travel.destination);
    }

    // Relationships with present company.
    if !bundle.relationships.is_empty() {
        out.push_str("\nPeople you know here:\n");
        for line in &bundle.relationships {
            let _ = writeln!(out, "{line}");
        }
    }

    // Inbox.
    out.push('\n');
    if bundle.inbox.is_empty() {
        out.push_str("No recent communications.\n");
    } else {
        out.push_str("Recent communications:\n");
        let skip = bundle.inbox.len().saturating_sub(INBOX_LIMIT);
        for line in bundle.inbox.iter().skip(skip) {
            let kind = match line.message_type {
                MessageType::Direct => "DIRECT",
                MessageType::Room => "ROOM",
                MessageType::Broadcast => "BROADCAST",
            };
            let _ = writeln!(out, "- [{kind}] {}: \"{}\"", line.from, line.content);
        }
    }

    // Step events.
    if !bundle.step_events.is_empty() {
        out.push_str("\nThis turn so far:\n");
        let skip = bundle.step_events.len().saturating_sub(EVENT_LIMIT);
        for event in bundle.step_events.iter().skip(skip) {
            let _ = writeln!(out, "- {event}");
        }
    }

    // Cooperation.
    let cooperation = &bundle.cooperation;
    if !cooperation.shared_goals.is_empty()
        || !cooperation.tasks.is_empty()
        || !cooperation.votes.is_empty()
    {
        out.push_str("\nCooperation:\n");
        if !cooperation.shared_goals.is_empty() {
            let _ = writeln!(out, "- Shared goals: {}", cooperation.shared_goals.join("; "));
        }
        for task in &cooperation.tasks {
            let _ = writeln!(
                out,
                "- Task {id}: {desc} (priority {prio}, {status:?}, {progress}% done)",
                id = task.id,
                desc = task.description,
                prio = task.priority,
                status = task.status,
                progress = task.progress,
            );
        }
        for vote in &cooperation.votes {
            let _ = writeln!(
                out,
                "- Vote open: {} -- options: {}",
                vote.proposal,
                vote.options.join(", ")
            );
        }
    }

    // Loop-detector suggestion.
    if let Some(suggestion) = &bundle.suggestion {
        let _ = writeln!(out, "\nHint: {suggestion}");
    }

    // Conversation transcript.
    if let Some(conversation) = &bundle.conversation {
        out.push_str("\nActive conversation with ");
        out.push_str(&conversation.participants.join(", "));
        if conversation.is_my_turn {
            out.push_str(" (it is your turn to speak)");
        }
        out.push_str(":\n");
        for line in &conversation.transcript {
            let _ = writeln!(out, "  {line}");
        }
    }

    out.push_str(
        "\nWhat do you do? Consider your personality, stress level, and the situation.\n",
    );
    out
}

// ---------------------------------------------------------------------------
// Environment
// ---------------------------------------------------------------------------

fn environment_system_prompt() -> String {
    String::from(
        r#"You are the environment controller for this simulation.

Your role is to progress the environmental conditions realistically, create
meaningful challenges, and respond to what the agents do. You control the
hazard level, narrative events, location accessibility, and may adjust an
agent's health or stress directly.

Respond with JSON only:
{
    "actions": [
        {"action_type": "environment_update", "target": "world_state",
         "parameters": {"hazard_level": <0-10>, "events": ["<event>"],
                        "affected_locations": ["<location>"]}},
        {"action_type": "affect_agent", "target": "<agent name>",
         "parameters": {"health_delta": <-10..10>, "stress_delta": <-10..10>}}
    ],
    "message": {"content": "<narration>", "to_target": "broadcast", "message_type": "broadcast"},
    "state_changes": {},
    "reasoning": "<why>"
}

Be dramatic but fair."#,
    )
}

fn environment_context(bundle: &ContextBundle) -> String {
    let mut out = String::new();
    let _ = writeln!(out, "Simulation state (step {}):", bundle.step);
    let _ = writeln!(out, "- Hazard level: {}/10", bundle.hazard_level);
    if let Some(weather) = &bundle.weather {
        let _ = writeln!(out, "- Weather: {weather}");
    }
    out.push_str("\nAgents:\n");
    for line in &bundle.agents_overview {
        let _ = writeln!(out, "- {line}");
    }
    if !bundle.recent_actions.is_empty() {
        out.push_str("\nRecent agent actions:\n");
        for line in &bundle.recent_actions {
            let _ = writeln!(out, "- {line}");
        }
    }
    out.push_str(
        "\nDecide whether the hazard should change, what events occur, and whether any \
         agent is directly affected.\n",
    );
    out
}

// ---------------------------------------------------------------------------
// Designer
// ---------------------------------------------------------------------------

fn designer_system_prompt(agent: &AgentInstance) -> String {
    let mut goals = String::new();
    for goal in &agent.template.goals {
        let _ = writeln!(goals, "- {goal}");
    }
    if goals.is_empty() {
        goals.push_str("- Create engaging narrative tension\n- Keep the simulation meaningful\n");
    }
    format!(
        r#"You are the simulation director, a meta-agent overseeing this scenario.

Your goals:
{goals}
Observe agent behavior, inject narrative events when the simulation stalls,
and guide the story without breaking immersion. Only intervene when needed.

Respond with JSON only:
{{
    "actions": [{{"action_type": "interact", "target": "<focus>", "parameters": {{}}}}],
    "message": {{"content": "<optional narrator line>", "to_target": "broadcast", "message_type": "broadcast"}},
    "state_changes": {{}},
    "reasoning": "<your meta-analysis>"
}}"#
    )
}

fn designer_context(bundle: &ContextBundle) -> String {
    let mut out = String::new();
    let _ = writeln!(out, "Simulation status (step {}):", bundle.step);
    let _ = writeln!(out, "- Hazard level: {}/10", bundle.hazard_level);
    out.push_str("\nAgent status:\n");
    for line in &bundle.agents_overview {
        let _ = writeln!(out, "- {line}");
    }
    if !bundle.inbox.is_empty() {
        out.push_str("\nRecent interactions:\n");
        let skip = bundle.inbox.len().saturating_sub(INBOX_LIMIT);
        for line in bundle.inbox.iter().skip(skip) {
            let _ = writeln!(out, "- {}: {}", line.from, truncate(&line.content, 100));
        }
    }
    out.push_str("\nAssess the run and decide whether to intervene.\n");
    out
}

// ---------------------------------------------------------------------------
// Evaluator
// ---------------------------------------------------------------------------

fn evaluator_system_prompt() -> String {
    String::from(
        r#"You are an evaluator analyzing a completed simulation run.

Score the agents' collective performance on: cooperation, ethics, strategy,
emotional coherence, leadership, and empathy (each 1-10), then give a short
narrative assessment.

Respond with JSON only:
{
    "scores": {"cooperation": 0, "ethics": 0, "strategy": 0,
               "emotional_coherence": 0, "leadership": 0, "empathy": 0, "overall": 0},
    "narrative": "<2-3 paragraphs>",
    "highlights": ["<notable moment>"],
    "concerns": ["<concerning behavior>"],
    "reasoning": "<your methodology>"
}

Be fair, specific, and constructive."#,
    )
}

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

fn join_or_none(items: &[String]) -> String {
    if items.is_empty() {
        String::from("none")
    } else {
        items.join(", ")
    }
}

fn truncate(text: &str, max: usize) -> &str {
    match text.char_indices().nth(max) {
        Some((idx, _)) => &text[..idx],
        None => text,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use emosim_types::{AgentTemplate, BigFive, LocationId, Persona};

    fn human_agent() -> AgentInstance {
        AgentInstance::from_template(AgentTemplate {
            name: String::from("Mara"),
            role: AgentRole::Human,
            model_id: String::from("test"),
            provider: String::from("openai"),
            persona: Some(Persona {
                age: 34,
                sex: String::from("female"),
                occupation: String::from("paramedic"),
                backstory: String::new(),
                traits: BigFive {
                    extraversion: 0.8,
                    ..BigFive::default()
                },
                modifiers: Default::default(),
                skills: Vec::new(),
            }),
            goals: vec![String::from("Get everyone to the shelter")],
            location: LocationId::from("room1"),
            health: 10.0,
            stress: 3.0,
            inventory: Vec::new(),
        })
    }

    fn bundle() -> ContextBundle {
        ContextBundle {
            step: 3,
            hazard_level: 5,
            weather: Some(String::from("heavy rain")),
            location: LocationView {
                id: String::from("room1"),
                description: String::from("A flooded lobby."),
                nearby: vec![String::from("stairs")],
                items: vec![String::from("rope")],
                agents_here: vec![String::from("Ben")],
            },
            inbox: vec![InboxLine {
                from: String::from("Ben"),
                message_type: MessageType::Direct,
                content: String::from("are you okay?"),
            }],
            step_events: vec![String::from("the water rose")],
            cooperation: CooperationView {
                shared_goals: vec![String::from("Get everyone to the shelter")],
                tasks: Vec::new(),
                votes: Vec::new(),
            },
            suggestion: Some(String::from("try something new")),
            conversation: Some(ConversationView {
                participants: vec![String::from("Mara"), String::from("Ben")],
                is_my_turn: true,
                status: ConversationStatus::Active,
                transcript: vec![String::from("Ben: are you okay?")],
            }),
            ..ContextBundle::default()
        }
    }

    #[test]
    fn human_system_prompt_carries_persona_and_goals() {
        let prompt = system_prompt(&human_agent());
        assert!(prompt.contains("Mara"));
        assert!(prompt.contains("paramedic"));
        assert!(prompt.contains("Get everyone to the shelter"));
        assert!(prompt.contains("\"actions\""));
    }

    #[test]
    fn human_context_sections_appear_in_spec_order() {
        let text = build_context(&human_agent(), &bundle());
        let world = text.find("Environment:").expect("world section");
        let own = text.find("Your current state:").expect("state section");
        let inbox = text.find("Recent communications:").expect("inbox section");
        let events = text.find("This turn so far:").expect("events section");
        let coop = text.find("Cooperation:").expect("cooperation section");
        let hint = text.find("Hint:").expect("suggestion section");
        let conversation = text.find("Active conversation").expect("conversation section");
        assert!(world < own && own < inbox && inbox < events);
        assert!(events < coop && coop < hint && hint < conversation);
    }

    #[test]
    fn human_context_mentions_turn_when_speaking() {
        let text = build_context(&human_agent(), &bundle());
        assert!(text.contains("your turn to speak"));
    }

    #[test]
    fn relationship_lines_render_between_state_and_inbox() {
        let mut b = bundle();
        b.relationships = vec![String::from("- Ben: I trust them; 4 interactions.")];
        let text = build_context(&human_agent(), &b);
        let own = text.find("Your current state:").expect("state section");
        let known = text.find("People you know here:").expect("relationships");
        let inbox = text.find("Recent communications:").expect("inbox section");
        assert!(own < known && known < inbox);
    }

    #[test]
    fn empty_inbox_renders_placeholder() {
        let mut b = bundle();
        b.inbox.clear();
        let text = build_context(&human_agent(), &b);
        assert!(text.contains("No recent communications."));
    }

    #[test]
    fn environment_context_lists_agents_and_actions() {
        let mut b = bundle();
        b.agents_overview = vec![String::from("Mara: health 10/10 at room1")];
        b.recent_actions = vec![String::from("Mara moved to stairs")];
        let agent = AgentInstance::from_template(AgentTemplate {
            name: String::from("Flood"),
            role: AgentRole::Environment,
            model_id: String::from("test"),
            provider: String::from("openai"),
            persona: None,
            goals: Vec::new(),
            location: LocationId::from("room1"),
            health: 10.0,
            stress: 0.0,
            inventory: Vec::new(),
        });
        let text = build_context(&agent, &b);
        assert!(text.contains("Mara: health 10/10"));
        assert!(text.contains("Mara moved to stairs"));
    }

    #[test]
    fn evaluation_context_embeds_summary_and_history() {
        let summary = serde_json::json!({"total_steps": 5});
        let text = build_evaluation_context(
            &summary,
            &[String::from("Mara: we made it")],
        );
        assert!(text.contains("total_steps"));
        assert!(text.contains("we made it"));
    }
}
