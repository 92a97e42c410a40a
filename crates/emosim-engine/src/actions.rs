//! Action execution against the run state.
//!
//! Actions apply in the order the agent emitted them; a failing action is
//! recorded with `success = false` and does not abort the ones after it.
//! Every action produces an [`ActionRecord`] plus the events to emit, in
//! order. Role-gated actions (`environment_update`, `affect_agent`) are
//! guarded by a role check here rather than by agent subtypes.

use std::collections::BTreeMap;

use uuid::Uuid;

use emosim_social::MessageDraft;
use emosim_types::{
    ActionRecord, ActionType, AgentAction, AgentId, AgentRole, EventType, ItemId, LocationId,
    MessageTarget, MessageType, TaskId,
};
use emosim_world::{items, MoveOutcome};

use crate::core::RunCore;

/// The result of executing one action.
pub struct ActionOutcome {
    /// The durable record for the step.
    pub record: ActionRecord,
    /// Events to emit, in order.
    pub events: Vec<(EventType, serde_json::Value)>,
}

/// Execute a single action for `agent_id`.
pub fn execute_action(core: &mut RunCore, agent_id: AgentId, action: &AgentAction) -> ActionOutcome {
    let agent_name = core.agent_name(agent_id);
    let mut events = Vec::new();

    let result = match action.action_type {
        ActionType::Move => execute_move(core, agent_id, action, &mut events),
        ActionType::Take => execute_take(core, agent_id, action),
        ActionType::Drop => execute_drop(core, agent_id, action),
        ActionType::Use => execute_use(core, agent_id, action, &mut events),
        ActionType::Interact => execute_interact(core, agent_id, action, &mut events),
        ActionType::Search => execute_search(core, agent_id),
        ActionType::Speak => execute_speak(core, agent_id, action, &mut events),
        ActionType::Wait => Ok(Some(String::from("waited"))),
        ActionType::Reflect => Ok(Some(String::from("reflected"))),
        ActionType::Help => execute_help(core, agent_id, action, &mut events),
        ActionType::JoinConversation => execute_join_conversation(core, agent_id),
        ActionType::LeaveConversation => execute_leave_conversation(core, agent_id),
        ActionType::ProposeTask => execute_propose_task(core, agent_id, action, &mut events),
        ActionType::AcceptTask => execute_accept_task(core, agent_id, action, &mut events),
        ActionType::ReportProgress => execute_report_progress(core, agent_id, action),
        ActionType::CallForVote => execute_call_for_vote(core, agent_id, action, &mut events),
        ActionType::EnvironmentUpdate => execute_environment_update(core, agent_id, action),
        ActionType::AffectAgent => execute_affect_agent(core, agent_id, action, &mut events),
    };

    let (success, detail) = match result {
        Ok(detail) => (true, detail),
        Err(reason) => (false, Some(reason)),
    };

    // Movement emits its own event family; everything else gets a
    // generic agent_action event (unless the action was a silent no-op).
    let silent = action.action_type == ActionType::Move
        || matches!(detail.as_deref(), Some("already there"));
    if !silent {
        events.insert(
            0,
            (
                EventType::AgentAction,
                serde_json::json!({
                    "agent_id": agent_id,
                    "agent_name": &agent_name,
                    "action_type": action.action_type,
                    "target": &action.target,
                    "success": success,
                    "detail": &detail,
                    "step": core.current_step,
                }),
            ),
        );
    }

    let record = ActionRecord {
        agent_id,
        agent_name,
        action_type: action.action_type,
        target: action.target.clone(),
        parameters: serde_json::to_value(&action.parameters)
            .unwrap_or(serde_json::Value::Null),
        success,
        detail,
    };

    ActionOutcome { record, events }
}

// ---------------------------------------------------------------------------
// Movement
// ---------------------------------------------------------------------------

fn execute_move(
    core: &mut RunCore,
    agent_id: AgentId,
    action: &AgentAction,
    events: &mut Vec<(EventType, serde_json::Value)>,
) -> Result<Option<String>, String> {
    let target = action
        .target
        .as_deref()
        .map(LocationId::from)
        .ok_or_else(|| String::from("move requires a target location"))?;

    let (current, had_travel) = {
        let agent = core
            .agents
            .get(&agent_id)
            .ok_or_else(|| String::from("unknown agent"))?;
        (agent.state.location.clone(), agent.state.travel.is_some())
    };

    let outcome = core.resolver.resolve(
        &mut core.world.graph,
        agent_id,
        &current,
        &target,
        &mut core.rng,
    );
    let agent_name = core.agent_name(agent_id);

    match outcome {
        MoveOutcome::AlreadyThere => Ok(Some(String::from("already there"))),
        MoveOutcome::Moved { to } => {
            finish_direct_move(core, agent_id, &agent_name, &current, to, had_travel, false, events)
        }
        MoveOutcome::Created { to } => {
            finish_direct_move(core, agent_id, &agent_name, &current, to, had_travel, true, events)
        }
        MoveOutcome::Travelling {
            next_hop,
            path,
            plan,
        } => {
            if had_travel {
                events.push((
                    EventType::AgentRerouted,
                    serde_json::json!({
                        "agent_id": agent_id,
                        "agent_name": &agent_name,
                        "new_destination": &plan.destination,
                        "step": core.current_step,
                    }),
                ));
            }
            events.push((
                EventType::TravelStarted,
                serde_json::json!({
                    "agent_id": agent_id,
                    "agent_name": &agent_name,
                    "path": &path,
                    "destination": &plan.destination,
                    "step": core.current_step,
                }),
            ));
            let destination = plan.destination.clone();
            if let Some(agent) = core.agents.get_mut(&agent_id) {
                agent.state.travel = Some(plan);
            }
            core.relocate_agent(agent_id, next_hop.clone(), "travelling");
            events.push(moved_event(core, agent_id, &agent_name, &current, &next_hop));
            core.note_event(format!("{agent_name} set out toward {destination}"));
            Ok(Some(format!("travelling toward {destination}")))
        }
        MoveOutcome::Failed { reason, suppressed } => {
            if !suppressed {
                events.push((
                    EventType::MovementFailed,
                    serde_json::json!({
                        "agent_id": agent_id,
                        "agent_name": &agent_name,
                        "from": &current,
                        "to": &target,
                        "reason": reason,
                        "step": core.current_step,
                    }),
                ));
            }
            Err(reason.to_owned())
        }
    }
}

/// Shared tail for adjacent and just-created moves.
#[allow(clippy::too_many_arguments)]
fn finish_direct_move(
    core: &mut RunCore,
    agent_id: AgentId,
    agent_name: &str,
    from: &LocationId,
    to: LocationId,
    had_travel: bool,
    created: bool,
    events: &mut Vec<(EventType, serde_json::Value)>,
) -> Result<Option<String>, String> {
    if had_travel {
        events.push((
            EventType::AgentRerouted,
            serde_json::json!({
                "agent_id": agent_id,
                "agent_name": agent_name,
                "new_destination": &to,
                "step": core.current_step,
            }),
        ));
        if let Some(agent) = core.agents.get_mut(&agent_id) {
            agent.state.travel = None;
        }
    }
    if created {
        events.push((
            EventType::LocationCreated,
            serde_json::json!({
                "agent_id": agent_id,
                "agent_name": agent_name,
                "location": &to,
                "connected_to": from,
                "step": core.current_step,
            }),
        ));
        core.note_event(format!("{agent_name} discovered {to}"));
    }
    core.relocate_agent(agent_id, to.clone(), "moved here deliberately");
    events.push(moved_event(core, agent_id, agent_name, from, &to));
    core.note_event(format!("{agent_name} moved to {to}"));
    Ok(Some(format!("moved to {to}")))
}

/// Build an `agent_moved` event payload.
pub(crate) fn moved_event(
    core: &RunCore,
    agent_id: AgentId,
    agent_name: &str,
    from: &LocationId,
    to: &LocationId,
) -> (EventType, serde_json::Value) {
    (
        EventType::AgentMoved,
        serde_json::json!({
            "agent_id": agent_id,
            "agent_name": agent_name,
            "from": from,
            "to": to,
            "step": core.current_step,
        }),
    )
}

// ---------------------------------------------------------------------------
// Items
// ---------------------------------------------------------------------------

fn execute_take(
    core: &mut RunCore,
    agent_id: AgentId,
    action: &AgentAction,
) -> Result<Option<String>, String> {
    let item = target_item(action)?;
    let location_id = agent_location(core, agent_id)?;
    let Some(location) = core.world.graph.get_mut(&location_id) else {
        return Err(format!("location '{location_id}' missing"));
    };
    let Some(agent) = core.agents.get_mut(&agent_id) else {
        return Err(String::from("unknown agent"));
    };
    items::take_item(&location_id, location, &mut agent.state.inventory, &item)
        .map_err(|e| e.to_string())?;
    Ok(Some(format!("took {item}")))
}

fn execute_drop(
    core: &mut RunCore,
    agent_id: AgentId,
    action: &AgentAction,
) -> Result<Option<String>, String> {
    let item = target_item(action)?;
    let location_id = agent_location(core, agent_id)?;
    let Some(location) = core.world.graph.get_mut(&location_id) else {
        return Err(format!("location '{location_id}' missing"));
    };
    let Some(agent) = core.agents.get_mut(&agent_id) else {
        return Err(String::from("unknown agent"));
    };
    items::drop_item(location, &mut agent.state.inventory, &item).map_err(|e| e.to_string())?;
    Ok(Some(format!("dropped {item}")))
}

fn execute_use(
    core: &mut RunCore,
    agent_id: AgentId,
    action: &AgentAction,
    events: &mut Vec<(EventType, serde_json::Value)>,
) -> Result<Option<String>, String> {
    let item_id = target_item(action)?;
    let carried = core
        .agents
        .get(&agent_id)
        .map_or(false, |a| a.state.inventory.contains(&item_id));
    if !carried {
        return Err(format!("item '{item_id}' not in inventory"));
    }

    let (heal, stress_relief, consumable) = core.world.item(&item_id).map_or(
        (0.0, 0.0, false),
        |item| {
            let get = |key: &str| {
                item.properties
                    .get(key)
                    .and_then(serde_json::Value::as_f64)
                    .unwrap_or(0.0)
            };
            let consumable = item
                .properties
                .get("consumable")
                .and_then(serde_json::Value::as_bool)
                .unwrap_or(false);
            (get("heal"), get("stress_relief"), consumable)
        },
    );

    let agent_name = core.agent_name(agent_id);
    if let Some(agent) = core.agents.get_mut(&agent_id) {
        if heal != 0.0 || stress_relief != 0.0 {
            let health = agent.state.adjust_health(heal);
            let stress = agent.state.adjust_stress(-stress_relief);
            events.push((
                EventType::StateChange,
                serde_json::json!({
                    "agent_id": agent_id,
                    "agent_name": agent_name,
                    "health": health,
                    "stress": stress,
                    "cause": format!("used {item_id}"),
                    "step": core.current_step,
                }),
            ));
        }
        if consumable {
            items::consume_item(&mut agent.state.inventory, &item_id)
                .map_err(|e| e.to_string())?;
        }
    }
    Ok(Some(format!("used {item_id}")))
}

fn execute_search(core: &mut RunCore, agent_id: AgentId) -> Result<Option<String>, String> {
    let location_id = agent_location(core, agent_id)?;
    let Some(location) = core.world.graph.get_mut(&location_id) else {
        return Err(format!("location '{location_id}' missing"));
    };
    let revealed = items::reveal_hidden(location);
    if revealed.is_empty() {
        Ok(Some(String::from("found nothing new")))
    } else {
        let names: Vec<String> = revealed.iter().map(ToString::to_string).collect();
        let agent_name = core.agent_name(agent_id);
        core.note_event(format!("{agent_name} uncovered: {}", names.join(", ")));
        Ok(Some(format!("revealed {}", names.join(", "))))
    }
}

// ---------------------------------------------------------------------------
// Social actions
// ---------------------------------------------------------------------------

fn execute_interact(
    core: &mut RunCore,
    agent_id: AgentId,
    action: &AgentAction,
    events: &mut Vec<(EventType, serde_json::Value)>,
) -> Result<Option<String>, String> {
    let location_id = agent_location(core, agent_id)?;
    if let Some(target) = action.target.as_deref() {
        let is_agent_here = core
            .find_agent_by_name(target)
            .map_or(false, |id| {
                core.agents
                    .get(&id)
                    .map_or(false, |a| a.state.location == location_id)
            });
        let is_item_here = core
            .world
            .graph
            .get(&location_id)
            .map_or(false, |l| l.items.iter().any(|i| i.as_str() == target));
        let is_here = target == location_id.as_str();
        if !is_agent_here && !is_item_here && !is_here {
            return Err(format!("target '{target}' not present"));
        }
    }
    events.push((
        EventType::AgentInteracted,
        serde_json::json!({
            "agent_id": agent_id,
            "agent_name": core.agent_name(agent_id),
            "target": &action.target,
            "step": core.current_step,
        }),
    ));
    Ok(Some(String::from("interacted")))
}

fn execute_speak(
    core: &mut RunCore,
    agent_id: AgentId,
    action: &AgentAction,
    events: &mut Vec<(EventType, serde_json::Value)>,
) -> Result<Option<String>, String> {
    let Some(content) = param_str(action, "content") else {
        // The response's message field carries the actual speech; a bare
        // speak action is a recorded no-op.
        return Ok(Some(String::from("spoke")));
    };
    let to_target = param_str(action, "to_target")
        .or_else(|| action.target.clone())
        .unwrap_or_else(|| String::from("broadcast"));
    let record = publish_resolved(core, agent_id, &content, &to_target);
    events.push((
        EventType::Message,
        serde_json::to_value(&record).unwrap_or(serde_json::Value::Null),
    ));
    Ok(Some(String::from("spoke")))
}

fn execute_help(
    core: &mut RunCore,
    agent_id: AgentId,
    action: &AgentAction,
    events: &mut Vec<(EventType, serde_json::Value)>,
) -> Result<Option<String>, String> {
    let target_name = action
        .target
        .as_deref()
        .ok_or_else(|| String::from("help requires a target agent"))?;
    let target_id = core
        .find_agent_by_name(target_name)
        .ok_or_else(|| format!("no agent named '{target_name}'"))?;
    let my_location = agent_location(core, agent_id)?;
    let target_location = agent_location(core, target_id)?;
    if my_location != target_location {
        return Err(format!("'{target_name}' is not here"));
    }

    let helper_name = core.agent_name(agent_id);
    let step = core.current_step;
    if let Some(target) = core.agents.get_mut(&target_id) {
        let health = target.state.adjust_health(1.0);
        let stress = target.state.adjust_stress(-1.0);
        target.memory.record_help_received(step, agent_id, &helper_name);
        events.push((
            EventType::StateChange,
            serde_json::json!({
                "agent_id": target_id,
                "agent_name": target.name(),
                "health": health,
                "stress": stress,
                "cause": format!("helped by {helper_name}"),
                "step": step,
            }),
        ));
    }
    core.note_event(format!("{helper_name} helped {target_name}"));
    Ok(Some(format!("helped {target_name}")))
}

fn execute_join_conversation(
    core: &mut RunCore,
    agent_id: AgentId,
) -> Result<Option<String>, String> {
    let location = agent_location(core, agent_id)?;
    if core.conversations.join(agent_id, &location) {
        Ok(Some(String::from("joined the conversation")))
    } else {
        Err(String::from("no conversation here"))
    }
}

fn execute_leave_conversation(
    core: &mut RunCore,
    agent_id: AgentId,
) -> Result<Option<String>, String> {
    let location = agent_location(core, agent_id)?;
    if core.conversations.leave(agent_id, &location) {
        Ok(Some(String::from("left the conversation")))
    } else {
        Err(String::from("not in a conversation here"))
    }
}

// ---------------------------------------------------------------------------
// Cooperation actions
// ---------------------------------------------------------------------------

fn execute_propose_task(
    core: &mut RunCore,
    agent_id: AgentId,
    action: &AgentAction,
    events: &mut Vec<(EventType, serde_json::Value)>,
) -> Result<Option<String>, String> {
    let description = param_str(action, "description")
        .or_else(|| action.target.clone())
        .ok_or_else(|| String::from("propose_task requires a description"))?;
    let priority = param_f64(action, "priority").unwrap_or(5.0);
    if !(1.0..=10.0).contains(&priority) {
        return Err(format!("priority {priority} outside 1..=10"));
    }
    let required_skills = action
        .parameters
        .get("required_skills")
        .and_then(serde_json::Value::as_array)
        .map(|skills| {
            skills
                .iter()
                .filter_map(serde_json::Value::as_str)
                .map(ToOwned::to_owned)
                .collect()
        })
        .unwrap_or_default();

    let step = core.current_step;
    let task_id = core
        .coordinator
        .propose_task(agent_id, description.clone(), priority as u8, required_skills, step)
        .map_err(|e| e.to_string())?;
    events.push((
        EventType::TaskProposed,
        serde_json::json!({
            "agent_id": agent_id,
            "agent_name": core.agent_name(agent_id),
            "task_id": task_id,
            "description": description,
            "priority": priority as u8,
            "step": step,
        }),
    ));
    Ok(Some(format!("proposed task {task_id}")))
}

fn execute_accept_task(
    core: &mut RunCore,
    agent_id: AgentId,
    action: &AgentAction,
    events: &mut Vec<(EventType, serde_json::Value)>,
) -> Result<Option<String>, String> {
    let task_id = resolve_task_id(core, action)?;
    core.coordinator
        .accept_task(agent_id, task_id)
        .map_err(|e| e.to_string())?;
    events.push((
        EventType::TaskAccepted,
        serde_json::json!({
            "agent_id": agent_id,
            "agent_name": core.agent_name(agent_id),
            "task_id": task_id,
            "step": core.current_step,
        }),
    ));
    Ok(Some(format!("accepted task {task_id}")))
}

fn execute_report_progress(
    core: &mut RunCore,
    agent_id: AgentId,
    action: &AgentAction,
) -> Result<Option<String>, String> {
    let task_id = resolve_task_id(core, action)?;
    let progress = param_f64(action, "progress").unwrap_or(0.0);
    let completed = param_str(action, "status").as_deref() == Some("completed");
    let step = core.current_step;
    let task = core
        .coordinator
        .report_progress(agent_id, task_id, progress as i64, completed, step)
        .map_err(|e| e.to_string())?;
    Ok(Some(format!(
        "task {task_id} at {progress}% ({status:?})",
        progress = task.progress,
        status = task.status
    )))
}

fn execute_call_for_vote(
    core: &mut RunCore,
    agent_id: AgentId,
    action: &AgentAction,
    events: &mut Vec<(EventType, serde_json::Value)>,
) -> Result<Option<String>, String> {
    let proposal = param_str(action, "proposal")
        .or_else(|| action.target.clone())
        .ok_or_else(|| String::from("call_for_vote requires a proposal"))?;
    let options = action
        .parameters
        .get("options")
        .and_then(serde_json::Value::as_array)
        .map(|options| {
            options
                .iter()
                .filter_map(serde_json::Value::as_str)
                .map(ToOwned::to_owned)
                .collect::<Vec<String>>()
        })
        .unwrap_or_default();
    let ballot = param_str(action, "option").or_else(|| param_str(action, "vote"));

    let step = core.current_step;
    let (vote_id, opened) = core
        .coordinator
        .call_for_vote(agent_id, proposal.clone(), options, ballot, step)
        .map_err(|e| e.to_string())?;
    if opened {
        events.push((
            EventType::VoteOpened,
            serde_json::json!({
                "agent_id": agent_id,
                "agent_name": core.agent_name(agent_id),
                "vote_id": vote_id,
                "proposal": &proposal,
                "step": step,
            }),
        ));
        core.note_event(format!("a vote was called: {proposal}"));
    }
    Ok(Some(format!("voted on '{proposal}'")))
}

// ---------------------------------------------------------------------------
// Environment-only actions
// ---------------------------------------------------------------------------

fn execute_environment_update(
    core: &mut RunCore,
    agent_id: AgentId,
    action: &AgentAction,
) -> Result<Option<String>, String> {
    require_role(core, agent_id, AgentRole::Environment)?;
    let dynamics = core.dynamics.clone();
    let outcome = core
        .world
        .apply_environment_update(&action.parameters, &dynamics);
    if outcome.is_clean() {
        Ok(Some(format!("updated {}", outcome.applied.join(", "))))
    } else {
        let rejected: Vec<String> = outcome
            .rejected
            .iter()
            .map(|(key, reason)| format!("{key}: {reason}"))
            .collect();
        Err(format!("rejected keys -- {}", rejected.join("; ")))
    }
}

fn execute_affect_agent(
    core: &mut RunCore,
    agent_id: AgentId,
    action: &AgentAction,
    events: &mut Vec<(EventType, serde_json::Value)>,
) -> Result<Option<String>, String> {
    require_role(core, agent_id, AgentRole::Environment)?;
    let target_name = action
        .target
        .as_deref()
        .ok_or_else(|| String::from("affect_agent requires a target"))?;
    let target_id = core
        .find_agent_by_name(target_name)
        .ok_or_else(|| format!("no agent named '{target_name}'"))?;

    let step = core.current_step;
    let Some(target) = core.agents.get_mut(&target_id) else {
        return Err(format!("no agent named '{target_name}'"));
    };

    if let Some(delta) = param_f64(action, "health_delta") {
        target.state.adjust_health(delta.clamp(-10.0, 10.0));
    }
    if let Some(delta) = param_f64(action, "stress_delta") {
        target.state.adjust_stress(delta.clamp(-10.0, 10.0));
    }
    if let Some(value) = param_f64(action, "health") {
        target.state.health = value.clamp(0.0, 10.0);
    }
    if let Some(value) = param_f64(action, "stress") {
        target.state.stress = value.clamp(0.0, 10.0);
    }

    let health = target.state.health;
    let stress = target.state.stress;
    events.push((
        EventType::StateChange,
        serde_json::json!({
            "agent_id": target_id,
            "agent_name": target.name(),
            "health": health,
            "stress": stress,
            "cause": "environment",
            "step": step,
        }),
    ));
    Ok(Some(format!("affected {target_name}")))
}

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

/// Resolve a free-form message target into a routed draft and publish it.
/// Returns the stored record.
pub fn publish_resolved(
    core: &mut RunCore,
    from: AgentId,
    content: &str,
    to_target: &str,
) -> emosim_types::MessageRecord {
    let from_name = core.agent_name(from);
    let (target, message_type) = resolve_target(core, to_target);
    let step = core.current_step;
    core.bus.publish(
        MessageDraft {
            from_agent_id: Some(from),
            from_name,
            to_target: target,
            message_type,
            content: content.to_owned(),
            metadata: BTreeMap::new(),
        },
        step,
    )
}

/// Map a `to_target` string onto a routing target: the literal
/// `broadcast`, an agent name (or id), or a location key, in that order
/// of preference. Unresolvable targets fall back to broadcast so the
/// words are never lost.
pub fn resolve_target(core: &RunCore, to_target: &str) -> (MessageTarget, MessageType) {
    let trimmed = to_target.trim();
    if trimmed.is_empty() || trimmed.eq_ignore_ascii_case("broadcast") {
        return (MessageTarget::Broadcast, MessageType::Broadcast);
    }
    if let Some(agent_id) = core.find_agent_by_name(trimmed) {
        return (MessageTarget::Agent(agent_id), MessageType::Direct);
    }
    if let Ok(uuid) = Uuid::parse_str(trimmed) {
        let id = AgentId::from(uuid);
        if core.agents.contains_key(&id) {
            return (MessageTarget::Agent(id), MessageType::Direct);
        }
    }
    let location = LocationId::from(trimmed);
    if core.world.graph.contains(&location) {
        return (MessageTarget::Room(location), MessageType::Room);
    }
    (MessageTarget::Broadcast, MessageType::Broadcast)
}

fn require_role(core: &RunCore, agent_id: AgentId, role: AgentRole) -> Result<(), String> {
    let actual = core
        .agents
        .get(&agent_id)
        .map(|a| a.role())
        .ok_or_else(|| String::from("unknown agent"))?;
    if actual == role {
        Ok(())
    } else {
        Err(format!("insufficient permission for role {actual:?}"))
    }
}

fn agent_location(core: &RunCore, agent_id: AgentId) -> Result<LocationId, String> {
    core.agents
        .get(&agent_id)
        .map(|a| a.state.location.clone())
        .ok_or_else(|| String::from("unknown agent"))
}

fn target_item(action: &AgentAction) -> Result<ItemId, String> {
    action
        .target
        .as_deref()
        .map(ItemId::from)
        .ok_or_else(|| format!("{:?} requires an item target", action.action_type))
}

fn param_str(action: &AgentAction, key: &str) -> Option<String> {
    action
        .parameters
        .get(key)
        .and_then(serde_json::Value::as_str)
        .map(ToOwned::to_owned)
}

fn param_f64(action: &AgentAction, key: &str) -> Option<f64> {
    action.parameters.get(key).and_then(serde_json::Value::as_f64)
}

fn resolve_task_id(core: &RunCore, action: &AgentAction) -> Result<TaskId, String> {
    if let Some(raw) = param_str(action, "task_id").or_else(|| action.target.clone()) {
        if let Ok(uuid) = Uuid::parse_str(raw.trim()) {
            return Ok(TaskId::from(uuid));
        }
        // Fall back to matching by description text.
        if let Some(task) = core.coordinator.find_task_by_description(raw.trim()) {
            return Ok(task.id);
        }
        return Err(format!("no task matching '{raw}'"));
    }
    Err(String::from("task action requires a task_id"))
}
