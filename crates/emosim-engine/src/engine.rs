//! The simulation engine: lifecycle, tick loop, and agent scheduling.
//!
//! One engine drives one run on one cooperative scheduler. Within a tick,
//! environment agents run first in template order, then human agents in a
//! seeded random permutation, then the designer; each agent's full turn
//! (context, oracle, parse, apply) runs sequentially so later agents see
//! earlier agents' mutations. Control commands are honored between agents
//! and at every suspension point.

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use rand::seq::SliceRandom;
use tokio::sync::mpsc;
use tokio::time::timeout;
use tracing::{debug, info, warn};

use emosim_agents::{
    build_context, build_evaluation_context, should_respond, system_prompt, ActivitySignals,
    ContextBundle, ConversationView, CooperationView, InboxLine, LocationView, TaskView, VoteView,
};
use emosim_db::PersistBackend;
use emosim_oracle::{parse_agent_response, LlmOracle, OracleRequest};
use emosim_social::LoopDetector;
use emosim_types::{
    AgentId, AgentRole, EventType, MessageRecord, Run, RunStatus, Scenario, StepRecord,
};
use emosim_world::advance_travel;

use crate::actions::{execute_action, publish_resolved};
use crate::control::{EngineControl, WaitOutcome};
use crate::core::RunCore;
use crate::emitter::EventEmitter;
use crate::error::EngineError;

/// Engine tuning knobs.
#[derive(Debug, Clone)]
pub struct EngineConfig {
    /// Per-agent oracle timeout.
    pub llm_timeout: Duration,
    /// Sampling temperature passed to the oracle.
    pub temperature: f64,
    /// Hard cap on ticks for runs without `max_steps`.
    pub safety_step_cap: u64,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            llm_timeout: Duration::from_secs(30),
            temperature: 0.7,
            safety_step_cap: 1000,
        }
    }
}

/// How a tick left the run.
enum TickResult {
    /// Keep looping.
    Continue,
    /// A terminal condition fired (max steps or consensus).
    Completed,
    /// Stop was requested; the tick was persisted consistently.
    Stopped,
    /// A fatal error; transition to `error`.
    Fatal(EngineError),
}

/// The engine driving one run.
pub struct SimulationEngine {
    core: RunCore,
    run: Run,
    oracle: Arc<LlmOracle>,
    store: Arc<PersistBackend>,
    emitter: Arc<EventEmitter>,
    control: Arc<EngineControl>,
    config: EngineConfig,
}

impl SimulationEngine {
    /// Build an engine for a pending run.
    ///
    /// # Errors
    ///
    /// Returns [`EngineError::Scenario`] if the scenario fails validation.
    pub fn new(
        run: Run,
        scenario: &Scenario,
        oracle: Arc<LlmOracle>,
        store: Arc<PersistBackend>,
        emitter: Arc<EventEmitter>,
        control: Arc<EngineControl>,
        config: EngineConfig,
    ) -> Result<Self, EngineError> {
        scenario.validate()?;
        let mut core = RunCore::from_scenario(run.id, scenario, run.seed);
        core.current_step = run.current_step;
        Ok(Self {
            core,
            run,
            oracle,
            store,
            emitter,
            control,
            config,
        })
    }

    /// Drive the run to a terminal status and return the final record.
    pub async fn run(mut self) -> Run {
        if self.run.status == RunStatus::Pending {
            self.transition(RunStatus::Running).await;
            self.run.started_at.get_or_insert(Utc::now());
        } else if self.run.status == RunStatus::Paused {
            // Resumed from a restart: stay paused until commanded.
            self.control.pause();
        }
        let _ = self.store.update_run(&self.run).await;
        let _ = self
            .store
            .upsert_agents(self.run.id, &self.core.agent_summaries())
            .await;
        info!(run_id = %self.run.id, seed = self.run.seed, "run loop started");

        loop {
            if self.control.is_stop_requested() {
                return self.finish_stopped().await;
            }

            if self.control.is_paused() {
                if self.run.status != RunStatus::Paused {
                    self.transition(RunStatus::Paused).await;
                }
                match self.control.wait_while_paused().await {
                    WaitOutcome::Stopped => return self.finish_stopped().await,
                    WaitOutcome::Resumed => {
                        self.transition(RunStatus::Running).await;
                        continue;
                    }
                    WaitOutcome::Step => {
                        self.transition(RunStatus::Running).await;
                        match self.tick_and_check().await {
                            TickResult::Continue => {
                                self.control.pause();
                                continue;
                            }
                            TickResult::Completed => return self.finish_completed().await,
                            TickResult::Stopped => return self.finish_stopped().await,
                            TickResult::Fatal(e) => return self.finish_error(e).await,
                        }
                    }
                }
            }

            if self.reached_step_limit() {
                return self.finish_completed().await;
            }

            match self.tick_and_check().await {
                TickResult::Continue => self.control.sleep_tick().await,
                TickResult::Completed => return self.finish_completed().await,
                TickResult::Stopped => return self.finish_stopped().await,
                TickResult::Fatal(e) => return self.finish_error(e).await,
            }
        }
    }

    fn reached_step_limit(&self) -> bool {
        let cap = self.run.max_steps.unwrap_or(self.config.safety_step_cap);
        self.core.current_step >= cap
    }

    async fn tick_and_check(&mut self) -> TickResult {
        match self.execute_tick().await {
            Ok(consensus_end) => {
                if self.control.is_stop_requested() {
                    TickResult::Stopped
                } else if consensus_end || self.reached_step_limit() {
                    TickResult::Completed
                } else {
                    TickResult::Continue
                }
            }
            Err(e) => TickResult::Fatal(e),
        }
    }

    // -----------------------------------------------------------------
    // The tick procedure
    // -----------------------------------------------------------------

    /// Execute one tick. Returns whether a consensus ending fired.
    async fn execute_tick(&mut self) -> Result<bool, EngineError> {
        self.core.current_step += 1;
        self.run.current_step = self.core.current_step;
        let step = self.core.current_step;
        debug!(run_id = %self.run.id, step, "tick started");

        self.emit(EventType::StepStarted, serde_json::json!({"step": step}))
            .await;

        // Per-step caches.
        self.core.resolver.begin_step();
        self.core.step_events.clear();
        self.core.step_actions.clear();

        // World phase: travelers advance, passive effects apply.
        self.advance_travels().await;
        self.apply_location_effects().await;

        // Conversations form wherever active humans share a location.
        let created = self
            .core
            .conversations
            .scan_colocations(&self.core.active_human_locations());
        for id in created {
            let participants: Vec<String> = self
                .core
                .conversations
                .live_conversations()
                .find(|c| c.id == id)
                .map(|c| c.participants.iter().map(|p| self.core.agent_name(*p)).collect())
                .unwrap_or_default();
            self.emit(
                EventType::ConversationCreated,
                serde_json::json!({"conversation_id": id, "participants": participants, "step": step}),
            )
            .await;
        }

        // Environment agents, deterministic template order.
        for id in self.core.ids_with_role(AgentRole::Environment) {
            if self.control.is_stop_requested() {
                break;
            }
            self.run_agent_turn(id).await;
        }

        // Human agents in a seeded random permutation.
        let mut humans: Vec<AgentId> = self
            .core
            .ids_with_role(AgentRole::Human)
            .into_iter()
            .filter(|id| self.core.agents.get(id).map_or(false, |a| a.can_act()))
            .collect();
        humans.shuffle(&mut self.core.rng);
        for id in humans {
            if self.control.is_stop_requested() {
                break;
            }
            self.run_agent_turn(id).await;
        }

        // Designer, after the humans.
        if !self.control.is_stop_requested() {
            for id in self.core.ids_with_role(AgentRole::Designer) {
                self.run_agent_turn(id).await;
            }
        }

        // Conversation timeouts and cleanup.
        for id in self.core.conversations.finish_tick() {
            self.emit(
                EventType::ConversationEnded,
                serde_json::json!({"conversation_id": id, "step": step}),
            )
            .await;
        }

        // Votes called last tick close now.
        let consensus_end = self.close_votes(step).await;

        // Metrics, persistence, completion event.
        let metrics = self.core.step_metrics();
        let record = StepRecord {
            run_id: self.run.id,
            step_index: step,
            world_state: self.core.world.snapshot(),
            actions: self.core.step_actions.clone(),
            metrics,
            created_at: Utc::now(),
        };
        let messages: Vec<MessageRecord> = self
            .core
            .bus
            .messages_for_step(step)
            .into_iter()
            .cloned()
            .collect();
        self.persist_step_with_retry(&record, &messages).await?;

        self.run.world_state = self.core.world.snapshot();
        self.run.metrics = serde_json::json!({
            "step": metrics,
            "vote_outcomes": self.core.coordinator.vote_outcomes(),
        });
        let _ = self.store.update_run(&self.run).await;
        let _ = self
            .store
            .upsert_agents(self.run.id, &self.core.agent_summaries())
            .await;

        self.emit(
            EventType::StepCompleted,
            serde_json::json!({
                "step": step,
                "actions": &self.core.step_actions,
                "messages": &messages,
                "metrics": metrics,
            }),
        )
        .await;

        Ok(consensus_end)
    }

    /// Advance every in-progress travel plan by one hop.
    async fn advance_travels(&mut self) {
        let travelling: Vec<AgentId> = self
            .core
            .agents
            .values()
            .filter(|a| a.can_act() && a.state.travel.is_some())
            .map(|a| a.id)
            .collect();

        for agent_id in travelling {
            let hop = {
                let Some(agent) = self.core.agents.get_mut(&agent_id) else {
                    continue;
                };
                let Some(mut plan) = agent.state.travel.take() else {
                    continue;
                };
                let name = agent.name().to_owned();
                let from = agent.state.location.clone();
                match advance_travel(&mut plan) {
                    Some((next, arrived)) => {
                        let destination = plan.destination.clone();
                        let remaining = plan.remaining.len();
                        if !arrived {
                            agent.state.travel = Some(plan);
                        }
                        Some((name, from, next, arrived, destination, remaining))
                    }
                    None => None,
                }
            };
            let Some((name, from, next, arrived, destination, remaining)) = hop else {
                continue;
            };
            let step = self.core.current_step;
            self.core
                .relocate_agent(agent_id, next.clone(), "continuing travel");
            if !arrived {
                self.emit(
                    EventType::AgentTravelling,
                    serde_json::json!({
                        "agent_id": agent_id,
                        "agent_name": &name,
                        "destination": &destination,
                        "remaining": remaining,
                        "step": step,
                    }),
                )
                .await;
            }
            self.emit(
                EventType::AgentMoved,
                serde_json::json!({
                    "agent_id": agent_id,
                    "agent_name": &name,
                    "from": &from,
                    "to": &next,
                    "step": step,
                }),
            )
            .await;
        }
    }

    /// Apply per-tick location effects and hazard bleed to active humans.
    async fn apply_location_effects(&mut self) {
        let hazard_health = self.core.world.hazard_health_delta();
        let hazard_stress = self.core.world.hazard_stress_delta();
        let step = self.core.current_step;

        let human_ids: Vec<AgentId> = self
            .core
            .agents
            .values()
            .filter(|a| a.can_act() && a.role() == AgentRole::Human)
            .map(|a| a.id)
            .collect();

        let mut incapacitated = Vec::new();
        for agent_id in human_ids {
            let Some(agent) = self.core.agents.get_mut(&agent_id) else {
                continue;
            };
            let Some(location) = self.core.world.graph.get(&agent.state.location) else {
                continue;
            };
            let mut health_delta = location.effects.health_per_tick;
            let mut stress_delta = location.effects.stress_per_tick;
            if location.hazard_affected {
                health_delta += hazard_health;
                stress_delta += hazard_stress;
            }
            if health_delta != 0.0 {
                agent.state.adjust_health(health_delta);
            }
            if stress_delta != 0.0 {
                agent.state.adjust_stress(stress_delta);
            }
            if agent.state.health <= 0.0 && agent.is_active {
                agent.deactivate();
                incapacitated.push((agent_id, agent.name().to_owned()));
            }
        }

        for (agent_id, name) in incapacitated {
            self.core.bus.deactivate_agent(agent_id);
            self.core
                .note_event(format!("{name} collapsed and is no longer responsive"));
            self.emit(
                EventType::StateChange,
                serde_json::json!({
                    "agent_id": agent_id,
                    "agent_name": name,
                    "health": 0.0,
                    "is_active": false,
                    "step": step,
                }),
            )
            .await;
        }
    }

    // -----------------------------------------------------------------
    // Agent turns
    // -----------------------------------------------------------------

    /// Run one agent's full turn: gate, context, oracle, parse, apply.
    async fn run_agent_turn(&mut self, agent_id: AgentId) {
        let step = self.core.current_step;
        let Some(agent) = self.core.agents.get(&agent_id) else {
            return;
        };
        if !agent.can_act() {
            return;
        }
        let role = agent.role();
        let name = agent.name().to_owned();
        let location = agent.state.location.clone();
        let stress = agent.state.stress;

        // Turn state before this agent acts.
        let was_my_turn = self
            .core
            .conversations
            .conversation_of(agent_id, &location)
            .map_or(false, |c| c.is_turn_of(agent_id));

        // Response probability gate (humans only). An agent whose
        // conversation turn it is always gets to respond.
        if role == AgentRole::Human && !was_my_turn {
            let signals = ActivitySignals {
                has_events: !self.core.step_events.is_empty(),
                has_messages: self.core.bus.inbox_len(agent_id) > 0,
                has_company: !self.core.agents_at(&location, Some(agent_id)).is_empty(),
            };
            let persona = self
                .core
                .agents
                .get(&agent_id)
                .and_then(|a| a.persona().cloned());
            if let Some(persona) = persona {
                if !should_respond(&persona, stress, signals, &mut self.core.rng) {
                    debug!(agent = %name, step, "agent skipped the tick (probability gate)");
                    return;
                }
            }
        }

        // Evaluator never runs inside the tick loop.
        if role == AgentRole::Evaluator {
            return;
        }

        // Drain the inbox into memory and the context.
        let inbox = self.core.bus.take_inbox(agent_id);
        if let Some(agent) = self.core.agents.get_mut(&agent_id) {
            for message in &inbox {
                if let Some(sender) = message.from_agent_id {
                    agent
                        .memory
                        .record_message_from(step, sender, &message.from_name, &message.content);
                }
            }
        }

        let bundle = self.build_bundle(agent_id, &location, &inbox, was_my_turn);
        let (system, context, model) = {
            let Some(agent) = self.core.agents.get(&agent_id) else {
                return;
            };
            (
                system_prompt(agent),
                build_context(agent, &bundle),
                agent.template.model_id.clone(),
            )
        };

        let request = OracleRequest {
            model,
            system,
            context,
            temperature: self.config.temperature,
            agent: name.clone(),
            tick: step,
        };

        let raw = match self.call_oracle(agent_id, &name, &request).await {
            Ok(raw) => raw,
            Err(reason) => {
                self.emit(
                    EventType::AgentError,
                    serde_json::json!({
                        "agent_id": agent_id,
                        "agent_name": name,
                        "error": reason,
                        "step": step,
                    }),
                )
                .await;
                self.advance_conversation_turn(agent_id, &location, was_my_turn, false);
                return;
            }
        };

        let response = parse_agent_response(&raw);

        // Actions, in emission order; failures do not abort the rest.
        for action in &response.actions {
            let outcome = execute_action(&mut self.core, agent_id, action);
            if role == AgentRole::Human {
                self.core
                    .loops
                    .record_action(agent_id, action.action_type, action.target.as_deref());
            }
            self.core.step_actions.push(outcome.record);
            for (event, data) in outcome.events {
                self.emit(event, data).await;
            }
        }

        // Self-reported state changes, clamped, after actions.
        self.apply_state_changes(agent_id, &name, &response).await;

        // The message, after actions and state changes.
        let spoke = response.has_spoken();
        if let Some(message) = response.message.as_ref().filter(|_| spoke) {
            let record =
                publish_resolved(&mut self.core, agent_id, &message.content, &message.to_target);
            self.record_conversation_message(agent_id, &record);
            self.core
                .loops
                .record_topic(agent_id, LoopDetector::extract_topic(&message.content));
            self.emit(
                EventType::Message,
                serde_json::to_value(&record).unwrap_or(serde_json::Value::Null),
            )
            .await;
        }

        self.advance_conversation_turn(agent_id, &location, was_my_turn, spoke);

        if let Some(agent) = self.core.agents.get_mut(&agent_id) {
            let summary = if response.actions.is_empty() {
                String::from("no actions")
            } else {
                response
                    .actions
                    .iter()
                    .map(|a| format!("{:?}", a.action_type))
                    .collect::<Vec<_>>()
                    .join(", ")
            };
            agent.memory.record_own_action(step, summary);
        }
    }

    /// Invoke the oracle with timeout and token forwarding.
    async fn call_oracle(
        &self,
        agent_id: AgentId,
        name: &str,
        request: &OracleRequest,
    ) -> Result<String, String> {
        let (tx, mut rx) = mpsc::channel::<String>(64);
        let emitter = Arc::clone(&self.emitter);
        let forward_name = name.to_owned();
        let step = request.tick;
        let forwarder = tokio::spawn(async move {
            while let Some(token) = rx.recv().await {
                emitter
                    .emit(
                        EventType::StreamToken,
                        serde_json::json!({
                            "agent_id": agent_id,
                            "agent_name": forward_name,
                            "token": token,
                            "step": step,
                        }),
                    )
                    .await;
            }
        });

        let result = timeout(
            self.config.llm_timeout,
            self.oracle.generate(request, Some(&tx)),
        )
        .await;
        drop(tx);
        // All tokens are flushed before any later event is emitted.
        let _ = forwarder.await;

        match result {
            Ok(Ok(raw)) => Ok(raw),
            Ok(Err(e)) => {
                warn!(agent = %name, error = %e, "oracle call failed");
                Err(e.to_string())
            }
            Err(_elapsed) => {
                warn!(agent = %name, timeout_ms = self.config.llm_timeout.as_millis() as u64, "oracle call timed out");
                Err(String::from("oracle timeout"))
            }
        }
    }

    /// Apply bounded self-reported deltas; health 0 incapacitates.
    async fn apply_state_changes(
        &mut self,
        agent_id: AgentId,
        name: &str,
        response: &emosim_types::AgentResponse,
    ) {
        let changes = &response.state_changes;
        if changes.health.is_none() && changes.stress.is_none() {
            return;
        }
        let step = self.core.current_step;
        let mut became_inactive = false;
        let (health, stress) = {
            let Some(agent) = self.core.agents.get_mut(&agent_id) else {
                return;
            };
            if let Some(health) = changes.health {
                agent.state.health = health.clamp(0.0, 10.0);
            }
            if let Some(stress) = changes.stress {
                agent.state.stress = stress.clamp(0.0, 10.0);
            }
            if agent.state.health <= 0.0 && agent.is_active {
                agent.deactivate();
                became_inactive = true;
            }
            (agent.state.health, agent.state.stress)
        };
        if became_inactive {
            self.core.bus.deactivate_agent(agent_id);
        }
        self.emit(
            EventType::StateChange,
            serde_json::json!({
                "agent_id": agent_id,
                "agent_name": name,
                "health": health,
                "stress": stress,
                "is_active": !became_inactive,
                "cause": "self-reported",
                "step": step,
            }),
        )
        .await;
    }

    /// Record a published message into the speaker's conversation and
    /// every participant's excerpt memory.
    fn record_conversation_message(&mut self, agent_id: AgentId, record: &MessageRecord) {
        let Some(location) = self
            .core
            .agents
            .get(&agent_id)
            .map(|a| a.state.location.clone())
        else {
            return;
        };
        let line = format!("{}: {}", record.from_name, record.content);
        let participants: Vec<AgentId> = {
            let Some(conversation) = self.core.conversations.live_conversation_at_mut(&location)
            else {
                return;
            };
            if !conversation.participants.contains(&agent_id) {
                return;
            }
            conversation.record_message(agent_id, record.id);
            conversation.participants.clone()
        };
        for participant in participants {
            if let Some(agent) = self.core.agents.get_mut(&participant) {
                agent.memory.record_excerpt(line.clone());
            }
        }
    }

    /// Advance the round-robin index when the agent held the turn.
    fn advance_conversation_turn(
        &mut self,
        agent_id: AgentId,
        location: &emosim_types::LocationId,
        was_my_turn: bool,
        spoke: bool,
    ) {
        if !was_my_turn {
            return;
        }
        if let Some(conversation) = self.core.conversations.live_conversation_at_mut(location) {
            conversation.take_turn(agent_id, spoke);
        }
    }

    /// Assemble the context bundle for one agent.
    fn build_bundle(
        &self,
        agent_id: AgentId,
        location: &emosim_types::LocationId,
        inbox: &[MessageRecord],
        is_my_turn: bool,
    ) -> ContextBundle {
        let location_view = self.core.world.graph.get(location).map_or_else(
            LocationView::default,
            |loc| LocationView {
                id: location.to_string(),
                description: loc.description.clone(),
                nearby: loc.nearby.iter().map(ToString::to_string).collect(),
                items: loc.items.iter().map(ToString::to_string).collect(),
                agents_here: self
                    .core
                    .agents_at(location, Some(agent_id))
                    .into_iter()
                    .map(|id| self.core.agent_name(id))
                    .collect(),
            },
        );

        let inbox_lines: Vec<InboxLine> = inbox
            .iter()
            .map(|m| InboxLine {
                from: m.from_name.clone(),
                message_type: m.message_type,
                content: m.content.clone(),
            })
            .collect();

        let relationships = self
            .core
            .agents
            .get(&agent_id)
            .map(|agent| {
                let present: Vec<(AgentId, String)> = self
                    .core
                    .agents_at(location, Some(agent_id))
                    .into_iter()
                    .map(|id| (id, self.core.agent_name(id)))
                    .collect();
                agent.memory.relationship_lines(&present)
            })
            .unwrap_or_default();

        let cooperation = CooperationView {
            shared_goals: self.core.coordinator.shared_goals().to_vec(),
            tasks: self
                .core
                .coordinator
                .open_tasks()
                .into_iter()
                .map(|t| TaskView {
                    id: t.id,
                    description: t.description.clone(),
                    priority: t.priority,
                    status: t.status,
                    progress: t.progress,
                })
                .collect(),
            votes: self
                .core
                .coordinator
                .open_votes()
                .iter()
                .map(|v| VoteView {
                    proposal: v.proposal.clone(),
                    options: v.options.clone(),
                })
                .collect(),
        };

        let conversation = self
            .core
            .conversations
            .conversation_of(agent_id, location)
            .map(|c| ConversationView {
                participants: c
                    .participants
                    .iter()
                    .map(|p| self.core.agent_name(*p))
                    .collect(),
                is_my_turn,
                status: c.status,
                transcript: self
                    .core
                    .agents
                    .get(&agent_id)
                    .map(|a| a.memory.excerpts().cloned().collect())
                    .unwrap_or_default(),
            });

        let mut step_events = self.core.world.events.clone();
        step_events.extend(self.core.step_events.iter().cloned());

        ContextBundle {
            step: self.core.current_step,
            hazard_level: self.core.world.hazard_level,
            time_of_day: self.core.world.time_of_day.clone(),
            weather: self.core.world.weather.clone(),
            location: location_view,
            relationships,
            inbox: inbox_lines,
            step_events,
            cooperation,
            suggestion: self.core.loops.suggestion_for(agent_id),
            conversation,
            agents_overview: self.core.agents_overview(),
            recent_actions: self
                .core
                .step_actions
                .iter()
                .map(|a| {
                    format!(
                        "{} {:?} {} ({})",
                        a.agent_name,
                        a.action_type,
                        a.target.as_deref().unwrap_or("-"),
                        if a.success { "ok" } else { "failed" }
                    )
                })
                .collect(),
        }
    }

    // -----------------------------------------------------------------
    // Votes and consensus
    // -----------------------------------------------------------------

    /// Close due votes, record outcomes in metrics, and evaluate the
    /// consensus-to-end rule. Returns whether the run should end.
    async fn close_votes(&mut self, step: u64) -> bool {
        let outcomes = self.core.coordinator.close_due_votes(step);
        if outcomes.is_empty() {
            return false;
        }

        let mut consensus = false;
        let humans = self.core.active_human_count() as u32;
        for outcome in &outcomes {
            self.emit(
                EventType::VoteClosed,
                serde_json::to_value(outcome).unwrap_or(serde_json::Value::Null),
            )
            .await;

            if outcome.proposal == "end_simulation" {
                let end_votes = outcome.counts.get("end").copied().unwrap_or(0);
                let turnout = outcome.total_ballots;
                let majority =
                    turnout * 2 >= humans && end_votes * 10 >= turnout * 6 && turnout > 0;
                let unanimity = turnout * 10 >= humans * 8 && end_votes == turnout && turnout > 0;
                if majority || unanimity {
                    consensus = true;
                    self.emit(
                        EventType::ConsensusReached,
                        serde_json::json!({
                            "decision": "end",
                            "end_votes": end_votes,
                            "total_ballots": turnout,
                            "human_agents": humans,
                            "step": step,
                        }),
                    )
                    .await;
                }
            }
        }

        consensus
    }

    // -----------------------------------------------------------------
    // Persistence and lifecycle
    // -----------------------------------------------------------------

    /// Persist a step and its messages; retry once, then fail the run.
    async fn persist_step_with_retry(
        &self,
        record: &StepRecord,
        messages: &[MessageRecord],
    ) -> Result<(), EngineError> {
        if let Err(first) = self.store.persist_step(record, messages).await {
            warn!(run_id = %self.run.id, step = record.step_index, error = %first, "step persist failed, retrying once");
            self.store.persist_step(record, messages).await?;
        }
        Ok(())
    }

    /// Validated status transition with a `run_status` event.
    async fn transition(&mut self, next: RunStatus) {
        if !self.run.status.can_transition_to(next) {
            warn!(run_id = %self.run.id, from = ?self.run.status, to = ?next, "illegal internal transition ignored");
            return;
        }
        self.run.status = next;
        let _ = self.store.update_run(&self.run).await;
        self.emit(
            EventType::RunStatus,
            serde_json::json!({
                "run_id": self.run.id,
                "status": self.run.status,
                "step": self.core.current_step,
            }),
        )
        .await;
    }

    async fn finish_completed(mut self) -> Run {
        self.transition(RunStatus::Completed).await;
        self.run.completed_at = Some(Utc::now());

        let evaluation = self.run_evaluator().await;
        self.run.evaluation = evaluation.clone();
        let _ = self.store.update_run(&self.run).await;

        self.emit(
            EventType::RunCompleted,
            serde_json::json!({
                "run_id": self.run.id,
                "step": self.core.current_step,
                "evaluation": evaluation,
            }),
        )
        .await;
        info!(run_id = %self.run.id, steps = self.core.current_step, "run completed");
        self.run
    }

    async fn finish_stopped(mut self) -> Run {
        self.transition(RunStatus::Stopped).await;
        self.run.completed_at = Some(Utc::now());
        let _ = self.store.update_run(&self.run).await;
        self.emit(
            EventType::RunStopped,
            serde_json::json!({"run_id": self.run.id, "step": self.core.current_step}),
        )
        .await;
        info!(run_id = %self.run.id, steps = self.core.current_step, "run stopped");
        self.run
    }

    async fn finish_error(mut self, error: EngineError) -> Run {
        self.transition(RunStatus::Error).await;
        self.run.completed_at = Some(Utc::now());
        let _ = self.store.update_run(&self.run).await;
        self.emit(
            EventType::Error,
            serde_json::json!({
                "run_id": self.run.id,
                "error": error.to_string(),
                "step": self.core.current_step,
            }),
        )
        .await;
        warn!(run_id = %self.run.id, error = %error, "run failed");
        self.run
    }

    /// Run the evaluator agent once over the finished run.
    async fn run_evaluator(&mut self) -> serde_json::Value {
        let Some(evaluator_id) = self.core.ids_with_role(AgentRole::Evaluator).first().copied()
        else {
            return serde_json::Value::Null;
        };
        let Some(evaluator) = self.core.agents.get(&evaluator_id) else {
            return serde_json::Value::Null;
        };

        let agents_summary: Vec<serde_json::Value> = self
            .core
            .agents
            .values()
            .map(|a| {
                let events = a.memory.recent_events(usize::MAX);
                serde_json::json!({
                    "name": a.name(),
                    "role": a.role(),
                    "health": a.state.health,
                    "stress": a.state.stress,
                    "location": a.state.location,
                    "is_active": a.is_active,
                    "action_count": events.iter().filter(|e| e.kind == "action").count(),
                    "message_count": events.iter().filter(|e| e.kind == "message").count(),
                })
            })
            .collect();
        let run_summary = serde_json::json!({
            "total_steps": self.core.current_step,
            "hazard_level": self.core.world.hazard_level,
            "outcome": "completed",
            "agents": agents_summary,
        });
        let transcript: Vec<String> = self
            .core
            .bus
            .full_history()
            .iter()
            .map(|m| format!("{}: {}", m.from_name, m.content))
            .collect();

        let request = OracleRequest {
            model: evaluator.template.model_id.clone(),
            system: system_prompt(evaluator),
            context: build_evaluation_context(&run_summary, &transcript),
            temperature: self.config.temperature,
            agent: evaluator.name().to_owned(),
            tick: self.core.current_step,
        };
        let name = evaluator.name().to_owned();

        match self.call_oracle(evaluator_id, &name, &request).await {
            // The evaluator's output schema is opaque: validate only that
            // it is JSON and store it verbatim.
            Ok(raw) => serde_json::from_str::<serde_json::Value>(&raw)
                .unwrap_or(serde_json::Value::Null),
            Err(reason) => {
                self.emit(
                    EventType::AgentError,
                    serde_json::json!({
                        "agent_id": evaluator_id,
                        "agent_name": name,
                        "error": reason,
                        "step": self.core.current_step,
                    }),
                )
                .await;
                serde_json::Value::Null
            }
        }
    }

    async fn emit(&self, event: EventType, data: serde_json::Value) {
        self.emitter.emit(event, data).await;
    }
}
