//! Cooperation coordination: shared goals, tasks, and one-tick votes.
//!
//! Shared goals are derived once from the human agents' goal lists at run
//! start and grow through proposed tasks. Votes are open for exactly the
//! tick after they are called; the engine closes them at the end of that
//! tick and the majority option (ties broken by option order) is recorded
//! in the run metrics.

use std::collections::BTreeMap;

use emosim_types::{AgentId, TaskId, TaskStatus, VoteId};

use crate::error::SocialError;

/// A shared task agents can propose, accept, and progress.
#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
pub struct Task {
    /// Task identifier.
    pub id: TaskId,
    /// What needs doing.
    pub description: String,
    /// Urgency, 1-10.
    pub priority: u8,
    /// Lifecycle status.
    pub status: TaskStatus,
    /// Agents assigned to the task, in acceptance order.
    pub assigned_agents: Vec<AgentId>,
    /// Skills the proposer asked for.
    pub required_skills: Vec<String>,
    /// Progress, 0-100.
    pub progress: u8,
    /// Tick the task was proposed.
    pub proposed_step: u64,
    /// Tick the task completed, if it has.
    pub completed_step: Option<u64>,
}

/// An open vote: ballots accumulate during the tick after it was called.
#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
pub struct Vote {
    /// Vote identifier.
    pub id: VoteId,
    /// The caller.
    pub called_by: AgentId,
    /// What is being decided.
    pub proposal: String,
    /// The options, in the order the caller gave them (the tie-break
    /// order).
    pub options: Vec<String>,
    /// Tick the vote was called.
    pub opened_step: u64,
    /// Ballots cast so far.
    pub ballots: BTreeMap<AgentId, String>,
}

/// The recorded outcome of a closed vote.
#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct VoteOutcome {
    /// What was decided.
    pub proposal: String,
    /// The winning option.
    pub winner: String,
    /// Ballot counts per option.
    pub counts: BTreeMap<String, u32>,
    /// Total ballots cast.
    pub total_ballots: u32,
    /// Tick the vote closed.
    pub closed_step: u64,
}

/// Coordinates shared goals, the task table, and votes for one run.
#[derive(Debug, Clone, Default)]
pub struct CooperationCoordinator {
    shared_goals: Vec<String>,
    tasks: BTreeMap<TaskId, Task>,
    open_votes: Vec<Vote>,
    closed_votes: Vec<VoteOutcome>,
}

impl CooperationCoordinator {
    /// Create an empty coordinator.
    pub fn new() -> Self {
        Self::default()
    }

    /// Seed the shared-goal list from agent goals (deduplicated, order
    /// preserved). Called once at run start.
    pub fn seed_goals<'a>(&mut self, goals: impl Iterator<Item = &'a str>) {
        for goal in goals {
            if !self.shared_goals.iter().any(|g| g == goal) {
                self.shared_goals.push(goal.to_owned());
            }
        }
    }

    /// The shared goals, in seed order.
    pub fn shared_goals(&self) -> &[String] {
        &self.shared_goals
    }

    /// Create a task in `proposed`; visible to all agents next tick.
    ///
    /// # Errors
    ///
    /// Returns [`SocialError::PriorityOutOfRange`] for priorities outside
    /// 1-10.
    pub fn propose_task(
        &mut self,
        _agent: AgentId,
        description: String,
        priority: u8,
        required_skills: Vec<String>,
        step: u64,
    ) -> Result<TaskId, SocialError> {
        if !(1..=10).contains(&priority) {
            return Err(SocialError::PriorityOutOfRange(i64::from(priority)));
        }
        let task = Task {
            id: TaskId::new(),
            description,
            priority,
            status: TaskStatus::Proposed,
            assigned_agents: Vec::new(),
            required_skills,
            progress: 0,
            proposed_step: step,
            completed_step: None,
        };
        let id = task.id;
        self.tasks.insert(id, task);
        Ok(id)
    }

    /// Assign `agent` to a task; a `proposed` task with its first assignee
    /// moves to `in_progress`.
    ///
    /// # Errors
    ///
    /// Returns [`SocialError::TaskNotFound`] or
    /// [`SocialError::TaskCompleted`].
    pub fn accept_task(&mut self, agent: AgentId, task_id: TaskId) -> Result<&Task, SocialError> {
        let task = self
            .tasks
            .get_mut(&task_id)
            .ok_or(SocialError::TaskNotFound(task_id))?;
        if task.status == TaskStatus::Completed {
            return Err(SocialError::TaskCompleted(task_id));
        }
        if !task.assigned_agents.contains(&agent) {
            task.assigned_agents.push(agent);
        }
        if task.status == TaskStatus::Proposed {
            task.status = TaskStatus::InProgress;
        }
        Ok(task)
    }

    /// Update a task's progress; progress 100 or an explicit completion
    /// flag marks it complete.
    ///
    /// # Errors
    ///
    /// Returns [`SocialError::TaskNotFound`],
    /// [`SocialError::TaskCompleted`], or
    /// [`SocialError::ProgressOutOfRange`].
    pub fn report_progress(
        &mut self,
        _agent: AgentId,
        task_id: TaskId,
        progress: i64,
        completed: bool,
        step: u64,
    ) -> Result<&Task, SocialError> {
        if !(0..=100).contains(&progress) {
            return Err(SocialError::ProgressOutOfRange(progress));
        }
        let task = self
            .tasks
            .get_mut(&task_id)
            .ok_or(SocialError::TaskNotFound(task_id))?;
        if task.status == TaskStatus::Completed {
            return Err(SocialError::TaskCompleted(task_id));
        }
        task.progress = progress as u8;
        if task.progress == 100 || completed {
            task.progress = if completed { 100 } else { task.progress };
            task.status = TaskStatus::Completed;
            task.completed_step = Some(step);
        }
        Ok(task)
    }

    /// Find a task by exact description (agents often refer to tasks by
    /// text rather than id).
    pub fn find_task_by_description(&self, description: &str) -> Option<&Task> {
        self.tasks
            .values()
            .find(|t| t.description == description && t.status != TaskStatus::Completed)
    }

    /// Look up a task.
    pub fn task(&self, id: TaskId) -> Option<&Task> {
        self.tasks.get(&id)
    }

    /// Tasks visible to agents (not yet completed), by priority descending
    /// then proposal order.
    pub fn open_tasks(&self) -> Vec<&Task> {
        let mut tasks: Vec<&Task> = self
            .tasks
            .values()
            .filter(|t| t.status != TaskStatus::Completed)
            .collect();
        tasks.sort_by(|a, b| {
            b.priority
                .cmp(&a.priority)
                .then(a.proposed_step.cmp(&b.proposed_step))
        });
        tasks
    }

    /// Open a vote, or cast a ballot on an already-open vote with the
    /// same proposal. The caller's own ballot is `option` when given,
    /// otherwise the first option.
    ///
    /// # Errors
    ///
    /// Returns [`SocialError::EmptyVoteOptions`] when opening a vote with
    /// no options.
    pub fn call_for_vote(
        &mut self,
        agent: AgentId,
        proposal: String,
        options: Vec<String>,
        option: Option<String>,
        step: u64,
    ) -> Result<(VoteId, bool), SocialError> {
        if let Some(vote) = self
            .open_votes
            .iter_mut()
            .find(|v| v.proposal == proposal)
        {
            let ballot = option
                .or_else(|| vote.options.first().cloned())
                .unwrap_or_default();
            vote.ballots.insert(agent, ballot);
            return Ok((vote.id, false));
        }

        if options.is_empty() {
            return Err(SocialError::EmptyVoteOptions);
        }
        let ballot = option.unwrap_or_else(|| options[0].clone());
        let mut ballots = BTreeMap::new();
        ballots.insert(agent, ballot);
        let vote = Vote {
            id: VoteId::new(),
            called_by: agent,
            proposal,
            options,
            opened_step: step,
            ballots,
        };
        let id = vote.id;
        self.open_votes.push(vote);
        Ok((id, true))
    }

    /// Votes currently accepting ballots.
    pub fn open_votes(&self) -> &[Vote] {
        &self.open_votes
    }

    /// Close every vote opened before `step` (a vote called at step N is
    /// open through step N+1). Ties resolve to the earlier-listed option.
    /// Returns the outcomes closed this call.
    pub fn close_due_votes(&mut self, step: u64) -> Vec<VoteOutcome> {
        let (due, open): (Vec<Vote>, Vec<Vote>) = std::mem::take(&mut self.open_votes)
            .into_iter()
            .partition(|v| v.opened_step < step);
        self.open_votes = open;

        let mut outcomes = Vec::new();
        for vote in due {
            let mut counts: BTreeMap<String, u32> = BTreeMap::new();
            for ballot in vote.ballots.values() {
                *counts.entry(ballot.clone()).or_insert(0) += 1;
            }
            // Forward scan, replacing only on a strictly greater count:
            // on a tie the earlier-listed option stands.
            let mut best: Option<(&String, u32)> = None;
            for option in &vote.options {
                let count = counts.get(option).copied().unwrap_or(0);
                if best.map_or(true, |(_, best_count)| count > best_count) {
                    best = Some((option, count));
                }
            }
            let winner = best.map(|(option, _)| option.clone()).unwrap_or_default();
            let outcome = VoteOutcome {
                proposal: vote.proposal,
                winner,
                total_ballots: vote.ballots.len() as u32,
                counts,
                closed_step: step,
            };
            self.closed_votes.push(outcome.clone());
            outcomes.push(outcome);
        }
        outcomes
    }

    /// All recorded vote outcomes.
    pub fn vote_outcomes(&self) -> &[VoteOutcome] {
        &self.closed_votes
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn goals_seed_deduplicated() {
        let mut coordinator = CooperationCoordinator::new();
        coordinator.seed_goals(["survive", "help others", "survive"].into_iter());
        assert_eq!(coordinator.shared_goals(), ["survive", "help others"]);
    }

    #[test]
    fn proposed_task_becomes_in_progress_on_first_assignee() {
        let mut coordinator = CooperationCoordinator::new();
        let agent = AgentId::new();
        let id = coordinator
            .propose_task(agent, String::from("clear the bridge"), 7, Vec::new(), 1)
            .expect("propose");
        assert_eq!(coordinator.task(id).expect("task").status, TaskStatus::Proposed);

        let other = AgentId::new();
        let task = coordinator.accept_task(other, id).expect("accept");
        assert_eq!(task.status, TaskStatus::InProgress);
        assert_eq!(task.assigned_agents, vec![other]);
    }

    #[test]
    fn priority_out_of_range_rejected() {
        let mut coordinator = CooperationCoordinator::new();
        assert!(coordinator
            .propose_task(AgentId::new(), String::from("x"), 0, Vec::new(), 1)
            .is_err());
        assert!(coordinator
            .propose_task(AgentId::new(), String::from("x"), 11, Vec::new(), 1)
            .is_err());
    }

    #[test]
    fn progress_100_completes_task() {
        let mut coordinator = CooperationCoordinator::new();
        let agent = AgentId::new();
        let id = coordinator
            .propose_task(agent, String::from("raft"), 5, Vec::new(), 1)
            .expect("propose");
        let _ = coordinator.accept_task(agent, id).expect("accept");
        let task = coordinator
            .report_progress(agent, id, 100, false, 3)
            .expect("progress");
        assert_eq!(task.status, TaskStatus::Completed);
        assert_eq!(task.completed_step, Some(3));

        // A completed task rejects further mutation.
        assert!(coordinator.report_progress(agent, id, 50, false, 4).is_err());
        assert!(coordinator.accept_task(agent, id).is_err());
    }

    #[test]
    fn explicit_completion_forces_progress_to_100() {
        let mut coordinator = CooperationCoordinator::new();
        let agent = AgentId::new();
        let id = coordinator
            .propose_task(agent, String::from("raft"), 5, Vec::new(), 1)
            .expect("propose");
        let task = coordinator
            .report_progress(agent, id, 40, true, 2)
            .expect("progress");
        assert_eq!(task.status, TaskStatus::Completed);
        assert_eq!(task.progress, 100);
    }

    #[test]
    fn open_tasks_sorted_by_priority() {
        let mut coordinator = CooperationCoordinator::new();
        let agent = AgentId::new();
        let _ = coordinator.propose_task(agent, String::from("low"), 2, Vec::new(), 1);
        let _ = coordinator.propose_task(agent, String::from("high"), 9, Vec::new(), 1);
        let open = coordinator.open_tasks();
        assert_eq!(open[0].description, "high");
    }

    #[test]
    fn vote_closes_after_one_tick_with_majority() {
        let mut coordinator = CooperationCoordinator::new();
        let (a, b, c) = (AgentId::new(), AgentId::new(), AgentId::new());
        let _ = coordinator
            .call_for_vote(
                a,
                String::from("move to the roof"),
                vec![String::from("yes"), String::from("no")],
                Some(String::from("yes")),
                1,
            )
            .expect("open");
        // Ballots cast during the next tick.
        let _ = coordinator.call_for_vote(
            b,
            String::from("move to the roof"),
            Vec::new(),
            Some(String::from("no")),
            2,
        );
        let _ = coordinator.call_for_vote(
            c,
            String::from("move to the roof"),
            Vec::new(),
            Some(String::from("yes")),
            2,
        );

        // Nothing closes at the end of the opening tick.
        assert!(coordinator.close_due_votes(1).is_empty());
        let outcomes = coordinator.close_due_votes(2);
        assert_eq!(outcomes.len(), 1);
        assert_eq!(outcomes[0].winner, "yes");
        assert_eq!(outcomes[0].total_ballots, 3);
        assert!(coordinator.open_votes().is_empty());
    }

    #[test]
    fn vote_tie_resolves_by_option_order() {
        let mut coordinator = CooperationCoordinator::new();
        let (a, b) = (AgentId::new(), AgentId::new());
        let _ = coordinator.call_for_vote(
            a,
            String::from("route"),
            vec![String::from("bridge"), String::from("tunnel")],
            Some(String::from("tunnel")),
            1,
        );
        let _ = coordinator.call_for_vote(
            b,
            String::from("route"),
            Vec::new(),
            Some(String::from("bridge")),
            2,
        );
        let outcomes = coordinator.close_due_votes(2);
        // 1-1 tie: "bridge" listed first wins.
        assert_eq!(outcomes[0].winner, "bridge");
    }

    #[test]
    fn empty_options_rejected() {
        let mut coordinator = CooperationCoordinator::new();
        assert!(coordinator
            .call_for_vote(AgentId::new(), String::from("x"), Vec::new(), None, 1)
            .is_err());
    }

    #[test]
    fn find_task_by_description_skips_completed() {
        let mut coordinator = CooperationCoordinator::new();
        let agent = AgentId::new();
        let id = coordinator
            .propose_task(agent, String::from("raft"), 5, Vec::new(), 1)
            .expect("propose");
        assert!(coordinator.find_task_by_description("raft").is_some());
        let _ = coordinator.report_progress(agent, id, 100, false, 2);
        assert!(coordinator.find_task_by_description("raft").is_none());
    }
}
