//! Response probability for human agents.
//!
//! Before the oracle is invoked, a human agent draws against a
//! personality-derived probability and may simply skip the tick. The
//! formula:
//!
//! ```text
//! p = 0.35 + 0.55 * extraversion
//!          + 0.15 * activity
//!          - 0.30 * neuroticism   (only while stress >= 7)
//! ```
//!
//! clamped to `[0.05, 1.0]`, where `activity` is 1.0 when the tick has
//! events, pending messages, or co-located company, else 0.0.
//! Extraversion raises the probability monotonically; high neuroticism
//! suppresses it only under high stress. The floor keeps even the most
//! withdrawn agent occasionally responsive; a maximally extraverted agent
//! in an active scene always responds.

use rand::rngs::SmallRng;
use rand::Rng;

use emosim_types::Persona;

/// Stress level at which neuroticism starts suppressing responses.
const HIGH_STRESS: f64 = 7.0;

/// Probability floor.
const P_MIN: f64 = 0.05;

/// Probability ceiling.
const P_MAX: f64 = 1.0;

/// Signals about the current tick that make a response more likely.
#[derive(Debug, Clone, Copy, Default)]
pub struct ActivitySignals {
    /// Step events occurred this tick.
    pub has_events: bool,
    /// The agent has pending messages.
    pub has_messages: bool,
    /// Other agents share the location.
    pub has_company: bool,
}

impl ActivitySignals {
    /// Whether anything is going on around the agent.
    pub const fn any(self) -> bool {
        self.has_events || self.has_messages || self.has_company
    }
}

/// Compute the response probability for a human agent.
pub fn response_probability(persona: &Persona, stress: f64, signals: ActivitySignals) -> f64 {
    let activity = if signals.any() { 1.0 } else { 0.0 };
    let mut p = 0.35 + 0.55 * persona.traits.extraversion + 0.15 * activity;
    if stress >= HIGH_STRESS {
        p -= 0.30 * persona.traits.neuroticism;
    }
    p.clamp(P_MIN, P_MAX)
}

/// Draw against the response probability with the run's seeded RNG.
pub fn should_respond(
    persona: &Persona,
    stress: f64,
    signals: ActivitySignals,
    rng: &mut SmallRng,
) -> bool {
    let p = response_probability(persona, stress, signals);
    rng.random::<f64>() < p
}
