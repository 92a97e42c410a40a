//! Persona data for human agents.
//!
//! A persona is the static character sheet behind a human agent: who they
//! are, how the Big-Five traits shape them, and the behavioral modifiers
//! the engine consults (response probability, help disposition). All trait
//! values are floats in `[0.0, 1.0]`.

use serde::{Deserialize, Serialize};

/// Big-Five personality traits, each in `[0.0, 1.0]`.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct BigFive {
    /// Curiosity, creativity, openness to experience.
    pub openness: f64,
    /// Organization, dependability, self-discipline.
    pub conscientiousness: f64,
    /// Sociability, assertiveness; raises response probability.
    pub extraversion: f64,
    /// Cooperation, trust, altruism.
    pub agreeableness: f64,
    /// Emotional instability; suppresses responses under high stress.
    pub neuroticism: f64,
}

impl Default for BigFive {
    fn default() -> Self {
        Self {
            openness: 0.5,
            conscientiousness: 0.5,
            extraversion: 0.5,
            agreeableness: 0.5,
            neuroticism: 0.5,
        }
    }
}

/// Behavioral modifiers, each in `[0.0, 1.0]`.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct BehaviorModifiers {
    /// Willingness to take risks under pressure.
    pub risk_tolerance: f64,
    /// Tendency to help others in need.
    pub empathy: f64,
    /// Tendency to take charge in groups.
    pub leadership: f64,
    /// Flexibility when plans fail.
    pub adaptability: f64,
    /// How slowly stress accumulates.
    pub stress_resilience: f64,
}

impl Default for BehaviorModifiers {
    fn default() -> Self {
        Self {
            risk_tolerance: 0.5,
            empathy: 0.5,
            leadership: 0.5,
            adaptability: 0.5,
            stress_resilience: 0.5,
        }
    }
}

/// The character sheet for a human agent.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Persona {
    /// Age in years.
    pub age: u8,
    /// Self-described sex/gender.
    pub sex: String,
    /// Current or former occupation.
    pub occupation: String,
    /// Brief life history and relevant background.
    #[serde(default)]
    pub backstory: String,
    /// Big-Five trait values.
    #[serde(default)]
    pub traits: BigFive,
    /// Behavioral modifier values.
    #[serde(default)]
    pub modifiers: BehaviorModifiers,
    /// Notable skills and abilities.
    #[serde(default)]
    pub skills: Vec<String>,
}

impl Persona {
    /// Check that every trait and modifier lies within `[0.0, 1.0]`.
    pub fn traits_in_range(&self) -> bool {
        let t = &self.traits;
        let m = &self.modifiers;
        [
            t.openness,
            t.conscientiousness,
            t.extraversion,
            t.agreeableness,
            t.neuroticism,
            m.risk_tolerance,
            m.empathy,
            m.leadership,
            m.adaptability,
            m.stress_resilience,
        ]
        .iter()
        .all(|v| (0.0..=1.0).contains(v))
    }

    /// Render the persona as prose for a system prompt.
    ///
    /// Trait values are translated into adjectives only when they are
    /// pronounced (>= 0.7 or <= 0.3); middling values are left unsaid so
    /// the prompt stays short.
    pub fn describe(&self, name: &str) -> String {
        let mut traits = Vec::new();
        let t = &self.traits;
        let m = &self.modifiers;

        push_trait(&mut traits, t.openness, "curious and creative", "practical and conventional");
        push_trait(
            &mut traits,
            t.conscientiousness,
            "organized and dependable",
            "spontaneous and flexible",
        );
        push_trait(
            &mut traits,
            t.extraversion,
            "outgoing and assertive",
            "reserved and introspective",
        );
        push_trait(
            &mut traits,
            t.agreeableness,
            "cooperative and trusting",
            "competitive and skeptical",
        );
        push_trait(
            &mut traits,
            t.neuroticism,
            "emotionally sensitive and prone to anxiety",
            "emotionally stable and calm",
        );
        push_trait(
            &mut traits,
            m.risk_tolerance,
            "brave and willing to take risks",
            "cautious and risk-averse",
        );
        push_trait(&mut traits, m.empathy, "deeply empathetic", "focused on self-preservation");
        push_trait(&mut traits, m.leadership, "a natural leader", "preferring to follow others");

        let traits_str = if traits.is_empty() {
            String::from("a balanced personality")
        } else {
            traits.join(", ")
        };
        let skills_str = if self.skills.is_empty() {
            String::from("no special skills")
        } else {
            self.skills.join(", ")
        };
        let backstory = if self.backstory.is_empty() {
            "An ordinary person caught in extraordinary circumstances."
        } else {
            self.backstory.as_str()
        };

        format!(
            "You are {name}, a {age}-year-old {sex} {occupation}.\n\n\
             Personality: you are {traits_str}.\n\n\
             Background: {backstory}\n\n\
             Skills: {skills_str}",
            age = self.age,
            sex = self.sex,
            occupation = self.occupation,
        )
    }
}

/// Append the high or low adjective for a trait when it is pronounced.
fn push_trait(out: &mut Vec<&'static str>, value: f64, high: &'static str, low: &'static str) {
    if value >= 0.7 {
        out.push(high);
    } else if value <= 0.3 {
        out.push(low);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_persona() -> Persona {
        Persona {
            age: 34,
            sex: String::from("female"),
            occupation: String::from("paramedic"),
            backstory: String::from("Grew up near the river."),
            traits: BigFive {
                extraversion: 0.8,
                neuroticism: 0.2,
                ..BigFive::default()
            },
            modifiers: BehaviorModifiers {
                empathy: 0.9,
                ..BehaviorModifiers::default()
            },
            skills: vec![String::from("first aid")],
        }
    }

    #[test]
    fn default_traits_are_in_range() {
        let p = Persona {
            age: 30,
            sex: String::from("male"),
            occupation: String::from("teacher"),
            backstory: String::new(),
            traits: BigFive::default(),
            modifiers: BehaviorModifiers::default(),
            skills: Vec::new(),
        };
        assert!(p.traits_in_range());
    }

    #[test]
    fn out_of_range_trait_detected() {
        let mut p = sample_persona();
        p.traits.openness = 1.4;
        assert!(!p.traits_in_range());
    }

    #[test]
    fn describe_mentions_pronounced_traits_only() {
        let p = sample_persona();
        let text = p.describe("Mara");
        assert!(text.contains("Mara"));
        assert!(text.contains("outgoing and assertive"));
        assert!(text.contains("emotionally stable and calm"));
        assert!(text.contains("deeply empathetic"));
        // Middling openness is left unsaid.
        assert!(!text.contains("curious and creative"));
    }

    #[test]
    fn describe_falls_back_for_empty_backstory() {
        let mut p = sample_persona();
        p.backstory = String::new();
        let text = p.describe("Mara");
        assert!(text.contains("ordinary person"));
    }
}
