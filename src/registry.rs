//! Closed category registry.
//!
//! Every entity belongs to exactly one of 33 fixed categories, and every category
//! is owned by exactly one extraction pass. The one-pass-per-category rule is what
//! prevents the same fact from being extracted twice under different lenses, so the
//! registry is a compile-time enum rather than runtime-mutable tables — adding a
//! category is a code change plus a schema migration.

use serde::{Deserialize, Serialize};

/// The three extraction passes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Pass {
    /// People, events, stories, skills, creative works. Errs toward over-capture.
    Factual,
    /// Joys, sorrows, fears, sensory memories. Requires affect-anchored citations.
    Emotional,
    /// Reasoning patterns, values, wisdom, contradictions. Two-tiered:
    /// factual citation plus an interpretation layer tagged as such.
    Analytical,
}

impl Pass {
    pub const ALL: [Pass; 3] = [Pass::Factual, Pass::Emotional, Pass::Analytical];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Factual => "factual",
            Self::Emotional => "emotional",
            Self::Analytical => "analytical",
        }
    }

    /// All categories owned by this pass.
    pub fn categories(&self) -> Vec<Category> {
        Category::ALL
            .iter()
            .copied()
            .filter(|c| c.pass() == *self)
            .collect()
    }
}

impl std::fmt::Display for Pass {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for Pass {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "factual" => Ok(Self::Factual),
            "emotional" => Ok(Self::Emotional),
            "analytical" => Ok(Self::Analytical),
            _ => Err(format!("unknown pass: {s}")),
        }
    }
}

/// How a claim is anchored to the transcript.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EvidenceKind {
    /// The subject said this in these or very similar words.
    DirectStatement,
    /// Restated for clarity; close to what was said.
    Paraphrase,
    /// Concluded from what was said, not stated directly.
    Inference,
    /// Something about the subject's manner during the session.
    BehavioralObservation,
}

impl EvidenceKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::DirectStatement => "direct_statement",
            Self::Paraphrase => "paraphrase",
            Self::Inference => "inference",
            Self::BehavioralObservation => "behavioral_observation",
        }
    }
}

impl std::fmt::Display for EvidenceKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for EvidenceKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "direct_statement" => Ok(Self::DirectStatement),
            "paraphrase" => Ok(Self::Paraphrase),
            "inference" => Ok(Self::Inference),
            "behavioral_observation" => Ok(Self::BehavioralObservation),
            _ => Err(format!("unknown evidence kind: {s}")),
        }
    }
}

macro_rules! categories {
    ($( $variant:ident => ($name:literal, $pass:ident, $keys:expr, $refinable:expr) ),+ $(,)?) => {
        /// Category tag for one extracted unit of meaning.
        #[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
        #[serde(rename_all = "snake_case")]
        pub enum Category {
            $( $variant, )+
        }

        impl Category {
            pub const ALL: &'static [Category] = &[ $( Category::$variant, )+ ];

            pub fn as_str(&self) -> &'static str {
                match self {
                    $( Self::$variant => $name, )+
                }
            }

            /// The single pass that may produce candidates for this category.
            pub fn pass(&self) -> Pass {
                match self {
                    $( Self::$variant => Pass::$pass, )+
                }
            }

            /// Fields compared (together with the title) when scoring merge
            /// similarity against existing entities of this category.
            pub fn merge_key_fields(&self) -> &'static [&'static str] {
                match self {
                    $( Self::$variant => $keys, )+
                }
            }

            /// Fields a later session may overwrite as a strict refinement.
            /// Any other conflicting field forces supersession instead.
            pub fn refinable_fields(&self) -> &'static [&'static str] {
                match self {
                    $( Self::$variant => $refinable, )+
                }
            }
        }

        impl std::str::FromStr for Category {
            type Err = String;

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                match s {
                    $( $name => Ok(Self::$variant), )+
                    _ => Err(format!("unknown category: {s}")),
                }
            }
        }
    };
}

categories! {
    // Factual pass — facts, events, people, stories, concrete knowledge.
    Relationships   => ("relationships",   Factual,   &["person_name"], &["current_status", "emotional_tone"]),
    LifeEvents      => ("life_events",     Factual,   &["title", "time_period"], &["outcome", "date_end"]),
    Stories         => ("stories",         Factual,   &["title"], &["point_or_lesson"]),
    Preferences     => ("preferences",     Factual,   &["preference"], &["strength"]),
    SelfKnowledge   => ("self_knowledge",  Factual,   &["insight"], &[]),
    Skills          => ("skills",          Factual,   &["skill_name"], &["proficiency", "last_used"]),
    CreativeWorks   => ("creative_works",  Factual,   &["title", "medium"], &["current_status", "reception"]),

    // Emotional pass — the affective landscape, experientially anchored.
    Joys            => ("joys",            Emotional, &["title"], &[]),
    Sorrows         => ("sorrows",         Emotional, &["title"], &["how_processed"]),
    Wounds          => ("wounds",          Emotional, &["title"], &["healing_status"]),
    Fears           => ("fears",           Emotional, &["fear"], &["behavioral_response"]),
    Loves           => ("loves",           Emotional, &["what_or_who"], &["current_status"]),
    Losses          => ("losses",          Emotional, &["what_was_lost"], &["how_carried_now"]),
    Regrets         => ("regrets",         Emotional, &["title"], &["peace_made"]),
    Longings        => ("longings",        Emotional, &["what_is_longed_for"], &["achievability"]),
    Healings        => ("healings",        Emotional, &["title"], &["current_state"]),
    SensoryMemories => ("sensory_memories", Emotional, &["title", "modality"], &[]),

    // Analytical pass — cognitive architecture, values, meaning.
    Decisions          => ("decisions",          Analytical, &["title", "time_period"], &["outcome", "would_change"]),
    Mistakes           => ("mistakes",           Analytical, &["title"], &["lesson_stuck"]),
    ReasoningPatterns  => ("reasoning_patterns", Analytical, &["pattern_name"], &["confidence"]),
    Strengths          => ("strengths",          Analytical, &["strength"], &[]),
    Vulnerabilities    => ("vulnerabilities",    Analytical, &["vulnerability"], &["how_managed"]),
    CognitiveBiases    => ("cognitive_biases",   Analytical, &["bias_name"], &["awareness_level"]),
    Contradictions     => ("contradictions",     Analytical, &["tension"], &["resolution_attempts"]),
    Wisdom             => ("wisdom",             Analytical, &["insight"], &["when_applicable"]),
    ValueHierarchies   => ("value_hierarchies",  Analytical, &["value"], &["rank"]),
    MeaningStructures  => ("meaning_structures", Analytical, &["source_of_meaning"], &[]),
    Philosophies       => ("philosophies",       Analytical, &["belief"], &[]),
    MortalityAwareness => ("mortality_awareness", Analytical, &["insight"], &["impact_on_priorities"]),
    Aspirations        => ("aspirations",        Analytical, &["title"], &["urgency", "achievability"]),
    Questions          => ("questions",          Analytical, &["question"], &["current_thinking"]),
    Growth             => ("growth",             Analytical, &["title"], &["ongoing"]),
    BodyKnowledge      => ("body_knowledge",     Analytical, &["insight"], &[]),
}

impl std::fmt::Display for Category {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}
