//! Prompt construction for the three extraction passes.
//!
//! Each pass gets one prompt: a lens-specific preamble, the category guide
//! for the categories it owns, prior-session context when available, the
//! turn-indexed transcript, and the shared output contract. The contract is
//! strict about citations because the grounding validator downstream rejects
//! anything it cannot find verbatim in the transcript.

use crate::db::migrations::PROMPT_VERSION;
use crate::registry::{Category, Pass};

/// Build the full prompt for one pass over one session.
pub fn build_prompt(
    pass: Pass,
    subject_name: &str,
    transcript: &str,
    prior_context: Option<&str>,
) -> String {
    let mut prompt = String::new();

    prompt.push_str(&preamble(pass, subject_name));
    prompt.push_str("\n\n## Categories\n\n");
    prompt.push_str("Capture entries ONLY in these categories:\n\n");
    for category in pass.categories() {
        prompt.push_str(&format!(
            "- `{}`: {}\n",
            category.as_str(),
            category_guide(category)
        ));
    }

    if let Some(prior) = prior_context {
        prompt.push_str(
            "\n## Already known\n\n\
             Entries captured in earlier sessions, by category. When this \
             session mentions one of these again, reuse its exact title so \
             the records converge:\n\n",
        );
        prompt.push_str(prior);
    }

    prompt.push_str("\n## Transcript\n\n");
    prompt.push_str(
        "Each turn is prefixed with its index in square brackets. \
         Cite turns by that index.\n\n",
    );
    prompt.push_str(transcript);

    prompt.push_str(&output_contract(pass));
    prompt
}

fn preamble(pass: Pass, subject_name: &str) -> String {
    match pass {
        Pass::Factual => format!(
            "You are building a biographical record of {subject_name} from an \
             interview transcript. This pass captures FACTS: people, events, \
             stories, skills, preferences, and creative works. Err toward \
             over-capture; a reviewer prunes later, but a missed fact is gone. \
             Record what was actually said, not what it might mean. \
             (protocol {PROMPT_VERSION})"
        ),
        Pass::Emotional => format!(
            "You are mapping the emotional landscape of {subject_name} from an \
             interview transcript. This pass captures FEELINGS: joys, sorrows, \
             fears, loves, losses, and the sensory memories that carry them. \
             Every entry must be anchored to a statement where the subject \
             expresses or clearly evidences the feeling. Do not derive an \
             emotion from a neutral fact; if the transcript carries no affect \
             for it, skip it. (protocol {PROMPT_VERSION})"
        ),
        Pass::Analytical => format!(
            "You are analyzing how {subject_name} thinks, from an interview \
             transcript. This pass captures PATTERNS: reasoning habits, values, \
             contradictions, wisdom, and self-models. Each entry is two-tiered: \
             the citation quotes what the subject actually said, and the \
             `interpretation` field carries your inference, clearly separated \
             from the evidence. Never put interpretation in the quote. \
             (protocol {PROMPT_VERSION})"
        ),
    }
}

fn output_contract(pass: Pass) -> String {
    let interpretation_rule = match pass {
        Pass::Analytical => {
            "- `interpretation` is REQUIRED: your inferential reading, kept out of the quote.\n"
        }
        _ => "- `interpretation` is optional and rarely needed in this pass.\n",
    };

    format!(
        "\n\n## Output\n\n\
         Respond with a single JSON object, no prose around it:\n\n\
         ```json\n\
         {{\n\
         \x20 \"entries\": [\n\
         \x20   {{\n\
         \x20     \"category\": \"<one of the categories above>\",\n\
         \x20     \"title\": \"<short stable name for this entry>\",\n\
         \x20     \"fields\": {{ \"<field>\": \"<value>\" }},\n\
         \x20     \"evidence_type\": \"direct_statement | paraphrase | inference | behavioral_observation\",\n\
         \x20     \"interpretation\": null,\n\
         \x20     \"citations\": [ {{ \"turn\": 3, \"quote\": \"<verbatim words from that turn>\" }} ]\n\
         \x20   }}\n\
         \x20 ],\n\
         \x20 \"connections\": [\n\
         \x20   {{ \"from_title\": \"<entry title>\", \"to_title\": \"<entry title>\", \"kind\": \"caused_by\",\n\
         \x20     \"citation\": {{ \"turn\": 3, \"quote\": \"<verbatim words>\" }} }}\n\
         \x20 ]\n\
         }}\n\
         ```\n\n\
         Rules:\n\
         - Every entry needs at least one citation. The quote must appear \
         word-for-word in the cited turn. No quote, no entry.\n\
         - `turn` is the bracketed index of the turn the quote comes from.\n\
         {interpretation_rule}\
         - `connections` link entries from THIS response by their titles. \
         Include a citation when the subject stated the link; omit it when \
         the link is your inference.\n\
         - When unsure whether something qualifies, include it with \
         `evidence_type` set honestly.\n"
    )
}

/// One-line capture guide per category, shown in the prompt.
fn category_guide(category: Category) -> &'static str {
    use Category::*;
    match category {
        Relationships => "a person in the subject's life; fields: person_name, relation, current_status, emotional_tone",
        LifeEvents => "a discrete event or era; fields: title, time_period, location, outcome",
        Stories => "a narrated anecdote worth retelling; fields: title, point_or_lesson, time_period",
        Preferences => "a like, dislike, or habit; fields: preference, strength, domain",
        SelfKnowledge => "something the subject states about who they are; fields: insight",
        Skills => "an ability or craft; fields: skill_name, proficiency, how_learned, last_used",
        CreativeWorks => "something the subject made; fields: title, medium, current_status, reception",
        Joys => "a source of delight; fields: title, what_it_feels_like",
        Sorrows => "a grief or sadness; fields: title, how_processed",
        Wounds => "a hurt that left a mark; fields: title, healing_status",
        Fears => "a fear, named or evident; fields: fear, behavioral_response",
        Loves => "a deep attachment; fields: what_or_who, current_status",
        Losses => "something or someone lost; fields: what_was_lost, how_carried_now",
        Regrets => "a regret; fields: title, peace_made",
        Longings => "an unfulfilled yearning; fields: what_is_longed_for, achievability",
        Healings => "recovery or repair the subject describes; fields: title, current_state",
        SensoryMemories => "a memory carried in the senses; fields: title, modality, associated_feeling",
        Decisions => "a consequential choice; fields: title, time_period, outcome, would_change",
        Mistakes => "an acknowledged mistake; fields: title, lesson_stuck",
        ReasoningPatterns => "a recurring way of thinking through problems; fields: pattern_name, confidence",
        Strengths => "a self-attributed or evident strength; fields: strength",
        Vulnerabilities => "a weakness or soft spot; fields: vulnerability, how_managed",
        CognitiveBiases => "a bias visible in how they reason; fields: bias_name, awareness_level",
        Contradictions => "a tension between stated beliefs or belief and behavior; fields: tension, resolution_attempts",
        Wisdom => "hard-won general insight; fields: insight, when_applicable",
        ValueHierarchies => "what they value over what; fields: value, rank",
        MeaningStructures => "where meaning comes from for them; fields: source_of_meaning",
        Philosophies => "a stated belief about how life or the world works; fields: belief",
        MortalityAwareness => "how finitude shapes them; fields: insight, impact_on_priorities",
        Aspirations => "something they still want to do or become; fields: title, urgency, achievability",
        Questions => "a question they are still living with; fields: question, current_thinking",
        Growth => "a change in themselves they describe; fields: title, ongoing",
        BodyKnowledge => "what they know through or about their body; fields: insight",
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn prompt_contains_only_owned_categories() {
        let prompt = build_prompt(Pass::Emotional, "Margaret", "[0] subject: hi\n", None);
        assert!(prompt.contains("`sorrows`"));
        assert!(prompt.contains("`sensory_memories`"));
        // factual and analytical categories stay out
        assert!(!prompt.contains("`relationships`"));
        assert!(!prompt.contains("`decisions`"));
    }

    #[test]
    fn prior_context_section_is_optional() {
        let without = build_prompt(Pass::Factual, "M", "[0] subject: hi\n", None);
        assert!(!without.contains("## Already known"));

        let with = build_prompt(
            Pass::Factual,
            "M",
            "[0] subject: hi\n",
            Some("relationships: Father\n"),
        );
        assert!(with.contains("## Already known"));
        assert!(with.contains("relationships: Father"));
    }

    #[test]
    fn analytical_prompt_requires_interpretation() {
        let prompt = build_prompt(Pass::Analytical, "M", "[0] subject: hi\n", None);
        assert!(prompt.contains("`interpretation` is REQUIRED"));
    }

    #[test]
    fn prompt_carries_protocol_version() {
        for pass in Pass::ALL {
            let prompt = build_prompt(pass, "M", "", None);
            assert!(prompt.contains(PROMPT_VERSION));
        }
    }
}
