//! crates/adaptive_tutor_core/src/prompts.rs
//!
//! Prompt templates for the generation, enrichment and chat calls.
//! The material itself is never part of these texts; it travels as the call's context.

use crate::domain::{ChatMessage, EnrichmentRecord, LearnerProfile, Plan, RegenerationMode, Slide};

const PLAN_TEMPLATE: &str = r#"Design a personalized course over the TRAINING MATERIAL for the learner below.

LEARNER:
{profile}

Split the course into modules, each module into submodules, and each submodule into slides.
Give titles only, in teaching order. Do not write slide content.
Write every title in the learner's language."#;

const SLIDE_TEMPLATE: &str = r#"Write the content of one slide of a personalized course over the TRAINING MATERIAL.

LEARNER:
{profile}

OBSERVED SO FAR:
{enriched}

COURSE POSITION:
Module: {module}
Submodule: {submodule}
Slide {position} of {total}: {title}

Write the slide body in Markdown, in the learner's language, adapted to their level and job.
Stay within the scope of this slide title.{mode}"#;

const SIMPLIFY_INSTRUCTIONS: &str = r#"

The learner found the previous version too hard. Rewrite it more simply, with a concrete example:
{previous}"#;

const DEEPEN_INSTRUCTIONS: &str = r#"

The learner wants to go further. Rewrite it with more depth and nuance:
{previous}"#;

const INSIGHT_TEMPLATE: &str = r#"Analyze the latest exchange between a learner and their tutor.

LEARNER:
{profile}

CURRENT KNOWLEDGE ABOUT THE LEARNER:
{enriched}

EXCHANGE:
Learner: {question}
Tutor: {answer}

Extract only what this exchange shows: the learning style you observe, their comprehension level,
topics they are interested in, what blocks them, their objectives and how they engage.
Use empty arrays and nulls for anything the exchange does not show."#;

const CHAT_GROUNDING_TEMPLATE: &str = r#"You are a patient tutor answering questions about the TRAINING MATERIAL.

LEARNER:
{profile}

OBSERVED SO FAR:
{enriched}

CURRENT SLIDE ({title}):
{content}

Answer in the learner's language, briefly, at their level. Relate answers to the current slide when you can."#;

pub fn describe_profile(profile: &LearnerProfile) -> String {
    format!(
        "Level: {}\nLearning style: {}\nJob: {}\nSector: {}\nCountry: {}\nLanguage: {}",
        profile.level,
        profile.learning_style,
        profile.job,
        profile.sector,
        profile.country,
        profile.language
    )
}

pub fn describe_enrichment(record: &EnrichmentRecord) -> String {
    if record.enrichment_history.total_enrichments == 0 {
        return "Nothing yet.".to_string();
    }
    let mut lines = Vec::new();
    if let Some(style) = &record.learning_style_observed {
        lines.push(format!("Observed learning style: {}", style));
    }
    if let Some(level) = &record.comprehension_level {
        lines.push(format!("Comprehension: {}", level));
    }
    if !record.interests.is_empty() {
        lines.push(format!("Interests: {}", record.interests.join(", ")));
    }
    if !record.blockers.is_empty() {
        lines.push(format!("Blockers: {}", record.blockers.join(", ")));
    }
    if let Some(objectives) = &record.objectives {
        lines.push(format!("Objectives: {}", objectives));
    }
    if let Some(engagement) = &record.engagement_patterns {
        lines.push(format!("Engagement: {}", engagement));
    }
    lines.join("\n")
}

pub fn plan_prompt(profile: &LearnerProfile) -> String {
    PLAN_TEMPLATE.replace("{profile}", &describe_profile(profile))
}

pub fn slide_prompt(
    plan: &Plan,
    slide: &Slide,
    profile: &LearnerProfile,
    enriched: &EnrichmentRecord,
    mode: Option<RegenerationMode>,
) -> String {
    let module = plan.modules.get(slide.module_index);
    let submodule = module.and_then(|m| m.submodules.get(slide.submodule_index));
    let previous = slide.content.as_deref().unwrap_or_default();
    let mode_text = match mode {
        Some(RegenerationMode::Simplify) => SIMPLIFY_INSTRUCTIONS.replace("{previous}", previous),
        Some(RegenerationMode::Deepen) => DEEPEN_INSTRUCTIONS.replace("{previous}", previous),
        None => String::new(),
    };

    SLIDE_TEMPLATE
        .replace("{profile}", &describe_profile(profile))
        .replace("{enriched}", &describe_enrichment(enriched))
        .replace("{module}", module.map(|m| m.title.as_str()).unwrap_or_default())
        .replace("{submodule}", submodule.map(|s| s.title.as_str()).unwrap_or_default())
        .replace("{position}", &(slide.index + 1).to_string())
        .replace("{total}", &plan.slides.len().to_string())
        .replace("{title}", &slide.title)
        .replace("{mode}", &mode_text)
}

pub fn insight_prompt(
    profile: &LearnerProfile,
    enriched: &EnrichmentRecord,
    question: &str,
    answer: &str,
) -> String {
    INSIGHT_TEMPLATE
        .replace("{profile}", &describe_profile(profile))
        .replace("{enriched}", &describe_enrichment(enriched))
        .replace("{question}", question)
        .replace("{answer}", answer)
}

pub fn chat_grounding(profile: &LearnerProfile, enriched: &EnrichmentRecord, slide: Option<&Slide>) -> String {
    let (title, content) = match slide {
        Some(s) => (s.title.as_str(), s.content.as_deref().unwrap_or("(not generated yet)")),
        None => ("none", "(no slide displayed)"),
    };
    CHAT_GROUNDING_TEMPLATE
        .replace("{profile}", &describe_profile(profile))
        .replace("{enriched}", &describe_enrichment(enriched))
        .replace("{title}", title)
        .replace("{content}", content)
}

/// Renders prior turns for backends that take history as plain text.
pub fn transcript(history: &[ChatMessage]) -> String {
    history
        .iter()
        .map(|m| format!("{}: {}", m.role.as_str(), m.text))
        .collect::<Vec<_>>()
        .join("\n")
}
