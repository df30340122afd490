//! Classifier / Planner (§4.5): one LLM call per turn to route the message,
//! and a second call — only for `COMPLEX` turns with tools in scope — that
//! breaks the request into a short numbered plan.

use std::sync::Arc;

use crate::llm::{ChatMessage, LlmProvider, ModelParams};
use crate::types::{Classification, Complexity, PlanStep, Result, ToolDescriptor, GENERAL_INTENT};

const CLASSIFIER_MODEL_PARAMS: ModelParams = ModelParams { temperature: Some(0.0), max_tokens: Some(20), top_p: None };
const PLANNER_MODEL_PARAMS: ModelParams = ModelParams { temperature: Some(0.2), max_tokens: Some(300), top_p: None };

pub struct Classifier {
    provider: Arc<dyn LlmProvider>,
    model: String,
}

impl Classifier {
    pub fn new(provider: Arc<dyn LlmProvider>, model: impl Into<String>) -> Self {
        Self { provider, model: model.into() }
    }

    /// Classifies the turn's intent and complexity. Bypassed entirely (no
    /// LLM call) when the turn carries a media attachment — those always
    /// route as `(GENERAL, SIMPLE)`.
    pub async fn classify(&self, user_text: &str, categories: &[String], has_attachment: bool) -> Result<Classification> {
        if has_attachment {
            return Ok(Classification::default());
        }

        let prompt = build_classifier_prompt(categories);
        let messages = vec![ChatMessage::system(prompt), ChatMessage::user(user_text)];
        let response = self
            .provider
            .complete(&messages, &self.model, &CLASSIFIER_MODEL_PARAMS, None)
            .await?;

        Ok(parse_classification(&response.message.content, categories))
    }
}

pub struct Planner {
    provider: Arc<dyn LlmProvider>,
    model: String,
}

impl Planner {
    pub fn new(provider: Arc<dyn LlmProvider>, model: impl Into<String>) -> Self {
        Self { provider, model: model.into() }
    }

    /// Produces a short plan for a `COMPLEX` turn. Callers should only
    /// invoke this when tools are actually in scope for the turn — an
    /// empty `tools` list should instead downgrade complexity to `SIMPLE`
    /// before ever reaching the planner.
    pub async fn plan(&self, user_text: &str, tools: &[ToolDescriptor]) -> Result<Vec<PlanStep>> {
        let tool_list: Vec<String> = tools.iter().map(|t| format!("- {}: {}", t.name, t.description)).collect();
        let system_prompt = format!(
            "Break the user's request into a numbered list of 3 to 6 concrete steps. \
             Available tools:\n{}\n\nRespond with ONLY the numbered list, one step per line.",
            tool_list.join("\n")
        );
        let messages = vec![ChatMessage::system(system_prompt), ChatMessage::user(user_text)];
        let response = self
            .provider
            .complete(&messages, &self.model, &PLANNER_MODEL_PARAMS, None)
            .await?;

        Ok(parse_plan(&response.message.content))
    }
}

fn build_classifier_prompt(categories: &[String]) -> String {
    let category_list = if categories.is_empty() {
        "- GENERAL: anything not covered by a more specific category".to_string()
    } else {
        categories.iter().map(|c| format!("- {c}")).collect::<Vec<_>>().join("\n")
    };
    format!(
        "You are a routing classifier. Given the user's message, determine its intent \
         category and complexity.\n\nCategories:\n{category_list}\n\n\
         SIMPLE: answerable directly, in one step, with at most one tool call.\n\
         COMPLEX: requires multiple steps, multiple tool calls, or research.\n\n\
         Respond with exactly two lines:\nINTENT: <CATEGORY>\nCOMPLEXITY: <SIMPLE|COMPLEX>"
    )
}

/// Forgiving two-line parse: scans each line independently for its key,
/// then for a category token within it. Category matching prefers the
/// longest known category name first, so `FILESYSTEM` wins over a `FILE`
/// substring match.
fn parse_classification(text: &str, categories: &[String]) -> Classification {
    let mut sorted_categories: Vec<&String> = categories.iter().collect();
    sorted_categories.sort_by_key(|c| std::cmp::Reverse(c.len()));

    let mut intent = None;
    let mut complexity = None;

    for line in text.lines() {
        let upper = line.to_ascii_uppercase();
        if intent.is_none() && upper.contains("INTENT") {
            intent = sorted_categories.iter().find(|c| upper.contains(c.as_str())).map(|c| (*c).clone());
        }
        if complexity.is_none() && upper.contains("COMPLEXITY") {
            if upper.contains("COMPLEX") && !upper.contains("SIMPLE") {
                complexity = Some(Complexity::Complex);
            } else if upper.contains("SIMPLE") {
                complexity = Some(Complexity::Simple);
            }
        }
    }

    Classification {
        intent: intent.unwrap_or_else(|| GENERAL_INTENT.to_string()),
        complexity: complexity.unwrap_or(Complexity::Simple),
    }
}

/// Strips leading numbering (`"1. "`, `"1) "`, `"10. "`) from each non-empty
/// line. Falls back to a single synthetic step on empty output.
fn parse_plan(text: &str) -> Vec<PlanStep> {
    let steps: Vec<PlanStep> = text
        .lines()
        .map(str::trim)
        .filter(|line| !line.is_empty())
        .map(strip_numbering)
        .filter(|line| !line.is_empty())
        .enumerate()
        .map(|(index, description)| PlanStep { index, description })
        .collect();

    if steps.is_empty() {
        vec![PlanStep { index: 0, description: "Analyze the request and provide a comprehensive answer".to_string() }]
    } else {
        steps
    }
}

fn strip_numbering(line: &str) -> String {
    let trimmed = line.trim_start();
    let digits_end = trimmed.find(|c: char| !c.is_ascii_digit()).unwrap_or(0);
    if digits_end == 0 {
        return trimmed.to_string();
    }
    let rest = &trimmed[digits_end..];
    match rest.strip_prefix(". ").or_else(|| rest.strip_prefix(") ")).or_else(|| rest.strip_prefix('.')).or_else(|| rest.strip_prefix(')')) {
        Some(stripped) => stripped.trim_start().to_string(),
        None => trimmed.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_classification_prefers_longer_category_match() {
        let categories = vec!["FILE".to_string(), "FILESYSTEM".to_string()];
        let text = "INTENT: FILESYSTEM\nCOMPLEXITY: SIMPLE";
        let result = parse_classification(text, &categories);
        assert_eq!(result.intent, "FILESYSTEM");
        assert_eq!(result.complexity, Complexity::Simple);
    }

    #[test]
    fn parse_classification_defaults_on_no_match() {
        let result = parse_classification("garbage output", &[]);
        assert_eq!(result.intent, GENERAL_INTENT);
        assert_eq!(result.complexity, Complexity::Simple);
    }

    #[test]
    fn parse_classification_detects_complex() {
        let result = parse_classification("INTENT: GENERAL\nCOMPLEXITY: COMPLEX", &["GENERAL".to_string()]);
        assert_eq!(result.complexity, Complexity::Complex);
    }

    #[test]
    fn parse_plan_strips_numbering_variants() {
        let text = "1. Search for the file\n2) Read its contents\n10. Summarize findings";
        let steps = parse_plan(text);
        assert_eq!(steps.len(), 3);
        assert_eq!(steps[0].description, "Search for the file");
        assert_eq!(steps[1].description, "Read its contents");
        assert_eq!(steps[2].description, "Summarize findings");
    }

    #[test]
    fn parse_plan_falls_back_on_empty_output() {
        let steps = parse_plan("   \n\n");
        assert_eq!(steps.len(), 1);
        assert_eq!(steps[0].index, 0);
    }
}
