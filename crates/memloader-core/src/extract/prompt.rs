//! Extraction prompts.

use serde::{Deserialize, Serialize};

use crate::types::MemoryCategory;

/// System message sent to chat-style models.
pub const SYSTEM_PROMPT: &str =
    "You are an expert at extracting personal memories and preferences from conversations. Always return valid JSON.";

/// Shape of the output the model is asked to produce.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PromptStyle {
    /// `{"memories": [...]}` object template. Suits template-following
    /// extraction models and OpenAI chat models.
    #[default]
    Template,
    /// Bare JSON array. Suits small general-purpose models.
    JsonArray,
}

impl PromptStyle {
    /// Style that works best for a given Ollama model name.
    pub fn for_model(model: &str) -> Self {
        if model.to_lowercase().starts_with("nuextract") {
            PromptStyle::Template
        } else {
            PromptStyle::JsonArray
        }
    }
}

fn category_list(separator: &str) -> String {
    MemoryCategory::ALL
        .iter()
        .map(MemoryCategory::as_str)
        .collect::<Vec<_>>()
        .join(separator)
}

/// Build the extraction prompt for one chunk.
pub fn build_prompt(style: PromptStyle, title: &str, text: &str) -> String {
    match style {
        PromptStyle::Template => template_prompt(title, text),
        PromptStyle::JsonArray => array_prompt(title, text),
    }
}

fn template_prompt(title: &str, text: &str) -> String {
    let template = serde_json::json!({
        "memories": [{
            "content": "The extracted memory content",
            "category": format!("One of: {}", category_list(", ")),
            "confidence": "Float between 0 and 1",
            "reasoning": "Why this is considered a memory",
        }]
    });
    let template = serde_json::to_string_pretty(&template).unwrap_or_default();

    format!(
        r#"Extract personal memories, preferences, and contextual information from this conversation.

Context: {title}

Text:
{text}

Focus on:
- User preferences and habits
- Important personal details
- Recurring topics/interests
- Problem-solving patterns
- Decision-making criteria
- Skills and expertise areas
- Goal statements
- Relationship information

Return only memories that are:
1. Personal to the user (not general facts)
2. Likely to be useful for future conversations
3. Specific and actionable

Use this JSON template:
{template}

Extract memories:"#
    )
}

fn array_prompt(title: &str, text: &str) -> String {
    let categories = category_list("/");
    format!(
        r#"Extract personal memories from this conversation text.

Context: {title}

Text:
{text}

Extract memories that are:
- Personal preferences or habits
- Important facts about the user
- Behavioral patterns
- Goals and aspirations
- Skills and expertise
- Relationship information
- Decision-making criteria

For each memory, provide:
1. Memory content (what to remember)
2. Category ({categories})
3. Confidence (0-1, how confident are you this is worth remembering)
4. Brief reasoning

Format as JSON array:
[
  {{
    "content": "memory content here",
    "category": "category here",
    "confidence": 0.9,
    "reasoning": "why this is important"
  }}
]

Memories:"#
    )
}
