//! Tool selection per task
//!
//! Large operation sets overwhelm small models. A [`ToolSelector`] decides
//! which tools a task is offered.

use super::task::EvaluationTask;
use crate::llm::ToolDefinition;

/// Picks the tools offered for a task
pub trait ToolSelector: Send + Sync {
    fn select(&self, task: &EvaluationTask, tools: &[ToolDefinition]) -> Vec<ToolDefinition>;
}

/// Offers every tool
#[derive(Debug, Clone, Copy, Default)]
pub struct AllTools;

impl ToolSelector for AllTools {
    fn select(&self, _task: &EvaluationTask, tools: &[ToolDefinition]) -> Vec<ToolDefinition> {
        tools.to_vec()
    }
}

/// Ranks tools by keyword overlap with the prompt and keeps the best
///
/// Tools scoring below the threshold are dropped. When nothing scores, all
/// tools (up to the cap) are offered rather than none.
#[derive(Debug, Clone)]
pub struct KeywordToolSelector {
    max_tools: usize,
    threshold: f32,
}

impl KeywordToolSelector {
    pub fn new(max_tools: usize) -> Self {
        Self {
            max_tools: max_tools.max(1),
            threshold: 0.1,
        }
    }

    pub fn with_threshold(mut self, threshold: f32) -> Self {
        self.threshold = threshold;
        self
    }

    /// Relevance of `tool` to `prompt` (0.0 to 1.0)
    pub fn score(&self, prompt: &str, tool: &ToolDefinition) -> f32 {
        let prompt_lower = prompt.to_lowercase();
        let name_words = split_identifier(&tool.name);
        let description = tool.description.to_lowercase();

        // Whole tool name mentioned
        if prompt_lower.contains(&tool.name.to_lowercase()) {
            return 1.0;
        }

        let words: Vec<&str> = prompt_lower
            .split(|c: char| !c.is_alphanumeric())
            .filter(|w| w.len() > 2)
            .collect();
        if words.is_empty() {
            return 0.0;
        }

        let mut score = 0.0f32;
        let name_hits = words
            .iter()
            .filter(|w| name_words.iter().any(|n| stem_match(n, w)))
            .count();
        if name_hits > 0 {
            score = score.max(0.5 + 0.4 * (name_hits as f32 / name_words.len().max(1) as f32).min(1.0));
        }

        let desc_hits = words.iter().filter(|w| description.contains(**w)).count();
        score.max((desc_hits as f32 / words.len() as f32) * 0.6)
    }
}

impl ToolSelector for KeywordToolSelector {
    fn select(&self, task: &EvaluationTask, tools: &[ToolDefinition]) -> Vec<ToolDefinition> {
        let mut scored: Vec<(f32, &ToolDefinition)> = tools
            .iter()
            .map(|t| (self.score(&task.prompt, t), t))
            .filter(|(score, _)| *score >= self.threshold)
            .collect();

        if scored.is_empty() {
            tracing::debug!(task = %task.id, "No tool matched the prompt, offering all");
            return tools.iter().take(self.max_tools).cloned().collect();
        }

        // stable: equal scores keep document order
        scored.sort_by(|a, b| b.0.partial_cmp(&a.0).unwrap_or(std::cmp::Ordering::Equal));
        scored
            .into_iter()
            .take(self.max_tools)
            .map(|(_, t)| t.clone())
            .collect()
    }
}

/// `listItemsByOwner` / `list_items-by_owner` -> ["list", "items", "by", "owner"]
fn split_identifier(name: &str) -> Vec<String> {
    let mut words = Vec::new();
    let mut current = String::new();
    let mut prev_lower = false;

    for c in name.chars() {
        if !c.is_alphanumeric() {
            if !current.is_empty() {
                words.push(std::mem::take(&mut current));
            }
            prev_lower = false;
            continue;
        }
        if c.is_uppercase() && prev_lower && !current.is_empty() {
            words.push(std::mem::take(&mut current));
        }
        prev_lower = c.is_lowercase() || c.is_ascii_digit();
        current.extend(c.to_lowercase());
    }
    if !current.is_empty() {
        words.push(current);
    }
    words
}

/// Equal, or equal after dropping a plural `s`
fn stem_match(a: &str, b: &str) -> bool {
    a == b || a.trim_end_matches('s') == b.trim_end_matches('s')
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn tool(name: &str, description: &str) -> ToolDefinition {
        ToolDefinition {
            name: name.to_string(),
            description: description.to_string(),
            parameters: json!({"type": "object"}),
        }
    }

    fn tools() -> Vec<ToolDefinition> {
        vec![
            tool("listOrders", "List orders for a customer."),
            tool("getItem", "Fetch one inventory item by id."),
            tool("listItems", "List inventory items."),
            tool("deleteUser", "Delete a user account."),
        ]
    }

    fn task(prompt: &str) -> EvaluationTask {
        EvaluationTask::new("t", prompt, |_| true)
    }

    #[test]
    fn test_split_identifier() {
        assert_eq!(split_identifier("listItemsByOwner"), vec!["list", "items", "by", "owner"]);
        assert_eq!(split_identifier("get_item-v2"), vec!["get", "item", "v2"]);
    }

    #[test]
    fn test_all_tools() {
        assert_eq!(AllTools.select(&task("anything"), &tools()).len(), 4);
    }

    #[test]
    fn test_keyword_selection_prefers_matching_tools() {
        let selector = KeywordToolSelector::new(2);
        let selected = selector.select(&task("How many inventory items are listed?"), &tools());
        let names: Vec<&str> = selected.iter().map(|t| t.name.as_str()).collect();

        assert_eq!(names.len(), 2);
        assert!(names.contains(&"listItems"));
        assert!(!names.contains(&"deleteUser"));
    }

    #[test]
    fn test_exact_name_mention_wins() {
        let selector = KeywordToolSelector::new(1);
        let selected = selector.select(&task("Call deleteUser for account 7"), &tools());
        assert_eq!(selected[0].name, "deleteUser");
    }

    #[test]
    fn test_falls_back_when_nothing_matches() {
        let selector = KeywordToolSelector::new(3);
        let selected = selector.select(&task("zzz qqq"), &tools());
        assert_eq!(selected.len(), 3);
        assert_eq!(selected[0].name, "listOrders");
    }
}
