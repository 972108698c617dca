//! Scripted chat client for offline runs

use async_trait::async_trait;
use std::collections::VecDeque;
use std::sync::Mutex;

use super::{AssistantMessage, ChatClient, ChatMessage, ModelInfo, ToolDefinition};
use crate::error::{GuardrailError, Result};

/// One recorded `chat` request
#[derive(Debug, Clone)]
pub struct ChatRequestRecord {
    pub messages: Vec<ChatMessage>,
    pub tool_names: Option<Vec<String>>,
}

/// Chat client replaying predetermined assistant replies in order
///
/// Fails with an LLM error once the script is exhausted.
#[derive(Debug, Default)]
pub struct ScriptedChatClient {
    replies: Mutex<VecDeque<AssistantMessage>>,
    requests: Mutex<Vec<ChatRequestRecord>>,
}

impl ScriptedChatClient {
    pub fn new(replies: impl IntoIterator<Item = AssistantMessage>) -> Self {
        Self {
            replies: Mutex::new(replies.into_iter().collect()),
            requests: Mutex::new(Vec::new()),
        }
    }

    /// Requests received, oldest first
    pub fn requests(&self) -> Vec<ChatRequestRecord> {
        self.requests.lock().map(|r| r.clone()).unwrap_or_default()
    }

    /// Replies not yet consumed
    pub fn remaining(&self) -> usize {
        self.replies.lock().map(|r| r.len()).unwrap_or_default()
    }
}

#[async_trait]
impl ChatClient for ScriptedChatClient {
    async fn chat(
        &self,
        messages: &[ChatMessage],
        tools: Option<&[ToolDefinition]>,
    ) -> Result<AssistantMessage> {
        if let Ok(mut requests) = self.requests.lock() {
            requests.push(ChatRequestRecord {
                messages: messages.to_vec(),
                tool_names: tools.map(|t| t.iter().map(|d| d.name.clone()).collect()),
            });
        }

        self.replies
            .lock()
            .ok()
            .and_then(|mut r| r.pop_front())
            .ok_or_else(|| GuardrailError::Llm("scripted replies exhausted".to_string()))
    }

    fn model_info(&self) -> ModelInfo {
        ModelInfo {
            provider: "scripted".to_string(),
            model_name: "scripted".to_string(),
        }
    }
}
