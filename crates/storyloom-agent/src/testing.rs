// ABOUTME: Test doubles for storyloom-agent: a scripted chat model and canned lorebook lookups.
// ABOUTME: Used in tests to drive roles and whole workflows without real API calls.

use std::collections::VecDeque;
use std::sync::Mutex;

use async_trait::async_trait;
use serde_json::Value;

use crate::runtime::{ChatMessage, ChatModel, ModelError, ModelReply};
use crate::tools::KnowledgeLookup;

/// A chat model that answers from a queue of pre-configured replies.
///
/// Once the queue is empty the model keeps returning its fallback reply,
/// or fails with `ModelError::ProviderError` when it has none. Every
/// invocation's messages and tools are recorded for later assertions.
#[derive(Debug, Default)]
pub struct ScriptedModel {
    replies: Mutex<VecDeque<Result<ModelReply, String>>>,
    fallback: Option<ModelReply>,
    calls: Mutex<Vec<Vec<ChatMessage>>>,
    tools_seen: Mutex<Vec<Vec<Value>>>,
}

impl ScriptedModel {
    /// Answer with `replies` in order, then fail.
    pub fn new(replies: Vec<ModelReply>) -> Self {
        Self {
            replies: Mutex::new(replies.into_iter().map(Ok).collect()),
            ..Self::default()
        }
    }

    /// Answer with plain-text replies in order, then fail.
    pub fn texts(texts: &[&str]) -> Self {
        Self::new(texts.iter().map(|t| ModelReply::text(*t)).collect())
    }

    /// Always answer with `reply`.
    pub fn repeating(reply: ModelReply) -> Self {
        Self {
            fallback: Some(reply),
            ..Self::default()
        }
    }

    /// Fail every invocation.
    pub fn failing() -> Self {
        Self::default()
    }

    /// Queue a failure at the current end of the script.
    pub fn then_fail(self, message: &str) -> Self {
        self.lock_replies().push_back(Err(message.to_string()));
        self
    }

    /// Queue a reply at the current end of the script.
    pub fn then_reply(self, reply: ModelReply) -> Self {
        self.lock_replies().push_back(Ok(reply));
        self
    }

    /// Number of invocations so far.
    pub fn call_count(&self) -> usize {
        self.calls.lock().map(|c| c.len()).unwrap_or_default()
    }

    /// The message history each invocation received.
    pub fn recorded_messages(&self) -> Vec<Vec<ChatMessage>> {
        self.calls.lock().map(|c| c.clone()).unwrap_or_default()
    }

    /// The tool definitions each invocation declared.
    pub fn recorded_tools(&self) -> Vec<Vec<Value>> {
        self.tools_seen.lock().map(|t| t.clone()).unwrap_or_default()
    }

    fn lock_replies(&self) -> std::sync::MutexGuard<'_, VecDeque<Result<ModelReply, String>>> {
        self.replies.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

#[async_trait]
impl ChatModel for ScriptedModel {
    async fn invoke(
        &self,
        messages: &[ChatMessage],
        tools: &[Value],
    ) -> Result<ModelReply, ModelError> {
        if let Ok(mut calls) = self.calls.lock() {
            calls.push(messages.to_vec());
        }
        if let Ok(mut seen) = self.tools_seen.lock() {
            seen.push(tools.to_vec());
        }

        let next = self.lock_replies().pop_front();
        match next {
            Some(Ok(reply)) => Ok(reply),
            Some(Err(message)) => Err(ModelError::ProviderError(message)),
            None => self
                .fallback
                .clone()
                .ok_or_else(|| ModelError::ProviderError("script exhausted".to_string())),
        }
    }

    fn provider_name(&self) -> &str {
        "scripted"
    }

    fn model_name(&self) -> &str {
        "scripted-model"
    }
}

/// A lookup that returns the same text for every query and records the queries.
#[derive(Debug, Default)]
pub struct StaticLookup {
    response: String,
    queries: Mutex<Vec<String>>,
}

impl StaticLookup {
    pub fn new(response: &str) -> Self {
        Self {
            response: response.to_owned(),
            queries: Mutex::new(Vec::new()),
        }
    }

    /// Queries received so far, in order.
    pub fn queries(&self) -> Vec<String> {
        self.queries.lock().map(|q| q.clone()).unwrap_or_default()
    }
}

#[async_trait]
impl KnowledgeLookup for StaticLookup {
    async fn search(&self, query: &str) -> String {
        if let Ok(mut queries) = self.queries.lock() {
            queries.push(query.to_string());
        }
        self.response.clone()
    }
}
