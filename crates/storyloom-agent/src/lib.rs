// ABOUTME: Agent system for storyloom, orchestrating the refine/write/review story workflow.
// ABOUTME: Holds the chat-model seam and providers, the lorebook tool, role handlers and the workflow engine.

pub mod client;
pub mod extract;
pub mod observer;
pub mod prompts;
pub mod providers;
pub mod roles;
pub mod runtime;
pub mod testing;
pub mod tool_loop;
pub mod tools;
pub mod workflow;

pub use client::{SUPPORTED_PROVIDERS, create_chat_model};
pub use extract::{Record, extract_record};
pub use observer::{RunObserver, StreamMode};
pub use prompts::{PromptError, PromptSet, PromptStore};
pub use roles::{Refiner, Reviewer, RoleHandler, RoleOutcome, Writer};
pub use runtime::{ChatMessage, ChatModel, MessageRole, ModelError, ModelReply, ToolCall};
pub use tool_loop::{LoopOutcome, MAX_TOOL_RESULT_CHARS, ToolLoop};
pub use tools::{
    KnowledgeLookup, LOOKUP_TOOL_NAME, LookupError, LorebookLookup, NO_RESULTS, NoLookup,
    lookup_tool_definition,
};
pub use workflow::{RunRequest, Workflow};
