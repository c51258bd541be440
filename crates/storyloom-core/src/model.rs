// ABOUTME: Typed records produced by the three roles: WritingRequest, StoryDraft and ReviewVerdict.
// ABOUTME: Also defines the Role enum and the defaults applied when model output omits fields.

use serde::{Deserialize, Serialize};

pub const DEFAULT_GENRE: &str = "fantasy";
pub const DEFAULT_STYLE: &str = "novel";
pub const DEFAULT_LENGTH: &str = "medium";

/// Title used when the writer's output carries none.
pub const UNTITLED: &str = "Untitled";

/// Upper bound of the reviewer's score scale.
pub const MAX_SCORE: f64 = 10.0;

/// The three model-backed roles of a workflow run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Role {
    Refine,
    Write,
    Review,
}

impl Role {
    /// Return a human-readable label for this role.
    pub fn label(&self) -> &'static str {
        match self {
            Role::Refine => "refine",
            Role::Write => "write",
            Role::Review => "review",
        }
    }
}

impl std::fmt::Display for Role {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.label())
    }
}

/// The user's story idea, restated by the refiner into structured fields.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WritingRequest {
    pub summary: String,
    pub genre: Option<String>,
    pub style: Option<String>,
    pub length: Option<String>,
}

impl WritingRequest {
    /// Build a request with the given summary and every other field at its default.
    pub fn with_defaults(summary: impl Into<String>) -> Self {
        Self {
            summary: summary.into(),
            genre: Some(DEFAULT_GENRE.to_string()),
            style: Some(DEFAULT_STYLE.to_string()),
            length: Some(DEFAULT_LENGTH.to_string()),
        }
    }
}

/// One version of the story produced by the writer.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StoryDraft {
    pub title: String,
    pub body: String,
    pub length_hint: usize,
    pub notes: String,
}

/// The reviewer's judgement of a draft.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReviewVerdict {
    pub approved: bool,
    pub score: f64,
    pub feedback: String,
    pub issues: Vec<String>,
}

impl ReviewVerdict {
    /// A rejection with a zero score, used whenever no usable review exists.
    pub fn rejection(feedback: impl Into<String>, issue: impl Into<String>) -> Self {
        Self {
            approved: false,
            score: 0.0,
            feedback: feedback.into(),
            issues: vec![issue.into()],
        }
    }
}

/// Clamp a raw score into the reviewer's `[0, 10]` scale. NaN maps to 0.
pub fn clamp_score(raw: f64) -> f64 {
    if raw.is_nan() {
        return 0.0;
    }
    raw.clamp(0.0, MAX_SCORE)
}
