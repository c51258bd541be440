// ABOUTME: Role prompt templates: built-in defaults plus a memoized loader for prompt files on disk.
// ABOUTME: PromptStore::load reads the directory once per process; invalidate forces the next load to reread.

use std::path::{Path, PathBuf};
use std::sync::{Arc, RwLock};

/// File holding the refiner's system prompt.
pub const REFINE_PROMPT_FILE: &str = "refine.md";
/// File holding the writer's system prompt.
pub const WRITE_PROMPT_FILE: &str = "story_writer.md";
/// File holding the reviewer's system prompt.
pub const REVIEW_PROMPT_FILE: &str = "director.md";

const DEFAULT_REFINE_PROMPT: &str = r#"You are a story planning assistant. Turn the user's loose story idea into a structured writing request.

Rules:
1. summary: restate the request as one or two clear sentences of instruction.
2. genre: infer it from context; use "fantasy" when unsure.
3. style: the form of the text (novel, script, poem, news article, ...). Default "novel".
4. length: short (about 500 characters), medium (about 1000) or long (2000 or more). Default "medium".

Reply with a single JSON object and nothing else: no greeting, no explanation, no code fence.

Example:
{"summary": "A hero searching for a legendary sword gets lost in a forest and finds ancient ruins.", "genre": "fantasy", "style": "novel", "length": "medium"}
"#;

const DEFAULT_WRITE_PROMPT: &str = r#"You are a story writer. Write the story described under "Story Request".

Use the search_lorebook tool to look up places, characters and history of the setting before you write, so the story stays consistent with the lore.
When review feedback or a previous version is given, revise that version and address every point of the feedback.

Reply with a single JSON object:
{"title": "...", "body": "the full story text", "length_hint": <number of characters>, "notes": "short remarks about your choices"}
"#;

const DEFAULT_REVIEW_PROMPT: &str = r#"You are a story editor reviewing a draft against its request.

Use the search_lorebook tool to check the story against the setting. Judge fidelity to the request, consistency with the lore, structure and prose.
Approve the story only when it is ready to publish as is.

Reply with a single JSON object:
{"approved": true or false, "score": <0 to 10>, "feedback": "concrete instructions for the next revision", "issues": ["each problem found"]}
"#;

/// Errors that can occur while reading prompt files.
#[derive(Debug, thiserror::Error)]
pub enum PromptError {
    #[error("failed to read prompt file {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("prompt file {0} is empty")]
    Empty(PathBuf),
}

/// The system prompts of the three roles.
#[derive(Debug, Clone, PartialEq)]
pub struct PromptSet {
    pub refine: String,
    pub write: String,
    pub review: String,
}

impl Default for PromptSet {
    fn default() -> Self {
        Self {
            refine: DEFAULT_REFINE_PROMPT.to_string(),
            write: DEFAULT_WRITE_PROMPT.to_string(),
            review: DEFAULT_REVIEW_PROMPT.to_string(),
        }
    }
}

impl PromptSet {
    /// Read the prompt files in `dir`. A missing file keeps its built-in
    /// default; an unreadable or empty one is an error.
    pub fn from_dir(dir: &Path) -> Result<Self, PromptError> {
        let defaults = Self::default();
        Ok(Self {
            refine: read_or(dir.join(REFINE_PROMPT_FILE), defaults.refine)?,
            write: read_or(dir.join(WRITE_PROMPT_FILE), defaults.write)?,
            review: read_or(dir.join(REVIEW_PROMPT_FILE), defaults.review)?,
        })
    }
}

fn read_or(path: PathBuf, default: String) -> Result<String, PromptError> {
    match std::fs::read_to_string(&path) {
        Ok(text) if text.trim().is_empty() => Err(PromptError::Empty(path)),
        Ok(text) => {
            tracing::debug!(path = %path.display(), "loaded prompt file");
            Ok(text)
        }
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
            tracing::debug!(path = %path.display(), "prompt file absent; using built-in prompt");
            Ok(default)
        }
        Err(source) => Err(PromptError::Read { path, source }),
    }
}

/// Memoized access to the role prompts.
#[derive(Debug, Default)]
pub struct PromptStore {
    dir: Option<PathBuf>,
    cache: RwLock<Option<Arc<PromptSet>>>,
}

impl PromptStore {
    /// A store backed by the prompt files in `dir`.
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self {
            dir: Some(dir.into()),
            cache: RwLock::new(None),
        }
    }

    /// A store that only ever serves the built-in prompts.
    pub fn builtin() -> Self {
        Self::default()
    }

    pub fn dir(&self) -> Option<&Path> {
        self.dir.as_deref()
    }

    /// Return the prompts, reading them on the first call after creation or
    /// after `invalidate`.
    pub fn load(&self) -> Result<Arc<PromptSet>, PromptError> {
        if let Ok(cache) = self.cache.read()
            && let Some(prompts) = cache.as_ref()
        {
            return Ok(Arc::clone(prompts));
        }

        let prompts = Arc::new(match &self.dir {
            Some(dir) => PromptSet::from_dir(dir)?,
            None => PromptSet::default(),
        });

        let mut cache = self.cache.write().unwrap_or_else(|p| p.into_inner());
        *cache = Some(Arc::clone(&prompts));
        Ok(prompts)
    }

    /// Drop the cached prompts so the next `load` reads the files again.
    pub fn invalidate(&self) {
        let mut cache = self.cache.write().unwrap_or_else(|p| p.into_inner());
        *cache = None;
        tracing::info!("prompt cache cleared");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn builtin_prompts_name_the_expected_keys() {
        let prompts = PromptSet::default();
        assert!(prompts.refine.contains("\"summary\""));
        assert!(prompts.write.contains("\"body\""));
        assert!(prompts.write.contains("search_lorebook"));
        assert!(prompts.review.contains("\"approved\""));
    }

    #[test]
    fn missing_files_fall_back_to_builtins() {
        let dir = TempDir::new().unwrap();
        std::fs::write(dir.path().join(WRITE_PROMPT_FILE), "Write well.").unwrap();

        let prompts = PromptSet::from_dir(dir.path()).unwrap();

        assert_eq!(prompts.write, "Write well.");
        assert_eq!(prompts.refine, PromptSet::default().refine);
        assert_eq!(prompts.review, PromptSet::default().review);
    }

    #[test]
    fn empty_file_is_an_error() {
        let dir = TempDir::new().unwrap();
        std::fs::write(dir.path().join(REVIEW_PROMPT_FILE), "  \n").unwrap();

        let err = PromptSet::from_dir(dir.path()).unwrap_err();
        assert!(matches!(err, PromptError::Empty(_)));
    }

    #[test]
    fn load_is_memoized_until_invalidated() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join(REVIEW_PROMPT_FILE);
        std::fs::write(&path, "first").unwrap();

        let store = PromptStore::new(dir.path());
        assert_eq!(store.load().unwrap().review, "first");

        std::fs::write(&path, "second").unwrap();
        assert_eq!(store.load().unwrap().review, "first");

        store.invalidate();
        assert_eq!(store.load().unwrap().review, "second");
    }

    #[test]
    fn builtin_store_never_touches_disk() {
        let store = PromptStore::builtin();
        assert!(store.dir().is_none());
        assert_eq!(*store.load().unwrap(), PromptSet::default());
    }
}
