// ABOUTME: The knowledge-lookup tool: its function-calling definition and the KnowledgeLookup trait.
// ABOUTME: Ships LorebookLookup (keyword search over a directory of lore files) and NoLookup.

use std::path::{Path, PathBuf};

use async_trait::async_trait;
use serde_json::{Value, json};

/// Name under which the lookup tool is declared to the model.
pub const LOOKUP_TOOL_NAME: &str = "search_lorebook";

/// Returned by every lookup when nothing matches the query.
pub const NO_RESULTS: &str = "No matching lore entries were found.";

/// How many passages a lorebook search returns at most.
const DEFAULT_TOP_K: usize = 3;

/// Tool: search the lorebook for setting details.
/// Provider-agnostic JSON schema; each provider adapter reformats it.
pub fn lookup_tool_definition() -> Value {
    json!({
        "name": LOOKUP_TOOL_NAME,
        "description": "Search the lorebook (the setting reference) for places, characters, \
            creatures and history. Use it to check that a story is consistent with the setting \
            or to gather ideas for the story.",
        "parameters": {
            "type": "object",
            "properties": {
                "query": {
                    "type": "string",
                    "description": "Keywords or a question to look up, e.g. \"Whiterun\" or \"blood dragon\"."
                }
            },
            "required": ["query"]
        }
    })
}

/// Errors that can occur while loading a lorebook.
#[derive(Debug, thiserror::Error)]
pub enum LookupError {
    #[error("lorebook directory not found: {0}")]
    MissingDirectory(PathBuf),

    #[error("failed to read lorebook file {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

/// Contract of the knowledge-lookup collaborator: a query in, ranked
/// snippets joined as text out, or `NO_RESULTS` when nothing matches.
#[async_trait]
pub trait KnowledgeLookup: Send + Sync {
    async fn search(&self, query: &str) -> String;
}

/// A lookup with an empty knowledge base.
#[derive(Debug, Clone, Default)]
pub struct NoLookup;

#[async_trait]
impl KnowledgeLookup for NoLookup {
    async fn search(&self, _query: &str) -> String {
        NO_RESULTS.to_string()
    }
}

/// Keyword search over lore passages held in memory.
///
/// Passages are blank-line-separated paragraphs of the `.md` and `.txt` files
/// found in a directory. A passage scores one point per occurrence of each
/// query term (case-insensitive); the best `top_k` passages are returned.
#[derive(Debug, Clone)]
pub struct LorebookLookup {
    passages: Vec<String>,
    top_k: usize,
}

impl LorebookLookup {
    /// Build a lookup from already-split passages.
    pub fn from_passages(passages: Vec<String>) -> Self {
        Self {
            passages: passages
                .into_iter()
                .map(|p| p.trim().to_string())
                .filter(|p| !p.is_empty())
                .collect(),
            top_k: DEFAULT_TOP_K,
        }
    }

    /// Load every `.md` / `.txt` file in `dir` (non-recursive, sorted by name).
    pub fn from_dir(dir: &Path) -> Result<Self, LookupError> {
        if !dir.is_dir() {
            return Err(LookupError::MissingDirectory(dir.to_path_buf()));
        }

        let entries = std::fs::read_dir(dir).map_err(|source| LookupError::Read {
            path: dir.to_path_buf(),
            source,
        })?;

        let mut files: Vec<PathBuf> = entries
            .filter_map(|entry| entry.ok().map(|e| e.path()))
            .filter(|path| {
                path.is_file()
                    && matches!(
                        path.extension().and_then(|e| e.to_str()),
                        Some("md") | Some("txt")
                    )
            })
            .collect();
        files.sort();

        let mut passages = Vec::new();
        for path in &files {
            let text = std::fs::read_to_string(path).map_err(|source| LookupError::Read {
                path: path.clone(),
                source,
            })?;
            passages.extend(split_passages(&text));
        }

        tracing::info!(
            dir = %dir.display(),
            files = files.len(),
            passages = passages.len(),
            "lorebook loaded"
        );

        Ok(Self::from_passages(passages))
    }

    /// Change how many passages a search returns.
    pub fn with_top_k(mut self, top_k: usize) -> Self {
        self.top_k = top_k.max(1);
        self
    }

    pub fn passage_count(&self) -> usize {
        self.passages.len()
    }

    fn rank(&self, query: &str) -> Vec<&str> {
        let terms = query_terms(query);
        if terms.is_empty() {
            return Vec::new();
        }

        let mut scored: Vec<(usize, usize)> = self
            .passages
            .iter()
            .enumerate()
            .filter_map(|(idx, passage)| {
                let haystack = passage.to_lowercase();
                let score: usize = terms
                    .iter()
                    .map(|term| haystack.matches(term.as_str()).count())
                    .sum();
                (score > 0).then_some((idx, score))
            })
            .collect();

        // Highest score first; ties keep document order.
        scored.sort_by(|a, b| b.1.cmp(&a.1).then(a.0.cmp(&b.0)));

        scored
            .into_iter()
            .take(self.top_k)
            .map(|(idx, _)| self.passages[idx].as_str())
            .collect()
    }
}

#[async_trait]
impl KnowledgeLookup for LorebookLookup {
    async fn search(&self, query: &str) -> String {
        let hits = self.rank(query);
        if hits.is_empty() {
            return NO_RESULTS.to_string();
        }
        hits.iter()
            .map(|passage| format!("[Lore] {}", passage))
            .collect::<Vec<_>>()
            .join("\n\n")
    }
}

/// Split text into blank-line-separated passages.
fn split_passages(text: &str) -> Vec<String> {
    let mut passages = Vec::new();
    let mut current: Vec<&str> = Vec::new();

    for line in text.lines() {
        if line.trim().is_empty() {
            if !current.is_empty() {
                passages.push(current.join("\n"));
                current.clear();
            }
        } else {
            current.push(line);
        }
    }
    if !current.is_empty() {
        passages.push(current.join("\n"));
    }

    passages
}

/// Lowercased alphanumeric terms of at least two characters.
fn query_terms(query: &str) -> Vec<String> {
    let mut terms: Vec<String> = query
        .split(|c: char| !c.is_alphanumeric())
        .filter(|t| t.chars().count() >= 2)
        .map(str::to_lowercase)
        .collect();
    terms.sort();
    terms.dedup();
    terms
}

#[cfg(test)]
mod tests {
    use super::*;

    fn lorebook() -> LorebookLookup {
        LorebookLookup::from_passages(vec![
            "Whiterun is a city in the plains of Skyrim.".to_string(),
            "Blood dragons are ancient dragons with red scales. Dragons fear no one.".to_string(),
            "The Companions are a guild of warriors based in Whiterun.".to_string(),
            "   ".to_string(),
        ])
    }

    #[test]
    fn tool_definition_declares_query_parameter() {
        let tool = lookup_tool_definition();
        assert_eq!(tool["name"], LOOKUP_TOOL_NAME);
        assert!(tool["description"].as_str().is_some());
        assert_eq!(tool["parameters"]["type"], "object");
        assert_eq!(tool["parameters"]["required"][0], "query");
    }

    #[test]
    fn blank_passages_are_dropped() {
        assert_eq!(lorebook().passage_count(), 3);
    }

    #[tokio::test]
    async fn search_ranks_by_term_hits() {
        let result = lorebook().search("dragons").await;
        assert!(result.starts_with("[Lore] Blood dragons"));
        assert!(!result.contains("Whiterun"));
    }

    #[tokio::test]
    async fn search_returns_ties_in_document_order() {
        let result = lorebook().search("Whiterun").await;
        let first = result.find("Whiterun is a city").unwrap();
        let second = result.find("The Companions").unwrap();
        assert!(first < second);
    }

    #[tokio::test]
    async fn search_respects_top_k() {
        let result = lorebook().with_top_k(1).search("Whiterun").await;
        assert_eq!(result.matches("[Lore]").count(), 1);
    }

    #[tokio::test]
    async fn no_match_returns_sentinel() {
        assert_eq!(lorebook().search("spaceship").await, NO_RESULTS);
        assert_eq!(lorebook().search("").await, NO_RESULTS);
        assert_eq!(NoLookup.search("Whiterun").await, NO_RESULTS);
    }

    #[tokio::test]
    async fn from_dir_reads_markdown_and_text_files() {
        let dir = tempfile::TempDir::new().unwrap();
        std::fs::write(
            dir.path().join("skyrim.md"),
            "# Skyrim\n\nWhiterun sits at the heart of Skyrim.\n\nRiften is a city of thieves.\n",
        )
        .unwrap();
        std::fs::write(dir.path().join("notes.txt"), "Dragons returned to Skyrim.").unwrap();
        std::fs::write(dir.path().join("ignored.json"), "{\"Whiterun\": true}").unwrap();

        let lookup = LorebookLookup::from_dir(dir.path()).unwrap();
        assert_eq!(lookup.passage_count(), 4);

        let result = lookup.search("thieves").await;
        assert_eq!(result, "[Lore] Riften is a city of thieves.");
    }

    #[test]
    fn from_dir_rejects_missing_directory() {
        let err = LorebookLookup::from_dir(Path::new("/definitely/not/here")).unwrap_err();
        assert!(err.to_string().contains("not found"));
    }

    #[test]
    fn split_passages_groups_lines() {
        let passages = split_passages("a\nb\n\n\nc\n");
        assert_eq!(passages, vec!["a\nb".to_string(), "c".to_string()]);
    }
}
