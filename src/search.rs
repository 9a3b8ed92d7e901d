//! Full-text search over text-typed nodes
//!
//! Scans every text-classified file under a scope path with a worklist walk
//! and matches content in one of three modes. Result ordering is stable:
//! most recently modified first, filename as the tiebreak. Snippets and line
//! numbers are the caller's presentation concern; the contract here is only
//! "the node matched".

use crate::error::Result;
use crate::node::{NodeKind, Scope};
use crate::store::TreeStore;
use chrono::{DateTime, Utc};
use regex::Regex;
use serde::{Deserialize, Serialize};
use tracing::debug;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SearchMode {
    /// Query is a regular expression applied to content as-is.
    Regex,
    /// Node matches when it contains at least one token.
    MatchAny,
    /// Node matches only when it contains every token.
    MatchAll,
}

/// One matching node.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SearchHit {
    pub path: String,
    pub filename: String,
    pub kind: NodeKind,
    pub size_bytes: i64,
    pub created_time: DateTime<Utc>,
    pub modified_time: DateTime<Utc>,
}

enum Matcher {
    Pattern(Regex),
    AnyOf(Vec<String>),
    AllOf(Vec<String>),
}

impl Matcher {
    fn build(query: &str, mode: SearchMode) -> Result<Self> {
        Ok(match mode {
            SearchMode::Regex => Matcher::Pattern(Regex::new(query)?),
            SearchMode::MatchAny => Matcher::AnyOf(tokenize(query)),
            SearchMode::MatchAll => Matcher::AllOf(tokenize(query)),
        })
    }

    fn matches(&self, content: &str) -> bool {
        match self {
            Matcher::Pattern(re) => re.is_match(content),
            Matcher::AnyOf(tokens) => {
                let haystack = content.to_lowercase();
                tokens.iter().any(|t| haystack.contains(t))
            }
            Matcher::AllOf(tokens) => {
                let haystack = content.to_lowercase();
                !tokens.is_empty() && tokens.iter().all(|t| haystack.contains(t))
            }
        }
    }
}

/// Whitespace tokenization with double-quoted phrases kept as single,
/// lowercased tokens.
fn tokenize(query: &str) -> Vec<String> {
    let mut tokens = Vec::new();
    let mut current = String::new();
    let mut in_quotes = false;
    for c in query.chars() {
        match c {
            '"' => {
                if in_quotes && !current.is_empty() {
                    tokens.push(std::mem::take(&mut current));
                }
                in_quotes = !in_quotes;
            }
            c if c.is_whitespace() && !in_quotes => {
                if !current.is_empty() {
                    tokens.push(std::mem::take(&mut current));
                }
            }
            c => current.push(c),
        }
    }
    if !current.is_empty() {
        tokens.push(current);
    }
    tokens.into_iter().map(|t| t.to_lowercase()).collect()
}

/// Search text content under `scope_path` (the whole tree when it is the
/// root).
pub async fn search(
    store: &dyn TreeStore,
    scope: &Scope,
    query: &str,
    scope_path: &str,
    mode: SearchMode,
) -> Result<Vec<SearchHit>> {
    let matcher = Matcher::build(query, mode)?;
    let mut hits = Vec::new();
    let mut worklist = vec![scope_path.to_string()];

    while let Some(dir) = worklist.pop() {
        for entry in store.readdir(scope, &dir).await? {
            if entry.is_directory() {
                worklist.push(entry.full_path());
                continue;
            }
            if entry.is_binary {
                continue;
            }
            let content = store.read_file(scope, &dir, &entry.filename).await?;
            let matched = content.as_text().is_some_and(|text| matcher.matches(text));
            if matched {
                hits.push(SearchHit {
                    path: entry.full_path(),
                    filename: entry.filename,
                    kind: entry.kind,
                    size_bytes: entry.size_bytes,
                    created_time: entry.created_time,
                    modified_time: entry.modified_time,
                });
            }
        }
    }

    hits.sort_by(|a, b| {
        b.modified_time
            .cmp(&a.modified_time)
            .then_with(|| a.filename.cmp(&b.filename))
    });
    debug!(query, scope_path, hits = hits.len(), "search finished");
    Ok(hits)
}
