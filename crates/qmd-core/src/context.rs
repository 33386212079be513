//! Path/global context resolution (§3 "Path context", "Global context";
//! §10 supplement).
//!
//! Context text biases chunk and snippet selection (§4.6.4) without
//! participating in the primary ranking score. A document's effective
//! context is the longest matching path-prefix context within its
//! collection, falling back to the global context, falling back to none.

use crate::models::PathContext;

/// Resolve the effective context text for `path` within one collection's
/// `path_contexts` (already filtered to that collection by the caller),
/// falling back to `global`.
pub fn resolve_context(path: &str, path_contexts: &[PathContext], global: Option<&str>) -> Option<String> {
    path_contexts
        .iter()
        .filter(|pc| path.starts_with(pc.prefix.as_str()))
        .max_by_key(|pc| pc.prefix.len())
        .map(|pc| pc.context_text.clone())
        .or_else(|| global.map(|g| g.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn pc(prefix: &str, text: &str) -> PathContext {
        PathContext {
            collection: "notes".to_string(),
            prefix: prefix.to_string(),
            context_text: text.to_string(),
        }
    }

    #[test]
    fn longest_prefix_wins() {
        let contexts = vec![pc("projects/", "all projects"), pc("projects/web/", "web team")];
        let resolved = resolve_context("projects/web/notes.md", &contexts, None);
        assert_eq!(resolved.as_deref(), Some("web team"));
    }

    #[test]
    fn falls_back_to_global_when_no_prefix_matches() {
        let contexts = vec![pc("archive/", "old stuff")];
        let resolved = resolve_context("projects/web/notes.md", &contexts, Some("site-wide context"));
        assert_eq!(resolved.as_deref(), Some("site-wide context"));
    }

    #[test]
    fn none_when_nothing_matches_and_no_global() {
        let resolved = resolve_context("a.md", &[], None);
        assert!(resolved.is_none());
    }
}
