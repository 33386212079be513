//! The Scope Guard (§4.7): keeps vectors in the index consistent with the
//! embedding provider/model currently configured.
//!
//! Every vector read or write goes through [`check_scope_guard`] first.
//! The guard is pure: it takes the configured backend, the scope meta
//! stored in the index (if any), the scope implied by the current
//! environment (if the backend is `api`), and whether any vectors exist
//! at all, and returns `Ok(())` or a [`crate::error::QmdError::ScopeViolation`]
//! carrying the full human-readable message.

use crate::error::{QmdError, Result};
use crate::models::ApiScopeMeta;

/// Which embedding backend is currently configured (`QMD_LLM_BACKEND`).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConfiguredBackend {
    Local,
    Api,
    /// Any other/unrecognized value — validated elsewhere, not the
    /// guard's concern.
    Unknown,
}

/// Normalize a `(base_url, model)` pair the way scope comparisons require:
/// both trimmed, the URL additionally stripped of trailing slashes.
pub fn normalize_scope(base_url: &str, model: &str) -> ApiScopeMeta {
    ApiScopeMeta {
        embed_base_url: base_url.trim().trim_end_matches('/').to_string(),
        embed_model: model.trim().to_string(),
    }
}

/// Evaluate the Scope Guard. Call this before any vector read or write.
pub fn check_scope_guard(
    backend: ConfiguredBackend,
    stored: Option<&ApiScopeMeta>,
    current: Option<&ApiScopeMeta>,
    any_vectors_exist: bool,
) -> Result<()> {
    match backend {
        ConfiguredBackend::Local => {
            if let Some(s) = stored {
                return Err(QmdError::ScopeViolation(format!(
                    "local embedding backend is configured, but the index has vector scope \
                     metadata recorded for a remote API ({} / {}).\n\
                     Run `qmd embed -f` to clear this scope and re-embed locally.",
                    s.embed_base_url, s.embed_model
                )));
            }
            Ok(())
        }
        ConfiguredBackend::Api => match (stored, current) {
            (None, _) if any_vectors_exist => Err(QmdError::ScopeViolation(
                "ambiguous legacy vectors: the index has embedded chunk vectors but no \
                 recorded API scope metadata, so it is unclear which embedding provider/model \
                 produced them.\n\
                 Run `qmd embed -f` to clear the index and re-embed under the current scope."
                    .to_string(),
            )),
            (Some(s), Some(c)) if s != c => Err(QmdError::ScopeViolation(format!(
                "scope mismatch: the index's vectors were embedded under a different \
                 provider/model than is currently configured.\n\
                 Stored scope:  {} / {}\n\
                 Current scope: {} / {}\n\
                 Run `qmd embed -f` to clear the index's vector scope and re-embed under the \
                 current configuration.",
                s.embed_base_url, s.embed_model, c.embed_base_url, c.embed_model
            ))),
            _ => Ok(()),
        },
        ConfiguredBackend::Unknown => Ok(()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn local_backend_ok_without_stored_meta() {
        assert!(check_scope_guard(ConfiguredBackend::Local, None, None, false).is_ok());
    }

    #[test]
    fn local_backend_errors_with_stored_api_meta() {
        let stored = normalize_scope("https://api.openai.com/v1", "text-embedding-3-small");
        let err = check_scope_guard(ConfiguredBackend::Local, Some(&stored), None, true).unwrap_err();
        assert!(matches!(err, QmdError::ScopeViolation(_)));
    }

    #[test]
    fn api_backend_ambiguous_legacy_vectors() {
        let err = check_scope_guard(ConfiguredBackend::Api, None, None, true).unwrap_err();
        match err {
            QmdError::ScopeViolation(msg) => assert!(msg.contains("ambiguous legacy vectors")),
            _ => panic!("expected ScopeViolation"),
        }
    }

    #[test]
    fn api_backend_no_meta_no_vectors_is_ok() {
        assert!(check_scope_guard(ConfiguredBackend::Api, None, None, false).is_ok());
    }

    #[test]
    fn scenario_e_scope_mismatch_message() {
        let stored = normalize_scope("https://api.openai.com/v1", "text-embedding-3-small");
        let current = normalize_scope("https://api.openai.com/v1", "text-embedding-3-large");
        let err =
            check_scope_guard(ConfiguredBackend::Api, Some(&stored), Some(&current), true)
                .unwrap_err();
        match err {
            QmdError::ScopeViolation(msg) => {
                assert!(msg.contains("scope mismatch"));
                assert!(msg.contains("Stored scope"));
                assert!(msg.contains("Current scope"));
                assert!(msg.contains("qmd embed -f"));
            }
            _ => panic!("expected ScopeViolation"),
        }
    }

    #[test]
    fn api_backend_matching_scope_is_ok() {
        let stored = normalize_scope("https://api.openai.com/v1/", "text-embedding-3-small");
        let current = normalize_scope("https://api.openai.com/v1", " text-embedding-3-small ");
        assert!(check_scope_guard(ConfiguredBackend::Api, Some(&stored), Some(&current), true).is_ok());
    }

    #[test]
    fn unknown_backend_is_always_ok() {
        let stored = normalize_scope("x", "y");
        assert!(check_scope_guard(ConfiguredBackend::Unknown, Some(&stored), None, true).is_ok());
    }
}
