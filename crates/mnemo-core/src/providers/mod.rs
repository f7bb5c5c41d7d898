//! Collaborator Interfaces
//!
//! The engine treats the embedding provider and the language model as black
//! boxes behind traits. The chat router adds the reliability policy the
//! engine expects: per-attempt deadline, exponential backoff, and an ordered
//! list of fallback models. Configuration errors short-circuit without
//! retry.

use std::sync::Arc;
use std::time::Duration;

// ============================================================================
// ERROR TYPES
// ============================================================================

#[non_exhaustive]
#[derive(Debug, Clone, thiserror::Error)]
pub enum ProviderError {
    /// Provider is not configured (missing key); never retried
    #[error("Provider not configured: {0}")]
    Unconfigured(String),
    /// Deadline elapsed for one attempt
    #[error("Provider call timed out after {0:?}")]
    Timeout(Duration),
    /// Transient failure (5xx, aborted stream); retried with backoff
    #[error("Transient provider failure: {0}")]
    Transient(String),
    /// Anything retrying cannot fix
    #[error("Provider failure: {0}")]
    Fatal(String),
}

impl ProviderError {
    pub fn is_retryable(&self) -> bool {
        matches!(self, ProviderError::Timeout(_) | ProviderError::Transient(_))
    }
}

pub type Result<T> = std::result::Result<T, ProviderError>;

// ============================================================================
// EMBEDDER
// ============================================================================

/// Black-box embedding provider yielding fixed-dimension vectors
pub trait Embedder: Send + Sync {
    /// Vector dimensionality (e.g. 1536 or 3072)
    fn dim(&self) -> usize;

    fn embed(&self, text: &str) -> Result<Vec<f32>>;
}

// ============================================================================
// CHAT
// ============================================================================

/// Per-call options for the language model
#[derive(Debug, Clone)]
pub struct ChatOptions {
    /// Deadline for a single attempt
    pub deadline: Duration,
    pub max_tokens: Option<u32>,
    pub temperature: Option<f64>,
}

impl Default for ChatOptions {
    fn default() -> Self {
        Self {
            deadline: DEFAULT_ATTEMPT_DEADLINE,
            max_tokens: None,
            temperature: None,
        }
    }
}

/// Black-box completion provider
pub trait Chat: Send + Sync {
    fn complete(&self, model: &str, prompt: &str, opts: &ChatOptions) -> Result<String>;
}

// ============================================================================
// CHAT ROUTER
// ============================================================================

/// Deadline for one model attempt
pub const DEFAULT_ATTEMPT_DEADLINE: Duration = Duration::from_secs(45);

/// Backoff schedule between retries of the same model
pub const RETRY_BACKOFF: [Duration; 3] = [
    Duration::from_secs(1),
    Duration::from_secs(3),
    Duration::from_secs(9),
];

/// Retry-and-fallback wrapper around a [`Chat`] implementation.
///
/// Each model gets up to `1 + RETRY_BACKOFF.len()` attempts with exponential
/// backoff on retryable failures, then the next fallback model is tried.
/// `Unconfigured` aborts the whole chain immediately.
pub struct ChatRouter {
    chat: Arc<dyn Chat>,
    models: Vec<String>,
    sleep: fn(Duration),
}

impl ChatRouter {
    pub fn new(chat: Arc<dyn Chat>, models: Vec<String>) -> Self {
        Self {
            chat,
            models,
            sleep: std::thread::sleep,
        }
    }

    /// Test hook: swap the sleeper so retry tests run instantly
    #[cfg(test)]
    fn with_sleep(mut self, sleep: fn(Duration)) -> Self {
        self.sleep = sleep;
        self
    }

    pub fn models(&self) -> &[String] {
        &self.models
    }

    /// Complete against the model chain
    pub fn complete(&self, prompt: &str, opts: &ChatOptions) -> Result<String> {
        if self.models.is_empty() {
            return Err(ProviderError::Unconfigured("no models configured".into()));
        }

        let mut last_error = None;
        for model in &self.models {
            match self.complete_one(model, prompt, opts) {
                Ok(text) => return Ok(text),
                Err(e @ ProviderError::Unconfigured(_)) => return Err(e),
                Err(e) => {
                    tracing::warn!("Model {} failed, trying next fallback: {}", model, e);
                    last_error = Some(e);
                }
            }
        }
        Err(last_error.unwrap_or_else(|| ProviderError::Fatal("no attempt made".into())))
    }

    fn complete_one(&self, model: &str, prompt: &str, opts: &ChatOptions) -> Result<String> {
        let mut attempt = 0;
        loop {
            match self.chat.complete(model, prompt, opts) {
                Ok(text) => return Ok(text),
                Err(e) if e.is_retryable() && attempt < RETRY_BACKOFF.len() => {
                    tracing::debug!(
                        "Retrying {} after attempt {} failed: {}",
                        model,
                        attempt + 1,
                        e
                    );
                    (self.sleep)(RETRY_BACKOFF[attempt]);
                    attempt += 1;
                }
                Err(e) => return Err(e),
            }
        }
    }
}

// ============================================================================
// TESTS
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct FlakyChat {
        calls: AtomicUsize,
        fail_first: usize,
        error: fn() -> ProviderError,
    }

    impl Chat for FlakyChat {
        fn complete(&self, model: &str, _prompt: &str, _opts: &ChatOptions) -> Result<String> {
            let n = self.calls.fetch_add(1, Ordering::SeqCst);
            if n < self.fail_first {
                Err((self.error)())
            } else {
                Ok(format!("ok from {}", model))
            }
        }
    }

    fn no_sleep(_: Duration) {}

    #[test]
    fn test_retries_transient_then_succeeds() {
        let chat = Arc::new(FlakyChat {
            calls: AtomicUsize::new(0),
            fail_first: 2,
            error: || ProviderError::Transient("503".into()),
        });
        let router =
            ChatRouter::new(chat.clone(), vec!["primary".into()]).with_sleep(no_sleep);

        let out = router.complete("hi", &ChatOptions::default()).unwrap();
        assert_eq!(out, "ok from primary");
        assert_eq!(chat.calls.load(Ordering::SeqCst), 3);
    }

    #[test]
    fn test_falls_back_to_next_model() {
        let chat = Arc::new(FlakyChat {
            calls: AtomicUsize::new(0),
            // primary exhausts 1 + 3 retries, fallback succeeds
            fail_first: 4,
            error: || ProviderError::Timeout(Duration::from_secs(45)),
        });
        let router = ChatRouter::new(chat.clone(), vec!["primary".into(), "fallback".into()])
            .with_sleep(no_sleep);

        let out = router.complete("hi", &ChatOptions::default()).unwrap();
        assert_eq!(out, "ok from fallback");
        assert_eq!(chat.calls.load(Ordering::SeqCst), 5);
    }

    #[test]
    fn test_unconfigured_short_circuits() {
        let chat = Arc::new(FlakyChat {
            calls: AtomicUsize::new(0),
            fail_first: usize::MAX,
            error: || ProviderError::Unconfigured("missing key".into()),
        });
        let router = ChatRouter::new(chat.clone(), vec!["primary".into(), "fallback".into()])
            .with_sleep(no_sleep);

        let err = router.complete("hi", &ChatOptions::default()).unwrap_err();
        assert!(matches!(err, ProviderError::Unconfigured(_)));
        // No retry, no fallback
        assert_eq!(chat.calls.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_fatal_skips_retries_but_tries_fallback() {
        let chat = Arc::new(FlakyChat {
            calls: AtomicUsize::new(0),
            fail_first: 1,
            error: || ProviderError::Fatal("bad request".into()),
        });
        let router = ChatRouter::new(chat.clone(), vec!["primary".into(), "fallback".into()])
            .with_sleep(no_sleep);

        let out = router.complete("hi", &ChatOptions::default()).unwrap();
        assert_eq!(out, "ok from fallback");
        assert_eq!(chat.calls.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn test_empty_model_list_is_unconfigured() {
        let chat = Arc::new(FlakyChat {
            calls: AtomicUsize::new(0),
            fail_first: 0,
            error: || ProviderError::Fatal("unused".into()),
        });
        let router = ChatRouter::new(chat, vec![]).with_sleep(no_sleep);
        assert!(matches!(
            router.complete("hi", &ChatOptions::default()),
            Err(ProviderError::Unconfigured(_))
        ));
    }
}
