//! Completion retry policy.
//!
//! Exponential backoff over [`backon`]. Only transient failures (upstream
//! 5xx and transport errors) are retried; every 4xx, 429 included, is
//! surfaced immediately with its own status. Once the retry budget is spent
//! the last transient error is reshaped into a retryable 502.

use std::future::Future;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use backon::{ExponentialBuilder, Retryable};
use tracing::warn;

use super::{ChatMessage, Completion, CompletionOptions, CompletionProvider, CompletionStream};
use crate::config::LlmConfig;
use crate::constants::retry::BACKOFF_FACTOR;
use crate::types::{FairError, Result};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RetryPolicy {
    pub max_retries: usize,
    pub base_delay: Duration,
    pub max_delay: Duration,
}

impl RetryPolicy {
    pub fn new(max_retries: usize, base_delay: Duration, max_delay: Duration) -> Self {
        Self {
            max_retries,
            base_delay,
            max_delay,
        }
    }

    pub fn from_config(config: &LlmConfig) -> Self {
        Self::new(
            config.max_retries,
            Duration::from_millis(config.base_delay_ms),
            Duration::from_millis(config.max_delay_ms),
        )
    }

    fn backoff(&self) -> ExponentialBuilder {
        ExponentialBuilder::default()
            .with_min_delay(self.base_delay)
            .with_max_delay(self.max_delay)
            .with_factor(BACKOFF_FACTOR)
            .with_max_times(self.max_retries)
            .with_jitter()
    }

    /// Run `operation` until it succeeds, fails permanently, or the retry
    /// budget is exhausted.
    pub async fn run<T, F, Fut>(&self, operation: &str, f: F) -> Result<T>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T>>,
    {
        let delays = AtomicUsize::new(0);

        let result = f
            .retry(self.backoff())
            .sleep(tokio::time::sleep)
            .when(is_transient)
            .notify(|err: &FairError, dur: Duration| {
                let attempt = delays.fetch_add(1, Ordering::Relaxed) + 1;
                warn!(
                    operation,
                    attempt,
                    delay_ms = dur.as_millis() as u64,
                    error = %err,
                    "Transient completion failure, backing off"
                );
            })
            .await;

        match result {
            Ok(value) => Ok(value),
            Err(FairError::AiService(e)) if e.category.is_retryable() => {
                let attempts = delays.load(Ordering::Relaxed) + 1;
                Err(FairError::AiService(e.exhausted(attempts)))
            }
            Err(e) => Err(e),
        }
    }
}

fn is_transient(err: &FairError) -> bool {
    match err {
        FairError::AiService(e) => e.category.is_retryable(),
        _ => false,
    }
}

/// Provider decorator that applies a [`RetryPolicy`].
///
/// For streams only opening the connection is retried; once tokens flow a
/// failure is surfaced as a stream item.
#[derive(Debug)]
pub struct RetryingProvider<P> {
    inner: P,
    policy: RetryPolicy,
}

impl<P> RetryingProvider<P> {
    pub fn new(inner: P, policy: RetryPolicy) -> Self {
        Self { inner, policy }
    }
}

#[async_trait]
impl<P: CompletionProvider> CompletionProvider for RetryingProvider<P> {
    fn name(&self) -> &str {
        self.inner.name()
    }

    fn model(&self) -> &str {
        self.inner.model()
    }

    async fn complete(
        &self,
        messages: &[ChatMessage],
        options: &CompletionOptions,
    ) -> Result<Completion> {
        self.policy
            .run("complete", || self.inner.complete(messages, options))
            .await
    }

    async fn complete_stream(
        &self,
        messages: &[ChatMessage],
        options: &CompletionOptions,
    ) -> Result<CompletionStream> {
        self.policy
            .run("complete_stream", || self.inner.complete_stream(messages, options))
            .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ai::provider::TokenUsage;
    use crate::types::{ErrorCategory, ErrorClassifier, UPSTREAM_FAILURE_STATUS};
    use std::collections::VecDeque;
    use std::sync::Mutex;

    fn fast_policy(max_retries: usize) -> RetryPolicy {
        RetryPolicy::new(max_retries, Duration::from_millis(1), Duration::from_millis(2))
    }

    /// Replays a fixed list of upstream statuses (200 = success)
    struct ScriptedProvider {
        statuses: Mutex<VecDeque<u16>>,
        calls: AtomicUsize,
    }

    impl ScriptedProvider {
        fn new(statuses: &[u16]) -> Self {
            Self {
                statuses: Mutex::new(statuses.iter().copied().collect()),
                calls: AtomicUsize::new(0),
            }
        }

        fn calls(&self) -> usize {
            self.calls.load(Ordering::SeqCst)
        }

        fn next(&self) -> Result<()> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            let status = self.statuses.lock().unwrap().pop_front().unwrap_or(200);
            if status == 200 {
                Ok(())
            } else {
                Err(ErrorClassifier::classify_http_status(status, "scripted", "test").into())
            }
        }
    }

    #[async_trait]
    impl CompletionProvider for ScriptedProvider {
        fn name(&self) -> &str {
            "scripted"
        }

        fn model(&self) -> &str {
            "scripted-model"
        }

        async fn complete(
            &self,
            _messages: &[ChatMessage],
            _options: &CompletionOptions,
        ) -> Result<Completion> {
            self.next()?;
            Ok(Completion {
                content: "ok".into(),
                usage: TokenUsage::default(),
                model: "scripted-model".into(),
            })
        }

        async fn complete_stream(
            &self,
            _messages: &[ChatMessage],
            _options: &CompletionOptions,
        ) -> Result<CompletionStream> {
            self.next()?;
            Ok(Box::pin(futures::stream::empty()))
        }
    }

    fn options() -> CompletionOptions {
        CompletionOptions {
            model: "m".into(),
            temperature: 0.0,
            max_tokens: 10,
        }
    }

    #[tokio::test]
    async fn test_rate_limit_is_not_retried() {
        let provider = RetryingProvider::new(ScriptedProvider::new(&[429]), fast_policy(3));

        let err = provider.complete(&[], &options()).await.unwrap_err();

        assert_eq!(provider.inner.calls(), 1);
        match err {
            FairError::AiService(e) => {
                assert_eq!(e.status, 429);
                assert!(!e.retryable);
                assert_eq!(e.category, ErrorCategory::RateLimit);
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_server_errors_exhaust_to_502() {
        let max_retries = 3;
        let provider = RetryingProvider::new(
            ScriptedProvider::new(&[500; 4]),
            fast_policy(max_retries),
        );

        let err = provider.complete(&[], &options()).await.unwrap_err();

        assert_eq!(provider.inner.calls(), max_retries + 1);
        match err {
            FairError::AiService(e) => {
                assert_eq!(e.status, UPSTREAM_FAILURE_STATUS);
                assert!(e.retryable);
                assert_eq!(e.upstream_status, Some(500));
                assert!(e.message.contains("after 4 attempts"));
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_exactly_max_retries_delays() {
        let policy = fast_policy(2);
        let attempts = AtomicUsize::new(0);

        let result: Result<()> = policy
            .run("count", || async {
                attempts.fetch_add(1, Ordering::SeqCst);
                Err(ErrorClassifier::classify_http_status(503, "down", "test").into())
            })
            .await;

        assert!(result.is_err());
        assert_eq!(attempts.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_recovers_after_transient_failure() {
        let provider = RetryingProvider::new(ScriptedProvider::new(&[502, 200]), fast_policy(3));

        let completion = provider.complete(&[], &options()).await.unwrap();

        assert_eq!(completion.content, "ok");
        assert_eq!(provider.inner.calls(), 2);
    }

    #[tokio::test]
    async fn test_stream_open_is_retried() {
        let provider = RetryingProvider::new(ScriptedProvider::new(&[500, 200]), fast_policy(1));
        assert!(provider.complete_stream(&[], &options()).await.is_ok());
        assert_eq!(provider.inner.calls(), 2);
    }

    #[tokio::test]
    async fn test_non_ai_errors_pass_through() {
        let policy = fast_policy(3);
        let attempts = AtomicUsize::new(0);

        let result: Result<()> = policy
            .run("config", || async {
                attempts.fetch_add(1, Ordering::SeqCst);
                Err(FairError::Config("missing key".into()))
            })
            .await;

        assert!(matches!(result, Err(FairError::Config(_))));
        assert_eq!(attempts.load(Ordering::SeqCst), 1);
    }
}
