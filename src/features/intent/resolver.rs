//! Intent resolution with ordered provider fallback.

use chrono::{DateTime, Utc};
use log::{debug, error, warn};
use std::sync::Arc;
use std::time::Duration;
use tokio::time::timeout;
use uuid::Uuid;

use crate::features::intent::prompt::{build_classifier_prompt, PromptProfile};
use crate::features::intent::providers::IntentProvider;
use crate::features::intent::types::Intent;

/// Upper bound on any single provider attempt; a timed-out provider is
/// treated exactly like a failed one.
const PROVIDER_DEADLINE: Duration = Duration::from_secs(30);

/// Turns raw user text into a structured [`Intent`].
///
/// Providers are an ordered list of strategies, tried in sequence; the
/// first success wins. This never returns an error: if every strategy
/// fails, the result is a synthetic `provider_error` intent the router can
/// show to the user.
pub struct IntentResolver {
    profile: PromptProfile,
    providers: Vec<Arc<dyn IntentProvider>>,
}

impl IntentResolver {
    pub fn new(profile: PromptProfile, providers: Vec<Arc<dyn IntentProvider>>) -> Self {
        IntentResolver { profile, providers }
    }

    /// Resolve `text` against the providers, using `now` for all
    /// relative-time math (never the moment a provider answers).
    pub async fn resolve(&self, text: &str, now: DateTime<Utc>, request_id: Uuid) -> Intent {
        let prompt = build_classifier_prompt(&self.profile, text, now);

        for (position, provider) in self.providers.iter().enumerate() {
            match timeout(PROVIDER_DEADLINE, provider.classify(&prompt, text)).await {
                Ok(Ok(mut intent)) => {
                    debug!(
                        "[{request_id}] {} classified message as {:?}",
                        provider.name(),
                        intent.intent
                    );
                    if position > 0 && intent.provider_tag.is_none() {
                        intent.provider_tag = Some("🤖 fallback AI active".to_string());
                    }
                    return intent;
                }
                Ok(Err(e)) => {
                    warn!("[{request_id}] {} classifier failed: {e:#}", provider.name());
                }
                Err(_) => {
                    warn!(
                        "[{request_id}] {} classifier timed out after {}s",
                        provider.name(),
                        PROVIDER_DEADLINE.as_secs()
                    );
                }
            }
        }

        error!("[{request_id}] all classification providers failed");
        Intent::provider_error(
            "Both my primary and fallback AI services are unavailable right now. \
             Please try again in a little while.",
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::database::Database;
    use crate::features::intent::providers::MeteredClassifier;
    use crate::features::intent::types::IntentKind;
    use crate::features::quota::UsageLimiter;
    use anyhow::{bail, Result};
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicU32, Ordering};

    struct ScriptedProvider {
        name: &'static str,
        succeeds: bool,
        calls: Arc<AtomicU32>,
    }

    impl ScriptedProvider {
        fn new(name: &'static str, succeeds: bool) -> (Arc<Self>, Arc<AtomicU32>) {
            let calls = Arc::new(AtomicU32::new(0));
            let provider = Arc::new(ScriptedProvider {
                name,
                succeeds,
                calls: calls.clone(),
            });
            (provider, calls)
        }
    }

    #[async_trait]
    impl IntentProvider for ScriptedProvider {
        fn name(&self) -> &'static str {
            self.name
        }

        async fn classify(&self, _prompt: &str, _message: &str) -> Result<Intent> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            if self.succeeds {
                Ok(Intent {
                    intent: IntentKind::Chat,
                    task_or_message: Some(format!("reply from {}", self.name)),
                    ..Intent::default()
                })
            } else {
                bail!("{} is down", self.name)
            }
        }
    }

    fn profile() -> PromptProfile {
        PromptProfile {
            assistant_name: "Aria".to_string(),
            owner_name: "Alex".to_string(),
        }
    }

    fn resolver(providers: Vec<Arc<dyn IntentProvider>>) -> IntentResolver {
        IntentResolver::new(profile(), providers)
    }

    #[tokio::test]
    async fn test_first_provider_success_stops_the_chain() {
        let (primary, _) = ScriptedProvider::new("primary", true);
        let (fallback, fallback_calls) = ScriptedProvider::new("fallback", true);
        let resolver = resolver(vec![primary, fallback]);

        let intent = resolver.resolve("hi", Utc::now(), Uuid::new_v4()).await;
        assert_eq!(intent.task_or_message.as_deref(), Some("reply from primary"));
        assert_eq!(fallback_calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_primary_failure_falls_through_with_tag() {
        let (primary, _) = ScriptedProvider::new("primary", false);
        let (fallback, _) = ScriptedProvider::new("fallback", true);
        let resolver = resolver(vec![primary, fallback]);

        let intent = resolver.resolve("hi", Utc::now(), Uuid::new_v4()).await;
        assert_eq!(intent.task_or_message.as_deref(), Some("reply from fallback"));
        assert_eq!(intent.provider_tag.as_deref(), Some("🤖 fallback AI active"));
    }

    #[tokio::test]
    async fn test_all_providers_failing_degrades_to_provider_error() {
        let (primary, _) = ScriptedProvider::new("primary", false);
        let (fallback, _) = ScriptedProvider::new("fallback", false);
        let resolver = resolver(vec![primary, fallback]);

        let intent = resolver.resolve("hi", Utc::now(), Uuid::new_v4()).await;
        assert_eq!(intent.intent, IntentKind::ProviderError);
        assert!(intent
            .task_or_message
            .as_deref()
            .unwrap_or_default()
            .contains("unavailable"));
    }

    #[tokio::test]
    async fn test_quota_gates_primary_across_a_day() {
        // Ceiling of 2: calls 1-2 use the metered primary, call 3 must skip
        // it and land on the fallback; with the fallback down too, call 3
        // degrades to provider_error.
        let limiter = UsageLimiter::new(Database::new(":memory:").await.unwrap(), 2);
        let (inner_primary, primary_calls) = ScriptedProvider::new("primary", true);
        let metered: Arc<dyn IntentProvider> = Arc::new(MeteredClassifier::new(
            Box::new(ScriptedForwarder(inner_primary)),
            limiter,
        ));
        let (fallback, fallback_calls) = ScriptedProvider::new("fallback", false);
        let resolver = resolver(vec![metered, fallback]);

        let first = resolver.resolve("one", Utc::now(), Uuid::new_v4()).await;
        assert_eq!(first.intent, IntentKind::Chat);
        assert_eq!(first.provider_tag.as_deref(), Some("⚡ 1 primary requests left today"));
        let second = resolver.resolve("two", Utc::now(), Uuid::new_v4()).await;
        assert_eq!(second.intent, IntentKind::Chat);

        let third = resolver.resolve("three", Utc::now(), Uuid::new_v4()).await;
        assert_eq!(third.intent, IntentKind::ProviderError);
        assert_eq!(primary_calls.load(Ordering::SeqCst), 2);
        assert_eq!(fallback_calls.load(Ordering::SeqCst), 1);
    }

    /// Adapter so a shared `Arc` provider can be boxed into the decorator.
    struct ScriptedForwarder(Arc<ScriptedProvider>);

    #[async_trait]
    impl IntentProvider for ScriptedForwarder {
        fn name(&self) -> &'static str {
            self.0.name()
        }

        async fn classify(&self, prompt: &str, message: &str) -> Result<Intent> {
            self.0.classify(prompt, message).await
        }
    }
}
