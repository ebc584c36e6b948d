use crate::error::AppError;
use crate::gemini::VerdictGenerator;
use crate::models::VerdictResponse;
use crate::prompt::PromptBuilder;
use crate::sanitize::{remove_emphasis_marks, split_into_sentences};
use crate::store::{Database, StoreError, Verdict};
use std::sync::Arc;
use tokio::task;
use tracing::{debug, info, warn};

/// Where a verdict request ended up before it was answered
#[derive(Debug)]
enum Outcome {
    CacheHit(Verdict),
    Created(Verdict),
    LostRace(Verdict),
}

impl Outcome {
    fn into_response(self) -> VerdictResponse {
        match self {
            Outcome::CacheHit(verdict) | Outcome::LostRace(verdict) => {
                let cleaned = remove_emphasis_marks(verdict.result.as_str());
                VerdictResponse {
                    username: verdict.username,
                    survive: verdict.survive,
                    result: split_into_sentences(cleaned.as_str()),
                    from_cache: true,
                }
            }
            // Freshly generated text was already cleaned by the generator
            Outcome::Created(verdict) => VerdictResponse {
                result: split_into_sentences(verdict.result.as_str()),
                username: verdict.username,
                survive: verdict.survive,
                from_cache: false,
            },
        }
    }
}

/// Find-or-create for survival verdicts
pub struct VerdictService {
    store: Arc<Database>,
    generator: Arc<dyn VerdictGenerator>,
    prompts: PromptBuilder,
}

impl VerdictService {
    pub fn new(store: Arc<Database>, generator: Arc<dyn VerdictGenerator>) -> Self {
        Self {
            store,
            generator,
            prompts: PromptBuilder::new(),
        }
    }

    /// Answer a verdict request for `username`.
    /// At most one generation call and one insert, plus one re-read if another request won the insert.
    pub async fn verdict_for(&self, username: Option<&str>) -> Result<VerdictResponse, AppError> {
        let username = match username {
            Some(name) if !name.is_empty() => name,
            _ => {
                debug!("Rejected verdict request without a username");
                return Err(AppError::BadRequest);
            }
        };

        let outcome = match self.find(username).await? {
            Some(existing) => {
                info!(username, "Verdict served from cache");
                Outcome::CacheHit(existing)
            }
            None => {
                info!(username, "No verdict yet, asking the model");
                self.generate_and_persist(username).await?
            }
        };

        Ok(outcome.into_response())
    }

    async fn generate_and_persist(&self, username: &str) -> Result<Outcome, AppError> {
        let prompt = self.prompts.build(username);
        let generated = self.generator.generate(&prompt).await?;

        let owned = username.to_string();
        let inserted = self
            .on_store(move |store| store.create(&owned, generated.survive, &generated.result))
            .await?;

        match inserted {
            Ok(created) => {
                info!(username, survive = created.survive, "Stored new verdict");
                Ok(Outcome::Created(created))
            }
            Err(StoreError::DuplicateKey(_)) => {
                warn!(username, "Lost verdict insert race, re-reading stored verdict");
                self.reread(username).await
            }
            Err(e) => Err(e.into()),
        }
    }

    async fn reread(&self, username: &str) -> Result<Outcome, AppError> {
        self.find(username)
            .await?
            .map(Outcome::LostRace)
            .ok_or_else(|| {
                AppError::Internal(format!(
                    "verdict for '{}' vanished after a duplicate insert",
                    username
                ))
            })
    }

    async fn find(&self, username: &str) -> Result<Option<Verdict>, AppError> {
        let owned = username.to_string();
        Ok(self
            .on_store(move |store| store.find_by_username(&owned))
            .await??)
    }

    /// Run a store operation on the blocking pool; SQLite calls block on disk I/O
    async fn on_store<T, F>(&self, op: F) -> Result<Result<T, StoreError>, AppError>
    where
        F: FnOnce(&Database) -> Result<T, StoreError> + Send + 'static,
        T: Send + 'static,
    {
        let store = self.store.clone();
        task::spawn_blocking(move || op(&store))
            .await
            .map_err(|e| AppError::Internal(format!("verdict store task failed: {}", e)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::GeneratedVerdict;
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Mutex;
    use std::time::Duration;

    /// Returns a fixed verdict and records every prompt it was given
    struct ScriptedGenerator {
        verdict: GeneratedVerdict,
        prompts: Mutex<Vec<String>>,
    }

    impl ScriptedGenerator {
        fn new(survive: bool, result: &str) -> Self {
            Self {
                verdict: GeneratedVerdict {
                    survive,
                    result: result.to_string(),
                },
                prompts: Mutex::new(Vec::new()),
            }
        }

        fn calls(&self) -> usize {
            self.prompts.lock().unwrap().len()
        }
    }

    #[async_trait]
    impl VerdictGenerator for ScriptedGenerator {
        async fn generate(&self, prompt: &str) -> Result<GeneratedVerdict, AppError> {
            self.prompts.lock().unwrap().push(prompt.to_string());
            // Stand in for network latency so concurrent requests overlap
            tokio::time::sleep(Duration::from_millis(20)).await;
            Ok(self.verdict.clone())
        }
    }

    struct FailingGenerator;

    #[async_trait]
    impl VerdictGenerator for FailingGenerator {
        async fn generate(&self, _prompt: &str) -> Result<GeneratedVerdict, AppError> {
            Err(AppError::GenerationFailed)
        }
    }

    /// Simulates a concurrent request that stores its verdict while this one is generating
    struct RacingGenerator {
        store: Arc<Database>,
        calls: AtomicUsize,
    }

    #[async_trait]
    impl VerdictGenerator for RacingGenerator {
        async fn generate(&self, prompt: &str) -> Result<GeneratedVerdict, AppError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            let username = if prompt.contains("racer") { "racer" } else { "other" };
            self.store
                .create(username, true, "The *other* request won. You live.")
                .map_err(AppError::from)?;
            Ok(GeneratedVerdict {
                survive: false,
                result: "This one should never be stored.".to_string(),
            })
        }
    }

    fn service_with(generator: Arc<dyn VerdictGenerator>) -> (VerdictService, Arc<Database>) {
        let store = Arc::new(Database::in_memory().unwrap());
        (VerdictService::new(store.clone(), generator), store)
    }

    #[tokio::test]
    async fn test_first_request_generates_then_caches() {
        let generator = Arc::new(ScriptedGenerator::new(
            false,
            "You tripped over a Roomba. It was not impressed.",
        ));
        let (service, store) = service_with(generator.clone());

        let first = service.verdict_for(Some("ada")).await.unwrap();
        assert!(!first.from_cache);
        assert!(!first.survive);
        assert_eq!(
            first.result,
            vec!["You tripped over a Roomba", "It was not impressed"]
        );

        let second = service.verdict_for(Some("ada")).await.unwrap();
        assert!(second.from_cache);
        assert_eq!(second.survive, first.survive);
        assert_eq!(second.result, first.result);

        assert_eq!(generator.calls(), 1);
        assert_eq!(store.count().unwrap(), 1);
        assert_eq!(
            store.find_by_username("ada").unwrap().unwrap().result,
            "You tripped over a Roomba. It was not impressed."
        );
    }

    #[tokio::test]
    async fn test_cache_hit_strips_legacy_emphasis() {
        let generator = Arc::new(ScriptedGenerator::new(true, "unused"));
        let (service, store) = service_with(generator.clone());
        store
            .create("legacy", true, "You *survived*. The robots **hate** that.")
            .unwrap();

        let response = service.verdict_for(Some("legacy")).await.unwrap();
        assert!(response.from_cache);
        assert_eq!(
            response.result,
            vec!["You survived", "The robots hate that"]
        );
        assert_eq!(generator.calls(), 0);

        // Stored text is not rewritten
        assert!(store.find_by_username("legacy").unwrap().unwrap().result.contains('*'));
    }

    #[tokio::test]
    async fn test_missing_username_never_reaches_collaborators() {
        let generator = Arc::new(ScriptedGenerator::new(true, "unused"));
        let (service, store) = service_with(generator.clone());

        for username in [None, Some("")] {
            let err = service.verdict_for(username).await.unwrap_err();
            assert!(matches!(err, AppError::BadRequest));
        }

        assert_eq!(generator.calls(), 0);
        assert_eq!(store.count().unwrap(), 0);
    }

    #[tokio::test]
    async fn test_whitespace_username_is_a_real_username() {
        let generator = Arc::new(ScriptedGenerator::new(false, "Blank stare. Blank future."));
        let (service, store) = service_with(generator.clone());

        let first = service.verdict_for(Some("   ")).await.unwrap();
        assert!(!first.from_cache);
        assert_eq!(first.username, "   ");
        assert_eq!(first.result, vec!["Blank stare", "Blank future"]);

        let second = service.verdict_for(Some("   ")).await.unwrap();
        assert!(second.from_cache);
        assert_eq!(second.result, first.result);

        assert_eq!(generator.calls(), 1);
        assert!(store.find_by_username("   ").unwrap().is_some());
        assert!(store.find_by_username("").unwrap().is_none());
    }

    #[tokio::test]
    async fn test_generation_failure_writes_nothing() {
        let (service, store) = service_with(Arc::new(FailingGenerator));

        let err = service.verdict_for(Some("unlucky")).await.unwrap_err();
        assert!(matches!(err, AppError::GenerationFailed));
        assert!(store.find_by_username("unlucky").unwrap().is_none());
    }

    #[tokio::test]
    async fn test_lost_race_returns_stored_verdict() {
        let store = Arc::new(Database::in_memory().unwrap());
        let generator = Arc::new(RacingGenerator {
            store: store.clone(),
            calls: AtomicUsize::new(0),
        });
        let service = VerdictService::new(store.clone(), generator.clone());

        let response = service.verdict_for(Some("racer")).await.unwrap();
        assert!(response.from_cache);
        assert!(response.survive);
        assert_eq!(response.result, vec!["The other request won", "You live"]);

        assert_eq!(generator.calls.load(Ordering::SeqCst), 1);
        assert_eq!(store.count().unwrap(), 1);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_concurrent_first_requests_store_one_verdict() {
        let generator = Arc::new(ScriptedGenerator::new(true, "You hid in a fridge. Smart."));
        let (service, store) = service_with(generator.clone());
        let service = Arc::new(service);

        let handles: Vec<_> = (0..16)
            .map(|_| {
                let service = service.clone();
                tokio::spawn(async move { service.verdict_for(Some("crowd")).await })
            })
            .collect();

        let mut fresh = 0;
        for handle in handles {
            let response = handle.await.unwrap().unwrap();
            assert!(response.survive);
            assert_eq!(response.result, vec!["You hid in a fridge", "Smart"]);
            if !response.from_cache {
                fresh += 1;
            }
        }

        assert_eq!(fresh, 1);
        assert_eq!(store.count().unwrap(), 1);
        // Requests overlapped, so the losers went through the duplicate-key path
        assert!(generator.calls() > 1, "requests never overlapped");
    }

    #[tokio::test]
    async fn test_allow_listed_prompt_forces_survival() {
        let generator = Arc::new(ScriptedGenerator::new(true, "Fine. You live."));
        let (service, _) = service_with(generator.clone());

        service.verdict_for(Some("atulit_gaur")).await.unwrap();
        let prompts = generator.prompts.lock().unwrap();
        assert!(prompts[0].contains("atulit_gaur will definitely survive"));
    }
}
