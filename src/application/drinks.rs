//! Drink operations: ingredient identification and recipe generation.
//!
//! Each operation consults the result cache before paying for a completion;
//! fresh completions are normalized/validated, stored back under the
//! request's content-derived key, and returned. Cache failures never fail a
//! request, completion failures always do.

use std::sync::Arc;
use std::time::Instant;

use async_trait::async_trait;
use serde::Serialize;
use serde_json::Value;
use thiserror::Error;
use tracing::info;

use crate::cache::{CacheTimings, ResultCache, TimingMode};
use crate::domain::error::DomainError;
use crate::domain::ingredients::{IdentifiedIngredients, IdentifyRequest};
use crate::domain::recipes::{RecipeRequest, RecipeSet};

use super::prompts;

pub const IDENTIFY_ENDPOINT: &str = "identify";
pub const RECIPES_ENDPOINT: &str = "recipes";

/// A completion call failed. Unlike cache errors these surface to the
/// caller: the completion is the request path, not an optimization.
#[derive(Debug, Error)]
pub enum CompletionError {
    #[error("completion service rejected the request as invalid")]
    InvalidRequest,
    #[error("completion service refused the configured credentials")]
    BadCredentials,
    #[error("completion service rate limit exceeded")]
    RateLimited,
    #[error("completion request timed out")]
    Timeout,
    #[error("completion text did not contain valid JSON: {preview}")]
    MalformedCompletion { preview: String },
    #[error("completion transport failed: {message}")]
    Transport { message: String },
}

/// The upstream chat-completion service, abstracted so tests substitute a
/// canned backend.
#[async_trait]
pub trait CompletionBackend: Send + Sync {
    /// Send a prompt (plus optional base64 image data URI) and return the
    /// JSON payload extracted from the completion text.
    async fn complete(
        &self,
        prompt: &str,
        image_data_uri: Option<&str>,
    ) -> Result<Value, CompletionError>;
}

#[derive(Debug, Error)]
pub enum DrinkError {
    #[error("invalid request: {0}")]
    InvalidRequest(String),
    #[error(transparent)]
    Completion(#[from] CompletionError),
    /// The completion parsed as JSON but not as the expected shape.
    #[error(transparent)]
    UnusableCompletion(#[from] DomainError),
}

/// Outcome of a drink operation, with timings when the caller asked for
/// them.
#[derive(Debug)]
pub struct DrinkReply {
    pub data: Value,
    pub timings: Option<ReplyTimings>,
}

#[derive(Debug, Serialize)]
pub struct ReplyTimings {
    /// Tier probes from the cache lookup, including which tier answered.
    pub lookup: CacheTimings,
    /// Elapsed completion time when the cache missed.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub completion_ms: Option<u64>,
    /// Tier probes from storing a fresh completion.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub store: Option<CacheTimings>,
}

/// Orchestrates the cache and the completion backend for both drink
/// operations.
pub struct DrinkService {
    cache: ResultCache,
    backend: Arc<dyn CompletionBackend>,
}

impl DrinkService {
    pub fn new(cache: ResultCache, backend: Arc<dyn CompletionBackend>) -> Self {
        Self { cache, backend }
    }

    /// Identify cocktail ingredients from a photo.
    pub async fn identify(&self, body: Value, debug: bool) -> Result<DrinkReply, DrinkError> {
        let request: IdentifyRequest = serde_json::from_value(body.clone())
            .map_err(|err| DrinkError::InvalidRequest(err.to_string()))?;
        if request.photo_data_uri.is_none() {
            return Err(DrinkError::InvalidRequest(
                "photoDataUri is required".to_string(),
            ));
        }

        let mode = timing_mode(debug);
        let (cached, lookup) = self
            .cache
            .get(IDENTIFY_ENDPOINT, &body, None, mode)
            .await
            .into_parts();
        if let Some(result) = cached {
            return Ok(reply(result, lookup, None, None));
        }

        let prompt = prompts::identify(&request.current_ingredients());
        let started = Instant::now();
        let raw = self
            .backend
            .complete(&prompt, request.photo_data_uri.as_deref())
            .await?;
        let completion_ms = elapsed_ms(started);

        let normalized = IdentifiedIngredients::from_completion(&raw)?;
        let result = to_value(&normalized)?;
        info!(
            target: "sorso::drinks",
            ingredients = normalized.ingredients.len(),
            uncertain = normalized.uncertain,
            completion_ms,
            "identified ingredients"
        );

        let (_, store) = self
            .cache
            .put(IDENTIFY_ENDPOINT, &body, &result, mode)
            .await
            .into_parts();
        Ok(reply(result, lookup, Some(completion_ms), store))
    }

    /// Generate recipes for a set of available ingredients.
    pub async fn recipes(&self, body: Value, debug: bool) -> Result<DrinkReply, DrinkError> {
        let request: RecipeRequest = serde_json::from_value(body.clone())
            .map_err(|err| DrinkError::InvalidRequest(err.to_string()))?;
        let ingredients = request.ingredient_names();
        if ingredients.is_empty() {
            return Err(DrinkError::InvalidRequest(
                "at least one ingredient is required".to_string(),
            ));
        }

        let mode = timing_mode(debug);
        let (cached, lookup) = self
            .cache
            .get(RECIPES_ENDPOINT, &body, None, mode)
            .await
            .into_parts();
        if let Some(result) = cached {
            return Ok(reply(result, lookup, None, None));
        }

        let prompt = prompts::recipes(
            &ingredients,
            request.filters.as_ref(),
            request.recipes.as_ref(),
        );
        let started = Instant::now();
        let raw = self.backend.complete(&prompt, None).await?;
        let completion_ms = elapsed_ms(started);

        let validated = RecipeSet::from_completion(&raw)?;
        let result = to_value(&validated)?;
        info!(
            target: "sorso::drinks",
            recipes = validated.recipes.len(),
            completion_ms,
            "generated recipes"
        );

        let (_, store) = self
            .cache
            .put(RECIPES_ENDPOINT, &body, &result, mode)
            .await
            .into_parts();
        Ok(reply(result, lookup, Some(completion_ms), store))
    }
}

fn timing_mode(debug: bool) -> TimingMode {
    if debug {
        TimingMode::Capture
    } else {
        TimingMode::Off
    }
}

fn reply(
    data: Value,
    lookup: Option<CacheTimings>,
    completion_ms: Option<u64>,
    store: Option<CacheTimings>,
) -> DrinkReply {
    DrinkReply {
        data,
        timings: lookup.map(|lookup| ReplyTimings {
            lookup,
            completion_ms,
            store,
        }),
    }
}

fn to_value<T: Serialize>(value: &T) -> Result<Value, DrinkError> {
    serde_json::to_value(value)
        .map_err(|err| DomainError::invariant(format!("result serialization failed: {err}")).into())
}

fn elapsed_ms(started: Instant) -> u64 {
    u64::try_from(started.elapsed().as_millis()).unwrap_or(u64::MAX)
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};

    use serde_json::json;
    use tempfile::TempDir;

    use crate::cache::{CacheTier, Deadlines, FallbackStore};

    use super::*;

    struct CannedBackend {
        payload: Value,
        calls: AtomicUsize,
    }

    impl CannedBackend {
        fn new(payload: Value) -> Arc<Self> {
            Arc::new(Self {
                payload,
                calls: AtomicUsize::new(0),
            })
        }

        fn calls(&self) -> usize {
            self.calls.load(Ordering::SeqCst)
        }
    }

    #[async_trait]
    impl CompletionBackend for CannedBackend {
        async fn complete(
            &self,
            _prompt: &str,
            _image_data_uri: Option<&str>,
        ) -> Result<Value, CompletionError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            Ok(self.payload.clone())
        }
    }

    fn service(dir: &TempDir, backend: Arc<dyn CompletionBackend>) -> DrinkService {
        let cache = ResultCache::new(
            None,
            FallbackStore::new(dir.path().to_path_buf()),
            Deadlines::default(),
            None,
        );
        DrinkService::new(cache, backend)
    }

    #[tokio::test]
    async fn identify_normalizes_and_caches() {
        let dir = TempDir::new().expect("tempdir");
        let backend = CannedBackend::new(json!({"newIngredients": ["vodka"], "duplicates": ["lime"]}));
        let service = service(&dir, backend.clone());

        let body = json!({"photoDataUri": "data:image/png;base64,abc", "ingredients": ["lime"]});
        let first = service
            .identify(body.clone(), false)
            .await
            .expect("identify");
        assert_eq!(first.data["ingredients"], json!(["vodka"]));
        assert_eq!(first.data["duplicates"], json!(["lime"]));

        // Same request again: answered from the cache, not the backend.
        let second = service.identify(body, true).await.expect("identify");
        assert_eq!(second.data, first.data);
        assert_eq!(backend.calls(), 1);

        let timings = second.timings.expect("timings");
        assert_eq!(timings.lookup.served_by, Some(CacheTier::File));
        assert!(timings.completion_ms.is_none());
    }

    #[tokio::test]
    async fn identify_requires_a_photo() {
        let dir = TempDir::new().expect("tempdir");
        let service = service(&dir, CannedBackend::new(json!({})));

        let outcome = service.identify(json!({"ingredients": []}), false).await;
        assert!(matches!(outcome, Err(DrinkError::InvalidRequest(_))));
    }

    #[tokio::test]
    async fn reordered_request_bodies_share_one_cache_entry() {
        let dir = TempDir::new().expect("tempdir");
        let backend = CannedBackend::new(json!({
            "recipes": [{
                "name": "Daiquiri",
                "ingredients": [{"name": "rum", "amount": 2.0, "unit": "oz"}],
                "instructions": ["Shake with ice"],
                "suggestedGlass": "Coupe",
            }],
        }));
        let service = service(&dir, backend.clone());

        service
            .recipes(json!({"ingredients": ["rum", "lime"], "filters": {"isAlcoholic": true}}), false)
            .await
            .expect("recipes");
        service
            .recipes(json!({"filters": {"isAlcoholic": true}, "ingredients": ["rum", "lime"]}), false)
            .await
            .expect("recipes");

        assert_eq!(backend.calls(), 1);
    }

    #[tokio::test]
    async fn recipes_require_ingredients() {
        let dir = TempDir::new().expect("tempdir");
        let service = service(&dir, CannedBackend::new(json!({"recipes": []})));

        let outcome = service.recipes(json!({"ingredients": []}), false).await;
        assert!(matches!(outcome, Err(DrinkError::InvalidRequest(_))));
    }

    #[tokio::test]
    async fn unusable_completions_are_not_cached() {
        let dir = TempDir::new().expect("tempdir");
        let backend = CannedBackend::new(json!({"drinks": "wrong shape"}));
        let service = service(&dir, backend.clone());

        let body = json!({"ingredients": ["rum"]});
        let outcome = service.recipes(body.clone(), false).await;
        assert!(matches!(outcome, Err(DrinkError::UnusableCompletion(_))));

        // The rejected payload never entered the cache, so a retry pays for
        // a fresh completion.
        let _ = service.recipes(body, false).await;
        assert_eq!(backend.calls(), 2);
    }

    #[tokio::test]
    async fn debug_timings_report_the_store_probes_on_a_miss() {
        let dir = TempDir::new().expect("tempdir");
        let backend = CannedBackend::new(json!({"ingredients": ["gin"]}));
        let service = service(&dir, backend);

        let body = json!({"photoDataUri": "data:image/png;base64,abc"});
        let reply = service.identify(body, true).await.expect("identify");

        let timings = reply.timings.expect("timings");
        assert!(timings.lookup.served_by.is_none());
        assert!(timings.completion_ms.is_some());
        let store = timings.store.expect("store timings");
        assert_eq!(store.probes.len(), 1);
    }
}
