//! Location key to coordinates resolution.
//!
//! Lookup order for a key:
//!
//! 1. normalize the key (see [`normalize_key`]);
//! 2. return the cached coordinates, if any;
//! 3. in [`FallbackMode::BeforeService`], return the country centroid;
//! 4. query the geocoding service with retry and exponential backoff;
//! 5. cache a usable result, then wait `post_success_delay` to stay under
//!    the service's rate limit;
//! 6. in [`FallbackMode::AfterService`], substitute the country centroid
//!    for a failed or empty lookup.
//!
//! Concurrent lookups of the same normalized key share one service call.

use std::sync::Arc;
use std::time::Duration;

use reqwest::Url;
use serde_json::Value;
use tokio_util::sync::CancellationToken;

use super::cache::GeocodeCache;
use super::error::GeocodeError;
use super::fallback::{approximate, FallbackMode};
use super::normalize::{normalize_key, to_query};
use crate::coalesce::RequestCoalescer;
use crate::coord::Coordinates;
use crate::http::{AsyncHttpClient, HttpError};
use crate::retry::RetryPolicy;

/// Public Nominatim search endpoint.
pub const DEFAULT_GEOCODE_ENDPOINT: &str = "https://nominatim.openstreetmap.org/search";

/// Default per-attempt request timeout.
pub const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(10);

/// Default pause after a successful service lookup.
pub const DEFAULT_POST_SUCCESS_DELAY: Duration = Duration::from_millis(800);

/// Resolver behaviour.
#[derive(Debug, Clone, PartialEq)]
pub struct ResolverSettings {
    /// Search endpoint; `q`, `format` and `limit` are appended.
    pub endpoint: Url,
    /// Bound on each attempt.
    pub request_timeout: Duration,
    pub retry: RetryPolicy,
    /// Pause after a successful lookup, before returning.
    pub post_success_delay: Duration,
    pub fallback: FallbackMode,
}

impl Default for ResolverSettings {
    fn default() -> Self {
        Self {
            endpoint: default_endpoint(),
            request_timeout: DEFAULT_REQUEST_TIMEOUT,
            retry: RetryPolicy::default(),
            post_success_delay: DEFAULT_POST_SUCCESS_DELAY,
            fallback: FallbackMode::Disabled,
        }
    }
}

fn default_endpoint() -> Url {
    Url::parse(DEFAULT_GEOCODE_ENDPOINT).expect("default geocode endpoint is a valid URL")
}

/// Where a resolved coordinate came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResolveSource {
    Cache,
    Service,
    /// Country centroid; never cached.
    Approximate,
}

/// A successful lookup.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Resolved {
    pub coords: Coordinates,
    pub source: ResolveSource,
}

type LookupResult = Result<Option<Resolved>, GeocodeError>;

/// Resolves location keys through the cache and the geocoding service.
pub struct GeocodeResolver<C: AsyncHttpClient> {
    client: C,
    cache: Arc<GeocodeCache>,
    settings: ResolverSettings,
    in_flight: RequestCoalescer<String, LookupResult>,
}

impl<C: AsyncHttpClient> GeocodeResolver<C> {
    pub fn new(client: C, cache: Arc<GeocodeCache>, settings: ResolverSettings) -> Self {
        Self {
            client,
            cache,
            settings,
            in_flight: RequestCoalescer::new("geocode"),
        }
    }

    /// Resolves `key` to coordinates.
    ///
    /// `Ok(None)` means the service does not know the location.
    pub async fn resolve(&self, key: &str) -> Result<Option<Coordinates>, GeocodeError> {
        Ok(self.lookup(key).await?.map(|r| r.coords))
    }

    /// Like [`resolve`](Self::resolve), also reporting where the result
    /// came from.
    pub async fn lookup(&self, key: &str) -> LookupResult {
        let key = key.trim();
        if key.is_empty() {
            return Err(GeocodeError::InvalidKey(key.to_string()));
        }
        let normalized = normalize_key(key).into_owned();

        if let Some(coords) = self.cache.get(&normalized) {
            tracing::trace!(key = %normalized, "Geocode cache hit");
            return Ok(Some(Resolved {
                coords,
                source: ResolveSource::Cache,
            }));
        }

        if self.settings.fallback == FallbackMode::BeforeService {
            if let Some(coords) = approximate(&normalized) {
                return Ok(Some(Resolved {
                    coords,
                    source: ResolveSource::Approximate,
                }));
            }
        }

        self.in_flight
            .execute(normalized.clone(), || self.lookup_remote(&normalized))
            .await
    }

    /// Like [`lookup`](Self::lookup), giving up with
    /// [`GeocodeError::Cancelled`] when `cancel` fires first.
    pub async fn lookup_cancellable(&self, key: &str, cancel: &CancellationToken) -> LookupResult {
        tokio::select! {
            biased;
            _ = cancel.cancelled() => Err(GeocodeError::Cancelled),
            result = self.lookup(key) => result,
        }
    }

    /// Shared cache backing this resolver.
    pub fn cache(&self) -> &Arc<GeocodeCache> {
        &self.cache
    }

    pub fn settings(&self) -> &ResolverSettings {
        &self.settings
    }

    async fn lookup_remote(&self, key: &str) -> LookupResult {
        // Another leader may have finished between our cache check and
        // registering.
        if let Some(coords) = self.cache.get(key) {
            return Ok(Some(Resolved {
                coords,
                source: ResolveSource::Cache,
            }));
        }

        let outcome = self.query_service(key).await;
        let outcome = match outcome {
            Ok(Some(coords)) => {
                self.cache.put(key, coords);
                tracing::info!(key, %coords, "Geocoded location");
                if !self.settings.post_success_delay.is_zero() {
                    tokio::time::sleep(self.settings.post_success_delay).await;
                }
                return Ok(Some(Resolved {
                    coords,
                    source: ResolveSource::Service,
                }));
            }
            other => other,
        };

        if self.settings.fallback == FallbackMode::AfterService {
            if let Some(coords) = approximate(key) {
                tracing::info!(key, %coords, "Using approximate country location");
                return Ok(Some(Resolved {
                    coords,
                    source: ResolveSource::Approximate,
                }));
            }
        }

        match outcome {
            Ok(_) => {
                tracing::info!(key, "No geocoding results");
                Ok(None)
            }
            Err(e) => {
                tracing::warn!(key, error = %e, "Geocoding failed");
                Err(e)
            }
        }
    }

    fn search_url(&self, key: &str) -> Url {
        let mut url = self.settings.endpoint.clone();
        url.query_pairs_mut()
            .append_pair("q", &to_query(key))
            .append_pair("format", "json")
            .append_pair("limit", "1");
        url
    }

    /// Queries the service with retries. `Ok(None)` is a successful empty
    /// or unusable answer.
    async fn query_service(&self, key: &str) -> Result<Option<Coordinates>, GeocodeError> {
        let url = self.search_url(key);
        let timeout = self.settings.request_timeout;
        let max_attempts = self.settings.retry.max_attempts();
        let mut attempt = 1;

        loop {
            let error = match tokio::time::timeout(timeout, self.client.get(url.as_str(), timeout)).await {
                Ok(Ok(body)) => return parse_search_response(&body),
                Ok(Err(e)) => e,
                Err(_) => HttpError::Timeout(timeout),
            };

            tracing::warn!(
                key,
                attempt,
                max_attempts,
                error = %error,
                "Geocode attempt failed"
            );

            match self.settings.retry.delay_for_attempt(attempt) {
                Some(delay) => {
                    tracing::debug!(key, delay_ms = delay.as_millis() as u64, "Retrying geocode");
                    tokio::time::sleep(delay).await;
                    attempt += 1;
                }
                None => {
                    return Err(GeocodeError::RetriesExhausted {
                        attempts: attempt,
                        last: error,
                    })
                }
            }
        }
    }
}

fn parse_coordinate(value: Option<&Value>) -> Option<f64> {
    match value? {
        Value::String(s) => s.trim().parse().ok(),
        Value::Number(n) => n.as_f64(),
        _ => None,
    }
}

/// Decodes a Nominatim search response: a JSON array whose first element
/// carries `lat` and `lon` as strings or numbers.
pub(crate) fn parse_search_response(body: &[u8]) -> Result<Option<Coordinates>, GeocodeError> {
    let hits: Vec<Value> =
        serde_json::from_slice(body).map_err(|e| GeocodeError::Decode(e.to_string()))?;

    let Some(first) = hits.first() else {
        return Ok(None);
    };

    let lat = parse_coordinate(first.get("lat"));
    let lon = parse_coordinate(first.get("lon"));
    match (lat, lon) {
        (Some(lat), Some(lon)) => {
            let coords = Coordinates::new(lat, lon);
            Ok(coords.is_usable().then_some(coords))
        }
        _ => Ok(None),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::http::tests::{nominatim_body, ScriptedHttpClient};
    use bytes::Bytes;
    use tokio::time::Instant;

    fn settings() -> ResolverSettings {
        ResolverSettings::default()
    }

    fn resolver(
        client: ScriptedHttpClient,
        settings: ResolverSettings,
    ) -> GeocodeResolver<Arc<ScriptedHttpClient>> {
        GeocodeResolver::new(
            Arc::new(client),
            Arc::new(GeocodeCache::in_memory()),
            settings,
        )
    }

    fn not_found() -> Result<Bytes, HttpError> {
        Ok(Bytes::from_static(b"[]"))
    }

    #[test]
    fn test_parse_string_and_number_coordinates() {
        let parsed = parse_search_response(br#"[{"lat":"48.8566","lon":"2.3522"}]"#).unwrap();
        assert_eq!(parsed, Some(Coordinates::new(48.8566, 2.3522)));

        let parsed = parse_search_response(br#"[{"lat":51.5,"lon":-0.12}]"#).unwrap();
        assert_eq!(parsed, Some(Coordinates::new(51.5, -0.12)));
    }

    #[test]
    fn test_parse_empty_and_unusable() {
        assert_eq!(parse_search_response(b"[]").unwrap(), None);
        assert_eq!(
            parse_search_response(br#"[{"lat":"0","lon":"0"}]"#).unwrap(),
            None
        );
        assert_eq!(parse_search_response(br#"[{"name":"x"}]"#).unwrap(), None);
    }

    #[test]
    fn test_parse_garbage_is_decode_error() {
        assert!(matches!(
            parse_search_response(b"<html>rate limited</html>"),
            Err(GeocodeError::Decode(_))
        ));
        assert!(matches!(
            parse_search_response(br#"{"error":"x"}"#),
            Err(GeocodeError::Decode(_))
        ));
    }

    #[test]
    fn test_search_url_encoding() {
        let client = ScriptedHttpClient::new(not_found());
        let r = resolver(client, settings());
        let url = r.search_url("new_york-usa");
        assert_eq!(
            url.as_str(),
            "https://nominatim.openstreetmap.org/search?q=new+york-usa&format=json&limit=1"
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_service_result_is_cached() {
        let client = ScriptedHttpClient::new(not_found())
            .route("q=paris-france", vec![Ok(nominatim_body(48.8566, 2.3522))]);
        let r = resolver(client, settings());

        let first = r.lookup("paris-france").await.unwrap().unwrap();
        assert_eq!(first.source, ResolveSource::Service);
        assert_eq!(r.cache().get("paris-france"), Some(first.coords));

        let second = r.lookup("paris-france").await.unwrap().unwrap();
        assert_eq!(second.source, ResolveSource::Cache);
        assert_eq!(second.coords, first.coords);
        assert_eq!(r.client.call_count(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_cache_hit_skips_network_and_delay() {
        let client = ScriptedHttpClient::new(Err(HttpError::Transport("offline".into())));
        let r = resolver(client, settings());
        r.cache().put("rome-italy", Coordinates::new(41.9, 12.5));

        let start = Instant::now();
        let coords = r.resolve("rome-italy").await.unwrap();
        assert_eq!(coords, Some(Coordinates::new(41.9, 12.5)));
        assert_eq!(start.elapsed(), Duration::ZERO);
        assert_eq!(r.client.call_count(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_post_success_delay() {
        let client = ScriptedHttpClient::new(Ok(nominatim_body(52.52, 13.405)));
        let r = resolver(client, settings());

        let start = Instant::now();
        r.resolve("berlin-germany").await.unwrap();
        assert_eq!(start.elapsed(), Duration::from_millis(800));
    }

    #[tokio::test(start_paused = true)]
    async fn test_backoff_sequence_then_success() {
        let client = ScriptedHttpClient::new(not_found()).route(
            "q=paris",
            vec![
                Err(HttpError::Status(503)),
                Err(HttpError::Transport("reset".into())),
                Ok(nominatim_body(48.8566, 2.3522)),
            ],
        );
        let r = resolver(client, settings());

        let coords = r.resolve("paris-france").await.unwrap();
        assert_eq!(coords, Some(Coordinates::new(48.8566, 2.3522)));

        let times = r.client.call_times();
        assert_eq!(times.len(), 3);
        assert_eq!(times[1] - times[0], Duration::from_millis(500));
        assert_eq!(times[2] - times[1], Duration::from_millis(1000));
    }

    #[tokio::test(start_paused = true)]
    async fn test_retries_exhausted() {
        let client = ScriptedHttpClient::new(Err(HttpError::Status(429)));
        let r = resolver(client, settings());

        let start = Instant::now();
        let err = r.resolve("paris-france").await.unwrap_err();
        assert_eq!(
            err,
            GeocodeError::RetriesExhausted {
                attempts: 3,
                last: HttpError::Status(429)
            }
        );
        // 500ms + 1000ms of backoff, no sleep after the last attempt
        assert_eq!(start.elapsed(), Duration::from_millis(1500));
        assert_eq!(r.client.call_count(), 3);
        assert_eq!(r.cache().size(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_slow_service_times_out() {
        let client = ScriptedHttpClient::new(Ok(nominatim_body(1.0, 1.0)))
            .with_latency(Duration::from_secs(30));
        let r = resolver(
            client,
            ResolverSettings {
                retry: RetryPolicy::None,
                ..settings()
            },
        );

        let err = r.resolve("slow-place").await.unwrap_err();
        assert_eq!(
            err,
            GeocodeError::RetriesExhausted {
                attempts: 1,
                last: HttpError::Timeout(DEFAULT_REQUEST_TIMEOUT)
            }
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_zero_coordinates_are_not_found() {
        let client = ScriptedHttpClient::new(Ok(Bytes::from_static(
            br#"[{"lat":"0","lon":"0"}]"#,
        )));
        let r = resolver(client, settings());

        assert_eq!(r.resolve("null_island-atlantic").await.unwrap(), None);
        assert_eq!(r.cache().size(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_normalized_key_is_queried_and_cached() {
        let client = ScriptedHttpClient::new(not_found())
            .route("q=willemstad-curacao", vec![Ok(nominatim_body(12.1, -68.9))]);
        let r = resolver(client, settings());

        let coords = r.resolve("willemstad-netherlands_antilles").await.unwrap();
        assert_eq!(coords, Some(Coordinates::new(12.1, -68.9)));
        assert!(r.cache().get("willemstad-curacao").is_some());
        assert!(r.cache().get("willemstad-netherlands_antilles").is_none());
    }

    #[tokio::test(start_paused = true)]
    async fn test_empty_key_rejected() {
        let client = ScriptedHttpClient::new(not_found());
        let r = resolver(client, settings());
        assert!(matches!(
            r.resolve("   ").await,
            Err(GeocodeError::InvalidKey(_))
        ));
        assert_eq!(r.client.call_count(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_fallback_before_service_skips_network() {
        let client = ScriptedHttpClient::new(Ok(nominatim_body(51.5, -0.12)));
        let r = resolver(
            client,
            ResolverSettings {
                fallback: FallbackMode::BeforeService,
                ..settings()
            },
        );

        let resolved = r.lookup("london-uk").await.unwrap().unwrap();
        assert_eq!(resolved.source, ResolveSource::Approximate);
        assert_eq!(r.client.call_count(), 0);
        assert_eq!(r.cache().size(), 0);

        // Unknown country still goes to the service.
        let resolved = r.lookup("willemstad-curacao").await.unwrap().unwrap();
        assert_eq!(resolved.source, ResolveSource::Service);
    }

    #[tokio::test(start_paused = true)]
    async fn test_fallback_after_service_failure() {
        let client = ScriptedHttpClient::new(Err(HttpError::Status(500)));
        let r = resolver(
            client,
            ResolverSettings {
                fallback: FallbackMode::AfterService,
                ..settings()
            },
        );

        let resolved = r.lookup("lyon-france").await.unwrap().unwrap();
        assert_eq!(resolved.source, ResolveSource::Approximate);
        assert_eq!(r.client.call_count(), 3);
        assert!(r.cache().get("lyon-france").is_none());

        // No centroid for this one, so the error surfaces.
        assert!(r.lookup("willemstad-curacao").await.is_err());
    }

    #[tokio::test(start_paused = true)]
    async fn test_concurrent_lookups_share_one_call() {
        let client = ScriptedHttpClient::new(Ok(nominatim_body(48.8566, 2.3522)))
            .with_latency(Duration::from_millis(200));
        let r = Arc::new(resolver(client, settings()));

        let mut handles = Vec::new();
        for _ in 0..4 {
            let r = Arc::clone(&r);
            handles.push(tokio::spawn(async move { r.resolve("paris-france").await }));
        }
        for handle in handles {
            assert_eq!(
                handle.await.unwrap().unwrap(),
                Some(Coordinates::new(48.8566, 2.3522))
            );
        }
        assert_eq!(r.client.call_count(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_lookup_cancellable() {
        let client = ScriptedHttpClient::new(Ok(nominatim_body(1.5, 1.5)))
            .with_latency(Duration::from_secs(5));
        let r = resolver(client, settings());
        let cancel = CancellationToken::new();

        let trigger = cancel.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(100)).await;
            trigger.cancel();
        });

        assert_eq!(
            r.lookup_cancellable("far-away", &cancel).await,
            Err(GeocodeError::Cancelled)
        );
    }
}
