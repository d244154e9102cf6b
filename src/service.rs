//! The prediction aggregator.
//!
//! [`PredictionService::generate_predictions`] normalises the caller's input,
//! resolves the four channels concurrently (cache, then backend, then local
//! fallback) and composes the results into an [`AggregateResult`] with
//! confidence, insights and recommendations. It never fails: channel errors
//! become fallbacks, and an internal error yields a fully offline result.

use std::sync::{Arc, Mutex};

use futures::FutureExt;
use rand::rngs::StdRng;
use rand::SeedableRng;
use serde::Serialize;
use serde_json::Value;
use tracing::{debug, error, info, warn};

use crate::cache::{self, CacheStats, Entry, ResultCache, SharedFetch};
use crate::clock::{Clock, Season, SystemClock};
use crate::config::Config;
use crate::error::{PredictionError, TransportError};
use crate::fallback;
use crate::insights::{self, Signals};
use crate::models::{
    AggregateResult, BackendHealth, ChannelOutcome, ChannelResult, PestRiskResult,
    PredictionInput, RainfallResult, SoilHealthResult, SoilReadings, WeatherReadings, YieldResult,
};
use crate::normalize;
use crate::transport::{HttpTransport, PredictionTransport};

// ---

/// Caching, fault-tolerant facade over the prediction backend.
///
/// Cheap to share behind an `Arc`; all state (cache, RNG) is internal.
pub struct PredictionService {
    transport: Arc<dyn PredictionTransport>,
    cache: Arc<ResultCache>,
    clock: Arc<dyn Clock>,
    rng: Mutex<StdRng>,
}

/// Builder for [`PredictionService`].
pub struct PredictionServiceBuilder {
    transport: Arc<dyn PredictionTransport>,
    clock: Arc<dyn Clock>,
    seed: Option<u64>,
}

impl PredictionServiceBuilder {
    /// Time source for timestamps, season tags and cache ages.
    pub fn clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    /// Seed the fallback jitter for reproducible output.
    pub fn seed(mut self, seed: u64) -> Self {
        self.seed = Some(seed);
        self
    }

    pub fn build(self) -> PredictionService {
        // ---
        let rng = match self.seed {
            Some(seed) => StdRng::seed_from_u64(seed),
            None => StdRng::from_entropy(),
        };
        PredictionService {
            cache: Arc::new(ResultCache::new(Arc::clone(&self.clock))),
            transport: self.transport,
            clock: self.clock,
            rng: Mutex::new(rng),
        }
    }
}

impl PredictionService {
    pub fn builder(transport: Arc<dyn PredictionTransport>) -> PredictionServiceBuilder {
        PredictionServiceBuilder {
            transport,
            clock: Arc::new(SystemClock),
            seed: None,
        }
    }

    /// Service with the wall clock and an entropy-seeded RNG.
    pub fn new(transport: Arc<dyn PredictionTransport>) -> Self {
        Self::builder(transport).build()
    }

    /// Service talking HTTP to `config.api_url`.
    pub fn from_config(config: &Config) -> Result<Self, TransportError> {
        let transport = HttpTransport::new(config.api_url.clone())?;
        Ok(Self::new(Arc::new(transport)))
    }

    // --- Aggregate

    /// Run all four channel predictions and compose the advisory.
    pub async fn generate_predictions(&self, input: &PredictionInput) -> AggregateResult {
        // ---
        match self.try_generate(input).await {
            Ok(result) => result,
            Err(e) => {
                error!("Prediction aggregation failed, using offline result: {}", e);
                self.offline_result()
            }
        }
    }

    async fn try_generate(&self, input: &PredictionInput) -> Result<AggregateResult, PredictionError> {
        // ---
        let season = self.clock.season();
        let request = normalize::normalize(input, season);
        debug!("Normalised prediction input: {:?}", request);

        // join! polls in argument order, so dispatch is soil, yield, pest, rainfall
        let (soil, crop_yield, pest, rainfall) = tokio::join!(
            self.resolve(&request.soil, || fallback::soil_health(self.clock.now())),
            self.resolve(&request, || fallback::crop_yield(&request.crop, self.clock.now())),
            self.resolve(&request.pest, || self.pest_fallback(season)),
            self.resolve(&request.weather, || self.rainfall_fallback(season)),
        );

        Ok(self.compose(soil?, crop_yield?, pest?, rainfall?))
    }

    /// Every channel from its fallback, flagged as such.
    fn offline_result(&self) -> AggregateResult {
        // ---
        let season = self.clock.season();
        let now = self.clock.now();
        let crop = normalize::crop(&Default::default());

        self.compose(
            ChannelOutcome::Fallback(fallback::soil_health(now)),
            ChannelOutcome::Fallback(fallback::crop_yield(&crop, now)),
            ChannelOutcome::Fallback(self.pest_fallback(season)),
            ChannelOutcome::Fallback(self.rainfall_fallback(season)),
        )
    }

    fn compose(
        &self,
        soil: ChannelOutcome<SoilHealthResult>,
        crop_yield: ChannelOutcome<YieldResult>,
        pest: ChannelOutcome<PestRiskResult>,
        rainfall: ChannelOutcome<RainfallResult>,
    ) -> AggregateResult {
        // ---
        let slots = [
            (SoilHealthResult::CHANNEL, soil.value().confidence(), soil.is_fallback()),
            (YieldResult::CHANNEL, crop_yield.value().confidence(), crop_yield.is_fallback()),
            (PestRiskResult::CHANNEL, pest.value().confidence(), pest.is_fallback()),
            (RainfallResult::CHANNEL, rainfall.value().confidence(), rainfall.is_fallback()),
        ];
        let fallback_channels: Vec<_> = slots
            .iter()
            .filter(|(_, _, fell_back)| *fell_back)
            .map(|(channel, _, _)| *channel)
            .collect();
        let all_fallback = fallback_channels.len() == slots.len();

        let confidences: Vec<(f64, bool)> = slots.iter().map(|(_, c, f)| (*c, *f)).collect();
        let confidence = insights::composite_confidence(&confidences);

        let signals = Signals::from_results(soil.value(), pest.value(), rainfall.value());
        let mut insight_list = insights::derive_insights(&signals);
        let mut recommendations = insights::derive_recommendations(&signals);
        if all_fallback {
            insight_list.push(insights::offline_insight());
            recommendations.push(insights::system_check());
        }

        info!(
            confidence,
            fallback = all_fallback,
            fallback_channels = fallback_channels.len(),
            insights = insight_list.len(),
            recommendations = recommendations.len(),
            "Predictions aggregated"
        );

        AggregateResult {
            soil: soil.into_inner(),
            crop_yield: crop_yield.into_inner(),
            pest: pest.into_inner(),
            rainfall: rainfall.into_inner(),
            confidence,
            insights: insight_list,
            recommendations,
            timestamp: self.clock.now(),
            fallback: all_fallback,
            fallback_channels,
        }
    }

    // --- Single channels

    pub async fn predict_soil_health(&self, soil: &SoilReadings) -> ChannelOutcome<SoilHealthResult> {
        // ---
        let request = normalize::soil(soil);
        self.resolve_total(&request, || fallback::soil_health(self.clock.now()))
            .await
    }

    pub async fn predict_crop_yield(&self, input: &PredictionInput) -> ChannelOutcome<YieldResult> {
        // ---
        let request = normalize::normalize(input, self.clock.season());
        self.resolve_total(&request, || {
            fallback::crop_yield(&request.crop, self.clock.now())
        })
        .await
    }

    pub async fn predict_pest_risk(&self, weather: &WeatherReadings) -> ChannelOutcome<PestRiskResult> {
        // ---
        let season = self.clock.season();
        let request = normalize::pest(&normalize::weather(weather), season);
        self.resolve_total(&request, || self.pest_fallback(season)).await
    }

    pub async fn predict_rainfall(&self, weather: &WeatherReadings) -> ChannelOutcome<RainfallResult> {
        // ---
        let season = self.clock.season();
        let request = normalize::weather(weather);
        self.resolve_total(&request, || self.rainfall_fallback(season))
            .await
    }

    // --- Backend and cache management

    /// Probe `GET /api/health`. Errors are returned, not absorbed.
    pub async fn check_health(&self) -> Result<BackendHealth, TransportError> {
        // ---
        let body = self.transport.health().await?;
        Ok(serde_json::from_value(body)?)
    }

    pub fn clear_cache(&self) {
        self.cache.clear();
    }

    pub fn purge_expired(&self) -> usize {
        self.cache.purge_expired()
    }

    pub fn cache_stats(&self) -> CacheStats {
        self.cache.stats()
    }

    // --- Channel plumbing

    fn pest_fallback(&self, season: Season) -> PestRiskResult {
        // ---
        let mut rng = self.rng.lock().unwrap_or_else(|p| p.into_inner());
        fallback::pest_risk(season, &mut *rng, self.clock.now())
    }

    fn rainfall_fallback(&self, season: Season) -> RainfallResult {
        // ---
        let mut rng = self.rng.lock().unwrap_or_else(|p| p.into_inner());
        fallback::rainfall(season, &mut *rng, self.clock.now())
    }

    /// Like [`Self::resolve`], for the single-channel helpers, which have no
    /// aggregate boundary to report internal errors to.
    async fn resolve_total<T, R, F>(&self, request: &R, fallback: F) -> ChannelOutcome<T>
    where
        T: ChannelResult,
        R: Serialize,
        F: FnOnce() -> T,
    {
        // ---
        match self.fetch_live::<T, R>(request).await {
            Ok(Ok(result)) => ChannelOutcome::Live(result),
            Ok(Err(e)) => {
                warn!("{} prediction unavailable, using fallback: {}", T::CHANNEL, e);
                ChannelOutcome::Fallback(fallback())
            }
            Err(e) => {
                error!("{} channel failed internally: {}", T::CHANNEL, e);
                ChannelOutcome::Fallback(fallback())
            }
        }
    }

    /// Cache, then backend, then `fallback`.
    async fn resolve<T, R, F>(&self, request: &R, fallback: F) -> Result<ChannelOutcome<T>, PredictionError>
    where
        T: ChannelResult,
        R: Serialize,
        F: FnOnce() -> T,
    {
        // ---
        match self.fetch_live::<T, R>(request).await? {
            Ok(result) => Ok(ChannelOutcome::Live(result)),
            Err(e) => {
                warn!("{} prediction unavailable, using fallback: {}", T::CHANNEL, e);
                Ok(ChannelOutcome::Fallback(fallback()))
            }
        }
    }

    /// The backend's answer for `request`, from cache when fresh. The outer
    /// error is internal (the request could not be encoded); the inner one
    /// is a transport failure the caller should answer with a fallback.
    async fn fetch_live<T, R>(&self, request: &R) -> Result<Result<T, TransportError>, PredictionError>
    where
        T: ChannelResult,
        R: Serialize,
    {
        // ---
        let channel = T::CHANNEL;
        let body = serde_json::to_value(request).map_err(|e| {
            PredictionError::Internal(format!("cannot encode {} request: {}", channel, e))
        })?;
        let key = cache::fingerprint(channel, &body).map_err(|e| {
            PredictionError::Internal(format!("cannot fingerprint {} request: {}", channel, e))
        })?;

        let fetched = self.fetch::<T>(&key, body).await;
        Ok(fetched.and_then(|value| serde_json::from_value::<T>(value).map_err(TransportError::from)))
    }

    async fn fetch<T: ChannelResult>(&self, key: &str, body: Value) -> Result<Value, TransportError> {
        // ---
        let entry = self
            .cache
            .begin(key, |generation| self.spawn_request::<T>(key.to_string(), generation, body));

        match entry {
            Entry::Hit(value) => {
                debug!("{} cache hit", T::CHANNEL);
                Ok(value)
            }
            Entry::Wait { generation, fetch } => {
                let outcome = fetch.await;
                self.cache.settle(key, generation, &outcome);
                outcome
            }
        }
    }

    /// Start the backend request on its own task so it completes (and fills
    /// the cache) even if every caller stops waiting.
    fn spawn_request<T: ChannelResult>(&self, key: String, generation: u64, body: Value) -> SharedFetch {
        // ---
        debug!("{} cache miss, dispatching request", T::CHANNEL);

        let transport = Arc::clone(&self.transport);
        let cache = Arc::clone(&self.cache);
        let clock = Arc::clone(&self.clock);

        let handle = tokio::spawn(async move {
            let outcome = request_channel::<T>(transport.as_ref(), clock.as_ref(), body).await;
            cache.settle(&key, generation, &outcome);
            outcome
        });

        async move {
            handle
                .await
                .unwrap_or_else(|e| Err(TransportError::Aborted(e.to_string())))
        }
        .boxed()
        .shared()
    }
}

/// POST one channel request and check the body has the channel's shape.
/// Returns the re-encoded result so cached values are already normalised.
async fn request_channel<T: ChannelResult>(
    transport: &dyn PredictionTransport,
    clock: &dyn Clock,
    body: Value,
) -> Result<Value, TransportError> {
    // ---
    let mut response = transport.post(T::CHANNEL, body).await?;

    if let Value::Object(map) = &mut response {
        map.entry("timestamp")
            .or_insert_with(|| Value::String(clock.now().to_rfc3339()));
    }

    let parsed: T = serde_json::from_value(response)?;
    Ok(serde_json::to_value(&parsed)?)
}
