//! Data models for the prediction client.
//!
//! Three groups live here:
//! - raw caller inputs (`*Readings`, [`CropDetails`], [`PredictionInput`]), every
//!   field optional
//! - normalised channel requests ([`SoilInput`], [`WeatherInput`], ...) that go
//!   on the wire
//! - channel results and the composed [`AggregateResult`]

use chrono::{DateTime, NaiveDateTime, TimeZone, Utc};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Deserializer, Serialize};
use serde_json::{Map, Value};

use crate::clock::Season;

// ---

/// One of the four backend prediction kinds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Channel {
    Soil,
    Yield,
    Pest,
    Rainfall,
}

impl Channel {
    /// Dispatch order used by the aggregator.
    pub const ALL: [Channel; 4] = [
        Channel::Soil,
        Channel::Yield,
        Channel::Pest,
        Channel::Rainfall,
    ];

    /// Backend path, relative to the configured base URL.
    pub fn path(&self) -> &'static str {
        // ---
        match self {
            Channel::Soil => "/api/soil-health/analyze",
            Channel::Yield => "/api/crop-prediction/recommend",
            Channel::Pest => "/api/predictions/pest",
            Channel::Rainfall => "/api/predictions/rainfall",
        }
    }

    pub fn name(&self) -> &'static str {
        // ---
        match self {
            Channel::Soil => "soil",
            Channel::Yield => "yield",
            Channel::Pest => "pest",
            Channel::Rainfall => "rainfall",
        }
    }
}

impl std::fmt::Display for Channel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}

// --- Raw caller inputs

/// Soil measurements as supplied by the caller. Missing or non-numeric
/// values are filled from defaults by the normaliser.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SoilReadings {
    // ---
    #[serde(default, deserialize_with = "lenient_number")]
    pub ph: Option<f64>,
    #[serde(default, deserialize_with = "lenient_number")]
    pub nitrogen: Option<f64>,
    #[serde(default, deserialize_with = "lenient_number")]
    pub phosphorus: Option<f64>,
    #[serde(default, deserialize_with = "lenient_number")]
    pub potassium: Option<f64>,
    #[serde(default, deserialize_with = "lenient_number")]
    pub organic_matter: Option<f64>,
    #[serde(default, deserialize_with = "lenient_number")]
    pub moisture: Option<f64>,
}

/// Weather observations as supplied by the caller.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct WeatherReadings {
    // ---
    #[serde(default, deserialize_with = "lenient_number")]
    pub temperature: Option<f64>,
    #[serde(default, deserialize_with = "lenient_number")]
    pub humidity: Option<f64>,
    #[serde(default, deserialize_with = "lenient_number")]
    pub rainfall: Option<f64>,
    #[serde(default, deserialize_with = "lenient_number")]
    pub wind_speed: Option<f64>,
    #[serde(default, deserialize_with = "lenient_number")]
    pub pressure: Option<f64>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CropDetails {
    // ---
    #[serde(default, deserialize_with = "lenient_string")]
    pub crop_type: Option<String>,
    #[serde(default, deserialize_with = "lenient_number")]
    pub area: Option<f64>,
}

/// Everything a caller may hand to `generate_predictions`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PredictionInput {
    #[serde(default)]
    pub soil: Option<SoilReadings>,
    #[serde(default)]
    pub weather: Option<WeatherReadings>,
    #[serde(default)]
    pub crop: Option<CropDetails>,
}

impl PredictionInput {
    pub fn new(
        soil: Option<SoilReadings>,
        weather: Option<WeatherReadings>,
        crop: Option<CropDetails>,
    ) -> Self {
        Self {
            soil,
            weather,
            crop,
        }
    }
}

/// Non-numeric JSON values count as absent.
fn lenient_number<'de, D>(deserializer: D) -> Result<Option<f64>, D::Error>
where
    D: Deserializer<'de>,
{
    // ---
    let value = Option::<Value>::deserialize(deserializer)?;
    Ok(value.and_then(|v| v.as_f64()))
}

fn lenient_string<'de, D>(deserializer: D) -> Result<Option<String>, D::Error>
where
    D: Deserializer<'de>,
{
    // ---
    let value = Option::<Value>::deserialize(deserializer)?;
    Ok(value.and_then(|v| v.as_str().map(str::to_owned)))
}

// --- Normalised channel requests

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SoilInput {
    pub ph: f64,
    pub nitrogen: f64,
    pub phosphorus: f64,
    pub potassium: f64,
    pub organic_matter: f64,
    pub moisture: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WeatherInput {
    pub temperature: f64,
    pub humidity: f64,
    pub rainfall: f64,
    pub wind_speed: f64,
    pub pressure: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CropInput {
    pub crop_type: String,
    pub area: f64,
}

/// Pest request, derived from weather and the current season.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PestInput {
    pub temperature: f64,
    pub humidity: f64,
    pub season: Season,
}

/// Output of the normaliser; also the yield channel's request body.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NormalisedInput {
    pub soil: SoilInput,
    pub weather: WeatherInput,
    pub crop: CropInput,
    pub pest: PestInput,
}

impl From<SoilInput> for SoilReadings {
    fn from(s: SoilInput) -> Self {
        // ---
        SoilReadings {
            ph: Some(s.ph),
            nitrogen: Some(s.nitrogen),
            phosphorus: Some(s.phosphorus),
            potassium: Some(s.potassium),
            organic_matter: Some(s.organic_matter),
            moisture: Some(s.moisture),
        }
    }
}

impl From<WeatherInput> for WeatherReadings {
    fn from(w: WeatherInput) -> Self {
        // ---
        WeatherReadings {
            temperature: Some(w.temperature),
            humidity: Some(w.humidity),
            rainfall: Some(w.rainfall),
            wind_speed: Some(w.wind_speed),
            pressure: Some(w.pressure),
        }
    }
}

impl From<CropInput> for CropDetails {
    fn from(c: CropInput) -> Self {
        CropDetails {
            crop_type: Some(c.crop_type),
            area: Some(c.area),
        }
    }
}

// --- Channel results

/// Common surface of the four channel result shapes.
pub trait ChannelResult:
    Clone + std::fmt::Debug + Serialize + DeserializeOwned + Send + Sync + 'static
{
    const CHANNEL: Channel;

    /// Confidence in `[0, 100]`.
    fn confidence(&self) -> f64;
}

/// Accepts RFC 3339, naive ISO-8601 (read as UTC) and epoch milliseconds.
fn lenient_timestamp<'de, D>(deserializer: D) -> Result<DateTime<Utc>, D::Error>
where
    D: Deserializer<'de>,
{
    // ---
    use serde::de::Error;

    match Value::deserialize(deserializer)? {
        Value::String(s) => {
            if let Ok(dt) = DateTime::parse_from_rfc3339(&s) {
                return Ok(dt.with_timezone(&Utc));
            }
            NaiveDateTime::parse_from_str(&s, "%Y-%m-%dT%H:%M:%S%.f")
                .map(|naive| Utc.from_utc_datetime(&naive))
                .map_err(|e| D::Error::custom(format!("invalid timestamp '{}': {}", s, e)))
        }
        Value::Number(n) => n
            .as_i64()
            .and_then(|ms| Utc.timestamp_millis_opt(ms).single())
            .ok_or_else(|| D::Error::custom(format!("invalid epoch timestamp {}", n))),
        other => Err(D::Error::custom(format!("invalid timestamp {}", other))),
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SoilHealthResult {
    // ---
    pub soil_health_score: f64,
    pub classification: String,
    pub confidence: f64,
    /// Backend advice, plain strings or structured objects, kept as sent.
    #[serde(default)]
    pub recommendations: Vec<Value>,
    #[serde(deserialize_with = "lenient_timestamp")]
    pub timestamp: DateTime<Utc>,
    /// Response fields this client does not interpret, kept verbatim.
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl ChannelResult for SoilHealthResult {
    const CHANNEL: Channel = Channel::Soil;

    fn confidence(&self) -> f64 {
        self.confidence
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct YieldFactors {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub overall_rating: Option<String>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct YieldResult {
    // ---
    pub predicted_yield: f64,
    pub unit: String,
    pub confidence: f64,
    pub crop_type: String,
    pub field_area: f64,
    #[serde(default)]
    pub factors: YieldFactors,
    #[serde(default)]
    pub recommendations: Vec<Value>,
    #[serde(deserialize_with = "lenient_timestamp")]
    pub timestamp: DateTime<Utc>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl ChannelResult for YieldResult {
    const CHANNEL: Channel = Channel::Yield;

    fn confidence(&self) -> f64 {
        self.confidence
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum RiskLevel {
    Low,
    Medium,
    High,
}

impl RiskLevel {
    /// Classify a 0-100 risk score.
    pub fn from_score(score: f64) -> Self {
        // ---
        if score > 60.0 {
            RiskLevel::High
        } else if score > 40.0 {
            RiskLevel::Medium
        } else {
            RiskLevel::Low
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PestRiskResult {
    // ---
    pub risk_score: f64,
    pub risk_level: RiskLevel,
    #[serde(default)]
    pub common_pests: Vec<String>,
    pub confidence: f64,
    #[serde(default)]
    pub recommendations: Vec<Value>,
    #[serde(deserialize_with = "lenient_timestamp")]
    pub timestamp: DateTime<Utc>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl ChannelResult for PestRiskResult {
    const CHANNEL: Channel = Channel::Pest;

    fn confidence(&self) -> f64 {
        self.confidence
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RainfallResult {
    // ---
    pub probability: f64,
    /// Millimetres.
    pub expected_amount: f64,
    pub confidence: f64,
    #[serde(deserialize_with = "lenient_timestamp")]
    pub timestamp: DateTime<Utc>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl ChannelResult for RainfallResult {
    const CHANNEL: Channel = Channel::Rainfall;

    fn confidence(&self) -> f64 {
        self.confidence
    }
}

/// A channel result, tagged with where it came from.
#[derive(Debug, Clone, PartialEq)]
pub enum ChannelOutcome<T> {
    /// Returned by the backend (possibly via the cache).
    Live(T),
    /// Produced locally because the backend call failed.
    Fallback(T),
}

impl<T> ChannelOutcome<T> {
    pub fn is_fallback(&self) -> bool {
        matches!(self, ChannelOutcome::Fallback(_))
    }

    pub fn value(&self) -> &T {
        // ---
        match self {
            ChannelOutcome::Live(v) | ChannelOutcome::Fallback(v) => v,
        }
    }

    pub fn into_inner(self) -> T {
        // ---
        match self {
            ChannelOutcome::Live(v) | ChannelOutcome::Fallback(v) => v,
        }
    }
}

// --- Advisories

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum InsightKind {
    Positive,
    Warning,
    Alert,
    Info,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum InsightCategory {
    Soil,
    Weather,
    Pest,
    System,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Impact {
    Low,
    Medium,
    High,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Insight {
    #[serde(rename = "type")]
    pub kind: InsightKind,
    pub category: InsightCategory,
    pub message: String,
    pub impact: Impact,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Priority {
    High,
    Medium,
    Low,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Recommendation {
    pub priority: Priority,
    pub action: String,
    pub details: String,
    pub timeline: String,
}

/// Composite advisory returned by `generate_predictions`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AggregateResult {
    // ---
    pub soil: SoilHealthResult,
    #[serde(rename = "yield")]
    pub crop_yield: YieldResult,
    pub pest: PestRiskResult,
    pub rainfall: RainfallResult,
    /// Rounded mean confidence, `0..=100`.
    pub confidence: u8,
    pub insights: Vec<Insight>,
    pub recommendations: Vec<Recommendation>,
    pub timestamp: DateTime<Utc>,
    /// True iff every channel fell back.
    pub fallback: bool,
    /// Channels that used their local fallback, in dispatch order.
    pub fallback_channels: Vec<Channel>,
}

/// Body of `GET /api/health`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct BackendHealth {
    #[serde(default)]
    pub status: Option<String>,
    #[serde(default)]
    pub model_status: Option<String>,
    #[serde(default)]
    pub api_version: Option<String>,
}

impl BackendHealth {
    pub fn is_healthy(&self) -> bool {
        self.status.as_deref() == Some("healthy")
    }
}
