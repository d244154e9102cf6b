//! Prediction aggregation client for the AgriVision advisory backend.
//!
//! [`PredictionService`] fans out the soil-health, crop-yield, pest-risk and
//! rainfall predictions concurrently, reuses responses for five minutes,
//! shares in-flight requests between concurrent callers, and substitutes a
//! local rule-based result for any channel the backend cannot answer. The
//! combined [`AggregateResult`] carries a composite confidence plus insights
//! and recommendations derived from the four channels.
//!
//! The service spawns each backend request as a tokio task, so its async
//! methods must run inside a tokio runtime.
//!
//! ```no_run
//! use agrivision_advisor::{config, PredictionInput, PredictionService};
//!
//! # async fn run() -> anyhow::Result<()> {
//! let cfg = config::load_from_env()?;
//! let service = PredictionService::from_config(&cfg)?;
//! let advisory = service.generate_predictions(&PredictionInput::default()).await;
//! println!("confidence {} (offline: {})", advisory.confidence, advisory.fallback);
//! # Ok(())
//! # }
//! ```

pub mod cache;
pub mod clock;
pub mod config;
pub mod error;
pub mod fallback;
pub mod insights;
pub mod models;
pub mod normalize;
pub mod service;
pub mod transport;

pub use cache::{CacheStats, CACHE_TTL};
pub use clock::{Clock, ManualClock, Season, SystemClock};
pub use config::Config;
pub use error::{PredictionError, TransportError};
pub use models::{
    AggregateResult, BackendHealth, Channel, ChannelOutcome, CropDetails, Insight,
    PestRiskResult, PredictionInput, RainfallResult, Recommendation, SoilHealthResult,
    SoilReadings, WeatherReadings, YieldResult,
};
pub use service::{PredictionService, PredictionServiceBuilder};
pub use transport::{HttpTransport, MockTransport, PredictionTransport};
