//! Local, rule-based stand-ins for each backend channel.
//!
//! Used whenever a channel request fails. Results have the same shape as the
//! backend's and carry confidence between 60 and 80. Pest and rainfall add a
//! random jitter drawn from the caller's RNG; pass a seeded RNG for
//! reproducible output.

use chrono::{DateTime, Utc};
use rand::Rng;
use serde_json::{json, Map};

use crate::clock::Season;
use crate::models::{
    CropInput, PestRiskResult, RainfallResult, RiskLevel, SoilHealthResult, YieldFactors,
    YieldResult,
};

// ---

pub const SOIL_CONFIDENCE: f64 = 75.0;
pub const YIELD_CONFIDENCE: f64 = 70.0;
pub const PEST_CONFIDENCE: f64 = 70.0;
pub const RAINFALL_CONFIDENCE: f64 = 65.0;

/// Tons per hectare for crops without a specific entry.
pub const DEFAULT_BASE_YIELD: f64 = 4.0;

const BASE_YIELDS: [(&str, f64); 6] = [
    ("wheat", 4.2),
    ("rice", 5.8),
    ("corn", 6.5),
    ("soybean", 3.2),
    ("cotton", 2.8),
    ("sugarcane", 45.0),
];

/// Base yield for `crop_type` (case-insensitive).
pub fn base_yield(crop_type: &str) -> f64 {
    // ---
    let wanted = crop_type.trim().to_ascii_lowercase();
    BASE_YIELDS
        .iter()
        .find(|(name, _)| *name == wanted)
        .map(|(_, tons)| *tons)
        .unwrap_or(DEFAULT_BASE_YIELD)
}

fn season_pests(season: Season) -> &'static [&'static str] {
    // ---
    match season {
        Season::Spring => &["Aphids", "Cutworms", "Flea beetles"],
        Season::Summer => &["Whiteflies", "Spider mites", "Armyworms"],
        Season::Autumn => &["Stem borers", "Leafhoppers", "Armyworms"],
        Season::Winter => &["Aphids", "Thrips"],
    }
}

// ---

pub fn soil_health(now: DateTime<Utc>) -> SoilHealthResult {
    // ---
    SoilHealthResult {
        soil_health_score: 65.0,
        classification: "Good".to_string(),
        confidence: SOIL_CONFIDENCE,
        recommendations: vec![
            json!("Maintain regular soil testing and balanced fertilization"),
        ],
        timestamp: now,
        extra: Map::new(),
    }
}

pub fn crop_yield(crop: &CropInput, now: DateTime<Utc>) -> YieldResult {
    // ---
    YieldResult {
        predicted_yield: base_yield(&crop.crop_type),
        unit: "tons/hectare".to_string(),
        confidence: YIELD_CONFIDENCE,
        crop_type: crop.crop_type.clone(),
        field_area: 1.0,
        factors: YieldFactors {
            overall_rating: Some("Good".to_string()),
            extra: Map::new(),
        },
        recommendations: vec![
            json!("Follow recommended planting density and fertilizer schedule"),
        ],
        timestamp: now,
        extra: Map::new(),
    }
}

/// Seasonal base risk plus up to 20 points of jitter.
pub fn pest_risk<R: Rng>(season: Season, rng: &mut R, now: DateTime<Utc>) -> PestRiskResult {
    // ---
    let base = match season {
        Season::Summer => 65.0,
        Season::Spring => 55.0,
        Season::Autumn | Season::Winter => 45.0,
    };
    let risk_score: f64 = (base + rng.gen_range(0.0..=20.0_f64)).round();
    let risk_level = RiskLevel::from_score(risk_score);

    let recommendations = match risk_level {
        RiskLevel::High => vec![
            json!("Inspect fields every 2-3 days"),
            json!("Set up pest traps along field borders"),
        ],
        RiskLevel::Medium => vec![json!("Inspect fields weekly")],
        RiskLevel::Low => vec![json!("Continue routine monitoring")],
    };

    PestRiskResult {
        risk_score,
        risk_level,
        common_pests: season_pests(season).iter().map(|p| p.to_string()).collect(),
        confidence: PEST_CONFIDENCE,
        recommendations,
        timestamp: now,
        extra: Map::new(),
    }
}

/// Seasonal base probability plus up to 30 points of jitter; 20-70 mm.
pub fn rainfall<R: Rng>(season: Season, rng: &mut R, now: DateTime<Utc>) -> RainfallResult {
    // ---
    let base = match season {
        Season::Summer => 40.0,
        Season::Winter => 70.0,
        Season::Spring | Season::Autumn => 55.0,
    };
    let probability: f64 = (base + rng.gen_range(0.0..=30.0_f64)).round();
    let expected_amount: f64 = (20.0 + rng.gen_range(0.0..=50.0_f64)).round();

    RainfallResult {
        probability,
        expected_amount,
        confidence: RAINFALL_CONFIDENCE,
        timestamp: now,
        extra: Map::new(),
    }
}
