//! Rule-based insights, recommendations and composite confidence.
//!
//! Rules run in a fixed order and each fires at most once, so output order
//! is stable for a given set of scores. Every threshold is strict.

use crate::models::{
    Impact, Insight, InsightCategory, InsightKind, PestRiskResult, Priority, RainfallResult,
    Recommendation, SoilHealthResult,
};

// ---

/// The scores the rules look at.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Signals {
    pub soil_health_score: f64,
    pub pest_risk_score: f64,
    pub rainfall_probability: f64,
}

impl Signals {
    pub fn from_results(
        soil: &SoilHealthResult,
        pest: &PestRiskResult,
        rainfall: &RainfallResult,
    ) -> Self {
        Self {
            soil_health_score: soil.soil_health_score,
            pest_risk_score: pest.risk_score,
            rainfall_probability: rainfall.probability,
        }
    }
}

fn insight(kind: InsightKind, category: InsightCategory, message: String, impact: Impact) -> Insight {
    Insight {
        kind,
        category,
        message,
        impact,
    }
}

fn recommendation(priority: Priority, action: &str, details: &str, timeline: &str) -> Recommendation {
    Recommendation {
        priority,
        action: action.to_string(),
        details: details.to_string(),
        timeline: timeline.to_string(),
    }
}

pub fn derive_insights(signals: &Signals) -> Vec<Insight> {
    // ---
    let mut insights = Vec::new();

    if signals.soil_health_score > 80.0 {
        insights.push(insight(
            InsightKind::Positive,
            InsightCategory::Soil,
            format!(
                "Excellent soil conditions detected (health score {:.0}). Ideal for high-yield crops.",
                signals.soil_health_score
            ),
            Impact::High,
        ));
    } else if signals.soil_health_score < 60.0 {
        insights.push(insight(
            InsightKind::Warning,
            InsightCategory::Soil,
            format!(
                "Soil health needs improvement (health score {:.0}). Consider organic amendments.",
                signals.soil_health_score
            ),
            Impact::Medium,
        ));
    }

    if signals.rainfall_probability > 70.0 {
        insights.push(insight(
            InsightKind::Info,
            InsightCategory::Weather,
            format!(
                "High rainfall probability ({:.0}%). Plan field activities accordingly.",
                signals.rainfall_probability
            ),
            Impact::Medium,
        ));
    }

    if signals.pest_risk_score > 70.0 {
        insights.push(insight(
            InsightKind::Alert,
            InsightCategory::Pest,
            format!(
                "Elevated pest risk detected (risk score {:.0}). Monitor crops closely.",
                signals.pest_risk_score
            ),
            Impact::High,
        ));
    }

    insights
}

pub fn derive_recommendations(signals: &Signals) -> Vec<Recommendation> {
    // ---
    let mut recommendations = Vec::new();

    if signals.soil_health_score < 70.0 {
        recommendations.push(recommendation(
            Priority::High,
            "Improve soil health",
            "Add organic compost and test nutrient levels",
            "2-4 weeks",
        ));
    }

    if signals.pest_risk_score > 60.0 {
        recommendations.push(recommendation(
            Priority::Medium,
            "Pest monitoring",
            "Increase field inspections and consider organic pesticides",
            "1-2 weeks",
        ));
    }

    if signals.rainfall_probability < 30.0 {
        recommendations.push(recommendation(
            Priority::Medium,
            "Irrigation planning",
            "Ensure adequate water supply and efficient irrigation",
            "Immediate",
        ));
    }

    recommendations
}

/// Appended when every channel fell back.
pub fn offline_insight() -> Insight {
    insight(
        InsightKind::Info,
        InsightCategory::System,
        "Using offline predictions. Connect to the prediction service for live model results."
            .to_string(),
        Impact::Low,
    )
}

/// Appended when every channel fell back.
pub fn system_check() -> Recommendation {
    recommendation(
        Priority::Low,
        "System check",
        "Verify the prediction service is reachable to restore live predictions",
        "When convenient",
    )
}

/// Rounded mean confidence of the live channels, or of all channels when
/// none are live. Each entry is `(confidence, fell_back)`.
pub fn composite_confidence(channels: &[(f64, bool)]) -> u8 {
    // ---
    let live: Vec<f64> = channels
        .iter()
        .filter(|(_, fell_back)| !fell_back)
        .map(|(confidence, _)| *confidence)
        .collect();
    let pool: Vec<f64> = if live.is_empty() {
        channels.iter().map(|(confidence, _)| *confidence).collect()
    } else {
        live
    };

    if pool.is_empty() {
        return 0;
    }
    let mean = pool.iter().sum::<f64>() / pool.len() as f64;
    if !mean.is_finite() {
        return 0;
    }
    mean.round().clamp(0.0, 100.0) as u8
}
