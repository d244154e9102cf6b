use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use serde_json::{json, Value};
use wiremock::matchers::{body_json, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

use agrivision_advisor::models::{Impact, InsightCategory, InsightKind, Priority};
use agrivision_advisor::{
    Channel, HttpTransport, PredictionInput, PredictionService, SoilReadings, WeatherReadings,
};

// ---

struct Scores {
    soil: (f64, f64),
    yield_confidence: f64,
    pest: (f64, f64),
    rainfall: (f64, f64),
}

const MID_RANGE: Scores = Scores {
    soil: (75.0, 80.0),
    yield_confidence: 78.0,
    pest: (40.0, 72.0),
    rainfall: (50.0, 70.0),
};

fn channel_body(channel: Channel, scores: &Scores) -> Value {
    // ---
    match channel {
        Channel::Soil => json!({
            "soilHealthScore": scores.soil.0,
            "classification": "Good",
            "confidence": scores.soil.1,
            "recommendations": ["Maintain current practices"],
            "timestamp": "2025-07-15T12:00:00Z"
        }),
        Channel::Yield => json!({
            "predictedYield": 4.6,
            "unit": "tons/hectare",
            "confidence": scores.yield_confidence,
            "cropType": "wheat",
            "fieldArea": 1,
            "factors": {"overallRating": "Good", "soilQuality": 0.8},
            "recommendations": [],
            "timestamp": "2025-07-15T12:00:00Z"
        }),
        Channel::Pest => json!({
            "riskScore": scores.pest.0,
            "riskLevel": "Low",
            "commonPests": ["Aphids"],
            "confidence": scores.pest.1,
            "recommendations": [],
            "timestamp": "2025-07-15T12:00:00Z"
        }),
        Channel::Rainfall => json!({
            "probability": scores.rainfall.0,
            "expectedAmount": 14.0,
            "confidence": scores.rainfall.1,
            "timestamp": "2025-07-15T12:00:00Z"
        }),
    }
}

/// Mount one POST mock per channel, each expected `times` times.
async fn mount_backend(server: &MockServer, scores: &Scores, times: u64, delay: Option<Duration>) {
    // ---
    for channel in Channel::ALL {
        let mut response = ResponseTemplate::new(200).set_body_json(channel_body(channel, scores));
        if let Some(delay) = delay {
            response = response.set_delay(delay);
        }
        Mock::given(method("POST"))
            .and(path(channel.path()))
            .respond_with(response)
            .expect(times)
            .mount(server)
            .await;
    }
}

fn service_for(server: &MockServer) -> Result<PredictionService> {
    // ---
    let transport = HttpTransport::new(server.uri())?;
    Ok(PredictionService::builder(Arc::new(transport)).seed(3).build())
}

fn s1_input() -> PredictionInput {
    // ---
    PredictionInput::new(
        Some(SoilReadings {
            ph: Some(6.5),
            nitrogen: Some(50.0),
            phosphorus: Some(30.0),
            potassium: Some(40.0),
            organic_matter: Some(3.5),
            moisture: Some(25.0),
        }),
        Some(WeatherReadings {
            temperature: Some(25.0),
            humidity: Some(65.0),
            rainfall: Some(100.0),
            wind_speed: Some(10.0),
            pressure: Some(1013.0),
        }),
        None,
    )
}

fn channel_json(result: &agrivision_advisor::AggregateResult) -> Result<[String; 4]> {
    Ok([
        serde_json::to_string(&result.soil)?,
        serde_json::to_string(&result.crop_yield)?,
        serde_json::to_string(&result.pest)?,
        serde_json::to_string(&result.rainfall)?,
    ])
}

// ---

#[tokio::test]
async fn all_channels_succeed_mid_range() -> Result<()> {
    // ---
    let server = MockServer::start().await;
    mount_backend(&server, &MID_RANGE, 1, None).await;
    let service = service_for(&server)?;

    let result = service.generate_predictions(&s1_input()).await;

    assert!(!result.fallback);
    assert!(result.fallback_channels.is_empty());
    assert_eq!(result.confidence, 75);
    assert!(result.insights.is_empty(), "unexpected insights: {:?}", result.insights);
    assert!(result.recommendations.is_empty());

    assert_eq!(result.soil.soil_health_score, 75.0);
    assert_eq!(result.crop_yield.factors.overall_rating.as_deref(), Some("Good"));
    assert_eq!(result.crop_yield.factors.extra["soilQuality"], json!(0.8));
    assert_eq!(result.pest.common_pests, vec!["Aphids"]);
    assert_eq!(result.rainfall.expected_amount, 14.0);

    Ok(())
}

#[tokio::test]
async fn excellent_soil_yields_one_positive_insight() -> Result<()> {
    // ---
    let server = MockServer::start().await;
    let scores = Scores {
        soil: (90.0, 80.0),
        ..MID_RANGE
    };
    mount_backend(&server, &scores, 1, None).await;
    let service = service_for(&server)?;

    let result = service.generate_predictions(&s1_input()).await;

    let soil_positive: Vec<_> = result
        .insights
        .iter()
        .filter(|i| {
            i.kind == InsightKind::Positive
                && i.category == InsightCategory::Soil
                && i.impact == Impact::High
        })
        .collect();
    assert_eq!(soil_positive.len(), 1);
    assert_eq!(result.insights.len(), 1);
    assert!(result.recommendations.is_empty());

    Ok(())
}

#[tokio::test]
async fn catastrophic_backend_falls_back_everywhere() -> Result<()> {
    // ---
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(503).set_body_string("model not loaded"))
        .expect(4)
        .mount(&server)
        .await;
    let service = service_for(&server)?;

    let result = service.generate_predictions(&s1_input()).await;

    assert!(result.fallback);
    assert_eq!(result.fallback_channels, Channel::ALL.to_vec());
    assert_eq!(result.confidence, 70);

    let system: Vec<_> = result
        .insights
        .iter()
        .filter(|i| i.category == InsightCategory::System)
        .collect();
    assert_eq!(system.len(), 1);
    assert_eq!(system[0].kind, InsightKind::Info);
    assert_eq!(system[0].impact, Impact::Low);
    assert!(system[0].message.starts_with("Using offline predictions"));

    let checks: Vec<_> = result
        .recommendations
        .iter()
        .filter(|r| r.action == "System check")
        .collect();
    assert_eq!(checks.len(), 1);
    assert_eq!(checks[0].priority, Priority::Low);
    assert_eq!(checks[0].timeline, "When convenient");

    Ok(())
}

#[tokio::test]
async fn unreachable_backend_falls_back_everywhere() -> Result<()> {
    // ---
    // Nothing listens on port 1
    let transport = HttpTransport::new("http://127.0.0.1:1")?;
    let service = PredictionService::builder(Arc::new(transport))
        .seed(5)
        .build();

    let result = service.generate_predictions(&PredictionInput::default()).await;

    assert!(result.fallback);
    assert_eq!(result.confidence, 70);
    assert!(service.check_health().await.is_err());

    Ok(())
}

#[tokio::test]
async fn heavy_rain_and_pest_pressure() -> Result<()> {
    // ---
    let server = MockServer::start().await;
    let scores = Scores {
        soil: (65.0, 70.0),
        yield_confidence: 70.0,
        pest: (75.0, 75.0),
        rainfall: (80.0, 70.0),
    };
    mount_backend(&server, &scores, 1, None).await;
    let service = service_for(&server)?;

    let result = service.generate_predictions(&s1_input()).await;

    let insights: Vec<_> = result
        .insights
        .iter()
        .map(|i| (i.kind, i.category, i.impact))
        .collect();
    assert_eq!(
        insights,
        vec![
            (InsightKind::Info, InsightCategory::Weather, Impact::Medium),
            (InsightKind::Alert, InsightCategory::Pest, Impact::High),
        ]
    );

    let recommendations: Vec<_> = result
        .recommendations
        .iter()
        .map(|r| (r.priority, r.action.as_str(), r.timeline.as_str()))
        .collect();
    assert_eq!(
        recommendations,
        vec![
            (Priority::High, "Improve soil health", "2-4 weeks"),
            (Priority::Medium, "Pest monitoring", "1-2 weeks"),
        ]
    );
    assert!(!result.fallback);
    // (70 + 70 + 75 + 70) / 4 = 71.25
    assert_eq!(result.confidence, 71);

    Ok(())
}

#[tokio::test]
async fn second_call_is_served_from_cache() -> Result<()> {
    // ---
    let server = MockServer::start().await;
    mount_backend(&server, &MID_RANGE, 1, None).await;
    let service = service_for(&server)?;

    let first = service.generate_predictions(&s1_input()).await;
    let second = service.generate_predictions(&s1_input()).await;

    assert_eq!(server.received_requests().await.map(|r| r.len()), Some(4));
    assert_eq!(channel_json(&first)?, channel_json(&second)?);
    assert_eq!(service.cache_stats().fresh, 4);

    // An input that only differs in field order of the caller's JSON hits too
    let reordered: PredictionInput = serde_json::from_value(json!({
        "weather": {"pressure": 1013.0, "wind_speed": 10.0, "rainfall": 100.0, "humidity": 65.0, "temperature": 25.0},
        "soil": {"moisture": 25.0, "organic_matter": 3.5, "potassium": 40.0, "phosphorus": 30.0, "nitrogen": 50.0, "ph": 6.5}
    }))?;
    let third = service.generate_predictions(&reordered).await;
    assert_eq!(channel_json(&first)?, channel_json(&third)?);
    assert_eq!(server.received_requests().await.map(|r| r.len()), Some(4));

    Ok(())
}

#[tokio::test]
async fn concurrent_identical_calls_share_requests() -> Result<()> {
    // ---
    let server = MockServer::start().await;
    mount_backend(&server, &MID_RANGE, 1, Some(Duration::from_millis(200))).await;
    let service = service_for(&server)?;
    let input = s1_input();

    let (a, b) = tokio::join!(
        service.generate_predictions(&input),
        service.generate_predictions(&input)
    );

    assert_eq!(server.received_requests().await.map(|r| r.len()), Some(4));
    assert!(!a.fallback && !b.fallback);
    assert_eq!(channel_json(&a)?, channel_json(&b)?);

    Ok(())
}

#[tokio::test]
async fn soil_request_carries_defaults() -> Result<()> {
    // ---
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/api/soil-health/analyze"))
        .and(body_json(json!({
            "ph": 6.5,
            "nitrogen": 50.0,
            "phosphorus": 30.0,
            "potassium": 40.0,
            "organic_matter": 3.5,
            "moisture": 25.0
        })))
        .respond_with(ResponseTemplate::new(200).set_body_json(channel_body(Channel::Soil, &MID_RANGE)))
        .expect(1)
        .mount(&server)
        .await;
    let service = service_for(&server)?;

    let outcome = service.predict_soil_health(&SoilReadings::default()).await;

    assert!(!outcome.is_fallback());
    assert_eq!(outcome.value().confidence, 80.0);

    Ok(())
}

#[tokio::test]
async fn non_json_body_falls_back() -> Result<()> {
    // ---
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/api/predictions/rainfall"))
        .respond_with(ResponseTemplate::new(200).set_body_string("<html>oops</html>"))
        .expect(2)
        .mount(&server)
        .await;
    let service = service_for(&server)?;

    // Failures are not cached, so both calls reach the backend
    for _ in 0..2 {
        let outcome = service.predict_rainfall(&WeatherReadings::default()).await;
        assert!(outcome.is_fallback());
        assert_eq!(outcome.value().confidence, 65.0);
    }

    Ok(())
}

#[tokio::test]
async fn health_probe_reads_backend_status() -> Result<()> {
    // ---
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/api/health"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "status": "healthy",
            "model_status": "loaded",
            "api_version": "1.0.0"
        })))
        .mount(&server)
        .await;
    let service = service_for(&server)?;

    let health = service.check_health().await?;
    assert!(health.is_healthy());
    assert_eq!(health.api_version.as_deref(), Some("1.0.0"));

    Ok(())
}
