//! Fills partial caller inputs with channel defaults.
//!
//! Caller-supplied values always win; only absent or non-finite fields are
//! replaced. Nothing here fails.

use crate::clock::Season;
use crate::models::{
    CropDetails, CropInput, NormalisedInput, PestInput, PredictionInput, SoilInput, SoilReadings,
    WeatherInput, WeatherReadings,
};

// ---

pub const DEFAULT_SOIL: SoilInput = SoilInput {
    ph: 6.5,
    nitrogen: 50.0,
    phosphorus: 30.0,
    potassium: 40.0,
    organic_matter: 3.5,
    moisture: 25.0,
};

pub const DEFAULT_WEATHER: WeatherInput = WeatherInput {
    temperature: 25.0,
    humidity: 65.0,
    rainfall: 100.0,
    wind_speed: 10.0,
    pressure: 1013.0,
};

pub const DEFAULT_CROP_TYPE: &str = "wheat";
pub const DEFAULT_AREA: f64 = 1.0;

fn or_default(value: Option<f64>, default: f64) -> f64 {
    value.filter(|v| v.is_finite()).unwrap_or(default)
}

// ---

pub fn soil(readings: &SoilReadings) -> SoilInput {
    // ---
    SoilInput {
        ph: or_default(readings.ph, DEFAULT_SOIL.ph),
        nitrogen: or_default(readings.nitrogen, DEFAULT_SOIL.nitrogen),
        phosphorus: or_default(readings.phosphorus, DEFAULT_SOIL.phosphorus),
        potassium: or_default(readings.potassium, DEFAULT_SOIL.potassium),
        organic_matter: or_default(readings.organic_matter, DEFAULT_SOIL.organic_matter),
        moisture: or_default(readings.moisture, DEFAULT_SOIL.moisture),
    }
}

pub fn weather(readings: &WeatherReadings) -> WeatherInput {
    // ---
    WeatherInput {
        temperature: or_default(readings.temperature, DEFAULT_WEATHER.temperature),
        humidity: or_default(readings.humidity, DEFAULT_WEATHER.humidity),
        rainfall: or_default(readings.rainfall, DEFAULT_WEATHER.rainfall),
        wind_speed: or_default(readings.wind_speed, DEFAULT_WEATHER.wind_speed),
        pressure: or_default(readings.pressure, DEFAULT_WEATHER.pressure),
    }
}

pub fn crop(details: &CropDetails) -> CropInput {
    // ---
    let crop_type = details
        .crop_type
        .as_deref()
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .unwrap_or(DEFAULT_CROP_TYPE)
        .to_string();

    CropInput {
        crop_type,
        area: or_default(details.area, DEFAULT_AREA),
    }
}

pub fn pest(weather: &WeatherInput, season: Season) -> PestInput {
    PestInput {
        temperature: weather.temperature,
        humidity: weather.humidity,
        season,
    }
}

/// Build every channel request from one caller input.
pub fn normalize(input: &PredictionInput, season: Season) -> NormalisedInput {
    // ---
    let soil = soil(input.soil.as_ref().unwrap_or(&SoilReadings::default()));
    let weather = weather(input.weather.as_ref().unwrap_or(&WeatherReadings::default()));
    let crop = crop(input.crop.as_ref().unwrap_or(&CropDetails::default()));
    let pest = pest(&weather, season);

    NormalisedInput {
        soil,
        weather,
        crop,
        pest,
    }
}
