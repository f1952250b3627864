//! Client for the US National Weather Service API.

use std::sync::Arc;

use chrono::{DateTime, FixedOffset};
use reqwest::Method;
use serde::Deserialize;
use url::Url;

use crate::client::{
    ApiCore, ApiError, CallScope, HttpTransport, Logger, MetricsSink, RequestSpec,
};
use crate::config::Config;

const GEO_JSON: &str = "application/geo+json";

/// Properties of one active alert feature.
#[derive(Debug, Clone, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Alert {
    pub event: Option<String>,
    pub area_desc: Option<String>,
    pub severity: Option<String>,
    pub headline: Option<String>,
    pub description: Option<String>,
    pub instruction: Option<String>,
    pub effective: Option<DateTime<FixedOffset>>,
    pub expires: Option<DateTime<FixedOffset>>,
}

#[derive(Debug, Clone, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ForecastPeriod {
    pub name: String,
    pub temperature: Option<f64>,
    pub temperature_unit: Option<String>,
    pub wind_speed: Option<String>,
    pub wind_direction: Option<String>,
    pub short_forecast: Option<String>,
    pub detailed_forecast: Option<String>,
}

/// Grid metadata for a coordinate.
#[derive(Debug, Clone, PartialEq)]
pub struct PointInfo {
    pub forecast_url: Url,
    pub city: Option<String>,
    pub state: Option<String>,
}

#[derive(Debug, Deserialize)]
struct FeatureCollection<P> {
    #[serde(default = "Vec::new")]
    features: Vec<Feature<P>>,
}

#[derive(Debug, Deserialize)]
struct Feature<P> {
    properties: P,
}

#[derive(Debug, Deserialize)]
struct PointsResponse {
    properties: PointProperties,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct PointProperties {
    forecast: Option<String>,
    relative_location: Option<Feature<RelativeLocation>>,
}

#[derive(Debug, Deserialize)]
struct RelativeLocation {
    city: Option<String>,
    state: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ForecastResponse {
    properties: ForecastProperties,
}

#[derive(Debug, Deserialize)]
struct ForecastProperties {
    #[serde(default)]
    periods: Vec<ForecastPeriod>,
}

/// Upper-cases a two-letter state or territory code.
pub fn normalize_state(state: &str) -> Result<String, ApiError> {
    let state = state.trim();
    if state.len() != 2 || !state.chars().all(|c| c.is_ascii_alphabetic()) {
        return Err(ApiError::validation(format!(
            "State must be a two-letter code such as CA or NY, got {state:?}"
        )));
    }
    Ok(state.to_ascii_uppercase())
}

pub fn validate_coordinates(latitude: f64, longitude: f64) -> Result<(), ApiError> {
    if !latitude.is_finite() || !(-90.0..=90.0).contains(&latitude) {
        return Err(ApiError::validation(format!(
            "Latitude must be between -90 and 90, got {latitude}"
        )));
    }
    if !longitude.is_finite() || !(-180.0..=180.0).contains(&longitude) {
        return Err(ApiError::validation(format!(
            "Longitude must be between -180 and 180, got {longitude}"
        )));
    }
    Ok(())
}

/// Facade over the weather API.
pub struct WeatherClient {
    core: ApiCore,
    base_url: Url,
    user_agent: String,
}

impl WeatherClient {
    pub fn new(core: ApiCore, base_url: Url, user_agent: impl Into<String>) -> Self {
        Self {
            core,
            base_url,
            user_agent: user_agent.into(),
        }
    }

    pub fn from_config(
        config: &Config,
        logger: Arc<dyn Logger>,
        metrics: Arc<dyn MetricsSink>,
    ) -> Result<Self, ApiError> {
        let base_url = config
            .weather_url()
            .map_err(|e| ApiError::validation(e.to_string()))?;
        let core = ApiCore::new(
            Arc::new(HttpTransport::with_tls_verification(true)?),
            config.retry_policy(),
            config.request_timeout(),
            logger.child(crate::client::fields! { "service" => "weather" }),
            metrics,
        );
        Ok(Self::new(core, base_url, config.weather.user_agent.clone()))
    }

    fn endpoint(&self, segments: &[&str]) -> Result<Url, ApiError> {
        let mut url = self.base_url.clone();
        url.path_segments_mut()
            .map_err(|_| ApiError::validation("The weather base URL cannot carry a path"))?
            .pop_if_empty()
            .extend(segments);
        Ok(url)
    }

    fn request(&self, url: Url) -> Result<RequestSpec, ApiError> {
        self.core
            .request(Method::GET, url)
            .header("User-Agent", &self.user_agent)?
            .header("Accept", GEO_JSON)
    }

    /// Active alerts for a US state.
    pub async fn get_alerts(&self, state: &str) -> Result<Vec<Alert>, ApiError> {
        self.core
            .operation("weather.alerts", |scope| async move {
                let state = normalize_state(state)?;
                let mut url = self.endpoint(&["alerts", "active"])?;
                url.query_pairs_mut().append_pair("area", &state);

                let spec = self.request(url)?;
                scope
                    .send_json::<FeatureCollection<Alert>>(spec)
                    .await
                    .map(|collection| {
                        collection.features.into_iter().map(|f| f.properties).collect()
                    })
                    .map_err(|e| e.with_metadata("state", state.as_str()))
            })
            .await
    }

    /// Resolves a coordinate to its forecast endpoint.
    pub async fn get_points(&self, latitude: f64, longitude: f64) -> Result<PointInfo, ApiError> {
        self.core
            .operation("weather.points", |scope| async move {
                self.resolve_point(&scope, latitude, longitude).await
            })
            .await
    }

    /// Forecast periods for a coordinate: the point lookup and the forecast
    /// fetch run as one operation.
    pub async fn get_forecast(
        &self,
        latitude: f64,
        longitude: f64,
    ) -> Result<(PointInfo, Vec<ForecastPeriod>), ApiError> {
        self.core
            .operation("weather.forecast", |scope| async move {
                let point = self.resolve_point(&scope, latitude, longitude).await?;
                let spec = self.request(point.forecast_url.clone())?;
                let forecast = scope
                    .send_json::<ForecastResponse>(spec)
                    .await
                    .map_err(|e| e.with_metadata("forecast_url", point.forecast_url.as_str()))?;
                Ok((point, forecast.properties.periods))
            })
            .await
    }

    async fn resolve_point(
        &self,
        scope: &CallScope,
        latitude: f64,
        longitude: f64,
    ) -> Result<PointInfo, ApiError> {
        validate_coordinates(latitude, longitude)?;
        let coordinate = format!("{latitude:.4},{longitude:.4}");
        let spec = self.request(self.endpoint(&["points", &coordinate])?)?;

        let decoded = scope.send_json::<PointsResponse>(spec).await.and_then(|points| {
            let forecast = points.properties.forecast.ok_or_else(|| {
                ApiError::system("No forecast is available for this location")
            })?;
            let forecast_url = Url::parse(&forecast).map_err(|e| {
                ApiError::system("The weather service returned an invalid forecast link")
                    .with_cause(e)
            })?;
            let location = points.properties.relative_location.map(|f| f.properties);
            Ok(PointInfo {
                forecast_url,
                city: location.as_ref().and_then(|l| l.city.clone()),
                state: location.and_then(|l| l.state),
            })
        });
        decoded.map_err(|e| e.with_metadata("coordinate", coordinate.as_str()))
    }
}
