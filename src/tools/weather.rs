use std::sync::Arc;

use serde::Deserialize;

use super::Tool;
use crate::client::ApiError;
use crate::weather::{Alert, ForecastPeriod, WeatherClient};

/// Number of forecast periods shown (the API returns about fourteen).
const FORECAST_PERIODS: usize = 5;

/// Lists active weather alerts for a US state.
pub struct GetAlerts {
    weather: Arc<WeatherClient>,
}

#[derive(Debug, Deserialize)]
pub struct AlertsInput {
    pub state: String,
}

impl GetAlerts {
    pub fn new(weather: Arc<WeatherClient>) -> Self {
        Self { weather }
    }

    fn format_alert(alert: &Alert) -> String {
        let or_unknown = |v: &Option<String>| v.clone().unwrap_or_else(|| "Unknown".to_string());
        let mut text = format!(
            "Event: {}\nArea: {}\nSeverity: {}\n",
            or_unknown(&alert.event),
            or_unknown(&alert.area_desc),
            or_unknown(&alert.severity),
        );
        if let Some(expires) = alert.expires {
            text.push_str(&format!("Expires: {}\n", expires.format("%Y-%m-%d %H:%M %:z")));
        }
        text.push_str(&format!(
            "Description: {}\nInstructions: {}",
            alert.description.as_deref().unwrap_or("No description available"),
            alert.instruction.as_deref().unwrap_or("No specific instructions provided"),
        ));
        text
    }
}

#[async_trait::async_trait]
impl Tool for GetAlerts {
    type Input = AlertsInput;

    fn name(&self) -> &'static str {
        "get_alerts"
    }

    async fn run(&self, input: AlertsInput) -> Result<String, ApiError> {
        let alerts = self.weather.get_alerts(&input.state).await?;
        log::info!("GetAlerts: {} active alert(s) for {}", alerts.len(), input.state);

        if alerts.is_empty() {
            return Ok(format!(
                "No active alerts for {}.",
                input.state.trim().to_uppercase()
            ));
        }

        Ok(alerts
            .iter()
            .map(Self::format_alert)
            .collect::<Vec<_>>()
            .join("\n---\n"))
    }
}

/// Short forecast for a coordinate.
pub struct GetForecast {
    weather: Arc<WeatherClient>,
}

#[derive(Debug, Deserialize)]
pub struct ForecastInput {
    pub latitude: f64,
    pub longitude: f64,
}

impl GetForecast {
    pub fn new(weather: Arc<WeatherClient>) -> Self {
        Self { weather }
    }

    fn format_period(period: &ForecastPeriod) -> String {
        let temperature = match period.temperature {
            Some(t) => format!("{}°{}", t, period.temperature_unit.as_deref().unwrap_or("")),
            None => "n/a".to_string(),
        };
        format!(
            "{}:\nTemperature: {}\nWind: {} {}\nForecast: {}",
            period.name,
            temperature,
            period.wind_speed.as_deref().unwrap_or("n/a"),
            period.wind_direction.as_deref().unwrap_or(""),
            period
                .detailed_forecast
                .as_deref()
                .or(period.short_forecast.as_deref())
                .unwrap_or("No forecast text"),
        )
    }
}

#[async_trait::async_trait]
impl Tool for GetForecast {
    type Input = ForecastInput;

    fn name(&self) -> &'static str {
        "get_forecast"
    }

    async fn run(&self, input: ForecastInput) -> Result<String, ApiError> {
        let (point, periods) = self
            .weather
            .get_forecast(input.latitude, input.longitude)
            .await?;

        if periods.is_empty() {
            return Ok("No forecast periods were returned for this location.".to_string());
        }

        let mut text = match (&point.city, &point.state) {
            (Some(city), Some(state)) => format!("Forecast for {city}, {state}\n\n"),
            _ => String::new(),
        };
        text.push_str(
            &periods
                .iter()
                .take(FORECAST_PERIODS)
                .map(Self::format_period)
                .collect::<Vec<_>>()
                .join("\n---\n"),
        );
        Ok(text)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_format_alert_with_missing_fields() {
        let alert = Alert {
            event: Some("Flood Watch".to_string()),
            area_desc: None,
            severity: Some("Severe".to_string()),
            headline: None,
            description: None,
            instruction: None,
            effective: None,
            expires: None,
        };
        let text = GetAlerts::format_alert(&alert);
        assert!(text.contains("Event: Flood Watch"));
        assert!(text.contains("Area: Unknown"));
        assert!(text.contains("No specific instructions provided"));
        assert!(!text.contains("Expires"));
    }

    #[test]
    fn test_format_period() {
        let period = ForecastPeriod {
            name: "Tonight".to_string(),
            temperature: Some(54.0),
            temperature_unit: Some("F".to_string()),
            wind_speed: Some("5 mph".to_string()),
            wind_direction: Some("S".to_string()),
            short_forecast: Some("Clear".to_string()),
            detailed_forecast: None,
        };
        let text = GetForecast::format_period(&period);
        assert!(text.starts_with("Tonight:"));
        assert!(text.contains("Temperature: 54°F"));
        assert!(text.contains("Wind: 5 mph S"));
        assert!(text.contains("Forecast: Clear"));
    }
}
