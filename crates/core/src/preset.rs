//! Built-in forecast questions that can be started without writing a
//! request by hand.

use serde::{Deserialize, Serialize};

use crate::job::{default_iterations, ForecastRequest};

/// Question of the Ukraine ceasefire 2026 forecast.
pub const UKRAINE_CEASEFIRE_QUESTION: &str =
    "Mit welcher Wahrscheinlichkeit kommt es im Jahr 2026 zu einem Waffenstillstand in der Ukraine?";

/// Resolution criteria of the Ukraine ceasefire forecast.
pub const UKRAINE_CEASEFIRE_DEFINITION: &str =
    "Ein Waffenstillstand wird definiert als eine offizielle Vereinbarung zwischen Russland \
     und der Ukraine über die Einstellung der Kampfhandlungen.";

/// Payload of the Ukraine ceasefire preset.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UkraineForecastRequest {
    /// Optional resolution date, e.g. `2026-03-31`.
    #[serde(default)]
    pub by_date: Option<String>,
    #[serde(default = "default_iterations")]
    pub iterations: u32,
    #[serde(default)]
    pub enhanced_prompts: bool,
}

impl UkraineForecastRequest {
    /// The full request this preset stands for. `by_date` becomes the
    /// timeframe; a blank date is dropped.
    pub fn into_forecast_request(self) -> ForecastRequest {
        let mut request =
            ForecastRequest::new(UKRAINE_CEASEFIRE_QUESTION, UKRAINE_CEASEFIRE_DEFINITION);
        request.timeframe = self
            .by_date
            .map(|d| d.trim().to_string())
            .filter(|d| !d.is_empty());
        request.iterations = self.iterations;
        request.enhanced_prompts = self.enhanced_prompts;
        request
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_body_uses_defaults() {
        let preset: UkraineForecastRequest = serde_json::from_str("{}").unwrap();
        let request = preset.into_forecast_request();

        assert_eq!(request.question, UKRAINE_CEASEFIRE_QUESTION);
        assert_eq!(request.iterations, crate::job::DEFAULT_ITERATIONS);
        assert_eq!(request.timeframe, None);
        assert!(request.models.is_none());
        assert!(request.validate_request().is_ok());
    }

    #[test]
    fn by_date_becomes_timeframe() {
        let preset = UkraineForecastRequest {
            by_date: Some(" 2026-03-31 ".into()),
            iterations: 3,
            enhanced_prompts: true,
        };
        let request = preset.into_forecast_request();

        assert_eq!(request.timeframe.as_deref(), Some("2026-03-31"));
        assert_eq!(request.iterations, 3);
        assert!(request.enhanced_prompts);
    }
}
