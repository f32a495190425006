use super::{Endpoint, SpaceId, resource_path};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::borrow::Cow;

// Common

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum HvacMode {
    Off,
    Heat,
    Cool,
    Auto,
    #[serde(other)]
    Unknown,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Climate {
    pub temperature: f64,
    pub target_temperature: Option<f64>,
    pub humidity: Option<f64>,
    pub mode: Option<HvacMode>,
    pub updated_at: Option<DateTime<Utc>>,
}

// Requests

#[derive(Debug, Clone, Serialize)]
pub struct GetClimate {
    space_id: SpaceId,
}

impl GetClimate {
    pub fn new(space_id: SpaceId) -> Self {
        Self { space_id }
    }
}

impl Endpoint for GetClimate {
    type Response = Climate;

    fn endpoint(&self) -> Cow<'_, str> {
        resource_path(&self.space_id, "climate").into()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_climate_deserializes_partial_body() {
        let climate: Climate = serde_json::from_value(json!({
            "temperature": 21.5,
            "mode": "dehumidify",
        }))
        .unwrap();

        assert_eq!(climate.temperature, 21.5);
        assert_eq!(climate.mode, Some(HvacMode::Unknown));
        assert_eq!(climate.humidity, None);
    }
}
