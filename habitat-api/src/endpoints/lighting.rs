use super::{Endpoint, SpaceId, resource_path};
use serde::{Deserialize, Serialize};
use std::borrow::Cow;

// Common

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Zone {
    pub name: String,
    pub on: bool,
    /// 0-100
    #[serde(default)]
    pub brightness: u8,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Lighting {
    #[serde(default)]
    pub zones: Vec<Zone>,
    pub scene: Option<String>,
}

impl Lighting {
    pub fn lit_zones(&self) -> impl Iterator<Item = &Zone> {
        self.zones.iter().filter(|zone| zone.on)
    }
}

// Requests

#[derive(Debug, Clone, Serialize)]
pub struct GetLighting {
    space_id: SpaceId,
}

impl GetLighting {
    pub fn new(space_id: SpaceId) -> Self {
        Self { space_id }
    }
}

impl Endpoint for GetLighting {
    type Response = Lighting;

    fn endpoint(&self) -> Cow<'_, str> {
        resource_path(&self.space_id, "lighting").into()
    }
}
