pub mod climate;
pub mod lighting;
pub mod undo;

use reqwest::Method;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::borrow::Cow;
use std::fmt::Display;
use std::str::FromStr;
use uuid::Uuid;

/// A typed request against one resource endpoint
pub trait Endpoint {
    type Response: DeserializeOwned;

    fn endpoint(&self) -> Cow<'_, str>;

    fn method(&self) -> Method {
        Method::GET
    }
}

/// Identifier of a space, the key every resource endpoint is scoped by
#[derive(
    Default, Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize,
)]
#[serde(transparent)]
pub struct SpaceId(Uuid);

impl SpaceId {
    pub fn new(uuid: Uuid) -> Self {
        Self(uuid)
    }

    pub fn uuid(&self) -> Uuid {
        self.0
    }
}

impl Display for SpaceId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        self.0.fmt(f)
    }
}

impl From<Uuid> for SpaceId {
    fn from(uuid: Uuid) -> Self {
        SpaceId(uuid)
    }
}

impl FromStr for SpaceId {
    type Err = SpaceIdParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Uuid::parse_str(s)
            .map(SpaceId)
            .map_err(|_| SpaceIdParseError(s.to_string()))
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SpaceIdParseError(String);

impl Display for SpaceIdParseError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "invalid space ID '{}': expected a UUID", self.0)
    }
}

impl std::error::Error for SpaceIdParseError {}

/// `/resource/{space}/{subpath}`
pub(crate) fn resource_path(space_id: &SpaceId, subpath: &str) -> String {
    format!("/resource/{}/{}", space_id, subpath)
}
