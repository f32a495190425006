use super::{Endpoint, SpaceId, resource_path};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::borrow::Cow;

// Common

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UndoEntry {
    pub description: String,
    pub recorded_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UndoState {
    pub can_undo: bool,
    pub can_redo: bool,
    pub last: Option<UndoEntry>,
}

// Requests

#[derive(Debug, Clone, Serialize)]
pub struct GetUndoState {
    space_id: SpaceId,
}

impl GetUndoState {
    pub fn new(space_id: SpaceId) -> Self {
        Self { space_id }
    }
}

impl Endpoint for GetUndoState {
    type Response = UndoState;

    fn endpoint(&self) -> Cow<'_, str> {
        resource_path(&self.space_id, "undo").into()
    }
}
