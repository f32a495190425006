use crate::endpoints::{
    SpaceId, climate::GetClimate, lighting::GetLighting, undo::GetUndoState,
};

#[derive(Default)]
pub struct ClimateRepository {
    space_id: SpaceId,
}

impl ClimateRepository {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_space(mut self, space_id: SpaceId) -> Self {
        self.space_id = space_id;
        self
    }

    pub fn get(&self) -> GetClimate {
        GetClimate::new(self.space_id)
    }
}

#[derive(Default)]
pub struct LightingRepository {
    space_id: SpaceId,
}

impl LightingRepository {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_space(mut self, space_id: SpaceId) -> Self {
        self.space_id = space_id;
        self
    }

    pub fn get(&self) -> GetLighting {
        GetLighting::new(self.space_id)
    }
}

#[derive(Default)]
pub struct UndoRepository {
    space_id: SpaceId,
}

impl UndoRepository {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_space(mut self, space_id: SpaceId) -> Self {
        self.space_id = space_id;
        self
    }

    pub fn get(&self) -> GetUndoState {
        GetUndoState::new(self.space_id)
    }
}
