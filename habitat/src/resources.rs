use habitat_api::endpoints::SpaceId;
use habitat_api::endpoints::climate::Climate;
use habitat_api::endpoints::lighting::Lighting;
use habitat_api::endpoints::undo::UndoState;
use habitat_api::{Client, Request};

use crate::background::BackgroundTaskManager;
use crate::key_source::KeySource;
use crate::resource::KeyedResource;

/// Per-space resources, all keyed by the selected space
#[derive(Clone)]
pub struct SpaceResources {
    pub climate: KeyedResource<SpaceId, Climate>,
    pub lighting: KeyedResource<SpaceId, Lighting>,
    pub undo: KeyedResource<SpaceId, UndoState>,
}

impl SpaceResources {
    pub fn new(client: &Client, space: &KeySource<SpaceId>) -> Self {
        let climate = {
            let client = client.clone();
            KeyedResource::new("climate", space, move |space_id| {
                let client = client.clone();
                async move {
                    client
                        .send(Request::climate().with_space(space_id).get())
                        .await
                }
            })
        };

        let lighting = {
            let client = client.clone();
            KeyedResource::new("lighting", space, move |space_id| {
                let client = client.clone();
                async move {
                    client
                        .send(Request::lighting().with_space(space_id).get())
                        .await
                }
            })
        };

        let undo = {
            let client = client.clone();
            KeyedResource::new("undo", space, move |space_id| {
                let client = client.clone();
                async move { client.send(Request::undo().with_space(space_id).get()).await }
            })
        };

        Self {
            climate,
            lighting,
            undo,
        }
    }

    /// Re-fetch every resource whenever the space changes
    pub fn watch(&self, tasks: &mut BackgroundTaskManager) {
        tasks.watch_resource(self.climate.clone());
        tasks.watch_resource(self.lighting.clone());
        tasks.watch_resource(self.undo.clone());
    }
}
