use anyhow::Result;
use std::time::Duration;

use habitat_api::endpoints::SpaceId;
use habitat_api::Client;

use crate::background::BackgroundTaskManager;
use crate::key_source::KeySource;
use crate::resource::{KeyedResource, ResourceState};
use crate::resources::SpaceResources;

pub struct App {
    client: Client,
    spaces: Vec<SpaceId>,
    timeout: Duration,
}

impl App {
    pub fn new(client: Client, spaces: Vec<SpaceId>) -> Self {
        Self {
            client,
            spaces,
            timeout: Duration::from_secs(10),
        }
    }

    /// How long to wait for a space's resources to settle
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub async fn run(&self) -> Result<()> {
        tracing::info!("habitat starting with {} space(s)", self.spaces.len());

        let selected = KeySource::new(None);
        let resources = SpaceResources::new(&self.client, &selected);

        let mut task_manager = BackgroundTaskManager::new();
        resources.watch(&mut task_manager);

        for space in &self.spaces {
            tracing::info!("Selecting space {}", space);
            selected.set(Some(*space));

            println!("== {} ==", space);
            self.report("climate", &resources.climate, |climate| {
                let mut line = format!("{:.1}°", climate.temperature);
                if let Some(target) = climate.target_temperature {
                    line.push_str(&format!(" (target {:.1}°)", target));
                }
                if let Some(humidity) = climate.humidity {
                    line.push_str(&format!(", {:.0}% humidity", humidity));
                }
                if let Some(mode) = climate.mode {
                    line.push_str(&format!(", {:?}", mode));
                }
                line
            })
            .await;
            self.report("lighting", &resources.lighting, |lighting| {
                let lit: Vec<_> = lighting.lit_zones().map(|zone| zone.name.as_str()).collect();
                match &lighting.scene {
                    Some(scene) => format!("scene {}, lit: {}", scene, lit.join(", ")),
                    None => format!("lit: {}", lit.join(", ")),
                }
            })
            .await;
            self.report("undo", &resources.undo, |undo| match &undo.last {
                Some(entry) => format!(
                    "can undo: {}, can redo: {}, last: {} at {}",
                    undo.can_undo, undo.can_redo, entry.description, entry.recorded_at
                ),
                None => format!("can undo: {}, can redo: {}", undo.can_undo, undo.can_redo),
            })
            .await;
        }

        tracing::info!("Cleaning up application");
        selected.set(None);
        task_manager.cancel_all();

        Ok(())
    }

    async fn report<V>(
        &self,
        label: &str,
        resource: &KeyedResource<SpaceId, V>,
        describe: impl Fn(&V) -> String,
    ) where
        V: Clone + Send + 'static,
    {
        let line = match tokio::time::timeout(self.timeout, resource.settled()).await {
            Ok(ResourceState {
                value: Some(value), ..
            }) => describe(&value),
            Ok(ResourceState {
                error: Some(error), ..
            }) => format!("unavailable ({})", error),
            Ok(_) => "unavailable".to_string(),
            Err(_) => {
                tracing::warn!("{}: timed out after {:?}", label, self.timeout);
                "timed out".to_string()
            }
        };
        println!("  {:<9} {}", label, line);
    }
}
