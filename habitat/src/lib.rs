mod app;
mod background;
pub mod key_source;
pub mod logging;
pub mod resource;
pub mod resources;

pub use app::App;
pub use background::BackgroundTaskManager;
pub use key_source::{KeyObserver, KeySource};
pub use resource::{ErrorInfo, KeyedResource, ResourceState};

// Always expose testing module (integration tests need it)
pub mod testing;
