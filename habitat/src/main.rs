use anyhow::{bail, Result};

use habitat::App;
use habitat_api::endpoints::SpaceId;
use habitat_api::Client;
use habitat_auth::Settings;

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();

    let spaces = std::env::args()
        .skip(1)
        .map(|arg| arg.parse::<SpaceId>())
        .collect::<Result<Vec<_>, _>>()?;
    if spaces.is_empty() {
        bail!("usage: habitat <space-id>...");
    }

    let log_path = habitat::logging::init_logging()?;
    tracing::debug!("Logging to {}", log_path.display());

    let settings = Settings::new()?;
    let transport = habitat_auth::connect(&settings)?;
    habitat_auth::authenticate(transport.session()).await?;

    App::new(Client::new(transport), spaces)
        .with_timeout(settings.request_timeout() * 2)
        .run()
        .await?;

    Ok(())
}
