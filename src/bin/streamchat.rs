use anyhow::Result;
use streamchat::app::App;
use streamchat::config::Config;

#[tokio::main]
async fn main() -> Result<()> {
    streamchat::logging::init();

    let config = Config::load()?;
    config.validate()?;

    let mut app = App::new(config)?;
    app.run().await?;

    Ok(())
}
