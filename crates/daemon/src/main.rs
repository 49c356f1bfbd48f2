use daemon::App;
use seemantic_core::Settings;
use std::path::PathBuf;
use tokio_util::sync::CancellationToken;
use tracing::info;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
  let config_path = std::env::args().nth(1).map(PathBuf::from);
  let settings = Settings::load(config_path.as_deref())?;
  daemon::logging::init_logging(&settings.log_level);

  let mut app = App::build(settings).await?;

  let cancel = CancellationToken::new();
  let shutdown = cancel.clone();
  tokio::spawn(async move {
    if tokio::signal::ctrl_c().await.is_ok() {
      info!("shutdown requested");
      shutdown.cancel();
    }
  });

  app.run(cancel).await;
  info!("indexing runtime stopped");
  Ok(())
}
