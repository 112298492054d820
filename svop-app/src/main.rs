mod app;
mod cli;

use clap::Parser;
use tracing::info;

pub use app::App;
use cli::Cli;

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "svop_app=info,svop_session=info,svop_core=info,wgpu=warn".into()),
        )
        .init();

    info!("svop v{} starting", env!("CARGO_PKG_VERSION"));

    let app = App::new(&cli)?;
    app.run()?;

    Ok(())
}
