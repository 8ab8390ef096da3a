use clap::Parser;
use lessonsmith_core::catalog::Catalog;
use lessonsmith_core::config::ServiceConfig;
use lessonsmith_core::store::Store;
use lessonsmith_server::AppState;
use std::path::PathBuf;
use std::sync::Arc;

#[derive(Parser)]
#[command(
    name = "lessonsmith",
    about = "Personalized lesson commerce API — guided intake, checkout, and fulfillment tracking",
    version
)]
struct Cli {
    /// Path to the order/session database
    #[arg(long, env = "LESSONSMITH_DB", default_value = "lessonsmith.redb")]
    db: PathBuf,

    /// Path to the service configuration file (YAML)
    #[arg(long, env = "LESSONSMITH_CONFIG", default_value = "lessonsmith.yaml")]
    config: PathBuf,

    /// Path to the product catalog file (YAML); built-in line-up when absent
    #[arg(long, env = "LESSONSMITH_CATALOG", default_value = "catalog.yaml")]
    catalog: PathBuf,

    /// Port to listen on
    #[arg(long, short = 'p', env = "LESSONSMITH_PORT", default_value = "3140")]
    port: u16,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive(tracing::Level::INFO.into()),
        )
        .with_target(false)
        .init();

    let config = ServiceConfig::load(&cli.config)?;
    let catalog = Catalog::load(&cli.catalog)?;
    let store = Arc::new(Store::open(&cli.db)?);

    let state = AppState::new(store, catalog, config);
    lessonsmith_server::serve(state, cli.port).await
}
