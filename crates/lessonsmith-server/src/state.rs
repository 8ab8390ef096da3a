use lessonsmith_core::catalog::Catalog;
use lessonsmith_core::checkout::{CheckoutBridge, PaymentProvider, StaticCheckout};
use lessonsmith_core::config::ServiceConfig;
use lessonsmith_core::pipeline::Pipeline;
use lessonsmith_core::session::SessionEngine;
use lessonsmith_core::store::Store;
use std::sync::Arc;

/// Shared application state passed to all route handlers.
#[derive(Clone)]
pub struct AppState {
    pub catalog: Arc<Catalog>,
    pub engine: Arc<SessionEngine>,
    pub pipeline: Arc<Pipeline>,
    pub bridge: Arc<CheckoutBridge>,
}

impl AppState {
    pub fn new(store: Arc<Store>, catalog: Catalog, config: ServiceConfig) -> Self {
        let provider: Arc<dyn PaymentProvider> = Arc::new(StaticCheckout::new(&config));
        Self::with_provider(store, catalog, config, provider)
    }

    pub fn with_provider(
        store: Arc<Store>,
        catalog: Catalog,
        config: ServiceConfig,
        provider: Arc<dyn PaymentProvider>,
    ) -> Self {
        let engine = Arc::new(SessionEngine::new(Arc::clone(&store), config.clone()));
        let pipeline = Arc::new(Pipeline::new(Arc::clone(&store), config.clone()));
        let bridge = Arc::new(CheckoutBridge::new(
            Arc::clone(&store),
            Arc::clone(&pipeline),
            provider,
            config,
        ));
        let state = Self {
            catalog: Arc::new(catalog),
            engine,
            pipeline,
            bridge,
        };

        // Periodic watchdog: fail orders the workers stopped reporting on.
        // Guard: only spawn if inside a Tokio runtime (skipped in sync unit
        // tests).
        if tokio::runtime::Handle::try_current().is_ok() {
            let pipeline = Arc::clone(&state.pipeline);
            tokio::spawn(async move {
                loop {
                    tokio::time::sleep(std::time::Duration::from_secs(60)).await;
                    let pipeline = Arc::clone(&pipeline);
                    let swept = tokio::task::spawn_blocking(move || pipeline.fail_stalled()).await;
                    match swept {
                        Ok(Ok(0)) | Err(_) => {}
                        Ok(Ok(n)) => tracing::warn!(count = n, "watchdog failed stalled orders"),
                        Ok(Err(e)) => tracing::error!(error = %e, "watchdog sweep failed"),
                    }
                }
            });
        }

        state
    }
}
