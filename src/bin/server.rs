//! HTTP server binary: generated submission endpoints plus status polling.

use std::sync::Arc;

use anyhow::Context;
use conveyor::backend::memory::MemoryBackend;
use conveyor::backend::JobBackend;
use conveyor::http::{self, AppState};
use conveyor::tasks::{self, osrm::OsrmClient};
use conveyor::{Config, Dispatcher, ExecutionMode, TaskRegistry};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_max_level(tracing::Level::INFO)
        .init();

    let config = Config::from_env().context("invalid configuration")?;

    let mut registry = TaskRegistry::new();
    tasks::register_builtin(&mut registry, Arc::new(OsrmClient::new(config.osrm_base_url.clone())))
        .context("task registration failed")?;

    let backend = backend_for(&config).await?;
    let state = Arc::new(AppState {
        registry: registry.seal(),
        dispatcher: Dispatcher::new(backend, config.mode),
    });

    http::serve(&config.bind_addr, state).await
}

#[cfg(feature = "redis")]
async fn backend_for(config: &Config) -> anyhow::Result<Arc<dyn JobBackend>> {
    use conveyor::backend::redis::RedisBackend;

    match config.mode {
        ExecutionMode::Eager => Ok(Arc::new(MemoryBackend::new())),
        ExecutionMode::Deferred => {
            // Config::from_env guarantees the URL in deferred mode.
            let url = config
                .redis_url
                .as_deref()
                .context("REDIS_URL missing in deferred mode")?;
            Ok(Arc::new(RedisBackend::new(url).await?))
        },
    }
}

#[cfg(not(feature = "redis"))]
async fn backend_for(config: &Config) -> anyhow::Result<Arc<dyn JobBackend>> {
    match config.mode {
        ExecutionMode::Eager => Ok(Arc::new(MemoryBackend::new())),
        ExecutionMode::Deferred => {
            anyhow::bail!("deferred mode requires building with the 'redis' feature")
        },
    }
}
