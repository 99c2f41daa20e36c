//! Worker binary: claims queued jobs and runs the registered bodies.
//!
//! Pointless in eager mode (nothing is ever queued), so it refuses to
//! start unless deferred mode is configured.

use std::sync::Arc;

use anyhow::Context;
use conveyor::backend::JobBackend;
use conveyor::tasks::{self, osrm::OsrmClient};
use conveyor::{Config, ExecutionMode, TaskRegistry, Worker};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_max_level(tracing::Level::INFO)
        .init();

    let config = Config::from_env().context("invalid configuration")?;
    if config.mode == ExecutionMode::Eager {
        anyhow::bail!("worker is not needed in eager mode; unset TASKS_EAGER");
    }

    let mut registry = TaskRegistry::new();
    tasks::register_builtin(&mut registry, Arc::new(OsrmClient::new(config.osrm_base_url.clone())))
        .context("task registration failed")?;

    let backend = backend_for(&config).await?;
    let worker = Worker::new(backend, registry.seal(), config.task_time_limit);

    tokio::select! {
        () = worker.run() => Ok(()),
        result = tokio::signal::ctrl_c() => {
            result.context("failed to listen for shutdown signal")?;
            tracing::info!("shutting down");
            Ok(())
        },
    }
}

#[cfg(feature = "redis")]
async fn backend_for(config: &Config) -> anyhow::Result<Arc<dyn JobBackend>> {
    use conveyor::backend::redis::RedisBackend;

    // Config::from_env guarantees the URL in deferred mode.
    let url = config
        .redis_url
        .as_deref()
        .context("REDIS_URL missing in deferred mode")?;
    Ok(Arc::new(RedisBackend::new(url).await?))
}

#[cfg(not(feature = "redis"))]
async fn backend_for(_config: &Config) -> anyhow::Result<Arc<dyn JobBackend>> {
    anyhow::bail!("the worker requires building with the 'redis' feature")
}
