//! browser-relay application wiring.
//!
//! Builds the orchestrator, the Socket Mode gateway and the reply worker
//! from a [`RelayConfig`] and runs them until shutdown.

pub mod config;

pub use config::RelayConfig;

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use relay_core::{Dispatcher, ProcessRunner, TaskOrchestrator, reply_channel};
use relay_slack::{Outbox, SlackApi, SlackConfig, SocketModeGateway};
use tokio::sync::{broadcast, mpsc};
use tracing::{info, warn};

/// Inbound messages buffered between the gateway and the dispatcher.
const INBOUND_CAPACITY: usize = 256;

/// How often idle thread state is swept.
const JANITOR_INTERVAL: Duration = Duration::from_secs(60);

/// How long to wait for the reply worker after shutdown is signalled.
const DRAIN_TIMEOUT: Duration = Duration::from_secs(10);

/// Run the relay until the gateway fails fatally.
pub async fn run(config: RelayConfig, slack: SlackConfig) -> anyhow::Result<()> {
    run_with_shutdown(config, slack, std::future::pending()).await
}

/// Run the relay with graceful shutdown support.
///
/// Returns an error only for fatal conditions: an unusable agent command or
/// a gateway that cannot authenticate.
pub async fn run_with_shutdown<F>(
    config: RelayConfig,
    slack: SlackConfig,
    shutdown: F,
) -> anyhow::Result<()>
where
    F: Future<Output = ()> + Send + 'static,
{
    let mut runner = ProcessRunner::from_command_line(&config.agent.command)
        .context("Invalid agent command")?;
    if let Some(api_key) = config.agent.api_key.clone() {
        runner = runner.with_api_key(api_key);
    }
    info!(
        program = runner.program(),
        prefix = %config.bot.command_prefix,
        max_steps = config.bot.max_steps,
        timeout_secs = config.bot.task_timeout_secs,
        "Starting browser-relay"
    );

    let (replies, reply_rx) = reply_channel();
    let orchestrator = TaskOrchestrator::new(config.bot.clone(), Arc::new(runner), replies.clone());
    let janitor = orchestrator.spawn_janitor(JANITOR_INTERVAL);
    let dispatcher = Dispatcher::new(orchestrator, replies);

    let api = Arc::new(SlackApi::new(slack, &config.gateway)?);
    let gateway = Arc::new(SocketModeGateway::new(Arc::clone(&api), config.gateway.clone()));
    let (shutdown_tx, _) = broadcast::channel::<()>(1);

    let (inbound_tx, inbound_rx) = mpsc::channel(INBOUND_CAPACITY);
    let mut gateway_task = {
        let gateway = Arc::clone(&gateway);
        let shutdown_rx = shutdown_tx.subscribe();
        tokio::spawn(async move { gateway.run(inbound_tx, shutdown_rx).await })
    };
    let dispatcher_task = tokio::spawn(dispatcher.run(inbound_rx));
    let outbox = Outbox::new(
        api,
        gateway.connection_state(),
        config.gateway.reconnect_initial(),
        config.gateway.reconnect_max(),
    );
    let outbox_task = tokio::spawn(outbox.run(reply_rx, shutdown_tx.subscribe()));

    let finished = tokio::select! {
        _ = shutdown => None,
        result = &mut gateway_task => Some(result),
    };
    let _ = shutdown_tx.send(());
    janitor.abort();

    let gateway_result = match finished {
        Some(result) => result,
        None => gateway_task.await,
    };

    match tokio::time::timeout(DRAIN_TIMEOUT, outbox_task).await {
        Ok(Ok(stats)) => info!(
            delivered = stats.delivered,
            dropped = stats.dropped,
            undelivered = stats.undelivered,
            "Reply worker stopped"
        ),
        Ok(Err(e)) => warn!("Reply worker crashed: {}", e),
        Err(_) => warn!("Reply worker did not stop within {:?}", DRAIN_TIMEOUT),
    }
    if tokio::time::timeout(DRAIN_TIMEOUT, dispatcher_task).await.is_err() {
        warn!("Dispatcher did not stop within {:?}", DRAIN_TIMEOUT);
    }

    gateway_result
        .context("Gateway task panicked")?
        .context("Slack gateway stopped")?;
    info!("browser-relay stopped");
    Ok(())
}
