use std::sync::Arc;

use anyhow::Context;
use tokio_util::sync::CancellationToken;

use rcb_core::{
    broadcast::{self, BroadcastRelay},
    config::Config,
    dispatch::{Collaborators, Dispatcher},
    messaging::{
        deadline::{DeadlineConfig, DeadlineMessenger},
        port::MessagingPort,
    },
    ports::{record_error, record_log, LogStore},
};
use rcb_store::SqliteStore;
use rcb_systemctl::{HostProbe, Systemctl};
use rcb_telegram::TelegramMessenger;
use rcb_transmission::TransmissionClient;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cfg = Arc::new(Config::load().context("failed to load config")?);
    rcb_core::logging::init("rcb", cfg.is_verbose)?;

    let store: Arc<dyn LogStore> = Arc::new(
        SqliteStore::open(&cfg.db_path()).context("failed to open local database")?,
    );
    record_log(store.as_ref(), "starting server...");

    let telegram = TelegramMessenger::new(cfg.api_token.clone());
    let bot = telegram.bot();
    let messenger: Arc<dyn MessagingPort> = Arc::new(DeadlineMessenger::new(
        Arc::new(telegram),
        DeadlineConfig::default(),
    ));

    let queue = Arc::new(TransmissionClient::new(
        cfg.transmission_rpc_port,
        cfg.transmission_rpc_username.clone(),
        cfg.transmission_rpc_passwd.clone(),
    )?);

    let core = Arc::new(Dispatcher::new(
        cfg.clone(),
        Collaborators {
            messenger: messenger.clone(),
            queue,
            services: Arc::new(Systemctl::new()),
            store: store.clone(),
            probe: Arc::new(HostProbe),
        },
    ));

    rcb_telegram::router::prepare(&bot, store.as_ref()).await?;

    let shutdown = CancellationToken::new();

    let (tx, rx) = broadcast::queue();
    let relay = BroadcastRelay::new(cfg.clone(), messenger, store.clone());
    let relay_task = tokio::spawn(relay.run(rx));

    let http_task = {
        let shutdown = shutdown.clone();
        let store = store.clone();
        let port = cfg.cli_port;
        let token = cfg.cli_auth_token.clone();
        tokio::spawn(async move {
            if let Err(e) = rcb_http::serve(port, tx, token, shutdown).await {
                record_error(store.as_ref(), &format!("local web server stopped: {e}"));
            }
        })
    };

    {
        let shutdown = shutdown.clone();
        let store = store.clone();
        tokio::spawn(async move {
            wait_for_signal().await;
            record_log(store.as_ref(), "stopping server...");
            shutdown.cancel();
        });
    }

    let polled = rcb_telegram::router::run_polling(bot, core, shutdown.clone()).await;
    if let Err(e) = &polled {
        record_error(store.as_ref(), &format!("telegram bot failed: {e:#}"));
    }

    // The HTTP task owns the only queue sender, so the relay drains and exits after it.
    shutdown.cancel();
    let _ = http_task.await;
    let _ = relay_task.await;

    polled
}

#[cfg(unix)]
async fn wait_for_signal() {
    use tokio::signal::unix::{signal, SignalKind};

    match signal(SignalKind::terminate()) {
        Ok(mut term) => {
            tokio::select! {
                _ = tokio::signal::ctrl_c() => {}
                _ = term.recv() => {}
            }
        }
        Err(e) => {
            tracing::warn!("failed to install SIGTERM handler: {e}");
            let _ = tokio::signal::ctrl_c().await;
        }
    }
}

#[cfg(not(unix))]
async fn wait_for_signal() {
    let _ = tokio::signal::ctrl_c().await;
}
