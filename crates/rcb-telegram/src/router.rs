use std::{sync::Arc, time::Duration};

use anyhow::Context;
use teloxide::{
    dispatching::Dispatcher, dptree, error_handlers::LoggingErrorHandler, prelude::*,
    update_listeners::Polling,
};
use tokio_util::sync::CancellationToken;

use rcb_core::{
    dispatch::Dispatcher as CoreDispatcher,
    ports::{record_log, LogStore},
};

use crate::handlers;

#[derive(Clone)]
pub struct AppState {
    pub core: Arc<CoreDispatcher>,
}

/// Identify the bot and drop any stale webhook. Both failures are fatal.
///
/// Runs before anything else is spawned.
pub async fn prepare(bot: &Bot, store: &dyn LogStore) -> anyhow::Result<()> {
    let me = bot.get_me().await.context("failed to get bot info")?;
    record_log(
        store,
        &format!("launching bot: @{} ({})", me.username(), me.user.first_name),
    );

    bot.delete_webhook()
        .await
        .context("failed to delete webhook")?;
    Ok(())
}

/// Long-poll Telegram until `shutdown` is cancelled. Call `prepare` first.
pub async fn run_polling(
    bot: Bot,
    core: Arc<CoreDispatcher>,
    shutdown: CancellationToken,
) -> anyhow::Result<()> {
    let listener = Polling::builder(bot.clone())
        .timeout(core.config().monitor_interval)
        .build();

    let state = Arc::new(AppState { core });
    let handler = dptree::entry()
        .branch(Update::filter_callback_query().endpoint(handlers::handle_callback))
        .branch(Update::filter_message().endpoint(handlers::handle_message));

    let mut dispatcher = Dispatcher::builder(bot, handler)
        .dependencies(dptree::deps![state])
        .default_handler(|upd| async move {
            tracing::debug!(update_id = upd.id, "unhandled update");
        })
        .error_handler(LoggingErrorHandler::with_custom_text(
            "error while handling update",
        ))
        .build();

    let token = dispatcher.shutdown_token();
    let stopper = tokio::spawn(async move {
        shutdown.cancelled().await;
        // Shutdown is refused until the dispatcher is running.
        loop {
            match token.shutdown() {
                Ok(done) => {
                    done.await;
                    break;
                }
                Err(_) => tokio::time::sleep(Duration::from_millis(100)).await,
            }
        }
    });

    dispatcher
        .dispatch_with_listener(
            listener,
            LoggingErrorHandler::with_custom_text("error while receiving updates"),
        )
        .await;

    stopper.abort();
    tracing::info!("telegram polling stopped");
    Ok(())
}
