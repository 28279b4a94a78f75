//! Manual long-polling loop for the hub's single Telegram bot account.
//!
//! Adapted from a dispatcher-macro-free polling loop: `getUpdates` is
//! called in a tight loop with a 30s long-poll timeout, and each update is
//! routed by hand rather than through `teloxide::dispatching`. There is
//! exactly one bot account here (the hub's own), unlike a multi-tenant
//! bot manager, so no per-account state map is needed.

use std::sync::Arc;

use secrecy::{ExposeSecret, SecretString};
use teloxide::prelude::*;
use teloxide::types::{AllowedUpdate, BotCommand, UpdateKind};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use autorc_sessions::SessionRegistry;

use crate::directory::UserDirectory;
use crate::handlers::{self, CallbackRequest, HandlerContext};
use crate::router::{self, Router};
use crate::Result;

/// One chat notification destined for the bot to deliver.
#[derive(Debug, Clone)]
pub struct Notification {
    pub chat_id: i64,
    pub text: String,
}

/// Starts the bot's polling loop and its notification-draining task.
/// Returns a [`CancellationToken`] the caller cancels to stop both.
pub async fn start(
    token: &SecretString,
    sessions: Arc<SessionRegistry>,
    directory: Arc<dyn UserDirectory>,
    notifications: mpsc::Receiver<Notification>,
) -> Result<CancellationToken> {
    let bot = Bot::new(token.expose_secret());
    bot.get_me().await?;
    bot.delete_webhook().send().await?;

    let commands = vec![
        BotCommand::new("menu", "Show the main menu"),
        BotCommand::new("start", "Enable notifications"),
        BotCommand::new("stop", "Disable notifications"),
    ];
    if let Err(e) = bot.set_my_commands(commands).await {
        warn!("failed to register bot commands: {e}");
    }

    let cancel = CancellationToken::new();
    let ctx = Arc::new(HandlerContext {
        bot: bot.clone(),
        sessions,
        directory,
    });
    let router = router::default_router();

    spawn_notification_drain(bot.clone(), cancel.clone(), notifications);
    spawn_poll_loop(bot, ctx, router, cancel.clone());

    Ok(cancel)
}

fn spawn_notification_drain(bot: Bot, cancel: CancellationToken, mut notifications: mpsc::Receiver<Notification>) {
    tokio::spawn(async move {
        loop {
            tokio::select! {
                () = cancel.cancelled() => break,
                note = notifications.recv() => {
                    let Some(note) = note else { break };
                    if let Err(e) = bot.send_message(ChatId(note.chat_id), note.text).await {
                        warn!(chat_id = note.chat_id, error = %e, "failed to deliver notification");
                    }
                },
            }
        }
    });
}

fn spawn_poll_loop(bot: Bot, ctx: Arc<HandlerContext>, router: Router, cancel: CancellationToken) {
    tokio::spawn(async move {
        info!("starting telegram polling loop");
        let mut offset: i32 = 0;

        loop {
            if cancel.is_cancelled() {
                info!("telegram polling stopped");
                break;
            }

            let result = bot
                .get_updates()
                .offset(offset)
                .timeout(30)
                .allowed_updates(vec![AllowedUpdate::Message, AllowedUpdate::CallbackQuery])
                .await;

            match result {
                Ok(updates) => {
                    for update in updates {
                        offset = update.id.as_offset();
                        if let Err(e) = handle_update(&ctx, &router, update.kind).await {
                            error!(error = %e, "error handling telegram update");
                        }
                    }
                },
                Err(e) => {
                    warn!(error = %e, "telegram getUpdates failed");
                    tokio::time::sleep(std::time::Duration::from_secs(5)).await;
                },
            }
        }
    });
}

async fn handle_update(ctx: &Arc<HandlerContext>, router: &Router, kind: UpdateKind) -> Result<()> {
    match kind {
        UpdateKind::Message(msg) => {
            let Some(tg_user) = msg.from.as_ref().and_then(|u| u.username.clone()) else {
                debug!("ignoring message with no sender username");
                return Ok(());
            };
            let chat_id = msg.chat.id;
            match msg.text() {
                Some("/menu") => handlers::menu(ctx, &tg_user, chat_id).await,
                Some("/start") => handlers::start_notifications(ctx, &tg_user, chat_id).await,
                Some("/stop") => handlers::stop_notifications(ctx, &tg_user, chat_id).await,
                _ => {
                    debug!("ignoring unrecognized message text");
                    Ok(())
                },
            }
        },
        UpdateKind::CallbackQuery(query) => {
            let Some(tg_user) = query.from.username.clone() else {
                debug!("ignoring callback with no sender username");
                return Ok(());
            };
            let Some(chat_id) = query.message.as_ref().map(|m| m.chat().id) else {
                debug!("ignoring callback with no associated chat");
                return Ok(());
            };
            let Some(data) = query.data.as_deref() else {
                return Ok(());
            };
            let (name, params) = handlers::parse_callback(data);
            let request = CallbackRequest { tg_user, chat_id, params };
            router.dispatch(Arc::clone(ctx), name, request).await;
            Ok(())
        },
        other => {
            debug!(?other, "ignoring non-message update");
            Ok(())
        },
    }
}
