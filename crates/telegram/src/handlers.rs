//! Command and callback handlers for the hub's chat UI.
//!
//! Mirrors the menu tree of the source bot (`MenuHandler`,
//! `StartNotificationsHandler`, `StopNotificationsHandler`, `StatusHandler`,
//! `LightControlHandler`, `LampMenuHandler`, `LampSwitchHandler`), rebuilt
//! around [`SessionRegistry`] lookups instead of a package-level client map.

use std::collections::HashMap;
use std::sync::Arc;

use autorc_protocol::{ActionEvent, ActionKind};
use autorc_sessions::SessionRegistry;
use teloxide::payloads::SendMessageSetters;
use teloxide::prelude::*;
use teloxide::types::{InlineKeyboardButton, InlineKeyboardMarkup};
use tracing::info;

use crate::directory::UserDirectory;
use crate::error::{Error, Result};

/// Lamps presentable in the lighting menu. The chat UI only needs a stable
/// id and a human label; what a `device_id` writes to is entirely the
/// Gateway's own `devices[]` config.
const KNOWN_DEVICES: &[(&str, &str)] = &[
    ("Lamp001", "Lamp 1"),
    ("Lamp002", "Lamp 2"),
    ("Lamp003", "Lamp 3"),
];

/// Shared state every handler needs: the bot client, the live session
/// registry, and the out-of-scope user-account directory.
pub struct HandlerContext {
    pub bot: Bot,
    pub sessions: Arc<SessionRegistry>,
    pub directory: Arc<dyn UserDirectory>,
}

/// A parsed callback or command invocation, resolved to the chat and the
/// Telegram handle that sent it.
pub struct CallbackRequest {
    pub tg_user: String,
    pub chat_id: ChatId,
    pub params: HashMap<String, String>,
}

/// Splits `handler:<name>?<query>` callback data into a route name and its
/// query parameters. Plain command names (`status`) with no payload parse
/// to an empty parameter map.
#[must_use]
pub fn parse_callback(data: &str) -> (&str, HashMap<String, String>) {
    let body = data.strip_prefix("handler:").unwrap_or(data);
    let Some((name, query)) = body.split_once('?') else {
        return (body, HashMap::new());
    };
    let params = query
        .split('&')
        .filter_map(|pair| pair.split_once('='))
        .map(|(k, v)| (k.to_string(), v.to_string()))
        .collect();
    (name, params)
}

/// `/menu` — records the chat id for this Telegram handle and presents the
/// top-level menu.
pub async fn menu(ctx: &HandlerContext, tg_user: &str, chat_id: ChatId) -> Result<()> {
    ctx.directory.set_chat_id(tg_user, chat_id.0).await;
    let keyboard = InlineKeyboardMarkup::new(vec![
        vec![InlineKeyboardButton::callback("Состояние", "handler:status")],
        vec![InlineKeyboardButton::callback("Освещение", "handler:lightControl")],
    ]);
    ctx.bot
        .send_message(chat_id, "Главное меню")
        .reply_markup(keyboard)
        .await?;
    Ok(())
}

/// `/start` — enables notifications. Resolves design-note (a): the session
/// lookup happens first, and an absent session never blocks the preference
/// update or causes a dereference — it only changes the reply text.
pub async fn start_notifications(ctx: &HandlerContext, tg_user: &str, chat_id: ChatId) -> Result<()> {
    set_notifications(ctx, tg_user, chat_id, true).await
}

/// `/stop` — disables notifications, same absent-session handling as
/// [`start_notifications`].
pub async fn stop_notifications(ctx: &HandlerContext, tg_user: &str, chat_id: ChatId) -> Result<()> {
    set_notifications(ctx, tg_user, chat_id, false).await
}

async fn set_notifications(ctx: &HandlerContext, tg_user: &str, chat_id: ChatId, enabled: bool) -> Result<()> {
    let saved = ctx.directory.set_notification(tg_user, enabled).await;
    if !saved {
        ctx.bot.send_message(chat_id, "Error: unknown user").await?;
        return Ok(());
    }

    let reply = match ctx.sessions.lookup(tg_user).await {
        Some(session) => {
            session.set_notify_enabled(enabled);
            if enabled {
                "Notifications enabled."
            } else {
                "Notifications disabled."
            }
        },
        None => "Notifications preference saved, but your Gateway is not currently connected.",
    };
    ctx.bot.send_message(chat_id, reply).await?;
    Ok(())
}

/// `handler:status` — reports whether the caller's Gateway is connected and
/// whether notifications are currently on.
pub async fn status(ctx: &HandlerContext, req: &CallbackRequest) -> Result<()> {
    let text = match ctx.sessions.lookup(&req.tg_user).await {
        Some(session) => format!(
            "Gateway connected.\nNotifications: {}",
            if session.notify_enabled() { "on" } else { "off" }
        ),
        None => "Gateway not connected.".to_string(),
    };
    ctx.bot.send_message(req.chat_id, text).await?;
    Ok(())
}

/// `handler:lightControl` — lists known lamps as a menu of
/// `handler:lampMenu?lampID=<id>` buttons.
pub async fn light_control(ctx: &HandlerContext, req: &CallbackRequest) -> Result<()> {
    let rows = KNOWN_DEVICES
        .iter()
        .map(|(id, label)| vec![InlineKeyboardButton::callback(*label, format!("handler:lampMenu?lampID={id}"))])
        .collect::<Vec<_>>();
    ctx.bot
        .send_message(req.chat_id, "Выберите устройство")
        .reply_markup(InlineKeyboardMarkup::new(rows))
        .await?;
    Ok(())
}

/// `handler:lampMenu?lampID=<id>` — presents on/off buttons for one lamp.
pub async fn lamp_menu(ctx: &HandlerContext, req: &CallbackRequest) -> Result<()> {
    let lamp_id = req
        .params
        .get("lampID")
        .ok_or_else(|| Error::message("lampMenu callback missing lampID"))?;
    let keyboard = InlineKeyboardMarkup::new(vec![vec![
        InlineKeyboardButton::callback("Включить", format!("handler:lampSwitch?lampID={lamp_id}&action=switchON")),
        InlineKeyboardButton::callback("Выключить", format!("handler:lampSwitch?lampID={lamp_id}&action=switchOFF")),
    ]]);
    ctx.bot
        .send_message(req.chat_id, format!("{lamp_id}:"))
        .reply_markup(keyboard)
        .await?;
    Ok(())
}

/// `handler:lampSwitch?lampID=<id>&action=switchON|switchOFF` — the terminal
/// action handler. Looks the caller's session up first; an absent session
/// leaves no side effect beyond a chat reply.
pub async fn lamp_switch(ctx: &HandlerContext, req: &CallbackRequest) -> Result<()> {
    let lamp_id = req
        .params
        .get("lampID")
        .ok_or_else(|| Error::message("lampSwitch callback missing lampID"))?;
    let action = req
        .params
        .get("action")
        .ok_or_else(|| Error::message("lampSwitch callback missing action"))?;
    let kind = match action.as_str() {
        "switchON" => ActionKind::SwitchOn,
        "switchOFF" => ActionKind::SwitchOff,
        _ => return Err(Error::message(format!("unknown lamp action: {action}"))),
    };

    let Some(session) = ctx.sessions.lookup(&req.tg_user).await else {
        ctx.bot
            .send_message(req.chat_id, "Your Gateway is not currently connected.")
            .await?;
        return Ok(());
    };
    session
        .send_action(ActionEvent {
            device_id: lamp_id.clone(),
            action: kind,
        })
        .await;
    info!(lamp_id, ?kind, "dispatched lamp switch");
    ctx.bot.send_message(req.chat_id, "OK").await?;
    Ok(())
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn parse_callback_splits_name_and_params() {
        let (name, params) = parse_callback("handler:lampSwitch?lampID=Lamp001&action=switchON");
        assert_eq!(name, "lampSwitch");
        assert_eq!(params.get("lampID").unwrap(), "Lamp001");
        assert_eq!(params.get("action").unwrap(), "switchON");
    }

    #[test]
    fn parse_callback_with_no_query_has_empty_params() {
        let (name, params) = parse_callback("handler:status");
        assert_eq!(name, "status");
        assert!(params.is_empty());
    }
}
