use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use async_trait::async_trait;
use teloxide::prelude::*;
use teloxide::types::{InputFile, ParseMode};
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use crate::classifier::MediaSource;
use crate::commands::{self, ChatPlace, Command};
use crate::error::RelayError;
use crate::platform::MessagingGateway;
use crate::registry::{ChatIdentity, Registry};

/// Telegram rejects captions longer than this
const CAPTION_LIMIT: usize = 1024;

const SHUTDOWN_RETRY: Duration = Duration::from_millis(100);

/// Sends relay output through the Telegram Bot API
#[derive(Clone)]
pub struct TelegramGateway {
    bot: Bot,
}

impl TelegramGateway {
    pub fn new(bot: Bot) -> Self {
        Self { bot }
    }
}

fn input_file(source: &MediaSource) -> Result<InputFile, RelayError> {
    match source {
        MediaSource::Url(url) => reqwest::Url::parse(url)
            .map(InputFile::url)
            .map_err(|e| RelayError::Delivery(format!("unusable media URL '{}': {}", url, e))),
        MediaSource::Bytes { data, file_name } => {
            Ok(InputFile::memory(data.clone()).file_name(file_name.clone()))
        }
    }
}

fn caption_text(caption: &str) -> String {
    caption.chars().take(CAPTION_LIMIT).collect()
}

#[async_trait]
impl MessagingGateway for TelegramGateway {
    async fn send_text(&self, chat: ChatIdentity, html: &str) -> Result<(), RelayError> {
        self.bot
            .send_message(ChatId::from(chat), html)
            .parse_mode(ParseMode::Html)
            .await
            .map_err(|e| RelayError::Delivery(format!("send_message to {}: {}", chat, e)))?;
        Ok(())
    }

    async fn send_image(
        &self,
        chat: ChatIdentity,
        source: &MediaSource,
        caption: &str,
    ) -> Result<(), RelayError> {
        self.bot
            .send_photo(ChatId::from(chat), input_file(source)?)
            .caption(caption_text(caption))
            .await
            .map_err(|e| RelayError::Delivery(format!("send_photo to {}: {}", chat, e)))?;
        Ok(())
    }

    async fn send_video(
        &self,
        chat: ChatIdentity,
        source: &MediaSource,
        caption: &str,
    ) -> Result<(), RelayError> {
        self.bot
            .send_video(ChatId::from(chat), input_file(source)?)
            .caption(caption_text(caption))
            .await
            .map_err(|e| RelayError::Delivery(format!("send_video to {}: {}", chat, e)))?;
        Ok(())
    }

    async fn send_document(
        &self,
        chat: ChatIdentity,
        source: &MediaSource,
        caption: &str,
    ) -> Result<(), RelayError> {
        self.bot
            .send_document(ChatId::from(chat), input_file(source)?)
            .caption(caption_text(caption))
            .await
            .map_err(|e| RelayError::Delivery(format!("send_document to {}: {}", chat, e)))?;
        Ok(())
    }
}

/// Dependencies injected into the command handlers
pub struct BotState {
    pub registry: Registry,
    pub require_admin: bool,
}

/// Run the command surface until `shutdown` fires
pub async fn run(bot: Bot, state: Arc<BotState>, shutdown: CancellationToken) -> Result<()> {
    info!("Starting Telegram platform...");

    // Channels deliver posts instead of messages; both are valid chats
    let handler = dptree::entry()
        .branch(Update::filter_message().endpoint(handle_message))
        .branch(Update::filter_channel_post().endpoint(handle_message));

    let mut dispatcher = Dispatcher::builder(bot, handler)
        .dependencies(dptree::deps![state])
        .default_handler(|upd| async move {
            warn!("Unhandled update: {:?}", upd.id);
        })
        .error_handler(LoggingErrorHandler::with_custom_text("telegram"))
        .build();

    let token = dispatcher.shutdown_token();
    let watcher = tokio::spawn(async move {
        shutdown.cancelled().await;
        let token = &token;
        // Shutdown is refused until dispatching has actually started
        let done = retry_until_ok(move || token.shutdown(), SHUTDOWN_RETRY).await;
        done.await;
    });

    dispatcher.dispatch().await;
    watcher.abort();
    info!("Telegram platform stopped");

    Ok(())
}

async fn retry_until_ok<T, E>(mut attempt: impl FnMut() -> Result<T, E>, pause: Duration) -> T {
    loop {
        match attempt() {
            Ok(value) => return value,
            Err(_) => tokio::time::sleep(pause).await,
        }
    }
}

async fn handle_message(bot: Bot, msg: Message, state: Arc<BotState>) -> ResponseResult<()> {
    let text = match msg.text() {
        Some(t) => t,
        None => return Ok(()),
    };

    let command = match Command::parse(text) {
        Some(command) => command,
        None => return Ok(()),
    };

    info!("Command in chat {}: {:?}", msg.chat.id, command);

    if command.mutates() && state.require_admin && !sender_is_admin(&bot, &msg).await {
        bot.send_message(msg.chat.id, "Only chat administrators can change watched APIs.")
            .await?;
        return Ok(());
    }

    let greet = command == Command::Start;
    let mut reply = commands::execute(&state.registry, msg.chat.id.into(), command).await;
    if greet {
        reply = format!("{}\n\n{}", commands::greeting(&chat_place(&msg.chat)), reply);
    }
    bot.send_message(msg.chat.id, reply).await?;

    Ok(())
}

fn chat_place(chat: &teloxide::types::Chat) -> ChatPlace {
    let title = chat.title().map(str::to_string);
    if chat.is_private() {
        ChatPlace::Private {
            username: chat.username().map(str::to_string),
        }
    } else if chat.is_channel() {
        ChatPlace::Channel { title }
    } else {
        ChatPlace::Group { title }
    }
}

/// Private chats and channels are not gated; in groups the sender must be an admin
async fn sender_is_admin(bot: &Bot, msg: &Message) -> bool {
    if !(msg.chat.is_group() || msg.chat.is_supergroup()) {
        return true;
    }

    let user = match msg.from.as_ref() {
        Some(user) => user,
        None => return false,
    };

    match bot.get_chat_member(msg.chat.id, user.id).await {
        Ok(member) => member.is_privileged(),
        Err(e) => {
            warn!("Could not check admin status in chat {}: {}", msg.chat.id, e);
            false
        }
    }
}
