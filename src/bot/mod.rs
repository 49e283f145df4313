//! Telegram front end: long polling, command handling, and message routing.

mod handlers;
pub mod reminder;

use std::time::Duration;

use chrono::Local;
use tracing::{debug, error, info, warn};

use handlers::{Command, Route};
use reminder::{PendingReminder, Reminders};

use crate::ocr::Ocr;
use crate::ollama::{Embedder, Generator};
use crate::rag::Assistant;
use crate::telegram::types::{Message, Update};
use crate::telegram::{TelegramClient, TelegramError};
use crate::text::truncate_message;
use crate::translate::Translator;

/// Pause after a failed poll before trying again.
const POLL_ERROR_BACKOFF: Duration = Duration::from_secs(3);

pub struct Bot<E, G, T> {
    telegram: TelegramClient,
    assistant: Assistant<E, G, T>,
    ocr: Ocr,
    reminders: Reminders,
    username: String,
}

impl<E, G, T> Bot<E, G, T>
where
    E: Embedder,
    G: Generator,
    T: Translator,
{
    pub fn new(
        telegram: TelegramClient,
        assistant: Assistant<E, G, T>,
        ocr: Ocr,
        username: &str,
    ) -> Self {
        Self {
            telegram,
            assistant,
            ocr,
            reminders: Reminders::default(),
            username: username.to_string(),
        }
    }

    /// Polls for updates until a fatal error. Only an invalid token is fatal;
    /// every other failure is logged and polling resumes.
    pub async fn run(&self) -> Result<(), TelegramError> {
        info!(
            username = %self.username,
            documents = self.assistant.documents(),
            "bot is running"
        );
        let mut offset = 0;
        loop {
            let updates = match self.telegram.get_updates(offset).await {
                Ok(updates) => updates,
                Err(TelegramError::Unauthorized) => return Err(TelegramError::Unauthorized),
                Err(TelegramError::RateLimited(secs)) => {
                    warn!(retry_after = secs, "polling rate limited");
                    tokio::time::sleep(Duration::from_secs(secs)).await;
                    continue;
                }
                Err(e) => {
                    warn!(error = %e, "polling failed");
                    tokio::time::sleep(POLL_ERROR_BACKOFF).await;
                    continue;
                }
            };

            for update in updates {
                offset = offset.max(update.update_id + 1);
                self.handle_update(update).await;
            }
        }
    }

    async fn handle_update(&self, update: Update) {
        let Some(message) = update.message else {
            debug!(update_id = update.update_id, "ignoring non-message update");
            return;
        };
        if let Err(e) = self.handle_message(&message).await {
            error!(chat_id = message.chat.id, error = %e, "failed to handle message");
        }
    }

    async fn handle_message(&self, message: &Message) -> Result<(), TelegramError> {
        let chat_id = message.chat.id;

        if message.photo.is_some() {
            if !handlers::photo_addressed(message, &self.username) {
                return Ok(());
            }
            return self.handle_photo(message).await;
        }

        let Some(text) = handlers::addressed_text(message, &self.username) else {
            return Ok(());
        };
        info!(chat_id, chat_type = ?message.chat.kind, text = %text, "incoming message");

        let reply = match handlers::parse_command(&text, &self.username) {
            Some(command) => match self.handle_command(chat_id, command) {
                Some(reply) => reply,
                None => return Ok(()),
            },
            None => self.respond(&text).await,
        };

        info!(chat_id, reply = %reply, "bot reply");
        self.reply(chat_id, &reply).await
    }

    fn handle_command(&self, chat_id: i64, command: Command<'_>) -> Option<String> {
        let reply = match command {
            Command::Start => handlers::START_TEXT.to_string(),
            Command::Help => handlers::HELP_TEXT.to_string(),
            Command::Custom => handlers::CUSTOM_TEXT.to_string(),
            Command::Remind(args) => self.add_reminder(chat_id, args),
            Command::Reminders => self.list_reminders(chat_id),
            Command::Other => return None,
        };
        Some(reply)
    }

    async fn respond(&self, text: &str) -> String {
        let processed = text.to_lowercase();
        match handlers::route(&processed) {
            Route::Ask => self.assistant.answer(&processed).await,
            Route::ReminderHint => handlers::REMINDER_HINT.to_string(),
            Route::Greeting => handlers::GREETING_TEXT.to_string(),
            Route::Unknown => handlers::UNKNOWN_TEXT.to_string(),
        }
    }

    fn add_reminder(&self, chat_id: i64, args: &str) -> String {
        debug!(chat_id, raw = %args, "reminder request");
        let request = match reminder::parse_request(args) {
            Ok(request) => request,
            Err(reminder::ParseError::MissingTime) => return reminder::MSG_BAD_FORMAT.to_string(),
            Err(reminder::ParseError::InvalidTime(t)) => {
                warn!(chat_id, time = %t, "reminder setup failed");
                return reminder::MSG_FAILED.to_string();
            }
        };

        let now = Local::now().naive_local();
        let at = reminder::next_occurrence(now, request.time);
        let delay = match (at - now).to_std() {
            Ok(delay) if !delay.is_zero() => delay,
            _ => return reminder::MSG_PAST_TIME.to_string(),
        };

        let name = reminder::job_name(chat_id, &request.medicine, &request.time_text);
        let label = reminder::format_time(at);
        self.reminders.schedule(
            self.telegram.clone(),
            name.clone(),
            PendingReminder {
                chat_id,
                medicine: request.medicine.clone(),
                at: label.clone(),
            },
            delay,
        );
        info!(job = %name, delay_secs = delay.as_secs(), "reminder scheduled");

        format!("✅ মনে করিয়ে দেয়া হবে: {} @ {label}", request.medicine)
    }

    fn list_reminders(&self, chat_id: i64) -> String {
        let pending = self.reminders.pending(chat_id);
        if pending.is_empty() {
            return "No reminders scheduled. Try: /remind Napa at 8:30 PM".to_string();
        }
        let mut out = String::from("⏰ Scheduled reminders:\n");
        for r in pending {
            out.push_str(&format!("- {} @ {}\n", r.medicine, r.at));
        }
        out
    }

    async fn handle_photo(&self, message: &Message) -> Result<(), TelegramError> {
        let chat_id = message.chat.id;
        let largest = message
            .photo
            .iter()
            .flatten()
            .max_by_key(|p| u64::from(p.width) * u64::from(p.height));
        let Some(photo) = largest else {
            return Ok(());
        };
        info!(chat_id, file_id = %photo.file_id, "incoming photo");

        let file = self.telegram.get_file(&photo.file_id).await?;
        let image = self.telegram.download(&file).await?;

        let label = match self.ocr.extract_text(&image).await {
            Ok(label) => label,
            Err(e) => {
                warn!(chat_id, error = %e, "OCR error");
                return self.reply(chat_id, handlers::OCR_FAILED_TEXT).await;
            }
        };

        self.reply(chat_id, &format!("📄 {label}")).await?;
        let answer = self.assistant.answer(&label).await;
        self.reply(chat_id, &answer).await
    }

    async fn reply(&self, chat_id: i64, text: &str) -> Result<(), TelegramError> {
        self.telegram
            .send_message(chat_id, &truncate_message(text))
            .await
            .map(|_| ())
    }
}
