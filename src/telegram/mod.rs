//! Telegram Bot API over plain HTTPS.

mod client;
pub mod types;

pub use client::{TelegramClient, TelegramError};
