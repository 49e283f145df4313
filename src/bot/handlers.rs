use crate::lang::contains_bengali;
use crate::telegram::types::{ChatKind, Message};

pub(crate) const START_TEXT: &str =
    "Hello! I am your medication assistant bot. Ask me about any medicine.";
pub(crate) const HELP_TEXT: &str = "You can ask me things like:\n- What is Napa?\n- What are the side effects of Seclo?\n- Napa এর ব্যবহার কী?\n\nSend a photo of a medicine label and I'll read it.\nSet a reminder with /remind Napa at 8:30 PM\nSee your reminders with /reminders";
pub(crate) const CUSTOM_TEXT: &str = "This is a custom command response!";
pub(crate) const REMINDER_HINT: &str =
    "I can help you set a reminder for your medication. Try: /remind Napa at 8:30 PM";
pub(crate) const GREETING_TEXT: &str = "Hi! I'm here to help with medicine-related questions.";
pub(crate) const UNKNOWN_TEXT: &str = "I'm not sure about that. Please ask me about a medication.";
pub(crate) const OCR_FAILED_TEXT: &str = "⚠️ OCR failed. Please try again with a clearer image.";

const QUESTION_KEYWORDS: [&str; 6] = [
    "what is",
    "use of",
    "side effect",
    "why",
    "how to use",
    "dosage",
];

#[derive(Debug, PartialEq, Eq)]
pub enum Route {
    /// Answer through the RAG pipeline.
    Ask,
    ReminderHint,
    Greeting,
    Unknown,
}

/// Routes free text. `text` must already be lowercased.
pub fn route(text: &str) -> Route {
    if contains_bengali(text) || QUESTION_KEYWORDS.iter().any(|kw| text.contains(kw)) {
        Route::Ask
    } else if text.contains("reminder") {
        Route::ReminderHint
    } else if text.contains("hello") || has_word(text, "hi") {
        Route::Greeting
    } else {
        Route::Unknown
    }
}

fn has_word(text: &str, word: &str) -> bool {
    text.split(|c: char| !c.is_alphanumeric()).any(|w| w == word)
}

#[derive(Debug, PartialEq, Eq)]
pub enum Command<'a> {
    Start,
    Help,
    Custom,
    Remind(&'a str),
    Reminders,
    /// Any other `/command`; ignored.
    Other,
}

/// Parses `/command[@bot] args`. `None` for non-command text.
pub fn parse_command<'a>(text: &'a str, bot_username: &str) -> Option<Command<'a>> {
    let rest = text.trim_start().strip_prefix('/')?;
    let (head, args) = rest
        .split_once(char::is_whitespace)
        .unwrap_or((rest, ""));
    let (name, target) = head.split_once('@').unwrap_or((head, ""));

    let ours = bot_username.trim_start_matches('@');
    if !target.is_empty() && !target.eq_ignore_ascii_case(ours) {
        return Some(Command::Other);
    }

    Some(match name.to_ascii_lowercase().as_str() {
        "start" => Command::Start,
        "help" => Command::Help,
        "custom" => Command::Custom,
        "remind" => Command::Remind(args.trim()),
        "reminders" => Command::Reminders,
        _ => Command::Other,
    })
}

/// Text the bot should act on: everything in private chats; in groups,
/// commands and messages that mention the bot (with the mention removed).
pub fn addressed_text(message: &Message, bot_username: &str) -> Option<String> {
    let text = message.text.as_deref()?;
    match message.chat.kind {
        ChatKind::Private => Some(text.to_string()),
        ChatKind::Group | ChatKind::Supergroup => {
            if text.trim_start().starts_with('/') {
                Some(text.to_string())
            } else if text.contains(bot_username) {
                Some(text.replace(bot_username, "").trim().to_string())
            } else {
                None
            }
        }
        _ => None,
    }
}

/// Photos follow the same rule, with the caption carrying the mention.
pub fn photo_addressed(message: &Message, bot_username: &str) -> bool {
    match message.chat.kind {
        ChatKind::Private => true,
        ChatKind::Group | ChatKind::Supergroup => message
            .caption
            .as_deref()
            .is_some_and(|caption| caption.contains(bot_username)),
        _ => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const BOT: &str = "@medication_remider_and_info_bot";

    fn message(kind: &str, text: &str) -> Message {
        serde_json::from_value(serde_json::json!({
            "message_id": 1,
            "chat": {"id": 10, "type": kind},
            "text": text
        }))
        .unwrap()
    }

    #[test]
    fn questions_route_to_rag() {
        for text in [
            "what is napa?",
            "use of seclo",
            "side effects of napa extra",
            "why take omeprazole before meals",
            "how to use an inhaler",
            "dosage for children",
        ] {
            assert_eq!(route(text), Route::Ask, "{text}");
        }
    }

    #[test]
    fn bangla_routes_to_rag() {
        assert_eq!(route("নাপা এর ব্যবহার কী?"), Route::Ask);
    }

    #[test]
    fn reminder_keyword_gets_hint() {
        assert_eq!(route("can you set a reminder"), Route::ReminderHint);
    }

    #[test]
    fn greetings() {
        assert_eq!(route("hello there"), Route::Greeting);
        assert_eq!(route("hi!"), Route::Greeting);
    }

    #[test]
    fn hi_inside_other_words_is_not_a_greeting() {
        assert_eq!(route("this thing"), Route::Unknown);
    }

    #[test]
    fn question_keywords_take_priority() {
        assert_eq!(route("hi, what is napa?"), Route::Ask);
    }

    #[test]
    fn everything_else_is_unknown() {
        assert_eq!(route("napa"), Route::Unknown);
    }

    #[test]
    fn parses_commands() {
        assert_eq!(parse_command("/start", BOT), Some(Command::Start));
        assert_eq!(parse_command("/help", BOT), Some(Command::Help));
        assert_eq!(parse_command("/custom", BOT), Some(Command::Custom));
        assert_eq!(parse_command("/reminders", BOT), Some(Command::Reminders));
        assert_eq!(
            parse_command("/remind  Napa at 8:30 PM ", BOT),
            Some(Command::Remind("Napa at 8:30 PM"))
        );
        assert_eq!(parse_command("/unknown", BOT), Some(Command::Other));
        assert_eq!(parse_command("what is napa", BOT), None);
    }

    #[test]
    fn commands_addressed_to_other_bots_are_ignored() {
        assert_eq!(
            parse_command("/start@medication_remider_and_info_bot", BOT),
            Some(Command::Start)
        );
        assert_eq!(parse_command("/start@other_bot", BOT), Some(Command::Other));
    }

    #[test]
    fn private_messages_are_always_addressed() {
        let msg = message("private", "What is Napa?");
        assert_eq!(addressed_text(&msg, BOT).as_deref(), Some("What is Napa?"));
    }

    #[test]
    fn group_messages_need_a_mention() {
        let plain = message("group", "What is Napa?");
        assert_eq!(addressed_text(&plain, BOT), None);

        let mentioned = message("supergroup", &format!("{BOT} What is Napa?"));
        assert_eq!(
            addressed_text(&mentioned, BOT).as_deref(),
            Some("What is Napa?")
        );
    }

    #[test]
    fn group_commands_need_no_mention() {
        let msg = message("group", "/remind Napa at 8:30 PM");
        assert_eq!(
            addressed_text(&msg, BOT).as_deref(),
            Some("/remind Napa at 8:30 PM")
        );
    }

    #[test]
    fn group_photos_need_a_mention_in_the_caption() {
        let photo = |kind: &str, caption: Option<&str>| -> Message {
            serde_json::from_value(serde_json::json!({
                "message_id": 1,
                "chat": {"id": 10, "type": kind},
                "caption": caption,
                "photo": [{"file_id": "a", "width": 10, "height": 10}]
            }))
            .unwrap()
        };
        assert!(photo_addressed(&photo("private", None), BOT));
        assert!(!photo_addressed(&photo("group", None), BOT));
        assert!(!photo_addressed(&photo("supergroup", Some("label")), BOT));
        assert!(photo_addressed(&photo("group", Some(&format!("{BOT} what is this?"))), BOT));
        assert!(!photo_addressed(&photo("channel", Some(BOT)), BOT));
    }

    #[test]
    fn channels_are_ignored() {
        let msg = message("channel", &format!("{BOT} hi"));
        assert_eq!(addressed_text(&msg, BOT), None);
    }
}
