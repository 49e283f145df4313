use std::collections::HashMap;
use std::sync::{Arc, LazyLock, Mutex};
use std::time::Duration;

use chrono::{NaiveDateTime, NaiveTime, TimeDelta};
use regex::Regex;
use tokio::task::{self, JoinHandle};
use tracing::{info, warn};

use crate::telegram::TelegramClient;

pub(crate) const MSG_BAD_FORMAT: &str = "⚠️ মনে করানোর সময় সঠিক ফরম্যাটে দিন (যেমন: 7:30 AM)";
pub(crate) const MSG_PAST_TIME: &str = "⚠️ অনুগ্রহ করে ভবিষ্যতের সময় দিন।";
pub(crate) const MSG_FAILED: &str = "⚠️ মনে করানোর সময় সেট করতে ব্যর্থ। ফরম্যাট ঠিক আছে কিনা দেখুন।";
const REMINDER_PREFIX: &str = "⏰ ওষুধ মনে করিয়ে দিচ্ছি:";

static AT_TIME: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)at\s*([0-9]{1,2}:[0-9]{2}\s*(?:am|pm)?)").expect("valid regex")
});
static BARE_TIME: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)([0-9]{1,2}:[0-9]{2}\s*(?:am|pm)?)").expect("valid regex"));
static EVERYDAY: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)every\s*day").expect("valid regex"));

#[derive(Debug, PartialEq, Eq)]
pub enum ParseError {
    /// No `h:mm` time anywhere in the text.
    MissingTime,
    /// A time was found but is not a valid clock time.
    InvalidTime(String),
}

#[derive(Debug, PartialEq, Eq)]
pub struct ReminderRequest {
    pub medicine: String,
    /// Time as typed, spaces removed (`"8:30pm"`); part of the job name.
    pub time_text: String,
    pub time: NaiveTime,
}

/// Parses `"Napa at 8:30 pm everyday"`-style reminder text.
pub fn parse_request(text: &str) -> Result<ReminderRequest, ParseError> {
    let (whole, time_raw) = AT_TIME
        .captures(text)
        .or_else(|| BARE_TIME.captures(text))
        .and_then(|caps| Some((caps.get(0)?, caps.get(1)?.as_str())))
        .ok_or(ParseError::MissingTime)?;

    let time_text: String = time_raw.chars().filter(|c| !c.is_whitespace()).collect();
    let time = parse_clock(&time_text).ok_or_else(|| ParseError::InvalidTime(time_text.clone()))?;

    let without_time = format!("{}{}", &text[..whole.start()], &text[whole.end()..]);
    let medicine = EVERYDAY
        .replace_all(&without_time, "")
        .split_whitespace()
        .collect::<Vec<_>>()
        .join(" ");

    Ok(ReminderRequest {
        medicine,
        time_text,
        time,
    })
}

/// `"7:30"`, `"19:30"`, `"7:30am"`, `"12:05AM"`.
fn parse_clock(s: &str) -> Option<NaiveTime> {
    let lower = s.to_ascii_lowercase();
    let (clock, meridiem) = match lower.strip_suffix("am") {
        Some(rest) => (rest, Some(false)),
        None => match lower.strip_suffix("pm") {
            Some(rest) => (rest, Some(true)),
            None => (lower.as_str(), None),
        },
    };
    let (h, m) = clock.split_once(':')?;
    let (mut hour, minute): (u32, u32) = (h.parse().ok()?, m.parse().ok()?);

    if let Some(pm) = meridiem {
        if !(1..=12).contains(&hour) {
            return None;
        }
        hour = match (hour, pm) {
            (12, false) => 0,
            (12, true) => 12,
            (h, true) => h + 12,
            (h, false) => h,
        };
    }
    NaiveTime::from_hms_opt(hour, minute, 0)
}

/// Next wall-clock occurrence of `time` strictly after `now`: today if still
/// ahead, otherwise tomorrow.
pub fn next_occurrence(now: NaiveDateTime, time: NaiveTime) -> NaiveDateTime {
    let today = now.date().and_time(time);
    if today < now {
        today + TimeDelta::days(1)
    } else {
        today
    }
}

pub fn format_time(at: NaiveDateTime) -> String {
    at.format("%I:%M %p").to_string()
}

pub fn job_name(chat_id: i64, medicine: &str, time_text: &str) -> String {
    format!("reminder_{chat_id}_{medicine}_{time_text}")
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PendingReminder {
    pub chat_id: i64,
    pub medicine: String,
    pub at: String,
}

struct Job {
    reminder: PendingReminder,
    handle: JoinHandle<()>,
}

/// One-shot reminder jobs keyed by job name. Scheduling a name that already
/// exists cancels the earlier job.
#[derive(Clone, Default)]
pub struct Reminders {
    jobs: Arc<Mutex<HashMap<String, Job>>>,
}

impl Reminders {
    pub fn schedule(
        &self,
        telegram: TelegramClient,
        name: String,
        reminder: PendingReminder,
        delay: Duration,
    ) {
        let jobs = Arc::clone(&self.jobs);
        let task_name = name.clone();
        let chat_id = reminder.chat_id;
        let text = format!("{REMINDER_PREFIX}\n{}", reminder.medicine);

        let handle = tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            match telegram.send_message(chat_id, &text).await {
                Ok(_) => info!(job = %task_name, "reminder sent"),
                Err(e) => warn!(job = %task_name, error = %e, "failed to send reminder"),
            }
            forget(&jobs, &task_name, task::id());
        });

        let mut jobs = self.jobs.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
        // A job can finish before it is registered; drop such leftovers.
        jobs.retain(|_, job| !job.handle.is_finished());
        if let Some(previous) = jobs.insert(name.clone(), Job { reminder, handle }) {
            previous.handle.abort();
            info!(job = %name, "replaced existing reminder");
        }
    }

    /// Pending reminders for one chat, sorted by job name.
    pub fn pending(&self, chat_id: i64) -> Vec<PendingReminder> {
        let jobs = self.jobs.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
        let mut names: Vec<&String> = jobs
            .iter()
            .filter(|(_, job)| job.reminder.chat_id == chat_id && !job.handle.is_finished())
            .map(|(name, _)| name)
            .collect();
        names.sort();
        names.into_iter().map(|n| jobs[n].reminder.clone()).collect()
    }
}

/// Drops `name` if it still belongs to task `id`; a reschedule under the
/// same name owns the entry from then on.
fn forget(jobs: &Mutex<HashMap<String, Job>>, name: &str, id: task::Id) {
    let mut jobs = jobs.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
    if jobs.get(name).is_some_and(|job| job.handle.id() == id) {
        jobs.remove(name);
    }
}
