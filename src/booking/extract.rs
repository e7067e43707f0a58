//! Email / datetime / name extraction for the booking flow.
//!
//! Datetime parsing is an ordered list of pattern+handler pairs, each one
//! independently testable. Ambiguous input produces a clarification string
//! for the user instead of an error. The weekday branch runs before the
//! explicit-date branches, so weekday phrasing wins when both appear in the
//! same message.
//!
//! All parsed datetimes are normalized to Europe/Stockholm.

use std::sync::LazyLock;

use chrono::{DateTime, Datelike, Duration, NaiveDate, NaiveDateTime, TimeZone, Utc};
use chrono_tz::Europe::Stockholm;
use chrono_tz::Tz;
use regex::Regex;

/// Fixed target timezone for storage and display.
pub const TARGET_TZ: Tz = Stockholm;
/// Label shown next to every displayed time.
pub const TARGET_TZ_LABEL: &str = "Europe/Stockholm";

static EMAIL_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"([A-Za-z0-9._%+-]+@[A-Za-z0-9.-]+\.[A-Za-z]{2,})").expect("email pattern")
});

static ISO_DATETIME_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"\b(\d{4}-\d{2}-\d{2}[T ]\d{2}:\d{2}(?::\d{2})?(?:Z|[+-]\d{2}:\d{2})?)\b")
        .expect("iso datetime pattern")
});

static DATE_ONLY_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\b(20\d{2}-\d{2}-\d{2})\b").expect("date pattern"));

static DATE_TIME_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)\b(\d{4}-\d{2}-\d{2})\s+(\d{1,2}:\d{2}(?:\s*[ap]m)?)\b")
        .expect("date time pattern")
});

static TIME_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)\b(\d{1,2})(?::(\d{2}))?\s*([ap]m)?\b").expect("time pattern")
});

static TIME_HHMM_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\b([01]?\d|2[0-3]):([0-5]\d)\b").expect("hh:mm pattern"));

static DATE_TIME_WITH_AT_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)\b(20\d{2}-\d{2}-\d{2})\s+at\s+([01]?\d|2[0-3]):([0-5]\d)\b")
        .expect("date at time pattern")
});

static TIME_ON_DATE_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)\b([01]?\d|2[0-3]):([0-5]\d)\s+on\s+(20\d{2}-\d{2}-\d{2})\b")
        .expect("time on date pattern")
});

static ON_DATE_AT_TIME_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)\bon\s+(20\d{2}-\d{2}-\d{2})\s+at\s+([01]?\d|2[0-3]):([0-5]\d)\b")
        .expect("on date at time pattern")
});

static NAME_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)\b(?:my name is|i am|i'm)\s+([a-zA-Z][a-zA-Z\s.'-]{1,60})\b")
        .expect("name pattern")
});

static WEEKDAY_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"(?i)\b(mon(?:day)?|tue(?:s|sday)?|wed(?:nesday)?|thu(?:rs|rsday)?|fri(?:day)?|sat(?:urday)?|sun(?:day)?)\b",
    )
    .expect("weekday pattern")
});

/// Fields pulled out of one free-text booking message.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct BookingExtraction {
    pub therapist_email: Option<String>,
    pub requested_datetime: Option<DateTime<Tz>>,
    pub sender_name: Option<String>,
    pub clarification: Option<String>,
}

/// Whether a message reads as a booking-email request at all.
///
/// Needs a booking action word, plus either an email address or some
/// datetime hint (explicit date, "tomorrow", or a weekday).
pub fn is_booking_intent(message: &str) -> bool {
    let lower = message.to_lowercase();
    let has_booking_action = [
        "email",
        "send",
        "appointment",
        "book",
        "booking",
        "request an appointment",
        "request appointment",
    ]
    .iter()
    .any(|phrase| lower.contains(phrase));
    if !has_booking_action {
        return false;
    }

    let has_email_address = EMAIL_RE.is_match(message);
    let has_datetime_hint = ISO_DATETIME_RE.is_match(message)
        || DATE_TIME_RE.is_match(message)
        || DATE_ONLY_RE.is_match(message)
        || lower.contains("tomorrow")
        || WEEKDAY_RE.is_match(&lower);
    has_email_address || has_datetime_hint
}

fn normalized_tokens(message: &str) -> Vec<String> {
    message
        .to_lowercase()
        .chars()
        .map(|c| if c.is_ascii_alphabetic() { c } else { ' ' })
        .collect::<String>()
        .split_whitespace()
        .map(str::to_string)
        .collect()
}

/// Any "yes"-shaped token anywhere in the message.
pub fn is_affirmative(message: &str) -> bool {
    normalized_tokens(message)
        .iter()
        .any(|t| matches!(t.as_str(), "yes" | "send" | "confirm"))
}

/// Any "no"-shaped token anywhere in the message.
pub fn is_negative(message: &str) -> bool {
    normalized_tokens(message)
        .iter()
        .any(|t| matches!(t.as_str(), "no" | "cancel" | "stop"))
}

/// Message consisting only of confirmation tokens ("yes", "ok", ...).
pub fn is_confirmation_only_message(message: &str) -> bool {
    let tokens = normalized_tokens(message);
    if tokens.is_empty() {
        return false;
    }
    tokens
        .iter()
        .all(|t| matches!(t.as_str(), "yes" | "confirm" | "confirmed" | "ok" | "okay" | "y"))
}

/// First RFC-like email address, lower-cased.
pub fn extract_email(message: &str) -> Option<String> {
    EMAIL_RE
        .captures(message)
        .map(|c| c[1].to_lowercase())
}

/// "my name is X" / "I am X" / "I'm X", whitespace-collapsed, capped at 80.
pub fn extract_sender_name(message: &str) -> Option<String> {
    let captures = NAME_RE.captures(message)?;
    let name = captures[1].split_whitespace().collect::<Vec<_>>().join(" ");
    if name.is_empty() {
        return None;
    }
    Some(name.chars().take(80).collect())
}

/// Hour/minute from a loose time token. 12-hour form requires am/pm and an
/// hour in 1-12; 24-hour form rejects hours past 23.
fn parse_time_token(text: &str) -> Option<(u32, u32)> {
    let captures = TIME_RE.captures(text)?;
    let mut hour: u32 = captures[1].parse().ok()?;
    let minute: u32 = captures
        .get(2)
        .map(|m| m.as_str().parse().ok())
        .unwrap_or(Some(0))?;
    let ampm = captures
        .get(3)
        .map(|m| m.as_str().to_lowercase())
        .unwrap_or_default();
    if minute > 59 {
        return None;
    }
    if !ampm.is_empty() {
        if !(1..=12).contains(&hour) {
            return None;
        }
        if ampm == "pm" && hour != 12 {
            hour += 12;
        }
        if ampm == "am" && hour == 12 {
            hour = 0;
        }
    } else if hour > 23 {
        return None;
    }
    Some((hour, minute))
}

type DatetimeOutcome = Result<DateTime<Tz>, String>;

fn localize(naive: NaiveDateTime) -> DatetimeOutcome {
    TARGET_TZ
        .from_local_datetime(&naive)
        .earliest()
        .ok_or_else(|| "I could not parse the date/time. Please use format YYYY-MM-DD HH:MM.".to_string())
}

fn build_from_date_and_time(date_text: &str, hour: u32, minute: u32) -> DatetimeOutcome {
    let date = NaiveDate::parse_from_str(date_text, "%Y-%m-%d")
        .map_err(|_| "I could not parse the date. Please use YYYY-MM-DD.".to_string())?;
    let naive = date
        .and_hms_opt(hour, minute, 0)
        .ok_or_else(|| "I could not parse the time. Please include HH:MM (24h) or 3pm.".to_string())?;
    localize(naive)
}

/// Pattern 1: explicit ISO-8601, `T` or space separated, optional seconds,
/// `Z` normalized to `+00:00`. Offset-less input is read as Stockholm local.
fn match_iso_datetime(message: &str) -> Option<DatetimeOutcome> {
    let captures = ISO_DATETIME_RE.captures(message)?;
    let mut raw = captures[1].replace(' ', "T");
    if let Some(stripped) = raw.strip_suffix('Z') {
        raw = format!("{stripped}+00:00");
    }
    for format in ["%Y-%m-%dT%H:%M:%S%:z", "%Y-%m-%dT%H:%M%:z"] {
        if let Ok(dt) = DateTime::parse_from_str(&raw, format) {
            return Some(Ok(dt.with_timezone(&TARGET_TZ)));
        }
    }
    for format in ["%Y-%m-%dT%H:%M:%S", "%Y-%m-%dT%H:%M"] {
        if let Ok(naive) = NaiveDateTime::parse_from_str(&raw, format) {
            return Some(localize(naive));
        }
    }
    Some(Err(
        "I could not parse the date/time. Please use format YYYY-MM-DD HH:MM.".to_string(),
    ))
}

/// Pattern 2: "tomorrow HH:MM" relative to Stockholm "now".
fn match_tomorrow(message: &str, now_local: DateTime<Tz>) -> Option<DatetimeOutcome> {
    if !message.to_lowercase().contains("tomorrow") {
        return None;
    }
    let Some((hour, minute)) = parse_time_token(message) else {
        return Some(Err(
            "Please include a time (for example: tomorrow 15:00).".to_string()
        ));
    };
    let target = (now_local + Duration::days(1)).date_naive();
    Some(
        target
            .and_hms_opt(hour, minute, 0)
            .ok_or_else(|| "Please include a time (for example: tomorrow 15:00).".to_string())
            .and_then(localize),
    )
}

fn weekday_number(token: &str) -> u32 {
    match &token[..3.min(token.len())] {
        "mon" => 0,
        "tue" => 1,
        "wed" => 2,
        "thu" => 3,
        "fri" => 4,
        "sat" => 5,
        _ => 6,
    }
}

/// Pattern 3: "<weekday> HH:MM" — next occurrence strictly after now,
/// rolling forward a week when the naive computation lands at or before now.
fn match_weekday(message: &str, now_local: DateTime<Tz>) -> Option<DatetimeOutcome> {
    let lower = message.to_lowercase();
    let captures = WEEKDAY_RE.captures(&lower)?;
    let Some((hour, minute)) = parse_time_token(message) else {
        return Some(Err(
            "Please include a time with the weekday (for example: Tue 15:00).".to_string(),
        ));
    };
    let target_weekday = weekday_number(&captures[1]);
    let delta_days =
        (target_weekday as i64 - now_local.weekday().num_days_from_monday() as i64).rem_euclid(7);
    let candidate_date = (now_local + Duration::days(delta_days)).date_naive();
    let naive = candidate_date
        .and_hms_opt(hour, minute, 0)
        .expect("time token range-checked");
    let candidate = match localize(naive) {
        Ok(dt) => dt,
        Err(clarification) => return Some(Err(clarification)),
    };
    if candidate <= now_local {
        return Some(localize(naive + Duration::days(7)));
    }
    Some(Ok(candidate))
}

/// Pattern 4: "YYYY-MM-DD HH:MM" with optional am/pm on the time.
fn match_date_time(message: &str) -> Option<DatetimeOutcome> {
    let captures = DATE_TIME_RE.captures(message)?;
    let Some((hour, minute)) = parse_time_token(&captures[2]) else {
        return Some(Err(
            "I could not parse the time. Please include HH:MM (24h) or 3pm.".to_string(),
        ));
    };
    Some(build_from_date_and_time(&captures[1], hour, minute))
}

/// Pattern 5: "YYYY-MM-DD at HH:MM".
fn match_date_at_time(message: &str) -> Option<DatetimeOutcome> {
    let captures = DATE_TIME_WITH_AT_RE.captures(message)?;
    let hour = captures[2].parse().ok()?;
    let minute = captures[3].parse().ok()?;
    Some(build_from_date_and_time(&captures[1], hour, minute))
}

/// Pattern 6: "HH:MM on YYYY-MM-DD".
fn match_time_on_date(message: &str) -> Option<DatetimeOutcome> {
    let captures = TIME_ON_DATE_RE.captures(message)?;
    let hour = captures[1].parse().ok()?;
    let minute = captures[2].parse().ok()?;
    Some(build_from_date_and_time(&captures[3], hour, minute))
}

/// Pattern 7: "on YYYY-MM-DD at HH:MM".
fn match_on_date_at_time(message: &str) -> Option<DatetimeOutcome> {
    let captures = ON_DATE_AT_TIME_RE.captures(message)?;
    let hour = captures[2].parse().ok()?;
    let minute = captures[3].parse().ok()?;
    Some(build_from_date_and_time(&captures[1], hour, minute))
}

/// Ordered datetime parse. Returns the parsed Stockholm time, or a
/// clarification string when the message had a date/time shape that could
/// not be completed, or neither when no pattern applied at all.
pub fn parse_requested_datetime(
    message: &str,
    now: DateTime<Utc>,
) -> (Option<DateTime<Tz>>, Option<String>) {
    let now_local = now.with_timezone(&TARGET_TZ);

    let ordered = [
        match_iso_datetime(message),
        match_tomorrow(message, now_local),
        match_weekday(message, now_local),
        match_date_time(message),
        match_date_at_time(message),
        match_time_on_date(message),
        match_on_date_at_time(message),
    ];
    for outcome in ordered {
        match outcome {
            Some(Ok(dt)) => return (Some(dt), None),
            Some(Err(clarification)) => return (None, Some(clarification)),
            None => {}
        }
    }

    // Pattern 8: independent bare date + bare HH:MM tokens.
    let date_token = DATE_ONLY_RE.captures(message);
    let time_token = TIME_HHMM_RE.captures(message);
    match (date_token, time_token) {
        (Some(date), Some(time)) => {
            let hour = time[1].parse().unwrap_or(0);
            let minute = time[2].parse().unwrap_or(0);
            match build_from_date_and_time(&date[1], hour, minute) {
                Ok(dt) => (Some(dt), None),
                Err(clarification) => (None, Some(clarification)),
            }
        }
        (Some(_), None) => (
            None,
            Some("Please include a time with the date (for example: 2026-02-14 15:00).".to_string()),
        ),
        (None, Some(_)) => (
            None,
            Some("Please include a date with the time (for example: 2026-02-14 15:00).".to_string()),
        ),
        (None, None) => (None, None),
    }
}

/// Pull email, datetime, and sender name out of one message.
pub fn extract_booking_data(message: &str, now: DateTime<Utc>) -> BookingExtraction {
    let (requested_datetime, clarification) = parse_requested_datetime(message, now);
    BookingExtraction {
        therapist_email: extract_email(message),
        requested_datetime,
        sender_name: extract_sender_name(message),
        clarification,
    }
}

/// Display form used everywhere a requested time is shown to the user.
pub fn requested_time_display<T: TimeZone>(dt: &DateTime<T>) -> String {
    format!(
        "{} {TARGET_TZ_LABEL}",
        dt.with_timezone(&TARGET_TZ).format("%Y-%m-%d %H:%M")
    )
}
