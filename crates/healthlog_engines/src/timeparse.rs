#![forbid(unsafe_code)]

use chrono::{Duration, NaiveDateTime, NaiveTime, Timelike};

use crate::ontology::number_word_value;

const MAX_RELATIVE_MINUTES: i64 = 48 * 60;

/// Extracts a clock time from normalized text. Relative phrases ("2 hours ago")
/// resolve against `now`; absolute phrases ignore it.
pub fn extract_time(normalized: &str, now: NaiveDateTime) -> Option<NaiveTime> {
    let tokens: Vec<&str> = normalized
        .split_whitespace()
        .map(trim_punctuation)
        .filter(|t| !t.is_empty())
        .collect();

    for (i, t) in tokens.iter().enumerate() {
        match *t {
            "noon" => return NaiveTime::from_hms_opt(12, 0, 0),
            "midnight" => return NaiveTime::from_hms_opt(0, 0, 0),
            _ => {}
        }
        if let Some(time) = clock_with_attached_meridiem(t) {
            return Some(time);
        }
        if let Some(pm) = tokens.get(i + 1).and_then(|next| meridiem(next)) {
            if let Some(time) = clock_with_meridiem(t, pm) {
                return Some(time);
            }
        }
        if let Some(time) = clock_24h(t) {
            return Some(time);
        }
    }

    relative_time(&tokens, now)
}

pub fn format_clock(t: NaiveTime) -> String {
    format!("{:02}:{:02}", t.hour(), t.minute())
}

/// Meal window implied by an hour of day (0-23).
pub fn meal_window_for_hour(hour: u32) -> &'static str {
    match hour {
        5..=10 => "breakfast",
        11..=15 => "lunch",
        16..=21 => "dinner",
        _ => "snack",
    }
}

fn trim_punctuation(t: &str) -> &str {
    t.trim_matches(|c: char| matches!(c, ',' | '!' | '?' | ';' | '(' | ')' | '"'))
        .trim_end_matches('.')
}

/// `Some(true)` for pm, `Some(false)` for am.
fn meridiem(t: &str) -> Option<bool> {
    match t {
        "pm" | "p.m" | "p.m." => Some(true),
        "am" | "a.m" | "a.m." => Some(false),
        _ => None,
    }
}

fn clock_with_attached_meridiem(t: &str) -> Option<NaiveTime> {
    for (suffix, pm) in [
        ("p.m.", true),
        ("a.m.", false),
        ("p.m", true),
        ("a.m", false),
        ("pm", true),
        ("am", false),
    ] {
        if let Some(core) = t.strip_suffix(suffix) {
            if core.is_empty() {
                return None;
            }
            return clock_with_meridiem(core, pm);
        }
    }
    None
}

fn clock_with_meridiem(core: &str, pm: bool) -> Option<NaiveTime> {
    let (h, m) = split_clock(core)?;
    if !(1..=12).contains(&h) {
        return None;
    }
    let hour = match (pm, h) {
        (true, 12) => 12,
        (true, h) => h + 12,
        (false, 12) => 0,
        (false, h) => h,
    };
    NaiveTime::from_hms_opt(hour, m, 0)
}

fn clock_24h(t: &str) -> Option<NaiveTime> {
    if !t.contains(':') {
        return None;
    }
    let (h, m) = split_clock(t)?;
    NaiveTime::from_hms_opt(h, m, 0)
}

fn split_clock(core: &str) -> Option<(u32, u32)> {
    let (h, m) = match core.split_once(':') {
        Some((h, m)) => {
            if m.len() != 2 {
                return None;
            }
            (h, m)
        }
        None => (core, "00"),
    };
    if h.is_empty() || h.len() > 2 || !h.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    if !m.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    let h: u32 = h.parse().ok()?;
    let m: u32 = m.parse().ok()?;
    if h > 23 || m > 59 {
        return None;
    }
    Some((h, m))
}

fn relative_time(tokens: &[&str], now: NaiveDateTime) -> Option<NaiveTime> {
    let ago = tokens.iter().position(|t| *t == "ago")?;
    if ago < 2 {
        return None;
    }
    let unit_minutes: i64 = match tokens[ago - 1] {
        "hour" | "hours" | "hr" | "hrs" => 60,
        "minute" | "minutes" | "min" | "mins" => 1,
        _ => return None,
    };
    let amount = tokens[ago - 2];
    let mut minutes = match amount {
        "a" | "an" => unit_minutes,
        "few" => 3 * unit_minutes,
        "couple" => 2 * unit_minutes,
        _ => {
            let n = amount
                .parse::<i64>()
                .ok()
                .or_else(|| number_word_value(amount).map(i64::from))?;
            n.checked_mul(unit_minutes)?
        }
    };
    if amount == "an" && ago >= 3 && tokens[ago - 3] == "half" {
        minutes /= 2;
    }
    if minutes <= 0 || minutes > MAX_RELATIVE_MINUTES {
        return None;
    }
    Some((now - Duration::minutes(minutes)).time())
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;

    fn now() -> NaiveDateTime {
        NaiveDate::from_ymd_opt(2026, 3, 14)
            .unwrap()
            .and_hms_opt(13, 30, 0)
            .unwrap()
    }

    fn t(text: &str) -> Option<String> {
        extract_time(text, now()).map(format_clock)
    }

    #[test]
    fn at_time_01_meridiem_forms() {
        assert_eq!(t("coffee at 3pm"), Some("15:00".to_string()));
        assert_eq!(t("toast at 7:45 am"), Some("07:45".to_string()));
        assert_eq!(t("snack 12am"), Some("00:00".to_string()));
        assert_eq!(t("lunch 12 p.m."), Some("12:00".to_string()));
    }

    #[test]
    fn at_time_02_24h_and_named() {
        assert_eq!(t("dinner 19:05"), Some("19:05".to_string()));
        assert_eq!(t("soup at noon"), Some("12:00".to_string()));
        assert_eq!(t("up at midnight"), Some("00:00".to_string()));
    }

    #[test]
    fn at_time_03_relative_phrases() {
        assert_eq!(t("ate 2 hours ago"), Some("11:30".to_string()));
        assert_eq!(t("an hour ago"), Some("12:30".to_string()));
        assert_eq!(t("half an hour ago"), Some("13:00".to_string()));
        assert_eq!(t("ten minutes ago"), Some("13:20".to_string()));
    }

    #[test]
    fn at_time_04_non_times_are_ignored() {
        assert_eq!(t("pain 7/10"), None);
        assert_eq!(t("bristol 4"), None);
        assert_eq!(t("25:00"), None);
        assert_eq!(t("ago"), None);
        assert_eq!(t("pm"), None);
    }

    #[test]
    fn at_time_06_huge_relative_count_is_ignored() {
        assert_eq!(t("ate toast 999999999999999999 hours ago"), None);
        assert_eq!(t("9223372036854775807 minutes ago"), None);
        assert_eq!(t("49 hours ago"), None);
    }

    #[test]
    fn at_time_05_meal_windows() {
        assert_eq!(meal_window_for_hour(7), "breakfast");
        assert_eq!(meal_window_for_hour(12), "lunch");
        assert_eq!(meal_window_for_hour(19), "dinner");
        assert_eq!(meal_window_for_hour(23), "snack");
        assert_eq!(meal_window_for_hour(3), "snack");
    }
}
