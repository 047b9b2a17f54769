use chrono::NaiveTime;

/// Decides whether a normalized session time label belongs to the current day.
pub trait TodayPredicate {
    fn is_today(&self, time_label: &str) -> bool;
}

impl<F> TodayPredicate for F
where
    F: Fn(&str) -> bool,
{
    fn is_today(&self, time_label: &str) -> bool {
        self(time_label)
    }
}

/// Session lists render today's rows as a bare clock time and older rows as a day name or
/// date, so a label that parses as `HH:MM` is today.
#[derive(Debug, Clone, Copy, Default)]
pub struct ClockLabelToday;

impl TodayPredicate for ClockLabelToday {
    fn is_today(&self, time_label: &str) -> bool {
        parse_clock(time_label.trim()).is_some()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Meridiem {
    Am,
    Noon,
    Pm,
}

const PREFIXES: [(&str, Meridiem); 6] = [
    ("凌晨", Meridiem::Am),
    ("早上", Meridiem::Am),
    ("上午", Meridiem::Am),
    ("中午", Meridiem::Noon),
    ("下午", Meridiem::Pm),
    ("晚上", Meridiem::Pm),
];

/// Converts 12-hour labels (`下午 3:05`, `3:05 PM`) into 24-hour `HH:MM`. Anything that is not
/// a clock time is returned trimmed.
pub fn normalize_time_label(raw: &str) -> String {
    let label = raw.trim();
    let (meridiem, clock) = split_meridiem(label);
    match parse_clock(clock) {
        Some(time) => apply_meridiem(time, meridiem).format("%H:%M").to_string(),
        None => label.to_string(),
    }
}

fn split_meridiem(label: &str) -> (Option<Meridiem>, &str) {
    for (prefix, meridiem) in PREFIXES {
        if let Some(rest) = label.strip_prefix(prefix) {
            return (Some(meridiem), rest.trim());
        }
    }
    let upper = label.to_ascii_uppercase();
    if upper.ends_with("AM") {
        return (Some(Meridiem::Am), label[..label.len() - 2].trim());
    }
    if upper.ends_with("PM") {
        return (Some(Meridiem::Pm), label[..label.len() - 2].trim());
    }
    (None, label)
}

fn parse_clock(clock: &str) -> Option<NaiveTime> {
    let (hour, minute) = clock.split_once(':')?;
    if hour.is_empty() || minute.len() != 2 {
        return None;
    }
    let hour = hour.parse::<u32>().ok()?;
    let minute = minute.parse::<u32>().ok()?;
    NaiveTime::from_hms_opt(hour, minute, 0)
}

fn apply_meridiem(time: NaiveTime, meridiem: Option<Meridiem>) -> NaiveTime {
    use chrono::Timelike;

    let hour = time.hour();
    let shifted = match meridiem {
        None => hour,
        Some(Meridiem::Am) if hour == 12 => 0,
        Some(Meridiem::Am) => hour,
        Some(Meridiem::Noon) if hour < 11 => hour + 12,
        Some(Meridiem::Noon) => hour,
        Some(Meridiem::Pm) if hour < 12 => hour + 12,
        Some(Meridiem::Pm) => hour,
    };
    time.with_hour(shifted).unwrap_or(time)
}
