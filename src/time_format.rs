use chrono::{DateTime, Utc};

/// Formats `target` relative to `reference` in human-readable form
///
/// Examples (relative to the reference moment):
/// - Same moment: "now"
/// - 30 seconds later: "in 30 seconds"
/// - 1 minute later: "in 1 minute"
/// - 2 hours later: "in 2 hours"
/// - 1 day later: "tomorrow"
/// - 3 days later: "in 3 days"
/// - 30 days later: "on 2025-02-14"
/// - 2 hours earlier: "2 hours ago"
/// - 1 day earlier: "yesterday"
pub fn format_time_difference(reference: DateTime<Utc>, target: DateTime<Utc>) -> String {
    let duration = target.signed_duration_since(reference);
    let seconds = duration.num_seconds();

    if seconds == 0 {
        return "now".to_string();
    }

    let future = seconds > 0;
    let duration = duration.abs();

    if duration.num_days() >= 30 {
        return format!("on {}", target.format("%Y-%m-%d"));
    }
    if duration.num_days() == 1 {
        return if future { "tomorrow" } else { "yesterday" }.to_string();
    }

    let phrase = if duration.num_seconds() < 60 {
        plural(duration.num_seconds(), "second")
    } else if duration.num_minutes() < 60 {
        plural(duration.num_minutes(), "minute")
    } else if duration.num_hours() < 24 {
        plural(duration.num_hours(), "hour")
    } else {
        plural(duration.num_days(), "day")
    };

    if future {
        format!("in {}", phrase)
    } else {
        format!("{} ago", phrase)
    }
}

/// Formats `target` relative to `reference`, or "never" when there is no target
pub fn format_optional(reference: DateTime<Utc>, target: Option<DateTime<Utc>>) -> String {
    target
        .map(|target| format_time_difference(reference, target))
        .unwrap_or_else(|| "never".to_string())
}

fn plural(count: i64, unit: &str) -> String {
    format!("{} {}{}", count, unit, if count == 1 { "" } else { "s" })
}
