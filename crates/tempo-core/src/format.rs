//! Formatting utilities

use chrono::{DateTime, Local};

/// Format seconds as HH:MM:SS (negative values render as zero)
pub fn duration_clock(seconds: i64) -> String {
    if seconds <= 0 {
        return "00:00:00".to_string();
    }
    let hours = seconds / 3600;
    let mins = (seconds % 3600) / 60;
    let secs = seconds % 60;
    format!("{:02}:{:02}:{:02}", hours, mins, secs)
}

/// Format a duration in compact human-readable form
pub fn duration(seconds: u64) -> String {
    if seconds < 60 {
        format!("{}s", seconds)
    } else if seconds < 3600 {
        format!("{}m {}s", seconds / 60, seconds % 60)
    } else {
        format!("{}h {}m", seconds / 3600, (seconds % 3600) / 60)
    }
}

/// Format a countdown as MM:SS
pub fn countdown(seconds: u64) -> String {
    format!("{:02}:{:02}", seconds / 60, seconds % 60)
}

/// Format a timestamp as HH:MM
pub fn clock_time(dt: DateTime<Local>) -> String {
    dt.format("%H:%M").to_string()
}

/// Format a whole amount with space-grouped thousands and a currency suffix
pub fn money(amount: i64, currency: &str) -> String {
    let digits = amount.unsigned_abs().to_string();
    let mut grouped = String::with_capacity(digits.len() + digits.len() / 3);
    for (i, ch) in digits.chars().enumerate() {
        if i > 0 && (digits.len() - i) % 3 == 0 {
            grouped.push(' ');
        }
        grouped.push(ch);
    }
    let sign = if amount < 0 { "-" } else { "" };
    format!("{}{} {}", sign, grouped, currency)
}
