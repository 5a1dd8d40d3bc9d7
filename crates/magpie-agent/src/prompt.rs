//! System prompt for conversation turns.

use chrono::DateTime;
use chrono_tz::Tz;

/// Build the system message prefixed to every assembled transcript.
pub fn build_system_prompt(display_name: &str, now: DateTime<Tz>) -> String {
    format!(
        "You are {display_name}, a helpful assistant in a group chat room. \
         The current time is {}. \
         Keep answers concise and suited to a chat room. \
         Use the available tools when they help you answer; prefer tool \
         results over guessing.",
        now.format("%A %Y-%m-%d %H:%M %Z")
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn prompt_carries_name_and_local_time() {
        let now = chrono_tz::Europe::Helsinki
            .with_ymd_and_hms(2025, 6, 15, 14, 30, 0)
            .unwrap();
        let prompt = build_system_prompt("Magpie", now);
        assert!(prompt.contains("You are Magpie"));
        assert!(prompt.contains("2025-06-15 14:30 EEST"));
    }
}
