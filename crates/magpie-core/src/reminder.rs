//! Reminder-spec parsing — turns a user-supplied spec into a UTC fire time.
//!
//! Two spec shapes are accepted:
//!   - a duration ("5m", "in 2h 30m") parsed with humantime, minimum 1 s;
//!   - a time of day ("10:00", "10:00:30") interpreted in the bot's timezone,
//!     rolling to the next day when the time has already passed.

use chrono::{DateTime, Duration, NaiveTime, TimeZone, Utc};
use chrono_tz::Tz;

use crate::error::{MagpieError, Result};

/// Resolve `spec` into a UTC instant strictly after `now`.
pub fn resolve_fire_time(spec: &str, now: DateTime<Utc>, tz: Tz) -> Result<DateTime<Utc>> {
    let s = spec.trim();
    let s = s.strip_prefix("in ").or_else(|| s.strip_prefix("at ")).unwrap_or(s);

    if s.is_empty() {
        return Err(MagpieError::Reminder("empty reminder spec".to_string()));
    }

    if let Some(time) = parse_time_of_day(s) {
        return Ok(next_occurrence(time, now, tz));
    }

    match humantime::parse_duration(s) {
        Ok(d) => {
            if d.as_secs() < 1 {
                return Err(MagpieError::Reminder(
                    "reminder must be at least 1s in the future".to_string(),
                ));
            }
            let delta = Duration::from_std(d)
                .map_err(|_| MagpieError::Reminder(format!("duration out of range: {s}")))?;
            Ok(now + delta)
        }
        Err(_) => Err(MagpieError::Reminder(format!(
            "could not parse reminder spec: {s}"
        ))),
    }
}

/// Parse "HH:MM" or "HH:MM:SS". Returns `None` for anything else.
fn parse_time_of_day(s: &str) -> Option<NaiveTime> {
    let parts: Vec<&str> = s.split(':').collect();
    match parts.len() {
        2 => {
            let h: u32 = parts[0].parse().ok()?;
            let m: u32 = parts[1].parse().ok()?;
            NaiveTime::from_hms_opt(h, m, 0)
        }
        3 => {
            let h: u32 = parts[0].parse().ok()?;
            let m: u32 = parts[1].parse().ok()?;
            let sec: u32 = parts[2].parse().ok()?;
            NaiveTime::from_hms_opt(h, m, sec)
        }
        _ => None,
    }
}

/// Next occurrence of `time` in `tz`, strictly after `now`.
fn next_occurrence(time: NaiveTime, now: DateTime<Utc>, tz: Tz) -> DateTime<Utc> {
    let local_now = now.with_timezone(&tz);
    let mut naive = local_now.date_naive().and_time(time);
    if resolve_local(naive, tz).map(|dt| dt <= now).unwrap_or(true) {
        naive = naive + Duration::days(1);
    }
    // A DST gap can make the rolled candidate unresolvable too; nudging one
    // more day forward always lands on a representable instant.
    resolve_local(naive, tz)
        .or_else(|| resolve_local(naive + Duration::days(1), tz))
        .unwrap_or(now + Duration::days(1))
}

fn resolve_local(naive: chrono::NaiveDateTime, tz: Tz) -> Option<DateTime<Utc>> {
    tz.from_local_datetime(&naive)
        .earliest()
        .map(|dt| dt.with_timezone(&Utc))
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn at(h: u32, m: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2025, 6, 15, h, m, 0).unwrap()
    }

    #[test]
    fn duration_spec() {
        let now = at(12, 0);
        let fire = resolve_fire_time("5m", now, chrono_tz::UTC).unwrap();
        assert_eq!(fire, now + Duration::minutes(5));
    }

    #[test]
    fn duration_spec_with_in_prefix() {
        let now = at(12, 0);
        let fire = resolve_fire_time("in 2h 30m", now, chrono_tz::UTC).unwrap();
        assert_eq!(fire, now + Duration::minutes(150));
    }

    #[test]
    fn zero_duration_rejected() {
        let err = resolve_fire_time("0s", at(12, 0), chrono_tz::UTC).unwrap_err();
        assert!(err.to_string().contains("at least 1s"));
    }

    #[test]
    fn time_of_day_later_today() {
        let now = at(9, 0);
        let fire = resolve_fire_time("10:00", now, chrono_tz::UTC).unwrap();
        assert_eq!(fire, at(10, 0));
    }

    #[test]
    fn time_of_day_rolls_to_next_day() {
        // 10:00 requested at 14:00 — fires tomorrow at 10:00.
        let now = at(14, 0);
        let fire = resolve_fire_time("10:00", now, chrono_tz::UTC).unwrap();
        assert_eq!(fire, Utc.with_ymd_and_hms(2025, 6, 16, 10, 0, 0).unwrap());
    }

    #[test]
    fn time_of_day_respects_timezone() {
        // 10:00 Helsinki (UTC+3 in June) = 07:00 UTC. At 06:00 UTC it is
        // still later today.
        let now = at(6, 0);
        let fire =
            resolve_fire_time("10:00", now, chrono_tz::Europe::Helsinki).unwrap();
        assert_eq!(fire, at(7, 0));
    }

    #[test]
    fn garbage_rejected() {
        assert!(resolve_fire_time("next tuesday-ish", at(12, 0), chrono_tz::UTC).is_err());
        assert!(resolve_fire_time("", at(12, 0), chrono_tz::UTC).is_err());
    }
}
