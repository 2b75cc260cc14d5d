//! Tests for cadence arithmetic — all driven with fixed instants, no clock.

use chrono::{DateTime, NaiveTime, Utc, Weekday};

use otpgate::scheduler::{is_due, Cadence};

fn instant(s: &str) -> DateTime<Utc> {
    s.parse().expect("valid RFC 3339 instant")
}

fn time(s: &str) -> NaiveTime {
    s.parse().expect("valid time of day")
}

#[test]
fn one_time_fires_only_strictly_after() {
    let at = instant("2026-03-01T09:00:00Z");
    let cadence = Cadence::OneTime { at };

    assert_eq!(
        cadence.next_fire_after(instant("2026-02-28T00:00:00Z")),
        Some(at)
    );
    // At or past the instant: never again.
    assert_eq!(cadence.next_fire_after(at), None);
    assert_eq!(cadence.next_fire_after(instant("2026-03-02T00:00:00Z")), None);
}

#[test]
fn daily_fires_later_today_or_tomorrow() {
    let cadence = Cadence::Daily { at: time("09:00:00") };

    assert_eq!(
        cadence.next_fire_after(instant("2026-03-01T08:00:00Z")),
        Some(instant("2026-03-01T09:00:00Z"))
    );
    // Time of day already passed: roll to tomorrow.
    assert_eq!(
        cadence.next_fire_after(instant("2026-03-01T09:00:00Z")),
        Some(instant("2026-03-02T09:00:00Z"))
    );
}

#[test]
fn weekly_picks_the_next_listed_day() {
    // 2026-03-02 is a Monday.
    let cadence = Cadence::Weekly {
        days: vec![Weekday::Mon, Weekday::Thu],
        at: time("09:00:00"),
    };

    assert_eq!(
        cadence.next_fire_after(instant("2026-03-02T10:00:00Z")),
        Some(instant("2026-03-05T09:00:00Z"))
    );
    // Thursday evening rolls over to next Monday.
    assert_eq!(
        cadence.next_fire_after(instant("2026-03-05T10:00:00Z")),
        Some(instant("2026-03-09T09:00:00Z"))
    );
    // Same day, earlier in the morning: fires today.
    assert_eq!(
        cadence.next_fire_after(instant("2026-03-02T08:00:00Z")),
        Some(instant("2026-03-02T09:00:00Z"))
    );
}

#[test]
fn weekly_with_no_days_never_fires() {
    let cadence = Cadence::Weekly {
        days: Vec::new(),
        at: time("09:00:00"),
    };
    assert_eq!(cadence.next_fire_after(instant("2026-03-02T08:00:00Z")), None);
}

#[test]
fn monthly_clamps_to_short_months() {
    let cadence = Cadence::Monthly {
        day_of_month: 31,
        at: time("09:00:00"),
    };

    // 2026 is not a leap year.
    assert_eq!(
        cadence.next_fire_after(instant("2026-02-01T00:00:00Z")),
        Some(instant("2026-02-28T09:00:00Z"))
    );
    assert_eq!(
        cadence.next_fire_after(instant("2026-04-01T00:00:00Z")),
        Some(instant("2026-04-30T09:00:00Z"))
    );
    // Full-length month uses the real day.
    assert_eq!(
        cadence.next_fire_after(instant("2026-03-01T00:00:00Z")),
        Some(instant("2026-03-31T09:00:00Z"))
    );
}

#[test]
fn monthly_rolls_to_next_month_when_passed() {
    let cadence = Cadence::Monthly {
        day_of_month: 15,
        at: time("09:00:00"),
    };
    assert_eq!(
        cadence.next_fire_after(instant("2026-03-15T09:00:00Z")),
        Some(instant("2026-04-15T09:00:00Z"))
    );
}

#[test]
fn is_due_compares_against_now() {
    let cadence = Cadence::Daily { at: time("09:00:00") };
    let anchor = instant("2026-03-01T00:00:00Z");

    assert!(is_due(&cadence, anchor, instant("2026-03-01T09:00:00Z")));
    assert!(is_due(&cadence, anchor, instant("2026-03-01T12:00:00Z")));
    assert!(!is_due(&cadence, anchor, instant("2026-03-01T08:59:59Z")));
}

#[test]
fn one_time_is_only_due_once() {
    let at = instant("2026-03-01T09:00:00Z");
    let cadence = Cadence::OneTime { at };

    let before = instant("2026-02-28T00:00:00Z");
    assert!(is_due(&cadence, before, instant("2026-03-01T10:00:00Z")));
    // Once fired, the fire instant itself becomes the anchor.
    assert!(!is_due(&cadence, instant("2026-03-01T10:00:00Z"), instant("2026-04-01T00:00:00Z")));
}

#[test]
fn cadence_json_form_is_tagged() {
    let cadence = Cadence::Daily { at: time("09:00:00") };
    let json = serde_json::to_value(&cadence).expect("serialize");
    assert_eq!(json["type"], "daily");
    assert_eq!(json["at"], "09:00:00");

    let back: Cadence = serde_json::from_value(json).expect("deserialize");
    assert_eq!(back, cadence);
}
