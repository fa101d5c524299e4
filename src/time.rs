//! Clock & Calendar abstraction: wall time, day-of-week, hour, quarter-of-hour.
//!
//! Kept behind a trait so the decision engine and its tests can run against
//! virtual time instead of the real clock.

use chrono::{DateTime, Datelike, Local, Timelike};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Supplies "now" to the rest of the daemon. The production implementation
/// reads the system clock; tests inject a fixed or steppable instant.
pub trait Clock: Send + Sync {
    fn now(&self) -> DateTime<Local>;
}

#[derive(Debug, Default, Clone, Copy)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Local> {
        Local::now()
    }
}

/// A clock that always returns the same instant, or one set explicitly by a
/// test via `set`.
#[derive(Debug, Clone)]
pub struct FixedClock(std::sync::Arc<std::sync::Mutex<DateTime<Local>>>);

impl FixedClock {
    pub fn new(at: DateTime<Local>) -> Self {
        FixedClock(std::sync::Arc::new(std::sync::Mutex::new(at)))
    }

    pub fn set(&self, at: DateTime<Local>) {
        *self.0.lock().expect("fixed clock poisoned") = at;
    }
}

impl Clock for FixedClock {
    fn now(&self) -> DateTime<Local> {
        *self.0.lock().expect("fixed clock poisoned")
    }
}

/// One of the seven days of the week, used as the outer key of the schedule
/// matrix. Serializes to the lowercase English name ("monday".."sunday") to
/// match the wire format in the control-socket protocol.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Day {
    Monday,
    Tuesday,
    Wednesday,
    Thursday,
    Friday,
    Saturday,
    Sunday,
}

impl Day {
    pub const ALL: [Day; 7] = [
        Day::Monday,
        Day::Tuesday,
        Day::Wednesday,
        Day::Thursday,
        Day::Friday,
        Day::Saturday,
        Day::Sunday,
    ];
}

impl From<chrono::Weekday> for Day {
    fn from(w: chrono::Weekday) -> Self {
        match w {
            chrono::Weekday::Mon => Day::Monday,
            chrono::Weekday::Tue => Day::Tuesday,
            chrono::Weekday::Wed => Day::Wednesday,
            chrono::Weekday::Thu => Day::Thursday,
            chrono::Weekday::Fri => Day::Friday,
            chrono::Weekday::Sat => Day::Saturday,
            chrono::Weekday::Sun => Day::Sunday,
        }
    }
}

impl fmt::Display for Day {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Day::Monday => "monday",
            Day::Tuesday => "tuesday",
            Day::Wednesday => "wednesday",
            Day::Thursday => "thursday",
            Day::Friday => "friday",
            Day::Saturday => "saturday",
            Day::Sunday => "sunday",
        };
        f.write_str(s)
    }
}

/// Formats an hour 0..=23 the way the matrix keys it: `"h00".."h23"`.
pub fn hour_key(hour: u32) -> String {
    format!("h{hour:02}")
}

/// The quarter-of-hour index (0..=3) for a given instant.
pub fn quarter_of(dt: &DateTime<Local>) -> usize {
    (dt.minute() / 15) as usize
}

/// `(day, hour key, quarter index)` for a given instant — the coordinates
/// into the schedule matrix used by the `auto` mode lookup.
pub fn slot_of(dt: &DateTime<Local>) -> (Day, String, usize) {
    (Day::from(dt.weekday()), hour_key(dt.hour()), quarter_of(dt))
}
