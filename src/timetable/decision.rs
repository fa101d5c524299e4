//! The hysteresis-based on/off decision function  plus the
//! publishable status snapshot it produces.

use super::document::{Mode, TimeTableDocument};
use chrono::{DateTime, Local};
use serde::{Deserialize, Serialize};

/// Publishable snapshot describing mode, temperatures, and heating state at
/// a point in time. Fanned out by the status publisher to monitor clients.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ThermodStatus {
    pub timestamp: DateTime<Local>,
    pub mode: Mode,
    pub current_temperature: Option<f64>,
    pub target_temperature: Option<f64>,
    pub heating_status: u8,
    pub error: Option<String>,
}

impl ThermodStatus {
    pub fn error(now: DateTime<Local>, mode: Mode, heating_status: bool, message: impl Into<String>) -> Self {
        ThermodStatus {
            timestamp: now,
            mode,
            current_temperature: None,
            target_temperature: None,
            heating_status: heating_status as u8,
            error: Some(message.into()),
        }
    }
}

/// The outcome of `TimeTable::should_the_heating_be_on`: the actuator state
/// the caller should drive towards, plus the status snapshot describing why.
#[derive(Debug, Clone, PartialEq)]
pub struct Decision {
    pub on: bool,
    pub status: ThermodStatus,
    /// True when `on` was computed via the hysteresis/grace-time path
    /// (auto/tmax/tmin/t0), as opposed to an explicit `on`/`off` mode. Used
    /// by the control cycle to decide whether an on->off transition should
    /// start a new grace-time window — explicit mode transitions bypass it.
    pub(crate) via_threshold: bool,
}

impl From<&Decision> for bool {
    fn from(d: &Decision) -> bool {
        d.on
    }
}

/// Pure per the purity requirement: a function of `(document snapshot,
/// current_temperature, actuator_is_on, last_off_time, now)`. Does not
/// mutate anything; callers that act on an on->off transition are
/// responsible for recording it via `TimeTable::note_switched_off`.
pub(crate) fn decide(
    doc: &TimeTableDocument,
    last_off_time: Option<DateTime<Local>>,
    current_temperature: f64,
    actuator_is_on: bool,
    now: DateTime<Local>,
) -> Decision {
    match doc.mode {
        Mode::Off => Decision {
            on: false,
            via_threshold: false,
            status: ThermodStatus {
                timestamp: now,
                mode: doc.mode,
                current_temperature: Some(current_temperature),
                target_temperature: None,
                heating_status: 0,
                error: None,
            },
        },
        Mode::On => Decision {
            on: true,
            via_threshold: false,
            status: ThermodStatus {
                timestamp: now,
                mode: doc.mode,
                current_temperature: Some(current_temperature),
                target_temperature: None,
                heating_status: 1,
                error: None,
            },
        },
        _ => {
            let target = resolve_target(doc, now);
            let on = apply_hysteresis(
                target,
                doc.differential,
                doc.cooling,
                current_temperature,
                actuator_is_on,
                doc.grace_time,
                last_off_time,
                now,
            );
            Decision {
                on,
                via_threshold: true,
                status: ThermodStatus {
                    timestamp: now,
                    mode: doc.mode,
                    current_temperature: Some(current_temperature),
                    target_temperature: Some(target),
                    heating_status: on as u8,
                    error: None,
                },
            }
        }
    }
}

/// Resolves the target temperature for a mode that isn't `on`/`off`:
/// the fixed-alias modes resolve directly, `auto` looks up the matrix slot
/// for `now`.
fn resolve_target(doc: &TimeTableDocument, now: DateTime<Local>) -> f64 {
    use super::document::TemperatureAlias;
    match doc.mode {
        Mode::Tmax => TemperatureAlias::Tmax.resolve(&doc.temperatures),
        Mode::Tmin => TemperatureAlias::Tmin.resolve(&doc.temperatures),
        Mode::T0 => TemperatureAlias::T0.resolve(&doc.temperatures),
        Mode::Auto => {
            let (day, hour, quarter) = crate::time::slot_of(&now);
            let alias = doc
                .timetable
                .get(&day)
                .and_then(|hours| hours.get(&hour))
                .map(|slots| slots[quarter])
                .unwrap_or(TemperatureAlias::T0);
            alias.resolve(&doc.temperatures)
        }
        Mode::On | Mode::Off => unreachable!("handled by caller"),
    }
}

#[allow(clippy::too_many_arguments)]
fn apply_hysteresis(
    target: f64,
    differential: f64,
    cooling: bool,
    current_temperature: f64,
    actuator_is_on: bool,
    grace_time: Option<u64>,
    last_off_time: Option<DateTime<Local>>,
    now: DateTime<Local>,
) -> bool {
    let half = differential / 2.0;
    let (on_threshold, off_threshold) = if cooling {
        (target + half, target - half)
    } else {
        (target - half, target + half)
    };

    let would_turn_on = if cooling {
        current_temperature >= on_threshold
    } else {
        current_temperature <= on_threshold
    };
    let would_turn_off = if cooling {
        current_temperature <= off_threshold
    } else {
        current_temperature >= off_threshold
    };

    if actuator_is_on {
        // In the hysteresis band, or below the off-threshold: stay on.
        !would_turn_off
    } else if would_turn_on {
        if grace_active(grace_time, last_off_time, now) {
            false
        } else {
            true
        }
    } else {
        false
    }
}

fn grace_active(
    grace_time: Option<u64>,
    last_off_time: Option<DateTime<Local>>,
    now: DateTime<Local>,
) -> bool {
    match (grace_time, last_off_time) {
        (Some(g), Some(off_at)) => {
            let elapsed = (now - off_at).num_seconds();
            elapsed >= 0 && elapsed < g as i64
        }
        _ => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::timetable::document::{Scale, Temperatures};
    use chrono::TimeZone;

    fn doc(mode: Mode, differential: f64, cooling: bool, grace_time: Option<u64>) -> TimeTableDocument {
        let mut doc = TimeTableDocument::default();
        doc.mode = mode;
        doc.differential = differential;
        doc.cooling = cooling;
        doc.grace_time = grace_time;
        doc.scale = Scale::Celsius;
        doc.temperatures = Temperatures {
            tmax: 22.0,
            tmin: 17.0,
            t0: 7.0,
        };
        doc
    }

    fn at(h: u32, m: u32, s: u32) -> DateTime<Local> {
        Local.with_ymd_and_hms(2026, 1, 5, h, m, s).unwrap()
    }

    #[test]
    fn mode_on_forces_on_regardless_of_temperature() {
        let d = decide(&doc(Mode::On, 0.5, false, None), None, 5.0, false, at(10, 0, 0));
        assert!(d.on);
    }

    #[test]
    fn mode_off_forces_off_regardless_of_temperature() {
        let d = decide(&doc(Mode::Off, 0.5, false, None), None, 30.0, true, at(10, 0, 0));
        assert!(!d.on);
    }

    #[test]
    fn scenario_1_heating_hysteresis() {
        let t = doc(Mode::Tmax, 0.5, false, None);
        // 21.7 <= 21.75 -> switch on
        let d1 = decide(&t, None, 21.7, false, at(10, 0, 0));
        assert!(d1.on);
        // 22.3 >= 22.25 -> switch off
        let d2 = decide(&t, None, 22.3, true, at(10, 15, 0));
        assert!(!d2.on);
    }

    #[test]
    fn scenario_4_hysteresis_band_holds_state() {
        let t = doc(Mode::Tmax, 0.5, false, None);
        // inside the band: neither threshold crossed, actuator was off -> stays off
        let d_off = decide(&t, None, 22.0, false, at(10, 0, 0));
        assert!(!d_off.on);
        // inside the band, actuator was on -> stays on
        let d_on = decide(&t, None, 22.0, true, at(10, 0, 0));
        assert!(d_on.on);
    }

    #[test]
    fn scenario_2_grace_time_suppresses_then_releases() {
        let t = doc(Mode::Tmax, 0.5, false, Some(600));
        let t0 = at(10, 0, 0);

        // at t0+300s, grace still active -> stays off even though 21.6 <= 21.75
        let during = decide(&t, Some(t0), 21.6, false, t0 + chrono::Duration::seconds(300));
        assert!(!during.on);

        // at t0+601s, grace expired -> turns on
        let after = decide(&t, Some(t0), 21.6, false, t0 + chrono::Duration::seconds(601));
        assert!(after.on);
    }

    #[test]
    fn scenario_6_cooling_hysteresis() {
        let t = doc(Mode::Auto, 0.4, true, None);
        // target for auto at a given slot resolves through the matrix;
        // force via tmax/tmin aliasing by using the Tmax mode path instead,
        // whose target is fixed at 22.0, scaled for this test's differential.
        let t = {
            let mut t = t;
            t.mode = Mode::Tmax;
            t.temperatures.tmax = 24.0;
            t
        };
        let on = decide(&t, None, 24.3, false, at(10, 0, 0));
        assert!(on.on, "24.3 >= 24.2 on-threshold should switch on");
        let off = decide(&t, None, 23.7, true, at(10, 0, 0));
        assert!(!off.on, "23.7 <= 23.8 off-threshold should switch off");
    }

    #[test]
    fn mode_on_off_bypass_grace_time() {
        let mut t = doc(Mode::On, 0.5, false, Some(600));
        let recent_off = at(10, 0, 0);
        let d = decide(&t, Some(recent_off), 5.0, false, recent_off + chrono::Duration::seconds(10));
        assert!(d.on, "explicit on mode must ignore any active grace window");

        t.mode = Mode::Off;
        let d2 = decide(&t, Some(recent_off), 30.0, true, recent_off + chrono::Duration::seconds(10));
        assert!(!d2.on);
    }
}
