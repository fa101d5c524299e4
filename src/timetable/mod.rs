//! The schedule data model: validation, mutation protocol, and the
//! hysteresis decision function.

mod decision;
pub mod document;
mod persistence;

pub use decision::{Decision, ThermodStatus};
pub use document::{
    HourSlots, Matrix, Mode, PartialMatrix, Scale, SettingsPatch, TemperatureAlias, Temperatures,
    TimeTableDocument,
};

use crate::time::{hour_key, Day};
use chrono::{DateTime, Local};
use std::path::{Path, PathBuf};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum TimeTableError {
    #[error("invalid syntax: {0}")]
    InvalidSyntax(String),
    #[error("invalid content: {0}")]
    InvalidContent(String),
    #[error("io error at {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },
}

/// Owns the schedule document plus the runtime grace-time bookkeeping that
/// sits alongside it. Exclusively owned by the daemon; every mutating method
/// here assumes the caller already holds the master lock.
pub struct TimeTable {
    doc: TimeTableDocument,
    last_off_time: Option<DateTime<Local>>,
    path: PathBuf,
}

impl TimeTable {
    /// Reads `path`, validates, and installs it as the live document.
    pub fn load(path: impl AsRef<Path>) -> Result<Self, TimeTableError> {
        let path = path.as_ref().to_path_buf();
        let doc = persistence::load(&path)?;
        validate(&doc)?;
        Ok(TimeTable {
            doc,
            last_off_time: None,
            path,
        })
    }

    /// Re-reads the backing file. On any failure the prior state is kept
    /// and the error is returned to the caller (typically the SIGHUP
    /// handler) to log.
    pub fn reload(&mut self) -> Result<(), TimeTableError> {
        let doc = persistence::load(&self.path)?;
        validate(&doc)?;
        self.doc = doc;
        Ok(())
    }

    /// Writes the current document atomically (write-to-temp + rename).
    pub fn save(&self) -> Result<(), TimeTableError> {
        persistence::save(&self.doc, &self.path)
    }

    pub fn document(&self) -> &TimeTableDocument {
        &self.doc
    }

    pub fn mode(&self) -> Mode {
        self.doc.mode
    }

    pub fn temperatures(&self) -> Temperatures {
        self.doc.temperatures
    }

    pub fn differential(&self) -> f64 {
        self.doc.differential
    }

    pub fn grace_time(&self) -> Option<u64> {
        self.doc.grace_time
    }

    pub fn cooling(&self) -> bool {
        self.doc.cooling
    }

    pub fn scale(&self) -> Scale {
        self.doc.scale
    }

    /// The pure decision function. Does not mutate `self`; an on->off
    /// transition reached via the hysteresis/grace path should be reported
    /// back with `note_switched_off` by the caller once the actuator has
    /// actually been switched off.
    pub fn should_the_heating_be_on(
        &self,
        current_temperature: f64,
        actuator_is_on: bool,
        now: DateTime<Local>,
    ) -> Decision {
        decision::decide(
            &self.doc,
            self.last_off_time,
            current_temperature,
            actuator_is_on,
            now,
        )
    }

    /// Returns whether the given decision, if acted on, should start a new
    /// grace-time window (an on->off transition reached via the
    /// hysteresis path, not an explicit mode change).
    pub fn is_threshold_transition(decision: &Decision) -> bool {
        decision.via_threshold
    }

    /// Records that the actuator was just switched off via the hysteresis
    /// path, starting the grace-time cooldown. Not persisted: this is
    /// runtime-only bookkeeping, not part of the schedule document.
    pub fn note_switched_off(&mut self, now: DateTime<Local>) {
        self.last_off_time = Some(now);
    }

    pub fn set_mode(&mut self, mode: Mode) -> Result<(), TimeTableError> {
        self.update(SettingsPatch {
            status: Some(mode),
            ..Default::default()
        })
    }

    pub fn set_differential(&mut self, differential: f64) -> Result<(), TimeTableError> {
        self.update(SettingsPatch {
            differential: Some(differential),
            ..Default::default()
        })
    }

    pub fn set_grace_time(&mut self, grace_time: Option<u64>) -> Result<(), TimeTableError> {
        self.update(SettingsPatch {
            grace_time: Some(grace_time),
            ..Default::default()
        })
    }

    pub fn set_cell(
        &mut self,
        day: Day,
        hour: u32,
        quarter: usize,
        alias: TemperatureAlias,
    ) -> Result<(), TimeTableError> {
        let mut slots = self
            .doc
            .timetable
            .get(&day)
            .and_then(|hours| hours.get(&hour_key(hour)))
            .copied()
            .ok_or_else(|| TimeTableError::InvalidContent(format!("no such slot {day} {hour}")))?;
        slots[quarter] = alias;
        let mut hours = std::collections::HashMap::new();
        hours.insert(hour_key(hour), slots);
        let mut timetable = PartialMatrix::new();
        timetable.insert(day, hours);
        self.update(SettingsPatch {
            timetable: Some(timetable),
            ..Default::default()
        })
    }

    /// Applies a partial update transactionally: the merged candidate is
    /// validated and persisted before it replaces the live document; on any
    /// failure the live document is untouched.
    pub fn update(&mut self, patch: SettingsPatch) -> Result<(), TimeTableError> {
        let mut candidate = self.doc.clone();

        if let Some(mode) = patch.status {
            candidate.mode = mode;
        }
        if let Some(temps) = patch.temperatures {
            if let Some(v) = temps.tmax {
                candidate.temperatures.tmax = v;
            }
            if let Some(v) = temps.tmin {
                candidate.temperatures.tmin = v;
            }
            if let Some(v) = temps.t0 {
                candidate.temperatures.t0 = v;
            }
        }
        if let Some(d) = patch.differential {
            candidate.differential = d;
        }
        if let Some(g) = patch.grace_time {
            candidate.grace_time = g;
        }
        if let Some(partial) = patch.timetable {
            merge_matrix(&mut candidate.timetable, partial);
        }

        validate(&candidate)?;
        persistence::save(&candidate, &self.path)?;
        self.doc = candidate;
        Ok(())
    }
}

fn merge_matrix(target: &mut Matrix, partial: PartialMatrix) {
    for (day, hours) in partial {
        let entry = target.entry(day).or_default();
        for (hour, slots) in hours {
            entry.insert(hour, slots);
        }
    }
}

/// Schema and semantic validation run before a candidate document replaces
/// the live one.
fn validate(doc: &TimeTableDocument) -> Result<(), TimeTableError> {
    if doc.temperatures.tmin > doc.temperatures.tmax {
        return Err(TimeTableError::InvalidContent(format!(
            "tmin ({}) must be <= tmax ({})",
            doc.temperatures.tmin, doc.temperatures.tmax
        )));
    }
    if !(0.0..=1.0).contains(&doc.differential) {
        return Err(TimeTableError::InvalidContent(format!(
            "differential ({}) must be within [0, 1]",
            doc.differential
        )));
    }
    if doc.temperatures.t0 > doc.temperatures.tmin {
        tracing::warn!(
            t0 = doc.temperatures.t0,
            tmin = doc.temperatures.tmin,
            "t0 is above tmin; frost protection will engage above the minimum comfort setpoint"
        );
    }

    if doc.timetable.len() != 7 {
        return Err(TimeTableError::InvalidContent(format!(
            "timetable must cover all 7 days, found {}",
            doc.timetable.len()
        )));
    }
    for day in Day::ALL {
        let hours = doc.timetable.get(&day).ok_or_else(|| {
            TimeTableError::InvalidContent(format!("timetable missing day '{day}'"))
        })?;
        if hours.len() != 24 {
            return Err(TimeTableError::InvalidContent(format!(
                "'{day}' must have 24 hours, found {}",
                hours.len()
            )));
        }
        for h in 0..24 {
            let key = hour_key(h);
            if !hours.contains_key(&key) {
                return Err(TimeTableError::InvalidContent(format!(
                    "'{day}' is missing hour '{key}'"
                )));
            }
        }
    }
    Ok(())
}
