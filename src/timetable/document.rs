//! Wire and persistence types for the schedule: the shape exchanged over
//! `GET/POST /settings` and written to `timetable.json`. Full document and
//! partial-update (patch) shapes are kept separate types so a patch can
//! leave most fields untouched.

use crate::time::Day;
use serde::{Deserialize, Deserializer, Serialize};
use std::collections::HashMap;

/// The schedule's operating mode: automatic threshold-following, forced
/// on/off, or one of the named temperature targets used as a shorthand mode.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Mode {
    Auto,
    On,
    Off,
    Tmax,
    Tmin,
    T0,
}

/// The configured temperature scale. Conversion happens at the thermometer
/// boundary (`crate::thermometer::FahrenheitToCelsius`); the core only ever
/// sees numbers already in this scale.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Scale {
    Celsius,
    Fahrenheit,
}

/// A symbolic setpoint name, or a literal absolute temperature. Always
/// exchanged as a JSON string (`"tmax"`, `"tmin"`, `"t0"`, or `"21.5"`).
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum TemperatureAlias {
    Tmax,
    Tmin,
    T0,
    Literal(f64),
}

impl TemperatureAlias {
    pub fn resolve(&self, temperatures: &Temperatures) -> f64 {
        match self {
            TemperatureAlias::Tmax => temperatures.tmax,
            TemperatureAlias::Tmin => temperatures.tmin,
            TemperatureAlias::T0 => temperatures.t0,
            TemperatureAlias::Literal(v) => *v,
        }
    }
}

impl Serialize for TemperatureAlias {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        match self {
            TemperatureAlias::Tmax => serializer.serialize_str("tmax"),
            TemperatureAlias::Tmin => serializer.serialize_str("tmin"),
            TemperatureAlias::T0 => serializer.serialize_str("t0"),
            TemperatureAlias::Literal(v) => serializer.serialize_str(&v.to_string()),
        }
    }
}

impl<'de> Deserialize<'de> for TemperatureAlias {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        let raw = String::deserialize(deserializer)?;
        parse_alias(&raw).map_err(serde::de::Error::custom)
    }
}

pub fn parse_alias(raw: &str) -> Result<TemperatureAlias, String> {
    match raw {
        "tmax" => Ok(TemperatureAlias::Tmax),
        "tmin" => Ok(TemperatureAlias::Tmin),
        "t0" => Ok(TemperatureAlias::T0),
        other => other
            .parse::<f64>()
            .map(TemperatureAlias::Literal)
            .map_err(|_| format!("'{other}' is neither a known alias nor a number")),
    }
}

/// The absolute setpoints: `tmax`/`tmin`/`t0`.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Temperatures {
    pub tmax: f64,
    pub tmin: f64,
    pub t0: f64,
}

/// One quarter-hour slot's four targets for a given hour: `["tmax","tmax","tmin","tmin"]`.
pub type HourSlots = [TemperatureAlias; 4];

/// The full 7x24x4 schedule matrix, keyed the way the wire format shows:
/// day name -> `"h00"`.."h23" -> four quarter-hour targets.
pub type Matrix = HashMap<Day, HashMap<String, HourSlots>>;

/// The complete persisted/exchanged document: settings plus the matrix.
/// Shared by `timetable.json` and the full `GET /settings` response.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TimeTableDocument {
    #[serde(rename = "status")]
    pub mode: Mode,
    pub temperatures: Temperatures,
    pub differential: f64,
    pub grace_time: Option<u64>,
    pub scale: Scale,
    pub cooling: bool,
    pub timetable: Matrix,
}

/// Accepts a subset of the document's fields, applied transactionally.
/// `grace_time` distinguishes "absent" (leave as-is) from `null` (clear
/// grace time) from a concrete value, via `deserialize_some`.
#[derive(Debug, Clone, Deserialize, Default)]
#[serde(deny_unknown_fields)]
pub struct SettingsPatch {
    pub status: Option<Mode>,
    pub temperatures: Option<TemperaturesPatch>,
    pub differential: Option<f64>,
    #[serde(default, deserialize_with = "deserialize_some")]
    pub grace_time: Option<Option<u64>>,
    pub timetable: Option<PartialMatrix>,
}

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(deny_unknown_fields)]
pub struct TemperaturesPatch {
    pub tmax: Option<f64>,
    pub tmin: Option<f64>,
    pub t0: Option<f64>,
}

/// A partial matrix: any subset of days, and within a day any subset of
/// hours, each merged into the existing matrix rather than replacing it.
pub type PartialMatrix = HashMap<Day, HashMap<String, HourSlots>>;

/// Distinguishes a present-but-null JSON field from an absent one: wrapping
/// the target type in `Option` twice and mapping the inner `Deserialize` to
/// `Some` means "absent" only ever comes from `#[serde(default)]`.
fn deserialize_some<'de, D, T>(deserializer: D) -> Result<Option<T>, D::Error>
where
    T: Deserialize<'de>,
    D: Deserializer<'de>,
{
    T::deserialize(deserializer).map(Some)
}

impl Default for TimeTableDocument {
    fn default() -> Self {
        let mut timetable = Matrix::new();
        for day in Day::ALL {
            let mut hours = HashMap::new();
            for h in 0..24 {
                hours.insert(
                    crate::time::hour_key(h),
                    [
                        TemperatureAlias::T0,
                        TemperatureAlias::T0,
                        TemperatureAlias::T0,
                        TemperatureAlias::T0,
                    ],
                );
            }
            timetable.insert(day, hours);
        }
        TimeTableDocument {
            mode: Mode::Off,
            temperatures: Temperatures {
                tmax: 21.0,
                tmin: 17.0,
                t0: 7.0,
            },
            differential: 0.5,
            grace_time: None,
            scale: Scale::Celsius,
            cooling: false,
            timetable,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn alias_parses_named_and_literal() {
        assert_eq!(parse_alias("tmax").unwrap(), TemperatureAlias::Tmax);
        assert_eq!(parse_alias("21.5").unwrap(), TemperatureAlias::Literal(21.5));
        assert!(parse_alias("hot").is_err());
    }

    #[test]
    fn default_document_matrix_is_complete() {
        let doc = TimeTableDocument::default();
        assert_eq!(doc.timetable.len(), 7);
        for day in Day::ALL {
            assert_eq!(doc.timetable[&day].len(), 24);
        }
    }

    #[test]
    fn settings_patch_distinguishes_null_from_absent() {
        let absent: SettingsPatch = serde_json::from_str("{}").unwrap();
        assert_eq!(absent.grace_time, None);

        let explicit_null: SettingsPatch =
            serde_json::from_str(r#"{"grace_time": null}"#).unwrap();
        assert_eq!(explicit_null.grace_time, Some(None));

        let value: SettingsPatch = serde_json::from_str(r#"{"grace_time": 600}"#).unwrap();
        assert_eq!(value.grace_time, Some(Some(600)));
    }

    #[test]
    fn settings_patch_rejects_unknown_top_level_key() {
        let result: Result<SettingsPatch, _> = serde_json::from_str(r#"{"bogus": 1}"#);
        assert!(result.is_err());
    }
}
