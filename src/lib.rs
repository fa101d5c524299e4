//! Thermod: a programmable thermostat daemon. The decision engine and its
//! runtime coordination (schedule, hysteresis, control cycle, control
//! socket) live here as a library so they're testable independently of the
//! CLI entry point in `main.rs`.

pub mod actuator;
pub mod config;
pub mod cycle;
pub mod error;
pub mod server;
pub mod signals;
pub mod status;
pub mod thermometer;
pub mod time;
pub mod timetable;
