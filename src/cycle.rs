//! The control cycle: the periodic task that reconciles the actuator with
//! the decision and publishes status. Runs on a fixed interval but races an
//! external notification so settings edits take effect immediately instead
//! of waiting out the rest of the interval.

use crate::actuator::Actuator;
use crate::status::StatusPublisher;
use crate::thermometer::Thermometer;
use crate::time::Clock;
use crate::timetable::{ThermodStatus, TimeTable};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{Mutex, Notify};

/// Everything protected by the master lock: the schedule, both actuator
/// handles, and the enabled flag, guarded together as one unit.
pub struct Daemon {
    pub timetable: TimeTable,
    pub heating: Arc<dyn Actuator>,
    pub cooling: Arc<dyn Actuator>,
    pub enabled: bool,
}

impl Daemon {
    pub fn active_actuator(&self) -> &Arc<dyn Actuator> {
        if self.timetable.cooling() {
            &self.cooling
        } else {
            &self.heating
        }
    }
}

pub type SharedDaemon = Arc<Mutex<Daemon>>;

/// Paired with the master lock: notified whenever a mutating socket handler
/// commits a change, so the cycle re-evaluates before its timer elapses.
pub type MasterCondition = Arc<Notify>;

pub struct ControlCycle {
    daemon: SharedDaemon,
    condition: MasterCondition,
    thermometer: Arc<dyn Thermometer>,
    clock: Arc<dyn Clock>,
    status: StatusPublisher,
    interval: Duration,
    sleep_on_error: Duration,
}

impl ControlCycle {
    pub fn new(
        daemon: SharedDaemon,
        condition: MasterCondition,
        thermometer: Arc<dyn Thermometer>,
        clock: Arc<dyn Clock>,
        status: StatusPublisher,
        interval: Duration,
        sleep_on_error: Duration,
    ) -> Self {
        ControlCycle {
            daemon,
            condition,
            thermometer,
            clock,
            status,
            interval,
            sleep_on_error,
        }
    }

    /// Runs iterations until `Daemon::enabled` is observed false.
    pub async fn run(&self) {
        let mut woken_by_notify = true; // the first evaluation is unconditional
        loop {
            let sleep_for = self.iterate(woken_by_notify).await;
            let Some(sleep_for) = sleep_for else {
                break;
            };

            woken_by_notify = tokio::select! {
                _ = tokio::time::sleep(sleep_for) => false,
                _ = self.condition.notified() => true,
            };
        }
    }

    /// Runs a single iteration; returns `None` if shutdown was observed
    /// (caller should stop looping), otherwise the duration to sleep before
    /// the next one.
    async fn iterate(&self, woken_by_notify: bool) -> Option<Duration> {
        let mut guard = self.daemon.lock().await;
        if !guard.enabled {
            drop(guard);
            self.shutdown_actuators().await;
            return None;
        }

        let now = self.clock.now();
        let actuator = Arc::clone(guard.active_actuator());
        let mode = guard.timetable.mode();

        let reading = self.thermometer.read().await;
        let current_temperature = match reading {
            Ok(t) => t,
            Err(e) => {
                tracing::warn!(error = %e, "thermometer read failed");
                let status = ThermodStatus::error(now, mode, actuator.is_on(), e.to_string());
                self.status.publish(status);
                return Some(self.sleep_on_error);
            }
        };

        let decision = guard
            .timetable
            .should_the_heating_be_on(current_temperature, actuator.is_on(), now);

        let mut sleep_for = self.interval;
        if decision.on == actuator.is_on() {
            if woken_by_notify {
                tracing::info!(on = decision.on, "re-evaluated after notification, no change");
            } else {
                tracing::debug!(on = decision.on, "no change");
            }
        } else {
            let switch_result = if decision.on {
                actuator.switch_on().await
            } else {
                actuator.switch_off().await
            };

            match switch_result {
                Ok(()) => {
                    tracing::info!(on = decision.on, "actuator switched");
                    if !decision.on && TimeTable::is_threshold_transition(&decision) {
                        guard.timetable.note_switched_off(now);
                    }
                }
                Err(e) => {
                    tracing::error!(error = %e, "actuator switch failed");
                    let status = ThermodStatus::error(now, mode, actuator.is_on(), e.to_string());
                    self.status.publish(status);
                    sleep_for = self.sleep_on_error;
                }
            }
        }

        let mut final_status = decision.status;
        final_status.heating_status = actuator.is_on() as u8;
        self.status.publish(final_status);

        drop(guard);
        Some(sleep_for)
    }

    async fn shutdown_actuators(&self) {
        let guard = self.daemon.lock().await;
        if let Err(e) = guard.heating.switch_off().await {
            tracing::error!(error = %e, "failed to switch off heating actuator during shutdown");
        }
        if guard.timetable.cooling() {
            if let Err(e) = guard.cooling.switch_off().await {
                tracing::error!(error = %e, "failed to switch off cooling actuator during shutdown");
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::actuator::NullActuator;
    use crate::thermometer::FixedThermometer;
    use crate::time::FixedClock;
    use crate::timetable::{document::TimeTableDocument, Mode, SettingsPatch, TimeTable};
    use chrono::Local;

    fn daemon_with(doc: TimeTableDocument, path: &std::path::Path) -> SharedDaemon {
        std::fs::write(path, serde_json::to_string_pretty(&doc).unwrap()).unwrap();
        let timetable = TimeTable::load(path).unwrap();
        Arc::new(Mutex::new(Daemon {
            timetable,
            heating: Arc::new(NullActuator::new()),
            cooling: Arc::new(NullActuator::new()),
            enabled: true,
        }))
    }

    #[tokio::test]
    async fn iterate_switches_on_when_below_threshold() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("timetable.json");
        let mut doc = TimeTableDocument::default();
        doc.mode = Mode::Tmax;
        doc.temperatures.tmax = 22.0;
        doc.differential = 0.5;
        let daemon = daemon_with(doc, &path);

        let thermometer = Arc::new(FixedThermometer::new(21.0));
        let clock = Arc::new(FixedClock::new(Local::now()));
        let status = StatusPublisher::placeholder(Mode::Tmax);
        let cycle = ControlCycle::new(
            Arc::clone(&daemon),
            Arc::new(Notify::new()),
            thermometer,
            clock,
            status.clone(),
            Duration::from_secs(60),
            Duration::from_secs(5),
        );

        cycle.iterate(false).await;

        let guard = daemon.lock().await;
        assert!(guard.heating.is_on());
        assert_eq!(status.latest().heating_status, 1);
    }

    #[tokio::test]
    async fn notify_wakes_cycle_before_interval_elapses() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("timetable.json");
        let mut doc = TimeTableDocument::default();
        doc.mode = Mode::Off;
        let daemon = daemon_with(doc, &path);

        let thermometer = Arc::new(FixedThermometer::new(5.0));
        let clock = Arc::new(FixedClock::new(Local::now()));
        let status = StatusPublisher::placeholder(Mode::Off);
        let condition = Arc::new(Notify::new());
        let cycle = Arc::new(ControlCycle::new(
            Arc::clone(&daemon),
            Arc::clone(&condition),
            thermometer,
            clock,
            status.clone(),
            Duration::from_secs(3600), // would never fire within the test timeout
            Duration::from_secs(5),
        ));

        let runner = {
            let cycle = Arc::clone(&cycle);
            tokio::spawn(async move { cycle.run().await })
        };

        // Let the first (unconditional) iteration happen, then flip mode to
        // "on" the way a POST /settings handler would, and notify.
        tokio::time::sleep(Duration::from_millis(20)).await;
        {
            let mut guard = daemon.lock().await;
            guard
                .timetable
                .update(SettingsPatch {
                    status: Some(Mode::On),
                    ..Default::default()
                })
                .unwrap();
            guard.enabled = true;
        }
        condition.notify_one();

        tokio::time::timeout(Duration::from_secs(1), async {
            loop {
                if daemon.lock().await.heating.is_on() {
                    break;
                }
                tokio::time::sleep(Duration::from_millis(10)).await;
            }
        })
        .await
        .expect("notify should wake the cycle well before the 1-hour interval elapses");

        {
            let mut guard = daemon.lock().await;
            guard.enabled = false;
        }
        condition.notify_one();
        let _ = tokio::time::timeout(Duration::from_secs(1), runner).await;
    }
}
