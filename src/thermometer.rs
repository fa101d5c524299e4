//! Thermometer capability: a single operation, read the current temperature
//! in the configured scale. Concrete drivers (script, 1-Wire, analog) and
//! decorators (scale adapter, outlier filter, moving average) each implement
//! or wrap this trait; the rest of the daemon only ever sees the trait.

use async_trait::async_trait;
use std::collections::VecDeque;
use std::process::Stdio;
use std::sync::Mutex;
use thiserror::Error;
use tokio::process::Command;

#[derive(Debug, Error)]
pub enum ThermometerError {
    #[error("script {path} exited with status {status}")]
    ScriptFailed { path: String, status: i32 },
    #[error("script {path} produced unparseable output: {raw}")]
    UnparseableOutput { path: String, raw: String },
    #[error("io error reading thermometer: {0}")]
    Io(#[from] std::io::Error),
    #[error("no samples available")]
    NoSamples,
}

#[async_trait]
pub trait Thermometer: Send + Sync {
    /// Read the current temperature, in the configured scale.
    async fn read(&self) -> Result<f64, ThermometerError>;
}

/// Drives an external script (the "script" driver named in
/// out-of-scope hardware list): runs it, parses stdout as a float.
pub struct ScriptThermometer {
    path: String,
}

impl ScriptThermometer {
    pub fn new(path: impl Into<String>) -> Self {
        ScriptThermometer { path: path.into() }
    }
}

#[async_trait]
impl Thermometer for ScriptThermometer {
    async fn read(&self) -> Result<f64, ThermometerError> {
        let output = Command::new(&self.path)
            .stdout(Stdio::piped())
            .stderr(Stdio::null())
            .output()
            .await?;

        if !output.status.success() {
            return Err(ThermometerError::ScriptFailed {
                path: self.path.clone(),
                status: output.status.code().unwrap_or(-1),
            });
        }

        let raw = String::from_utf8_lossy(&output.stdout);
        raw.trim()
            .parse::<f64>()
            .map_err(|_| ThermometerError::UnparseableOutput {
                path: self.path.clone(),
                raw: raw.trim().to_string(),
            })
    }
}

/// A thermometer with a fixed or externally-poked reading, used in tests and
/// as a manual-override driver.
pub struct FixedThermometer {
    value: Mutex<f64>,
}

impl FixedThermometer {
    pub fn new(value: f64) -> Self {
        FixedThermometer {
            value: Mutex::new(value),
        }
    }

    pub fn set(&self, value: f64) {
        *self.value.lock().expect("fixed thermometer poisoned") = value;
    }
}

#[async_trait]
impl Thermometer for FixedThermometer {
    async fn read(&self) -> Result<f64, ThermometerError> {
        Ok(*self.value.lock().expect("fixed thermometer poisoned"))
    }
}

/// Converts Fahrenheit readings from an inner thermometer into Celsius (or
/// vice versa is not needed — the daemon is configured for one scale and
/// drivers that read in the other scale are wrapped once at startup).
pub struct FahrenheitToCelsius<T> {
    inner: T,
}

impl<T> FahrenheitToCelsius<T> {
    pub fn new(inner: T) -> Self {
        FahrenheitToCelsius { inner }
    }
}

#[async_trait]
impl<T: Thermometer> Thermometer for FahrenheitToCelsius<T> {
    async fn read(&self) -> Result<f64, ThermometerError> {
        let f = self.inner.read().await?;
        Ok((f - 32.0) * 5.0 / 9.0)
    }
}

/// Rejects readings that jump more than `max_delta` from the previous
/// accepted reading, treating them as sensor glitches. The first reading is
/// always accepted.
pub struct OutlierFilter<T> {
    inner: T,
    max_delta: f64,
    last: Mutex<Option<f64>>,
}

impl<T> OutlierFilter<T> {
    pub fn new(inner: T, max_delta: f64) -> Self {
        OutlierFilter {
            inner,
            max_delta,
            last: Mutex::new(None),
        }
    }
}

#[async_trait]
impl<T: Thermometer> Thermometer for OutlierFilter<T> {
    async fn read(&self) -> Result<f64, ThermometerError> {
        let reading = self.inner.read().await?;
        let mut last = self.last.lock().expect("outlier filter poisoned");
        let accepted = match *last {
            Some(prev) if (reading - prev).abs() > self.max_delta => prev,
            _ => reading,
        };
        *last = Some(accepted);
        Ok(accepted)
    }
}

/// Smooths readings over a fixed-size window. `spawn_refresh` starts a
/// background task that keeps the window warm between reads, so `read`
/// itself never blocks on I/O for longer than the window's sampling
/// interval.
pub struct MovingAverage<T> {
    inner: std::sync::Arc<T>,
    window: Mutex<VecDeque<f64>>,
    capacity: usize,
}

impl<T: Thermometer + 'static> MovingAverage<T> {
    pub fn new(inner: std::sync::Arc<T>, capacity: usize) -> std::sync::Arc<Self> {
        std::sync::Arc::new(MovingAverage {
            inner,
            window: Mutex::new(VecDeque::with_capacity(capacity)),
            capacity: capacity.max(1),
        })
    }

    /// Starts the background sampling task; must be cancelled alongside the
    /// rest of the daemon's tasks on shutdown.
    pub fn spawn_refresh(
        self: &std::sync::Arc<Self>,
        period: std::time::Duration,
        mut shutdown: tokio::sync::watch::Receiver<bool>,
    ) -> tokio::task::JoinHandle<()> {
        let this = std::sync::Arc::clone(self);
        tokio::spawn(async move {
            let mut tick = tokio::time::interval(period);
            loop {
                tokio::select! {
                    _ = tick.tick() => {
                        if let Ok(sample) = this.inner.read().await {
                            let mut window = this.window.lock().expect("moving average poisoned");
                            if window.len() == this.capacity {
                                window.pop_front();
                            }
                            window.push_back(sample);
                        }
                    }
                    _ = shutdown.changed() => {
                        if *shutdown.borrow() {
                            return;
                        }
                    }
                }
            }
        })
    }
}

#[async_trait]
impl<T: Thermometer> Thermometer for MovingAverage<T> {
    async fn read(&self) -> Result<f64, ThermometerError> {
        let avg = {
            let window = self.window.lock().expect("moving average poisoned");
            if window.is_empty() {
                None
            } else {
                Some(window.iter().sum::<f64>() / window.len() as f64)
            }
        };
        match avg {
            Some(avg) => Ok(avg),
            None => self.inner.read().await,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn fixed_thermometer_reads_back_set_value() {
        let t = FixedThermometer::new(21.5);
        assert_eq!(t.read().await.unwrap(), 21.5);
        t.set(19.0);
        assert_eq!(t.read().await.unwrap(), 19.0);
    }

    #[tokio::test]
    async fn fahrenheit_adapter_converts() {
        let t = FahrenheitToCelsius::new(FixedThermometer::new(32.0));
        assert!((t.read().await.unwrap() - 0.0).abs() < 1e-9);
    }

    #[tokio::test]
    async fn outlier_filter_rejects_spike() {
        let inner = FixedThermometer::new(20.0);
        let filtered = OutlierFilter::new(inner, 2.0);
        assert_eq!(filtered.read().await.unwrap(), 20.0);
        filtered.inner.set(45.0);
        // jump of 25 exceeds max_delta of 2.0 -> previous value retained
        assert_eq!(filtered.read().await.unwrap(), 20.0);
        filtered.inner.set(21.0);
        assert_eq!(filtered.read().await.unwrap(), 21.0);
    }
}
