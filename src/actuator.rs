//! Actuator capability: two idempotent switches and a query. Heating and
//! cooling each get an instance; a configuration alias can point both at the
//! same underlying relay when they share hardware.

use async_trait::async_trait;
use std::process::Stdio;
use std::sync::atomic::{AtomicBool, Ordering};
use thiserror::Error;
use tokio::process::Command;

#[derive(Debug, Error)]
pub enum ActuatorError {
    #[error("script {path} exited with status {status}")]
    ScriptFailed { path: String, status: i32 },
    #[error("io error driving actuator: {0}")]
    Io(#[from] std::io::Error),
}

#[async_trait]
pub trait Actuator: Send + Sync {
    async fn switch_on(&self) -> Result<(), ActuatorError>;
    async fn switch_off(&self) -> Result<(), ActuatorError>;
    fn is_on(&self) -> bool;
}

/// Drives an external script with `on`/`off` as its sole argument, the way
/// out-of-scope GPIO/relay drivers are expected to be wired up.
pub struct ScriptActuator {
    path: String,
    state: AtomicBool,
}

impl ScriptActuator {
    pub fn new(path: impl Into<String>) -> Self {
        ScriptActuator {
            path: path.into(),
            state: AtomicBool::new(false),
        }
    }

    async fn run(&self, arg: &str) -> Result<(), ActuatorError> {
        let status = Command::new(&self.path)
            .arg(arg)
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .status()
            .await?;
        if !status.success() {
            return Err(ActuatorError::ScriptFailed {
                path: self.path.clone(),
                status: status.code().unwrap_or(-1),
            });
        }
        Ok(())
    }
}

#[async_trait]
impl Actuator for ScriptActuator {
    async fn switch_on(&self) -> Result<(), ActuatorError> {
        self.run("on").await?;
        self.state.store(true, Ordering::SeqCst);
        Ok(())
    }

    async fn switch_off(&self) -> Result<(), ActuatorError> {
        self.run("off").await?;
        self.state.store(false, Ordering::SeqCst);
        Ok(())
    }

    fn is_on(&self) -> bool {
        self.state.load(Ordering::SeqCst)
    }
}

/// An in-memory actuator for tests and for a cooling alias that should never
/// actually be driven (cooling disabled).
#[derive(Default)]
pub struct NullActuator {
    state: AtomicBool,
}

impl NullActuator {
    pub fn new() -> Self {
        NullActuator {
            state: AtomicBool::new(false),
        }
    }
}

#[async_trait]
impl Actuator for NullActuator {
    async fn switch_on(&self) -> Result<(), ActuatorError> {
        self.state.store(true, Ordering::SeqCst);
        Ok(())
    }

    async fn switch_off(&self) -> Result<(), ActuatorError> {
        self.state.store(false, Ordering::SeqCst);
        Ok(())
    }

    fn is_on(&self) -> bool {
        self.state.load(Ordering::SeqCst)
    }
}
