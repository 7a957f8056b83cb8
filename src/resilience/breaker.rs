// Circuit breaker guarding the subprocess-backed control path

use crate::error::{Result, SvcdeckError};
use std::sync::Mutex;
use std::time::{Duration, Instant};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CircuitState {
    Closed,
    Open,
    HalfOpen,
}

#[derive(Debug)]
struct BreakerInner {
    state: CircuitState,
    failure_count: u32,
    last_failure: Option<Instant>,
    /// Set while the single half-open probe is in flight
    probing: bool,
}

/// Stateful guard that stops hammering an unresponsive service manager with
/// repeated subprocess spawns.
///
/// CLOSED admits all calls; reaching the failure threshold opens the
/// circuit. While OPEN, calls are rejected immediately until the cool-down
/// elapses, at which point exactly one probe is allowed through; its success
/// closes the circuit, its failure reopens it.
#[derive(Debug)]
pub struct CircuitBreaker {
    failure_threshold: u32,
    cooldown: Duration,
    inner: Mutex<BreakerInner>,
}

impl CircuitBreaker {
    pub fn new(failure_threshold: u32, cooldown: Duration) -> Self {
        Self {
            failure_threshold: failure_threshold.max(1),
            cooldown,
            inner: Mutex::new(BreakerInner {
                state: CircuitState::Closed,
                failure_count: 0,
                last_failure: None,
                probing: false,
            }),
        }
    }

    /// Admit or reject a call. Must be paired with `record_success` or
    /// `record_failure` once the admitted call settles.
    pub fn check(&self) -> Result<()> {
        let mut inner = self.inner.lock().expect("breaker lock");

        match inner.state {
            CircuitState::Closed => Ok(()),
            CircuitState::Open => {
                let cooled_down = inner
                    .last_failure
                    .map(|at| at.elapsed() >= self.cooldown)
                    .unwrap_or(true);
                if cooled_down {
                    tracing::info!("circuit half-open, admitting one probe");
                    inner.state = CircuitState::HalfOpen;
                    inner.probing = true;
                    Ok(())
                } else {
                    Err(SvcdeckError::CircuitOpen(
                        "service manager calls suspended after repeated failures".to_string(),
                    )
                    .into())
                }
            }
            CircuitState::HalfOpen => {
                if inner.probing {
                    Err(SvcdeckError::CircuitOpen(
                        "probe already in flight, try again shortly".to_string(),
                    )
                    .into())
                } else {
                    inner.probing = true;
                    Ok(())
                }
            }
        }
    }

    pub fn record_success(&self) {
        let mut inner = self.inner.lock().expect("breaker lock");
        if inner.state != CircuitState::Closed {
            tracing::info!("circuit closed after successful probe");
        }
        inner.state = CircuitState::Closed;
        inner.failure_count = 0;
        inner.probing = false;
    }

    pub fn record_failure(&self) {
        let mut inner = self.inner.lock().expect("breaker lock");
        inner.last_failure = Some(Instant::now());
        inner.probing = false;

        match inner.state {
            CircuitState::HalfOpen => {
                tracing::warn!("probe failed, circuit reopened");
                inner.state = CircuitState::Open;
            }
            _ => {
                inner.failure_count += 1;
                if inner.failure_count >= self.failure_threshold {
                    tracing::warn!(
                        "circuit opened after {} consecutive failures",
                        inner.failure_count
                    );
                    inner.state = CircuitState::Open;
                }
            }
        }
    }

    pub fn state(&self) -> CircuitState {
        self.inner.lock().expect("breaker lock").state
    }
}
