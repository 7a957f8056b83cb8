// Health check manager: periodic sampling of monitored services and
// classification into health states

use crate::config::{HealthConfig, HealthConfigUpdate};
use crate::error::Result;
use crate::events::{HealthEvent, HealthState};
use crate::manager::ServiceManager;
use crate::provider::{ControlAction, ServiceStatus};
use chrono::{DateTime, Utc};
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use tokio::sync::broadcast;
use tokio::task::JoinHandle;

/// Health-tracking record owned exclusively by the manager, one per
/// monitored service id
#[derive(Debug, Clone)]
pub struct MonitoredService {
    pub service_id: String,
    pub service_name: String,
    pub expected_status: ServiceStatus,
    pub start_time: DateTime<Utc>,
    pub last_check: Option<DateTime<Utc>>,
    pub consecutive_failures: u32,
    pub consecutive_successes: u32,
    pub total_checks: u64,
    pub failure_count: u64,
    pub current_status: HealthState,
}

impl MonitoredService {
    fn new(service_id: String, service_name: String, expected_status: ServiceStatus) -> Self {
        Self {
            service_id,
            service_name,
            expected_status,
            start_time: Utc::now(),
            last_check: None,
            consecutive_failures: 0,
            consecutive_successes: 0,
            total_checks: 0,
            failure_count: 0,
            current_status: HealthState::Unknown,
        }
    }
}

/// Read-only derived view returned by `get_health_status`
#[derive(Debug, Clone, serde::Serialize)]
pub struct HealthSnapshot {
    pub service_id: String,
    pub service_name: String,
    pub current_status: HealthState,
    pub expected_status: ServiceStatus,
    pub consecutive_failures: u32,
    pub total_checks: u64,
    pub failure_count: u64,
    pub uptime_secs: i64,
    /// Percentage of checks that succeeded, 100.0 when no checks have run
    pub success_rate: f64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_check: Option<DateTime<Utc>>,
}

/// Insertion-ordered registry of monitored services
#[derive(Debug, Default)]
struct Registry {
    services: HashMap<String, MonitoredService>,
    order: Vec<String>,
}

impl Registry {
    fn insert_or_update(
        &mut self,
        id: &str,
        name: &str,
        expected: ServiceStatus,
    ) {
        if let Some(existing) = self.services.get_mut(id) {
            existing.service_name = name.to_string();
            existing.expected_status = expected;
        } else {
            self.order.push(id.to_string());
            self.services.insert(
                id.to_string(),
                MonitoredService::new(id.to_string(), name.to_string(), expected),
            );
        }
    }

    fn remove(&mut self, id: &str) -> bool {
        if self.services.remove(id).is_some() {
            self.order.retain(|k| k != id);
            true
        } else {
            false
        }
    }

    fn is_empty(&self) -> bool {
        self.services.is_empty()
    }

    fn snapshots(&self) -> Vec<HealthSnapshot> {
        self.order
            .iter()
            .filter_map(|id| self.services.get(id))
            .map(snapshot_of)
            .collect()
    }
}

fn snapshot_of(service: &MonitoredService) -> HealthSnapshot {
    let success_rate = if service.total_checks == 0 {
        100.0
    } else {
        let successes = service.total_checks.saturating_sub(service.failure_count);
        (successes as f64 / service.total_checks as f64) * 100.0
    };

    HealthSnapshot {
        service_id: service.service_id.clone(),
        service_name: service.service_name.clone(),
        current_status: service.current_status,
        expected_status: service.expected_status,
        consecutive_failures: service.consecutive_failures,
        total_checks: service.total_checks,
        failure_count: service.failure_count,
        uptime_secs: (Utc::now() - service.start_time).num_seconds(),
        success_rate,
        last_check: service.last_check,
    }
}

struct HealthInner {
    registry: Registry,
    config: HealthConfig,
}

/// Outcome of one sampled check, before it is applied to the registry
enum CheckOutcome {
    Success,
    Failure(String),
}

/// Maintains the monitored-service registry, runs the sampling loop, and
/// emits transition events.
#[derive(Clone)]
pub struct HealthCheckManager {
    manager: Arc<ServiceManager>,
    inner: Arc<Mutex<HealthInner>>,
    events: broadcast::Sender<HealthEvent>,
    loop_handle: Arc<Mutex<Option<JoinHandle<()>>>>,
}

impl HealthCheckManager {
    pub fn new(manager: Arc<ServiceManager>, config: HealthConfig) -> Self {
        let (events, _) = broadcast::channel(64);
        Self {
            manager,
            inner: Arc::new(Mutex::new(HealthInner {
                registry: Registry::default(),
                config,
            })),
            events,
            loop_handle: Arc::new(Mutex::new(None)),
        }
    }

    /// Subscribe to health transition events
    pub fn subscribe(&self) -> broadcast::Receiver<HealthEvent> {
        self.events.subscribe()
    }

    /// Register a service for monitoring, or update its name and expected
    /// status in place. Starts the sampling loop if it is not running.
    pub fn start_monitoring(
        &self,
        service_id: &str,
        service_name: &str,
        expected_status: Option<ServiceStatus>,
    ) {
        let enabled = {
            let mut inner = self.inner.lock().expect("health lock");
            inner.registry.insert_or_update(
                service_id,
                service_name,
                expected_status.unwrap_or(ServiceStatus::Active),
            );
            inner.config.enabled
        };
        tracing::info!("monitoring '{}'", service_id);

        if enabled {
            self.ensure_loop();
        }
    }

    /// Stop monitoring a service. Returns false when the id was not
    /// monitored; calling twice is safe. Stops the sampling loop when no
    /// services remain.
    pub fn stop_monitoring(&self, service_id: &str) -> bool {
        let (removed, now_empty) = {
            let mut inner = self.inner.lock().expect("health lock");
            let removed = inner.registry.remove(service_id);
            (removed, inner.registry.is_empty())
        };

        if removed {
            tracing::info!("stopped monitoring '{}'", service_id);
        }
        if now_empty {
            self.stop_loop();
        }
        removed
    }

    /// Derived, read-only snapshots for one or all monitored services
    pub fn get_health_status(&self, service_id: Option<&str>) -> Vec<HealthSnapshot> {
        let inner = self.inner.lock().expect("health lock");
        match service_id {
            Some(id) => inner
                .registry
                .services
                .get(id)
                .map(snapshot_of)
                .into_iter()
                .collect(),
            None => inner.registry.snapshots(),
        }
    }

    pub fn get_config(&self) -> HealthConfig {
        self.inner.lock().expect("health lock").config.clone()
    }

    /// Merge a partial config update. Disabling stops the loop without
    /// clearing registrations; re-enabling with registrations restarts it.
    pub fn update_config(&self, update: &HealthConfigUpdate) -> Result<HealthConfig> {
        let (merged, has_services) = {
            let mut inner = self.inner.lock().expect("health lock");
            let merged = inner.config.merged(update)?;
            inner.config = merged.clone();
            (merged, !inner.registry.is_empty())
        };

        // Restart the loop so an interval change takes effect
        self.stop_loop();
        if merged.enabled && has_services {
            self.ensure_loop();
        }
        Ok(merged)
    }

    /// Tear down: stop the loop and drop all monitored records
    pub fn shutdown(&self) {
        self.stop_loop();
        let mut inner = self.inner.lock().expect("health lock");
        inner.registry = Registry::default();
    }

    fn ensure_loop(&self) {
        let mut handle = self.loop_handle.lock().expect("loop handle lock");
        if handle.as_ref().map(|h| !h.is_finished()).unwrap_or(false) {
            return;
        }

        let this = self.clone();
        *handle = Some(tokio::spawn(async move {
            let interval = this.get_config().interval();
            tracing::info!("health sampling loop started ({:?} interval)", interval);
            let mut ticker = tokio::time::interval(interval);
            ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
            // The first tick fires immediately; skip it so registration
            // does not race the first sample
            ticker.tick().await;

            loop {
                ticker.tick().await;
                {
                    let inner = this.inner.lock().expect("health lock");
                    if inner.registry.is_empty() || !inner.config.enabled {
                        break;
                    }
                }
                this.run_checks().await;
            }
            tracing::info!("health sampling loop stopped");
        }));
    }

    fn stop_loop(&self) {
        let mut handle = self.loop_handle.lock().expect("loop handle lock");
        if let Some(handle) = handle.take() {
            handle.abort();
        }
    }

    /// One sampling tick: check every monitored service concurrently. One
    /// service's failure must not abort or delay another's check, so each
    /// future settles independently.
    pub async fn run_checks(&self) {
        let targets: Vec<(String, ServiceStatus)> = {
            let inner = self.inner.lock().expect("health lock");
            inner
                .registry
                .order
                .iter()
                .filter_map(|id| inner.registry.services.get(id))
                .map(|s| (s.service_id.clone(), s.expected_status))
                .collect()
        };

        let checks = targets.iter().map(|(id, expected)| {
            let expected = *expected;
            async move {
                let outcome = match self.manager.get_service_details(id).await {
                    Ok(Some(record)) => {
                        if record.status == expected {
                            CheckOutcome::Success
                        } else {
                            CheckOutcome::Failure(format!(
                                "expected {} but found {}",
                                expected, record.status
                            ))
                        }
                    }
                    Ok(None) => CheckOutcome::Failure("Service not found".to_string()),
                    Err(e) => CheckOutcome::Failure(e.to_string()),
                };
                (id.clone(), outcome)
            }
        });
        let outcomes = futures::future::join_all(checks).await;

        for (id, outcome) in outcomes {
            self.apply_outcome(&id, outcome).await;
        }
    }

    /// Apply a settled check to the registry, emit a transition event when
    /// the state changed, and trigger an auto-restart at the threshold.
    async fn apply_outcome(&self, service_id: &str, outcome: CheckOutcome) {
        let (transition, restart_due) = {
            let mut inner = self.inner.lock().expect("health lock");
            let threshold = inner.config.failure_threshold;
            let auto_restart = inner.config.auto_restart;
            let Some(service) = inner.registry.services.get_mut(service_id) else {
                // Unregistered while the check was in flight
                return;
            };

            service.last_check = Some(Utc::now());
            service.total_checks += 1;
            let previous = service.current_status;

            let (next, message, restart_due) = match outcome {
                CheckOutcome::Success => {
                    service.consecutive_successes += 1;
                    service.consecutive_failures = 0;
                    // Two consecutive successes to reach healthy; a single
                    // success from a bad state only lifts to degraded
                    let next = if service.consecutive_successes >= 2 {
                        HealthState::Healthy
                    } else if matches!(previous, HealthState::Degraded | HealthState::Unhealthy) {
                        HealthState::Degraded
                    } else {
                        previous
                    };
                    (next, None, false)
                }
                CheckOutcome::Failure(message) => {
                    service.consecutive_failures += 1;
                    service.consecutive_successes = 0;
                    service.failure_count += 1;
                    if service.consecutive_failures >= threshold {
                        let restart_due =
                            auto_restart && service.consecutive_failures == threshold;
                        (HealthState::Unhealthy, Some(message), restart_due)
                    } else {
                        (HealthState::Degraded, Some(message), false)
                    }
                }
            };

            service.current_status = next;
            let transition = (next != previous).then(|| HealthEvent {
                service_id: service.service_id.clone(),
                timestamp: Utc::now(),
                status: next,
                previous_status: previous,
                consecutive_failures: service.consecutive_failures,
                message,
            });
            (transition, restart_due)
        };

        if let Some(event) = transition {
            tracing::info!(
                "'{}' health {} -> {}",
                service_id,
                event.previous_status,
                event.status
            );
            // Send fails only when nobody is subscribed
            let _ = self.events.send(event);
        }

        if restart_due {
            self.auto_restart(service_id).await;
        }
    }

    /// Issue one restart for a service that just crossed the unhealthy
    /// threshold. Restart failures are logged, not escalated.
    async fn auto_restart(&self, service_id: &str) {
        tracing::warn!("auto-restarting unhealthy service '{}'", service_id);
        match self
            .manager
            .control_service(service_id, ControlAction::Restart)
            .await
        {
            Ok(_) => {
                let mut inner = self.inner.lock().expect("health lock");
                if let Some(service) = inner.registry.services.get_mut(service_id) {
                    service.consecutive_failures = 0;
                }
                tracing::info!("auto-restart of '{}' succeeded", service_id);
            }
            Err(e) => {
                tracing::warn!("auto-restart of '{}' failed: {}", service_id, e);
            }
        }
    }
}
