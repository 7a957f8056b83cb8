// Health transition events consumed by the presentation layer

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// The health classification of a monitored service, distinct from the raw
/// OS status
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum HealthState {
    Unknown,
    Healthy,
    Degraded,
    Unhealthy,
}

impl HealthState {
    pub fn label(&self) -> &'static str {
        match self {
            HealthState::Unknown => "unknown",
            HealthState::Healthy => "healthy",
            HealthState::Degraded => "degraded",
            HealthState::Unhealthy => "unhealthy",
        }
    }
}

impl std::fmt::Display for HealthState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.label())
    }
}

/// Emitted on every health state transition. Unchanged state produces no
/// event even if a check just ran.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HealthEvent {
    pub service_id: String,
    pub timestamp: DateTime<Utc>,
    pub status: HealthState,
    pub previous_status: HealthState,
    pub consecutive_failures: u32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}
