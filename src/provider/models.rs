// Normalized service data models shared by all platform providers

use crate::error::{Result, SvcdeckError};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

/// Which platform provider produced a record
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ProviderKind {
    Systemd,
    Launchd,
    Win32Service,
}

impl ProviderKind {
    pub fn label(&self) -> &'static str {
        match self {
            ProviderKind::Systemd => "systemd",
            ProviderKind::Launchd => "launchd",
            ProviderKind::Win32Service => "win32-service",
        }
    }
}

impl fmt::Display for ProviderKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// Normalized service status
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ServiceStatus {
    Active,
    Inactive,
    Failed,
    Activating,
    Deactivating,
    Unknown,
}

impl ServiceStatus {
    /// Running or on its way up; controls like stop/restart apply
    pub fn is_active_like(&self) -> bool {
        matches!(self, ServiceStatus::Active | ServiceStatus::Activating)
    }

    pub fn label(&self) -> &'static str {
        match self {
            ServiceStatus::Active => "active",
            ServiceStatus::Inactive => "inactive",
            ServiceStatus::Failed => "failed",
            ServiceStatus::Activating => "activating",
            ServiceStatus::Deactivating => "deactivating",
            ServiceStatus::Unknown => "unknown",
        }
    }
}

impl fmt::Display for ServiceStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

impl FromStr for ServiceStatus {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_lowercase().as_str() {
            "active" | "running" => Ok(ServiceStatus::Active),
            "inactive" | "stopped" => Ok(ServiceStatus::Inactive),
            "failed" => Ok(ServiceStatus::Failed),
            "activating" => Ok(ServiceStatus::Activating),
            "deactivating" => Ok(ServiceStatus::Deactivating),
            "unknown" => Ok(ServiceStatus::Unknown),
            other => Err(SvcdeckError::Validation(format!("unknown status '{}'", other)).into()),
        }
    }
}

/// Control actions accepted by every provider
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ControlAction {
    Start,
    Stop,
    Restart,
    Enable,
    Disable,
}

impl ControlAction {
    pub fn label(&self) -> &'static str {
        match self {
            ControlAction::Start => "start",
            ControlAction::Stop => "stop",
            ControlAction::Restart => "restart",
            ControlAction::Enable => "enable",
            ControlAction::Disable => "disable",
        }
    }
}

impl fmt::Display for ControlAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

impl FromStr for ControlAction {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_lowercase().as_str() {
            "start" => Ok(ControlAction::Start),
            "stop" => Ok(ControlAction::Stop),
            "restart" => Ok(ControlAction::Restart),
            "enable" => Ok(ControlAction::Enable),
            "disable" => Ok(ControlAction::Disable),
            other => {
                Err(SvcdeckError::Validation(format!("unsupported action '{}'", other)).into())
            }
        }
    }
}

/// Normalized view of one OS-managed service.
///
/// Records are immutable value objects; a fresh record is produced on every
/// list/detail call. Capability flags are derived once at construction so they
/// always agree with `status` and `startup_type`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServiceRecord {
    pub id: String,
    pub name: String,
    pub description: String,
    pub status: ServiceStatus,
    /// Free-text platform detail, e.g. "active (running)"
    pub status_label: String,
    /// Free-text: enabled/disabled/automatic/manual/static/masked/unknown
    pub startup_type: String,
    pub executable: Option<String>,
    /// Platform-specific locator: unit file path or launchd domain
    pub locator: Option<String>,
    pub pid: Option<u32>,
    pub provider: ProviderKind,
    pub can_start: bool,
    pub can_stop: bool,
    pub can_restart: bool,
    pub can_enable: bool,
    pub can_disable: bool,
    /// Opaque original parsed fields, for diagnostics only
    pub raw: BTreeMap<String, String>,
}

impl ServiceRecord {
    /// Build a record, deriving capability flags from status and startup type
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        id: String,
        name: String,
        description: String,
        status: ServiceStatus,
        status_label: String,
        startup_type: String,
        executable: Option<String>,
        locator: Option<String>,
        pid: Option<u32>,
        provider: ProviderKind,
        raw: BTreeMap<String, String>,
    ) -> Self {
        let can_stop = status.is_active_like();
        let can_restart = status.is_active_like();
        let can_start = matches!(status, ServiceStatus::Inactive | ServiceStatus::Failed);

        // masked and static units are not independently toggleable
        let toggleable = !matches!(startup_type.as_str(), "masked" | "static");
        let enabled = matches!(startup_type.as_str(), "enabled" | "static" | "automatic" | "auto");
        let can_enable = toggleable && !enabled;
        let can_disable = toggleable && enabled;

        Self {
            id,
            name,
            description,
            status,
            status_label,
            startup_type,
            executable,
            locator,
            pid,
            provider,
            can_start,
            can_stop,
            can_restart,
            can_enable,
            can_disable,
            raw,
        }
    }
}

/// Outcome of a control action
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ControlResult {
    pub action: ControlAction,
    pub service_id: String,
    /// True when the action only succeeded through the elevation helper
    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    pub elevated: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub stdout: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub stderr: Option<String>,
    /// Launchd only: the domain the action resolved under
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub domain: Option<String>,
}

impl ControlResult {
    pub fn new(action: ControlAction, service_id: impl Into<String>) -> Self {
        Self {
            action,
            service_id: service_id.into(),
            elevated: false,
            stdout: None,
            stderr: None,
            domain: None,
        }
    }
}

/// List filters: case-insensitive substring search plus a status filter
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ListFilters {
    pub search: Option<String>,
    /// None means unfiltered ("all")
    pub status: Option<ServiceStatus>,
}

impl ListFilters {
    /// Canonical signature used as the list cache key
    pub fn signature(&self) -> String {
        format!(
            "list|search={}|status={}",
            self.search.as_deref().unwrap_or(""),
            self.status.map(|s| s.label()).unwrap_or("all"),
        )
    }

    fn matches(&self, record: &ServiceRecord) -> bool {
        if let Some(status) = self.status {
            if record.status != status {
                return false;
            }
        }
        if let Some(search) = &self.search {
            let needle = search.to_lowercase();
            if needle.is_empty() {
                return true;
            }
            let haystacks = [
                record.name.to_lowercase(),
                record.description.to_lowercase(),
                record
                    .executable
                    .as_deref()
                    .unwrap_or_default()
                    .to_lowercase(),
            ];
            return haystacks.iter().any(|h| h.contains(&needle));
        }
        true
    }

    /// Filter and sort records by name ascending
    pub fn apply(&self, records: Vec<ServiceRecord>) -> Vec<ServiceRecord> {
        let mut filtered: Vec<ServiceRecord> =
            records.into_iter().filter(|r| self.matches(r)).collect();
        filtered.sort_by(|a, b| a.name.cmp(&b.name));
        filtered
    }
}
