// Systemd provider: systemctl subprocess invocation and show-output parsing

use crate::error::{Result, SvcdeckError};
use crate::provider::models::{
    ControlAction, ControlResult, ProviderKind, ServiceRecord, ServiceStatus,
};
use crate::provider::runner::CommandRunner;
use std::collections::BTreeMap;
use std::sync::Arc;

const UNIT_SUFFIX: &str = ".service";

const SHOW_PROPERTIES: &str =
    "Id,Description,LoadState,ActiveState,SubState,UnitFileState,FragmentPath,ExecStart,MainPID";

/// Map ActiveState (with SubState available in the label) to normalized status
fn map_active_state(active_state: &str) -> ServiceStatus {
    match active_state {
        "active" => ServiceStatus::Active,
        "inactive" => ServiceStatus::Inactive,
        "failed" => ServiceStatus::Failed,
        "activating" => ServiceStatus::Activating,
        "deactivating" => ServiceStatus::Deactivating,
        _ => ServiceStatus::Unknown,
    }
}

/// Extract the executable path from an ExecStart value.
///
/// Systemd prints either a plain (possibly quoted) command line or the
/// structured `{ path=...; argv[]=...; ... }` form. Both reduce to the first
/// whitespace-delimited token of the cleaned value.
fn extract_exec_path(exec_start: &str) -> Option<String> {
    let trimmed = exec_start.trim();
    if trimmed.is_empty() {
        return None;
    }

    let cleaned = if trimmed.starts_with('{') {
        let inner = trimmed.trim_start_matches('{').trim_end_matches('}');
        let path_field = inner.split(';').find_map(|field| {
            let field = field.trim();
            field.strip_prefix("path=")
        })?;
        path_field.trim().to_string()
    } else {
        trimmed.trim_matches('"').trim_matches('\'').to_string()
    };

    cleaned
        .split_whitespace()
        .next()
        .map(|token| token.to_string())
}

/// Parse the multi-property block output of a bulk `systemctl show` query.
///
/// Blocks are separated by blank lines, each line is `Key=Value`. Only blocks
/// whose `Id` ends in the unit suffix are kept; blocks without a usable id
/// are skipped rather than emitted as garbage.
pub fn parse_show_output(raw: &str) -> Vec<ServiceRecord> {
    let mut records = Vec::new();

    for block in raw.split("\n\n") {
        let mut props: BTreeMap<String, String> = BTreeMap::new();
        for line in block.lines() {
            if let Some((key, value)) = line.split_once('=') {
                props.insert(key.trim().to_string(), value.trim().to_string());
            }
        }

        let id = match props.get("Id") {
            Some(id) if id.ends_with(UNIT_SUFFIX) => id.clone(),
            _ => continue,
        };

        let active_state = props.get("ActiveState").cloned().unwrap_or_default();
        let sub_state = props.get("SubState").cloned().unwrap_or_default();
        let status = map_active_state(&active_state);
        let status_label = if sub_state.is_empty() {
            active_state.to_lowercase()
        } else {
            format!("{} ({})", active_state.to_lowercase(), sub_state.to_lowercase())
        };

        let startup_type = match props.get("UnitFileState").map(|s| s.to_lowercase()) {
            Some(state) if !state.is_empty() => state,
            _ => "unknown".to_string(),
        };

        let executable = props.get("ExecStart").and_then(|v| extract_exec_path(v));

        let pid = props
            .get("MainPID")
            .and_then(|v| v.parse::<u32>().ok())
            .filter(|pid| *pid > 0);

        let name = id.trim_end_matches(UNIT_SUFFIX).to_string();
        let description = props.get("Description").cloned().unwrap_or_default();
        let locator = props
            .get("FragmentPath")
            .filter(|p| !p.is_empty())
            .cloned();

        records.push(ServiceRecord::new(
            id,
            name,
            description,
            status,
            status_label,
            startup_type,
            executable,
            locator,
            pid,
            ProviderKind::Systemd,
            props,
        ));
    }

    records
}

/// Systemd provider shelling out to systemctl
pub struct SystemdProvider {
    runner: Arc<dyn CommandRunner>,
}

impl SystemdProvider {
    pub fn new(runner: Arc<dyn CommandRunner>) -> Self {
        Self { runner }
    }

    /// List all service units via one bulk show query
    pub async fn list(&self) -> Result<Vec<ServiceRecord>> {
        let output = self
            .runner
            .run(
                "systemctl".to_string(),
                vec![
                    "show".to_string(),
                    "*.service".to_string(),
                    "--all".to_string(),
                    "--no-pager".to_string(),
                    format!("--property={}", SHOW_PROPERTIES),
                ],
            )
            .await?;

        if !output.success() && output.stdout.trim().is_empty() {
            return Err(SvcdeckError::ServiceInfo(format!(
                "systemctl show failed: {}",
                output.stderr.trim()
            ))
            .into());
        }

        Ok(parse_show_output(&output.stdout))
    }

    /// Fetch one unit's details; None when the unit does not exist
    pub async fn details(&self, id: &str) -> Result<Option<ServiceRecord>> {
        validate_unit_name(id)?;

        let output = self
            .runner
            .run(
                "systemctl".to_string(),
                vec![
                    "show".to_string(),
                    id.to_string(),
                    "--no-pager".to_string(),
                    format!("--property={}", SHOW_PROPERTIES),
                ],
            )
            .await?;

        if !output.success() {
            let stderr = output.stderr.to_lowercase();
            if stderr.contains("not found") || stderr.contains("not loaded") {
                return Ok(None);
            }
            return Err(SvcdeckError::ServiceInfo(format!(
                "systemctl show {} failed: {}",
                id,
                output.stderr.trim()
            ))
            .into());
        }

        let mut records = parse_show_output(&output.stdout);
        // A nonexistent unit still yields a block, with LoadState=not-found
        // and no UnitFileState; treat an inactive unknown shell as missing.
        if let Some(record) = records.first() {
            if record.raw.get("LoadState").map(|s| s.as_str()) == Some("not-found") {
                return Ok(None);
            }
        }
        Ok(records.pop())
    }

    /// Run a control verb, retrying once through pkexec on permission failure
    pub async fn control(&self, id: &str, action: ControlAction) -> Result<ControlResult> {
        validate_unit_name(id)?;

        let verb = action.label().to_string();
        let direct = self
            .runner
            .run("systemctl".to_string(), vec![verb.clone(), id.to_string()])
            .await;

        match direct {
            Ok(output) if output.success() => {
                let mut result = ControlResult::new(action, id);
                result.stdout = Some(output.stdout);
                result.stderr = Some(output.stderr);
                Ok(result)
            }
            Ok(output) if is_permission_denied(&output.stderr) => {
                tracing::info!("permission denied for {} {}, retrying elevated", verb, id);
                self.control_elevated(id, action).await
            }
            Ok(output) => Err(control_error(id, &output.stderr)),
            Err(e) => {
                if matches!(
                    e.downcast_ref::<SvcdeckError>(),
                    Some(SvcdeckError::Permission(_))
                ) {
                    tracing::info!("EACCES spawning systemctl, retrying elevated");
                    self.control_elevated(id, action).await
                } else {
                    Err(e)
                }
            }
        }
    }

    /// One-shot elevation retry through the polkit helper
    async fn control_elevated(&self, id: &str, action: ControlAction) -> Result<ControlResult> {
        let output = self
            .runner
            .run(
                "pkexec".to_string(),
                vec![
                    "systemctl".to_string(),
                    action.label().to_string(),
                    id.to_string(),
                ],
            )
            .await?;

        if output.success() {
            let mut result = ControlResult::new(action, id);
            result.elevated = true;
            result.stdout = Some(output.stdout);
            result.stderr = Some(output.stderr);
            Ok(result)
        } else {
            Err(SvcdeckError::Permission(format!(
                "elevated {} of '{}' failed: {}",
                action,
                id,
                output.stderr.trim()
            ))
            .into())
        }
    }
}

/// Permission-denied signatures in systemctl stderr
fn is_permission_denied(stderr: &str) -> bool {
    let stderr = stderr.to_lowercase();
    stderr.contains("access denied")
        || stderr.contains("permission denied")
        || stderr.contains("authentication is required")
        || stderr.contains("interactive authentication required")
}

fn control_error(id: &str, stderr: &str) -> anyhow::Error {
    let stderr_lower = stderr.to_lowercase();
    if stderr_lower.contains("not found") || stderr_lower.contains("not loaded") {
        SvcdeckError::NotFound(format!("unit '{}' was not found", id)).into()
    } else {
        SvcdeckError::ServiceControl {
            service: id.to_string(),
            message: stderr.trim().to_string(),
        }
        .into()
    }
}

/// Validate unit name format and prevent argument injection
fn validate_unit_name(id: &str) -> Result<()> {
    if id.is_empty() {
        return Err(SvcdeckError::Validation("unit name cannot be empty".into()).into());
    }
    if id.contains("..") || id.contains('\0') || id.contains('/') || id.len() > 256 {
        return Err(SvcdeckError::Validation("invalid unit name format".into()).into());
    }
    if id.starts_with('-') {
        return Err(SvcdeckError::Validation("unit name cannot start with '-'".into()).into());
    }
    Ok(())
}
