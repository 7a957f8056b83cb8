// Win32 service provider: CIM queries and control verbs through PowerShell

use crate::error::{Result, SvcdeckError};
use crate::provider::models::{
    ControlAction, ControlResult, ProviderKind, ServiceRecord, ServiceStatus,
};
use crate::provider::runner::CommandRunner;
use serde_json::Value;
use std::collections::BTreeMap;
use std::sync::Arc;

const QUERY_FIELDS: &str = "Name,DisplayName,Description,State,StartMode,PathName,ProcessId";

/// Case-insensitive State normalization
fn map_state(state: &str) -> ServiceStatus {
    match state.to_lowercase().as_str() {
        "running" => ServiceStatus::Active,
        "stopped" => ServiceStatus::Inactive,
        "start pending" => ServiceStatus::Activating,
        "stop pending" => ServiceStatus::Deactivating,
        _ => ServiceStatus::Unknown,
    }
}

/// Case-insensitive StartMode normalization; automatic/auto are the
/// enabled-equivalent, disabled is the disabled-equivalent.
fn map_start_mode(mode: &str) -> String {
    match mode.to_lowercase().as_str() {
        "auto" | "automatic" => "automatic".to_string(),
        "manual" => "manual".to_string(),
        "disabled" => "disabled".to_string(),
        "" => "unknown".to_string(),
        other => other.to_string(),
    }
}

/// Strip non-JSON banner lines that some PowerShell hosts prepend or append,
/// then re-parse. Returns None when no JSON payload can be recovered.
fn repair_json(raw: &str) -> Option<Value> {
    if let Ok(value) = serde_json::from_str::<Value>(raw) {
        return Some(value);
    }

    let start = raw.find(|c| c == '{' || c == '[')?;
    let end = raw.rfind(|c| c == '}' || c == ']')?;
    if end < start {
        return None;
    }
    serde_json::from_str(&raw[start..=end]).ok()
}

fn object_to_record(object: &Value) -> Option<ServiceRecord> {
    let name = object.get("Name")?.as_str()?.trim();
    if name.is_empty() {
        return None;
    }

    let text = |key: &str| -> String {
        object
            .get(key)
            .and_then(|v| v.as_str())
            .unwrap_or_default()
            .trim()
            .to_string()
    };

    let state = text("State");
    let status = map_state(&state);
    let startup_type = map_start_mode(&text("StartMode"));

    let display_name = text("DisplayName");
    let description = text("Description");
    let executable = match text("PathName") {
        path if path.is_empty() => None,
        path => Some(path),
    };
    let pid = object
        .get("ProcessId")
        .and_then(|v| v.as_u64())
        .map(|p| p as u32)
        .filter(|p| *p > 0);

    let mut raw = BTreeMap::new();
    for (key, value) in object.as_object()? {
        let rendered = match value {
            Value::String(s) => s.clone(),
            other => other.to_string(),
        };
        raw.insert(key.clone(), rendered);
    }

    Some(ServiceRecord::new(
        name.to_string(),
        if display_name.is_empty() {
            name.to_string()
        } else {
            display_name
        },
        description,
        status,
        state.to_lowercase(),
        startup_type,
        executable,
        None,
        pid,
        ProviderKind::Win32Service,
        raw,
    ))
}

/// Parse a CIM service query's JSON payload: either an array or, when a
/// single service matched, one bare object. Tool banner lines are stripped
/// before giving up on malformed input.
pub fn parse_cim_json(raw: &str) -> Vec<ServiceRecord> {
    let Some(value) = repair_json(raw) else {
        return Vec::new();
    };

    match value {
        Value::Array(objects) => objects.iter().filter_map(object_to_record).collect(),
        object @ Value::Object(_) => object_to_record(&object).into_iter().collect(),
        _ => Vec::new(),
    }
}

/// Escape a service identifier for interpolation into a single-quoted
/// PowerShell string: double embedded quotes, drop control characters and
/// shell metacharacters outright.
pub fn escape_identifier(id: &str) -> String {
    id.chars()
        .filter(|c| !c.is_control() && !matches!(c, ';' | '&' | '|' | '$' | '`' | '<' | '>' | '"'))
        .flat_map(|c| {
            if c == '\'' {
                vec!['\'', '\'']
            } else {
                vec![c]
            }
        })
        .collect()
}

/// Translate known failure text into specific, readable errors instead of
/// surfacing raw tool output.
fn translate_failure(id: &str, stderr: &str) -> anyhow::Error {
    let lower = stderr.to_lowercase();

    if lower.contains("cannot find any service") || lower.contains("could not be found") {
        SvcdeckError::NotFound(format!("service '{}' was not found", id)).into()
    } else if lower.contains("access is denied") || lower.contains("access denied") {
        SvcdeckError::Permission(format!(
            "controlling '{}' requires administrator rights",
            id
        ))
        .into()
    } else if lower.contains("already been started") || lower.contains("already running") {
        SvcdeckError::ServiceControl {
            service: id.to_string(),
            message: "service is already running".to_string(),
        }
        .into()
    } else if lower.contains("has not been started") || lower.contains("not started") {
        SvcdeckError::ServiceControl {
            service: id.to_string(),
            message: "service is not running".to_string(),
        }
        .into()
    } else if lower.contains("dependent") {
        SvcdeckError::ServiceControl {
            service: id.to_string(),
            message: "other services depend on this service; stop them first".to_string(),
        }
        .into()
    } else {
        SvcdeckError::ServiceControl {
            service: id.to_string(),
            message: stderr.trim().to_string(),
        }
        .into()
    }
}

/// Win32 service provider shelling out to PowerShell
pub struct Win32Provider {
    runner: Arc<dyn CommandRunner>,
}

impl Win32Provider {
    pub fn new(runner: Arc<dyn CommandRunner>) -> Self {
        Self { runner }
    }

    async fn run_powershell(&self, command: String) -> Result<crate::provider::runner::CmdOutput> {
        self.runner
            .run(
                "powershell".to_string(),
                vec![
                    "-NoProfile".to_string(),
                    "-NonInteractive".to_string(),
                    "-Command".to_string(),
                    command,
                ],
            )
            .await
    }

    pub async fn list(&self) -> Result<Vec<ServiceRecord>> {
        let command = format!(
            "Get-CimInstance -ClassName Win32_Service | Select-Object {} | ConvertTo-Json -Depth 2",
            QUERY_FIELDS
        );
        let output = self.run_powershell(command).await?;

        if !output.success() {
            return Err(SvcdeckError::ServiceInfo(format!(
                "CIM service query failed: {}",
                output.stderr.trim()
            ))
            .into());
        }

        Ok(parse_cim_json(&output.stdout))
    }

    pub async fn details(&self, id: &str) -> Result<Option<ServiceRecord>> {
        validate_service_name(id)?;

        let escaped = escape_identifier(id);
        let command = format!(
            "Get-CimInstance -ClassName Win32_Service -Filter \"Name='{}'\" | Select-Object {} | ConvertTo-Json -Depth 2",
            escaped, QUERY_FIELDS
        );
        let output = self.run_powershell(command).await?;

        if !output.success() {
            return Err(SvcdeckError::ServiceInfo(format!(
                "CIM service query for '{}' failed: {}",
                id,
                output.stderr.trim()
            ))
            .into());
        }

        Ok(parse_cim_json(&output.stdout).into_iter().next())
    }

    pub async fn control(&self, id: &str, action: ControlAction) -> Result<ControlResult> {
        validate_service_name(id)?;

        let escaped = escape_identifier(id);
        let command = match action {
            ControlAction::Start => format!("Start-Service -Name '{}'", escaped),
            ControlAction::Stop => format!("Stop-Service -Name '{}' -Force", escaped),
            ControlAction::Restart => format!("Restart-Service -Name '{}' -Force", escaped),
            ControlAction::Enable => {
                format!("Set-Service -Name '{}' -StartupType Automatic", escaped)
            }
            ControlAction::Disable => {
                format!("Set-Service -Name '{}' -StartupType Disabled", escaped)
            }
        };

        let output = self.run_powershell(command).await?;
        if output.success() {
            let mut result = ControlResult::new(action, id);
            result.stdout = Some(output.stdout);
            result.stderr = Some(output.stderr);
            Ok(result)
        } else {
            Err(translate_failure(id, &output.stderr))
        }
    }
}

fn validate_service_name(id: &str) -> Result<()> {
    if id.is_empty() {
        return Err(SvcdeckError::Validation("service name cannot be empty".into()).into());
    }
    if id.contains('\0') || id.len() > 256 {
        return Err(SvcdeckError::Validation("invalid service name format".into()).into());
    }
    Ok(())
}
