// Platform provider abstraction

pub mod launchd;
pub mod models;
pub mod runner;
pub mod systemd;
pub mod win32;

pub use models::{
    ControlAction, ControlResult, ListFilters, ProviderKind, ServiceRecord, ServiceStatus,
};
pub use runner::{CmdOutput, CommandRunner, SystemRunner};

use crate::error::{Result, SvcdeckError};
use launchd::LaunchdProvider;
use std::sync::Arc;
use systemd::SystemdProvider;
use win32::Win32Provider;

/// The active platform provider, bound once at startup.
///
/// A tagged variant rather than trait objects so all three platforms are
/// compile-time enumerable and every dispatch site is exhaustive.
pub enum PlatformProvider {
    Systemd(SystemdProvider),
    Launchd(LaunchdProvider),
    Win32(Win32Provider),
}

impl std::fmt::Debug for PlatformProvider {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            PlatformProvider::Systemd(_) => f.write_str("Systemd"),
            PlatformProvider::Launchd(_) => f.write_str("Launchd"),
            PlatformProvider::Win32(_) => f.write_str("Win32"),
        }
    }
}

impl PlatformProvider {
    /// Bind the provider for the host platform
    pub fn detect(runner: Arc<dyn CommandRunner>) -> Result<Self> {
        Self::for_os(std::env::consts::OS, runner)
    }

    pub fn for_os(os: &str, runner: Arc<dyn CommandRunner>) -> Result<Self> {
        match os {
            "linux" => Ok(PlatformProvider::Systemd(SystemdProvider::new(runner))),
            "macos" => Ok(PlatformProvider::Launchd(LaunchdProvider::new(runner))),
            "windows" => Ok(PlatformProvider::Win32(Win32Provider::new(runner))),
            other => Err(SvcdeckError::ManagerUnavailable(format!(
                "no service manager provider for platform '{}'",
                other
            ))
            .into()),
        }
    }

    pub fn kind(&self) -> ProviderKind {
        match self {
            PlatformProvider::Systemd(_) => ProviderKind::Systemd,
            PlatformProvider::Launchd(_) => ProviderKind::Launchd,
            PlatformProvider::Win32(_) => ProviderKind::Win32Service,
        }
    }

    /// List services, filtered and sorted by name ascending
    pub async fn list(&self, filters: &ListFilters) -> Result<Vec<ServiceRecord>> {
        let records = match self {
            PlatformProvider::Systemd(p) => p.list().await?,
            PlatformProvider::Launchd(p) => p.list().await?,
            PlatformProvider::Win32(p) => p.list().await?,
        };
        Ok(filters.apply(records))
    }

    pub async fn control(&self, id: &str, action: ControlAction) -> Result<ControlResult> {
        match self {
            PlatformProvider::Systemd(p) => p.control(id, action).await,
            PlatformProvider::Launchd(p) => p.control(id, action).await,
            PlatformProvider::Win32(p) => p.control(id, action).await,
        }
    }

    pub async fn details(&self, id: &str) -> Result<Option<ServiceRecord>> {
        match self {
            PlatformProvider::Systemd(p) => p.details(id).await,
            PlatformProvider::Launchd(p) => p.details(id).await,
            PlatformProvider::Win32(p) => p.details(id).await,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::provider::runner::MockCommandRunner;

    #[test]
    fn binds_provider_per_platform() {
        let runner = || Arc::new(MockCommandRunner::new()) as Arc<dyn CommandRunner>;

        let provider = PlatformProvider::for_os("linux", runner()).unwrap();
        assert_eq!(provider.kind(), ProviderKind::Systemd);

        let provider = PlatformProvider::for_os("macos", runner()).unwrap();
        assert_eq!(provider.kind(), ProviderKind::Launchd);

        let provider = PlatformProvider::for_os("windows", runner()).unwrap();
        assert_eq!(provider.kind(), ProviderKind::Win32Service);
    }

    #[test]
    fn unsupported_platform_names_the_host() {
        let runner = Arc::new(MockCommandRunner::new());
        let err = PlatformProvider::for_os("freebsd", runner).unwrap_err();
        assert!(err.to_string().contains("freebsd"));
    }
}
