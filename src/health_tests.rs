#[cfg(test)]
mod tests {
    use crate::config::{Config, HealthConfig, HealthConfigUpdate};
    use crate::events::HealthState;
    use crate::health::HealthCheckManager;
    use crate::manager::ServiceManager;
    use crate::provider::runner::{ok_output, MockCommandRunner};
    use crate::provider::{PlatformProvider, ServiceStatus};
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::sync::Arc;

    const ACTIVE_BLOCK: &str = "\
Id=nginx.service
Description=A high performance web server
ActiveState=active
SubState=running
UnitFileState=enabled
MainPID=901
";

    const INACTIVE_BLOCK: &str = "\
Id=nginx.service
Description=A high performance web server
ActiveState=inactive
SubState=dead
UnitFileState=enabled
";

    const NOT_FOUND_BLOCK: &str = "\
Id=ghost.service
LoadState=not-found
ActiveState=inactive
SubState=dead
";

    fn health_with(runner: MockCommandRunner, health: HealthConfig) -> HealthCheckManager {
        let provider = PlatformProvider::for_os("linux", Arc::new(runner)).unwrap();
        let manager = Arc::new(ServiceManager::new(provider, Config::default()));
        HealthCheckManager::new(manager, health)
    }

    #[tokio::test]
    async fn recovery_requires_two_consecutive_successes() {
        let calls = Arc::new(AtomicU32::new(0));
        let calls_clone = calls.clone();

        let mut runner = MockCommandRunner::new();
        runner.expect_run().times(3).returning(move |_, _| {
            let call = calls_clone.fetch_add(1, Ordering::SeqCst);
            Box::pin(async move {
                if call == 0 {
                    Ok(ok_output(INACTIVE_BLOCK))
                } else {
                    Ok(ok_output(ACTIVE_BLOCK))
                }
            })
        });

        let health = health_with(runner, HealthConfig::default());
        let mut events = health.subscribe();
        health.start_monitoring("nginx.service", "nginx", None);

        // Failure: unknown -> degraded
        health.run_checks().await;
        let status = &health.get_health_status(Some("nginx.service"))[0];
        assert_eq!(status.current_status, HealthState::Degraded);

        // One success is not enough to be healthy again
        health.run_checks().await;
        let status = &health.get_health_status(Some("nginx.service"))[0];
        assert_eq!(status.current_status, HealthState::Degraded);

        // Second consecutive success completes the recovery
        health.run_checks().await;
        let status = &health.get_health_status(Some("nginx.service"))[0];
        assert_eq!(status.current_status, HealthState::Healthy);
        assert_eq!(status.total_checks, 3);
        assert_eq!(status.failure_count, 1);
        assert!((status.success_rate - 200.0 / 3.0).abs() < 0.01);

        // Only the two transitions produced events
        let first = events.try_recv().unwrap();
        assert_eq!(first.previous_status, HealthState::Unknown);
        assert_eq!(first.status, HealthState::Degraded);
        let second = events.try_recv().unwrap();
        assert_eq!(second.previous_status, HealthState::Degraded);
        assert_eq!(second.status, HealthState::Healthy);
        assert!(events.try_recv().is_err());
    }

    #[tokio::test]
    async fn threshold_triggers_single_auto_restart() {
        let mut runner = MockCommandRunner::new();
        runner
            .expect_run()
            .withf(|_, args| args.first().map(|a| a.as_str() == "restart").unwrap_or(false))
            .times(1)
            .returning(|_, _| Box::pin(async { Ok(ok_output("")) }));
        runner
            .expect_run()
            .withf(|_, args| args.first().map(|a| a.as_str() == "show").unwrap_or(false))
            .times(4)
            .returning(|_, _| Box::pin(async { Ok(ok_output(INACTIVE_BLOCK)) }));

        let mut config = HealthConfig::default();
        config.failure_threshold = 3;
        config.auto_restart = true;
        let health = health_with(runner, config);
        health.start_monitoring("nginx.service", "nginx", None);

        for _ in 0..2 {
            health.run_checks().await;
        }
        let status = &health.get_health_status(Some("nginx.service"))[0];
        assert_eq!(status.current_status, HealthState::Degraded);
        assert_eq!(status.consecutive_failures, 2);

        // Third failure crosses the threshold: unhealthy plus one restart,
        // and the restart resets the consecutive counter
        health.run_checks().await;
        let status = &health.get_health_status(Some("nginx.service"))[0];
        assert_eq!(status.current_status, HealthState::Unhealthy);
        assert_eq!(status.consecutive_failures, 0);
        assert_eq!(status.failure_count, 3);

        // A further failure degrades again but must not restart a second time
        health.run_checks().await;
        let status = &health.get_health_status(Some("nginx.service"))[0];
        assert_eq!(status.current_status, HealthState::Degraded);
        assert_eq!(status.consecutive_failures, 1);
    }

    #[tokio::test]
    async fn missing_service_counts_as_failure() {
        let mut runner = MockCommandRunner::new();
        runner
            .expect_run()
            .times(1)
            .returning(|_, _| Box::pin(async { Ok(ok_output(NOT_FOUND_BLOCK)) }));

        let health = health_with(runner, HealthConfig::default());
        let mut events = health.subscribe();
        health.start_monitoring("ghost.service", "ghost", None);

        health.run_checks().await;
        let status = &health.get_health_status(Some("ghost.service"))[0];
        assert_eq!(status.current_status, HealthState::Degraded);

        let event = events.try_recv().unwrap();
        assert_eq!(event.message.as_deref(), Some("Service not found"));
    }

    #[tokio::test]
    async fn expected_status_other_than_active_is_honored() {
        let mut runner = MockCommandRunner::new();
        runner
            .expect_run()
            .times(2)
            .returning(|_, _| Box::pin(async { Ok(ok_output(INACTIVE_BLOCK)) }));

        let health = health_with(runner, HealthConfig::default());
        health.start_monitoring("nginx.service", "nginx", Some(ServiceStatus::Inactive));

        health.run_checks().await;
        health.run_checks().await;
        let status = &health.get_health_status(Some("nginx.service"))[0];
        assert_eq!(status.current_status, HealthState::Healthy);
        assert_eq!(status.failure_count, 0);
    }

    #[tokio::test]
    async fn stop_monitoring_is_idempotent() {
        let runner = MockCommandRunner::new();
        let health = health_with(runner, HealthConfig::default());

        health.start_monitoring("nginx.service", "nginx", None);
        assert!(health.stop_monitoring("nginx.service"));
        assert!(!health.stop_monitoring("nginx.service"));
        assert!(health.get_health_status(None).is_empty());
    }

    #[tokio::test]
    async fn snapshots_keep_registration_order() {
        let runner = MockCommandRunner::new();
        let health = health_with(runner, HealthConfig::default());

        health.start_monitoring("b.service", "b", None);
        health.start_monitoring("a.service", "a", None);
        health.start_monitoring("b.service", "b renamed", None);

        let all = health.get_health_status(None);
        assert_eq!(all.len(), 2);
        assert_eq!(all[0].service_id, "b.service");
        assert_eq!(all[0].service_name, "b renamed");
        assert_eq!(all[1].service_id, "a.service");
        assert_eq!(all[0].current_status, HealthState::Unknown);
        assert!((all[0].success_rate - 100.0).abs() < f64::EPSILON);
    }

    #[tokio::test]
    async fn config_update_merges_and_validates() {
        let runner = MockCommandRunner::new();
        let health = health_with(runner, HealthConfig::default());

        let update = HealthConfigUpdate {
            interval_ms: Some(10_000),
            auto_restart: Some(true),
            ..Default::default()
        };
        let merged = health.update_config(&update).unwrap();
        assert_eq!(merged.interval_ms, 10_000);
        assert!(merged.auto_restart);
        assert_eq!(health.get_config().interval_ms, 10_000);

        let too_fast = HealthConfigUpdate {
            interval_ms: Some(100),
            ..Default::default()
        };
        assert!(health.update_config(&too_fast).is_err());
        // Rejected update leaves the config untouched
        assert_eq!(health.get_config().interval_ms, 10_000);
    }
}
