// Service manager: composes the active provider with the resilience stack.
// This is the composition root; cache, breaker and limiter are owned here,
// created at startup and torn down with the manager.

use crate::config::Config;
use crate::error::{sanitize_message, ErrorCategory, Result, SvcdeckError};
use crate::provider::{
    ControlAction, ControlResult, ListFilters, PlatformProvider, ProviderKind, ServiceRecord,
};
use crate::resilience::{
    with_retry, with_timeout, CircuitBreaker, RateLimiter, RetryConfig, TtlCache,
};

pub struct ServiceManager {
    provider: PlatformProvider,
    config: Config,
    cache: TtlCache<Vec<ServiceRecord>>,
    breaker: CircuitBreaker,
    limiter: RateLimiter,
    retry: RetryConfig,
}

impl ServiceManager {
    pub fn new(provider: PlatformProvider, config: Config) -> Self {
        let cache = TtlCache::new(config.cache_max_entries);
        let breaker = CircuitBreaker::new(
            config.circuit_failure_threshold,
            config.circuit_cooldown(),
        );
        let limiter = RateLimiter::new(config.control_cooldown());

        Self {
            provider,
            config,
            cache,
            breaker,
            limiter,
            retry: RetryConfig::default(),
        }
    }

    pub fn provider_kind(&self) -> ProviderKind {
        self.provider.kind()
    }

    /// List services. Read path: expired sweep, cache lookup, circuit
    /// breaker, timeout-wrapped retry, provider call, cache store.
    pub async fn list_services(&self, filters: &ListFilters) -> Result<Vec<ServiceRecord>> {
        let ttl = self.config.cache_ttl();
        self.cache.clear_expired(ttl);

        let key = filters.signature();
        if let Some(records) = self.cache.get(&key, ttl) {
            tracing::debug!("serving '{}' from cache", key);
            return Ok(records);
        }

        self.breaker.check()?;

        let result = with_timeout(
            self.config.operation_timeout(),
            "listing services",
            with_retry(&self.retry, "list_services", || {
                self.provider.list(filters)
            }),
        )
        .await;

        match result {
            Ok(records) => {
                self.breaker.record_success();
                self.cache.set(&key, records.clone());
                Ok(records)
            }
            Err(e) => {
                self.settle_breaker(&e);
                Err(self.surface(e))
            }
        }
    }

    /// Control a service. Write path: validation, rate limiter, whole-cache
    /// invalidation, circuit breaker, timeout-wrapped provider call. No
    /// retry: a timed-out control may still complete in the background, so
    /// re-issuing it blindly is not safe.
    pub async fn control_service(&self, id: &str, action: ControlAction) -> Result<ControlResult> {
        if id.trim().is_empty() {
            return Err(SvcdeckError::Validation("service id cannot be empty".into()).into());
        }

        let limiter_key = format!("{}:{}", action.label(), id);
        if !self.limiter.is_allowed(&limiter_key) {
            return Err(SvcdeckError::RateLimited(format!(
                "{} of '{}' was attempted too recently",
                action, id
            ))
            .into());
        }

        // Any control action can change many list results
        self.cache.clear();

        self.breaker.check()?;

        let result = with_timeout(
            self.config.operation_timeout(),
            "controlling service",
            self.provider.control(id, action),
        )
        .await;

        match result {
            Ok(control) => {
                self.breaker.record_success();
                tracing::info!(
                    "{} of '{}' succeeded{}",
                    action,
                    id,
                    if control.elevated { " (elevated)" } else { "" }
                );
                Ok(control)
            }
            Err(e) => {
                self.settle_breaker(&e);
                Err(self.surface(e))
            }
        }
    }

    /// Fetch one service's details; None when the service does not exist.
    /// Uncached so the health sampling loop always observes fresh state.
    pub async fn get_service_details(&self, id: &str) -> Result<Option<ServiceRecord>> {
        if id.trim().is_empty() {
            return Err(SvcdeckError::Validation("service id cannot be empty".into()).into());
        }

        self.breaker.check()?;

        let result = with_timeout(
            self.config.operation_timeout(),
            "fetching service details",
            with_retry(&self.retry, "get_service_details", || {
                self.provider.details(id)
            }),
        )
        .await;

        match result {
            Ok(details) => {
                self.breaker.record_success();
                Ok(details)
            }
            Err(e) => {
                self.settle_breaker(&e);
                Err(self.surface(e))
            }
        }
    }

    /// Only failures that suggest an unresponsive manager trip the breaker.
    /// A permission or validation error means the manager answered.
    fn settle_breaker(&self, error: &anyhow::Error) {
        match ErrorCategory::classify(error) {
            ErrorCategory::Timeout | ErrorCategory::Network | ErrorCategory::Unknown => {
                self.breaker.record_failure()
            }
            _ => self.breaker.record_success(),
        }
    }

    /// Sanitize an error before it leaves the core, keeping the original in
    /// the chain so callers can still classify it.
    fn surface(&self, error: anyhow::Error) -> anyhow::Error {
        let category = ErrorCategory::classify(&error);
        let message = sanitize_message(&error.to_string());
        error.context(format!("{}: {}", category.label(), message))
    }
}
