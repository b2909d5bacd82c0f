use std::future::Future;
use std::sync::Arc;

use dashmap::DashMap;
use tracing::{debug, info};

use super::circuit_breaker::{CircuitBreaker, CircuitConfig};
use super::error::CallError;
use super::metrics::CircuitSnapshot;
use crate::config::Settings;

/// Owns one circuit per downstream dependency name.
///
/// Shared by handle (`Arc`) with every call site; tests build their own.
pub struct CircuitBreakerRegistry {
    circuits: DashMap<String, Arc<CircuitBreaker>>,
    defaults: CircuitConfig,
}

impl CircuitBreakerRegistry {
    pub fn new() -> Self {
        Self::with_defaults(CircuitConfig::default())
    }

    /// Circuits created lazily on first call use `defaults`
    pub fn with_defaults(defaults: CircuitConfig) -> Self {
        Self {
            circuits: DashMap::new(),
            defaults,
        }
    }

    /// Apply `config` to the circuit `name`, creating it if needed
    pub fn configure(&self, name: &str, config: CircuitConfig) -> Arc<CircuitBreaker> {
        let circuit = match self.circuits.get(name) {
            Some(existing) => {
                existing.reconfigure(config.clone());
                Arc::clone(existing.value())
            }
            None => Arc::clone(
                self.circuits
                    .entry(name.to_string())
                    .or_insert_with(|| Arc::new(CircuitBreaker::new(name, config.clone())))
                    .value(),
            ),
        };
        info!(circuit = %name, ?config, "Circuit settings applied");
        circuit
    }

    /// Configure every circuit in `names` from `circuit.<name>.*` settings
    pub fn configure_from_settings<S: AsRef<str>>(&self, names: &[S], settings: &Settings) {
        for name in names {
            let name = name.as_ref();
            self.configure(name, CircuitConfig::from_settings(name, settings));
        }
    }

    /// The circuit for `name`, created with the registry defaults on first use
    pub fn circuit(&self, name: &str) -> Arc<CircuitBreaker> {
        if let Some(existing) = self.circuits.get(name) {
            return Arc::clone(existing.value());
        }
        let entry = self.circuits.entry(name.to_string()).or_insert_with(|| {
            debug!(circuit = %name, "Creating circuit with default settings");
            Arc::new(CircuitBreaker::new(name, self.defaults.clone()))
        });
        Arc::clone(entry.value())
    }

    pub fn get(&self, name: &str) -> Option<Arc<CircuitBreaker>> {
        self.circuits.get(name).map(|c| Arc::clone(c.value()))
    }

    pub fn snapshot(&self, name: &str) -> Option<CircuitSnapshot> {
        self.get(name).map(|c| c.snapshot())
    }

    /// Snapshots of every circuit, sorted by name
    pub fn snapshots(&self) -> Vec<CircuitSnapshot> {
        let circuits: Vec<Arc<CircuitBreaker>> =
            self.circuits.iter().map(|c| Arc::clone(c.value())).collect();
        let mut snapshots: Vec<CircuitSnapshot> = circuits.iter().map(|c| c.snapshot()).collect();
        snapshots.sort_by(|a, b| a.name.cmp(&b.name));
        snapshots
    }

    pub fn len(&self) -> usize {
        self.circuits.len()
    }

    pub fn is_empty(&self) -> bool {
        self.circuits.is_empty()
    }

    /// Run `work` through the circuit `name`; any failure is handed to `fallback`.
    ///
    /// `fallback` may turn the error into a value or return it (possibly rewritten).
    pub async fn call<T, W, Fut, F>(&self, name: &str, work: W, fallback: F) -> Result<T, CallError>
    where
        W: FnOnce() -> Fut,
        Fut: Future<Output = Result<T, CallError>>,
        F: FnOnce(CallError) -> Result<T, CallError>,
    {
        let circuit = self.circuit(name);
        match circuit.execute(work).await {
            Ok(value) => Ok(value),
            Err(err) => fallback(err),
        }
    }
}

impl Default for CircuitBreakerRegistry {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::client::error::AttemptError;
    use crate::resilience::CircuitState;
    use std::time::Duration;

    fn failing_config() -> CircuitConfig {
        CircuitConfig {
            request_volume_threshold: 2,
            sleep_window: Duration::from_secs(60),
            ..CircuitConfig::default()
        }
    }

    #[test]
    fn test_one_circuit_per_name() {
        let registry = CircuitBreakerRegistry::new();
        let a = registry.circuit("quotes-service");
        let b = registry.circuit("quotes-service");

        assert!(Arc::ptr_eq(&a, &b));
        assert_eq!(registry.len(), 1);
        assert!(registry.get("account-to-image").is_none());
    }

    #[test]
    fn test_configure_overwrites_existing_circuit() {
        let registry = CircuitBreakerRegistry::new();
        let before = registry.circuit("quotes-service");
        let after = registry.configure("quotes-service", failing_config());

        assert!(Arc::ptr_eq(&before, &after));
        assert_eq!(after.config(), failing_config());
    }

    #[test]
    fn test_configure_from_settings() {
        let mut settings = Settings::new();
        settings.set("circuit.quotes-service.timeout_ms", "300");
        let registry = CircuitBreakerRegistry::new();

        registry.configure_from_settings(&["quotes-service", "account-to-image"], &settings);

        assert_eq!(registry.len(), 2);
        let quotes = registry.get("quotes-service").unwrap();
        assert_eq!(quotes.config().timeout, Duration::from_millis(300));
        let images = registry.get("account-to-image").unwrap();
        assert_eq!(images.config(), CircuitConfig::default());
    }

    #[tokio::test]
    async fn test_call_uses_fallback_on_failure() {
        let registry = CircuitBreakerRegistry::new();

        let value = registry
            .call(
                "quotes-service",
                || async { Err(CallError::from_attempts(3, AttemptError::Status(503))) },
                |_err| Ok("fallback"),
            )
            .await;

        assert_eq!(value.unwrap(), "fallback");
        let snapshot = registry.snapshot("quotes-service").unwrap();
        assert_eq!(snapshot.error_count, 1);
    }

    #[tokio::test]
    async fn test_call_isolates_circuits() {
        let registry = CircuitBreakerRegistry::new();
        registry.configure("quotes-service", failing_config());

        for _ in 0..2 {
            let _ = registry
                .call(
                    "quotes-service",
                    || async { Err::<(), _>(CallError::from_attempts(3, AttemptError::Status(500))) },
                    Err,
                )
                .await;
        }

        let open = registry
            .call("quotes-service", || async { Ok::<_, CallError>(1) }, Err)
            .await;
        assert!(matches!(open, Err(CallError::CircuitOpen { .. })));

        let other = registry
            .call("account-to-image", || async { Ok::<_, CallError>(2) }, Err)
            .await;
        assert_eq!(other.unwrap(), 2);

        let snapshots = registry.snapshots();
        assert_eq!(snapshots.len(), 2);
        assert_eq!(snapshots[0].name, "account-to-image");
        assert_eq!(snapshots[0].state, CircuitState::Closed);
        assert_eq!(snapshots[1].name, "quotes-service");
        assert_eq!(snapshots[1].state, CircuitState::Open);
    }
}
