use poem_openapi::{payload::Json, ApiResponse, OpenApi};
use std::sync::Arc;

use crate::resilience::{CircuitBreakerRegistry, CircuitState};

pub struct HealthApi {
    registry: Arc<CircuitBreakerRegistry>,
    service: String,
    address: String,
}

impl HealthApi {
    pub fn new(
        registry: Arc<CircuitBreakerRegistry>,
        service: impl Into<String>,
        address: impl Into<String>,
    ) -> Self {
        Self {
            registry,
            service: service.into(),
            address: address.into(),
        }
    }
}

/// Detailed health check response
#[derive(Debug, Clone, serde::Serialize, serde::Deserialize, poem_openapi::Object)]
pub struct HealthStatus {
    pub status: String,
    pub service: String,
    pub version: String,
    pub address: String,
    pub timestamp: String,
    pub open_circuits: Vec<String>,
}

#[derive(ApiResponse)]
pub enum HealthResponse {
    #[oai(status = 200)]
    Ok(Json<HealthStatus>),

    #[oai(status = 503)]
    ServiceUnavailable(Json<HealthStatus>),
}

#[OpenApi]
impl HealthApi {
    /// Health check endpoint
    ///
    /// Reports DEGRADED while any circuit is open.
    #[oai(path = "/health", method = "get")]
    async fn health(&self) -> HealthResponse {
        let open_circuits: Vec<String> = self
            .registry
            .snapshots()
            .into_iter()
            .filter(|s| s.state == CircuitState::Open)
            .map(|s| s.name)
            .collect();

        let health = HealthStatus {
            status: if open_circuits.is_empty() { "UP" } else { "DEGRADED" }.to_string(),
            service: self.service.clone(),
            version: env!("CARGO_PKG_VERSION").to_string(),
            address: self.address.clone(),
            timestamp: chrono::Utc::now().to_rfc3339(),
            open_circuits,
        };

        if health.open_circuits.is_empty() {
            HealthResponse::Ok(Json(health))
        } else {
            HealthResponse::ServiceUnavailable(Json(health))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::resilience::{CircuitConfig, Outcome};

    #[tokio::test]
    async fn test_health_up_without_open_circuits() {
        let registry = Arc::new(CircuitBreakerRegistry::new());
        registry.circuit("quotes-service");
        let api = HealthApi::new(registry, "accountservice", "10.0.0.3");

        match api.health().await {
            HealthResponse::Ok(Json(health)) => {
                assert_eq!(health.status, "UP");
                assert_eq!(health.service, "accountservice");
                assert_eq!(health.address, "10.0.0.3");
                assert!(health.open_circuits.is_empty());
            }
            _ => panic!("Expected Ok response"),
        }
    }

    #[tokio::test]
    async fn test_health_degraded_with_open_circuit() {
        let registry = Arc::new(CircuitBreakerRegistry::new());
        let circuit = registry.configure(
            "quotes-service",
            CircuitConfig {
                request_volume_threshold: 1,
                ..CircuitConfig::default()
            },
        );
        circuit.admit().unwrap().finish(Outcome::Failure);
        let api = HealthApi::new(registry, "accountservice", "10.0.0.3");

        match api.health().await {
            HealthResponse::ServiceUnavailable(Json(health)) => {
                assert_eq!(health.status, "DEGRADED");
                assert_eq!(health.open_circuits, vec!["quotes-service".to_string()]);
            }
            _ => panic!("Expected ServiceUnavailable response"),
        }
    }
}
