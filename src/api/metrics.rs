use poem_openapi::{payload::Json, ApiResponse, OpenApi};
use std::sync::Arc;

use crate::resilience::{CircuitBreakerRegistry, CircuitSnapshot};

pub struct MetricsApi {
    registry: Arc<CircuitBreakerRegistry>,
}

impl MetricsApi {
    pub fn new(registry: Arc<CircuitBreakerRegistry>) -> Self {
        Self { registry }
    }
}

#[derive(Debug, Clone, serde::Serialize, serde::Deserialize, poem_openapi::Object)]
pub struct CircuitMetrics {
    pub name: String,
    pub state: String,
    pub success_count: u64,
    pub error_count: u64,
    pub request_count: u64,
    pub short_circuited: u64,
    pub error_percentage: u32,
}

impl From<CircuitSnapshot> for CircuitMetrics {
    fn from(snapshot: CircuitSnapshot) -> Self {
        Self {
            name: snapshot.name,
            state: snapshot.state.to_string(),
            success_count: snapshot.success_count,
            error_count: snapshot.error_count,
            request_count: snapshot.request_count,
            short_circuited: snapshot.short_circuited,
            error_percentage: snapshot.error_percentage,
        }
    }
}

/// Metrics response
#[derive(Debug, Clone, serde::Serialize, serde::Deserialize, poem_openapi::Object)]
pub struct MetricsResponse {
    pub circuits: Vec<CircuitMetrics>,
    pub timestamp: String,
}

#[derive(ApiResponse)]
pub enum GetMetricsResponse {
    #[oai(status = 200)]
    Ok(Json<MetricsResponse>),
}

#[OpenApi]
impl MetricsApi {
    /// Rolling statistics of every circuit
    #[oai(path = "/metrics/circuits", method = "get")]
    async fn get_circuits(&self) -> GetMetricsResponse {
        GetMetricsResponse::Ok(Json(MetricsResponse {
            circuits: self
                .registry
                .snapshots()
                .into_iter()
                .map(CircuitMetrics::from)
                .collect(),
            timestamp: chrono::Utc::now().to_rfc3339(),
        }))
    }
}
