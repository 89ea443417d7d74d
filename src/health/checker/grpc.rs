//! gRPC health checks over the standard `grpc.health.v1.Health` service.

use tokio::time::Instant;
use tonic::transport::{Channel, Endpoint};
use tonic::Code;
use tonic_health::pb::health_check_response::ServingStatus;
use tonic_health::pb::health_client::HealthClient;
use tonic_health::pb::HealthCheckRequest;

use super::{Checker, Outcome, TransportError};
use crate::health::host::HostId;

/// Validated gRPC check. An empty service name asks about the whole server.
#[derive(Debug, Clone, Default)]
pub struct GrpcChecker {
    service_name: String,
}

impl GrpcChecker {
    pub fn new(service_name: Option<String>) -> Self {
        Self {
            service_name: service_name.unwrap_or_default(),
        }
    }
}

/// Map a `HealthCheckResponse.status` value to an outcome.
pub(crate) fn classify_status(status: i32) -> Outcome {
    if status == ServingStatus::Serving as i32 {
        return Outcome::Success;
    }
    let name = ServingStatus::try_from(status)
        .map(|s| s.as_str_name())
        .unwrap_or("UNRECOGNIZED");
    Outcome::Failure(format!("service reported {name}"))
}

pub struct GrpcSession {
    client: HealthClient<Channel>,
}

impl Checker for GrpcChecker {
    type Session = GrpcSession;

    fn protocol(&self) -> &'static str {
        "grpc"
    }

    async fn connect(&self, host: &HostId) -> Result<GrpcSession, TransportError> {
        let channel = Endpoint::from_shared(format!("http://{}", host))?
            .connect()
            .await?;
        Ok(GrpcSession {
            client: HealthClient::new(channel),
        })
    }

    async fn probe(&self, _host: &HostId, session: &mut GrpcSession, _deadline: Instant) -> Outcome {
        let request = HealthCheckRequest {
            service: self.service_name.clone(),
        };
        match session.client.check(request).await {
            Ok(response) => classify_status(response.into_inner().status),
            Err(status) if status.code() == Code::NotFound => {
                Outcome::Failure(format!("unknown service '{}'", self.service_name))
            }
            Err(status) => Outcome::TransportError(status.into()),
        }
    }
}
