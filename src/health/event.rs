//! Status change notifications.

use std::sync::Arc;
use std::time::{SystemTime, UNIX_EPOCH};

use serde::{Serialize, Serializer};
use uuid::Uuid;

use crate::health::host::HostId;
use crate::health::state::{HealthStatus, Transition};

/// Emitted once for every change of a host's published status.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct StatusChangeEvent {
    pub id: Uuid,
    pub cluster: Arc<str>,
    pub host: HostId,
    pub from: HealthStatus,
    pub to: HealthStatus,
    #[serde(rename = "at_ms", serialize_with = "serialize_millis")]
    pub at: SystemTime,
}

impl StatusChangeEvent {
    pub fn new(cluster: Arc<str>, host: HostId, transition: Transition) -> Self {
        Self {
            id: Uuid::new_v4(),
            cluster,
            host,
            from: transition.from,
            to: transition.to,
            at: transition.at,
        }
    }
}

/// Milliseconds since the Unix epoch, saturating at zero.
pub(crate) fn unix_millis(at: SystemTime) -> u64 {
    at.duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as u64)
        .unwrap_or(0)
}

fn serialize_millis<S: Serializer>(at: &SystemTime, serializer: S) -> Result<S::Ok, S::Error> {
    serializer.serialize_u64(unix_millis(*at))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[test]
    fn serializes_with_millisecond_timestamp() {
        let event = StatusChangeEvent::new(
            Arc::from("api"),
            HostId::parse("10.0.0.1:80").unwrap(),
            Transition {
                from: HealthStatus::Healthy,
                to: HealthStatus::Unhealthy,
                at: UNIX_EPOCH + Duration::from_millis(1_700_000_000_123),
            },
        );

        let json = serde_json::to_value(&event).unwrap();
        assert_eq!(json["cluster"], "api");
        assert_eq!(json["host"], "10.0.0.1:80");
        assert_eq!(json["from"], "HEALTHY");
        assert_eq!(json["to"], "UNHEALTHY");
        assert_eq!(json["at_ms"], 1_700_000_000_123u64);
    }
}
