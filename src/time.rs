use chrono::{DateTime, TimeZone, Utc};
use std::time::{SystemTime, UNIX_EPOCH};

/// Milliseconds since the unix epoch.
pub fn create_timestamp() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|since_the_epoch| since_the_epoch.as_millis() as u64)
        .unwrap_or(0)
}

/// Protobuf timestamp stamped on outbound envelopes.
pub fn create_proto_timestamp() -> prost_types::Timestamp {
    prost_types::Timestamp::from(SystemTime::now())
}

pub fn timestamp_to_datetime(timestamp: &prost_types::Timestamp) -> Option<DateTime<Utc>> {
    if timestamp.nanos < 0 {
        return None;
    }
    Utc.timestamp_opt(timestamp.seconds, timestamp.nanos as u32).single()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn proposal_timestamp_converts_to_utc() {
        let timestamp = prost_types::Timestamp {
            seconds: 1_600_000_000,
            nanos: 500_000_000,
        };
        let datetime = timestamp_to_datetime(&timestamp).unwrap();
        assert_eq!(datetime.timestamp(), 1_600_000_000);
        assert_eq!(datetime.timestamp_subsec_millis(), 500);
    }

    #[test]
    fn negative_nanos_are_rejected() {
        let timestamp = prost_types::Timestamp {
            seconds: 1,
            nanos: -1,
        };
        assert!(timestamp_to_datetime(&timestamp).is_none());
    }
}
