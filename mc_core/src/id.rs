use crate::{Error, Result};
use serde::{Deserialize, Serialize};
use std::{fmt, str::FromStr, time::SystemTime};
use ulid::Ulid;

/// Recording session identifier; sorts by the session's start time
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SessionId(Ulid);

impl SessionId {
    /// Id stamped with the current wall-clock time
    pub fn new() -> Self {
        Self(Ulid::new())
    }

    /// Id stamped with `started_at`, so ids follow the injected clock
    pub fn starting_at(started_at: SystemTime) -> Self {
        Self(Ulid::from_datetime(started_at))
    }

    /// Time encoded in the id, at millisecond precision
    pub fn started_at(&self) -> SystemTime {
        self.0.datetime()
    }
}

impl Default for SessionId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for SessionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for SessionId {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        s.parse()
            .map(Self)
            .map_err(|e| Error::Validation(format!("Invalid session id '{}': {}", s, e)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::{Duration, UNIX_EPOCH};

    #[test]
    fn test_ids_follow_start_time() {
        let early = SessionId::starting_at(UNIX_EPOCH + Duration::from_secs(1_000));
        let late = SessionId::starting_at(UNIX_EPOCH + Duration::from_secs(2_000));
        assert!(early < late);
        assert_eq!(early.started_at(), UNIX_EPOCH + Duration::from_secs(1_000));
    }

    #[test]
    fn test_session_id_parse() {
        let id = SessionId::new();
        let parsed: SessionId = id.to_string().parse().unwrap();
        assert_eq!(id, parsed);
        assert!("not-a-ulid".parse::<SessionId>().is_err());
    }

    #[test]
    fn test_session_id_serializes_as_string() {
        let id = SessionId::new();
        let json = serde_json::to_string(&id).unwrap();
        assert_eq!(json, format!("\"{}\"", id));
    }
}
