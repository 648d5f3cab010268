use core::fmt;

use serde::{Serialize, Serializer};

/// The decoded fields of an identifier, used for diagnostics.
///
/// Serializes to the record returned by
/// [`CachedUidGenerator::parse_uid`](crate::CachedUidGenerator::parse_uid):
///
/// ```text
/// {"UID":"…","timestamp":…,"deltaSeconds":…,"workerId":…,"sequence":…}
/// ```
///
/// The id itself is rendered as a string so JSON consumers limited to 53-bit
/// integers read it losslessly.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct UidParts {
    #[serde(rename = "UID", serialize_with = "as_string")]
    pub uid: u64,
    /// Unix second the id was issued for.
    pub timestamp: i64,
    /// Seconds elapsed since the configured epoch.
    pub delta_seconds: u64,
    pub worker_id: u64,
    pub sequence: u64,
}

impl UidParts {
    /// Renders the record as a single-line JSON object.
    pub fn to_json(&self) -> String {
        serde_json::to_string(self).unwrap_or_else(|_| self.to_string())
    }
}

impl fmt::Display for UidParts {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "uid={} timestamp={} worker_id={} sequence={}",
            self.uid, self.timestamp, self.worker_id, self.sequence
        )
    }
}

fn as_string<S: Serializer>(value: &u64, serializer: S) -> Result<S::Ok, S::Error> {
    serializer.collect_str(value)
}
