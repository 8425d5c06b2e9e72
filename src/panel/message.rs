use serde::{Deserialize, Serialize};

/// Host -> surface. Serialized as `{"command":"rebuild"}` and
/// `{"command":"ping","line":25}`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "command", rename_all = "lowercase")]
pub enum HostMessage {
    /// Content was replaced; re-scan before the next ping
    Rebuild,
    /// 1-based cursor line in the source editor
    Ping { line: usize },
}

/// Surface -> host. The host only logs these.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "command", rename_all = "lowercase")]
pub enum SurfaceMessage {
    /// A scan finished with this many indexed rows
    Scanned { rows: usize },
}
