use serde::{Deserialize, Serialize};

/// What part of the model changed. Consumers re-read current state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ChangeKind {
    Results,
    History,
    Coverage,
    Cleared,
}

/// Store-changed notification. Deliberately carries no data.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct StoreChange {
    pub kind: ChangeKind,
    /// Per-emitter monotonic counter.
    pub sequence: u64,
}
