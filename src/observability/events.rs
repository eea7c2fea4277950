//! Observable history events
//!
//! Every log line emitted by the history layer carries one of these names in
//! its `event` field. Events are explicit and typed.

use std::fmt;

/// Observable events of the history layer
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Event {
    // Recording
    /// History record saved
    Recorded,
    /// Diff computed against the new snapshot itself
    BaselineFallback,
    /// Prior snapshot re-fetched from storage
    SnapshotRefetch,

    // Failures
    /// History store rejected a record
    SaveFailed,
    /// Metadata derivation failed
    MetadataFailed,
    /// Mutation aborted because its history could not be recorded
    MutationAborted,

    // Maintenance
    /// History collection cleared
    Cleared,
    /// History file verified
    Verified,
    /// Configuration loaded
    ConfigLoaded,
}

impl Event {
    /// Returns the string representation of the event
    pub fn as_str(&self) -> &'static str {
        match self {
            Event::Recorded => "HISTORY_RECORDED",
            Event::BaselineFallback => "HISTORY_BASELINE_FALLBACK",
            Event::SnapshotRefetch => "HISTORY_SNAPSHOT_REFETCH",

            Event::SaveFailed => "HISTORY_SAVE_FAILED",
            Event::MetadataFailed => "HISTORY_METADATA_FAILED",
            Event::MutationAborted => "HISTORY_MUTATION_ABORTED",

            Event::Cleared => "HISTORY_CLEARED",
            Event::Verified => "HISTORY_VERIFIED",
            Event::ConfigLoaded => "CONFIG_LOADED",
        }
    }

    /// Returns true if the event means a mutation lost its history record
    pub fn is_failure(&self) -> bool {
        matches!(
            self,
            Event::SaveFailed | Event::MetadataFailed | Event::MutationAborted
        )
    }
}

impl fmt::Display for Event {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}
