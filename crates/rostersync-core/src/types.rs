//! Common enums and counters for sync runs.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Which entity family a sync run covers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SyncType {
    Players,
    Teams,
    Seasons,
    /// Composed run: teams, then players, then seasons.
    Full,
}

impl SyncType {
    /// Convert to string representation.
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            SyncType::Players => "players",
            SyncType::Teams => "teams",
            SyncType::Seasons => "seasons",
            SyncType::Full => "full",
        }
    }
}

impl fmt::Display for SyncType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl std::str::FromStr for SyncType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "players" => Ok(SyncType::Players),
            "teams" => Ok(SyncType::Teams),
            "seasons" => Ok(SyncType::Seasons),
            "full" => Ok(SyncType::Full),
            _ => Err(format!("Unknown sync type: {s}")),
        }
    }
}

/// Lifecycle status of a sync run.
///
/// Transitions are `running -> {success | partial | failed}`; the three
/// completion states are terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RunStatus {
    Running,
    Success,
    Partial,
    Failed,
}

impl RunStatus {
    /// Convert to string representation.
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            RunStatus::Running => "running",
            RunStatus::Success => "success",
            RunStatus::Partial => "partial",
            RunStatus::Failed => "failed",
        }
    }

    /// Check if this is a terminal status.
    #[must_use]
    pub fn is_terminal(&self) -> bool {
        !matches!(self, RunStatus::Running)
    }
}

impl fmt::Display for RunStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl std::str::FromStr for RunStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "running" => Ok(RunStatus::Running),
            "success" => Ok(RunStatus::Success),
            "partial" => Ok(RunStatus::Partial),
            "failed" => Ok(RunStatus::Failed),
            _ => Err(format!("Unknown run status: {s}")),
        }
    }
}

/// Kind of entity a mapping or conflict refers to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EntityKind {
    Player,
    Team,
    Season,
}

impl EntityKind {
    /// Convert to string representation.
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            EntityKind::Player => "player",
            EntityKind::Team => "team",
            EntityKind::Season => "season",
        }
    }
}

impl fmt::Display for EntityKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl std::str::FromStr for EntityKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "player" => Ok(EntityKind::Player),
            "team" => Ok(EntityKind::Team),
            "season" => Ok(EntityKind::Season),
            _ => Err(format!("Unknown entity kind: {s}")),
        }
    }
}

/// Why a reconciliation outcome was quarantined as a conflict.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConflictKind {
    /// An unmapped remote record plausibly matches an existing local record.
    Duplicate,
}

impl ConflictKind {
    /// Convert to string representation.
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            ConflictKind::Duplicate => "duplicate",
        }
    }
}

impl fmt::Display for ConflictKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl std::str::FromStr for ConflictKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "duplicate" => Ok(ConflictKind::Duplicate),
            _ => Err(format!("Unknown conflict kind: {s}")),
        }
    }
}

/// Resolution state of a sync conflict.
///
/// A `pending` conflict blocks automatic mapping creation for its remote id
/// until a human picks a winner.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Resolution {
    Pending,
    LocalWins,
    RemoteWins,
}

impl Resolution {
    /// Convert to string representation.
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Resolution::Pending => "pending",
            Resolution::LocalWins => "local_wins",
            Resolution::RemoteWins => "remote_wins",
        }
    }

    /// Check if the conflict still needs human judgment.
    #[must_use]
    pub fn is_pending(&self) -> bool {
        matches!(self, Resolution::Pending)
    }
}

impl fmt::Display for Resolution {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl std::str::FromStr for Resolution {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "pending" => Ok(Resolution::Pending),
            "local_wins" => Ok(Resolution::LocalWins),
            "remote_wins" => Ok(Resolution::RemoteWins),
            _ => Err(format!("Unknown resolution: {s}")),
        }
    }
}

/// Per-run outcome counters.
///
/// Quarantined duplicates are tracked in `conflicts`, apart from the
/// created/updated/skipped tallies: a conflict is neither a processed item
/// nor a per-item error.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SyncCounts {
    pub created: u32,
    pub updated: u32,
    pub skipped: u32,
    pub conflicts: u32,
}

impl SyncCounts {
    /// Total items that were processed to a non-error outcome.
    #[must_use]
    pub fn total(&self) -> u32 {
        self.created + self.updated + self.skipped
    }

    /// Fold another phase's counts into this one (full-sync aggregation).
    pub fn merge(&mut self, other: &SyncCounts) {
        self.created += other.created;
        self.updated += other.updated;
        self.skipped += other.skipped;
        self.conflicts += other.conflicts;
    }
}

/// A structured per-item reconciliation error.
///
/// Accumulated into the run's error list instead of aborting the run; a run
/// with item errors and at least one success finishes as `partial`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ItemError {
    pub entity_kind: EntityKind,
    /// Remote id of the record that failed, when known.
    pub remote_id: Option<String>,
    pub message: String,
}

impl ItemError {
    /// Create an item error for a specific remote record.
    pub fn for_remote(
        entity_kind: EntityKind,
        remote_id: impl Into<String>,
        message: impl Into<String>,
    ) -> Self {
        Self {
            entity_kind,
            remote_id: Some(remote_id.into()),
            message: message.into(),
        }
    }

    /// Create an item error not tied to a single record (e.g. a failed phase).
    pub fn phase(entity_kind: EntityKind, message: impl Into<String>) -> Self {
        Self {
            entity_kind,
            remote_id: None,
            message: message.into(),
        }
    }
}
