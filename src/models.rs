use bincode::{Decode, Encode};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::PathBuf;
use uuid::Uuid;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Encode, Decode)]
pub struct Record {
    pub x: f64,
    pub y: f64,
    pub name: String,
}

impl Record {
    pub fn new(x: f64, y: f64, name: impl Into<String>) -> Self {
        Self {
            x,
            y,
            name: name.into(),
        }
    }
}

impl fmt::Display for Record {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        // Coordinates always carry a fractional part: `10.0`, not `10`.
        write!(f, "x: {:?}, y: {:?}, Name: {}.", self.x, self.y, self.name)
    }
}

/// Stable identity of a workspace. Unlike the positional id it survives
/// removal of lower-numbered workspaces.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct WorkspaceKey(Uuid);

impl WorkspaceKey {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for WorkspaceKey {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for WorkspaceKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0.simple())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", tag = "kind")]
pub enum ReloadOutcome {
    Refreshed {
        records: Vec<Record>,
        loaded_at: DateTime<Utc>,
    },
    /// The fetch succeeded but the server had no points.
    NoData,
}

impl ReloadOutcome {
    pub fn refreshed(records: Vec<Record>) -> Self {
        Self::Refreshed {
            records,
            loaded_at: Utc::now(),
        }
    }

    pub fn records(&self) -> &[Record] {
        match self {
            Self::Refreshed { records, .. } => records,
            Self::NoData => &[],
        }
    }

    pub fn is_no_data(&self) -> bool {
        matches!(self, Self::NoData)
    }

    /// Chart title shown by the shell after a refresh.
    pub fn title(&self) -> Option<String> {
        match self {
            Self::Refreshed { loaded_at, .. } => Some(format!(
                "Realtime Line Chart @{}",
                loaded_at.format("%Y-%m-%d %H:%M:%S")
            )),
            Self::NoData => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SearchField {
    X,
    Y,
    Name,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SaveOutcome {
    Saved,
    /// The user dismissed the file chooser.
    Cancelled,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CloseAction {
    Cancel,
    /// `None` means the save dialog was dismissed.
    Save(Option<PathBuf>),
    Discard,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CloseOutcome {
    Kept,
    Closed,
}
