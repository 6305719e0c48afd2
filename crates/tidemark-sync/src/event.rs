//! Change event model.
//!
//! An [`EventRecord`] is one decoded line of a raw event file. Paths are
//! relative to the storage root. Folder-scoped events carry a path ending in
//! [`FOLDER_WILDCARD`]; the root folder itself is written as `/*`.

use std::fmt;

/// Marker suffix of folder-scoped event paths.
pub const FOLDER_WILDCARD: &str = "/*";

/// Kind of filesystem change.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum EventType {
    /// File created.
    Created,
    /// File content or attributes modified.
    Modified,
    /// File deleted.
    Deleted,
    /// File moved away from this path.
    MovedFrom,
    /// File moved to this path.
    MovedTo,
    /// Whole folder moved; `to_path` holds the destination.
    FolderMoved,
    /// Whole folder deleted.
    FolderDeleted,
}

impl EventType {
    /// All event types, in code order.
    pub const ALL: [Self; 7] = [
        Self::Created,
        Self::Modified,
        Self::Deleted,
        Self::MovedFrom,
        Self::MovedTo,
        Self::FolderMoved,
        Self::FolderDeleted,
    ];

    /// Wire code written by the watcher.
    #[must_use]
    pub const fn code(self) -> &'static str {
        match self {
            Self::Created => "c",
            Self::Modified => "m",
            Self::Deleted => "d",
            Self::MovedFrom => "mf",
            Self::MovedTo => "mt",
            Self::FolderMoved => "fm",
            Self::FolderDeleted => "fd",
        }
    }

    /// Decodes a wire code, ignoring case.
    #[must_use]
    pub fn from_code(code: &str) -> Option<Self> {
        Self::ALL
            .into_iter()
            .find(|kind| kind.code().eq_ignore_ascii_case(code.trim()))
    }

    /// True for events addressing a whole folder subtree.
    #[must_use]
    pub const fn is_folder_scoped(self) -> bool {
        matches!(self, Self::FolderMoved | Self::FolderDeleted)
    }

    /// True for event types that may carry a destination path.
    #[must_use]
    pub const fn is_move(self) -> bool {
        matches!(self, Self::MovedFrom | Self::MovedTo | Self::FolderMoved)
    }
}

impl fmt::Display for EventType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Created => "CREATED",
            Self::Modified => "MODIFIED",
            Self::Deleted => "DELETED",
            Self::MovedFrom => "MOVED_FROM",
            Self::MovedTo => "MOVED_TO",
            Self::FolderMoved => "FOLDER_MOVED",
            Self::FolderDeleted => "FOLDER_DELETED",
        };
        f.write_str(name)
    }
}

/// One filesystem change reported by a watcher.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EventRecord {
    /// Producer clock in milliseconds.
    pub timestamp: i64,
    /// Kind of change.
    pub event_type: EventType,
    /// Storage reference (the storage path in the catalog).
    pub storage_id: String,
    /// Path relative to the storage root.
    pub path: String,
    /// Destination path, for move types only.
    pub to_path: Option<String>,
}

impl EventRecord {
    /// Creates a file or folder event without a destination.
    #[must_use]
    pub fn new(
        timestamp: i64,
        event_type: EventType,
        storage_id: impl Into<String>,
        path: impl Into<String>,
    ) -> Self {
        Self {
            timestamp,
            event_type,
            storage_id: storage_id.into(),
            path: path.into(),
            to_path: None,
        }
    }

    /// Sets the destination path.
    #[must_use]
    pub fn with_to_path(mut self, to_path: impl Into<String>) -> Self {
        self.to_path = Some(to_path.into());
        self
    }

    /// True if the event addresses a folder subtree.
    #[must_use]
    pub fn is_folder_scoped(&self) -> bool {
        self.event_type.is_folder_scoped()
    }
}

/// Path prefix selected by a folder event.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FolderPrefix {
    /// The storage root: every path matches.
    Root,
    /// Paths starting with this prefix (ends in `/`).
    Prefix(String),
}

impl FolderPrefix {
    /// Derives the prefix from a folder event path such as `a/sub/*`.
    ///
    /// Returns `None` if the path lacks the folder wildcard.
    #[must_use]
    pub fn from_folder_path(path: &str) -> Option<Self> {
        if path == FOLDER_WILDCARD {
            return Some(Self::Root);
        }
        let folder = path.strip_suffix('*')?;
        if !folder.ends_with('/') {
            return None;
        }
        Some(Self::Prefix(folder.to_string()))
    }

    /// The literal prefix; empty for the root.
    #[must_use]
    pub fn as_str(&self) -> &str {
        match self {
            Self::Root => "",
            Self::Prefix(prefix) => prefix,
        }
    }

    /// True if `path` lies below this prefix.
    #[must_use]
    pub fn matches(&self, path: &str) -> bool {
        match self {
            Self::Root => true,
            Self::Prefix(prefix) => path.starts_with(prefix.as_str()),
        }
    }

    /// Rewrites `path` from below this prefix to below `destination`.
    ///
    /// Returns `None` if `path` is not below this prefix.
    #[must_use]
    pub fn rewrite(&self, path: &str, destination: &Self) -> Option<String> {
        let suffix = path.strip_prefix(self.as_str())?;
        Some(format!("{}{suffix}", destination.as_str()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn codes_round_trip_case_insensitively() {
        for kind in EventType::ALL {
            assert_eq!(EventType::from_code(kind.code()), Some(kind));
            assert_eq!(
                EventType::from_code(&kind.code().to_ascii_uppercase()),
                Some(kind)
            );
        }
        assert_eq!(EventType::from_code("x"), None);
    }

    #[test]
    fn folder_prefix_from_path() {
        assert_eq!(FolderPrefix::from_folder_path("/*"), Some(FolderPrefix::Root));
        assert_eq!(
            FolderPrefix::from_folder_path("a/sub/*"),
            Some(FolderPrefix::Prefix("a/sub/".into()))
        );
        assert_eq!(FolderPrefix::from_folder_path("a/sub"), None);
        assert_eq!(FolderPrefix::from_folder_path("a*"), None);
    }

    #[test]
    fn rewrite_moves_suffix_to_destination() {
        let from = FolderPrefix::from_folder_path("a/*").unwrap();
        let to = FolderPrefix::from_folder_path("c/*").unwrap();
        assert_eq!(from.rewrite("a/sub/file", &to).as_deref(), Some("c/sub/file"));
        assert_eq!(from.rewrite("b/file", &to), None);
    }

    #[test]
    fn root_prefix_matches_everything() {
        let root = FolderPrefix::Root;
        assert!(root.matches("any/path"));
        let to = FolderPrefix::from_folder_path("archive/*").unwrap();
        assert_eq!(root.rewrite("x/y", &to).as_deref(), Some("archive/x/y"));
    }

    #[test]
    fn display_uses_upper_snake_names() {
        assert_eq!(EventType::FolderDeleted.to_string(), "FOLDER_DELETED");
        assert_eq!(EventType::MovedTo.to_string(), "MOVED_TO");
    }
}
