//! Raw event line decoding.
//!
//! Line format: `<timestampMillis>,<typeCode>,<storageId>,<path>[,<toPath>]`.
//! Malformed lines are dropped; they are never retried within a run.

use thiserror::Error;

use crate::event::{EventRecord, EventType, FOLDER_WILDCARD, FolderPrefix};

/// Reason a raw event line was rejected.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ParseError {
    /// Line does not have four or five fields.
    #[error("expected 4 or 5 fields, found {found}")]
    FieldCount {
        /// Number of fields found.
        found: usize,
    },
    /// Timestamp is not an integer.
    #[error("invalid timestamp '{value}'")]
    Timestamp {
        /// Offending value.
        value: String,
    },
    /// Type code is not known.
    #[error("unknown event type code '{code}'")]
    UnknownType {
        /// Offending code.
        code: String,
    },
    /// Storage id or path is empty.
    #[error("empty {field}")]
    EmptyField {
        /// Field name.
        field: &'static str,
    },
    /// Folder move without a destination folder.
    #[error("folder move without destination")]
    MissingDestination,
    /// Folder-scoped path without the folder wildcard.
    #[error("folder event path '{path}' lacks the folder wildcard")]
    MissingWildcard {
        /// Offending path.
        path: String,
    },
    /// File-scoped path with the folder wildcard.
    #[error("file event path '{path}' carries the folder wildcard")]
    UnexpectedWildcard {
        /// Offending path.
        path: String,
    },
    /// Path escapes its parent via `..`.
    #[error("path '{path}' contains a parent segment")]
    ParentSegment {
        /// Offending path.
        path: String,
    },
}

/// Result of decoding one raw event file.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ParsedFile {
    /// Decoded events, in line order.
    pub events: Vec<EventRecord>,
    /// Number of malformed lines dropped.
    pub malformed: usize,
}

/// Decodes one raw event line.
///
/// A `d` line whose path ends in the folder wildcard is a folder delete.
///
/// # Errors
///
/// Returns a [`ParseError`] describing why the line is malformed.
pub fn parse_line(line: &str) -> Result<EventRecord, ParseError> {
    let fields: Vec<&str> = line.split(',').collect();
    if !(4..=5).contains(&fields.len()) {
        return Err(ParseError::FieldCount {
            found: fields.len(),
        });
    }

    let timestamp = fields[0]
        .trim()
        .parse::<i64>()
        .map_err(|_| ParseError::Timestamp {
            value: fields[0].to_string(),
        })?;
    let mut event_type = EventType::from_code(fields[1]).ok_or_else(|| ParseError::UnknownType {
        code: fields[1].to_string(),
    })?;
    let storage_id = fields[2];
    let path = fields[3];
    let to_path = fields.get(4).filter(|value| !value.is_empty()).copied();

    if storage_id.is_empty() {
        return Err(ParseError::EmptyField { field: "storage id" });
    }
    if path.is_empty() {
        return Err(ParseError::EmptyField { field: "path" });
    }
    for candidate in std::iter::once(path).chain(to_path) {
        if candidate.split('/').any(|segment| segment == "..") {
            return Err(ParseError::ParentSegment {
                path: candidate.to_string(),
            });
        }
    }

    let is_folder_path = path.ends_with(FOLDER_WILDCARD);
    if event_type == EventType::Deleted && is_folder_path {
        event_type = EventType::FolderDeleted;
    }

    if event_type.is_folder_scoped() {
        if FolderPrefix::from_folder_path(path).is_none() {
            return Err(ParseError::MissingWildcard {
                path: path.to_string(),
            });
        }
    } else if is_folder_path {
        return Err(ParseError::UnexpectedWildcard {
            path: path.to_string(),
        });
    }

    let mut record = EventRecord::new(timestamp, event_type, storage_id, path);
    match event_type {
        EventType::FolderMoved => {
            let destination = to_path.ok_or(ParseError::MissingDestination)?;
            if FolderPrefix::from_folder_path(destination).is_none() {
                return Err(ParseError::MissingWildcard {
                    path: destination.to_string(),
                });
            }
            record = record.with_to_path(destination);
        }
        kind if kind.is_move() => {
            if let Some(destination) = to_path {
                record = record.with_to_path(destination);
            }
        }
        _ => {}
    }
    Ok(record)
}

/// Decodes the content of one raw event file.
///
/// Blank lines are skipped silently; malformed lines are logged at debug
/// level and counted.
#[must_use]
pub fn parse_content(content: &str) -> ParsedFile {
    let mut parsed = ParsedFile::default();
    for (number, raw) in content.lines().enumerate() {
        let line = raw.trim_end_matches('\r');
        if line.trim().is_empty() {
            continue;
        }
        match parse_line(line) {
            Ok(event) => parsed.events.push(event),
            Err(error) => {
                tracing::debug!(line = number + 1, %error, "dropping malformed event line");
                parsed.malformed += 1;
            }
        }
    }
    parsed
}
