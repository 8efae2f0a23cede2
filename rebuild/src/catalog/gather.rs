//! Data file announcements printed by gather commands.
//!
//! A gather command prints one JSON object per produced file, for example
//! `{"table": "marker", "data_file": "/data/marker.tsv"}`. Other lines are ignored, which lets
//! gather commands log freely to stdout.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::bail;
use crate::error::{ErrorKind, RebuildResult};

/// Keys that mark a JSON stdout line as an announcement.
const ANNOUNCEMENT_KEYS: [&str; 2] = ["table", "data_file"];

/// A data file produced for a table.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DataFileAnnouncement {
    pub table: String,
    pub data_file: String,
}

impl DataFileAnnouncement {
    pub fn new(table: impl Into<String>, data_file: impl Into<String>) -> Self {
        Self {
            table: table.into(),
            data_file: data_file.into(),
        }
    }

    /// Renders the announcement as the line a gather command prints.
    pub fn to_line(&self) -> serde_json::Result<String> {
        serde_json::to_string(self)
    }
}

/// Extracts every announcement from the stdout lines of a gather command.
///
/// JSON objects without a `table` or `data_file` key are log lines and are skipped. Objects with
/// one of those keys must be complete announcements.
pub fn parse_announcements(
    gather_command: &str,
    lines: &[String],
) -> RebuildResult<Vec<DataFileAnnouncement>> {
    let mut announcements = Vec::new();

    for line in lines {
        let line = line.trim();
        if !line.starts_with('{') {
            continue;
        }

        let Ok(object) = serde_json::from_str::<Map<String, Value>>(line) else {
            continue;
        };
        if !ANNOUNCEMENT_KEYS.iter().any(|key| object.contains_key(*key)) {
            continue;
        }

        match serde_json::from_value::<DataFileAnnouncement>(Value::Object(object)) {
            Ok(announcement) => announcements.push(announcement),
            Err(err) => bail!(
                ErrorKind::GatherOutputInvalid,
                "Gather command printed an invalid data file announcement",
                format!("command `{gather_command}` printed `{line}`: {err}"),
                source: err
            ),
        }
    }

    Ok(announcements)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ignores_plain_output_lines() {
        let lines = vec![
            "extracting marker".to_string(),
            r#"{"table": "marker", "data_file": "/data/marker.tsv"}"#.to_string(),
            "  {\"table\":\"marker_alias\",\"data_file\":\"/data/alias.tsv\"}".to_string(),
            "done".to_string(),
        ];

        let announcements = parse_announcements("gather marker", &lines).unwrap();

        assert_eq!(
            announcements,
            vec![
                DataFileAnnouncement::new("marker", "/data/marker.tsv"),
                DataFileAnnouncement::new("marker_alias", "/data/alias.tsv"),
            ]
        );
    }

    #[test]
    fn json_log_lines_are_ignored() {
        let lines = vec![
            r#"{"event": "progress", "rows": 1000}"#.to_string(),
            r#"{"table": "marker", "data_file": "/data/marker.tsv"}"#.to_string(),
            "{not json at all".to_string(),
        ];

        let announcements = parse_announcements("gather marker", &lines).unwrap();

        assert_eq!(
            announcements,
            vec![DataFileAnnouncement::new("marker", "/data/marker.tsv")]
        );
    }

    #[test]
    fn malformed_announcement_is_rejected() {
        let lines = vec![r#"{"table": "marker"}"#.to_string()];

        let err = parse_announcements("gather marker", &lines).unwrap_err();

        assert_eq!(err.kind(), ErrorKind::GatherOutputInvalid);
        assert!(err.detail().unwrap().contains("gather marker"));
    }

    #[test]
    fn rendered_line_is_parsed_back() {
        let line = DataFileAnnouncement::new("reference", "/data/reference.tsv")
            .to_line()
            .unwrap();

        let announcements = parse_announcements("gather reference", &[line]).unwrap();

        assert_eq!(announcements[0].table, "reference");
    }
}
