use chrono::{DateTime, SubsecRound, Utc};

use crate::error::Result;

/// Mime-Type used by Google Drive to indicate a folder.
pub const MIMETYPE_FOLDER: &str = "application/vnd.google-apps.folder";

/// Well-known alias of the drive root.
pub const ROOT_ID: &str = "root";

/// A file or folder as returned by the remote store.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RemoteObject {
    pub id: String,
    pub title: String,
    pub mime_type: String,
    /// RFC 3339, as sent by the store.
    pub created_date: String,
    /// RFC 3339, as sent by the store.
    pub modified_date: String,
    pub parents: Vec<String>,
    pub download_url: Option<String>,
}

/// Listing entry. Only carries the id; fetch the object for anything else.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChildRef {
    pub id: String,
}

pub fn is_dir(object: &RemoteObject) -> bool {
    object.mime_type == MIMETYPE_FOLDER
}

pub fn create_date(object: &RemoteObject) -> Result<DateTime<Utc>> {
    Ok(DateTime::parse_from_rfc3339(&object.created_date)?.with_timezone(&Utc))
}

/// Modification date truncated to the second. Comparing dates with
/// sub-second information leads to rounding errors.
pub fn modified_date(object: &RemoteObject) -> Result<DateTime<Utc>> {
    let date = DateTime::parse_from_rfc3339(&object.modified_date)?.with_timezone(&Utc);
    Ok(date.trunc_subsecs(0))
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn object(mime_type: &str) -> RemoteObject {
        RemoteObject {
            id: "id1".into(),
            title: "report.txt".into(),
            mime_type: mime_type.into(),
            created_date: "2014-10-01T10:20:30.123Z".into(),
            modified_date: "2014-10-02T11:22:33.000000001Z".into(),
            ..Default::default()
        }
    }

    #[test]
    fn test_is_dir() {
        assert!(is_dir(&object(MIMETYPE_FOLDER)));
        assert!(!is_dir(&object("text/plain")));
    }

    #[test]
    fn test_dates() {
        let o = object("text/plain");
        let created = create_date(&o).unwrap();
        assert_eq!(created.timestamp_subsec_millis(), 123);

        let modified = modified_date(&o).unwrap();
        assert_eq!(modified, Utc.with_ymd_and_hms(2014, 10, 2, 11, 22, 33).unwrap());
    }

    #[test]
    fn test_bad_date_is_an_error() {
        let mut o = object("text/plain");
        o.modified_date = "yesterday".into();
        assert!(modified_date(&o).is_err());
    }
}
