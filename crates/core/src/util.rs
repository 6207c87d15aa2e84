use time::{UtcDateTime, macros::format_description};
use url::Url;

pub trait UrlExt {
    /// Returns the URL with a trailing slash so relative joins append to the path.
    fn as_directory(&self) -> Url;
}

impl UrlExt for Url {
    #[inline]
    fn as_directory(&self) -> Url {
        let mut out = self.clone();
        if !out.path().ends_with('/') {
            let path = format!("{}/", out.path());
            out.set_path(&path);
        }
        out
    }
}

/// Format a timestamp as an RFC 3339 UTC string with second precision.
pub fn format_timestamp(date: UtcDateTime) -> String {
    date.format(format_description!("[year]-[month]-[day]T[hour]:[minute]:[second]Z"))
        .unwrap_or_default()
}

/// Milliseconds since the Unix epoch, the storage representation of timestamps.
pub fn to_unix_millis(date: UtcDateTime) -> i64 { (date.unix_timestamp_nanos() / 1_000_000) as i64 }

pub fn from_unix_millis(millis: i64) -> UtcDateTime {
    UtcDateTime::from_unix_timestamp_nanos(millis as i128 * 1_000_000)
        .unwrap_or(UtcDateTime::UNIX_EPOCH)
}
