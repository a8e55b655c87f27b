//! Version stamps for the local and remote copies of a diet record.
//!
//! The device clock and the server clock are not synchronized, so the two
//! stamp types have no ordering. They are compared only for
//! equality against the [`Baseline`] recorded at the last exchange.

use chrono::{DateTime, SecondsFormat, TimeZone, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Device-clock milliseconds since the Unix epoch.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct LocalStamp(pub i64);

impl LocalStamp {
    pub fn millis(self) -> i64 {
        self.0
    }
}

impl fmt::Display for LocalStamp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Server-assigned instant, exchanged as an ISO-8601 string.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct RemoteStamp(DateTime<Utc>);

impl RemoteStamp {
    pub fn new(instant: DateTime<Utc>) -> Self {
        Self(instant)
    }

    pub fn from_millis(millis: i64) -> Option<Self> {
        Utc.timestamp_millis_opt(millis).single().map(Self)
    }

    pub fn instant(self) -> DateTime<Utc> {
        self.0
    }
}

impl fmt::Display for RemoteStamp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0.to_rfc3339_opts(SecondsFormat::Millis, true))
    }
}

impl FromStr for RemoteStamp {
    type Err = chrono::ParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(Self(DateTime::parse_from_rfc3339(s)?.with_timezone(&Utc)))
    }
}

impl TryFrom<String> for RemoteStamp {
    type Error = chrono::ParseError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<RemoteStamp> for String {
    fn from(stamp: RemoteStamp) -> Self {
        stamp.to_string()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Origin {
    Local,
    Remote,
}

impl fmt::Display for Origin {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Origin::Local => write!(f, "local"),
            Origin::Remote => write!(f, "remote"),
        }
    }
}

/// A timestamp tagged with the clock it came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VersionStamp {
    Local(LocalStamp),
    Remote(RemoteStamp),
}

impl VersionStamp {
    pub fn origin(&self) -> Origin {
        match self {
            VersionStamp::Local(_) => Origin::Local,
            VersionStamp::Remote(_) => Origin::Remote,
        }
    }
}

impl fmt::Display for VersionStamp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            VersionStamp::Local(stamp) => write!(f, "local@{}", stamp),
            VersionStamp::Remote(stamp) => write!(f, "remote@{}", stamp),
        }
    }
}

impl From<LocalStamp> for VersionStamp {
    fn from(stamp: LocalStamp) -> Self {
        VersionStamp::Local(stamp)
    }
}

impl From<RemoteStamp> for VersionStamp {
    fn from(stamp: RemoteStamp) -> Self {
        VersionStamp::Remote(stamp)
    }
}

/// The stamp pair recorded at the last successful exchange.
///
/// `local` is the local stamp the exchanged content had on this device and
/// `remote` is the server stamp of the same content. Both are `None` until
/// the first push or pull.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Baseline {
    pub local: Option<LocalStamp>,
    pub remote: Option<RemoteStamp>,
}

impl Baseline {
    pub fn exchanged(local: LocalStamp, remote: RemoteStamp) -> Self {
        Self {
            local: Some(local),
            remote: Some(remote),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.local.is_none() && self.remote.is_none()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_remote_stamp_parse_and_display() {
        let stamp: RemoteStamp = "2023-11-14T22:13:20.000Z".parse().unwrap();
        assert_eq!(stamp.instant().timestamp_millis(), 1_700_000_000_000);
        assert_eq!(stamp.to_string(), "2023-11-14T22:13:20.000Z");
    }

    #[test]
    fn test_remote_stamp_accepts_offsets() {
        let stamp: RemoteStamp = "2023-11-14T19:13:20-03:00".parse().unwrap();
        assert_eq!(stamp.to_string(), "2023-11-14T22:13:20.000Z");
    }

    #[test]
    fn test_remote_stamp_invalid() {
        assert!("yesterday".parse::<RemoteStamp>().is_err());
        assert!(serde_json::from_str::<RemoteStamp>("\"1700000000000\"").is_err());
    }

    #[test]
    fn test_remote_stamp_json() {
        let stamp = RemoteStamp::from_millis(1_700_000_000_000).unwrap();
        let json = serde_json::to_string(&stamp).unwrap();
        assert_eq!(json, "\"2023-11-14T22:13:20.000Z\"");
    }

    #[test]
    fn test_version_stamp_origin() {
        let local: VersionStamp = LocalStamp(1_700_000_000_000).into();
        let remote: VersionStamp = RemoteStamp::from_millis(1_700_000_000_000).unwrap().into();
        assert_eq!(local.origin(), Origin::Local);
        assert_eq!(remote.origin(), Origin::Remote);
        assert_ne!(local, remote);
    }

    #[test]
    fn test_baseline_default_is_empty() {
        assert!(Baseline::default().is_empty());
        let baseline = Baseline::exchanged(
            LocalStamp(1),
            RemoteStamp::from_millis(1_700_000_000_000).unwrap(),
        );
        assert!(!baseline.is_empty());
    }
}
