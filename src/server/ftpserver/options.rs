//! Contains the types describing the setup options that can be given to the
//! [`Server`](crate::Server).

use async_trait::async_trait;
use std::cmp::Ordering;
use std::fmt::Debug;
use std::net::Ipv4Addr;
use std::ops::RangeInclusive;
use std::sync::Arc;

pub(crate) const DEFAULT_GREETING: &str = "FTP server ready";
pub(crate) const DEFAULT_IDLE_SESSION_TIMEOUT_SECS: u64 = 600;
pub(crate) const DEFAULT_PASSIVE_PORTS: RangeInclusive<u16> = 49152..=65534;
pub(crate) const DEFAULT_UPLOAD_MAX_SLURP_SIZE: usize = 1024 * 1024;
pub(crate) const DEFAULT_MAX_STATS_AT_ONCE: usize = 5;

/// The option to [`Server::passive_host`](crate::Server::passive_host). It
/// allows the user to specify how the IP address communicated in the PASV
/// response is determined.
#[derive(Debug, PartialEq, Eq, Clone, Copy)]
pub enum PassiveHost {
    /// Use the IP address the control connection came in on
    FromConnection,
    /// Advertise this specific IP address
    Ip(Ipv4Addr),
}

impl Default for PassiveHost {
    fn default() -> Self {
        PassiveHost::FromConnection
    }
}

impl From<Ipv4Addr> for PassiveHost {
    fn from(ip: Ipv4Addr) -> Self {
        PassiveHost::Ip(ip)
    }
}

impl From<[u8; 4]> for PassiveHost {
    fn from(ip: [u8; 4]) -> Self {
        PassiveHost::Ip(ip.into())
    }
}

/// Extracts the sort key for a listing entry from its file name.
pub type FilenameSortMap = dyn Fn(&str) -> String + Send + Sync;

/// Compares two listing entries by file name.
pub type FilenameSortFunc = dyn Fn(&str, &str) -> Ordering + Send + Sync;

/// How directory listing entries are ordered before they are sent.
#[derive(Clone)]
pub enum FilenameSort {
    /// Compare on a case-folded key. The default.
    CaseFolded,
    /// Send entries the way the back-end returned them.
    Unsorted,
    /// Compare on a key extracted by the given function.
    KeyedBy(Arc<FilenameSortMap>),
    /// Use the given comparator directly.
    CompareWith(Arc<FilenameSortFunc>),
}

impl Default for FilenameSort {
    fn default() -> Self {
        FilenameSort::CaseFolded
    }
}

impl Debug for FilenameSort {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        let name = match self {
            FilenameSort::CaseFolded => "CaseFolded",
            FilenameSort::Unsorted => "Unsorted",
            FilenameSort::KeyedBy(_) => "KeyedBy",
            FilenameSort::CompareWith(_) => "CompareWith",
        };
        write!(f, "{}", name)
    }
}

/// Resolves the numeric owner and group ids of listing entries to the names
/// shown in the long listing format. Register with
/// [`Server::name_resolver`](crate::Server::name_resolver).
#[async_trait]
pub trait NameResolver: Send + Sync + Debug {
    /// The login name for a uid, or `None` when unknown.
    async fn username_for_uid(&self, uid: u32) -> Option<String>;

    /// The group name for a gid, or `None` when unknown.
    async fn group_for_gid(&self, gid: u32) -> Option<String>;
}

/// A [`NameResolver`] that knows no names; listings fall back to `ftp` for
/// both columns. The default.
#[derive(Debug)]
pub struct DefaultNameResolver;

#[async_trait]
impl NameResolver for DefaultNameResolver {
    async fn username_for_uid(&self, _uid: u32) -> Option<String> {
        None
    }

    async fn group_for_gid(&self, _gid: u32) -> Option<String> {
        None
    }
}

// The listing related options, bundled for handing to the data channel.
#[derive(Clone)]
pub(crate) struct ListingConfig {
    pub hide_dot_files: bool,
    pub sort: FilenameSort,
    pub max_stats_at_once: usize,
}

impl Default for ListingConfig {
    fn default() -> Self {
        ListingConfig {
            hide_dot_files: false,
            sort: FilenameSort::default(),
            max_stats_at_once: DEFAULT_MAX_STATS_AT_ONCE,
        }
    }
}
