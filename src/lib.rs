//! Abstracting and implementing DNS record management for different providers.
//!
//! This crate defines a generic provider-agnostic API to manage the records of a DNS zone and provides an implementation for SiteHost.
//!
//! # Providers
//!
//! Every capability of a DNS record provider is expressed as its own trait:
//!
//! - [`RecordGetter`]
//! - [`RecordAppender`]
//! - [`RecordSetter`]
//! - [`RecordDeleter`]
//!
//! All of them operate on the generic [`Record`] and take a [`Context`] that bounds how long the provider may talk to its backend.
//!
//! # Names
//!
//! Zones are accepted with or without their trailing dot (see [`normalize_zone`]).
//! <br/>Record names handed out by providers are relative to the zone, `@` denoting the apex. Names handed in may be relative or absolute.

use std::{
    fmt::{self, Debug, Display},
    time::{Duration, Instant},
};

#[cfg(feature = "sitehost")]
pub mod sitehost;

/// Represents a DNS record.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Record {
    /// The provider-specific ID of the record.
    /// <br/>An empty ID means the record is not (yet) known to the provider.
    pub id: String,
    pub name: String,
    pub typ: String,
    pub value: String,
    pub ttl: Duration,
    /// Providers translate priorities they cannot represent as a [`u16`] (negative, too large or malformed) to `0`.
    pub priority: u16,
}

impl Record {
    /// Creates a record without an ID, TTL and priority.
    pub fn new(name: &str, typ: &str, value: &str) -> Self {
        Self {
            id: String::new(),
            name: name.to_owned(),
            typ: typ.to_owned(),
            value: value.to_owned(),
            ttl: Duration::ZERO,
            priority: 0,
        }
    }

    pub fn with_ttl(mut self, ttl: Duration) -> Self {
        self.ttl = ttl;
        self
    }

    pub fn with_priority(mut self, priority: u16) -> Self {
        self.priority = priority;
        self
    }

    /// Whether the record carries a provider-specific ID.
    pub fn has_id(&self) -> bool {
        !self.id.is_empty()
    }
}

/// Bounds the time a provider may spend on an operation.
///
/// Every request a provider issues inherits the time remaining until the deadline.
/// Once the deadline has passed, requests fail with the transport's timeout error.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Context {
    deadline: Option<Instant>,
}

impl Context {
    /// A context without a deadline.
    pub fn background() -> Self {
        Self { deadline: None }
    }

    pub fn with_timeout(timeout: Duration) -> Self {
        Self::with_deadline(Instant::now() + timeout)
    }

    pub fn with_deadline(deadline: Instant) -> Self {
        Self {
            deadline: Some(deadline),
        }
    }

    pub fn deadline(&self) -> Option<Instant> {
        self.deadline
    }

    /// Returns the time left until the deadline, [`Duration::ZERO`] if it has passed.
    /// <br/>[`None`] means there is no deadline at all.
    pub fn remaining(&self) -> Option<Duration> {
        self.deadline
            .map(|deadline| deadline.saturating_duration_since(Instant::now()))
    }
}

/// Represents a provider that can list the records of a zone.
pub trait RecordGetter {
    /// The provider-specific error type.
    type Error: Debug;

    /// Retrieves all records of the zone in the order the provider returns them.
    /// <br/>When no record exists, an [`Ok`] value with an empty [`Vec`] will be returned.
    fn get_records(&self, ctx: &Context, zone: &str) -> Result<Vec<Record>, Self::Error>;
}

/// Represents a provider that can add records to a zone.
pub trait RecordAppender {
    /// The provider-specific error type.
    type Error: Debug;

    /// Creates the given records and returns them as created, carrying their new IDs.
    /// <br/>IDs of the given records are ignored.
    fn append_records(
        &self,
        ctx: &Context,
        zone: &str,
        records: &[Record],
    ) -> Result<Vec<Record>, Self::Error>;
}

/// Represents a provider that can create or update records of a zone.
pub trait RecordSetter {
    /// The provider-specific error type.
    type Error: Debug;

    /// Updates the existing record for every given record or creates it if there is none.
    /// <br/>Records without an ID are looked up by name and type.
    fn set_records(
        &self,
        ctx: &Context,
        zone: &str,
        records: &[Record],
    ) -> Result<Vec<Record>, Self::Error>;
}

/// Represents a provider that can delete records of a zone.
pub trait RecordDeleter {
    /// The provider-specific error type used for [`DeleteRecordsError::error`].
    type Error: Debug;

    /// Deletes the given records and returns the records that were deleted.
    /// <br/>Records without an ID are looked up by name, type and value; every match is deleted.
    fn delete_records(
        &self,
        ctx: &Context,
        zone: &str,
        records: &[Record],
    ) -> Result<Vec<Record>, DeleteRecordsError<Self::Error>>;
}

/// Represents an error that occured during [`RecordDeleter::delete_records`].
///
/// Deletions are not atomic: records deleted before the failure stay deleted and are listed in [`DeleteRecordsError::deleted`].
#[derive(Debug)]
pub struct DeleteRecordsError<T> {
    /// The records that were deleted before the error occured.
    pub deleted: Vec<Record>,

    /// The provider-specific error that stopped the deletion.
    pub error: T,
}

impl<T: Display> Display for DeleteRecordsError<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} (deleted {} record(s) before failing)",
            self.error,
            self.deleted.len()
        )
    }
}

impl<T: std::error::Error + 'static> std::error::Error for DeleteRecordsError<T> {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        Some(&self.error)
    }
}

/// Strips trailing dots from a zone. Applying it more than once has no further effect.
pub fn normalize_zone(zone: &str) -> &str {
    zone.trim_end_matches('.')
}

/// Converts an absolute name to a name relative to the zone.
///
/// The apex is returned as `@`. Names outside of the zone are returned without their trailing dot, but otherwise untouched.
pub fn relative_name(fqdn: &str, zone: &str) -> String {
    let fqdn = fqdn.trim_end_matches('.');
    let zone = normalize_zone(zone);

    if fqdn == zone {
        return "@".to_owned();
    }
    if zone.is_empty() {
        return fqdn.to_owned();
    }

    fqdn.strip_suffix(zone)
        .and_then(|rest| rest.strip_suffix('.'))
        .unwrap_or(fqdn)
        .to_owned()
}

/// Converts a name to an absolute name within the zone, without a trailing dot.
///
/// Names that are already absolute (ending with a dot or with the zone itself) are kept.
/// <br/>An empty name and `@` both denote the apex.
pub fn absolute_name(name: &str, zone: &str) -> String {
    let zone = normalize_zone(zone);

    if zone.is_empty() {
        return name.trim_matches('.').to_owned();
    }
    if name.is_empty() || name == "@" {
        return zone.to_owned();
    }
    if let Some(fqdn) = name.strip_suffix('.') {
        return fqdn.to_owned();
    }
    if name == zone || name.ends_with(&format!(".{}", zone)) {
        return name.to_owned();
    }

    format!("{}.{}", name, zone)
}
