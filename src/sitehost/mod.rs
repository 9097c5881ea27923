//! SiteHost DNS provider.
//!
//! Records are managed through the SiteHost API (`https://api.sitehost.nz/1.1/`), authenticated by a client ID and an API key.
//!
//! The API does not return the ID of a record it created. [`SiteHostProvider`] recovers it by listing the zone before and after
//! every creation and picking the new record with the created name, type and value.

use std::{collections::BTreeSet, fmt, time::Duration};

use once_cell::sync::OnceCell;
use serde::Deserialize;
use thiserror::Error;
use tracing::{info, warn};

use crate::{
    absolute_name, normalize_zone, relative_name, Context, DeleteRecordsError, Record,
    RecordAppender, RecordDeleter, RecordGetter, RecordSetter,
};

pub mod api;

/// Credentials and endpoint of the SiteHost API.
#[derive(Deserialize, Clone, Default)]
pub struct Config {
    #[serde(default)]
    pub client_id: String,

    #[serde(rename = "apikey", default)]
    pub api_key: String,

    /// Overrides the API host. The scheme is always `https` and the path always `/1.1/`.
    #[serde(default)]
    pub host: Option<String>,
}

impl fmt::Debug for Config {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Config")
            .field("client_id", &self.client_id)
            .field("api_key", &"<redacted>")
            .field("host", &self.host)
            .finish()
    }
}

#[derive(Debug, Error)]
pub enum Error {
    /// The request could not be sent or its response could not be decoded.
    /// <br/>The request URL is stripped, as its query carries the API key.
    #[error(transparent)]
    Http(reqwest::Error),

    /// The API answered with a failed status.
    #[error("SiteHost API error: {0}")]
    Api(String),

    /// A record was created, but did not show up in the zone afterwards.
    #[error("could not find created record {name} {typ}")]
    CreatedRecordNotFound { name: String, typ: String },

    /// A record without an ID matched more than one existing record.
    #[error("ambiguous match: found {count} records for {name} {typ}")]
    AmbiguousMatch {
        name: String,
        typ: String,
        count: usize,
    },
}

impl From<reqwest::Error> for Error {
    fn from(err: reqwest::Error) -> Self {
        Error::Http(err.without_url())
    }
}

/// Manages the records of SiteHost zones.
///
/// The API client is built on first use and reused afterwards.
pub struct SiteHostProvider<C = api::Client> {
    config: Config,
    api_client: OnceCell<C>,
}

impl SiteHostProvider {
    pub fn new(config: Config) -> Self {
        Self {
            config,
            api_client: OnceCell::new(),
        }
    }
}

impl<C: api::Api> SiteHostProvider<C> {
    /// Creates a provider that uses the given client instead of building one.
    pub fn with_client(config: Config, api_client: C) -> Self {
        Self {
            config,
            api_client: OnceCell::with_value(api_client),
        }
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    fn client(&self) -> Result<&C, Error> {
        self.api_client.get_or_try_init(|| C::connect(&self.config))
    }

    fn list_records(&self, ctx: &Context, zone: &str) -> Result<Vec<Record>, Error> {
        let response = self.client()?.list_records(ctx, zone)?.into_result()?;

        Ok(response
            .unwrap_or_default()
            .into_iter()
            .map(|r| r.into_generic(zone))
            .collect())
    }

    /// Returns the records with the name and type of the given record, and its value if `match_content` is set.
    fn get_records_match(
        &self,
        ctx: &Context,
        zone: &str,
        record: &Record,
        match_content: bool,
    ) -> Result<Vec<Record>, Error> {
        let name = comparable_name(&record.name, zone);

        Ok(self
            .list_records(ctx, zone)?
            .into_iter()
            .filter(|r| r.name == name && r.typ == record.typ)
            .filter(|r| !match_content || r.value == record.value)
            .collect())
    }

    fn create_record(&self, ctx: &Context, zone: &str, record: &Record) -> Result<(), Error> {
        self.client()?
            .add_record(ctx, zone, &api::RecordFields::from_generic(zone, record))?
            .into_result()?;
        Ok(())
    }

    fn update_record(&self, ctx: &Context, zone: &str, record: &Record) -> Result<(), Error> {
        self.client()?
            .update_record(
                ctx,
                zone,
                &record.id,
                &api::RecordFields::from_generic(zone, record),
            )?
            .into_result()?;
        Ok(())
    }

    fn delete_record(&self, ctx: &Context, zone: &str, record: &Record) -> Result<(), Error> {
        self.client()?
            .delete_record(ctx, zone, &record.id)?
            .into_result()?;
        Ok(())
    }

    /// Returns the IDs of all records currently in the zone.
    fn snapshot(&self, ctx: &Context, zone: &str) -> Result<BTreeSet<String>, Error> {
        Ok(self
            .list_records(ctx, zone)?
            .into_iter()
            .map(|r| r.id)
            .collect())
    }

    /// Creates the record and finds it in the zone by diffing against `known`.
    /// <br/>The found record's ID is added to `known`, so an identical record created next is not mistaken for it.
    fn create_record_and_find(
        &self,
        ctx: &Context,
        zone: &str,
        record: &Record,
        known: &mut BTreeSet<String>,
    ) -> Result<Record, Error> {
        self.create_record(ctx, zone, record)?;

        let name = comparable_name(&record.name, zone);
        let created = self
            .list_records(ctx, zone)?
            .into_iter()
            .filter(|r| !known.contains(&r.id))
            .find(|r| r.name == name && r.typ == record.typ && r.value == record.value);

        match created {
            Some(created) => {
                known.insert(created.id.clone());
                info!(zone, id = %created.id, name = %created.name, typ = %created.typ, "created record");
                Ok(created)
            }
            None => {
                warn!(zone, name = %record.name, typ = %record.typ, "created record not found in zone");
                Err(Error::CreatedRecordNotFound {
                    name: record.name.clone(),
                    typ: record.typ.clone(),
                })
            }
        }
    }

    fn create_records(
        &self,
        ctx: &Context,
        zone: &str,
        records: &[Record],
    ) -> Result<Vec<Record>, Error> {
        let mut known = self.snapshot(ctx, zone)?;

        records
            .iter()
            .map(|record| self.create_record_and_find(ctx, zone, record, &mut known))
            .collect()
    }

    /// Creates the record and returns it carrying its new ID.
    fn create_record_return(
        &self,
        ctx: &Context,
        zone: &str,
        record: &Record,
    ) -> Result<Record, Error> {
        let mut known = self.snapshot(ctx, zone)?;
        self.create_record_and_find(ctx, zone, record, &mut known)
    }

    fn set_record(&self, ctx: &Context, zone: &str, record: &Record) -> Result<Record, Error> {
        let mut record = record.clone();

        if !record.has_id() {
            let mut matches = self.get_records_match(ctx, zone, &record, false)?;

            match matches.len() {
                0 => return self.create_record_return(ctx, zone, &record),
                1 => record.id = matches.remove(0).id,
                count => {
                    warn!(zone, name = %record.name, typ = %record.typ, count, "ambiguous record match");
                    return Err(Error::AmbiguousMatch {
                        name: record.name,
                        typ: record.typ,
                        count,
                    });
                }
            }
        }

        self.update_record(ctx, zone, &record)?;
        info!(zone, id = %record.id, name = %record.name, typ = %record.typ, "updated record");
        Ok(record)
    }
}

impl<C: api::Api> RecordGetter for SiteHostProvider<C> {
    type Error = Error;

    fn get_records(&self, ctx: &Context, zone: &str) -> Result<Vec<Record>, Self::Error> {
        self.list_records(ctx, normalize_zone(zone))
    }
}

impl<C: api::Api> RecordAppender for SiteHostProvider<C> {
    type Error = Error;

    fn append_records(
        &self,
        ctx: &Context,
        zone: &str,
        records: &[Record],
    ) -> Result<Vec<Record>, Self::Error> {
        self.create_records(ctx, normalize_zone(zone), records)
    }
}

impl<C: api::Api> RecordSetter for SiteHostProvider<C> {
    type Error = Error;

    fn set_records(
        &self,
        ctx: &Context,
        zone: &str,
        records: &[Record],
    ) -> Result<Vec<Record>, Self::Error> {
        let zone = normalize_zone(zone);

        records
            .iter()
            .map(|record| self.set_record(ctx, zone, record))
            .collect()
    }
}

impl<C: api::Api> RecordDeleter for SiteHostProvider<C> {
    type Error = Error;

    fn delete_records(
        &self,
        ctx: &Context,
        zone: &str,
        records: &[Record],
    ) -> Result<Vec<Record>, DeleteRecordsError<Self::Error>> {
        let zone = normalize_zone(zone);
        let mut queue = Vec::new();

        for record in records {
            if record.has_id() {
                queue.push(record.clone());
                continue;
            }

            let matches = self
                .get_records_match(ctx, zone, record, true)
                .map_err(|error| DeleteRecordsError {
                    deleted: Vec::new(),
                    error,
                })?;
            queue.extend(matches);
        }

        let mut deleted = Vec::with_capacity(queue.len());
        for record in queue {
            if let Err(error) = self.delete_record(ctx, zone, &record) {
                return Err(DeleteRecordsError { deleted, error });
            }
            info!(zone, id = %record.id, name = %record.name, typ = %record.typ, "deleted record");
            deleted.push(record);
        }

        Ok(deleted)
    }
}

/// Brings a possibly absolute name into the zone-relative form listed records carry.
fn comparable_name(name: &str, zone: &str) -> String {
    relative_name(&absolute_name(name, zone), zone)
}

impl<T> api::Response<T> {
    fn into_result(self) -> Result<Option<T>, Error> {
        if !self.status {
            warn!(msg = %self.msg, "SiteHost API reported a failure");
            return Err(Error::Api(self.msg));
        }
        Ok(self.data)
    }
}

impl api::Record {
    pub fn into_generic(self, zone: &str) -> Record {
        Record {
            id: self.id,
            name: relative_name(&self.name, zone),
            typ: self.typ,
            value: self.content,
            ttl: Duration::from_secs(self.ttl.trim().parse().unwrap_or(0)),
            priority: self.priority.trim().parse().unwrap_or(0),
        }
    }
}

impl api::RecordFields {
    pub fn from_generic(zone: &str, record: &Record) -> Self {
        Self {
            typ: record.typ.clone(),
            name: absolute_name(&record.name, zone),
            content: record.value.clone(),
            priority: record.priority.to_string(),
        }
    }
}
