use reqwest::blocking::{Client as HttpClient, RequestBuilder};
use serde::{de::IgnoredAny, Deserialize};
use tracing::debug;

use super::{Config, Error};
use crate::Context;

pub const SITEHOST_API_HOST: &str = "api.sitehost.nz";
const SITEHOST_API_PATH: &str = "/1.1/";

/// The calls the provider needs from the SiteHost API.
///
/// Implemented by [`Client`]; a prebuilt implementation can be handed to [`super::SiteHostProvider::with_client`].
pub trait Api {
    /// Builds the client the provider uses when none was handed in.
    fn connect(config: &Config) -> Result<Self, Error>
    where
        Self: Sized;

    fn list_records(&self, ctx: &Context, domain: &str) -> Result<Response<Vec<Record>>, Error>;

    fn add_record(&self, ctx: &Context, domain: &str, fields: &RecordFields) -> Result<Ack, Error>;

    fn update_record(
        &self,
        ctx: &Context,
        domain: &str,
        record_id: &str,
        fields: &RecordFields,
    ) -> Result<Ack, Error>;

    fn delete_record(&self, ctx: &Context, domain: &str, record_id: &str) -> Result<Ack, Error>;
}

pub struct Client {
    http_client: HttpClient,
    base_url: String,
    client_id: String,
    api_key: String,
}

impl Client {
    pub fn new(config: &Config) -> Result<Self, reqwest::Error> {
        let host = config.host.as_deref().unwrap_or(SITEHOST_API_HOST);
        Self::with_base_url(config, format!("https://{}{}", host, SITEHOST_API_PATH))
    }

    pub(crate) fn with_base_url(config: &Config, base_url: String) -> Result<Self, reqwest::Error> {
        let http_client = HttpClient::builder().build()?;
        Ok(Self {
            http_client,
            base_url,
            client_id: config.client_id.clone(),
            api_key: config.api_key.clone(),
        })
    }

    fn prepare(&self, ctx: &Context, request: RequestBuilder) -> RequestBuilder {
        let request = request.query(&[
            ("apikey", self.api_key.as_str()),
            ("client_id", self.client_id.as_str()),
        ]);

        match ctx.remaining() {
            Some(remaining) => request.timeout(remaining),
            None => request,
        }
    }

    fn post(&self, ctx: &Context, endpoint: &str, form: &[(&str, &str)]) -> Result<Ack, reqwest::Error> {
        debug!(endpoint, "sending SiteHost API request");
        self.prepare(ctx, self.http_client.post(format!("{}{}", self.base_url, endpoint)))
            .form(form)
            .send()?
            .json()
    }
}

impl Api for Client {
    fn connect(config: &Config) -> Result<Self, Error> {
        Ok(Client::new(config)?)
    }

    fn list_records(&self, ctx: &Context, domain: &str) -> Result<Response<Vec<Record>>, Error> {
        debug!(domain, "listing SiteHost records");
        let response = self
            .prepare(
                ctx,
                self.http_client
                    .get(format!("{}dns/list_records.json", self.base_url)),
            )
            .query(&[("domain", domain)])
            .send()?
            .json()?;
        Ok(response)
    }

    fn add_record(&self, ctx: &Context, domain: &str, fields: &RecordFields) -> Result<Ack, Error> {
        Ok(self.post(
            ctx,
            "dns/add_record.json",
            &[
                ("client_id", self.client_id.as_str()),
                ("domain", domain),
                ("type", fields.typ.as_str()),
                ("name", fields.name.as_str()),
                ("content", fields.content.as_str()),
                ("prio", fields.priority.as_str()),
            ],
        )?)
    }

    fn update_record(
        &self,
        ctx: &Context,
        domain: &str,
        record_id: &str,
        fields: &RecordFields,
    ) -> Result<Ack, Error> {
        Ok(self.post(
            ctx,
            "dns/update_record.json",
            &[
                ("client_id", self.client_id.as_str()),
                ("domain", domain),
                ("record_id", record_id),
                ("type", fields.typ.as_str()),
                ("name", fields.name.as_str()),
                ("content", fields.content.as_str()),
                ("prio", fields.priority.as_str()),
            ],
        )?)
    }

    fn delete_record(&self, ctx: &Context, domain: &str, record_id: &str) -> Result<Ack, Error> {
        Ok(self.post(
            ctx,
            "dns/delete_record.json",
            &[
                ("client_id", self.client_id.as_str()),
                ("domain", domain),
                ("record_id", record_id),
            ],
        )?)
    }
}

/// The envelope of every SiteHost API response.
#[derive(Deserialize, Debug)]
pub struct Response<T> {
    pub status: bool,
    #[serde(default)]
    pub msg: String,
    #[serde(rename = "return", default = "Option::default")]
    pub data: Option<T>,
}

/// A response whose payload is irrelevant.
pub type Ack = Response<IgnoredAny>;

#[derive(Deserialize, Debug, Clone, PartialEq)]
pub struct Record {
    pub id: String,
    pub name: String,
    #[serde(rename = "type")]
    pub typ: String,
    pub content: String,
    #[serde(default)]
    pub ttl: String,
    #[serde(rename = "prio", default)]
    pub priority: String,
    #[serde(default)]
    pub change_date: String,
    #[serde(default)]
    pub state: String,
}

/// The record fields sent when adding or updating a record.
#[derive(Debug, Clone, PartialEq)]
pub struct RecordFields {
    pub typ: String,
    /// Absolute name without a trailing dot.
    pub name: String,
    pub content: String,
    pub priority: String,
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use mockito::Matcher;

    use super::*;

    fn config() -> Config {
        Config {
            client_id: "1234".to_owned(),
            api_key: "secret".to_owned(),
            host: None,
        }
    }

    fn client(server: &mockito::ServerGuard) -> Client {
        Client::with_base_url(&config(), format!("{}/1.1/", server.url())).unwrap()
    }

    fn credentials() -> Matcher {
        Matcher::AllOf(vec![
            Matcher::UrlEncoded("apikey".into(), "secret".into()),
            Matcher::UrlEncoded("client_id".into(), "1234".into()),
        ])
    }

    #[test]
    fn default_base_url_uses_https() {
        let client = Client::new(&config()).unwrap();
        assert_eq!(client.base_url, "https://api.sitehost.nz/1.1/");

        let client = Client::new(&Config {
            host: Some("api.staging.sitehost.nz".to_owned()),
            ..config()
        })
        .unwrap();
        assert_eq!(client.base_url, "https://api.staging.sitehost.nz/1.1/");
    }

    #[test]
    fn list_records_decodes_records() {
        let mut server = mockito::Server::new();
        let mock = server
            .mock("GET", "/1.1/dns/list_records.json")
            .match_query(Matcher::AllOf(vec![
                credentials(),
                Matcher::UrlEncoded("domain".into(), "example.co.nz".into()),
            ]))
            .with_status(200)
            .with_header("content-type", "application/json")
            .with_body(
                r#"{
                    "return": [
                        {"id": "1", "name": "www.example.co.nz", "type": "A", "content": "1.1.1.1", "ttl": "3600", "prio": "0", "change_date": "1700000000", "state": "0"},
                        {"id": "2", "name": "example.co.nz", "type": "MX", "content": "mx.example.co.nz", "ttl": "3600", "prio": "10"}
                    ],
                    "msg": "Successful",
                    "status": true
                }"#,
            )
            .create();

        let response = client(&server)
            .list_records(&Context::background(), "example.co.nz")
            .unwrap();

        mock.assert();
        assert!(response.status);
        let records = response.data.unwrap();
        assert_eq!(records.len(), 2);
        assert_eq!(records[0].name, "www.example.co.nz");
        assert_eq!(records[1].priority, "10");
        assert_eq!(records[1].state, "");
    }

    #[test]
    fn failed_status_is_decoded() {
        let mut server = mockito::Server::new();
        server
            .mock("GET", "/1.1/dns/list_records.json")
            .match_query(Matcher::Any)
            .with_status(200)
            .with_body(r#"{"return": null, "msg": "Invalid API key", "status": false}"#)
            .create();

        let response = client(&server)
            .list_records(&Context::background(), "example.co.nz")
            .unwrap();

        assert!(!response.status);
        assert_eq!(response.msg, "Invalid API key");
        assert!(response.data.is_none());
    }

    #[test]
    fn add_record_posts_form() {
        let mut server = mockito::Server::new();
        let mock = server
            .mock("POST", "/1.1/dns/add_record.json")
            .match_query(credentials())
            .match_body(Matcher::AllOf(vec![
                Matcher::UrlEncoded("domain".into(), "example.co.nz".into()),
                Matcher::UrlEncoded("type".into(), "TXT".into()),
                Matcher::UrlEncoded("name".into(), "api.example.co.nz".into()),
                Matcher::UrlEncoded("content".into(), "token123".into()),
                Matcher::UrlEncoded("prio".into(), "0".into()),
            ]))
            .with_status(200)
            .with_body(r#"{"return": {"job_id": null}, "msg": "Successful", "status": true}"#)
            .create();

        let fields = RecordFields {
            typ: "TXT".to_owned(),
            name: "api.example.co.nz".to_owned(),
            content: "token123".to_owned(),
            priority: "0".to_owned(),
        };
        let response = client(&server)
            .add_record(&Context::background(), "example.co.nz", &fields)
            .unwrap();

        mock.assert();
        assert!(response.status);
    }

    #[test]
    fn update_and_delete_send_record_id() {
        let mut server = mockito::Server::new();
        let update = server
            .mock("POST", "/1.1/dns/update_record.json")
            .match_query(credentials())
            .match_body(Matcher::AllOf(vec![
                Matcher::UrlEncoded("record_id".into(), "1".into()),
                Matcher::UrlEncoded("content".into(), "2.2.2.2".into()),
            ]))
            .with_status(200)
            .with_body(r#"{"msg": "Successful", "status": true}"#)
            .create();
        let delete = server
            .mock("POST", "/1.1/dns/delete_record.json")
            .match_query(credentials())
            .match_body(Matcher::UrlEncoded("record_id".into(), "1".into()))
            .with_status(200)
            .with_body(r#"{"msg": "Record not found", "status": false}"#)
            .create();

        let client = client(&server);
        let ctx = Context::background();
        let fields = RecordFields {
            typ: "A".to_owned(),
            name: "www.example.co.nz".to_owned(),
            content: "2.2.2.2".to_owned(),
            priority: "0".to_owned(),
        };

        assert!(client.update_record(&ctx, "example.co.nz", "1", &fields).unwrap().status);
        let response = client.delete_record(&ctx, "example.co.nz", "1").unwrap();
        assert!(!response.status);
        assert_eq!(response.msg, "Record not found");

        update.assert();
        delete.assert();
    }

    #[test]
    fn malformed_response_is_a_transport_error() {
        let mut server = mockito::Server::new();
        server
            .mock("GET", "/1.1/dns/list_records.json")
            .match_query(Matcher::Any)
            .with_status(502)
            .with_body("<html>Bad Gateway</html>")
            .create();

        let err = client(&server)
            .list_records(&Context::background(), "example.co.nz")
            .unwrap_err();
        assert!(matches!(err, Error::Http(_)));
    }

    #[test]
    fn transport_errors_do_not_expose_api_key() {
        let client = Client::with_base_url(
            &Config {
                api_key: "s3cr3t-key".to_owned(),
                ..config()
            },
            "http://127.0.0.1:1/1.1/".to_owned(),
        )
        .unwrap();

        let err = client
            .list_records(&Context::background(), "example.co.nz")
            .unwrap_err();

        assert!(matches!(err, Error::Http(_)));
        assert!(!err.to_string().contains("s3cr3t-key"));
        assert!(!format!("{:?}", err).contains("s3cr3t-key"));
    }

    #[test]
    fn expired_context_times_out_request() {
        let mut server = mockito::Server::new();
        server
            .mock("GET", "/1.1/dns/list_records.json")
            .match_query(Matcher::Any)
            .with_status(200)
            .with_body(r#"{"return": [], "msg": "Successful", "status": true}"#)
            .create();

        let err = client(&server)
            .list_records(&Context::with_timeout(Duration::ZERO), "example.co.nz")
            .unwrap_err();

        match err {
            Error::Http(err) => assert!(err.is_timeout()),
            other => panic!("expected a timeout, got {:?}", other),
        }
    }
}
