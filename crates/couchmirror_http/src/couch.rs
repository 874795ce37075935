//! CouchDB document store client.

use async_trait::async_trait;
use couchmirror_core::{
    Document, DocumentStore, Lookup, Revision, StoreError, StoreResult, StoredDocument,
};
use reqwest::{Client, RequestBuilder, Response, StatusCode, Url};
use serde_json::Value;
use std::collections::BTreeSet;

use crate::config::CouchConfig;

/// A [`DocumentStore`] backed by a CouchDB server.
///
/// Bookkeeping fields (`_id`, `_rev`) are stripped from bodies on read; the
/// revision travels separately and is sent back as the `rev` query parameter.
pub struct CouchStore {
    client: Client,
    base: Url,
    credentials: Option<(String, String)>,
}

impl CouchStore {
    /// Creates a client for the configured server.
    pub fn new(config: CouchConfig) -> StoreResult<Self> {
        let base = Url::parse(&config.server_url)
            .map_err(|e| StoreError::transport(format!("invalid server url: {e}")))?;
        let client = Client::builder()
            .timeout(config.timeout)
            .build()
            .map_err(|e| StoreError::transport(e.to_string()))?;
        Ok(Self {
            client,
            base,
            credentials: config.credentials,
        })
    }

    /// Builds `{server}/{segments...}` with each segment percent-encoded.
    pub fn url(&self, segments: &[&str]) -> StoreResult<Url> {
        let mut url = self.base.clone();
        url.path_segments_mut()
            .map_err(|_| StoreError::transport("server url cannot be a base"))?
            .pop_if_empty()
            .extend(segments);
        Ok(url)
    }

    fn authed(&self, request: RequestBuilder) -> RequestBuilder {
        let request = request.header("Accept", "application/json");
        match &self.credentials {
            Some((user, password)) => request.basic_auth(user, Some(password)),
            None => request,
        }
    }

    async fn send(&self, request: RequestBuilder) -> StoreResult<Response> {
        self.authed(request).send().await.map_err(transport)
    }
}

#[async_trait]
impl DocumentStore for CouchStore {
    async fn list_databases(&self) -> StoreResult<BTreeSet<String>> {
        let response = self.send(self.client.get(self.url(&["_all_dbs"])?)).await?;
        let response = expect_success(response).await?;
        response.json().await.map_err(decode)
    }

    async fn create_database(&self, name: &str) -> StoreResult<()> {
        let response = self.send(self.client.put(self.url(&[name])?)).await?;
        if response.status() == StatusCode::PRECONDITION_FAILED {
            return Err(StoreError::DatabaseExists(name.to_owned()));
        }
        expect_success(response).await?;
        Ok(())
    }

    async fn get_document(&self, database: &str, id: &str) -> StoreResult<Lookup> {
        let response = self.send(self.client.get(self.url(&[database, id])?)).await?;
        if response.status() == StatusCode::NOT_FOUND {
            let body: Value = response.json().await.unwrap_or(Value::Null);
            return if is_missing_database(&body) {
                Err(StoreError::MissingDatabase(database.to_owned()))
            } else {
                Ok(Lookup::NotFound)
            };
        }
        let response = expect_success(response).await?;
        let body: Document = response.json().await.map_err(decode)?;
        split_bookkeeping(body).map(Lookup::Found)
    }

    async fn put_document(
        &self,
        database: &str,
        id: &str,
        revision: Option<&Revision>,
        document: &Document,
    ) -> StoreResult<Revision> {
        let mut request = self.client.put(self.url(&[database, id])?).json(document);
        if let Some(rev) = revision {
            request = request.query(&[("rev", rev.as_str())]);
        }
        let response = self.send(request).await?;

        match response.status() {
            StatusCode::CONFLICT => {
                return Err(StoreError::Conflict {
                    database: database.to_owned(),
                    id: id.to_owned(),
                })
            }
            StatusCode::NOT_FOUND => return Err(StoreError::MissingDatabase(database.to_owned())),
            _ => {}
        }
        let response = expect_success(response).await?;
        let ack: Value = response.json().await.map_err(decode)?;
        ack.get("rev")
            .and_then(Value::as_str)
            .map(Revision::new)
            .ok_or_else(|| StoreError::Decode("write acknowledgement has no rev".into()))
    }
}

/// Separates `_rev` into a [`Revision`] and drops `_id`.
pub fn split_bookkeeping(mut body: Document) -> StoreResult<StoredDocument> {
    body.remove("_id");
    let revision = match body.remove("_rev") {
        Some(Value::String(rev)) => Revision::new(rev),
        _ => return Err(StoreError::Decode("document has no _rev".into())),
    };
    Ok(StoredDocument { body, revision })
}

fn is_missing_database(body: &Value) -> bool {
    body.get("reason").and_then(Value::as_str) == Some("Database does not exist.")
}

async fn expect_success(response: Response) -> StoreResult<Response> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }
    let text = response.text().await.unwrap_or_default();
    Err(StoreError::Transport {
        message: format!("{status}: {text}"),
        status: Some(status.as_u16()),
    })
}

fn transport(e: reqwest::Error) -> StoreError {
    StoreError::Transport {
        message: e.to_string(),
        status: e.status().map(|s| s.as_u16()),
    }
}

fn decode(e: reqwest::Error) -> StoreError {
    StoreError::Decode(e.to_string())
}
