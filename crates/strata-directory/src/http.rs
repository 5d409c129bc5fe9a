//! `reqwest`-backed client for a remote actor directory.
//!
//! Endpoints:
//! - `GET {base}/{collection}/{id}`: 200 means the actor exists, 404 means it
//!   does not. 5xx and timeouts are transient.
//! - `GET {base}/{collection}/{id}/membership`: a JSON `RealmMembership`.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::StatusCode;
use strata_core::{RealmMembership, RealmRef};

use crate::{ActorDirectory, DirectoryError, MembershipDirectory};

pub struct HttpActorDirectory {
    client: reqwest::Client,
    base_url: String,
    api_key: Option<String>,
}

impl HttpActorDirectory {
    /// Build a client for the directory at `base_url`.
    ///
    /// # Errors
    ///
    /// Returns `DirectoryError::Unavailable` if the HTTP client cannot be built.
    pub fn new(
        base_url: impl Into<String>,
        api_key: Option<String>,
        timeout: Duration,
    ) -> Result<Self, DirectoryError> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| DirectoryError::Unavailable(format!("build http client: {e}")))?;
        Ok(Self {
            client,
            base_url: base_url.into().trim_end_matches('/').to_string(),
            api_key: api_key.filter(|k| !k.is_empty()),
        })
    }

    /// URL of the actor record behind `realm`, or `None` for system realms.
    #[must_use]
    pub fn actor_url(&self, realm: &RealmRef) -> Option<String> {
        realm.kind.directory_collection().map(|collection| {
            format!(
                "{}/{collection}/{}",
                self.base_url,
                urlencoding::encode(&realm.id)
            )
        })
    }

    async fn get(&self, url: &str) -> Result<reqwest::Response, DirectoryError> {
        let mut request = self.client.get(url);
        if let Some(key) = &self.api_key {
            request = request.header("Authorization", format!("Bearer {key}"));
        }
        Ok(request.send().await?)
    }
}

fn classify(status: StatusCode, body: String) -> DirectoryError {
    if status.is_server_error() || status == StatusCode::TOO_MANY_REQUESTS {
        DirectoryError::Unavailable(format!("HTTP {status}: {body}"))
    } else {
        DirectoryError::Rejected {
            status: status.as_u16(),
            message: body,
        }
    }
}

#[async_trait]
impl ActorDirectory for HttpActorDirectory {
    async fn exists(&self, realm: &RealmRef) -> Result<bool, DirectoryError> {
        let Some(url) = self.actor_url(realm) else {
            return Ok(true);
        };
        let resp = self.get(&url).await?;
        match resp.status() {
            StatusCode::OK => Ok(true),
            StatusCode::NOT_FOUND => Ok(false),
            status => Err(classify(status, resp.text().await.unwrap_or_default())),
        }
    }
}

#[async_trait]
impl MembershipDirectory for HttpActorDirectory {
    async fn membership(&self, caller: &RealmRef) -> Result<RealmMembership, DirectoryError> {
        let Some(url) = self.actor_url(caller) else {
            return Ok(RealmMembership::solo(caller.clone()));
        };
        let resp = self.get(&format!("{url}/membership")).await?;
        match resp.status() {
            StatusCode::OK => resp
                .json::<RealmMembership>()
                .await
                .map_err(|e| DirectoryError::Malformed(format!("parse membership: {e}"))),
            StatusCode::NOT_FOUND => Err(DirectoryError::ActorNotFound {
                realm: caller.clone(),
            }),
            status => Err(classify(status, resp.text().await.unwrap_or_default())),
        }
    }
}
