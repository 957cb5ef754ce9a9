use async_trait::async_trait;
use reqwest::{Client, StatusCode};
use serde::{Deserialize, Serialize};
use url::Url;

use super::{Cell, CellError, Context};

/// Body of a CAS `PUT`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CasRequest {
    #[serde(with = "base64_bytes")]
    pub current: Vec<u8>,
    #[serde(with = "base64_bytes")]
    pub next: Vec<u8>,
}

/// Reply to a CAS `PUT`; `current` is the value after the attempt either way
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CasResponse {
    pub changed: bool,
    #[serde(with = "base64_bytes")]
    pub current: Vec<u8>,
}

mod base64_bytes {
    use base64::engine::general_purpose::STANDARD;
    use base64::Engine;
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(data: &[u8], serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&STANDARD.encode(data))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Vec<u8>, D::Error> {
        let s = String::deserialize(deserializer)?;
        STANDARD.decode(s).map_err(serde::de::Error::custom)
    }
}

/// Cell served over HTTP.
///  `GET` reads, `POST` creates (or resets) the cell, `PUT` with a
///  [`CasRequest`] swaps server-side under the server's lock.
#[derive(Debug, Clone)]
pub struct HttpCell {
    url: Url,
    client: Client,
}

impl HttpCell {
    pub fn new(url: Url) -> Self {
        Self::with_client(url, Client::new())
    }

    pub fn with_client(url: Url, client: Client) -> Self {
        Self { url, client }
    }

    pub fn url(&self) -> &Url {
        &self.url
    }

    fn check_status(&self, status: StatusCode) -> Result<(), CellError> {
        if status == StatusCode::NOT_FOUND {
            return Err(CellError::NotFound(self.url.to_string()));
        }
        if !status.is_success() {
            return Err(CellError::Status {
                url: self.url.to_string(),
                status: status.as_u16(),
            });
        }
        Ok(())
    }

    /// Create the cell on the server, or reset it to empty
    pub async fn create(&self, ctx: &Context) -> Result<(), CellError> {
        let response = ctx.run(self.client.post(self.url.clone()).send()).await??;
        self.check_status(response.status())
    }

    /// CAS that also hands back the server's current value, so a loser can
    /// retry without another `GET`
    pub async fn swap(
        &self,
        ctx: &Context,
        current: &[u8],
        next: &[u8],
    ) -> Result<CasResponse, CellError> {
        let body = CasRequest {
            current: current.to_vec(),
            next: next.to_vec(),
        };
        let response = ctx
            .run(self.client.put(self.url.clone()).json(&body).send())
            .await??;
        self.check_status(response.status())?;
        Ok(ctx.run(response.json::<CasResponse>()).await??)
    }
}

#[async_trait]
impl Cell for HttpCell {
    async fn get(&self, ctx: &Context) -> Result<Vec<u8>, CellError> {
        let response = ctx.run(self.client.get(self.url.clone()).send()).await??;
        self.check_status(response.status())?;
        let body = ctx.run(response.bytes()).await??;
        Ok(body.to_vec())
    }

    async fn cas(&self, ctx: &Context, current: &[u8], next: &[u8]) -> Result<bool, CellError> {
        let outcome = self.swap(ctx, current, next).await?;
        if !outcome.changed {
            tracing::debug!(url = %self.url, "http cell CAS lost");
        }
        Ok(outcome.changed)
    }

    fn id(&self) -> String {
        self.url.to_string()
    }
}
