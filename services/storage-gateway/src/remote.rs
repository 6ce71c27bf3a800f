//! Remote object store over HTTP
//!
//! `ObjectStore` implementation against the provider's internal HTTP front.
//! Every request authenticates as the identity chosen by the pool: the
//! account's client email travels in `x-storage-principal` and its private
//! key as a bearer token. Credentials are resolved per request so a key
//! rotated in the pool takes effect immediately.

use std::sync::Arc;
use std::time::Duration;

use account_pool::AccountPool;
use anyhow::Context;
use bytes::Bytes;
use futures_util::TryStreamExt;
use provider::{
    BoxFuture, ByteStream, ObjectInfo, ObjectMeta, ObjectStore, ProviderError, StorageIdentity,
    StoredObject, UploadSession,
};
use reqwest::header::{CONTENT_TYPE, HeaderMap, HeaderValue, RANGE};
use reqwest::{Response, StatusCode};
use serde::Deserialize;
use tracing::debug;

const PRINCIPAL_HEADER: &str = "x-storage-principal";
const OBJECT_NAME_HEADER: &str = "x-object-name";
const PARENT_HEADER: &str = "x-parent-id";
const DESCRIPTION_HEADER: &str = "x-object-description";

/// Object reference as the provider front reports it.
#[derive(Debug, Deserialize)]
struct ObjectResponse {
    object_id: String,
    name: String,
    size: u64,
    content_type: String,
    content_link: String,
}

impl ObjectResponse {
    fn into_stored(self, account_name: &str) -> StoredObject {
        StoredObject {
            object_id: self.object_id,
            name: self.name,
            size: self.size,
            content_type: self.content_type,
            content_link: self.content_link,
            account_name: account_name.to_string(),
        }
    }
}

#[derive(Debug, Deserialize)]
struct UploadOpened {
    upload_id: String,
}

/// HTTP-backed [`ObjectStore`].
pub struct RemoteStore {
    client: reqwest::Client,
    base_url: String,
    pool: Arc<AccountPool>,
}

impl RemoteStore {
    pub fn new(base_url: &str, timeout: Duration, pool: Arc<AccountPool>) -> anyhow::Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .context("building provider http client")?;
        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
            pool,
        })
    }

    /// Auth headers for the account behind `identity`.
    async fn auth_headers(&self, identity: &StorageIdentity) -> provider::Result<HeaderMap> {
        let credential = self
            .pool
            .credential(&identity.account_name)
            .await
            .map_err(|e| ProviderError::Transfer(format!("credential resolution: {e}")))?;
        let mut headers = HeaderMap::new();
        headers.insert(
            PRINCIPAL_HEADER,
            HeaderValue::from_str(&credential.client_email)
                .map_err(|e| ProviderError::Transfer(format!("invalid principal: {e}")))?,
        );
        let mut bearer = HeaderValue::from_str(&format!(
            "Bearer {}",
            credential.private_key.expose()
        ))
        .map_err(|e| ProviderError::Transfer(format!("invalid key material: {e}")))?;
        bearer.set_sensitive(true);
        headers.insert(reqwest::header::AUTHORIZATION, bearer);
        Ok(headers)
    }

    fn meta_headers(meta: &ObjectMeta, headers: &mut HeaderMap) -> provider::Result<()> {
        headers.insert(
            OBJECT_NAME_HEADER,
            HeaderValue::from_str(&meta.name)
                .map_err(|e| ProviderError::Transfer(format!("invalid object name: {e}")))?,
        );
        headers.insert(
            CONTENT_TYPE,
            HeaderValue::from_str(&meta.content_type)
                .map_err(|e| ProviderError::Transfer(format!("invalid content type: {e}")))?,
        );
        if let Some(parent) = &meta.parent {
            headers.insert(
                PARENT_HEADER,
                HeaderValue::from_str(parent)
                    .map_err(|e| ProviderError::Transfer(format!("invalid parent id: {e}")))?,
            );
        }
        if let Some(description) = &meta.description
            && let Ok(value) = HeaderValue::from_str(description)
        {
            headers.insert(DESCRIPTION_HEADER, value);
        }
        Ok(())
    }
}

/// Connection-level failures are `Unavailable` (the account is fine, the
/// provider is not); everything else at this layer is a transfer fault.
fn transport_error(e: reqwest::Error) -> ProviderError {
    if e.is_connect() || e.is_timeout() {
        ProviderError::Unavailable(e.to_string())
    } else {
        ProviderError::Transfer(e.to_string())
    }
}

fn status_error(status: StatusCode, object_id: &str, body: &str) -> ProviderError {
    match status {
        StatusCode::NOT_FOUND => ProviderError::NotFound(object_id.to_string()),
        StatusCode::SERVICE_UNAVAILABLE | StatusCode::BAD_GATEWAY | StatusCode::GATEWAY_TIMEOUT => {
            ProviderError::Unavailable(format!("provider returned {status}"))
        }
        _ => {
            let mut snippet = body.to_string();
            snippet.truncate(200);
            ProviderError::Transfer(format!("provider returned {status}: {snippet}"))
        }
    }
}

/// Drop the first `to_skip` bytes of a stream, passing the rest through.
fn skip_prefix(stream: ByteStream, mut to_skip: u64) -> ByteStream {
    Box::pin(stream.map_ok(move |chunk| {
        if to_skip == 0 {
            return chunk;
        }
        let cut = to_skip.min(chunk.len() as u64) as usize;
        to_skip -= cut as u64;
        chunk.slice(cut..)
    }))
}

async fn checked(response: Response, object_id: &str) -> provider::Result<Response> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }
    let body = response.text().await.unwrap_or_default();
    Err(status_error(status, object_id, &body))
}

impl ObjectStore for RemoteStore {
    fn put_object<'a>(
        &'a self,
        identity: &'a StorageIdentity,
        meta: &'a ObjectMeta,
        data: Bytes,
    ) -> BoxFuture<'a, provider::Result<StoredObject>> {
        Box::pin(async move {
            let mut headers = self.auth_headers(identity).await?;
            Self::meta_headers(meta, &mut headers)?;

            let response = self
                .client
                .post(format!("{}/objects", self.base_url))
                .headers(headers)
                .body(data)
                .send()
                .await
                .map_err(transport_error)?;
            let parsed: ObjectResponse = checked(response, &meta.name)
                .await?
                .json()
                .await
                .map_err(transport_error)?;
            debug!(object_id = %parsed.object_id, account = %identity.account_name, "object stored");
            Ok(parsed.into_stored(&identity.account_name))
        })
    }

    fn begin_upload<'a>(
        &'a self,
        identity: &'a StorageIdentity,
        meta: &'a ObjectMeta,
    ) -> BoxFuture<'a, provider::Result<Box<dyn UploadSession>>> {
        Box::pin(async move {
            let mut headers = self.auth_headers(identity).await?;
            Self::meta_headers(meta, &mut headers)?;
            headers.insert(
                "x-declared-size",
                HeaderValue::from_str(&meta.size.to_string())
                    .map_err(|e| ProviderError::Transfer(e.to_string()))?,
            );

            let response = self
                .client
                .post(format!("{}/uploads", self.base_url))
                .headers(headers.clone())
                .send()
                .await
                .map_err(transport_error)?;
            let opened: UploadOpened = checked(response, &meta.name)
                .await?
                .json()
                .await
                .map_err(transport_error)?;
            debug!(upload_id = %opened.upload_id, account = %identity.account_name, "upload session opened");

            Ok(Box::new(RemoteUploadSession {
                client: self.client.clone(),
                url: format!("{}/uploads/{}", self.base_url, opened.upload_id),
                headers,
                account_name: identity.account_name.clone(),
                offset: 0,
            }) as Box<dyn UploadSession>)
        })
    }

    fn read<'a>(
        &'a self,
        identity: &'a StorageIdentity,
        object_id: &'a str,
        range: Option<(u64, u64)>,
    ) -> BoxFuture<'a, provider::Result<ByteStream>> {
        Box::pin(async move {
            let mut headers = self.auth_headers(identity).await?;
            if let Some((start, end)) = range {
                headers.insert(
                    RANGE,
                    HeaderValue::from_str(&format!("bytes={start}-{end}"))
                        .map_err(|e| ProviderError::Transfer(e.to_string()))?,
                );
            }

            let response = self
                .client
                .get(format!("{}/objects/{}", self.base_url, object_id))
                .headers(headers)
                .send()
                .await
                .map_err(transport_error)?;
            let response = checked(response, object_id).await?;
            let honored = response.status() == StatusCode::PARTIAL_CONTENT;

            let stream = response
                .bytes_stream()
                .map_err(|e| std::io::Error::other(e.to_string()));
            // A 200 against a Range request means the provider sent the
            // whole object; trim the leading bytes here so the window the
            // caller takes starts in the right place.
            match range {
                Some((start, _)) if !honored => {
                    debug!(object_id, start, "range not honored, trimming client-side");
                    Ok(skip_prefix(Box::pin(stream), start))
                }
                _ => Ok(Box::pin(stream) as ByteStream),
            }
        })
    }

    fn head<'a>(
        &'a self,
        identity: &'a StorageIdentity,
        object_id: &'a str,
    ) -> BoxFuture<'a, provider::Result<ObjectInfo>> {
        Box::pin(async move {
            let headers = self.auth_headers(identity).await?;
            let response = self
                .client
                .head(format!("{}/objects/{}", self.base_url, object_id))
                .headers(headers)
                .send()
                .await
                .map_err(transport_error)?;
            let response = checked(response, object_id).await?;

            let size = response
                .headers()
                .get(reqwest::header::CONTENT_LENGTH)
                .and_then(|v| v.to_str().ok())
                .and_then(|v| v.parse().ok())
                .unwrap_or(0);
            let content_type = response
                .headers()
                .get(CONTENT_TYPE)
                .and_then(|v| v.to_str().ok())
                .unwrap_or("application/octet-stream")
                .to_string();
            Ok(ObjectInfo {
                object_id: object_id.to_string(),
                size,
                content_type,
            })
        })
    }
}

/// Chunked transfer against one `/uploads/{id}` session.
struct RemoteUploadSession {
    client: reqwest::Client,
    url: String,
    headers: HeaderMap,
    account_name: String,
    offset: u64,
}

impl UploadSession for RemoteUploadSession {
    fn put_chunk(&mut self, chunk: Bytes) -> BoxFuture<'_, provider::Result<()>> {
        Box::pin(async move {
            let len = chunk.len() as u64;
            let mut headers = self.headers.clone();
            headers.insert(
                "x-chunk-offset",
                HeaderValue::from_str(&self.offset.to_string())
                    .map_err(|e| ProviderError::Transfer(e.to_string()))?,
            );
            let response = self
                .client
                .put(&self.url)
                .headers(headers)
                .body(chunk)
                .send()
                .await
                .map_err(transport_error)?;
            checked(response, &self.url).await?;
            self.offset += len;
            Ok(())
        })
    }

    fn finish(self: Box<Self>) -> BoxFuture<'static, provider::Result<StoredObject>> {
        Box::pin(async move {
            let response = self
                .client
                .post(format!("{}/finish", self.url))
                .headers(self.headers.clone())
                .send()
                .await
                .map_err(transport_error)?;
            let parsed: ObjectResponse = checked(response, &self.url)
                .await?
                .json()
                .await
                .map_err(transport_error)?;
            Ok(parsed.into_stored(&self.account_name))
        })
    }
}
