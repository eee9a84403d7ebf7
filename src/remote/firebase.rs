//! Firebase REST adapters: Firestore (documents), Cloud Storage for Firebase
//! (objects) and Identity Toolkit (email/password sign-in).

use async_trait::async_trait;
use futures_util::StreamExt;
use reqwest::header::{AUTHORIZATION, CONTENT_LENGTH, CONTENT_TYPE};
use reqwest::{Client, RequestBuilder, Response, StatusCode};
use serde::Deserialize;
use serde_json::{json, Map, Number, Value};
use std::time::Duration;
use tracing::{debug, instrument};
use url::Url;

use super::{
    progress_percent, Credentials, Document, DocumentStore, Identity, IdentityProvider,
    ObjectStorage, ProgressSender, StoredObject,
};
use crate::config::FirebaseConfig;
use crate::error::{SiteError, SiteResult};

const FIRESTORE_HOST: &str = "https://firestore.googleapis.com/v1";
const STORAGE_HOST: &str = "https://firebasestorage.googleapis.com/v0";
const IDENTITY_HOST: &str = "https://identitytoolkit.googleapis.com/v1";
const SECURE_TOKEN_HOST: &str = "https://securetoken.googleapis.com/v1";

/// Chunk size of streamed uploads; progress is published once per chunk.
const UPLOAD_CHUNK: usize = 256 * 1024;

pub fn http_client() -> SiteResult<Client> {
    Client::builder()
        .connect_timeout(Duration::from_secs(10))
        .build()
        .map_err(SiteError::from)
}

// ============================================================================
// Response Handling
// ============================================================================

#[derive(Deserialize)]
struct ErrorEnvelope {
    error: ErrorBody,
}

#[derive(Deserialize)]
struct ErrorBody {
    #[serde(default)]
    message: String,
}

fn status_error(status: StatusCode, message: String) -> SiteError {
    match status {
        StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => SiteError::PermissionDenied(message),
        StatusCode::NOT_FOUND => SiteError::NotFound(message),
        StatusCode::REQUEST_TIMEOUT | StatusCode::GATEWAY_TIMEOUT => SiteError::Timeout(message),
        StatusCode::PAYMENT_REQUIRED => SiteError::Unreachable("Storage quota exceeded".to_string()),
        _ => SiteError::Unreachable(format!("HTTP {}: {}", status, message)),
    }
}

/// Pass successful responses through, turn the rest into a [`SiteError`].
async fn check(response: Response) -> SiteResult<Response> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }
    let body = response.text().await.unwrap_or_default();
    let message = serde_json::from_str::<ErrorEnvelope>(&body)
        .map(|e| e.error.message)
        .unwrap_or(body);
    Err(status_error(status, message))
}

fn with_bearer(builder: RequestBuilder, auth: Option<&Credentials>) -> RequestBuilder {
    match auth {
        Some(creds) => builder.bearer_auth(&creds.id_token),
        None => builder,
    }
}

// ============================================================================
// Firestore Value Encoding
// ============================================================================

/// Encode plain JSON as a Firestore typed value.
pub fn to_firestore_value(value: &Value) -> Value {
    match value {
        Value::Null => json!({ "nullValue": null }),
        Value::Bool(b) => json!({ "booleanValue": b }),
        Value::Number(n) => {
            if let Some(i) = n.as_i64() {
                json!({ "integerValue": i.to_string() })
            } else if let Some(u) = n.as_u64() {
                json!({ "integerValue": u.to_string() })
            } else {
                json!({ "doubleValue": n.as_f64() })
            }
        }
        Value::String(s) => json!({ "stringValue": s }),
        Value::Array(items) => {
            let values: Vec<Value> = items.iter().map(to_firestore_value).collect();
            json!({ "arrayValue": { "values": values } })
        }
        Value::Object(map) => json!({ "mapValue": { "fields": document_to_fields(map) } }),
    }
}

/// Decode a Firestore typed value into plain JSON.
pub fn from_firestore_value(value: &Value) -> SiteResult<Value> {
    let obj = value
        .as_object()
        .filter(|o| o.len() == 1)
        .ok_or_else(|| SiteError::Malformed(format!("not a typed value: {}", value)))?;
    let (kind, inner) = obj
        .iter()
        .next()
        .ok_or_else(|| SiteError::Malformed("empty typed value".to_string()))?;

    match kind.as_str() {
        "nullValue" => Ok(Value::Null),
        "booleanValue" => Ok(Value::Bool(inner.as_bool().unwrap_or(false))),
        "integerValue" => {
            let parsed = match inner {
                Value::String(s) => s.parse::<i64>().ok(),
                Value::Number(n) => n.as_i64(),
                _ => None,
            };
            parsed
                .map(|i| Value::Number(i.into()))
                .ok_or_else(|| SiteError::Malformed(format!("bad integerValue {}", inner)))
        }
        "doubleValue" => inner
            .as_f64()
            .and_then(Number::from_f64)
            .map(Value::Number)
            .ok_or_else(|| SiteError::Malformed(format!("bad doubleValue {}", inner))),
        "stringValue" | "timestampValue" | "referenceValue" | "bytesValue" => Ok(inner.clone()),
        "geoPointValue" => Ok(inner.clone()),
        "arrayValue" => {
            let values = inner
                .get("values")
                .and_then(Value::as_array)
                .map(|vs| vs.iter().map(from_firestore_value).collect::<SiteResult<Vec<_>>>())
                .transpose()?
                .unwrap_or_default();
            Ok(Value::Array(values))
        }
        "mapValue" => {
            let fields = inner.get("fields").cloned().unwrap_or(Value::Null);
            Ok(Value::Object(fields_to_document(&fields)?))
        }
        other => Err(SiteError::Malformed(format!("unknown value type {}", other))),
    }
}

pub fn document_to_fields(doc: &Document) -> Value {
    let fields: Map<String, Value> = doc
        .iter()
        .map(|(k, v)| (k.clone(), to_firestore_value(v)))
        .collect();
    Value::Object(fields)
}

/// A document's `fields` object as plain JSON; absent fields mean an empty
/// document.
pub fn fields_to_document(fields: &Value) -> SiteResult<Document> {
    match fields {
        Value::Null => Ok(Document::new()),
        Value::Object(map) => map
            .iter()
            .map(|(k, v)| Ok((k.clone(), from_firestore_value(v)?)))
            .collect(),
        other => Err(SiteError::Malformed(format!("fields is not an object: {}", other))),
    }
}

#[derive(Deserialize)]
struct FirestoreDocument {
    name: String,
    #[serde(default)]
    fields: Value,
}

impl FirestoreDocument {
    fn id(&self) -> &str {
        self.name.rsplit('/').next().unwrap_or(&self.name)
    }
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct ListResponse {
    #[serde(default)]
    documents: Vec<FirestoreDocument>,
    #[serde(default)]
    next_page_token: Option<String>,
}

// ============================================================================
// Firestore Client
// ============================================================================

pub struct FirestoreClient {
    http: Client,
    base: String,
    api_key: String,
}

impl FirestoreClient {
    pub fn new(http: Client, config: &FirebaseConfig) -> Self {
        Self {
            http,
            base: format!(
                "{}/projects/{}/databases/(default)/documents",
                FIRESTORE_HOST, config.project_id
            ),
            api_key: config.api_key.clone(),
        }
    }

    fn url(&self, path: &[&str], params: &[(&str, String)]) -> SiteResult<Url> {
        let mut raw = self.base.clone();
        for segment in path {
            raw.push('/');
            raw.push_str(&urlencoding::encode(segment));
        }
        let mut url = Url::parse(&raw).map_err(|e| SiteError::Validation(e.to_string()))?;
        {
            let mut query = url.query_pairs_mut();
            for (k, v) in params {
                query.append_pair(k, v);
            }
            query.append_pair("key", &self.api_key);
        }
        Ok(url)
    }

    async fn patch(
        &self,
        collection: &str,
        id: &str,
        fields: &Document,
        must_exist: bool,
        auth: Option<&Credentials>,
    ) -> SiteResult<()> {
        let mut params: Vec<(&str, String)> = fields
            .keys()
            .map(|k| ("updateMask.fieldPaths", k.clone()))
            .collect();
        if must_exist {
            params.push(("currentDocument.exists", "true".to_string()));
        }
        let url = self.url(&[collection, id], &params)?;
        let body = json!({ "fields": document_to_fields(fields) });
        let response = with_bearer(self.http.patch(url), auth).json(&body).send().await?;
        check(response).await?;
        Ok(())
    }
}

#[async_trait]
impl DocumentStore for FirestoreClient {
    fn backend_tag(&self) -> &'static str {
        "firestore"
    }

    #[instrument(skip(self, auth))]
    async fn get_document(
        &self,
        collection: &str,
        id: &str,
        auth: Option<&Credentials>,
    ) -> SiteResult<Option<Document>> {
        let url = self.url(&[collection, id], &[])?;
        let response = with_bearer(self.http.get(url), auth).send().await?;
        match check(response).await {
            Ok(response) => {
                let doc: FirestoreDocument = response.json().await?;
                Ok(Some(fields_to_document(&doc.fields)?))
            }
            Err(SiteError::NotFound(_)) => Ok(None),
            Err(e) => Err(e),
        }
    }

    #[instrument(skip(self, auth))]
    async fn list_documents(
        &self,
        collection: &str,
        auth: Option<&Credentials>,
    ) -> SiteResult<Vec<(String, Document)>> {
        let mut out = Vec::new();
        let mut page_token: Option<String> = None;
        loop {
            let mut params = vec![("pageSize", "300".to_string())];
            if let Some(token) = &page_token {
                params.push(("pageToken", token.clone()));
            }
            let url = self.url(&[collection], &params)?;
            let response = with_bearer(self.http.get(url), auth).send().await?;
            let page: ListResponse = check(response).await?.json().await?;
            for doc in &page.documents {
                out.push((doc.id().to_string(), fields_to_document(&doc.fields)?));
            }
            match page.next_page_token {
                Some(token) if !token.is_empty() => page_token = Some(token),
                _ => break,
            }
        }
        debug!(collection, count = out.len(), "listed documents");
        Ok(out)
    }

    async fn update_fields(
        &self,
        collection: &str,
        id: &str,
        fields: &Document,
        auth: Option<&Credentials>,
    ) -> SiteResult<()> {
        self.patch(collection, id, fields, true, auth).await
    }

    async fn merge_fields(
        &self,
        collection: &str,
        id: &str,
        fields: &Document,
        auth: Option<&Credentials>,
    ) -> SiteResult<()> {
        self.patch(collection, id, fields, false, auth).await
    }

    async fn add_document(
        &self,
        collection: &str,
        fields: &Document,
        auth: Option<&Credentials>,
    ) -> SiteResult<String> {
        let url = self.url(&[collection], &[])?;
        let body = json!({ "fields": document_to_fields(fields) });
        let response = with_bearer(self.http.post(url), auth).json(&body).send().await?;
        let doc: FirestoreDocument = check(response).await?.json().await?;
        Ok(doc.id().to_string())
    }
}

// ============================================================================
// Storage Client
// ============================================================================

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct StorageObject {
    name: String,
    #[serde(default)]
    size: Option<String>,
    #[serde(default)]
    download_tokens: Option<String>,
}

pub struct StorageClient {
    http: Client,
    bucket: String,
}

impl StorageClient {
    pub fn new(http: Client, config: &FirebaseConfig) -> Self {
        Self {
            http,
            bucket: config.storage_bucket.clone(),
        }
    }

    pub fn download_url(&self, path: &str, token: &str) -> String {
        format!(
            "{}/b/{}/o/{}?alt=media&token={}",
            STORAGE_HOST,
            self.bucket,
            urlencoding::encode(path),
            urlencoding::encode(token)
        )
    }
}

#[async_trait]
impl ObjectStorage for StorageClient {
    fn backend_tag(&self) -> &'static str {
        "firebase-storage"
    }

    #[instrument(skip(self, data, progress, auth), fields(bytes = data.len()))]
    async fn put_object(
        &self,
        path: &str,
        data: Vec<u8>,
        content_type: &str,
        progress: Option<ProgressSender>,
        auth: Option<&Credentials>,
    ) -> SiteResult<StoredObject> {
        let total = data.len() as u64;
        let url = format!("{}/b/{}/o", STORAGE_HOST, self.bucket);

        let mut request = self
            .http
            .post(url)
            .query(&[("name", path), ("uploadType", "media")])
            .header(CONTENT_TYPE, content_type)
            .header(CONTENT_LENGTH, total);
        if let Some(creds) = auth {
            request = request.header(AUTHORIZATION, format!("Firebase {}", creds.id_token));
        }

        request = match progress {
            Some(tx) => {
                let chunks: Vec<Vec<u8>> = data.chunks(UPLOAD_CHUNK).map(<[u8]>::to_vec).collect();
                let mut sent = 0u64;
                let stream = futures_util::stream::iter(chunks).map(move |chunk| {
                    sent += chunk.len() as u64;
                    tx.send_replace(progress_percent(sent, total));
                    Ok::<_, std::io::Error>(chunk)
                });
                request.body(reqwest::Body::wrap_stream(stream))
            }
            None => request.body(data),
        };

        let response = check(request.send().await?).await.map_err(|e| match e {
            SiteError::PermissionDenied(_) => {
                SiteError::PermissionDenied("Permission denied. Please check authentication.".to_string())
            }
            other => other,
        })?;
        let object: StorageObject = response.json().await?;

        let token = object
            .download_tokens
            .as_deref()
            .and_then(|t| t.split(',').next())
            .filter(|t| !t.is_empty())
            .ok_or_else(|| {
                SiteError::Malformed("Upload completed but failed to get download URL".to_string())
            })?;

        Ok(StoredObject {
            download_url: self.download_url(&object.name, token),
            size: object
                .size
                .and_then(|s| s.parse().ok())
                .unwrap_or(total),
            path: object.name,
        })
    }
}

// ============================================================================
// Identity Toolkit
// ============================================================================

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct SignInResponse {
    local_id: String,
    email: String,
    id_token: String,
    refresh_token: String,
    expires_in: String,
}

/// Secure Token API answer; unlike sign-in it uses snake_case keys.
#[derive(Deserialize)]
struct RefreshResponse {
    user_id: String,
    id_token: String,
    refresh_token: String,
    expires_in: String,
}

pub struct FirebaseIdentity {
    http: Client,
    api_key: String,
}

impl FirebaseIdentity {
    pub fn new(http: Client, config: &FirebaseConfig) -> Self {
        Self {
            http,
            api_key: config.api_key.clone(),
        }
    }
}

#[async_trait]
impl IdentityProvider for FirebaseIdentity {
    #[instrument(skip(self, password))]
    async fn sign_in(&self, email: &str, password: &str) -> SiteResult<Identity> {
        let url = format!("{}/accounts:signInWithPassword", IDENTITY_HOST);
        let response = self
            .http
            .post(url)
            .query(&[("key", self.api_key.as_str())])
            .json(&json!({
                "email": email,
                "password": password,
                "returnSecureToken": true,
            }))
            .send()
            .await?;

        // Wrong passwords and unknown accounts come back as 400.
        if response.status() == StatusCode::BAD_REQUEST {
            return Err(SiteError::PermissionDenied("invalid credentials".to_string()));
        }
        let body: SignInResponse = check(response).await?.json().await?;

        Ok(Identity {
            uid: body.local_id,
            email: body.email,
            credentials: Credentials {
                id_token: body.id_token,
            },
            expires_in: body.expires_in.parse().unwrap_or(3600),
            refresh_token: body.refresh_token,
        })
    }

    #[instrument(skip_all)]
    async fn refresh(&self, refresh_token: &str) -> SiteResult<Identity> {
        let url = format!("{}/token", SECURE_TOKEN_HOST);
        let response = self
            .http
            .post(url)
            .query(&[("key", self.api_key.as_str())])
            .form(&[("grant_type", "refresh_token"), ("refresh_token", refresh_token)])
            .send()
            .await?;

        // Revoked or expired refresh tokens come back as 400.
        if response.status() == StatusCode::BAD_REQUEST {
            return Err(SiteError::PermissionDenied("refresh token rejected".to_string()));
        }
        let body: RefreshResponse = check(response).await?.json().await?;
        debug!(uid = %body.user_id, "ID token refreshed");

        Ok(Identity {
            uid: body.user_id,
            email: String::new(),
            credentials: Credentials {
                id_token: body.id_token,
            },
            expires_in: body.expires_in.parse().unwrap_or(3600),
            refresh_token: body.refresh_token,
        })
    }
}
