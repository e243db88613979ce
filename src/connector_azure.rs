//! Azure Blob Storage transfer.
//!
//! Downloads a whole container into a local scratch directory and uploads
//! local files as block blobs. Listing, downloads and uploads go through
//! `object_store`'s Azure backend; the connection string is mapped onto its
//! builder. Creating the container is the one call `object_store` does not
//! offer, so it is a single Shared Key (or SAS) signed REST request.
//!
//! # Environment Variables
//!
//! - `AZURE_CONN_STRING`: storage account connection string
//! - `AZURE_CONTAINER_NAME`: container name (unless `storage.container` is set)
//!
//! Both variable names are configurable under `[storage]`.
//!
//! # Connection strings
//!
//! ```text
//! DefaultEndpointsProtocol=https;AccountName=acme;AccountKey=<base64>;EndpointSuffix=core.windows.net
//! BlobEndpoint=https://acme.blob.core.windows.net;SharedAccessSignature=sv=2021-08-06&sig=...
//! UseDevelopmentStorage=true
//! ```
//!
//! `BlobEndpoint` overrides the endpoint derived from the account name,
//! which is how private endpoints are reached. `UseDevelopmentStorage`
//! targets a local Azurite emulator.

use std::path::{Component, Path, PathBuf};
use std::sync::Arc;

use anyhow::{bail, Context, Result};
use base64::Engine;
use chrono::Utc;
use futures::TryStreamExt;
use hmac::{Hmac, Mac};
use object_store::azure::{AzureConfigKey, MicrosoftAzureBuilder};
use object_store::path::Path as StorePath;
use object_store::{Attribute, Attributes, ObjectMeta, ObjectStore, PutOptions, PutPayload};
use sha2::Sha256;
use tracing::{info, warn};

use crate::config::StorageConfig;

type HmacSha256 = Hmac<Sha256>;

const API_VERSION: &str = "2021-08-06";
const DEV_ACCOUNT: &str = "devstoreaccount1";
const DEV_ACCOUNT_KEY: &str =
    "Eby8vdM02xNOcqFlqUwJPLlmEtlCDXJ1OUzFT50uSRZ6IFsuFq2UVErCz4I6tq/K1SZFPTOtr/KBHBeksoGMGw==";
const DEV_BLOB_ENDPOINT: &str = "http://127.0.0.1:10000/devstoreaccount1";

/// Connection string and container, resolved from config + environment.
#[derive(Debug, Clone)]
pub struct StorageSettings {
    pub connection_string: String,
    pub container: String,
}

impl StorageSettings {
    pub fn from_config(config: &StorageConfig) -> Result<Self> {
        match (config.connection_string(), config.container_name()) {
            (Some(connection_string), Some(container)) => Ok(Self {
                connection_string,
                container,
            }),
            _ => bail!(
                "Azure connection details not found: set {} and {} (or storage.container)",
                config.connection_string_env,
                config.container_env
            ),
        }
    }
}

// ============ Connection string ============

#[derive(Debug, Clone, PartialEq, Eq)]
enum Auth {
    /// Base64 account key, as it appears in the connection string.
    SharedKey { key: String },
    Sas(String),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AzureAccount {
    account: String,
    /// Blob service endpoint without a trailing slash.
    endpoint: String,
    auth: Auth,
    emulator: bool,
}

impl AzureAccount {
    pub fn parse(connection_string: &str) -> Result<Self> {
        let mut protocol = "https".to_string();
        let mut account = None;
        let mut account_key = None;
        let mut suffix = "core.windows.net".to_string();
        let mut blob_endpoint = None;
        let mut sas = None;
        let mut emulator = false;

        for part in connection_string.split(';') {
            let part = part.trim();
            if part.is_empty() {
                continue;
            }
            let Some((key, value)) = part.split_once('=') else {
                bail!("Malformed connection string segment: '{}'", part);
            };
            match key {
                "DefaultEndpointsProtocol" => protocol = value.to_string(),
                "AccountName" => account = Some(value.to_string()),
                "AccountKey" => account_key = Some(value.trim().to_string()),
                "EndpointSuffix" => suffix = value.to_string(),
                "BlobEndpoint" => blob_endpoint = Some(value.trim_end_matches('/').to_string()),
                "SharedAccessSignature" => sas = Some(value.trim_start_matches('?').to_string()),
                "UseDevelopmentStorage" => emulator = value.eq_ignore_ascii_case("true"),
                _ => {}
            }
        }

        if emulator {
            account.get_or_insert_with(|| DEV_ACCOUNT.to_string());
            account_key.get_or_insert_with(|| DEV_ACCOUNT_KEY.to_string());
            blob_endpoint.get_or_insert_with(|| DEV_BLOB_ENDPOINT.to_string());
        }

        let endpoint = match (&blob_endpoint, &account) {
            (Some(endpoint), _) => endpoint.clone(),
            (None, Some(account)) => format!("{}://{}.blob.{}", protocol, account, suffix),
            (None, None) => bail!("Connection string needs AccountName or BlobEndpoint"),
        };

        let auth = match (account_key, sas) {
            (Some(key), _) => {
                base64::engine::general_purpose::STANDARD
                    .decode(&key)
                    .context("AccountKey is not valid base64")?;
                if account.is_none() {
                    bail!("AccountKey requires AccountName");
                }
                Auth::SharedKey { key }
            }
            (None, Some(sas)) => Auth::Sas(sas),
            (None, None) => bail!("Connection string has neither AccountKey nor SharedAccessSignature"),
        };

        // SAS strings often carry only BlobEndpoint; the account is its
        // first host label (`acme` in `acme.blob.core.windows.net`).
        let account = match account {
            Some(account) => account,
            None => reqwest::Url::parse(&endpoint)
                .ok()
                .and_then(|u| u.host_str().and_then(|h| h.split('.').next()).map(str::to_string))
                .filter(|a| !a.is_empty())
                .with_context(|| format!("Cannot derive account name from {}", endpoint))?,
        };

        Ok(Self {
            account,
            endpoint,
            auth,
            emulator,
        })
    }

    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }

    /// `object_store` configuration for `container` in this account.
    fn store_builder(&self, container: &str) -> MicrosoftAzureBuilder {
        let builder = MicrosoftAzureBuilder::new().with_container_name(container);
        if self.emulator {
            return builder.with_use_emulator(true).with_allow_http(true);
        }

        let builder = builder
            .with_account(&self.account)
            .with_endpoint(self.endpoint.clone())
            .with_allow_http(self.endpoint.starts_with("http://"));
        match &self.auth {
            Auth::SharedKey { key } => builder.with_access_key(key),
            Auth::Sas(sas) => builder.with_config(AzureConfigKey::SasKey, sas),
        }
    }
}

// ============ Shared Key signing ============

/// The Shared Key string-to-sign for a Blob service request.
///
/// ```text
/// VERB \n Content-Encoding \n Content-Language \n Content-Length \n
/// Content-MD5 \n Content-Type \n Date \n If-Modified-Since \n If-Match \n
/// If-None-Match \n If-Unmodified-Since \n Range \n
/// CanonicalizedHeaders CanonicalizedResource
/// ```
///
/// `Content-Length` is empty when zero.
fn string_to_sign(
    verb: &str,
    content_length: usize,
    content_type: &str,
    ms_headers: &[(String, String)],
    canonical_resource: &str,
) -> String {
    let length = if content_length == 0 {
        String::new()
    } else {
        content_length.to_string()
    };

    let mut headers: Vec<(String, String)> = ms_headers
        .iter()
        .map(|(k, v)| (k.to_lowercase(), v.trim().to_string()))
        .collect();
    headers.sort_by(|a, b| a.0.cmp(&b.0));
    let canonical_headers: String = headers
        .iter()
        .map(|(k, v)| format!("{}:{}\n", k, v))
        .collect();

    format!(
        "{}\n\n\n{}\n\n{}\n\n\n\n\n\n\n{}{}",
        verb, length, content_type, canonical_headers, canonical_resource
    )
}

/// `/<account><path>` followed by `\nname:value` per query parameter,
/// names lowercased and sorted.
fn canonicalized_resource(account: &str, path: &str, query: &[(&str, &str)]) -> String {
    let mut out = format!("/{}{}", account, path);
    let mut params: Vec<(String, &str)> = query.iter().map(|(k, v)| (k.to_lowercase(), *v)).collect();
    params.sort_by(|a, b| a.0.cmp(&b.0));
    for (k, v) in params {
        out.push_str(&format!("\n{}:{}", k, v));
    }
    out
}

fn sign(key: &[u8], string_to_sign: &str) -> String {
    let mut mac = HmacSha256::new_from_slice(key).expect("HMAC can take key of any size");
    mac.update(string_to_sign.as_bytes());
    base64::engine::general_purpose::STANDARD.encode(mac.finalize().into_bytes())
}

/// Create Container. `Ok(false)` when it already exists (HTTP 409).
async fn create_container(account: &AzureAccount, container: &str) -> Result<bool> {
    let query = [("restype", "container")];
    let mut url = reqwest::Url::parse(&format!("{}/{}", account.endpoint, container))
        .with_context(|| format!("Invalid blob endpoint: {}", account.endpoint))?;
    url.query_pairs_mut().extend_pairs(query);

    let ms_headers = vec![
        ("x-ms-date".to_string(), Utc::now().format("%a, %d %b %Y %H:%M:%S GMT").to_string()),
        ("x-ms-version".to_string(), API_VERSION.to_string()),
    ];

    let mut authorization = None;
    match &account.auth {
        Auth::SharedKey { key } => {
            let key = base64::engine::general_purpose::STANDARD
                .decode(key)
                .context("AccountKey is not valid base64")?;
            let resource = canonicalized_resource(&account.account, url.path(), &query);
            let to_sign = string_to_sign("PUT", 0, "", &ms_headers, &resource);
            authorization = Some(format!("SharedKey {}:{}", account.account, sign(&key, &to_sign)));
        }
        Auth::Sas(sas) => {
            let combined = format!("{}&{}", url.query().unwrap_or_default(), sas);
            url.set_query(Some(&combined));
        }
    }

    let mut request = reqwest::Client::new().put(url);
    for (k, v) in &ms_headers {
        request = request.header(k.as_str(), v.as_str());
    }
    if let Some(auth) = authorization {
        request = request.header("Authorization", auth);
    }

    let resp = request
        .header("Content-Length", "0")
        .send()
        .await
        .with_context(|| format!("Failed to create container '{}'", container))?;

    match resp.status().as_u16() {
        200..=299 => Ok(true),
        409 => Ok(false),
        _ => {
            let status = resp.status();
            let body = resp.text().await.unwrap_or_default();
            bail!(
                "Create Container failed (HTTP {}): {}",
                status,
                body.chars().take(500).collect::<String>()
            );
        }
    }
}

// ============ Blob store ============

struct BlobStore {
    account: AzureAccount,
    container: String,
    store: Arc<dyn ObjectStore>,
}

impl BlobStore {
    fn connect(settings: &StorageSettings) -> Result<Self> {
        let account = AzureAccount::parse(&settings.connection_string)?;
        let store = account
            .store_builder(&settings.container)
            .build()
            .with_context(|| format!("Failed to configure container '{}'", settings.container))?;
        Ok(Self {
            account,
            container: settings.container.clone(),
            store: Arc::new(store),
        })
    }

    async fn list(&self) -> Result<Vec<ObjectMeta>> {
        self.store
            .list(None)
            .try_collect::<Vec<ObjectMeta>>()
            .await
            .with_context(|| format!("Failed to list blobs in container '{}'", self.container))
    }

    async fn get(&self, location: &StorePath) -> Result<Vec<u8>> {
        let bytes = self
            .store
            .get(location)
            .await
            .with_context(|| format!("Failed to download blob '{}'", location))?
            .bytes()
            .await
            .with_context(|| format!("Failed to read blob '{}'", location))?;
        Ok(bytes.to_vec())
    }

    async fn put(&self, name: &str, body: Vec<u8>, content_type: &str) -> Result<()> {
        let mut attributes = Attributes::new();
        attributes.insert(Attribute::ContentType, content_type.to_string().into());
        let opts = PutOptions {
            attributes,
            ..PutOptions::default()
        };
        self.store
            .put_opts(&StorePath::from(name), PutPayload::from(body), opts)
            .await
            .with_context(|| format!("Failed to upload blob '{}'", name))?;
        Ok(())
    }
}

// ============ Public operations ============

/// A downloaded container. The scratch directory is removed on drop.
pub struct FetchedBatch {
    pub dir: tempfile::TempDir,
    pub paths: Vec<PathBuf>,
}

#[derive(Debug, Default)]
pub struct PushReport {
    /// `true` when the container did not exist before this push.
    pub created_container: bool,
    pub uploaded: Vec<String>,
    pub skipped: Vec<PathBuf>,
    pub failed: Vec<(String, String)>,
}

/// Blob names that stay inside the target directory when joined.
fn is_safe_blob_name(name: &str) -> bool {
    !name.is_empty()
        && !name.ends_with('/')
        && Path::new(name)
            .components()
            .all(|c| matches!(c, Component::Normal(_)))
}

/// Download every blob into `dir`, preserving the blob path.
pub async fn fetch_into(settings: &StorageSettings, dir: &Path) -> Result<Vec<PathBuf>> {
    let blobs = BlobStore::connect(settings)?;
    let objects = blobs.list().await?;

    let mut paths = Vec::with_capacity(objects.len());
    for object in &objects {
        let name = object.location.as_ref();
        if !is_safe_blob_name(name) {
            warn!(blob = %name, "skipping blob with unsafe name");
            continue;
        }

        let path = dir.join(name);
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let bytes = blobs.get(&object.location).await?;
        std::fs::write(&path, bytes)
            .with_context(|| format!("Failed to write {}", path.display()))?;
        paths.push(path);
    }

    info!(
        container = %settings.container,
        files = paths.len(),
        "downloaded container"
    );
    Ok(paths)
}

/// Download the whole container into a fresh scratch directory.
pub async fn fetch_all(settings: &StorageSettings) -> Result<FetchedBatch> {
    let dir = tempfile::Builder::new().prefix("chx-").tempdir()?;
    let paths = fetch_into(settings, dir.path()).await?;
    Ok(FetchedBatch { dir, paths })
}

/// Upload `files` (path, content type) as block blobs named by base name.
/// Missing files and failed uploads are reported, not fatal.
pub async fn push(settings: &StorageSettings, files: &[(PathBuf, String)]) -> Result<PushReport> {
    let blobs = BlobStore::connect(settings)?;
    let mut report = PushReport {
        created_container: create_container(&blobs.account, &blobs.container).await?,
        ..PushReport::default()
    };
    if report.created_container {
        info!(container = %settings.container, "created container");
    }

    for (path, content_type) in files {
        if !path.is_file() {
            warn!(file = %path.display(), "file not found, skipping");
            report.skipped.push(path.clone());
            continue;
        }

        let name = crate::extract::display_name(path);
        let result = match std::fs::read(path) {
            Ok(bytes) => blobs.put(&name, bytes, content_type).await,
            Err(e) => Err(e.into()),
        };
        match result {
            Ok(()) => {
                info!(blob = %name, content_type = %content_type, "uploaded");
                report.uploaded.push(name);
            }
            Err(e) => {
                warn!(blob = %name, error = %e, "upload failed");
                report.failed.push((name, format!("{:#}", e)));
            }
        }
    }

    Ok(report)
}

/// MIME type by extension, falling back to `application/octet-stream`.
pub fn guess_content_type(path: &Path) -> &'static str {
    let ext = path
        .extension()
        .and_then(|e| e.to_str())
        .map(|e| e.to_lowercase())
        .unwrap_or_default();
    match ext.as_str() {
        "pdf" => "application/pdf",
        "csv" => "text/csv",
        "xlsx" => "application/vnd.openxmlformats-officedocument.spreadsheetml.sheet",
        "xls" => "application/vnd.ms-excel",
        "docx" => "application/vnd.openxmlformats-officedocument.wordprocessingml.document",
        "pptx" => "application/vnd.openxmlformats-officedocument.presentationml.presentation",
        "txt" => "text/plain",
        "md" => "text/markdown",
        "json" => "application/json",
        "xml" => "application/xml",
        "html" | "htm" => "text/html",
        "png" => "image/png",
        "jpg" | "jpeg" => "image/jpeg",
        "zip" => "application/zip",
        _ => "application/octet-stream",
    }
}
