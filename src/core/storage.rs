use anyhow::{Context, Result};
use async_trait::async_trait;
use aws_sdk_s3 as s3;
use aws_smithy_http_client::hyper_014::HyperClientBuilder;
use s3::config::{BehaviorVersion, Credentials, Region};
use s3::primitives::ByteStream;
use s3::types::{BucketLocationConstraint, CreateBucketConfiguration};
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};

use crate::config::BackupJob;
use crate::config::models::DEFAULT_REGION;

/// Content type attached to every uploaded dump
pub const DUMP_CONTENT_TYPE: &str = "application/sql";

const IDLE_CONNECTION_TIMEOUT: Duration = Duration::from_secs(120);

/// Bucket-level operations a backup run needs from an object store
#[async_trait]
pub trait ObjectStore: Send + Sync {
    async fn bucket_exists(&self, bucket: &str) -> Result<bool>;

    async fn create_bucket(&self, bucket: &str, region: &str) -> Result<()>;

    async fn upload_file(
        &self,
        bucket: &str,
        key: &str,
        file_path: &Path,
        content_type: &str,
    ) -> Result<()>;
}

/// Builds an [`ObjectStore`] client from a job's endpoint and credentials
#[async_trait]
pub trait StorageConnector: Send + Sync {
    async fn connect(&self, job: &BackupJob) -> Result<Box<dyn ObjectStore>>;
}

/// Connector for S3-compatible services (AWS, MinIO, Spaces, ...)
#[derive(Debug, Default, Clone)]
pub struct S3Connector;

#[async_trait]
impl StorageConnector for S3Connector {
    async fn connect(&self, job: &BackupJob) -> Result<Box<dyn ObjectStore>> {
        let endpoint = normalize_endpoint(&job.endpoint);
        debug!("Connecting to object store {} for job {}", endpoint, job.name);

        let loader = aws_config::defaults(BehaviorVersion::latest())
            .endpoint_url(&endpoint)
            .region(Region::new(job.region.clone()))
            .credentials_provider(Credentials::new(
                job.access_key.clone(),
                job.secret_key.clone(),
                None,
                None,
                "Static",
            ));

        if job.tls_insecure {
            warn!(
                "TLS certificate verification is DISABLED for {} (job {})",
                endpoint, job.name
            );
        }
        let loader = with_http_client(loader, job.tls_insecure);

        let sdk_config = loader.load().await;
        let s3_config = s3::config::Builder::from(&sdk_config)
            .force_path_style(true)
            .build();

        Ok(Box::new(S3ObjectStore {
            client: s3::Client::from_conf(s3_config),
        }))
    }
}

pub struct S3ObjectStore {
    client: s3::Client,
}

#[async_trait]
impl ObjectStore for S3ObjectStore {
    async fn bucket_exists(&self, bucket: &str) -> Result<bool> {
        match self.client.head_bucket().bucket(bucket).send().await {
            Ok(_) => Ok(true),
            Err(err) => {
                let not_found = err
                    .as_service_error()
                    .map(|e| e.is_not_found())
                    .unwrap_or(false)
                    || err
                        .raw_response()
                        .map(|r| r.status().as_u16() == 404)
                        .unwrap_or(false);

                if not_found {
                    Ok(false)
                } else {
                    Err(anyhow::Error::new(err)
                        .context(format!("Failed to check whether bucket {} exists", bucket)))
                }
            }
        }
    }

    async fn create_bucket(&self, bucket: &str, region: &str) -> Result<()> {
        let mut request = self.client.create_bucket().bucket(bucket);

        // us-east-1 is the implicit location and must not be sent as a constraint
        if !region.is_empty() && region != DEFAULT_REGION {
            request = request.create_bucket_configuration(
                CreateBucketConfiguration::builder()
                    .location_constraint(BucketLocationConstraint::from(region))
                    .build(),
            );
        }

        request
            .send()
            .await
            .with_context(|| format!("Failed to create bucket {} in {}", bucket, region))?;

        Ok(())
    }

    async fn upload_file(
        &self,
        bucket: &str,
        key: &str,
        file_path: &Path,
        content_type: &str,
    ) -> Result<()> {
        info!(
            "Uploading {} to bucket {} with key {}",
            file_path.display(),
            bucket,
            key
        );

        let body = ByteStream::from_path(file_path)
            .await
            .with_context(|| format!("Failed to create ByteStream from file: {}", file_path.display()))?;

        self.client
            .put_object()
            .bucket(bucket)
            .key(key)
            .content_type(content_type)
            .body(body)
            .send()
            .await
            .with_context(|| {
                format!(
                    "Failed to upload file {} to bucket {} with key {}",
                    file_path.display(),
                    bucket,
                    key
                )
            })?;

        Ok(())
    }
}

/// Endpoints are often written as bare `host:port`; default those to HTTPS
pub fn normalize_endpoint(endpoint: &str) -> String {
    let endpoint = endpoint.trim().trim_end_matches('/');
    if endpoint.contains("://") {
        endpoint.to_string()
    } else {
        format!("https://{}", endpoint)
    }
}

/// HTTP client with a bounded idle pool. With `tls_insecure` any server
/// certificate is accepted; otherwise the webpki roots are trusted.
fn with_http_client(
    loader: aws_config::ConfigLoader,
    tls_insecure: bool,
) -> aws_config::ConfigLoader {
    let builder = hyper_rustls::HttpsConnectorBuilder::new();
    let builder = if tls_insecure {
        builder.with_tls_config(
            rustls::ClientConfig::builder()
                .with_safe_defaults()
                .with_custom_certificate_verifier(Arc::new(AcceptAnyServerCert))
                .with_no_client_auth(),
        )
    } else {
        builder.with_webpki_roots()
    };

    let connector = builder.https_or_http().enable_http1().enable_http2().build();

    let mut hyper_builder = hyper::Client::builder();
    hyper_builder.pool_idle_timeout(IDLE_CONNECTION_TIMEOUT);

    loader.http_client(
        HyperClientBuilder::new()
            .hyper_builder(hyper_builder)
            .build(connector),
    )
}

struct AcceptAnyServerCert;

impl rustls::client::ServerCertVerifier for AcceptAnyServerCert {
    fn verify_server_cert(
        &self,
        _end_entity: &rustls::Certificate,
        _intermediates: &[rustls::Certificate],
        _server_name: &rustls::ServerName,
        _scts: &mut dyn Iterator<Item = &[u8]>,
        _ocsp_response: &[u8],
        _now: std::time::SystemTime,
    ) -> Result<rustls::client::ServerCertVerified, rustls::Error> {
        Ok(rustls::client::ServerCertVerified::assertion())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::testing::create_test_job;
    use axum::{
        extract::{Request, State},
        http::{header, Method, StatusCode},
        Router,
    };
    use std::sync::Mutex;

    #[derive(Debug, Clone)]
    struct RecordedRequest {
        method: Method,
        path: String,
        content_type: Option<String>,
        body: Vec<u8>,
    }

    #[derive(Clone, Default)]
    struct StubState {
        requests: Arc<Mutex<Vec<RecordedRequest>>>,
    }

    impl StubState {
        fn requests(&self) -> Vec<RecordedRequest> {
            self.requests.lock().unwrap().clone()
        }
    }

    /// Answers 404 to `HEAD /missing` and 200 to everything else
    async fn record(State(state): State<StubState>, request: Request) -> StatusCode {
        let (parts, body) = request.into_parts();
        let body = axum::body::to_bytes(body, usize::MAX)
            .await
            .unwrap_or_default();

        state.requests.lock().unwrap().push(RecordedRequest {
            method: parts.method.clone(),
            path: parts.uri.path().to_string(),
            content_type: parts
                .headers
                .get(header::CONTENT_TYPE)
                .and_then(|v| v.to_str().ok())
                .map(str::to_string),
            body: body.to_vec(),
        });

        if parts.method == Method::HEAD && parts.uri.path() == "/missing" {
            StatusCode::NOT_FOUND
        } else {
            StatusCode::OK
        }
    }

    async fn connect_to_stub() -> (Box<dyn ObjectStore>, StubState) {
        let state = StubState::default();
        let app = Router::new().fallback(record).with_state(state.clone());

        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move { axum::serve(listener, app).await.unwrap() });

        let mut job = create_test_job("shop-db", Some("shop"));
        job.endpoint = format!("http://{}", addr);
        let store = S3Connector.connect(&job).await.unwrap();
        (store, state)
    }

    #[test]
    fn test_normalize_endpoint() {
        assert_eq!(normalize_endpoint("play.min.io"), "https://play.min.io");
        assert_eq!(normalize_endpoint("minio:9000/"), "https://minio:9000");
        assert_eq!(normalize_endpoint("http://minio:9000"), "http://minio:9000");
        assert_eq!(
            normalize_endpoint(" https://s3.eu-west-1.amazonaws.com "),
            "https://s3.eu-west-1.amazonaws.com"
        );
    }

    #[tokio::test]
    async fn test_bucket_exists_maps_not_found_to_false() {
        let (store, stub) = connect_to_stub().await;

        assert!(!store.bucket_exists("missing").await.unwrap());
        assert!(store.bucket_exists("present").await.unwrap());

        let requests = stub.requests();
        assert_eq!(requests.len(), 2);
        assert!(requests.iter().all(|r| r.method == Method::HEAD));
        assert_eq!(requests[0].path, "/missing");
    }

    #[tokio::test]
    async fn test_create_bucket_in_default_region_sends_no_constraint() {
        let (store, stub) = connect_to_stub().await;

        store.create_bucket("backups", "us-east-1").await.unwrap();

        let requests = stub.requests();
        assert_eq!(requests.len(), 1);
        assert_eq!(requests[0].method, Method::PUT);
        assert_eq!(requests[0].path, "/backups");
        assert!(requests[0].body.is_empty(), "No location constraint expected");
    }

    #[tokio::test]
    async fn test_create_bucket_in_other_region_sends_constraint() {
        let (store, stub) = connect_to_stub().await;

        store.create_bucket("backups", "eu-central-1").await.unwrap();

        let requests = stub.requests();
        assert_eq!(requests.len(), 1);
        let body = String::from_utf8_lossy(&requests[0].body);
        assert!(
            body.contains("<LocationConstraint>eu-central-1</LocationConstraint>"),
            "{}",
            body
        );
    }

    #[tokio::test]
    async fn test_upload_sets_key_and_content_type() {
        let (store, stub) = connect_to_stub().await;
        let dir = tempfile::tempdir().unwrap();
        let file = dir.path().join("dump.sql");
        tokio::fs::write(&file, b"0123456789").await.unwrap();

        store
            .upload_file("backups", "shop-db/2026-10-15T02:00:00Z.sql", &file, DUMP_CONTENT_TYPE)
            .await
            .unwrap();

        let requests = stub.requests();
        assert_eq!(requests.len(), 1);
        let upload = &requests[0];
        assert_eq!(upload.method, Method::PUT);
        assert!(upload.path.starts_with("/backups/shop-db/"), "{}", upload.path);
        assert!(upload.path.ends_with(".sql"), "{}", upload.path);
        assert_eq!(upload.content_type.as_deref(), Some(DUMP_CONTENT_TYPE));
        assert!(
            upload.body.windows(10).any(|w| w == b"0123456789"),
            "Dump bytes should be in the request body"
        );
    }

    #[tokio::test]
    async fn test_connect_with_insecure_tls() {
        let mut job = create_test_job("shop-db", None);
        job.tls_insecure = true;
        assert!(S3Connector.connect(&job).await.is_ok());
    }

    #[tokio::test]
    async fn test_connect_with_verified_tls() {
        let job = create_test_job("shop-db", None);
        assert!(S3Connector.connect(&job).await.is_ok());
    }
}
