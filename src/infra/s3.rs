//! Object store adapter for S3-compatible services.

use async_trait::async_trait;
use aws_sdk_s3::{
    Client,
    config::{BehaviorVersion, Builder as S3ConfigBuilder, Credentials, Region},
    error::{ProvideErrorMetadata, SdkError},
    operation::get_object::GetObjectError,
};
use tracing::debug;

use crate::{
    application::ports::{ObjectStore, ObjectStoreError, StoredObject},
    config::S3Settings,
};

const CREDENTIALS_PROVIDER: &str = "magicbox";
const NO_SUCH_KEY: &str = "NoSuchKey";

#[derive(Clone)]
pub struct S3ObjectStore {
    client: Client,
    bucket: String,
}

impl S3ObjectStore {
    /// Build a client from static credentials. No network traffic happens here.
    pub fn from_settings(settings: &S3Settings) -> Self {
        let credentials = Credentials::new(
            settings.credential_id.clone(),
            settings.credential_secret.expose().to_string(),
            None,
            None,
            CREDENTIALS_PROVIDER,
        );

        let config = S3ConfigBuilder::new()
            .behavior_version(BehaviorVersion::latest())
            .credentials_provider(credentials)
            .endpoint_url(settings.endpoint.clone())
            .region(Region::new(settings.region.clone()))
            .force_path_style(settings.force_path_style)
            .build();

        Self {
            client: Client::from_conf(config),
            bucket: settings.bucket_name.clone(),
        }
    }

    pub fn bucket(&self) -> &str {
        &self.bucket
    }
}

/// Only a missing key is a miss. A missing bucket also answers 404 but is a
/// deployment fault and must surface as a transport error.
fn is_not_found(err: &SdkError<GetObjectError>) -> bool {
    err.as_service_error().is_some_and(is_missing_key)
}

fn is_missing_key(err: &GetObjectError) -> bool {
    err.is_no_such_key() || err.code() == Some(NO_SUCH_KEY)
}

#[async_trait]
impl ObjectStore for S3ObjectStore {
    async fn fetch(&self, key: &str) -> Result<StoredObject, ObjectStoreError> {
        let output = match self
            .client
            .get_object()
            .bucket(&self.bucket)
            .key(key)
            .send()
            .await
        {
            Ok(output) => output,
            Err(err) if is_not_found(&err) => {
                debug!(target = "magicbox::s3", key, "object not found");
                return Err(ObjectStoreError::NotFound);
            }
            Err(err) => return Err(ObjectStoreError::transport(err)),
        };

        let content_type = output.content_type().map(str::to_string);
        let body = output
            .body
            .collect()
            .await
            .map_err(ObjectStoreError::transport)?
            .into_bytes();

        Ok(StoredObject { body, content_type })
    }
}
