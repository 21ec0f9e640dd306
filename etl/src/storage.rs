use bytes::Bytes;
use common::config::StorageSettings;
use common::{Error, Result};
use datafusion::execution::context::SessionContext;
use futures::TryStreamExt;
use object_store::path::Path as ObjectPath;
use object_store::{parse_url, parse_url_opts, ObjectStore};
use std::sync::Arc;
use url::Url;

/// A resolved read or write root: an object store plus the base path the
/// pipeline operates under. Covers plain local paths, file:// URLs and
/// s3://bucket/prefix URLs; credentials and region are passed through to
/// the store and never interpreted here.
pub struct StorageLocation {
    url: Url,
    store: Arc<dyn ObjectStore>,
    base: ObjectPath,
}

impl StorageLocation {
    pub fn from_root(root: &str, settings: &StorageSettings) -> Result<Self> {
        let url = normalize_root(root)?;
        let (store, base) = if url.scheme() == "s3" {
            parse_url_opts(&url, s3_options(settings))?
        } else {
            parse_url(&url)?
        };

        Ok(Self {
            url,
            store: Arc::from(store),
            base,
        })
    }

    /// Makes the location's store available to DataFusion scans and writes.
    pub fn register(&self, ctx: &SessionContext) {
        ctx.register_object_store(&self.url, self.store.clone());
    }

    pub fn url(&self) -> &Url {
        &self.url
    }

    /// Lists every object under `prefix` whose key ends with `extension`,
    /// in lexicographic key order. A missing prefix lists as empty.
    pub async fn list_files(&self, prefix: &str, extension: &str) -> Result<Vec<ObjectPath>> {
        let list_prefix = self.child_path(prefix);
        let mut stream = self.store.list(Some(&list_prefix));

        let mut files = Vec::new();
        loop {
            match stream.try_next().await {
                Ok(Some(meta)) => {
                    if meta.location.as_ref().ends_with(extension) {
                        files.push(meta.location);
                    }
                }
                Ok(None) => break,
                Err(err) if Error::is_not_found(&err) => break,
                Err(err) => return Err(err.into()),
            }
        }

        files.sort_unstable_by(|a, b| a.as_ref().cmp(b.as_ref()));
        Ok(files)
    }

    pub async fn fetch(&self, location: &ObjectPath) -> Result<Bytes> {
        Ok(self.store.get(location).await?.bytes().await?)
    }

    /// Removes every object under `prefix`. Returns the number of objects
    /// deleted so callers can log overwrites.
    pub async fn delete_prefix(&self, prefix: &str) -> Result<usize> {
        let files = self.list_files(prefix, "").await?;
        for location in &files {
            self.store.delete(location).await?;
        }
        Ok(files.len())
    }

    /// Destination URI for one output table, as understood by DataFusion.
    pub fn table_uri(&self, table: &str) -> String {
        format!("{}/{}/", self.url.as_str().trim_end_matches('/'), table)
    }

    fn child_path(&self, suffix: &str) -> ObjectPath {
        if suffix.is_empty() {
            self.base.clone()
        } else if self.base.as_ref().is_empty() {
            ObjectPath::from(suffix)
        } else {
            ObjectPath::from(format!("{}/{}", self.base, suffix))
        }
    }
}

fn normalize_root(root: &str) -> Result<Url> {
    if root.contains("://") {
        return Ok(Url::parse(root)?);
    }

    // Plain local path. Created up front so a fresh destination directory
    // can be resolved to an absolute file URL.
    let path = std::path::Path::new(root);
    if !path.exists() {
        std::fs::create_dir_all(path)?;
    }
    let path = path.canonicalize()?;
    Url::from_directory_path(&path)
        .map_err(|_| Error::InvalidInput(format!("cannot derive a file URL from '{}'", root)))
}

fn s3_options(settings: &StorageSettings) -> Vec<(String, String)> {
    let mut options = Vec::new();
    if let Some(region) = &settings.region {
        options.push(("aws_region".to_string(), region.clone()));
    }
    if let Some(endpoint) = &settings.endpoint {
        options.push(("aws_endpoint".to_string(), endpoint.clone()));
        options.push(("aws_allow_http".to_string(), "true".to_string()));
    }
    if let Some(access_key) = &settings.access_key {
        options.push(("aws_access_key_id".to_string(), access_key.clone()));
    }
    if let Some(secret_key) = &settings.secret_key {
        options.push(("aws_secret_access_key".to_string(), secret_key.clone()));
    }
    options
}
