//! Local service model repository.
//!
//! Reads service descriptions laid out the way botocore ships them:
//!
//! ```text
//! <models_dir>/
//! ├── s3/
//! │   └── 2006-03-01/
//! │       └── service-2.json
//! └── ec2/
//!     ├── 2015-10-01/service-2.json
//!     └── 2016-11-15/service-2.json   ← latest version wins
//! ```
//!
//! Each `service-2.json` carries a `metadata` object (api version,
//! endpoint prefix, protocol, full name) and an `operations` map.

use anyhow::{bail, Context, Result};
use globset::{Glob, GlobSet, GlobSetBuilder};
use serde_json::Value;
use std::path::{Path, PathBuf};
use walkdir::WalkDir;

use asset_catalog_core::models::{ApiOperation, ServiceMeta};

use crate::config::CatalogSettings;

/// File name of a service model inside a version directory.
pub const SERVICE_MODEL_FILE: &str = "service-2.json";

/// Read-only provider of service and operation metadata.
pub trait MetadataSource: Send + Sync {
    fn list_services(&self) -> Result<Vec<ServiceMeta>>;

    fn list_operations(&self, service_name: &str) -> Result<Vec<ApiOperation>>;

    fn get_operation(&self, service_name: &str, operation: &str) -> Result<Option<ApiOperation>> {
        Ok(self
            .list_operations(service_name)?
            .into_iter()
            .find(|op| op.name == operation))
    }

    /// Every operation of every service, tagged with its service name.
    fn list_all_operations(&self) -> Result<Vec<(String, ApiOperation)>> {
        let mut all = Vec::new();
        for meta in self.list_services()? {
            let operations = self
                .list_operations(&meta.name)
                .with_context(|| format!("failed to list operations of '{}'", meta.name))?;
            all.extend(operations.into_iter().map(|op| (meta.name.clone(), op)));
        }
        Ok(all)
    }
}

/// [`MetadataSource`] over a local model directory.
pub struct ModelRepository {
    root: PathBuf,
    include: GlobSet,
    exclude: GlobSet,
}

impl ModelRepository {
    pub fn new(root: impl Into<PathBuf>) -> Result<Self> {
        Self::with_filters(root, &["**".to_string()], &[])
    }

    pub fn from_settings(settings: &CatalogSettings) -> Result<Self> {
        Self::with_filters(&settings.models_dir, &settings.include, &settings.exclude)
    }

    /// Only services whose name matches `include` and not `exclude`.
    pub fn with_filters(
        root: impl Into<PathBuf>,
        include: &[String],
        exclude: &[String],
    ) -> Result<Self> {
        Ok(Self {
            root: root.into(),
            include: build_globset(include)?,
            exclude: build_globset(exclude)?,
        })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Names of services with at least one model version, sorted.
    pub fn service_names(&self) -> Result<Vec<String>> {
        if !self.root.is_dir() {
            bail!(
                "Model repository does not exist: {}",
                self.root.display()
            );
        }

        let mut names = Vec::new();
        for entry in subdirectories(&self.root)? {
            let name = entry.0;
            if !self.include.is_match(&name) || self.exclude.is_match(&name) {
                continue;
            }
            if self.latest_version(&name)?.is_some() {
                names.push(name);
            }
        }
        Ok(names)
    }

    /// Greatest version directory of `service` that contains a model.
    pub fn latest_version(&self, service: &str) -> Result<Option<String>> {
        let service_dir = self.root.join(service);
        if !service_dir.is_dir() {
            return Ok(None);
        }
        Ok(subdirectories(&service_dir)?
            .into_iter()
            .filter(|(_, path)| path.join(SERVICE_MODEL_FILE).is_file())
            .map(|(name, _)| name)
            .max())
    }

    /// Parsed model of the latest version of `service`, with that version.
    pub fn load_model(&self, service: &str) -> Result<(String, Value)> {
        let version = self
            .latest_version(service)?
            .ok_or_else(|| anyhow::anyhow!("No model found for service '{}'", service))?;
        let path = self
            .root
            .join(service)
            .join(&version)
            .join(SERVICE_MODEL_FILE);
        let content = std::fs::read_to_string(&path)
            .with_context(|| format!("Failed to read service model: {}", path.display()))?;
        let model: Value = serde_json::from_str(&content)
            .with_context(|| format!("Failed to parse service model: {}", path.display()))?;
        Ok((version, model))
    }
}

impl MetadataSource for ModelRepository {
    fn list_services(&self) -> Result<Vec<ServiceMeta>> {
        let mut services = Vec::new();
        for name in self.service_names()? {
            match self.load_model(&name) {
                Ok((version, model)) => services.push(service_meta(&name, &version, &model)),
                Err(e) => {
                    tracing::warn!(service = %name, error = %format!("{:#}", e), "skipping unreadable service model");
                }
            }
        }
        Ok(services)
    }

    fn list_operations(&self, service_name: &str) -> Result<Vec<ApiOperation>> {
        let (_, model) = self.load_model(service_name)?;
        let mut operations: Vec<ApiOperation> = model
            .get("operations")
            .and_then(Value::as_object)
            .map(|ops| {
                ops.iter()
                    .map(|(name, op)| api_operation(name, op))
                    .collect()
            })
            .unwrap_or_default();
        operations.sort_by(|a, b| a.name.cmp(&b.name));
        Ok(operations)
    }
}

fn str_field(value: &Value, key: &str) -> String {
    value
        .get(key)
        .and_then(Value::as_str)
        .unwrap_or_default()
        .to_string()
}

fn service_meta(name: &str, version: &str, model: &Value) -> ServiceMeta {
    let metadata = model
        .get("metadata")
        .filter(|m| m.is_object())
        .cloned()
        .unwrap_or_else(|| Value::Object(Default::default()));

    let api_version = match str_field(&metadata, "apiVersion") {
        v if v.is_empty() => version.to_string(),
        v => v,
    };
    let service_full_name = [
        str_field(&metadata, "serviceFullName"),
        str_field(model, "service_full_name"),
    ]
    .into_iter()
    .find(|n| !n.is_empty())
    .unwrap_or_else(|| name.to_string());

    ServiceMeta {
        name: name.to_string(),
        api_version,
        endpoint_prefix: str_field(&metadata, "endpointPrefix"),
        protocol: str_field(&metadata, "protocol"),
        service_full_name,
        raw: metadata,
    }
}

fn api_operation(name: &str, op: &Value) -> ApiOperation {
    let http = op.get("http").cloned().unwrap_or(Value::Null);
    ApiOperation {
        name: name.to_string(),
        http_method: str_field(&http, "method"),
        http_path: str_field(&http, "requestUri"),
        input: op.get("input").cloned(),
        output: op.get("output").cloned(),
        documentation: str_field(op, "documentation"),
        raw: op.clone(),
    }
}

/// Immediate subdirectories of `dir` as `(name, path)`, sorted by name.
fn subdirectories(dir: &Path) -> Result<Vec<(String, PathBuf)>> {
    let mut dirs = Vec::new();
    for entry in WalkDir::new(dir)
        .min_depth(1)
        .max_depth(1)
        .sort_by_file_name()
    {
        let entry = entry?;
        if !entry.file_type().is_dir() {
            continue;
        }
        let name = entry.file_name().to_string_lossy().to_string();
        if name.starts_with('.') {
            continue;
        }
        dirs.push((name, entry.path().to_path_buf()));
    }
    Ok(dirs)
}

fn build_globset(patterns: &[String]) -> Result<GlobSet> {
    let mut builder = GlobSetBuilder::new();
    for pattern in patterns {
        builder.add(Glob::new(pattern)?);
    }
    Ok(builder.build()?)
}
