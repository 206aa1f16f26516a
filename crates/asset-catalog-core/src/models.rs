//! Core data models used throughout the asset catalog.
//!
//! These types represent the asset records that flow from the metadata
//! source into the document store, and the service/operation descriptors
//! the metadata source produces.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// A stored document: a JSON object keyed by field name.
pub type Document = Map<String, Value>;

/// Internal identity field assigned by the store.
pub const ID_FIELD: &str = "_id";
/// Set once, on first insert.
pub const CREATE_TIME_FIELD: &str = "_create_time";
/// Set on every write.
pub const UPDATE_TIME_FIELD: &str = "_update_time";
/// Soft-delete flag.
pub const EXPIRED_FIELD: &str = "_expired";

pub const DEFAULT_PROVIDER: &str = "aws";

/// Asset kind for a cloud service.
pub const PRODUCT_ASSET: &str = "product";
/// Asset kind for a single API operation of a cloud service.
pub const PRODUCT_ACTION_ASSET: &str = "product_action";

/// The unit of persistence.
///
/// `(asset_id, cloud_account_id)` is the composite identity of a record
/// within its collection `asset.<provider>.<asset>`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AssetRecord {
    #[serde(default = "default_provider")]
    pub provider: String,
    pub service: String,
    pub asset: String,
    pub asset_id: String,
    pub asset_name: String,
    /// Empty when the asset is account-agnostic (catalog metadata rather
    /// than a live resource).
    #[serde(default)]
    pub cloud_account_id: String,
}

fn default_provider() -> String {
    DEFAULT_PROVIDER.to_string()
}

impl AssetRecord {
    pub fn new(
        service: impl Into<String>,
        asset: impl Into<String>,
        asset_id: impl Into<String>,
        asset_name: impl Into<String>,
    ) -> Self {
        Self {
            provider: default_provider(),
            service: service.into(),
            asset: asset.into(),
            asset_id: asset_id.into(),
            asset_name: asset_name.into(),
            cloud_account_id: String::new(),
        }
    }

    /// Record describing a whole service: `<service_name>_<api_version>`.
    pub fn for_service(meta: &ServiceMeta) -> Self {
        Self::new(
            PRODUCT_ASSET,
            PRODUCT_ASSET,
            format!("{}_{}", meta.name, meta.api_version),
            meta.service_full_name.clone(),
        )
    }

    /// Record describing one operation: `<service_name>.<operation_name>`.
    pub fn for_operation(service_name: &str, op: &ApiOperation) -> Self {
        Self::new(
            PRODUCT_ASSET,
            PRODUCT_ACTION_ASSET,
            format!("{}.{}", service_name, op.name),
            op.name.clone(),
        )
    }

    pub fn with_account(mut self, cloud_account_id: impl Into<String>) -> Self {
        self.cloud_account_id = cloud_account_id.into();
        self
    }

    /// Asset type as used by the read path: `<provider>.<asset>`.
    pub fn asset_type(&self) -> String {
        format!("{}.{}", self.provider, self.asset)
    }

    /// Destination collection: `asset.<provider>.<asset>`.
    pub fn collection(&self) -> String {
        asset_collection(&self.asset_type())
    }

    /// The record's own fields as a document.
    pub fn to_document(&self) -> Document {
        let mut doc = Document::new();
        doc.insert("provider".into(), Value::String(self.provider.clone()));
        doc.insert("service".into(), Value::String(self.service.clone()));
        doc.insert("asset".into(), Value::String(self.asset.clone()));
        doc.insert("asset_id".into(), Value::String(self.asset_id.clone()));
        doc.insert("asset_name".into(), Value::String(self.asset_name.clone()));
        doc.insert(
            "cloud_account_id".into(),
            Value::String(self.cloud_account_id.clone()),
        );
        doc
    }
}

/// Collection name for an asset type such as `aws.product`.
pub fn asset_collection(asset_type: &str) -> String {
    format!("asset.{}", asset_type)
}

/// Service-level metadata loaded from the model repository.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ServiceMeta {
    pub name: String,
    pub api_version: String,
    pub endpoint_prefix: String,
    pub protocol: String,
    pub service_full_name: String,
    /// The model's full `metadata` object.
    pub raw: Value,
}

/// One API operation of a service.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ApiOperation {
    pub name: String,
    pub http_method: String,
    pub http_path: String,
    pub input: Option<Value>,
    pub output: Option<Value>,
    pub documentation: String,
    /// The operation object as it appears in the model.
    pub raw: Value,
}
