//! Catalog reconciliation
//!
//! The spreadsheet and the database share no identifier, so rows are tied
//! together (and to image files on disk) by comparing normalized names.

pub mod cache;
pub mod image;
pub mod merge;
pub mod normalize;
pub mod spreadsheet;

use rust_decimal::Decimal;
use serde::{Serialize, Serializer};

use crate::domain::value_objects::{ItemKey, Origin};
pub use image::ImageIndex;
pub use merge::{link_index, linked_product, merged_catalog, CatalogQuery, MergedCatalog};
pub use normalize::normalize;
pub use spreadsheet::{CatalogSnapshot, SpreadsheetIngestor};

/// Where an item's picture lives. Never both a local asset and a URL.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub enum ImageRef {
    /// File name inside the image directory.
    Local(String),
    /// Absolute http(s) URL.
    Remote(String),
    #[default]
    None,
}

impl ImageRef {
    pub fn from_parts(local: String, remote: String) -> Self {
        if !remote.is_empty() {
            Self::Remote(remote)
        } else if !local.is_empty() {
            Self::Local(local)
        } else {
            Self::None
        }
    }

    pub fn is_none(&self) -> bool { matches!(self, Self::None) }

    /// URL for rendering; `None` when the caller should show a placeholder.
    pub fn url(&self, local_prefix: &str) -> Option<String> {
        match self {
            Self::Local(name) => Some(format!("{local_prefix}{name}")),
            Self::Remote(url) => Some(url.clone()),
            Self::None => None,
        }
    }
}

impl Serialize for ImageRef {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match self {
            Self::Local(v) | Self::Remote(v) => serializer.serialize_str(v),
            Self::None => serializer.serialize_none(),
        }
    }
}

/// Unified view of a sellable item from either source.
#[derive(Clone, Debug, Serialize)]
pub struct CatalogItem {
    pub origin: Origin,
    #[serde(serialize_with = "serialize_key")]
    pub key: ItemKey,
    pub brand: String,
    pub title: String,
    pub description: String,
    pub duration: Option<String>,
    pub price: Option<Decimal>,
    pub stock: u32,
    pub active: bool,
    pub image: ImageRef,
    /// Database product this spreadsheet row was matched to by name.
    pub linked_product_id: Option<i64>,
}

fn serialize_key<S: Serializer>(key: &ItemKey, serializer: S) -> Result<S::Ok, S::Error> {
    serializer.collect_str(key)
}

/// Adapter from a source record to the unified catalog view.
pub trait IntoCatalogItem {
    fn to_catalog_item(&self, images: &ImageIndex) -> CatalogItem;
}
