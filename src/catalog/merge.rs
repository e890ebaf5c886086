//! Unified listing over spreadsheet rows and database products.

use std::collections::{BTreeMap, HashMap};

use serde::{Deserialize, Serialize};

use super::normalize::normalize;
use super::{CatalogItem, ImageIndex, IntoCatalogItem};
use crate::domain::aggregates::Product;

#[derive(Clone, Debug, Default, Deserialize)]
pub struct CatalogQuery {
    pub search: Option<String>,
    pub brand: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct MergedCatalog {
    pub items: Vec<CatalogItem>,
    /// Every brand in either source, regardless of the query.
    pub brands: Vec<String>,
}

/// Name keys of database products: name, brand+name and name+brand.
pub fn link_index(products: &[Product]) -> HashMap<String, i64> {
    let mut index = HashMap::new();
    for p in products {
        let keys = [
            normalize(&p.name),
            normalize(&format!("{}{}", p.brand, p.name)),
            normalize(&format!("{}{}", p.name, p.brand)),
        ];
        for key in keys.into_iter().filter(|k| !k.is_empty()) {
            index.entry(key).or_insert(p.id);
        }
    }
    index
}

/// Database product a spreadsheet row refers to: its title alone, then
/// prefixed with its brand.
pub fn linked_product(item: &CatalogItem, links: &HashMap<String, i64>) -> Option<i64> {
    links
        .get(&normalize(&item.title))
        .or_else(|| links.get(&normalize(&format!("{}{}", item.brand, item.title))))
        .copied()
}

/// Merges, cross-links, filters and sorts both sources.
///
/// Ordering is by lowercased brand, then lowercased title; ties keep
/// database items ahead of spreadsheet rows and source order otherwise.
pub fn merged_catalog(
    spreadsheet: &[CatalogItem],
    products: &[Product],
    images: &ImageIndex,
    query: &CatalogQuery,
) -> MergedCatalog {
    let links = link_index(products);

    let mut items: Vec<CatalogItem> = products.iter().map(|p| p.to_catalog_item(images)).collect();
    items.extend(spreadsheet.iter().cloned().map(|mut item| {
        item.linked_product_id = linked_product(&item, &links);
        item
    }));

    let brands = distinct_brands(&items);

    if let Some(needle) = non_blank(&query.search).map(str::to_lowercase) {
        items.retain(|item| {
            item.title.to_lowercase().contains(&needle)
                || item.brand.to_lowercase().contains(&needle)
                || item.description.to_lowercase().contains(&needle)
        });
    }
    if let Some(brand) = non_blank(&query.brand).map(str::to_lowercase) {
        items.retain(|item| item.brand.trim().to_lowercase() == brand);
    }

    items.sort_by_key(|item| (item.brand.to_lowercase(), item.title.to_lowercase()));
    MergedCatalog { items, brands }
}

fn distinct_brands(items: &[CatalogItem]) -> Vec<String> {
    let mut brands: BTreeMap<String, String> = BTreeMap::new();
    for item in items {
        let brand = item.brand.trim();
        if !brand.is_empty() {
            brands.entry(brand.to_lowercase()).or_insert_with(|| brand.to_string());
        }
    }
    brands.into_values().collect()
}

fn non_blank(value: &Option<String>) -> Option<&str> {
    value.as_deref().map(str::trim).filter(|v| !v.is_empty())
}
