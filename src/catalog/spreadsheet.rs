//! Spreadsheet export ingestion.
//!
//! The export is a workbook (`.xlsx` and friends, one named worksheet) or a
//! CSV (comma or semicolon separated), chosen by file extension. Either way
//! the first row holds the headers. Header names vary between editions of
//! the file, so each logical field is recognised by a list of synonyms
//! compared on normalized keys.

use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;

use calamine::{open_workbook_auto, Data, Range, Reader};
use chrono::{DateTime, Utc};
use csv::StringRecord;
use rust_decimal::prelude::ToPrimitive;
use rust_decimal::Decimal;
use tracing::{debug, info, warn};

use super::cache::ExpiringCache;
use super::image::{has_image_extension, is_absolute_url, resolve_cell, ImageIndex};
use super::normalize::normalize;
use super::{CatalogItem, ImageRef, IntoCatalogItem};
use crate::domain::value_objects::{parse_price, ItemKey, Origin};

const CACHE_KEY: &str = "catalog:spreadsheet";

pub const MAX_IMAGE_PARTS: u8 = 12;
const DEFAULT_IMAGE_EXTENSION: &str = ".jpg";
const WORKBOOK_EXTENSIONS: &[&str] = &["xlsx", "xlsm", "xlsb", "xls", "ods"];

const BRAND: &[&str] = &["marca", "brand", "fabricante"];
const TITLE: &[&str] = &["nombre", "titulo", "producto", "articulo", "name", "title"];
const DESCRIPTION: &[&str] = &["descripcion", "description", "detalle", "detalles"];
const PRICE: &[&str] = &["precio", "price", "valor", "pvp", "precio unitario"];
const DURATION: &[&str] = &["duracion", "duration"];
const STOCK: &[&str] = &["stock", "cantidad", "existencia", "existencias", "inventario"];
const ACTIVE: &[&str] = &["activo", "active", "disponible", "habilitado", "visible", "publicado"];
const IMAGE_PREFIXES: &[&str] = &["imagen", "image", "img", "foto"];

const YES: &[&str] = &["si", "s", "yes", "y", "true", "1", "x", "activo", "disponible", "ok"];
const NO: &[&str] = &["no", "n", "false", "0", "inactivo", "agotado", "baja"];
const PLACEHOLDERS: &[&str] = &["", "-", "--", "nan", "none", "null", "n/a", "sin imagen"];

#[derive(Clone, Debug)]
pub struct IngestConfig {
    pub catalog_path: PathBuf,
    /// Worksheet to read when the export is a workbook.
    pub sheet: String,
    pub images_dir: PathBuf,
    pub ttl: Duration,
}

/// One ingestion: the parsed rows plus the image index they were resolved
/// against. Row indexes are only meaningful within one snapshot.
#[derive(Debug)]
pub struct CatalogSnapshot {
    pub items: Vec<CatalogItem>,
    pub images: ImageIndex,
    pub loaded_at: DateTime<Utc>,
}

impl CatalogSnapshot {
    pub fn row(&self, index: usize) -> Option<&CatalogItem> {
        let key = ItemKey::spreadsheet(index);
        self.items.iter().find(|item| item.key == key)
    }
}

pub struct SpreadsheetIngestor {
    config: IngestConfig,
    cache: ExpiringCache<Arc<CatalogSnapshot>>,
}

impl SpreadsheetIngestor {
    pub fn new(config: IngestConfig) -> Self {
        Self { config, cache: ExpiringCache::new() }
    }

    pub fn config(&self) -> &IngestConfig { &self.config }

    /// Cached snapshot, re-reading the export once the cached one expires.
    /// Never fails: a missing or broken export yields no rows.
    pub fn load_catalog(&self) -> Arc<CatalogSnapshot> {
        if let Some(hit) = self.cache.get(CACHE_KEY) {
            debug!(rows = hit.items.len(), "spreadsheet catalog cache hit");
            return hit;
        }
        let images = ImageIndex::scan(&self.config.images_dir);
        match read_catalog(&self.config.catalog_path, &self.config.sheet, &images) {
            Ok(items) => {
                let snapshot = Arc::new(CatalogSnapshot { items, images, loaded_at: Utc::now() });
                self.cache.set(CACHE_KEY, Arc::clone(&snapshot), self.config.ttl);
                snapshot
            }
            Err(e) => {
                warn!(path = %self.config.catalog_path.display(), error = %e, "spreadsheet catalog unavailable, serving database items only");
                Arc::new(CatalogSnapshot { items: Vec::new(), images, loaded_at: Utc::now() })
            }
        }
    }

    /// Drops the cached snapshot; the next load re-reads the export.
    pub fn invalidate(&self) -> bool {
        self.cache.delete(CACHE_KEY)
    }
}

fn read_catalog(path: &Path, sheet: &str, images: &ImageIndex) -> crate::Result<Vec<CatalogItem>> {
    let rows = if is_workbook(path) {
        read_workbook(path, sheet)?
    } else {
        parse_rows(&std::fs::read_to_string(path)?)?
    };
    let total = rows.len();
    let items: Vec<CatalogItem> = rows
        .into_iter()
        .filter(SpreadsheetRow::is_listed)
        .map(|row| row.to_catalog_item(images))
        .collect();
    info!(path = %path.display(), rows = total, listed = items.len(), images = images.len(), "spreadsheet catalog loaded");
    Ok(items)
}

/// A data row as read from the export, before image resolution.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct SpreadsheetRow {
    pub index: usize,
    pub brand: String,
    pub title: String,
    pub description: String,
    pub duration: Option<String>,
    pub price: Option<Decimal>,
    pub stock: u32,
    pub active: bool,
    pub image_reference: String,
}

impl SpreadsheetRow {
    /// Inactive rows with no stock are never shown, nor are blank rows.
    pub fn is_listed(&self) -> bool {
        if !self.active && self.stock == 0 {
            return false;
        }
        !(self.title.is_empty() && self.brand.is_empty())
    }
}

impl IntoCatalogItem for SpreadsheetRow {
    fn to_catalog_item(&self, images: &ImageIndex) -> CatalogItem {
        let (mut local, remote) = resolve_cell(&self.image_reference, images);
        if local.is_empty() && remote.is_empty() && !self.title.is_empty() {
            if let Some(file) = images.fuzzy_match(&normalize(&self.title)) {
                debug!(row = self.index, title = %self.title, file, "image guessed from title");
                local = file.to_string();
            }
        }
        CatalogItem {
            origin: Origin::Spreadsheet,
            key: ItemKey::spreadsheet(self.index),
            brand: self.brand.clone(),
            title: self.title.clone(),
            description: self.description.clone(),
            duration: self.duration.clone(),
            price: self.price,
            stock: self.stock,
            active: self.active,
            image: ImageRef::from_parts(local, remote),
            linked_product_id: None,
        }
    }
}

fn is_workbook(path: &Path) -> bool {
    path.extension()
        .and_then(|e| e.to_str())
        .is_some_and(|e| WORKBOOK_EXTENSIONS.iter().any(|w| e.eq_ignore_ascii_case(w)))
}

/// Reads the named worksheet, falling back to the first one.
fn read_workbook(path: &Path, sheet: &str) -> crate::Result<Vec<SpreadsheetRow>> {
    let mut workbook = open_workbook_auto(path)?;
    let names = workbook.sheet_names();
    let name = match names.iter().find(|n| n.as_str() == sheet).or_else(|| names.first()) {
        Some(name) => name.clone(),
        None => return Ok(Vec::new()),
    };
    if name != sheet {
        warn!(path = %path.display(), wanted = sheet, using = %name, "worksheet not found, reading the first one");
    }
    let range = workbook.worksheet_range(&name)?;
    Ok(parse_range(&range))
}

/// Parses a worksheet range; the first row is the header.
pub fn parse_range(range: &Range<Data>) -> Vec<SpreadsheetRow> {
    let mut records = range.rows().map(|cells| cells.iter().map(|c| c.to_string()).collect::<StringRecord>());
    let Some(headers) = records.next() else {
        return Vec::new();
    };
    let columns = Columns::detect(&headers);
    debug!(?columns, "worksheet columns");
    records.enumerate().map(|(index, record)| columns.row(index, &record)).collect()
}

/// Parses every data row of a CSV export. Malformed records are skipped but
/// still consume their index.
pub fn parse_rows(text: &str) -> Result<Vec<SpreadsheetRow>, csv::Error> {
    let text = text.trim_start_matches('\u{FEFF}');
    let mut reader = csv::ReaderBuilder::new()
        .has_headers(true)
        .flexible(true)
        .delimiter(detect_delimiter(text))
        .from_reader(text.as_bytes());
    let columns = Columns::detect(reader.headers()?);
    debug!(?columns, "spreadsheet columns");

    let mut rows = Vec::new();
    for (index, record) in reader.records().enumerate() {
        match record {
            Ok(record) => rows.push(columns.row(index, &record)),
            Err(e) => warn!(row = index, error = %e, "skipping malformed spreadsheet record"),
        }
    }
    Ok(rows)
}

fn detect_delimiter(text: &str) -> u8 {
    let header = text.lines().next().unwrap_or_default();
    if header.matches(';').count() > header.matches(',').count() { b';' } else { b',' }
}

/// Column positions of each logical field; `None` when the export lacks it.
#[derive(Debug, Default)]
struct Columns {
    brand: Option<usize>,
    title: Option<usize>,
    description: Option<usize>,
    price: Option<usize>,
    duration: Option<usize>,
    stock: Option<usize>,
    active: Option<usize>,
    /// Image part columns, ordered by their numeric suffix.
    images: Vec<usize>,
}

impl Columns {
    fn detect(headers: &StringRecord) -> Self {
        let keys: Vec<String> = headers.iter().map(normalize).collect();
        let find = |synonyms: &[&str]| {
            synonyms.iter().map(|s| normalize(s)).find_map(|s| keys.iter().position(|k| *k == s))
        };
        let mut parts: Vec<(u8, usize)> = keys
            .iter()
            .enumerate()
            .filter_map(|(col, key)| image_part_number(key).map(|n| (n, col)))
            .collect();
        parts.sort();
        parts.dedup_by_key(|(n, _)| *n);

        Self {
            brand: find(BRAND),
            title: find(TITLE),
            description: find(DESCRIPTION),
            price: find(PRICE),
            duration: find(DURATION),
            stock: find(STOCK),
            active: find(ACTIVE),
            images: parts.into_iter().map(|(_, col)| col).collect(),
        }
    }

    fn row(&self, index: usize, record: &StringRecord) -> SpreadsheetRow {
        let cell = |col: Option<usize>| col.and_then(|i| record.get(i)).map(str::trim).unwrap_or_default();
        let price = cell(self.price);
        let duration = cell(self.duration);
        let parts: Vec<&str> = self.images.iter().map(|&i| cell(Some(i))).collect();
        SpreadsheetRow {
            index,
            brand: cell(self.brand).to_string(),
            title: cell(self.title).to_string(),
            description: cell(self.description).to_string(),
            duration: (!duration.is_empty()).then(|| duration.to_string()),
            price: (!price.is_empty()).then(|| parse_price(price)),
            stock: parse_stock(cell(self.stock)),
            active: parse_flag(cell(self.active)),
            image_reference: combine_image_parts(&parts),
        }
    }
}

// "imagen3" -> 3, bare "imagen" -> 1, anything else (or > 12) -> None.
fn image_part_number(key: &str) -> Option<u8> {
    IMAGE_PREFIXES.iter().find_map(|prefix| {
        let suffix = key.strip_prefix(*prefix)?;
        if suffix.is_empty() {
            return Some(1);
        }
        let n: u8 = suffix.parse().ok()?;
        (1..=MAX_IMAGE_PARTS).contains(&n).then_some(n)
    })
}

/// Stock from numeric-like text (`5`, `5.0`, `12 u`); anything else is 0.
pub fn parse_stock(raw: &str) -> u32 {
    let numeric: String = raw
        .trim()
        .replace(',', ".")
        .chars()
        .take_while(|c| c.is_ascii_digit() || *c == '.' || *c == '-')
        .collect();
    Decimal::from_str(&numeric).ok().and_then(|d| d.trunc().to_u32()).unwrap_or(0)
}

/// Yes/no cell; blank or unrecognised means active.
pub fn parse_flag(raw: &str) -> bool {
    parse_yes_no(raw).unwrap_or(true)
}

fn parse_yes_no(raw: &str) -> Option<bool> {
    let key = normalize(raw);
    if YES.contains(&key.as_str()) {
        Some(true)
    } else if NO.contains(&key.as_str()) {
        Some(false)
    } else {
        None
    }
}

/// Joins the image part cells into one file reference. Spaces and hyphens
/// are dropped and `.jpg` is assumed when no image extension is present.
/// A URL in the first part is used as-is.
pub fn combine_image_parts(parts: &[&str]) -> String {
    let pieces: Vec<&str> = parts
        .iter()
        .map(|p| p.trim())
        .filter(|p| !PLACEHOLDERS.contains(&p.to_lowercase().as_str()))
        .collect();
    let Some(first) = pieces.first() else {
        return String::new();
    };
    if is_absolute_url(first) {
        return first.to_string();
    }
    let mut combined: String = pieces.concat().chars().filter(|c| *c != ' ' && *c != '-').collect();
    if !has_image_extension(&combined) {
        combined.push_str(DEFAULT_IMAGE_EXTENSION);
    }
    combined
}
