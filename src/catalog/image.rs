//! Fuzzy lookup of product photos by file name.

use std::collections::BTreeMap;
use std::path::Path;

use tracing::{debug, warn};

use super::normalize::{normalize, similarity_ratio};

pub const IMAGE_EXTENSIONS: [&str; 5] = [".jpg", ".jpeg", ".png", ".webp", ".gif"];

/// Minimum score for a fuzzy match to be accepted.
pub const FUZZY_THRESHOLD: f64 = 0.6;

// Containment only counts for keys at least this long; shorter keys are
// contained in almost anything.
const MIN_CONTAINED_LEN: usize = 4;

const STRIPPED_PREFIXES: [&str; 3] = ["static/", "img/productos/", "productos/"];

/// File names in the image directory, indexed two ways. Built once per
/// catalog refresh.
#[derive(Clone, Debug, Default)]
pub struct ImageIndex {
    by_name: BTreeMap<String, String>,
    by_stem: BTreeMap<String, String>,
}

impl ImageIndex {
    pub fn from_files<I, S>(files: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let mut index = Self::default();
        for file in files {
            let file = file.into();
            index.by_name.insert(file.to_lowercase(), file.clone());
            index.by_stem.insert(normalize(stem(&file)), file);
        }
        index
    }

    /// Indexes every regular file in `dir`. A missing directory yields an
    /// empty index.
    pub fn scan(dir: &Path) -> Self {
        let entries = match std::fs::read_dir(dir) {
            Ok(entries) => entries,
            Err(e) => {
                warn!(dir = %dir.display(), error = %e, "image directory unreadable, no local images");
                return Self::default();
            }
        };
        let mut files: Vec<String> = entries
            .filter_map(|entry| entry.ok())
            .filter(|entry| entry.file_type().map(|t| t.is_file()).unwrap_or(false))
            .filter_map(|entry| entry.file_name().into_string().ok())
            .collect();
        files.sort();
        debug!(dir = %dir.display(), files = files.len(), "indexed image directory");
        Self::from_files(files)
    }

    pub fn len(&self) -> usize { self.by_name.len() }
    pub fn is_empty(&self) -> bool { self.by_name.is_empty() }

    /// Best file whose normalized stem resembles `key`, if it scores at
    /// least [`FUZZY_THRESHOLD`]. A stem contained in the key (or the other
    /// way round) wins outright.
    pub fn fuzzy_match(&self, key: &str) -> Option<&str> {
        if key.is_empty() {
            return None;
        }
        let mut best: Option<(&str, f64)> = None;
        for (candidate, file) in &self.by_stem {
            if candidate.is_empty() {
                continue;
            }
            if key.len() >= MIN_CONTAINED_LEN
                && candidate.len() >= MIN_CONTAINED_LEN
                && (key.contains(candidate.as_str()) || candidate.contains(key))
            {
                return Some(file.as_str());
            }
            let score = similarity_ratio(key, candidate);
            if best.map_or(true, |(_, s)| score > s) {
                best = Some((file.as_str(), score));
            }
        }
        best.filter(|(_, score)| *score >= FUZZY_THRESHOLD).map(|(file, _)| file)
    }
}

/// Resolves a raw reference to a file name in `index`, or `""`.
///
/// Tries, in order: exact name, name with each known extension, exact
/// normalized stem, fuzzy stem.
pub fn resolve(reference: &str, index: &ImageIndex) -> String {
    let name = last_segment(reference);
    if name.is_empty() {
        return String::new();
    }
    if let Some(file) = index.by_name.get(&name.to_lowercase()) {
        return file.clone();
    }
    let base = stem(&name).to_lowercase();
    for ext in IMAGE_EXTENSIONS {
        if let Some(file) = index.by_name.get(&format!("{base}{ext}")) {
            return file.clone();
        }
    }
    let key = normalize(&base);
    if let Some(file) = index.by_stem.get(&key) {
        return file.clone();
    }
    match index.fuzzy_match(&key) {
        Some(file) => {
            debug!(reference, file, "image resolved by fuzzy match");
            file.to_string()
        }
        None => String::new(),
    }
}

/// Splits a spreadsheet cell into `(local_file, remote_url)`. URLs are
/// passed through untouched; anything else is resolved against `index`.
pub fn resolve_cell(cell: &str, index: &ImageIndex) -> (String, String) {
    let cleaned = unquote(cell).replace('\\', "/");
    if cleaned.is_empty() {
        return (String::new(), String::new());
    }
    if is_absolute_url(&cleaned) {
        return (String::new(), cleaned);
    }
    let mut relative = cleaned.trim_start_matches('/');
    for prefix in STRIPPED_PREFIXES {
        if let Some(head) = relative.get(..prefix.len()) {
            if head.eq_ignore_ascii_case(prefix) {
                relative = &relative[prefix.len()..];
            }
        }
    }
    (resolve(relative, index), String::new())
}

/// URL for an image reference carried in a cart payload, or `None` when
/// nothing usable is found.
pub fn resolve_payload_url(img: &str, index: &ImageIndex, local_prefix: &str) -> Option<String> {
    let s = unquote(img).replace('\\', "/");
    if s.is_empty() {
        return None;
    }
    if is_absolute_url(&s) || s.starts_with("/media/") || s.starts_with("/static/") {
        return Some(s);
    }
    if s.starts_with("static/") {
        return Some(format!("/{s}"));
    }
    let (local, _) = resolve_cell(&s, index);
    (!local.is_empty()).then(|| format!("{local_prefix}{local}"))
}

pub fn is_absolute_url(s: &str) -> bool {
    let lower = s.trim().to_ascii_lowercase();
    lower.starts_with("http://") || lower.starts_with("https://")
}

pub fn has_image_extension(name: &str) -> bool {
    let lower = name.to_lowercase();
    IMAGE_EXTENSIONS.iter().any(|ext| lower.ends_with(ext))
}

fn unquote(s: &str) -> String {
    s.trim().trim_matches(|c| c == '"' || c == '\'').trim().to_string()
}

fn last_segment(reference: &str) -> String {
    let cleaned = unquote(reference).replace('\\', "/");
    let without_query = cleaned.split(['?', '#']).next().unwrap_or_default();
    without_query.rsplit('/').next().unwrap_or_default().trim().to_string()
}

// File name without a known image extension.
fn stem(name: &str) -> &str {
    match name.rfind('.') {
        Some(dot) if has_image_extension(name) => &name[..dot],
        _ => name,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn index() -> ImageIndex {
        ImageIndex::from_files(["Canela.JPG", "palo-santo.png", "Sandalo Rojo.webp", "lavanda_premium.jpeg", "rosa.gif"])
    }

    #[test]
    fn test_exact_and_extension_guess() {
        let idx = index();
        assert_eq!(resolve("canela.jpg", &idx), "Canela.JPG");
        assert_eq!(resolve("CANELA", &idx), "Canela.JPG");
        assert_eq!(resolve("rosa", &idx), "rosa.gif");
    }

    #[test]
    fn test_paths_quotes_and_query_strings() {
        let idx = index();
        assert_eq!(resolve("\"img\\productos\\palo-santo.png\"", &idx), "palo-santo.png");
        assert_eq!(resolve("/static/img/rosa.gif?v=3", &idx), "rosa.gif");
        assert_eq!(resolve("", &idx), "");
        assert_eq!(resolve("   ", &idx), "");
    }

    #[test]
    fn test_normalized_stem_lookup() {
        let idx = index();
        assert_eq!(resolve("Palo Santo", &idx), "palo-santo.png");
        assert_eq!(resolve("sándalo-rojo.jpg", &idx), "Sandalo Rojo.webp");
    }

    #[test]
    fn test_fuzzy_fallback() {
        let idx = index();
        // typo
        assert_eq!(resolve("lavanda premiun", &idx), "lavanda_premium.jpeg");
        // containment
        assert_eq!(resolve("Sahumerio Canela Grande", &idx), "Canela.JPG");
    }

    #[test]
    fn test_fuzzy_rejects_implausible_reference() {
        let idx = index();
        assert_eq!(resolve("qzxwvkjhgfpmbtyrdlsu", &idx), "");
        for (stem_key, _) in idx.by_stem.iter() {
            assert!(similarity_ratio("qzxwvkjhgfpmbtyrdlsu", stem_key) < FUZZY_THRESHOLD);
        }
    }

    #[test]
    fn test_duplicate_stems_last_write_wins() {
        let idx = ImageIndex::from_files(["canela.jpg", "Canela.png"]);
        assert_eq!(idx.len(), 2);
        assert_eq!(idx.by_stem.len(), 1);
        assert_eq!(idx.by_stem.get("canela").map(String::as_str), Some("Canela.png"));
    }

    #[test]
    fn test_resolve_cell() {
        let idx = index();
        assert_eq!(
            resolve_cell("https://res.cloudinary.com/x/canela.jpg", &idx),
            (String::new(), "https://res.cloudinary.com/x/canela.jpg".to_string())
        );
        assert_eq!(resolve_cell("static/img/productos/rosa", &idx), ("rosa.gif".to_string(), String::new()));
        assert_eq!(resolve_cell("productos/Canela.JPG", &idx), ("Canela.JPG".to_string(), String::new()));
        assert_eq!(resolve_cell("", &idx), (String::new(), String::new()));
    }

    #[test]
    fn test_payload_url() {
        let idx = index();
        let prefix = "/static/img/productos/";
        assert_eq!(resolve_payload_url("canela", &idx, prefix).as_deref(), Some("/static/img/productos/Canela.JPG"));
        assert_eq!(resolve_payload_url("static/x.png", &idx, prefix).as_deref(), Some("/static/x.png"));
        assert_eq!(resolve_payload_url("/media/up/a.png", &idx, prefix).as_deref(), Some("/media/up/a.png"));
        assert_eq!(resolve_payload_url("", &idx, prefix), None);
        assert_eq!(resolve_payload_url("qzxwvkjhgfpmbtyrdlsu", &idx, prefix), None);
    }

    #[test]
    fn test_short_stems_never_match_by_containment() {
        let idx = ImageIndex::from_files(["te.jpg", "rosa.gif"]);
        assert!(idx.fuzzy_match("chocolateamargo").is_none());
        assert_eq!(resolve("Chocolate Amargo", &idx), "");
        assert!(similarity_ratio("chocolateamargo", "te") < FUZZY_THRESHOLD);
        // four characters is enough
        assert_eq!(resolve("Rosas Rojas", &idx), "rosa.gif");
        // the short stem still resolves exactly
        assert_eq!(resolve("TE", &idx), "te.jpg");
    }
}
