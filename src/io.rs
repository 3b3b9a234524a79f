use bincode::Options;
use image::codecs::png::PngEncoder;
use image::{ColorType, ImageEncoder, ImageError, ImageFormat, RgbaImage};
use rfd::FileDialog;
use serde::{Deserialize, Serialize};
use std::fs::File;
use std::io::BufWriter;
use std::path::{Path, PathBuf};
use thiserror::Error;

use crate::{log_info, log_warn};

/// File name of the single most-recent save.
pub const SAVE_SLOT_NAME: &str = "coloring.save.png";
/// Default template store file inside the data directory.
pub const STORE_FILE_NAME: &str = "templates.bin";
const STORE_MAGIC_V1: &str = "CBT1";

/// Image extensions offered by the open dialog.
pub const IMAGE_EXTENSIONS: &[&str] = &["png", "jpg", "jpeg", "webp", "bmp"];

/// Template categories. `all` is a query wildcard, never stored on a record.
pub const CATEGORIES: &[&str] = &[
    "all",
    "uncategorized",
    "animals",
    "nature",
    "objects",
    "abstract",
];

// ============================================================================
// ERRORS
// ============================================================================

#[derive(Error, Debug)]
pub enum StoreError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
    #[error("image error: {0}")]
    Image(#[from] ImageError),
    #[error("serialization error: {0}")]
    Serialize(#[from] Box<bincode::ErrorKind>),
    #[error("not found: {0}")]
    NotFound(String),
    #[error("invalid store file: {0}")]
    InvalidFormat(String),
}

pub type Result<T> = std::result::Result<T, StoreError>;

// ============================================================================
// IMAGE ENCODE / DECODE
// ============================================================================

pub fn decode_image(bytes: &[u8]) -> Result<RgbaImage> {
    Ok(image::load_from_memory(bytes)?.to_rgba8())
}

pub fn load_image(path: &Path) -> Result<RgbaImage> {
    if !path.exists() {
        return Err(StoreError::NotFound(path.display().to_string()));
    }
    Ok(image::open(path)?.to_rgba8())
}

pub fn encode_png(img: &RgbaImage) -> Result<Vec<u8>> {
    let mut buf = Vec::new();
    PngEncoder::new(&mut buf).write_image(img.as_raw(), img.width(), img.height(), ColorType::Rgba8)?;
    Ok(buf)
}

pub fn save_png(img: &RgbaImage, path: &Path) -> Result<()> {
    if let Some(parent) = path.parent()
        && !parent.as_os_str().is_empty()
    {
        std::fs::create_dir_all(parent)?;
    }
    img.save_with_format(path, ImageFormat::Png)?;
    Ok(())
}

// ============================================================================
// SAVE SLOT
// ============================================================================

pub fn save_slot_path(dir: &Path) -> PathBuf {
    dir.join(SAVE_SLOT_NAME)
}

/// Overwrite the save slot in `dir` with `img`.
pub fn save_latest(img: &RgbaImage, dir: &Path) -> Result<PathBuf> {
    let path = save_slot_path(dir);
    save_png(img, &path)?;
    log_info!("Saved slot {}", path.display());
    Ok(path)
}

pub fn load_latest(dir: &Path) -> Result<RgbaImage> {
    load_image(&save_slot_path(dir))
}

// ============================================================================
// TEMPLATE STORE
// ============================================================================

/// One stored template: an encoded image plus its gallery metadata.
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, Eq)]
pub struct TemplateRecord {
    pub name: String,
    pub image_bytes: Vec<u8>,
    pub category: String,
}

impl TemplateRecord {
    pub fn new(name: impl Into<String>, image_bytes: Vec<u8>, category: impl Into<String>) -> Self {
        let category = category.into();
        let category = if category.is_empty() || category == "all" {
            "uncategorized".to_string()
        } else {
            category
        };
        Self {
            name: name.into(),
            image_bytes,
            category,
        }
    }

    pub fn decode(&self) -> Result<RgbaImage> {
        decode_image(&self.image_bytes)
    }
}

/// Persistence for user templates. Keyed by name; `put` replaces.
pub trait TemplateStore {
    /// Records in `category`, or every record for `"all"`.
    fn get_all(&self, category: &str) -> Result<Vec<TemplateRecord>>;
    fn put(&mut self, record: TemplateRecord) -> Result<()>;
    fn delete(&mut self, name: &str) -> Result<()>;
}

#[derive(Serialize, Deserialize)]
struct StoreFileV1 {
    magic: String,
    records: Vec<TemplateRecord>,
}

/// Template store backed by one bincode file, rewritten on every change.
#[derive(Debug)]
pub struct FileTemplateStore {
    path: PathBuf,
    records: Vec<TemplateRecord>,
}

impl FileTemplateStore {
    /// Open `path`, starting empty if the file does not exist yet.
    pub fn open(path: impl Into<PathBuf>) -> Result<Self> {
        let path = path.into();
        if !path.exists() {
            return Ok(Self {
                path,
                records: Vec::new(),
            });
        }
        let raw = std::fs::read(&path)?;
        if raw.len() < 12 {
            return Err(StoreError::InvalidFormat("file too small".into()));
        }

        // bincode writes a String as an 8-byte length then the bytes, so the
        // 4-char magic sits at 8..12.
        let magic = std::str::from_utf8(&raw[8..12]).unwrap_or("");
        if magic != STORE_MAGIC_V1 {
            return Err(StoreError::InvalidFormat(format!("unknown magic '{}'", magic)));
        }

        // Length prefixes in a damaged file must not outgrow the file itself.
        let file: StoreFileV1 = bincode::DefaultOptions::new()
            .with_fixint_encoding()
            .allow_trailing_bytes()
            .with_limit(raw.len() as u64)
            .deserialize(&raw)?;
        log_info!("Opened template store {} ({} records)", path.display(), file.records.len());
        Ok(Self {
            path,
            records: file.records,
        })
    }

    pub fn default_path() -> PathBuf {
        crate::logger::app_data_dir().join(STORE_FILE_NAME)
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    fn persist(&self, records: &[TemplateRecord]) -> Result<()> {
        if let Some(parent) = self.path.parent()
            && !parent.as_os_str().is_empty()
        {
            std::fs::create_dir_all(parent)?;
        }
        let writer = BufWriter::new(File::create(&self.path)?);
        let file = StoreFileV1 {
            magic: STORE_MAGIC_V1.to_string(),
            records: records.to_vec(),
        };
        bincode::serialize_into(writer, &file)?;
        Ok(())
    }
}

impl TemplateStore for FileTemplateStore {
    fn get_all(&self, category: &str) -> Result<Vec<TemplateRecord>> {
        Ok(self
            .records
            .iter()
            .filter(|r| category == "all" || r.category == category)
            .cloned()
            .collect())
    }

    fn put(&mut self, record: TemplateRecord) -> Result<()> {
        let mut next = self.records.clone();
        match next.iter_mut().find(|r| r.name == record.name) {
            Some(existing) => *existing = record,
            None => next.push(record),
        }
        self.persist(&next)?;
        self.records = next;
        Ok(())
    }

    fn delete(&mut self, name: &str) -> Result<()> {
        if !self.records.iter().any(|r| r.name == name) {
            log_warn!("Template '{}' not in store", name);
            return Err(StoreError::NotFound(name.to_string()));
        }
        let next: Vec<TemplateRecord> = self.records.iter().filter(|r| r.name != name).cloned().collect();
        self.persist(&next)?;
        self.records = next;
        Ok(())
    }
}

/// Record name for an imported file path or URL.
///
/// Takes the last path segment, drops any query or fragment, then the
/// extension. Falls back to `"untitled"`.
pub fn template_name_for(source: &str) -> String {
    let segment = source
        .rsplit(['/', '\\'])
        .next()
        .unwrap_or_default();
    let segment = segment.split(['?', '#']).next().unwrap_or_default();
    let stem = match segment.rfind('.') {
        Some(0) | None => segment,
        Some(dot) => &segment[..dot],
    };
    let stem = stem.trim();
    if stem.is_empty() {
        "untitled".to_string()
    } else {
        stem.to_string()
    }
}

// ============================================================================
// NATIVE DIALOGS
// ============================================================================

pub fn pick_image_file() -> Option<PathBuf> {
    FileDialog::new()
        .add_filter("Images", IMAGE_EXTENSIONS)
        .add_filter("All Files", &["*"])
        .pick_file()
}

pub fn pick_export_path(default_name: &str) -> Option<PathBuf> {
    FileDialog::new()
        .add_filter("PNG Image", &["png"])
        .set_file_name(default_name)
        .save_file()
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::Rgba;
    use std::time::{SystemTime, UNIX_EPOCH};

    fn scratch_dir(tag: &str) -> PathBuf {
        let nanos = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_nanos())
            .unwrap_or(0);
        std::env::temp_dir().join(format!("colorbook-{}-{}-{}", tag, std::process::id(), nanos))
    }

    fn tiny_png() -> Vec<u8> {
        encode_png(&RgbaImage::from_pixel(3, 2, Rgba([9, 8, 7, 255]))).unwrap()
    }

    #[test]
    fn names_from_files_and_urls() {
        assert_eq!(template_name_for("cat.png"), "cat");
        assert_eq!(template_name_for("/home/u/art/my.cat.jpeg"), "my.cat");
        assert_eq!(template_name_for(r"C:\pics\dog.webp"), "dog");
        assert_eq!(template_name_for("https://x.org/a/owl.png?size=2#top"), "owl");
        assert_eq!(template_name_for("https://x.org/a/"), "untitled");
        assert_eq!(template_name_for(""), "untitled");
    }

    #[test]
    fn png_round_trips_through_decode() {
        let img = decode_image(&tiny_png()).unwrap();
        assert_eq!(img.dimensions(), (3, 2));
        assert_eq!(*img.get_pixel(2, 1), Rgba([9, 8, 7, 255]));
    }

    #[test]
    fn store_put_get_delete_and_reopen() {
        let dir = scratch_dir("store");
        let path = dir.join(STORE_FILE_NAME);
        let mut store = FileTemplateStore::open(&path).unwrap();
        assert!(store.is_empty());

        store.put(TemplateRecord::new("owl", tiny_png(), "animals")).unwrap();
        store.put(TemplateRecord::new("leaf", tiny_png(), "nature")).unwrap();
        store.put(TemplateRecord::new("owl", tiny_png(), "abstract")).unwrap();

        let reopened = FileTemplateStore::open(&path).unwrap();
        assert_eq!(reopened.len(), 2);
        assert_eq!(reopened.get_all("all").unwrap().len(), 2);
        let abstract_only = reopened.get_all("abstract").unwrap();
        assert_eq!(abstract_only.len(), 1);
        assert_eq!(abstract_only[0].name, "owl");
        assert!(reopened.get_all("animals").unwrap().is_empty());

        store.delete("leaf").unwrap();
        assert!(matches!(store.delete("leaf"), Err(StoreError::NotFound(_))));
        let _ = std::fs::remove_dir_all(dir);
    }

    #[test]
    fn record_category_defaults() {
        assert_eq!(TemplateRecord::new("a", vec![], "").category, "uncategorized");
        assert_eq!(TemplateRecord::new("a", vec![], "all").category, "uncategorized");
    }

    #[test]
    fn save_slot_round_trip_and_missing() {
        let dir = scratch_dir("slot");
        assert!(matches!(load_latest(&dir), Err(StoreError::NotFound(_))));
        let img = RgbaImage::from_pixel(4, 4, Rgba([1, 2, 3, 255]));
        let path = save_latest(&img, &dir).unwrap();
        assert!(path.ends_with(SAVE_SLOT_NAME));
        assert_eq!(load_latest(&dir).unwrap(), img);
        let _ = std::fs::remove_dir_all(dir);
    }

    #[test]
    fn garbage_store_file_is_an_error() {
        let dir = scratch_dir("garbage");
        std::fs::create_dir_all(&dir).unwrap();
        let path = dir.join(STORE_FILE_NAME);
        std::fs::write(&path, b"not a store").unwrap();
        assert!(FileTemplateStore::open(&path).is_err());
        let _ = std::fs::remove_dir_all(dir);
    }

    #[test]
    fn oversized_length_prefix_is_an_error() {
        let dir = scratch_dir("oversized");
        std::fs::create_dir_all(&dir).unwrap();
        let path = dir.join(STORE_FILE_NAME);
        let mut raw = Vec::new();
        raw.extend_from_slice(&4u64.to_le_bytes());
        raw.extend_from_slice(STORE_MAGIC_V1.as_bytes());
        raw.extend_from_slice(&1u64.to_le_bytes());
        raw.extend_from_slice(&u64::MAX.to_le_bytes());
        std::fs::write(&path, raw).unwrap();
        assert!(matches!(FileTemplateStore::open(&path), Err(StoreError::Serialize(_))));
        let _ = std::fs::remove_dir_all(dir);
    }

    #[test]
    fn foreign_magic_is_rejected() {
        let dir = scratch_dir("foreign");
        std::fs::create_dir_all(&dir).unwrap();
        let path = dir.join(STORE_FILE_NAME);
        std::fs::write(&path, b"\x04\0\0\0\0\0\0\0PFE1 and more").unwrap();
        assert!(matches!(FileTemplateStore::open(&path), Err(StoreError::InvalidFormat(_))));
        let _ = std::fs::remove_dir_all(dir);
    }

    #[test]
    fn failed_write_leaves_records_untouched() {
        let dir = scratch_dir("readonly");
        std::fs::create_dir_all(&dir).unwrap();
        let path = dir.join(STORE_FILE_NAME);
        let mut store = FileTemplateStore::open(&path).unwrap();
        store.put(TemplateRecord::new("owl", tiny_png(), "animals")).unwrap();
        // A directory in place of the store file makes every write fail.
        std::fs::remove_file(&path).unwrap();
        std::fs::create_dir_all(&path).unwrap();

        assert!(store.put(TemplateRecord::new("fox", tiny_png(), "animals")).is_err());
        assert!(store.delete("owl").is_err());
        let names: Vec<String> = store.get_all("all").unwrap().into_iter().map(|r| r.name).collect();
        assert_eq!(names, vec!["owl".to_string()]);
        let _ = std::fs::remove_dir_all(dir);
    }
}
