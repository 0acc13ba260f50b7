//! Reading and writing exported record batches
//!
//! Three layouts are supported:
//! - a single JSON file holding an [`ExportFile`]
//! - a folder tree with one `<entity>/<id>.json` file per record and an
//!   `export.json` manifest
//! - a zip archive of that folder tree
//!
//! Reading accepts any of them, plus loose JSON files holding a single record.

use std::fs;
use std::io::{Read, Write};
use std::path::{Path, PathBuf};

use anyhow::{Context, Result, bail};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::records::Record;

/// Name of the manifest in folder and zip layouts
pub const MANIFEST_FILE: &str = "export.json";

/// Envelope of an exported batch
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ExportFile {
    /// When the export ran
    #[serde(default)]
    pub exported_on: Option<DateTime<Utc>>,
    /// Source environment URL
    #[serde(default)]
    pub source: Option<String>,
    #[serde(default)]
    pub records: Vec<Record>,
}

impl ExportFile {
    pub fn new(source: Option<String>, records: Vec<Record>) -> Self {
        Self {
            exported_on: Some(Utc::now()),
            source,
            records,
        }
    }

    /// Envelope without records, written next to the record files
    fn manifest(&self) -> Self {
        Self {
            exported_on: self.exported_on,
            source: self.source.clone(),
            records: Vec::new(),
        }
    }

    fn absorb(&mut self, document: Document) {
        match document {
            Document::Envelope(envelope) => {
                if self.exported_on.is_none() {
                    self.exported_on = envelope.exported_on;
                }
                if self.source.is_none() {
                    self.source = envelope.source;
                }
                self.records.extend(envelope.records);
            }
            Document::Single(record) => self.records.push(record),
        }
    }
}

#[derive(Deserialize)]
#[serde(untagged)]
enum Document {
    Single(Record),
    Envelope(ExportFile),
}

fn parse_document(content: &str, origin: &str) -> Result<Document> {
    serde_json::from_str(content).with_context(|| format!("Failed to parse records from {}", origin))
}

fn is_json(path: &Path) -> bool {
    path.extension()
        .map(|ext| ext.eq_ignore_ascii_case("json"))
        .unwrap_or(false)
}

fn is_zip(path: &Path) -> bool {
    path.extension()
        .map(|ext| ext.eq_ignore_ascii_case("zip"))
        .unwrap_or(false)
}

/// Read a batch from a JSON file, a zip archive or a folder
pub fn read_records(path: &Path) -> Result<ExportFile> {
    if !path.exists() {
        bail!("Import path does not exist: {}", path.display());
    }

    let mut file = ExportFile::default();

    if path.is_dir() {
        for json in json_files(path)? {
            let content = fs::read_to_string(&json)
                .with_context(|| format!("Failed to read {}", json.display()))?;
            file.absorb(parse_document(&content, &json.display().to_string())?);
        }
    } else if is_zip(path) {
        read_zip(path, &mut file)?;
    } else {
        let content = fs::read_to_string(path)
            .with_context(|| format!("Failed to read {}", path.display()))?;
        file.absorb(parse_document(&content, &path.display().to_string())?);
    }

    log::info!("Read {} records from {}", file.records.len(), path.display());
    Ok(file)
}

/// All `.json` files below `dir`, sorted
fn json_files(dir: &Path) -> Result<Vec<PathBuf>> {
    let mut files = Vec::new();
    let mut pending = vec![dir.to_path_buf()];

    while let Some(current) = pending.pop() {
        let entries = fs::read_dir(&current)
            .with_context(|| format!("Failed to list {}", current.display()))?;
        for entry in entries {
            let path = entry?.path();
            if path.is_dir() {
                pending.push(path);
            } else if is_json(&path) {
                files.push(path);
            }
        }
    }

    files.sort();
    Ok(files)
}

fn read_zip(path: &Path, file: &mut ExportFile) -> Result<()> {
    let reader = fs::File::open(path).with_context(|| format!("Failed to open {}", path.display()))?;
    let mut archive = zip::ZipArchive::new(reader)
        .with_context(|| format!("Not a valid zip archive: {}", path.display()))?;

    let mut names: Vec<String> = archive
        .file_names()
        .filter(|name| !name.ends_with('/') && is_json(Path::new(name)))
        .map(|name| name.to_string())
        .collect();
    names.sort();

    for name in names {
        let mut entry = archive
            .by_name(&name)
            .with_context(|| format!("Failed to read {} from {}", name, path.display()))?;
        let mut content = String::new();
        entry
            .read_to_string(&mut content)
            .with_context(|| format!("Failed to read {} from {}", name, path.display()))?;
        file.absorb(parse_document(&content, &format!("{}:{}", path.display(), name))?);
    }

    Ok(())
}

/// Relative path of a record in the folder layout
fn record_path(record: &Record) -> String {
    format!("{}/{}.json", record.entity_type, record.id)
}

/// Write a batch as a JSON file, a folder tree, or a zipped tree for `.zip` paths
pub fn write_records(path: &Path, file: &ExportFile, folder_structure: bool) -> Result<()> {
    if is_zip(path) {
        write_zip(path, file)?;
    } else if folder_structure {
        write_folder(path, file)?;
    } else {
        ensure_parent(path)?;
        let content = serde_json::to_string_pretty(file).context("Failed to serialize records")?;
        fs::write(path, content).with_context(|| format!("Failed to write {}", path.display()))?;
    }

    log::info!("Wrote {} records to {}", file.records.len(), path.display());
    Ok(())
}

fn ensure_parent(path: &Path) -> Result<()> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        fs::create_dir_all(parent)
            .with_context(|| format!("Failed to create directory {}", parent.display()))?;
    }
    Ok(())
}

fn write_folder(dir: &Path, file: &ExportFile) -> Result<()> {
    fs::create_dir_all(dir).with_context(|| format!("Failed to create directory {}", dir.display()))?;

    let manifest = serde_json::to_string_pretty(&file.manifest()).context("Failed to serialize manifest")?;
    fs::write(dir.join(MANIFEST_FILE), manifest)
        .with_context(|| format!("Failed to write manifest in {}", dir.display()))?;

    for record in &file.records {
        let target = dir.join(record_path(record));
        ensure_parent(&target)?;
        let content = serde_json::to_string_pretty(record).context("Failed to serialize record")?;
        fs::write(&target, content).with_context(|| format!("Failed to write {}", target.display()))?;
    }

    Ok(())
}

fn write_zip(path: &Path, file: &ExportFile) -> Result<()> {
    ensure_parent(path)?;
    let out = fs::File::create(path).with_context(|| format!("Failed to create {}", path.display()))?;
    let mut writer = zip::ZipWriter::new(out);
    let options = zip::write::SimpleFileOptions::default()
        .compression_method(zip::CompressionMethod::Deflated);

    let manifest = serde_json::to_vec_pretty(&file.manifest()).context("Failed to serialize manifest")?;
    writer.start_file(MANIFEST_FILE, options)?;
    writer.write_all(&manifest)?;

    for record in &file.records {
        let content = serde_json::to_vec_pretty(record).context("Failed to serialize record")?;
        writer.start_file(record_path(record), options)?;
        writer.write_all(&content)?;
    }

    writer
        .finish()
        .with_context(|| format!("Failed to finish archive {}", path.display()))?;
    Ok(())
}
