//! Package archive reading and entry location.

use std::collections::BTreeMap;
use std::io::{Cursor, Read};
use zip::ZipArchive;

use crate::error::{Error, Result};

/// Conventional entry names written by vendor slicers.
pub const MACHINE_CODE_ENTRY: &str = "Metadata/plate_1.gcode";
pub const PROJECT_SETTINGS_ENTRY: &str = "Metadata/project_settings.config";
pub const SLICE_INFO_ENTRY: &str = "Metadata/slice_info.config";
pub const PLATE_JSON_ENTRY: &str = "Metadata/plate_1.json";
pub const MODEL_ENTRY: &str = "3D/3dmodel.model";

/// Decoded contents of one package archive.
#[derive(Debug, Clone)]
pub struct PackageContent {
    /// The machine-code stream, lossily decoded to UTF-8.
    pub machine_code: String,
    /// Archive entry the machine code was found under.
    pub machine_code_entry: String,
    /// Raw bytes of the best metadata entry found.
    pub metadata_raw: Vec<u8>,
    /// Every file entry in the archive, by name.
    pub entries: BTreeMap<String, Vec<u8>>,
}

/// Decode every file entry of a ZIP archive. Directories are skipped.
pub fn read_entries(bytes: &[u8]) -> Result<BTreeMap<String, Vec<u8>>> {
    let mut archive =
        ZipArchive::new(Cursor::new(bytes)).map_err(|e| Error::parse(format!("not a package archive: {}", e)))?;
    let mut entries = BTreeMap::new();
    for i in 0..archive.len() {
        let mut file = archive
            .by_index(i)
            .map_err(|e| Error::parse(format!("corrupt archive entry {}: {}", i, e)))?;
        if file.is_dir() {
            continue;
        }
        let name = file.name().to_string();
        let mut buf = Vec::with_capacity(file.size() as usize);
        file.read_to_end(&mut buf)?;
        entries.insert(name, buf);
    }
    Ok(entries)
}

/// Open a package archive and locate its machine-code stream and metadata
/// entry. Fails only when no machine-code entry can be found by any
/// strategy; a missing metadata entry just leaves `metadata_raw` empty.
pub fn read_package(bytes: &[u8]) -> Result<PackageContent> {
    let entries = read_entries(bytes)?;

    let machine_code_entry = locate_machine_code(&entries).ok_or_else(|| {
        Error::Parse("no machine-code entry found in package archive".to_string())
    })?;
    let machine_code =
        String::from_utf8_lossy(&entries[&machine_code_entry]).into_owned();

    let metadata_raw = locate_metadata(&entries, &machine_code_entry)
        .map(|name| entries[&name].clone())
        .unwrap_or_default();

    Ok(PackageContent {
        machine_code,
        machine_code_entry,
        metadata_raw,
        entries,
    })
}

/// Machine-code entry search, in priority order: the conventional metadata
/// subdirectory, a conventionally named top-level entry, any entry with the
/// extension, and finally a content sniff for command tokens.
fn locate_machine_code(entries: &BTreeMap<String, Vec<u8>>) -> Option<String> {
    if entries.contains_key(MACHINE_CODE_ENTRY) {
        return Some(MACHINE_CODE_ENTRY.to_string());
    }
    if let Some(name) = entries
        .keys()
        .find(|n| n.starts_with("Metadata/") && n.ends_with(".gcode"))
    {
        return Some(name.clone());
    }
    if let Some(name) = entries
        .keys()
        .find(|n| !n.contains('/') && n.ends_with(".gcode"))
    {
        return Some(name.clone());
    }
    if let Some(name) = entries.keys().find(|n| n.ends_with(".gcode")) {
        return Some(name.clone());
    }
    entries
        .iter()
        .find(|(_, bytes)| looks_like_machine_code(bytes))
        .map(|(name, _)| name.clone())
}

/// Metadata entry search: structured config path, generic JSON path, any
/// JSON entry, a content-sniffed JSON object, then the model entry.
fn locate_metadata(entries: &BTreeMap<String, Vec<u8>>, machine_code_entry: &str) -> Option<String> {
    for conventional in [PROJECT_SETTINGS_ENTRY, PLATE_JSON_ENTRY] {
        if entries.contains_key(conventional) {
            return Some(conventional.to_string());
        }
    }
    if let Some(name) = entries.keys().find(|n| n.ends_with(".json")) {
        return Some(name.clone());
    }
    if let Some(name) = entries
        .iter()
        .filter(|(name, _)| name.as_str() != machine_code_entry)
        .find(|(_, bytes)| {
            serde_json::from_slice::<serde_json::Value>(bytes)
                .map(|v| v.is_object())
                .unwrap_or(false)
        })
        .map(|(name, _)| name.clone())
    {
        return Some(name);
    }
    entries.contains_key(MODEL_ENTRY).then(|| MODEL_ENTRY.to_string())
}

/// True when the bytes read like a machine-code stream: several lines
/// starting with characteristic command words.
fn looks_like_machine_code(bytes: &[u8]) -> bool {
    const TOKENS: [&str; 6] = ["G0 ", "G1 ", "G28", "G90", "M104", "M140"];
    let text = String::from_utf8_lossy(&bytes[..bytes.len().min(16 * 1024)]);
    let mut hits = 0;
    for line in text.lines().take(400) {
        let line = line.trim_start();
        if TOKENS.iter().any(|t| line.starts_with(t)) {
            hits += 1;
            if hits >= 3 {
                return true;
            }
        }
    }
    false
}

/// Per-copy estimates recovered from the per-plate JSON entry.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct PlateStats {
    pub weight_g: Option<f64>,
    pub duration_min: Option<f64>,
}

/// Read weight and predicted duration from `Metadata/plate_1.json`, when
/// present and well-formed.
pub fn plate_stats(entries: &BTreeMap<String, Vec<u8>>) -> PlateStats {
    let Some(bytes) = entries.get(PLATE_JSON_ENTRY) else {
        return PlateStats::default();
    };
    let Ok(value) = serde_json::from_slice::<serde_json::Value>(bytes) else {
        return PlateStats::default();
    };
    PlateStats {
        weight_g: value.get("weight").and_then(|v| v.as_f64()),
        duration_min: value
            .get("prediction")
            .and_then(|v| v.as_f64())
            .map(|secs| secs / 60.0),
    }
}

/// Total layer count announced in the machine-code comments, if any.
pub fn layer_count(machine_code: &str) -> Option<u64> {
    for line in machine_code.lines().take(1000) {
        let line = line.trim();
        for prefix in ["; total layer number:", ";LAYER_COUNT:"] {
            if let Some(rest) = line.strip_prefix(prefix) {
                if let Ok(n) = rest.trim().parse::<u64>() {
                    return Some(n);
                }
            }
        }
    }
    None
}
