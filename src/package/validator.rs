//! Package container contract checks.

use std::collections::BTreeMap;

/// Every entry a package must contain to be considered printable.
pub const REQUIRED_FILES: [&str; 12] = [
    "[Content_Types].xml",
    "_rels/.rels",
    "3D/3dmodel.model",
    "Metadata/plate_1.gcode",
    "Metadata/plate_1.gcode.md5",
    "Metadata/plate_1.json",
    "Metadata/slice_info.config",
    "Metadata/project_settings.config",
    "Metadata/model_settings.config",
    "Metadata/cut_information.xml",
    "Metadata/plate_1.png",
    "Metadata/plate_1_small.png",
];

/// Machine-code streams shorter than this are suspicious but not fatal.
const MACHINE_CODE_FLOOR: usize = 64;

/// Hex digest width the checksum entry is expected to have.
const CHECKSUM_LEN: usize = 32;

/// Outcome of a package validation run.
#[derive(Debug, Clone, Default, serde::Serialize)]
pub struct ValidationReport {
    pub is_valid: bool,
    pub errors: Vec<String>,
    pub warnings: Vec<String>,
}

/// Check a package's entries against the required-file and well-formedness
/// contract. Mandatory for freshly built packages, advisory for re-checking
/// existing ones.
pub fn validate(entries: &BTreeMap<String, Vec<u8>>) -> ValidationReport {
    let mut errors = Vec::new();
    let mut warnings = Vec::new();

    for required in REQUIRED_FILES {
        if !entries.contains_key(required) {
            errors.push(format!("missing required entry '{}'", required));
        }
    }

    for (name, bytes) in entries {
        if name.ends_with(".json") || name.as_str() == "Metadata/project_settings.config" {
            if serde_json::from_slice::<serde_json::Value>(bytes).is_err() {
                errors.push(format!("entry '{}' is not valid JSON", name));
            }
        } else if name.ends_with(".model") {
            if !contains_marker(bytes, "<model") {
                errors.push(format!("entry '{}' has no <model> root", name));
            }
        } else if name.ends_with(".xml") || name.ends_with(".rels") || name.ends_with(".config") {
            if !starts_with_tag(bytes) {
                errors.push(format!("entry '{}' is not well-formed XML", name));
            }
        }
    }

    if let Some(code) = entries.get("Metadata/plate_1.gcode") {
        if code.len() < MACHINE_CODE_FLOOR {
            warnings.push(format!(
                "machine-code entry is only {} bytes",
                code.len()
            ));
        }
    }
    if let Some(digest) = entries.get("Metadata/plate_1.gcode.md5") {
        let trimmed = String::from_utf8_lossy(digest).trim().len();
        if trimmed != CHECKSUM_LEN {
            warnings.push(format!(
                "checksum entry has length {}, expected {}",
                trimmed, CHECKSUM_LEN
            ));
        }
    }

    ValidationReport {
        is_valid: errors.is_empty(),
        errors,
        warnings,
    }
}

fn contains_marker(bytes: &[u8], marker: &str) -> bool {
    String::from_utf8_lossy(&bytes[..bytes.len().min(4096)]).contains(marker)
}

fn starts_with_tag(bytes: &[u8]) -> bool {
    bytes
        .iter()
        .find(|b| !b.is_ascii_whitespace())
        .map(|b| *b == b'<')
        .unwrap_or(false)
}
