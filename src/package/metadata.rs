//! Slicing metadata extraction.
//!
//! Extraction is best-effort and total: it never fails, it just leaves
//! fields unset. Parsing the same bytes twice yields an identical record.

use quick_xml::events::{BytesStart, Event};
use quick_xml::Reader;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::HashMap;

use crate::package::reader::{
    PackageContent, PLATE_JSON_ENTRY, PROJECT_SETTINGS_ENTRY, SLICE_INFO_ENTRY,
};

/// Known vendor tokens and the brand they identify.
const BRAND_TOKENS: [(&str, &str); 4] = [
    ("bambu", "Bambu Lab"),
    ("orca", "OrcaSlicer"),
    ("prusa", "Prusa Research"),
    ("cura", "UltiMaker"),
];

/// Normalized slicing metadata. Every field is best-effort.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SliceMetadata {
    pub application: Option<String>,
    pub creation_date: Option<String>,
    pub designer_id: Option<String>,
    pub printer_brand: Option<String>,
    pub printer_model: Option<String>,
    pub printer_settings_id: Option<String>,
    pub print_profile: Option<String>,
    pub material_type: Option<String>,
    pub material_name: Option<String>,
    pub nozzle_diameter: Option<f64>,
    pub is_automatic_profile: bool,
}

/// Extracts a [`SliceMetadata`] record from package contents.
pub struct MetadataExtractor {
    auto_profile_marker: String,
}

impl MetadataExtractor {
    pub fn new(auto_profile_marker: impl Into<String>) -> Self {
        Self {
            auto_profile_marker: auto_profile_marker.into(),
        }
    }

    /// Run the full extraction pipeline over one package.
    pub fn extract(&self, content: &PackageContent) -> SliceMetadata {
        let mut meta = SliceMetadata::default();

        // Structured JSON first; XML pattern-match otherwise.
        if let Ok(value) = serde_json::from_slice::<Value>(&content.metadata_raw) {
            apply_json_fields(&mut meta, &value);
        } else {
            let fields = model_metadata_fields(&content.metadata_raw);
            meta.application = meta.application.take().or_else(|| fields.get("Application").cloned());
            meta.creation_date = fields.get("CreationDate").cloned();
            meta.designer_id = fields.get("DesignerUserId").cloned();
        }

        detect_brand(&mut meta);
        self.supplementary_pass(&mut meta, content);
        detect_brand(&mut meta);

        meta.is_automatic_profile =
            is_automatic_profile(&meta, &self.auto_profile_marker);
        meta
    }

    /// Scan auxiliary config-like entries for fields the primary pass did
    /// not find, most specific names first.
    fn supplementary_pass(&self, meta: &mut SliceMetadata, content: &PackageContent) {
        if let Some(bytes) = content.entries.get(PROJECT_SETTINGS_ENTRY) {
            if let Ok(value) = serde_json::from_slice::<Value>(bytes) {
                apply_json_fields(meta, &value);
            }
        }
        if let Some(bytes) = content.entries.get(SLICE_INFO_ENTRY) {
            let kv = config_key_values(bytes);
            if meta.material_type.is_none() {
                meta.material_type = kv.get("filament_type").cloned();
            }
            if meta.printer_model.is_none() {
                meta.printer_model = kv
                    .get("printer_model_id")
                    .or_else(|| kv.get("printer_model"))
                    .cloned();
            }
        }
        if let Some(bytes) = content.entries.get(PLATE_JSON_ENTRY) {
            if meta.nozzle_diameter.is_none() {
                if let Ok(value) = serde_json::from_slice::<Value>(bytes) {
                    meta.nozzle_diameter = number_field(&value, "nozzle_diameter");
                }
            }
        }

        // Generic scan of anything that smells like a settings file.
        if meta.print_profile.is_some()
            && meta.material_type.is_some()
            && meta.printer_settings_id.is_some()
            && meta.nozzle_diameter.is_some()
        {
            return;
        }
        const HINTS: [&str; 5] = ["profile", "config", "settings", "print", "material"];
        for (name, bytes) in &content.entries {
            if name.as_str() == PROJECT_SETTINGS_ENTRY
                || name.as_str() == SLICE_INFO_ENTRY
                || name.as_str() == PLATE_JSON_ENTRY
                || name.as_str() == content.machine_code_entry
            {
                continue;
            }
            let lower = name.to_lowercase();
            if !HINTS.iter().any(|h| lower.contains(h)) {
                continue;
            }
            if let Ok(value) = serde_json::from_slice::<Value>(bytes) {
                apply_json_fields(meta, &value);
            } else {
                let kv = config_key_values(bytes);
                if meta.material_type.is_none() {
                    meta.material_type = kv.get("filament_type").cloned();
                }
                if meta.print_profile.is_none() {
                    meta.print_profile = kv.get("print_profile").cloned();
                }
            }
        }
    }
}

/// True when the record describes an operator-independent, pre-approved
/// profile: an already-set flag, or the marker appearing (case-insensitive)
/// in the printer-settings id, or failing that in the profile name.
pub fn is_automatic_profile(meta: &SliceMetadata, marker: &str) -> bool {
    if meta.is_automatic_profile {
        return true;
    }
    let marker = marker.to_lowercase();
    if let Some(id) = &meta.printer_settings_id {
        if id.to_lowercase().contains(&marker) {
            return true;
        }
    }
    if let Some(profile) = &meta.print_profile {
        if profile.to_lowercase().contains(&marker) {
            return true;
        }
    }
    false
}

/// Read known keys out of a JSON document without ever failing. Vendors
/// store several of these as one-element arrays.
fn apply_json_fields(meta: &mut SliceMetadata, value: &Value) {
    if meta.application.is_none() {
        meta.application = string_field(value, "Application");
    }
    if meta.print_profile.is_none() {
        meta.print_profile = string_field(value, "default_print_profile")
            .or_else(|| string_field(value, "print_settings_id"));
    }
    if meta.material_name.is_none() {
        meta.material_name = string_field(value, "default_filament_profile")
            .or_else(|| string_field(value, "filament_settings_id"));
    }
    if meta.printer_settings_id.is_none() {
        meta.printer_settings_id = string_field(value, "printer_settings_id");
    }
    if meta.printer_model.is_none() {
        meta.printer_model = string_field(value, "printer_model");
    }
    if meta.material_type.is_none() {
        meta.material_type = string_field(value, "filament_type");
    }
    if meta.nozzle_diameter.is_none() {
        meta.nozzle_diameter = number_field(value, "nozzle_diameter");
    }
}

fn string_field(value: &Value, key: &str) -> Option<String> {
    match value.get(key)? {
        Value::String(s) if !s.is_empty() => Some(s.clone()),
        Value::Array(items) => items.first().and_then(|v| v.as_str()).map(str::to_string),
        _ => None,
    }
}

fn number_field(value: &Value, key: &str) -> Option<f64> {
    match value.get(key)? {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.parse().ok(),
        Value::Array(items) => items.first().and_then(|v| match v {
            Value::Number(n) => n.as_f64(),
            Value::String(s) => s.parse().ok(),
            _ => None,
        }),
        _ => None,
    }
}

fn detect_brand(meta: &mut SliceMetadata) {
    if meta.printer_brand.is_some() {
        return;
    }
    let haystacks = [meta.application.as_deref(), meta.printer_model.as_deref()];
    for hay in haystacks.into_iter().flatten() {
        let lower = hay.to_lowercase();
        for (token, brand) in BRAND_TOKENS {
            if lower.contains(token) {
                meta.printer_brand = Some(brand.to_string());
                return;
            }
        }
    }
}

/// `<metadata name="Application">BambuStudio</metadata>` elements of the
/// model XML, as a name -> text map.
fn model_metadata_fields(bytes: &[u8]) -> HashMap<String, String> {
    let mut reader = Reader::from_reader(bytes);
    let mut out = HashMap::new();
    let mut buf = Vec::new();
    let mut pending: Option<String> = None;
    loop {
        match reader.read_event_into(&mut buf) {
            Ok(Event::Start(e)) if e.local_name().as_ref() == b"metadata" => {
                pending = attr_value(&e, b"name");
            }
            Ok(Event::Text(t)) => {
                if let Some(name) = pending.take() {
                    if let Ok(text) = t.unescape() {
                        let text = text.trim();
                        if !text.is_empty() {
                            out.insert(name, text.to_string());
                        }
                    }
                }
            }
            Ok(Event::End(_)) => {
                pending = None;
            }
            Ok(Event::Eof) | Err(_) => break,
            _ => {}
        }
        buf.clear();
    }
    out
}

/// `<metadata key="filament_type" value="PLA"/>` elements of the config
/// XML, as a key -> value map.
fn config_key_values(bytes: &[u8]) -> HashMap<String, String> {
    let mut reader = Reader::from_reader(bytes);
    let mut out = HashMap::new();
    let mut buf = Vec::new();
    loop {
        match reader.read_event_into(&mut buf) {
            Ok(Event::Empty(e)) | Ok(Event::Start(e))
                if e.local_name().as_ref() == b"metadata" =>
            {
                if let (Some(key), Some(value)) =
                    (attr_value(&e, b"key"), attr_value(&e, b"value"))
                {
                    out.insert(key, value);
                }
            }
            Ok(Event::Eof) | Err(_) => break,
            _ => {}
        }
        buf.clear();
    }
    out
}

fn attr_value(e: &BytesStart<'_>, name: &[u8]) -> Option<String> {
    e.attributes()
        .flatten()
        .find(|a| a.key.as_ref() == name)
        .map(|a| String::from_utf8_lossy(&a.value).into_owned())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::BTreeMap;

    fn content(metadata_raw: &[u8], extra: &[(&str, &[u8])]) -> PackageContent {
        let mut entries: BTreeMap<String, Vec<u8>> = BTreeMap::new();
        entries.insert("Metadata/plate_1.gcode".to_string(), b"G28\n".to_vec());
        for (name, bytes) in extra {
            entries.insert(name.to_string(), bytes.to_vec());
        }
        PackageContent {
            machine_code: "G28\n".to_string(),
            machine_code_entry: "Metadata/plate_1.gcode".to_string(),
            metadata_raw: metadata_raw.to_vec(),
            entries,
        }
    }

    const MODEL_XML: &[u8] = br#"<?xml version="1.0" encoding="UTF-8"?>
<model unit="millimeter">
    <metadata name="Application">BambuStudio-01.09.00.70</metadata>
    <metadata name="CreationDate">2024-03-11</metadata>
    <metadata name="DesignerUserId">90210</metadata>
</model>"#;

    #[test]
    fn xml_model_fields_are_extracted() {
        let extractor = MetadataExtractor::new("auto");
        let meta = extractor.extract(&content(MODEL_XML, &[]));
        assert_eq!(meta.application.as_deref(), Some("BambuStudio-01.09.00.70"));
        assert_eq!(meta.creation_date.as_deref(), Some("2024-03-11"));
        assert_eq!(meta.designer_id.as_deref(), Some("90210"));
        assert_eq!(meta.printer_brand.as_deref(), Some("Bambu Lab"));
    }

    #[test]
    fn json_metadata_wins_over_xml_pass() {
        let raw = br#"{"printer_settings_id": "Bambu Lab X1 Carbon 0.4 nozzle", "default_print_profile": "0.20mm Standard @BBL X1C"}"#;
        let extractor = MetadataExtractor::new("auto");
        let meta = extractor.extract(&content(raw, &[]));
        assert_eq!(
            meta.printer_settings_id.as_deref(),
            Some("Bambu Lab X1 Carbon 0.4 nozzle")
        );
        assert_eq!(meta.print_profile.as_deref(), Some("0.20mm Standard @BBL X1C"));
    }

    #[test]
    fn array_valued_fields_take_first_element() {
        let raw = br#"{"default_filament_profile": ["Bambu PLA Basic @BBL X1C"], "nozzle_diameter": ["0.4"]}"#;
        let extractor = MetadataExtractor::new("auto");
        let meta = extractor.extract(&content(raw, &[]));
        assert_eq!(meta.material_name.as_deref(), Some("Bambu PLA Basic @BBL X1C"));
        assert_eq!(meta.nozzle_diameter, Some(0.4));
    }

    #[test]
    fn supplementary_pass_fills_missing_fields() {
        let slice_info: &[u8] = br#"<?xml version="1.0"?>
<config>
  <plate>
    <metadata key="filament_type" value="PETG"/>
    <metadata key="printer_model_id" value="C11"/>
  </plate>
</config>"#;
        let plate_json: &[u8] = br#"{"nozzle_diameter": 0.6, "weight": 9.9}"#;
        let extractor = MetadataExtractor::new("auto");
        let meta = extractor.extract(&content(
            MODEL_XML,
            &[
                ("Metadata/slice_info.config", slice_info),
                ("Metadata/plate_1.json", plate_json),
            ],
        ));
        assert_eq!(meta.material_type.as_deref(), Some("PETG"));
        assert_eq!(meta.printer_model.as_deref(), Some("C11"));
        assert_eq!(meta.nozzle_diameter, Some(0.6));
    }

    #[test]
    fn extraction_is_idempotent() {
        let raw = br#"{"printer_settings_id": "X1C AUTO profile"}"#;
        let extractor = MetadataExtractor::new("auto");
        let c = content(raw, &[]);
        let first = extractor.extract(&c);
        let second = extractor.extract(&c);
        assert_eq!(first, second);
    }

    #[test]
    fn garbage_bytes_yield_empty_record() {
        let extractor = MetadataExtractor::new("auto");
        let meta = extractor.extract(&content(b"\x00\x01\x02 not metadata", &[]));
        assert_eq!(meta.application, None);
        assert_eq!(meta.printer_settings_id, None);
        assert!(!meta.is_automatic_profile);
    }

    #[test]
    fn automatic_profile_from_settings_id_or_profile_name() {
        let mut meta = SliceMetadata {
            printer_settings_id: Some("X1C AUTO 0.4".to_string()),
            ..Default::default()
        };
        assert!(is_automatic_profile(&meta, "auto"));

        meta.printer_settings_id = Some("X1C manual".to_string());
        assert!(!is_automatic_profile(&meta, "auto"));

        meta.print_profile = Some("Automatic 0.2mm".to_string());
        assert!(is_automatic_profile(&meta, "AUTO"));

        meta.print_profile = Some("0.2mm fine".to_string());
        assert!(!is_automatic_profile(&meta, "auto"));

        meta.is_automatic_profile = true;
        assert!(is_automatic_profile(&meta, "auto"));
    }
}
