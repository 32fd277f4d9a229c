//! Rebuilds a package with the machine-code stream replaced by replicated,
//! concatenated content from one or more jobs.

use std::collections::BTreeMap;
use std::io::{Cursor, Write};
use uuid::Uuid;
use zip::write::SimpleFileOptions;
use zip::ZipWriter;

use crate::error::{Error, Result};
use crate::model::PackageSummary;
use crate::package::reader::{layer_count, plate_stats, PackageContent, PLATE_JSON_ENTRY};

/// Streams at or below this size are hashed in full; larger ones are
/// sampled head and tail to bound cost.
const SAMPLE_THRESHOLD: usize = 8 * 1024 * 1024;
const SAMPLE_WINDOW: usize = 1024 * 1024;

/// One job's contribution to a merged stream.
#[derive(Debug, Clone)]
pub struct ReplicationPart {
    pub job_id: Uuid,
    /// Storage path of the originating package, for the summary.
    pub source_name: String,
    pub machine_code: String,
    pub quantity: u32,
}

/// A freshly built package: the archive bytes, its decoded entries (for the
/// mandatory validation gate), display metadata, and any warnings.
#[derive(Debug, Clone)]
pub struct MergedPackage {
    pub archive: Vec<u8>,
    pub entries: BTreeMap<String, Vec<u8>>,
    pub summary: PackageSummary,
    pub warnings: Vec<String>,
}

pub struct ConcatenationEngine {
    size_ceiling: u64,
}

struct SegmentPlan<'a> {
    part: &'a ReplicationPart,
    copy: u32,
}

impl ConcatenationEngine {
    pub fn new(size_ceiling_bytes: u64) -> Self {
        Self {
            size_ceiling: size_ceiling_bytes,
        }
    }

    /// Build a new package from `base`, replacing its machine-code entry
    /// with the parts' content replicated at exact multiplicity, in the
    /// order given. Trailing segments past the size ceiling are dropped
    /// with a warning rather than failing the run.
    pub fn concatenate(
        &self,
        base: &PackageContent,
        parts: &[ReplicationPart],
    ) -> Result<MergedPackage> {
        let requested: u64 = parts.iter().map(|p| p.quantity as u64).sum();
        if requested == 0 {
            return Err(Error::Parse(
                "nothing to concatenate: zero total quantity".to_string(),
            ));
        }

        let mut warnings = Vec::new();
        let plan = self.plan_segments(parts, requested, &mut warnings);
        let stream = render_stream(&plan);
        let digest = stream_checksum(stream.as_bytes());

        let kept = plan.len() as u64;
        let summary = self.build_summary(base, parts, kept, &digest);

        let mut entries = base.entries.clone();
        let checksum_entry = format!("{}.md5", base.machine_code_entry);
        entries.insert(base.machine_code_entry.clone(), stream.into_bytes());
        entries.insert(checksum_entry, digest.into_bytes());
        if let Some(updated) = scale_plate_json(&base.entries, kept) {
            entries.insert(PLATE_JSON_ENTRY.to_string(), updated);
        }

        let archive = write_archive(&entries)?;
        Ok(MergedPackage {
            archive,
            entries,
            summary,
            warnings,
        })
    }

    /// Lay out the replicated copies, stopping before the ceiling. At least
    /// one segment is always kept so a merge never degenerates to an empty
    /// stream.
    fn plan_segments<'a>(
        &self,
        parts: &'a [ReplicationPart],
        requested: u64,
        warnings: &mut Vec<String>,
    ) -> Vec<SegmentPlan<'a>> {
        let mut plan = Vec::new();
        let mut total_bytes: u64 = 0;
        'outer: for part in parts {
            for copy in 1..=part.quantity {
                let next = total_bytes + part.machine_code.len() as u64;
                if next > self.size_ceiling && !plan.is_empty() {
                    break 'outer;
                }
                total_bytes = next;
                plan.push(SegmentPlan { part, copy });
            }
        }
        let kept = plan.len() as u64;
        if kept < requested {
            let text = format!(
                "size ceiling {} MB reached: kept {} of {} requested copies",
                self.size_ceiling / (1024 * 1024),
                kept,
                requested
            );
            tracing::warn!("{}", text);
            warnings.push(text);
        }
        plan
    }

    fn build_summary(
        &self,
        base: &PackageContent,
        parts: &[ReplicationPart],
        kept: u64,
        digest: &str,
    ) -> PackageSummary {
        let mut original_files = Vec::new();
        for part in parts {
            if !original_files.contains(&part.source_name) {
                original_files.push(part.source_name.clone());
            }
        }
        let stats = plate_stats(&base.entries);
        let mut checksums = BTreeMap::new();
        checksums.insert(
            format!("{}.md5", base.machine_code_entry),
            digest.to_string(),
        );
        PackageSummary {
            original_files,
            total_layers: layer_count(&base.machine_code).unwrap_or(0) * kept,
            total_time_min: stats.duration_min.unwrap_or(0.0) * kept as f64,
            total_material_g: stats.weight_g.unwrap_or(0.0) * kept as f64,
            checksums,
        }
    }
}

/// Join the planned segments, bracketing each with delimiter comments
/// naming its position and the total count. The delimiters are inert for
/// the machine; they exist so a misbehaving print can be traced back to a
/// segment.
fn render_stream(plan: &[SegmentPlan<'_>]) -> String {
    let total = plan.len();
    let content_len: usize = plan.iter().map(|s| s.part.machine_code.len()).sum();
    let mut stream = String::with_capacity(content_len + total * 128);
    for (idx, segment) in plan.iter().enumerate() {
        stream.push_str(&format!(
            "; ==== segment {}/{} begin: job {} copy {}/{} ====\n",
            idx + 1,
            total,
            segment.part.job_id,
            segment.copy,
            segment.part.quantity
        ));
        stream.push_str(&segment.part.machine_code);
        if !segment.part.machine_code.ends_with('\n') {
            stream.push('\n');
        }
        stream.push_str(&format!("; ==== segment {}/{} end ====\n", idx + 1, total));
    }
    stream
}

/// Hex MD5 of the stream. Large streams are sampled (head, tail, length)
/// instead of hashed in full.
pub fn stream_checksum(bytes: &[u8]) -> String {
    use md5::{Digest, Md5};
    let mut hasher = Md5::new();
    if bytes.len() <= SAMPLE_THRESHOLD {
        hasher.update(bytes);
    } else {
        hasher.update(&bytes[..SAMPLE_WINDOW]);
        hasher.update(&bytes[bytes.len() - SAMPLE_WINDOW..]);
        hasher.update(bytes.len().to_le_bytes());
    }
    hasher
        .finalize()
        .iter()
        .map(|b| format!("{:02x}", b))
        .collect()
}

/// Scale the per-plate JSON's aggregate estimates by the replica count.
fn scale_plate_json(entries: &BTreeMap<String, Vec<u8>>, kept: u64) -> Option<Vec<u8>> {
    let bytes = entries.get(PLATE_JSON_ENTRY)?;
    let mut value: serde_json::Value = serde_json::from_slice(bytes).ok()?;
    let obj = value.as_object_mut()?;
    if let Some(prediction) = obj.get("prediction").and_then(|v| v.as_f64()) {
        obj.insert(
            "prediction".to_string(),
            serde_json::Value::from((prediction * kept as f64).round() as u64),
        );
    }
    if let Some(weight) = obj.get("weight").and_then(|v| v.as_f64()) {
        obj.insert(
            "weight".to_string(),
            serde_json::Value::from(weight * kept as f64),
        );
    }
    serde_json::to_vec(&value).ok()
}

fn write_archive(entries: &BTreeMap<String, Vec<u8>>) -> Result<Vec<u8>> {
    let mut buffer = Cursor::new(Vec::new());
    let mut zip = ZipWriter::new(&mut buffer);
    let options = SimpleFileOptions::default()
        .compression_method(zip::CompressionMethod::Deflated)
        .compression_level(Some(6));
    for (name, bytes) in entries {
        zip.start_file(name.as_str(), options)
            .map_err(|e| Error::parse(format!("archive write '{}': {}", name, e)))?;
        zip.write_all(bytes)
            .map_err(|e| Error::parse(format!("archive write '{}': {}", name, e)))?;
    }
    zip.finish()
        .map_err(|e| Error::parse(format!("archive finish: {}", e)))?;
    Ok(buffer.into_inner())
}
