//! Printer family detection and per-family capabilities.
//!
//! Vendor differences are expressed as one driver per family selected by a
//! tagged enum, not by branching inside request handlers.

use serde::{Deserialize, Serialize};

/// Printer family derived from a job's free-text printer identifier.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PrinterFamily {
    Bambu,
    Prusa,
    Generic,
    /// No identifier on the job; bucketed separately by the matcher.
    #[default]
    Unknown,
}

impl PrinterFamily {
    /// Parse from a free-text printer identifier.
    pub fn from_identifier(identifier: &str) -> Self {
        let id = identifier.trim().to_lowercase();
        if id.is_empty() {
            return Self::Unknown;
        }
        if id.contains("bambu") || id.starts_with("x1") || id.starts_with("p1") || id.starts_with("a1") {
            Self::Bambu
        } else if id.contains("prusa") || id.starts_with("mk") || id.starts_with("xl") {
            Self::Prusa
        } else {
            Self::Generic
        }
    }

    /// Driver for this family.
    pub fn driver(self) -> &'static dyn PrinterDriver {
        match self {
            PrinterFamily::Bambu => &BambuDriver,
            PrinterFamily::Prusa => &PrusaDriver,
            PrinterFamily::Generic | PrinterFamily::Unknown => &GenericDriver,
        }
    }
}

/// Per-family capabilities consulted by the matcher and the operator API.
pub trait PrinterDriver: Send + Sync {
    /// Human-readable family name used in proposal descriptions.
    fn display_name(&self) -> &'static str;

    /// Whether merged multi-plate artifacts are printable on this family.
    /// Unknown printers get the benefit of the doubt; the operator makes the
    /// final call.
    fn supports_merged_plates(&self) -> bool;
}

struct BambuDriver;

impl PrinterDriver for BambuDriver {
    fn display_name(&self) -> &'static str {
        "Bambu"
    }

    fn supports_merged_plates(&self) -> bool {
        true
    }
}

struct PrusaDriver;

impl PrinterDriver for PrusaDriver {
    fn display_name(&self) -> &'static str {
        "Prusa"
    }

    fn supports_merged_plates(&self) -> bool {
        true
    }
}

struct GenericDriver;

impl PrinterDriver for GenericDriver {
    fn display_name(&self) -> &'static str {
        "Generic"
    }

    fn supports_merged_plates(&self) -> bool {
        true
    }
}
