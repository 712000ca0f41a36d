// src/heuristics/mod.rs

mod fees;
mod filename;

use fees::normalize_lines;
pub use filename::{
    document_prefix, extract_bl, extract_customs, is_customs_only_name, is_pc_filename,
};

use serde::{Deserialize, Serialize};

/// Shipment identifiers inferred from a file name.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExtractedIdentity {
    pub customs_number: Option<String>,
    pub bl_code: Option<String>,
}

/// A single line from the fee section of a payment-confirmation document.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum FeeLineItem {
    Fee {
        name: String,
        /// Digits and separators exactly as printed.
        amount: String,
        vendor: String,
    },
    Raw {
        #[serde(rename = "rawLine")]
        raw_line: String,
    },
}

/// Everything we pull out of a payment-confirmation (`PC_`) document.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PcInfo {
    pub importer: Option<String>,
    pub fees: Vec<FeeLineItem>,
}

impl PcInfo {
    pub fn structured_fees(&self) -> usize {
        self.fees
            .iter()
            .filter(|f| matches!(f, FeeLineItem::Fee { .. }))
            .count()
    }
}

/// Customs number and BL code for one file name. Missing values are not errors.
pub fn identify(filename: &str) -> ExtractedIdentity {
    ExtractedIdentity {
        customs_number: extract_customs(filename),
        bl_code: extract_bl(filename),
    }
}

/// Importer and fee lines from the page text of a document.
pub fn extract_pc_info(text: &str) -> PcInfo {
    let lines = normalize_lines(text);
    PcInfo {
        importer: fees::find_importer(&lines),
        fees: fees::extract_fees(&lines),
    }
}
