use sha2::{Digest, Sha256};

use crate::common::error::Result;
use crate::common::types::DailyObservation;
use crate::pipeline::processing::quality_gate::QualityReport;

/// SHA-256 over the dataset and the report with run-date fields cleared.
///
/// Two runs over identical source data produce the same fingerprint no
/// matter which day they ran on.
pub fn compute_run_fingerprint(dataset: &[DailyObservation], report: &QualityReport) -> Result<String> {
    let mut hasher = Sha256::new();
    hasher.update(serde_json::to_vec(dataset)?);
    hasher.update(b"|");
    hasher.update(serde_json::to_vec(&report.without_run_date())?);
    Ok(hex::encode(hasher.finalize()))
}
