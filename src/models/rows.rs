use chrono::{DateTime, Utc};
use serde::Serialize;

/// Placeholder rendered for absent values so tabular/CSV output stays
/// visually distinct from genuinely blank data.
pub const PLACEHOLDER: &str = "--";

/// Tri-state repair classification of a defect.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum RepairStatus {
    Outstanding,
    NotNecessary,
    Repaired,
    Other,
}

impl RepairStatus {
    /// Map the API's `repairStatus` string; anything unrecognized is
    /// `Other`.
    pub fn from_api(status: &str) -> Self {
        match status {
            "NotRepaired" => RepairStatus::Outstanding,
            "NotNecessary" => RepairStatus::NotNecessary,
            "Repaired" => RepairStatus::Repaired,
            _ => RepairStatus::Other,
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            RepairStatus::Outstanding => "Outstanding",
            RepairStatus::NotNecessary => "Not Necessary",
            RepairStatus::Repaired => "Repaired",
            RepairStatus::Other => PLACEHOLDER,
        }
    }
}

/// One row per inspection record.
#[derive(Debug, Clone, Serialize)]
pub struct SummaryRow {
    pub id: String,
    pub vehicle: String,
    pub device_id: Option<String>,
    pub driver: String,
    pub date: Option<DateTime<Utc>>,
    pub log_type: String,
    pub safe_to_operate: bool,
    pub total_defects: usize,
    pub outstanding_defects: usize,
    pub not_necessary: usize,
    pub repaired: usize,
}

/// One row per (record, defect) pair.
#[derive(Debug, Clone, Serialize)]
pub struct DetailRow {
    pub record_id: String,
    pub vehicle: String,
    pub device_id: Option<String>,
    pub driver: String,
    pub date: Option<DateTime<Utc>>,
    pub part: String,
    pub defect: String,
    pub severity: String,
    pub repair_status: RepairStatus,
    pub repaired_by: String,
    pub repair_date: Option<DateTime<Utc>>,
    pub remarks: String,
}

/// Fleet-level indicator counts: records with at least one outstanding
/// defect, and records with at least one repair marked not necessary.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct KpiCounts {
    pub outstanding: usize,
    pub not_necessary: usize,
}

/// `M/D/YYYY`, or the placeholder when absent.
pub fn format_date(d: Option<DateTime<Utc>>) -> String {
    match d {
        Some(dt) => dt.format("%-m/%-d/%Y").to_string(),
        None => PLACEHOLDER.to_string(),
    }
}

/// `M/D/YYYY HH:MM`, or the placeholder when absent.
pub fn format_date_time(d: Option<DateTime<Utc>>) -> String {
    match d {
        Some(dt) => dt.format("%-m/%-d/%Y %H:%M").to_string(),
        None => PLACEHOLDER.to_string(),
    }
}

/// Host-portal hash fragment that deep-links to one inspection record.
pub fn inspection_link(record_id: &str, device_id: &str) -> String {
    format!("dvir,device:{},id:{},trailer:!n", device_id, record_id)
}
