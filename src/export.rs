//! Delimited-text export of the row collections: one header line, one
//! line per row, RFC-style quoting.

use crate::models::rows::{format_date, format_date_time};
use crate::models::{DetailRow, SummaryRow};

/// A row collection that can be written as delimited text.
pub trait Exportable {
    fn headers() -> &'static [&'static str];
    fn fields(&self) -> Vec<String>;
}

impl Exportable for SummaryRow {
    fn headers() -> &'static [&'static str] {
        &[
            "vehicle",
            "driver",
            "date",
            "logType",
            "safeToOperate",
            "totalDefects",
            "outstandingDefects",
            "notNecessary",
            "repaired",
        ]
    }

    fn fields(&self) -> Vec<String> {
        vec![
            self.vehicle.clone(),
            self.driver.clone(),
            format_date_time(self.date),
            self.log_type.clone(),
            self.safe_to_operate.to_string(),
            self.total_defects.to_string(),
            self.outstanding_defects.to_string(),
            self.not_necessary.to_string(),
            self.repaired.to_string(),
        ]
    }
}

impl Exportable for DetailRow {
    fn headers() -> &'static [&'static str] {
        &[
            "vehicle",
            "driver",
            "date",
            "part",
            "defect",
            "severity",
            "repairStatus",
            "repairedBy",
            "repairDate",
            "remarks",
        ]
    }

    fn fields(&self) -> Vec<String> {
        vec![
            self.vehicle.clone(),
            self.driver.clone(),
            format_date_time(self.date),
            self.part.clone(),
            self.defect.clone(),
            self.severity.clone(),
            self.repair_status.label().to_string(),
            self.repaired_by.clone(),
            format_date(self.repair_date),
            self.remarks.clone(),
        ]
    }
}

/// Render rows as comma-delimited text. Values containing the
/// delimiter, a quote, or a line break are quote-wrapped with internal
/// quotes doubled.
pub fn to_delimited<T: Exportable>(rows: &[T]) -> String {
    let mut lines = Vec::with_capacity(rows.len() + 1);
    lines.push(T::headers().join(","));
    for row in rows {
        let fields: Vec<String> = row.fields().iter().map(|f| escape_field(f)).collect();
        lines.push(fields.join(","));
    }
    lines.join("\n")
}

fn escape_field(value: &str) -> String {
    if value.contains(',') || value.contains('"') || value.contains('\n') {
        format!("\"{}\"", value.replace('"', "\"\""))
    } else {
        value.to_string()
    }
}
