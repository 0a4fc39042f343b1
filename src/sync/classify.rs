//! Pure classification over inspection records. Total functions:
//! malformed input degrades to the empty/false case, never an error.

use crate::models::{DefectEntry, InspectionRecord};

/// The record's normalized defect collection (casing quirk already
/// resolved at the ingestion boundary).
pub fn defects_of(record: &InspectionRecord) -> &[DefectEntry] {
    record.defects()
}

/// The tri-state repair status string, or empty when missing or
/// unrecognized.
pub fn repair_status(defect: &DefectEntry) -> &str {
    match defect.repair_status.as_deref() {
        Some(s @ ("NotRepaired" | "NotNecessary" | "Repaired")) => s,
        _ => "",
    }
}

/// True iff any defect is still not repaired.
pub fn is_outstanding(record: &InspectionRecord) -> bool {
    defects_of(record)
        .iter()
        .any(|d| repair_status(d) == "NotRepaired")
}

/// True iff any defect was marked "repair not necessary".
pub fn has_unnecessary_repair(record: &InspectionRecord) -> bool {
    defects_of(record)
        .iter()
        .any(|d| repair_status(d) == "NotNecessary")
}

pub fn has_defects(record: &InspectionRecord) -> bool {
    !defects_of(record).is_empty()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn defect(status: &str) -> DefectEntry {
        DefectEntry {
            repair_status: Some(status.to_string()),
            ..DefectEntry::default()
        }
    }

    #[test]
    fn mixed_statuses_classify_both_ways() {
        let record = InspectionRecord::default().with_defects(vec![
            defect("NotRepaired"),
            defect("NotNecessary"),
            defect("Repaired"),
        ]);
        assert!(is_outstanding(&record));
        assert!(has_unnecessary_repair(&record));
        assert!(has_defects(&record));
    }

    #[test]
    fn clean_record_classifies_false() {
        let record = InspectionRecord::default();
        assert!(!is_outstanding(&record));
        assert!(!has_unnecessary_repair(&record));
        assert!(!has_defects(&record));
    }

    #[test]
    fn unknown_status_is_neither() {
        let record =
            InspectionRecord::default().with_defects(vec![defect("SomethingNew"), DefectEntry::default()]);
        assert!(!is_outstanding(&record));
        assert!(!has_unnecessary_repair(&record));
        assert_eq!(repair_status(&record.defects()[0]), "", "unrecognized normalizes to empty");
        assert_eq!(repair_status(&record.defects()[1]), "", "missing normalizes to empty");
    }
}
