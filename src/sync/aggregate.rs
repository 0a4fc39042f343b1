//! Projects the enriched record set into the two row shapes consumed by
//! the presentation layer.

use crate::context::{SessionContext, VehicleFilter};
use crate::models::rows::PLACEHOLDER;
use crate::models::{
    DetailRow, InspectionRecord, KpiCounts, RepairStatus, SummaryRow, UserRef, UNKNOWN_DRIVER_ID,
};

use super::classify;

/// One row per record, with per-status defect counts from a single pass
/// over that record's defects. Records outside `filter` are excluded.
pub fn summarize(
    records: &[InspectionRecord],
    ctx: &SessionContext,
    filter: &VehicleFilter,
) -> Vec<SummaryRow> {
    records
        .iter()
        .filter(|r| filter.matches(r.device_id()))
        .map(|record| {
            let defects = classify::defects_of(record);
            let mut outstanding = 0;
            let mut not_necessary = 0;
            let mut repaired = 0;
            for defect in defects {
                match RepairStatus::from_api(classify::repair_status(defect)) {
                    RepairStatus::Outstanding => outstanding += 1,
                    RepairStatus::NotNecessary => not_necessary += 1,
                    RepairStatus::Repaired => repaired += 1,
                    RepairStatus::Other => {}
                }
            }

            SummaryRow {
                id: record.id.clone(),
                vehicle: vehicle_name(record, ctx),
                device_id: record.device_id().map(str::to_string),
                driver: driver_name(record, ctx),
                date: record.timestamp(),
                log_type: record
                    .log_type
                    .clone()
                    .unwrap_or_else(|| PLACEHOLDER.to_string()),
                safe_to_operate: record.is_safe_to_operate != Some(false),
                total_defects: defects.len(),
                outstanding_defects: outstanding,
                not_necessary,
                repaired,
            }
        })
        .collect()
}

/// One row per (record, defect) pair.
pub fn detail(
    records: &[InspectionRecord],
    ctx: &SessionContext,
    filter: &VehicleFilter,
) -> Vec<DetailRow> {
    let mut rows = Vec::new();
    for record in records {
        if !filter.matches(record.device_id()) {
            continue;
        }
        for defect in classify::defects_of(record) {
            let (part, defect_name, severity) = {
                let part = defect
                    .part
                    .as_ref()
                    .and_then(|p| p.display_name())
                    .unwrap_or(PLACEHOLDER)
                    .to_string();
                let name = defect
                    .defect
                    .as_ref()
                    .and_then(|d| d.display_name())
                    .unwrap_or(PLACEHOLDER)
                    .to_string();
                let severity = defect
                    .defect
                    .as_ref()
                    .and_then(|d| d.severity.clone())
                    .unwrap_or_else(|| PLACEHOLDER.to_string());
                (part, name, severity)
            };

            let remarks = defect
                .defect_remarks
                .as_deref()
                .map(|remarks| {
                    remarks
                        .iter()
                        .filter_map(|r| r.body())
                        .collect::<Vec<_>>()
                        .join("; ")
                })
                .filter(|joined| !joined.is_empty())
                .unwrap_or_else(|| PLACEHOLDER.to_string());

            rows.push(DetailRow {
                record_id: record.id.clone(),
                vehicle: vehicle_name(record, ctx),
                device_id: record.device_id().map(str::to_string),
                driver: driver_name(record, ctx),
                date: record.timestamp(),
                part,
                defect: defect_name,
                severity,
                repair_status: RepairStatus::from_api(classify::repair_status(defect)),
                repaired_by: repair_performer(defect.repair_user.as_ref(), ctx),
                repair_date: defect.repair_date_time,
                remarks,
            });
        }
    }
    rows
}

/// Fleet-level indicator counts over the summary rows.
pub fn kpis(rows: &[SummaryRow]) -> KpiCounts {
    let mut counts = KpiCounts::default();
    for row in rows {
        if row.outstanding_defects > 0 {
            counts.outstanding += 1;
        }
        if row.not_necessary > 0 {
            counts.not_necessary += 1;
        }
    }
    counts
}

/// Driver display name: cache, then the inline reference name, then the
/// raw id unless it is the unknown-driver sentinel.
fn driver_name(record: &InspectionRecord, ctx: &SessionContext) -> String {
    if let Some(id) = record.driver_id() {
        if let Some(name) = ctx.driver_display_name(id) {
            return name;
        }
    }
    if let Some(name) = record.driver.as_ref().and_then(|d| d.name.clone()) {
        return name;
    }
    match record.driver_id() {
        Some(id) if id != UNKNOWN_DRIVER_ID => id.to_string(),
        _ => PLACEHOLDER.to_string(),
    }
}

fn vehicle_name(record: &InspectionRecord, ctx: &SessionContext) -> String {
    ctx.vehicle_name(record)
        .unwrap_or_else(|| PLACEHOLDER.to_string())
}

/// Repair performer display name: driver cache by id, else the inline
/// name, else the raw identifier.
fn repair_performer(user: Option<&UserRef>, ctx: &SessionContext) -> String {
    let Some(user) = user else {
        return PLACEHOLDER.to_string();
    };
    if let Some(id) = user.id() {
        if let Some(name) = ctx.driver_display_name(id) {
            return name;
        }
    }
    match user {
        UserRef::Ref(r) => r
            .name
            .clone()
            .or_else(|| r.id.clone())
            .unwrap_or_else(|| PLACEHOLDER.to_string()),
        UserRef::Id(id) => id.clone(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    use crate::models::DriverIdentity;

    fn record(value: serde_json::Value) -> InspectionRecord {
        serde_json::from_value(value).unwrap()
    }

    fn ctx() -> SessionContext {
        SessionContext::for_tests(vec![], vec![])
    }

    #[test]
    fn status_counts_sum_to_total() {
        let records = vec![record(json!({
            "id": "b1",
            "dVIRDefects": [
                { "repairStatus": "NotRepaired" },
                { "repairStatus": "NotNecessary" },
                { "repairStatus": "Repaired" },
            ],
        }))];

        let rows = summarize(&records, &ctx(), &VehicleFilter::All);
        assert_eq!(rows.len(), 1);
        let row = &rows[0];
        assert_eq!(row.total_defects, 3);
        assert_eq!(row.outstanding_defects, 1);
        assert_eq!(row.not_necessary, 1);
        assert_eq!(row.repaired, 1);
        assert_eq!(
            row.outstanding_defects + row.not_necessary + row.repaired,
            row.total_defects
        );

        let counts = kpis(&rows);
        assert_eq!(counts.outstanding, 1);
        assert_eq!(counts.not_necessary, 1);
    }

    #[test]
    fn every_detail_row_has_exactly_one_parent_summary() {
        let records = vec![
            record(json!({
                "id": "b1",
                "dVIRDefects": [{ "repairStatus": "Repaired" }, { "repairStatus": "NotRepaired" }],
            })),
            record(json!({ "id": "b2" })),
            record(json!({
                "id": "b3",
                "dVIRDefects": [{ "repairStatus": "NotNecessary" }],
            })),
        ];

        let ctx = ctx();
        let summary = summarize(&records, &ctx, &VehicleFilter::All);
        let details = detail(&records, &ctx, &VehicleFilter::All);

        assert_eq!(details.len(), 3);
        for row in &details {
            let parents: Vec<_> = summary.iter().filter(|s| s.id == row.record_id).collect();
            assert_eq!(parents.len(), 1);
        }
    }

    #[test]
    fn vehicle_filter_excludes_before_projection() {
        let records = vec![
            record(json!({ "id": "b1", "device": { "id": "d1" } })),
            record(json!({ "id": "b2", "device": { "id": "d2" } })),
        ];
        let filter = VehicleFilter::Ids(std::collections::HashSet::from(["d1".to_string()]));
        let rows = summarize(&records, &ctx(), &filter);
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].id, "b1");
    }

    #[test]
    fn repair_performer_falls_back_cache_then_inline_then_id() {
        let ctx = ctx();
        ctx.insert_driver(DriverIdentity {
            id: "u1".to_string(),
            first_name: Some("Sam".to_string()),
            last_name: Some("Rivera".to_string()),
            name: None,
        });

        let records = vec![record(json!({
            "id": "b1",
            "dVIRDefects": [
                { "repairStatus": "Repaired", "repairUser": { "id": "u1" } },
                { "repairStatus": "Repaired", "repairUser": { "id": "u9", "name": "mechanic9" } },
                { "repairStatus": "Repaired", "repairUser": "u7" },
                { "repairStatus": "Repaired" },
            ],
        }))];

        let rows = detail(&records, &ctx, &VehicleFilter::All);
        assert_eq!(rows[0].repaired_by, "Sam Rivera");
        assert_eq!(rows[1].repaired_by, "mechanic9");
        assert_eq!(rows[2].repaired_by, "u7");
        assert_eq!(rows[3].repaired_by, "--");
    }

    #[test]
    fn remarks_join_and_placeholders_apply() {
        let records = vec![record(json!({
            "id": "b1",
            "driver": { "id": "UnknownDriverId" },
            "dVIRDefects": [{
                "repairStatus": "NotRepaired",
                "defect": { "name": "Brake hose", "severity": "Critical" },
                "part": { "name": "Brakes" },
                "defectRemarks": [
                    { "remark": "leaking" },
                    { "comment": "left side" },
                    { "remark": "" },
                ],
            }],
        }))];

        let rows = detail(&records, &ctx(), &VehicleFilter::All);
        let row = &rows[0];
        assert_eq!(row.remarks, "leaking; left side");
        assert_eq!(row.part, "Brakes");
        assert_eq!(row.defect, "Brake hose");
        assert_eq!(row.severity, "Critical");
        assert_eq!(row.driver, "--", "sentinel driver id renders placeholder");
        assert_eq!(row.vehicle, "--");
    }
}
