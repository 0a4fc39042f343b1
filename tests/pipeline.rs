//! End-to-end pipeline scenarios over a scripted in-memory API.

use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, TimeZone, Utc};
use serde_json::{json, Value};
use tokio::sync::Semaphore;

use dvir_sync::api::{FleetApi, RpcCall};
use dvir_sync::config::SyncConfig;
use dvir_sync::context::{SessionContext, VehicleSelection};
use dvir_sync::error::{ApiError, SyncError, SyncWarning};
use dvir_sync::sync::{DateRange, SyncEvent, SyncManager};

const UNKNOWN: &str = "UnknownDriverId";

fn range_start() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2026, 8, 1, 0, 0, 0).unwrap()
}

fn ten_day_range() -> DateRange {
    DateRange {
        from: range_start(),
        to: Utc.with_ymd_and_hms(2026, 8, 11, 0, 0, 0).unwrap(),
    }
}

/// Scripted fleet API: serves the bootstrap entities, 120 stubs spread
/// over the ten-day window, and full records on point fetch.
struct FleetFixture {
    stub_calls: Mutex<usize>,
    detail_batches: Mutex<usize>,
    user_batches: Mutex<usize>,
    fail_stub_fetch: bool,
    break_detail: bool,
    break_users: bool,
    detail_gate: Option<Arc<Semaphore>>,
}

impl FleetFixture {
    fn new() -> Self {
        Self {
            stub_calls: Mutex::new(0),
            detail_batches: Mutex::new(0),
            user_batches: Mutex::new(0),
            fail_stub_fetch: false,
            break_detail: false,
            break_users: false,
            detail_gate: None,
        }
    }

    fn stubs() -> Vec<Value> {
        (0..120)
            .map(|i| {
                let ts = range_start() + chrono::Duration::minutes(i as i64 * 115);
                let driver_id = match i % 3 {
                    0 => "u1",
                    1 => "u2",
                    _ => UNKNOWN,
                };
                json!({
                    "id": format!("log{}", i),
                    "device": { "id": "d1" },
                    "driver": { "id": driver_id },
                    "dateTime": ts.to_rfc3339(),
                    "logType": "PreTrip",
                    "isSafeToOperate": true,
                })
            })
            .collect()
    }

    fn full_record(id: &str) -> Value {
        let mut record = Self::stubs()
            .into_iter()
            .find(|s| s["id"] == id)
            .expect("known record id");
        if id == "log0" {
            record["dVIRDefects"] = json!([{
                "repairStatus": "NotRepaired",
                "defect": { "name": "Horn", "severity": "Normal" },
                "part": { "name": "Cab" },
                "repairUser": { "id": "u3" },
                "defectRemarks": [{ "remark": "does not sound" }],
            }]);
        } else {
            record["dVIRDefects"] = json!([]);
        }
        record
    }

    fn count(counter: &Mutex<usize>) -> usize {
        *counter.lock().unwrap()
    }
}

#[async_trait]
impl FleetApi for FleetFixture {
    async fn call(&self, call: &RpcCall) -> Result<Value, ApiError> {
        let type_name = call.params["typeName"].as_str().unwrap_or_default();
        assert_eq!(type_name, "DVIRLog", "single calls are chunked list queries");
        *self.stub_calls.lock().unwrap() += 1;

        if self.fail_stub_fetch {
            return Err(ApiError::Rpc {
                name: "DbUnavailableException".to_string(),
                message: "down".to_string(),
            });
        }

        let from: DateTime<Utc> = call.params["search"]["fromDate"]
            .as_str()
            .unwrap()
            .parse()
            .unwrap();
        let to: DateTime<Utc> = call.params["search"]["toDate"]
            .as_str()
            .unwrap()
            .parse()
            .unwrap();
        let in_window: Vec<Value> = Self::stubs()
            .into_iter()
            .filter(|s| {
                let ts: DateTime<Utc> = s["dateTime"].as_str().unwrap().parse().unwrap();
                ts >= from && ts < to
            })
            .collect();
        Ok(Value::Array(in_window))
    }

    async fn multi_call(&self, calls: &[RpcCall]) -> Result<Vec<Value>, ApiError> {
        let type_name = calls[0].params["typeName"].as_str().unwrap_or_default();
        match type_name {
            "Device" => Ok(vec![
                json!([{ "id": "d1", "name": "Truck 1" }]),
                json!([{ "id": "g1", "name": "West" }]),
            ]),
            "User" => {
                *self.user_batches.lock().unwrap() += 1;
                if self.break_users {
                    return Err(ApiError::Rpc {
                        name: "DbUnavailableException".to_string(),
                        message: "down".to_string(),
                    });
                }
                Ok(calls
                    .iter()
                    .map(|c| {
                        let id = c.params["search"]["id"].as_str().unwrap();
                        json!([{ "id": id, "firstName": "Driver", "lastName": id }])
                    })
                    .collect())
            }
            "DVIRLog" => {
                if let Some(gate) = &self.detail_gate {
                    let permit = gate.acquire().await.expect("gate open");
                    permit.forget();
                }
                *self.detail_batches.lock().unwrap() += 1;
                if self.break_detail {
                    return Err(ApiError::Rpc {
                        name: "DbUnavailableException".to_string(),
                        message: "down".to_string(),
                    });
                }
                Ok(calls
                    .iter()
                    .map(|c| {
                        let id = c.params["search"]["id"].as_str().unwrap();
                        json!([Self::full_record(id)])
                    })
                    .collect())
            }
            other => panic!("unexpected multi-call type {}", other),
        }
    }
}

fn fast_config() -> SyncConfig {
    SyncConfig {
        inter_chunk_delay: Duration::ZERO,
        inter_batch_delay: Duration::ZERO,
        backoff_floor: Duration::ZERO,
        backoff_margin: Duration::ZERO,
        ..SyncConfig::default()
    }
}

async fn manager_for(api: Arc<FleetFixture>) -> SyncManager {
    let ctx = Arc::new(SessionContext::bootstrap(api.as_ref()).await.unwrap());
    SyncManager::new(api, ctx, fast_config())
}

#[tokio::test]
async fn ten_day_sync_enriches_in_three_batches() {
    let api = Arc::new(FleetFixture::new());
    let manager = manager_for(Arc::clone(&api)).await;

    let mut handle = manager.start(ten_day_range(), &VehicleSelection::All);

    let mut partial = None;
    let mut outcome = None;
    let mut percents = Vec::new();
    while let Some(event) = handle.events.recv().await {
        match event {
            SyncEvent::Progress { percent, .. } => percents.push(percent),
            SyncEvent::Partial(p) => {
                assert!(partial.is_none(), "exactly one intermediate emission");
                partial = Some(p);
            }
            SyncEvent::Completed(o) => {
                outcome = Some(o);
                break;
            }
            other => panic!("unexpected event {:?}", other),
        }
    }

    // 10 days at 7-day width: 2 chunks; 120 stubs at batch size 50: 3
    // detail batches; two driver batches (early u1/u2, late u3).
    assert_eq!(FleetFixture::count(&api.stub_calls), 2);
    assert_eq!(FleetFixture::count(&api.detail_batches), 3);
    assert_eq!(FleetFixture::count(&api.user_batches), 2);

    let partial = partial.expect("intermediate summary");
    assert_eq!(partial.summary.len(), 120);
    assert!(partial.summary.iter().all(|r| r.total_defects == 0));
    assert_eq!(partial.kpis.outstanding, 0);

    let outcome = outcome.expect("final result");
    assert!(outcome.warnings.is_empty());
    assert_eq!(outcome.summary.len(), 120);
    assert_eq!(outcome.detail.len(), 1);
    assert_eq!(outcome.kpis.outstanding, 1);

    let row = &outcome.detail[0];
    assert_eq!(row.record_id, "log0");
    assert_eq!(row.vehicle, "Truck 1");
    assert_eq!(row.driver, "Driver u1");
    assert_eq!(row.repaired_by, "Driver u3");
    assert_eq!(row.remarks, "does not sound");

    assert_eq!(*percents.first().unwrap(), 0);
    assert_eq!(*percents.last().unwrap(), 100);
    assert!(percents.windows(2).all(|w| w[0] <= w[1]));
}

#[tokio::test]
async fn cancellation_mid_enrichment_keeps_partial_and_stops_dispatch() {
    let gate = Arc::new(Semaphore::new(0));
    let api = Arc::new(FleetFixture {
        detail_gate: Some(Arc::clone(&gate)),
        ..FleetFixture::new()
    });
    let manager = manager_for(Arc::clone(&api)).await;

    let mut handle = manager.start(ten_day_range(), &VehicleSelection::All);

    let mut partial = None;
    while let Some(event) = handle.events.recv().await {
        match event {
            SyncEvent::Partial(p) => {
                partial = Some(p);
                // First detail batch is blocked on the gate; cancel,
                // then let it through.
                handle.cancel();
                handle.cancel(); // idempotent
                gate.add_permits(10);
            }
            SyncEvent::Cancelled => break,
            SyncEvent::Progress { .. } => {}
            other => panic!("unexpected event {:?}", other),
        }
    }

    let partial = partial.expect("intermediate summary was emitted");
    assert_eq!(partial.summary.len(), 120);
    assert_eq!(
        FleetFixture::count(&api.detail_batches),
        1,
        "no dispatch after the cancellation point"
    );
}

#[tokio::test]
async fn failure_before_first_result_is_fatal() {
    let api = Arc::new(FleetFixture {
        fail_stub_fetch: true,
        ..FleetFixture::new()
    });
    let manager = manager_for(Arc::clone(&api)).await;

    let mut handle = manager.start(ten_day_range(), &VehicleSelection::All);

    let mut saw_partial = false;
    let mut failure = None;
    while let Some(event) = handle.events.recv().await {
        match event {
            SyncEvent::Partial(_) => saw_partial = true,
            SyncEvent::Failed(e) => {
                failure = Some(e);
                break;
            }
            SyncEvent::Progress { .. } => {}
            other => panic!("unexpected event {:?}", other),
        }
    }

    assert!(!saw_partial);
    assert!(matches!(failure, Some(SyncError::Api(_))));
}

#[tokio::test]
async fn invalid_range_fails_before_any_remote_call() {
    let api = Arc::new(FleetFixture::new());
    let manager = manager_for(Arc::clone(&api)).await;

    let mut handle = manager.start(
        DateRange {
            from: range_start(),
            to: range_start(),
        },
        &VehicleSelection::All,
    );

    match handle.events.recv().await {
        Some(SyncEvent::Failed(SyncError::InvalidRange { .. })) => {}
        other => panic!("expected InvalidRange failure, got {:?}", other),
    }
    assert_eq!(FleetFixture::count(&api.stub_calls), 0);
}

#[tokio::test]
async fn broken_detail_phase_downgrades_to_warning() {
    let api = Arc::new(FleetFixture {
        break_detail: true,
        ..FleetFixture::new()
    });
    let manager = manager_for(Arc::clone(&api)).await;

    let mut handle = manager.start(ten_day_range(), &VehicleSelection::All);

    let mut outcome = None;
    while let Some(event) = handle.events.recv().await {
        match event {
            SyncEvent::Completed(o) => {
                outcome = Some(o);
                break;
            }
            SyncEvent::Partial(_) | SyncEvent::Progress { .. } => {}
            other => panic!("unexpected event {:?}", other),
        }
    }

    let outcome = outcome.expect("run completes despite failed batches");
    assert_eq!(
        outcome.warnings,
        vec![SyncWarning::DetailIncomplete {
            failed_batches: 3,
            total_batches: 3,
        }]
    );
    // The stub-level summary survives; defect detail is simply absent.
    assert_eq!(outcome.summary.len(), 120);
    assert!(outcome.detail.is_empty());
}

#[tokio::test]
async fn unresolvable_drivers_degrade_to_raw_ids_with_warning() {
    let api = Arc::new(FleetFixture {
        break_users: true,
        ..FleetFixture::new()
    });
    let manager = manager_for(Arc::clone(&api)).await;

    let mut handle = manager.start(ten_day_range(), &VehicleSelection::All);

    let mut outcome = None;
    while let Some(event) = handle.events.recv().await {
        match event {
            SyncEvent::Completed(o) => {
                outcome = Some(o);
                break;
            }
            SyncEvent::Partial(_) | SyncEvent::Progress { .. } => {}
            other => panic!("unexpected event {:?}", other),
        }
    }

    // Both resolution passes fail: one early batch (u1/u2), one late
    // batch (u3).
    assert_eq!(FleetFixture::count(&api.user_batches), 2);
    let outcome = outcome.expect("run completes despite unresolved drivers");
    assert_eq!(
        outcome.warnings,
        vec![SyncWarning::DriversUnresolved { failed_batches: 2 }]
    );

    // Names fall back to raw identifiers; the rows themselves survive.
    assert_eq!(outcome.summary.len(), 120);
    let row = &outcome.detail[0];
    assert_eq!(row.driver, "u1");
    assert_eq!(row.repaired_by, "u3");
}

#[tokio::test]
async fn vehicle_filter_restricts_the_projections() {
    let api = Arc::new(FleetFixture::new());
    let manager = manager_for(Arc::clone(&api)).await;

    let mut handle = manager.start(
        ten_day_range(),
        &VehicleSelection::Vehicle("d-other".to_string()),
    );

    let mut outcome = None;
    while let Some(event) = handle.events.recv().await {
        match event {
            SyncEvent::Completed(o) => {
                outcome = Some(o);
                break;
            }
            SyncEvent::Partial(p) => assert!(p.summary.is_empty()),
            SyncEvent::Progress { .. } => {}
            other => panic!("unexpected event {:?}", other),
        }
    }

    let outcome = outcome.expect("final result");
    assert!(outcome.summary.is_empty());
    assert!(outcome.detail.is_empty());
    assert_eq!(outcome.records.len(), 120, "records are kept, rows filtered");
}
