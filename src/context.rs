use std::collections::{HashMap, HashSet};
use std::sync::Mutex;

use chrono::{DateTime, Utc};
use serde::de::DeserializeOwned;
use serde::Deserialize;
use serde_json::Value;

use crate::api::{FleetApi, RpcCall};
use crate::error::ApiResult;
use crate::models::{DriverIdentity, EntityRef, InspectionRecord};

const RESULTS_LIMIT: u32 = 5000;

/// A `Device` entity: one vehicle in the fleet.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct Vehicle {
    pub id: String,
    pub name: Option<String>,
    #[serde(rename = "activeTo")]
    pub active_to: Option<DateTime<Utc>>,
    pub groups: Vec<EntityRef>,
}

impl Vehicle {
    fn is_active(&self, now: DateTime<Utc>) -> bool {
        match self.active_to {
            Some(until) => until > now,
            None => true,
        }
    }
}

/// A `Group` entity.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct Group {
    pub id: String,
    pub name: Option<String>,
}

/// Deserialize a list of API values, skipping entries that do not match
/// the expected shape. Malformed entities are logged and dropped, never
/// a hard failure.
pub fn parse_entities<T: DeserializeOwned>(items: Vec<Value>, what: &str) -> Vec<T> {
    let total = items.len();
    let parsed: Vec<T> = items
        .into_iter()
        .filter_map(|v| match serde_json::from_value(v) {
            Ok(entity) => Some(entity),
            Err(e) => {
                tracing::warn!("Skipping malformed {} entity: {}", what, e);
                None
            }
        })
        .collect();
    if parsed.len() < total {
        tracing::warn!(
            "Dropped {} of {} {} entities during parse",
            total - parsed.len(),
            total,
            what
        );
    }
    parsed
}

/// Process-scoped session state: the vehicle and group maps loaded at
/// session start, and the driver-identity cache.
///
/// The driver cache is additive only; entries are written by the
/// resolver during a run and read by the aggregator, and are never
/// invalidated within a session. Locks are never held across an await.
pub struct SessionContext {
    devices: Mutex<HashMap<String, Vehicle>>,
    groups: HashMap<String, Group>,
    drivers: Mutex<HashMap<String, DriverIdentity>>,
}

impl SessionContext {
    /// Load the foundation data (devices + groups) in one batched call.
    pub async fn bootstrap(api: &dyn FleetApi) -> ApiResult<Self> {
        let results = api
            .multi_call(&[
                RpcCall::get_all("Device", RESULTS_LIMIT),
                RpcCall::get_all("Group", RESULTS_LIMIT),
            ])
            .await?;

        let now = Utc::now();
        let mut iter = results.into_iter();
        let devices = list_items(iter.next());
        let groups = list_items(iter.next());

        let devices: HashMap<String, Vehicle> = parse_entities::<Vehicle>(devices, "Device")
            .into_iter()
            .filter(|d| d.is_active(now))
            .map(|d| (d.id.clone(), d))
            .collect();
        let groups: HashMap<String, Group> = parse_entities::<Group>(groups, "Group")
            .into_iter()
            .map(|g| (g.id.clone(), g))
            .collect();

        tracing::info!(
            devices = devices.len(),
            groups = groups.len(),
            "Session context loaded"
        );

        Ok(Self {
            devices: Mutex::new(devices),
            groups,
            drivers: Mutex::new(HashMap::new()),
        })
    }

    /// Re-fetch the device list, replacing the vehicle map. Driver and
    /// group state is left untouched.
    pub async fn refresh_devices(&self, api: &dyn FleetApi) -> ApiResult<()> {
        let result = api.call(&RpcCall::get_all("Device", RESULTS_LIMIT)).await?;
        let now = Utc::now();
        let devices: HashMap<String, Vehicle> =
            parse_entities::<Vehicle>(result.as_array().cloned().unwrap_or_default(), "Device")
                .into_iter()
                .filter(|d| d.is_active(now))
                .map(|d| (d.id.clone(), d))
                .collect();
        *self.devices.lock().expect("device map lock") = devices;
        Ok(())
    }

    #[cfg(test)]
    pub fn for_tests(devices: Vec<Vehicle>, groups: Vec<Group>) -> Self {
        Self {
            devices: Mutex::new(devices.into_iter().map(|d| (d.id.clone(), d)).collect()),
            groups: groups.into_iter().map(|g| (g.id.clone(), g)).collect(),
            drivers: Mutex::new(HashMap::new()),
        }
    }

    // ── Driver cache ────────────────────────────────────────────────

    pub fn has_driver(&self, id: &str) -> bool {
        self.drivers.lock().expect("driver cache lock").contains_key(id)
    }

    /// Insert a resolved identity. Existing entries are kept as-is, so
    /// repeated resolution of the same id is idempotent.
    pub fn insert_driver(&self, driver: DriverIdentity) {
        self.drivers
            .lock()
            .expect("driver cache lock")
            .entry(driver.id.clone())
            .or_insert(driver);
    }

    pub fn driver_display_name(&self, id: &str) -> Option<String> {
        self.drivers
            .lock()
            .expect("driver cache lock")
            .get(id)
            .map(|d| d.display_name())
    }

    pub fn cached_driver_count(&self) -> usize {
        self.drivers.lock().expect("driver cache lock").len()
    }

    // ── Lookups ─────────────────────────────────────────────────────

    /// Vehicle display name for a record: session map first, then the
    /// inline reference, then the raw id.
    pub fn vehicle_name(&self, record: &InspectionRecord) -> Option<String> {
        let device = record.device.as_ref()?;
        if let Some(id) = device.id.as_deref() {
            let devices = self.devices.lock().expect("device map lock");
            if let Some(known) = devices.get(id) {
                return Some(known.name.clone().unwrap_or_else(|| id.to_string()));
            }
        }
        device.name.clone().or_else(|| device.id.clone())
    }

    /// `(id, name)` pairs for every active vehicle, sorted by name.
    pub fn vehicle_options(&self) -> Vec<(String, String)> {
        let devices = self.devices.lock().expect("device map lock");
        let mut options: Vec<(String, String)> = devices
            .values()
            .map(|d| (d.id.clone(), d.name.clone().unwrap_or_else(|| d.id.clone())))
            .collect();
        options.sort_by(|a, b| a.1.cmp(&b.1));
        options
    }

    /// `(id, name)` pairs for selectable groups, sorted by name. The
    /// built-in company/nothing groups are not selectable.
    pub fn group_options(&self) -> Vec<(String, String)> {
        let mut options: Vec<(String, String)> = self
            .groups
            .values()
            .filter(|g| !matches!(g.id.as_str(), "GroupCompanyId" | "GroupNothingId"))
            .filter_map(|g| match g.name.as_deref() {
                None | Some("") | Some("CompanyGroup") | Some("**Nothing**") => None,
                Some(name) => Some((g.id.clone(), name.to_string())),
            })
            .collect();
        options.sort_by(|a, b| a.1.cmp(&b.1));
        options
    }

    /// Expand a selection into a concrete filter over device ids.
    pub fn filter_for(&self, selection: &VehicleSelection) -> VehicleFilter {
        match selection {
            VehicleSelection::All => VehicleFilter::All,
            VehicleSelection::Vehicle(id) => {
                VehicleFilter::Ids(HashSet::from([id.clone()]))
            }
            VehicleSelection::Group(group_id) => {
                let devices = self.devices.lock().expect("device map lock");
                let ids: HashSet<String> = devices
                    .values()
                    .filter(|d| d.groups.iter().any(|g| g.id.as_deref() == Some(group_id)))
                    .map(|d| d.id.clone())
                    .collect();
                VehicleFilter::Ids(ids)
            }
        }
    }
}

/// What the consumer picked in the vehicle/group selectors.
#[derive(Debug, Clone, Default)]
pub enum VehicleSelection {
    #[default]
    All,
    Vehicle(String),
    Group(String),
}

/// Pure predicate over a record's vehicle identifier.
#[derive(Debug, Clone)]
pub enum VehicleFilter {
    All,
    Ids(HashSet<String>),
}

impl VehicleFilter {
    /// Records without a device reference always pass; a filter only
    /// excludes records whose device id is known and outside the set.
    pub fn matches(&self, device_id: Option<&str>) -> bool {
        match (self, device_id) {
            (VehicleFilter::All, _) => true,
            (_, None) => true,
            (VehicleFilter::Ids(ids), Some(id)) => ids.contains(id),
        }
    }
}

fn list_items(value: Option<Value>) -> Vec<Value> {
    value
        .and_then(|v| v.as_array().cloned())
        .unwrap_or_default()
}
