use chrono::{DateTime, Utc};
use serde::Deserialize;

/// Sentinel driver id the platform uses when no driver was identified.
pub const UNKNOWN_DRIVER_ID: &str = "UnknownDriverId";

/// Reference to another entity, usually just an id with an optional
/// display name.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct EntityRef {
    pub id: Option<String>,
    pub name: Option<String>,
}

/// One DVIR log entity as returned by the API.
///
/// List queries return stubs of this shape with the defect collection
/// absent; only a by-id fetch populates defects.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct InspectionRecord {
    pub id: String,
    pub device: Option<EntityRef>,
    pub driver: Option<EntityRef>,
    #[serde(rename = "dateTime")]
    pub date_time: Option<DateTime<Utc>>,
    #[serde(rename = "logDate")]
    pub log_date: Option<DateTime<Utc>>,
    #[serde(rename = "logType", alias = "type")]
    pub log_type: Option<String>,
    #[serde(rename = "isSafeToOperate")]
    pub is_safe_to_operate: Option<bool>,

    // API casing quirk: the defect collection may arrive under any of
    // three spellings. Normalized here, first present wins; nothing
    // downstream re-checks casing.
    #[serde(rename = "dVIRDefects")]
    defects_dvir: Option<Vec<DefectEntry>>,
    #[serde(rename = "dvirDefects")]
    defects_camel: Option<Vec<DefectEntry>>,
    #[serde(rename = "DVIRDefects")]
    defects_pascal: Option<Vec<DefectEntry>>,
}

impl InspectionRecord {
    /// The normalized defect collection; empty when absent.
    pub fn defects(&self) -> &[DefectEntry] {
        self.defects_dvir
            .as_deref()
            .or(self.defects_camel.as_deref())
            .or(self.defects_pascal.as_deref())
            .unwrap_or(&[])
    }

    /// Replace the defect collection (test construction helper).
    #[cfg(test)]
    pub fn with_defects(mut self, defects: Vec<DefectEntry>) -> Self {
        self.defects_dvir = Some(defects);
        self
    }

    pub fn device_id(&self) -> Option<&str> {
        self.device.as_ref().and_then(|d| d.id.as_deref())
    }

    pub fn driver_id(&self) -> Option<&str> {
        self.driver.as_ref().and_then(|d| d.id.as_deref())
    }

    /// Record timestamp, preferring `dateTime` over `logDate`.
    pub fn timestamp(&self) -> Option<DateTime<Utc>> {
        self.date_time.or(self.log_date)
    }
}

/// One reported fault on an inspection.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct DefectEntry {
    #[serde(rename = "repairStatus")]
    pub repair_status: Option<String>,
    pub defect: Option<DefectRef>,
    pub part: Option<PartRef>,
    #[serde(rename = "repairUser")]
    pub repair_user: Option<UserRef>,
    #[serde(rename = "repairDateTime")]
    pub repair_date_time: Option<DateTime<Utc>>,
    #[serde(rename = "defectRemarks")]
    pub defect_remarks: Option<Vec<DefectRemark>>,
}

/// Nested defect description.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct DefectRef {
    pub name: Option<String>,
    pub description: Option<String>,
    pub severity: Option<String>,
}

impl DefectRef {
    pub fn display_name(&self) -> Option<&str> {
        self.name.as_deref().or(self.description.as_deref())
    }
}

/// Part reference; the API returns either a nested object or a bare
/// string.
#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
pub enum PartRef {
    Ref(EntityRef),
    Name(String),
}

impl PartRef {
    pub fn display_name(&self) -> Option<&str> {
        match self {
            PartRef::Ref(r) => r.name.as_deref(),
            PartRef::Name(s) => Some(s.as_str()),
        }
    }
}

/// Repair performer; either an identifier string or a user reference.
#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
pub enum UserRef {
    Ref(EntityRef),
    Id(String),
}

impl UserRef {
    pub fn id(&self) -> Option<&str> {
        match self {
            UserRef::Ref(r) => r.id.as_deref(),
            UserRef::Id(s) => Some(s.as_str()),
        }
    }
}

/// A single remark on a defect; the text lives under one of several
/// field names depending on API version.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct DefectRemark {
    pub remark: Option<String>,
    pub comment: Option<String>,
    pub text: Option<String>,
}

impl DefectRemark {
    pub fn body(&self) -> Option<&str> {
        self.remark
            .as_deref()
            .or(self.comment.as_deref())
            .or(self.text.as_deref())
            .filter(|s| !s.is_empty())
    }
}
