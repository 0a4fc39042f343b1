pub mod driver;
pub mod inspection;
pub mod rows;

pub use driver::DriverIdentity;
pub use inspection::{
    DefectEntry, DefectRef, DefectRemark, EntityRef, InspectionRecord, PartRef, UserRef,
    UNKNOWN_DRIVER_ID,
};
pub use rows::{inspection_link, DetailRow, KpiCounts, RepairStatus, SummaryRow};
