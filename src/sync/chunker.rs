use chrono::{DateTime, Days, Duration, Utc};

use crate::error::SyncError;

/// A `[from, to)` slice of the requested window. Chunks are contiguous,
/// ordered, and cover the range exactly.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DateChunk {
    pub from: DateTime<Utc>,
    pub to: DateTime<Utc>,
}

/// The requested synchronization window.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DateRange {
    pub from: DateTime<Utc>,
    pub to: DateTime<Utc>,
}

/// Preset windows offered by the dashboard.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RangePreset {
    Yesterday,
    Last7Days,
    Last30Days,
    LastYear,
}

impl DateRange {
    /// Resolve a preset relative to `now`, using whole-day boundaries.
    pub fn preset(preset: RangePreset, now: DateTime<Utc>) -> Self {
        let today = now.date_naive();
        let end_of = |d: chrono::NaiveDate| {
            d.and_hms_opt(23, 59, 59)
                .expect("valid wall-clock time")
                .and_utc()
        };
        let start_of = |d: chrono::NaiveDate| {
            d.and_hms_opt(0, 0, 0)
                .expect("valid wall-clock time")
                .and_utc()
        };

        match preset {
            RangePreset::Yesterday => {
                let yesterday = today - Days::new(1);
                Self {
                    from: start_of(yesterday),
                    to: end_of(yesterday),
                }
            }
            RangePreset::Last7Days => Self {
                from: start_of(today - Days::new(7)),
                to: end_of(today),
            },
            RangePreset::Last30Days => Self {
                from: start_of(today - Days::new(30)),
                to: end_of(today),
            },
            RangePreset::LastYear => Self {
                from: start_of(today - Days::new(365)),
                to: end_of(today),
            },
        }
    }
}

/// Split `[from, to)` into chunks of at most `width`; the final chunk is
/// clipped to `to`. Rejects empty and inverted ranges.
pub fn chunk_range(
    from: DateTime<Utc>,
    to: DateTime<Utc>,
    width: Duration,
) -> Result<Vec<DateChunk>, SyncError> {
    if to <= from || width <= Duration::zero() {
        return Err(SyncError::InvalidRange {
            from: from.to_rfc3339(),
            to: to.to_rfc3339(),
        });
    }

    let mut chunks = Vec::new();
    let mut cursor = from;
    while cursor < to {
        let end = (cursor + width).min(to);
        chunks.push(DateChunk {
            from: cursor,
            to: end,
        });
        cursor = end;
    }
    Ok(chunks)
}
