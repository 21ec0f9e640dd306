use crate::schema::time_schema;
use arrow::array::{Array, Int32Array, Int64Array, TimestampMillisecondArray};
use arrow::record_batch::RecordBatch;
use chrono::{DateTime, Datelike, Timelike};
use common::{Error, Result};
use datafusion::prelude::*;
use std::collections::BTreeSet;
use std::sync::Arc;

pub const EVENTS_TABLE: &str = "log_events";
pub const FILTERED_EVENTS_TABLE: &str = "filtered_events";

// Only song-play actions feed the dimensions and the fact table.
const FILTERED_SQL: &str = r#"SELECT * FROM log_events WHERE page = 'NextSong'"#;

// A user's row reflects their chronologically last filtered event, so the
// level column carries the current subscription tier rather than an
// arbitrary one. Ties on ts resolve to the later record in input order.
const USERS_SQL: &str = r#"
WITH ranked AS (
    SELECT "userId"    AS user_id,
           "firstName" AS first_name,
           "lastName"  AS last_name,
           gender,
           level,
           ROW_NUMBER() OVER (
               PARTITION BY "userId"
               ORDER BY ts DESC, ingest_id DESC
           ) AS rn
    FROM filtered_events
    WHERE "userId" IS NOT NULL AND "userId" <> ''
)
SELECT user_id, first_name, last_name, gender, level
FROM ranked
WHERE rn = 1
ORDER BY user_id
"#;

const DISTINCT_TS_SQL: &str = r#"SELECT DISTINCT ts FROM filtered_events"#;

/// Calendar components of one epoch-millisecond timestamp, on the UTC
/// calendar. `week` is the ISO week number; `weekday` runs 1..=7 with
/// Sunday = 1.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TimeParts {
    pub hour: i32,
    pub day: i32,
    pub week: i32,
    pub month: i32,
    pub year: i32,
    pub weekday: i32,
}

pub fn time_components(ts_millis: i64) -> Result<TimeParts> {
    let dt = DateTime::from_timestamp_millis(ts_millis).ok_or_else(|| Error::SchemaMismatch {
        stream: "events".to_string(),
        message: format!("timestamp {} out of range", ts_millis),
    })?;

    Ok(TimeParts {
        hour: dt.hour() as i32,
        day: dt.day() as i32,
        week: dt.iso_week().week() as i32,
        month: dt.month() as i32,
        year: dt.year(),
        weekday: dt.weekday().num_days_from_sunday() as i32 + 1,
    })
}

/// Filters event records and derives the `users` and `time` dimensions.
pub struct EventTransformer {
    ctx: Arc<SessionContext>,
}

impl EventTransformer {
    pub fn new(ctx: Arc<SessionContext>) -> Self {
        Self { ctx }
    }

    pub fn register_source(&self, batch: RecordBatch) -> Result<()> {
        self.ctx.register_batch(EVENTS_TABLE, batch)?;
        Ok(())
    }

    /// Registers the NextSong subset as a view. All downstream dimension
    /// and fact derivation reads from this view only.
    pub async fn register_filtered(&self) -> Result<()> {
        let df = self.ctx.sql(FILTERED_SQL).await?;
        self.ctx.register_table(FILTERED_EVENTS_TABLE, df.into_view())?;
        Ok(())
    }

    /// One row per distinct non-empty userId.
    pub async fn users(&self) -> Result<DataFrame> {
        Ok(self.ctx.sql(USERS_SQL).await?)
    }

    /// One row per distinct timestamp in the filtered subset, in ascending
    /// start_time order.
    pub async fn time_dimension(&self) -> Result<DataFrame> {
        let batches = self.ctx.sql(DISTINCT_TS_SQL).await?.collect().await?;

        let mut stamps = BTreeSet::new();
        for batch in &batches {
            let column = batch
                .column(0)
                .as_any()
                .downcast_ref::<Int64Array>()
                .ok_or_else(|| {
                    Error::SchemaValidation("ts column is not Int64".to_string())
                })?;
            for i in 0..column.len() {
                if !column.is_null(i) {
                    stamps.insert(column.value(i));
                }
            }
        }

        let batch = build_time_batch(&stamps)?;
        Ok(self.ctx.read_batch(batch)?)
    }
}

fn build_time_batch(stamps: &BTreeSet<i64>) -> Result<RecordBatch> {
    let mut start_times = Vec::with_capacity(stamps.len());
    let mut hours = Vec::with_capacity(stamps.len());
    let mut days = Vec::with_capacity(stamps.len());
    let mut weeks = Vec::with_capacity(stamps.len());
    let mut months = Vec::with_capacity(stamps.len());
    let mut years = Vec::with_capacity(stamps.len());
    let mut weekdays = Vec::with_capacity(stamps.len());

    for &ts in stamps {
        let parts = time_components(ts)?;
        start_times.push(ts);
        hours.push(parts.hour);
        days.push(parts.day);
        weeks.push(parts.week);
        months.push(parts.month);
        years.push(parts.year);
        weekdays.push(parts.weekday);
    }

    Ok(RecordBatch::try_new(
        Arc::new(time_schema()),
        vec![
            Arc::new(TimestampMillisecondArray::from(start_times)),
            Arc::new(Int32Array::from(hours)),
            Arc::new(Int32Array::from(days)),
            Arc::new(Int32Array::from(weeks)),
            Arc::new(Int32Array::from(months)),
            Arc::new(Int32Array::from(years)),
            Arc::new(Int32Array::from(weekdays)),
        ],
    )?)
}
