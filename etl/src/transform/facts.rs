use crate::schema::songplays_schema;
use arrow::array::Array;
use arrow::record_batch::RecordBatch;
use common::{Error, Result};
use datafusion::prelude::*;
use std::sync::Arc;
use tracing::info;

/// Absolute tolerance, in seconds, for matching an event's play length
/// against a catalog duration. Exact float equality would silently drop
/// matches that differ only in representation.
pub const DURATION_TOLERANCE_SECS: f64 = 0.001;

fn songplays_sql() -> String {
    // One fact row per filtered event, matched or not. Several catalog
    // entries can fall inside the tolerance for one event, so matches are
    // ranked per event and only the closest duration survives (tie-break:
    // lowest song_id). songplay_id is a dense surrogate key assigned in
    // input order, starting at 1.
    format!(
        r#"
WITH matched AS (
    SELECT e.ingest_id,
           e.ts,
           e."userId",
           e.level,
           c.song_id,
           c.artist_id,
           e."sessionId",
           e.location,
           e."userAgent",
           ROW_NUMBER() OVER (
               PARTITION BY e.ingest_id
               ORDER BY abs(e.length - c.duration) ASC, c.song_id ASC
           ) AS rn
    FROM filtered_events e
    LEFT JOIN song_catalog c
           ON e.song = c.title
          AND e.artist = c.artist_name
          AND e.length IS NOT NULL
          AND abs(e.length - c.duration) <= {tolerance}
)
SELECT CAST(ROW_NUMBER() OVER (ORDER BY ingest_id) AS BIGINT) AS songplay_id,
       to_timestamp_millis(ts) AS start_time,
       "userId"    AS user_id,
       level,
       song_id,
       artist_id,
       "sessionId" AS session_id,
       location,
       "userAgent" AS user_agent
FROM matched
WHERE rn = 1
ORDER BY songplay_id
"#,
        tolerance = DURATION_TOLERANCE_SECS
    )
}

/// Row counts observed while assembling the fact table. Events without a
/// catalog match are expected given sparse catalog coverage and are
/// reported here rather than raised.
#[derive(Debug, Clone, Copy)]
pub struct FactMetrics {
    pub total_rows: usize,
    pub matched: usize,
    pub unmatched: usize,
}

/// Joins filtered events against the catalog match set and produces the
/// `songplays` fact table.
pub struct FactAssembler {
    ctx: Arc<SessionContext>,
}

impl FactAssembler {
    pub fn new(ctx: Arc<SessionContext>) -> Self {
        Self { ctx }
    }

    pub async fn assemble(&self) -> Result<(DataFrame, FactMetrics)> {
        let batches = self.ctx.sql(&songplays_sql()).await?.collect().await?;

        let mut total_rows = 0;
        let mut unmatched = 0;
        for batch in &batches {
            total_rows += batch.num_rows();
            let song_ids = batch.column_by_name("song_id").ok_or_else(|| {
                Error::SchemaValidation("songplays output is missing song_id".to_string())
            })?;
            unmatched += song_ids.null_count();
        }

        let metrics = FactMetrics {
            total_rows,
            matched: total_rows - unmatched,
            unmatched,
        };
        info!(
            rows = metrics.total_rows,
            matched = metrics.matched,
            unmatched = metrics.unmatched,
            "Assembled songplays"
        );

        let df = if batches.is_empty() {
            self.ctx
                .read_batch(RecordBatch::new_empty(Arc::new(songplays_schema())))?
        } else {
            self.ctx.read_batches(batches)?
        };

        Ok((df, metrics))
    }
}
