use arrow::record_batch::RecordBatch;
use common::Result;
use datafusion::prelude::*;
use std::sync::Arc;

pub const CATALOG_TABLE: &str = "catalog_records";
pub const SONG_CATALOG_TABLE: &str = "song_catalog";

// Duplicate catalog keys resolve to the last-seen record in input order
// (highest ingest_id). The pick must be deterministic, so every dedup
// query below ranks explicitly instead of relying on DISTINCT.
const SONGS_SQL: &str = r#"
WITH ranked AS (
    SELECT song_id, title, artist_id, "year", duration,
           ROW_NUMBER() OVER (PARTITION BY song_id ORDER BY ingest_id DESC) AS rn
    FROM catalog_records
)
SELECT song_id, title, artist_id, "year", duration
FROM ranked
WHERE rn = 1
ORDER BY song_id
"#;

const ARTISTS_SQL: &str = r#"
WITH ranked AS (
    SELECT artist_id,
           artist_name      AS name,
           artist_location  AS location,
           artist_latitude  AS latitude,
           artist_longitude AS longitude,
           ROW_NUMBER() OVER (PARTITION BY artist_id ORDER BY ingest_id DESC) AS rn
    FROM catalog_records
)
SELECT artist_id, name, location, latitude, longitude
FROM ranked
WHERE rn = 1
ORDER BY artist_id
"#;

// Match set for fact assembly: exact-duplicate (title, artist_name,
// duration) triples collapse to the last-seen entry. Distinct durations
// inside the match tolerance are resolved per event during fact assembly.
const SONG_CATALOG_SQL: &str = r#"
WITH ranked AS (
    SELECT song_id, title, artist_id, artist_name, duration,
           ROW_NUMBER() OVER (
               PARTITION BY title, artist_name, duration
               ORDER BY ingest_id DESC
           ) AS rn
    FROM catalog_records
)
SELECT song_id, title, artist_id, artist_name, duration
FROM ranked
WHERE rn = 1
"#;

/// Derives the `songs` and `artists` dimensions from catalog records.
pub struct CatalogTransformer {
    ctx: Arc<SessionContext>,
}

impl CatalogTransformer {
    pub fn new(ctx: Arc<SessionContext>) -> Self {
        Self { ctx }
    }

    pub fn register_source(&self, batch: RecordBatch) -> Result<()> {
        self.ctx.register_batch(CATALOG_TABLE, batch)?;
        Ok(())
    }

    /// One row per distinct song_id.
    pub async fn songs(&self) -> Result<DataFrame> {
        Ok(self.ctx.sql(SONGS_SQL).await?)
    }

    /// One row per distinct artist_id.
    pub async fn artists(&self) -> Result<DataFrame> {
        Ok(self.ctx.sql(ARTISTS_SQL).await?)
    }

    /// Registers the fact-assembly match set as a view.
    pub async fn register_song_catalog(&self) -> Result<()> {
        let df = self.ctx.sql(SONG_CATALOG_SQL).await?;
        self.ctx.register_table(SONG_CATALOG_TABLE, df.into_view())?;
        Ok(())
    }
}
