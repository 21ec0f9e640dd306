pub mod pipeline;
pub mod reader;
pub mod schema;
pub mod storage;
pub mod transform;
pub mod writer;

use common::config::Settings;
use common::Result;
use pipeline::EtlPipeline;
use tracing::info;

/// Runs the complete extract-transform-load pipeline described by the
/// configuration file at `config_path`.
pub async fn run_etl_pipeline(config_path: &str) -> Result<()> {
    let settings = Settings::new(config_path)?;
    let pipeline = EtlPipeline::new(settings)?;
    let summary = pipeline.run().await?;

    info!(
        songs = summary.songs,
        artists = summary.artists,
        users = summary.users,
        time = summary.time,
        songplays = summary.songplays,
        unmatched = summary.unmatched_songplays,
        "Pipeline finished"
    );

    Ok(())
}
