use arrow::array::StringViewArray;
use arrow::datatypes::DataType;
use common::config::{Settings, StorageSettings};
use datafusion::prelude::*;
use etl::pipeline::EtlPipeline;
use std::path::Path;

fn settings(source: &Path, destination: &Path) -> Settings {
    Settings {
        storage: StorageSettings {
            source_root: source.to_str().unwrap().to_string(),
            destination_root: destination.to_str().unwrap().to_string(),
            region: None,
            endpoint: None,
            access_key: None,
            secret_key: None,
        },
        song_data_prefix: "song_data".to_string(),
        log_data_prefix: "log_data".to_string(),
    }
}

fn seed_source(root: &Path) {
    std::fs::create_dir_all(root.join("song_data")).unwrap();
    std::fs::create_dir_all(root.join("log_data")).unwrap();

    std::fs::write(
        root.join("song_data/songs.json"),
        r#"{"song_id":"SOMZWCG12A8C13C480","title":"I Didn't Mean To","artist_id":"ARD7TVE1187B99BFB1","artist_name":"Casual","artist_location":"California - LA","year":0,"duration":218.93179}
{"song_id":"SOUPIRU12A6D4FA1E1","title":"Der Kleine Dompfaff","artist_id":"ARJIE2Y1187B994AB7","artist_name":"Line Renaud","year":0,"duration":152.92036}
"#,
    )
    .unwrap();

    std::fs::write(
        root.join("log_data/2018-11-events.json"),
        r#"{"page":"NextSong","ts":1542241826796,"userId":"39","firstName":"Walter","lastName":"Frye","gender":"M","level":"free","song":"I Didn't Mean To","artist":"Casual","length":218.93179,"sessionId":38,"location":"San Francisco-Oakland-Hayward, CA","userAgent":"Mozilla"}
{"page":"Home","ts":1542241830000,"userId":"39","firstName":"Walter","lastName":"Frye","gender":"M","level":"free","sessionId":38}
{"page":"NextSong","ts":1542242000000,"userId":"39","firstName":"Walter","lastName":"Frye","gender":"M","level":"paid","song":"Unknown Song","artist":"Nobody","length":100.0,"sessionId":39}
{"page":"NextSong","ts":1542242100000,"userId":"8","firstName":"Kaylee","lastName":"Summers","gender":"F","level":"free","song":"Der Kleine Dompfaff","artist":"Line Renaud","length":152.92036,"sessionId":40}
"#,
    )
    .unwrap();
}

async fn table_count(destination: &Path, table: &str) -> usize {
    let ctx = SessionContext::new();
    ctx.read_parquet(
        format!("{}/{}/", destination.display(), table),
        ParquetReadOptions::default(),
    )
    .await
    .unwrap()
    .count()
    .await
    .unwrap()
}

// Hive-partitioned tables keep their partition columns in the directory
// names, so reading them back needs the columns declared.
async fn read_partitioned(
    destination: &Path,
    table: &str,
    partition_cols: Vec<(String, DataType)>,
) -> DataFrame {
    let ctx = SessionContext::new();
    ctx.read_parquet(
        format!("{}/{}/", destination.display(), table),
        ParquetReadOptions::default().table_partition_cols(partition_cols),
    )
    .await
    .unwrap()
}

#[tokio::test]
async fn full_run_produces_star_schema() {
    let source = tempfile::tempdir().unwrap();
    let destination = tempfile::tempdir().unwrap();
    seed_source(source.path());

    let pipeline = EtlPipeline::new(settings(source.path(), destination.path())).unwrap();
    let summary = pipeline.run().await.unwrap();

    assert_eq!(summary.songs, 2);
    assert_eq!(summary.artists, 2);
    assert_eq!(summary.users, 2);
    // three distinct NextSong timestamps
    assert_eq!(summary.time, 3);
    // one fact row per NextSong event, matched or not
    assert_eq!(summary.songplays, 3);
    assert_eq!(summary.unmatched_songplays, 1);

    // hive partition layout: songs by year/artist_id, time by year/month
    assert!(destination
        .path()
        .join("songs/year=0/artist_id=ARD7TVE1187B99BFB1")
        .is_dir());
    assert!(destination.path().join("time/year=2018/month=11").is_dir());

    // round-trip: written tables read back with the same row counts
    assert_eq!(table_count(destination.path(), "songplays").await, 3);
    assert_eq!(table_count(destination.path(), "users").await, 2);
    assert_eq!(table_count(destination.path(), "artists").await, 2);

    // partitioned tables round-trip including their partition columns
    let songs = read_partitioned(
        destination.path(),
        "songs",
        vec![
            ("year".to_string(), DataType::Int32),
            ("artist_id".to_string(), DataType::Utf8),
        ],
    )
    .await;
    assert_eq!(songs.clone().count().await.unwrap(), 2);
    assert_eq!(
        songs
            .filter(col("artist_id").eq(lit("ARD7TVE1187B99BFB1")))
            .unwrap()
            .count()
            .await
            .unwrap(),
        1
    );

    let time = read_partitioned(
        destination.path(),
        "time",
        vec![
            ("year".to_string(), DataType::Int32),
            ("month".to_string(), DataType::Int32),
        ],
    )
    .await;
    assert_eq!(time.clone().count().await.unwrap(), 3);
    // all three timestamps fall in November 2018
    assert_eq!(
        time.filter(col("year").eq(lit(2018)).and(col("month").eq(lit(11))))
            .unwrap()
            .count()
            .await
            .unwrap(),
        3
    );
}

#[tokio::test]
async fn rerun_overwrites_instead_of_appending() {
    let source = tempfile::tempdir().unwrap();
    let destination = tempfile::tempdir().unwrap();
    seed_source(source.path());

    let config = settings(source.path(), destination.path());
    let first = EtlPipeline::new(config.clone()).unwrap().run().await.unwrap();
    let second = EtlPipeline::new(config).unwrap().run().await.unwrap();

    assert_eq!(first.songplays, second.songplays);
    assert_eq!(first.users, second.users);
    assert_eq!(first.time, second.time);

    // the second run replaced the first run's files, so nothing doubled
    assert_eq!(table_count(destination.path(), "songplays").await, 3);
    assert_eq!(table_count(destination.path(), "users").await, 2);
}

#[tokio::test]
async fn users_table_carries_latest_subscription_level() {
    let source = tempfile::tempdir().unwrap();
    let destination = tempfile::tempdir().unwrap();
    seed_source(source.path());

    EtlPipeline::new(settings(source.path(), destination.path()))
        .unwrap()
        .run()
        .await
        .unwrap();

    let ctx = SessionContext::new();
    let batches = ctx
        .read_parquet(
            format!("{}/users/", destination.path().display()),
            ParquetReadOptions::default(),
        )
        .await
        .unwrap()
        .collect()
        .await
        .unwrap();

    let mut level_for_39 = None;
    for batch in &batches {
        let user_ids = batch
            .column_by_name("user_id")
            .unwrap()
            .as_any()
            .downcast_ref::<StringViewArray>()
            .unwrap();
        let levels = batch
            .column_by_name("level")
            .unwrap()
            .as_any()
            .downcast_ref::<StringViewArray>()
            .unwrap();
        for i in 0..batch.num_rows() {
            if user_ids.value(i) == "39" {
                level_for_39 = Some(levels.value(i).to_string());
            }
        }
    }

    // user 39 appeared as free then paid; the later event wins
    assert_eq!(level_for_39.as_deref(), Some("paid"));
}
