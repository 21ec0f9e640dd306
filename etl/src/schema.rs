use arrow::datatypes::{DataType, Field, Schema, TimeUnit};
use lazy_static::lazy_static;

/// The two input record streams the pipeline reads.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StreamKind {
    /// Song/artist metadata records.
    Catalog,
    /// User activity log records.
    Events,
}

impl StreamKind {
    pub fn name(&self) -> &'static str {
        match self {
            StreamKind::Catalog => "catalog",
            StreamKind::Events => "events",
        }
    }
}

// Declared input schemas. Records are validated against these at decode
// time instead of inferring a schema from the data; fields absent from a
// record become null, a null in a non-nullable field fails the stream.
pub fn catalog_stream_schema() -> Schema {
    Schema::new(vec![
        Field::new("song_id", DataType::Utf8, false),
        Field::new("title", DataType::Utf8, true),
        Field::new("artist_id", DataType::Utf8, false),
        Field::new("artist_name", DataType::Utf8, true),
        Field::new("artist_location", DataType::Utf8, true),
        Field::new("artist_latitude", DataType::Float64, true),
        Field::new("artist_longitude", DataType::Float64, true),
        // 0 means the release year is unknown
        Field::new("year", DataType::Int32, true),
        Field::new("duration", DataType::Float64, true),
    ])
}

pub fn event_stream_schema() -> Schema {
    Schema::new(vec![
        Field::new("artist", DataType::Utf8, true),
        Field::new("firstName", DataType::Utf8, true),
        Field::new("gender", DataType::Utf8, true),
        Field::new("lastName", DataType::Utf8, true),
        Field::new("length", DataType::Float64, true),
        Field::new("level", DataType::Utf8, true),
        Field::new("location", DataType::Utf8, true),
        Field::new("page", DataType::Utf8, false),
        Field::new("registration", DataType::Float64, true),
        Field::new("sessionId", DataType::Int64, true),
        Field::new("song", DataType::Utf8, true),
        Field::new("ts", DataType::Int64, false),
        Field::new("userAgent", DataType::Utf8, true),
        Field::new("userId", DataType::Utf8, true),
    ])
}

// Output table schemas.
pub fn songs_schema() -> Schema {
    Schema::new(vec![
        Field::new("song_id", DataType::Utf8, false),
        Field::new("title", DataType::Utf8, true),
        Field::new("artist_id", DataType::Utf8, false),
        Field::new("year", DataType::Int32, true),
        Field::new("duration", DataType::Float64, true),
    ])
}

pub fn artists_schema() -> Schema {
    Schema::new(vec![
        Field::new("artist_id", DataType::Utf8, false),
        Field::new("name", DataType::Utf8, true),
        Field::new("location", DataType::Utf8, true),
        Field::new("latitude", DataType::Float64, true),
        Field::new("longitude", DataType::Float64, true),
    ])
}

pub fn users_schema() -> Schema {
    Schema::new(vec![
        Field::new("user_id", DataType::Utf8, false),
        Field::new("first_name", DataType::Utf8, true),
        Field::new("last_name", DataType::Utf8, true),
        Field::new("gender", DataType::Utf8, true),
        Field::new("level", DataType::Utf8, true),
    ])
}

pub fn time_schema() -> Schema {
    Schema::new(vec![
        Field::new(
            "start_time",
            DataType::Timestamp(TimeUnit::Millisecond, None),
            false,
        ),
        Field::new("hour", DataType::Int32, false),
        Field::new("day", DataType::Int32, false),
        Field::new("week", DataType::Int32, false),
        Field::new("month", DataType::Int32, false),
        Field::new("year", DataType::Int32, false),
        Field::new("weekday", DataType::Int32, false),
    ])
}

pub fn songplays_schema() -> Schema {
    Schema::new(vec![
        Field::new("songplay_id", DataType::Int64, false),
        Field::new(
            "start_time",
            DataType::Timestamp(TimeUnit::Millisecond, None),
            false,
        ),
        Field::new("user_id", DataType::Utf8, true),
        Field::new("level", DataType::Utf8, true),
        // Foreign keys stay null when the event has no catalog match
        Field::new("song_id", DataType::Utf8, true),
        Field::new("artist_id", DataType::Utf8, true),
        Field::new("session_id", DataType::Int64, true),
        Field::new("location", DataType::Utf8, true),
        Field::new("user_agent", DataType::Utf8, true),
    ])
}

pub fn input_schema(kind: StreamKind) -> &'static Schema {
    match kind {
        StreamKind::Catalog => &CATALOG_STREAM_SCHEMA,
        StreamKind::Events => &EVENT_STREAM_SCHEMA,
    }
}

pub fn output_schema(table: &str) -> Option<&'static Schema> {
    match table {
        "songs" => Some(&SONGS_SCHEMA),
        "artists" => Some(&ARTISTS_SCHEMA),
        "users" => Some(&USERS_SCHEMA),
        "time" => Some(&TIME_SCHEMA),
        "songplays" => Some(&SONGPLAYS_SCHEMA),
        _ => None,
    }
}

// Lazy-loaded static schemas
lazy_static! {
    static ref CATALOG_STREAM_SCHEMA: Schema = catalog_stream_schema();
    static ref EVENT_STREAM_SCHEMA: Schema = event_stream_schema();
    static ref SONGS_SCHEMA: Schema = songs_schema();
    static ref ARTISTS_SCHEMA: Schema = artists_schema();
    static ref USERS_SCHEMA: Schema = users_schema();
    static ref TIME_SCHEMA: Schema = time_schema();
    static ref SONGPLAYS_SCHEMA: Schema = songplays_schema();
}
