use crate::schema::output_schema;
use crate::storage::StorageLocation;
use common::{Error, Result};
use datafusion::dataframe::DataFrameWriteOptions;
use datafusion::logical_expr::Partitioning;
use datafusion::prelude::*;
use tracing::{debug, info};

/// Persists output tables as parquet under the destination root, one
/// directory per table, overwriting whatever a previous run left there.
pub struct TableWriter<'a> {
    destination: &'a StorageLocation,
}

impl<'a> TableWriter<'a> {
    pub fn new(destination: &'a StorageLocation) -> Self {
        Self { destination }
    }

    /// Writes `df` to `<destination>/<table>/`, hive-partitioned by
    /// `partition_by` when non-empty. The table prefix is cleared first,
    /// so re-running the pipeline replaces prior output instead of
    /// appending to it. Returns the number of rows written.
    pub async fn write(
        &self,
        df: DataFrame,
        table: &str,
        partition_by: &[&str],
    ) -> Result<usize> {
        self.validate_columns(&df, table)?;
        let rows = df.clone().count().await?;

        let removed = self
            .destination
            .delete_prefix(table)
            .await
            .map_err(|e| write_failure(table, format!("failed to clear previous output: {}", e)))?;
        if removed > 0 {
            debug!(table, removed, "Cleared previous table output");
        }

        let df = df.repartition(Partitioning::RoundRobinBatch(1))?;

        let mut options = DataFrameWriteOptions::new();
        if !partition_by.is_empty() {
            options =
                options.with_partition_by(partition_by.iter().map(|c| c.to_string()).collect());
        }

        let target_uri = self.destination.table_uri(table);
        info!(table, rows, target = %target_uri, "Writing parquet table");
        df.write_parquet(&target_uri, options, None)
            .await
            .map_err(|e| write_failure(table, e.to_string()))?;

        Ok(rows)
    }

    fn validate_columns(&self, df: &DataFrame, table: &str) -> Result<()> {
        let expected = output_schema(table).ok_or_else(|| {
            Error::InvalidInput(format!("'{}' is not a known output table", table))
        })?;

        let expected_names: Vec<&str> =
            expected.fields().iter().map(|f| f.name().as_str()).collect();
        let actual_names: Vec<&str> =
            df.schema().fields().iter().map(|f| f.name().as_str()).collect();

        if expected_names != actual_names {
            return Err(Error::SchemaValidation(format!(
                "table '{}' columns {:?} do not match expected {:?}",
                table, actual_names, expected_names
            )));
        }

        Ok(())
    }
}

fn write_failure(table: &str, message: String) -> Error {
    Error::WriteFailure {
        table: table.to_string(),
        message,
    }
}
