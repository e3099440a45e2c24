use polars::prelude::*;
use std::io::Cursor;
use std::time::Duration;
use tokio::time::timeout;
use tracing::{error, info};
use wreq::Client;
use wreq_util::Emulation;

use crate::config::{SourceKind, SourceSpec, SourcesConfig};
use crate::error::ReconcileError;
use crate::models::columns::{combo_ref, item_ref, sales};
use crate::pipeline::RawSources;

/// Loads raw tables with every cell kept as text; typing happens in the cleaner.
pub struct SourceFetcher {
    client: Client,
    timeout: Duration,
}

impl SourceFetcher {
    pub fn new(timeout: Duration) -> anyhow::Result<Self> {
        let client = Client::builder()
            .emulation(Emulation::Firefox136)
            .build()?;

        Ok(SourceFetcher { client, timeout })
    }

    pub async fn fetch_all(&self, sources: &SourcesConfig) -> Result<RawSources, ReconcileError> {
        let transactions = self.fetch(sales::TABLE, &sources.transactions).await?;
        let item_reference = self.fetch(item_ref::TABLE, &sources.item_reference).await?;
        let combo_reference = self.fetch(combo_ref::TABLE, &sources.combo_reference).await?;

        Ok(RawSources {
            transactions,
            item_reference,
            combo_reference,
        })
    }

    /// One bounded attempt; there is no retry.
    pub async fn fetch(&self, table: &str, spec: &SourceSpec) -> Result<DataFrame, ReconcileError> {
        info!("Loading {} from {}", table, spec.identity());

        let result = match timeout(self.timeout, self.fetch_unbounded(table, spec)).await {
            Ok(result) => result,
            Err(_) => Err(ReconcileError::SourceTimeout {
                table: table.to_string(),
                seconds: self.timeout.as_secs(),
            }),
        };

        match &result {
            Ok(df) => info!(
                "Loaded {}: {} rows, {} columns",
                table,
                df.height(),
                df.width()
            ),
            Err(e) => error!("Failed to load {}: {}", table, e),
        }

        result
    }

    async fn fetch_unbounded(
        &self,
        table: &str,
        spec: &SourceSpec,
    ) -> Result<DataFrame, ReconcileError> {
        let bytes = match spec.kind {
            SourceKind::Csv | SourceKind::Json => {
                tokio::fs::read(&spec.location).await.map_err(|e| {
                    ReconcileError::unavailable(table, format!("{}: {}", spec.location, e))
                })?
            }
            SourceKind::HttpCsv => self.fetch_http(table, &spec.location).await?,
        };

        let parsed = match spec.kind {
            SourceKind::Json => frame_from_json(bytes),
            SourceKind::Csv | SourceKind::HttpCsv => frame_from_csv(bytes),
        };

        parsed.map_err(|e| ReconcileError::unavailable(table, e))
    }

    async fn fetch_http(&self, table: &str, url: &str) -> Result<Vec<u8>, ReconcileError> {
        let response = self
            .client
            .get(url)
            .send()
            .await
            .map_err(|e| ReconcileError::unavailable(table, format!("{}: {}", url, e)))?;

        if !response.status().is_success() {
            return Err(ReconcileError::unavailable(
                table,
                format!("HTTP error: {}", response.status()),
            ));
        }

        let body = response
            .bytes()
            .await
            .map_err(|e| ReconcileError::unavailable(table, e))?;

        Ok(body.to_vec())
    }
}

pub fn frame_from_csv(bytes: Vec<u8>) -> PolarsResult<DataFrame> {
    CsvReadOptions::default()
        .with_has_header(true)
        .with_infer_schema_length(Some(0))
        .into_reader_with_file_handle(Cursor::new(bytes))
        .finish()
}

/// Reads an array of JSON records with every column cast to text.
pub fn frame_from_json(bytes: Vec<u8>) -> PolarsResult<DataFrame> {
    let df = JsonReader::new(Cursor::new(bytes)).finish()?;
    let columns = df
        .get_columns()
        .iter()
        .map(|column| column.cast(&DataType::String))
        .collect::<PolarsResult<Vec<Column>>>()?;

    DataFrame::new(columns)
}
