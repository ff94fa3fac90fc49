use std::time::{Duration, Instant};

use serde::Serialize;
use tracing::{debug, info, warn};

use crate::config::ResolvedConfig;
use crate::domain::{BlobKey, BlobRef, IdRange, SpeciesRecord, TableId};
use crate::error::EtlError;
use crate::frame::{ColumnFill, Frame};
use crate::pokeapi::SpeciesClient;
use crate::schema::{SPECIES_SCHEMA, TableSchema};
use crate::store::{CSV_CONTENT_TYPE, ObjectStore};
use crate::warehouse::{LoadOptions, Warehouse};

/// Where each step reads and writes.
#[derive(Debug, Clone)]
pub struct PipelineSettings {
    pub raw_key: BlobKey,
    pub cleaned_key: BlobKey,
    pub table: TableId,
    pub create_if_missing: bool,
    pub step_retries: u32,
}

impl From<&ResolvedConfig> for PipelineSettings {
    fn from(config: &ResolvedConfig) -> Self {
        Self {
            raw_key: config.storage.raw_key.clone(),
            cleaned_key: config.storage.cleaned_key.clone(),
            table: config.warehouse.table.clone(),
            create_if_missing: config.warehouse.create_if_missing,
            step_retries: config.step_retries,
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct CollectReport {
    pub range: IdRange,
    pub requested: usize,
    pub fetched: usize,
    pub skipped: usize,
    pub blob: BlobRef,
}

#[derive(Debug, Clone, Serialize)]
pub struct CleanReport {
    pub source: BlobRef,
    pub blob: BlobRef,
    pub rows: usize,
    pub filled_cells: usize,
    pub columns: Vec<ColumnFill>,
}

#[derive(Debug, Clone, Serialize)]
pub struct ResetReport {
    pub table: TableId,
    pub created: bool,
    pub deleted_rows: u64,
}

#[derive(Debug, Clone, Serialize)]
pub struct LoadReport {
    pub source: BlobRef,
    pub table: TableId,
    pub options: LoadOptions,
    pub rows: u64,
}

#[derive(Debug, Clone, Serialize)]
pub struct RunReport {
    pub collect: CollectReport,
    pub clean: CleanReport,
    pub reset: ResetReport,
    pub load: LoadReport,
    pub elapsed_ms: u128,
}

pub struct Pipeline<C: SpeciesClient, S: ObjectStore, W: Warehouse> {
    species: C,
    store: S,
    warehouse: W,
    settings: PipelineSettings,
}

impl<C: SpeciesClient, S: ObjectStore, W: Warehouse> Pipeline<C, S, W> {
    pub fn new(species: C, store: S, warehouse: W, settings: PipelineSettings) -> Self {
        Self {
            species,
            store,
            warehouse,
            settings,
        }
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    pub fn warehouse(&self) -> &W {
        &self.warehouse
    }

    /// Fetch every id in `range` and stage the found records as the raw CSV blob.
    /// Ids that fail to fetch are skipped; only the storage write can fail the step.
    pub fn collect(&self, range: IdRange) -> Result<CollectReport, EtlError> {
        info!(%range, "collecting species");
        let mut records: Vec<SpeciesRecord> = Vec::with_capacity(range.len());
        let mut skipped = 0usize;

        for id in range.iter() {
            match self.species.fetch_species(id) {
                Ok(record) => records.push(record),
                Err(err) => {
                    debug!(id, error = %err, "skipping species");
                    skipped += 1;
                }
            }
        }

        let content = serialize_records(&records)?;
        let blob = self
            .store
            .put(&self.settings.raw_key, &content, CSV_CONTENT_TYPE)?;
        info!(%blob, fetched = records.len(), skipped, "uploaded raw species data");

        Ok(CollectReport {
            range,
            requested: range.len(),
            fetched: records.len(),
            skipped,
            blob,
        })
    }

    /// Impute missing values in the raw blob and write the cleaned blob.
    pub fn clean(&self) -> Result<CleanReport, EtlError> {
        let source = self.blob_ref(&self.settings.raw_key);
        if !self.store.exists(&self.settings.raw_key)? {
            return Err(EtlError::BlobNotFound {
                bucket: source.bucket,
                key: source.key.to_string(),
            });
        }
        let content = self.store.get(&self.settings.raw_key)?;
        let mut frame = Frame::from_csv(&content)?;
        if frame.row_count() == 0 {
            return Err(EtlError::EmptyDataset);
        }

        let columns = frame.impute();
        for fill in columns.iter().filter(|fill| fill.fill_value.is_none()) {
            warn!(column = %fill.column, "column has no observed values, left empty");
        }
        let filled_cells: usize = columns.iter().map(|fill| fill.filled).sum();

        let cleaned = frame.to_csv()?;
        let blob = self
            .store
            .put(&self.settings.cleaned_key, &cleaned, CSV_CONTENT_TYPE)?;
        info!(%blob, rows = frame.row_count(), filled_cells, "uploaded cleaned species data");

        Ok(CleanReport {
            source,
            blob,
            rows: frame.row_count(),
            filled_cells,
            columns,
        })
    }

    /// Delete every row of the destination table, creating it empty when it does not
    /// exist yet and creation is allowed.
    pub fn reset_table(&self) -> Result<ResetReport, EtlError> {
        let table = &self.settings.table;
        let mut created = false;
        if !self.warehouse.table_exists(table)? {
            if !self.settings.create_if_missing {
                return Err(EtlError::TableNotFound(table.to_string()));
            }
            self.warehouse.create_table(table, &SPECIES_SCHEMA)?;
            created = true;
        }
        let deleted_rows = self.warehouse.delete_all(table)?;
        info!(%table, deleted_rows, created, "reset destination table");

        Ok(ResetReport {
            table: table.clone(),
            created,
            deleted_rows,
        })
    }

    /// Load the cleaned blob into the destination table, replacing its contents.
    pub fn load(&self) -> Result<LoadReport, EtlError> {
        self.load_with(&SPECIES_SCHEMA, LoadOptions::default())
    }

    pub fn load_with(
        &self,
        schema: &TableSchema,
        options: LoadOptions,
    ) -> Result<LoadReport, EtlError> {
        let source = self.blob_ref(&self.settings.cleaned_key);
        let content = self.store.get(&self.settings.cleaned_key)?;
        let table = &self.settings.table;
        let rows = self.warehouse.load_csv(table, schema, &content, &options)?;
        info!(%source, %table, rows, "loaded species table");

        Ok(LoadReport {
            source,
            table: table.clone(),
            options,
            rows,
        })
    }

    /// Run all four steps in order, retrying each as a whole up to `step_retries`
    /// times and stopping at the first step that still fails.
    pub fn run(&self, range: IdRange) -> Result<RunReport, EtlError> {
        let start = Instant::now();
        let retries = self.settings.step_retries;
        let collect = with_retries("collect", retries, || self.collect(range))?;
        let clean = with_retries("clean", retries, || self.clean())?;
        let reset = with_retries("reset_table", retries, || self.reset_table())?;
        let load = with_retries("load", retries, || self.load())?;
        Ok(RunReport {
            collect,
            clean,
            reset,
            load,
            elapsed_ms: start.elapsed().as_millis(),
        })
    }

    fn blob_ref(&self, key: &BlobKey) -> BlobRef {
        BlobRef {
            bucket: self.store.bucket().to_string(),
            key: key.clone(),
        }
    }
}

/// Records as CSV with a header row, in the order given.
pub fn serialize_records(records: &[SpeciesRecord]) -> Result<Vec<u8>, EtlError> {
    let mut writer = csv::WriterBuilder::new()
        .has_headers(false)
        .from_writer(Vec::new());
    writer
        .write_record(SPECIES_SCHEMA.column_names())
        .map_err(|err| EtlError::Csv(err.to_string()))?;
    for record in records {
        writer
            .serialize(record)
            .map_err(|err| EtlError::Csv(err.to_string()))?;
    }
    writer
        .into_inner()
        .map_err(|err| EtlError::Csv(err.to_string()))
}

fn with_retries<T, F>(step: &str, retries: u32, mut op: F) -> Result<T, EtlError>
where
    F: FnMut() -> Result<T, EtlError>,
{
    const RETRY_DELAY_MS: u64 = 500;
    let mut attempt = 0u32;
    loop {
        match op() {
            Ok(value) => return Ok(value),
            Err(err) if attempt < retries => {
                attempt += 1;
                warn!(step, attempt, error = %err, "step failed, retrying");
                std::thread::sleep(Duration::from_millis(RETRY_DELAY_MS));
            }
            Err(err) => return Err(err),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn header_written_even_without_records() {
        let content = serialize_records(&[]).unwrap();
        let text = String::from_utf8(content).unwrap();
        assert!(text.starts_with("id,name,base_happiness,"));
        assert_eq!(text.lines().count(), 1);
    }

    #[test]
    fn records_serialize_with_empty_optionals() {
        let record = SpeciesRecord {
            id: 7,
            name: "squirtle".to_string(),
            base_happiness: None,
            capture_rate: 45,
            forms_switchable: false,
            gender_rate: 1,
            habitat_name: None,
            has_gender_differences: false,
            hatch_counter: Some(20),
            is_baby: false,
            is_legendary: false,
            is_mythical: false,
            shape_name: Some("upright".to_string()),
            growth_rate: Some("medium-slow".to_string()),
        };
        let text = String::from_utf8(serialize_records(&[record]).unwrap()).unwrap();
        assert_eq!(
            text.lines().nth(1),
            Some("7,squirtle,,45,false,1,,false,20,false,false,false,upright,medium-slow")
        );
    }

    #[test]
    fn retries_stop_after_limit() {
        let mut calls = 0;
        let result: Result<(), EtlError> = with_retries("test", 1, || {
            calls += 1;
            Err(EtlError::EmptyDataset)
        });
        assert!(result.is_err());
        assert_eq!(calls, 2);
    }
}
