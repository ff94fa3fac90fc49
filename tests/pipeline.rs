use std::collections::HashMap;

use assert_matches::assert_matches;
use camino::Utf8PathBuf;
use rusqlite::types::Value as SqlValue;

use species_etl::app::{Pipeline, PipelineSettings};
use species_etl::domain::{BlobKey, IdRange, SpeciesRecord};
use species_etl::error::EtlError;
use species_etl::frame::Frame;
use species_etl::pokeapi::SpeciesClient;
use species_etl::store::{CSV_CONTENT_TYPE, FsObjectStore, ObjectStore};
use species_etl::warehouse::{SqliteWarehouse, Warehouse};

#[derive(Default)]
struct MockSpecies {
    records: HashMap<u32, SpeciesRecord>,
}

impl MockSpecies {
    fn with(records: Vec<SpeciesRecord>) -> Self {
        Self {
            records: records
                .into_iter()
                .map(|record| (record.id as u32, record))
                .collect(),
        }
    }
}

impl SpeciesClient for MockSpecies {
    fn fetch_species(&self, id: u32) -> Result<SpeciesRecord, EtlError> {
        self.records
            .get(&id)
            .cloned()
            .ok_or_else(|| EtlError::SpeciesStatus {
                status: 404,
                message: "Not Found".to_string(),
            })
    }
}

fn species(id: i64, name: &str) -> SpeciesRecord {
    SpeciesRecord {
        id,
        name: name.to_string(),
        base_happiness: Some(50),
        capture_rate: 45,
        forms_switchable: false,
        gender_rate: 1,
        habitat_name: Some("grassland".to_string()),
        has_gender_differences: false,
        hatch_counter: Some(20),
        is_baby: false,
        is_legendary: false,
        is_mythical: false,
        shape_name: Some("quadruped".to_string()),
        growth_rate: Some("medium-slow".to_string()),
    }
}

fn species_without_optionals(id: i64, name: &str) -> SpeciesRecord {
    SpeciesRecord {
        base_happiness: None,
        habitat_name: None,
        hatch_counter: None,
        shape_name: None,
        ..species(id, name)
    }
}

fn settings() -> PipelineSettings {
    PipelineSettings {
        raw_key: "pokemon_species_data.csv".parse().unwrap(),
        cleaned_key: "cleaned_pokemon_species_data.csv".parse().unwrap(),
        table: "pokemon.pokemon_species_data".parse().unwrap(),
        create_if_missing: true,
        step_retries: 0,
    }
}

fn temp_store(temp: &tempfile::TempDir) -> FsObjectStore {
    let root = Utf8PathBuf::from_path_buf(temp.path().join("buckets")).unwrap();
    FsObjectStore::new(root, "pokemon-dataset")
}

fn pipeline(
    temp: &tempfile::TempDir,
    records: Vec<SpeciesRecord>,
) -> Pipeline<MockSpecies, FsObjectStore, SqliteWarehouse> {
    Pipeline::new(
        MockSpecies::with(records),
        temp_store(temp),
        SqliteWarehouse::open_in_memory().unwrap(),
        settings(),
    )
}

#[test]
fn collect_skips_missing_ids_in_order() {
    let temp = tempfile::tempdir().unwrap();
    let app = pipeline(
        &temp,
        vec![species(3, "venusaur"), species(1, "bulbasaur")],
    );

    let report = app.collect(IdRange::new(1, 5).unwrap()).unwrap();
    assert_eq!(report.requested, 4);
    assert_eq!(report.fetched, 2);
    assert_eq!(report.skipped, 2);

    let content = app.store().get(&settings().raw_key).unwrap();
    let frame = Frame::from_csv(&content).unwrap();
    let ids: Vec<_> = frame.column(0).collect();
    assert_eq!(ids, vec![Some("1"), Some("3")]);

    let meta = app.store().read_metadata(&settings().raw_key).unwrap().unwrap();
    assert_eq!(meta.content_type, CSV_CONTENT_TYPE);
}

#[test]
fn collect_with_no_hits_writes_header_only() {
    let temp = tempfile::tempdir().unwrap();
    let app = pipeline(&temp, Vec::new());

    let report = app.collect(IdRange::new(10_000, 10_003).unwrap()).unwrap();
    assert_eq!(report.fetched, 0);
    let content = app.store().get(&settings().raw_key).unwrap();
    assert_eq!(String::from_utf8(content).unwrap().lines().count(), 1);

    assert_matches!(app.clean(), Err(EtlError::EmptyDataset));
}

#[test]
fn clean_without_raw_blob_fails() {
    let temp = tempfile::tempdir().unwrap();
    let app = pipeline(&temp, Vec::new());
    assert_matches!(app.clean(), Err(EtlError::BlobNotFound { .. }));
}

#[test]
fn clean_fills_every_missing_cell() {
    let temp = tempfile::tempdir().unwrap();
    let mut third = species(3, "venusaur");
    third.base_happiness = Some(70);
    third.habitat_name = Some("mountain".to_string());
    let app = pipeline(
        &temp,
        vec![
            species(1, "bulbasaur"),
            species(2, "ivysaur"),
            third,
            species_without_optionals(4, "charmander"),
        ],
    );

    app.collect(IdRange::new(1, 5).unwrap()).unwrap();
    let report = app.clean().unwrap();
    assert_eq!(report.rows, 4);
    assert_eq!(report.filled_cells, 4);

    let cleaned = Frame::from_csv(&app.store().get(&settings().cleaned_key).unwrap()).unwrap();
    assert_eq!(cleaned.missing_cells(), 0);
    let charmander = &cleaned.rows()[3];
    assert_eq!(charmander[2].as_deref(), Some("50"));
    assert_eq!(charmander[6].as_deref(), Some("grassland"));
    assert_eq!(charmander[8].as_deref(), Some("20"));
    assert_eq!(charmander[12].as_deref(), Some("quadruped"));
}

#[test]
fn reset_creates_missing_table_and_empties_it() {
    let temp = tempfile::tempdir().unwrap();
    let app = pipeline(&temp, Vec::new());

    let report = app.reset_table().unwrap();
    assert!(report.created);
    assert_eq!(app.warehouse().row_count(&settings().table).unwrap(), 0);

    let again = app.reset_table().unwrap();
    assert!(!again.created);
    assert_eq!(again.deleted_rows, 0);
}

#[test]
fn reset_without_create_requires_table() {
    let temp = tempfile::tempdir().unwrap();
    let app = Pipeline::new(
        MockSpecies::default(),
        temp_store(&temp),
        SqliteWarehouse::open_in_memory().unwrap(),
        PipelineSettings {
            create_if_missing: false,
            ..settings()
        },
    );
    assert_matches!(app.reset_table(), Err(EtlError::TableNotFound(_)));
}

#[test]
fn end_to_end_loads_cleaned_rows() {
    let temp = tempfile::tempdir().unwrap();
    let app = pipeline(
        &temp,
        vec![
            species(1, "bulbasaur"),
            species(2, "ivysaur"),
            species(3, "venusaur"),
            species_without_optionals(4, "charmander"),
        ],
    );

    let report = app.run(IdRange::new(1, 6).unwrap()).unwrap();
    assert_eq!(report.collect.fetched, 4);
    assert_eq!(report.clean.rows, 4);
    assert_eq!(report.load.rows, 4);

    let table = settings().table;
    assert_eq!(app.warehouse().row_count(&table).unwrap(), 4);
    let rows = app.warehouse().select_all(&table).unwrap();
    assert_eq!(rows[3][1], SqlValue::Text("charmander".to_string()));
    assert_eq!(rows[3][2], SqlValue::Real(50.0));
    assert_eq!(rows[3][6], SqlValue::Text("grassland".to_string()));

    app.reset_table().unwrap();
    assert_eq!(app.warehouse().row_count(&table).unwrap(), 0);
}

#[test]
fn rerun_is_idempotent() {
    let temp = tempfile::tempdir().unwrap();
    let app = pipeline(
        &temp,
        vec![species(1, "bulbasaur"), species_without_optionals(2, "ivysaur")],
    );

    let first = app.run(IdRange::new(1, 3).unwrap()).unwrap();
    let second = app.run(IdRange::new(1, 3).unwrap()).unwrap();
    assert_eq!(first.load.rows, second.load.rows);
    assert_eq!(second.reset.deleted_rows, 2);
    assert_eq!(app.warehouse().row_count(&settings().table).unwrap(), 2);
}

#[test]
fn load_rejects_foreign_columns() {
    let temp = tempfile::tempdir().unwrap();
    let app = pipeline(&temp, Vec::new());
    let key: BlobKey = settings().cleaned_key;
    app.store()
        .put(&key, b"id,name,nickname\n1,bulbasaur,bulby\n", CSV_CONTENT_TYPE)
        .unwrap();

    assert_matches!(app.load(), Err(EtlError::SchemaMismatch(_)));
}
