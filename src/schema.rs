use std::fmt;

use serde::Serialize;

use crate::domain::TableId;

/// Column type as declared to the warehouse.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum ColumnType {
    #[serde(rename = "INT64")]
    Int64,
    #[serde(rename = "FLOAT64")]
    Float64,
    #[serde(rename = "STRING")]
    String,
    #[serde(rename = "BOOL")]
    Bool,
}

impl ColumnType {
    pub fn sql_type(&self) -> &'static str {
        match self {
            ColumnType::Int64 => "INTEGER",
            ColumnType::Float64 => "REAL",
            ColumnType::String => "TEXT",
            ColumnType::Bool => "INTEGER",
        }
    }
}

impl fmt::Display for ColumnType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ColumnType::Int64 => write!(f, "INT64"),
            ColumnType::Float64 => write!(f, "FLOAT64"),
            ColumnType::String => write!(f, "STRING"),
            ColumnType::Bool => write!(f, "BOOL"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum ColumnMode {
    Required,
    Nullable,
}

#[derive(Debug, Clone, Serialize)]
pub struct Column {
    pub name: &'static str,
    #[serde(rename = "type")]
    pub col_type: ColumnType,
    pub mode: ColumnMode,
}

impl Column {
    pub const fn required(name: &'static str, col_type: ColumnType) -> Self {
        Self {
            name,
            col_type,
            mode: ColumnMode::Required,
        }
    }

    pub const fn nullable(name: &'static str, col_type: ColumnType) -> Self {
        Self {
            name,
            col_type,
            mode: ColumnMode::Nullable,
        }
    }

    pub fn is_required(&self) -> bool {
        self.mode == ColumnMode::Required
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct TableSchema {
    pub columns: &'static [Column],
}

impl TableSchema {
    pub fn column_names(&self) -> Vec<&'static str> {
        self.columns.iter().map(|col| col.name).collect()
    }

    pub fn find(&self, name: &str) -> Option<&Column> {
        self.columns.iter().find(|col| col.name == name)
    }
}

/// Destination schema for species rows. Nullable integers are stored as floats.
pub static SPECIES_SCHEMA: TableSchema = TableSchema {
    columns: &[
        Column::required("id", ColumnType::Int64),
        Column::required("name", ColumnType::String),
        Column::nullable("base_happiness", ColumnType::Float64),
        Column::required("capture_rate", ColumnType::Int64),
        Column::required("forms_switchable", ColumnType::Bool),
        Column::required("gender_rate", ColumnType::Int64),
        Column::nullable("habitat_name", ColumnType::String),
        Column::required("has_gender_differences", ColumnType::Bool),
        Column::nullable("hatch_counter", ColumnType::Float64),
        Column::required("is_baby", ColumnType::Bool),
        Column::required("is_legendary", ColumnType::Bool),
        Column::required("is_mythical", ColumnType::Bool),
        Column::nullable("shape_name", ColumnType::String),
        Column::required("growth_rate", ColumnType::String),
    ],
};

/// CREATE TABLE statement for `schema`, primary key on `id` when present.
pub fn generate_create_table(table: &TableId, schema: &TableSchema, if_not_exists: bool) -> String {
    let columns = schema
        .columns
        .iter()
        .map(|col| {
            let pk = if col.name == "id" { " PRIMARY KEY" } else { "" };
            let null_constraint = if col.is_required() { " NOT NULL" } else { "" };
            format!(
                "    \"{}\" {}{}{}",
                col.name,
                col.col_type.sql_type(),
                pk,
                null_constraint
            )
        })
        .collect::<Vec<_>>();
    let guard = if if_not_exists { "IF NOT EXISTS " } else { "" };
    format!(
        "CREATE TABLE {guard}{} (\n{}\n)",
        table.quoted(),
        columns.join(",\n")
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn create_table_statement() {
        let table: TableId = "pokemon.pokemon_species_data".parse().unwrap();
        let sql = generate_create_table(&table, &SPECIES_SCHEMA, true);
        assert!(sql.starts_with("CREATE TABLE IF NOT EXISTS \"pokemon.pokemon_species_data\""));
        assert!(sql.contains("\"id\" INTEGER PRIMARY KEY NOT NULL"));
        assert!(sql.contains("\"base_happiness\" REAL,"));
        assert!(sql.contains("\"growth_rate\" TEXT NOT NULL"));
    }

    #[test]
    fn schema_matches_record_columns() {
        assert_eq!(SPECIES_SCHEMA.columns.len(), 14);
        assert_eq!(SPECIES_SCHEMA.column_names()[13], "growth_rate");
        assert!(!SPECIES_SCHEMA.find("shape_name").unwrap().is_required());
    }
}
