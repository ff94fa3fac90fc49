use std::io::{self, Write};

use serde::Serialize;

use crate::app::{CleanReport, CollectReport, LoadReport, ResetReport, RunReport};

#[derive(Debug, Clone, Copy)]
pub enum OutputMode {
    Human,
    Json,
}

pub struct JsonOutput;

impl JsonOutput {
    pub fn print<T: Serialize>(value: &T) -> io::Result<()> {
        let json = serde_json::to_string_pretty(value).map_err(io::Error::other)?;
        let mut stdout = io::stdout();
        stdout.write_all(json.as_bytes())?;
        stdout.write_all(b"\n")?;
        Ok(())
    }
}

pub struct HumanOutput;

impl HumanOutput {
    pub fn collect(report: &CollectReport) -> String {
        format!(
            "collect: fetched {} of {} ids ({} skipped) -> {}",
            report.fetched, report.requested, report.skipped, report.blob
        )
    }

    pub fn clean(report: &CleanReport) -> String {
        let mut lines = vec![format!(
            "clean: {} rows, {} cells filled -> {}",
            report.rows, report.filled_cells, report.blob
        )];
        for fill in report.columns.iter().filter(|fill| fill.filled > 0) {
            lines.push(format!(
                "  {} ({}): {} filled with {}",
                fill.column,
                fill.kind,
                fill.filled,
                fill.fill_value.as_deref().unwrap_or("")
            ));
        }
        for fill in report.columns.iter().filter(|fill| fill.fill_value.is_none()) {
            lines.push(format!("  {} ({}): no observed values", fill.column, fill.kind));
        }
        lines.join("\n")
    }

    pub fn reset(report: &ResetReport) -> String {
        let created = if report.created { " (created)" } else { "" };
        format!(
            "reset-table: {} rows deleted from {}{created}",
            report.deleted_rows, report.table
        )
    }

    pub fn load(report: &LoadReport) -> String {
        format!(
            "load: {} rows loaded into {} from {}",
            report.rows, report.table, report.source
        )
    }

    pub fn run(report: &RunReport) -> String {
        [
            Self::collect(&report.collect),
            Self::clean(&report.clean),
            Self::reset(&report.reset),
            Self::load(&report.load),
            format!("pipeline finished in {:.1}s", report.elapsed_ms as f64 / 1000.0),
        ]
        .join("\n")
    }
}
