use std::process::ExitCode;

use clap::{Args, Parser, Subcommand};
use miette::IntoDiagnostic;
use tracing_subscriber::EnvFilter;

use species_etl::app::{Pipeline, PipelineSettings};
use species_etl::config::{ConfigLoader, ResolvedConfig};
use species_etl::domain::IdRange;
use species_etl::error::EtlError;
use species_etl::output::{HumanOutput, JsonOutput, OutputMode};
use species_etl::pokeapi::PokeApiClient;
use species_etl::schema::SPECIES_SCHEMA;
use species_etl::store::FsObjectStore;
use species_etl::warehouse::SqliteWarehouse;

#[derive(Parser)]
#[command(name = "species-etl")]
#[command(about = "Collect PokeAPI species data, impute missing values, load an analytical table")]
#[command(version, author)]
struct Cli {
    /// Config file (default: ./species-etl.json, built-in defaults when absent)
    #[arg(long, global = true)]
    config: Option<String>,

    /// Print step reports as JSON
    #[arg(long, global = true)]
    json: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    #[command(about = "Fetch species records and stage them as the raw CSV blob")]
    Collect(RangeArgs),
    #[command(about = "Fill missing values in the raw blob and write the cleaned blob")]
    Clean,
    #[command(about = "Delete every row of the destination table")]
    ResetTable,
    #[command(about = "Load the cleaned blob into the destination table")]
    Load,
    #[command(about = "Run collect, clean, reset-table and load in order")]
    Run(RangeArgs),
    #[command(about = "Print the destination table schema")]
    Schema,
}

#[derive(Args, Clone)]
struct RangeArgs {
    /// Species ids to fetch, `START..END` (end exclusive) or `END`
    #[arg(long)]
    ids: Option<IdRange>,
}

fn main() -> ExitCode {
    if let Err(report) = run() {
        eprintln!("{report:?}");
        if let Some(err) = report.downcast_ref::<EtlError>() {
            return ExitCode::from(map_exit_code(err));
        }
        return ExitCode::from(1);
    }
    ExitCode::SUCCESS
}

fn map_exit_code(error: &EtlError) -> u8 {
    match error {
        EtlError::MissingConfig(_)
        | EtlError::ConfigRead(_)
        | EtlError::ConfigParse(_)
        | EtlError::InvalidIdRange(_)
        | EtlError::InvalidTableId(_)
        | EtlError::InvalidBlobKey(_) => 2,
        EtlError::SpeciesHttp(_)
        | EtlError::SpeciesStatus { .. }
        | EtlError::Storage(_)
        | EtlError::BlobNotFound { .. } => 3,
        EtlError::TableNotFound(_)
        | EtlError::Table(_)
        | EtlError::SchemaMismatch(_)
        | EtlError::MalformedRow { .. } => 4,
        _ => 1,
    }
}

fn run() -> miette::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let output_mode = if cli.json {
        OutputMode::Json
    } else {
        OutputMode::Human
    };

    let config_path = cli.config.as_deref();
    match cli.command {
        Commands::Collect(args) => {
            let (config, pipeline) = setup(config_path)?;
            let report = pipeline.collect(args.ids.unwrap_or(config.id_range))?;
            emit(output_mode, &report, HumanOutput::collect)
        }
        Commands::Clean => {
            let (_, pipeline) = setup(config_path)?;
            let report = pipeline.clean()?;
            emit(output_mode, &report, HumanOutput::clean)
        }
        Commands::ResetTable => {
            let (_, pipeline) = setup(config_path)?;
            let report = pipeline.reset_table()?;
            emit(output_mode, &report, HumanOutput::reset)
        }
        Commands::Load => {
            let (_, pipeline) = setup(config_path)?;
            let report = pipeline.load()?;
            emit(output_mode, &report, HumanOutput::load)
        }
        Commands::Run(args) => {
            let (config, pipeline) = setup(config_path)?;
            let report = pipeline.run(args.ids.unwrap_or(config.id_range))?;
            emit(output_mode, &report, HumanOutput::run)
        }
        Commands::Schema => print_schema(output_mode),
    }
}

type FsPipeline = Pipeline<PokeApiClient, FsObjectStore, SqliteWarehouse>;

fn setup(config_path: Option<&str>) -> Result<(ResolvedConfig, FsPipeline), EtlError> {
    let config = ConfigLoader::resolve(config_path)?;
    let pipeline = build_pipeline(&config)?;
    Ok((config, pipeline))
}

fn build_pipeline(config: &ResolvedConfig) -> Result<FsPipeline, EtlError> {
    let species = PokeApiClient::new(&config.api_base, config.http_timeout)?;
    let store = FsObjectStore::new(config.storage.root.clone(), config.storage.bucket.clone());
    let warehouse = SqliteWarehouse::open(&config.warehouse.database)?;
    Ok(Pipeline::new(
        species,
        store,
        warehouse,
        PipelineSettings::from(config),
    ))
}

fn emit<T: serde::Serialize>(
    mode: OutputMode,
    report: &T,
    human: fn(&T) -> String,
) -> miette::Result<()> {
    match mode {
        OutputMode::Json => JsonOutput::print(report).into_diagnostic(),
        OutputMode::Human => {
            println!("{}", human(report));
            Ok(())
        }
    }
}

fn print_schema(mode: OutputMode) -> miette::Result<()> {
    match mode {
        OutputMode::Json => JsonOutput::print(&SPECIES_SCHEMA).into_diagnostic(),
        OutputMode::Human => {
            for col in SPECIES_SCHEMA.columns {
                println!("{:<24} {:<8} {:?}", col.name, col.col_type.to_string(), col.mode);
            }
            Ok(())
        }
    }
}
