use std::process::ExitCode;

use clap::{Args, Parser, Subcommand};
use miette::IntoDiagnostic;
use serde_json::Value;
use tracing_subscriber::EnvFilter;

use lighthouse_ops::app::{App, AppSettings};
use lighthouse_ops::baracoda::BaracodaHttpClient;
use lighthouse_ops::config::{ConfigLoader, ResolvedConfig};
use lighthouse_ops::error::LighthouseError;
use lighthouse_ops::labwhere::LabwhereHttpClient;
use lighthouse_ops::output::JsonOutput;
use lighthouse_ops::sequencescape::SequencescapeHttpClient;
use lighthouse_ops::store::SqliteSampleStore;
use lighthouse_ops::warehouse::SqliteWarehouse;

type LighthouseApp = App<
    SqliteSampleStore,
    SqliteWarehouse,
    BaracodaHttpClient,
    SequencescapeHttpClient,
    LabwhereHttpClient,
>;

#[derive(Parser)]
#[command(name = "lighthouse")]
#[command(about = "Plate enrichment and positive-sample reports for the lab")]
#[command(version, author)]
struct Cli {
    #[arg(long, global = true)]
    config: Option<String>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    #[command(about = "Plates received from lighthouse labs")]
    Plates(PlatesArgs),
    #[command(about = "Positive samples reports")]
    Reports(ReportsArgs),
    #[command(about = "Sample declarations")]
    Declarations(DeclarationsArgs),
    #[command(about = "Labware locations")]
    Locations(LocationsArgs),
}

#[derive(Args)]
struct PlatesArgs {
    #[command(subcommand)]
    command: PlatesCommand,
}

#[derive(Subcommand)]
enum PlatesCommand {
    #[command(about = "Assign COG-UK barcodes and submit the plate to Sequencescape")]
    Send { plate_barcode: String },
}

#[derive(Args)]
struct ReportsArgs {
    #[command(subcommand)]
    command: ReportsCommand,
}

#[derive(Subcommand)]
enum ReportsCommand {
    #[command(about = "Create a new positive samples report")]
    Create,
    #[command(about = "List generated reports")]
    List {
        #[arg(long)]
        filename: Option<String>,
    },
    #[command(about = "Delete reports by filename")]
    Delete {
        #[arg(required = true)]
        filenames: Vec<String>,
    },
}

#[derive(Args)]
struct DeclarationsArgs {
    #[command(subcommand)]
    command: DeclarationsCommand,
}

#[derive(Subcommand)]
enum DeclarationsCommand {
    #[command(about = "Validate and store declarations from a JSON file (object or array)")]
    Import { path: String },
}

#[derive(Args)]
struct LocationsArgs {
    #[command(subcommand)]
    command: LocationsCommand,
}

#[derive(Subcommand)]
enum LocationsCommand {
    #[command(about = "Record labware as scanned into a location")]
    Scan {
        #[arg(long)]
        location: String,
        #[arg(long)]
        user: String,
        #[arg(required = true)]
        labware_barcodes: Vec<String>,
    },
}

fn main() -> ExitCode {
    if let Err(report) = run() {
        eprintln!("{report:?}");
        if let Some(error) = report.downcast_ref::<LighthouseError>() {
            return ExitCode::from(map_exit_code(error));
        }
        return ExitCode::from(1);
    }
    ExitCode::SUCCESS
}

fn map_exit_code(error: &LighthouseError) -> u8 {
    if error.is_external_service() {
        return 3;
    }
    match error {
        LighthouseError::MissingConfig
        | LighthouseError::ConfigRead(_)
        | LighthouseError::ConfigParse(_)
        | LighthouseError::InvalidConfig { .. }
        | LighthouseError::InvalidPayload(_)
        | LighthouseError::NoSamples(_)
        | LighthouseError::ReportNotFound(_)
        | LighthouseError::MissingSource(_)
        | LighthouseError::MissingCentre(_)
        | LighthouseError::MultipleCentres(_)
        | LighthouseError::DataConsistency(_)
        | LighthouseError::MissingField { .. } => 2,
        _ => 1,
    }
}

fn run() -> miette::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let config = ConfigLoader::resolve(cli.config.as_deref())?;
    let app = build_app(&config)?;

    match cli.command {
        Commands::Plates(args) => match args.command {
            PlatesCommand::Send { plate_barcode } => {
                let result = app.send_plate(&plate_barcode)?;
                JsonOutput::print_submission(&result).into_diagnostic()?;
                if !result.is_success() {
                    return Err(miette::Report::msg(format!(
                        "Sequencescape responded with status {}",
                        result.status
                    )));
                }
                Ok(())
            }
        },
        Commands::Reports(args) => match args.command {
            ReportsCommand::Create => {
                let result = app.create_report(chrono::Utc::now())?;
                JsonOutput::print_reports(&result).into_diagnostic()
            }
            ReportsCommand::List { filename } => {
                let result = app.list_reports(filename.as_deref())?;
                JsonOutput::print_reports(&result).into_diagnostic()
            }
            ReportsCommand::Delete { filenames } => {
                let result = app.delete_reports(&filenames)?;
                JsonOutput::print_delete(&result).into_diagnostic()
            }
        },
        Commands::Declarations(args) => match args.command {
            DeclarationsCommand::Import { path } => {
                let items = read_declarations(&path)?;
                let result = app.declare_samples(&items)?;
                JsonOutput::print_declarations(&result).into_diagnostic()?;
                if !result.is_ok() {
                    return Err(LighthouseError::InvalidPayload(
                        "declarations were not stored".to_string(),
                    )
                    .into());
                }
                Ok(())
            }
        },
        Commands::Locations(args) => match args.command {
            LocationsCommand::Scan {
                location,
                user,
                labware_barcodes,
            } => {
                let result = app.record_scan(&labware_barcodes, &location, &user)?;
                JsonOutput::print_scan(&result).into_diagnostic()
            }
        },
    }
}

fn build_app(config: &ResolvedConfig) -> Result<LighthouseApp, LighthouseError> {
    let store = SqliteSampleStore::open(&config.document_db)?;
    let warehouse = SqliteWarehouse::new(&config.warehouses);
    let baracoda = BaracodaHttpClient::new(&config.baracoda_url)?;
    let sequencescape =
        SequencescapeHttpClient::new(&config.sequencescape.url, &config.sequencescape.api_key)?;
    let labwhere = LabwhereHttpClient::new(&config.labwhere_url)?;
    Ok(App::new(
        store,
        warehouse,
        baracoda,
        sequencescape,
        labwhere,
        AppSettings::from_config(config),
    ))
}

// A single object is accepted as a batch of one.
fn read_declarations(path: &str) -> Result<Vec<Value>, LighthouseError> {
    let content = std::fs::read_to_string(path)
        .map_err(|err| LighthouseError::Filesystem(format!("{path}: {err}")))?;
    let value: Value = serde_json::from_str(&content)
        .map_err(|err| LighthouseError::InvalidPayload(err.to_string()))?;
    Ok(match value {
        Value::Array(items) => items,
        other => vec![other],
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn exit_codes_follow_error_kind() {
        assert_eq!(
            map_exit_code(&LighthouseError::DataConsistency("two centres".into())),
            2
        );
        assert_eq!(map_exit_code(&LighthouseError::MissingCentre("x".into())), 2);
        assert_eq!(
            map_exit_code(&LighthouseError::BaracodaStatus {
                status: 500,
                message: "down".into(),
            }),
            3
        );
        assert_eq!(map_exit_code(&LighthouseError::Spreadsheet("bad".into())), 1);
    }
}
