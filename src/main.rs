mod config;
mod error;
mod group;
mod heuristics;
mod intake;
mod merge;
mod naming;
mod pdf_extract;
mod search;
mod settings;
mod storage;

use std::path::{Path, PathBuf};
use std::process::ExitCode;

use clap::{Parser, Subcommand};
use serde::Serialize;
use serde_json::json;
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

use error::{IntakeError, Result};
use intake::{Intake, MergeOutput};
use merge::{BatchManifest, UploadedDocument};
use search::MergedQuery;
use settings::Settings;
use storage::LocalStorage;

/// Customs document intake: identify, group and merge shipment PDFs.
#[derive(Parser, Debug)]
#[command(name = "customs-intake")]
#[command(version)]
struct Args {
    /// Path to the TOML config
    #[arg(short, long, default_value = ".config/intake.toml", env = "INTAKE_CONFIG")]
    config: PathBuf,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Customs number and BL code inferred from each file name
    Identify { names: Vec<String> },
    /// Importer and fee lines of a payment-confirmation PDF
    PcInfo {
        file: PathBuf,
        /// Read from upload storage instead of the local path
        #[arg(long)]
        stored: bool,
    },
    /// Group files automatically and show the merge order
    Plan { files: Vec<PathBuf> },
    /// Merge all files into one PDF
    Merge { files: Vec<PathBuf> },
    /// Merge several groups in one request
    MergeBatch {
        /// JSON manifest with `fileIds` and `groups`
        #[arg(long, conflicts_with = "auto")]
        manifest: Option<PathBuf>,
        /// Build the groups from the file names
        #[arg(long)]
        auto: bool,
        files: Vec<PathBuf>,
    },
    /// Store files in the upload directory
    Upload { files: Vec<PathBuf> },
    Uploads {
        #[command(subcommand)]
        action: UploadsAction,
    },
    Merged {
        #[command(subcommand)]
        action: MergedAction,
    },
    Settings {
        #[command(subcommand)]
        action: SettingsAction,
    },
}

#[derive(Subcommand, Debug)]
enum UploadsAction {
    List,
    Delete { names: Vec<String> },
    Clear,
}

#[derive(Subcommand, Debug)]
enum MergedAction {
    List {
        #[arg(long)]
        keyword: Option<String>,
        /// `YYMMDD`
        #[arg(long)]
        date: Option<String>,
        /// Free text to pull customs numbers and BL codes from
        #[arg(long)]
        tokens_from: Option<String>,
    },
}

#[derive(Subcommand, Debug)]
enum SettingsAction {
    Show,
    /// Apply a JSON object of overrides
    Set { json: String },
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct IdentifyRow<'a> {
    filename: &'a str,
    customs_number: Option<String>,
    bl_code: Option<String>,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct MergedRow {
    filename: String,
    customs: String,
    bl: String,
    bytes: usize,
}

#[tokio::main]
async fn main() -> ExitCode {
    let args = Args::parse();
    let cfg = match config::Config::load(&args.config) {
        Ok(cfg) => cfg,
        Err(e) => {
            eprintln!("failed to load {}: {e}", args.config.display());
            return ExitCode::FAILURE;
        }
    };

    // logs go to stderr, stdout carries JSON
    tracing_subscriber::fmt()
        .with_target(true)
        .with_level(true)
        .with_writer(std::io::stderr)
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&cfg.log_filter)),
        )
        .init();

    match run(args.command, cfg).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            if e.is_validation() {
                warn!(error = %e, "Request rejected");
            } else {
                error!(error = %e, "Request failed");
            }
            print_json(&json!({ "error": e.public_message() }));
            ExitCode::FAILURE
        }
    }
}

async fn run(command: Command, cfg: config::Config) -> Result<()> {
    let intake = Intake::new(
        Box::new(LocalStorage::new(&cfg.upload_dir)),
        Box::new(LocalStorage::new(&cfg.merged_dir)),
        cfg.extraction.clone(),
    );

    match command {
        Command::Identify { names } => {
            let rows: Vec<IdentifyRow> = names
                .iter()
                .map(|name| {
                    let id = heuristics::identify(base_name(Path::new(name)).as_str());
                    IdentifyRow {
                        filename: name,
                        customs_number: id.customs_number,
                        bl_code: id.bl_code,
                    }
                })
                .collect();
            print_json(&rows);
        }
        Command::PcInfo { file, stored } => {
            let info = if stored {
                intake.pc_info(&base_name(&file)).await?
            } else {
                let bytes = tokio::fs::read(&file).await.map_err(|e| not_found(&file, e))?;
                pdf_extract::pc_info_from_pdf(&bytes, &cfg.extraction)?
            };
            print_json(&info);
        }
        Command::Plan { files } => {
            let docs = read_documents(&files).await?;
            let settings = Settings::load(&cfg.settings_path)?;
            print_json(&intake.plan(&docs, &settings));
        }
        Command::Merge { files } => {
            let started = naming::now();
            let docs = read_documents(&files).await?;
            let output = intake::merge_single(&docs, started)?;
            let rows = save(&intake, vec![output]).await?;
            print_json(&rows[0]);
        }
        Command::MergeBatch {
            manifest,
            auto,
            files,
        } => {
            let started = naming::now();
            let docs = read_documents(&files).await?;
            let manifest = match (manifest, auto) {
                (Some(path), false) => {
                    let raw = tokio::fs::read_to_string(&path)
                        .await
                        .map_err(|e| not_found(&path, e))?;
                    BatchManifest::parse(&raw)?
                }
                (None, true) => {
                    let settings = Settings::load(&cfg.settings_path)?;
                    intake::plan_manifest(&intake.plan(&docs, &settings), docs.len())
                }
                _ => return Err(IntakeError::validation(merge::MSG_INCOMPLETE)),
            };
            let outputs = intake::merge_batch(&docs, &manifest, started)?;
            print_json(&save(&intake, outputs).await?);
        }
        Command::Upload { files } => {
            let docs = read_documents(&files).await?;
            if docs.is_empty() {
                return Err(IntakeError::validation(merge::MSG_NO_FILES));
            }
            print_json(&json!({ "files": intake.store_uploads(&docs).await? }));
        }
        Command::Uploads { action } => {
            let store = intake.uploads();
            match action {
                UploadsAction::List => print_json(&json!({ "files": store.list().await? })),
                UploadsAction::Delete { names } => {
                    print_json(&json!({ "deleted": store.delete(&names).await? }))
                }
                UploadsAction::Clear => print_json(&json!({ "deleted": store.clear().await? })),
            }
        }
        Command::Merged {
            action:
                MergedAction::List {
                    keyword,
                    date,
                    tokens_from,
                },
        } => {
            let names = intake.merged().list().await?;
            let query = MergedQuery {
                keyword,
                date,
                tokens: tokens_from
                    .as_deref()
                    .map(search::extract_search_tokens)
                    .unwrap_or_default(),
            };
            print_json(&json!({ "files": search::filter_merged(&names, &query) }));
        }
        Command::Settings { action } => {
            let mut settings = Settings::load(&cfg.settings_path)?;
            if let SettingsAction::Set { json } = action {
                let overrides: serde_json::Value = serde_json::from_str(&json)
                    .map_err(|_| IntakeError::validation(merge::MSG_BAD_MANIFEST))?;
                let applied = settings.apply_overrides(&overrides)?;
                settings.save(&cfg.settings_path)?;
                info!(applied, path = %cfg.settings_path, "Settings saved");
            }
            print_json(&settings.to_json());
        }
    }
    Ok(())
}

async fn save(intake: &Intake, outputs: Vec<MergeOutput>) -> Result<Vec<MergedRow>> {
    let written = intake.save_outputs(&outputs).await?;
    Ok(outputs
        .into_iter()
        .zip(written)
        .map(|(out, filename)| MergedRow {
            filename,
            customs: out.metadata.customs,
            bl: out.metadata.bl,
            bytes: out.bytes.len(),
        })
        .collect())
}

async fn read_documents(paths: &[PathBuf]) -> Result<Vec<UploadedDocument>> {
    let mut docs = Vec::with_capacity(paths.len());
    for path in paths {
        let bytes = tokio::fs::read(path).await.map_err(|e| not_found(path, e))?;
        docs.push(UploadedDocument {
            filename: base_name(path),
            bytes,
        });
    }
    Ok(docs)
}

fn base_name(path: &Path) -> String {
    path.file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default()
}

fn not_found(path: &Path, e: std::io::Error) -> IntakeError {
    if e.kind() == std::io::ErrorKind::NotFound {
        IntakeError::NotFound(path.display().to_string())
    } else {
        e.into()
    }
}

fn print_json<T: Serialize + ?Sized>(value: &T) {
    match serde_json::to_string_pretty(value) {
        Ok(out) => println!("{out}"),
        Err(e) => error!(error = %e, "Could not encode output"),
    }
}
