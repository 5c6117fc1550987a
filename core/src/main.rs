use clap::Parser;
use log::{error, info};
use retinascope_core::cli::report::{
    BiomarkerListReport, BiomarkerReport, MetadataReport, ModelsReport, TextReport,
};
use retinascope_core::cli::{setup_logging, Cli, Command, OutputFormat};
use retinascope_core::{
    decoder, ClientInfo, Deadline, ModelId, Result, RetinaError, ScreeningService, Upload,
    BIOMARKERS,
};
use serde::Serialize;
use std::fmt::Display;
use std::path::Path;
use std::process;

fn main() {
    let cli = Cli::parse();

    setup_logging(cli.global.verbose);

    if let Err(e) = run(&cli) {
        error!("{}", e);
        eprintln!("Error: {}", e);
        process::exit(1);
    }
}

fn run(cli: &Cli) -> Result<()> {
    let format = cli.global.format;
    let deadline = Deadline::from_millis(cli.global.timeout_ms);
    let client = ClientInfo::local();

    match &cli.command {
        Command::Predict { model, file } => {
            let service = service(cli)?;
            let upload = Upload::from_path(file)?;
            let outcome = service.predict_named(model, &upload, &client, deadline)?;
            emit(format, &outcome, TextReport::new(&outcome))
        }
        Command::Biomarkers { file, names } => {
            let service = service(cli)?;
            let upload = Upload::from_path(file)?;
            let outcome = service.predict_biomarkers(names, &upload, &client, deadline)?;
            emit(format, &outcome, BiomarkerReport::new(&outcome))
        }
        Command::ListBiomarkers => emit(format, &BIOMARKERS, BiomarkerListReport::new(&BIOMARKERS)),
        Command::Metadata { file } => {
            let service = service(cli)?;
            let upload = Upload::from_path(file)?;
            let outcome = service.extract_metadata(&upload, &client)?;
            emit(format, &outcome, MetadataReport::new(&outcome))
        }
        Command::ExportPng { file, out } => export_png(file, out),
        Command::Models { load } => {
            let service = service(cli)?;
            let ids = if load.is_empty() {
                ModelId::FIXED.to_vec()
            } else {
                load.iter().map(|s| s.parse()).collect::<Result<Vec<ModelId>>>()?
            };
            for id in ids {
                service.registry().get(id)?;
            }
            let loaded = service.registry().describe_loaded();
            emit(format, &loaded, ModelsReport::new(&loaded))
        }
    }
}

fn service(cli: &Cli) -> Result<ScreeningService> {
    let config = cli.global.service_config();
    info!(
        "Models directory: {} (device {})",
        config.models_dir.display(),
        config.device
    );
    ScreeningService::new(config)
}

fn export_png(file: &Path, out: &Path) -> Result<()> {
    if !decoder::is_dicom(file) {
        return Err(RetinaError::UnsupportedInput(format!(
            "{} is not a DICOM file",
            file.display()
        )));
    }
    let png = decoder::dicom_to_png(file)?;
    std::fs::write(out, png)?;
    info!("Wrote {}", out.display());
    Ok(())
}

fn emit<T: Serialize, R: Display>(format: OutputFormat, value: &T, report: R) -> Result<()> {
    match format {
        OutputFormat::Text => println!("{}", report),
        OutputFormat::Json => {
            println!("{}", serde_json::to_string_pretty(value)?);
        }
    }
    Ok(())
}
