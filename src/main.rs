use anyhow::Context;
use anyhow::Result;
use clap::Parser;
use env_logger::Env;
use log::info;
use roster_sync::pipeline::run_sources;
use roster_sync::pipeline::Options;
use roster_sync::Fill;
use roster_sync::Source;
use std::path::PathBuf;
use std::process::ExitCode;

#[derive(Parser, Debug)]
#[command(name = "roster-sync")]
#[command(about = "Mark training completions from an export onto a master roster")]
#[command(version)]
struct Args {
    #[arg(long, help = "Master roster workbook (.xlsx, .xls or .ods)")]
    master: PathBuf,
    #[arg(long, help = "Training export workbook (.xlsx, .xls or .ods)")]
    export: PathBuf,
    #[arg(long, help = "Master column that receives \"Completed\"")]
    training: String,
    #[arg(long, value_name = "COL", help = "First column of the highlight range [default: the first master column]")]
    range_start: Option<String>,
    #[arg(long, value_name = "COL", help = "Last column of the highlight range [default: the last master column]")]
    range_end: Option<String>,
    #[arg(long, value_name = "COL", help = "Master first-name column [default: guessed from \"first\"]")]
    master_first: Option<String>,
    #[arg(long, value_name = "COL", help = "Master last-name column [default: guessed from \"last\"]")]
    master_last: Option<String>,
    #[arg(long, value_name = "COL", help = "Export first-name column [default: guessed from \"first\"]")]
    export_first: Option<String>,
    #[arg(long, value_name = "COL", help = "Export last-name column [default: guessed from \"last\"]")]
    export_last: Option<String>,
    #[arg(long, value_name = "COL", help = "Export status column [default: guessed from \"status\"]")]
    status: Option<String>,
    #[arg(long, value_name = "GLOB", help = "Master sheet name pattern [default: the first sheet]")]
    master_sheet: Option<String>,
    #[arg(long, value_name = "GLOB", help = "Export sheet name pattern [default: the first sheet]")]
    export_sheet: Option<String>,
    #[arg(long, value_name = "RRGGBB", default_value = "FFFF00", help = "Fill color of highlighted rows")]
    fill: String,
    #[arg(long, value_name = "N", help = "Print the first N updated rows")]
    preview: Option<usize>,
    #[arg(long, short, default_value = "updated_training_file.xlsx", help = "Output workbook")]
    output: PathBuf,
}

impl Args {
    fn options(&self) -> Options {
        Options {
            training: self.training.to_owned(),
            range_start: self.range_start.clone(),
            range_end: self.range_end.clone(),
            master_first: self.master_first.clone(),
            master_last: self.master_last.clone(),
            export_first: self.export_first.clone(),
            export_last: self.export_last.clone(),
            status: self.status.clone(),
            master_sheet: self.master_sheet.clone(),
            export_sheet: self.export_sheet.clone(),
        }
    }
}

/// Runs one reconciliation. The output file is only written once the whole workbook is built.
fn run(args: &Args) -> Result<()> {
    let fill: Fill = args.fill.parse()?;
    let outcome = run_sources(&args.options(), Source::file(&args.master), Source::file(&args.export))?;
    let bytes = outcome.to_xlsx_bytes(fill)?;
    std::fs::write(&args.output, bytes)
        .with_context(|| format!("Failed to write {}", args.output.display()))?;
    info!("wrote {}", args.output.display());

    if let Some(limit) = args.preview {
        println!("{}", outcome.table.preview(limit));
        println!();
    }
    println!("{}", outcome.statistics());
    Ok(())
}

fn main() -> ExitCode {
    env_logger::Builder::from_env(Env::default().default_filter_or("info")).init();
    let args = Args::parse();
    match run(&args) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("Error: {:#}", e);
            ExitCode::FAILURE
        }
    }
}
