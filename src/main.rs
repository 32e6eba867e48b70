use std::path::PathBuf;
use std::sync::Arc;

use clap::Parser;
use tracing_subscriber::EnvFilter;

mod cases;
mod config;
mod db;
mod duration;
mod error;
mod models;
mod options;
mod query;
mod registry;
mod report;
mod runner;

use config::Settings;
use db::PgRecordSource;
use registry::CaseRegistry;
use report::CsvSink;
use runner::{Invocation, Runner};

#[derive(Parser)]
#[command(name = "lrs-reports")]
#[command(about = "CSV reports aggregated from learning record store statements", long_about = None)]
struct Cli {
    /// Case to run; leave empty to list the available cases
    case: Option<String>,
    /// Case options: start date, end date and one or more object URLs
    args: Vec<String>,
    /// Directory the CSV files are written to
    #[arg(long)]
    output_dir: Option<PathBuf>,
    /// Locale used for verb and object names
    #[arg(long)]
    locale: Option<String>,
}

fn print_cases(registry: &CaseRegistry) {
    println!("Please specify which case you would like to run!");
    println!();
    println!("Possible cases:");
    for (name, title) in registry.list_all() {
        println!("  {name} : {title}");
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let cli = Cli::parse();
    let registry = CaseRegistry::builtin();

    let Some(case_name) = cli.case.as_deref() else {
        print_cases(&registry);
        return Ok(());
    };

    let invocation = runner::prepare(&registry, case_name, &cli.args).map_err(|err| {
        if err.is_option_error() {
            anyhow::Error::new(err).context(format!("invalid options for case {case_name}"))
        } else {
            err.into()
        }
    })?;
    if let Invocation::Single {
        options: Some(options),
        ..
    } = &invocation
    {
        tracing::info!(options = %serde_json::to_string(options)?, "options resolved");
    }

    let mut settings = Settings::from_env()?;
    if let Some(output_dir) = cli.output_dir {
        settings.output_dir = output_dir;
    }
    if cli.locale.is_some() {
        settings.locale = cli.locale;
    }

    let pool = db::connect(&settings).await?;
    let runner = Runner::new(
        Arc::new(PgRecordSource::new(pool.clone())),
        CsvSink::new(&settings.output_dir),
        settings.base_filter(),
        settings.labels(),
    );

    let outcomes = runner.execute(&registry, invocation).await;
    // every case has finished with the pool by now
    pool.close().await;

    let mut failed = 0usize;
    for outcome in &outcomes {
        match outcome {
            Ok(done) => println!(
                "{}: {} rows written to {}.",
                done.case,
                done.rows,
                done.file.display()
            ),
            Err(err) => {
                eprintln!("{err}");
                failed += 1;
            }
        }
    }

    if failed > 0 {
        anyhow::bail!("{failed} of {} cases failed", outcomes.len());
    }
    Ok(())
}
