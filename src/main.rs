use anyhow::{Context, Result, bail};
use clap::{Parser, Subcommand};
use floodmap::prelude::*;
use std::{fs::File, path::PathBuf};

#[derive(Parser)]
#[command(author, version, about, long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Classify flooded buildings for every configured date
    Assess {
        #[arg(short, long, value_name = "FILE", default_value = "floodmap.toml")]
        config: PathBuf,
        /// Date to summarise and export, defaults to the earliest available one
        #[arg(short, long)]
        date: Option<String>,
        /// Write the flooded buildings of the selected date to this CSV file
        #[arg(short, long, value_name = "FILE")]
        export: Option<PathBuf>,
        /// Export building centroids instead of full footprints
        #[arg(long)]
        centroids: bool,
    },
}

fn main() -> Result<()> {
    pretty_env_logger::init();

    let cli = Cli::parse();

    match &cli.command {
        Commands::Assess {
            config,
            date,
            export,
            centroids,
        } => {
            let pipeline_config = PipelineConfig::load_from_file(config)
                .with_context(|| format!("Failed to load configuration {:?}", config))?;
            let outcome = assess(&pipeline_config)?;

            for warning in outcome.warnings() {
                println!("warning: {}", warning);
            }

            let assessment = match outcome {
                AssessmentOutcome::Available(assessment) => assessment,
                AssessmentOutcome::NoData { .. } => {
                    println!("No flood data available for the configured dates.");
                    return Ok(());
                }
            };

            println!("Flooded buildings per date:");
            for point in assessment.trend() {
                println!("  {}  {}", point.date, point.flooded);
            }

            let selected = match date {
                Some(date) => date.as_str(),
                None => match assessment.sorted_dates().first() {
                    Some(first) => *first,
                    None => return Ok(()),
                },
            };
            let Some(summary) = assessment.summary(selected) else {
                bail!("No flood results for {selected}, available dates: {:?}", assessment.sorted_dates());
            };

            println!("Summary for {}:", summary.date);
            println!("  buildings in region   {}", summary.total_buildings);
            println!("  flooded buildings     {}", summary.flooded);
            println!("  percent affected      {:.2}%", summary.percent_affected);
            if let Some(area) = summary.mean_footprint_area {
                println!("  mean footprint area   {:.3e}", area);
            }

            if let (Some(path), Some(flooded)) = (export, assessment.flooded(selected)) {
                let table = if *centroids { flooded.to_centroids() } else { flooded.clone() };
                let file = File::create(path).with_context(|| format!("Failed to create {:?}", path))?;
                table
                    .write_csv(file)
                    .with_context(|| format!("Failed to write {:?}", path))?;
                println!("Exported {} buildings to {:?}", table.len(), path);
            }
        }
    }

    Ok(())
}
