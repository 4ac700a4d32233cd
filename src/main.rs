mod args;
mod pipeline;

use clap::Parser;
use log::LevelFilter;

use crate::args::Args;
use crate::pipeline::config_reader;

fn main() {
    let args = Args::parse();

    let mut logger = env_logger::Builder::from_default_env();
    if args.verbose {
        logger.filter_level(LevelFilter::Debug);
    } else {
        logger.filter_level(LevelFilter::Info);
    }
    logger.init();

    let run_actuals = matches!(args.stage.as_str(), "actuals" | "all");
    let run_forecast = matches!(args.stage.as_str(), "forecast" | "all");
    if !run_actuals && !run_forecast {
        eprintln!(
            "Unknown stage {:?}: expected actuals, forecast or all",
            args.stage
        );
        std::process::exit(2);
    }

    let config = match config_reader::read_config(&args.config) {
        Ok(c) => c,
        Err(e) => {
            eprintln!("Error loading configuration: {}", e);
            std::process::exit(2);
        }
    };

    println!("Market Volume Pipeline");
    println!("----------------------");
    println!("Configuration: {}", args.config);
    println!("Source directories: {}", config.source_dirs.join(", "));
    println!("----------------------");

    let mut success = true;

    if run_actuals {
        match pipeline::run_actuals(&config) {
            Ok(report) => {
                println!("Actuals stage:");
                println!("  - Processed {} extract files", report.files_processed);
                println!(
                    "  - {} regions over {} months",
                    report.regions, report.months
                );
                println!("  - Output saved to {}", report.output_file.display());
            }
            Err(e) => {
                eprintln!("FAILED: actuals stage: {}", e);
                success = false;
            }
        }
    }

    if success && run_forecast {
        let summary_out = args.out.as_deref().map(std::path::Path::new);
        let reference = args.reference.as_deref().map(std::path::Path::new);
        match pipeline::run_forecast(&config, summary_out, reference) {
            Ok(report) => {
                println!("Forecast stage:");
                println!("  - Latest actual data: {}", report.latest_actual);
                println!("  - Forecasted {} months", report.forecast_months);
                if report.skipped_months > 0 {
                    println!(
                        "  - Skipped {} months with missing reference data",
                        report.skipped_months
                    );
                }
                println!("  - Output saved to {}", report.output_file.display());
            }
            Err(e) => {
                eprintln!("FAILED: forecast stage: {}", e);
                success = false;
            }
        }
    }

    println!("----------------------");
    if success {
        println!("SUCCESS: pipeline complete");
    } else {
        println!("FAILED: the run encountered errors, check the log for details");
        std::process::exit(1);
    }
}
