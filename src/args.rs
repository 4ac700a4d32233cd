use clap::Parser;

/// This program aggregates monthly chart volume extracts into an actuals
/// workbook and extrapolates the missing months into a forecast workbook.
#[derive(Parser, Debug, Clone)]
#[clap(author, version, about, long_about = None)]
pub struct Args {
    /// (file path) The JSON run configuration: source directories, month range,
    /// membership reference, output directory and forecast options.
    #[clap(short, long, value_parser)]
    pub config: String,

    /// (actuals, forecast or all) The stage to run. The forecast stage expects the
    /// actuals artifact written by a previous actuals run.
    #[clap(short, long, value_parser, default_value = "all")]
    pub stage: String,

    /// (file path or empty) If specified, the summary of the forecast run will be written
    /// in JSON format to the given location.
    #[clap(short, long, value_parser)]
    pub out: Option<String>,

    /// (file path) A reference summary in JSON format. If provided, the program will
    /// check that the computed forecast summary matches the reference.
    #[clap(short, long, value_parser)]
    pub reference: Option<String>,

    // Other arguments
    /// If passed as an argument, will turn on verbose logging to the standard output.
    #[clap(long, takes_value = false)]
    pub verbose: bool,
}
