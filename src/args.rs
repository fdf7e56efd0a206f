use clap::Parser;

/// This is the consolidation and trust scoring engine of the vote count.
#[derive(Parser, Debug, Clone)]
#[clap(author, version, about, long_about = None)]
pub struct Args {
    /// (file path) The JSON configuration, listing the scoring rules, the scheduler settings and the
    /// data sources. See the manual of the `consolidation` crate for the format.
    #[clap(short, long, value_parser)]
    pub config: String,

    /// (file path) A reference summary in JSON format. If provided, the summary computed after the
    /// last cycle must match it.
    #[clap(short, long, value_parser)]
    pub reference: Option<String>,

    /// (file path, 'stdout' or empty) If specified, the summary is written in JSON format to the given
    /// location.
    #[clap(short, long, value_parser)]
    pub out: Option<String>,

    /// (number or empty) Number of scheduler cycles to run. If not specified, the scheduler runs
    /// until the process is stopped.
    #[clap(long, value_parser)]
    pub cycles: Option<u64>,

    // Other arguments
    /// If passed as an argument, will turn on verbose logging to the standard output.
    #[clap(long, takes_value = false)]
    pub verbose: bool,
}
