use clap::Parser;

/// Replays a DebatePulse dashboard scenario: file uploads and a time-boxed live vote.
#[derive(Parser, Debug, Clone)]
#[clap(author, version, about, long_about = None)]
pub struct Args {
    /// (file path) The JSON file describing the scenario: the poll, the files to upload
    /// and the actions taken by the user over time. See the manual of `debate_session`.
    #[clap(short, long, value_parser)]
    pub config: String,

    /// (file path) A reference summary in JSON format. If provided, debatepulse will
    /// check that the summary of the run matches it.
    #[clap(short, long, value_parser)]
    pub reference: Option<String>,

    /// (file path, 'stdout' or empty) Where the JSON summary of the run is written.
    #[clap(short, long, value_parser)]
    pub out: Option<String>,

    /// If passed, the scenario runs on the wall clock (one second per countdown step)
    /// instead of as fast as possible.
    #[clap(long, takes_value = false)]
    pub realtime: bool,

    // Other arguments
    /// If passed as an argument, will turn on verbose logging to the standard output.
    #[clap(long, takes_value = false)]
    pub verbose: bool,
}
