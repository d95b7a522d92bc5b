use clap::Parser;

#[derive(Parser, Debug)]
#[command(
    name = "webgraph-stats",
    version,
    about = "Generate the web graph statistics page"
)]
pub struct Cli {
    /// Reuse chart images that already exist instead of rendering them again.
    #[arg(long, default_value_t = false)]
    pub no_plots: bool,
}
