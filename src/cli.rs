use std::path::PathBuf;

use clap::{Parser, Subcommand};

#[derive(Parser)]
#[command(name = "sus", about = "A polite, resumable, concurrent web crawler")]
pub struct Cli {
    /// Path to the TOML crawl configuration
    #[arg(short, long, default_value = "config/default.toml")]
    pub config: PathBuf,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Run (or resume) a crawl to completion
    Crawl {
        /// Number of pipelined workers pulling from the frontier
        #[arg(short, long, default_value_t = 16)]
        workers: usize,
    },
    /// Print checkpoint stats without crawling
    Status,
}
