use clap::{Parser, Subcommand};
use marquee_common::{LibraryId, MediaId, MediaType, ScanJobId};
use std::path::PathBuf;

#[derive(Parser)]
#[command(name = "marquee")]
#[command(author, version, about = "Durable metadata enrichment queue for media libraries")]
pub struct Cli {
    /// Path to config file
    #[arg(short, long, global = true)]
    pub config: Option<PathBuf>,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    pub verbose: bool,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Recover orphaned jobs and run the queue consumer until Ctrl-C
    Start,

    /// Push a metadata job onto the queue
    Enqueue {
        #[arg(long)]
        media_id: MediaId,

        #[arg(long)]
        library_id: LibraryId,

        #[arg(long)]
        title: String,

        #[arg(long)]
        year: Option<i32>,

        #[arg(long, default_value = "movie")]
        media_type: MediaType,

        /// Fetch even if the record already looks complete
        #[arg(long)]
        rescan: bool,

        /// Scan job to count the outcome against
        #[arg(long)]
        scan_job_id: Option<ScanJobId>,
    },

    /// Move jobs left in the processing list back to the ready list
    Recover,

    /// Show queue lengths and, optionally, a scan job's progress
    Status {
        #[arg(long)]
        scan_job: Option<ScanJobId>,
    },

    /// Validate configuration file
    Validate {
        /// Config file to validate (uses default if not specified)
        config: Option<PathBuf>,
    },

    /// Display version information
    Version,
}
