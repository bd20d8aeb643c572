use clap::Subcommand;
use std::path::PathBuf;

#[derive(Subcommand)]
pub enum Commands {
    /// Fetch every ID from the input file and write batch artifacts
    Crawl {
        #[arg(long, help = "CSV file with an id column")]
        input: Option<PathBuf>,

        #[arg(long, help = "Only crawl the first N IDs")]
        limit: Option<usize>,

        #[arg(long, help = "Directory for products_*.json artifacts")]
        output: Option<PathBuf>,

        #[arg(long, help = "Maximum concurrent requests")]
        concurrency: Option<usize>,

        #[arg(long, help = "IDs per batch artifact")]
        batch_size: Option<usize>,
    },
    /// Print totals and the failure breakdown of written artifacts
    Summary {
        #[arg(long, help = "Artifact directory (defaults to the configured output_dir)")]
        dir: Option<PathBuf>,
    },
}
