use chrono::{DateTime, NaiveDate, Utc};
use clap::{Args, Parser, Subcommand};

#[derive(Debug, Parser)]
#[command(name = "anpr")]
#[command(about = "ANPR report store with duplicate retention", long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Option<Commands>,
}

#[derive(Debug, Subcommand)]
pub enum Commands {
    /// Add a report and run the write-triggered retention check
    Add(AddArgs),
    /// List reports, newest first
    List(ListArgs),
    /// Show a single report
    Get { id: i64 },
    /// Edit fields of a report; omitted fields are kept
    Update(UpdateArgs),
    /// Delete a report and its images
    Delete { id: i64 },
    /// Write a report listing to CSV
    Export(ExportArgs),
    /// Run one duplicate sweep now and print its summary
    Sweep {
        /// Day to sweep (YYYY-MM-DD); defaults to today
        #[arg(long)]
        day: Option<NaiveDate>,
        /// Print the summary as JSON
        #[arg(long)]
        json: bool,
    },
    /// Run the retention timer and ingest JSON reports from stdin, one per line
    Serve,
    /// Print configuration values
    PrintConfig,
    /// Truncate all database tables
    TruncateDb,
}

#[derive(Debug, Args)]
pub struct AddArgs {
    #[arg(long)]
    pub plate: String,
    /// Plate exactly as recognized, if different from --plate
    #[arg(long)]
    pub original_plate: Option<String>,
    #[arg(long)]
    pub vehicle_type: String,
    #[arg(long)]
    pub device: String,
    /// Detection time (RFC 3339); defaults to now
    #[arg(long)]
    pub date: Option<DateTime<Utc>>,
    #[arg(long)]
    pub plate_image: String,
    #[arg(long)]
    pub vehicle_image: String,
}

#[derive(Debug, Args)]
pub struct FilterArgs {
    /// Only reports detected on this day (YYYY-MM-DD)
    #[arg(long)]
    pub day: Option<NaiveDate>,
    #[arg(long)]
    pub device: Option<String>,
    /// Substring of the plate
    #[arg(long)]
    pub plate: Option<String>,
}

#[derive(Debug, Args)]
pub struct ListArgs {
    #[command(flatten)]
    pub filter: FilterArgs,
    #[arg(long, default_value_t = 0)]
    pub offset: i64,
    #[arg(long)]
    pub limit: Option<i64>,
    /// Print reports as JSON
    #[arg(long)]
    pub json: bool,
}

#[derive(Debug, Args)]
pub struct UpdateArgs {
    pub id: i64,
    #[arg(long)]
    pub plate: Option<String>,
    #[arg(long)]
    pub vehicle_type: Option<String>,
    #[arg(long)]
    pub device: Option<String>,
    #[arg(long)]
    pub plate_image: Option<String>,
    #[arg(long)]
    pub vehicle_image: Option<String>,
}

#[derive(Debug, Args)]
pub struct ExportArgs {
    #[command(flatten)]
    pub filter: FilterArgs,
    /// Output file
    #[arg(long, short, default_value = "reports.csv")]
    pub output: String,
}
