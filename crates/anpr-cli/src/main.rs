mod commands;
mod export;
mod logging;
mod progress;

use std::io::{self, Write};
use std::path::Path;
use std::process;
use std::sync::Arc;

use anpr_core::retention::scheduler::run_timer;
use anpr_core::retention::LocalAssetStore;
use anpr_core::{
    AppConfig, Database, NewReport, Report, ReportFilter, ReportService, ReportUpdate,
    RetentionScheduler,
};
use clap::{CommandFactory, Parser};
use colored::*;
use commands::{AddArgs, Cli, Commands, FilterArgs, ListArgs, UpdateArgs};
use dotenv::dotenv;
use progress::CliReporter;
use tokio::io::AsyncBufReadExt;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

fn main() {
    dotenv().ok();

    let _guard = logging::init_logger();

    let config = match anpr_core::config::load_configuration() {
        Ok(config) => config,
        Err(err) => {
            error!("Error loading configuration: {}", err);
            process::exit(1);
        }
    };

    let args = Cli::parse();

    let result = match args.command {
        Some(Commands::Add(add)) => run_add(&config, add),
        Some(Commands::List(list)) => run_list(&config, list),
        Some(Commands::Get { id }) => {
            service(&config).and_then(|svc| Ok(print_json(&svc.get(id)?)?))
        }
        Some(Commands::Update(update)) => run_update(&config, update),
        Some(Commands::Delete { id }) => service(&config).and_then(|svc| {
            let removed = svc.delete(id)?;
            println!("Report {} deleted ({})", removed.id, removed.number_plate);
            Ok(())
        }),
        Some(Commands::Export(export)) => run_export(&config, &export.filter, &export.output),
        Some(Commands::Sweep { day, json }) => run_sweep(&config, day, json),
        Some(Commands::Serve) => run_serve(&config),
        Some(Commands::PrintConfig) => {
            println!("Configuration: {:?}", config);
            Ok(())
        }
        Some(Commands::TruncateDb) => run_truncate(&config),
        None => {
            let _ = Cli::command().print_long_help();
            Ok(())
        }
    };

    if let Err(err) = result {
        error!("Error: {:#}", err);
        process::exit(1);
    }
}

fn open_database(config: &AppConfig) -> anyhow::Result<Arc<Database>> {
    Ok(Arc::new(Database::open(&config.database_path)?))
}

fn build_scheduler(
    config: &AppConfig,
    db: Arc<Database>,
    reporter: Option<Arc<CliReporter>>,
) -> Arc<RetentionScheduler> {
    let assets = Arc::new(LocalAssetStore::from_config(config));
    let scheduler = RetentionScheduler::new(db, assets, config.retention.clone());
    match reporter {
        Some(reporter) => Arc::new(scheduler.with_reporter(reporter)),
        None => Arc::new(scheduler),
    }
}

fn service(config: &AppConfig) -> anyhow::Result<ReportService> {
    let db = open_database(config)?;
    let scheduler = build_scheduler(config, Arc::clone(&db), None);
    let assets = Arc::new(LocalAssetStore::from_config(config));
    let service = ReportService::new(db, assets, config.retention.clone());
    Ok(service.with_scheduler(scheduler))
}

fn to_filter(filter: &FilterArgs, offset: i64, limit: Option<i64>) -> ReportFilter {
    ReportFilter {
        day: filter.day,
        device_name: filter.device.clone(),
        plate: filter.plate.clone(),
        offset,
        limit,
    }
}

fn print_json<T: serde::Serialize>(value: &T) -> anyhow::Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

fn run_add(config: &AppConfig, args: AddArgs) -> anyhow::Result<()> {
    let svc = service(config)?;
    let report = svc.ingest(NewReport {
        number_plate: args.plate,
        original_number_plate: args.original_plate,
        vehicle_type: args.vehicle_type,
        device_name: args.device,
        date: args.date,
        number_plate_image: args.plate_image,
        vehicle_image: args.vehicle_image,
    })?;
    println!(
        "Report {} added: {}",
        format!("{}", report.id).green(),
        report.number_plate
    );
    if let Some(summary) = svc.scheduler().and_then(|s| s.last_summary()) {
        println!("Retention: {}", summary.message);
    }
    Ok(())
}

fn run_list(config: &AppConfig, args: ListArgs) -> anyhow::Result<()> {
    let svc = service(config)?;
    let (reports, total) = svc.list(&to_filter(&args.filter, args.offset, args.limit))?;
    if args.json {
        return print_json(&serde_json::json!({ "total": total, "reports": reports }));
    }
    for report in &reports {
        print_row(report);
    }
    println!("{} of {} reports", reports.len(), format!("{}", total).cyan());
    Ok(())
}

fn print_row(report: &Report) {
    println!(
        "{:>6}  {}  {:<12} {:<12} {}",
        report.id,
        report.date.format("%Y-%m-%d %H:%M:%S"),
        report.number_plate,
        report.vehicle_type,
        report.device_name
    );
}

fn run_update(config: &AppConfig, args: UpdateArgs) -> anyhow::Result<()> {
    let svc = service(config)?;
    let update = ReportUpdate {
        number_plate: args.plate,
        vehicle_type: args.vehicle_type,
        device_name: args.device,
        number_plate_image: args.plate_image,
        vehicle_image: args.vehicle_image,
    };
    print_json(&svc.update(args.id, &update)?)
}

fn run_export(config: &AppConfig, filter: &FilterArgs, output: &str) -> anyhow::Result<()> {
    let svc = service(config)?;
    let (reports, _) = svc.list(&to_filter(filter, 0, None))?;
    let written = export::write_csv(&reports, Path::new(output))?;
    info!("{} reports exported to {}", written, output);
    Ok(())
}

fn run_sweep(
    config: &AppConfig,
    day: Option<chrono::NaiveDate>,
    json: bool,
) -> anyhow::Result<()> {
    let db = open_database(config)?;
    let reporter = (!json).then(|| Arc::new(CliReporter::new()));
    let scheduler = build_scheduler(config, db, reporter);
    let summary = scheduler.run_manual(day);
    if json {
        print_json(&summary)?;
    }
    if !summary.succeeded {
        anyhow::bail!("{}", summary.message);
    }
    Ok(())
}

/// Timer-driven retention plus NDJSON ingestion from stdin until EOF or Ctrl-C.
fn run_serve(config: &AppConfig) -> anyhow::Result<()> {
    let runtime = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()?;

    runtime.block_on(async {
        let svc = Arc::new(service(config)?);
        let cancel = CancellationToken::new();

        let timer = match svc.scheduler() {
            Some(scheduler) if config.retention.enabled => Some(tokio::spawn(run_timer(
                Arc::clone(scheduler),
                cancel.clone(),
            ))),
            _ => {
                info!("Automatic retention disabled; only manual sweeps will run");
                None
            }
        };

        let mut lines = tokio::io::BufReader::new(tokio::io::stdin()).lines();
        let shutdown = tokio::signal::ctrl_c();
        tokio::pin!(shutdown);

        loop {
            tokio::select! {
                line = lines.next_line() => {
                    let line = match line? {
                        Some(line) => line,
                        None => break,
                    };
                    if line.trim().is_empty() {
                        continue;
                    }
                    let report: NewReport = match serde_json::from_str(&line) {
                        Ok(report) => report,
                        Err(err) => {
                            warn!("Skipping malformed report: {}", err);
                            continue;
                        }
                    };
                    let svc = Arc::clone(&svc);
                    match tokio::task::spawn_blocking(move || svc.ingest(report)).await? {
                        Ok(stored) => println!("{}", serde_json::to_string(&stored)?),
                        Err(err) => warn!("Report rejected: {}", err),
                    }
                }
                _ = &mut shutdown => {
                    info!("Interrupted, shutting down");
                    break;
                }
            }
        }

        cancel.cancel();
        if let Some(timer) = timer {
            timer.await?;
        }
        Ok::<(), anyhow::Error>(())
    })
}

fn run_truncate(config: &AppConfig) -> anyhow::Result<()> {
    match prompt_confirm(
        "Are you SURE you want to COMPLETELY DELETE the Database?",
        Some(false),
    ) {
        Ok(true) => {
            open_database(config)?.truncate_all()?;
            println!("All tables truncated");
            Ok(())
        }
        _ => process::exit(0),
    }
}

fn prompt_confirm(prompt: &str, default: Option<bool>) -> io::Result<bool> {
    let mut input = String::new();

    loop {
        input.clear();

        match default {
            Some(true) => print!("{} (Y/n): ", prompt),
            Some(false) | None => print!("{} (y/N): ", prompt),
        }
        io::stdout().flush()?;

        io::stdin().read_line(&mut input)?;

        match input.trim().to_uppercase().as_str() {
            "Y" => return Ok(true),
            "N" => return Ok(false),
            "" => match default {
                Some(default) => return Ok(default),
                None => continue,
            },
            _ => continue,
        }
    }
}
