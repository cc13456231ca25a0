#![forbid(unsafe_code)]

use std::net::SocketAddr;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand, ValueEnum};
use kapp_core::RequestContext;
use kapp_runner::{AppGroupRunner, AppProvider, EnvConfigResolver, ManifestData, RunnerOptions};
use tracing::{error, info};

mod bootstrap;
mod demo;

use bootstrap::MetricsSink;

#[derive(Parser, Debug)]
#[command(name = "kappctl", version, about = "kapp app runner CLI")]
struct Cli {
    /// Output format
    #[arg(short = 'o', long = "output", value_enum, global = true, default_value_t = Output::Human)]
    output: Output,

    /// Namespace used when a request names none
    #[arg(long = "default-namespace", env = "KAPP_DEFAULT_NAMESPACE", global = true)]
    default_namespace: Option<String>,

    /// Log filter directives
    #[arg(long = "log", env = "KAPP_LOG", global = true, default_value = "info")]
    log: String,

    /// Upper bound applied to list page sizes
    #[arg(long = "max-list-limit", env = "KAPP_MAX_LIST_LIMIT", global = true)]
    max_list_limit: Option<u64>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Copy, Clone, Debug, Eq, PartialEq, ValueEnum)]
enum Output {
    Human,
    Json,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Initialize the inventory app and run it until Ctrl-C
    Serve {
        /// Serve Prometheus metrics on this address
        #[arg(long = "metrics-addr", env = "KAPP_METRICS_ADDR")]
        metrics_addr: Option<SocketAddr>,
    },
    /// Run the inventory app in process and exercise admission, store and routes
    Demo {
        #[arg(long = "ns", default_value = "default")]
        namespace: String,
        /// List page size
        #[arg(long = "page-size", default_value_t = 2)]
        page_size: u64,
        /// Include the metrics recorded during the run in the report
        #[arg(long = "show-metrics")]
        show_metrics: bool,
    },
    /// Parse and validate an app manifest
    Manifest {
        /// Path to a manifest YAML file
        #[arg(long = "check")]
        check: String,
    },
}

impl Cli {
    fn runner_options(&self) -> RunnerOptions {
        let mut opts = RunnerOptions::from_env();
        if let Some(ns) = self.default_namespace.as_deref() {
            opts.store = opts.store.with_default_namespace(ns);
        }
        if let Some(limit) = self.max_list_limit {
            opts.store = opts.store.with_max_list_limit(limit);
        }
        opts
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    bootstrap::init_tracing(&cli.log);
    let opts = cli.runner_options();

    match cli.command {
        Commands::Serve { metrics_addr } => {
            bootstrap::init_metrics(metrics_addr.map_or(MetricsSink::Off, MetricsSink::Listen));
            serve(cli.output, opts).await?;
        }
        Commands::Demo { namespace, page_size, show_metrics } => {
            info!(ns = %namespace, page_size, "demo invoked");
            let recorder = bootstrap::init_metrics(if show_metrics { MetricsSink::Capture } else { MetricsSink::Off });
            let ctx = RequestContext::new();
            let mut report = demo::run(&ctx, opts, &namespace, page_size).await?;
            if let Some(handle) = recorder {
                report.metrics = bootstrap::metric_lines(&handle.render(), bootstrap::KAPP_METRICS);
            }
            match cli.output {
                Output::Human => print_report(&report),
                Output::Json => println!("{}", serde_json::to_string_pretty(&report)?),
            }
        }
        Commands::Manifest { check } => {
            let raw = std::fs::read_to_string(&check).with_context(|| format!("reading {}", check))?;
            let data = ManifestData::from_yaml(&raw).with_context(|| format!("parsing {}", check))?;
            let problems = data.validate().err().unwrap_or_default();
            match cli.output {
                Output::Human => {
                    if problems.is_empty() {
                        println!("{} ({}) ok", data.app_name, data.group);
                        for k in data.kinds() {
                            let scope = if k.namespaced() { "namespaced" } else { "cluster" };
                            println!("  {} • {} • {}", k.api_version(), k.kind, scope);
                        }
                    } else {
                        for p in problems.iter() {
                            println!("✗ {}", p);
                        }
                    }
                }
                Output::Json => {
                    let out = serde_json::json!({
                        "app": data.app_name,
                        "group": data.group,
                        "valid": problems.is_empty(),
                        "problems": problems,
                    });
                    println!("{}", serde_json::to_string_pretty(&out)?);
                }
            }
            if !problems.is_empty() {
                anyhow::bail!("{} has {} problem(s)", check, problems.len());
            }
        }
    }
    Ok(())
}

async fn serve(output: Output, opts: RunnerOptions) -> Result<()> {
    let provider: Arc<dyn AppProvider> = Arc::new(demo::InventoryProvider::new()?);
    let runner = Arc::new(AppGroupRunner::new(vec![provider], opts, Arc::new(EnvConfigResolver))?);
    let ctx = RequestContext::new();
    runner.init(&ctx).await?;

    match output {
        Output::Human => {
            for g in runner.groups() {
                println!("{} • {} kinds • {} routes", g.manifest().group, g.kinds().len(), g.routes().len());
            }
        }
        Output::Json => {
            let groups: Vec<_> = runner
                .groups()
                .iter()
                .map(|g| serde_json::json!({ "app": g.name(), "group": g.manifest().group, "routes": g.routes().len() }))
                .collect();
            println!("{}", serde_json::to_string_pretty(&groups)?);
        }
    }

    let handle = {
        let runner = Arc::clone(&runner);
        let ctx = ctx.clone();
        tokio::spawn(async move { runner.run(&ctx).await })
    };
    tokio::select! {
        _ = tokio::signal::ctrl_c() => info!("serve: interrupt received; stopping apps"),
        _ = ctx.cancelled() => {}
    }
    ctx.cancel();
    match handle.await? {
        Ok(()) => info!("serve: apps stopped"),
        Err(e) => {
            error!(error = %e, "serve: app failed");
            return Err(e.into());
        }
    }
    Ok(())
}

fn print_report(report: &demo::DemoReport) {
    println!("created:   {}", report.created.join(", "));
    for r in report.rejected.iter() {
        println!("rejected:  {}", r);
    }
    for c in report.conflicts.iter() {
        println!("conflict:  {}", c);
    }
    for (i, page) in report.pages.iter().enumerate() {
        println!("page {:<4} {}", i + 1, page.join(", "));
    }
    println!("aisle-1:   {}", report.in_aisle.join(", "));
    println!("SKU        QUANTITY  LOCATION");
    if let Some(rows) = report.summary["rows"].as_array() {
        for row in rows {
            let col = |k: &str| row[k].as_str().unwrap_or("-").to_string();
            println!("{:<10} {:<9} {}", col("SKU"), col("Quantity"), col("Location"));
        }
    }
    println!("stats:     {}", report.stats);
    for line in report.metrics.iter() {
        println!("metric:    {}", line);
    }
}
