use anyhow::{Context, Result};
use clap::Parser;
use std::fs::File;
use std::path::PathBuf;
use std::sync::Mutex;
use tracing_subscriber::EnvFilter;

use hopwatch::cli::Args;
use hopwatch::lookup::geo::{ASN_DB_FILE, CITY_DB_FILE, find_database};
use hopwatch::lookup::{GeoLocator, Locator, NoLocator};
use hopwatch::prefs::Prefs;
use hopwatch::probe::AnyProber;
use hopwatch::resolve::resolve_target;
use hopwatch::state::{Session, Target};
use hopwatch::trace::RoundDriver;
use hopwatch::tui::CrosstermSink;

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    let target = match args.require_target() {
        Ok(target) => target,
        Err(usage) => {
            eprintln!("{}", usage);
            std::process::exit(1);
        }
    };

    let prefs = Prefs::load()?;
    let config = args.to_config(&prefs);
    if let Err(e) = Args::validate(&config) {
        eprintln!("Error: {}", e);
        std::process::exit(1);
    }

    configure_logging(&args)?;

    let resolved = match resolve_target(&target) {
        Ok(ip) => ip,
        Err(e) => {
            println!("{}", e);
            std::process::exit(1);
        }
    };
    tracing::debug!(host = %target, %resolved, "target resolved");

    let locator = build_locator(&args, &prefs, config.geo_enabled);
    let prober = AnyProber::select(config.backend, resolved)?;
    let session = Session::new(Target::new(target, resolved), config);

    let mut sink = CrosstermSink::stdout();
    sink.enter().context("Failed to prepare terminal")?;

    let mut driver = RoundDriver::new(prober, session, locator, sink);
    let outcome = tokio::select! {
        result = driver.run() => result,
        _ = tokio::signal::ctrl_c() => {
            tracing::info!("interrupted");
            Ok(())
        }
    };

    // Leave the shell prompt below the table
    CrosstermSink::stdout().leave(driver.next_row()).ok();

    outcome
}

/// Send tracing output to a file when asked; the terminal belongs to the table
fn configure_logging(args: &Args) -> Result<()> {
    let Some(path) = &args.log_file else {
        return Ok(());
    };

    let file = File::create(path)
        .with_context(|| format!("Failed to create log file: {}", path.display()))?;
    let filter = EnvFilter::try_new(&args.log_filter)
        .with_context(|| format!("Invalid log filter: {}", args.log_filter))?;

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(Mutex::new(file))
        .with_ansi(false)
        .init();
    Ok(())
}

/// GeoIP databases from the command line, config file or usual locations
fn build_locator(args: &Args, prefs: &Prefs, enabled: bool) -> Box<dyn Locator> {
    if !enabled {
        return Box::new(NoLocator);
    }

    let pick = |cli: &Option<PathBuf>, file: &Option<PathBuf>, name: &str| {
        cli.clone()
            .or_else(|| file.clone())
            .or_else(|| find_database(name))
    };
    let city = pick(&args.geoip_city, &prefs.geoip_city, CITY_DB_FILE);
    let asn = pick(&args.geoip_asn, &prefs.geoip_asn, ASN_DB_FILE);

    match GeoLocator::open(city.as_deref(), asn.as_deref()) {
        Ok(locator) if locator.is_empty() => {
            tracing::warn!("no GeoLite2 databases found, location lookups disabled");
            Box::new(NoLocator)
        }
        Ok(locator) => Box::new(locator),
        Err(e) => {
            tracing::warn!(error = %e, "failed to open GeoLite2 database, location lookups disabled");
            Box::new(NoLocator)
        }
    }
}
