use std::sync::Arc;
use std::time::Duration;

use clap::{Parser, Subcommand};
use tracing::{error, info, warn};

use metabroker::brokers::{self, AlerceClient, AtlasClient};
use metabroker::catalog::{self, CatalogCache};
use metabroker::config::{self, Config};
use metabroker::logging;
use metabroker::lookup::TransientLookup;
use metabroker::observability;
use metabroker::orchestrator::BrokerOrchestrator;
use metabroker::server::{self, AppState};
use metabroker::types::{
    BrokerObservation, BrokerOutcome, CacheProvenance, TnsCredentials, TransientTarget,
};

#[derive(Parser)]
#[command(name = "metabroker")]
#[command(about = "Transient metadata aggregator for the TNS catalog and alert brokers")]
#[command(version = "0.1.0")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Download the TNS public catalog into the local cache
    Refresh {
        /// TNS bot or user id (overrides TNS_ID)
        #[arg(long)]
        tns_id: Option<String>,
        /// TNS bot or user name (overrides TNS_USERNAME)
        #[arg(long)]
        tns_username: Option<String>,
    },
    /// Show the state of the local catalog cache
    Info,
    /// Resolve a transient name against the cached catalog
    Lookup {
        /// IAU name or survey designation, e.g. 2023ixf or ZTF23aaklqou
        name: String,
    },
    /// Query every configured broker for one transient
    Search {
        /// IAU name or survey designation
        name: String,
        /// Print the full report as JSON
        #[arg(long)]
        json: bool,
    },
    /// Fetch ATLAS forced photometry for a transient
    Photometry {
        /// IAU name or survey designation
        name: String,
        /// Earliest MJD to request (defaults to three years back)
        #[arg(long)]
        mjd_min: Option<f64>,
        /// Print the photometry as JSON
        #[arg(long)]
        json: bool,
    },
    /// Run the HTTP API server
    Serve {
        /// Port to run the server on
        #[arg(short, long, default_value = "3000")]
        port: u16,
    },
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    dotenv::dotenv().ok();

    // Initialize logging
    logging::init_logging();

    let cli = Cli::parse();

    let config = Config::load()?;
    let cache = Arc::new(CatalogCache::from_config(&config)?);
    let lookup = TransientLookup::new(cache.clone());

    match cli.command {
        Commands::Refresh {
            tns_id,
            tns_username,
        } => {
            println!("🔄 Refreshing TNS catalog cache...");

            let credentials = match (tns_id, tns_username) {
                (Some(tns_id), Some(tns_username)) => Some(TnsCredentials {
                    tns_id,
                    tns_username,
                }),
                _ => config::tns_credentials_from_env(),
            };
            if credentials.is_none() {
                println!("⚠️  No TNS credentials; downloading with the anonymous user agent");
            }

            match cache.refresh(credentials.as_ref()).await {
                Ok(summary) => {
                    if summary.reused {
                        println!("✅ Catalog already current for {}", summary.download_date);
                    } else {
                        println!("✅ Catalog refreshed: {} objects", summary.count);
                        println!("   Download date: {}", summary.download_date);
                    }
                }
                Err(e) => {
                    error!("Catalog refresh failed: {}", e);
                    println!("❌ Catalog refresh failed: {}", e);
                }
            }
        }
        Commands::Info => {
            let info = cache.get_cache_info().await?;
            if !info.exists {
                println!("📭 No catalog cache present. Run `metabroker refresh` first.");
                return Ok(());
            }
            println!("📚 TNS catalog cache:");
            if let Some(total) = info.total_objects {
                println!("   Objects: {total}");
            }
            if let Some(date) = info.download_date {
                println!("   Download date: {date}");
            }
            if let Some(age) = info.age_days {
                println!("   Age: {age} day(s)");
            }
            println!("   Current: {}", if info.is_current { "yes" } else { "no" });
            if let Some(source) = info.source {
                let backend = match source {
                    CacheProvenance::File => "file",
                    CacheProvenance::Memory => "memory",
                };
                println!("   Backend: {backend}");
            }
        }
        Commands::Lookup { name } => match lookup.resolve(&name).await? {
            Some(record) => {
                println!("🔭 {}", record.name);
                if let Some(object_type) = &record.object_type {
                    println!("   Type: {object_type}");
                }
                if let (Some(ra), Some(dec)) = (&record.ra, &record.declination) {
                    println!("   Position: {ra} {dec}");
                }
                if let Some(coordinates) = record.coordinates() {
                    println!(
                        "   Decimal: {:.6} {:+.6}",
                        coordinates.ra, coordinates.dec
                    );
                }
                if let Some(redshift) = &record.redshift {
                    println!("   Redshift: {redshift}");
                }
                if let Some(date) = &record.discovery_date {
                    println!("   Discovered: {date}");
                }
                if let Some(ztf_id) = record.ztf_id() {
                    println!("   ZTF id: {ztf_id}");
                }
                let aliases = record.aliases();
                if !aliases.is_empty() {
                    println!("   Aliases: {}", aliases.join(", "));
                }
            }
            None => {
                println!("❌ No catalog record for '{name}'");
            }
        },
        Commands::Search { name, json } => {
            let record = match lookup.resolve(&name).await? {
                Some(record) => record,
                None => {
                    println!("❌ No catalog record for '{name}'");
                    return Ok(());
                }
            };
            let target = TransientTarget::from_record(&record);
            info!(name = %target.name, "querying brokers");

            let clients =
                brokers::create_clients(&config.brokers, config::lasair_token_from_env())?;
            let orchestrator = BrokerOrchestrator::new(
                clients,
                Duration::from_secs(config.brokers.timeout_seconds),
            );
            let report = orchestrator.query_all(&target).await;

            if json {
                println!("{}", serde_json::to_string_pretty(&report)?);
                return Ok(());
            }

            println!("\n📊 Broker results for {}:", report.target.name);
            for (broker, outcome) in &report.outcomes {
                match outcome {
                    BrokerOutcome::Observation { observation } => {
                        println!(
                            "   ✅ {}: {}",
                            broker.display_name(),
                            summarize_observation(observation)
                        );
                    }
                    BrokerOutcome::NoMatch => {
                        println!("   ➖ {}: no match", broker.display_name());
                    }
                    BrokerOutcome::Unavailable { reason } => {
                        println!("   ⚠️  {}: skipped ({reason})", broker.display_name());
                    }
                    BrokerOutcome::Failed { error } => {
                        warn!(broker = broker.as_str(), error, "broker query failed");
                        println!("   ❌ {}: {error}", broker.display_name());
                    }
                }
            }
            println!(
                "   {} observation(s) in {} ms",
                report.observation_count(),
                report.elapsed_ms
            );
        }
        Commands::Photometry {
            name,
            mjd_min,
            json,
        } => {
            let record = match lookup.resolve(&name).await? {
                Some(record) => record,
                None => {
                    println!("❌ No catalog record for '{name}'");
                    return Ok(());
                }
            };
            let coordinates = match record.coordinates() {
                Some(coordinates) => coordinates,
                None => {
                    println!("❌ {} has no usable coordinates", record.name);
                    return Ok(());
                }
            };
            let credentials = match config::atlas_credentials_from_env() {
                Some(credentials) => credentials,
                None => {
                    println!("❌ ATLAS credentials not configured; set ATLAS_USERNAME and ATLAS_PASSWORD");
                    return Ok(());
                }
            };

            println!(
                "🛰️  Requesting ATLAS forced photometry for {} ({:.4} {:+.4})...",
                record.name, coordinates.ra, coordinates.dec
            );
            let atlas = AtlasClient::new(&config.atlas)?;
            match atlas.photometry(&credentials, coordinates, mjd_min).await {
                Ok(result) => {
                    if json {
                        println!("{}", serde_json::to_string_pretty(&result)?);
                        return Ok(());
                    }
                    println!("✅ {} photometry point(s)", result.data.len());
                    if let (Some(first), Some(last)) = (result.data.first(), result.data.last()) {
                        println!("   MJD range: {:.2} to {:.2}", first.mjd, last.mjd);
                    }
                }
                Err(e) => {
                    error!("ATLAS photometry failed: {}", e);
                    println!("❌ ATLAS photometry failed: {}", e);
                }
            }
        }
        Commands::Serve { port } => {
            println!("🚀 Starting Meta-Broker API server on port {port}...");

            observability::metrics::init().unwrap_or_else(|e| {
                eprintln!("Warning: Failed to initialize metrics: {}", e);
            });

            let tns_credentials = config::tns_credentials_from_env();
            if tns_credentials.is_none() {
                println!("⚠️  No TNS credentials; catalog refreshes use the anonymous user agent");
            }
            let atlas_credentials = config::atlas_credentials_from_env();

            let info = cache.get_cache_info().await?;
            if catalog::refresh_warranted(&info, tns_credentials.is_some()) {
                println!("🔄 Catalog cache is stale; refreshing in the background...");
                let cache = cache.clone();
                let credentials = tns_credentials.clone();
                tokio::spawn(async move {
                    if let Err(e) = cache.refresh(credentials.as_ref()).await {
                        error!("Startup catalog refresh failed: {}", e);
                    }
                });
            }

            let clients =
                brokers::create_clients(&config.brokers, config::lasair_token_from_env())?;
            let orchestrator = BrokerOrchestrator::new(
                clients,
                Duration::from_secs(config.brokers.timeout_seconds),
            );
            let state = Arc::new(AppState {
                cache,
                lookup,
                orchestrator,
                alerce: AlerceClient::new(&config.brokers)?,
                atlas: AtlasClient::new(&config.atlas)?,
                tns_credentials,
                atlas_credentials,
            });

            server::start_server(state, port).await?;
        }
    }
    Ok(())
}

/// One-line summary of a normalized observation for terminal output.
fn summarize_observation(observation: &BrokerObservation) -> String {
    let mut parts = Vec::new();
    if let Some(id) = observation
        .object_id
        .as_deref()
        .or(observation.ztf_object_id.as_deref())
    {
        parts.push(id.to_string());
    }
    if let Some(detections) = observation.detections {
        parts.push(format!("{detections} detection(s)"));
    }
    if let Some(magnitude) = observation.latest_magnitude {
        match &observation.latest_filter {
            Some(filter) => parts.push(format!("latest {magnitude:.2} {filter}")),
            None => parts.push(format!("latest {magnitude:.2}")),
        }
    }
    if let Some(classification) = &observation.classification {
        match observation.classification_probability {
            Some(probability) => {
                parts.push(format!("{classification} ({probability:.0}%)"))
            }
            None => parts.push(classification.clone()),
        }
    }
    if parts.is_empty() {
        parts.push("matched".to_string());
    }
    parts.join(", ")
}
