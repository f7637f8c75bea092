//! Loadcache - load resources through the shared document cache

use anyhow::Result;
use clap::Parser;
use loadcache_core::{Cache, DocLoader, ResourceHandle, ResourceKind};
use loadcache_transport::{CachePolicy, StreamingTransport};
use metrics_exporter_prometheus::PrometheusBuilder;
use std::sync::Arc;
use tracing::{info, warn};
use tracing_subscriber::{EnvFilter, fmt, prelude::*};
use url::Url;

mod config;
mod report;

use config::{Config, LoggingConfig};
use report::{Reporter, ResourceOutcome};

/// Loadcache - fetch resources through a shared, size-bounded cache
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Resource URLs, resolved against --base when relative
    urls: Vec<String>,

    /// Configuration file path
    #[arg(short, long, default_value = "loadcache.toml", env = "LOADCACHE_CONFIG")]
    config: String,

    /// Revalidation policy for the document
    #[arg(short, long)]
    policy: Option<CachePolicy>,

    /// Cache budget in bytes
    #[arg(short, long)]
    budget: Option<usize>,

    /// Kind of resource to request
    #[arg(short, long, default_value = "stylesheet")]
    kind: ResourceKind,

    /// Document URL used for relative references and as referrer
    #[arg(long)]
    base: Option<Url>,

    /// Do not fetch images automatically
    #[arg(long)]
    no_images: bool,

    /// Print the effective configuration as TOML and exit
    #[arg(long)]
    print_config: bool,

    /// Write the effective configuration to a file
    #[arg(long)]
    save_config: Option<String>,

    /// Print Prometheus metrics after loading
    #[arg(long)]
    metrics: bool,
}

impl Args {
    fn apply(&self, config: &mut Config) {
        if let Some(policy) = self.policy {
            config.cache.default_policy = policy;
        }
        if let Some(budget) = self.budget {
            config.cache.max_size = budget;
        }
        if self.no_images {
            config.document.autoload_images = false;
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    let mut config = Config::load(&args.config)?;
    args.apply(&mut config);

    if args.print_config {
        print!("{}", config.to_toml()?);
        return Ok(());
    }

    init_logging(&config.logging);

    info!("Starting loadcache v{}", env!("CARGO_PKG_VERSION"));

    if let Some(path) = &args.save_config {
        config.save(path)?;
    }

    let metrics = if args.metrics {
        Some(PrometheusBuilder::new().install_recorder()?)
    } else {
        None
    };

    let transport = StreamingTransport::from_config(&config.transport)?;
    let cache = Cache::new(config.cache.clone(), Arc::new(transport));
    let document = DocLoader::new(&cache, config.document.clone());
    if let Some(base) = &args.base {
        document.set_base_url(base.clone());
    }

    let reporter = Arc::new(Reporter::default());
    let mut outcomes = Vec::with_capacity(args.urls.len());
    let mut requested = Vec::new();

    for url in &args.urls {
        match request(&document, args.kind, url) {
            Some(resource) => {
                resource.register_client(reporter.clone());
                requested.push(resource);
            }
            None => {
                warn!("Refused {} {}", args.kind, url);
                outcomes.push(ResourceOutcome::refused(url, args.kind, "request refused"));
            }
        }
    }

    cache.run_until_idle().await;
    info!(
        "Loaded {} of {} resources",
        reporter.finished(),
        requested.len()
    );

    for resource in &requested {
        outcomes.push(ResourceOutcome::of(resource));
        resource.unregister_client(&reporter);
    }
    for outcome in &outcomes {
        println!("{}", serde_json::to_string(outcome)?);
    }

    let stats = cache.statistics();
    println!("{}", serde_json::to_string_pretty(&stats)?);

    drop(requested);
    drop(document);
    let leaked = cache.clear();
    if leaked > 0 {
        warn!("{} resources still referenced at shutdown", leaked);
    }

    if let Some(handle) = metrics {
        print!("{}", handle.render());
    }

    Ok(())
}

fn request(document: &DocLoader, kind: ResourceKind, url: &str) -> Option<ResourceHandle> {
    match kind {
        ResourceKind::Stylesheet => document.request_style_sheet(url, None, None),
        ResourceKind::Script => document.request_script(url, None),
        ResourceKind::Image => document.request_image(url),
        ResourceKind::Audio => document.request_sound(url),
        ResourceKind::Font => document.request_font(url),
    }
}

/// Initialize logging
fn init_logging(logging: &LoggingConfig) {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(&logging.level));

    if logging.is_json() {
        tracing_subscriber::registry()
            .with(fmt::layer().json().with_writer(std::io::stderr))
            .with(filter)
            .init();
    } else {
        tracing_subscriber::registry()
            .with(fmt::layer().with_writer(std::io::stderr))
            .with(filter)
            .init();
    }
}
