mod cli;

use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use clap::Parser;

use cli::{Cli, Commands};
use ph_av::capabilities::{CapabilityManifest, CapabilityProber, ManifestStore};
use ph_av::tools::ToolRegistry;
use ph_core::config::Config;
use ph_server::{build_router, AppContext};
use ph_session::{start_sweep_task, InMemoryCatalog, MediaItem, ProcessSupervisor, SessionManager};

fn main() -> Result<()> {
    let cli = Cli::parse();

    // Respect RUST_LOG if set, otherwise pick defaults from the verbose flag.
    let env_filter = std::env::var("RUST_LOG").unwrap_or_else(|_| {
        if cli.verbose {
            "playhead=trace,ph_av=trace,ph_session=trace,ph_server=debug,tower_http=debug"
                .to_string()
        } else {
            "playhead=debug,ph_av=debug,ph_session=debug,ph_server=info,tower_http=info"
                .to_string()
        }
    });

    tracing_subscriber::fmt().with_env_filter(&env_filter).init();

    match cli.command {
        Commands::Serve {
            host,
            port,
            library,
        } => {
            let rt = tokio::runtime::Runtime::new()?;
            rt.block_on(serve(cli.config.as_deref(), host, port, library.as_deref()))
        }
        Commands::Probe { json } => {
            let rt = tokio::runtime::Runtime::new()?;
            rt.block_on(probe(cli.config.as_deref(), json))
        }
        Commands::CheckTools => check_tools(cli.config.as_deref()),
        Commands::Validate {
            config: config_path,
        } => validate_config(config_path.or(cli.config).as_deref()),
        Commands::Version => {
            println!("playhead {}", env!("CARGO_PKG_VERSION"));
            Ok(())
        }
    }
}

async fn serve(
    config_path: Option<&std::path::Path>,
    host: Option<String>,
    port: Option<u16>,
    library: Option<&std::path::Path>,
) -> Result<()> {
    let mut config = Config::load_or_default(config_path);
    if let Some(host) = host {
        config.server.host = host;
    }
    if let Some(port) = port {
        config.server.port = port;
    }

    for warning in config.validate() {
        tracing::warn!("Config: {warning}");
    }

    tracing::info!("Starting playhead server");

    let tools = Arc::new(ToolRegistry::discover(&config.tools));
    for (name, tool) in tools.iter() {
        tracing::info!("Found {} at {}", name, tool.path.display());
    }

    let manifest = if config.probe.probe_on_start {
        tracing::info!("Probing host capabilities...");
        let prober = CapabilityProber::new(
            tools.clone(),
            Duration::from_secs(config.probe.test_timeout_secs),
        );
        let manifest = prober.probe().await;
        tracing::info!(
            duration_ms = manifest.probe_duration_ms,
            video_encoder = ?manifest.best_video_encoder(ph_core::media::VideoCodec::H264),
            "Capability probe complete"
        );
        manifest
    } else {
        tracing::warn!("Startup probe disabled; all capabilities off until a refresh");
        CapabilityManifest::default()
    };

    if !manifest.can_transcode() {
        tracing::warn!(
            "No working h264+aac software pipeline; only direct play sessions will succeed"
        );
    }

    let catalog = Arc::new(InMemoryCatalog::new());
    if let Some(path) = library {
        let count = load_library(&catalog, path)?;
        tracing::info!("Loaded {count} media items from {}", path.display());
    } else {
        tracing::warn!("No --library given; the catalog is empty");
    }

    std::fs::create_dir_all(&config.session.data_dir)?;

    let manifests = Arc::new(ManifestStore::new(manifest));
    let sessions = Arc::new(SessionManager::new(
        ProcessSupervisor::new(tools.clone(), config.session.clone()),
        catalog,
        manifests.clone(),
        config.session.clone(),
    ));
    let sweep = start_sweep_task(sessions.clone());

    let ctx = AppContext {
        config: Arc::new(config.clone()),
        tools,
        manifests,
        sessions: sessions.clone(),
    };
    let app = build_router(ctx);

    let addr = format!("{}:{}", config.server.host, config.server.port);
    tracing::info!("Listening on {addr}");
    let listener = tokio::net::TcpListener::bind(&addr).await?;
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    tracing::info!("Shutting down...");
    sweep.abort();
    sessions.shutdown().await;
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!("Failed to listen for shutdown signal: {e}");
    }
}

/// Read a JSON array of media items into the catalog.
fn load_library(catalog: &InMemoryCatalog, path: &std::path::Path) -> Result<usize> {
    let contents = std::fs::read_to_string(path)?;
    let items: Vec<MediaItem> = serde_json::from_str(&contents)?;
    let count = items.len();
    for item in items {
        catalog.insert(item);
    }
    Ok(count)
}

async fn probe(config_path: Option<&std::path::Path>, json: bool) -> Result<()> {
    let config = Config::load_or_default(config_path);
    let tools = Arc::new(ToolRegistry::discover(&config.tools));
    let prober = CapabilityProber::new(
        tools,
        Duration::from_secs(config.probe.test_timeout_secs),
    );
    let manifest = prober.probe().await;

    if json {
        println!("{}", serde_json::to_string_pretty(&manifest)?);
        return Ok(());
    }

    println!(
        "ffmpeg:  {}",
        manifest.ffmpeg_version.as_deref().unwrap_or("not found")
    );
    println!(
        "ffprobe: {}",
        manifest.ffprobe_version.as_deref().unwrap_or("not found")
    );
    println!("\nHardware acceleration:");
    println!("  cuda: {}  vaapi: {}  qsv: {}  videotoolbox: {}",
        manifest.hwaccels.cuda,
        manifest.hwaccels.vaapi,
        manifest.hwaccels.qsv,
        manifest.hwaccels.videotoolbox,
    );
    println!("\nPreferred encoders:");
    println!(
        "  h264: {}",
        manifest
            .best_video_encoder(ph_core::media::VideoCodec::H264)
            .unwrap_or("none")
    );
    println!(
        "  hevc: {}",
        manifest
            .best_video_encoder(ph_core::media::VideoCodec::Hevc)
            .unwrap_or("none")
    );
    println!(
        "  audio: {}",
        manifest
            .best_audio_encoder(ph_core::media::AudioCodec::Aac)
            .unwrap_or("none")
    );
    println!("\nTone-mapping:");
    match manifest.best_tonemap_chain() {
        Some(chain) => println!("  {chain}"),
        None => println!("  unavailable"),
    }
    println!("\nDolby Vision:");
    println!("  detect: {}  extract: {}  convert: {}  tonemap: {}",
        manifest.dolby_vision.detect,
        manifest.dolby_vision.extract_rpu,
        manifest.dolby_vision.convert_to_hdr10,
        manifest.dolby_vision.tonemap,
    );
    println!("\nProbe took {}ms", manifest.probe_duration_ms);

    Ok(())
}

fn check_tools(config_path: Option<&std::path::Path>) -> Result<()> {
    let config = Config::load_or_default(config_path);
    let registry = ToolRegistry::discover(&config.tools);

    println!("Checking external tools...\n");
    let mut all_ok = true;
    for tool in registry.check_all() {
        let status = if tool.available {
            "ok "
        } else {
            all_ok = false;
            "MISSING"
        };

        print!("[{status}] {}", tool.name);
        if let Some(ref version) = tool.version {
            print!(" ({version})");
        }
        if let Some(ref path) = tool.path {
            print!(" - {}", path.display());
        }
        println!();
    }

    println!();
    if all_ok {
        println!("All tools available.");
    } else {
        println!("dovi_tool is optional; ffmpeg and ffprobe are required for transcoding.");
    }
    Ok(())
}

fn validate_config(path: Option<&std::path::Path>) -> Result<()> {
    let config = match path {
        Some(p) => {
            println!("Validating config: {}", p.display());
            let contents = std::fs::read_to_string(p)?;
            Config::from_json(&contents).map_err(|e| anyhow::anyhow!("{e}"))?
        }
        None => {
            println!("No config file specified, using defaults");
            Config::default()
        }
    };

    let warnings = config.validate();
    if warnings.is_empty() {
        println!("Configuration is valid");
    } else {
        for w in &warnings {
            println!("warning: {w}");
        }
    }
    println!("  Server: {}:{}", config.server.host, config.server.port);
    println!("  Session data dir: {}", config.session.data_dir.display());
    println!("  Segment duration: {}s", config.session.segment_duration_secs);
    println!("  Heartbeat timeout: {}s", config.session.heartbeat_timeout_secs);

    Ok(())
}
