//! Agora daemon
//!
//! Wires the store, broadcaster, cache sweeper and auto-moderation scheduler
//! together and runs until interrupted.

use clap::Parser;
use std::sync::Arc;
use tracing::{error, info, warn};

use agora::{
    auth::{spawn_cleanup_task as spawn_limiter_cleanup, RateLimitConfig, RateLimiter, Unlimited, WindowRateLimiter},
    cache::{spawn_cleanup_task, CacheConfig, NamespaceCache},
    config::Args,
    db::{MemoryStore, MongoClient, MongoStore, Stores},
    logging::{init_tracing, AuditLogger},
    moderation::ModerationConfig,
    nats::NatsClient,
    realtime::{Broadcaster, LocalBroadcaster, NatsBroadcaster},
    Engine,
};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load environment variables from .env file if present
    let _ = dotenvy::dotenv();

    let args = Args::parse();

    init_tracing(&args.log_level, args.json_logs());

    if let Err(e) = args.validate() {
        error!("Configuration error: {}", e);
        std::process::exit(1);
    }

    info!("======================================");
    info!("  Agora - Interaction & Moderation");
    info!("======================================");
    info!("Node ID: {}", args.node_id);
    info!("Mode: {}", if args.dev_mode { "DEVELOPMENT" } else { "PRODUCTION" });
    info!("NATS: {}", args.nats.nats_url);
    info!("MongoDB: {} (db: {})", args.mongodb_uri, args.mongodb_db);
    info!(
        "Moderation: {} (every {}s, threshold {}, {})",
        if args.moderation_enabled { "enabled" } else { "disabled" },
        args.moderation_interval_secs,
        args.moderation_threshold,
        args.moderation_scoring
    );
    info!("======================================");

    // Document store: MongoDB, or in-memory in dev mode
    let stores = match MongoClient::new(&args.mongodb_uri, &args.mongodb_db).await {
        Ok(client) => {
            info!("MongoDB connected successfully");
            Stores::from_backend(Arc::new(MongoStore::new(&client).await?))
        }
        Err(e) => {
            if args.dev_mode {
                warn!("MongoDB connection failed (dev mode, using in-memory store): {}", e);
                Stores::from_backend(Arc::new(MemoryStore::new()))
            } else {
                error!("MongoDB connection failed: {}", e);
                std::process::exit(1);
            }
        }
    };

    // Real-time transport: NATS, or in-process in dev mode
    let broadcaster: Arc<dyn Broadcaster> =
        match NatsClient::new(&args.nats, &format!("agora-{}", args.node_id)).await {
            Ok(client) => {
                info!("NATS connected successfully");
                Arc::new(NatsBroadcaster::new(client, &args.nats.nats_subject_prefix))
            }
            Err(e) => {
                if args.dev_mode {
                    warn!("NATS connection failed (dev mode, using local broadcaster): {}", e);
                    Arc::new(LocalBroadcaster::new())
                } else {
                    error!("NATS connection failed: {}", e);
                    std::process::exit(1);
                }
            }
        };

    let cache = Arc::new(NamespaceCache::new(CacheConfig::from_args(&args)));
    let cache_sweeper = spawn_cleanup_task(Arc::clone(&cache));

    let mut limiter_sweeper = None;
    let limiter: Arc<dyn RateLimiter> = if args.rate_limit_per_minute == 0 {
        info!("Rate limiting disabled");
        Arc::new(Unlimited)
    } else {
        let window = Arc::new(WindowRateLimiter::new(RateLimitConfig::from_args(&args)));
        limiter_sweeper = Some(spawn_limiter_cleanup(Arc::clone(&window)));
        window
    };

    let audit = AuditLogger::new(args.node_id.to_string());
    if let Some(path) = &args.audit_log_path {
        if let Err(e) = audit.init_file(path.clone()).await {
            warn!("Moderation audit log unavailable at {}: {}", path.display(), e);
        }
    }

    let moderation = ModerationConfig::from_args(&args);
    let moderation_enabled = moderation.enabled;
    let engine = Engine::new(stores, broadcaster, Arc::clone(&cache), limiter, audit, moderation);

    let scheduler = if moderation_enabled {
        Some(engine.moderator().start().await?)
    } else {
        info!("Auto-moderation scheduler disabled");
        None
    };

    info!("Agora engine ready");

    tokio::signal::ctrl_c().await?;
    info!("Shutdown signal received");

    engine.shutdown().await;
    if let Some(handle) = scheduler {
        if let Err(e) = handle.await {
            warn!("Scheduler task ended abnormally: {}", e);
        }
    }
    cache_sweeper.abort();
    if let Some(handle) = limiter_sweeper {
        handle.abort();
    }
    cache.clear();

    let stats = engine.tasks().stats();
    info!(
        submitted = stats.submitted,
        failed = stats.failed,
        "Agora engine stopped"
    );
    Ok(())
}
