use anyhow::{Context, Result};
use axum::Router;
use sqlx::sqlite::{SqliteConnectOptions, SqlitePoolOptions};
use std::{fs, io::ErrorKind, path::Path, str::FromStr, sync::Arc};
use tokio::net::TcpListener;
use tracing_subscriber::EnvFilter;

use crate::{
    config::{AppConfig, StoreKind, UrlMode},
    services::{
        blob_store::{BlobStore, DiskBlobStore, MemoryBlobStore},
        gallery_service::GalleryService,
        listing,
        metadata_index::MetadataIndex,
        signer::UrlSigner,
        url_issuer::AccessUrlIssuer,
    },
};

mod config;
mod errors;
mod handlers;
mod models;
mod routes;
mod services;

#[tokio::main]
async fn main() -> Result<()> {
    // --- Logging setup ---
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .init();

    // --- Parse config + migrate flag ---
    let (cfg, migrate) = AppConfig::from_env_and_args()?;

    tracing::info!("Starting image-gallery with config: {:?}", cfg);

    // --- Ensure storage directory exists ---
    if cfg.store == StoreKind::Disk && !Path::new(&cfg.storage_dir).exists() {
        fs::create_dir_all(&cfg.storage_dir)?;
        tracing::info!("Created storage directory at {}", cfg.storage_dir);
    }

    // --- Metadata index (empty database URL runs without one) ---
    let index = open_index(&cfg.database_url).await?;

    // --- Handle migration mode ---
    if migrate {
        let index = index.context("--migrate needs a database URL")?;
        let applied = index.migrate().await?;
        tracing::info!("Database migration complete ({} statements).", applied);
        return Ok(()); // exit after migration
    }
    if let Some(index) = &index {
        index.migrate().await?;
    }

    // --- Blob store + listing backend ---
    let signer = match &cfg.signing_secret {
        Some(secret) => Some(UrlSigner::new(secret.as_bytes(), &cfg.signing_base_url)?),
        None => None,
    };
    let store: Arc<dyn BlobStore> = match cfg.store {
        StoreKind::Disk => {
            let disk = DiskBlobStore::new(&cfg.storage_dir, cfg.bucket.clone());
            Arc::new(match signer {
                Some(signer) => disk.with_signer(signer),
                None => disk,
            })
        }
        StoreKind::Memory => {
            let memory = MemoryBlobStore::new(cfg.bucket.clone());
            Arc::new(match signer {
                Some(signer) => memory.with_signer(signer),
                None => memory,
            })
        }
    };
    let listing = listing::build(cfg.listing, store.clone(), index.clone())?;

    let urls = match (cfg.url_mode, &cfg.public_base_url) {
        (UrlMode::Signed, _) => AccessUrlIssuer::signed(store.clone()),
        (UrlMode::Public, Some(base)) => AccessUrlIssuer::public_with_base(base.as_str()),
        (UrlMode::Public, None) => AccessUrlIssuer::public(&cfg.bucket, &cfg.store_domain),
    };
    tracing::info!(listing = listing.name(), urls = ?urls, "gallery ready");

    let gallery = GalleryService::new(store, listing, index, urls);

    // --- Build router ---
    let app: Router = routes::routes::routes().with_state(gallery);

    // --- Start server ---
    let addr = cfg.addr();
    let listener = match TcpListener::bind(&addr).await {
        Ok(listener) => listener,
        Err(err)
            if err.kind() == ErrorKind::PermissionDenied
                && matches!(cfg.host.as_str(), "0.0.0.0" | "::") =>
        {
            let fallback_addr = format!("127.0.0.1:{}", cfg.port);
            tracing::warn!(
                "Permission denied binding to {} ({}). Falling back to {}",
                addr,
                err,
                fallback_addr
            );
            TcpListener::bind(&fallback_addr).await?
        }
        Err(err) => return Err(err.into()),
    };

    tracing::info!("Server listening on http://{}", listener.local_addr()?);
    axum::serve(listener, app).await?;

    Ok(())
}

/// Connect to the SQLite metadata index, creating the file and its parent directory if needed.
async fn open_index(database_url: &str) -> Result<Option<MetadataIndex>> {
    if database_url.trim().is_empty() {
        tracing::warn!("No database URL configured; running without a metadata index");
        return Ok(None);
    }

    let db_path = database_url
        .trim_start_matches("sqlite://")
        .trim_start_matches("sqlite:")
        .trim_start_matches("file:");
    tracing::debug!("Interpreted SQLite path => {}", db_path);

    if let Some(parent) = Path::new(db_path).parent() {
        if !parent.as_os_str().is_empty() && !parent.exists() {
            fs::create_dir_all(parent)?;
            tracing::info!("Created missing directory {:?}", parent);
        }
    }

    let options = SqliteConnectOptions::from_str(database_url)
        .with_context(|| format!("parsing database URL `{}`", database_url))?
        .create_if_missing(true);
    let db = SqlitePoolOptions::new()
        .max_connections(5)
        .connect_with(options)
        .await?;

    Ok(Some(MetadataIndex::new(Arc::new(db))))
}
