use anyhow::{Context, Result, bail};
use clap::{Parser, ValueEnum};
use std::env;

/// How listing requests are served.
#[derive(Clone, Copy, Debug, PartialEq, Eq, ValueEnum)]
pub enum ListingKind {
    /// Walk the blob store's cursor and stop once the page is full.
    Cursor,
    /// Walk the whole blob store, filter, then slice.
    Scan,
    /// Query the metadata index directly.
    Indexed,
}

/// Where image payloads live.
#[derive(Clone, Copy, Debug, PartialEq, Eq, ValueEnum)]
pub enum StoreKind {
    /// Sharded files beneath `storage_dir`.
    Disk,
    /// Process memory; contents are lost on restart.
    Memory,
}

/// How access URLs are handed out.
#[derive(Clone, Copy, Debug, PartialEq, Eq, ValueEnum)]
pub enum UrlMode {
    Public,
    Signed,
}

/// Centralized application configuration.
/// Combines environment variables and CLI arguments.
#[derive(Clone)]
pub struct AppConfig {
    pub host: String,
    pub port: u16,
    pub store: StoreKind,
    pub storage_dir: String,
    pub database_url: String,
    pub bucket: String,
    pub region: String,
    pub store_domain: String,
    pub public_base_url: Option<String>,
    pub listing: ListingKind,
    pub url_mode: UrlMode,
    pub signing_secret: Option<String>,
    pub signing_base_url: String,
}

impl std::fmt::Debug for AppConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AppConfig")
            .field("host", &self.host)
            .field("port", &self.port)
            .field("store", &self.store)
            .field("storage_dir", &self.storage_dir)
            .field("database_url", &self.database_url)
            .field("bucket", &self.bucket)
            .field("region", &self.region)
            .field("store_domain", &self.store_domain)
            .field("public_base_url", &self.public_base_url)
            .field("listing", &self.listing)
            .field("url_mode", &self.url_mode)
            .field("signing_secret", &self.signing_secret.as_ref().map(|_| "<redacted>"))
            .field("signing_base_url", &self.signing_base_url)
            .finish()
    }
}

/// Command-line + environment configuration.
#[derive(Parser, Debug, Default)]
#[command(author, version, about = "Searchable, paginated image gallery over a blob store")]
pub struct Args {
    /// Host to bind to (overrides GALLERY_HOST)
    #[arg(long)]
    pub host: Option<String>,

    /// Port to bind to (overrides GALLERY_PORT)
    #[arg(long)]
    pub port: Option<u16>,

    /// Blob store implementation (overrides GALLERY_STORE)
    #[arg(long, value_enum)]
    pub store: Option<StoreKind>,

    /// Directory where image payloads are stored (overrides GALLERY_STORAGE_DIR)
    #[arg(long)]
    pub storage_dir: Option<String>,

    /// Metadata index database URL (overrides GALLERY_DATABASE_URL)
    #[arg(long)]
    pub database_url: Option<String>,

    /// Bucket name (overrides GALLERY_BUCKET)
    #[arg(long)]
    pub bucket: Option<String>,

    /// Store region (overrides GALLERY_REGION)
    #[arg(long)]
    pub region: Option<String>,

    /// Domain used for static object URLs (overrides GALLERY_STORE_DOMAIN)
    #[arg(long)]
    pub store_domain: Option<String>,

    /// Full prefix for static object URLs (overrides GALLERY_PUBLIC_BASE_URL)
    #[arg(long)]
    pub public_base_url: Option<String>,

    /// Listing backend (overrides GALLERY_LISTING)
    #[arg(long, value_enum)]
    pub listing: Option<ListingKind>,

    /// Access URL mode (overrides GALLERY_URL_MODE)
    #[arg(long, value_enum)]
    pub url_mode: Option<UrlMode>,

    /// Secret for signed URLs (overrides GALLERY_SIGNING_SECRET)
    #[arg(long)]
    pub signing_secret: Option<String>,

    /// Prefix for signed URLs (overrides GALLERY_SIGNING_BASE_URL)
    #[arg(long)]
    pub signing_base_url: Option<String>,

    /// Run migrations and exit
    #[arg(long)]
    pub migrate: bool,
}

impl AppConfig {
    /// Parse environment variables + CLI args into AppConfig and migrate flag.
    pub fn from_env_and_args() -> Result<(Self, bool)> {
        let args = Args::parse();
        let migrate = args.migrate;
        let cfg = Self::resolve(args, |name| env::var(name).ok())?;
        Ok((cfg, migrate))
    }

    /// Merge CLI arguments over values found through `lookup`, then defaults.
    pub fn resolve(args: Args, lookup: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let env_or = |name: &str, default: &str| lookup(name).unwrap_or_else(|| default.into());

        let port = match args.port {
            Some(port) => port,
            None => match lookup("GALLERY_PORT") {
                Some(value) => value
                    .parse::<u16>()
                    .with_context(|| format!("parsing GALLERY_PORT value `{}`", value))?,
                None => 3000,
            },
        };
        let listing = match args.listing {
            Some(kind) => kind,
            None => match lookup("GALLERY_LISTING") {
                Some(value) => ListingKind::from_str(&value, true)
                    .map_err(|err| anyhow::anyhow!("parsing GALLERY_LISTING: {}", err))?,
                None => ListingKind::Indexed,
            },
        };
        let store = match args.store {
            Some(kind) => kind,
            None => match lookup("GALLERY_STORE") {
                Some(value) => StoreKind::from_str(&value, true)
                    .map_err(|err| anyhow::anyhow!("parsing GALLERY_STORE: {}", err))?,
                None => StoreKind::Disk,
            },
        };
        let url_mode = match args.url_mode {
            Some(mode) => mode,
            None => match lookup("GALLERY_URL_MODE") {
                Some(value) => UrlMode::from_str(&value, true)
                    .map_err(|err| anyhow::anyhow!("parsing GALLERY_URL_MODE: {}", err))?,
                None => UrlMode::Public,
            },
        };

        let region = args.region.unwrap_or_else(|| env_or("GALLERY_REGION", "us-east-1"));
        let store_domain = args
            .store_domain
            .or_else(|| lookup("GALLERY_STORE_DOMAIN"))
            .unwrap_or_else(|| format!("s3.{}.amazonaws.com", region));
        let signing_secret = args
            .signing_secret
            .or_else(|| lookup("GALLERY_SIGNING_SECRET"))
            .filter(|s| !s.trim().is_empty());
        let signing_base_url = args
            .signing_base_url
            .or_else(|| lookup("GALLERY_SIGNING_BASE_URL"))
            .unwrap_or_else(|| format!("http://localhost:{}/objects", port));

        let cfg = Self {
            host: args.host.unwrap_or_else(|| env_or("GALLERY_HOST", "0.0.0.0")),
            port,
            store,
            storage_dir: args
                .storage_dir
                .unwrap_or_else(|| env_or("GALLERY_STORAGE_DIR", "./data/objects")),
            database_url: args.database_url.unwrap_or_else(|| {
                env_or("GALLERY_DATABASE_URL", "sqlite://./data/meta/gallery.db")
            }),
            bucket: args.bucket.unwrap_or_else(|| env_or("GALLERY_BUCKET", "gallery")),
            region,
            store_domain,
            public_base_url: args
                .public_base_url
                .or_else(|| lookup("GALLERY_PUBLIC_BASE_URL")),
            listing,
            url_mode,
            signing_secret,
            signing_base_url,
        };

        if cfg.url_mode == UrlMode::Signed && cfg.signing_secret.is_none() {
            bail!("url mode `signed` requires GALLERY_SIGNING_SECRET or --signing-secret");
        }
        if cfg.bucket.trim().is_empty() {
            bail!("bucket name must not be empty");
        }

        Ok(cfg)
    }

    pub fn addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}
