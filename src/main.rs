use anyhow::Context;
use clap::Parser;
use std::path::PathBuf;
use std::sync::Arc;
use webpush_server_lib::config::{PartialPushConfig, PushConfig};
use webpush_server_lib::push::PushService;
use webpush_server_lib::server::{self, ServerAppState};

/// Web Push notification server (RFC 8291 / RFC 8292)
#[derive(Parser, Debug)]
#[command(name = "webpush-server")]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// TOML config file; every field is optional
    #[arg(long, env = "WEBPUSH_CONFIG")]
    config: Option<PathBuf>,

    /// Port to bind the server to
    #[arg(long, default_value = "8080")]
    port: u16,

    /// Address to bind the server to
    #[arg(long, default_value = "0.0.0.0")]
    bind: String,

    /// Allowed CORS origins (comma separated); any origin if omitted
    #[arg(long, env = "WEBPUSH_CORS_ORIGINS", value_delimiter = ',')]
    cors_origin: Vec<String>,

    /// Server public key file (X.509 DER)
    #[arg(long, env = "WEBPUSH_PUBLIC_KEY")]
    public_key_path: Option<PathBuf>,

    /// Server private key file (PKCS#8 DER)
    #[arg(long, env = "WEBPUSH_PRIVATE_KEY")]
    private_key_path: Option<PathBuf>,

    /// VAPID contact URI (mailto: or https:)
    #[arg(long, env = "WEBPUSH_VAPID_SUBJECT")]
    vapid_subject: Option<String>,

    /// TTL header value in seconds
    #[arg(long)]
    ttl_seconds: Option<u32>,

    /// Per-request timeout in seconds
    #[arg(long)]
    request_timeout_secs: Option<u64>,

    /// Number of concurrent deliveries per broadcast
    #[arg(long)]
    max_concurrency: Option<usize>,
}

impl Cli {
    fn overrides(&self) -> PartialPushConfig {
        PartialPushConfig {
            public_key_path: self.public_key_path.clone(),
            private_key_path: self.private_key_path.clone(),
            vapid_subject: self.vapid_subject.clone(),
            ttl_seconds: self.ttl_seconds,
            request_timeout_secs: self.request_timeout_secs,
            max_concurrency: self.max_concurrency,
            ..Default::default()
        }
    }

    fn load_config(&self) -> anyhow::Result<PushConfig> {
        let base = match &self.config {
            Some(path) => PushConfig::load(path)?,
            None => PushConfig::default(),
        };
        let config = self.overrides().merge_into(base);
        config.validate().context("Invalid configuration")?;
        Ok(config)
    }
}

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    // Initialize logger (RUST_LOG overrides the default level)
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let config = cli.load_config()?;
    log::debug!("Effective config: {:?}", config);

    let rt = tokio::runtime::Runtime::new().context("Failed to create tokio runtime")?;

    rt.block_on(async {
        let push = PushService::from_config(&config)?;
        let state = ServerAppState::new(Arc::new(push));

        let cors_origins = (!cli.cors_origin.is_empty()).then(|| cli.cors_origin.clone());
        server::run_server(cli.port, &cli.bind, state, cors_origins)
            .await
            .map_err(|e| anyhow::anyhow!(e))
    })
}
