//! `chatrelay` binary.
//!
//! `chatrelay serve` runs the relay; `chatrelay ask <message>` sends one
//! message to a running relay and prints the streamed reply.

use std::io::Write as _;
use std::time::Duration;

use anyhow::Context as _;
use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

use chatrelay::client::{ChatSession, FALLBACK, RelayClient};
use chatrelay::config::{
    Config, ContactDetails, DEFAULT_BASE_URL, DEFAULT_LISTEN, DEFAULT_MAX_TOKENS, DEFAULT_MODEL,
    DEFAULT_TEMPERATURE, UpstreamConfig,
};
use chatrelay::relay;
use chatrelay::server::{DEFAULT_MAX_REQUEST_SIZE, Server};

/// Streaming relay between a chat widget and an OpenAI-compatible API.
#[derive(Parser)]
#[command(name = "chatrelay", version, about, long_about = None)]
struct Cli {
    /// More log output (-v for debug, -vv for trace). `RUST_LOG` wins if set.
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Serve `POST /api/chat`.
    Serve(ServeArgs),

    /// Send one message to a running relay and print the reply.
    Ask {
        /// The message to send.
        message: String,

        /// Origin of the relay.
        #[arg(long, env = "CHATRELAY_URL", default_value = "http://127.0.0.1:3000")]
        relay_url: String,
    },
}

#[derive(clap::Args)]
struct ServeArgs {
    /// Provider API key.
    #[arg(long, env = "OPENAI_API_KEY", hide_env_values = true)]
    api_key: Option<String>,

    /// Address to listen on.
    #[arg(long, env = "CHATRELAY_LISTEN", default_value = DEFAULT_LISTEN)]
    listen: String,

    /// Provider base URL; `/chat/completions` is appended.
    #[arg(long, env = "CHATRELAY_UPSTREAM_URL", default_value = DEFAULT_BASE_URL)]
    upstream_url: String,

    #[arg(long, env = "CHATRELAY_MODEL", default_value = DEFAULT_MODEL)]
    model: String,

    #[arg(long, env = "CHATRELAY_MAX_TOKENS", default_value_t = DEFAULT_MAX_TOKENS)]
    max_tokens: u32,

    #[arg(long, env = "CHATRELAY_TEMPERATURE", default_value_t = DEFAULT_TEMPERATURE)]
    temperature: f32,

    /// Seconds allowed for connecting to the provider.
    #[arg(long, default_value_t = 10)]
    connect_timeout: u64,

    /// Seconds allowed for a whole provider exchange, streaming included.
    #[arg(long, default_value_t = 120)]
    request_timeout: u64,

    /// Largest accepted request, head plus body, in bytes.
    #[arg(long, default_value_t = DEFAULT_MAX_REQUEST_SIZE)]
    max_request_bytes: usize,

    /// Origins allowed to embed the widget (comma separated, `*` for any).
    #[arg(long, env = "CHATRELAY_ALLOWED_ORIGINS", value_delimiter = ',')]
    allowed_origins: Vec<String>,

    /// E-mail address the assistant may offer for detailed enquiries.
    #[arg(long, env = "CHATRELAY_CONTACT_EMAIL")]
    contact_email: Option<String>,

    /// WhatsApp number the assistant may offer for detailed enquiries.
    #[arg(long, env = "CHATRELAY_CONTACT_PHONE")]
    contact_phone: Option<String>,
}

impl ServeArgs {
    fn into_config(self) -> Config {
        let upstream = UpstreamConfig::new(self.api_key.unwrap_or_default())
            .with_base_url(self.upstream_url)
            .with_model(self.model)
            .with_max_tokens(self.max_tokens)
            .with_temperature(self.temperature)
            .with_timeouts(
                Duration::from_secs(self.connect_timeout),
                Duration::from_secs(self.request_timeout),
            )
            .with_contact(ContactDetails {
                email: self.contact_email.filter(|e| !e.trim().is_empty()),
                phone: self.contact_phone.filter(|p| !p.trim().is_empty()),
            });

        Config::new(upstream)
            .with_listen(self.listen)
            .with_max_request_bytes(self.max_request_bytes)
            .with_allowed_origins(
                self.allowed_origins
                    .into_iter()
                    .map(|o| o.trim().to_owned())
                    .filter(|o| !o.is_empty())
                    .collect(),
            )
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let default_filter = match cli.verbose {
        0 => "info",
        1 => "info,chatrelay=debug",
        _ => "trace",
    };
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_filter)),
        )
        .with_target(false)
        .init();

    match cli.command {
        Commands::Serve(args) => serve(args.into_config()).await,
        Commands::Ask { message, relay_url } => ask(&relay_url, &message).await,
    }
}

async fn serve(config: Config) -> anyhow::Result<()> {
    config.validate().context("invalid configuration")?;
    tracing::info!(
        model = %config.upstream.model,
        upstream = %config.upstream.completions_url(),
        origins = config.allowed_origins.len(),
        "starting chat relay"
    );

    let app = relay::app(&config).context("failed to set up the provider client")?;
    let server = Server::bind(&config.listen)
        .await?
        .max_request_size(config.max_request_bytes);

    server.serve_with_shutdown(app, shutdown_signal()).await?;
    tracing::info!("chat relay stopped");
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!(error = %e, "cannot listen for ctrl-c; running until killed");
        std::future::pending::<()>().await;
    }
}

async fn ask(relay_url: &str, message: &str) -> anyhow::Result<()> {
    let client = RelayClient::new(relay_url)?;
    let mut session = ChatSession::new(client);

    let mut stdout = std::io::stdout();
    let reply = session
        .send_with(message, |fragment| {
            let _ = write!(stdout, "{fragment}");
            let _ = stdout.flush();
        })
        .await?;
    println!();

    if reply.text == FALLBACK {
        anyhow::bail!("{FALLBACK}");
    }
    Ok(())
}
