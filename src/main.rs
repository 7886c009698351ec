use clip_relay::bot::handlers::{get_user_id_safe, Command};
use clip_relay::bot::{self, TelegramTransport};
use clip_relay::config::Settings;
use clip_relay::downloader::{ExtractionPool, ExtractorOptions, YtDlpExtractor};
use clip_relay::relay::{CredentialPolicy, Relay};
use clip_relay::scratch::Scratch;
use dotenvy::dotenv;
use regex::Regex;
use std::convert::Infallible;
use std::io::{self, Write};
use std::sync::Arc;
use std::time::Duration;
use teloxide::dispatching::UpdateHandler;
use teloxide::prelude::*;
use tracing::{debug, error, info, warn};
use tracing_subscriber::{prelude::*, EnvFilter};

/// Default log filter when `RUST_LOG` is not set
const DEFAULT_LOG_FILTER: &str = "clip_relay=info,teloxide=warn,hyper=warn,reqwest=warn";

/// Regex patterns for redacting the bot token
struct RedactionPatterns {
    token1: Regex,
    token2: Regex,
    token3: Regex,
}

impl RedactionPatterns {
    /// Initialize all regex patterns
    ///
    /// # Errors
    ///
    /// Returns an error if any regex pattern is invalid
    fn new() -> Result<Self, regex::Error> {
        Ok(Self {
            token1: Regex::new(r"(https?://[^/]+/bot)([0-9]+:[A-Za-z0-9_-]+)(/['\s]*)")?,
            token2: Regex::new(r"([0-9]{8,10}:[A-Za-z0-9_-]{35})")?,
            token3: Regex::new(r"(bot[0-9]{8,10}:)[A-Za-z0-9_-]+")?,
        })
    }

    fn redact(&self, input: &str) -> String {
        let output = self.token1.replace_all(input, "$1[TELEGRAM_TOKEN]$3");
        let output = self.token2.replace_all(&output, "[TELEGRAM_TOKEN]");
        self.token3
            .replace_all(&output, "$1[TELEGRAM_TOKEN]")
            .into_owned()
    }
}

struct RedactingWriter<W: Write> {
    inner: W,
    patterns: Arc<RedactionPatterns>,
}

impl<W: Write> RedactingWriter<W> {
    const fn new(inner: W, patterns: Arc<RedactionPatterns>) -> Self {
        Self { inner, patterns }
    }
}

impl<W: Write> Write for RedactingWriter<W> {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        let s = String::from_utf8_lossy(buf);
        let redacted = self.patterns.redact(&s);
        self.inner.write_all(redacted.as_bytes())?;
        // The caller wrote `buf.len()` bytes as far as it is concerned
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        self.inner.flush()
    }
}

struct RedactingMakeWriter<F> {
    make_inner: F,
    patterns: Arc<RedactionPatterns>,
}

impl<F> RedactingMakeWriter<F> {
    const fn new(make_inner: F, patterns: Arc<RedactionPatterns>) -> Self {
        Self {
            make_inner,
            patterns,
        }
    }
}

impl<'a, F, W> tracing_subscriber::fmt::MakeWriter<'a> for RedactingMakeWriter<F>
where
    F: Fn() -> W + 'static,
    W: Write,
{
    type Writer = RedactingWriter<W>;

    fn make_writer(&'a self) -> Self::Writer {
        RedactingWriter::new((self.make_inner)(), self.patterns.clone())
    }
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Load .env file
    dotenv().ok();

    // Initialize redaction patterns early (before logging)
    let patterns = Arc::new(RedactionPatterns::new().map_err(|e| {
        eprintln!("Failed to compile regex patterns: {e}");
        e
    })?);

    init_logging(patterns);

    info!("Starting clip-relay...");

    let settings = init_settings();
    let scratch = init_scratch(&settings);

    let extractor = YtDlpExtractor::new(
        settings.ytdlp_path.clone(),
        ExtractorOptions {
            socket_timeout: Some(settings.socket_timeout_secs),
            ..ExtractorOptions::with_max_filesize(settings.max_file_size_bytes())
        },
    );
    let pool = ExtractionPool::new(Arc::new(extractor), settings.max_concurrent_downloads);
    match pool.version().await {
        Ok(version) => info!("yt-dlp {version} is available."),
        Err(e) => warn!("yt-dlp is not usable yet: {e}"),
    }

    // Uploads of up to 50 MB go through the same client as every other call
    let client = teloxide::net::default_reqwest_settings()
        .timeout(Duration::from_secs(settings.upload_timeout_secs))
        .build()?;
    let bot = Bot::with_client(settings.telegram_token.clone(), client);

    let relay = Arc::new(Relay::new(
        Arc::new(TelegramTransport::new(bot.clone())),
        pool.clone(),
        scratch,
        CredentialPolicy::new(settings.cookies_file.clone(), settings.cookie_domains()),
        settings.max_file_size_bytes(),
    ));

    let handler = setup_handler();

    info!(
        max_concurrent = pool.max_concurrent(),
        max_file_size_mb = settings.max_file_size_mb,
        "Bot is running..."
    );

    Dispatcher::builder(bot, handler)
        .dependencies(dptree::deps![relay, pool, settings])
        // Every update runs on its own task; one slow download never holds up a chat
        .distribution_function(|_| None::<Infallible>)
        .default_handler(|upd| async move {
            debug!("Unhandled update: {:?}", upd.kind);
        })
        .enable_ctrlc_handler()
        .build()
        .dispatch()
        .await;

    Ok(())
}

fn debug_mode_enabled() -> bool {
    std::env::var("DEBUG_MODE").is_ok_and(|v| v.eq_ignore_ascii_case("true") || v == "1")
}

fn init_logging(patterns: Arc<RedactionPatterns>) {
    let make_writer = RedactingMakeWriter::new(io::stderr, patterns);
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        if debug_mode_enabled() {
            EnvFilter::new("debug")
        } else {
            EnvFilter::new(DEFAULT_LOG_FILTER)
        }
    });

    tracing_subscriber::registry()
        .with(filter)
        .with(tracing_subscriber::fmt::layer().with_writer(make_writer))
        .init();
}

fn init_settings() -> Arc<Settings> {
    match Settings::new() {
        Ok(s) => {
            info!("Configuration loaded successfully.");
            Arc::new(s)
        }
        Err(e) => {
            error!("Failed to load configuration: {}", e);
            std::process::exit(1);
        }
    }
}

fn init_scratch(settings: &Settings) -> Scratch {
    let scratch = match Scratch::open(&settings.download_dir) {
        Ok(s) => s,
        Err(e) => {
            error!("Failed to prepare download directory: {}", e);
            std::process::exit(1);
        }
    };
    match scratch.purge() {
        Ok(0) => {}
        Ok(removed) => info!("Removed {removed} stale file(s) from {}.", scratch.dir().display()),
        Err(e) => warn!("Failed to sweep download directory: {}", e),
    }
    scratch
}

fn setup_handler() -> UpdateHandler<teloxide::RequestError> {
    dptree::entry()
        .branch(
            Update::filter_message().branch(
                dptree::filter(|msg: Message, settings: Arc<Settings>| {
                    settings.is_user_allowed(get_user_id_safe(&msg))
                })
                .branch(
                    dptree::entry()
                        .filter_command::<Command>()
                        .endpoint(handle_command),
                )
                .branch(
                    // Unknown commands fall through here and are dropped
                    dptree::filter(|msg: Message| {
                        msg.text().map_or_else(
                            || msg.caption().is_some(),
                            |text| !text.starts_with('/'),
                        )
                    })
                    .endpoint(handle_relay_text),
                ),
            ),
        )
        .branch(
            // Everyone who did not pass the filter above is unauthorized
            Update::filter_message()
                .filter(|msg: Message, settings: Arc<Settings>| {
                    !settings.is_user_allowed(get_user_id_safe(&msg))
                })
                .endpoint(handle_unauthorized),
        )
}

async fn handle_command(
    bot: Bot,
    msg: Message,
    cmd: Command,
    pool: ExtractionPool,
    settings: Arc<Settings>,
) -> Result<(), teloxide::RequestError> {
    let res = match cmd {
        Command::Start => bot::handlers::start(bot, msg, settings).await,
        Command::Healthcheck => bot::handlers::healthcheck(bot, msg, pool).await,
    };
    if let Err(e) = res {
        error!("Command error: {}", e);
    }
    respond(())
}

async fn handle_relay_text(msg: Message, relay: Arc<Relay>) -> Result<(), teloxide::RequestError> {
    if let Err(e) = bot::handlers::handle_text(msg, relay).await {
        error!("Text handler error: {}", e);
    }
    respond(())
}

async fn handle_unauthorized(bot: Bot, msg: Message) -> Result<(), teloxide::RequestError> {
    let transport = TelegramTransport::new(bot);
    if let Err(e) = bot::handlers::handle_unauthorized(&transport, &msg).await {
        error!("Failed to send access denied message: {}", e);
    }
    respond(())
}
