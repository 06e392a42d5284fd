use anyhow::Context;
use anyhow::Result;
use clap::Parser;
use futures::future::join_all;
use neptune_connector::config::cli_args;
use neptune_connector::ConnectResult;
use neptune_connector::KeyPair;
use neptune_connector::ServerConnector;
use tokio::runtime::Handle;
use tracing::info;
use tracing::warn;
use tracing_subscriber::EnvFilter;
use tracing_subscriber::FmtSubscriber;

pub fn main() -> Result<()> {
    // Fetch the CLI arguments
    let args: cli_args::Args = cli_args::Args::parse();

    let tokio_runtime = tokio::runtime::Builder::new_multi_thread()
        .enable_io()
        .enable_time()
        .build()
        .context("Could not create tokio runtime")?;

    let result = tokio_runtime.block_on(async {
        init_logging(&args)?;
        run(args).await
    });

    tokio_runtime.shutdown_timeout(tokio::time::Duration::from_secs(10));
    result
}

fn init_logging(args: &cli_args::Args) -> Result<()> {
    if args.tokio_console && init_tokio_console() {
        return Ok(());
    }

    // Configure logger to use ISO-8601, of which rfc3339 is a subset.
    // install global collector configured based on RUST_LOG env var.
    // Accepted `RUST_LOG` values are `trace`, `debug`, `info`, `warn`,
    // and `error`.
    let info_env_filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let subscriber = FmtSubscriber::builder()
        .with_timer(tracing_subscriber::fmt::time::UtcTime::rfc_3339())
        .with_env_filter(info_env_filter)
        .with_thread_ids(true)
        .finish();
    tracing::subscriber::set_global_default(subscriber)
        .context("Unable to set global default subscriber")?;

    if args.tokio_console {
        warn!("--tokio-console ignored: built without the tokio-console feature");
    }
    Ok(())
}

#[cfg(feature = "tokio-console")]
fn init_tokio_console() -> bool {
    console_subscriber::init();
    true
}

#[cfg(not(feature = "tokio-console"))]
fn init_tokio_console() -> bool {
    false
}

async fn run(args: cli_args::Args) -> Result<()> {
    let settings = args.connection_settings();
    settings.validate()?;

    let key_pair = match &args.secret_key {
        Some(secret) => KeyPair::from_secret_hex(secret).context("Invalid --secret-key")?,
        None => KeyPair::generate(),
    };
    info!(
        "neptune-connect {} running as {}",
        neptune_connector::VERSION,
        key_pair.identity()
    );

    if args.peers.is_empty() {
        warn!("No peers given, nothing to do. Use --peer <identity>@<host>:<port>");
        return Ok(());
    }

    let connector = ServerConnector::create(Handle::current(), key_pair, settings);
    let results = join_all(
        args.peers
            .iter()
            .map(|peer| connector.connect_and_wait(peer.clone())),
    )
    .await;

    let mut num_accepted = 0;
    for (peer, (result, _socket)) in args.peers.iter().zip(&results) {
        println!("{peer}: {result}");
        if *result == ConnectResult::Accepted {
            num_accepted += 1;
        }
    }
    info!(
        "{num_accepted} of {} peers accepted, {} connections active",
        args.peers.len(),
        connector.num_active_connections()
    );

    if num_accepted > 0 && !args.hold.is_zero() {
        info!("Holding connections for {}", humantime::format_duration(args.hold));
        tokio::select! {
            () = tokio::time::sleep(args.hold) => {}
            _ = tokio::signal::ctrl_c() => info!("Interrupted"),
        }
    }

    connector.shutdown();
    Ok(())
}
