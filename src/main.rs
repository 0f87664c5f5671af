use clap::Parser;
use tokio_util::sync::CancellationToken;
use tracing::warn;
use tracing_subscriber::EnvFilter;

use vod_downloader_lib::cli::{exit_code, run, Cli, EXIT_FAILED};

const DEFAULT_FILTER: &str = "vod_downloader_lib=info,soop_vod=info,warn";
const VERBOSE_FILTER: &str = "vod_downloader_lib=debug,soop_vod=debug,warn";

fn init_tracing(verbose: bool) {
    let env_filter = if verbose {
        EnvFilter::new(VERBOSE_FILTER)
    } else {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(DEFAULT_FILTER))
    };

    tracing_subscriber::fmt()
        .with_env_filter(env_filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();
}

fn main() {
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    let runtime = match tokio::runtime::Runtime::new() {
        Ok(runtime) => runtime,
        Err(err) => {
            eprintln!("error: cannot start the async runtime: {}", err);
            std::process::exit(EXIT_FAILED);
        }
    };

    let code = runtime.block_on(async {
        let cancel = CancellationToken::new();
        let on_interrupt = cancel.clone();
        tokio::spawn(async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                warn!("interrupted; stopping after cleanup");
                on_interrupt.cancel();
            }
        });

        let result = run(cli, cancel).await;
        match &result {
            Ok(report) => print!("{}", report.summary()),
            Err(err) => eprintln!("error: {}", err),
        }
        exit_code(&result)
    });

    std::process::exit(code);
}
