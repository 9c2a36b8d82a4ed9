use std::io;
use std::path::PathBuf;

use anyhow::Context;
use clap::Parser;
use log::info;

use silo::{index, server, signal, Config, KeyMode, Store};

#[derive(Parser)]
#[command(
    name = "silo-server",
    version,
    about = "Append-only key/value store speaking a RESP subset"
)]
struct Cli {
    /// Data segment directory, created if missing.
    #[arg(long = "data", default_value = "./silo-data")]
    data: PathBuf,

    /// Index segment directory, created if missing.
    #[arg(long = "index", default_value = "./silo-index")]
    index: PathBuf,

    /// Listen address.
    #[arg(long = "listen", default_value = "0.0.0.0")]
    listen: String,

    /// TCP port.
    #[arg(long = "port", default_value_t = silo::config::DEFAULT_PORT)]
    port: u16,

    /// Enable debug output.
    #[arg(long = "verbose")]
    verbose: bool,

    /// fsync every append before acknowledging it.
    #[arg(long = "sync")]
    sync: bool,

    /// Replay and print the index contents, then exit.
    #[arg(long = "dump")]
    dump: bool,

    /// Keying mode; fixed for the lifetime of a store directory.
    #[arg(long = "mode", value_enum, default_value = "user-key")]
    mode: KeyMode,
}

fn main() {
    let cli = Cli::parse();
    init_logging(cli.verbose);
    if let Err(err) = run(cli) {
        eprintln!("error: {err:#}");
        std::process::exit(1);
    }
}

fn init_logging(verbose: bool) {
    let default_filter = if verbose { "debug" } else { "info" };
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(default_filter))
        .init();
}

fn run(cli: Cli) -> anyhow::Result<()> {
    let config = Config {
        datapath: cli.data,
        indexpath: cli.index,
        listen: cli.listen,
        port: cli.port,
        verbose: cli.verbose,
        sync: cli.sync,
        dump: cli.dump,
        mode: cli.mode,
        ..Config::default()
    };

    if config.dump {
        let mut out = io::stdout().lock();
        index::dump(&config.indexpath, &mut out)
            .with_context(|| format!("cannot dump {}", config.indexpath.display()))?;
        return Ok(());
    }

    let mut store = Store::open(config).context("cannot open store")?;
    signal::install().context("cannot install signal handlers")?;
    server::serve(&mut store).context("server failed")?;
    info!("stopped");
    Ok(())
}
