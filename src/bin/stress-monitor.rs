use clap::Parser;
use log::{error, info, LevelFilter};
use stress_monitor::{init_logging, run};
use stress_monitor::cli::Args;
use stress_monitor::error::AppRunError;

fn main() -> Result<(), AppRunError> {
    let args = Args::parse();

    init_logging(if args.verbose { LevelFilter::Debug } else { LevelFilter::Info });
    info!(concat!("Stress Monitor ", env!("CARGO_PKG_VERSION")));

    match run(args) {
        Err(err) => {
            error!("Unexpected error: {}", err);
            Err(err)
        },
        Ok(_) => {
            info!("Clean shutdown");
            Ok(())
        },
    }
}
