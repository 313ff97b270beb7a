use std::env;
use std::time::Duration;
use log::{info, warn};
use tokio::signal;
use tokio::spawn;

use crate::cli::{find_device, prompt_selection, Args, INSTRUCTIONS};
use crate::config::io::ConfigIO;
use crate::config::types::Config;
use crate::device::connection::BtleplugBackend;
use crate::error::{AppRunError, ConnectionError, SessionError};
use crate::report::console::console_report_task;
use crate::session::types::SessionState;
use crate::session::TelemetrySession;

pub mod cli;
pub mod config;
pub mod device;
pub mod error;
pub mod report;
pub mod session;

/**
 * How long (milliseconds) shutting down the runtime may take.
 */
const SHUTDOWN_DEADLINE: u64 = 1000;

pub fn init_logging(level: log::LevelFilter) {
    let mut dispatch = fern::Dispatch::new()
        .format(|out, message, record| {
            out.finish(format_args!(
                "[{} {} {}] {}",
                humantime::format_rfc3339(std::time::SystemTime::now()),
                record.level(),
                record.target(),
                message
            ))
        })
        .level(level)
        .level_for("btleplug", log::LevelFilter::Warn)
        .chain(std::io::stderr());

    if let Ok(log_file) = env::var("LOG_FILE") {
        dispatch = dispatch.chain(
            fern::log_file(log_file).expect("Failed to open LOG_FILE")
        );
    }

    dispatch.apply().expect("Failed to initialize logger");
}

async fn drive_session(
    args: &Args,
    config: &Config,
    session: &mut TelemetrySession<BtleplugBackend>,
) -> Result<(), AppRunError> {
    let stop = session.stop_handle();
    let scan_timeout = args.scan_timeout.unwrap_or(config.scan_timeout());

    println!("{}", INSTRUCTIONS);
    let devices = session.start_scan(scan_timeout).await?.collect_all().await;

    if stop.is_stop_requested() {
        return Ok(());
    }
    if devices.is_empty() {
        println!("No BLE devices found.");
        return Ok(());
    }

    let device = match &args.device {
        Some(address) => match find_device(&devices, address) {
            Some(device) => Some(device.clone()),
            None => {
                let source = ConnectionError::DeviceNotFound { address: address.clone() };
                return Err(SessionError::from(source).into());
            },
        },
        None => prompt_selection(&devices, &stop).await?,
    };

    let Some(device) = device else {
        info!("No device selected");
        return Ok(());
    };

    session.select_device(device).map_err(SessionError::from)?;
    session.connect().await?;

    if session.state() == SessionState::Streaming {
        session.run().await?;
    }
    Ok(())
}

async fn run_session(args: Args) -> Result<(), AppRunError> {
    let config = ConfigIO::locate(args.config.clone())?.read_or_default().await?;
    let (left_uuid, right_uuid) = config.characteristic_uuids()?;

    let backend = BtleplugBackend::new(left_uuid, right_uuid).await.map_err(SessionError::from)?;
    let mut session = TelemetrySession::new(backend, config.session_options());
    let report_handle = console_report_task(&config, session.subscribe(config.event_buffer));

    let stop = session.stop_handle();
    spawn(async move {
        if signal::ctrl_c().await.is_ok() {
            info!("Stop requested");
            stop.stop();
        }
    });

    let result = drive_session(&args, &config, &mut session).await;

    session.stop().await;
    let state = session.state();
    let failure = session.failure_reason().map(str::to_string);

    // dropping the session closes the event stream, so the reporter can finish
    drop(session);
    if let Err(err) = report_handle.await {
        warn!("Console reporter stopped abnormally: {}", err);
    }

    match (state, failure) {
        (SessionState::Failed, Some(reason)) => Err(AppRunError::SessionFailed { reason }),
        _ => result,
    }
}

pub fn run(args: Args) -> Result<(), AppRunError> {
    let runtime = tokio::runtime::Runtime::new()?;
    let result = runtime.block_on(run_session(args));

    // a pending stdin read can not be cancelled
    runtime.shutdown_timeout(Duration::from_millis(SHUTDOWN_DEADLINE));
    result
}
