use std::io::{self, Write};
use std::path::PathBuf;
use std::time::Duration;
use clap::Parser;
use tokio::io::{stdin, AsyncBufReadExt, BufReader};

use crate::device::types::DeviceDescriptor;
use crate::session::StopHandle;

pub const INSTRUCTIONS: &str =
    "Press the front left key of the device to turn on the device and look for mirolab mindease.";

#[derive(Parser, Debug, Default)]
#[command(version, about = "Live stress values from a mirolab mindease EEG headband")]
pub struct Args {
    /// Path to the JSON config file
    #[arg(long)]
    pub config: Option<PathBuf>,

    /// How long to scan for devices, e.g. "5s"
    #[arg(long, value_parser = humantime::parse_duration)]
    pub scan_timeout: Option<Duration>,

    /// Connect to the device with this address instead of asking
    #[arg(long)]
    pub device: Option<String>,

    /// Log debug messages
    #[arg(short, long)]
    pub verbose: bool,
}

pub fn find_device<'a>(devices: &'a [DeviceDescriptor], address: &str) -> Option<&'a DeviceDescriptor> {
    devices.iter().find(|device| device.address.eq_ignore_ascii_case(address))
}

/// Parses a 1-based choice from the device list. `Ok(None)` cancels.
pub fn parse_choice(input: &str, count: usize) -> Result<Option<usize>, String> {
    let input = input.trim();
    if input.is_empty() {
        return Ok(None);
    }

    match input.parse::<usize>() {
        Ok(choice) if (1..=count).contains(&choice) => Ok(Some(choice - 1)),
        _ => Err(format!("Please select a device between 1 and {}.", count)),
    }
}

/// Asks on stdin which device to use. Returns `None` when the user cancels,
/// stdin is closed, or a stop is requested.
pub async fn prompt_selection(devices: &[DeviceDescriptor], stop: &StopHandle) -> io::Result<Option<DeviceDescriptor>> {
    println!("Select a BLE device:");
    for (index, device) in devices.iter().enumerate() {
        println!("  [{}] {}", index + 1, device);
    }

    let mut lines = BufReader::new(stdin()).lines();

    loop {
        print!("Device number (empty to cancel): ");
        io::stdout().flush()?;

        let line = tokio::select! {
            _ = stop.stopped() => return Ok(None),
            line = lines.next_line() => line?,
        };

        let Some(line) = line else {
            return Ok(None);
        };

        match parse_choice(&line, devices.len()) {
            Ok(choice) => return Ok(choice.map(|index| devices[index].clone())),
            Err(message) => println!("{}", message),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn choices_are_one_based() {
        assert_eq!(parse_choice("1", 2), Ok(Some(0)));
        assert_eq!(parse_choice(" 2\n", 2), Ok(Some(1)));
        assert_eq!(parse_choice("", 2), Ok(None));
        assert!(parse_choice("0", 2).is_err());
        assert!(parse_choice("3", 2).is_err());
        assert!(parse_choice("abc", 2).is_err());
    }

    #[test]
    fn devices_are_found_by_address_ignoring_case() {
        let devices = vec![DeviceDescriptor::new("AA:BB:CC:DD:EE:FF", None)];
        assert!(find_device(&devices, "aa:bb:cc:dd:ee:ff").is_some());
        assert!(find_device(&devices, "11:22:33:44:55:66").is_none());
    }

    #[test]
    fn arguments_parse() {
        let args = Args::try_parse_from(["stress-monitor", "--scan-timeout", "8s", "--device", "AA:BB", "-v"]).unwrap();
        assert_eq!(args.scan_timeout, Some(Duration::from_secs(8)));
        assert_eq!(args.device.as_deref(), Some("AA:BB"));
        assert!(args.verbose);
        assert!(args.config.is_none());
    }
}
