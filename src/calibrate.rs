use std::thread;
use std::time::Duration;

use qibla_rs::compass_sensor::{CompassSensor, HardIronCalibration, MagnetometerCalibration};
use simplelog::{ColorChoice, ConfigBuilder, LevelFilter, TermLogger, TerminalMode};

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let log_config = ConfigBuilder::new().set_time_format_rfc3339().build();
    let _ = TermLogger::init(
        LevelFilter::Info,
        log_config,
        TerminalMode::Stderr,
        ColorChoice::Auto,
    );

    println!("╔══════════════════════════════════════════════════════╗");
    println!("║     Magnetometer Calibration Tool                    ║");
    println!("╚══════════════════════════════════════════════════════╝\n");

    println!("Instructions:");
    println!("1. Keep the board LEVEL (horizontal)");
    println!("2. Slowly rotate the board through a FULL 360° circle");
    println!("3. Take at least 30 seconds to complete the rotation");
    println!("4. Press Ctrl+C when done, then copy the offsets into");
    println!("   the [compass] section of ~/.qibla/config.toml\n");

    println!("Starting in 5 seconds...\n");
    thread::sleep(Duration::from_secs(5));

    // raw readings, so no offsets applied
    let mut compass = CompassSensor::new(MagnetometerCalibration {
        x_offset: 0.0,
        y_offset: 0.0,
        heading_offset: 0.0,
    })?;
    let mut calibration = HardIronCalibration::new();

    println!("Collecting samples... (ROTATE NOW!)");
    println!(
        "\n{:^8} | {:^20} | {:^20} | {:^20}",
        "Sample", "X Range", "Y Range", "Calculated Offsets"
    );
    println!("{:-<8}-+-{:-<20}-+-{:-<20}-+-{:-<20}", "", "", "", "");

    loop {
        match compass.read_raw_magnetometer() {
            Ok(Some((x, y))) => {
                calibration.add(x, y);

                // Print update every 10 samples
                if calibration.samples() % 10 == 0
                    && let Some((x_offset, y_offset)) = calibration.offsets()
                {
                    let (x_min, x_max) = calibration.x_range();
                    let (y_min, y_max) = calibration.y_range();
                    println!(
                        "{:^8} | {:>7.0} to {:>7.0} | {:>7.0} to {:>7.0} | X: {:>7.0}  Y: {:>7.0}",
                        calibration.samples(),
                        x_min,
                        x_max,
                        y_min,
                        y_max,
                        x_offset,
                        y_offset
                    );
                }
            }
            Ok(None) => {}
            Err(e) => log::warn!("Read failed: {}", e),
        }

        thread::sleep(Duration::from_millis(100));
    }
}
