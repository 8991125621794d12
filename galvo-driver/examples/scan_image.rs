use std::time::Duration;

use clap::{Arg, Command};
use galvo_data::{AxisSweep, ProtocolVariant, ScanConfig, SweepPattern};
use galvo_driver::sim::SimDigitizer;
use galvo_driver::{FrameLink, ScanDriver, ScanStatus};

struct Args {
    port: String,
    points: usize,
    dwell_ms: u64,
}

fn parse_args() -> Args {
    let matches = Command::new("Galvo scan demo.")
        .about("Sweeps a square grid and prints the acquired image as JSON.")
        .disable_version_flag(true)
        .arg(
            Arg::new("port")
                .help("The device path to the galvo's serial port")
                .required(true),
        )
        .arg(
            Arg::new("points")
                .long("points")
                .help("Grid points per axis")
                .default_value("50"),
        )
        .arg(
            Arg::new("dwell")
                .long("dwell")
                .help("Per-pixel dwell in milliseconds")
                .default_value("1"),
        )
        .get_matches();

    let port: &String = matches.get_one("port").unwrap();
    let points: &String = matches.get_one("points").unwrap();
    let dwell: &String = matches.get_one("dwell").unwrap();
    Args {
        port: port.to_string(),
        points: points.parse().expect("points must be an integer"),
        dwell_ms: dwell.parse().expect("dwell must be an integer"),
    }
}

fn main() {
    env_logger::init();
    let args = parse_args();

    let link = FrameLink::open(&args.port).unwrap();

    // A radial test pattern stands in for the real photocurrent signal;
    // swap in a hardware Digitizer to image for real.
    let n = args.points;
    let image: Vec<i16> = (0..n * n)
        .map(|i| {
            let (r, c) = (i / n, i % n);
            let dr = r as f64 - (n as f64) / 2.0;
            let dc = c as f64 - (n as f64) / 2.0;
            (10_000.0 * (-(dr * dr + dc * dc) / (n as f64)).exp()) as i16
        })
        .collect();
    let digitizer = Box::new(SimDigitizer::new(image, 100).with_noise(50));

    let mut driver = ScanDriver::new(link, digitizer, ProtocolVariant::Bits16);
    let config = ScanConfig {
        x: AxisSweep::new(-0.1, 0.1, n),
        y: AxisSweep::new(-0.1, 0.1, n),
        dwell: Duration::from_millis(args.dwell_ms),
        sample_offset: 50,
        pattern: SweepPattern::Raster,
        sample_interval_us: 10,
    };

    driver.start(config).unwrap();
    loop {
        match driver.status() {
            ScanStatus::Running | ScanStatus::Aborting => {
                std::thread::sleep(Duration::from_millis(50));
            }
            ScanStatus::Error => {
                eprintln!("scan failed: {}", driver.take_error().unwrap());
                std::process::exit(1);
            }
            ScanStatus::Idle => break,
        }
    }

    for warning in driver.warnings() {
        eprintln!("warning: {warning:?}");
    }

    let grid = driver.result().expect("grid after completion");
    println!("{}", serde_json::to_string(&grid).unwrap());
}
