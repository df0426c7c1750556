use std::path::{Path, PathBuf};
use std::thread;
use std::time::{Duration, Instant};

use chrono::{NaiveDate, NaiveDateTime, Utc};
use clap::{Parser, Subcommand};
use log::{info, warn};
use serde::Serialize;
use simplelog::{ColorChoice, ConfigBuilder, LevelFilter, TermLogger, TerminalMode};

use qibla_rs::Position;
use qibla_rs::clock::{ClockHands, prayer_markers};
use qibla_rs::compass::heading_to_direction_8point;
use qibla_rs::compass_sensor::{MagnetometerSensor, ReplaySensor};
use qibla_rs::config::{self, CliOverrides, FALLBACK_POSITION, ResolvedConfig};
use qibla_rs::content::{QuoteFile, RetryPolicy, fetch_with_retry};
use qibla_rs::hijri::HijriDate;
use qibla_rs::location::{LocationSource, NmeaLocationProvider, StaticLocation, locate_or_fallback};
use qibla_rs::next_prayer::PrayerBoard;
use qibla_rs::orientation::{CompassSession, OrientationSensor, PermissionState};
use qibla_rs::prayer::{DaySchedule, PrayerName};
use qibla_rs::qibla::{QiblaReading, qibla_from};
use qibla_rs::solar::{AsrMadhab, Method, PrayerTimeProvider, SolarCalculator};
use qibla_rs::weather::{WeatherFile, WeatherState, refresh_weather};

#[derive(Parser)]
#[command(name = "qibla-rs", about = "Prayer times, Qibla direction and a live compass")]
struct Args {
    /// Debug logging on stderr
    #[arg(short, long, global = true)]
    verbose: bool,

    #[arg(long, global = true, allow_hyphen_values = true)]
    lat: Option<f64>,

    #[arg(long, global = true, allow_hyphen_values = true)]
    lon: Option<f64>,

    /// Read the position from an NMEA device or log file
    #[arg(long, global = true)]
    nmea: Option<PathBuf>,

    #[arg(long, global = true, value_enum)]
    method: Option<Method>,

    #[arg(long, global = true, value_enum)]
    asr: Option<AsrMadhab>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Bearing and distance to the Kaaba
    Qibla {
        #[arg(long)]
        json: bool,
    },
    /// Prayer schedule with the next prayer marked
    Prayers {
        /// YYYY-MM-DD, today when omitted
        #[arg(long)]
        date: Option<NaiveDate>,
        #[arg(long)]
        json: bool,
        /// Keep running and report each change of the next prayer
        #[arg(long, conflicts_with = "json")]
        watch: bool,
    },
    /// Live compass pointing at the Qibla
    Compass {
        /// Recorded headings instead of the magnetometer
        #[arg(long)]
        replay: Option<PathBuf>,
        #[arg(long, default_value_t = 10)]
        seconds: u64,
    },
    /// Gregorian and Hijri dates
    Calendar {
        #[arg(long)]
        date: Option<NaiveDate>,
    },
    /// Clock hands and prayer markers for now
    Clock,
    /// Current conditions from a saved Open-Meteo response
    Weather { file: PathBuf },
    /// Place name and quote from a JSON file, with retries and a fallback
    Quote { file: PathBuf },
}

#[derive(Serialize)]
struct PrayersView<'a> {
    position: Position,
    source: LocationSource,
    method: Method,
    hijri: HijriDate,
    schedule: &'a DaySchedule,
    next: Option<PrayerName>,
}

#[derive(Serialize)]
struct QiblaView {
    position: Position,
    source: LocationSource,
    qibla: QiblaReading,
    direction: &'static str,
}

fn init_logging(verbose: bool) {
    let log_config = ConfigBuilder::new().set_time_format_rfc3339().build();
    let level = if verbose {
        LevelFilter::Debug
    } else {
        LevelFilter::Warn
    };
    let _ = TermLogger::init(level, log_config, TerminalMode::Stderr, ColorChoice::Auto);
}

fn observer(resolved: &ResolvedConfig, nmea: Option<&Path>) -> (Position, LocationSource) {
    let fallback = resolved.home.unwrap_or(FALLBACK_POSITION);
    match (nmea, resolved.home) {
        (Some(path), _) => match NmeaLocationProvider::open(path) {
            Ok(mut gps) => locate_or_fallback(&mut gps, fallback),
            Err(e) => {
                warn!("Cannot open {}: {}", path.display(), e);
                (fallback, LocationSource::Fallback)
            }
        },
        (None, Some(home)) => locate_or_fallback(&mut StaticLocation(home), FALLBACK_POSITION),
        (None, None) => {
            info!("No location configured, using {}", FALLBACK_POSITION);
            (FALLBACK_POSITION, LocationSource::Fallback)
        }
    }
}

fn calculator(resolved: &ResolvedConfig) -> SolarCalculator {
    SolarCalculator::new(resolved.method, resolved.asr, resolved.utc_offset)
        .with_duha_offset(resolved.duha_offset)
}

fn local_now(resolved: &ResolvedConfig) -> NaiveDateTime {
    Utc::now().with_timezone(&resolved.utc_offset).naive_local()
}

fn print_schedule(board: &PrayerBoard) {
    let Some(schedule) = board.schedule() else {
        return;
    };
    for (entry, is_next) in schedule.entries.iter().zip(board.flags()) {
        println!(
            "{} {:<10} {:<8} {}",
            if is_next { "▶" } else { " " },
            entry.name.to_string(),
            entry.arabic_name,
            entry.time.format("%H:%M")
        );
    }
}

/// A schedule that was opened for today follows the clock into tomorrow;
/// any other day stays on screen as requested.
fn schedule_is_stale(schedule_date: NaiveDate, following_today: bool, now: NaiveDateTime) -> bool {
    following_today && schedule_date != now.date()
}

/// One-second loop; the board re-evaluates every minute and today's schedule
/// is recomputed when the local date rolls over.
fn watch_prayers(
    resolved: &ResolvedConfig,
    position: &Position,
    mut board: PrayerBoard,
) -> qibla_rs::Result<()> {
    let solar = calculator(resolved);
    let following_today = board
        .schedule()
        .is_some_and(|s| s.date == local_now(resolved).date());
    loop {
        thread::sleep(Duration::from_secs(1));
        let now = local_now(resolved);

        let stale = board
            .schedule()
            .is_some_and(|s| schedule_is_stale(s.date, following_today, now));
        let changed = if stale {
            let schedule = solar.schedule(position, now.date())?;
            let before = board.next_entry().map(|e| e.name);
            board.set_schedule(schedule, now);
            before != board.next_entry().map(|e| e.name)
        } else {
            board.tick(now)
        };

        if changed && let Some(entry) = board.next_entry() {
            println!(
                "{} next: {} at {}",
                now.format("%H:%M"),
                entry.name,
                entry.time.format("%H:%M")
            );
        }
    }
}

/// Sensor read failures are logged and polling carries on until the deadline.
fn run_compass<S: OrientationSensor>(
    session: &mut CompassSession<S>,
    seconds: u64,
    poll_interval: Duration,
    stop_when_idle: bool,
) -> qibla_rs::Result<()> {
    let state = session.open()?;
    println!("Compass permission: {}", state);
    if state == PermissionState::Denied {
        session.close();
        return Ok(());
    }

    let deadline = Instant::now() + Duration::from_secs(seconds);
    while Instant::now() < deadline {
        match session.pump() {
            Ok(true) => {
                let readout = session.readout();
                let heading = readout.raw_heading.unwrap_or_default();
                let (direction, _) = heading_to_direction_8point(heading);
                println!(
                    "heading {:>6.1}° {:<3} | dial {:>8.1}° | needle {:>8.1}°",
                    heading,
                    direction.abbreviation(),
                    readout.dial_rotation,
                    readout.needle_rotation
                );
            }
            Ok(false) if stop_when_idle => break,
            Ok(false) => {}
            Err(e) => warn!("Compass read failed: {}", e),
        }
        thread::sleep(poll_interval);
    }

    session.close();
    Ok(())
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let args = Args::parse();
    init_logging(args.verbose);

    let file_config = config::load_config()?;
    let resolved = config::resolve(
        &file_config,
        &CliOverrides {
            latitude: args.lat,
            longitude: args.lon,
            method: args.method,
            asr: args.asr,
        },
    )?;
    let (position, source) = observer(&resolved, args.nmea.as_deref());
    info!("Observer at {} ({:?})", position, source);

    match args.command {
        Command::Qibla { json } => {
            let qibla = qibla_from(&position);
            if json {
                let view = QiblaView {
                    position,
                    source,
                    qibla,
                    direction: qibla.direction().name(),
                };
                println!("{}", serde_json::to_string_pretty(&view)?);
            } else {
                println!("Position: {}", position);
                println!("Qibla:    {}", qibla);
            }
        }
        Command::Prayers { date, json, watch } => {
            let now = local_now(&resolved);
            let date = date.unwrap_or(now.date());
            let schedule = calculator(&resolved).schedule(&position, date)?;
            let mut board = PrayerBoard::new(resolved.selector.clone());
            board.set_schedule(schedule, now);

            let maghrib = board
                .schedule()
                .and_then(|s| s.get(PrayerName::Maghrib))
                .map_or(resolved.selector.maghrib_fallback, |e| e.time);
            let hijri = if date == now.date() {
                HijriDate::at(now, maghrib)
            } else {
                HijriDate::from_gregorian(date)
            };

            if json {
                if let Some(schedule) = board.schedule() {
                    let view = PrayersView {
                        position,
                        source,
                        method: resolved.method,
                        hijri,
                        schedule,
                        next: board.next_entry().map(|e| e.name),
                    };
                    println!("{}", serde_json::to_string_pretty(&view)?);
                }
            } else {
                println!("{} / {} at {}", date.format("%A %-d %B %Y"), hijri, position);
                print_schedule(&board);
            }

            if watch {
                watch_prayers(&resolved, &position, board)?;
            }
        }
        Command::Compass { replay, seconds } => {
            let bearing = qibla_from(&position).bearing;
            println!("Qibla bearing {:.1}° from {}", bearing, position);
            match replay {
                Some(path) => {
                    let mut session = CompassSession::new(ReplaySensor::open(path)?, bearing);
                    run_compass(&mut session, seconds, resolved.poll_interval, true)?;
                }
                None => {
                    let sensor = MagnetometerSensor::new(resolved.calibration);
                    let mut session = CompassSession::new(sensor, bearing);
                    run_compass(&mut session, seconds, resolved.poll_interval, false)?;
                }
            }
        }
        Command::Calendar { date } => {
            let now = local_now(&resolved);
            let date = date.unwrap_or(now.date());
            let hijri = if date == now.date() {
                let maghrib = match calculator(&resolved).schedule(&position, date) {
                    Ok(schedule) => schedule
                        .get(PrayerName::Maghrib)
                        .map_or(resolved.selector.maghrib_fallback, |e| e.time),
                    Err(e) => {
                        warn!("{}", e);
                        resolved.selector.maghrib_fallback
                    }
                };
                HijriDate::at(now, maghrib)
            } else {
                HijriDate::from_gregorian(date)
            };
            println!("Gregorian: {}", date.format("%A %-d %B %Y"));
            println!("Hijri:     {}", hijri);
        }
        Command::Clock => {
            let now = local_now(&resolved);
            let hands = ClockHands::at(now.time());
            println!(
                "{}  hour {:.1}°  minute {:.1}°  second {:.1}°",
                now.format("%H:%M:%S"),
                hands.hour,
                hands.minute,
                hands.second
            );

            let schedule = calculator(&resolved).schedule(&position, now.date())?;
            let mut board = PrayerBoard::new(resolved.selector.clone());
            let next = board.set_schedule(schedule, now);
            if let Some(schedule) = board.schedule() {
                for marker in prayer_markers(schedule, next) {
                    println!(
                        "{} {:<10} {:>6.1}°",
                        if marker.is_next { "▶" } else { " " },
                        marker.name.to_string(),
                        marker.angle
                    );
                }
            }
        }
        Command::Weather { file } => match refresh_weather(&WeatherFile(file), &position) {
            WeatherState::Ready(report) => println!("{}", report),
            WeatherState::NoData => println!("No weather data"),
        },
        Command::Quote { file } => {
            let inspiration = fetch_with_retry(
                &QuoteFile(file),
                &position,
                &RetryPolicy::default(),
                thread::sleep,
            );
            println!("{}", inspiration.place_name);
            println!("\"{}\"", inspiration.quote);
        }
    }

    Ok(())
}
