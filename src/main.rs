use std::{env, fmt, fmt::Display, path::PathBuf, process::exit, time::SystemTime};

use cnetbuild::{
    camera::{self, CameraError},
    datum::Datum,
    gcp::{self, GcpError},
    output::{self, OutputError},
    reconstruction::{self, NetworkConfiguration, NetworkError},
    report::{LogListener, ProgressListener, Warning},
};
use indicatif::{ProgressBar, ProgressStyle};

#[derive(Debug)]
pub struct Args {
    cameras: PathBuf,
    config: NetworkConfiguration,
    gcp_files: Vec<PathBuf>,
    datum: Datum,
    output: Option<PathBuf>,
    img_src: Vec<PathBuf>,
}

const USAGE_INSTRUCTIONS: &str = "Usage: cnetbuild [OPTIONS] --cameras=<CAMERAS> <IMG_SRC>...\n\n\
Arguments:\
\n  <IMG_SRC>...  Source images (at least 2)\n\n\
Options:\
\n      --cameras=<CAMERAS>            Camera models file, one camera per image\
\n      --match-prefix=<PREFIX>        Match filename prefix [default: run]\
\n      --min-matches=<MIN_MATCHES>    Minimum matches for a match file to be loaded [default: 30]\
\n      --min-angle=<DEGREES>          Minimum convergence angle for triangulation [default: 0]\
\n      --no-triangulation             Skip triangulation [if unspecified, points will be triangulated]\
\n      --gcp=<GCP>                    Ground control points file, can be specified multiple times\
\n      --datum=<DATUM>                Datum of ground control points [default: wgs84] [possible values: wgs84, moon, mars]\
\n      --output=<OUTPUT>              Write control points into a PLY file\
\n      --help                         Print help";
impl Args {
    fn parse() -> Args {
        let mut cameras = None;
        let mut args = Args {
            cameras: PathBuf::new(),
            config: NetworkConfiguration::default(),
            gcp_files: vec![],
            datum: Datum::wgs84(),
            output: None,
            img_src: vec![],
        };
        let fail_with_error = |name: &str, value: &str, err: &dyn Display| {
            eprintln!(
                "Argument {} has an unsupported value {}: {}",
                name, value, err
            );
            println!("{}", USAGE_INSTRUCTIONS);
            exit(2)
        };
        let mut filenames = vec![];
        for arg in env::args().skip(1) {
            if arg.starts_with("--") && filenames.is_empty() {
                // Option flags.
                if arg == "--no-triangulation" {
                    args.config.triangulate = false;
                    continue;
                }
                if arg == "--help" {
                    println!("{}", USAGE_INSTRUCTIONS);
                    exit(0);
                }
                let (name, value) = if let Some(arg) = arg.split_once('=') {
                    arg
                } else {
                    eprintln!("Option flag {} has no value", arg);
                    println!("{}", USAGE_INSTRUCTIONS);
                    exit(2);
                };
                if name == "--cameras" {
                    cameras = Some(PathBuf::from(value));
                } else if name == "--match-prefix" {
                    args.config.match_prefix = value.to_string();
                } else if name == "--min-matches" {
                    match value.parse() {
                        Ok(min_matches) => args.config.min_matches = min_matches,
                        Err(err) => fail_with_error(name, value, &err),
                    };
                } else if name == "--min-angle" {
                    match value.parse::<f64>() {
                        Ok(min_angle) => args.config.min_angle = min_angle.to_radians(),
                        Err(err) => fail_with_error(name, value, &err),
                    };
                } else if name == "--gcp" {
                    args.gcp_files.push(PathBuf::from(value));
                } else if name == "--datum" {
                    match value.parse() {
                        Ok(datum) => args.datum = datum,
                        Err(err) => fail_with_error(name, value, &err),
                    };
                } else if name == "--output" {
                    args.output = Some(PathBuf::from(value));
                } else {
                    eprintln!("Unsupported argument {}", arg);
                }
            } else {
                filenames.push(PathBuf::from(arg));
            }
        }

        args.cameras = if let Some(cameras) = cameras {
            cameras
        } else {
            eprintln!("No camera models file provided");
            println!("{}", USAGE_INSTRUCTIONS);
            exit(2);
        };
        if filenames.len() < 2 {
            eprintln!(
                "Not enough source images (need at least 2 to match features), but only {} were specified: {:?}",
                filenames.len(),
                filenames
            );
            println!("{}", USAGE_INSTRUCTIONS);
            exit(2);
        }
        args.img_src = filenames;

        args
    }
}

/// Shows progress in the terminal and forwards warnings to the log.
struct ConsoleListener {
    pb: ProgressBar,
}

impl ConsoleListener {
    const PROGRESS_LENGTH: u64 = 10000;

    fn new(message: &'static str) -> ConsoleListener {
        let pb = ProgressBar::new(Self::PROGRESS_LENGTH);
        let style = ProgressStyle::with_template("{msg} {bar:40} {percent}% (eta: {eta})")
            .unwrap_or_else(|_| ProgressStyle::default_bar());
        pb.set_style(style);
        pb.set_message(message);
        ConsoleListener { pb }
    }

    fn finish(&self) {
        self.pb.finish_and_clear();
    }
}

impl ProgressListener for ConsoleListener {
    fn report_status(&self, pos: f32) {
        self.pb
            .set_position((pos * Self::PROGRESS_LENGTH as f32) as u64);
    }

    fn report_warning(&self, warning: &Warning) {
        self.pb.suspend(|| log::warn!("{}", warning));
    }
}

fn print_elapsed(stage: &str, start_time: SystemTime) {
    if let Ok(t) = start_time.elapsed() {
        println!("{} in {:.3} seconds", stage, t.as_secs_f32());
    }
}

fn build_network(args: &Args) -> Result<(), RunError> {
    let start_time = SystemTime::now();

    let camera_models = camera::load_pinhole_cameras(&args.cameras, &args.img_src)?;
    println!(
        "Loaded {} camera models from {}",
        camera_models.len(),
        args.cameras.display()
    );

    let build = {
        let start_time = SystemTime::now();
        let listener = ConsoleListener::new("Triangulating");
        let build = reconstruction::build_control_network(
            &args.config,
            &camera_models,
            &args.img_src,
            Some(&listener),
        );
        listener.finish();
        let build = build?;

        let ingestion = &build.ingestion;
        println!(
            "Loaded {} matches from {} files ({} rejected, {} missing, {} unreadable, {} incompatible)",
            ingestion.loaded,
            ingestion.files_loaded,
            ingestion.files_rejected,
            ingestion.files_missing,
            ingestion.files_unreadable,
            ingestion.files_incompatible
        );
        println!(
            "Network has {} control points with {} measures",
            build.network.len(),
            build.network.measures_len()
        );
        if args.config.triangulate {
            let triangulation = &build.triangulation;
            println!(
                "Triangulated {} points (mean error {:.6}), {} used fallback positions, {} skipped",
                triangulation.triangulated,
                triangulation.mean_error,
                triangulation.fallback,
                triangulation.skipped
            );
        }
        print_elapsed("Built control network", start_time);
        build
    };
    let mut network = build.network;

    if !args.gcp_files.is_empty() {
        // Ground control loading has no progress to show.
        let added = gcp::add_ground_control_points(
            &mut network,
            &args.img_src,
            &args.gcp_files,
            &args.datum,
            Some(&LogListener),
        );
        println!(
            "Added {} ground control points using datum {}",
            added?,
            args.datum.name()
        );
    }

    if let Some(output_path) = &args.output {
        let start_time = SystemTime::now();
        let written = output::write_ply(&network, output_path)?;
        println!("Wrote {} points to {}", written, output_path.display());
        print_elapsed("Saved result", start_time);
    }

    print_elapsed("Completed", start_time);
    Ok(())
}

/// Creates the console logger; warnings are shown unless `filters` says otherwise.
fn build_logger(filters: Option<&str>) -> (impl log::Log + use<>, log::LevelFilter) {
    let mut builder = pretty_env_logger::formatted_builder();
    builder.filter_level(log::LevelFilter::Warn);
    if let Some(filters) = filters {
        builder.parse_filters(filters);
    }
    let logger = builder.build();
    let max_level = logger.filter();
    (logger, max_level)
}

fn init_logger() {
    let (logger, max_level) = build_logger(env::var("RUST_LOG").ok().as_deref());
    match log::set_boxed_logger(Box::new(logger)) {
        Ok(()) => log::set_max_level(max_level),
        Err(err) => eprintln!("Failed to initialize logger: {}", err),
    }
}

fn main() {
    println!(
        "cnetbuild version {}",
        option_env!("CARGO_PKG_VERSION").unwrap_or("unknown")
    );
    init_logger();
    let args = Args::parse();

    if let Err(err) = build_network(&args) {
        println!("Control network build failed, root cause is {}", err);
        exit(1);
    };
}

#[derive(Debug)]
enum RunError {
    Camera(CameraError),
    Network(NetworkError),
    Gcp(GcpError),
    Output(OutputError),
}

impl fmt::Display for RunError {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match *self {
            RunError::Camera(ref err) => write!(f, "Failed to load cameras: {}", err),
            RunError::Network(ref err) => err.fmt(f),
            RunError::Gcp(ref err) => write!(f, "Failed to load ground control: {}", err),
            RunError::Output(ref err) => write!(f, "Failed to save output: {}", err),
        }
    }
}

impl std::error::Error for RunError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match *self {
            RunError::Camera(ref err) => Some(err),
            RunError::Network(ref err) => Some(err),
            RunError::Gcp(ref err) => Some(err),
            RunError::Output(ref err) => Some(err),
        }
    }
}

impl From<CameraError> for RunError {
    fn from(e: CameraError) -> RunError {
        RunError::Camera(e)
    }
}

impl From<NetworkError> for RunError {
    fn from(e: NetworkError) -> RunError {
        RunError::Network(e)
    }
}

impl From<GcpError> for RunError {
    fn from(e: GcpError) -> RunError {
        RunError::Gcp(e)
    }
}

impl From<OutputError> for RunError {
    fn from(e: OutputError) -> RunError {
        RunError::Output(e)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use log::{Level, LevelFilter, Log, Metadata};

    fn enabled(logger: &impl Log, level: Level) -> bool {
        let metadata = Metadata::builder()
            .level(level)
            .target("cnetbuild")
            .build();
        logger.enabled(&metadata)
    }

    #[test]
    fn warnings_are_logged_by_default() {
        let (logger, max_level) = build_logger(None);
        assert_eq!(max_level, LevelFilter::Warn);
        assert!(enabled(&logger, Level::Warn));
        assert!(enabled(&logger, Level::Error));
        assert!(!enabled(&logger, Level::Info));
    }

    #[test]
    fn filters_override_default_level() {
        let (logger, max_level) = build_logger(Some("debug"));
        assert_eq!(max_level, LevelFilter::Debug);
        assert!(enabled(&logger, Level::Debug));

        let (logger, max_level) = build_logger(Some("error"));
        assert_eq!(max_level, LevelFilter::Error);
        assert!(!enabled(&logger, Level::Warn));
    }
}
