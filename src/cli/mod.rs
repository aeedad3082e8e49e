//! Command-line interface for the labeling pipeline.

use clap::{Parser, Subcommand};
use indicatif::{ProgressBar, ProgressStyle};
use log::{error, info, warn};
use std::io::{self, BufRead, Write};
use std::path::{Path, PathBuf};
use std::time::Instant;

use crate::config::LabelerConfig;
use crate::core::loaders::{self, TriangleMesh};
use crate::core::transforms;
use crate::core::writers;
use crate::processors::ledger::{LabelLedger, LedgerRow};
use crate::processors::session::{seed_scan_counter, Axis, Band, FileQueue, Side};
use crate::processors::workflow::WorkflowController;

/// Default name of the archive produced by `bundle` and at completion.
const DEFAULT_ARCHIVE_NAME: &str = "processed_files.zip";

#[derive(Parser)]
#[command(name = "impression-pipeline")]
#[command(about = "STL impression scan labeling pipeline", version)]
pub struct Cli {
    /// Path to YAML config file
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Increase verbosity
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Interactive labeling session over a directory of STL scans
    Label {
        /// Directory containing the scans to label
        input_dir: PathBuf,
    },

    /// Relabel and reorient a single STL file non-interactively
    Apply {
        /// Input STL file
        file: PathBuf,
        /// Side label: L or R
        #[arg(short, long)]
        side: String,
        /// Band label: 'too short', '1st band', '2nd band' or code 0-2
        #[arg(short, long)]
        band: String,
        /// Rotation about the X axis in degrees
        #[arg(long, default_value_t = 0.0)]
        rx: f64,
        /// Rotation about the Y axis in degrees
        #[arg(long, default_value_t = 0.0)]
        ry: f64,
        /// Rotation about the Z axis in degrees
        #[arg(long, default_value_t = 0.0)]
        rz: f64,
        /// Output directory (defaults to 'processed' next to the input file)
        #[arg(short, long)]
        output_dir: Option<PathBuf>,
    },

    /// Show queue and ledger status for a session directory
    Status {
        /// Directory containing the scans
        input_dir: PathBuf,
    },

    /// Bundle processed outputs plus the ledger into a zip archive
    Bundle {
        /// Directory containing the scans
        input_dir: PathBuf,
        /// Output archive path (defaults to processed_files.zip in the directory)
        #[arg(short, long)]
        output: Option<PathBuf>,
    },
}

/// Create a spinner for indeterminate operations
fn create_spinner(message: &str) -> ProgressBar {
    let pb = ProgressBar::new_spinner();
    pb.set_style(
        ProgressStyle::default_spinner()
            .template("{spinner:.green} {msg}")
            .unwrap(),
    );
    pb.set_message(message.to_string());
    pb.enable_steady_tick(std::time::Duration::from_millis(100));
    pb
}

/// Print a summary box
fn print_summary(title: &str, items: &[(&str, String)]) {
    println!();
    println!("╔════════════════════════════════════════════════════════╗");
    println!("║ {:<54} ║", title);
    println!("╠════════════════════════════════════════════════════════╣");
    for (key, value) in items {
        println!("║ {:<16}: {:<35} ║", key, truncate_value(value, 35));
    }
    println!("╚════════════════════════════════════════════════════════╝");
    println!();
}

/// Shorten a value to at most `max` characters, counting characters rather
/// than bytes so multi-byte paths (e.g. accented file names) never split.
fn truncate_value(value: &str, max: usize) -> String {
    if value.chars().count() <= max {
        value.to_string()
    } else {
        let head: String = value.chars().take(max.saturating_sub(3)).collect();
        format!("{head}...")
    }
}

pub fn run() {
    let cli = Cli::parse();

    env_logger::Builder::new()
        .filter_level(match cli.verbose {
            0 => log::LevelFilter::Warn,
            1 => log::LevelFilter::Info,
            _ => log::LevelFilter::Debug,
        })
        .format_timestamp_secs()
        .init();

    let config = match &cli.config {
        Some(path) => match LabelerConfig::from_yaml(path) {
            Ok(cfg) => {
                info!("Loaded config from: {}", path.display());
                cfg
            }
            Err(e) => {
                warn!(
                    "Failed to load config from {}: {}, using defaults",
                    path.display(),
                    e
                );
                LabelerConfig::default()
            }
        },
        None => LabelerConfig::default(),
    };

    match cli.command {
        Commands::Label { input_dir } => {
            cmd_label(&input_dir, &config);
        }
        Commands::Apply {
            file,
            side,
            band,
            rx,
            ry,
            rz,
            output_dir,
        } => {
            cmd_apply(&file, &side, &band, [rx, ry, rz], output_dir, &config);
        }
        Commands::Status { input_dir } => {
            cmd_status(&input_dir, &config);
        }
        Commands::Bundle { input_dir, output } => {
            cmd_bundle(&input_dir, output, &config);
        }
    }
}

/// One action in the interactive labeling loop.
#[derive(Debug, Clone, PartialEq)]
enum LabelCommand {
    Rotate(Axis, f64),
    Nudge(Axis, f64),
    SelectSide(Side),
    SelectBand(Band),
    Save,
    Skip,
    Show,
    Bundle,
    Help,
    Quit,
}

/// Parse one line of user input into a command.
fn parse_command(line: &str) -> Result<LabelCommand, String> {
    let trimmed = line.trim();
    let (head, rest) = match trimmed.split_once(char::is_whitespace) {
        Some((h, r)) => (h, r.trim()),
        None => (trimmed, ""),
    };

    let axis = |c: char| match c {
        'x' => Axis::X,
        'y' => Axis::Y,
        _ => Axis::Z,
    };

    match head.to_ascii_lowercase().as_str() {
        h @ ("x" | "y" | "z") => {
            let c = h.chars().next().unwrap_or('z');
            if rest.is_empty() {
                return Err(format!("usage: {h} <degrees>"));
            }
            let degrees: f64 = rest
                .parse()
                .map_err(|_| format!("'{rest}' is not a number"))?;
            Ok(LabelCommand::Rotate(axis(c), degrees))
        }
        h @ ("x+" | "y+" | "z+" | "x-" | "y-" | "z-") => {
            let c = h.chars().next().unwrap_or('z');
            let sign = if h.ends_with('+') { 1.0 } else { -1.0 };
            Ok(LabelCommand::Nudge(axis(c), sign))
        }
        "side" => {
            let side: Side = rest.parse().map_err(|e| format!("{e}"))?;
            Ok(LabelCommand::SelectSide(side))
        }
        "band" => {
            let band: Band = rest.parse().map_err(|e| format!("{e}"))?;
            Ok(LabelCommand::SelectBand(band))
        }
        "save" => Ok(LabelCommand::Save),
        "skip" => Ok(LabelCommand::Skip),
        "show" => Ok(LabelCommand::Show),
        "bundle" => Ok(LabelCommand::Bundle),
        "help" | "?" => Ok(LabelCommand::Help),
        "quit" | "q" | "exit" => Ok(LabelCommand::Quit),
        "" => Err("empty command, try 'help'".to_string()),
        other => Err(format!("unknown command '{other}', try 'help'")),
    }
}

fn print_help() {
    println!("Commands:");
    println!("  x <deg> / y <deg> / z <deg>   set a rotation angle (degrees)");
    println!("  x+ x- y+ y- z+ z-             nudge an angle by one step");
    println!("  side L|R                      choose the side label");
    println!("  band <label or 0-2>           choose the canal-length band");
    println!("  save                          export the file and advance");
    println!("  skip                          relocate the file and advance");
    println!("  show                          preview bounds with pending rotation");
    println!("  bundle                        zip processed outputs + ledger");
    println!("  help                          show this message");
    println!("  quit                          leave the session");
}

fn print_preview(controller: &WorkflowController, mesh: &TriangleMesh) {
    let preview = controller.preview(mesh);
    if let Some((min, max)) = preview.bounds() {
        println!(
            "Preview bounds: x [{:.1}, {:.1}]  y [{:.1}, {:.1}]  z [{:.1}, {:.1}]",
            min.x, max.x, min.y, max.y, min.z, max.z
        );
    }
}

fn cmd_label(input_dir: &Path, config: &LabelerConfig) {
    let mut controller = match WorkflowController::open(input_dir, config.clone()) {
        Ok(c) => c,
        Err(e) => {
            error!("Failed to open session: {}", e);
            std::process::exit(1);
        }
    };

    if controller.queue().total() == 0 && controller.ledger().is_empty() {
        println!("No .{} files found in {}", config.output.mesh_extension, input_dir.display());
        return;
    }

    let step = config.rotation.step_deg;
    let stdin = io::stdin();
    let mut lines = stdin.lock().lines();
    let mut loaded: Option<TriangleMesh> = None;
    let mut loaded_pos: Option<usize> = None;

    print_help();

    loop {
        if controller.is_complete() {
            finish_session(&controller, input_dir);
            return;
        }

        // Load the file under the cursor once per position. A load failure
        // blocks the file; the user can skip it or quit and fix the input.
        let pos = controller.queue().position();
        if loaded_pos != Some(pos) {
            loaded_pos = Some(pos);
            loaded = match controller.load_current() {
                Ok(mesh) => {
                    info!(
                        "loaded {} vertices, {} faces",
                        mesh.vertex_count(),
                        mesh.face_count()
                    );
                    Some(mesh)
                }
                Err(e) => {
                    error!("{}", e);
                    println!("This file cannot be displayed; 'skip' it or 'quit' and fix it.");
                    None
                }
            };
        }

        println!();
        println!("{}", controller.view());
        print!("> ");
        let _ = io::stdout().flush();

        let line = match lines.next() {
            Some(Ok(line)) => line,
            _ => return,
        };

        let command = match parse_command(&line) {
            Ok(cmd) => cmd,
            Err(msg) => {
                println!("{msg}");
                continue;
            }
        };

        match command {
            LabelCommand::Rotate(axis, degrees) => {
                if let Err(e) = controller.set_rotation(axis, degrees) {
                    println!("{e}");
                } else if let Some(mesh) = &loaded {
                    print_preview(&controller, mesh);
                }
            }
            LabelCommand::Nudge(axis, sign) => {
                let r = controller.session().rotation;
                let current = match axis {
                    Axis::X => r.x,
                    Axis::Y => r.y,
                    Axis::Z => r.z,
                };
                if let Err(e) = controller.set_rotation(axis, current + sign * step) {
                    println!("{e}");
                } else if let Some(mesh) = &loaded {
                    print_preview(&controller, mesh);
                }
            }
            LabelCommand::SelectSide(side) => controller.select_side(side),
            LabelCommand::SelectBand(band) => controller.select_band(band),
            LabelCommand::Save => match controller.save_current() {
                Ok(outcome) => {
                    println!(
                        "Saved {} as {}",
                        outcome.original_filename, outcome.new_filename
                    );
                    if let Some(e) = outcome.persist_warning {
                        warn!(
                            "output written but ledger update failed ({}); \
                             the row will be rewritten on the next save",
                            e
                        );
                    }
                }
                Err(e) => println!("{e}"),
            },
            LabelCommand::Skip => match controller.skip_current() {
                Ok(dest) => println!("File skipped, moved to {}", dest.display()),
                Err(e) => println!("{e}"),
            },
            LabelCommand::Show => {
                if let Some(mesh) = &loaded {
                    print_preview(&controller, mesh);
                } else {
                    println!("No mesh loaded for this file.");
                }
            }
            LabelCommand::Bundle => {
                bundle_with_spinner(&controller, &input_dir.join(DEFAULT_ARCHIVE_NAME));
            }
            LabelCommand::Help => print_help(),
            LabelCommand::Quit => return,
        }
    }
}

fn finish_session(controller: &WorkflowController, input_dir: &Path) {
    println!();
    println!("{}", controller.view());
    for row in controller.ledger().rows() {
        println!(
            "  {} -> {}  side={} band='{}' rotation=({}, {}, {})",
            row.original_filename,
            row.new_filename,
            row.side,
            row.band,
            row.rotation_x,
            row.rotation_y,
            row.rotation_z
        );
    }
    bundle_with_spinner(controller, &input_dir.join(DEFAULT_ARCHIVE_NAME));
}

fn bundle_with_spinner(controller: &WorkflowController, archive: &Path) {
    let spinner = create_spinner("Bundling processed files...");
    match controller.bundle(archive) {
        Ok(entries) => {
            spinner.finish_and_clear();
            print_summary(
                "Bundle Complete",
                &[
                    ("Archive", archive.display().to_string()),
                    ("Entries", entries.to_string()),
                ],
            );
        }
        Err(e) => {
            spinner.finish_and_clear();
            error!("Bundling failed: {}", e);
        }
    }
}

fn cmd_apply(
    file: &Path,
    side: &str,
    band: &str,
    angles: [f64; 3],
    output_dir: Option<PathBuf>,
    config: &LabelerConfig,
) {
    let start = Instant::now();

    let side: Side = match side.parse() {
        Ok(s) => s,
        Err(e) => {
            error!("{}", e);
            std::process::exit(1);
        }
    };
    let band: Band = match band.parse() {
        Ok(b) => b,
        Err(e) => {
            error!("{}", e);
            std::process::exit(1);
        }
    };
    let range = config.rotation.min_deg..=config.rotation.max_deg;
    if angles.iter().any(|a| !range.contains(a)) {
        error!(
            "rotation angles must lie in [{}, {}] degrees",
            config.rotation.min_deg, config.rotation.max_deg
        );
        std::process::exit(1);
    }

    let parent = file.parent().unwrap_or(Path::new(".")).to_path_buf();
    let out_dir = output_dir.unwrap_or_else(|| parent.join(&config.output.processed_dir));
    let ledger_path = out_dir
        .parent()
        .unwrap_or(Path::new("."))
        .join(&config.output.ledger_filename);

    let mut mesh = match loaders::load_stl(file) {
        Ok(m) => m,
        Err(e) => {
            error!("Failed to load {}: {}", file.display(), e);
            std::process::exit(1);
        }
    };

    transforms::rotate(&mut mesh, angles[0], angles[1], angles[2]);
    if let Err(e) = transforms::recenter(&mut mesh) {
        error!("Cannot recenter {}: {}", file.display(), e);
        std::process::exit(1);
    }

    let scan_number = seed_scan_counter(&out_dir);
    let new_filename = format!(
        "{}{}_{}.{}",
        scan_number,
        side.code(),
        band.code(),
        config.output.mesh_extension
    );
    let output_path = out_dir.join(&new_filename);
    if let Err(e) = writers::write_stl(&output_path, &mesh, config.output.binary_stl) {
        error!("Export failed: {}", e);
        std::process::exit(1);
    }

    // Ledger only after a successful export.
    let mut ledger = match LabelLedger::load(&ledger_path) {
        Ok(l) => l,
        Err(e) => {
            error!("Cannot read ledger {}: {}", ledger_path.display(), e);
            std::process::exit(1);
        }
    };
    ledger.append(LedgerRow {
        original_filename: file
            .file_name()
            .map(|n| n.to_string_lossy().to_string())
            .unwrap_or_default(),
        new_filename: new_filename.clone(),
        side: side.code().to_string(),
        band: band.label().to_string(),
        rotation_x: angles[0],
        rotation_y: angles[1],
        rotation_z: angles[2],
    });
    if let Err(e) = ledger.persist(&ledger_path) {
        warn!(
            "'{}' was written but the ledger update failed: {}",
            new_filename, e
        );
    }

    print_summary(
        "Apply Complete",
        &[
            ("Input file", file.display().to_string()),
            ("Output file", output_path.display().to_string()),
            ("Side", side.code().to_string()),
            ("Band", band.label().to_string()),
            (
                "Rotation",
                format!("({}, {}, {})", angles[0], angles[1], angles[2]),
            ),
            ("Ledger rows", ledger.len().to_string()),
            ("Duration", format!("{:.2?}", start.elapsed())),
        ],
    );
}

fn cmd_status(input_dir: &Path, config: &LabelerConfig) {
    let spinner = create_spinner("Scanning directory...");

    let queue = match FileQueue::scan(input_dir, &config.output.mesh_extension) {
        Ok(q) => q,
        Err(e) => {
            spinner.finish_and_clear();
            error!("Failed to scan {}: {}", input_dir.display(), e);
            std::process::exit(1);
        }
    };
    let ledger_path = input_dir.join(&config.output.ledger_filename);
    let ledger = match LabelLedger::load(&ledger_path) {
        Ok(l) => l,
        Err(e) => {
            spinner.finish_and_clear();
            error!("Cannot read ledger {}: {}", ledger_path.display(), e);
            std::process::exit(1);
        }
    };
    let processed_dir = input_dir.join(&config.output.processed_dir);
    let next_scan = seed_scan_counter(&processed_dir);

    spinner.finish_and_clear();

    print_summary(
        "Session Status",
        &[
            ("Directory", input_dir.display().to_string()),
            ("Files queued", queue.total().to_string()),
            ("Ledger rows", ledger.len().to_string()),
            ("Next scan number", next_scan.to_string()),
        ],
    );
}

fn cmd_bundle(input_dir: &Path, output: Option<PathBuf>, config: &LabelerConfig) {
    let start = Instant::now();
    let archive = output.unwrap_or_else(|| input_dir.join(DEFAULT_ARCHIVE_NAME));
    let processed_dir = input_dir.join(&config.output.processed_dir);
    let ledger_path = input_dir.join(&config.output.ledger_filename);

    let spinner = create_spinner("Bundling processed files...");

    match writers::write_bundle(&archive, &processed_dir, &ledger_path) {
        Ok(entries) => {
            spinner.finish_and_clear();
            print_summary(
                "Bundle Complete",
                &[
                    ("Directory", input_dir.display().to_string()),
                    ("Archive", archive.display().to_string()),
                    ("Entries", entries.to_string()),
                    ("Duration", format!("{:.2?}", start.elapsed())),
                ],
            );
        }
        Err(e) => {
            spinner.finish_and_clear();
            error!("Bundling failed: {}", e);
            std::process::exit(1);
        }
    }
}
