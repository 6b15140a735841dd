// ============================================================================
// EpanouiDent CLI - headless batch editing via command-line arguments
// ============================================================================
//
// Usage examples:
//   epanouident --input IMG_0001.JPG --rotate cw --output rotated.png
//   epanouident -i "shots/*.jpg" --remove-background --output-dir cutouts/
//   epanouident -i a.png b.png --gain-red 80 --flip-horizontal --output-dir out/
//
// No GUI is opened in CLI mode. Each file goes through an `EditSession`, the
// same state machine the editor surface drives.

use std::path::{Path, PathBuf};
use std::process::ExitCode;
use std::sync::Arc;
use std::time::{Duration, Instant};

use clap::{Parser, ValueEnum};

use crate::events::EventSink;
use crate::io::SaveFormat;
use crate::ops::adjustments::{Channel, MAX_GAIN};
use crate::ops::segment::{self, Segmenter};
use crate::ops::transform::Transform;
use crate::session::{BackgroundToggle, EditSession};
use crate::settings::AppSettings;

/// How long a batch run waits for one segmentation.
const SEGMENTATION_TIMEOUT: Duration = Duration::from_secs(300);

// ============================================================================
// CLI argument definition (clap Derive)
// ============================================================================

#[derive(Clone, Copy, Debug, PartialEq, Eq, ValueEnum)]
pub enum Rotation {
    /// 90° clockwise
    Cw,
    /// 90° counter-clockwise
    Ccw,
}

/// EpanouiDent headless photo editor.
#[derive(Parser, Debug)]
#[command(
    name = "epanouident",
    about = "EpanouiDent headless batch photo editor",
    long_about = "Flip, rotate, cut out and color-balance clinical photos without\n\
                  opening the editor. Reads PNG, JPEG, BMP, TIFF, WEBP and camera RAW;\n\
                  writes PNG, JPEG, BMP and TIFF.\n\n\
                  Example:\n  \
                  epanouident --input IMG_0001.JPG --rotate cw --output rotated.png\n  \
                  epanouident -i \"shots/*.jpg\" --remove-background --output-dir cutouts/"
)]
pub struct CliArgs {
    /// Input file(s). Glob patterns accepted (e.g. "*.jpg", "shots/*.NEF").
    #[arg(short, long, required = true, num_args = 1..)]
    pub input: Vec<String>,

    /// Output file path. Only valid for single-file input.
    #[arg(short, long, value_name = "FILE")]
    pub output: Option<PathBuf>,

    /// Output directory for batch processing. Files keep their stem and are
    /// written as PNG.
    #[arg(long, value_name = "DIR")]
    pub output_dir: Option<PathBuf>,

    #[arg(long)]
    pub flip_horizontal: bool,

    #[arg(long)]
    pub flip_vertical: bool,

    /// Rotate by a quarter turn after flipping.
    #[arg(long, value_enum, value_name = "DIR")]
    pub rotate: Option<Rotation>,

    /// Cut out the background (ONNX model when configured, border key otherwise).
    #[arg(long)]
    pub remove_background: bool,

    /// Red channel gain, 0–100 percent.
    #[arg(long, value_name = "0-100", value_parser = clap::value_parser!(u8).range(0..=MAX_GAIN as i64))]
    pub gain_red: Option<u8>,

    /// Green channel gain, 0–100 percent.
    #[arg(long, value_name = "0-100", value_parser = clap::value_parser!(u8).range(0..=MAX_GAIN as i64))]
    pub gain_green: Option<u8>,

    /// Blue channel gain, 0–100 percent.
    #[arg(long, value_name = "0-100", value_parser = clap::value_parser!(u8).range(0..=MAX_GAIN as i64))]
    pub gain_blue: Option<u8>,

    /// Print per-file timing and mirror the session log to stderr.
    #[arg(short, long)]
    pub verbose: bool,
}

impl CliArgs {
    /// Returns `true` when any CLI-mode flag is present in the real process arguments.
    /// Used by `main()` to route before creating an eframe window.
    pub fn is_cli_mode() -> bool {
        std::env::args().any(|a| a == "--input" || a == "-i")
    }

    /// Whole-image operations in the order they are applied.
    fn transforms(&self) -> Vec<Transform> {
        let mut ops = Vec::new();
        if self.flip_horizontal {
            ops.push(Transform::FlipHorizontal);
        }
        if self.flip_vertical {
            ops.push(Transform::FlipVertical);
        }
        match self.rotate {
            Some(Rotation::Cw) => ops.push(Transform::RotateCw),
            Some(Rotation::Ccw) => ops.push(Transform::RotateCcw),
            None => {}
        }
        ops
    }

    fn gains(&self) -> Vec<(Channel, u8)> {
        [
            (Channel::Red, self.gain_red),
            (Channel::Green, self.gain_green),
            (Channel::Blue, self.gain_blue),
        ]
        .into_iter()
        .filter_map(|(c, v)| v.map(|v| (c, v)))
        .collect()
    }
}

// ============================================================================
// Public entry point
// ============================================================================

/// Run all CLI processing and return an OS exit code.
/// `0` = all files succeeded, `1` = one or more files failed.
pub fn run(args: CliArgs) -> ExitCode {
    crate::logger::echo_to_stderr(args.verbose);
    if args.verbose
        && let Some(path) = crate::logger::log_path()
    {
        println!("Log: {}", path.display());
    }

    let inputs = resolve_inputs(&args.input);
    if inputs.is_empty() {
        eprintln!("error: no input files matched the given pattern(s).");
        return ExitCode::FAILURE;
    }

    if inputs.len() > 1 && args.output.is_some() && args.output_dir.is_none() {
        eprintln!(
            "error: {} input files given but --output only accepts a single file path.\n\
             Use --output-dir to specify a destination directory for batch processing.",
            inputs.len()
        );
        return ExitCode::FAILURE;
    }

    if let Some(out) = &args.output
        && let Err(e) = SaveFormat::from_path(out)
    {
        eprintln!("error: {}", e);
        return ExitCode::FAILURE;
    }

    if let Some(dir) = &args.output_dir
        && let Err(e) = std::fs::create_dir_all(dir)
    {
        eprintln!(
            "error: could not create output directory '{}': {}",
            dir.display(),
            e
        );
        return ExitCode::FAILURE;
    }

    let settings = AppSettings::load();
    let segmenter = segment::from_settings(&settings);
    let total = inputs.len();
    let multi = total > 1;
    let mut any_failure = false;

    for (idx, input_path) in inputs.iter().enumerate() {
        if multi || args.verbose {
            println!("[{}/{}] {}", idx + 1, total, input_path.display());
        }
        let file_start = Instant::now();

        let Some(output_path) = build_output_path(input_path, args.output.as_deref(), args.output_dir.as_deref())
        else {
            eprintln!(
                "  error: cannot determine output path for '{}'.",
                input_path.display()
            );
            any_failure = true;
            continue;
        };

        match run_one(input_path, &output_path, &args, &settings, segmenter.clone()) {
            Ok(()) => {
                if args.verbose || multi {
                    println!(
                        "  → {} ({:.0}ms)",
                        output_path.display(),
                        file_start.elapsed().as_secs_f64() * 1000.0
                    );
                }
            }
            Err(e) => {
                eprintln!("  error: {}", e);
                crate::log_err!("{}: {}", input_path.display(), e);
                any_failure = true;
            }
        }
    }

    if any_failure { ExitCode::FAILURE } else { ExitCode::SUCCESS }
}

// ============================================================================
// Per-file processing pipeline
// ============================================================================

fn run_one(
    input: &Path,
    output: &Path,
    args: &CliArgs,
    settings: &AppSettings,
    segmenter: Arc<dyn Segmenter>,
) -> Result<(), String> {
    // -- Step 1: Load ----------------------------------------------------
    // Segmentation only runs when the cut-out was asked for.
    let segmenter = args.remove_background.then_some(segmenter);
    let mut session = EditSession::open(input, settings, segmenter, EventSink::detached())
        .map_err(|e| format!("load failed: {}", e))?;

    // -- Step 2: Background ----------------------------------------------
    if args.remove_background {
        if !session.wait_segmentation(SEGMENTATION_TIMEOUT) {
            return Err("background removal timed out".to_string());
        }
        match session.toggle_background() {
            BackgroundToggle::Removed => {}
            BackgroundToggle::Unavailable(e) => return Err(format!("background removal failed: {}", e)),
            other => return Err(format!("background removal failed: {:?}", other)),
        }
    }

    // -- Step 3: Geometry and color ---------------------------------------
    for t in args.transforms() {
        session.apply_transform(t);
    }
    for (channel, value) in args.gains() {
        session.set_channel_gain(channel, true, value);
    }
    session.apply_gains();

    // -- Step 4: Save ----------------------------------------------------
    session
        .save(output)
        .map_err(|e| format!("save failed: {}", e))
}

// ============================================================================
// Helpers
// ============================================================================

/// Expand glob patterns and literal paths into a deduplicated, ordered list.
fn resolve_inputs(patterns: &[String]) -> Vec<PathBuf> {
    let mut result: Vec<PathBuf> = Vec::new();

    for pattern in patterns {
        let as_path = Path::new(pattern);

        if as_path.exists() {
            if !result.iter().any(|p| p.as_path() == as_path) {
                result.push(as_path.to_path_buf());
            }
            continue;
        }

        match glob::glob(pattern) {
            Ok(entries) => {
                let mut matched = false;
                for entry in entries.flatten() {
                    if !crate::io::is_supported_image(&entry) {
                        continue;
                    }
                    if !result.contains(&entry) {
                        result.push(entry);
                    }
                    matched = true;
                }
                if !matched {
                    eprintln!("warning: pattern '{}' matched no images.", pattern);
                }
            }
            Err(e) => {
                eprintln!("warning: invalid glob '{}': {}", pattern, e);
            }
        }
    }

    result
}

/// Compute the output path for a single input file.
///
/// Priority:
/// 1. `--output` (explicit path, used for single-file input)
/// 2. `--output-dir` (batch directory, input stem as PNG)
/// 3. Fallback: next to the input as `<stem>_edited.png`
fn build_output_path(input: &Path, output: Option<&Path>, output_dir: Option<&Path>) -> Option<PathBuf> {
    if let Some(out) = output {
        return Some(out.to_path_buf());
    }

    let ext = SaveFormat::Png.extension();
    let stem = input.file_stem()?.to_string_lossy().into_owned();

    if let Some(dir) = output_dir {
        return Some(dir.join(format!("{}.{}", stem, ext)));
    }

    let parent = input.parent().unwrap_or(Path::new("."));
    Some(parent.join(format!("{}_edited.{}", stem, ext)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ops::segment::testing::CountingSegmenter;

    fn parse(args: &[&str]) -> CliArgs {
        CliArgs::try_parse_from(std::iter::once("epanouident").chain(args.iter().copied())).unwrap()
    }

    #[test]
    fn operations_follow_flags() {
        let args = parse(&["-i", "a.png", "--flip-vertical", "--rotate", "ccw", "--gain-blue", "40"]);
        assert_eq!(args.transforms(), vec![Transform::FlipVertical, Transform::RotateCcw]);
        assert_eq!(args.gains(), vec![(Channel::Blue, 40)]);
        assert!(!args.remove_background);
    }

    #[test]
    fn gain_above_hundred_is_rejected() {
        let result = CliArgs::try_parse_from(["epanouident", "-i", "a.png", "--gain-red", "150"]);
        assert!(result.is_err());
    }

    #[test]
    fn output_path_priority() {
        let input = Path::new("/photos/IMG_1.JPG");
        assert_eq!(
            build_output_path(input, Some(Path::new("/x/out.jpg")), Some(Path::new("/d"))),
            Some(PathBuf::from("/x/out.jpg"))
        );
        assert_eq!(
            build_output_path(input, None, Some(Path::new("/d"))),
            Some(PathBuf::from("/d/IMG_1.png"))
        );
        assert_eq!(
            build_output_path(input, None, None),
            Some(PathBuf::from("/photos/IMG_1_edited.png"))
        );
    }

    #[test]
    fn glob_inputs_keep_only_images() {
        let dir = std::env::temp_dir().join(format!("epanouident-cli-{}", uuid::Uuid::new_v4()));
        std::fs::create_dir_all(&dir).unwrap();
        image::RgbImage::new(2, 2).save(dir.join("a.png")).unwrap();
        std::fs::write(dir.join("notes.txt"), "x").unwrap();

        let pattern = format!("{}/*", dir.display());
        let inputs = resolve_inputs(&[pattern]);
        assert_eq!(inputs, vec![dir.join("a.png")]);
    }

    #[test]
    fn run_one_rotates_and_saves() {
        let dir = std::env::temp_dir().join(format!("epanouident-cli-{}", uuid::Uuid::new_v4()));
        std::fs::create_dir_all(&dir).unwrap();
        let input = dir.join("in.png");
        image::RgbImage::from_pixel(6, 3, image::Rgb([100, 100, 100]))
            .save(&input)
            .unwrap();
        let output = dir.join("out.png");

        let args = parse(&["-i", "in.png", "--rotate", "cw", "--gain-red", "50"]);
        let settings = AppSettings::default();
        run_one(&input, &output, &args, &settings, segment::from_settings(&settings)).unwrap();

        let saved = image::open(&output).unwrap().to_rgb8();
        assert_eq!(saved.dimensions(), (3, 6));
        assert_eq!(saved.get_pixel(0, 0), &image::Rgb([50, 100, 100]));
    }

    #[test]
    fn segmenter_runs_only_for_remove_background() {
        let dir = std::env::temp_dir().join(format!("epanouident-cli-{}", uuid::Uuid::new_v4()));
        std::fs::create_dir_all(&dir).unwrap();
        let input = dir.join("in.png");
        image::RgbImage::from_pixel(4, 4, image::Rgb([10, 20, 30]))
            .save(&input)
            .unwrap();
        let settings = AppSettings::default();
        let counting = Arc::new(CountingSegmenter::default());

        let args = parse(&["-i", "in.png", "--rotate", "cw"]);
        run_one(&input, &dir.join("plain.png"), &args, &settings, counting.clone()).unwrap();
        std::thread::sleep(Duration::from_millis(300));
        assert_eq!(counting.calls(), 0);

        let args = parse(&["-i", "in.png", "--remove-background"]);
        run_one(&input, &dir.join("cut.png"), &args, &settings, counting.clone()).unwrap();
        assert_eq!(counting.calls(), 1);
        let saved = image::open(dir.join("cut.png")).unwrap().to_rgba8();
        assert_eq!(saved.get_pixel(0, 0)[3], 0);
    }
}
