// ============================================================================
// Osmosis CLI: headless mosaic export via command-line arguments
// ============================================================================
//
// Usage examples:
//   osmosis -i photo.jpg -o mosaic.png
//   osmosis -i photo.jpg --mode scatter --cells 36 --chaos 80 --seed 7
//   osmosis -i "shots/*.jpg" --preset pills.txt --output-dir out/
//   osmosis -i photo.png --ratio 1:1 --background "#202020" --export-scale 2
//   osmosis -i photo.png --mode grid --raw
//
// No window is opened. Each input is decoded, laid out with the same editor
// state the desktop app uses, and written as PNG.

use std::path::{Path, PathBuf};
use std::process::ExitCode;
use std::time::Instant;

use clap::Parser;

use crate::editor::EditorState;
use crate::io::{ImageSource, load_image_sync};
use crate::render::export::export_to_file;
use crate::settings::EditorSettings;

// ============================================================================
// CLI argument definition (clap Derive)
// ============================================================================

/// Osmosis headless mosaic renderer.
#[derive(Parser, Debug)]
#[command(
    name = "osmosis",
    about = "Osmosis headless mosaic exporter",
    long_about = "Cut images into grid, scatter or palette mosaics and export them as PNG\n\
                  without opening the GUI.\n\n\
                  Example:\n  \
                  osmosis -i photo.jpg -o mosaic.png\n  \
                  osmosis -i \"*.jpg\" --mode scatter --chaos 80 --output-dir out/"
)]
pub struct CliArgs {
    /// Input image(s). Glob patterns accepted (e.g. "*.png", "shots/*.jpg").
    #[arg(short, long, required = true, num_args = 1..)]
    pub input: Vec<String>,

    /// Output PNG path. Only valid for single-file input.
    #[arg(short, long, value_name = "FILE")]
    pub output: Option<PathBuf>,

    /// Output directory for batch processing (`<stem>_osmosis.png` per input).
    #[arg(long, value_name = "DIR")]
    pub output_dir: Option<PathBuf>,

    /// Settings file (`key=value` lines) applied before the flags below.
    #[arg(long, value_name = "FILE")]
    pub preset: Option<PathBuf>,

    /// Layout: grid, scatter, palette.
    #[arg(long)]
    pub mode: Option<String>,

    /// Cell count (1-400). Grid uses round(sqrt(N)) per side.
    #[arg(long, value_name = "N")]
    pub cells: Option<usize>,

    /// Cell content: image or color.
    #[arg(long)]
    pub content: Option<String>,

    /// Cell size, -100..100 (%).
    #[arg(long, allow_hyphen_values = true)]
    pub size: Option<f32>,

    /// Cell spread, -400..400 (%).
    #[arg(long, allow_hyphen_values = true)]
    pub spread: Option<f32>,

    /// Cell tumble, 0..100 (%).
    #[arg(long)]
    pub tumble: Option<f32>,

    /// Corner radius, 0..100 (%).
    #[arg(long)]
    pub radius: Option<f32>,

    /// Scatter chaos, 0..100.
    #[arg(long)]
    pub chaos: Option<f32>,

    /// Scatter zoom, 50..200 (%).
    #[arg(long)]
    pub zoom: Option<f32>,

    /// Crop fit inside each cell: fill or cover.
    #[arg(long)]
    pub fit: Option<String>,

    /// Canvas ratio: original or W:H.
    #[arg(long)]
    pub ratio: Option<String>,

    /// Canvas background: transparent, #rrggbb or image.
    #[arg(long)]
    pub background: Option<String>,

    /// Image drawn (cover-fit) behind the mosaic. Implies `--background image`.
    #[arg(long, value_name = "FILE")]
    pub background_image: Option<PathBuf>,

    /// Content scale inside the canvas, 10..200 (%).
    #[arg(long)]
    pub canvas_scale: Option<f32>,

    /// Output size multiplier (long side = 2000 × scale), at most 8.
    #[arg(long)]
    pub export_scale: Option<f32>,

    /// RNG seed for reproducible scatter/palette layouts and tumble.
    #[arg(long)]
    pub seed: Option<u64>,

    /// Export the bare layout (image-sized grid / tight freestyle crop), no styling.
    #[arg(long)]
    pub raw: bool,

    /// Echo log lines and per-file timing to the terminal.
    #[arg(short, long)]
    pub verbose: bool,
}

impl CliArgs {
    /// Returns `true` when any CLI-mode flag is present in the real process arguments.
    /// Used by `main()` to route before creating an eframe window.
    pub fn is_cli_mode() -> bool {
        std::env::args().any(|a| a == "--input" || a == "-i")
    }

    /// Flag values as settings `key=value` pairs, in the order they apply.
    fn overrides(&self) -> Vec<(&'static str, String)> {
        let mut out = Vec::new();
        let mut push = |key: &'static str, val: Option<String>| {
            if let Some(v) = val {
                out.push((key, v));
            }
        };
        push("mode", self.mode.clone());
        push("cell_count", self.cells.map(|v| v.to_string()));
        push("content_mode", self.content.clone());
        push("cell_size", self.size.map(|v| v.to_string()));
        push("cell_spread", self.spread.map(|v| v.to_string()));
        push("cell_tumble", self.tumble.map(|v| v.to_string()));
        push("cell_border_radius", self.radius.map(|v| v.to_string()));
        push("chaos", self.chaos.map(|v| v.to_string()));
        push("scatter_zoom", self.zoom.map(|v| v.to_string()));
        push("image_fit", self.fit.clone());
        push("canvas_ratio", self.ratio.clone());
        push("background", self.background.clone());
        push("canvas_scale", self.canvas_scale.map(|v| v.to_string()));
        push("export_scale", self.export_scale.map(|v| v.to_string()));
        push("seed", self.seed.map(|v| v.to_string()));
        out
    }
}

/// Defaults, then the preset file, then explicit flags.
pub fn build_settings(args: &CliArgs) -> Result<EditorSettings, String> {
    let mut settings = EditorSettings::default();
    if let Some(path) = &args.preset {
        let content = std::fs::read_to_string(path)
            .map_err(|e| format!("could not read preset '{}': {}", path.display(), e))?;
        if let Some(e) = settings.apply_str(&content).into_iter().next() {
            return Err(format!("preset '{}': {}", path.display(), e));
        }
    }
    for (key, val) in args.overrides() {
        settings.apply(key, &val).map_err(|e| e.to_string())?;
    }
    Ok(settings)
}

// ============================================================================
// Public entry point
// ============================================================================

/// Run all CLI processing and return an OS exit code.
/// `0` = all files succeeded, `1` = one or more files failed.
pub fn run(args: CliArgs) -> ExitCode {
    crate::logger::echo_to_stderr(args.verbose);

    let settings = match build_settings(&args) {
        Ok(s) => s,
        Err(e) => {
            eprintln!("error: {}", e);
            return ExitCode::FAILURE;
        }
    };

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

    let background = match &args.background_image {
        Some(path) => match load_image_sync(path) {
            Ok(img) => Some(img),
            Err(e) => {
                eprintln!("error: could not load background image '{}': {}", path.display(), e);
                return ExitCode::FAILURE;
            }
        },
        None => None,
    };

    if let Some(dir) = &args.output_dir
        && let Err(e) = std::fs::create_dir_all(dir)
    {
        eprintln!("error: could not create output directory '{}': {}", dir.display(), e);
        return ExitCode::FAILURE;
    }

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
            eprintln!("  error: cannot determine output path for '{}'.", input_path.display());
            any_failure = true;
            continue;
        };

        match run_one(input_path, &output_path, &settings, background.as_ref(), args.raw) {
            Ok((w, h)) => {
                if args.verbose || multi {
                    println!(
                        "  → {} {}x{} ({:.0}ms)",
                        output_path.display(),
                        w,
                        h,
                        file_start.elapsed().as_secs_f64() * 1000.0
                    );
                }
            }
            Err(e) => {
                eprintln!("  error: {}", e);
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
    settings: &EditorSettings,
    background: Option<&ImageSource>,
    raw: bool,
) -> Result<(u32, u32), String> {
    let source = load_image_sync(input).map_err(|e| format!("load failed: {}", e))?;

    let mut state = EditorState::new(settings);
    if let Some(bg) = background {
        state.set_background_image(Some(bg.clone()));
    }
    state.load_image(source);

    export_to_file(&state, output, raw).map_err(|e| format!("export failed: {}", e))
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
                    if !result.contains(&entry) {
                        result.push(entry);
                    }
                    matched = true;
                }
                if !matched {
                    eprintln!("warning: pattern '{}' matched no files.", pattern);
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
/// 2. `--output-dir` (batch directory, `<stem>_osmosis.png`)
/// 3. Fallback: next to the input, `<stem>_osmosis.png`
fn build_output_path(input: &Path, output: Option<&Path>, output_dir: Option<&Path>) -> Option<PathBuf> {
    if let Some(out) = output {
        return Some(out.to_path_buf());
    }
    let stem = input.file_stem()?.to_string_lossy().into_owned();
    let name = format!("{}_osmosis.png", stem);
    match output_dir {
        Some(dir) => Some(dir.join(name)),
        None => Some(input.parent().unwrap_or(Path::new(".")).join(name)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::geometry::LayoutMode;
    use crate::params::{Background, CanvasRatio};
    use image::{Rgba, RgbaImage};

    fn parse(args: &[&str]) -> CliArgs {
        CliArgs::try_parse_from(std::iter::once("osmosis").chain(args.iter().copied())).unwrap()
    }

    fn temp_dir(tag: &str) -> PathBuf {
        let dir = std::env::temp_dir().join(format!("osmosis-cli-{}-{}", tag, uuid::Uuid::new_v4()));
        std::fs::create_dir_all(&dir).unwrap();
        dir
    }

    #[test]
    fn flags_become_settings() {
        let args = parse(&[
            "-i", "a.png", "--mode", "scatter", "--cells", "25", "--spread", "-40",
            "--ratio", "16:9", "--background", "#ff0000", "--seed", "3",
        ]);
        let s = build_settings(&args).unwrap();
        assert_eq!(s.mode, LayoutMode::Scatter);
        assert_eq!(s.cell_count, 25);
        assert_eq!(s.style.cell_spread(), -40.0);
        assert_eq!(s.ratio, CanvasRatio::Ratio(16.0, 9.0));
        assert_eq!(s.background, Background::Solid([255, 0, 0]));
        assert_eq!(s.seed, Some(3));
    }

    #[test]
    fn flags_override_preset() {
        let dir = temp_dir("preset");
        let preset = dir.join("p.txt");
        std::fs::write(&preset, "mode=palette\nchaos=70\n").unwrap();
        let args = parse(&["-i", "a.png", "--preset", preset.to_str().unwrap(), "--chaos", "20"]);
        let s = build_settings(&args).unwrap();
        assert_eq!(s.mode, LayoutMode::Palette);
        assert_eq!(s.chaos, 20.0);
        let _ = std::fs::remove_dir_all(&dir);
    }

    #[test]
    fn bad_flag_value_is_an_error() {
        let args = parse(&["-i", "a.png", "--mode", "spiral"]);
        assert!(build_settings(&args).is_err());
        let args = parse(&["-i", "a.png", "--export-scale", "1000"]);
        assert!(build_settings(&args).is_err());
    }

    #[test]
    fn output_paths() {
        let input = Path::new("/pics/cat.jpg");
        assert_eq!(
            build_output_path(input, None, None),
            Some(PathBuf::from("/pics/cat_osmosis.png"))
        );
        assert_eq!(
            build_output_path(input, None, Some(Path::new("out"))),
            Some(PathBuf::from("out/cat_osmosis.png"))
        );
        assert_eq!(
            build_output_path(input, Some(Path::new("x.png")), Some(Path::new("out"))),
            Some(PathBuf::from("x.png"))
        );
    }

    #[test]
    fn glob_inputs_resolve() {
        let dir = temp_dir("glob");
        for name in ["a.png", "b.png", "c.txt"] {
            std::fs::write(dir.join(name), b"x").unwrap();
        }
        let pattern = dir.join("*.png").to_string_lossy().into_owned();
        let found = resolve_inputs(&[pattern.clone(), pattern]);
        assert_eq!(found.len(), 2);
        let _ = std::fs::remove_dir_all(&dir);
    }

    #[test]
    fn end_to_end_export() {
        let dir = temp_dir("run");
        let input = dir.join("src.png");
        crate::io::save_png(&RgbaImage::from_pixel(30, 20, Rgba([5, 6, 7, 255])), &input).unwrap();
        let out = dir.join("out.png");
        let args = parse(&[
            "-i", input.to_str().unwrap(), "-o", out.to_str().unwrap(), "--export-scale", "0.1",
        ]);
        assert_eq!(run(args), ExitCode::SUCCESS);
        let written = image::open(&out).unwrap();
        assert_eq!((written.width(), written.height()), (200, 133));

        let missing = parse(&["-i", dir.join("nope.png").to_str().unwrap()]);
        assert_eq!(run(missing), ExitCode::FAILURE);
        let _ = std::fs::remove_dir_all(&dir);
    }
}
