// ============================================================================
// Colorbook CLI: headless page rendering and template store access
// ============================================================================
//
// Usage examples:
//   colorbook --template house --size 800x600 --fill 400,350 --color #3fa7ff -o page.png
//   colorbook -i owl.png --fill 120,80 --fill 300,90 --pattern dots -o owl_done.png
//   colorbook -i owl.png --store ~/colorbook --import owl --category animals
//   colorbook --store ~/colorbook --list animals
//
// No window is opened in CLI mode. Everything runs on the calling thread.

use std::path::{Path, PathBuf};
use std::process::ExitCode;
use std::time::Instant;

use clap::Parser;
use egui::Pos2;

use crate::components::patterns::PatternKind;
use crate::components::tools::BrushEngine;
use crate::io::{self, FileTemplateStore, STORE_FILE_NAME, TemplateRecord, TemplateStore};
use crate::ops::fill::DEFAULT_TOLERANCE;
use crate::ops::templates::BuiltinTemplate;
use crate::project::Session;
use crate::settings::{PaintSettings, parse_hex_color};
use crate::{log_err, log_info};

// ============================================================================
// CLI argument definition (clap Derive)
// ============================================================================

/// Colorbook headless renderer.
#[derive(Parser, Debug)]
#[command(
    name = "colorbook",
    about = "Colorbook headless page renderer",
    long_about = "Render a colouring page, apply bucket fills, and write a PNG without\n\
                  opening the window. Also imports images into the template store.\n\n\
                  Example:\n  \
                  colorbook --template flower --fill 400,300 --color #ffcc00 -o page.png"
)]
pub struct CliArgs {
    /// Built-in template: flower, house, fish, blank.
    #[arg(short, long, default_value = "flower", value_name = "NAME")]
    pub template: String,

    /// Image to use as the template instead of a built-in one.
    #[arg(short, long, value_name = "FILE")]
    pub input: Option<PathBuf>,

    /// Page size in CSS pixels.
    #[arg(long, default_value = "800x600", value_name = "WxH")]
    pub size: String,

    /// Device pixel ratio. The output is size × dpr pixels.
    #[arg(long, default_value_t = 1.0)]
    pub dpr: f32,

    /// Bucket fill seed in device pixels. Repeatable; applied in order.
    #[arg(long = "fill", value_name = "X,Y")]
    pub fills: Vec<String>,

    /// Fill colour as #rrggbb.
    #[arg(short, long, default_value = "#ff4d6d", value_name = "HEX")]
    pub color: String,

    /// Fill with a pattern: dots, stripes, star, heart, glitter.
    #[arg(short, long, value_name = "PATTERN")]
    pub pattern: Option<String>,

    /// Colour distance a pixel may differ from the seed and still fill.
    #[arg(long, default_value_t = DEFAULT_TOLERANCE)]
    pub tolerance: f32,

    /// Output PNG.
    #[arg(short, long, value_name = "FILE")]
    pub output: Option<PathBuf>,

    /// Template store directory. Defaults to the app data directory.
    #[arg(long, value_name = "DIR")]
    pub store: Option<PathBuf>,

    /// Record --input in the store under this name.
    #[arg(long, value_name = "NAME")]
    pub import: Option<String>,

    /// Category for --import.
    #[arg(long, default_value = "uncategorized")]
    pub category: String,

    /// Print stored template names, optionally for one category.
    #[arg(long, value_name = "CATEGORY", num_args = 0..=1, default_missing_value = "all")]
    pub list: Option<String>,

    /// Print per-step timing.
    #[arg(short, long)]
    pub verbose: bool,
}

impl CliArgs {
    /// Returns `true` when any CLI-mode flag is present in the real process arguments.
    /// Used by `main()` to route before creating an eframe window.
    pub fn is_cli_mode() -> bool {
        std::env::args().skip(1).any(|a| {
            a == "--output" || a == "-o" || a.starts_with("--output=") || a == "--list" || a == "--import"
        })
    }
}

// ============================================================================
// Public entry point
// ============================================================================

/// Run the CLI and return an OS exit code.
pub fn run(args: CliArgs) -> ExitCode {
    match run_inner(&args) {
        Ok(()) => ExitCode::SUCCESS,
        Err(msg) => {
            log_err!("CLI: {}", msg);
            eprintln!("error: {}", msg);
            ExitCode::FAILURE
        }
    }
}

fn run_inner(args: &CliArgs) -> Result<(), String> {
    if args.output.is_none() && args.import.is_none() && args.list.is_none() {
        return Err("nothing to do: give --output, --import or --list".to_string());
    }

    if args.import.is_some() || args.list.is_some() {
        let store_path = store_file(args.store.as_deref());
        let mut store = FileTemplateStore::open(&store_path)
            .map_err(|e| format!("could not open store '{}': {}", store_path.display(), e))?;
        if let Some(name) = &args.import {
            import_into_store(&mut store, args.input.as_deref(), name, &args.category)?;
            println!("imported '{}' into {}", name, args.category);
        }
        if let Some(category) = &args.list {
            let records = store.get_all(category).map_err(|e| e.to_string())?;
            for r in records {
                println!("{}\t{}", r.name, r.category);
            }
        }
    }

    let Some(output) = &args.output else {
        return Ok(());
    };
    let start = Instant::now();
    let session = render(args)?;
    session
        .export(output)
        .map_err(|e| format!("could not write '{}': {}", output.display(), e))?;
    if args.verbose {
        println!(
            "{} ({}x{}) in {:.0?}",
            output.display(),
            session.surface.width(),
            session.surface.height(),
            start.elapsed()
        );
    }
    log_info!("CLI wrote {}", output.display());
    Ok(())
}

fn store_file(dir: Option<&Path>) -> PathBuf {
    match dir {
        Some(d) => d.join(STORE_FILE_NAME),
        None => FileTemplateStore::default_path(),
    }
}

fn import_into_store(
    store: &mut FileTemplateStore,
    input: Option<&Path>,
    name: &str,
    category: &str,
) -> Result<(), String> {
    let Some(input) = input else {
        return Err("--import needs --input".to_string());
    };
    let bytes = std::fs::read(input).map_err(|e| format!("could not read '{}': {}", input.display(), e))?;
    io::decode_image(&bytes).map_err(|e| format!("'{}' is not a readable image: {}", input.display(), e))?;
    let name = if name.trim().is_empty() {
        io::template_name_for(&input.to_string_lossy())
    } else {
        name.to_string()
    };
    store
        .put(TemplateRecord::new(name, bytes, category))
        .map_err(|e| e.to_string())
}

/// Build the page described by `args` and apply its fills.
pub fn render(args: &CliArgs) -> Result<Session, String> {
    let (w, h) = parse_size(&args.size).ok_or_else(|| format!("bad --size '{}', expected WxH", args.size))?;
    let template: BuiltinTemplate = args.template.parse()?;
    let color = parse_hex_color(&args.color).ok_or_else(|| format!("bad --color '{}'", args.color))?;
    let pattern = args
        .pattern
        .as_deref()
        .map(str::parse::<PatternKind>)
        .transpose()?;
    let seeds = args
        .fills
        .iter()
        .map(|s| parse_point(s).ok_or_else(|| format!("bad --fill '{}', expected X,Y", s)))
        .collect::<Result<Vec<_>, _>>()?;

    let prefs = PaintSettings {
        template,
        color,
        fill_tolerance: args.tolerance.max(0.0),
        ..Default::default()
    };
    let mut session = Session::new(w, h, args.dpr, &prefs);
    session.brushes = BrushEngine::with_seed(0);
    session.set_pattern(pattern);

    if let Some(input) = &args.input {
        let img = io::load_image(input).map_err(|e| format!("could not load '{}': {}", input.display(), e))?;
        session.import_template(&io::template_name_for(&input.to_string_lossy()), img, true);
    }

    for seed in seeds {
        if !session.fill_at(seed) {
            eprintln!("warning: fill at {},{} changed nothing", seed.x, seed.y);
        }
    }
    Ok(session)
}

fn parse_size(s: &str) -> Option<(f32, f32)> {
    let (w, h) = s.trim().split_once(['x', 'X'])?;
    let w: f32 = w.trim().parse().ok()?;
    let h: f32 = h.trim().parse().ok()?;
    (w >= 1.0 && h >= 1.0 && w.is_finite() && h.is_finite()).then_some((w, h))
}

fn parse_point(s: &str) -> Option<Pos2> {
    let (x, y) = s.trim().split_once(',')?;
    Some(Pos2::new(x.trim().parse().ok()?, y.trim().parse().ok()?))
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::Rgba;

    fn args(extra: &[&str]) -> CliArgs {
        let mut argv = vec!["colorbook"];
        argv.extend_from_slice(extra);
        CliArgs::try_parse_from(argv).unwrap()
    }

    #[test]
    fn parses_sizes_and_points() {
        assert_eq!(parse_size("800x600"), Some((800.0, 600.0)));
        assert_eq!(parse_size(" 10 X 20 "), Some((10.0, 20.0)));
        assert_eq!(parse_size("0x20"), None);
        assert_eq!(parse_size("wide"), None);
        assert_eq!(parse_point("3,4.5"), Some(Pos2::new(3.0, 4.5)));
        assert_eq!(parse_point("3;4"), None);
    }

    #[test]
    fn list_flag_defaults_to_all() {
        assert_eq!(args(&["--list"]).list.as_deref(), Some("all"));
        assert_eq!(args(&["--list", "animals"]).list.as_deref(), Some("animals"));
        assert_eq!(args(&[]).list, None);
    }

    #[test]
    fn renders_a_blank_page_with_fills() {
        let a = args(&["--template", "blank", "--size", "40x30", "--fill", "5,5", "--color", "#00ff00"]);
        let session = render(&a).unwrap();
        let page = session.surface.export_flattened();
        assert_eq!(page.dimensions(), (40, 30));
        assert!(page.pixels().all(|p| *p == Rgba([0, 255, 0, 255])));
    }

    #[test]
    fn dpr_scales_the_output() {
        let a = args(&["--template", "house", "--size", "50x40", "--dpr", "2"]);
        let session = render(&a).unwrap();
        assert_eq!((session.surface.width(), session.surface.height()), (100, 80));
    }

    #[test]
    fn bad_values_are_reported() {
        assert!(render(&args(&["--template", "castle"])).is_err());
        assert!(render(&args(&["--color", "pink"])).is_err());
        assert!(render(&args(&["--pattern", "plaid"])).is_err());
        assert!(render(&args(&["--fill", "nowhere"])).is_err());
        assert!(run_inner(&args(&[])).is_err());
    }

    #[test]
    fn import_needs_an_input() {
        let dir = std::env::temp_dir().join(format!("colorbook-cli-{}", std::process::id()));
        let mut store = FileTemplateStore::open(dir.join(STORE_FILE_NAME)).unwrap();
        assert!(import_into_store(&mut store, None, "x", "animals").is_err());
        assert!(store.is_empty());
    }
}
