// GUI-subsystem binary: no console window is ever allocated by Windows.
// In CLI mode (--output/-o, --list or --import present) we attach to the
// launching terminal so println!/eprintln! reach it.
#![windows_subsystem = "windows"]

use colorbook::app::ColorbookApp;
use colorbook::{cli, logger};
use eframe::egui;

fn main() -> Result<(), eframe::Error> {
    #[cfg(target_os = "windows")]
    if cli::CliArgs::is_cli_mode() {
        unsafe extern "system" {
            fn AttachConsole(dwProcessId: u32) -> i32;
        }
        const ATTACH_PARENT_PROCESS: u32 = 0xFFFF_FFFF;
        unsafe {
            AttachConsole(ATTACH_PARENT_PROCESS);
        }
    }

    // Overwrites the previous session log
    logger::init();

    // -- CLI / headless mode ---------------------------------------------
    if cli::CliArgs::is_cli_mode() {
        use clap::Parser;
        let args = cli::CliArgs::parse();
        let code = cli::run(args);
        std::process::exit(if code == std::process::ExitCode::SUCCESS {
            0
        } else {
            1
        });
    }

    // -- GUI mode -----------------------------------------------------
    let options = eframe::NativeOptions {
        viewport: egui::ViewportBuilder::default()
            .with_inner_size([1100.0, 760.0])
            .with_min_inner_size([480.0, 360.0])
            .with_title("Colorbook"),
        ..Default::default()
    };

    eframe::run_native(
        "Colorbook",
        options,
        Box::new(|cc| Box::new(ColorbookApp::new(cc))),
    )
}
