// GUI-subsystem binary on Windows: no console window is allocated in GUI mode.
// In CLI mode (--input/-i present) we attach to the parent terminal so
// println!/eprintln! reach it.
#![windows_subsystem = "windows"]

use eframe::egui;
use epanouident::app::EpanouiDentApp;
use epanouident::{cli, logger};
use std::path::PathBuf;

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

    // Initialize session log (overwrites previous session log)
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
    // Positional arguments are photos to open (e.g. "Open with EpanouiDent").
    let startup_files: Vec<PathBuf> = std::env::args_os()
        .skip(1)
        .map(PathBuf::from)
        .filter(|p| p.is_file())
        .collect();

    let options = eframe::NativeOptions {
        viewport: egui::ViewportBuilder::default()
            .with_inner_size([1280.0, 800.0])
            .with_title("EpanouiDent"),
        ..Default::default()
    };

    eframe::run_native(
        "EpanouiDent",
        options,
        Box::new(|cc| Box::new(EpanouiDentApp::new(cc, startup_files))),
    )
}
