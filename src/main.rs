// Windows builds link as a GUI binary. CLI mode attaches to the parent
// console and reopens CONOUT$ so stdout/stderr reach the terminal.
#![windows_subsystem = "windows"]

mod app;

use app::OsmosisApp;
use eframe::egui;
use osmosis::settings::EditorSettings;
use osmosis::{cli, logger};

fn main() -> Result<(), eframe::Error> {
    #[cfg(target_os = "windows")]
    if cli::CliArgs::is_cli_mode() {
        attach_parent_console();
    }

    // -- CLI / headless mode ---------------------------------------------
    if cli::CliArgs::is_cli_mode() {
        use clap::Parser;
        let args = cli::CliArgs::parse();
        let code = cli::run(args);
        std::process::exit(if code == std::process::ExitCode::SUCCESS { 0 } else { 1 });
    }

    // -- GUI mode -----------------------------------------------------
    logger::init();
    let settings = EditorSettings::load();

    let options = eframe::NativeOptions {
        viewport: egui::ViewportBuilder::default()
            .with_inner_size([1280.0, 800.0])
            .with_min_inner_size([720.0, 480.0])
            .with_title("Osmosis")
            .with_icon(std::sync::Arc::new(app_icon())),
        ..Default::default()
    };

    eframe::run_native(
        "Osmosis",
        options,
        Box::new(|cc| Box::new(OsmosisApp::new(cc, settings))),
    )
}

/// 2×2 mosaic of rounded tiles, drawn at startup.
fn app_icon() -> egui::viewport::IconData {
    const SIZE: u32 = 64;
    const TILES: [[u8; 3]; 4] = [[232, 93, 74], [247, 183, 51], [64, 145, 214], [76, 175, 120]];
    let half = SIZE / 2;
    let img = image::RgbaImage::from_fn(SIZE, SIZE, |x, y| {
        let tile = TILES[((y / half) * 2 + x / half) as usize];
        // Local coordinates inside the tile, 3px gutter, 7px corner radius.
        let lx = (x % half) as f32 + 0.5 - half as f32 * 0.5;
        let ly = (y % half) as f32 + 0.5 - half as f32 * 0.5;
        let extent = half as f32 * 0.5 - 3.0;
        let r = 7.0;
        let qx = (lx.abs() - (extent - r)).max(0.0);
        let qy = (ly.abs() - (extent - r)).max(0.0);
        let inside = lx.abs() <= extent && ly.abs() <= extent && (qx * qx + qy * qy).sqrt() <= r;
        if inside {
            image::Rgba([tile[0], tile[1], tile[2], 255])
        } else {
            image::Rgba([0, 0, 0, 0])
        }
    });
    egui::viewport::IconData {
        rgba: img.into_raw(),
        width: SIZE,
        height: SIZE,
    }
}

#[cfg(target_os = "windows")]
fn attach_parent_console() {
    unsafe extern "system" {
        fn AttachConsole(dwProcessId: u32) -> i32;
        fn SetStdHandle(nStdHandle: u32, hHandle: isize) -> i32;
        fn CreateFileW(
            lpFileName: *const u16,
            dwDesiredAccess: u32,
            dwShareMode: u32,
            lpSecurityAttributes: *const std::ffi::c_void,
            dwCreationDisposition: u32,
            dwFlagsAndAttributes: u32,
            hTemplateFile: isize,
        ) -> isize;
    }
    const ATTACH_PARENT_PROCESS: u32 = 0xFFFF_FFFF;
    const GENERIC_WRITE: u32 = 0x4000_0000;
    const FILE_SHARE_READ_WRITE: u32 = 0x0000_0003;
    const OPEN_EXISTING: u32 = 3;
    const STD_OUTPUT_HANDLE: u32 = 0xFFFF_FFF5_u32;
    const STD_ERROR_HANDLE: u32 = 0xFFFF_FFF4_u32;
    const INVALID_HANDLE_VALUE: isize = -1;
    unsafe {
        AttachConsole(ATTACH_PARENT_PROCESS);
        let conout: Vec<u16> = "CONOUT$\0".encode_utf16().collect();
        let hout = CreateFileW(
            conout.as_ptr(),
            GENERIC_WRITE,
            FILE_SHARE_READ_WRITE,
            std::ptr::null(),
            OPEN_EXISTING,
            0,
            0,
        );
        if hout != INVALID_HANDLE_VALUE {
            SetStdHandle(STD_OUTPUT_HANDLE, hout);
            SetStdHandle(STD_ERROR_HANDLE, hout);
        }
    }
}
