//! Build script for kestrel-firmware
//!
//! - Sets up linker search paths for memory.x
//! - Validates board.toml at compile time and turns it into constants

use std::env;
use std::fmt::Write as _;
use std::fs::{self, File};
use std::io::Write;
use std::path::{Path, PathBuf};

use serde::Deserialize;

fn main() {
    setup_linker();
    let board = load_board();
    validate_board(&board);
    emit_board_config(&board);
}

/// Set up linker search paths for memory.x
fn setup_linker() {
    let out_dir = PathBuf::from(env::var("OUT_DIR").unwrap());

    // Copy memory.x to the output directory
    let memory_x = include_bytes!("memory.x");
    let mut f = File::create(out_dir.join("memory.x")).unwrap();
    f.write_all(memory_x).unwrap();

    // Tell rustc where to find memory.x
    println!("cargo:rustc-link-search={}", out_dir.display());
    println!("cargo:rustc-link-arg-bins=--nmagic");
    println!("cargo:rustc-link-arg-bins=-Tlink.x");
    println!("cargo:rustc-link-arg-bins=-Tdefmt.x");

    // Re-run if memory.x changes
    println!("cargo:rerun-if-changed=memory.x");
    println!("cargo:rerun-if-changed=build.rs");
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct Board {
    clock: ClockSection,
    bus: BusSection,
    display: DisplaySection,
    demo: DemoSection,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct ClockSection {
    hse_hz: u32,
    sysclk_hz: u32,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "lowercase")]
enum Speed {
    Standard,
    Fast,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct BusSection {
    instance: u8,
    speed: Speed,
    timeout_polls: u32,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct DisplaySection {
    address: u8,
    column_offset: u8,
    contrast: u8,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct DemoSection {
    frame_ms: u32,
    rect_width: u32,
    rect_height: u32,
}

/// Read and parse board.toml
fn load_board() -> Board {
    // Re-run if board.toml changes
    println!("cargo:rerun-if-changed=board.toml");

    let config_path = Path::new("board.toml");

    let content = match fs::read_to_string(config_path) {
        Ok(content) => content,
        Err(e) => {
            panic!(
                "\n\
                ╔══════════════════════════════════════════════════════════════════╗\n\
                ║  ERROR: Failed to read board.toml                                ║\n\
                ║                                                                  ║\n\
                ║  Error: {:<56} ║\n\
                ╚══════════════════════════════════════════════════════════════════╝\n",
                e
            );
        }
    };

    match toml::from_str(&content) {
        Ok(board) => board,
        Err(e) => {
            panic!(
                "\n\
                ╔══════════════════════════════════════════════════════════════════╗\n\
                ║  ERROR: Invalid board.toml                                       ║\n\
                ╠══════════════════════════════════════════════════════════════════╣\n\
                {}\n\
                ╚══════════════════════════════════════════════════════════════════╝\n",
                format_error_lines(&e.to_string())
            );
        }
    }
}

/// Format error message lines with box drawing
fn format_error_lines(msg: &str) -> String {
    msg.lines()
        .map(|line| {
            let truncated = if line.chars().count() > 64 {
                format!("{}...", line.chars().take(61).collect::<String>())
            } else {
                line.to_string()
            };
            format!("║  {:<64} ║", truncated)
        })
        .collect::<Vec<_>>()
        .join("\n")
}

/// Range checks the type system cannot express
fn validate_board(board: &Board) {
    const MHZ: u32 = 1_000_000;
    let mut errors = Vec::new();

    let clock = &board.clock;
    if clock.hse_hz % MHZ != 0 || !(4 * MHZ..=26 * MHZ).contains(&clock.hse_hz) {
        errors.push("[clock] hse_hz must be a whole MHz in 4-26 MHz".to_string());
    }
    if clock.sysclk_hz % MHZ != 0 || !(24 * MHZ..=84 * MHZ).contains(&clock.sysclk_hz) {
        errors.push("[clock] sysclk_hz must be a whole MHz in 24-84 MHz".to_string());
    }

    let bus = &board.bus;
    if !(1..=3).contains(&bus.instance) {
        errors.push(format!("[bus] instance {} does not exist (1-3)", bus.instance));
    }
    if bus.timeout_polls == 0 {
        errors.push("[bus] timeout_polls must be at least 1".to_string());
    }

    let display = &board.display;
    // 0x00-0x07 and 0x78-0x7F are reserved bus addresses
    if !(0x08..=0x77).contains(&display.address) {
        errors.push(format!(
            "[display] address {:#04x} is not a usable 7-bit address",
            display.address
        ));
    }
    if display.column_offset > 4 {
        errors.push("[display] column_offset must be 0-4 (132 RAM columns)".to_string());
    }

    let demo = &board.demo;
    if !(1..=1000).contains(&demo.frame_ms) {
        errors.push("[demo] frame_ms must be 1-1000".to_string());
    }
    if !(1..=126).contains(&demo.rect_width) || !(1..=62).contains(&demo.rect_height) {
        errors.push("[demo] rectangle must fit inside 127x63".to_string());
    }

    if !errors.is_empty() {
        panic!(
            "\n\
            ╔══════════════════════════════════════════════════════════════════╗\n\
            ║  ERROR: Invalid board configuration                              ║\n\
            ╠══════════════════════════════════════════════════════════════════╣\n\
            {}\n\
            ╚══════════════════════════════════════════════════════════════════╝\n",
            errors
                .iter()
                .map(|e| format!("║  • {:<62} ║", e))
                .collect::<Vec<_>>()
                .join("\n")
        );
    }

    println!("cargo:warning=board.toml validated successfully");
}

/// Write board_config.rs into OUT_DIR
fn emit_board_config(board: &Board) {
    let speed = match board.bus.speed {
        Speed::Standard => "BusSpeed::Standard",
        Speed::Fast => "BusSpeed::Fast",
    };

    let mut out = String::new();
    out.push_str("// Generated from board.toml by build.rs\n\n");
    let _ = writeln!(out, "pub const HSE_HZ: u32 = {};", board.clock.hse_hz);
    let _ = writeln!(out, "pub const SYSCLK_HZ: u32 = {};", board.clock.sysclk_hz);
    let _ = writeln!(out, "pub const I2C_INSTANCE: u8 = {};", board.bus.instance);
    let _ = writeln!(out, "pub const BUS_SPEED: BusSpeed = {};", speed);
    let _ = writeln!(out, "pub const TIMEOUT_POLLS: u32 = {};", board.bus.timeout_polls);
    let _ = writeln!(out, "pub const DISPLAY_ADDRESS: u8 = {:#04x};", board.display.address);
    let _ = writeln!(out, "pub const COLUMN_OFFSET: u8 = {};", board.display.column_offset);
    let _ = writeln!(out, "pub const CONTRAST: u8 = {:#04x};", board.display.contrast);
    let _ = writeln!(out, "pub const FRAME_MS: u32 = {};", board.demo.frame_ms);
    let _ = writeln!(out, "pub const RECT_WIDTH: u32 = {};", board.demo.rect_width);
    let _ = writeln!(out, "pub const RECT_HEIGHT: u32 = {};", board.demo.rect_height);

    let out_dir = PathBuf::from(env::var("OUT_DIR").unwrap());
    fs::write(out_dir.join("board_config.rs"), out).unwrap();
}
