//! # Lumen demo
//!
//! Opens one window showing a small tiny-skia scene through the shared-memory
//! presentation backend. Escape or `q` closes it; the window repaints with a
//! new accent colour on every other key.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::Parser;
use log::{error, info};
use tiny_skia::{Color, Point, Rect};

use lumen::painter::{Circle, Gradient, Line, Rectangle, Scene};
use lumen::{Driver, KeyName, LogicalSize, LumenConfig, Window};

const ACCENTS: [(u8, u8, u8); 4] = [(124, 58, 237), (14, 165, 233), (16, 185, 129), (244, 63, 94)];

#[derive(Parser)]
#[command(name = "lumen-demo")]
#[command(about = "Shared-memory Wayland presentation demo")]
#[command(version)]
struct Cli {
    /// Path to configuration file
    #[arg(short, long, default_value = "~/.config/lumen/lumen.toml")]
    config: String,

    /// Enable debug logging
    #[arg(short, long)]
    debug: bool,

    /// Window title
    #[arg(short, long, default_value = "Lumen")]
    title: String,

    /// Initial window width, overriding the configuration
    #[arg(long)]
    width: Option<u32>,

    /// Initial window height, overriding the configuration
    #[arg(long)]
    height: Option<u32>,
}

fn scene(size: LogicalSize, accent: (u8, u8, u8)) -> Scene {
    let accent = Color::from_rgba8(accent.0, accent.1, accent.2, 255);
    let mut scene = Scene::new(Color::from_rgba8(245, 245, 244, 255)).with(Rectangle {
        x: 0.0,
        y: 0.0,
        width: size.width,
        height: 48.0,
        fill: accent,
    });
    if let Some(bounds) = Rect::from_xywh(24.0, 72.0, size.width - 48.0, 32.0) {
        scene = scene.with(Gradient {
            bounds,
            start: accent,
            end: Color::from_rgba8(250, 204, 21, 255),
        });
    }
    scene
        .with(Circle {
            cx: size.width / 2.0,
            cy: size.height / 2.0 + 40.0,
            radius: (size.width.min(size.height) / 5.0).max(4.0),
            fill: accent,
        })
        .with(Line {
            from: Point::from_xy(24.0, size.height - 24.0),
            to: Point::from_xy(size.width - 24.0, size.height - 24.0),
            width: 2.0,
            color: Color::from_rgba8(68, 64, 60, 255),
        })
}

fn install_handlers(window: &Arc<Window>) {
    let accent = Arc::new(AtomicUsize::new(0));
    let weak = Arc::downgrade(window);

    window.set_on_key_down(move |key| {
        let Some(window) = weak.upgrade() else {
            return;
        };
        match key.name {
            Some(KeyName::Escape) | Some(KeyName::Q) => window.close(),
            _ => {
                let next = accent.fetch_add(1, Ordering::Relaxed) + 1;
                let size = window.size();
                let painter = Arc::new(scene(size, ACCENTS[next % ACCENTS.len()]));
                if let Err(e) = window.set_content(painter) {
                    error!("Failed to repaint: {}", e);
                }
            }
        }
    });

    window.set_on_typed_rune(|c| info!("Typed {:?}", c));
    window.set_on_closed(|| info!("Window closed"));
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    // Initialize logging
    if cli.debug {
        env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("debug")).init();
    } else {
        env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();
    }

    info!("Starting Lumen demo");
    info!(
        "Version: {} ({}, built {})",
        lumen::VERSION,
        lumen::GIT_COMMIT,
        lumen::BUILD_DATE
    );

    // Load configuration
    let mut config = match LumenConfig::load(&cli.config) {
        Ok(config) => {
            info!("Configuration loaded from: {}", cli.config);
            config
        }
        Err(e) => {
            error!("Failed to load configuration: {:#}", e);
            info!("Using default configuration");
            LumenConfig::default()
        }
    };

    // Override config with CLI flags
    if let Some(width) = cli.width {
        config.window.default_width = width;
    }
    if let Some(height) = cli.height {
        config.window.default_height = height;
    }
    config.validate().context("Invalid window size")?;

    let driver = Driver::new(config);
    let window = driver
        .create_window(&cli.title)
        .context("Failed to create window")?;
    install_handlers(&window);

    let size = window.size();
    window
        .set_content(Arc::new(scene(size, ACCENTS[0])))
        .context("Failed to paint initial frame")?;

    window.show_and_run().context("Dispatch loop failed")?;
    info!("Lumen demo finished");
    Ok(())
}
