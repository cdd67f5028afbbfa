#![windows_subsystem = "windows"]

mod capture;
mod config;
mod recording;
mod ui;

use iced::{window, Size};
use tracing_subscriber::EnvFilter;

fn main() -> iced::Result {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .init();

    let config = config::Config::load().unwrap_or_default();
    let _ = config.ensure_output_dir();
    if config::Config::config_path().is_some_and(|p| !p.exists()) {
        let _ = config.save();
    }

    iced::application(ui::App::title, ui::App::update, ui::App::view)
        .subscription(ui::App::subscription)
        .theme(ui::App::theme)
        .window(window::Settings {
            size: Size::new(520.0, 420.0),
            min_size: Some(Size::new(420.0, 360.0)),
            resizable: true,
            decorations: true,
            ..Default::default()
        })
        .run_with(ui::App::new)
}
