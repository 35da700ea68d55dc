//! Vase demo
//!
//! Two vases on a floor, lit by six coloured point lights orbiting the scene
//! with shadows cast from the first light.
//!
//! Usage: `vase_demo [config.toml|config.ron]`

mod app;
mod config;
mod scene;

use std::process::ExitCode;

use prism_engine::config::Config;
use prism_engine::foundation::logging;

use crate::app::VaseApp;
use crate::config::AppConfig;

fn main() -> ExitCode {
    std::panic::set_hook(Box::new(|panic_info| {
        eprintln!("PANIC occurred: {}", panic_info);
    }));

    let config = match std::env::args().nth(1) {
        Some(path) => match AppConfig::load_from_file(&path) {
            Ok(config) => config,
            Err(e) => {
                eprintln!("Failed to load config {}: {}", path, e);
                return ExitCode::FAILURE;
            }
        },
        None => AppConfig::default(),
    };

    logging::init_with_level(&config.renderer.log_level);
    log::info!("Starting {}", config.renderer.application_name);

    let result = VaseApp::new(config).and_then(|mut app| app.run());
    match result {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            log::error!("Application error: {}", e);
            eprintln!("Error: {}", e);
            ExitCode::FAILURE
        }
    }
}
