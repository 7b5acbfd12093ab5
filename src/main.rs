#![warn(clippy::all, rust_2018_idioms)]
#![cfg_attr(not(debug_assertions), windows_subsystem = "windows")] 

mod config;
mod ui;
mod map;
mod maps_api;

#[cfg(not(target_arch = "wasm32"))]
fn main() -> eframe::Result<()> {
    env_logger::init(); 

    let config = config::AppConfig::from_env();
    log::info!(
        "Static data in {}, GeoServer {}",
        config.data_dir.display(),
        if config.points.enabled { config.points.base_url.as_str() } else { "disabled" }
    );

    let native_options = eframe::NativeOptions {
        viewport: egui::ViewportBuilder::default()
            .with_inner_size(egui::vec2(1280.0, 800.0))
            .with_min_inner_size(egui::vec2(400.0, 300.0))
            .with_title("Footprints")
            .with_resizable(true)
            .with_decorations(true),
        ..Default::default()
    };

    eframe::run_native(
        "Footprints",
        native_options,
        Box::new(|cc| Ok(Box::new(ui::my_app::MyApp::new(cc, config)))),
    )
}
