use egui::{Color32, Stroke, Style};
use tokio::sync::mpsc;
use std::num::NonZeroU16;
use std::time::Duration;
use lru::LruCache;

use crate::config::AppConfig;
use crate::map::basemap::BasemapSwitcher;
use crate::map::map::{Map, MapState, OverlayTileKey, TileKey};
use crate::map::map_tile::MapTile;
use crate::map::overlay::{DatasetKind, OverlayHandle, PlaceLayer};
use crate::maps_api::error::{LoadError, TileError};
use crate::maps_api::geoserver::GeoServerClient;
use crate::maps_api::loader::OverlayLoader;
use crate::maps_api::tile_retriever::TileRetriever;
use crate::ui::notice::Notice;
use crate::ui::pages::{self, Anchor, PageDocument, PageKind};
use crate::ui::tile_requests::TileRequests;

/// Storage key of the last-visit timestamp.
pub const LAST_VISIT_KEY: &str = "lastVisit";

const MAP_ID: &str = "interactible_map";
/// Delay before re-laying out a freshly built member map.
const RELAYOUT_DELAY: Duration = Duration::from_millis(100);

enum Message {
    BaseTile {
        basemap: u64,
        key: TileKey,
        result: Result<MapTile, TileError>,
    },
    OverlayTile {
        page: u64,
        key: OverlayTileKey,
        result: Result<MapTile, TileError>,
    },
    Overlay {
        page: u64,
        slot: usize,
        kind: DatasetKind,
        result: Result<OverlayHandle, LoadError>,
    },
}

pub struct MyApp {
    config: AppConfig,
    loader: OverlayLoader,
    geoserver: GeoServerClient,
    tile_retriever: TileRetriever,
    basemaps: BasemapSwitcher,
    memory: LruCache<TileKey, MapTile>,
    memory_overlay: LruCache<OverlayTileKey, MapTile>,
    tile_requests: TileRequests<TileKey>,
    overlay_tile_requests: TileRequests<OverlayTileKey>,
    receiver: mpsc::UnboundedReceiver<Message>,
    sender: mpsc::UnboundedSender<Message>,
    runtime: tokio::runtime::Runtime,
    document: PageDocument,
    page: PageKind,
    page_generation: u64,
    overlays: Vec<Option<OverlayHandle>>,
    last_visit: Option<String>,
    notice: Option<Notice>,
}

impl eframe::App for MyApp {
    fn save(&mut self, storage: &mut dyn eframe::Storage) {
        save_last_visit(storage, self.last_visit.as_deref());
    }

    // Map position and widget state live only as long as the window
    fn persist_egui_memory(&self) -> bool {
        false
    }

    fn update(&mut self, ctx: &egui::Context, frame: &mut eframe::Frame) {

        // Test for f11 key, to toggle fullscreen
        if let Some(new_fullscreen) = ctx.input(|i| {
            if i.key_pressed(egui::Key::F11) { Some(!i.viewport().fullscreen.unwrap_or(false)) }
            else                       { None                                            }
        }) {
            ctx.send_viewport_cmd(egui::ViewportCommand::Fullscreen(  new_fullscreen));
            ctx.send_viewport_cmd(egui::ViewportCommand::Decorations(!new_fullscreen));
        }

        self.process_messages();

        let mut navigate_to = None;
        match self.page.clone() {
            PageKind::Landing => navigate_to = self.landing_ui(ctx, frame),
            PageKind::AggregateMap | PageKind::MemberMap { .. } => {
                navigate_to = self.controls_ui(ctx);
                self.map_ui(ctx);
            }
            PageKind::Blank => {
                egui::CentralPanel::default().show(ctx, |ui| {
                    ui.label(format!("Nothing lives at {}", self.document.path));
                    if ui.link("Back to the start").clicked() {
                        navigate_to = Some(pages::LANDING_PATH.to_string());
                    }
                });
            }
        }

        if let Some(notice) = &mut self.notice {
            notice.show(ctx);
            if !notice.is_open() {
                self.notice = None;
            }
        }

        if let Some(path) = navigate_to {
            self.navigate(ctx, &path);
        }
    }
}

impl MyApp {
    pub fn new(cc: &eframe::CreationContext<'_>, config: AppConfig) -> Self {
        cc.egui_ctx.set_style(Self::get_dark_theme_style(&cc.egui_ctx));
        let runtime = tokio::runtime::Builder::new_multi_thread()
            .worker_threads(8) // Set max number of worker threads
            .thread_name("tile-fetcher")
            .enable_all()
            .build()
            .expect("Unable to create runtime");
        let (sender, receiver) = mpsc::unbounded_channel();
        let geoserver = GeoServerClient::new();
        let last_visit = cc.storage.and_then(|s| s.get_string(LAST_VISIT_KEY));
        let start_path = config.start_path.clone();

        let mut app = Self {
            loader: OverlayLoader::new(config.data_dir.clone(), geoserver.clone()),
            geoserver,
            tile_retriever: TileRetriever::new(config.mapbox_token.clone()),
            basemaps: BasemapSwitcher::available(config.mapbox_token.is_some()),
            config,
            memory: LruCache::new(NonZeroU16::new(512).unwrap_or(NonZeroU16::MAX).into()),
            memory_overlay: LruCache::new(NonZeroU16::new(512).unwrap_or(NonZeroU16::MAX).into()),
            tile_requests: TileRequests::new(),
            overlay_tile_requests: TileRequests::new(),
            receiver,
            sender,
            runtime,
            document: PageDocument::default(),
            page: PageKind::Blank,
            page_generation: 0,
            overlays: Vec::new(),
            last_visit,
            notice: None,
        };
        app.navigate(&cc.egui_ctx, &start_path);
        app
    }

    /// Replaces the current page, classifying the new document once and
    /// starting whatever loads it needs.
    fn navigate(&mut self, ctx: &egui::Context, path: &str) {
        self.document = PageDocument::for_route(path);
        self.page = pages::classify(&self.document);
        self.page_generation += 1;
        self.overlays.clear();
        self.memory_overlay.clear();
        self.overlay_tile_requests.clear();
        log::info!("Entering {} as {:?}", path, self.page);

        match self.page.clone() {
            PageKind::Landing => {
                if let Some(last_visit) = &self.last_visit {
                    self.notice = Some(Notice::new("Welcome back", format!("Your last visit was {}", last_visit)));
                }
            }
            PageKind::AggregateMap | PageKind::MemberMap { .. } => self.start_map_page(ctx),
            PageKind::Blank => {}
        }
    }

    fn start_map_page(&mut self, ctx: &egui::Context) {
        if let Some(view) = self.page.initial_view() {
            view.store(ctx, egui::Id::new(MAP_ID));
        }

        let requests = self.page.overlay_requests(&self.config);
        self.overlays = requests.iter().map(|_| None).collect();

        // Started one after the other, each resolved on its own
        for (slot, request) in requests.into_iter().enumerate() {
            let loader = self.loader.clone();
            let sender = self.sender.clone();
            let requester = ctx.clone();
            let page = self.page_generation;
            self.runtime.spawn(async move {
                let result = loader.load_overlay(&request).await;
                let kind = request.kind;
                if sender.send(Message::Overlay { page, slot, kind, result }).is_err() {
                    log::debug!("App closed before the {} overlay resolved", kind);
                }
                requester.request_repaint();
            });
        }

        if matches!(self.page, PageKind::MemberMap { .. }) {
            // The map container can report a zero size on its first frame
            ctx.request_repaint_after(RELAYOUT_DELAY);
        }
    }

    fn process_messages(&mut self) {
        while let Ok(message) = self.receiver.try_recv() {
            match message {
                Message::BaseTile { basemap, key, result } => {
                    if basemap != self.basemaps.generation() {
                        continue;
                    }
                    match result {
                        Ok(tile) => {
                            self.tile_requests.succeeded(&key);
                            self.memory.put(key, tile);
                        }
                        Err(e) => {
                            log::warn!("Error fetching tile {:?}: {}", key, e);
                            self.tile_requests.failed(key);
                        }
                    }
                }
                Message::OverlayTile { page, key, result } => {
                    if page != self.page_generation {
                        continue;
                    }
                    match result {
                        Ok(tile) => {
                            self.overlay_tile_requests.succeeded(&key);
                            self.memory_overlay.put(key, tile);
                        }
                        // An image overlay has no other way to report a bad filter or layer
                        Err(e) => {
                            log::warn!("Error fetching overlay tile {:?}: {}", key, e);
                            self.overlay_tile_requests.failed(key);
                        }
                    }
                }
                Message::Overlay { page, slot, kind, result } => {
                    if page != self.page_generation {
                        continue;
                    }
                    if let Some(entry) = self.overlays.get_mut(slot) {
                        *entry = resolve_overlay(kind, result);
                    }
                }
            }
        }
    }

    fn landing_ui(&mut self, ctx: &egui::Context, frame: &mut eframe::Frame) -> Option<String> {
        let mut navigate_to = None;
        egui::CentralPanel::default().show(ctx, |ui| {
            ui.vertical_centered(|ui| {
                ui.add_space(ui.available_height() / 3.0);
                ui.heading("Footprints");
                ui.label("Places we have been, one pin at a time.");
                ui.add_space(12.0);
                if self.document.has(Anchor::EnterControl) && ui.button("Enter").clicked() {
                    let now = chrono::Local::now().to_rfc3339();
                    if let Some(storage) = frame.storage_mut() {
                        save_last_visit(storage, Some(&now));
                    }
                    self.last_visit = Some(now);
                    navigate_to = Some(pages::AGGREGATE_PATH.to_string());
                }
            });
        });
        navigate_to
    }

    fn controls_ui(&mut self, ctx: &egui::Context) -> Option<String> {
        let mut navigate_to = None;
        let map_id = egui::Id::new(MAP_ID);

        egui::TopBottomPanel::top("controls").show(ctx, |ui| {
            ui.horizontal(|ui| {
                if ui.selectable_label(self.page == PageKind::AggregateMap, "Everyone").clicked() {
                    navigate_to = Some(pages::AGGREGATE_PATH.to_string());
                }
                for member in pages::members() {
                    let current = matches!(&self.page, PageKind::MemberMap { member: Some(m) } if m == member);
                    if ui.selectable_label(current, member).clicked() {
                        navigate_to = Some(pages::member_path(member));
                    }
                }

                ui.separator();

                for (anchor, label, steps) in [(Anchor::ZoomIn, "+", 1.0), (Anchor::ZoomOut, "−", -1.0)] {
                    if self.document.has(anchor) && ui.button(label).clicked() {
                        let mut state = MapState::load(ctx, map_id);
                        state.zoom_by(steps);
                        state.store(ctx, map_id);
                    }
                }

                if self.document.has(Anchor::BasemapSelector) {
                    let mut chosen = None;
                    egui::ComboBox::from_id_salt("basemap")
                        .selected_text(self.basemaps.active().name)
                        .show_ui(ui, |ui| {
                            for definition in self.basemaps.definitions() {
                                let active = definition.name == self.basemaps.active().name;
                                if ui.selectable_label(active, definition.name).clicked() {
                                    chosen = Some(definition.name);
                                }
                            }
                        });
                    if let Some(name) = chosen {
                        self.switch_basemap(name);
                    }
                }
            });
        });
        navigate_to
    }

    fn switch_basemap(&mut self, name: &str) {
        match self.basemaps.select(name) {
            // Detach: the old layer's tiles go, the new layer fills in as it loads
            Ok(true) => {
                self.memory.clear();
                self.tile_requests.clear();
            }
            Ok(false) => {}
            Err(e) => log::warn!("{}", e),
        }
    }

    fn map_ui(&mut self, ctx: &egui::Context) {
        let mut missing_tiles = Vec::new();
        let mut missing_overlay_tiles = Vec::new();

        egui::CentralPanel::default().frame(egui::Frame::none()).show(ctx, |ui| {
            if !self.document.has(Anchor::MapContainer) {
                return;
            }
            // Hide debug info
            ui.style_mut().debug.debug_on_hover = false;

            let map = Map::new(
                MAP_ID,
                &mut self.memory,
                &mut self.memory_overlay,
                &mut missing_tiles,
                &mut missing_overlay_tiles,
            )
            .overlays(&self.overlays)
            .region_field(self.config.polygons.match_field())
            .attribution(self.basemaps.active().attribution);

            ui.add(map);
        });

        for key in missing_tiles {
            // Check if we need to fetch the tile, or are waiting for it
            if !self.tile_requests.begin(key) {
                continue;
            }
            let sender = self.sender.clone();
            let tile_retriever = self.tile_retriever.clone();
            let basemap = self.basemaps.active().clone();
            let generation = self.basemaps.generation();
            let requester = ctx.clone(); // Uses ARC so can be cloned to a new thread cheaply
            let (z, x, y) = key;

            self.runtime.spawn(async move {
                let result = tile_retriever.fetch_tile(&basemap, z, x, y).await;
                let _ = sender.send(Message::BaseTile { basemap: generation, key, result });
                requester.request_repaint();
            });
        }

        for key in missing_overlay_tiles {
            let (slot, z, x, y) = key;
            let Some(Some(OverlayHandle::Wms(layer))) = self.overlays.get(slot) else {
                continue;
            };
            if !self.overlay_tile_requests.begin(key) {
                continue;
            }
            let layer = layer.clone();
            let geoserver = self.geoserver.clone();
            let sender = self.sender.clone();
            let requester = ctx.clone();
            let page = self.page_generation;

            self.runtime.spawn(async move {
                let result = geoserver.fetch_wms_tile(&layer, z, x, y).await;
                let _ = sender.send(Message::OverlayTile { page, key, result });
                requester.request_repaint();
            });
        }
    }

    pub fn get_dark_theme_style(ctx: &egui::Context) -> Style {
        let mut style = (*ctx.style()).clone();

        let primary_bg_color = Color32::from_rgb(32, 33, 36);

        style.visuals = egui::Visuals::dark();
        style.visuals.override_text_color = Some(Color32::LIGHT_GRAY);
        style.visuals.selection.bg_fill = Color32::from_rgb(75, 75, 75);
        style.visuals.selection.stroke = Stroke::new(1.0, Color32::WHITE);
        style.visuals.window_fill = primary_bg_color;
        style.visuals.window_stroke = Stroke::new(1.0, Color32::from_gray(60));
        style.visuals.panel_fill = primary_bg_color;
        style.spacing.button_padding = egui::vec2(8.0, 4.0);

        style
    }
}

/// Writes the one value kept between runs. Nothing else goes to storage.
fn save_last_visit(storage: &mut dyn eframe::Storage, last_visit: Option<&str>) {
    if let Some(last_visit) = last_visit {
        storage.set_string(LAST_VISIT_KEY, last_visit.to_string());
    }
}

/// What a finished load puts on the map. Points always end up with markers,
/// the default set standing in when every tier failed.
fn resolve_overlay(kind: DatasetKind, result: Result<OverlayHandle, LoadError>) -> Option<OverlayHandle> {
    match (kind, result) {
        (_, Ok(handle)) => {
            log::info!("{} overlay ready from {} source", kind, handle.source());
            Some(handle)
        }
        (DatasetKind::Points, Err(e)) => {
            log::warn!("Point overlay unavailable ({}), showing default markers", e);
            Some(OverlayHandle::Markers(PlaceLayer::new(pages::default_places())))
        }
        (DatasetKind::Polygons, Err(e)) => {
            log::warn!("Province overlay unavailable: {}", e);
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::BTreeMap;

    #[derive(Default)]
    struct MemoryStorage(BTreeMap<String, String>);

    impl eframe::Storage for MemoryStorage {
        fn get_string(&self, key: &str) -> Option<String> {
            self.0.get(key).cloned()
        }

        fn set_string(&mut self, key: &str, value: String) {
            self.0.insert(key.to_string(), value);
        }

        fn flush(&mut self) {}
    }

    #[test]
    fn save_writes_only_last_visit() {
        let mut storage = MemoryStorage::default();
        save_last_visit(&mut storage, Some("2026-10-18T09:30:00+08:00"));
        assert_eq!(storage.0.keys().collect::<Vec<_>>(), [LAST_VISIT_KEY]);
        assert_eq!(storage.0[LAST_VISIT_KEY], "2026-10-18T09:30:00+08:00");

        let mut untouched = MemoryStorage::default();
        save_last_visit(&mut untouched, None);
        assert!(untouched.0.is_empty());
    }

    #[test]
    fn failed_points_fall_back_to_default_markers() {
        match resolve_overlay(DatasetKind::Points, Err(LoadError::RemoteDisabled)) {
            Some(OverlayHandle::Markers(layer)) => {
                assert_eq!(layer.places().len(), pages::default_places().len())
            }
            other => panic!("expected default markers, got {:?}", other),
        }
    }

    #[test]
    fn failed_polygons_leave_slot_empty() {
        let result = Err(LoadError::RemoteFetchFailed("connection refused".into()));
        assert!(resolve_overlay(DatasetKind::Polygons, result).is_none());
    }

    #[test]
    fn successful_loads_pass_through() {
        let handle = OverlayHandle::Regions(Vec::new());
        assert!(matches!(
            resolve_overlay(DatasetKind::Polygons, Ok(handle)),
            Some(OverlayHandle::Regions(_))
        ));
    }
}
