use egui::epaint::{Color32, Pos2, Rect, Shape, Stroke};
use egui::{pos2, vec2, Align2, FontId, Response, Sense, Ui, Vec2, Widget};
use lru::LruCache;

use super::map_tile::{Coordinate, GeoBounds, MapTile};
use super::overlay::{OverlayHandle, PlaceLayer};
use super::features::ProvinceFeature;

/// Logical size of one tile on screen at an integer zoom.
pub const TILE_SIZE: f64 = 256.0;
pub const MIN_ZOOM: f32 = 1.0;
pub const MAX_ZOOM: f32 = 18.0;

/// Pixel radius within which hovering a marker shows its label.
const HOVER_RADIUS: f32 = 8.0;

pub type TileKey = (u32, u32, u32);
/// Overlay slot followed by the tile key.
pub type OverlayTileKey = (usize, u32, u32, u32);

#[derive(Debug, Clone)]
pub struct MapState {
    center: Coordinate,
    zoom: f32,
    dragging: bool,
    drag_start: Option<Pos2>,
}

impl Default for MapState {
    fn default() -> Self {
        Self::new(Coordinate::default(), 2.0)
    }
}

impl MapState {
    pub fn new(center: Coordinate, zoom: f32) -> Self {
        Self {
            center,
            zoom: zoom.clamp(MIN_ZOOM, MAX_ZOOM),
            dragging: false,
            drag_start: None,
        }
    }

    /// View state is kept in temporary egui memory, never written to storage.
    pub fn load(ctx: &egui::Context, id: egui::Id) -> Self {
        ctx.data_mut(|d| d.get_temp::<Self>(id).unwrap_or_default())
    }

    pub fn store(self, ctx: &egui::Context, id: egui::Id) {
        ctx.data_mut(|d| d.insert_temp(id, self));
    }

    pub fn zoom(&self) -> f32 {
        self.zoom
    }

    /// Whole zoom steps, as the zoom buttons use them.
    pub fn zoom_by(&mut self, steps: f32) {
        self.zoom = (self.zoom.round() + steps).clamp(MIN_ZOOM, MAX_ZOOM);
    }

    fn tile_zoom(&self) -> u32 {
        self.zoom.floor() as u32
    }

    fn world_center(&self) -> (f64, f64) {
        self.center.to_world_pixels(self.zoom as f64, TILE_SIZE)
    }

    fn to_screen(&self, rect: Rect, coord: &Coordinate) -> Pos2 {
        let (cx, cy) = self.world_center();
        let (x, y) = coord.to_world_pixels(self.zoom as f64, TILE_SIZE);
        rect.center() + vec2((x - cx) as f32, (y - cy) as f32)
    }

    fn from_screen(&self, rect: Rect, pos: Pos2) -> Coordinate {
        let (cx, cy) = self.world_center();
        let offset = pos - rect.center();
        Coordinate::from_world_pixels(cx + offset.x as f64, cy + offset.y as f64, self.zoom as f64, TILE_SIZE)
    }

    fn visible_bounds(&self, rect: Rect) -> GeoBounds {
        let north_west = self.from_screen(rect, rect.left_top());
        let south_east = self.from_screen(rect, rect.right_bottom());
        GeoBounds::new(south_east.latitude(), north_west.longitude(), north_west.latitude(), south_east.longitude())
    }

    /// Tiles of the integer zoom covering `rect`, with their screen rects.
    fn visible_tiles(&self, rect: Rect) -> Vec<(TileKey, Rect)> {
        let z = self.tile_zoom();
        let n = 2_i64.pow(z);
        let scale = 2.0_f64.powf(self.zoom as f64 - z as f64);
        let tile_px = TILE_SIZE * scale;
        let (cx, cy) = self.world_center();
        let half_w = rect.width() as f64 / 2.0;
        let half_h = rect.height() as f64 / 2.0;

        let range = |c: f64, half: f64| {
            let min = ((c - half) / tile_px).floor() as i64;
            let max = ((c + half) / tile_px).floor() as i64;
            min.max(0)..=max.min(n - 1)
        };

        let mut tiles = Vec::new();
        for x in range(cx, half_w) {
            for y in range(cy, half_h) {
                let min = rect.center()
                    + vec2((x as f64 * tile_px - cx) as f32, (y as f64 * tile_px - cy) as f32);
                let tile_rect = Rect::from_min_size(min, Vec2::splat(tile_px as f32));
                tiles.push(((z, x as u32, y as u32), tile_rect));
            }
        }
        tiles
    }
}

pub struct Map<'a> {
    id: egui::Id,
    tile_cache: &'a mut LruCache<TileKey, MapTile>,
    overlay_cache: &'a mut LruCache<OverlayTileKey, MapTile>,
    overlays: &'a [Option<OverlayHandle>],
    region_field: &'a str,
    attribution: &'a str,
    missing_tiles: &'a mut Vec<TileKey>,
    missing_overlay_tiles: &'a mut Vec<OverlayTileKey>,
}

impl<'a> Widget for Map<'a> {
    fn ui(self, ui: &mut Ui) -> Response {
        let mut state = MapState::load(ui.ctx(), self.id);

        let size = ui.available_size();
        let (rect, response) = ui.allocate_exact_size(size, Sense::click_and_drag());

        // Nothing sensible to draw into a collapsed container
        if rect.width() < 1.0 || rect.height() < 1.0 {
            state.store(ui.ctx(), self.id);
            return response;
        }

        let map_painter = ui.painter().with_clip_rect(rect);
        map_painter.rect_filled(rect, 0.0, Color32::from_rgb(170, 211, 223));

        // Handle interactions
        if response.dragged() {
            if !state.dragging {
                state.drag_start = response.hover_pos();
                state.dragging = true;
            }
            if let (Some(current_pos), Some(start_pos)) = (response.hover_pos(), state.drag_start) {
                let delta = current_pos - start_pos;
                let (cx, cy) = state.world_center();
                state.center = Coordinate::from_world_pixels(
                    cx - delta.x as f64,
                    cy - delta.y as f64,
                    state.zoom as f64,
                    TILE_SIZE,
                );
                state.drag_start = Some(current_pos);
            }
        } else if state.dragging {
            state.dragging = false;
            state.drag_start = None;
        }

        if response.hovered() {
            let mut zoomed = false;
            // Handle zoom for pinch / touch
            let zoom_delta = ui.input(|i| i.zoom_delta()) - 1.0;
            if zoom_delta.abs() > f32::EPSILON {
                state.zoom = (state.zoom + zoom_delta.clamp(-1.0, 1.0)).clamp(MIN_ZOOM, MAX_ZOOM);
                zoomed = true;
            }

            // Handle zoom for scroll
            let scroll = ui.input(|i| i.smooth_scroll_delta).y;
            if scroll.abs() > f32::EPSILON && !zoomed {
                // Normalize scroll further using tanh
                state.zoom = (state.zoom + (scroll / 10.0).tanh()).clamp(MIN_ZOOM, MAX_ZOOM);
            }
        }

        let visible_tiles = state.visible_tiles(rect);

        for (key, tile_rect) in &visible_tiles {
            if let Some(tile) = self.tile_cache.get_mut(key) {
                let texture = tile.texture(ui.ctx());
                map_painter.image(
                    texture.id(),
                    *tile_rect,
                    Rect::from_min_max(pos2(0.0, 0.0), pos2(1.0, 1.0)),
                    Color32::WHITE,
                );
            } else {
                self.missing_tiles.push(*key);
                map_painter.rect_filled(tile_rect.shrink(0.5), 0.0, Color32::from_gray(200));
            }
        }

        let view_bounds = state.visible_bounds(rect);

        for (slot, overlay) in self.overlays.iter().enumerate() {
            match overlay {
                Some(OverlayHandle::Wms(_)) => {
                    for ((z, x, y), tile_rect) in &visible_tiles {
                        let key = (slot, *z, *x, *y);
                        match self.overlay_cache.get_mut(&key) {
                            Some(tile) => {
                                let texture = tile.texture(ui.ctx());
                                map_painter.image(
                                    texture.id(),
                                    *tile_rect,
                                    Rect::from_min_max(pos2(0.0, 0.0), pos2(1.0, 1.0)),
                                    Color32::WHITE,
                                );
                            }
                            None => self.missing_overlay_tiles.push(key),
                        }
                    }
                }
                Some(OverlayHandle::Regions(regions)) => {
                    paint_regions(&map_painter, &state, rect, &view_bounds, regions, self.region_field);
                }
                Some(OverlayHandle::Markers(_)) | None => {}
            }
        }

        // Markers always sit above region layers
        for overlay in self.overlays.iter().flatten() {
            if let OverlayHandle::Markers(layer) = overlay {
                paint_markers(&map_painter, &state, rect, layer, response.hover_pos());
            }
        }

        if !self.attribution.is_empty() {
            map_painter.text(
                rect.right_bottom() - vec2(4.0, 2.0),
                Align2::RIGHT_BOTTOM,
                self.attribution,
                FontId::proportional(11.0),
                Color32::from_gray(60),
            );
        }

        // Store updated state
        state.store(ui.ctx(), self.id);

        response
    }
}

// egui only tessellates convex fills correctly, so regions are outlined.
fn paint_regions(
    painter: &egui::Painter,
    state: &MapState,
    rect: Rect,
    view_bounds: &GeoBounds,
    regions: &[ProvinceFeature],
    name_field: &str,
) {
    let stroke = Stroke::new(2.0, Color32::from_rgb(192, 86, 26));
    for region in regions {
        let Some(bounds) = region.bounds else { continue };
        if !bounds.intersects(view_bounds) {
            continue;
        }
        for ring in &region.rings {
            let points: Vec<Pos2> = ring.iter().map(|c| state.to_screen(rect, c)).collect();
            if points.len() > 2 {
                painter.add(Shape::closed_line(points, stroke));
            }
        }
        if let Some(name) = region.name(name_field) {
            painter.text(
                state.to_screen(rect, &bounds.center()),
                Align2::CENTER_CENTER,
                name,
                FontId::proportional(12.0),
                Color32::from_rgb(120, 50, 10),
            );
        }
    }
}

fn paint_markers(painter: &egui::Painter, state: &MapState, rect: Rect, layer: &PlaceLayer, hover: Option<Pos2>) {
    for place in layer.places() {
        let pos = state.to_screen(rect, &place.coordinates);
        if rect.expand(HOVER_RADIUS).contains(pos) {
            painter.circle(pos, 5.0, Color32::from_rgb(224, 74, 63), Stroke::new(1.5, Color32::WHITE));
        }
    }

    let Some(hover) = hover else { return };
    let under_pointer = state.from_screen(rect, hover);
    if let Some(place) = layer.nearest(under_pointer.longitude(), under_pointer.latitude()) {
        let pos = state.to_screen(rect, &place.coordinates);
        if pos.distance(hover) <= HOVER_RADIUS {
            let label = format!("{} · {}", place.member, place.location);
            let galley = painter.layout_no_wrap(label, FontId::proportional(14.0), Color32::BLACK);
            let label_rect = Align2::LEFT_BOTTOM.anchor_size(pos + vec2(8.0, -8.0), galley.size());
            painter.rect_filled(label_rect.expand(3.0), 3.0, Color32::from_white_alpha(220));
            painter.galley(label_rect.min, galley, Color32::BLACK);
        }
    }
}

impl<'a> Map<'a> {
    pub fn new(
        id_source: impl std::hash::Hash,
        tile_cache: &'a mut LruCache<TileKey, MapTile>,
        overlay_cache: &'a mut LruCache<OverlayTileKey, MapTile>,
        missing_tiles: &'a mut Vec<TileKey>,
        missing_overlay_tiles: &'a mut Vec<OverlayTileKey>,
    ) -> Self {
        Self {
            id: egui::Id::new(id_source),
            tile_cache,
            overlay_cache,
            overlays: &[],
            region_field: "name",
            attribution: "",
            missing_tiles,
            missing_overlay_tiles,
        }
    }

    pub fn overlays(mut self, overlays: &'a [Option<OverlayHandle>]) -> Self {
        self.overlays = overlays;
        self
    }

    pub fn region_field(mut self, field: &'a str) -> Self {
        self.region_field = field;
        self
    }

    pub fn attribution(mut self, attribution: &'a str) -> Self {
        self.attribution = attribution;
        self
    }
}
