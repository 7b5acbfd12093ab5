pub mod basemap;
pub mod features;
pub mod map;
pub mod map_tile;
pub mod overlay;
