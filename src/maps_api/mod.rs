pub mod cql;
pub mod error;
pub mod geoserver;
pub mod jsonp;
pub mod loader;
pub mod tile_retriever;
