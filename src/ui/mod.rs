pub mod my_app;
pub mod notice;
pub mod pages;
pub mod tile_requests;
