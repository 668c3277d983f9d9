//! Osmosis: cut an image into cells and rearrange them as a grid, a scatter
//! or a palette mosaic, then export the composition as PNG.
//!
//! The library holds everything except the egui host: editor state, layout
//! geometry, the transform pipeline, preview scene, export raster and CLI.

pub mod logger;

pub mod cli;
pub mod color;
pub mod editor;
pub mod geometry;
pub mod io;
pub mod params;
pub mod render;
pub mod scene;
pub mod scheduler;
pub mod settings;
pub mod transform;
