//! Frame resources shared by every backend: history ring, classification
//! grid, images and the temporal transform pair.

pub mod classification;
pub mod history;
pub mod image;
pub mod transform;

pub use classification::{ClassificationBuffer, SharedTileGrid, TileGrid, TileSize};
pub use history::HistoryStore;
pub use image::{ColorImage, DepthImage, Extent, Image, ImageLayout, Rgba8, luma, pack_rgba8};
pub use transform::TemporalTransform;
