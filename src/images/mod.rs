//! Poster cache and thumbnail workers.
//!
//! Downloaded posters are stored by entry id, each with a downscaled
//! thumbnail next to it. Display code asks the [`ThumbnailPool`] for a bitmap
//! and receives it later through the delivery queue.

pub mod pool;
pub mod storage;
pub mod thumbnails;

pub use pool::{ThumbnailPool, ThumbnailStats};
pub use storage::PosterStore;
pub use thumbnails::{
    ensure_thumbnail, generate_thumbnail, is_thumbnail_fresh, load_display_image, thumbnail_path,
};
