//! Document model types shared by every format adapter.
//!
//! A [`Document`] is an ordered sequence of [`Block`]s plus the [`Asset`]s
//! those blocks reference. Block order is output order.

mod asset;
mod block;
mod document;
mod geometry;
mod table;

pub use asset::{detect_image_extension, normalize_extension, Asset};
pub use block::{Block, DEFAULT_ALT_TEXT, MAX_HEADING_LEVEL};
pub use document::Document;
pub use geometry::{BoundingBox, Region};
pub use table::Table;
