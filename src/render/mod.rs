//! Rendering module for converting documents to output formats.

mod json;
mod markdown;
mod result;

pub use json::{to_json, JsonFormat};
pub use markdown::{to_markdown, to_markdown_with_stats, MarkdownRenderer};
pub use result::{RenderResult, RenderStats};
