pub mod render;
pub mod text;

pub use render::{FrameStats, SkiaRenderer, BUTTON_COLORS};
pub use text::{load_font, render_text_pixmap, TextCache};
