pub mod loader;
pub mod renderer;

pub use loader::{Theme, ThemeInfo};
pub use renderer::ThemeRenderer;
