pub mod cms;
pub mod core;
pub mod models;
pub mod theme;
pub mod utils;

// Re-export commonly used types and traits
pub use crate::cms::{BridgeExtension, CmsError, Component, Controller, PageController};
pub use crate::models::{Config, Params, ThemeUrl};
pub use crate::theme::{Theme, ThemeRenderer};
