pub mod config;
pub mod types;

pub use config::{Config, THEMES_URL_PREFIX};
pub use types::{AssetKind, ComponentDecl, Content, ContentFormat, Layout, Page, Params, Partial, ThemeUrl};
