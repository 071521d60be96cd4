pub mod assets;
pub mod blocks;
pub mod components;
pub mod controller;
pub mod error;
pub mod extension;
pub mod flash;
pub mod hooks;
pub mod router;

pub use blocks::{BlockRegistry, SharedBlocks, DEFAULT_BLOCK_MARKER};
pub use components::{Component, ComponentManager, ComponentRun};
pub use controller::{Controller, PageController, RenderPass};
pub use error::{CmsError, ObjectKind};
pub use extension::BridgeExtension;
pub use flash::{FlashBag, FlashMessage};
pub use hooks::{BlockInterceptor, BlockInterceptors};
pub use router::Router;
