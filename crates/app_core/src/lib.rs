//! ShellMeta Core Logic
//!
//! This crate contains:
//! - Icon, thumbnail and overlay resolution
//! - Icon caches
//! - Bitmap encoding
//! - Configuration
//! - Error types

pub mod bitmap;
pub mod config;
pub mod error;
pub mod icon_cache;
pub mod icon_service;
pub mod imaging;
pub mod platform;

pub use bitmap::{encode_bitmap, encode_icon, has_partial_alpha, IconPixels, RawBitmap};
pub use config::{CacheConfig, CachePolicy, IconsConfig, ShellMetaConfig};
pub use error::CoreError;
pub use icon_cache::{IconCache, IconCacheKey, IconRecord, NATIVE_SIZE};
pub use icon_service::{GenericIcon, IconService};
pub use imaging::{IconOptions, ImageListTier, ItemImageFlags, ShellIconInfo, ShellImaging};

use once_cell::sync::OnceCell;

/// Process-wide icon service
static ICON_SERVICE: OnceCell<IconService> = OnceCell::new();

/// Initialize the process-wide icon service with the platform backend
pub fn init(config: &ShellMetaConfig) -> anyhow::Result<&'static IconService> {
    ICON_SERVICE
        .set(IconService::with_platform(config))
        .map_err(|_| anyhow::anyhow!("IconService already initialized"))?;
    ICON_SERVICE
        .get()
        .ok_or_else(|| anyhow::anyhow!("IconService not initialized"))
}

/// Get the process-wide icon service
pub fn icon_service() -> Option<&'static IconService> {
    ICON_SERVICE.get()
}
