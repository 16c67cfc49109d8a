// Re-export all items from the submodules
mod upload_config;

pub use upload_config::{load_or_default, UploadConfig};
