//! Project configuration (`.sealvault.toml`).

pub mod settings;

pub use settings::{Settings, ROOT_FINGERPRINT_ENV};
