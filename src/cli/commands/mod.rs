//! Command implementations. Each exposes an `execute` function.

pub mod authority;
pub mod export;
pub mod find;
pub mod get;
pub mod import_cmd;
pub mod init;
pub mod sign;
