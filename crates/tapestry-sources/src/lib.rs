//! Built-in source drivers, the driver registry bootstrap, the
//! bounded-concurrency and retry helpers they share, and the file
//! downloader (§4.3, §4.4, §4.5).

pub mod concurrency;
pub mod downloader;
pub mod drivers;
pub mod registry;
pub mod retry;

pub use registry::register_builtin_drivers;
