//! TUI module for Minna CLI
//!
//! Aesthetic: "City Pop / Sunny Brutalist"
//! - Signal Green: #00FF41
//! - Sunset Pink: #FF71CE
//! - Background: #1A1B26

pub mod add;
pub mod mcp;
pub mod status;
pub mod theme;
pub mod welcome;
