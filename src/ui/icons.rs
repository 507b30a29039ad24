//! Shared UI icons.
//!
//! Each icon falls back to a plain-text marker on terminals without emoji.

use console::Emoji;

// Status indicators
pub static CHECK: Emoji<'_, '_> = Emoji("✅ ", "[OK]");
pub static CROSS: Emoji<'_, '_> = Emoji("❌ ", "[ERR]");
pub static WARN: Emoji<'_, '_> = Emoji("⚠️  ", "[!]");
pub static LINK_DOWN: Emoji<'_, '_> = Emoji("🔌 ", "[OFFLINE]");

// Log indicators
pub static SYSTEM: Emoji<'_, '_> = Emoji("⚙️  ", "[sys]");
pub static AUTO_FIX: Emoji<'_, '_> = Emoji("🔧 ", "[FIX]");

// Preview indicators
pub static PREVIEW: Emoji<'_, '_> = Emoji("🌐 ", "[WEB]");
pub static PAUSED: Emoji<'_, '_> = Emoji("⏸️  ", "[||]");
pub static BLOCKED: Emoji<'_, '_> = Emoji("🚧 ", "[BLOCK]");
pub static CLOCK: Emoji<'_, '_> = Emoji("⏱️  ", "[T]");
