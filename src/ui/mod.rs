pub mod format;
pub mod icons;
pub mod progress;

pub use progress::WatchUI;
