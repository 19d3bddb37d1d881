//! Per-user session state and admission control.

mod admission;
mod settings;
mod store;

pub use admission::{Admission, fingerprint, normalize};
pub use settings::{
    DEFAULT_CELL_CHARS, DEFAULT_CHARS, DEFAULT_COLS, DEFAULT_QUERY_TIMEOUT_SECS, DEFAULT_ROWS,
    DEFAULT_TIMEOUT_SECS, HardLimits, MIN_CELL_CHARS, MIN_CHARS, MIN_COLS, MIN_QUERY_TIMEOUT_SECS,
    MIN_ROWS, MIN_TIMEOUT_SECS, SettingsOverrides, UserSettings,
};
pub use store::{NO_SPACE_TITLE, SessionStore};
