//! Answer → chat-safe markdown.
//!
//! Pure functions; nothing here touches session state or the backend.

mod cell;
mod chunk;
mod table;

pub use cell::{escape, format_cell, format_decimal, format_integer, truncate_chars};
pub use chunk::{chunk_markdown, paginate};

use crate::orchestrator::GenieAnswer;
use crate::session::UserSettings;

/// Placeholder for an empty text answer.
pub const NO_CONTENT_TEXT: &str = "_No content._";

/// Display limits for a single render.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RenderOptions {
    pub rows: usize,
    pub cols: usize,
    pub cell_chars: usize,
    pub include_sql: bool,
}

impl From<&UserSettings> for RenderOptions {
    fn from(settings: &UserSettings) -> Self {
        Self {
            rows: settings.rows as usize,
            cols: settings.cols as usize,
            cell_chars: settings.cell_chars as usize,
            include_sql: settings.include_sql,
        }
    }
}

/// Render an answer as markdown.
pub fn render(answer: &GenieAnswer, options: &RenderOptions) -> String {
    match answer {
        GenieAnswer::Error { message } => format!("⚠️ {message}"),
        GenieAnswer::Text { message } => match message.trim() {
            "" => NO_CONTENT_TEXT.to_string(),
            text => text.to_string(),
        },
        GenieAnswer::Table(table) => table::render_table(table, options),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::orchestrator::TableAnswer;

    fn options() -> RenderOptions {
        RenderOptions::from(&UserSettings::default())
    }

    #[test]
    fn error_gets_warning_prefix() {
        assert_eq!(render(&GenieAnswer::error("boom"), &options()), "⚠️ boom");
    }

    #[test]
    fn text_is_trimmed_with_placeholder() {
        assert_eq!(render(&GenieAnswer::text("  hi \n"), &options()), "hi");
        assert_eq!(render(&GenieAnswer::text("   "), &options()), NO_CONTENT_TEXT);
    }

    #[test]
    fn table_dispatches_to_table_renderer() {
        let markdown = render(&GenieAnswer::Table(TableAnswer::default()), &options());
        assert!(markdown.contains("_No columns to display._"));
    }

    #[test]
    fn options_follow_settings() {
        let opts = options();
        assert_eq!(opts.rows, 50);
        assert_eq!(opts.cols, 8);
        assert_eq!(opts.cell_chars, 200);
        assert!(opts.include_sql);
    }
}
