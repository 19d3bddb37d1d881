//! Markdown rendering of tabular answers.

use super::RenderOptions;
use super::cell::{escape, format_cell};
use crate::orchestrator::TableAnswer;

pub(crate) fn render_table(table: &TableAnswer, options: &RenderOptions) -> String {
    let mut sections: Vec<String> = Vec::new();

    if let Some(description) = table.description.as_deref().map(str::trim)
        && !description.is_empty()
    {
        sections.push(format!("## Query Description:\n\n{description}"));
    }

    if table.columns.is_empty() {
        sections.push("## Query Results:\n\n_No columns to display._".to_string());
        return sections.join("\n\n");
    }

    let rows_limit = options.rows.max(1);
    let cols_limit = options.cols.max(1);

    let shown_cols = &table.columns[..table.columns.len().min(cols_limit)];
    let hidden_cols = table.columns.len() - shown_cols.len();
    let shown_rows = &table.rows[..table.rows.len().min(rows_limit)];
    let hidden_rows = table.rows.len() - shown_rows.len();

    let mut lines = Vec::with_capacity(shown_rows.len() + 2);
    let headers: Vec<String> = shown_cols.iter().map(|c| escape(&c.name)).collect();
    lines.push(format!("| {} |", headers.join(" | ")));
    lines.push(format!("|{}|", vec!["---"; headers.len()].join("|")));
    for row in shown_rows {
        let cells: Vec<String> = shown_cols
            .iter()
            .enumerate()
            .map(|(i, column)| match row.get(i) {
                Some(value) => format_cell(value, &column.type_name, options.cell_chars),
                None => String::new(),
            })
            .collect();
        lines.push(format!("| {} |", cells.join(" | ")));
    }
    sections.push(format!("## Query Results:\n\n{}", lines.join("\n")));

    let sql = table
        .sql
        .as_deref()
        .map(str::trim)
        .filter(|s| options.include_sql && !s.is_empty());

    let mut hidden = Vec::new();
    if hidden_rows > 0 {
        hidden.push(format!("{hidden_rows} hidden row(s)"));
    }
    if hidden_cols > 0 {
        hidden.push(format!("{hidden_cols} hidden column(s)"));
    }

    if !hidden.is_empty() || sql.is_some() {
        let mut notes = vec!["### Notes:".to_string()];
        if !hidden.is_empty() {
            notes.push(format!(
                "_{}. Refine your question to see fewer rows/columns._\n\
                 _To see more, raise your limits, e.g. `cols=20 rows=200`._",
                hidden.join(" • ")
            ));
        }
        if let Some(sql) = sql {
            notes.push(format!("```sql\n{}\n```", compact_sql(sql)));
        }
        sections.push(notes.join("\n\n"));
    }

    sections.join("\n\n")
}

/// Drop blank lines so the fenced block stays a single paragraph.
fn compact_sql(sql: &str) -> String {
    sql.lines()
        .filter(|line| !line.trim().is_empty())
        .collect::<Vec<_>>()
        .join("\n")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::orchestrator::Column;
    use serde_json::{Value, json};

    fn options(rows: usize, cols: usize, include_sql: bool) -> RenderOptions {
        RenderOptions {
            rows,
            cols,
            cell_chars: 200,
            include_sql,
        }
    }

    fn table(n_cols: usize, n_rows: usize) -> TableAnswer {
        TableAnswer {
            columns: (0..n_cols)
                .map(|i| Column {
                    name: format!("c{i}"),
                    type_name: "INT".into(),
                })
                .collect(),
            rows: (0..n_rows)
                .map(|r| (0..n_cols).map(|c| json!(r * 1000 + c)).collect())
                .collect(),
            sql: Some("SELECT *\n\nFROM t".into()),
            description: Some("Everything in t".into()),
        }
    }

    fn header_line(markdown: &str) -> &str {
        markdown
            .lines()
            .find(|l| l.starts_with("| c0"))
            .unwrap()
    }

    fn data_rows(markdown: &str) -> usize {
        markdown
            .lines()
            .filter(|l| l.starts_with("| ") && !l.starts_with("| c0"))
            .count()
    }

    #[test]
    fn hides_extra_columns() {
        let markdown = render_table(&table(10, 3), &options(50, 8, false));
        assert_eq!(header_line(&markdown).matches(" | ").count() + 1, 8);
        assert!(markdown.contains("2 hidden column(s)"));
        assert!(!markdown.contains("hidden row(s)"));
    }

    #[test]
    fn hides_extra_rows() {
        let markdown = render_table(&table(2, 100), &options(50, 8, false));
        assert_eq!(data_rows(&markdown), 50);
        assert!(markdown.contains("50 hidden row(s)"));
    }

    #[test]
    fn both_counts_share_one_note() {
        let markdown = render_table(&table(10, 100), &options(50, 8, false));
        assert!(markdown.contains("_50 hidden row(s) • 2 hidden column(s). Refine"));
    }

    #[test]
    fn formats_cells_by_type() {
        let markdown = render_table(&table(2, 3), &options(50, 8, false));
        assert!(markdown.contains("| 2,000 | 2,001 |"));
    }

    #[test]
    fn sql_note_only_when_enabled() {
        let with_sql = render_table(&table(2, 1), &options(50, 8, true));
        assert!(with_sql.contains("### Notes:"));
        assert!(with_sql.contains("```sql\nSELECT *\nFROM t\n```"));

        let without_sql = render_table(&table(2, 1), &options(50, 8, false));
        assert!(!without_sql.contains("### Notes:"));
    }

    #[test]
    fn description_leads_the_output() {
        let markdown = render_table(&table(1, 1), &options(50, 8, false));
        assert!(markdown.starts_with("## Query Description:\n\nEverything in t\n\n## Query Results:"));
    }

    #[test]
    fn short_rows_render_empty_cells() {
        let mut t = table(3, 0);
        t.rows = vec![vec![json!(1)], vec![Value::Null, json!(2), json!(3)]];
        let markdown = render_table(&t, &options(50, 8, false));
        assert!(markdown.contains("| 1 |  |  |"));
        assert!(markdown.contains("| NULL | 2 | 3 |"));
    }

    #[test]
    fn headers_are_escaped_like_cells() {
        let mut t = table(2, 1);
        t.columns[0].name = "total|net\nshare".into();
        t.columns[1].name = "`avg`".into();
        let markdown = render_table(&t, &options(50, 8, false));
        assert!(markdown.contains("| total\\|net share | ʼavgʼ |\n|---|---|"));
    }

    #[test]
    fn no_columns() {
        let t = TableAnswer::default();
        let markdown = render_table(&t, &options(50, 8, true));
        assert_eq!(markdown, "## Query Results:\n\n_No columns to display._");
    }
}
