//! Splitting markdown into size-bounded messages.

use super::cell::truncate_chars;

fn char_len(text: &str) -> usize {
    text.chars().count()
}

/// Split `markdown` into chunks of at most `limit` characters.
///
/// Paragraphs (blank-line separated) are packed greedily; a paragraph that
/// fits is never split. An oversized paragraph is split on line boundaries,
/// and an oversized line is cut with an ellipsis. Every chunk is non-empty.
pub fn chunk_markdown(markdown: &str, limit: usize) -> Vec<String> {
    let limit = limit.max(1);
    let markdown = markdown.trim();
    if markdown.is_empty() {
        return Vec::new();
    }
    if char_len(markdown) <= limit {
        return vec![markdown.to_string()];
    }

    let mut chunks = Vec::new();
    let mut current = String::new();

    for block in markdown.split("\n\n").map(str::trim).filter(|b| !b.is_empty()) {
        let candidate_len = if current.is_empty() {
            char_len(block)
        } else {
            char_len(&current) + 2 + char_len(block)
        };
        if candidate_len <= limit {
            if !current.is_empty() {
                current.push_str("\n\n");
            }
            current.push_str(block);
            continue;
        }

        if !current.is_empty() {
            chunks.push(std::mem::take(&mut current));
        }
        if char_len(block) <= limit {
            current.push_str(block);
            continue;
        }

        for line in block.lines() {
            let candidate_len = if current.is_empty() {
                char_len(line)
            } else {
                char_len(&current) + 1 + char_len(line)
            };
            if candidate_len <= limit {
                if !current.is_empty() {
                    current.push('\n');
                }
                current.push_str(line);
                continue;
            }
            if !current.is_empty() {
                chunks.push(std::mem::take(&mut current));
            }
            if char_len(line) <= limit {
                current.push_str(line);
            } else {
                chunks.push(truncate_chars(line, limit));
            }
        }
    }

    if !current.trim().is_empty() {
        chunks.push(current);
    }
    chunks.retain(|c| !c.trim().is_empty());
    chunks
}

/// Chunk and number the pieces `i/total`, keeping every numbered message
/// within `max_chars`.
pub fn paginate(markdown: &str, max_chars: usize) -> Vec<String> {
    let chunks = chunk_markdown(markdown, max_chars);
    if chunks.len() <= 1 {
        return chunks;
    }

    let mut digits = digit_count(chunks.len());
    loop {
        // "\n\n_" + i + "/" + total + "_"
        let reserve = 5 + 2 * digits;
        let chunks = chunk_markdown(markdown, max_chars.saturating_sub(reserve));
        let total = chunks.len();
        if digit_count(total) <= digits {
            return chunks
                .into_iter()
                .enumerate()
                .map(|(i, chunk)| format!("{chunk}\n\n_{}/{total}_", i + 1))
                .collect();
        }
        digits = digit_count(total);
    }
}

fn digit_count(n: usize) -> usize {
    n.to_string().len()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn short_markdown_is_one_chunk() {
        assert_eq!(chunk_markdown("  hello  ", 100), vec!["hello".to_string()]);
        assert!(chunk_markdown("   ", 100).is_empty());
    }

    #[test]
    fn paragraphs_are_packed_greedily() {
        let p1 = "a".repeat(40);
        let p2 = "b".repeat(40);
        let p3 = "c".repeat(40);
        let markdown = format!("{p1}\n\n{p2}\n\n{p3}");

        let chunks = chunk_markdown(&markdown, 100);

        assert_eq!(chunks, vec![format!("{p1}\n\n{p2}"), p3.clone()]);
        assert_eq!(chunks.join("\n\n"), markdown.trim());
    }

    #[test]
    fn fitting_paragraph_is_not_split_after_flush() {
        let p1 = "a".repeat(60);
        let p2 = format!("{}\n{}", "b".repeat(20), "c".repeat(20));
        let chunks = chunk_markdown(&format!("{p1}\n\n{p2}"), 70);
        assert_eq!(chunks, vec![p1, p2]);
    }

    #[test]
    fn oversized_paragraph_splits_on_lines() {
        let lines: Vec<String> = (0..10).map(|i| format!("line {i:02} {}", "x".repeat(20))).collect();
        let paragraph = lines.join("\n");
        let chunks = chunk_markdown(&paragraph, 70);
        assert!(chunks.len() > 1);
        for chunk in &chunks {
            assert!(chunk.chars().count() <= 70);
        }
        assert_eq!(chunks.join("\n"), paragraph);
    }

    #[test]
    fn oversized_line_is_truncated() {
        let chunks = chunk_markdown(&"z".repeat(500), 100);
        assert_eq!(chunks.len(), 1);
        assert_eq!(chunks[0].chars().count(), 100);
        assert!(chunks[0].ends_with('…'));
    }

    #[test]
    fn every_chunk_is_bounded_and_non_empty() {
        let markdown = (0..50)
            .map(|i| format!("paragraph {i}\n{}", "word ".repeat(i % 7 * 10)))
            .collect::<Vec<_>>()
            .join("\n\n");
        for chunk in chunk_markdown(&markdown, 120) {
            assert!(!chunk.trim().is_empty());
            assert!(chunk.chars().count() <= 120);
        }
    }

    #[test]
    fn single_chunk_is_not_numbered() {
        assert_eq!(paginate("hello", 1000), vec!["hello".to_string()]);
    }

    #[test]
    fn pages_are_numbered_and_fit_with_suffix() {
        let markdown = (0..30)
            .map(|i| format!("{i} {}", "y".repeat(60)))
            .collect::<Vec<_>>()
            .join("\n\n");
        let pages = paginate(&markdown, 150);
        let total = pages.len();
        assert!(total > 1);
        for (i, page) in pages.iter().enumerate() {
            assert!(page.chars().count() <= 150, "page {i} too long");
            assert!(page.ends_with(&format!("_{}/{total}_", i + 1)));
        }
    }
}
