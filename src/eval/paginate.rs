//! Splitting long output into bounded pages.

/// Default maximum number of lines on an evaluation page.
pub const DEFAULT_MAX_LINES: usize = 27;
/// Default maximum number of characters on an evaluation page.
pub const DEFAULT_MAX_CHARS: usize = 1048;

/// One bounded slice of paginated text.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Page {
    /// 1-based position of the page.
    pub index: usize,
    /// Raw slice of the source text, line terminators included.
    pub content: String,
}

impl Page {
    /// The page content inside a code fence for `language`.
    pub fn fenced(&self, language: &str) -> String {
        format!("```{language}\n{}```", self.content)
    }
}

/// A text and the bounds it is paginated with.
///
/// [`Paginator::pages`] can be called any number of times; each call walks
/// the text from the start.
#[derive(Debug, Clone)]
pub struct Paginator {
    text: String,
    max_lines: usize,
    max_chars: usize,
}

impl Paginator {
    /// Bounds below one are raised to one.
    pub fn new(text: impl Into<String>, max_lines: usize, max_chars: usize) -> Self {
        Self {
            text: text.into(),
            max_lines: max_lines.max(1),
            max_chars: max_chars.max(1),
        }
    }

    pub fn pages(&self) -> Pages<'_> {
        Pages {
            rest: &self.text,
            max_lines: self.max_lines,
            max_chars: self.max_chars,
            index: 0,
            done: false,
        }
    }

    /// Build every page up front, for renderers that need the total.
    pub fn build_pages(&self) -> Vec<Page> {
        self.pages().collect()
    }
}

/// Lazily paginate `text`.
pub fn paginate(text: &str, max_lines: usize, max_chars: usize) -> Pages<'_> {
    Pages {
        rest: text,
        max_lines: max_lines.max(1),
        max_chars: max_chars.max(1),
        index: 0,
        done: false,
    }
}

/// Iterator over the pages of a text. Always yields at least one page.
#[derive(Debug, Clone)]
pub struct Pages<'a> {
    rest: &'a str,
    max_lines: usize,
    max_chars: usize,
    index: usize,
    done: bool,
}

impl Iterator for Pages<'_> {
    type Item = Page;

    fn next(&mut self) -> Option<Page> {
        if self.done {
            return None;
        }

        let mut lines = 0;
        let mut chars = 0;
        let mut end = 0;

        while end < self.rest.len() {
            let tail = &self.rest[end..];
            let line_end = tail.find('\n').map_or(tail.len(), |i| i + 1);
            let line = &tail[..line_end];
            let line_chars = line.chars().count();

            if lines < self.max_lines && chars + line_chars <= self.max_chars {
                lines += 1;
                chars += line_chars;
                end += line_end;
                continue;
            }

            // A line longer than a whole page is cut at the character bound.
            if lines == 0 {
                end += line
                    .char_indices()
                    .nth(self.max_chars)
                    .map_or(line_end, |(i, _)| i);
            }
            break;
        }

        let content = &self.rest[..end];
        self.rest = &self.rest[end..];
        self.index += 1;
        if self.rest.is_empty() {
            self.done = true;
        }

        Some(Page {
            index: self.index,
            content: content.to_string(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn assert_bounded(pages: &[Page], max_lines: usize, max_chars: usize) {
        for page in pages {
            assert!(
                page.content.lines().count() <= max_lines,
                "page {} has too many lines",
                page.index
            );
            assert!(
                page.content.chars().count() <= max_chars,
                "page {} has too many chars",
                page.index
            );
        }
    }

    #[test]
    fn empty_text_yields_one_empty_page() {
        let pages: Vec<_> = paginate("", 27, 1048).collect();
        assert_eq!(
            pages,
            vec![Page {
                index: 1,
                content: String::new()
            }]
        );
    }

    #[test]
    fn short_text_fits_one_page() {
        let pages: Vec<_> = paginate("a\nb\nc\n", 27, 1048).collect();
        assert_eq!(pages.len(), 1);
        assert_eq!(pages[0].content, "a\nb\nc\n");
    }

    #[test]
    fn line_bound_closes_page() {
        let text: String = (0..10).map(|i| format!("line {i}\n")).collect();
        let pages: Vec<_> = paginate(&text, 3, 1048).collect();
        assert_eq!(pages.len(), 4);
        assert_bounded(&pages, 3, 1048);
        assert_eq!(pages[3].content, "line 9\n");
    }

    #[test]
    fn char_bound_closes_page_before_line_bound() {
        let text = "aaaa\nbbbb\ncccc\n";
        let pages: Vec<_> = paginate(text, 27, 10).collect();
        assert_eq!(pages.len(), 2);
        assert_eq!(pages[0].content, "aaaa\nbbbb\n");
        assert_eq!(pages[1].content, "cccc\n");
    }

    #[test]
    fn overlong_line_is_split_on_char_boundaries() {
        let text = "é".repeat(25);
        let pages: Vec<_> = paginate(&text, 27, 10).collect();
        assert_eq!(pages.len(), 3);
        assert_bounded(&pages, 27, 10);
        assert_eq!(pages[2].content.chars().count(), 5);
    }

    #[test]
    fn pages_reconstruct_original_text() {
        let text: String = (0..200)
            .map(|i| format!("{}\n", "x".repeat(i % 37)))
            .collect();
        let pages: Vec<_> = paginate(&text, 27, 100).collect();
        assert_bounded(&pages, 27, 100);
        let joined: String = pages.iter().map(|p| p.content.as_str()).collect();
        assert_eq!(joined, text);
    }

    #[test]
    fn indices_are_one_based_and_sequential() {
        let text = "1\n2\n3\n4\n5\n";
        let pages: Vec<_> = paginate(text, 2, 100).collect();
        let indices: Vec<_> = pages.iter().map(|p| p.index).collect();
        assert_eq!(indices, vec![1, 2, 3]);
    }

    #[test]
    fn paginator_is_restartable() {
        let paginator = Paginator::new("a\nb\nc\nd\n", 2, 100);
        let first = paginator.build_pages();
        let second: Vec<_> = paginator.pages().collect();
        assert_eq!(first, second);
        assert_eq!(first.len(), 2);
    }

    #[test]
    fn zero_bounds_still_make_progress() {
        let pages: Vec<_> = paginate("abc", 0, 0).collect();
        assert_eq!(pages.len(), 3);
    }

    #[test]
    fn fenced_wraps_content() {
        let page = Page {
            index: 1,
            content: "x\n".to_string(),
        };
        assert_eq!(page.fenced("diff"), "```diff\nx\n```");
    }
}
