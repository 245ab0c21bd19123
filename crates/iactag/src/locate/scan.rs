//! Line and indentation helpers shared by locators and patch writers
use std::ops::Range;

/// Byte offsets of line starts, lines are 1-indexed
///
/// A trailing newline does not start another line, matching [str::lines].
#[derive(Debug, Clone)]
pub struct LineIndex<'a> {
    text: &'a str,
    starts: Vec<usize>,
}

impl<'a> LineIndex<'a> {
    pub fn new(text: &'a str) -> Self {
        let mut starts = vec![0];
        starts.extend(
            text.match_indices('\n')
                .map(|(offset, _)| offset + 1)
                .filter(|start| *start < text.len()),
        );

        Self { text, starts }
    }

    pub fn line_count(&self) -> usize {
        if self.text.is_empty() {
            0
        } else {
            self.starts.len()
        }
    }

    /// Line containing byte `offset`
    pub fn line_of(&self, offset: usize) -> usize {
        self.starts.partition_point(|start| *start <= offset).max(1)
    }

    pub fn line_start(&self, line: usize) -> usize {
        self.starts
            .get(line.saturating_sub(1))
            .copied()
            .unwrap_or(self.text.len())
    }

    /// Offset of the line break ending `line` (or the end of text)
    pub fn line_end(&self, line: usize) -> usize {
        let start = self.line_start(line);
        let end = self.text[start..]
            .find('\n')
            .map(|i| start + i)
            .unwrap_or(self.text.len());

        if end > start && self.text.as_bytes()[end - 1] == b'\r' {
            end - 1
        } else {
            end
        }
    }

    pub fn line(&self, line: usize) -> &'a str {
        &self.text[self.line_start(line)..self.line_end(line)]
    }

    /// Byte range of lines `start..=end` without the final line break
    pub fn span_of_lines(&self, start: usize, end: usize) -> Range<usize> {
        self.line_start(start)..self.line_end(end)
    }

    pub fn lines(&self) -> impl Iterator<Item = (usize, &'a str)> + '_ {
        (1..=self.line_count()).map(|n| (n, self.line(n)))
    }
}

/// Leading whitespace of a line
pub fn indent_of(line: &str) -> &str {
    let trimmed = line.trim_start_matches([' ', '\t']);
    &line[..line.len() - trimmed.len()]
}

/// Width of the leading whitespace of a line
pub fn indentation(line: &str) -> usize {
    indent_of(line).len()
}

/// Indentation of a YAML line, counting sequence dashes as indentation
pub fn yaml_indentation(line: &str) -> usize {
    line.len() - line.trim_start_matches([' ', '-']).len()
}

pub fn is_blank(line: &str) -> bool {
    line.trim().is_empty()
}

pub fn is_blank_or_comment(line: &str) -> bool {
    let trimmed = line.trim();
    trimmed.is_empty() || trimmed.starts_with('#')
}

/// Leading whitespace of the line containing byte `offset`
pub fn indent_at(text: &str, offset: usize) -> &str {
    let start = text[..offset].rfind('\n').map(|i| i + 1).unwrap_or(0);
    let end = text[start..]
        .find('\n')
        .map(|i| start + i)
        .unwrap_or(text.len());
    indent_of(&text[start..end])
}
