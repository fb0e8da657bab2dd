/// Severity of a captured output line
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord)]
pub enum Severity {
    Normal,
    Error,
}

impl std::fmt::Display for Severity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Normal => write!(f, "NORMAL"),
            Self::Error => write!(f, "ERROR"),
        }
    }
}

/// Markers matched regardless of case
const FOLDED_MARKERS: &[&str] = &["error", "failed"];

/// Markers matched exactly
const EXACT_MARKERS: &[&str] = &["ERROR", "No such file"];

pub fn classify(text: &str) -> Severity {
    let lower = text.to_lowercase();

    if FOLDED_MARKERS.iter().any(|m| lower.contains(m))
        || EXACT_MARKERS.iter().any(|m| text.contains(m))
    {
        return Severity::Error;
    }

    Severity::Normal
}

/// The last `height` lines of `lines`, oldest first.
pub fn window<T>(lines: &[T], height: usize) -> &[T] {
    let start = lines.len().saturating_sub(height);
    &lines[start..]
}

/// Append-only session log. Growth is unbounded; only the view is windowed.
#[derive(Clone, Debug, Default)]
pub struct LogBuffer {
    lines: Vec<String>,
}

impl LogBuffer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append text, one entry per `\n`-separated line. A `\r` redraws its
    /// line, so only what follows the last one is kept.
    pub fn push(&mut self, text: impl Into<String>) {
        let text = text.into();
        let body = text.strip_suffix('\n').unwrap_or(&text);
        for line in body.split('\n') {
            let line = line.strip_suffix('\r').unwrap_or(line);
            let shown = line.rsplit('\r').next().unwrap_or(line);
            self.lines.push(shown.to_string());
        }
    }

    pub fn extend<I, S>(&mut self, lines: I)
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        for line in lines {
            self.push(line);
        }
    }

    pub fn lines(&self) -> &[String] {
        &self.lines
    }

    pub fn last(&self) -> Option<&str> {
        self.lines.last().map(|s| s.as_str())
    }

    /// Visible slice for a panel `height` rows tall, paired with severities.
    pub fn visible(&self, height: usize) -> impl Iterator<Item = (&str, Severity)> {
        window(&self.lines, height)
            .iter()
            .map(|line| (line.as_str(), classify(line)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_classify_markers() {
        assert_eq!(classify("error: target not found"), Severity::Error);
        assert_eq!(classify("Error loading module"), Severity::Error);
        assert_eq!(classify("ERROR"), Severity::Error);
        assert_eq!(classify("eRrOr"), Severity::Error);
        assert_eq!(classify("Failed to install AUR package"), Severity::Error);
        assert_eq!(classify("build FAILED"), Severity::Error);
        assert_eq!(classify("ls: cannot access x: No such file or directory"), Severity::Error);
        assert_eq!(classify(":: Synchronizing package databases..."), Severity::Normal);
        assert_eq!(classify(""), Severity::Normal);
    }

    #[test]
    fn test_classify_no_such_file_is_case_sensitive() {
        assert_eq!(classify("no such file"), Severity::Normal);
    }

    #[test]
    fn test_window_keeps_tail_in_order() {
        let lines: Vec<u32> = (0..10).collect();
        assert_eq!(window(&lines, 3), &[7, 8, 9]);
        assert_eq!(window(&lines, 10), lines.as_slice());
        assert_eq!(window(&lines, 50), lines.as_slice());
        assert!(window(&lines, 0).is_empty());

        for len in 0..6usize {
            let buf: Vec<usize> = (0..len).collect();
            for height in 0..8usize {
                let view = window(&buf, height);
                assert_eq!(view.len(), len.min(height));
                assert_eq!(view, &buf[len - len.min(height)..]);
            }
        }
    }

    #[test]
    fn test_visible_tags_severity() {
        let mut log = LogBuffer::new();
        log.extend(["ok", "Error: boom", "done"]);
        let view: Vec<_> = log.visible(2).collect();
        assert_eq!(view, vec![("Error: boom", Severity::Error), ("done", Severity::Normal)]);
    }

    #[test]
    fn test_push_keeps_last_carriage_return_segment() {
        let mut log = LogBuffer::new();
        log.push("10%\r50%\r100%");
        log.push("downloading\r");
        log.push("");
        assert_eq!(log.lines(), ["100%", "downloading", ""]);
    }

    #[test]
    fn test_push_splits_multi_line_text() {
        let mut log = LogBuffer::new();
        log.push("one\r\ntwo\n:: a\rb\n");
        log.extend(["three"]);
        assert_eq!(log.lines(), ["one", "two", "b", "three"]);
        assert!(log.visible(10).all(|(line, _)| !line.contains('\r')));
    }
}
