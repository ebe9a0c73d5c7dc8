//! Turns an error location into a `rustc`-like report pointing at the template source.
use crate::errors::ReportError;
use crate::utils::Span;

/// The text of a 1-based line, without its line ending. Out of range lines are the last one.
fn line_at(source: &str, line: usize) -> (usize, &str) {
    let count = source.split('\n').count();
    let line = line.clamp(1, count);
    let text = source.split('\n').nth(line - 1).unwrap_or_default();
    (line, text.trim_end_matches('\r'))
}

/// Spaces up to the start column, keeping tabs so the carets line up, then one `^` per
/// character of the span. Spans over several lines are underlined until the end of the first.
fn underline(line: &str, span: &Span) -> String {
    let mut out: String = line
        .chars()
        .take(span.start_col)
        .map(|c| if c == '\t' { '\t' } else { ' ' })
        .collect();
    let width = if span.end_line > span.start_line {
        line.chars().count().saturating_sub(span.start_col)
    } else {
        span.end_col.saturating_sub(span.start_col)
    };
    out.extend(std::iter::repeat('^').take(width.max(1)));
    out
}

pub(crate) fn generate_report(message: &str, error: &ReportError) -> String {
    let span = &error.span;
    let (line_num, line) = line_at(&error.source, span.start_line);
    let padding = " ".repeat(line_num.to_string().len());

    format!(
        "error: {message}\n\
         {padding}--> {}:{line_num}:{}\n\
         {padding} |\n\
         {line_num} | {line}\n\
         {padding} | {}",
        error.filename,
        span.start_col,
        underline(line, span),
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn finds_lines() {
        let source = "foo\nbar\r\n\nbaz";
        assert_eq!(line_at(source, 1), (1, "foo"));
        assert_eq!(line_at(source, 2), (2, "bar"));
        assert_eq!(line_at(source, 3), (3, ""));
        assert_eq!(line_at(source, 10), (4, "baz"));
        assert_eq!(line_at(source, 0), (1, "foo"));
    }

    #[test]
    fn multi_line_spans_stop_at_the_end_of_the_line() {
        let span = Span {
            start_line: 1,
            start_col: 2,
            end_line: 3,
            end_col: 1,
            range: 2..20,
        };
        assert_eq!(underline("\tx{% if %}", &span), "\t ^^^^^^^^");
    }

    #[test]
    fn underlines_the_span() {
        let source = "hello\n{% bad %}\nbye";
        let span = Span {
            start_line: 2,
            start_col: 0,
            end_line: 2,
            end_col: 9,
            range: 6..15,
        };
        let report = generate_report(
            "Invalid block tag: 'bad'",
            &ReportError::new("t.html", source, &span),
        );
        insta::assert_snapshot!(report, @r"
        error: Invalid block tag: 'bad'
         --> t.html:2:0
          |
        2 | {% bad %}
          | ^^^^^^^^^
        ");
    }
}
