//! Splitting template source into tokens.
//!
//! The lexer never fails: anything that isn't a well-formed tag on a single line is text.
//! It always emits typed tokens, even between `{% verbatim %}` and its end tag; those
//! tokens additionally keep their raw source so the parser can output them untouched.
use crate::delimiters::Delimiters;
use crate::utils::Span;

#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum TokenKind {
    Text,
    Variable,
    Block,
    Comment,
}

impl TokenKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            TokenKind::Text => "Text",
            TokenKind::Variable => "Var",
            TokenKind::Block => "Block",
            TokenKind::Comment => "Comment",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Token {
    pub kind: TokenKind,
    /// Raw text for `Text` tokens, the trimmed inner body for the others
    pub contents: String,
    /// 1-based line the token starts on
    pub line_no: usize,
    /// Only recorded when lexing in debug mode
    pub span: Option<Span>,
    /// The full original text of a tag found inside a verbatim block
    pub(crate) raw: Option<String>,
}

impl Token {
    pub fn new(kind: TokenKind, contents: impl Into<String>, line_no: usize) -> Self {
        Self {
            kind,
            contents: contents.into(),
            line_no,
            span: None,
            raw: None,
        }
    }

    /// The first word of the contents: the command of a block tag.
    pub fn command(&self) -> &str {
        self.contents.split_whitespace().next().unwrap_or("")
    }

    /// Splits the contents into words, keeping quoted strings together.
    ///
    /// `cycle "a b" 'c'` gives `["cycle", "\"a b\"", "'c'"]`. Quotes are kept in the
    /// output and can appear in the middle of a word: `key="a value"` is one word.
    pub fn split_contents(&self) -> Vec<String> {
        smart_split(&self.contents, None)
    }

    /// Same as [`Token::split_contents`] but stops after `limit` splits, the last element
    /// being the rest of the contents.
    pub fn split_contents_limit(&self, limit: usize) -> Vec<String> {
        smart_split(&self.contents, Some(limit))
    }

    /// The text this token was lexed from, for tokens inside a verbatim block
    pub fn raw(&self) -> Option<&str> {
        self.raw.as_deref()
    }
}

/// Length in bytes of a quoted run starting at the beginning of `s`, including both quotes.
pub(crate) fn quoted_len(s: &str) -> Option<usize> {
    let mut chars = s.char_indices();
    let (_, quote) = chars.next()?;
    let mut escaped = false;
    for (idx, c) in chars {
        if escaped {
            escaped = false;
        } else if c == '\\' {
            escaped = true;
        } else if c == quote {
            return Some(idx + c.len_utf8());
        }
    }
    None
}

/// Length in bytes of the next word of `s`, which doesn't start with whitespace.
fn word_len(s: &str) -> usize {
    let non_ws_run = s.find(char::is_whitespace).unwrap_or(s.len());
    let mut pos = 0;
    let mut seen_quote = false;

    while pos < s.len() {
        let rest = &s[pos..];
        let Some(c) = rest.chars().next() else {
            break;
        };
        if c.is_whitespace() {
            return pos;
        }
        if c == '"' || c == '\'' {
            match quoted_len(rest) {
                Some(len) => {
                    seen_quote = true;
                    pos += len;
                }
                // An unterminated quote: the word ends before it if we already had
                // a complete quoted part, otherwise it's just a run of non-space chars
                None if seen_quote => return pos,
                None => return non_ws_run,
            }
        } else {
            pos += c.len_utf8();
        }
    }
    pos
}

pub(crate) fn smart_split(text: &str, limit: Option<usize>) -> Vec<String> {
    let mut bits = Vec::new();
    let mut rest = text.trim_start();

    while !rest.is_empty() {
        if limit.is_some_and(|l| bits.len() == l) {
            bits.push(rest.trim_end().to_string());
            break;
        }
        let len = word_len(rest);
        bits.push(rest[..len].to_string());
        rest = rest[len..].trim_start();
    }

    bits
}

/// Tracks where we are in the source to build spans.
struct Position {
    line: usize,
    /// Byte offset of the start of the current line
    line_start: usize,
}

impl Position {
    fn column(&self, source: &str, offset: usize) -> usize {
        source[self.line_start..offset].chars().count()
    }

    fn advance(&mut self, source: &str, start: usize, end: usize) {
        for (idx, c) in source[start..end].char_indices() {
            if c == '\n' {
                self.line += 1;
                self.line_start = start + idx + 1;
            }
        }
    }
}

pub struct Lexer<'a> {
    source: &'a str,
    delimiters: Delimiters,
    track_spans: bool,
}

impl<'a> Lexer<'a> {
    pub fn new(source: &'a str, delimiters: Delimiters) -> Self {
        Self {
            source,
            delimiters,
            track_spans: false,
        }
    }

    /// Record a span on every token, used for debug mode error reporting.
    pub fn with_spans(mut self, track_spans: bool) -> Self {
        self.track_spans = track_spans;
        self
    }

    /// Finds the next tag at or after `from`: (start, end, kind).
    /// A tag must end on the line it starts on.
    fn find_tag(&self, from: usize) -> Option<(usize, usize, TokenKind)> {
        let bytes = self.source.as_bytes();
        let markers = [
            (
                self.delimiters.block_start,
                self.delimiters.block_end,
                TokenKind::Block,
            ),
            (
                self.delimiters.variable_start,
                self.delimiters.variable_end,
                TokenKind::Variable,
            ),
            (
                self.delimiters.comment_start,
                self.delimiters.comment_end,
                TokenKind::Comment,
            ),
        ];

        for idx in from..bytes.len() {
            for (start, end, kind) in markers {
                if !bytes[idx..].starts_with(start.as_bytes()) {
                    continue;
                }
                let body_start = idx + start.len();
                let rest = &self.source[body_start..];
                let line = &rest[..rest.find('\n').unwrap_or(rest.len())];
                if let Some(end_idx) = line.find(end) {
                    return Some((idx, body_start + end_idx + end.len(), kind));
                }
            }
        }
        None
    }

    fn make_token(
        &self,
        kind: TokenKind,
        start: usize,
        end: usize,
        pos: &mut Position,
    ) -> Token {
        let text = &self.source[start..end];
        let contents = match kind {
            TokenKind::Text => text.to_string(),
            // Delimiters are all 2 chars but not necessarily 2 bytes
            _ => {
                let (open, close) = match kind {
                    TokenKind::Block => (self.delimiters.block_start, self.delimiters.block_end),
                    TokenKind::Variable => (
                        self.delimiters.variable_start,
                        self.delimiters.variable_end,
                    ),
                    _ => (
                        self.delimiters.comment_start,
                        self.delimiters.comment_end,
                    ),
                };
                text[open.len()..text.len() - close.len()].trim().to_string()
            }
        };

        let line_no = pos.line;
        let span = if self.track_spans {
            let start_col = pos.column(self.source, start);
            pos.advance(self.source, start, end);
            Some(Span {
                start_line: line_no,
                start_col,
                end_line: pos.line,
                end_col: pos.column(self.source, end),
                range: start..end,
            })
        } else {
            pos.advance(self.source, start, end);
            None
        };

        Token {
            kind,
            contents,
            line_no,
            span,
            raw: None,
        }
    }

    pub fn tokenize(&self) -> Vec<Token> {
        let mut tokens = Vec::new();
        let mut pos = Position {
            line: 1,
            line_start: 0,
        };
        // The block contents that ends the current verbatim block, if we are in one
        let mut verbatim: Option<String> = None;
        let mut offset = 0;

        while let Some((start, end, kind)) = self.find_tag(offset) {
            if start > offset {
                tokens.push(self.make_token(TokenKind::Text, offset, start, &mut pos));
            }
            let mut token = self.make_token(kind, start, end, &mut pos);

            match verbatim {
                Some(ref end_marker) if kind == TokenKind::Block && &token.contents == end_marker => {
                    verbatim = None;
                }
                Some(_) => {
                    token.raw = Some(self.source[start..end].to_string());
                }
                None => {
                    if kind == TokenKind::Block
                        && (token.contents == "verbatim" || token.contents.starts_with("verbatim "))
                    {
                        verbatim = Some(format!("end{}", token.contents));
                    }
                }
            }

            tokens.push(token);
            offset = end;
        }

        if offset < self.source.len() {
            tokens.push(self.make_token(
                TokenKind::Text,
                offset,
                self.source.len(),
                &mut pos,
            ));
        }

        tokens
    }
}

/// Tokenizes with the default delimiters and no spans.
pub fn tokenize(source: &str) -> Vec<Token> {
    Lexer::new(source, Delimiters::default()).tokenize()
}
