use crate::errors::{Error, TesseraResult};

/// This allows customizing the delimiters used for blocks, variables, and comments in case
/// you want to template files that contains text like `{{`, like LaTeX.
/// Delimiters need to be 2 characters.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Delimiters {
    /// Start delimiter for blocks, default: `{%`
    pub block_start: &'static str,
    /// End delimiter for blocks, default: `%}`
    pub block_end: &'static str,
    /// Start delimiter for variables, default: `{{`
    pub variable_start: &'static str,
    /// End delimiter for variables, default: `}}`
    pub variable_end: &'static str,
    /// Start delimiter for comments, default: `{#`
    pub comment_start: &'static str,
    /// End delimiter for comments, default: `#}`
    pub comment_end: &'static str,
}

impl Default for Delimiters {
    fn default() -> Self {
        Self {
            block_start: "{%",
            block_end: "%}",
            variable_start: "{{",
            variable_end: "}}",
            comment_start: "{#",
            comment_end: "#}",
        }
    }
}

impl Delimiters {
    /// Returns an error if any delimiter is not 2 characters or if start delimiters conflict
    pub(crate) fn validate(&self) -> TesseraResult<()> {
        let all = [
            ("block_start", self.block_start),
            ("block_end", self.block_end),
            ("variable_start", self.variable_start),
            ("variable_end", self.variable_end),
            ("comment_start", self.comment_start),
            ("comment_end", self.comment_end),
        ];
        for (name, delim) in all {
            if delim.chars().count() != 2 {
                return Err(Error::message(format!(
                    "`{name}` delimiter must be 2 characters"
                )));
            }
        }

        let starts = [
            ("block_start", self.block_start),
            ("variable_start", self.variable_start),
            ("comment_start", self.comment_start),
        ];
        for (i, (name, delim)) in starts.iter().enumerate() {
            for (other_name, other) in &starts[i + 1..] {
                if delim == other {
                    return Err(Error::message(format!(
                        "`{name}` and `{other_name}` cannot have the same value"
                    )));
                }
            }
        }

        Ok(())
    }

    /// The text `{% templatetag name %}` outputs.
    pub(crate) fn templatetag(&self, name: &str) -> Option<String> {
        let out = match name {
            "openblock" => self.block_start.to_string(),
            "closeblock" => self.block_end.to_string(),
            "openvariable" => self.variable_start.to_string(),
            "closevariable" => self.variable_end.to_string(),
            "opencomment" => self.comment_start.to_string(),
            "closecomment" => self.comment_end.to_string(),
            // Single braces are the first/last char of the variable delimiters
            "openbrace" => self.variable_start.chars().take(1).collect(),
            "closebrace" => self.variable_end.chars().last()?.to_string(),
            _ => return None,
        };
        Some(out)
    }
}
