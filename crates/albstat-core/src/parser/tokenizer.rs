// Splits an access log line into fields.
// Fields are separated by whitespace, "quoted text" is one field (quotes
// stripped, inner spaces kept). Inside quotes only \" and \\ are escapes,
// the load balancer writes \" for quotes in user agents. Any other
// backslash is kept as is so paths like /a\b survive.

use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum TokenizeError {
    #[error("Unbalanced quote starting at byte {0}")]
    UnbalancedQuote(usize),
}

/// true for lines the tokenizer ignores entirely (blank or `#` comment)
pub fn is_ignorable(line: &str) -> bool {
    let trimmed = line.trim_start();
    trimmed.is_empty() || trimmed.starts_with('#')
}

/// Tokenize one line. Blank and comment lines give an empty vector.
pub fn tokenize(line: &str) -> Result<Vec<String>, TokenizeError> {
    if is_ignorable(line) {
        return Ok(Vec::new());
    }

    let mut tokens = Vec::new();
    let mut current = String::new();
    // a token may be empty ("") so track whether one is open
    let mut in_token = false;
    let mut quote_start: Option<usize> = None;
    let mut chars = line.char_indices().peekable();

    while let Some((idx, c)) = chars.next() {
        match (quote_start, c) {
            (Some(_), '"') => quote_start = None,
            (Some(_), '\\') => match chars.peek() {
                Some(&(_, escaped @ ('"' | '\\'))) => {
                    current.push(escaped);
                    chars.next();
                }
                _ => current.push('\\'),
            },
            (Some(_), c) => current.push(c),
            (None, '"') => {
                quote_start = Some(idx);
                in_token = true;
            }
            (None, c) if c.is_whitespace() => {
                if in_token {
                    tokens.push(std::mem::take(&mut current));
                    in_token = false;
                }
            }
            (None, c) => {
                current.push(c);
                in_token = true;
            }
        }
    }

    if let Some(start) = quote_start {
        return Err(TokenizeError::UnbalancedQuote(start));
    }
    if in_token {
        tokens.push(current);
    }
    Ok(tokens)
}
