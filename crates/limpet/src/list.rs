//! Codec for the host interpreter's list format.
//!
//! Policy scripts are merged with argument lists using the same quoting
//! rules the interpreter itself applies: elements are separated by
//! whitespace, brace-quoted elements nest and are taken verbatim, and
//! double-quoted or bare elements undergo backslash substitution. The
//! script strategy depends on these exact semantics — appending an argument
//! to a parsed list must round-trip through [`split_list`] and
//! [`join_list`], not through naive string concatenation.

use thiserror::Error;

/// Errors raised while parsing a string as a list.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ListError {
    /// A brace-quoted element was not closed before the end of input.
    #[error("unmatched open brace in list")]
    UnmatchedBrace,
    /// A double-quoted element was not closed before the end of input.
    #[error("unmatched open quote in list")]
    UnmatchedQuote,
    /// A quoted element was followed by data instead of a separator.
    #[error("list element in braces followed by {0:?} instead of space")]
    TrailingData(char),
}

fn is_separator(ch: char) -> bool {
    matches!(ch, ' ' | '\t' | '\n' | '\r' | '\x0b' | '\x0c')
}

/// Substitute a backslash sequence, returning the replacement character.
fn substitute(ch: char) -> char {
    match ch {
        'n' => '\n',
        't' => '\t',
        'r' => '\r',
        'a' => '\x07',
        'b' => '\x08',
        'f' => '\x0c',
        'v' => '\x0b',
        other => other,
    }
}

/// Split `text` into its list elements.
///
/// # Errors
///
/// Returns a [`ListError`] when the text is not a well-formed list, e.g. an
/// unterminated brace or quote, or trailing characters after a quoted
/// element.
pub fn split_list(text: &str) -> Result<Vec<String>, ListError> {
    let mut elements = Vec::new();
    let mut chars = text.chars().peekable();

    while let Some(&ch) = chars.peek() {
        if is_separator(ch) {
            chars.next();
            continue;
        }

        let element = match ch {
            '{' => {
                chars.next();
                parse_braced(&mut chars)?
            }
            '"' => {
                chars.next();
                parse_quoted(&mut chars)?
            }
            _ => parse_bare(&mut chars),
        };

        elements.push(element);
    }

    Ok(elements)
}

/// Parse a brace-quoted element; the opening brace is already consumed.
/// Content is taken verbatim, with nested braces tracked.
fn parse_braced(chars: &mut std::iter::Peekable<std::str::Chars<'_>>) -> Result<String, ListError> {
    let mut element = String::new();
    let mut depth = 1usize;

    while let Some(ch) = chars.next() {
        match ch {
            '{' => {
                depth += 1;
                element.push(ch);
            }
            '}' => {
                depth -= 1;
                if depth == 0 {
                    return finish_quoted(chars, element);
                }
                element.push(ch);
            }
            '\\' => {
                // Backslashes inside braces are preserved verbatim, but
                // still shield the following brace from depth counting.
                element.push(ch);
                if let Some(next) = chars.next() {
                    element.push(next);
                }
            }
            _ => element.push(ch),
        }
    }

    Err(ListError::UnmatchedBrace)
}

/// Parse a double-quoted element; the opening quote is already consumed.
fn parse_quoted(chars: &mut std::iter::Peekable<std::str::Chars<'_>>) -> Result<String, ListError> {
    let mut element = String::new();

    while let Some(ch) = chars.next() {
        match ch {
            '"' => return finish_quoted(chars, element),
            '\\' => match chars.next() {
                Some(next) => element.push(substitute(next)),
                None => element.push('\\'),
            },
            _ => element.push(ch),
        }
    }

    Err(ListError::UnmatchedQuote)
}

/// A closing brace or quote must be followed by a separator or the end of
/// the input.
fn finish_quoted(
    chars: &mut std::iter::Peekable<std::str::Chars<'_>>,
    element: String,
) -> Result<String, ListError> {
    match chars.peek() {
        None => Ok(element),
        Some(&ch) if is_separator(ch) => Ok(element),
        Some(&ch) => Err(ListError::TrailingData(ch)),
    }
}

/// Parse an unquoted element up to the next separator.
fn parse_bare(chars: &mut std::iter::Peekable<std::str::Chars<'_>>) -> String {
    let mut element = String::new();

    while let Some(&ch) = chars.peek() {
        if is_separator(ch) {
            break;
        }
        chars.next();
        if ch == '\\' {
            match chars.next() {
                Some(next) => element.push(substitute(next)),
                None => element.push('\\'),
            }
        } else {
            element.push(ch);
        }
    }

    element
}

/// Whether the braces in `element` pair up, so it may be brace-quoted.
fn braces_balanced(element: &str) -> bool {
    let mut depth = 0i64;
    let mut chars = element.chars();

    while let Some(ch) = chars.next() {
        match ch {
            '\\' => {
                chars.next();
            }
            '{' => depth += 1,
            '}' => {
                depth -= 1;
                if depth < 0 {
                    return false;
                }
            }
            _ => {}
        }
    }

    depth == 0
}

/// Quote a single element so it survives a later [`split_list`] intact.
fn quote_element(element: &str) -> String {
    if element.is_empty() {
        return "{}".to_string();
    }

    let needs_quoting = element.chars().any(|ch| {
        is_separator(ch) || matches!(ch, '{' | '}' | '[' | ']' | '$' | '"' | ';' | '\\')
    });

    if !needs_quoting {
        return element.to_string();
    }

    if braces_balanced(element) && !element.ends_with('\\') {
        return format!("{{{element}}}");
    }

    // Fall back to backslash quoting.
    let mut quoted = String::with_capacity(element.len() * 2);
    for ch in element.chars() {
        if is_separator(ch) || matches!(ch, '{' | '}' | '[' | ']' | '$' | '"' | ';' | '\\') {
            quoted.push('\\');
        }
        quoted.push(ch);
    }
    quoted
}

/// Serialize elements into a single list string.
///
/// The result splits back into the same elements: `split_list(&join_list(x))
/// == x` for any elements `x`.
pub fn join_list<'a>(elements: impl IntoIterator<Item = &'a str>) -> String {
    let mut list = String::new();
    for element in elements {
        if !list.is_empty() {
            list.push(' ');
        }
        list.push_str(&quote_element(element));
    }
    list
}
