//! Cuts SQL text into individual statements.
//!
//! Statements end at a `;` that is not inside a string literal, a quoted
//! identifier, a dollar-quoted body or a comment. Comments preceding a
//! statement stay attached to it; segments holding nothing but comments and
//! whitespace are dropped, so a trailing comment never becomes a statement.

/// Splits `sql` into trimmed statements without their terminating `;`.
pub fn split_statements(sql: &str) -> Vec<&str> {
    let bytes = sql.as_bytes();
    let len = bytes.len();
    let mut statements = Vec::new();
    let mut start = 0;
    // Set once the current segment holds something other than comments.
    let mut has_code = false;
    let mut i = 0;

    while i < len {
        if let Some((end, is_comment)) = skip_non_code(sql, i) {
            has_code |= !is_comment;
            i = end;
            continue;
        }

        match bytes[i] {
            b';' => {
                if has_code {
                    statements.push(sql[start..i].trim());
                }
                start = i + 1;
                has_code = false;
            }
            b if !b.is_ascii_whitespace() => has_code = true,
            _ => {}
        }
        i += 1;
    }

    if has_code {
        statements.push(sql[start..].trim());
    }

    statements
}

/// `sql` with comments, literals, quoted identifiers and dollar-quoted bodies
/// each replaced by a single space. What is left is the SQL the server would
/// parse as keywords and names.
pub fn code_only(sql: &str) -> String {
    let len = sql.len();
    let mut code = String::with_capacity(len);
    let mut start = 0;
    let mut i = 0;

    while i < len {
        match skip_non_code(sql, i) {
            Some((end, _)) => {
                code.push_str(&sql[start..i]);
                code.push(' ');
                i = end;
                start = end;
            }
            None => i += 1,
        }
    }

    code.push_str(&sql[start..]);
    code
}

/// When a comment, literal or quoted body starts at `i`, returns the index
/// just past it and whether it was a comment.
fn skip_non_code(sql: &str, i: usize) -> Option<(usize, bool)> {
    let bytes = sql.as_bytes();
    let len = bytes.len();
    let next = bytes.get(i + 1).copied();

    match bytes[i] {
        b'-' if next == Some(b'-') => {
            let end = sql[i..].find('\n').map_or(len, |offset| i + offset);
            Some((end, true))
        }
        b'/' if next == Some(b'*') => Some((skip_block_comment(bytes, i), true)),
        b'\'' => Some((skip_quoted(bytes, i, b'\'', is_escape_string(bytes, i)), false)),
        b'"' => Some((skip_quoted(bytes, i, b'"', false), false)),
        b'$' => match skip_dollar_quoted(sql, i) {
            end if end > i + 1 => Some((end, false)),
            _ => None,
        },
        _ => None,
    }
}

/// Block comments nest in PostgreSQL.
fn skip_block_comment(bytes: &[u8], mut i: usize) -> usize {
    let len = bytes.len();
    i += 2;
    let mut depth = 1;
    while i < len && depth > 0 {
        if i + 1 < len && bytes[i] == b'/' && bytes[i + 1] == b'*' {
            depth += 1;
            i += 2;
        } else if i + 1 < len && bytes[i] == b'*' && bytes[i + 1] == b'/' {
            depth -= 1;
            i += 2;
        } else {
            i += 1;
        }
    }
    i
}

/// Whether the quote at `i` opens an `E'...'` string.
fn is_escape_string(bytes: &[u8], i: usize) -> bool {
    i > 0
        && (bytes[i - 1] == b'E' || bytes[i - 1] == b'e')
        && (i < 2 || !(bytes[i - 2].is_ascii_alphanumeric() || bytes[i - 2] == b'_'))
}

/// Returns the index just past the closing `quote` of the literal opening at
/// `i`. Doubled quotes are escapes.
fn skip_quoted(bytes: &[u8], mut i: usize, quote: u8, backslash_escapes: bool) -> usize {
    let len = bytes.len();
    i += 1;
    while i < len {
        if backslash_escapes && bytes[i] == b'\\' {
            i += 2;
            continue;
        }
        if bytes[i] == quote {
            if i + 1 < len && bytes[i + 1] == quote {
                i += 2;
            } else {
                return i + 1;
            }
        } else {
            i += 1;
        }
    }
    len
}

/// Skips a `$$...$$` or `$tag$...$tag$` body starting at `i`. A `$` that does
/// not open a dollar quote (a positional parameter such as `$1`) is stepped
/// over on its own.
fn skip_dollar_quoted(sql: &str, i: usize) -> usize {
    let bytes = sql.as_bytes();
    let len = bytes.len();
    let mut end = i + 1;
    while end < len && (bytes[end].is_ascii_alphanumeric() || bytes[end] == b'_') {
        end += 1;
    }
    if end >= len || bytes[end] != b'$' || bytes.get(i + 1).is_some_and(u8::is_ascii_digit) {
        return i + 1;
    }

    let tag = &sql[i..=end];
    match sql[end + 1..].find(tag) {
        Some(offset) => end + 1 + offset + tag.len(),
        None => len,
    }
}
