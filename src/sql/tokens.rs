//! Shared low-level scanning helpers used by every statement parser: splitting on a
//! separator while respecting quotes and parenthesis depth, pulling out parenthesized
//! groups, and whitespace tokenizing without breaking quoted substrings apart.

use crate::error::{RelError, RelResult};

/// Splits `s` on `sep` wherever it appears outside quotes and at paren depth 0.
pub fn split_top_level(s: &str, sep: char) -> Vec<String> {
    let mut out = Vec::new();
    let mut current = String::new();
    let mut quote: Option<char> = None;
    let mut depth = 0i32;
    let chars: Vec<char> = s.chars().collect();
    let mut i = 0;
    while i < chars.len() {
        let c = chars[i];
        if let Some(q) = quote {
            current.push(c);
            if c == q {
                quote = None;
            }
            i += 1;
            continue;
        }
        match c {
            '\'' | '"' => {
                quote = Some(c);
                current.push(c);
            }
            '(' => {
                depth += 1;
                current.push(c);
            }
            ')' => {
                depth -= 1;
                current.push(c);
            }
            c if c == sep && depth == 0 => {
                out.push(current.trim().to_string());
                current.clear();
            }
            _ => current.push(c),
        }
        i += 1;
    }
    let rest = current.trim().to_string();
    if !rest.is_empty() || !out.is_empty() {
        out.push(rest);
    }
    out.into_iter().filter(|p| !p.is_empty()).collect()
}

/// Tokenizes `s` on whitespace outside quotes, keeping each quoted literal as a
/// single token (quotes retained, for `Value::parse_as` to strip later).
pub fn tokenize_words(s: &str) -> Vec<String> {
    let mut tokens = Vec::new();
    let mut current = String::new();
    let mut quote: Option<char> = None;
    for c in s.chars() {
        if let Some(q) = quote {
            current.push(c);
            if c == q {
                quote = None;
            }
            continue;
        }
        if c == '\'' || c == '"' {
            quote = Some(c);
            current.push(c);
        } else if c.is_whitespace() {
            if !current.is_empty() {
                tokens.push(std::mem::take(&mut current));
            }
        } else {
            current.push(c);
        }
    }
    if !current.is_empty() {
        tokens.push(current);
    }
    tokens
}

/// Finds the first top-level (outside quotes, depth 0) whole-word, case-insensitive
/// occurrence of `keyword` in `s`, returning its byte offset.
pub fn find_keyword_ci(s: &str, keyword: &str) -> Option<usize> {
    let upper = s.to_uppercase();
    let keyword_upper = keyword.to_uppercase();
    let bytes = s.as_bytes();
    let mut quote: Option<u8> = None;
    let mut depth = 0i32;
    let mut i = 0;
    while i < bytes.len() {
        let c = bytes[i];
        if let Some(q) = quote {
            if c == q {
                quote = None;
            }
            i += 1;
            continue;
        }
        match c {
            b'\'' | b'"' => quote = Some(c),
            b'(' => depth += 1,
            b')' => depth -= 1,
            _ => {}
        }
        if quote.is_none() && depth == 0 && upper[i..].starts_with(&keyword_upper) {
            let before_ok = i == 0 || !bytes[i - 1].is_ascii_alphanumeric() && bytes[i - 1] != b'_';
            let after = i + keyword_upper.len();
            let after_ok = after >= bytes.len() || (!bytes[after].is_ascii_alphanumeric() && bytes[after] != b'_');
            if before_ok && after_ok {
                return Some(i);
            }
        }
        i += 1;
    }
    None
}

/// Extracts the content of the first balanced `( ... )` group in `s`, along with
/// the byte offset just past its closing paren.
pub fn extract_parens(s: &str) -> RelResult<(String, usize)> {
    let bytes = s.as_bytes();
    let start = s
        .find('(')
        .ok_or_else(|| RelError::Parse(format!("expected '(' in '{s}'")))?;
    let mut depth = 0i32;
    let mut quote: Option<u8> = None;
    let mut i = start;
    while i < bytes.len() {
        let c = bytes[i];
        if let Some(q) = quote {
            if c == q {
                quote = None;
            }
            i += 1;
            continue;
        }
        match c {
            b'\'' | b'"' => quote = Some(c),
            b'(' => depth += 1,
            b')' => {
                depth -= 1;
                if depth == 0 {
                    return Ok((s[start + 1..i].to_string(), i + 1));
                }
            }
            _ => {}
        }
        i += 1;
    }
    Err(RelError::Parse(format!("unbalanced parentheses in '{s}'")))
}

/// Finds a case-insensitive, top-level call `NAME(...)` in `s` — `NAME` as a
/// whole word immediately (modulo whitespace) followed by a balanced paren
/// group. Returns the call's start offset, the unparsed inner text, and the
/// offset just past the closing paren.
pub fn find_call(s: &str, name: &str) -> RelResult<Option<(usize, String, usize)>> {
    let Some(start) = find_keyword_ci(s, name) else {
        return Ok(None);
    };
    let after = &s[start + name.len()..];
    let trimmed = after.trim_start();
    if !trimmed.starts_with('(') {
        return Ok(None);
    }
    let paren_start = start + name.len() + (after.len() - trimmed.len());
    let (inner, end_rel) = extract_parens(&s[paren_start..])?;
    Ok(Some((start, inner, paren_start + end_rel)))
}

/// Case-insensitively strips a leading keyword phrase, returning the remainder
/// trimmed, or `None` if `s` does not start with it (as a whole word).
pub fn strip_prefix_ci<'a>(s: &'a str, prefix: &str) -> Option<&'a str> {
    let s_trimmed = s.trim_start();
    if s_trimmed.len() < prefix.len() {
        return None;
    }
    let (head, tail) = s_trimmed.split_at(prefix.len());
    if head.eq_ignore_ascii_case(prefix) {
        let ok = tail.is_empty() || tail.starts_with(|c: char| c.is_whitespace() || c == '(');
        if ok {
            return Some(tail.trim_start());
        }
    }
    None
}
