//! Comment stripping and whitespace collapsing ahead of statement splitting
//! (spec.md §4.7).

/// Removes `-- line` and `/* block */` comments outside of string literals,
/// collapses runs of whitespace outside strings to a single space, and
/// preserves doubled-quote escaping inside strings untouched.
pub fn clean(input: &str) -> String {
    let chars: Vec<char> = input.chars().collect();
    let mut out = String::with_capacity(input.len());
    let mut i = 0;
    let mut quote: Option<char> = None;
    let mut last_was_space = true; // trims leading whitespace for free

    while i < chars.len() {
        let c = chars[i];

        if let Some(q) = quote {
            out.push(c);
            last_was_space = false;
            if c == q {
                if chars.get(i + 1) == Some(&q) {
                    out.push(q);
                    i += 2;
                    continue;
                }
                quote = None;
            }
            i += 1;
            continue;
        }

        if c == '\'' || c == '"' {
            quote = Some(c);
            out.push(c);
            last_was_space = false;
            i += 1;
            continue;
        }

        if c == '-' && chars.get(i + 1) == Some(&'-') {
            while i < chars.len() && chars[i] != '\n' {
                i += 1;
            }
            continue;
        }

        if c == '/' && chars.get(i + 1) == Some(&'*') {
            i += 2;
            while i < chars.len() && !(chars[i] == '*' && chars.get(i + 1) == Some(&'/')) {
                i += 1;
            }
            i = (i + 2).min(chars.len());
            continue;
        }

        if c.is_whitespace() {
            if !last_was_space {
                out.push(' ');
                last_was_space = true;
            }
            i += 1;
            continue;
        }

        out.push(c);
        last_was_space = false;
        i += 1;
    }

    out.trim_end().to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn strips_line_and_block_comments() {
        let cleaned = clean("SELECT * FROM t -- get everything\nWHERE /* tbd */ id = 1;");
        assert_eq!(cleaned, "SELECT * FROM t WHERE id = 1;");
    }

    #[test]
    fn preserves_comment_like_text_inside_strings() {
        let cleaned = clean("INSERT INTO t VALUES ('a -- not a comment');");
        assert_eq!(cleaned, "INSERT INTO t VALUES ('a -- not a comment');");
    }

    #[test]
    fn collapses_whitespace_outside_strings() {
        let cleaned = clean("SELECT   *\n\nFROM    t;");
        assert_eq!(cleaned, "SELECT * FROM t;");
    }

    #[test]
    fn doubled_quote_is_not_a_terminator() {
        let cleaned = clean("INSERT INTO t VALUES ('it''s here');");
        assert_eq!(cleaned, "INSERT INTO t VALUES ('it''s here');");
    }
}
