//! WHERE clause parsing (spec.md §4.7): spatial predicates are pulled out
//! first (RADIUS, then KNN), then BETWEEN, then the comparison operators
//! (rewritten to inclusive ranges), and whatever is left is a conjunction of
//! `attr = value` equalities. Conditions combine only by AND.

use super::tokens::{find_call, find_keyword_ci, split_top_level};
use crate::error::{RelError, RelResult};
use crate::point::Point;
use crate::schema::TableSchema;
use crate::table::{ExactFilter, RangeFilter, SpatialFilter};
use crate::value::{DataType, Value};

/// The three filter kinds a WHERE clause decomposes into, ready for
/// `TableManager::select`/`delete`.
#[derive(Debug, Default)]
pub struct ParsedWhere {
    pub exact: Vec<ExactFilter>,
    pub ranges: Vec<RangeFilter>,
    pub spatial: Vec<SpatialFilter>,
}

pub fn parse_where(clause: &str, schema: &TableSchema) -> RelResult<ParsedWhere> {
    let mut spatial = Vec::new();
    let mut remaining = clause.trim().to_string();

    if let Some((start, inner, end)) = find_call(&remaining, "RADIUS")? {
        let filter = parse_radius(&inner, schema)?;
        spatial.push(filter);
        remaining.replace_range(start..end, " ");
        remaining = clean_ands(&remaining);
    }

    if let Some((start, inner, end)) = find_call(&remaining, "KNN")? {
        let filter = parse_knn(&inner, schema)?;
        spatial.push(filter);
        remaining.replace_range(start..end, " ");
        remaining = clean_ands(&remaining);
    }

    let (exact, ranges) = parse_ranges_and_exact(&remaining, schema)?;
    Ok(ParsedWhere { exact, ranges, spatial })
}

fn attribute_type(schema: &TableSchema, attr: &str) -> RelResult<DataType> {
    Ok(schema
        .attribute(attr)
        .ok_or_else(|| RelError::Schema(format!("unknown attribute '{attr}'")))?
        .data_type)
}

fn parse_radius(inner: &str, schema: &TableSchema) -> RelResult<SpatialFilter> {
    let parts = split_top_level(inner, ',');
    if parts.len() != 3 {
        return Err(RelError::Parse(format!("RADIUS expects (attr, center, r), got '{inner}'")));
    }
    let attr = parts[0].trim().to_string();
    attribute_type(schema, &attr)?;
    let center = Point::parse(parts[1].trim())?;
    let radius: f64 = parts[2]
        .trim()
        .parse()
        .map_err(|_| RelError::Parse(format!("invalid RADIUS distance '{}'", parts[2])))?;
    Ok(SpatialFilter::Radius { attr, center, radius })
}

fn parse_knn(inner: &str, schema: &TableSchema) -> RelResult<SpatialFilter> {
    let parts = split_top_level(inner, ',');
    if parts.len() != 3 {
        return Err(RelError::Parse(format!("KNN expects (attr, center, k), got '{inner}'")));
    }
    let attr = parts[0].trim().to_string();
    attribute_type(schema, &attr)?;
    let center = Point::parse(parts[1].trim())?;
    let k: usize = parts[2]
        .trim()
        .parse()
        .map_err(|_| RelError::Parse(format!("invalid KNN count '{}'", parts[2])))?;
    Ok(SpatialFilter::Knn { attr, center, k })
}

/// Strips stray leading/trailing `AND`s left behind once a matched span is
/// excised from the clause, and collapses a clause that is now just `AND`.
fn clean_ands(s: &str) -> String {
    let mut t = s.trim().to_string();
    loop {
        if let Some(rest) = strip_leading_and(&t) {
            t = rest.trim().to_string();
            continue;
        }
        break;
    }
    loop {
        if let Some(rest) = strip_trailing_and(&t) {
            t = rest.trim().to_string();
            continue;
        }
        break;
    }
    t
}

fn strip_leading_and(s: &str) -> Option<&str> {
    let trimmed = s.trim_start();
    if trimmed.len() >= 3 && trimmed[..3].eq_ignore_ascii_case("AND") {
        let tail = &trimmed[3..];
        if tail.is_empty() || tail.starts_with(char::is_whitespace) {
            return Some(tail);
        }
    }
    None
}

fn strip_trailing_and(s: &str) -> Option<&str> {
    let trimmed = s.trim_end();
    if trimmed.len() >= 3 && trimmed[trimmed.len() - 3..].eq_ignore_ascii_case("AND") {
        let head = &trimmed[..trimmed.len() - 3];
        if head.is_empty() || head.ends_with(char::is_whitespace) {
            return Some(head);
        }
    }
    None
}

/// Reads a value token starting at `start` (after skipping whitespace): a
/// balanced paren group for POINT literals, a quoted string, or a run of
/// non-whitespace characters otherwise. Returns the token and the offset
/// just past it.
fn read_value_token(s: &str, start: usize) -> (String, usize) {
    let bytes = s.as_bytes();
    let mut i = start;
    while i < bytes.len() && (bytes[i] as char).is_whitespace() {
        i += 1;
    }
    if i >= bytes.len() {
        return (String::new(), i);
    }
    let vstart = i;
    match bytes[i] {
        b'(' => {
            let mut depth = 0i32;
            while i < bytes.len() {
                match bytes[i] {
                    b'(' => depth += 1,
                    b')' => {
                        depth -= 1;
                        if depth == 0 {
                            i += 1;
                            break;
                        }
                    }
                    _ => {}
                }
                i += 1;
            }
        }
        b'\'' | b'"' => {
            let q = bytes[i];
            i += 1;
            while i < bytes.len() && bytes[i] != q {
                i += 1;
            }
            i = (i + 1).min(bytes.len());
        }
        _ => {
            while i < bytes.len() && !(bytes[i] as char).is_whitespace() {
                i += 1;
            }
        }
    }
    (s[vstart..i].to_string(), i)
}

/// Reads a bare word starting at `start` (after skipping whitespace).
fn read_word(s: &str, start: usize) -> (String, usize) {
    let bytes = s.as_bytes();
    let mut i = start;
    while i < bytes.len() && (bytes[i] as char).is_whitespace() {
        i += 1;
    }
    let wstart = i;
    while i < bytes.len() && (bytes[i].is_ascii_alphanumeric() || bytes[i] == b'_') {
        i += 1;
    }
    (s[wstart..i].to_string(), i)
}

/// Reads the word immediately preceding `pos`, skipping whitespace, and
/// returns it along with the byte offset it starts at.
fn read_word_before(s: &str, pos: usize) -> (String, usize) {
    let bytes = s.as_bytes();
    let mut i = pos;
    while i > 0 && (bytes[i - 1] as char).is_whitespace() {
        i -= 1;
    }
    let end = i;
    while i > 0 && (bytes[i - 1].is_ascii_alphanumeric() || bytes[i - 1] == b'_') {
        i -= 1;
    }
    (s[i..end].to_string(), i)
}

/// Finds the first occurrence of the literal symbol `sym` outside quotes.
fn find_symbol(s: &str, sym: &str) -> Option<usize> {
    let bytes = s.as_bytes();
    let sym_bytes = sym.as_bytes();
    let mut quote: Option<u8> = None;
    let mut i = 0;
    while i + sym_bytes.len() <= bytes.len() {
        let c = bytes[i];
        if let Some(q) = quote {
            if c == q {
                quote = None;
            }
            i += 1;
            continue;
        }
        if c == b'\'' || c == b'"' {
            quote = Some(c);
            i += 1;
            continue;
        }
        if &bytes[i..i + sym_bytes.len()] == sym_bytes {
            return Some(i);
        }
        i += 1;
    }
    None
}

fn split_top_level_and(s: &str) -> Vec<String> {
    let mut out = Vec::new();
    let mut rest = s;
    loop {
        match find_keyword_ci(rest, "AND") {
            None => {
                out.push(rest.to_string());
                break;
            }
            Some(pos) => {
                out.push(rest[..pos].to_string());
                rest = &rest[pos + 3..];
            }
        }
    }
    out
}

/// The maximum/minimum representable value for `data_type`, used as the open
/// end of a range produced by a strict `<`/`>`/`<=`/`>=` comparison
/// (spec.md §9, "synthetic extrema").
fn min_max_for_type(data_type: DataType) -> (Value, Value) {
    match data_type {
        DataType::Int => (Value::Int(i32::MIN), Value::Int(i32::MAX)),
        DataType::Date => (Value::Date(i32::MIN), Value::Date(i32::MAX)),
        DataType::Float => (Value::Float(-999_999_999.99), Value::Float(999_999_999.99)),
        DataType::Bool => (Value::Bool(false), Value::Bool(true)),
        DataType::Varchar(_) | DataType::Char(_) => {
            (Value::Str(String::new()), Value::Str("Z".repeat(64)))
        }
        DataType::Point => (
            Value::Point(Point::new(-999_999.0, -999_999.0)),
            Value::Point(Point::new(999_999.0, 999_999.0)),
        ),
    }
}

/// Shifts `value` by one epsilon step in `direction` (+1 or -1), used to turn
/// a strict `<`/`>` into an inclusive bound. Types without a meaningful
/// epsilon (strings, bools) are returned unchanged.
fn shift_by_epsilon(value: &Value, direction: i32) -> Value {
    let sign = direction as f64;
    match value {
        Value::Int(i) => Value::Int(i.saturating_add(direction)),
        Value::Date(d) => Value::Date(d.saturating_add(direction)),
        Value::Float(f) => Value::Float(f + sign * 0.01),
        Value::Point(p) => Value::Point(Point::new(p.x + sign * 0.01, p.y + sign * 0.01)),
        other => other.clone(),
    }
}

fn comparison_to_range(attr: &str, op: &str, value: Value, data_type: DataType) -> RangeFilter {
    let (min, max) = min_max_for_type(data_type);
    match op {
        ">" => RangeFilter { attr: attr.to_string(), lo: shift_by_epsilon(&value, 1), hi: max },
        ">=" => RangeFilter { attr: attr.to_string(), lo: value, hi: max },
        "<" => RangeFilter { attr: attr.to_string(), lo: min, hi: shift_by_epsilon(&value, -1) },
        "<=" => RangeFilter { attr: attr.to_string(), lo: min, hi: value },
        _ => unreachable!("comparison_to_range called with unsupported operator '{op}'"),
    }
}

fn parse_ranges_and_exact(clause: &str, schema: &TableSchema) -> RelResult<(Vec<ExactFilter>, Vec<RangeFilter>)> {
    let mut ranges = Vec::new();
    let mut working = clause.to_string();

    loop {
        let Some(pos) = find_keyword_ci(&working, "BETWEEN") else { break };
        let (attr, attr_start) = read_word_before(&working, pos);
        if attr.is_empty() {
            return Err(RelError::Parse(format!("BETWEEN with no attribute in '{working}'")));
        }
        let after = pos + "BETWEEN".len();
        let (lo_str, end1) = read_value_token(&working, after);
        let (and_word, end2) = read_word(&working, end1);
        if !and_word.eq_ignore_ascii_case("AND") {
            return Err(RelError::Parse(format!("expected AND in BETWEEN clause near '{working}'")));
        }
        let (hi_str, end3) = read_value_token(&working, end2);
        let data_type = attribute_type(schema, &attr)?;
        let lo = Value::parse_as(&lo_str, data_type)?;
        let hi = Value::parse_as(&hi_str, data_type)?;
        ranges.push(RangeFilter { attr: attr.clone(), lo, hi });
        working.replace_range(attr_start..end3, " ");
        working = clean_ands(&working);
    }

    for op in [">=", "<=", ">", "<"] {
        loop {
            let Some(pos) = find_symbol(&working, op) else { break };
            let (attr, attr_start) = read_word_before(&working, pos);
            if attr.is_empty() {
                return Err(RelError::Parse(format!("'{op}' with no attribute in '{working}'")));
            }
            let after = pos + op.len();
            let (val_str, end) = read_value_token(&working, after);
            let data_type = attribute_type(schema, &attr)?;
            let value = Value::parse_as(&val_str, data_type)?;
            ranges.push(comparison_to_range(&attr, op, value, data_type));
            working.replace_range(attr_start..end, " ");
            working = clean_ands(&working);
        }
    }

    let mut exact = Vec::new();
    for part in split_top_level_and(&working) {
        let part = part.trim();
        if part.is_empty() {
            continue;
        }
        let eq_pos = find_symbol(part, "=").ok_or_else(|| RelError::Parse(format!("unsupported condition '{part}'")))?;
        let (attr, _) = read_word_before(part, eq_pos);
        if attr.is_empty() {
            return Err(RelError::Parse(format!("'=' with no attribute in '{part}'")));
        }
        let (val_str, _) = read_value_token(part, eq_pos + 1);
        let data_type = attribute_type(schema, &attr)?;
        let value = Value::parse_as(&val_str, data_type)?;
        exact.push(ExactFilter { attr, value });
    }
    Ok((exact, ranges))
}
