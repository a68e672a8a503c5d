//! Parses the bodies of the five supported statement shapes (spec.md §6) into
//! structured data. Each parser trusts `classifier::classify` has already
//! matched the statement's keyword prefix.

use super::tokens::{extract_parens, find_keyword_ci, split_top_level, strip_prefix_ci, tokenize_words};
use crate::error::{RelError, RelResult};
use crate::schema::{Attribute, IndexKind, TableSchema};
use crate::value::DataType;

#[derive(Debug, Clone)]
pub struct InsertStatement {
    pub table: String,
    pub columns: Option<Vec<String>>,
    /// Each inner vec holds one row's raw value tokens, still quoted/unparsed —
    /// the engine resolves them against the table's schema.
    pub rows: Vec<Vec<String>>,
}

#[derive(Debug, Clone)]
pub struct SelectStatement {
    pub table: String,
    /// `None` means `SELECT *`.
    pub columns: Option<Vec<String>>,
    pub where_clause: Option<String>,
}

#[derive(Debug, Clone)]
pub struct DeleteStatement {
    pub table: String,
    pub where_clause: String,
}

#[derive(Debug, Clone)]
pub struct ImportStatement {
    pub path: String,
    pub table: String,
    pub delimiter: Option<char>,
    pub encoding: Option<String>,
    pub no_header: bool,
}

/// `CREATE TABLE name ( attr TYPE [PRIMARY KEY|KEY] [INDEX kind] [SEQ] , ... )`.
/// Index kind defaults to `hash` when omitted (spec.md §4.7); exactly one
/// attribute may be a key.
pub fn parse_create_table(stmt: &str) -> RelResult<TableSchema> {
    let rest = strip_prefix_ci(stmt, "CREATE TABLE")
        .ok_or_else(|| RelError::Parse(format!("not a CREATE TABLE statement: '{stmt}'")))?;
    let paren_at = rest
        .find('(')
        .ok_or_else(|| RelError::Parse(format!("CREATE TABLE missing attribute list: '{stmt}'")))?;
    let table_name = rest[..paren_at].trim().to_string();
    if table_name.is_empty() {
        return Err(RelError::Parse(format!("CREATE TABLE missing table name: '{stmt}'")));
    }
    let (inner, _) = extract_parens(&rest[paren_at..])?;

    let mut attributes = Vec::new();
    let mut primary_key = None;
    for fragment in split_top_level(&inner, ',') {
        let tokens = tokenize_words(&fragment);
        if tokens.len() < 2 {
            return Err(RelError::Parse(format!("malformed attribute definition '{fragment}'")));
        }
        let name = tokens[0].clone();
        let data_type = DataType::parse(&tokens[1])?;
        let mut is_key = false;
        let mut index = None;
        let mut i = 2;
        while i < tokens.len() {
            let word = tokens[i].to_uppercase();
            match word.as_str() {
                "PRIMARY" if tokens.get(i + 1).is_some_and(|t| t.eq_ignore_ascii_case("KEY")) => {
                    is_key = true;
                    i += 2;
                }
                "KEY" => {
                    is_key = true;
                    i += 1;
                }
                "INDEX" => {
                    let kind_token = tokens
                        .get(i + 1)
                        .ok_or_else(|| RelError::Parse(format!("INDEX with no kind in '{fragment}'")))?;
                    index = Some(IndexKind::parse(kind_token)?);
                    i += 2;
                }
                "SEQ" => {
                    i += 1;
                }
                other => {
                    return Err(RelError::Parse(format!("unexpected token '{other}' in attribute definition '{fragment}'")));
                }
            }
        }
        if is_key {
            if primary_key.is_some() {
                return Err(RelError::Parse("CREATE TABLE declares more than one key attribute".into()));
            }
            primary_key = Some(name.clone());
        }
        attributes.push(Attribute { name, data_type, is_key, index: Some(index.unwrap_or(IndexKind::Hash)) });
    }
    if attributes.is_empty() {
        return Err(RelError::Parse(format!("CREATE TABLE with no attributes: '{stmt}'")));
    }

    Ok(TableSchema { table_name, attributes, primary_key })
}

/// `INSERT INTO name [(cols)] VALUES (v, ...), ...`.
pub fn parse_insert(stmt: &str) -> RelResult<InsertStatement> {
    let rest = strip_prefix_ci(stmt, "INSERT INTO")
        .ok_or_else(|| RelError::Parse(format!("not an INSERT INTO statement: '{stmt}'")))?;

    let values_pos = find_keyword_ci(rest, "VALUES")
        .ok_or_else(|| RelError::Parse(format!("INSERT missing VALUES: '{stmt}'")))?;
    let head = rest[..values_pos].trim();
    let tail = rest[values_pos + "VALUES".len()..].trim();

    let (table, columns) = match head.find('(') {
        Some(paren_at) => {
            let table = head[..paren_at].trim().to_string();
            let (inner, _) = extract_parens(&head[paren_at..])?;
            let cols = split_top_level(&inner, ',').into_iter().collect::<Vec<_>>();
            (table, Some(cols))
        }
        None => (head.to_string(), None),
    };
    if table.is_empty() {
        return Err(RelError::Parse(format!("INSERT missing table name: '{stmt}'")));
    }

    let mut rows = Vec::new();
    for group in split_top_level(tail, ',') {
        if !group.starts_with('(') {
            return Err(RelError::Parse(format!("malformed VALUES tuple '{group}'")));
        }
        let (inner, _) = extract_parens(&group)?;
        let values = split_top_level(&inner, ',');
        if values.is_empty() {
            return Err(RelError::Parse(format!("empty VALUES tuple in '{stmt}'")));
        }
        rows.push(values);
    }
    if rows.is_empty() {
        return Err(RelError::Parse(format!("INSERT with no VALUES tuples: '{stmt}'")));
    }

    Ok(InsertStatement { table, columns, rows })
}

/// `SELECT (*|col, ...) FROM name [WHERE cond...]`.
pub fn parse_select(stmt: &str) -> RelResult<SelectStatement> {
    let rest = strip_prefix_ci(stmt, "SELECT")
        .ok_or_else(|| RelError::Parse(format!("not a SELECT statement: '{stmt}'")))?;

    let from_pos =
        find_keyword_ci(rest, "FROM").ok_or_else(|| RelError::Parse(format!("SELECT missing FROM: '{stmt}'")))?;
    let columns_part = rest[..from_pos].trim();
    let columns = if columns_part == "*" {
        None
    } else {
        Some(split_top_level(columns_part, ',').into_iter().collect::<Vec<_>>())
    };

    let after_from = rest[from_pos + "FROM".len()..].trim();
    let (table, where_clause) = match find_keyword_ci(after_from, "WHERE") {
        Some(where_pos) => {
            let table = after_from[..where_pos].trim().to_string();
            let clause = after_from[where_pos + "WHERE".len()..].trim().to_string();
            (table, Some(clause))
        }
        None => (after_from.to_string(), None),
    };
    if table.is_empty() {
        return Err(RelError::Parse(format!("SELECT missing table name: '{stmt}'")));
    }

    Ok(SelectStatement { table, columns, where_clause })
}

/// `DELETE FROM name WHERE cond...` — WHERE is mandatory (spec.md §6).
pub fn parse_delete(stmt: &str) -> RelResult<DeleteStatement> {
    let rest = strip_prefix_ci(stmt, "DELETE FROM")
        .ok_or_else(|| RelError::Parse(format!("not a DELETE FROM statement: '{stmt}'")))?;
    let where_pos =
        find_keyword_ci(rest, "WHERE").ok_or_else(|| RelError::Parse(format!("DELETE without WHERE: '{stmt}'")))?;
    let table = rest[..where_pos].trim().to_string();
    if table.is_empty() {
        return Err(RelError::Parse(format!("DELETE missing table name: '{stmt}'")));
    }
    let where_clause = rest[where_pos + "WHERE".len()..].trim().to_string();
    if where_clause.is_empty() {
        return Err(RelError::Parse(format!("DELETE with empty WHERE clause: '{stmt}'")));
    }
    Ok(DeleteStatement { table, where_clause })
}

/// `IMPORT FROM CSV 'path' INTO name [WITH DELIMITER 'c'] [WITH ENCODING 'e'] [NO_HEADER]`.
pub fn parse_import_csv(stmt: &str) -> RelResult<ImportStatement> {
    let rest = strip_prefix_ci(stmt, "IMPORT FROM CSV")
        .ok_or_else(|| RelError::Parse(format!("not an IMPORT FROM CSV statement: '{stmt}'")))?;
    let rest = rest.trim_start();
    if !rest.starts_with(['\'', '"']) {
        return Err(RelError::Parse(format!("IMPORT FROM CSV expects a quoted path: '{stmt}'")));
    }
    let quote = rest.as_bytes()[0] as char;
    let close = rest[1..]
        .find(quote)
        .ok_or_else(|| RelError::Parse(format!("unterminated path string in '{stmt}'")))?;
    let path = rest[1..1 + close].to_string();
    let after_path = &rest[1 + close + 1..];

    let into_pos =
        find_keyword_ci(after_path, "INTO").ok_or_else(|| RelError::Parse(format!("IMPORT missing INTO: '{stmt}'")))?;
    let after_into = after_path[into_pos + "INTO".len()..].trim_start();
    let (table, end) = read_table_name(after_into);
    if table.is_empty() {
        return Err(RelError::Parse(format!("IMPORT missing table name: '{stmt}'")));
    }
    let options = &after_into[end..];

    let delimiter = find_quoted_option(options, "DELIMITER")?
        .map(|s| s.chars().next().ok_or_else(|| RelError::Parse("empty DELIMITER".into())))
        .transpose()?;
    let encoding = find_quoted_option(options, "ENCODING")?;
    let no_header = find_keyword_ci(options, "NO_HEADER").is_some();

    Ok(ImportStatement { path, table, delimiter, encoding, no_header })
}

fn read_table_name(s: &str) -> (String, usize) {
    let bytes = s.as_bytes();
    let mut i = 0;
    while i < bytes.len() && (bytes[i].is_ascii_alphanumeric() || bytes[i] == b'_') {
        i += 1;
    }
    (s[..i].to_string(), i)
}

fn find_quoted_option(s: &str, keyword: &str) -> RelResult<Option<String>> {
    let Some(pos) = find_keyword_ci(s, keyword) else {
        return Ok(None);
    };
    let after = s[pos + keyword.len()..].trim_start();
    if !after.starts_with(['\'', '"']) {
        return Err(RelError::Parse(format!("{keyword} expects a quoted argument")));
    }
    let quote = after.as_bytes()[0] as char;
    let close = after[1..]
        .find(quote)
        .ok_or_else(|| RelError::Parse(format!("unterminated {keyword} argument")))?;
    Ok(Some(after[1..1 + close].to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn create_table_parses_attributes_and_pk() {
        let schema = parse_create_table("CREATE TABLE t (id INT PRIMARY KEY, name VARCHAR[20] INDEX avl)").unwrap();
        assert_eq!(schema.table_name, "t");
        assert_eq!(schema.primary_key.as_deref(), Some("id"));
        assert_eq!(schema.attributes[0].data_type, DataType::Int);
        assert!(schema.attributes[0].is_key);
        assert_eq!(schema.attributes[0].index, Some(IndexKind::Hash));
        assert_eq!(schema.attributes[1].index, Some(IndexKind::Avl));
    }

    #[test]
    fn create_table_rejects_two_keys() {
        let err = parse_create_table("CREATE TABLE t (a INT KEY, b INT KEY)").unwrap_err();
        assert!(matches!(err, RelError::Parse(_)));
    }

    #[test]
    fn insert_parses_columns_and_rows() {
        let stmt = parse_insert("INSERT INTO t (id, name) VALUES (1, 'mango'), (2, 'banana')").unwrap();
        assert_eq!(stmt.table, "t");
        assert_eq!(stmt.columns, Some(vec!["id".to_string(), "name".to_string()]));
        assert_eq!(stmt.rows.len(), 2);
        assert_eq!(stmt.rows[0], vec!["1".to_string(), "'mango'".to_string()]);
    }

    #[test]
    fn insert_without_column_list() {
        let stmt = parse_insert("INSERT INTO t VALUES (1, 'mango')").unwrap();
        assert_eq!(stmt.columns, None);
        assert_eq!(stmt.rows.len(), 1);
    }

    #[test]
    fn select_star_has_no_columns() {
        let stmt = parse_select("SELECT * FROM t WHERE id = 1").unwrap();
        assert_eq!(stmt.table, "t");
        assert_eq!(stmt.columns, None);
        assert_eq!(stmt.where_clause.as_deref(), Some("id = 1"));
    }

    #[test]
    fn select_projected_columns_without_where() {
        let stmt = parse_select("SELECT id, name FROM t").unwrap();
        assert_eq!(stmt.columns, Some(vec!["id".to_string(), "name".to_string()]));
        assert_eq!(stmt.where_clause, None);
    }

    #[test]
    fn delete_requires_where() {
        let err = parse_delete("DELETE FROM t").unwrap_err();
        assert!(matches!(err, RelError::Parse(_)));
        let stmt = parse_delete("DELETE FROM t WHERE id = 2").unwrap();
        assert_eq!(stmt.table, "t");
        assert_eq!(stmt.where_clause, "id = 2");
    }

    #[test]
    fn import_csv_parses_path_table_and_options() {
        let stmt = parse_import_csv(
            "IMPORT FROM CSV 'data/people.csv' INTO people WITH DELIMITER ';' WITH ENCODING 'utf-8' NO_HEADER",
        )
        .unwrap();
        assert_eq!(stmt.path, "data/people.csv");
        assert_eq!(stmt.table, "people");
        assert_eq!(stmt.delimiter, Some(';'));
        assert_eq!(stmt.encoding.as_deref(), Some("utf-8"));
        assert!(stmt.no_header);
    }

    #[test]
    fn import_csv_defaults_are_none() {
        let stmt = parse_import_csv("IMPORT FROM CSV 'a.csv' INTO t").unwrap();
        assert_eq!(stmt.delimiter, None);
        assert_eq!(stmt.encoding, None);
        assert!(!stmt.no_header);
    }
}
