//! The crate's hand-rolled SQL front end (spec.md §4.7): clean → split →
//! classify → parse. Each stage is its own module so the pipeline can be
//! tested independently of table execution.

pub mod classifier;
pub mod cleaner;
pub mod expr;
pub mod splitter;
pub mod statements;
pub mod tokens;

pub use classifier::{classify, StatementKind};
pub use expr::{parse_where, ParsedWhere};
pub use statements::{
    parse_create_table, parse_delete, parse_import_csv, parse_insert, parse_select, DeleteStatement,
    ImportStatement, InsertStatement, SelectStatement,
};

/// Cleans and splits a SQL text blob into individual statements, ready for
/// `classifier::classify` and the per-kind parsers.
pub fn prepare(sql: &str) -> Vec<String> {
    splitter::split_statements(&cleaner::clean(sql))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn prepare_cleans_and_splits() {
        let stmts = prepare("SELECT * FROM t; -- trailing comment\nDELETE FROM t WHERE id = 1;");
        assert_eq!(stmts, vec!["SELECT * FROM t", "DELETE FROM t WHERE id = 1"]);
    }
}
