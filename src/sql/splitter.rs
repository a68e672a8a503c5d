//! Splits a cleaned SQL blob into individual statements (spec.md §4.7).

use super::tokens::split_top_level;

/// Splits on `;` outside quotes and parentheses, dropping empty statements
/// (e.g. a trailing `;` or blank input).
pub fn split_statements(cleaned: &str) -> Vec<String> {
    split_top_level(cleaned, ';')
}
