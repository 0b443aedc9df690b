//! The pooling capability the [`Database`](super::Database) facade drives.
//!
//! A [`Pool`] hands out [`Connection`]s. Dropping a connection returns it to
//! its pool, so every checkout is released on every exit path, including early
//! returns through `?` and panics.

use async_trait::async_trait;

use super::{DbError, Row, Value};

/// Native placeholder syntax of a backend.
///
/// Statements are always authored with `?`; the facade rewrites them with
/// [`translate`](Self::translate) just before execution.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Placeholder {
    /// `?`: MySQL, SQLite. Statements pass through unchanged.
    #[default]
    QuestionMark,
    /// `$1`, `$2`, …: PostgreSQL.
    Numbered,
    /// `%s`: DB-API style drivers.
    Format,
}

impl Placeholder {
    /// Rewrites every `?` outside quoted literals and identifiers.
    ///
    /// # Examples
    ///
    /// ```
    /// use weft::database::Placeholder;
    ///
    /// let sql = "select * from `t` where a=? and b='?' and c=?";
    /// assert_eq!(
    ///     Placeholder::Numbered.translate(sql),
    ///     "select * from `t` where a=$1 and b='?' and c=$2"
    /// );
    /// ```
    pub fn translate(self, sql: &str) -> String {
        if self == Placeholder::QuestionMark {
            return sql.to_owned();
        }

        let mut out = String::with_capacity(sql.len() + 8);
        let mut quote: Option<char> = None;
        let mut index = 0;

        for c in sql.chars() {
            match (quote, c) {
                (Some(q), c) if c == q => {
                    quote = None;
                    out.push(c);
                }
                (Some(_), c) => out.push(c),
                (None, '\'' | '"' | '`') => {
                    quote = Some(c);
                    out.push(c);
                }
                (None, '?') => {
                    index += 1;
                    match self {
                        Placeholder::Numbered => {
                            out.push('$');
                            out.push_str(&index.to_string());
                        }
                        _ => out.push_str("%s"),
                    }
                }
                (None, c) => out.push(c),
            }
        }
        out
    }
}

/// A source of pooled database connections.
#[async_trait]
pub trait Pool: Send + Sync {
    /// Short backend name used in log fields, e.g. `"mysql"`.
    fn backend(&self) -> &'static str;

    /// Placeholder syntax the backend expects.
    fn placeholder(&self) -> Placeholder {
        Placeholder::QuestionMark
    }

    /// Checks a connection out of the pool, waiting if all are leased.
    async fn acquire(&self) -> Result<Box<dyn Connection>, DbError>;

    /// Closes the pool; later acquisitions fail with [`DbError::Closed`].
    async fn close(&self);
}

/// One leased connection. Statements arrive already translated to the
/// backend's placeholder syntax.
#[async_trait]
pub trait Connection: Send {
    /// Runs a read and returns at most `limit` rows (all rows when `None`).
    async fn fetch(
        &mut self,
        sql: &str,
        args: &[Value],
        limit: Option<usize>,
    ) -> Result<Vec<Row>, DbError>;

    /// Runs a write and returns the affected-row count.
    async fn execute(&mut self, sql: &str, args: &[Value]) -> Result<u64, DbError>;

    async fn begin(&mut self) -> Result<(), DbError>;

    async fn commit(&mut self) -> Result<(), DbError>;

    async fn rollback(&mut self) -> Result<(), DbError>;

    /// Closes the connection instead of returning it to its pool, for a
    /// connection left in an unknown transaction state.
    async fn discard(self: Box<Self>);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn question_mark_is_identity() {
        let sql = "select `id` from `users` where `id`=?";
        assert_eq!(Placeholder::QuestionMark.translate(sql), sql);
    }

    #[test]
    fn numbered_placeholders_count_up() {
        assert_eq!(
            Placeholder::Numbered.translate("insert into t (a, b, c) values (?, ?, ?)"),
            "insert into t (a, b, c) values ($1, $2, $3)"
        );
    }

    #[test]
    fn format_placeholders() {
        assert_eq!(
            Placeholder::Format.translate("update `t` set `a`=? where `id`=?"),
            "update `t` set `a`=%s where `id`=%s"
        );
    }

    #[test]
    fn quoted_question_marks_are_untouched() {
        assert_eq!(
            Placeholder::Format.translate(r#"select "?", `a?b` from t where x=?"#),
            r#"select "?", `a?b` from t where x=%s"#
        );
    }
}
