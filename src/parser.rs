pub mod lexer;

use crate::ast::{
    Assignment, ColumnRef, CompareOp, Comparison, Condition, Datum, Join, Operand, OrderBy,
    SelectItem, Statement, Table, TableRef,
};
use lexer::{Spanned, Token, tokenize};
use rust_decimal::Decimal;
use std::str::FromStr;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ParseError {
    Empty,
    UnexpectedCharacter { ch: char, offset: usize },
    UnterminatedString(usize),
    UnexpectedToken {
        expected: String,
        found: String,
        offset: usize,
    },
    UnexpectedEnd(String),
    UnknownStatement(String),
    UnknownTable(String),
    InvalidNumber(String),
    ValueCountMismatch { columns: usize, values: usize },
}

impl std::fmt::Display for ParseError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Empty => write!(f, "empty statement"),
            Self::UnexpectedCharacter { ch, offset } => {
                write!(f, "unexpected character '{ch}' at offset {offset}")
            }
            Self::UnterminatedString(offset) => {
                write!(f, "unterminated quoted string starting at offset {offset}")
            }
            Self::UnexpectedToken {
                expected,
                found,
                offset,
            } => write!(f, "expected {expected}, found '{found}' at offset {offset}"),
            Self::UnexpectedEnd(expected) => write!(f, "expected {expected}, found end of input"),
            Self::UnknownStatement(verb) => write!(f, "unknown statement kind: {verb}"),
            Self::UnknownTable(name) => write!(f, "unknown table: {name}"),
            Self::InvalidNumber(n) => write!(f, "invalid number: {n}"),
            Self::ValueCountMismatch { columns, values } => {
                write!(f, "{columns} columns but {values} values")
            }
        }
    }
}

impl std::error::Error for ParseError {}

/// Words that end a table reference rather than naming an alias.
const RESERVED: &[&str] = &[
    "WHERE", "JOIN", "INNER", "ON", "ORDER", "LIMIT", "SET", "VALUES", "AND", "OR", "NOT", "AS",
];

/// Parses a single statement.
pub fn parse_statement(sql: &str) -> Result<Statement, ParseError> {
    Parser::new(tokenize(sql)?).parse()
}

/// Splits multi-statement text on `;`, ignoring separators inside quotes
/// and `--` line comments.
pub fn split_statements(sql: &str) -> Vec<&str> {
    let mut parts = Vec::new();
    let mut quote: Option<char> = None;
    let mut start = 0;
    let mut chars = sql.char_indices().peekable();

    while let Some((i, c)) = chars.next() {
        match (quote, c) {
            (None, '-') if matches!(chars.peek(), Some((_, '-'))) => {
                for (_, c) in chars.by_ref() {
                    if c == '\n' {
                        break;
                    }
                }
            }
            (None, '\'' | '"' | '`') => quote = Some(c),
            (Some(q), c) if c == q => quote = None,
            (None, ';') => {
                parts.push(&sql[start..i]);
                start = i + 1;
            }
            _ => {}
        }
    }
    parts.push(&sql[start..]);

    parts.into_iter().filter(|s| !s.trim().is_empty()).collect()
}

pub struct Parser {
    tokens: Vec<Spanned>,
    pos: usize,
    placeholders: usize,
}

impl Parser {
    pub const fn new(tokens: Vec<Spanned>) -> Self {
        Self {
            tokens,
            pos: 0,
            placeholders: 0,
        }
    }

    pub fn parse(mut self) -> Result<Statement, ParseError> {
        let verb = match self.peek() {
            Some(Token::Ident {
                name,
                quoted: false,
            }) => name.to_ascii_uppercase(),
            Some(other) => return Err(ParseError::UnknownStatement(other.to_string())),
            None => return Err(ParseError::Empty),
        };

        let statement = match verb.as_str() {
            "INSERT" => self.parse_insert()?,
            "UPDATE" => self.parse_update()?,
            "DELETE" => self.parse_delete()?,
            "SELECT" => self.parse_select()?,
            _ => return Err(ParseError::UnknownStatement(verb)),
        };

        while self.eat(&Token::Semicolon) {}
        match self.tokens.get(self.pos) {
            Some(t) => Err(unexpected("end of statement", t)),
            None => Ok(statement),
        }
    }

    fn parse_insert(&mut self) -> Result<Statement, ParseError> {
        self.expect_keyword("INSERT")?;
        self.expect_keyword("INTO")?;
        let table = self.parse_table()?;

        self.expect(&Token::LParen, "'('")?;
        let columns = self.parse_list(Self::parse_ident)?;
        self.expect(&Token::RParen, "')'")?;

        self.expect_keyword("VALUES")?;
        self.expect(&Token::LParen, "'('")?;
        let values = self.parse_list(Self::parse_operand)?;
        self.expect(&Token::RParen, "')'")?;

        if columns.len() != values.len() {
            return Err(ParseError::ValueCountMismatch {
                columns: columns.len(),
                values: values.len(),
            });
        }

        Ok(Statement::Insert {
            table,
            columns,
            values,
        })
    }

    fn parse_update(&mut self) -> Result<Statement, ParseError> {
        self.expect_keyword("UPDATE")?;
        let table = self.parse_table()?;
        self.expect_keyword("SET")?;

        let assignments = self.parse_list(|p| {
            let column = p.parse_ident()?;
            p.expect(&Token::Op(CompareOp::Eq), "'='")?;
            let value = p.parse_operand()?;
            Ok(Assignment { column, value })
        })?;

        let condition = self.parse_where()?;

        Ok(Statement::Update {
            table,
            assignments,
            condition,
        })
    }

    fn parse_delete(&mut self) -> Result<Statement, ParseError> {
        self.expect_keyword("DELETE")?;
        self.expect_keyword("FROM")?;
        let table = self.parse_table()?;
        let condition = self.parse_where()?;
        Ok(Statement::Delete { table, condition })
    }

    fn parse_select(&mut self) -> Result<Statement, ParseError> {
        self.expect_keyword("SELECT")?;
        let projection = self.parse_list(Self::parse_select_item)?;

        self.expect_keyword("FROM")?;
        let from = self.parse_table_ref()?;

        let join = if self.eat_keyword("INNER") {
            self.expect_keyword("JOIN")?;
            Some(self.parse_join()?)
        } else if self.eat_keyword("JOIN") {
            Some(self.parse_join()?)
        } else {
            None
        };

        let condition = self.parse_where()?;

        let order_by = if self.eat_keyword("ORDER") {
            self.expect_keyword("BY")?;
            let column = self.parse_column()?;
            let ascending = if self.eat_keyword("DESC") {
                false
            } else {
                self.eat_keyword("ASC");
                true
            };
            Some(OrderBy { column, ascending })
        } else {
            None
        };

        let limit = if self.eat_keyword("LIMIT") {
            let raw = match self.next() {
                Some(Spanned {
                    token: Token::Number(n),
                    ..
                }) => n,
                Some(t) => return Err(unexpected("a row count", &t)),
                None => return Err(ParseError::UnexpectedEnd("a row count".to_string())),
            };
            Some(raw.parse::<usize>().map_err(|_| ParseError::InvalidNumber(raw))?)
        } else {
            None
        };

        Ok(Statement::Select {
            projection,
            from,
            join,
            condition,
            order_by,
            limit,
        })
    }

    fn parse_select_item(&mut self) -> Result<SelectItem, ParseError> {
        if self.eat(&Token::Star) {
            return Ok(SelectItem::Wildcard(None));
        }

        let first = self.parse_ident()?;
        if !self.eat(&Token::Dot) {
            return Ok(SelectItem::Column(ColumnRef::new(&first)));
        }
        if self.eat(&Token::Star) {
            return Ok(SelectItem::Wildcard(Some(first)));
        }
        let name = self.parse_ident()?;
        Ok(SelectItem::Column(ColumnRef::qualified(&first, &name)))
    }

    fn parse_join(&mut self) -> Result<Join, ParseError> {
        let table = self.parse_table_ref()?;
        self.expect_keyword("ON")?;
        let left = self.parse_column()?;
        self.expect(&Token::Op(CompareOp::Eq), "'='")?;
        let right = self.parse_column()?;
        Ok(Join { table, left, right })
    }

    fn parse_where(&mut self) -> Result<Option<Condition>, ParseError> {
        if self.eat_keyword("WHERE") {
            Ok(Some(self.parse_or()?))
        } else {
            Ok(None)
        }
    }

    fn parse_or(&mut self) -> Result<Condition, ParseError> {
        let mut left = self.parse_and()?;
        while self.eat_keyword("OR") {
            let right = self.parse_and()?;
            left = Condition::Or(Box::new(left), Box::new(right));
        }
        Ok(left)
    }

    fn parse_and(&mut self) -> Result<Condition, ParseError> {
        let mut left = self.parse_unary()?;
        while self.eat_keyword("AND") {
            let right = self.parse_unary()?;
            left = Condition::And(Box::new(left), Box::new(right));
        }
        Ok(left)
    }

    fn parse_unary(&mut self) -> Result<Condition, ParseError> {
        if self.eat_keyword("NOT") {
            return Ok(Condition::Not(Box::new(self.parse_unary()?)));
        }
        if self.eat(&Token::LParen) {
            let inner = self.parse_or()?;
            self.expect(&Token::RParen, "')'")?;
            return Ok(inner);
        }

        let column = self.parse_column()?;
        let op = match self.next() {
            Some(Spanned {
                token: Token::Op(op),
                ..
            }) => op,
            Some(t) => return Err(unexpected("a comparison operator", &t)),
            None => {
                return Err(ParseError::UnexpectedEnd(
                    "a comparison operator".to_string(),
                ));
            }
        };
        let operand = self.parse_operand()?;

        Ok(Condition::Compare(Comparison {
            column,
            op,
            operand,
        }))
    }

    fn parse_operand(&mut self) -> Result<Operand, ParseError> {
        let Some(spanned) = self.next() else {
            return Err(ParseError::UnexpectedEnd("a value".to_string()));
        };

        match spanned.token {
            Token::Placeholder => {
                let index = self.placeholders;
                self.placeholders += 1;
                Ok(Operand::Placeholder(index))
            }
            Token::String(s) => Ok(Operand::Literal(Datum::String(s))),
            Token::Number(n) => Ok(Operand::Literal(parse_number(&n, false)?)),
            Token::Minus => match self.next() {
                Some(Spanned {
                    token: Token::Number(n),
                    ..
                }) => Ok(Operand::Literal(parse_number(&n, true)?)),
                Some(t) => Err(unexpected("a number", &t)),
                None => Err(ParseError::UnexpectedEnd("a number".to_string())),
            },
            Token::Ident {
                ref name,
                quoted: false,
            } => match name.to_ascii_uppercase().as_str() {
                "NULL" => Ok(Operand::Literal(Datum::Null)),
                "TRUE" => Ok(Operand::Literal(Datum::Bool(true))),
                "FALSE" => Ok(Operand::Literal(Datum::Bool(false))),
                "CURRENT_TIMESTAMP" => Ok(Operand::Now),
                "DATETIME" => {
                    self.expect(&Token::LParen, "'('")?;
                    match self.next() {
                        Some(Spanned {
                            token: Token::String(arg),
                            ..
                        }) if arg.eq_ignore_ascii_case("now") => {}
                        Some(t) => return Err(unexpected("'now'", &t)),
                        None => return Err(ParseError::UnexpectedEnd("'now'".to_string())),
                    }
                    self.expect(&Token::RParen, "')'")?;
                    Ok(Operand::Now)
                }
                _ => Err(unexpected("a value", &spanned)),
            },
            _ => Err(unexpected("a value", &spanned)),
        }
    }

    fn parse_table(&mut self) -> Result<Table, ParseError> {
        let name = self.parse_ident()?;
        Table::from_name(&name).ok_or(ParseError::UnknownTable(name))
    }

    fn parse_table_ref(&mut self) -> Result<TableRef, ParseError> {
        let table = self.parse_table()?;
        let alias = if self.eat_keyword("AS") {
            Some(self.parse_ident()?)
        } else {
            match self.peek() {
                Some(Token::Ident { name, quoted }) if *quoted || !is_reserved(name) => {
                    let alias = name.clone();
                    self.pos += 1;
                    Some(alias)
                }
                _ => None,
            }
        };
        Ok(TableRef { table, alias })
    }

    fn parse_column(&mut self) -> Result<ColumnRef, ParseError> {
        let first = self.parse_ident()?;
        if self.eat(&Token::Dot) {
            let name = self.parse_ident()?;
            Ok(ColumnRef::qualified(&first, &name))
        } else {
            Ok(ColumnRef::new(&first))
        }
    }

    fn parse_ident(&mut self) -> Result<String, ParseError> {
        match self.next() {
            Some(Spanned {
                token: Token::Ident { name, .. },
                ..
            }) => Ok(name),
            Some(t) => Err(unexpected("an identifier", &t)),
            None => Err(ParseError::UnexpectedEnd("an identifier".to_string())),
        }
    }

    fn parse_list<T>(
        &mut self,
        mut item: impl FnMut(&mut Self) -> Result<T, ParseError>,
    ) -> Result<Vec<T>, ParseError> {
        let mut items = vec![item(self)?];
        while self.eat(&Token::Comma) {
            items.push(item(self)?);
        }
        Ok(items)
    }

    fn peek(&self) -> Option<&Token> {
        self.tokens.get(self.pos).map(|s| &s.token)
    }

    fn next(&mut self) -> Option<Spanned> {
        let spanned = self.tokens.get(self.pos).cloned();
        if spanned.is_some() {
            self.pos += 1;
        }
        spanned
    }

    fn eat(&mut self, token: &Token) -> bool {
        if self.peek() == Some(token) {
            self.pos += 1;
            true
        } else {
            false
        }
    }

    fn eat_keyword(&mut self, keyword: &str) -> bool {
        match self.peek() {
            Some(Token::Ident {
                name,
                quoted: false,
            }) if name.eq_ignore_ascii_case(keyword) => {
                self.pos += 1;
                true
            }
            _ => false,
        }
    }

    fn expect(&mut self, token: &Token, expected: &str) -> Result<(), ParseError> {
        if self.eat(token) {
            return Ok(());
        }
        match self.tokens.get(self.pos) {
            Some(t) => Err(unexpected(expected, t)),
            None => Err(ParseError::UnexpectedEnd(expected.to_string())),
        }
    }

    fn expect_keyword(&mut self, keyword: &str) -> Result<(), ParseError> {
        if self.eat_keyword(keyword) {
            return Ok(());
        }
        match self.tokens.get(self.pos) {
            Some(t) => Err(unexpected(keyword, t)),
            None => Err(ParseError::UnexpectedEnd(keyword.to_string())),
        }
    }
}

fn is_reserved(word: &str) -> bool {
    RESERVED.iter().any(|r| r.eq_ignore_ascii_case(word))
}

fn unexpected(expected: &str, found: &Spanned) -> ParseError {
    ParseError::UnexpectedToken {
        expected: expected.to_string(),
        found: found.token.to_string(),
        offset: found.offset,
    }
}

fn parse_number(raw: &str, negative: bool) -> Result<Datum, ParseError> {
    let text = if negative {
        format!("-{raw}")
    } else {
        raw.to_string()
    };

    if !raw.contains('.') {
        if let Ok(i) = text.parse::<i64>() {
            return Ok(Datum::Integer(i));
        }
    }

    Decimal::from_str(&text)
        .map(Datum::Decimal)
        .map_err(|_| ParseError::InvalidNumber(text))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn eq_param(column: ColumnRef, index: usize) -> Condition {
        Condition::Compare(Comparison {
            column,
            op: CompareOp::Eq,
            operand: Operand::Placeholder(index),
        })
    }

    #[test]
    fn test_parse_insert() {
        let stmt =
            parse_statement("INSERT INTO pledges (id, post_id, amount) VALUES (?, ?, ?)").unwrap();
        assert_eq!(
            stmt,
            Statement::Insert {
                table: Table::Pledges,
                columns: vec!["id".into(), "post_id".into(), "amount".into()],
                values: vec![
                    Operand::Placeholder(0),
                    Operand::Placeholder(1),
                    Operand::Placeholder(2),
                ],
            }
        );
        assert_eq!(stmt.placeholder_count(), 3);
    }

    #[test]
    fn test_parse_insert_literals() {
        let stmt = parse_statement(
            "insert into posts (id, goal_amount, ratio, status, image_url) values (?, 1000, -0.5, 'active', NULL);",
        )
        .unwrap();
        let Statement::Insert { values, .. } = stmt else {
            panic!("expected insert");
        };
        assert_eq!(values[1], Operand::Literal(Datum::Integer(1000)));
        assert_eq!(
            values[2],
            Operand::Literal(Datum::Decimal(Decimal::new(-5, 1)))
        );
        assert_eq!(values[3], Operand::Literal(Datum::from("active")));
        assert_eq!(values[4], Operand::Literal(Datum::Null));
    }

    #[test]
    fn test_parse_insert_count_mismatch() {
        assert_eq!(
            parse_statement("INSERT INTO users (id, email) VALUES (?)"),
            Err(ParseError::ValueCountMismatch {
                columns: 2,
                values: 1
            })
        );
    }

    #[test]
    fn test_parse_update() {
        let stmt = parse_statement("UPDATE posts SET current_amount = ?, status = ? WHERE id = ?")
            .unwrap();
        assert_eq!(
            stmt,
            Statement::Update {
                table: Table::Posts,
                assignments: vec![
                    Assignment {
                        column: "current_amount".into(),
                        value: Operand::Placeholder(0),
                    },
                    Assignment {
                        column: "status".into(),
                        value: Operand::Placeholder(1),
                    },
                ],
                condition: Some(eq_param(ColumnRef::new("id"), 2)),
            }
        );
    }

    #[test]
    fn test_parse_delete_without_where() {
        assert_eq!(
            parse_statement("DELETE FROM sessions").unwrap(),
            Statement::Delete {
                table: Table::Sessions,
                condition: None,
            }
        );
    }

    #[test]
    fn test_parse_select_full() {
        let stmt = parse_statement(
            "SELECT id, vote_type FROM proposal_votes WHERE proposal_id = ? AND user_id = ? ORDER BY created_at DESC LIMIT 5",
        )
        .unwrap();
        assert_eq!(
            stmt,
            Statement::Select {
                projection: vec![
                    SelectItem::Column(ColumnRef::new("id")),
                    SelectItem::Column(ColumnRef::new("vote_type")),
                ],
                from: TableRef {
                    table: Table::ProposalVotes,
                    alias: None,
                },
                join: None,
                condition: Some(Condition::And(
                    Box::new(eq_param(ColumnRef::new("proposal_id"), 0)),
                    Box::new(eq_param(ColumnRef::new("user_id"), 1)),
                )),
                order_by: Some(OrderBy {
                    column: ColumnRef::new("created_at"),
                    ascending: false,
                }),
                limit: Some(5),
            }
        );
    }

    #[test]
    fn test_parse_select_join() {
        let stmt = parse_statement(
            "SELECT s.*, u.id, u.email
             FROM sessions s
             JOIN users u ON s.user_id = u.id
             WHERE s.id = ? AND s.expires_at > datetime('now')",
        )
        .unwrap();
        let Statement::Select {
            projection,
            from,
            join,
            condition,
            ..
        } = stmt
        else {
            panic!("expected select");
        };

        assert_eq!(projection[0], SelectItem::Wildcard(Some("s".into())));
        assert_eq!(from.alias.as_deref(), Some("s"));
        let join = join.unwrap();
        assert_eq!(join.table.table, Table::Users);
        assert_eq!(join.left, ColumnRef::qualified("s", "user_id"));
        assert_eq!(join.right, ColumnRef::qualified("u", "id"));
        assert_eq!(
            condition,
            Some(Condition::And(
                Box::new(eq_param(ColumnRef::qualified("s", "id"), 0)),
                Box::new(Condition::Compare(Comparison {
                    column: ColumnRef::qualified("s", "expires_at"),
                    op: CompareOp::Gt,
                    operand: Operand::Now,
                })),
            ))
        );
    }

    #[test]
    fn test_parse_condition_precedence() {
        let stmt =
            parse_statement("SELECT * FROM posts WHERE status = 'a' OR status = 'b' AND id = ?")
                .unwrap();
        let Statement::Select {
            condition: Some(Condition::Or(_, right)),
            ..
        } = stmt
        else {
            panic!("expected OR at the root");
        };
        assert!(matches!(*right, Condition::And(_, _)));
    }

    #[test]
    fn test_parse_errors() {
        assert_eq!(parse_statement("   "), Err(ParseError::Empty));
        assert_eq!(
            parse_statement("DROP TABLE users"),
            Err(ParseError::UnknownStatement("DROP".into()))
        );
        assert_eq!(
            parse_statement("SELECT * FROM widgets"),
            Err(ParseError::UnknownTable("widgets".into()))
        );
        assert!(matches!(
            parse_statement("SELECT * FROM users LIMIT ?"),
            Err(ParseError::UnexpectedToken { .. })
        ));
        assert!(matches!(
            parse_statement("SELECT * FROM users WHERE"),
            Err(ParseError::UnexpectedEnd(_))
        ));
        assert!(matches!(
            parse_statement("SELECT * FROM users extra junk"),
            Err(ParseError::UnexpectedToken { .. })
        ));
    }

    #[test]
    fn test_split_statements() {
        let parts = split_statements("DELETE FROM users; DELETE FROM posts WHERE title = 'a;b';\n");
        assert_eq!(
            parts,
            vec!["DELETE FROM users", " DELETE FROM posts WHERE title = 'a;b'"]
        );

        let parts = split_statements("DELETE FROM users; -- everyone's; data\nDELETE FROM posts;");
        assert_eq!(
            parts,
            vec!["DELETE FROM users", " -- everyone's; data\nDELETE FROM posts"]
        );
        assert!(matches!(
            parse_statement(parts[1]),
            Ok(Statement::Delete {
                table: Table::Posts,
                ..
            })
        ));
    }
}
