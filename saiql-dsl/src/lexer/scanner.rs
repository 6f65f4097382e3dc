//! Lexer implementation
//!
//! Recognition order per position, stopping at the first match:
//! whitespace → `//` comments → multi-character operators (fixed table,
//! longest first) → single-character structurals → legend symbols
//! (longest candidate first) → string literals → numeric literals →
//! identifiers → standalone `*` wildcard. An unrecognized character is a
//! fatal [`LexError`]; the lexer does not recover.

use super::token::*;
use saiql_core::{Legend, LexError};

/// Fixed multi-character operator table. Order matters: longer operators
/// precede their prefixes.
const MULTI_CHAR_OPS: &[(&str, TokenKind)] = &[
    ("::", TokenKind::NamespaceSep),
    (">>", TokenKind::OutputOp),
    ("===", TokenKind::AssignmentOp),
    ("==", TokenKind::AssignmentOp),
    ("=J", TokenKind::JoinSymbol),
    ("=L", TokenKind::JoinSymbol),
    ("=R", TokenKind::JoinSymbol),
    ("=F", TokenKind::JoinSymbol),
    ("=C", TokenKind::JoinSymbol),
    ("=S", TokenKind::JoinSymbol),
    ("=N", TokenKind::JoinSymbol),
    ("=U", TokenKind::JoinSymbol),
    ("+++", TokenKind::ArithmeticOp),
    ("++", TokenKind::ArithmeticOp),
    ("!!!", TokenKind::Constraint),
    ("!!", TokenKind::Constraint),
    ("###", TokenKind::IndexOp),
    ("##", TokenKind::IndexOp),
    ("*****", TokenKind::FunctionSymbol),
    ("****", TokenKind::FunctionSymbol),
    ("***", TokenKind::FunctionSymbol),
    ("**", TokenKind::FunctionSymbol),
];

/// Token kind for a legend symbol, keyed by its family.
fn kind_for_family(family: &str) -> TokenKind {
    match family {
        "ASTERISK_FAMILY" | "AGGREGATES" | "operations" => TokenKind::FunctionSymbol,
        "CIRCLE_FAMILY" => TokenKind::DataType,
        "PLUS_FAMILY" | "operators" => TokenKind::ArithmeticOp,
        "EQUALS_FAMILY" => TokenKind::AssignmentOp,
        "EXCLAMATION_FAMILY" => TokenKind::Constraint,
        "AT_FAMILY" => TokenKind::SchemaOp,
        "HASH_FAMILY" => TokenKind::IndexOp,
        "DOLLAR_FAMILY" => TokenKind::Transaction,
        _ => TokenKind::FunctionSymbol,
    }
}

/// Tokenization flags. Whitespace and comments are elided by default.
#[derive(Debug, Clone, Copy, Default)]
pub struct LexOptions {
    pub keep_whitespace: bool,
    pub keep_comments: bool,
}

/// SAIQL lexer. Holds the symbol legend; reusable across queries.
pub struct Lexer {
    legend: Legend,
}

impl Lexer {
    /// Create a lexer over the given legend.
    pub fn new(legend: Legend) -> Self {
        Self { legend }
    }

    /// Tokenize, eliding whitespace and comments.
    pub fn tokenize(&self, text: &str) -> Result<Vec<Token>, LexError> {
        self.tokenize_with(text, LexOptions::default())
    }

    /// Tokenize with explicit elision flags.
    pub fn tokenize_with(&self, text: &str, opts: LexOptions) -> Result<Vec<Token>, LexError> {
        Scanner::new(text, &self.legend, opts).run()
    }

    pub fn legend(&self) -> &Legend {
        &self.legend
    }
}

struct Scanner<'a> {
    source: &'a str,
    legend: &'a Legend,
    opts: LexOptions,
    pos: usize,
    line: usize,
    column: usize,
    tokens: Vec<Token>,
}

impl<'a> Scanner<'a> {
    fn new(source: &'a str, legend: &'a Legend, opts: LexOptions) -> Self {
        Self {
            source,
            legend,
            opts,
            pos: 0,
            line: 1,
            column: 1,
            tokens: Vec::new(),
        }
    }

    fn run(mut self) -> Result<Vec<Token>, LexError> {
        while self.pos < self.source.len() {
            if self.match_whitespace() {
                continue;
            }
            if self.match_comment() {
                continue;
            }
            if self.match_multi_char_operator() {
                continue;
            }
            if self.match_single_char() {
                continue;
            }
            if self.match_legend_symbol() {
                continue;
            }
            if self.match_string_literal()? {
                continue;
            }
            if self.match_number_literal() {
                continue;
            }
            if self.match_identifier() {
                continue;
            }
            if self.match_wildcard() {
                continue;
            }

            let c = self.peek_char().unwrap_or('\0');
            return Err(LexError {
                message: format!("unexpected character '{}'", c),
                position: self.pos,
                line: self.line,
                column: self.column,
            });
        }

        let span = Span {
            start: self.pos,
            end: self.pos,
            line: self.line,
            column: self.column,
        };
        self.tokens.push(Token::new(TokenKind::Eof, "", span));
        Ok(self.tokens)
    }

    fn rest(&self) -> &'a str {
        &self.source[self.pos..]
    }

    fn peek_char(&self) -> Option<char> {
        self.rest().chars().next()
    }

    fn peek_char_at(&self, byte_offset: usize) -> Option<char> {
        self.source[self.pos + byte_offset..].chars().next()
    }

    /// Consume `len` bytes, updating line/column tracking, and return the
    /// span of the consumed text.
    fn consume(&mut self, len: usize) -> Span {
        let start = self.pos;
        let start_line = self.line;
        let start_column = self.column;
        for c in self.source[start..start + len].chars() {
            if c == '\n' {
                self.line += 1;
                self.column = 1;
            } else {
                self.column += 1;
            }
        }
        self.pos += len;
        Span {
            start,
            end: self.pos,
            line: start_line,
            column: start_column,
        }
    }

    fn emit(&mut self, kind: TokenKind, len: usize) {
        let lexeme = self.source[self.pos..self.pos + len].to_string();
        let span = self.consume(len);
        self.tokens.push(Token::new(kind, lexeme, span));
    }

    fn match_whitespace(&mut self) -> bool {
        let len: usize = self
            .rest()
            .chars()
            .take_while(|c| c.is_whitespace())
            .map(char::len_utf8)
            .sum();
        if len == 0 {
            return false;
        }
        if self.opts.keep_whitespace {
            self.emit(TokenKind::Whitespace, len);
        } else {
            self.consume(len);
        }
        true
    }

    // `//` to end of line. `#` is reserved for index operators.
    fn match_comment(&mut self) -> bool {
        if !self.rest().starts_with("//") {
            return false;
        }
        let len = self.rest().find('\n').unwrap_or(self.rest().len());
        if self.opts.keep_comments {
            self.emit(TokenKind::Comment, len);
        } else {
            self.consume(len);
        }
        true
    }

    fn match_multi_char_operator(&mut self) -> bool {
        for (op, kind) in MULTI_CHAR_OPS {
            if self.rest().starts_with(op) {
                self.emit(*kind, op.len());
                return true;
            }
        }
        false
    }

    fn match_single_char(&mut self) -> bool {
        let kind = match self.peek_char() {
            Some('[') => TokenKind::ContainerOpen,
            Some(']') => TokenKind::ContainerClose,
            Some('{') => TokenKind::BlockOpen,
            Some('}') => TokenKind::BlockClose,
            Some('(') => TokenKind::ParamOpen,
            Some(')') => TokenKind::ParamClose,
            Some(',') => TokenKind::ColumnList,
            Some('=') => TokenKind::ComparisonOp,
            Some('<') => TokenKind::ComparisonOp,
            Some('>') => TokenKind::ComparisonOp,
            _ => return false,
        };
        self.emit(kind, 1);
        true
    }

    /// Longest legend symbol at the cursor. A symbol ending in an
    /// alphanumeric only matches at a word boundary, so `orders` is never
    /// split into the `o` symbol plus an identifier tail.
    fn match_legend_symbol(&mut self) -> bool {
        let rest = self.rest();
        let upper = self.legend.max_symbol_len().min(rest.len());
        for len in (1..=upper).rev() {
            if !rest.is_char_boundary(len) {
                continue;
            }
            let candidate = &rest[..len];
            let Some(info) = self.legend.lookup(candidate) else {
                continue;
            };
            let ends_alnum = candidate
                .chars()
                .next_back()
                .is_some_and(|c| c.is_ascii_alphanumeric());
            let next_is_word = self
                .peek_char_at(len)
                .is_some_and(|c| c.is_ascii_alphanumeric() || c == '_');
            if ends_alnum && next_is_word {
                continue;
            }

            let kind = kind_for_family(&info.family);
            let info = info.clone();
            let lexeme = candidate.to_string();
            let span = self.consume(len);
            self.tokens
                .push(Token::new(kind, lexeme, span).with_symbol(info));
            return true;
        }
        false
    }

    fn match_string_literal(&mut self) -> Result<bool, LexError> {
        let quote = match self.peek_char() {
            Some(q @ ('\'' | '"')) => q,
            _ => return Ok(false),
        };

        let mut chars = self.rest().char_indices().skip(1);
        while let Some((i, c)) = chars.next() {
            match c {
                '\\' => {
                    // Escape: skip the next character.
                    chars.next();
                }
                c if c == quote => {
                    self.emit(TokenKind::StringLiteral, i + c.len_utf8());
                    return Ok(true);
                }
                _ => {}
            }
        }

        Err(LexError {
            message: "unterminated string literal".to_string(),
            position: self.pos,
            line: self.line,
            column: self.column,
        })
    }

    // `-?\d+\.?\d*` - optional sign, digits, optional fractional part.
    fn match_number_literal(&mut self) -> bool {
        let rest = self.rest();
        let bytes = rest.as_bytes();
        let mut i = 0;
        if bytes.first() == Some(&b'-') {
            i = 1;
        }
        let digit_start = i;
        while i < bytes.len() && bytes[i].is_ascii_digit() {
            i += 1;
        }
        if i == digit_start {
            return false;
        }
        if i < bytes.len() && bytes[i] == b'.' {
            i += 1;
            while i < bytes.len() && bytes[i].is_ascii_digit() {
                i += 1;
            }
        }
        self.emit(TokenKind::NumberLiteral, i);
        true
    }

    // `[A-Za-z_][A-Za-z0-9_.,]*` - dots allow qualified names, commas
    // allow compact column lists like `name,email`.
    fn match_identifier(&mut self) -> bool {
        let rest = self.rest();
        let bytes = rest.as_bytes();
        if !bytes
            .first()
            .is_some_and(|b| b.is_ascii_alphabetic() || *b == b'_')
        {
            return false;
        }
        let mut i = 1;
        while i < bytes.len()
            && (bytes[i].is_ascii_alphanumeric()
                || bytes[i] == b'_'
                || bytes[i] == b'.'
                || bytes[i] == b',')
        {
            i += 1;
        }

        let text = &rest[..i];
        let kind = if text.contains(',') {
            TokenKind::ColumnList
        } else if text.eq_ignore_ascii_case("true") || text.eq_ignore_ascii_case("false") {
            TokenKind::BooleanLiteral
        } else if text.eq_ignore_ascii_case("null") {
            TokenKind::NullLiteral
        } else {
            TokenKind::Identifier
        };
        self.emit(kind, i);
        true
    }

    // A standalone `*` not followed by an alphanumeric is the select-all
    // wildcard; `*`-prefixed lexemes are function symbols handled above.
    fn match_wildcard(&mut self) -> bool {
        if self.peek_char() != Some('*') {
            return false;
        }
        if self
            .peek_char_at(1)
            .is_some_and(|c| c.is_ascii_alphanumeric())
        {
            return false;
        }
        self.emit(TokenKind::Wildcard, 1);
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn lexer() -> Lexer {
        Lexer::new(Legend::core())
    }

    fn kinds(tokens: &[Token]) -> Vec<TokenKind> {
        tokens.iter().map(|t| t.kind).collect()
    }

    #[test]
    fn test_select_query_tokenizes() {
        let tokens = lexer()
            .tokenize("*3[users]::name,email>>oQ")
            .expect("query should lex");
        assert_eq!(
            kinds(&tokens),
            vec![
                TokenKind::FunctionSymbol,
                TokenKind::ContainerOpen,
                TokenKind::Identifier,
                TokenKind::ContainerClose,
                TokenKind::NamespaceSep,
                TokenKind::ColumnList,
                TokenKind::OutputOp,
                TokenKind::DataType,
                TokenKind::Eof,
            ]
        );

        let select = &tokens[0];
        assert_eq!(select.lexeme, "*3");
        let info = select.symbol.as_ref().expect("legend symbol metadata");
        assert_eq!(info.family, "ASTERISK_FAMILY");
        assert_eq!(info.sql_hint, "SELECT");
    }

    #[test]
    fn test_join_query_tokenizes() {
        let tokens = lexer()
            .tokenize("=J[users+orders]::>>oQ")
            .expect("query should lex");
        assert_eq!(
            kinds(&tokens),
            vec![
                TokenKind::JoinSymbol,
                TokenKind::ContainerOpen,
                TokenKind::Identifier,
                TokenKind::ArithmeticOp,
                TokenKind::Identifier,
                TokenKind::ContainerClose,
                TokenKind::NamespaceSep,
                TokenKind::OutputOp,
                TokenKind::DataType,
                TokenKind::Eof,
            ]
        );
        assert_eq!(tokens[2].lexeme, "users");
        assert_eq!(tokens[4].lexeme, "orders");
    }

    #[test]
    fn test_wildcard_vs_function_symbol() {
        let tokens = lexer()
            .tokenize("*COUNT[sales]::*>>oQ")
            .expect("query should lex");
        assert_eq!(tokens[0].kind, TokenKind::FunctionSymbol);
        assert_eq!(tokens[0].lexeme, "*COUNT");
        let wildcard = tokens
            .iter()
            .find(|t| t.kind == TokenKind::Wildcard)
            .expect("standalone * should be a wildcard");
        assert_eq!(wildcard.lexeme, "*");
    }

    #[test]
    fn test_transaction_symbol() {
        let tokens = lexer().tokenize("$1").expect("should lex");
        assert_eq!(tokens[0].kind, TokenKind::Transaction);
        assert_eq!(
            tokens[0].symbol.as_ref().map(|s| s.sql_hint.as_str()),
            Some("BEGIN")
        );
    }

    #[test]
    fn test_legend_symbol_respects_word_boundary() {
        // `o` is a legend symbol but `orders` is a plain identifier.
        let tokens = lexer().tokenize("o").expect("should lex");
        assert_eq!(tokens[0].kind, TokenKind::DataType);

        let tokens = lexer().tokenize("orders").expect("should lex");
        assert_eq!(tokens[0].kind, TokenKind::Identifier);
        assert_eq!(tokens[0].lexeme, "orders");
    }

    #[test]
    fn test_spaced_column_list_fragments() {
        // "name, email" fragments into COLUMN_LIST("name,") + IDENTIFIER("email")
        let tokens = lexer()
            .tokenize("@1[customers] :: name, email >> oQ")
            .expect("should lex");
        let frag: Vec<_> = tokens
            .iter()
            .filter(|t| matches!(t.kind, TokenKind::ColumnList | TokenKind::Identifier))
            .map(|t| (t.kind, t.lexeme.as_str()))
            .collect();
        assert_eq!(
            frag,
            vec![
                (TokenKind::Identifier, "customers"),
                (TokenKind::ColumnList, "name,"),
                (TokenKind::Identifier, "email"),
            ]
        );
    }

    #[test]
    fn test_comments_and_whitespace_elided_by_default() {
        let tokens = lexer()
            .tokenize("$1 // begin transaction")
            .expect("should lex");
        assert_eq!(kinds(&tokens), vec![TokenKind::Transaction, TokenKind::Eof]);
    }

    #[test]
    fn test_string_and_number_literals() {
        let tokens = lexer()
            .tokenize(r#"'it''s' "two" 42 -3.5 12."#)
            .expect("should lex");
        // 'it' then 's' - single quotes do not double-escape in source,
        // so this is two strings back to back.
        assert_eq!(tokens[0].kind, TokenKind::StringLiteral);
        let numbers: Vec<_> = tokens
            .iter()
            .filter(|t| t.kind == TokenKind::NumberLiteral)
            .map(|t| t.lexeme.as_str())
            .collect();
        assert_eq!(numbers, vec!["42", "-3.5", "12."]);
    }

    #[test]
    fn test_unterminated_string_fails() {
        let err = lexer().tokenize("'oops").unwrap_err();
        assert!(err.message.contains("unterminated"));
    }

    #[test]
    fn test_unknown_character_is_fatal_with_position() {
        let err = lexer().tokenize("*3[users]^").unwrap_err();
        assert_eq!(err.position, 9);
        assert_eq!(err.line, 1);
        assert_eq!(err.column, 10);
        assert!(err.message.contains('^'));
    }

    #[test]
    fn test_lexing_totality_concatenation() {
        let opts = LexOptions {
            keep_whitespace: true,
            keep_comments: true,
        };
        let queries = [
            "*3[users]::name,email>>oQ",
            "=J[users+orders]::>>oQ",
            "*COUNT[sales]::*>>oQ",
            "$1 // Begin transaction",
            "@1[customers] :: name,email,phone >> oQ",
            "*3[logs]::msg>>oQ // tail\n$2",
        ];
        for query in queries {
            let tokens = lexer().tokenize_with(query, opts).expect("should lex");
            let rebuilt: String = tokens.iter().map(|t| t.lexeme.as_str()).collect();
            assert_eq!(rebuilt, query, "lexeme concatenation must reproduce input");
        }
    }

    proptest! {
        // Any whitespace-joined sequence of known-good fragments must lex,
        // and the concatenated lexemes must reproduce the input exactly.
        #[test]
        fn prop_lexing_totality(parts in proptest::collection::vec(
            prop_oneof![
                Just("*3"), Just("*COUNT"), Just("[users]"), Just("::"),
                Just("name,email"), Just(">>"), Just("oQ"), Just("$1"),
                Just("42"), Just("'str'"), Just("true"), Just("null"),
            ],
            1..12,
        )) {
            let input = parts.join(" ");
            let opts = LexOptions { keep_whitespace: true, keep_comments: true };
            let tokens = lexer().tokenize_with(&input, opts).expect("fragments should lex");
            let rebuilt: String = tokens.iter().map(|t| t.lexeme.as_str()).collect();
            prop_assert_eq!(rebuilt, input);
        }
    }
}
