//! Main lexer implementation.
//!
//! Dispatches on the first character of each token. Whitespace and `//`
//! line comments are skipped between tokens.

use fwsc_util::{FileId, Span, Symbol};

use crate::cursor::Cursor;
use crate::error::{LexError, Result};
use crate::token::{keyword_from_ident, Token, TokenKind};

/// The lexer for Featherweight Scala source.
///
/// # Examples
///
/// ```
/// use fwsc_lex::{Lexer, TokenKind};
/// use fwsc_util::{FileId, Symbol};
///
/// let tokens = fwsc_lex::tokenize("val x = 42", FileId::DUMMY).unwrap();
/// assert_eq!(tokens[0].kind, TokenKind::Val);
/// assert_eq!(tokens[1].kind, TokenKind::Ident(Symbol::intern("x")));
/// assert_eq!(tokens[2].kind, TokenKind::Assign);
/// assert_eq!(tokens[3].kind, TokenKind::Int(42));
/// assert_eq!(tokens[4].kind, TokenKind::Eof);
/// ```
pub struct Lexer<'a> {
    cursor: Cursor<'a>,
    file_id: FileId,
    /// Start position of the current token.
    token_start: usize,
    /// Start line of the current token.
    token_start_line: u32,
    /// Start column of the current token.
    token_start_column: u32,
}

/// Tokenize a whole source string, ending with an `Eof` token.
pub fn tokenize(source: &str, file_id: FileId) -> Result<Vec<Token>> {
    let mut lexer = Lexer::new(source, file_id);
    let mut tokens = Vec::new();
    loop {
        let token = lexer.next_token()?;
        let done = token.kind == TokenKind::Eof;
        tokens.push(token);
        if done {
            return Ok(tokens);
        }
    }
}

impl<'a> Lexer<'a> {
    pub fn new(source: &'a str, file_id: FileId) -> Self {
        Self {
            cursor: Cursor::new(source),
            file_id,
            token_start: 0,
            token_start_line: 1,
            token_start_column: 1,
        }
    }

    /// Produce the next token.
    pub fn next_token(&mut self) -> Result<Token> {
        self.skip_whitespace_and_comments();

        self.token_start = self.cursor.position();
        self.token_start_line = self.cursor.line();
        self.token_start_column = self.cursor.column();

        let ch = match self.cursor.first() {
            Some(ch) => ch,
            None => return Ok(self.token(TokenKind::Eof)),
        };

        match ch {
            c if is_ident_start(c) => Ok(self.lex_ident()),
            c if c.is_ascii_digit() => self.lex_number(),
            '"' => self.lex_string(),
            '(' => Ok(self.single(TokenKind::LParen)),
            ')' => Ok(self.single(TokenKind::RParen)),
            '{' => Ok(self.single(TokenKind::LBrace)),
            '}' => Ok(self.single(TokenKind::RBrace)),
            '[' => Ok(self.single(TokenKind::LBracket)),
            ']' => Ok(self.single(TokenKind::RBracket)),
            ',' => Ok(self.single(TokenKind::Comma)),
            ':' => Ok(self.single(TokenKind::Colon)),
            ';' => Ok(self.single(TokenKind::Semi)),
            '.' => Ok(self.single(TokenKind::Dot)),
            '+' => Ok(self.single(TokenKind::Plus)),
            '-' => Ok(self.single(TokenKind::Minus)),
            '*' => Ok(self.single(TokenKind::Star)),
            '/' => Ok(self.single(TokenKind::Slash)),
            '%' => Ok(self.single(TokenKind::Percent)),
            '^' => Ok(self.single(TokenKind::Caret)),
            '<' => Ok(self.one_or_two('=', TokenKind::Lt, TokenKind::Le)),
            '>' => Ok(self.one_or_two('=', TokenKind::Gt, TokenKind::Ge)),
            '!' => Ok(self.one_or_two('=', TokenKind::Bang, TokenKind::Ne)),
            '=' => {
                self.cursor.bump();
                match self.cursor.first() {
                    Some('=') => {
                        self.cursor.bump();
                        Ok(self.token(TokenKind::EqEq))
                    }
                    Some('>') => {
                        self.cursor.bump();
                        Ok(self.token(TokenKind::FatArrow))
                    }
                    _ => Ok(self.token(TokenKind::Assign)),
                }
            }
            '&' => self.pair('&', TokenKind::AndAnd),
            '|' => self.pair('|', TokenKind::OrOr),
            other => {
                self.cursor.bump();
                Err(LexError::UnexpectedChar {
                    ch: other,
                    span: self.span(),
                })
            }
        }
    }

    fn skip_whitespace_and_comments(&mut self) {
        loop {
            self.cursor.bump_while(|c| c.is_whitespace());
            if self.cursor.first() == Some('/') && self.cursor.second() == Some('/') {
                self.cursor.bump_while(|c| c != '\n');
            } else {
                return;
            }
        }
    }

    fn span(&self) -> Span {
        Span::with_file(
            self.token_start,
            self.cursor.position(),
            self.file_id,
            self.token_start_line,
            self.token_start_column,
        )
    }

    fn token(&self, kind: TokenKind) -> Token {
        Token::new(kind, self.span())
    }

    fn single(&mut self, kind: TokenKind) -> Token {
        self.cursor.bump();
        self.token(kind)
    }

    /// Lex `first` alone, or `first` followed by `second` as one token.
    fn one_or_two(&mut self, second: char, alone: TokenKind, joined: TokenKind) -> Token {
        self.cursor.bump();
        if self.cursor.first() == Some(second) {
            self.cursor.bump();
            self.token(joined)
        } else {
            self.token(alone)
        }
    }

    /// Lex a two-character token whose halves are identical (`&&`, `||`).
    fn pair(&mut self, second: char, kind: TokenKind) -> Result<Token> {
        let first = self.cursor.bump().unwrap_or(second);
        if self.cursor.first() == Some(second) {
            self.cursor.bump();
            Ok(self.token(kind))
        } else {
            Err(LexError::UnexpectedChar {
                ch: first,
                span: self.span(),
            })
        }
    }

    fn lex_ident(&mut self) -> Token {
        self.cursor.bump_while(is_ident_continue);
        let text = self.cursor.slice(self.token_start, self.cursor.position());
        match keyword_from_ident(text) {
            Some(kind) => self.token(kind),
            None => self.token(TokenKind::Ident(Symbol::intern(text))),
        }
    }

    fn lex_number(&mut self) -> Result<Token> {
        self.cursor.bump_while(|c| c.is_ascii_digit());
        // A `.` only belongs to the number when a digit follows; `1.foo`
        // stays an integer followed by a member selection.
        let is_float = self.cursor.first() == Some('.')
            && self.cursor.second().is_some_and(|c| c.is_ascii_digit());
        if is_float {
            self.cursor.bump();
            self.cursor.bump_while(|c| c.is_ascii_digit());
        }
        let text = self.cursor.slice(self.token_start, self.cursor.position());
        if is_float {
            match text.parse::<f64>() {
                Ok(value) => Ok(self.token(TokenKind::Float(value))),
                Err(_) => Err(LexError::MalformedNumber {
                    text: text.to_string(),
                    span: self.span(),
                }),
            }
        } else {
            match text.parse::<i64>() {
                Ok(value) => Ok(self.token(TokenKind::Int(value))),
                Err(_) => Err(LexError::MalformedNumber {
                    text: text.to_string(),
                    span: self.span(),
                }),
            }
        }
    }

    fn lex_string(&mut self) -> Result<Token> {
        self.cursor.bump(); // opening quote
        let mut value = String::new();
        loop {
            match self.cursor.bump() {
                None | Some('\n') => {
                    return Err(LexError::UnterminatedString { span: self.span() })
                }
                Some('"') => break,
                Some('\\') => match self.cursor.bump() {
                    Some('n') => value.push('\n'),
                    Some('t') => value.push('\t'),
                    Some('\\') => value.push('\\'),
                    Some('"') => value.push('"'),
                    Some(other) => {
                        return Err(LexError::UnknownEscape {
                            ch: other,
                            span: self.span(),
                        })
                    }
                    None => return Err(LexError::UnterminatedString { span: self.span() }),
                },
                Some(ch) => value.push(ch),
            }
        }
        Ok(self.token(TokenKind::Str(Symbol::intern(&value))))
    }
}

fn is_ident_start(c: char) -> bool {
    c.is_ascii_alphabetic() || c == '_'
}

fn is_ident_continue(c: char) -> bool {
    c.is_ascii_alphanumeric() || c == '_'
}

#[cfg(test)]
mod tests {
    use super::*;

    fn kinds(src: &str) -> Vec<TokenKind> {
        tokenize(src, FileId::DUMMY)
            .unwrap()
            .into_iter()
            .map(|t| t.kind)
            .collect()
    }

    #[test]
    fn test_keywords_and_idents() {
        assert_eq!(
            kinds("class Main val x"),
            vec![
                TokenKind::Class,
                TokenKind::Ident(Symbol::intern("Main")),
                TokenKind::Val,
                TokenKind::Ident(Symbol::intern("x")),
                TokenKind::Eof,
            ]
        );
    }

    #[test]
    fn test_operators() {
        assert_eq!(
            kinds("+ - * / % ^ < <= > >= == != && || ! = =>"),
            vec![
                TokenKind::Plus,
                TokenKind::Minus,
                TokenKind::Star,
                TokenKind::Slash,
                TokenKind::Percent,
                TokenKind::Caret,
                TokenKind::Lt,
                TokenKind::Le,
                TokenKind::Gt,
                TokenKind::Ge,
                TokenKind::EqEq,
                TokenKind::Ne,
                TokenKind::AndAnd,
                TokenKind::OrOr,
                TokenKind::Bang,
                TokenKind::Assign,
                TokenKind::FatArrow,
                TokenKind::Eof,
            ]
        );
    }

    #[test]
    fn test_delimiters() {
        assert_eq!(
            kinds("( ) { } [ ] , : ; ."),
            vec![
                TokenKind::LParen,
                TokenKind::RParen,
                TokenKind::LBrace,
                TokenKind::RBrace,
                TokenKind::LBracket,
                TokenKind::RBracket,
                TokenKind::Comma,
                TokenKind::Colon,
                TokenKind::Semi,
                TokenKind::Dot,
                TokenKind::Eof,
            ]
        );
    }

    #[test]
    fn test_int_literal() {
        assert_eq!(kinds("42"), vec![TokenKind::Int(42), TokenKind::Eof]);
    }

    #[test]
    fn test_float_literal() {
        assert_eq!(kinds("2.5"), vec![TokenKind::Float(2.5), TokenKind::Eof]);
    }

    #[test]
    fn test_int_dot_is_selection() {
        // `1.foo` must not lex as a float.
        assert_eq!(
            kinds("1.foo"),
            vec![
                TokenKind::Int(1),
                TokenKind::Dot,
                TokenKind::Ident(Symbol::intern("foo")),
                TokenKind::Eof,
            ]
        );
    }

    #[test]
    fn test_string_literal() {
        assert_eq!(
            kinds("\"hi %d\\n\""),
            vec![TokenKind::Str(Symbol::intern("hi %d\n")), TokenKind::Eof]
        );
    }

    #[test]
    fn test_line_comment() {
        assert_eq!(
            kinds("1 // the rest is ignored\n2"),
            vec![TokenKind::Int(1), TokenKind::Int(2), TokenKind::Eof]
        );
    }

    #[test]
    fn test_spans() {
        let tokens = tokenize("val x", FileId::DUMMY).unwrap();
        assert_eq!(tokens[0].span.start, 0);
        assert_eq!(tokens[0].span.end, 3);
        assert_eq!(tokens[1].span.start, 4);
        assert_eq!(tokens[1].span.column, 5);
        assert_eq!(tokens[1].span.line, 1);
    }

    #[test]
    fn test_multiline_spans() {
        let tokens = tokenize("a\n  b", FileId::DUMMY).unwrap();
        assert_eq!(tokens[1].span.line, 2);
        assert_eq!(tokens[1].span.column, 3);
    }

    #[test]
    fn test_unexpected_char() {
        let err = tokenize("a ~ b", FileId::DUMMY).unwrap_err();
        assert!(matches!(err, LexError::UnexpectedChar { ch: '~', .. }));
        assert_eq!(err.span().start, 2);
    }

    #[test]
    fn test_unterminated_string() {
        let err = tokenize("\"oops", FileId::DUMMY).unwrap_err();
        assert!(matches!(err, LexError::UnterminatedString { .. }));
    }

    #[test]
    fn test_lone_ampersand() {
        let err = tokenize("a & b", FileId::DUMMY).unwrap_err();
        assert!(matches!(err, LexError::UnexpectedChar { ch: '&', .. }));
    }

    #[test]
    fn test_fat_arrow_vs_assign() {
        assert_eq!(
            kinds("= == =>"),
            vec![
                TokenKind::Assign,
                TokenKind::EqEq,
                TokenKind::FatArrow,
                TokenKind::Eof,
            ]
        );
    }
}
