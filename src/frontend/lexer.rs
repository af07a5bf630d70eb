use std::collections::BTreeMap;
use std::rc::Rc;

use once_cell::sync::Lazy;

use crate::diagnostics::{Diagnostic, Phase};
use crate::frontend::position::Position;
use crate::frontend::token::{lookup_word, Token, TokenKind};
use crate::frontend::SourceFile;

/// Table of single char tokens (matched after longer sequences are
/// checked for)
static SINGLE_TOKENS: Lazy<BTreeMap<char, TokenKind>> = Lazy::new(|| {
    BTreeMap::from([
        ('(', TokenKind::LeftParen),
        (')', TokenKind::RightParen),
        ('{', TokenKind::LeftBrace),
        ('}', TokenKind::RightBrace),
        ('[', TokenKind::LeftBracket),
        (']', TokenKind::RightBracket),
        (';', TokenKind::Semicolon),
        (',', TokenKind::Comma),
        ('~', TokenKind::Tilde),
        ('?', TokenKind::Question),
    ])
});

/// Converts UTF-8 source text into a stream of tokens.
///
/// Reaching the end of the input produces an explicit [`TokenKind::Eof`]
/// token and keeps producing it on every further call. A lexical error
/// is reported as a diagnostic and scanning resumes at the next byte, so
/// a single run can surface several problems.
#[derive(Debug)]
pub struct Lexer<'source> {
    source: &'source SourceFile,
    filename: Rc<str>,
    /// Byte offset where the token currently being scanned starts
    start: usize,
    /// Byte offset of the character currently being examined
    current: usize,
    /// 1-based line number
    line: u32,
    /// Byte offset where the current line starts; columns are counted in
    /// characters from here
    line_start: usize,
}

impl<'source> Lexer<'source> {
    pub fn new(source: &'source SourceFile) -> Self {
        Self {
            source,
            filename: source.name(),
            start: 0,
            current: 0,
            line: 1,
            line_start: 0,
        }
    }

    pub fn source(&self) -> &SourceFile {
        self.source
    }

    /// Scans and returns the next token. `Err` carries the diagnostic
    /// for an invalid piece of input; the lexer has already advanced
    /// past it.
    pub fn next_token(&mut self) -> Result<Token, Diagnostic> {
        self.skip_whitespace();
        self.start = self.current;

        if self.is_at_end() {
            return Ok(self.make_token(TokenKind::Eof));
        }

        let ch = self.advance().unwrap();

        if is_letter(ch) {
            return Ok(self.scan_word());
        }

        if ch.is_ascii_digit() {
            return Ok(self.scan_number());
        }

        let kind = match ch {
            '+' => {
                if self.match_char('+') {
                    TokenKind::PlusPlus
                } else if self.match_char('=') {
                    TokenKind::PlusEq
                } else {
                    TokenKind::Plus
                }
            }
            '-' => {
                if self.match_char('-') {
                    TokenKind::MinusMinus
                } else if self.match_char('=') {
                    TokenKind::MinusEq
                } else if self.match_char('>') {
                    TokenKind::Arrow
                } else {
                    TokenKind::Minus
                }
            }
            '*' => {
                if self.match_char('*') {
                    TokenKind::StarStar
                } else if self.match_char('=') {
                    TokenKind::StarEq
                } else {
                    TokenKind::Star
                }
            }
            '/' => {
                if self.match_char('/') {
                    return Ok(self.scan_line_comment());
                } else if self.match_char('*') {
                    return self.scan_block_comment();
                } else if self.match_char('=') {
                    TokenKind::SlashEq
                } else {
                    TokenKind::Slash
                }
            }
            '%' => {
                if self.match_char('=') {
                    TokenKind::PercentEq
                } else {
                    TokenKind::Percent
                }
            }
            '&' => {
                if self.match_char('&') {
                    TokenKind::AndAnd
                } else if self.match_char('=') {
                    TokenKind::AmpEq
                } else {
                    TokenKind::Ampersand
                }
            }
            '|' => {
                if self.match_char('|') {
                    TokenKind::OrOr
                } else if self.match_char('=') {
                    TokenKind::PipeEq
                } else {
                    TokenKind::Pipe
                }
            }
            '^' => {
                if self.match_char('=') {
                    TokenKind::CaretEq
                } else {
                    TokenKind::Caret
                }
            }
            '=' => {
                if self.match_char('=') {
                    TokenKind::EqualEqual
                } else {
                    TokenKind::Assign
                }
            }
            '!' => {
                if self.match_char('=') {
                    TokenKind::NotEqual
                } else {
                    TokenKind::Bang
                }
            }
            '<' => {
                if self.match_char('<') {
                    if self.match_char('=') {
                        TokenKind::ShlEq
                    } else {
                        TokenKind::ShiftLeft
                    }
                } else if self.match_char('=') {
                    TokenKind::LessEqual
                } else {
                    TokenKind::Less
                }
            }
            '>' => {
                if self.match_char('>') {
                    if self.match_char('=') {
                        TokenKind::ShrEq
                    } else {
                        TokenKind::ShiftRight
                    }
                } else if self.match_char('=') {
                    TokenKind::GreaterEqual
                } else {
                    TokenKind::Greater
                }
            }
            ':' => {
                if self.match_char(':') {
                    TokenKind::ColonColon
                } else {
                    TokenKind::Colon
                }
            }
            '.' => {
                if self.match_char('.') && self.match_char('.') {
                    TokenKind::Ellipsis
                } else {
                    TokenKind::Dot
                }
            }
            '"' => return self.scan_string(),
            '\'' => return self.scan_char(),
            other => match SINGLE_TOKENS.get(&other) {
                Some(kind) => *kind,
                None => {
                    return Err(self.error(format!("unexpected character: {other:?}")));
                }
            },
        };

        Ok(self.make_token(kind))
    }

    fn is_at_end(&self) -> bool {
        self.current >= self.source.contents.len()
    }

    fn peek(&self) -> Option<char> {
        self.source.contents[self.current..].chars().next()
    }

    fn peek_next(&self) -> Option<char> {
        let mut chars = self.source.contents[self.current..].chars();
        chars.next();
        chars.next()
    }

    fn advance(&mut self) -> Option<char> {
        let ch = self.peek()?;
        self.current += ch.len_utf8();
        Some(ch)
    }

    /// Consumes the current character iff it equals `expected`.
    fn match_char(&mut self, expected: char) -> bool {
        if self.peek() == Some(expected) {
            self.current += expected.len_utf8();
            true
        } else {
            false
        }
    }

    fn skip_whitespace(&mut self) {
        while let Some(ch) = self.peek() {
            match ch {
                ' ' | '\r' | '\t' => {
                    self.advance();
                }
                '\n' => {
                    self.advance();
                    self.line += 1;
                    self.line_start = self.current;
                }
                _ => return,
            }
        }
    }

    // Keyword, identifier, or boolean/nil literal
    fn scan_word(&mut self) -> Token {
        while let Some(ch) = self.peek() {
            if is_letter(ch) || ch.is_ascii_digit() {
                self.advance();
            } else {
                break;
            }
        }

        let word = &self.source.contents[self.start..self.current];
        self.make_token(lookup_word(word))
    }

    fn scan_number(&mut self) -> Token {
        while self.peek().is_some_and(|c| c.is_ascii_digit()) {
            self.advance();
        }

        // A fractional part only if the dot is not the start of an
        // ellipsis and is followed by a digit (otherwise it is member
        // access and belongs to the next token)
        if self.peek() == Some('.')
            && self.peek_next() != Some('.')
            && self.peek_next().is_some_and(|c| c.is_ascii_digit())
        {
            self.advance();
            while self.peek().is_some_and(|c| c.is_ascii_digit()) {
                self.advance();
            }
        }

        // Scientific notation, backtracking if no digits follow the
        // exponent marker
        if matches!(self.peek(), Some('e' | 'E')) {
            let saved = self.current;
            self.advance();

            if matches!(self.peek(), Some('+' | '-')) {
                self.advance();
            }

            if self.peek().is_some_and(|c| c.is_ascii_digit()) {
                while self.peek().is_some_and(|c| c.is_ascii_digit()) {
                    self.advance();
                }
            } else {
                self.current = saved;
            }
        }

        self.make_token(TokenKind::Number)
    }

    fn scan_string(&mut self) -> Result<Token, Diagnostic> {
        // The opening quote has already been consumed
        while let Some(ch) = self.peek() {
            match ch {
                '"' => {
                    self.advance();
                    return Ok(self.make_token(TokenKind::Str));
                }
                '\n' => return Err(self.error("unterminated string literal")),
                '\\' => {
                    // Escape sequence: consume the backslash and
                    // whatever follows it
                    self.advance();
                    self.advance();
                }
                _ => {
                    self.advance();
                }
            }
        }

        Err(self.error("unterminated string literal"))
    }

    fn scan_char(&mut self) -> Result<Token, Diagnostic> {
        // The opening quote has already been consumed
        match self.peek() {
            None | Some('\n') => return Err(self.error("unterminated character literal")),
            Some('\\') => {
                self.advance();
                self.advance();
            }
            Some(_) => {
                self.advance();
            }
        }

        if self.peek() != Some('\'') {
            return Err(self.error("unterminated character literal"));
        }
        self.advance();

        Ok(self.make_token(TokenKind::Char))
    }

    fn scan_line_comment(&mut self) -> Token {
        while self.peek().is_some_and(|c| c != '\n') {
            self.advance();
        }

        self.make_token(TokenKind::Comment)
    }

    // Block comments nest
    fn scan_block_comment(&mut self) -> Result<Token, Diagnostic> {
        let start_position = self.current_position();
        let mut depth = 1usize;

        while !self.is_at_end() && depth > 0 {
            if self.peek() == Some('/') && self.peek_next() == Some('*') {
                self.advance();
                self.advance();
                depth += 1;
            } else if self.peek() == Some('*') && self.peek_next() == Some('/') {
                self.advance();
                self.advance();
                depth -= 1;
            } else {
                if self.peek() == Some('\n') {
                    self.line += 1;
                    self.advance();
                    self.line_start = self.current;
                } else {
                    self.advance();
                }
            }
        }

        if depth > 0 {
            return Err(Diagnostic::new(
                Phase::Lex,
                start_position,
                "unterminated block comment",
            ));
        }

        Ok(Token {
            kind: TokenKind::Comment,
            lexeme: self.source.contents[self.start..self.current].to_owned(),
            position: start_position,
            length: self.current - self.start,
        })
    }

    fn make_token(&self, kind: TokenKind) -> Token {
        Token {
            kind,
            lexeme: self.source.contents[self.start..self.current].to_owned(),
            position: self.current_position(),
            length: self.current - self.start,
        }
    }

    /// The position of the first byte of the token being scanned. The
    /// column counts Unicode scalar values from the start of the line.
    fn current_position(&self) -> Position {
        let column = self.source.contents[self.line_start..self.start]
            .chars()
            .count() as u32
            + 1;

        Position::new(self.filename.clone(), self.line, column, self.start)
    }

    fn error(&self, message: impl Into<String>) -> Diagnostic {
        Diagnostic::new(Phase::Lex, self.current_position(), message)
    }
}

/// Letters are any Unicode letter plus the underscore; digits in
/// identifiers and numbers are ASCII only.
fn is_letter(ch: char) -> bool {
    ch.is_alphabetic() || ch == '_'
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::frontend::SourceFile;

    fn lex_kinds(source: &str) -> Vec<TokenKind> {
        let file = SourceFile::from_memory(source);
        let mut lexer = Lexer::new(&file);
        let mut kinds = Vec::new();

        loop {
            match lexer.next_token() {
                Ok(token) if token.kind == TokenKind::Eof => break,
                Ok(token) => kinds.push(token.kind),
                Err(_) => kinds.push(TokenKind::Invalid),
            }
        }

        kinds
    }

    fn lex_all(source: &str) -> Vec<Token> {
        let file = SourceFile::from_memory(source);
        let mut lexer = Lexer::new(&file);
        let mut tokens = Vec::new();

        loop {
            match lexer.next_token() {
                Ok(token) => {
                    let done = token.kind == TokenKind::Eof;
                    tokens.push(token);
                    if done {
                        break;
                    }
                }
                Err(_) => {}
            }
        }

        tokens
    }

    #[test]
    fn scans_keywords_literals_and_identifiers() {
        use crate::frontend::token::Keyword;

        assert_eq!(
            lex_kinds("func main x1 _tmp true nil 42"),
            vec![
                TokenKind::Keyword(Keyword::Func),
                TokenKind::Identifier,
                TokenKind::Identifier,
                TokenKind::Identifier,
                TokenKind::True,
                TokenKind::Nil,
                TokenKind::Number,
            ]
        );
    }

    #[test]
    fn maximal_munch_on_operators() {
        assert_eq!(
            lex_kinds("<<= << < >= >> >>= ... . -> -= -- - ** *="),
            vec![
                TokenKind::ShlEq,
                TokenKind::ShiftLeft,
                TokenKind::Less,
                TokenKind::GreaterEqual,
                TokenKind::ShiftRight,
                TokenKind::ShrEq,
                TokenKind::Ellipsis,
                TokenKind::Dot,
                TokenKind::Arrow,
                TokenKind::MinusEq,
                TokenKind::MinusMinus,
                TokenKind::Minus,
                TokenKind::StarStar,
                TokenKind::StarEq,
            ]
        );
    }

    #[test]
    fn number_forms() {
        let tokens = lex_all("1 23.5 1e9 1.5e-3 2E+4");
        let lexemes: Vec<&str> = tokens
            .iter()
            .filter(|t| t.kind == TokenKind::Number)
            .map(|t| t.lexeme.as_str())
            .collect();

        assert_eq!(lexemes, vec!["1", "23.5", "1e9", "1.5e-3", "2E+4"]);
    }

    #[test]
    fn exponent_backtracks_without_digits() {
        // `1e` is a number followed by an identifier, not a malformed
        // exponent
        let tokens = lex_all("1e x");
        assert_eq!(tokens[0].kind, TokenKind::Number);
        assert_eq!(tokens[0].lexeme, "1");
        assert_eq!(tokens[1].kind, TokenKind::Identifier);
        assert_eq!(tokens[1].lexeme, "e");
    }

    #[test]
    fn dot_after_number_is_member_access() {
        let tokens = lex_all("p.x 1..3");
        let kinds: Vec<TokenKind> = tokens.iter().map(|t| t.kind).collect();
        assert_eq!(
            kinds,
            vec![
                TokenKind::Identifier,
                TokenKind::Dot,
                TokenKind::Identifier,
                TokenKind::Number,
                TokenKind::Dot,
                TokenKind::Dot,
                TokenKind::Number,
                TokenKind::Eof,
            ]
        );
    }

    #[test]
    fn nested_block_comments() {
        assert_eq!(
            lex_kinds("a /* outer /* inner */ still outer */ b"),
            vec![
                TokenKind::Identifier,
                TokenKind::Comment,
                TokenKind::Identifier,
            ]
        );
    }

    #[test]
    fn unterminated_block_comment_is_an_error() {
        let file = SourceFile::from_memory("/* never closed");
        let mut lexer = Lexer::new(&file);
        let err = lexer.next_token().unwrap_err();
        assert!(err.message.contains("unterminated block comment"));

        // The stream still terminates
        assert_eq!(lexer.next_token().unwrap().kind, TokenKind::Eof);
    }

    #[test]
    fn unterminated_string_reports_and_continues() {
        let file = SourceFile::from_memory("\"abc\nx");
        let mut lexer = Lexer::new(&file);

        let err = lexer.next_token().unwrap_err();
        assert!(err.message.contains("unterminated string literal"));

        // Scanning resumes after the broken literal
        let next = lexer.next_token().unwrap();
        assert_eq!(next.kind, TokenKind::Identifier);
        assert_eq!(next.lexeme, "x");
    }

    #[test]
    fn string_escapes_stay_raw_in_the_lexeme() {
        let tokens = lex_all(r#""a\"b" 'c' '\n'"#);
        assert_eq!(tokens[0].kind, TokenKind::Str);
        assert_eq!(tokens[0].lexeme, r#""a\"b""#);
        assert_eq!(tokens[1].kind, TokenKind::Char);
        assert_eq!(tokens[2].kind, TokenKind::Char);
        assert_eq!(tokens[2].lexeme, r"'\n'");
    }

    #[test]
    fn positions_are_one_based_and_count_chars() {
        let tokens = lex_all("ab\n  cd");
        assert_eq!(tokens[0].position.line, 1);
        assert_eq!(tokens[0].position.column, 1);
        assert_eq!(tokens[1].position.line, 2);
        assert_eq!(tokens[1].position.column, 3);
        assert_eq!(tokens[1].position.offset, 5);
    }

    #[test]
    fn columns_count_unicode_scalars_not_bytes() {
        // The two CJK characters are three bytes each but one column each
        let tokens = lex_all("世界 x");
        assert_eq!(tokens[0].kind, TokenKind::Identifier);
        assert_eq!(tokens[1].position.column, 4);
        assert_eq!(tokens[1].position.offset, 7);
    }

    #[test]
    fn eof_repeats_forever() {
        let file = SourceFile::from_memory("x");
        let mut lexer = Lexer::new(&file);
        lexer.next_token().unwrap();

        for _ in 0..4 {
            assert_eq!(lexer.next_token().unwrap().kind, TokenKind::Eof);
        }
    }

    #[test]
    fn unexpected_character_is_skipped() {
        let file = SourceFile::from_memory("a @ b");
        let mut lexer = Lexer::new(&file);

        assert_eq!(lexer.next_token().unwrap().kind, TokenKind::Identifier);
        let err = lexer.next_token().unwrap_err();
        assert!(err.message.contains("unexpected character"));
        assert_eq!(lexer.next_token().unwrap().kind, TokenKind::Identifier);
    }
}
