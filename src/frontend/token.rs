use strum::EnumString;

use crate::frontend::position::{Position, Span};

/// A single lexical token. The lexeme is the raw source text (strings
/// keep their quotes; unescaping happens in the parser), the length is
/// measured in bytes.
#[derive(Debug, Clone, PartialEq)]
pub struct Token {
    pub kind: TokenKind,
    pub lexeme: String,
    pub position: Position,
    pub length: usize,
}

impl Token {
    /// The source range covered by this token. The end column assumes
    /// the lexeme stays on one line, which holds for everything except
    /// multi-line block comments.
    pub fn span(&self) -> Span {
        let end = Position::new(
            self.position.filename.clone(),
            self.position.line,
            self.position.column + self.lexeme.chars().count() as u32,
            self.position.offset + self.length,
        );

        Span::new(self.position.clone(), end)
    }
}

impl core::fmt::Display for Token {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{:?}({}) at {}", self.kind, self.lexeme, self.position)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TokenKind {
    /* Special */
    Eof,
    Invalid,
    Comment,

    /* Literals */
    Number,  // 1, 2.5, 1e9
    Str,     // "hello"
    Char,    // 'a'
    True,    // true
    False,   // false
    Nil,     // nil

    /* Words */
    Identifier,
    Keyword(Keyword),

    /* Arithmetic */
    Plus,     // +
    Minus,    // -
    Star,     // *
    Slash,    // /
    Percent,  // %
    StarStar, // **

    /* Comparison */
    EqualEqual,   // ==
    NotEqual,     // !=
    Less,         // <
    LessEqual,    // <=
    Greater,      // >
    GreaterEqual, // >=

    /* Logical */
    AndAnd, // &&
    OrOr,   // ||
    Bang,   // !

    /* Bitwise */
    Ampersand,  // &
    Pipe,       // |
    Caret,      // ^
    Tilde,      // ~
    ShiftLeft,  // <<
    ShiftRight, // >>

    /* Assignment */
    Assign,    // =
    PlusEq,    // +=
    MinusEq,   // -=
    StarEq,    // *=
    SlashEq,   // /=
    PercentEq, // %=
    AmpEq,     // &=
    PipeEq,    // |=
    CaretEq,   // ^=
    ShlEq,     // <<=
    ShrEq,     // >>=

    /* Increment / decrement */
    PlusPlus,   // ++
    MinusMinus, // --

    /* Other */
    Dot,        // .
    Arrow,      // ->
    Question,   // ?
    Colon,      // :
    ColonColon, // ::

    /* Delimiters */
    LeftParen,    // (
    RightParen,   // )
    LeftBrace,    // {
    RightBrace,   // }
    LeftBracket,  // [
    RightBracket, // ]
    Semicolon,    // ;
    Comma,        // ,
    Ellipsis,     // ...
}

impl TokenKind {
    pub fn is_assignment_operator(&self) -> bool {
        matches!(
            self,
            Self::Assign
                | Self::PlusEq
                | Self::MinusEq
                | Self::StarEq
                | Self::SlashEq
                | Self::PercentEq
                | Self::AmpEq
                | Self::PipeEq
                | Self::CaretEq
                | Self::ShlEq
                | Self::ShrEq
        )
    }

    pub fn is_comparison_operator(&self) -> bool {
        matches!(
            self,
            Self::EqualEqual
                | Self::NotEqual
                | Self::Less
                | Self::LessEqual
                | Self::Greater
                | Self::GreaterEqual
        )
    }

    pub fn is_literal(&self) -> bool {
        matches!(
            self,
            Self::Number | Self::Str | Self::Char | Self::True | Self::False | Self::Nil
        )
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, EnumString)]
#[strum(serialize_all = "snake_case")]
pub enum Keyword {
    If,
    Else,
    For,
    While,
    Break,
    Continue,
    Return,
    Switch,
    Case,
    Default,
    Func,
    Var,
    Const,
    Type,
    Struct,
    Interface,
    Import,
    Package,
}

/// Classifies a scanned identifier. Keywords win over identifiers on an
/// exact, case-sensitive match; `true`/`false`/`nil` lex as literals.
pub fn lookup_word(word: &str) -> TokenKind {
    match word {
        "true" => TokenKind::True,
        "false" => TokenKind::False,
        "nil" => TokenKind::Nil,
        _ => match word.parse::<Keyword>() {
            Ok(keyword) => TokenKind::Keyword(keyword),
            Err(_) => TokenKind::Identifier,
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn keyword_lookup_is_exact_and_case_sensitive() {
        assert_eq!(lookup_word("if"), TokenKind::Keyword(Keyword::If));
        assert_eq!(lookup_word("package"), TokenKind::Keyword(Keyword::Package));
        assert_eq!(lookup_word("If"), TokenKind::Identifier);
        assert_eq!(lookup_word("iff"), TokenKind::Identifier);
        assert_eq!(lookup_word("whileloop"), TokenKind::Identifier);
    }

    #[test]
    fn boolean_and_nil_words_lex_as_literals() {
        assert_eq!(lookup_word("true"), TokenKind::True);
        assert_eq!(lookup_word("false"), TokenKind::False);
        assert_eq!(lookup_word("nil"), TokenKind::Nil);
        assert!(TokenKind::True.is_literal());
        assert!(!TokenKind::Identifier.is_literal());
    }

    #[test]
    fn assignment_operator_classifier() {
        assert!(TokenKind::Assign.is_assignment_operator());
        assert!(TokenKind::ShlEq.is_assignment_operator());
        assert!(!TokenKind::EqualEqual.is_assignment_operator());
    }
}
