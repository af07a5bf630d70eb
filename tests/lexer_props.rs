//! Property tests for the lexer: total on arbitrary input, monotonic
//! positions, and keyword classification.

use mica::frontend::lexer::Lexer;
use mica::frontend::token::{lookup_word, TokenKind};
use mica::frontend::SourceFile;
use proptest::prelude::*;

proptest! {
    #![proptest_config(ProptestConfig {
        cases: 256,
        .. ProptestConfig::default()
    })]

    /// For every input, `next_token` eventually yields end-of-input and
    /// never diverges or panics.
    #[test]
    fn lexing_terminates_and_positions_are_monotonic(s in ".*") {
        let file = SourceFile::from_memory(s.as_str());
        let mut lexer = Lexer::new(&file);

        let mut last_offset = 0usize;
        let max_steps = s.len().saturating_mul(4) + 64;

        for steps in 0.. {
            prop_assert!(
                steps <= max_steps,
                "too many steps (possible hang): steps={steps} len={} input={s:?}",
                s.len()
            );

            let (kind, offset, length) = match lexer.next_token() {
                Ok(token) => (token.kind, token.position.offset, token.length),
                Err(diagnostic) => {
                    // Errors carry in-bounds positions and the lexer
                    // keeps going afterwards
                    prop_assert!(diagnostic.position.offset <= s.len());
                    continue;
                }
            };

            // Token spans are in bounds
            prop_assert!(offset + length <= s.len(), "span out of bounds: input={s:?}");

            // Start offsets never move backwards
            prop_assert!(
                offset >= last_offset,
                "token moved backwards: offset={offset} last={last_offset} input={s:?}"
            );
            last_offset = offset;

            if kind == TokenKind::Eof {
                prop_assert_eq!(offset, s.len());
                break;
            }
        }
    }

    /// Identifier-shaped inputs classify as a keyword iff they are in
    /// the keyword set (exact, case-sensitive match).
    #[test]
    fn keyword_classification_is_exact(word in "[a-zA-Z_][a-zA-Z0-9_]{0,10}") {
        const KEYWORDS: &[&str] = &[
            "if", "else", "for", "while", "break", "continue", "return",
            "switch", "case", "default", "func", "var", "const", "type",
            "struct", "interface", "import", "package",
        ];

        let kind = lookup_word(&word);
        let in_table = KEYWORDS.contains(&word.as_str());

        match word.as_str() {
            "true" => prop_assert_eq!(kind, TokenKind::True),
            "false" => prop_assert_eq!(kind, TokenKind::False),
            "nil" => prop_assert_eq!(kind, TokenKind::Nil),
            _ if in_table => prop_assert!(matches!(kind, TokenKind::Keyword(_))),
            _ => prop_assert_eq!(kind, TokenKind::Identifier),
        }

        // The lexer agrees with the table lookup
        let file = SourceFile::from_memory(word.as_str());
        let mut lexer = Lexer::new(&file);
        let token = lexer.next_token().unwrap();
        prop_assert_eq!(token.kind, kind);
        prop_assert_eq!(token.lexeme.as_str(), word.as_str());
    }

    /// Lexing the same input twice yields the same token stream.
    #[test]
    fn lexing_is_deterministic(s in ".{0,80}") {
        let file = SourceFile::from_memory(s.as_str());

        let collect = |file: &SourceFile| {
            let mut lexer = Lexer::new(file);
            let mut kinds = Vec::new();
            loop {
                match lexer.next_token() {
                    Ok(token) => {
                        let eof = token.kind == TokenKind::Eof;
                        kinds.push(Ok((token.kind, token.position.offset)));
                        if eof {
                            break;
                        }
                    }
                    Err(diagnostic) => kinds.push(Err(diagnostic.message)),
                }
            }
            kinds
        };

        prop_assert_eq!(collect(&file), collect(&file));
    }
}
