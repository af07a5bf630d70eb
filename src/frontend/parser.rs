//! Recursive descent parser with Pratt (precedence climbing) expression
//! parsing.
//!
//! Declarations and statements are parsed by straightforward recursive
//! descent; expressions go through a precedence ladder driven by
//! per-token precedences. Errors are recorded and parsing continues:
//! after a syntax error the parser unwinds to the nearest statement or
//! declaration boundary (a `Result`-based unwind, never a panic that
//! escapes this module) and synchronizes past a semicolon or to a
//! token that can start a statement.

use std::mem;

use crate::diagnostics::{Diagnostic, Phase};
use crate::frontend::ast::{
    ArrayLiteralExpr, AssignmentExpr, BinaryExpr, BinaryOp, BinaryOperator, Block, CallExpr,
    CaseClause, Comment, Expression, ExpressionKind, FieldDecl, FieldInit, File, ForStmt,
    FuncDecl, Identifier, IdentifierExpr, IfStmt, Import, IndexExpr, Item, ItemKind, LiteralExpr,
    LiteralValue, LogicalExpr, LogicalOp, LogicalOperator, MemberExpr, NodeId, Parameter,
    ReturnStmt, Statement, StatementKind, StructDecl, StructLiteralExpr, SwitchStmt,
    TypeAliasDecl, TypeExpr, UnaryExpr, UnaryOp, UnaryOperator, VarDecl, WhileStmt,
};
use crate::frontend::lexer::Lexer;
use crate::frontend::position::{Position, Span};
use crate::frontend::token::{Keyword, Token, TokenKind};
use crate::frontend::SourceFile;
use crate::index::Index;

/// Marker for the recovery unwind. Carrying no data: the diagnostic was
/// already recorded when the error was raised.
#[derive(Debug, Clone, Copy)]
struct Recovered;

type ParseResult<T> = Result<T, Recovered>;

/// Operator precedence levels, lowest binds loosest. The ordering of
/// the constants is the ordering of the levels.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
struct Precedence(u8);

impl Precedence {
    const NONE: Precedence = Precedence(0);
    const ASSIGNMENT: Precedence = Precedence(1); // = += -= ...
    const OR: Precedence = Precedence(2); // ||
    const AND: Precedence = Precedence(3); // &&
    const EQUALITY: Precedence = Precedence(4); // == !=
    const COMPARISON: Precedence = Precedence(5); // < <= > >=
    const BIT_OR: Precedence = Precedence(6); // |
    const BIT_XOR: Precedence = Precedence(7); // ^
    const BIT_AND: Precedence = Precedence(8); // &
    const SHIFT: Precedence = Precedence(9); // << >>
    const TERM: Precedence = Precedence(10); // + -
    const FACTOR: Precedence = Precedence(11); // * / %
    const EXPONENT: Precedence = Precedence(12); // **
    const UNARY: Precedence = Precedence(13); // ! - ~ ++ --
    const CALL: Precedence = Precedence(14); // . [] ()

    fn one_higher(self) -> Precedence {
        Precedence(self.0 + 1)
    }
}

/// The precedence a token has when found in infix position.
fn precedence_of(kind: TokenKind) -> Precedence {
    match kind {
        k if k.is_assignment_operator() => Precedence::ASSIGNMENT,
        TokenKind::OrOr => Precedence::OR,
        TokenKind::AndAnd => Precedence::AND,
        TokenKind::EqualEqual | TokenKind::NotEqual => Precedence::EQUALITY,
        TokenKind::Less | TokenKind::LessEqual | TokenKind::Greater | TokenKind::GreaterEqual => {
            Precedence::COMPARISON
        }
        TokenKind::Pipe => Precedence::BIT_OR,
        TokenKind::Caret => Precedence::BIT_XOR,
        TokenKind::Ampersand => Precedence::BIT_AND,
        TokenKind::ShiftLeft | TokenKind::ShiftRight => Precedence::SHIFT,
        TokenKind::Plus | TokenKind::Minus => Precedence::TERM,
        TokenKind::Star | TokenKind::Slash | TokenKind::Percent => Precedence::FACTOR,
        TokenKind::StarStar => Precedence::EXPONENT,
        TokenKind::PlusPlus | TokenKind::MinusMinus => Precedence::UNARY,
        TokenKind::Dot | TokenKind::LeftBracket | TokenKind::LeftParen => Precedence::CALL,
        _ => Precedence::NONE,
    }
}

/// Assignment chains to the right (`a = b = c`); so does `**`.
fn is_right_associative(kind: TokenKind) -> bool {
    kind.is_assignment_operator() || kind == TokenKind::StarStar
}

pub struct Parser<'source> {
    lexer: Lexer<'source>,
    current: Token,
    previous: Token,
    errors: Vec<Diagnostic>,
    comments: Vec<Comment>,
    panic_mode: bool,
    next_node_id: usize,
}

impl<'source> Parser<'source> {
    pub fn new(source: &'source SourceFile) -> Self {
        let placeholder = Token {
            kind: TokenKind::Eof,
            lexeme: String::new(),
            position: Position::none(),
            length: 0,
        };

        let mut parser = Self {
            lexer: Lexer::new(source),
            current: placeholder.clone(),
            previous: placeholder,
            errors: Vec::new(),
            comments: Vec::new(),
            panic_mode: false,
            next_node_id: 0,
        };

        // Prime the parser by reading the first token
        parser.advance();
        parser
    }

    /// Parses a complete source file:
    /// `file = package import* item* EOF`.
    ///
    /// Always returns a file, possibly partial; callers gate later
    /// stages on the error list.
    pub fn parse_file(source: &'source SourceFile) -> (File, Vec<Diagnostic>) {
        let mut parser = Parser::new(source);

        let package_name = if parser.match_keyword(Keyword::Package) {
            if parser.check(TokenKind::Identifier) {
                let name = parser.make_identifier();
                parser.advance();
                // The statement terminator after the package clause is
                // optional
                parser.match_token(TokenKind::Semicolon);
                Some(name)
            } else {
                parser.error("expected package name");
                None
            }
        } else {
            parser.error("expected 'package' declaration at start of file");
            None
        };

        let mut imports = Vec::new();
        while parser.match_keyword(Keyword::Import) {
            if let Ok(import) = parser.parse_import() {
                imports.push(import);
            } else {
                parser.synchronize();
            }
        }

        let mut items = Vec::new();
        while !parser.is_at_end() {
            if let Some(item) = parser.parse_item() {
                items.push(item);
            }
        }

        let file = File {
            package_name,
            imports,
            items,
            comments: mem::take(&mut parser.comments),
            filename: parser.lexer.source().name(),
        };

        (file, parser.errors)
    }

    fn create_node_id(&mut self) -> NodeId {
        let id = NodeId::new(self.next_node_id);
        self.next_node_id += 1;
        id
    }

    /* Declarations */

    /// `import "path"` or `import alias "path"`.
    fn parse_import(&mut self) -> ParseResult<Import> {
        let start = self.previous.span();

        let alias = if self.check(TokenKind::Identifier) {
            let alias = self.make_identifier();
            self.advance();
            Some(alias)
        } else {
            None
        };

        if !self.check(TokenKind::Str) {
            self.error("expected import path (string)");
            return Err(Recovered);
        }

        let path = unescape_string(&self.current.lexeme);
        let end = self.current.span();
        self.advance();
        self.match_token(TokenKind::Semicolon);

        Ok(Import {
            id: self.create_node_id(),
            span: start.to(&end),
            alias,
            path,
        })
    }

    /// Parses one top-level declaration, synchronizing on failure.
    fn parse_item(&mut self) -> Option<Item> {
        let before = self.current.position.offset;

        let result = (|| -> ParseResult<Item> {
            if self.match_keyword(Keyword::Var) {
                let decl = self.parse_var_decl()?;
                return Ok(Item {
                    id: self.create_node_id(),
                    span: decl.span.clone(),
                    kind: ItemKind::Var(decl),
                });
            }
            if self.match_keyword(Keyword::Func) {
                let decl = self.parse_func_decl()?;
                return Ok(Item {
                    id: self.create_node_id(),
                    span: decl.span.clone(),
                    kind: ItemKind::Func(Box::new(decl)),
                });
            }
            if self.match_keyword(Keyword::Type) {
                let decl = self.parse_type_alias_decl()?;
                return Ok(Item {
                    id: self.create_node_id(),
                    span: decl.span.clone(),
                    kind: ItemKind::TypeAlias(decl),
                });
            }
            if self.match_keyword(Keyword::Struct) {
                let decl = self.parse_struct_decl()?;
                return Ok(Item {
                    id: self.create_node_id(),
                    span: decl.span.clone(),
                    kind: ItemKind::Struct(decl),
                });
            }

            self.error(format!(
                "expected declaration, got {:?}",
                self.current.kind
            ));
            Err(Recovered)
        })();

        match result {
            Ok(item) => Some(item),
            Err(Recovered) => {
                self.synchronize();
                self.ensure_progress(before);
                None
            }
        }
    }

    /// `var a, b type = expr;` — the `var` keyword has been consumed.
    fn parse_var_decl(&mut self) -> ParseResult<VarDecl> {
        let start = self.previous.span();

        let mut names = Vec::new();
        loop {
            if !self.check(TokenKind::Identifier) {
                self.error("expected variable name");
                return Err(Recovered);
            }

            names.push(self.make_identifier());
            self.advance();

            if !self.match_token(TokenKind::Comma) {
                break;
            }
        }

        let ty = if !self.check(TokenKind::Assign) && !self.check(TokenKind::Semicolon) {
            Some(self.parse_type()?)
        } else {
            None
        };

        let initializer = if self.match_token(TokenKind::Assign) {
            Some(self.parse_expression()?)
        } else {
            None
        };

        if ty.is_none() && initializer.is_none() {
            self.error("variable declaration must have either type or initializer");
        }

        self.consume(TokenKind::Semicolon, "expected ';' after variable declaration")?;

        Ok(VarDecl {
            id: self.create_node_id(),
            span: start.to(&self.previous.span()),
            names,
            ty,
            initializer,
        })
    }

    /// `func name(params) return_type { body }` — `func` consumed.
    fn parse_func_decl(&mut self) -> ParseResult<FuncDecl> {
        let start = self.previous.span();

        if !self.check(TokenKind::Identifier) {
            self.error("expected function name");
            return Err(Recovered);
        }
        let name = self.make_identifier();
        self.advance();

        self.consume(TokenKind::LeftParen, "expected '(' after function name")?;
        let params = self.parse_parameters()?;
        self.consume(TokenKind::RightParen, "expected ')' after parameters")?;

        let return_type = if !self.check(TokenKind::LeftBrace) {
            Some(self.parse_type()?)
        } else {
            None
        };

        if !self.check(TokenKind::LeftBrace) {
            self.error("expected function body");
            return Err(Recovered);
        }
        let body = self.parse_block()?;

        Ok(FuncDecl {
            id: self.create_node_id(),
            span: start.to(&body.span),
            name,
            params,
            return_type,
            body,
        })
    }

    fn parse_parameters(&mut self) -> ParseResult<Vec<Parameter>> {
        let mut params = Vec::new();

        if self.check(TokenKind::RightParen) {
            return Ok(params);
        }

        loop {
            if !self.check(TokenKind::Identifier) {
                self.error("expected parameter name");
                return Err(Recovered);
            }

            let name = self.make_identifier();
            self.advance();

            let ty = self.parse_type()?;

            params.push(Parameter {
                id: self.create_node_id(),
                span: name.span.to(&ty.span),
                name,
                ty,
            });

            if !self.match_token(TokenKind::Comma) {
                break;
            }
        }

        Ok(params)
    }

    /// `type Name = Type;` — `type` consumed.
    fn parse_type_alias_decl(&mut self) -> ParseResult<TypeAliasDecl> {
        let start = self.previous.span();

        if !self.check(TokenKind::Identifier) {
            self.error("expected type name");
            return Err(Recovered);
        }
        let name = self.make_identifier();
        self.advance();

        self.consume(TokenKind::Assign, "expected '=' in type declaration")?;
        let ty = self.parse_type()?;
        self.consume(TokenKind::Semicolon, "expected ';' after type declaration")?;

        Ok(TypeAliasDecl {
            id: self.create_node_id(),
            span: start.to(&self.previous.span()),
            name,
            ty,
        })
    }

    /// `struct Name { field type; ... }` — `struct` consumed.
    fn parse_struct_decl(&mut self) -> ParseResult<StructDecl> {
        let start = self.previous.span();

        if !self.check(TokenKind::Identifier) {
            self.error("expected struct name");
            return Err(Recovered);
        }
        let name = self.make_identifier();
        self.advance();

        self.consume(TokenKind::LeftBrace, "expected '{' before struct body")?;

        let mut fields = Vec::new();
        while !self.check(TokenKind::RightBrace) && !self.is_at_end() {
            if !self.check(TokenKind::Identifier) {
                self.error("expected field name");
                return Err(Recovered);
            }

            let field_name = self.make_identifier();
            self.advance();

            let field_type = self.parse_type()?;
            self.consume(TokenKind::Semicolon, "expected ';' after field declaration")?;

            fields.push(FieldDecl {
                id: self.create_node_id(),
                span: field_name.span.to(&field_type.span),
                name: field_name,
                ty: field_type,
            });
        }

        self.consume(TokenKind::RightBrace, "expected '}' after struct body")?;

        Ok(StructDecl {
            id: self.create_node_id(),
            span: start.to(&self.previous.span()),
            name,
            fields,
        })
    }

    /// Type annotations are identifiers (`int`, `Point`, aliases).
    fn parse_type(&mut self) -> ParseResult<TypeExpr> {
        if !self.check(TokenKind::Identifier) {
            self.error("expected type name");
            return Err(Recovered);
        }

        let ty = TypeExpr {
            id: self.create_node_id(),
            span: self.current.span(),
            name: self.current.lexeme.clone(),
        };
        self.advance();

        Ok(ty)
    }

    /* Statements */

    /// Parses a statement, synchronizing to the next statement boundary
    /// on failure.
    fn parse_statement(&mut self) -> Option<Statement> {
        let before = self.current.position.offset;

        match self.parse_statement_inner() {
            Ok(statement) => Some(statement),
            Err(Recovered) => {
                self.synchronize();
                self.ensure_progress(before);
                None
            }
        }
    }

    fn parse_statement_inner(&mut self) -> ParseResult<Statement> {
        if self.check(TokenKind::LeftBrace) {
            let block = self.parse_block()?;
            return Ok(Statement {
                id: self.create_node_id(),
                span: block.span.clone(),
                kind: StatementKind::Block(block),
            });
        }
        if self.match_keyword(Keyword::If) {
            return self.parse_if_stmt();
        }
        if self.match_keyword(Keyword::While) {
            return self.parse_while_stmt();
        }
        if self.match_keyword(Keyword::For) {
            return self.parse_for_stmt();
        }
        if self.match_keyword(Keyword::Return) {
            return self.parse_return_stmt();
        }
        if self.match_keyword(Keyword::Break) {
            let span = self.previous.span();
            self.consume(TokenKind::Semicolon, "expected ';' after 'break'")?;
            return Ok(Statement {
                id: self.create_node_id(),
                span,
                kind: StatementKind::Break,
            });
        }
        if self.match_keyword(Keyword::Continue) {
            let span = self.previous.span();
            self.consume(TokenKind::Semicolon, "expected ';' after 'continue'")?;
            return Ok(Statement {
                id: self.create_node_id(),
                span,
                kind: StatementKind::Continue,
            });
        }
        if self.match_keyword(Keyword::Switch) {
            return self.parse_switch_stmt();
        }
        if self.match_keyword(Keyword::Var) {
            let decl = self.parse_var_decl()?;
            return Ok(Statement {
                id: self.create_node_id(),
                span: decl.span.clone(),
                kind: StatementKind::Var(decl),
            });
        }

        self.parse_expr_stmt()
    }

    fn parse_block(&mut self) -> ParseResult<Block> {
        self.consume(TokenKind::LeftBrace, "expected '{'")?;
        let start = self.previous.span();

        let mut statements = Vec::new();
        while !self.check(TokenKind::RightBrace) && !self.is_at_end() {
            if let Some(statement) = self.parse_statement() {
                statements.push(statement);
            }
        }

        self.consume(TokenKind::RightBrace, "expected '}'")?;

        Ok(Block {
            id: self.create_node_id(),
            span: start.to(&self.previous.span()),
            statements,
        })
    }

    /// `if (cond) block [else block-or-if]` — `if` consumed.
    fn parse_if_stmt(&mut self) -> ParseResult<Statement> {
        let start = self.previous.span();

        self.consume(TokenKind::LeftParen, "expected '(' after 'if'")?;
        let condition = self.parse_expression()?;
        self.consume(TokenKind::RightParen, "expected ')' after condition")?;

        let then_branch = self.parse_block()?;

        let else_branch = if self.match_keyword(Keyword::Else) {
            if self.match_keyword(Keyword::If) {
                Some(Box::new(self.parse_if_stmt()?))
            } else {
                let block = self.parse_block()?;
                Some(Box::new(Statement {
                    id: self.create_node_id(),
                    span: block.span.clone(),
                    kind: StatementKind::Block(block),
                }))
            }
        } else {
            None
        };

        let end = else_branch
            .as_ref()
            .map(|e| e.span.clone())
            .unwrap_or_else(|| then_branch.span.clone());

        Ok(Statement {
            id: self.create_node_id(),
            span: start.to(&end),
            kind: StatementKind::If(IfStmt {
                condition,
                then_branch,
                else_branch,
            }),
        })
    }

    /// `while (cond) block` — `while` consumed.
    fn parse_while_stmt(&mut self) -> ParseResult<Statement> {
        let start = self.previous.span();

        self.consume(TokenKind::LeftParen, "expected '(' after 'while'")?;
        let condition = self.parse_expression()?;
        self.consume(TokenKind::RightParen, "expected ')' after condition")?;

        let body = self.parse_block()?;

        Ok(Statement {
            id: self.create_node_id(),
            span: start.to(&body.span),
            kind: StatementKind::While(WhileStmt { condition, body }),
        })
    }

    /// `for (init?; cond?; post?) block` — `for` consumed.
    fn parse_for_stmt(&mut self) -> ParseResult<Statement> {
        let start = self.previous.span();

        self.consume(TokenKind::LeftParen, "expected '(' after 'for'")?;

        let init = if self.match_token(TokenKind::Semicolon) {
            None
        } else if self.match_keyword(Keyword::Var) {
            let decl = self.parse_var_decl()?;
            Some(Box::new(Statement {
                id: self.create_node_id(),
                span: decl.span.clone(),
                kind: StatementKind::Var(decl),
            }))
        } else {
            Some(Box::new(self.parse_expr_stmt()?))
        };

        let condition = if !self.check(TokenKind::Semicolon) {
            Some(self.parse_expression()?)
        } else {
            None
        };
        self.consume(TokenKind::Semicolon, "expected ';' after loop condition")?;

        let post = if !self.check(TokenKind::RightParen) {
            let expression = self.parse_expression()?;
            Some(Box::new(Statement {
                id: self.create_node_id(),
                span: expression.span.clone(),
                kind: StatementKind::Expr(expression),
            }))
        } else {
            None
        };

        self.consume(TokenKind::RightParen, "expected ')' after for clauses")?;

        let body = self.parse_block()?;

        Ok(Statement {
            id: self.create_node_id(),
            span: start.to(&body.span),
            kind: StatementKind::For(ForStmt {
                init,
                condition,
                post,
                body,
            }),
        })
    }

    /// `return expr?;` — `return` consumed.
    fn parse_return_stmt(&mut self) -> ParseResult<Statement> {
        let start = self.previous.span();

        let value = if !self.check(TokenKind::Semicolon) {
            Some(self.parse_expression()?)
        } else {
            None
        };

        self.consume(TokenKind::Semicolon, "expected ';' after return statement")?;

        Ok(Statement {
            id: self.create_node_id(),
            span: start.to(&self.previous.span()),
            kind: StatementKind::Return(ReturnStmt { value }),
        })
    }

    /// `switch (expr) { case v, v: stmts ... default: stmts }` —
    /// `switch` consumed.
    fn parse_switch_stmt(&mut self) -> ParseResult<Statement> {
        let start = self.previous.span();

        self.consume(TokenKind::LeftParen, "expected '(' after 'switch'")?;
        let value = self.parse_expression()?;
        self.consume(TokenKind::RightParen, "expected ')' after switch value")?;

        self.consume(TokenKind::LeftBrace, "expected '{' before switch body")?;

        let mut cases = Vec::new();
        while !self.check(TokenKind::RightBrace) && !self.is_at_end() {
            cases.push(self.parse_case_clause()?);
        }

        self.consume(TokenKind::RightBrace, "expected '}' after switch body")?;

        Ok(Statement {
            id: self.create_node_id(),
            span: start.to(&self.previous.span()),
            kind: StatementKind::Switch(SwitchStmt { value, cases }),
        })
    }

    fn parse_case_clause(&mut self) -> ParseResult<CaseClause> {
        let mut values = Vec::new();
        let is_default;
        let start;

        if self.match_keyword(Keyword::Case) {
            start = self.previous.span();
            is_default = false;

            loop {
                values.push(self.parse_expression()?);
                if !self.match_token(TokenKind::Comma) {
                    break;
                }
            }
        } else if self.match_keyword(Keyword::Default) {
            start = self.previous.span();
            is_default = true;
        } else {
            self.error("expected 'case' or 'default'");
            return Err(Recovered);
        }

        self.consume(TokenKind::Colon, "expected ':' after case")?;

        let mut body = Vec::new();
        while !self.check(TokenKind::Keyword(Keyword::Case))
            && !self.check(TokenKind::Keyword(Keyword::Default))
            && !self.check(TokenKind::RightBrace)
            && !self.is_at_end()
        {
            if let Some(statement) = self.parse_statement() {
                body.push(statement);
            }
        }

        Ok(CaseClause {
            id: self.create_node_id(),
            span: start.to(&self.previous.span()),
            values,
            body,
            is_default,
        })
    }

    fn parse_expr_stmt(&mut self) -> ParseResult<Statement> {
        let expression = self.parse_expression()?;
        self.consume(TokenKind::Semicolon, "expected ';' after expression")?;

        Ok(Statement {
            id: self.create_node_id(),
            span: expression.span.to(&self.previous.span()),
            kind: StatementKind::Expr(expression),
        })
    }

    /* Expressions (Pratt parsing) */

    fn parse_expression(&mut self) -> ParseResult<Expression> {
        self.parse_precedence(Precedence::ASSIGNMENT)
    }

    /// Parses an expression whose operators bind at least as tightly as
    /// `precedence`.
    fn parse_precedence(&mut self, precedence: Precedence) -> ParseResult<Expression> {
        let Some(mut left) = self.parse_prefix()? else {
            self.error(format!("expected expression, got {:?}", self.current.kind));
            return Err(Recovered);
        };

        while precedence <= precedence_of(self.current.kind) {
            left = self.parse_infix(left)?;
        }

        Ok(left)
    }

    /// Parses the expression forms that can begin an expression.
    /// Returns `Ok(None)` when the current token cannot start one.
    fn parse_prefix(&mut self) -> ParseResult<Option<Expression>> {
        let expression = match self.current.kind {
            TokenKind::Number => self.parse_number_literal()?,
            TokenKind::Str => {
                let token = self.current.clone();
                self.advance();
                self.make_literal(&token, LiteralValue::String(unescape_string(&token.lexeme)))
            }
            TokenKind::Char => {
                let token = self.current.clone();
                self.advance();
                let value = parse_char_literal(&token.lexeme).unwrap_or_else(|| {
                    self.error_at(token.position.clone(), "invalid character literal");
                    '\0'
                });
                self.make_literal(&token, LiteralValue::Char(value))
            }
            TokenKind::True | TokenKind::False => {
                let token = self.current.clone();
                self.advance();
                self.make_literal(&token, LiteralValue::Bool(token.kind == TokenKind::True))
            }
            TokenKind::Nil => {
                let token = self.current.clone();
                self.advance();
                self.make_literal(&token, LiteralValue::Nil)
            }
            TokenKind::Identifier => self.parse_identifier_expr()?,
            TokenKind::LeftParen => self.parse_grouping()?,
            TokenKind::LeftBracket => self.parse_array_literal()?,
            TokenKind::Minus
            | TokenKind::Bang
            | TokenKind::Tilde
            | TokenKind::PlusPlus
            | TokenKind::MinusMinus => self.parse_unary()?,
            _ => return Ok(None),
        };

        Ok(Some(expression))
    }

    /// Parses one infix (or postfix) operator applied to `left`.
    fn parse_infix(&mut self, left: Expression) -> ParseResult<Expression> {
        match self.current.kind {
            TokenKind::Plus
            | TokenKind::Minus
            | TokenKind::Star
            | TokenKind::Slash
            | TokenKind::Percent
            | TokenKind::StarStar
            | TokenKind::EqualEqual
            | TokenKind::NotEqual
            | TokenKind::Less
            | TokenKind::LessEqual
            | TokenKind::Greater
            | TokenKind::GreaterEqual
            | TokenKind::Ampersand
            | TokenKind::Pipe
            | TokenKind::Caret
            | TokenKind::ShiftLeft
            | TokenKind::ShiftRight => self.parse_binary(left),

            TokenKind::AndAnd | TokenKind::OrOr => self.parse_logical(left),

            kind if kind.is_assignment_operator() => self.parse_assignment(left),

            TokenKind::Dot => self.parse_member(left),
            TokenKind::LeftParen => self.parse_call(left),
            TokenKind::LeftBracket => self.parse_index(left),

            TokenKind::PlusPlus | TokenKind::MinusMinus => {
                let operator = UnaryOperator {
                    kind: if self.current.kind == TokenKind::PlusPlus {
                        UnaryOp::Increment
                    } else {
                        UnaryOp::Decrement
                    },
                    span: self.current.span(),
                };
                self.advance();

                let span = left.span.to(&operator.span);
                Ok(Expression {
                    id: self.create_node_id(),
                    span,
                    kind: ExpressionKind::Unary(UnaryExpr {
                        operator,
                        operand: Box::new(left),
                        is_postfix: true,
                    }),
                })
            }

            _ => Ok(left),
        }
    }

    fn parse_binary(&mut self, left: Expression) -> ParseResult<Expression> {
        let operator_token = self.current.clone();
        let mut precedence = precedence_of(operator_token.kind);
        self.advance();

        if is_right_associative(operator_token.kind) {
            // Right-associative operators re-enter at their own level
            precedence = Precedence(precedence.0 - 1);
        }

        let right = self.parse_precedence(precedence.one_higher())?;

        let kind = match operator_token.kind {
            TokenKind::Plus => BinaryOp::Add,
            TokenKind::Minus => BinaryOp::Subtract,
            TokenKind::Star => BinaryOp::Multiply,
            TokenKind::Slash => BinaryOp::Divide,
            TokenKind::Percent => BinaryOp::Modulo,
            TokenKind::StarStar => BinaryOp::Power,
            TokenKind::EqualEqual => BinaryOp::Equal,
            TokenKind::NotEqual => BinaryOp::NotEqual,
            TokenKind::Less => BinaryOp::Less,
            TokenKind::LessEqual => BinaryOp::LessEqual,
            TokenKind::Greater => BinaryOp::Greater,
            TokenKind::GreaterEqual => BinaryOp::GreaterEqual,
            TokenKind::Ampersand => BinaryOp::BitAnd,
            TokenKind::Pipe => BinaryOp::BitOr,
            TokenKind::Caret => BinaryOp::BitXor,
            TokenKind::ShiftLeft => BinaryOp::ShiftLeft,
            TokenKind::ShiftRight => BinaryOp::ShiftRight,
            _ => unreachable!("parse_binary called on non-binary token"),
        };

        let span = left.span.to(&right.span);
        Ok(Expression {
            id: self.create_node_id(),
            span,
            kind: ExpressionKind::Binary(BinaryExpr {
                operator: BinaryOperator {
                    kind,
                    span: operator_token.span(),
                },
                lhs: Box::new(left),
                rhs: Box::new(right),
            }),
        })
    }

    fn parse_logical(&mut self, left: Expression) -> ParseResult<Expression> {
        let operator_token = self.current.clone();
        let precedence = precedence_of(operator_token.kind);
        self.advance();

        let right = self.parse_precedence(precedence.one_higher())?;

        let kind = match operator_token.kind {
            TokenKind::AndAnd => LogicalOp::And,
            TokenKind::OrOr => LogicalOp::Or,
            _ => unreachable!("parse_logical called on non-logical token"),
        };

        let span = left.span.to(&right.span);
        Ok(Expression {
            id: self.create_node_id(),
            span,
            kind: ExpressionKind::Logical(LogicalExpr {
                operator: LogicalOperator {
                    kind,
                    span: operator_token.span(),
                },
                lhs: Box::new(left),
                rhs: Box::new(right),
            }),
        })
    }

    fn parse_assignment(&mut self, left: Expression) -> ParseResult<Expression> {
        let operator_token = self.current.clone();
        self.advance();

        if !left.is_lvalue() {
            self.error_at(left.span.start.clone(), "invalid assignment target");
        }

        // Right-associative: `a = b = c` parses as `a = (b = c)`
        let value = self.parse_precedence(Precedence::ASSIGNMENT)?;

        let operator = match operator_token.kind {
            TokenKind::Assign => None,
            TokenKind::PlusEq => Some(BinaryOp::Add),
            TokenKind::MinusEq => Some(BinaryOp::Subtract),
            TokenKind::StarEq => Some(BinaryOp::Multiply),
            TokenKind::SlashEq => Some(BinaryOp::Divide),
            TokenKind::PercentEq => Some(BinaryOp::Modulo),
            TokenKind::AmpEq => Some(BinaryOp::BitAnd),
            TokenKind::PipeEq => Some(BinaryOp::BitOr),
            TokenKind::CaretEq => Some(BinaryOp::BitXor),
            TokenKind::ShlEq => Some(BinaryOp::ShiftLeft),
            TokenKind::ShrEq => Some(BinaryOp::ShiftRight),
            _ => unreachable!("parse_assignment called on non-assignment token"),
        }
        .map(|kind| BinaryOperator {
            kind,
            span: operator_token.span(),
        });

        let span = left.span.to(&value.span);
        Ok(Expression {
            id: self.create_node_id(),
            span,
            kind: ExpressionKind::Assignment(AssignmentExpr {
                target: Box::new(left),
                operator,
                value: Box::new(value),
            }),
        })
    }

    fn parse_member(&mut self, left: Expression) -> ParseResult<Expression> {
        self.advance(); // consume '.'

        if !self.check(TokenKind::Identifier) {
            self.error("expected property name after '.'");
            return Err(Recovered);
        }

        let member = self.make_identifier();
        self.advance();

        let span = left.span.to(&member.span);
        Ok(Expression {
            id: self.create_node_id(),
            span,
            kind: ExpressionKind::Member(MemberExpr {
                object: Box::new(left),
                member,
            }),
        })
    }

    fn parse_call(&mut self, left: Expression) -> ParseResult<Expression> {
        self.advance(); // consume '('

        let mut arguments = Vec::new();
        if !self.check(TokenKind::RightParen) {
            loop {
                arguments.push(self.parse_expression()?);
                if !self.match_token(TokenKind::Comma) {
                    break;
                }
            }
        }

        self.consume(TokenKind::RightParen, "expected ')' after arguments")?;

        let span = left.span.to(&self.previous.span());
        Ok(Expression {
            id: self.create_node_id(),
            span,
            kind: ExpressionKind::Call(CallExpr {
                callee: Box::new(left),
                arguments,
            }),
        })
    }

    fn parse_index(&mut self, left: Expression) -> ParseResult<Expression> {
        self.advance(); // consume '['

        let index = self.parse_expression()?;
        self.consume(TokenKind::RightBracket, "expected ']' after index")?;

        let span = left.span.to(&self.previous.span());
        Ok(Expression {
            id: self.create_node_id(),
            span,
            kind: ExpressionKind::Index(IndexExpr {
                object: Box::new(left),
                index: Box::new(index),
            }),
        })
    }

    fn parse_unary(&mut self) -> ParseResult<Expression> {
        let operator_token = self.current.clone();
        self.advance();

        let operand = self.parse_precedence(Precedence::UNARY)?;

        let kind = match operator_token.kind {
            TokenKind::Minus => UnaryOp::Negate,
            TokenKind::Bang => UnaryOp::Not,
            TokenKind::Tilde => UnaryOp::BitNot,
            TokenKind::PlusPlus => UnaryOp::Increment,
            TokenKind::MinusMinus => UnaryOp::Decrement,
            _ => unreachable!("parse_unary called on non-unary token"),
        };

        let span = operator_token.span().to(&operand.span);
        Ok(Expression {
            id: self.create_node_id(),
            span,
            kind: ExpressionKind::Unary(UnaryExpr {
                operator: UnaryOperator {
                    kind,
                    span: operator_token.span(),
                },
                operand: Box::new(operand),
                is_postfix: false,
            }),
        })
    }

    fn parse_number_literal(&mut self) -> ParseResult<Expression> {
        let token = self.current.clone();
        self.advance();

        if let Ok(value) = token.lexeme.parse::<i64>() {
            return Ok(self.make_literal(&token, LiteralValue::Int(value)));
        }

        match token.lexeme.parse::<f64>() {
            Ok(value) => Ok(self.make_literal(&token, LiteralValue::Float(value))),
            Err(_) => {
                self.error_at(
                    token.position.clone(),
                    format!("invalid number literal: {}", token.lexeme),
                );
                Ok(self.make_literal(&token, LiteralValue::Float(0.0)))
            }
        }
    }

    fn parse_identifier_expr(&mut self) -> ParseResult<Expression> {
        let token = self.current.clone();
        self.advance();

        // An identifier immediately followed by `{` is a struct literal
        if self.check(TokenKind::LeftBrace) {
            let type_name = Identifier {
                id: self.create_node_id(),
                span: token.span(),
                name: token.lexeme.clone(),
            };
            return self.parse_struct_literal(type_name);
        }

        Ok(Expression {
            id: self.create_node_id(),
            span: token.span(),
            kind: ExpressionKind::Identifier(IdentifierExpr { name: token.lexeme }),
        })
    }

    fn parse_grouping(&mut self) -> ParseResult<Expression> {
        let start = self.current.span();
        self.advance(); // consume '('

        let inner = self.parse_expression()?;
        self.consume(TokenKind::RightParen, "expected ')' after expression")?;

        Ok(Expression {
            id: self.create_node_id(),
            span: start.to(&self.previous.span()),
            kind: ExpressionKind::Grouping(Box::new(inner)),
        })
    }

    fn parse_array_literal(&mut self) -> ParseResult<Expression> {
        let start = self.current.span();
        self.advance(); // consume '['

        let mut elements = Vec::new();
        if !self.check(TokenKind::RightBracket) {
            loop {
                elements.push(self.parse_expression()?);
                if !self.match_token(TokenKind::Comma) {
                    break;
                }
            }
        }

        self.consume(TokenKind::RightBracket, "expected ']' after array elements")?;

        Ok(Expression {
            id: self.create_node_id(),
            span: start.to(&self.previous.span()),
            kind: ExpressionKind::ArrayLiteral(ArrayLiteralExpr {
                element_type: None,
                elements,
            }),
        })
    }

    fn parse_struct_literal(&mut self, type_name: Identifier) -> ParseResult<Expression> {
        self.consume(TokenKind::LeftBrace, "expected '{'")?;

        let mut fields = Vec::new();
        if !self.check(TokenKind::RightBrace) {
            loop {
                if !self.check(TokenKind::Identifier) {
                    self.error("expected field name");
                    return Err(Recovered);
                }

                let name = self.make_identifier();
                self.advance();

                self.consume(TokenKind::Colon, "expected ':' after field name")?;

                let value = self.parse_expression()?;

                fields.push(FieldInit {
                    id: self.create_node_id(),
                    span: name.span.to(&value.span),
                    name,
                    value,
                });

                if !self.match_token(TokenKind::Comma) {
                    break;
                }
            }
        }

        self.consume(TokenKind::RightBrace, "expected '}' after struct fields")?;

        Ok(Expression {
            id: self.create_node_id(),
            span: type_name.span.to(&self.previous.span()),
            kind: ExpressionKind::StructLiteral(StructLiteralExpr { type_name, fields }),
        })
    }

    /* Helpers */

    fn make_identifier(&mut self) -> Identifier {
        Identifier {
            id: self.create_node_id(),
            span: self.current.span(),
            name: self.current.lexeme.clone(),
        }
    }

    fn make_literal(&mut self, token: &Token, value: LiteralValue) -> Expression {
        Expression {
            id: self.create_node_id(),
            span: token.span(),
            kind: ExpressionKind::Literal(LiteralExpr { value }),
        }
    }

    fn advance(&mut self) {
        let next = loop {
            match self.lexer.next_token() {
                Ok(token) if token.kind == TokenKind::Comment => {
                    self.comments.push(Comment {
                        position: token.position.clone(),
                        is_block: token.lexeme.starts_with("/*"),
                        text: token.lexeme,
                    });
                }
                Ok(token) => break token,
                Err(diagnostic) => {
                    let position = diagnostic.position.clone();
                    if !self.panic_mode {
                        self.panic_mode = true;
                        self.errors.push(diagnostic);
                    }
                    break Token {
                        kind: TokenKind::Invalid,
                        lexeme: String::new(),
                        position,
                        length: 0,
                    };
                }
            }
        };

        self.previous = mem::replace(&mut self.current, next);
    }

    fn check(&self, kind: TokenKind) -> bool {
        self.current.kind == kind
    }

    fn match_token(&mut self, kind: TokenKind) -> bool {
        if self.check(kind) {
            self.advance();
            true
        } else {
            false
        }
    }

    fn match_keyword(&mut self, keyword: Keyword) -> bool {
        self.match_token(TokenKind::Keyword(keyword))
    }

    fn consume(&mut self, kind: TokenKind, message: &str) -> ParseResult<()> {
        if self.check(kind) {
            self.advance();
            return Ok(());
        }

        self.error(message);
        Err(Recovered)
    }

    fn is_at_end(&self) -> bool {
        self.current.kind == TokenKind::Eof
    }

    /// Records a syntax error at the current token. In panic mode
    /// subsequent errors are suppressed until the parser synchronizes.
    fn error(&mut self, message: impl Into<String>) {
        let position = self.current.position.clone();
        self.error_at(position, message);
    }

    fn error_at(&mut self, position: Position, message: impl Into<String>) {
        if self.panic_mode {
            return;
        }
        self.panic_mode = true;
        self.errors
            .push(Diagnostic::new(Phase::Parse, position, message));
    }

    /// Skips tokens until just past a semicolon or at a token that can
    /// start a statement.
    fn synchronize(&mut self) {
        self.panic_mode = false;

        while !self.is_at_end() {
            if self.previous.kind == TokenKind::Semicolon {
                return;
            }

            match self.current.kind {
                TokenKind::Keyword(
                    Keyword::Func
                    | Keyword::Var
                    | Keyword::For
                    | Keyword::If
                    | Keyword::While
                    | Keyword::Return
                    | Keyword::Struct
                    | Keyword::Type,
                ) => return,
                _ => self.advance(),
            }
        }
    }

    /// Guarantees forward progress after synchronization so a stray
    /// statement-starting token can not loop the caller forever.
    fn ensure_progress(&mut self, before: usize) {
        if !self.is_at_end() && self.current.position.offset == before {
            self.advance();
        }
    }
}

/// Strips the surrounding quotes and processes `\n \t \r \\ \"`;
/// unknown escapes yield the escaped character.
fn unescape_string(lexeme: &str) -> String {
    if lexeme.len() < 2 {
        return String::new();
    }

    let inner = &lexeme[1..lexeme.len() - 1];
    let mut result = String::with_capacity(inner.len());
    let mut chars = inner.chars();

    while let Some(ch) = chars.next() {
        if ch != '\\' {
            result.push(ch);
            continue;
        }

        match chars.next() {
            Some('n') => result.push('\n'),
            Some('t') => result.push('\t'),
            Some('r') => result.push('\r'),
            Some('\\') => result.push('\\'),
            Some('"') => result.push('"'),
            Some(other) => result.push(other),
            None => {}
        }
    }

    result
}

fn parse_char_literal(lexeme: &str) -> Option<char> {
    if lexeme.len() < 3 {
        return None;
    }

    let inner = &lexeme[1..lexeme.len() - 1];
    let mut chars = inner.chars();
    let first = chars.next()?;

    if first != '\\' {
        return Some(first);
    }

    match chars.next()? {
        'n' => Some('\n'),
        't' => Some('\t'),
        'r' => Some('\r'),
        '\\' => Some('\\'),
        '\'' => Some('\''),
        other => Some(other),
    }
}
