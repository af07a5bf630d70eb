//! Prints an AST back to source text.
//!
//! The output is canonical rather than byte-faithful (comments and
//! original whitespace are not preserved), but it re-parses to a
//! structurally equal tree: parentheses are emitted exactly where the
//! tree shape requires them, so printing is a fixed point under
//! parse → print.

use super::{
    Block, Expression, ExpressionKind, File, Item, ItemKind, Statement, StatementKind, VarDecl,
};

pub fn print_file(file: &File) -> String {
    let mut printer = Printer {
        out: String::new(),
        indent: 0,
    };

    if let Some(package) = &file.package_name {
        printer.line(&format!("package {};", package.name));
    }

    for import in &file.imports {
        match &import.alias {
            Some(alias) => printer.line(&format!("import {} {:?};", alias.name, import.path)),
            None => printer.line(&format!("import {:?};", import.path)),
        }
    }

    for item in &file.items {
        printer.print_item(item);
    }

    printer.out
}

struct Printer {
    out: String,
    indent: usize,
}

impl Printer {
    fn line(&mut self, text: &str) {
        for _ in 0..self.indent {
            self.out.push_str("    ");
        }
        self.out.push_str(text);
        self.out.push('\n');
    }

    fn print_item(&mut self, item: &Item) {
        match &item.kind {
            ItemKind::Var(decl) => self.line(&format!("{};", var_decl_text(decl))),
            ItemKind::Func(decl) => {
                let params = decl
                    .params
                    .iter()
                    .map(|p| format!("{} {}", p.name.name, p.ty.name))
                    .collect::<Vec<_>>()
                    .join(", ");

                let header = match &decl.return_type {
                    Some(ty) => format!("func {}({}) {} ", decl.name.name, params, ty.name),
                    None => format!("func {}({}) ", decl.name.name, params),
                };

                self.line(&format!("{header}{{"));
                self.indent += 1;
                for statement in &decl.body.statements {
                    self.print_statement(statement);
                }
                self.indent -= 1;
                self.line("}");
            }
            ItemKind::TypeAlias(decl) => {
                self.line(&format!("type {} = {};", decl.name.name, decl.ty.name))
            }
            ItemKind::Struct(decl) => {
                self.line(&format!("struct {} {{", decl.name.name));
                self.indent += 1;
                for field in &decl.fields {
                    self.line(&format!("{} {};", field.name.name, field.ty.name));
                }
                self.indent -= 1;
                self.line("}");
            }
        }
    }

    fn print_statement(&mut self, statement: &Statement) {
        match &statement.kind {
            StatementKind::Block(block) => {
                self.line("{");
                self.indent += 1;
                for inner in &block.statements {
                    self.print_statement(inner);
                }
                self.indent -= 1;
                self.line("}");
            }
            StatementKind::Expr(expression) => {
                self.line(&format!("{};", expression_text(expression)))
            }
            StatementKind::If(if_stmt) => {
                self.line(&format!(
                    "if ({}) {{",
                    expression_text(&if_stmt.condition)
                ));
                self.print_branch_body(&if_stmt.then_branch);
                match &if_stmt.else_branch {
                    None => self.line("}"),
                    Some(else_branch) => match &else_branch.kind {
                        StatementKind::If(_) => {
                            // `else if`: splice the nested if onto the
                            // closing brace
                            self.line("} else");
                            self.print_statement(else_branch);
                        }
                        StatementKind::Block(block) => {
                            self.line("} else {");
                            self.indent += 1;
                            for inner in &block.statements {
                                self.print_statement(inner);
                            }
                            self.indent -= 1;
                            self.line("}");
                        }
                        _ => self.line("}"),
                    },
                }
            }
            StatementKind::While(while_stmt) => {
                self.line(&format!(
                    "while ({}) {{",
                    expression_text(&while_stmt.condition)
                ));
                self.print_branch_body(&while_stmt.body);
                self.line("}");
            }
            StatementKind::For(for_stmt) => {
                let init = match &for_stmt.init {
                    Some(init) => match &init.kind {
                        StatementKind::Var(decl) => format!("{};", var_decl_text(decl)),
                        StatementKind::Expr(expression) => {
                            format!("{};", expression_text(expression))
                        }
                        _ => ";".to_owned(),
                    },
                    None => ";".to_owned(),
                };
                let condition = for_stmt
                    .condition
                    .as_ref()
                    .map(expression_text)
                    .unwrap_or_default();
                let post = match &for_stmt.post {
                    Some(post) => match &post.kind {
                        StatementKind::Expr(expression) => expression_text(expression),
                        _ => String::new(),
                    },
                    None => String::new(),
                };

                self.line(&format!("for ({init} {condition}; {post}) {{"));
                self.print_branch_body(&for_stmt.body);
                self.line("}");
            }
            StatementKind::Return(ret) => match &ret.value {
                Some(value) => self.line(&format!("return {};", expression_text(value))),
                None => self.line("return;"),
            },
            StatementKind::Break => self.line("break;"),
            StatementKind::Continue => self.line("continue;"),
            StatementKind::Switch(switch) => {
                self.line(&format!(
                    "switch ({}) {{",
                    expression_text(&switch.value)
                ));
                for case in &switch.cases {
                    if case.is_default {
                        self.line("default:");
                    } else {
                        let values = case
                            .values
                            .iter()
                            .map(expression_text)
                            .collect::<Vec<_>>()
                            .join(", ");
                        self.line(&format!("case {values}:"));
                    }
                    self.indent += 1;
                    for inner in &case.body {
                        self.print_statement(inner);
                    }
                    self.indent -= 1;
                }
                self.line("}");
            }
            StatementKind::Var(decl) => self.line(&format!("{};", var_decl_text(decl))),
        }
    }

    fn print_branch_body(&mut self, block: &Block) {
        self.indent += 1;
        for statement in &block.statements {
            self.print_statement(statement);
        }
        self.indent -= 1;
    }
}

fn var_decl_text(decl: &VarDecl) -> String {
    let names = decl
        .names
        .iter()
        .map(|n| n.name.clone())
        .collect::<Vec<_>>()
        .join(", ");

    match (&decl.ty, &decl.initializer) {
        (Some(ty), Some(init)) => {
            format!("var {} {} = {}", names, ty.name, expression_text(init))
        }
        (Some(ty), None) => format!("var {} {}", names, ty.name),
        (None, Some(init)) => format!("var {} = {}", names, expression_text(init)),
        (None, None) => format!("var {names}"),
    }
}

/// Binding strength of an expression form, mirroring the parser's
/// precedence ladder. Used to decide where parentheses are required.
fn precedence(expression: &Expression) -> u8 {
    match &expression.kind {
        ExpressionKind::Assignment(_) => 1,
        ExpressionKind::Logical(logical) => match logical.operator.kind {
            super::LogicalOp::Or => 2,
            super::LogicalOp::And => 3,
        },
        ExpressionKind::Binary(binary) => {
            use super::BinaryOp::*;
            match binary.operator.kind {
                Equal | NotEqual => 4,
                Less | LessEqual | Greater | GreaterEqual => 5,
                BitOr => 6,
                BitXor => 7,
                BitAnd => 8,
                ShiftLeft | ShiftRight => 9,
                Add | Subtract => 10,
                Multiply | Divide | Modulo => 11,
                Power => 12,
            }
        }
        ExpressionKind::Unary(unary) if !unary.is_postfix => 13,
        _ => 14,
    }
}

/// Renders `child`, parenthesized if it binds looser than `min`.
fn child_text(child: &Expression, min: u8) -> String {
    let text = expression_text(child);
    if precedence(child) < min {
        format!("({text})")
    } else {
        text
    }
}

pub fn expression_text(expression: &Expression) -> String {
    match &expression.kind {
        ExpressionKind::Binary(binary) => {
            let level = precedence(expression);
            let right_associative = binary.operator.kind == super::BinaryOp::Power;
            let (left_min, right_min) = if right_associative {
                (level + 1, level)
            } else {
                (level, level + 1)
            };

            format!(
                "{} {} {}",
                child_text(&binary.lhs, left_min),
                binary.operator.kind,
                child_text(&binary.rhs, right_min)
            )
        }
        ExpressionKind::Unary(unary) => {
            if unary.is_postfix {
                format!("{}{}", child_text(&unary.operand, 14), unary.operator.kind)
            } else {
                let operator = unary.operator.kind.to_string();
                let operand = child_text(&unary.operand, 13);
                // `-(-x)` must not re-lex as a decrement
                let separator = if operator.ends_with('-') && operand.starts_with('-') {
                    " "
                } else {
                    ""
                };
                format!("{operator}{separator}{operand}")
            }
        }
        ExpressionKind::Logical(logical) => {
            let level = precedence(expression);
            let operator = match logical.operator.kind {
                super::LogicalOp::And => "&&",
                super::LogicalOp::Or => "||",
            };
            format!(
                "{} {} {}",
                child_text(&logical.lhs, level),
                operator,
                child_text(&logical.rhs, level + 1)
            )
        }
        ExpressionKind::Literal(literal) => literal.value.to_string(),
        ExpressionKind::Identifier(identifier) => identifier.name.clone(),
        ExpressionKind::Call(call) => {
            let arguments = call
                .arguments
                .iter()
                .map(expression_text)
                .collect::<Vec<_>>()
                .join(", ");
            format!("{}({})", child_text(&call.callee, 14), arguments)
        }
        ExpressionKind::Index(index) => {
            format!(
                "{}[{}]",
                child_text(&index.object, 14),
                expression_text(&index.index)
            )
        }
        ExpressionKind::Member(member) => {
            format!("{}.{}", child_text(&member.object, 14), member.member.name)
        }
        ExpressionKind::Assignment(assignment) => {
            let operator = match &assignment.operator {
                Some(op) => format!("{}=", op.kind),
                None => "=".to_owned(),
            };
            format!(
                "{} {} {}",
                child_text(&assignment.target, 14),
                operator,
                child_text(&assignment.value, 1)
            )
        }
        ExpressionKind::Grouping(inner) => format!("({})", expression_text(inner)),
        ExpressionKind::ArrayLiteral(array) => {
            let elements = array
                .elements
                .iter()
                .map(expression_text)
                .collect::<Vec<_>>()
                .join(", ");
            format!("[{elements}]")
        }
        ExpressionKind::StructLiteral(literal) => {
            let fields = literal
                .fields
                .iter()
                .map(|field| format!("{}: {}", field.name.name, expression_text(&field.value)))
                .collect::<Vec<_>>()
                .join(", ");
            format!("{}{{{fields}}}", literal.type_name.name)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::frontend::parser::Parser;
    use crate::frontend::SourceFile;

    fn roundtrip(source: &str) -> (String, String) {
        let file = SourceFile::from_memory(source);
        let (ast, errors) = Parser::parse_file(&file);
        assert!(errors.is_empty(), "parse errors: {errors:?}");
        let first = print_file(&ast);

        let reparsed_file = SourceFile::from_memory(first.as_str());
        let (reparsed, errors) = Parser::parse_file(&reparsed_file);
        assert!(errors.is_empty(), "re-parse errors: {errors:?}\n{first}");
        (first, print_file(&reparsed))
    }

    #[test]
    fn printing_is_a_fixed_point_under_reparsing() {
        let sources = [
            "package p; var a, b int = 1; func f(x int) int { return x + 1; }",
            "package p; func f() { if (true) { return; } else if (false) { } else { } }",
            "package p; func f() int { var x = (1 + 2) * 3; return -x ** 2 ** 3; }",
            "package p; struct Point { x int; y int; } \
             func f() int { var pt = Point{x: 1, y: 2}; return pt.x; }",
            "package p; func f() { var i int = 0; \
             for (var j int = 0; j < 3 && i != 0; j = j + 1) { i += j; } \
             while (i > 0) { i--; } }",
            "package p; func f(x int) { switch (x) { case 1, 2: break; default: return; } }",
            "package p; func f() int { var xs = [1, 2, 3]; xs[0] = 4; return xs[0]; }",
        ];

        for source in sources {
            let (first, second) = roundtrip(source);
            assert_eq!(first, second, "printing diverged for {source:?}");
        }
    }

    #[test]
    fn nested_negation_does_not_relex_as_decrement() {
        let (first, second) = roundtrip("package p; func f(x int) int { return - -x; }");
        assert_eq!(first, second);
        assert!(first.contains("- -x"));
    }

    #[test]
    fn parentheses_only_where_structure_requires_them() {
        let file = SourceFile::from_memory("package p; func f() int { return (1 + 2) * 3; }");
        let (ast, _) = Parser::parse_file(&file);
        let printed = print_file(&ast);

        assert!(printed.contains("return (1 + 2) * 3;"));
    }

    #[test]
    fn strings_and_chars_print_escaped() {
        let file = SourceFile::from_memory(
            "package p; func f() string { var c char = '\\n'; return \"a\\\"b\"; }",
        );
        let (ast, errors) = Parser::parse_file(&file);
        assert!(errors.is_empty());
        let printed = print_file(&ast);

        assert!(printed.contains("'\\n'"));
        assert!(printed.contains("\"a\\\"b\""));
    }
}
