use std::collections::BTreeSet;

use sqlparser::ast::{Expr, FunctionArg, FunctionArgExpr, FunctionArguments};
use sqlparser::dialect::PostgreSqlDialect;
use sqlparser::parser::Parser;

use crate::parser::names::normalize_identifier;

/// Parse a single policy predicate (the body of `USING (...)` / `WITH CHECK (...)`).
pub fn parse_predicate(sql: &str) -> Result<Expr, String> {
    let mut parser = Parser::new(&PostgreSqlDialect {})
        .try_with_sql(sql)
        .map_err(|e| e.to_string())?;
    let expr = parser.parse_expr().map_err(|e| e.to_string())?;
    // Reject trailing garbage such as `a = b c`.
    let rest = parser.peek_token();
    if rest.token != sqlparser::tokenizer::Token::EOF {
        return Err(format!("unexpected trailing input near `{}`", rest.token));
    }
    Ok(expr)
}

/// Lowercased names of functions called at the top level of a predicate tree.
///
/// Descends through boolean operators, parentheses, casts and function
/// arguments; sub-queries are not entered.
pub fn called_functions(expr: &Expr) -> BTreeSet<String> {
    let mut out = BTreeSet::new();
    collect_functions(expr, &mut out);
    out
}

/// Extract the expression payload from a SQL function argument.
fn function_arg_expr(arg: &FunctionArg) -> Option<&Expr> {
    match arg {
        FunctionArg::Unnamed(FunctionArgExpr::Expr(expr))
        | FunctionArg::Named {
            arg: FunctionArgExpr::Expr(expr),
            ..
        }
        | FunctionArg::ExprNamed {
            arg: FunctionArgExpr::Expr(expr),
            ..
        } => Some(expr),
        _ => None,
    }
}

fn collect_functions(expr: &Expr, out: &mut BTreeSet<String>) {
    match expr {
        Expr::Function(func) => {
            out.insert(normalize_identifier(&func.name.to_string()));
            if let FunctionArguments::List(list) = &func.args {
                for arg in &list.args {
                    if let Some(inner) = function_arg_expr(arg) {
                        collect_functions(inner, out);
                    }
                }
            }
        }
        Expr::BinaryOp { left, right, .. } => {
            collect_functions(left, out);
            collect_functions(right, out);
        }
        Expr::UnaryOp { expr, .. } | Expr::Nested(expr) | Expr::Cast { expr, .. } => {
            collect_functions(expr, out);
        }
        Expr::IsNull(expr) | Expr::IsNotNull(expr) | Expr::IsTrue(expr) | Expr::IsFalse(expr) => {
            collect_functions(expr, out);
        }
        Expr::InList { expr, list, .. } => {
            collect_functions(expr, out);
            for item in list {
                collect_functions(item, out);
            }
        }
        _ => {}
    }
}
