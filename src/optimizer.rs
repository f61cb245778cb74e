//! The syntax tree optimizer.
//!
//! The optimizer runs after parsing when enabled on the environment (see
//! [`set_optimized`](crate::Environment::set_optimized)).  It performs
//! constant folding of expressions with constant operands, folds constant
//! conditional expressions, eliminates `{% if %}` statements with constant
//! conditions, and merges adjacent raw output statements.  The passes
//! repeat until nothing changes so that one pass unlocking another (a
//! folded condition exposing adjacent raw outputs, say) is picked up.
//!
//! All folding goes through the same operator implementations the
//! evaluator uses, so optimized templates render exactly like their
//! unoptimized counterparts.

use crate::ast::{self, Spanned};
use crate::lexer::Span;
use crate::value::{ops, Value};

/// Optimizes a template body in place until a fixed point is reached.
pub(crate) fn optimize(stmts: &mut Vec<ast::Stmt<'_>>) {
    loop {
        let mut changed = false;
        optimize_stmts(stmts, &mut changed);
        if !changed {
            break;
        }
    }
}

fn make_const(value: Value, span: Span) -> ast::Expr<'static> {
    ast::Expr::Const(Spanned::new(ast::Const { value }, span))
}

fn take_expr<'a>(slot: &mut ast::Expr<'a>) -> ast::Expr<'a> {
    std::mem::replace(slot, make_const(Value::from(()), Span::default()))
}

fn const_value(expr: &ast::Expr<'_>) -> Option<Value> {
    match expr {
        ast::Expr::Const(constant) => Some(constant.value.clone()),
        _ => None,
    }
}

fn optimize_stmts(stmts: &mut Vec<ast::Stmt<'_>>, changed: &mut bool) {
    for stmt in stmts.iter_mut() {
        optimize_stmt(stmt, changed);
    }

    // dead code elimination: constant conditions select their branch in
    // place
    let mut idx = 0;
    while idx < stmts.len() {
        let cond_value = match &stmts[idx] {
            ast::Stmt::IfCond(cond) => const_value(&cond.expr).map(|v| v.is_true()),
            _ => None,
        };
        if let Some(truthy) = cond_value {
            let cond = match stmts.remove(idx) {
                ast::Stmt::IfCond(cond) => cond.into_inner(),
                _ => unreachable!(),
            };
            let branch = if truthy {
                cond.true_body
            } else {
                cond.false_body
            };
            let count = branch.len();
            let _ = stmts.splice(idx..idx, branch);
            *changed = true;
            idx += count;
        } else {
            idx += 1;
        }
    }

    // output merging: drop empty raw output and merge adjacent chunks
    let mut idx = 0;
    while idx < stmts.len() {
        if let ast::Stmt::EmitRaw(raw) = &stmts[idx] {
            if raw.raw.is_empty() {
                stmts.remove(idx);
                *changed = true;
                continue;
            }
        }
        if idx + 1 < stmts.len() {
            let addition = match (&stmts[idx], &stmts[idx + 1]) {
                (ast::Stmt::EmitRaw(_), ast::Stmt::EmitRaw(next)) => Some(next.raw.clone()),
                _ => None,
            };
            if let Some(addition) = addition {
                if let ast::Stmt::EmitRaw(raw) = &mut stmts[idx] {
                    raw.raw.to_mut().push_str(&addition);
                }
                stmts.remove(idx + 1);
                *changed = true;
                continue;
            }
        }
        idx += 1;
    }
}

fn optimize_stmt(stmt: &mut ast::Stmt<'_>, changed: &mut bool) {
    match stmt {
        ast::Stmt::EmitRaw(_) => {}
        ast::Stmt::EmitExpr(emit) => fold_expr(&mut emit.expr, changed),
        ast::Stmt::IfCond(cond) => {
            fold_expr(&mut cond.expr, changed);
            optimize_stmts(&mut cond.true_body, changed);
            optimize_stmts(&mut cond.false_body, changed);
        }
        ast::Stmt::ForLoop(for_loop) => {
            fold_expr(&mut for_loop.iter, changed);
            if let Some(ref mut filter_expr) = for_loop.filter_expr {
                fold_expr(filter_expr, changed);
            }
            optimize_stmts(&mut for_loop.body, changed);
            optimize_stmts(&mut for_loop.else_body, changed);
        }
        ast::Stmt::WithBlock(with_block) => {
            for (_, expr) in &mut with_block.assignments {
                fold_expr(expr, changed);
            }
            optimize_stmts(&mut with_block.body, changed);
        }
        ast::Stmt::Set(set) => fold_expr(&mut set.expr, changed),
        ast::Stmt::SetBlock(set_block) => {
            optimize_stmts(&mut set_block.body, changed);
        }
        ast::Stmt::Block(block) => optimize_stmts(&mut block.body, changed),
        ast::Stmt::AutoEscape(auto_escape) => {
            fold_expr(&mut auto_escape.enabled, changed);
            optimize_stmts(&mut auto_escape.body, changed);
        }
        ast::Stmt::FilterBlock(filter_block) => {
            optimize_stmts(&mut filter_block.body, changed);
        }
        ast::Stmt::Extends(extends) => fold_expr(&mut extends.name, changed),
        ast::Stmt::Include(include) => fold_expr(&mut include.name, changed),
        ast::Stmt::Import(import) => fold_expr(&mut import.expr, changed),
        ast::Stmt::FromImport(from_import) => fold_expr(&mut from_import.expr, changed),
        ast::Stmt::Macro(macro_decl) => {
            for default in &mut macro_decl.defaults {
                fold_expr(default, changed);
            }
            optimize_stmts(&mut macro_decl.body, changed);
        }
        ast::Stmt::CallBlock(call_block) => {
            fold_call_args(&mut call_block.call.args, changed);
            optimize_stmts(&mut call_block.macro_decl.body, changed);
        }
        ast::Stmt::Do(do_stmt) => fold_call_args(&mut do_stmt.call.args, changed),
        ast::Stmt::Continue(_) | ast::Stmt::Break(_) => {}
    }
}

fn fold_call_args(args: &mut [ast::CallArg<'_>], changed: &mut bool) {
    for arg in args {
        match arg {
            ast::CallArg::Pos(expr) => fold_expr(expr, changed),
            ast::CallArg::Kwarg(_, expr) => fold_expr(expr, changed),
        }
    }
}

fn fold_expr(expr: &mut ast::Expr<'_>, changed: &mut bool) {
    // fold children first so that constants bubble upwards
    match expr {
        ast::Expr::UnaryOp(op) => fold_expr(&mut op.expr, changed),
        ast::Expr::BinOp(op) => {
            fold_expr(&mut op.left, changed);
            fold_expr(&mut op.right, changed);
        }
        ast::Expr::IfExpr(if_expr) => {
            fold_expr(&mut if_expr.test_expr, changed);
            fold_expr(&mut if_expr.true_expr, changed);
            if let Some(ref mut false_expr) = if_expr.false_expr {
                fold_expr(false_expr, changed);
            }
        }
        ast::Expr::Filter(filter) => {
            if let Some(ref mut inner) = filter.expr {
                fold_expr(inner, changed);
            }
            fold_call_args(&mut filter.args, changed);
        }
        ast::Expr::Test(test) => {
            fold_expr(&mut test.expr, changed);
            fold_call_args(&mut test.args, changed);
        }
        ast::Expr::GetAttr(attr) => fold_expr(&mut attr.expr, changed),
        ast::Expr::GetItem(item) => {
            fold_expr(&mut item.expr, changed);
            fold_expr(&mut item.subscript_expr, changed);
        }
        ast::Expr::Slice(slice) => {
            fold_expr(&mut slice.expr, changed);
            if let Some(part) = &mut slice.start {
                fold_expr(part, changed);
            }
            if let Some(part) = &mut slice.stop {
                fold_expr(part, changed);
            }
            if let Some(part) = &mut slice.step {
                fold_expr(part, changed);
            }
        }
        ast::Expr::Call(call) => fold_call_args(&mut call.args, changed),
        ast::Expr::List(list) => {
            for item in &mut list.items {
                fold_expr(item, changed);
            }
        }
        ast::Expr::Map(map) => {
            for key in &mut map.keys {
                fold_expr(key, changed);
            }
            for value in &mut map.values {
                fold_expr(value, changed);
            }
        }
        ast::Expr::Var(_) | ast::Expr::Const(_) => {}
    }

    // then try to replace this node with a constant
    let folded = match expr {
        ast::Expr::UnaryOp(op) => {
            let value = const_value(&op.expr);
            match (op.op, value) {
                (ast::UnaryOpKind::Not, Some(value)) => Some(Value::from(!value.is_true())),
                (ast::UnaryOpKind::Neg, Some(value)) => ops::neg(&value).ok(),
                _ => None,
            }
        }
        ast::Expr::BinOp(op) => {
            match (const_value(&op.left), const_value(&op.right)) {
                (Some(left), Some(right)) => fold_binop(op.op, &left, &right),
                _ => None,
            }
        }
        ast::Expr::List(list) => list.as_const(),
        ast::Expr::Map(map) => map.as_const(),
        _ => None,
    };
    if let Some(value) = folded {
        let span = expr.span();
        *expr = make_const(value, span);
        *changed = true;
        return;
    }

    // conditional expressions with a constant condition select a branch
    let selected = match expr {
        ast::Expr::IfExpr(if_expr) => const_value(&if_expr.test_expr).map(|cond| {
            if cond.is_true() {
                take_expr(&mut if_expr.true_expr)
            } else {
                match if_expr.false_expr {
                    Some(ref mut false_expr) => take_expr(false_expr),
                    None => make_const(Value::undefined(), if_expr.test_expr.span()),
                }
            }
        }),
        _ => None,
    };
    if let Some(selected) = selected {
        *expr = selected;
        *changed = true;
    }
}

fn fold_binop(op: ast::BinOpKind, left: &Value, right: &Value) -> Option<Value> {
    use ast::BinOpKind;

    let rv = match op {
        BinOpKind::Add => ops::add(left, right),
        BinOpKind::Sub => ops::sub(left, right),
        BinOpKind::Mul => ops::mul(left, right),
        BinOpKind::Div => ops::div(left, right),
        BinOpKind::FloorDiv => ops::int_div(left, right),
        BinOpKind::Rem => ops::rem(left, right),
        BinOpKind::Pow => ops::pow(left, right),
        BinOpKind::Concat => Ok(ops::string_concat(left, right)),
        BinOpKind::Eq => ops::eq_checked(left, right).map(Value::from),
        BinOpKind::Ne => ops::eq_checked(left, right).map(|rv| Value::from(!rv)),
        BinOpKind::Lt => ops::cmp_checked(left, right).map(|rv| Value::from(rv.is_lt())),
        BinOpKind::Lte => ops::cmp_checked(left, right).map(|rv| Value::from(rv.is_le())),
        BinOpKind::Gt => ops::cmp_checked(left, right).map(|rv| Value::from(rv.is_gt())),
        BinOpKind::Gte => ops::cmp_checked(left, right).map(|rv| Value::from(rv.is_ge())),
        BinOpKind::In => ops::contains(right, left),
        BinOpKind::ScAnd => {
            return Some(if left.is_true() {
                right.clone()
            } else {
                left.clone()
            })
        }
        BinOpKind::ScOr => {
            return Some(if left.is_true() {
                left.clone()
            } else {
                right.clone()
            })
        }
    };
    match rv {
        Ok(value) => Some(value),
        // a constant division by zero folds to none; the error resurfaces
        // when the value is used at runtime
        Err(err) if err.detail() == Some("division by zero") => Some(Value::from(())),
        // other folding errors are left in place so they are reported with
        // the template location at render time
        Err(_) => None,
    }
}

#[cfg(test)]
mod test_optimizer {
    use super::*;
    use crate::parser::parse;

    use similar_asserts::assert_eq;

    fn optimized(source: &str) -> Vec<ast::Stmt<'_>> {
        let mut body = parse(source, "<test>", Default::default(), Default::default()).unwrap();
        optimize(&mut body);
        body
    }

    #[test]
    fn test_const_fold() {
        let body = optimized("{{ 1 + 2 * 3 }}");
        assert_eq!(body.len(), 1);
        match &body[0] {
            ast::Stmt::EmitExpr(emit) => match &emit.expr {
                ast::Expr::Const(constant) => assert_eq!(constant.value, Value::from(7)),
                other => panic!("expected constant, got {other:?}"),
            },
            other => panic!("expected emit, got {other:?}"),
        }
    }

    #[test]
    fn test_if_elimination_merges_output() {
        let body = optimized("a{% if false %}x{% else %}b{% endif %}c");
        assert_eq!(body.len(), 1);
        match &body[0] {
            ast::Stmt::EmitRaw(raw) => assert_eq!(&raw.raw as &str, "abc"),
            other => panic!("expected raw output, got {other:?}"),
        }
    }

    #[test]
    fn test_division_by_zero_folds_to_none() {
        let body = optimized("{{ 1 / 0 }}");
        match &body[0] {
            ast::Stmt::EmitExpr(emit) => match &emit.expr {
                ast::Expr::Const(constant) => assert!(constant.value.is_none()),
                other => panic!("expected constant, got {other:?}"),
            },
            other => panic!("expected emit, got {other:?}"),
        }
    }

    #[test]
    fn test_overflow_left_for_runtime() {
        let src = format!("{{{{ {} + 1 }}}}", i64::MAX);
        let body = optimized(&src);
        match &body[0] {
            ast::Stmt::EmitExpr(emit) => {
                assert!(matches!(&emit.expr, ast::Expr::BinOp(_)));
            }
            other => panic!("expected emit, got {other:?}"),
        }
    }
}
