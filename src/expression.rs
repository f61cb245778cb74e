use serde::Serialize;

use crate::ast;
use crate::environment::Environment;
use crate::error::Error;
use crate::eval;
use crate::value::Value;

/// A handle to a compiled expression.
///
/// An expression is created via the
/// [`compile_expression`](Environment::compile_expression) method.  It
/// provides two ways to evaluate the expression.  Either the
/// [`eval`](Expression::eval) method where a context is provided, or
/// [`eval_empty`](Expression::eval_empty) without one.
///
/// ```
/// # use tempera::{Environment, context};
/// let env = Environment::new();
/// let expr = env.compile_expression("number > 10 and number < 20").unwrap();
/// let result = expr.eval(context!(number => 15)).unwrap();
/// assert!(result.is_true());
/// ```
pub struct Expression<'env, 'source> {
    env: &'env Environment<'env>,
    expr: ast::Expr<'source>,
}

impl<'env, 'source> Expression<'env, 'source> {
    pub(crate) fn new(
        env: &'env Environment<'env>,
        expr: ast::Expr<'source>,
    ) -> Expression<'env, 'source> {
        Expression { env, expr }
    }

    /// Evaluates the expression with some context.
    ///
    /// The result of the expression is returned as [`Value`].
    pub fn eval<S: Serialize>(&self, ctx: S) -> Result<Value, Error> {
        eval::eval_expression(self.env, &self.expr, Value::from_serialize(&ctx))
    }

    /// Evaluates the expression with an empty context.
    pub fn eval_empty(&self) -> Result<Value, Error> {
        self.eval(())
    }
}
