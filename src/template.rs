use std::fmt;
use std::sync::Arc;

use serde::Serialize;

use crate::ast;
use crate::environment::Environment;
use crate::error::Error;
use crate::eval::{self, CancelToken};
use crate::lexer::WhitespaceConfig;
use crate::loader::LoadedTemplate;
use crate::optimizer;
use crate::output::Output;
use crate::parser::parse;
use crate::syntax::SyntaxConfig;
use crate::utils::AutoEscape;
use crate::value::Value;

/// The shared settings templates are parsed with.
#[derive(Debug, Clone)]
pub(crate) struct TemplateConfig {
    pub syntax_config: SyntaxConfig,
    pub ws_config: WhitespaceConfig,
    pub optimized: bool,
}

impl TemplateConfig {
    pub fn new() -> TemplateConfig {
        TemplateConfig {
            syntax_config: SyntaxConfig::default(),
            ws_config: WhitespaceConfig::default(),
            optimized: true,
        }
    }
}

/// Represents a parsed template in memory.
pub(crate) struct CompiledTemplate<'source> {
    pub name: &'source str,
    pub source: &'source str,
    pub body: Vec<ast::Stmt<'source>>,
}

impl fmt::Debug for CompiledTemplate<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CompiledTemplate")
            .field("name", &self.name)
            .finish()
    }
}

impl<'source> CompiledTemplate<'source> {
    pub(crate) fn new(
        name: &'source str,
        source: &'source str,
        config: &TemplateConfig,
    ) -> Result<CompiledTemplate<'source>, Error> {
        let mut body = ok!(parse(
            source,
            name,
            config.syntax_config.clone(),
            config.ws_config
        ));
        if config.optimized {
            optimizer::optimize(&mut body);
        }
        Ok(CompiledTemplate { name, source, body })
    }
}

/// Represents a handle to a template.
///
/// Templates are stored in the [`Environment`] as parsed syntax trees.  With
/// the [`Environment::get_template`] method one is looked up and returned in
/// form of this handle.  The handle is cheap to clone as the parsed template
/// is shared.
///
/// To render the [`render`](Template::render) method can be used.
#[derive(Clone)]
pub struct Template<'env> {
    env: &'env Environment<'env>,
    compiled: Arc<LoadedTemplate>,
    initial_auto_escape: AutoEscape,
}

impl fmt::Debug for Template<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Template")
            .field("name", &self.name())
            .field("initial_auto_escape", &self.initial_auto_escape)
            .finish()
    }
}

impl<'env> Template<'env> {
    pub(crate) fn new(
        env: &'env Environment<'env>,
        compiled: Arc<LoadedTemplate>,
        initial_auto_escape: AutoEscape,
    ) -> Template<'env> {
        Template {
            env,
            compiled,
            initial_auto_escape,
        }
    }

    /// Returns the name of the template.
    pub fn name(&self) -> &str {
        self.compiled.borrow_dependent().name
    }

    /// Returns the source code of the template.
    pub fn source(&self) -> &str {
        self.compiled.borrow_dependent().source
    }

    /// Renders the template into a string.
    ///
    /// The provided value is used as the initial context for the template.
    /// It can be any object that implements [`Serialize`](serde::Serialize).
    /// You can either create your own struct and derive `Serialize` for it or
    /// the [`context!`](crate::context) macro can be used to create an
    /// ad-hoc context.
    ///
    /// ```
    /// # use tempera::{Environment, context};
    /// # let mut env = Environment::new();
    /// # env.add_template("hello", "Hello {{ name }}!").unwrap();
    /// let tmpl = env.get_template("hello").unwrap();
    /// println!("{}", tmpl.render(context!(name => "John")).unwrap());
    /// ```
    pub fn render<S: Serialize>(&self, ctx: S) -> Result<String, Error> {
        // reduce the total amount of code falling under monomorphization into
        // this function, and share the rest
        self._render(Value::from_serialize(&ctx), None)
    }

    /// Renders the template with a cancellation token.
    ///
    /// The token is checked between statements and on every loop iteration;
    /// when it fires the render aborts with a
    /// [`Cancelled`](crate::ErrorKind::Cancelled) error.
    pub fn render_cancellable<S: Serialize>(
        &self,
        ctx: S,
        cancel: &CancelToken,
    ) -> Result<String, Error> {
        self._render(Value::from_serialize(&ctx), Some(cancel.clone()))
    }

    fn _render(&self, root: Value, cancel: Option<CancelToken>) -> Result<String, Error> {
        let mut rv = String::new();
        let mut out = Output::with_string(&mut rv);
        ok!(eval::render_template(
            self.env,
            self.compiled.clone(),
            root,
            self.initial_auto_escape,
            cancel,
            &mut out,
        ));
        Ok(rv)
    }
}
