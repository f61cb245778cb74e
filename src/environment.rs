use std::borrow::Cow;
use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;

use serde::Serialize;

use crate::defaults;
use crate::error::{Error, ErrorKind};
use crate::eval::State;
use crate::expression::Expression;
use crate::filters::{BoxedFilter, Filter};
use crate::functions::{BoxedFunction, Function};
use crate::loader::{CacheStats, LoadedTemplate, TemplateSource, TemplateStore};
use crate::parser::parse_expr;
use crate::syntax::Syntax;
use crate::template::Template;
use crate::tests::{BoxedTest, Test};
use crate::utils::{AutoEscape, UndefinedBehavior};
use crate::value::{ArgType, FunctionArgs, Value};

type AutoEscapeFunc = dyn Fn(&str) -> AutoEscape + Sync + Send;

/// The maximum recursion during rendering.
///
/// Every scope, include, macro call and inheritance level counts against
/// this limit.
const MAX_RECURSION: usize = 500;

/// An abstraction that holds the engine configuration.
///
/// This object holds the central configuration state for templates.  It is
/// also the container for all loaded templates.
///
/// There are generally two ways to construct an environment:
///
/// * [`Environment::new`] creates an environment preconfigured with sensible
///   defaults.  It will contain all built-in filters, tests and globals as
///   well as a callback for auto escaping based on file extension.
/// * [`Environment::empty`] creates a completely blank environment.
pub struct Environment<'source> {
    templates: TemplateStore,
    filters: BTreeMap<Cow<'source, str>, BoxedFilter>,
    tests: BTreeMap<Cow<'source, str>, BoxedTest>,
    globals: BTreeMap<Cow<'source, str>, Value>,
    auto_escape_callback: Arc<AutoEscapeFunc>,
    undefined_behavior: UndefinedBehavior,
    newline_sequence: Cow<'static, str>,
    use_builtins: bool,
    sandboxed: bool,
    async_enabled: bool,
    recursion_limit: usize,
}

impl Default for Environment<'_> {
    fn default() -> Self {
        Environment::empty()
    }
}

impl fmt::Debug for Environment<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Environment")
            .field("globals", &self.globals)
            .field("templates", &self.templates)
            .finish()
    }
}

impl<'source> Environment<'source> {
    /// Creates a new environment with sensible defaults.
    ///
    /// This environment does not yet contain any templates but it will have
    /// all the default filters, tests and globals loaded.  If you do not
    /// want any default configuration you can use the alternative
    /// [`empty`](Environment::empty) method.
    pub fn new() -> Environment<'source> {
        Environment {
            templates: TemplateStore::new(crate::template::TemplateConfig::new()),
            filters: BTreeMap::new(),
            tests: BTreeMap::new(),
            globals: defaults::get_globals(),
            auto_escape_callback: Arc::new(defaults::default_auto_escape_callback),
            undefined_behavior: UndefinedBehavior::default(),
            newline_sequence: Cow::Borrowed("\n"),
            use_builtins: true,
            sandboxed: false,
            async_enabled: false,
            recursion_limit: MAX_RECURSION,
        }
    }

    /// Creates a completely empty environment.
    ///
    /// This environment has no filters, no templates, no globals and no
    /// default logic for auto escaping configured.
    pub fn empty() -> Environment<'source> {
        Environment {
            templates: TemplateStore::new(crate::template::TemplateConfig::new()),
            filters: BTreeMap::new(),
            tests: BTreeMap::new(),
            globals: BTreeMap::new(),
            auto_escape_callback: Arc::new(defaults::no_auto_escape),
            undefined_behavior: UndefinedBehavior::default(),
            newline_sequence: Cow::Borrowed("\n"),
            use_builtins: false,
            sandboxed: false,
            async_enabled: false,
            recursion_limit: MAX_RECURSION,
        }
    }

    /// Loads a template from a string into the environment.
    ///
    /// The `name` parameter defines the name of the template which identifies
    /// it.  To look up a loaded template use the
    /// [`get_template`](Self::get_template) method.
    ///
    /// ```
    /// # use tempera::Environment;
    /// let mut env = Environment::new();
    /// env.add_template("index.html", "Hello {{ name }}!").unwrap();
    /// ```
    ///
    /// This method fails if the template has a syntax error.
    pub fn add_template(&mut self, name: &str, source: &str) -> Result<(), Error> {
        self.templates.insert(name, source)
    }

    /// Removes a template by name.
    pub fn remove_template(&mut self, name: &str) {
        self.templates.remove(name);
    }

    /// Removes all stored templates.
    ///
    /// This method is mainly useful when combined with a loader as it causes
    /// the loader to "reload" templates.  By calling this method one can
    /// trigger a reload.
    pub fn clear_templates(&mut self) {
        self.templates.clear();
    }

    /// Register a template loader as source of templates.
    ///
    /// When a template loader is registered, the environment gains the
    /// ability to dynamically load templates.  The loader is invoked with the
    /// name of the template.  If this template exists
    /// `Ok(Some(template_source))` has to be returned, otherwise `Ok(None)`.
    /// Loaded templates are cached in a bounded LRU cache keyed by template
    /// name, see [`set_cache_size`](Self::set_cache_size).
    ///
    /// For loading templates from the file system, you can use the
    /// [`path_loader`](crate::path_loader) function.
    pub fn set_loader<F, S>(&mut self, f: F)
    where
        F: for<'a> Fn(&'a str) -> Result<Option<S>, Error> + Send + Sync + 'static,
        S: Into<TemplateSource>,
    {
        self.templates
            .set_loader(move |name| f(name).map(|rv| rv.map(Into::into)));
    }

    /// Sets the size of the template cache used for loader templates.
    ///
    /// The default is 50.  Setting the size to 0 disables caching: every
    /// lookup goes back to the loader.
    pub fn set_cache_size(&mut self, size: usize) {
        self.templates.set_cache_size(size);
    }

    /// Returns the size of the template cache.
    pub fn cache_size(&self) -> usize {
        self.templates.cache_size()
    }

    /// Enables or disables automatic template reloading.
    ///
    /// When enabled, cached loader templates are validated against their
    /// freshness token on every [`get_template`](Self::get_template) and
    /// reloaded when stale.
    pub fn set_auto_reload(&mut self, yes: bool) {
        self.templates.set_auto_reload(yes);
    }

    /// Returns the auto reload flag.
    pub fn auto_reload(&self) -> bool {
        self.templates.auto_reload()
    }

    /// Returns statistics of the template cache.
    pub fn cache_stats(&self) -> CacheStats {
        self.templates.stats()
    }

    /// Sets the template delimiter syntax.
    pub fn set_syntax(&mut self, syntax: Syntax) -> Result<(), Error> {
        self.templates.template_config.syntax_config = ok!(syntax.compile());
        Ok(())
    }

    /// Preserve the trailing newline when rendering templates.
    ///
    /// The default is `false`, which causes a single newline, if present, to
    /// be stripped from the end of the template.
    pub fn set_keep_trailing_newline(&mut self, yes: bool) {
        self.templates.template_config.ws_config.keep_trailing_newline = yes;
    }

    /// Returns the value of the trailing newline preservation flag.
    pub fn keep_trailing_newline(&self) -> bool {
        self.templates.template_config.ws_config.keep_trailing_newline
    }

    /// Remove the first newline after a block.
    ///
    /// If this is set to `true` then the first newline after a block is
    /// removed (block, not variable tag!). Defaults to `false`.
    pub fn set_trim_blocks(&mut self, yes: bool) {
        self.templates.template_config.ws_config.trim_blocks = yes;
    }

    /// Returns the value of the trim blocks flag.
    pub fn trim_blocks(&self) -> bool {
        self.templates.template_config.ws_config.trim_blocks
    }

    /// Remove leading spaces and tabs from the start of a line to a block.
    ///
    /// If this is set to `true` then leading spaces and tabs from the start
    /// of a line to the block tag are removed.
    pub fn set_lstrip_blocks(&mut self, yes: bool) {
        self.templates.template_config.ws_config.lstrip_blocks = yes;
    }

    /// Returns the value of the lstrip blocks flag.
    pub fn lstrip_blocks(&self) -> bool {
        self.templates.template_config.ws_config.lstrip_blocks
    }

    /// Sets the newline sequence used by filters that generate newlines.
    ///
    /// The default is `"\n"`.
    pub fn set_newline_sequence(&mut self, seq: impl Into<Cow<'static, str>>) {
        self.newline_sequence = seq.into();
    }

    /// Returns the newline sequence.
    pub fn newline_sequence(&self) -> &str {
        &self.newline_sequence
    }

    /// Enables or disables the optimizer.
    ///
    /// The optimizer folds constant expressions, removes dead branches and
    /// merges adjacent raw output.  It is enabled by default and only
    /// affects templates loaded afterwards.
    pub fn set_optimized(&mut self, yes: bool) {
        self.templates.template_config.optimized = yes;
    }

    /// Returns true if the optimizer is enabled.
    pub fn optimized(&self) -> bool {
        self.templates.template_config.optimized
    }

    /// Sets a new function to select the default auto escaping.
    ///
    /// This function is invoked with the name of the template to determine
    /// the initial auto escaping behavior.  The default implementation
    /// ([`default_auto_escape_callback`](crate::default_auto_escape_callback))
    /// turn on escaping for templates ending in `.html`, `.htm` and `.xml`.
    pub fn set_auto_escape_callback<F>(&mut self, f: F)
    where
        F: Fn(&str) -> AutoEscape + Send + Sync + 'static,
    {
        self.auto_escape_callback = Arc::new(f);
    }

    /// Turns auto escaping on or off for all templates.
    ///
    /// This is a convenience wrapper around
    /// [`set_auto_escape_callback`](Self::set_auto_escape_callback) for the
    /// common case where escaping does not depend on the template name.
    pub fn set_auto_escape(&mut self, yes: bool) {
        self.set_auto_escape_callback(move |_| {
            if yes {
                AutoEscape::Html
            } else {
                AutoEscape::None
            }
        });
    }

    /// Changes the undefined behavior.
    ///
    /// This changes the runtime behavior of undefined values in the template
    /// engine.  For more information see [`UndefinedBehavior`].  The default
    /// is [`UndefinedBehavior::Lenient`].
    pub fn set_undefined_behavior(&mut self, behavior: UndefinedBehavior) {
        self.undefined_behavior = behavior;
    }

    /// Returns the current undefined behavior.
    pub fn undefined_behavior(&self) -> UndefinedBehavior {
        self.undefined_behavior
    }

    /// Puts the environment into sandboxed mode.
    ///
    /// In sandboxed mode callables flagged as unsafe or as altering data
    /// refuse to run with a [`SecurityError`](crate::ErrorKind::SecurityError).
    pub fn set_sandboxed(&mut self, yes: bool) {
        self.sandboxed = yes;
    }

    /// Returns true if the environment is sandboxed.
    pub fn sandboxed(&self) -> bool {
        self.sandboxed
    }

    /// Enables support for async result values.
    ///
    /// When enabled, completed [`AsyncResult`](crate::value::AsyncResult)
    /// values resolve to their inner value at expression boundaries.  When
    /// disabled any async result value used in an expression is an error.
    pub fn set_async_enabled(&mut self, yes: bool) {
        self.async_enabled = yes;
    }

    /// Returns true if async result values are resolved.
    pub fn async_enabled(&self) -> bool {
        self.async_enabled
    }

    /// Reconfigures the runtime recursion limit.
    pub fn set_recursion_limit(&mut self, limit: usize) {
        self.recursion_limit = limit;
    }

    /// Returns the runtime recursion limit.
    pub fn recursion_limit(&self) -> usize {
        self.recursion_limit
    }

    /// Fetches a template by name.
    ///
    /// This requires that the template has been loaded with
    /// [`add_template`](Environment::add_template) beforehand.  If the
    /// template was not loaded an error of kind `TemplateNotFound` is
    /// returned.  If a loader was added to the engine this can also
    /// dynamically load templates.
    ///
    /// ```
    /// # use tempera::{Environment, context};
    /// let mut env = Environment::new();
    /// env.add_template("hello.txt", "Hello {{ name }}!").unwrap();
    /// let tmpl = env.get_template("hello.txt").unwrap();
    /// println!("{}", tmpl.render(context!{ name => "World" }).unwrap());
    /// ```
    pub fn get_template(&self, name: &str) -> Result<Template<'_>, Error> {
        let compiled = ok!(self.templates.get(name));
        let auto_escape = self.initial_auto_escape(name);
        Ok(Template::new(self, compiled, auto_escape))
    }

    /// Loads a template from a string with the given name.
    ///
    /// In some cases you really only need to work with (eg: render) a
    /// template to be rendered once only.
    pub fn template_from_named_str(
        &self,
        name: &str,
        source: &str,
    ) -> Result<Template<'_>, Error> {
        let compiled = ok!(self
            .templates
            .compile(name.into(), source.to_string()));
        let auto_escape = self.initial_auto_escape(name);
        Ok(Template::new(self, compiled, auto_escape))
    }

    /// Loads a template from a string, with name `<string>`.
    ///
    /// This is a shortcut to
    /// [`template_from_named_str`](Self::template_from_named_str) with name
    /// set to `<string>`.
    pub fn template_from_str(&self, source: &str) -> Result<Template<'_>, Error> {
        self.template_from_named_str("<string>", source)
    }

    /// Parses and renders a template from a string in one go with a name.
    ///
    /// Like [`render_str`](Self::render_str), but provide a name for the
    /// template to be used instead of the default `<string>`.
    pub fn render_named_str<S: Serialize>(
        &self,
        name: &str,
        source: &str,
        ctx: S,
    ) -> Result<String, Error> {
        ok!(self.template_from_named_str(name, source)).render(ctx)
    }

    /// Parses and renders a template from a string in one go.
    ///
    /// In some cases you really only need a template to be rendered once from
    /// a string and returned.  The internal name of the template is
    /// `<string>`.
    ///
    /// ```
    /// # use tempera::{Environment, context};
    /// let env = Environment::new();
    /// let rv = env.render_str("Hello {{ name }}", context! { name => "World" });
    /// println!("{}", rv.unwrap());
    /// ```
    pub fn render_str<S: Serialize>(&self, source: &str, ctx: S) -> Result<String, Error> {
        self.render_named_str("<string>", source, ctx)
    }

    /// Returns an iterator over the explicitly added templates and their
    /// names.
    pub fn templates(&self) -> impl Iterator<Item = (&str, Template<'_>)> {
        self.templates.iter_persistent().map(|(name, compiled)| {
            let auto_escape = self.initial_auto_escape(name);
            (name, Template::new(self, compiled.clone(), auto_escape))
        })
    }

    /// Compiles an expression.
    ///
    /// This lets one compile an expression in the template language and
    /// evaluate it against a context.
    ///
    /// ```
    /// # use tempera::{Environment, context};
    /// let env = Environment::new();
    /// let expr = env.compile_expression("number < 42").unwrap();
    /// let result = expr.eval(context!(number => 23)).unwrap();
    /// assert_eq!(result.is_true(), true);
    /// ```
    pub fn compile_expression(&self, expr: &'source str) -> Result<Expression<'_, 'source>, Error> {
        let ast = ok!(parse_expr(expr));
        Ok(Expression::new(self, ast))
    }

    /// Adds a new filter function.
    ///
    /// Filter functions are functions that can be applied to values in
    /// templates.  For details about filters have a look at
    /// [`Filter`](crate::filters::Filter).
    pub fn add_filter<N, F, V, Rv, Args>(&mut self, name: N, f: F)
    where
        N: Into<Cow<'source, str>>,
        F: Filter<V, Rv, Args> + 'static,
        V: ArgType,
        Rv: Into<Value>,
        Args: FunctionArgs,
    {
        self.filters.insert(name.into(), BoxedFilter::new(f));
    }

    /// Removes a filter by name.
    pub fn remove_filter(&mut self, name: &str) {
        self.filters.remove(name);
    }

    /// Adds a new test function.
    ///
    /// Test functions are similar to filters but perform a check on a value
    /// where the return value is always true or false.  For details about
    /// tests have a look at [`Test`](crate::tests::Test).
    pub fn add_test<N, F, V, Args>(&mut self, name: N, f: F)
    where
        N: Into<Cow<'source, str>>,
        F: Test<V, Args> + 'static,
        V: ArgType,
        Args: FunctionArgs,
    {
        self.tests.insert(name.into(), BoxedTest::new(f));
    }

    /// Removes a test by name.
    pub fn remove_test(&mut self, name: &str) {
        self.tests.remove(name);
    }

    /// Adds a new global function.
    ///
    /// For details about functions have a look at
    /// [`Function`](crate::functions::Function).
    pub fn add_function<N, F, Rv, Args>(&mut self, name: N, f: F)
    where
        N: Into<Cow<'source, str>>,
        F: Function<Rv, Args> + 'static,
        Rv: Into<Value>,
        Args: FunctionArgs,
    {
        let name = name.into();
        let value = BoxedFunction::new(&name, f).to_value();
        self.globals.insert(name, value);
    }

    /// Adds a global variable.
    pub fn add_global<N, V>(&mut self, name: N, value: V)
    where
        N: Into<Cow<'source, str>>,
        V: Into<Value>,
    {
        self.globals.insert(name.into(), value.into());
    }

    /// Removes a global variable.
    pub fn remove_global(&mut self, name: &str) {
        self.globals.remove(name);
    }

    /// Looks up a global variable.
    pub fn get_global(&self, name: &str) -> Option<Value> {
        self.globals.get(name).cloned()
    }

    /// Applies a filter by name.
    ///
    /// User registered filters shadow built-ins of the same name; built-ins
    /// dispatch through a compile-time name table.
    pub(crate) fn apply_filter(
        &self,
        name: &str,
        state: &State,
        value: Value,
        args: Vec<Value>,
    ) -> Result<Value, Error> {
        if let Some(filter) = self.filters.get(name) {
            return filter.apply_to(state, value, args);
        }
        if self.use_builtins {
            if let Some(rv) = defaults::apply_builtin_filter(name, state, value, args) {
                return rv;
            }
        }
        Err(Error::new(
            ErrorKind::UnknownFilter,
            format!("filter {name} is unknown"),
        ))
    }

    /// Performs a test by name.
    pub(crate) fn perform_test(
        &self,
        name: &str,
        state: &State,
        value: Value,
        args: Vec<Value>,
    ) -> Result<bool, Error> {
        if let Some(test) = self.tests.get(name) {
            return test.perform(state, value, args);
        }
        if self.use_builtins {
            if let Some(rv) = defaults::perform_builtin_test(name, state, value, args) {
                return rv;
            }
        }
        Err(Error::new(
            ErrorKind::UnknownTest,
            format!("test {name} is unknown"),
        ))
    }

    /// Checks if a filter with the given name exists.
    pub fn has_filter(&self, name: &str) -> bool {
        self.filters.contains_key(name)
            || (self.use_builtins && defaults::is_builtin_filter(name))
    }

    /// Checks if a test with the given name exists.
    pub fn has_test(&self, name: &str) -> bool {
        self.tests.contains_key(name) || (self.use_builtins && defaults::is_builtin_test(name))
    }

    pub(crate) fn initial_auto_escape(&self, name: &str) -> AutoEscape {
        (self.auto_escape_callback)(name)
    }

    pub(crate) fn get_template_arc(&self, name: &str) -> Result<Arc<LoadedTemplate>, Error> {
        self.templates.get(name)
    }
}
