//! <div align=center>
//!   <p><strong>Tempera: a Jinja2 compatible template engine for Rust</strong></p>
//! </div>
//!
//! Tempera is a template engine for Rust which is based on the syntax and
//! behavior of the [Jinja2](https://jinja.palletsprojects.com/) template
//! engine for Python.  It's implemented on top of [`serde`] and renders
//! templates by walking a parsed and optimized syntax tree.  The goal is to
//! be able to render a large chunk of the Jinja2 template ecosystem from
//! Rust with a small engine.
//!
//! ```jinja
//! {% for user in users %}
//!   <li>{{ user.name }}</li>
//! {% endfor %}
//! ```
//!
//! # Template Usage
//!
//! To use Tempera one needs to create an [`Environment`] and populate it
//! with templates.  Afterwards templates can be loaded and rendered.  To
//! pass data one can pass any serde serializable value.  The [`context!`]
//! macro can be used to quickly construct a template context:
//!
//! ```
//! use tempera::{Environment, context};
//!
//! let mut env = Environment::new();
//! env.add_template("hello", "Hello {{ name }}!").unwrap();
//! let tmpl = env.get_template("hello").unwrap();
//! println!("{}", tmpl.render(context!(name => "John")).unwrap());
//! ```
//!
//! ```plain
//! Hello John!
//! ```
//!
//! # Expression Usage
//!
//! Tempera — like Jinja2 — allows to be used as expression language.  This
//! can be useful to express logic in configuration files or similar things.
//! For this purpose the [`Environment::compile_expression`] method can be
//! used.  It returns an expression object that can then be evaluated,
//! returning the result:
//!
//! ```
//! use tempera::{Environment, context};
//!
//! let env = Environment::new();
//! let expr = env.compile_expression("number < 42").unwrap();
//! let result = expr.eval(context!(number => 23)).unwrap();
//! assert_eq!(result.is_true(), true);
//! ```
//!
//! # Custom Filters
//!
//! Tempera lets you register functions as filter functions (see
//! [`Filter`](crate::filters::Filter)) with the engine.  These can then be
//! invoked directly from the template:
//!
//! ```
//! use tempera::{Environment, State, Error, context};
//!
//! fn repeat(_state: &State, s: String, n: usize) -> Result<String, Error> {
//!     Ok(s.repeat(n))
//! }
//!
//! let mut env = Environment::new();
//! env.add_filter("repeat", repeat);
//! env.add_template("hello", "{{ 'Na '|repeat(3) }}{{ name }}!").unwrap();
//! let tmpl = env.get_template("hello").unwrap();
//! println!("{}", tmpl.render(context!(name => "Batman")).unwrap());
//! ```
//!
//! ```plain
//! Na Na Na Batman!
//! ```
//!
//! # Learn more
//!
//! - [`Environment`]: the main API entry point.  Teaches you how to configure
//!   the environment.
//! - [`Template`]: the template object API.  Shows you how templates can be
//!   rendered.
//! - [`filters`]: teaches you how to write custom filters and to see the
//!   list of built-in filters.
//! - [`tests`]: teaches you how to write custom test functions and to see
//!   the list of built-in tests.
//! - [`functions`]: teaches how to write custom functions and to see the
//!   list of built-in functions.
//!
//! # Error Handling
//!
//! Tempera tries to give you good errors out of the box.  However if you use
//! includes or template inheritance your experience will improve greatly if
//! you ensure to render chained errors.  For more information see [`Error`].
#![allow(clippy::cognitive_complexity)]

#[macro_use]
mod macros;

mod ast;
mod context;
mod defaults;
mod environment;
mod error;
mod eval;
mod expression;
mod lexer;
mod loader;
mod optimizer;
mod output;
mod parser;
mod syntax;
mod template;
mod utils;

pub mod filters;
pub mod functions;
pub mod tests;
pub mod value;

pub use self::defaults::default_auto_escape_callback;
pub use self::environment::Environment;
pub use self::error::{Error, ErrorKind};
pub use self::eval::{CancelToken, State};
pub use self::expression::Expression;
pub use self::loader::{path_loader, CacheStats, TemplateSource};
pub use self::output::Output;
pub use self::syntax::Syntax;
pub use self::template::Template;
pub use self::utils::{AutoEscape, HtmlEscape, UndefinedBehavior};

pub use self::macros::__context;
