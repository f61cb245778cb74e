use std::collections::{BTreeMap, BTreeSet};
use std::fmt;

use crate::environment::Environment;
use crate::error::{Error, ErrorKind};
use crate::eval::LoopState;
use crate::value::{Value, ValueMap};

pub(crate) type Locals = BTreeMap<String, Value>;

/// One level of the lexical scope chain.
#[derive(Default)]
pub(crate) struct Scope {
    pub(crate) locals: Locals,
    pub(crate) current_loop: Option<LoopState>,
}

impl Scope {
    pub fn new() -> Scope {
        Scope::default()
    }

    pub fn with_locals(locals: Locals) -> Scope {
        Scope {
            locals,
            current_loop: None,
        }
    }
}

/// The name resolver used during rendering.
///
/// A context carries the caller supplied base value, a stack of scopes (the
/// lexical parent chain: `with` blocks, loop bodies and macro frames push a
/// scope and pop it when they are done), the names exported at the template
/// top level, and the modules brought in by imports.
///
/// Lookup order is: innermost scope locals first, then the special `loop`
/// variable of the closest loop, then the base context, then the
/// environment globals.
pub(crate) struct Context<'env> {
    env: &'env Environment<'env>,
    base: Value,
    scopes: Vec<Scope>,
    exports: BTreeSet<String>,
    modules: BTreeMap<String, Value>,
    outer_depth: usize,
    recursion_limit: usize,
}

impl fmt::Debug for Context<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut m = f.debug_map();
        for scope in self.scopes.iter().rev() {
            for (key, value) in scope.locals.iter() {
                m.entry(key, value);
            }
        }
        m.finish()
    }
}

impl<'env> Context<'env> {
    /// Creates a context over a base value.
    pub fn new(env: &'env Environment<'env>, base: Value) -> Context<'env> {
        Context {
            env,
            base,
            scopes: vec![Scope::new()],
            exports: BTreeSet::new(),
            modules: BTreeMap::new(),
            outer_depth: 0,
            recursion_limit: env.recursion_limit(),
        }
    }

    #[inline(always)]
    pub fn env(&self) -> &'env Environment<'env> {
        self.env
    }

    /// Stores a variable in the innermost scope.
    ///
    /// Re-assignments reuse the existing key allocation.
    pub fn store(&mut self, key: &str, value: Value) {
        let top = self.scopes.last_mut().unwrap();
        if let Some(slot) = top.locals.get_mut(key) {
            *slot = value;
        } else {
            top.locals.insert(key.to_string(), value);
        }
    }

    /// Looks up a variable.
    pub fn load(&self, key: &str) -> Option<Value> {
        for scope in self.scopes.iter().rev() {
            if let Some(value) = scope.locals.get(key) {
                return Some(value.clone());
            }
            if let Some(ref l) = scope.current_loop {
                if l.with_loop_var && key == "loop" {
                    return Some(Value::from_object_arc(l.object.clone()));
                }
            }
        }

        if let Some(rv) = self.base.get_attr_fast(key) {
            return Some(rv);
        }

        self.env.get_global(key)
    }

    /// Pushes a new scope.
    pub fn push_scope(&mut self, scope: Scope) -> Result<(), Error> {
        ok!(self.check_depth());
        self.scopes.push(scope);
        Ok(())
    }

    /// Pops the innermost scope.
    #[track_caller]
    pub fn pop_scope(&mut self) -> Scope {
        self.scopes.pop().unwrap()
    }

    /// Returns the current innermost loop state.
    pub fn current_loop(&mut self) -> Option<&mut LoopState> {
        self.scopes
            .iter_mut()
            .rev()
            .filter_map(|x| x.current_loop.as_mut())
            .next()
    }

    /// Marks a name as exported for module imports.
    pub fn export(&mut self, name: &str) {
        if !self.exports.contains(name) {
            self.exports.insert(name.to_string());
        }
    }

    /// Collects the exported names into a module map.
    pub fn exports_to_module(&self) -> ValueMap {
        let mut rv = ValueMap::new();
        for name in &self.exports {
            if let Some(value) = self.load(name) {
                rv.insert(name.clone(), value);
            }
        }
        rv
    }

    /// Registers an imported module under the name of its template.
    pub fn set_module(&mut self, name: &str, module: Value) {
        self.modules.insert(name.to_string(), module);
    }

    /// Looks up an imported module by template name.
    pub fn get_module(&self, name: &str) -> Option<Value> {
        self.modules.get(name).cloned()
    }

    /// A snapshot of every visible variable, deep-copied.
    ///
    /// Used when values cross a template boundary (imports, includes
    /// without context and macro closures).
    pub fn snapshot_visible_vars(&self) -> ValueMap {
        let mut rv = ValueMap::new();
        for scope in self.scopes.iter().rev() {
            for (key, value) in scope.locals.iter() {
                if !rv.contains_key(key) {
                    rv.insert(key.clone(), value.deep_copy());
                }
            }
        }
        rv
    }

    /// The base value the caller supplied.
    pub fn base(&self) -> &Value {
        &self.base
    }

    /// True while no derived scope is active; top level statements of a
    /// template see this as true.
    pub fn at_root(&self) -> bool {
        self.scopes.len() == 1
    }

    /// The real depth of the context.
    pub fn depth(&self) -> usize {
        self.outer_depth + self.scopes.len()
    }

    /// Increases the depth cost beyond plain scopes (includes, macro
    /// calls and inheritance all count extra).
    pub fn incr_depth(&mut self, delta: usize) -> Result<(), Error> {
        self.outer_depth += delta;
        self.check_depth()
    }

    /// Decreases the depth cost.
    pub fn decr_depth(&mut self, delta: usize) {
        self.outer_depth -= delta;
    }

    fn check_depth(&self) -> Result<(), Error> {
        if self.depth() > self.recursion_limit {
            return Err(Error::new(
                ErrorKind::Recursion,
                "recursion limit exceeded",
            ));
        }
        Ok(())
    }
}
