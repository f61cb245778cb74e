use std::cell::RefCell;
use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use std::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use crate::ast::{self, CallType};
use crate::context::{Context, Scope};
use crate::environment::Environment;
use crate::error::{Error, ErrorKind};
use crate::loader::LoadedTemplate;
use crate::output::{CaptureMode, Output};
use crate::template::CompiledTemplate;
use crate::utils::{AutoEscape, HtmlEscape, UndefinedBehavior};
use crate::value::{
    ops, Callable, CallableKind, Kwargs, MacroData, Object, Value, ValueMap, ValueRepr,
};

// the cost of a single include against the recursion limit.
const INCLUDE_RECURSION_COST: usize = 10;

// the cost of a single macro call against the recursion limit.
const MACRO_RECURSION_COST: usize = 4;

/// Every render gets a fresh id.  Macro values remember the id of the render
/// they were created in; calling them from a different render fails instead
/// of indexing into a foreign macro table.
static STATE_ID: AtomicU64 = AtomicU64::new(0);

/// A cooperative cancellation token.
///
/// Hand a clone of the token to
/// [`render_cancellable`](crate::Template::render_cancellable) and call
/// [`cancel`](CancelToken::cancel) from another thread to abort the render
/// between statements or loop iterations.
#[derive(Debug, Clone, Default)]
pub struct CancelToken(Arc<AtomicBool>);

impl CancelToken {
    /// Creates a new token in the not-cancelled state.
    pub fn new() -> CancelToken {
        CancelToken::default()
    }

    /// Signals cancellation.
    pub fn cancel(&self) {
        self.0.store(true, Ordering::Relaxed);
    }

    /// Returns true if the token fired.
    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::Relaxed)
    }
}

/// Keeps templates loaded during a render alive.
///
/// The template store hands out reference counted templates, but the
/// evaluator borrows syntax trees from every template of an inheritance or
/// include chain at once.  This holder owns the arcs for the duration of
/// the render so those borrows can share the render lifetime.
#[derive(Default)]
pub(crate) struct TemplateHold {
    held: RefCell<Vec<Arc<LoadedTemplate>>>,
}

impl TemplateHold {
    pub(crate) fn hold<'a>(&'a self, template: Arc<LoadedTemplate>) -> &'a CompiledTemplate<'a> {
        let ptr = template.borrow_dependent() as *const CompiledTemplate<'_>
            as *const CompiledTemplate<'a>;
        self.held.borrow_mut().push(template);
        // SAFETY: the arc is stored in `held` until the holder drops, which
        // outlives 'a; the compiled template is heap allocated inside the
        // arc and never moves; `CompiledTemplate` is covariant over its
        // source lifetime.
        unsafe { &*ptr }
    }
}

/// The `loop` variable exposed inside for loops.
pub(crate) struct LoopObject {
    len: usize,
    idx: AtomicUsize,
    depth: usize,
    items: Vec<Value>,
    last_changed_value: Mutex<Option<Vec<Value>>>,
}

impl fmt::Debug for LoopObject {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut s = f.debug_struct("Loop");
        for attr in self.fields() {
            s.field(attr, &self.get_field(attr).unwrap());
        }
        s.finish()
    }
}

impl fmt::Display for LoopObject {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "<loop {}/{}>",
            self.idx.load(Ordering::Relaxed),
            self.len
        )
    }
}

impl Object for LoopObject {
    fn type_name(&self) -> &'static str {
        "loop"
    }

    fn fields(&self) -> Vec<&'static str> {
        vec![
            "index0",
            "index",
            "length",
            "revindex",
            "revindex0",
            "first",
            "last",
            "depth",
            "depth0",
            "previtem",
            "nextitem",
        ]
    }

    fn get_field(&self, name: &str) -> Option<Value> {
        let idx = self.idx.load(Ordering::Relaxed);
        let len = self.len;
        match name {
            "index0" => Some(Value::from(idx)),
            "index" => Some(Value::from(idx + 1)),
            "length" => Some(Value::from(len)),
            "revindex" => Some(Value::from(len.saturating_sub(idx))),
            "revindex0" => Some(Value::from(len.saturating_sub(idx).saturating_sub(1))),
            "first" => Some(Value::from(idx == 0)),
            "last" => Some(Value::from(len == 0 || idx == len - 1)),
            "depth" => Some(Value::from(self.depth + 1)),
            "depth0" => Some(Value::from(self.depth)),
            "previtem" => Some(if idx == 0 {
                Value::undefined()
            } else {
                self.items
                    .get(idx - 1)
                    .cloned()
                    .unwrap_or_else(Value::undefined)
            }),
            "nextitem" => Some(
                self.items
                    .get(idx + 1)
                    .cloned()
                    .unwrap_or_else(Value::undefined),
            ),
            _ => None,
        }
    }

    fn call(&self, _state: &State, _args: &[Value]) -> Result<Value, Error> {
        Err(Error::new(
            ErrorKind::TypeError,
            "loop cannot be called if reassigned to different variable",
        ))
    }

    fn call_method(&self, _state: &State, name: &str, args: &[Value]) -> Result<Value, Error> {
        if name == "changed" {
            let mut last_changed_value = self.last_changed_value.lock().unwrap();
            let value = args.to_owned();
            let changed = last_changed_value.as_ref() != Some(&value);
            if changed {
                *last_changed_value = Some(value);
                Ok(Value::from(true))
            } else {
                Ok(Value::from(false))
            }
        } else if name == "cycle" {
            if args.is_empty() {
                return Err(Error::new(
                    ErrorKind::InvalidArgument,
                    "cycle requires at least one argument",
                ));
            }
            let idx = self.idx.load(Ordering::Relaxed);
            Ok(args[idx % args.len()].clone())
        } else {
            Err(Error::new(
                ErrorKind::TypeError,
                format!("loop object has no method named {name}"),
            ))
        }
    }

    fn iter_items(&self) -> Option<Vec<Value>> {
        None
    }
}

/// The loop bookkeeping stored in a context scope.
pub(crate) struct LoopState {
    pub with_loop_var: bool,
    pub object: Arc<LoopObject>,
}

/// One stack of block bodies for a block name, most derived template first.
pub(crate) struct BlockStack<'template> {
    layers: Vec<&'template [ast::Stmt<'template>]>,
}

impl<'template> BlockStack<'template> {
    fn new(body: &'template [ast::Stmt<'template>]) -> BlockStack<'template> {
        BlockStack { layers: vec![body] }
    }

    fn append(&mut self, body: &'template [ast::Stmt<'template>]) {
        self.layers.push(body);
    }

    fn get(&self, idx: usize) -> Option<&'template [ast::Stmt<'template>]> {
        self.layers.get(idx).copied()
    }
}

/// Provides access to the current execution state of the engine.
///
/// A read only reference is passed to filter functions and similar objects
/// to allow limited interfacing with the engine.  The state is useful to
/// look up information about the engine in filter, test or global
/// functions.  It not only provides access to the template environment but
/// also the context variables of the engine and the current auto escaping
/// behavior.
pub struct State<'template, 'env> {
    pub(crate) ctx: Context<'env>,
    pub(crate) auto_escape: AutoEscape,
    pub(crate) name: &'template str,
    pub(crate) current_block: Option<(&'template str, usize)>,
    pub(crate) blocks: BTreeMap<&'template str, BlockStack<'template>>,
    pub(crate) macros: Vec<&'template ast::Macro<'template>>,
    pub(crate) recursive_loops: Vec<(&'template ast::ForLoop<'template>, usize)>,
    pub(crate) id: u64,
    pub(crate) cancel: Option<CancelToken>,
    pub(crate) loaded: &'template TemplateHold,
    pub(crate) loaded_names: BTreeSet<String>,
    pub(crate) pending_parent: Option<String>,
}

impl fmt::Debug for State<'_, '_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("State")
            .field("name", &self.name)
            .field("current_block", &self.current_block.map(|x| x.0))
            .field("auto_escape", &self.auto_escape)
            .field("ctx", &self.ctx)
            .finish()
    }
}

impl<'template, 'env> State<'template, 'env> {
    fn new(
        ctx: Context<'env>,
        auto_escape: AutoEscape,
        name: &'template str,
        loaded: &'template TemplateHold,
        cancel: Option<CancelToken>,
    ) -> State<'template, 'env> {
        State {
            ctx,
            auto_escape,
            name,
            current_block: None,
            blocks: BTreeMap::new(),
            macros: Vec::new(),
            recursive_loops: Vec::new(),
            id: STATE_ID.fetch_add(1, Ordering::Relaxed),
            cancel,
            loaded,
            loaded_names: BTreeSet::new(),
            pending_parent: None,
        }
    }

    /// Returns a reference to the current environment.
    #[inline(always)]
    pub fn env(&self) -> &'env Environment<'env> {
        self.ctx.env()
    }

    /// Returns the name of the current template.
    pub fn name(&self) -> &str {
        self.name
    }

    /// Returns the current value of the auto escape flag.
    #[inline(always)]
    pub fn auto_escape(&self) -> AutoEscape {
        self.auto_escape
    }

    /// Returns the current undefined behavior.
    #[inline(always)]
    pub fn undefined_behavior(&self) -> UndefinedBehavior {
        self.env().undefined_behavior()
    }

    /// Returns the name of the innermost block.
    pub fn current_block(&self) -> Option<&str> {
        self.current_block.map(|x| x.0)
    }

    /// Looks up a variable by name in the context.
    #[inline(always)]
    pub fn lookup(&self, name: &str) -> Option<Value> {
        self.ctx.load(name)
    }

    /// Applies a filter by name to a value.
    pub fn apply_filter(&self, name: &str, value: Value, args: Vec<Value>) -> Result<Value, Error> {
        self.env().apply_filter(name, self, value, args)
    }

    /// Performs a test by name on a value.
    pub fn perform_test(&self, name: &str, value: Value, args: Vec<Value>) -> Result<bool, Error> {
        self.env().perform_test(name, self, value, args)
    }

    fn check_cancelled(&self) -> Result<(), Error> {
        match self.cancel {
            Some(ref token) if token.is_cancelled() => Err(Error::from(ErrorKind::Cancelled)),
            _ => Ok(()),
        }
    }

    fn undefined(&self, name: &str) -> Value {
        Value::undefined_named(name, self.undefined_behavior())
    }
}

/// Statement level control flow.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Flow {
    Normal,
    Break,
    Continue,
}

/// Runs a closure with a blank state, for unit tests of filters and tests.
#[cfg(test)]
pub(crate) fn with_test_state<R>(env: &Environment, f: impl FnOnce(&State) -> R) -> R {
    let hold = TemplateHold::default();
    let state = State::new(
        Context::new(env, Value::from(())),
        AutoEscape::None,
        "<test>",
        &hold,
        None,
    );
    f(&state)
}

/// Renders a template, following its inheritance chain.
pub(crate) fn render_template(
    env: &Environment,
    template: Arc<LoadedTemplate>,
    root: Value,
    auto_escape: AutoEscape,
    cancel: Option<CancelToken>,
    out: &mut Output,
) -> Result<(), Error> {
    let hold = TemplateHold::default();
    let compiled = hold.hold(template);
    let mut state = State::new(
        Context::new(env, root),
        auto_escape,
        compiled.name,
        &hold,
        cancel,
    );
    state.loaded_names.insert(compiled.name.to_string());
    render_root(&mut state, compiled, out)
}

/// Evaluates a standalone expression.
pub(crate) fn eval_expression(
    env: &Environment,
    expr: &ast::Expr<'_>,
    root: Value,
) -> Result<Value, Error> {
    let hold = TemplateHold::default();
    let mut state = State::new(
        Context::new(env, root),
        AutoEscape::None,
        "<expression>",
        &hold,
        None,
    );
    eval_expr(&mut state, expr)
}

/// Renders a template body and resolves a pending `extends`.
fn render_root<'t, 'env>(
    state: &mut State<'t, 'env>,
    compiled: &'t CompiledTemplate<'t>,
    out: &mut Output,
) -> Result<(), Error> {
    let old_pending = state.pending_parent.take();
    collect_blocks(&compiled.body, &mut state.blocks);

    let rv = eval_stmts(state, &compiled.body, out);
    let pending = state.pending_parent.take();
    state.pending_parent = old_pending;
    ok!(rv);

    if let Some(parent_name) = pending {
        // the remainder of the child template was rendered into a discard
        // capture that was opened by the extends statement
        out.end_capture(AutoEscape::None);
        if !state.loaded_names.insert(parent_name.clone()) {
            return Err(Error::new(
                ErrorKind::Recursion,
                format!("circular extends chain through {parent_name:?}"),
            ));
        }
        ok!(state.ctx.incr_depth(INCLUDE_RECURSION_COST));
        let parent = state
            .loaded
            .hold(ok!(state.env().get_template_arc(&parent_name)));
        let old_name = std::mem::replace(&mut state.name, parent.name);
        let rv = render_root(state, parent, out);
        state.name = old_name;
        state.ctx.decr_depth(INCLUDE_RECURSION_COST);
        ok!(rv);
    }
    Ok(())
}

/// Collects the blocks of a template body into the block stacks.
///
/// Stacks are ordered most derived template first, so appending while
/// walking the inheritance chain child to parent keeps the order.
fn collect_blocks<'t>(
    stmts: &'t [ast::Stmt<'t>],
    blocks: &mut BTreeMap<&'t str, BlockStack<'t>>,
) {
    for stmt in stmts {
        match stmt {
            ast::Stmt::Block(block) => {
                match blocks.get_mut(block.name) {
                    Some(stack) => stack.append(&block.body),
                    None => {
                        blocks.insert(block.name, BlockStack::new(&block.body));
                    }
                }
                collect_blocks(&block.body, blocks);
            }
            ast::Stmt::ForLoop(f) => {
                collect_blocks(&f.body, blocks);
                collect_blocks(&f.else_body, blocks);
            }
            ast::Stmt::IfCond(i) => {
                collect_blocks(&i.true_body, blocks);
                collect_blocks(&i.false_body, blocks);
            }
            ast::Stmt::WithBlock(w) => collect_blocks(&w.body, blocks),
            ast::Stmt::AutoEscape(a) => collect_blocks(&a.body, blocks),
            ast::Stmt::FilterBlock(f) => collect_blocks(&f.body, blocks),
            _ => {}
        }
    }
}

fn eval_stmts<'t, 'env>(
    state: &mut State<'t, 'env>,
    stmts: &'t [ast::Stmt<'t>],
    out: &mut Output,
) -> Result<Flow, Error> {
    for stmt in stmts {
        ok!(state.check_cancelled());
        let span = stmt.span();
        let flow = ok!(eval_stmt(state, stmt, out).map_err(|err| err.with_location(
            state.name,
            span.start_line as usize,
            span.start_col as usize
        )));
        if flow != Flow::Normal {
            return Ok(flow);
        }
    }
    Ok(Flow::Normal)
}

fn eval_stmt<'t, 'env>(
    state: &mut State<'t, 'env>,
    stmt: &'t ast::Stmt<'t>,
    out: &mut Output,
) -> Result<Flow, Error> {
    match stmt {
        ast::Stmt::EmitRaw(raw) => {
            ok!(out.write_str(&raw.raw).map_err(Error::from));
        }
        ast::Stmt::EmitExpr(emit) => {
            let value = ok!(eval_expr(state, &emit.expr));
            ok!(emit_value(state, &value, out));
        }
        ast::Stmt::IfCond(cond) => {
            let value = ok!(eval_expr(state, &cond.expr));
            let flow = if ok!(value.truthy()) {
                ok!(eval_stmts(state, &cond.true_body, out))
            } else {
                ok!(eval_stmts(state, &cond.false_body, out))
            };
            return Ok(flow);
        }
        ast::Stmt::ForLoop(for_loop) => {
            return eval_for_loop(state, for_loop, out, 0);
        }
        ast::Stmt::WithBlock(with_block) => {
            let mut locals = Vec::with_capacity(with_block.assignments.len());
            for (target, expr) in &with_block.assignments {
                locals.push((target, ok!(eval_expr(state, expr))));
            }
            ok!(state.ctx.push_scope(Scope::new()));
            for (target, value) in locals {
                ok!(bind_target(state, target, value));
            }
            let rv = eval_stmts(state, &with_block.body, out);
            state.ctx.pop_scope();
            return rv;
        }
        ast::Stmt::Set(set) => {
            let value = ok!(eval_expr(state, &set.expr));
            ok!(bind_target(state, &set.target, value));
            export_target(state, &set.target);
        }
        ast::Stmt::SetBlock(set_block) => {
            out.begin_capture(CaptureMode::Capture);
            let rv = eval_stmts(state, &set_block.body, out);
            let mut value = out.end_capture(state.auto_escape);
            ok!(rv);
            if let Some(ref filter) = set_block.filter {
                value = ok!(apply_filter_chain(state, filter, value));
            }
            ok!(bind_target(state, &set_block.target, value));
            export_target(state, &set_block.target);
        }
        ast::Stmt::Block(block) => {
            ok!(render_block(state, block.name, out));
        }
        ast::Stmt::AutoEscape(auto_escape) => {
            let value = ok!(eval_expr(state, &auto_escape.enabled));
            let old = state.auto_escape;
            state.auto_escape = ok!(derive_auto_escape(&value));
            let rv = eval_stmts(state, &auto_escape.body, out);
            state.auto_escape = old;
            return rv;
        }
        ast::Stmt::FilterBlock(filter_block) => {
            out.begin_capture(CaptureMode::Capture);
            let rv = eval_stmts(state, &filter_block.body, out);
            let value = out.end_capture(state.auto_escape);
            ok!(rv);
            let value = ok!(apply_filter_chain(state, &filter_block.filter, value));
            ok!(emit_value(state, &value, out));
        }
        ast::Stmt::Extends(extends) => {
            if state.pending_parent.is_some() {
                return Err(Error::new(
                    ErrorKind::TypeError,
                    "tried to extend a second time in a template",
                ));
            }
            let name = ok!(eval_expr(state, &extends.name));
            let name = match name.as_str() {
                Some(name) => name.to_string(),
                None => {
                    return Err(Error::new(
                        ErrorKind::TypeError,
                        "template name of extends must be a string",
                    ))
                }
            };
            state.pending_parent = Some(name);
            out.begin_capture(CaptureMode::Discard);
        }
        ast::Stmt::Include(include) => {
            ok!(eval_include(state, include, out));
        }
        ast::Stmt::Import(import) => {
            let module = ok!(eval_module(state, &import.expr));
            if let ast::Expr::Var(ref var) = import.name {
                state.ctx.store(var.id, module);
            }
        }
        ast::Stmt::FromImport(from_import) => {
            let module = ok!(eval_module(state, &from_import.expr));
            for (name, alias) in &from_import.names {
                let name = match name {
                    ast::Expr::Var(ref var) => var.id,
                    _ => continue,
                };
                let value = ok!(module.get_attr(name));
                if value.is_undefined() {
                    return Err(Error::new(
                        ErrorKind::UndefinedError,
                        format!("module does not export {name}"),
                    ));
                }
                let target = match alias {
                    Some(ast::Expr::Var(ref var)) => var.id,
                    _ => name,
                };
                state.ctx.store(target, value);
            }
        }
        ast::Stmt::Macro(macro_decl) => {
            let value = ok!(declare_macro(state, macro_decl, false));
            state.ctx.store(macro_decl.name, value);
            if state.ctx.at_root() && !macro_decl.name.starts_with('_') {
                state.ctx.export(macro_decl.name);
            }
        }
        ast::Stmt::CallBlock(call_block) => {
            let caller = ok!(declare_macro(state, &call_block.macro_decl, true));
            let value = ok!(eval_call(state, &call_block.call, Some(caller)));
            ok!(emit_value(state, &value, out));
        }
        ast::Stmt::Do(do_stmt) => {
            ok!(eval_call(state, &do_stmt.call, None));
        }
        ast::Stmt::Continue(_) => return Ok(Flow::Continue),
        ast::Stmt::Break(_) => return Ok(Flow::Break),
    }
    Ok(Flow::Normal)
}

fn eval_for_loop<'t, 'env>(
    state: &mut State<'t, 'env>,
    for_loop: &'t ast::ForLoop<'t>,
    out: &mut Output,
    depth: usize,
) -> Result<Flow, Error> {
    let iter_value = ok!(eval_expr(state, &for_loop.iter));
    eval_for_items(state, for_loop, iter_value, out, depth)
}

fn eval_for_items<'t, 'env>(
    state: &mut State<'t, 'env>,
    for_loop: &'t ast::ForLoop<'t>,
    iter_value: Value,
    out: &mut Output,
    depth: usize,
) -> Result<Flow, Error> {
    if let Some(u) = iter_value.undefined_info() {
        if u.behavior == UndefinedBehavior::Strict {
            return Err(u.error());
        }
    }
    let mut items = ok!(iter_value.try_iter()).collect::<Vec<_>>();

    // an inline condition filters the sequence before the loop starts so
    // that the loop length reflects the filtered items
    if let Some(ref filter_expr) = for_loop.filter_expr {
        let mut filtered = Vec::with_capacity(items.len());
        for item in items {
            ok!(state.ctx.push_scope(Scope::new()));
            let rv = bind_target(state, &for_loop.target, item.clone())
                .and_then(|_| eval_expr(state, filter_expr));
            state.ctx.pop_scope();
            if ok!(rv).is_true() {
                filtered.push(item);
            }
        }
        items = filtered;
    }

    if items.is_empty() {
        return eval_stmts(state, &for_loop.else_body, out);
    }

    let loop_obj = Arc::new(LoopObject {
        len: items.len(),
        idx: AtomicUsize::new(0),
        depth,
        items: items.clone(),
        last_changed_value: Mutex::new(None),
    });

    let mut scope = Scope::new();
    scope.current_loop = Some(LoopState {
        with_loop_var: true,
        object: loop_obj.clone(),
    });
    ok!(state.ctx.push_scope(scope));
    if for_loop.recursive {
        state.recursive_loops.push((for_loop, depth));
    }

    let mut rv = Ok(Flow::Normal);
    for (idx, item) in items.iter().enumerate() {
        if let Err(err) = state.check_cancelled() {
            rv = Err(err);
            break;
        }
        loop_obj.idx.store(idx, Ordering::Relaxed);
        if let Err(err) = bind_target(state, &for_loop.target, item.clone()) {
            rv = Err(err);
            break;
        }
        match eval_stmts(state, &for_loop.body, out) {
            Ok(Flow::Break) => break,
            Ok(_) => {}
            Err(err) => {
                rv = Err(err);
                break;
            }
        }
    }

    if for_loop.recursive {
        state.recursive_loops.pop();
    }
    state.ctx.pop_scope();
    rv.map(|_| Flow::Normal)
}

fn bind_target<'t, 'env>(
    state: &mut State<'t, 'env>,
    target: &'t ast::Expr<'t>,
    value: Value,
) -> Result<(), Error> {
    match target {
        ast::Expr::Var(var) => {
            state.ctx.store(var.id, value);
            Ok(())
        }
        ast::Expr::List(list) => {
            let values = ok!(value.try_iter()).collect::<Vec<_>>();
            if values.len() != list.items.len() {
                return Err(Error::new(
                    ErrorKind::TypeError,
                    format!(
                        "cannot unpack {} values into {} targets",
                        values.len(),
                        list.items.len()
                    ),
                ));
            }
            for (target, value) in list.items.iter().zip(values) {
                ok!(bind_target(state, target, value));
            }
            Ok(())
        }
        _ => Err(Error::new(
            ErrorKind::Syntax,
            "invalid assignment target",
        )),
    }
}

fn export_target<'t, 'env>(state: &mut State<'t, 'env>, target: &'t ast::Expr<'t>) {
    if !state.ctx.at_root() {
        return;
    }
    match target {
        ast::Expr::Var(var) if !var.id.starts_with('_') => state.ctx.export(var.id),
        ast::Expr::List(list) => {
            for item in &list.items {
                export_target(state, item);
            }
        }
        _ => {}
    }
}

fn derive_auto_escape(value: &Value) -> Result<AutoEscape, Error> {
    match (value.as_str(), value.0.clone()) {
        (Some("html"), _) => Ok(AutoEscape::Html),
        (Some("none"), _) => Ok(AutoEscape::None),
        (None, ValueRepr::Bool(true)) => Ok(AutoEscape::Html),
        (None, ValueRepr::Bool(false)) => Ok(AutoEscape::None),
        _ => Err(Error::new(
            ErrorKind::InvalidArgument,
            "invalid value to autoescape tag",
        )),
    }
}

fn render_block<'t, 'env>(
    state: &mut State<'t, 'env>,
    name: &str,
    out: &mut Output,
) -> Result<(), Error> {
    let (name, body) = match state.blocks.get_key_value(name) {
        Some((name, stack)) => (*name, stack.get(0).unwrap()),
        None => {
            return Err(Error::new(
                ErrorKind::TypeError,
                format!("block {name:?} is unknown"),
            ))
        }
    };
    let old_block = state.current_block.replace((name, 0));
    ok!(state.ctx.push_scope(Scope::new()));
    let rv = eval_stmts(state, body, out);
    state.ctx.pop_scope();
    state.current_block = old_block;
    ok!(rv);
    Ok(())
}

fn render_block_to_string<'t, 'env>(
    state: &mut State<'t, 'env>,
    name: &str,
    out: &mut Output,
) -> Result<Value, Error> {
    out.begin_capture(CaptureMode::Capture);
    let rv = render_block(state, name, out);
    let value = out.end_capture(state.auto_escape);
    ok!(rv);
    Ok(value)
}

fn call_super<'t, 'env>(state: &mut State<'t, 'env>, out: &mut Output) -> Result<Value, Error> {
    let (name, idx) = match state.current_block {
        Some(rv) => rv,
        None => {
            return Err(Error::new(
                ErrorKind::TypeError,
                "cannot call super() outside of a block",
            ))
        }
    };
    let body = match state.blocks.get(name).and_then(|stack| stack.get(idx + 1)) {
        Some(body) => body,
        // the bottom of the block stack renders empty
        None => return Ok(Value::from("")),
    };
    state.current_block = Some((name, idx + 1));
    out.begin_capture(CaptureMode::Capture);
    ok!(state.ctx.push_scope(Scope::new()));
    let rv = eval_stmts(state, body, out);
    state.ctx.pop_scope();
    let value = out.end_capture(state.auto_escape);
    state.current_block = Some((name, idx));
    ok!(rv);
    Ok(value)
}

fn eval_include<'t, 'env>(
    state: &mut State<'t, 'env>,
    include: &'t ast::Include<'t>,
    out: &mut Output,
) -> Result<(), Error> {
    let name = ok!(eval_expr(state, &include.name));
    let name = match name.as_str() {
        Some(name) => name.to_string(),
        None => {
            return Err(Error::new(
                ErrorKind::TypeError,
                "template name of include must be a string",
            ))
        }
    };
    let template = match state.env().get_template_arc(&name) {
        Ok(template) => template,
        Err(err) if err.kind() == ErrorKind::TemplateNotFound && include.ignore_missing => {
            return Ok(())
        }
        Err(err) => return Err(err),
    };
    let included = state.loaded.hold(template);

    ok!(state.ctx.incr_depth(INCLUDE_RECURSION_COST));
    let old_name = std::mem::replace(&mut state.name, included.name);
    let old_blocks = std::mem::take(&mut state.blocks);
    let old_block = state.current_block.take();
    let old_loaded_names = std::mem::replace(
        &mut state.loaded_names,
        BTreeSet::from([included.name.to_string()]),
    );
    let old_auto_escape = state.auto_escape;
    state.auto_escape = state.env().initial_auto_escape(included.name);

    let rv = if include.with_context {
        match state.ctx.push_scope(Scope::new()) {
            Ok(()) => {
                let rv = render_root(state, included, out);
                state.ctx.pop_scope();
                rv
            }
            Err(err) => Err(err),
        }
    } else {
        // an isolated context still carries the accumulated depth so that
        // include cycles hit the recursion limit
        let mut fresh = Context::new(state.env(), Value::from(()));
        let rv = match fresh.incr_depth(state.ctx.depth()) {
            Ok(()) => {
                let old_ctx = std::mem::replace(&mut state.ctx, fresh);
                let rv = render_root(state, included, out);
                state.ctx = old_ctx;
                rv
            }
            Err(err) => Err(err),
        };
        rv
    };

    state.auto_escape = old_auto_escape;
    state.loaded_names = old_loaded_names;
    state.current_block = old_block;
    state.blocks = old_blocks;
    state.name = old_name;
    state.ctx.decr_depth(INCLUDE_RECURSION_COST);
    rv
}

/// Renders a template in an isolated context and returns its exported
/// variables and macros as a module value.
fn eval_module<'t, 'env>(
    state: &mut State<'t, 'env>,
    name_expr: &'t ast::Expr<'t>,
) -> Result<Value, Error> {
    let name = ok!(eval_expr(state, name_expr));
    let name = match name.as_str() {
        Some(name) => name.to_string(),
        None => {
            return Err(Error::new(
                ErrorKind::TypeError,
                "template name of import must be a string",
            ))
        }
    };
    // modules render once per render; later imports of the same template
    // reuse the collected exports
    if let Some(module) = state.ctx.get_module(&name) {
        return Ok(module);
    }

    let template = ok!(state.env().get_template_arc(&name));
    let imported = state.loaded.hold(template);

    let old_name = std::mem::replace(&mut state.name, imported.name);
    let old_blocks = std::mem::take(&mut state.blocks);
    let old_block = state.current_block.take();
    let old_loaded_names = std::mem::replace(
        &mut state.loaded_names,
        BTreeSet::from([imported.name.to_string()]),
    );
    // the isolated module context carries the accumulated depth so that
    // import cycles hit the recursion limit
    let mut fresh = Context::new(state.env(), Value::from(()));
    ok!(fresh.incr_depth(state.ctx.depth() + INCLUDE_RECURSION_COST));
    let old_ctx = std::mem::replace(&mut state.ctx, fresh);

    let mut buffer = String::new();
    let mut discard = Output::with_string(&mut buffer);
    let rv = render_root(state, imported, &mut discard);

    let module = state.ctx.exports_to_module();
    state.ctx = old_ctx;
    state.loaded_names = old_loaded_names;
    state.current_block = old_block;
    state.blocks = old_blocks;
    state.name = old_name;
    ok!(rv);

    let module = Value::from_map(module);
    state.ctx.set_module(&name, module.clone());
    Ok(module)
}

fn declare_macro<'t, 'env>(
    state: &mut State<'t, 'env>,
    macro_decl: &'t ast::Macro<'t>,
    is_caller: bool,
) -> Result<Value, Error> {
    // defaults are evaluated at definition time
    let mut defaults = Vec::with_capacity(macro_decl.defaults.len());
    for default in &macro_decl.defaults {
        defaults.push(ok!(eval_expr(state, default)));
    }
    let arg_names = macro_decl
        .args
        .iter()
        .filter_map(|arg| match arg {
            ast::Expr::Var(var) => Some(var.id.to_string()),
            _ => None,
        })
        .collect();

    let macro_id = state.macros.len();
    state.macros.push(macro_decl);

    Ok(Value::from_callable(Callable {
        name: macro_decl.name.to_string(),
        kind: CallableKind::Macro(MacroData {
            macro_id,
            state_id: state.id,
            arg_names,
            defaults,
            closure: Value::from_map(state.ctx.snapshot_visible_vars()),
            base: state.ctx.base().clone(),
            is_caller,
        }),
        is_async: false,
        unsafe_callable: false,
        alters_data: false,
    }))
}

fn call_macro<'t, 'env>(
    state: &mut State<'t, 'env>,
    data: &MacroData,
    args: Vec<Value>,
    caller: Option<Value>,
) -> Result<Value, Error> {
    if data.state_id != state.id {
        return Err(Error::new(
            ErrorKind::TypeError,
            "cannot call a macro that is out of scope for this render",
        ));
    }
    let macro_decl = state.macros[data.macro_id];

    let (args, kwargs) = split_kwargs(args);
    if args.len() > data.arg_names.len() {
        return Err(Error::new(
            ErrorKind::InvalidArgument,
            format!("macro {} received too many arguments", macro_decl.name),
        ));
    }

    let mut locals = crate::context::Locals::new();
    let defaults_offset = data.arg_names.len() - data.defaults.len();
    for (idx, arg_name) in data.arg_names.iter().enumerate() {
        let value = if let Some(value) = args.get(idx) {
            value.clone()
        } else if let Some(value) = kwargs.as_ref().and_then(|k| k.get(arg_name)) {
            value.clone()
        } else if idx >= defaults_offset {
            data.defaults[idx - defaults_offset].clone()
        } else {
            state.undefined(arg_name)
        };
        locals.insert(arg_name.clone(), value);
    }
    if let Some(ref kwargs) = kwargs {
        for key in kwargs.keys() {
            if !data.arg_names.iter().any(|name| name == key) {
                return Err(Error::new(
                    ErrorKind::InvalidArgument,
                    format!(
                        "macro {} received unknown keyword argument {key:?}",
                        macro_decl.name
                    ),
                ));
            }
        }
    }
    if let Some(caller) = caller {
        locals.insert("caller".to_string(), caller);
    }

    let old_depth = state.ctx.depth();
    let mut ctx = Context::new(state.env(), data.base.clone());
    ok!(ctx.incr_depth(old_depth + MACRO_RECURSION_COST));
    let closure_locals = data.closure.as_map().cloned().unwrap_or_default();
    ok!(ctx.push_scope(Scope::with_locals(closure_locals)));
    ok!(ctx.push_scope(Scope::with_locals(locals)));

    let old_ctx = std::mem::replace(&mut state.ctx, ctx);
    let old_block = state.current_block.take();

    let mut buffer = String::new();
    let mut out = Output::with_string(&mut buffer);
    let rv = eval_stmts(state, &macro_decl.body, &mut out);

    state.current_block = old_block;
    state.ctx = old_ctx;
    ok!(rv);

    Ok(if !matches!(state.auto_escape, AutoEscape::None) {
        Value::from_safe_string(buffer)
    } else {
        Value::from(buffer)
    })
}

fn split_kwargs(mut args: Vec<Value>) -> (Vec<Value>, Option<ValueMap>) {
    match args.last() {
        Some(Value(ValueRepr::Kwargs(_))) => {
            let kwargs = args.pop().unwrap();
            let map = kwargs.as_map().cloned();
            (args, map)
        }
        _ => (args, None),
    }
}

fn eval_call_args<'t, 'env>(
    state: &mut State<'t, 'env>,
    args: &'t [ast::CallArg<'t>],
) -> Result<Vec<Value>, Error> {
    let mut rv = Vec::with_capacity(args.len());
    let mut kwargs = ValueMap::new();
    for arg in args {
        match arg {
            ast::CallArg::Pos(expr) => rv.push(ok!(eval_expr(state, expr))),
            ast::CallArg::Kwarg(name, expr) => {
                kwargs.insert(name.to_string(), ok!(eval_expr(state, expr)));
            }
        }
    }
    if !kwargs.is_empty() {
        rv.push(Kwargs::wrap(kwargs));
    }
    Ok(rv)
}

fn eval_call<'t, 'env>(
    state: &mut State<'t, 'env>,
    call: &'t ast::Call<'t>,
    caller: Option<Value>,
) -> Result<Value, Error> {
    match call.identify_call() {
        CallType::Function("super") if call.args.is_empty() => {
            let mut buffer = String::new();
            let mut out = Output::with_string(&mut buffer);
            call_super(state, &mut out)
        }
        CallType::Function("loop") => {
            let args = ok!(eval_call_args(state, &call.args));
            eval_loop_recursion(state, args)
        }
        CallType::Function(name) => {
            let func = match state.lookup(name) {
                Some(func) if !func.is_undefined() => func,
                _ => {
                    return Err(Error::new(
                        ErrorKind::UndefinedError,
                        format!("{name} is undefined"),
                    ))
                }
            };
            let args = ok!(eval_call_args(state, &call.args));
            call_value(state, &func, args, caller)
        }
        CallType::Block(name) => {
            let mut buffer = String::new();
            let mut out = Output::with_string(&mut buffer);
            render_block_to_string(state, name, &mut out)
        }
        CallType::Method(expr, name) => {
            let value = ok!(eval_expr(state, expr));
            let args = ok!(eval_call_args(state, &call.args));
            call_method(state, &value, name, args)
        }
        CallType::Object(expr) => {
            let func = ok!(eval_expr(state, expr));
            let args = ok!(eval_call_args(state, &call.args));
            call_value(state, &func, args, caller)
        }
    }
}

fn eval_loop_recursion<'t, 'env>(
    state: &mut State<'t, 'env>,
    args: Vec<Value>,
) -> Result<Value, Error> {
    let (for_loop, depth) = match state.recursive_loops.last() {
        Some(rv) => *rv,
        None => {
            return Err(Error::new(
                ErrorKind::TypeError,
                "cannot recurse outside of recursive loop",
            ))
        }
    };
    let iter_value = match args.into_iter().next() {
        Some(value) => value,
        None => {
            return Err(Error::new(
                ErrorKind::InvalidArgument,
                "loop recursion requires an iterable",
            ))
        }
    };
    let mut buffer = String::new();
    let mut out = Output::with_string(&mut buffer);
    ok!(eval_for_items(state, for_loop, iter_value, &mut out, depth + 1));
    Ok(if !matches!(state.auto_escape, AutoEscape::None) {
        Value::from_safe_string(buffer)
    } else {
        Value::from(buffer)
    })
}

pub(crate) fn call_value<'t, 'env>(
    state: &mut State<'t, 'env>,
    func: &Value,
    args: Vec<Value>,
    caller: Option<Value>,
) -> Result<Value, Error> {
    match func.0 {
        ValueRepr::Callable(ref callable) => {
            if state.env().sandboxed() && (callable.unsafe_callable || callable.alters_data) {
                return Err(Error::new(
                    ErrorKind::SecurityError,
                    format!("cannot call unsafe callable {}", callable.name),
                ));
            }
            match callable.kind {
                CallableKind::Function(ref f) => f(state, &args),
                CallableKind::Macro(ref data) => call_macro(state, data, args, caller),
                CallableKind::Block(ref name) => {
                    let name = name.clone();
                    let mut buffer = String::new();
                    let mut out = Output::with_string(&mut buffer);
                    render_block_to_string(state, &name, &mut out)
                }
            }
        }
        ValueRepr::Object(ref object) => {
            let object = object.clone();
            object.call(state, &args)
        }
        _ => Err(Error::new(
            ErrorKind::NotCallable,
            format!("value of type {} is not callable", func.kind()),
        )),
    }
}

fn call_method<'t, 'env>(
    state: &mut State<'t, 'env>,
    value: &Value,
    name: &str,
    args: Vec<Value>,
) -> Result<Value, Error> {
    match value.0 {
        ValueRepr::Object(ref object) => {
            let object = object.clone();
            object.call_method(state, name, &args)
        }
        ValueRepr::Map(ref map) | ValueRepr::Kwargs(ref map) => match map.get(name) {
            Some(func) => {
                let func = func.clone();
                call_value(state, &func, args, None)
            }
            None => Err(Error::new(
                ErrorKind::TypeError,
                format!("map has no method named {name}"),
            )),
        },
        _ => Err(Error::new(
            ErrorKind::TypeError,
            format!("value of type {} has no method named {name}", value.kind()),
        )),
    }
}

fn self_module<'t, 'env>(state: &State<'t, 'env>) -> Value {
    let mut rv = ValueMap::new();
    for name in state.blocks.keys() {
        rv.insert(
            name.to_string(),
            Value::from_callable(Callable {
                name: name.to_string(),
                kind: CallableKind::Block(name.to_string()),
                is_async: false,
                unsafe_callable: false,
                alters_data: false,
            }),
        );
    }
    Value::from_map(rv)
}

/// Resolves async result values at expression boundaries when the
/// environment has async support enabled.
fn resolve_async<'t, 'env>(state: &State<'t, 'env>, value: Value) -> Result<Value, Error> {
    if !state.env().async_enabled() {
        return Ok(value);
    }
    match value.0 {
        ValueRepr::AsyncResult(ref result) => {
            if !result.completed {
                return Err(Error::new(
                    ErrorKind::TypeError,
                    format!("async result {} is still pending", result.id),
                ));
            }
            if let Some(ref error) = result.error {
                return Err(Error::new(ErrorKind::TypeError, error.clone()));
            }
            match result.value {
                Some(ref value) => Ok(value.clone()),
                None => Ok(Value::from(())),
            }
        }
        _ => Ok(value),
    }
}

fn eval_expr<'t, 'env>(
    state: &mut State<'t, 'env>,
    expr: &'t ast::Expr<'t>,
) -> Result<Value, Error> {
    let value = ok!(eval_expr_impl(state, expr));
    resolve_async(state, value)
}

fn eval_expr_impl<'t, 'env>(
    state: &mut State<'t, 'env>,
    expr: &'t ast::Expr<'t>,
) -> Result<Value, Error> {
    let span = expr.span();
    eval_expr_inner(state, expr).map_err(|err| {
        err.with_location(state.name, span.start_line as usize, span.start_col as usize)
    })
}

fn eval_expr_inner<'t, 'env>(
    state: &mut State<'t, 'env>,
    expr: &'t ast::Expr<'t>,
) -> Result<Value, Error> {
    match expr {
        ast::Expr::Var(var) => Ok(match state.lookup(var.id) {
            Some(value) => value,
            None if var.id == "self" => self_module(state),
            None => state.undefined(var.id),
        }),
        ast::Expr::Const(constant) => Ok(constant.value.clone()),
        ast::Expr::List(list) => {
            let mut rv = Vec::with_capacity(list.items.len());
            for item in &list.items {
                rv.push(ok!(eval_expr(state, item)));
            }
            Ok(Value::from(rv))
        }
        ast::Expr::Map(map) => {
            let mut rv = ValueMap::new();
            for (key, value) in map.keys.iter().zip(map.values.iter()) {
                let key = ok!(eval_expr(state, key));
                let key = match key.as_str() {
                    Some(key) => key.to_string(),
                    None => key.to_string(),
                };
                rv.insert(key, ok!(eval_expr(state, value)));
            }
            Ok(Value::from_map(rv))
        }
        ast::Expr::UnaryOp(op) => {
            let value = ok!(eval_expr(state, &op.expr));
            match op.op {
                ast::UnaryOpKind::Not => Ok(Value::from(!ok!(value.truthy()))),
                ast::UnaryOpKind::Neg => ops::neg(&value),
            }
        }
        ast::Expr::BinOp(op) => eval_binop(state, op),
        ast::Expr::IfExpr(if_expr) => {
            let cond = ok!(eval_expr(state, &if_expr.test_expr));
            if ok!(cond.truthy()) {
                eval_expr(state, &if_expr.true_expr)
            } else {
                match if_expr.false_expr {
                    Some(ref false_expr) => eval_expr(state, false_expr),
                    None => Ok(Value::undefined()),
                }
            }
        }
        ast::Expr::Filter(filter) => {
            let value = match filter.expr {
                Some(ref expr) => ok!(eval_expr(state, expr)),
                None => {
                    return Err(Error::new(
                        ErrorKind::Syntax,
                        "filter is missing an input value",
                    ))
                }
            };
            let args = ok!(eval_call_args(state, &filter.args));
            state.env().apply_filter(filter.name, state, value, args)
        }
        ast::Expr::Test(test) => {
            let value = ok!(eval_expr(state, &test.expr));
            let args = ok!(eval_call_args(state, &test.args));
            Ok(Value::from(ok!(state
                .env()
                .perform_test(test.name, state, value, args))))
        }
        ast::Expr::GetAttr(attr) => {
            let value = ok!(eval_expr(state, &attr.expr));
            match value.get_attr_fast(attr.name) {
                Some(rv) => Ok(rv),
                None => handle_undefined(state, &value, attr.name),
            }
        }
        ast::Expr::GetItem(item) => {
            let value = ok!(eval_expr(state, &item.expr));
            let subscript = ok!(eval_expr(state, &item.subscript_expr));
            match value.get_item_opt(&subscript) {
                Some(rv) => Ok(rv),
                None => handle_undefined(state, &value, &subscript.to_string()),
            }
        }
        ast::Expr::Slice(slice) => {
            let value = ok!(eval_expr(state, &slice.expr));
            let start = ok!(eval_opt_expr(state, &slice.start));
            let stop = ok!(eval_opt_expr(state, &slice.stop));
            let step = ok!(eval_opt_expr(state, &slice.step));
            ops::slice(value, start, stop, step)
        }
        ast::Expr::Call(call) => {
            // Spanned<Call> derefs to Call; identify through the node
            eval_call_node(state, call)
        }
    }
}

fn eval_call_node<'t, 'env>(
    state: &mut State<'t, 'env>,
    call: &'t ast::Spanned<ast::Call<'t>>,
) -> Result<Value, Error> {
    eval_call(state, call, None)
}

fn eval_opt_expr<'t, 'env>(
    state: &mut State<'t, 'env>,
    expr: &'t Option<ast::Expr<'t>>,
) -> Result<Value, Error> {
    Ok(match expr {
        Some(expr) => ok!(eval_expr(state, expr)),
        None => Value::from(()),
    })
}

/// Implements the engine's reaction to a failed attribute or item lookup.
///
/// Chainable undefineds propagate, lookups on undefined values fail, and
/// lookups of missing keys on defined values produce a named undefined.
fn handle_undefined<'t, 'env>(
    state: &State<'t, 'env>,
    parent: &Value,
    name: &str,
) -> Result<Value, Error> {
    match parent.undefined_info() {
        Some(u) => match u.behavior {
            UndefinedBehavior::Chainable => Ok(Value::undefined_named(name, u.behavior)),
            _ => Err(u.error()),
        },
        None => Ok(state.undefined(name)),
    }
}

fn eval_binop<'t, 'env>(
    state: &mut State<'t, 'env>,
    op: &'t ast::BinOp<'t>,
) -> Result<Value, Error> {
    use ast::BinOpKind;

    // and/or evaluate their right hand side lazily and yield the operand
    match op.op {
        BinOpKind::ScAnd => {
            let left = ok!(eval_expr(state, &op.left));
            return if !ok!(left.truthy()) {
                Ok(left)
            } else {
                eval_expr(state, &op.right)
            };
        }
        BinOpKind::ScOr => {
            let left = ok!(eval_expr(state, &op.left));
            return if ok!(left.truthy()) {
                Ok(left)
            } else {
                eval_expr(state, &op.right)
            };
        }
        _ => {}
    }

    let left = ok!(eval_expr(state, &op.left));
    let right = ok!(eval_expr(state, &op.right));

    match op.op {
        BinOpKind::Eq => Ok(Value::from(ok!(ops::eq_checked(&left, &right)))),
        BinOpKind::Ne => Ok(Value::from(!ok!(ops::eq_checked(&left, &right)))),
        BinOpKind::Lt => Ok(Value::from(ok!(ops::cmp_checked(&left, &right)).is_lt())),
        BinOpKind::Lte => Ok(Value::from(ok!(ops::cmp_checked(&left, &right)).is_le())),
        BinOpKind::Gt => Ok(Value::from(ok!(ops::cmp_checked(&left, &right)).is_gt())),
        BinOpKind::Gte => Ok(Value::from(ok!(ops::cmp_checked(&left, &right)).is_ge())),
        BinOpKind::Add => ops::add(&left, &right),
        BinOpKind::Sub => ops::sub(&left, &right),
        BinOpKind::Mul => ops::mul(&left, &right),
        BinOpKind::Div => ops::div(&left, &right),
        BinOpKind::FloorDiv => ops::int_div(&left, &right),
        BinOpKind::Rem => ops::rem(&left, &right),
        BinOpKind::Pow => ops::pow(&left, &right),
        BinOpKind::Concat => Ok(ops::string_concat(&left, &right)),
        BinOpKind::In => ops::contains(&right, &left),
        BinOpKind::ScAnd | BinOpKind::ScOr => unreachable!(),
    }
}

/// Writes a value to the output, escaping it when auto escape is active.
///
/// Safe strings bypass escaping; numbers, booleans and none never need it.
fn emit_value<'t, 'env>(
    state: &State<'t, 'env>,
    value: &Value,
    out: &mut Output,
) -> Result<(), Error> {
    if let Some(u) = value.undefined_info() {
        if u.behavior == UndefinedBehavior::Strict {
            return Err(u.error());
        }
    }
    // safe strings bypass all of this
    if let ValueRepr::String(ref s, crate::value::StringKind::Safe) = value.0 {
        return out.write_str(s).map_err(Error::from);
    }
    match state.auto_escape {
        AutoEscape::None => write!(out, "{value}").map_err(Error::from),
        AutoEscape::Html => {
            if let Some(s) = value.as_str() {
                write!(out, "{}", HtmlEscape(s)).map_err(Error::from)
            } else if matches!(
                value.0,
                ValueRepr::Undefined(_)
                    | ValueRepr::None
                    | ValueRepr::Bool(_)
                    | ValueRepr::I64(_)
                    | ValueRepr::F64(_)
            ) {
                write!(out, "{value}").map_err(Error::from)
            } else {
                write!(out, "{}", HtmlEscape(&value.to_string())).map_err(Error::from)
            }
        }
    }
}

/// Applies a parsed filter chain to a seed value.
///
/// Used by `{% filter %}` blocks and filtered `{% set %}` blocks where the
/// innermost filter node has no input expression.
fn apply_filter_chain<'t, 'env>(
    state: &mut State<'t, 'env>,
    chain: &'t ast::Expr<'t>,
    seed: Value,
) -> Result<Value, Error> {
    match chain {
        ast::Expr::Filter(filter) => {
            let value = match filter.expr {
                Some(ref inner) => ok!(apply_filter_chain(state, inner, seed)),
                None => seed,
            };
            let args = ok!(eval_call_args(state, &filter.args));
            state.env().apply_filter(filter.name, state, value, args)
        }
        _ => Err(Error::new(ErrorKind::Syntax, "expected a filter chain")),
    }
}
