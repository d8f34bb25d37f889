//! Per-module translator state and the flattening machinery.
//!
//! A [`Context`] represents one module being translated: the statement buffer
//! the flattener is currently filling, the temporary counter, and the ordered
//! accumulators for functions, classes, and imported sub-modules. The
//! flattener itself is a small set of functions over `(Session, Context)`:
//! [`flatten_block`] runs each statement's reduction with a fresh buffer, and
//! [`flatten_edge`] hoists non-atomic subexpressions into `Store(temp_NN, …)`
//! statements while preserving source evaluation order.

use crate::intern::Session;
use crate::reduce;
use crate::syntax::{Binding, Block, EdgeId, NodeId, NodeKind};

/// State for one module.
#[derive(Debug)]
pub struct Context {
    /// Module name, already valid as a C++ identifier fragment.
    pub name: String,
    /// The statement buffer reductions currently append to.
    pub statements: Vec<NodeId>,
    /// Every function defined in the module, in definition order. Nested and
    /// class-level functions are hoisted here too.
    pub functions: Vec<NodeId>,
    /// Every class defined in the module, in definition order.
    pub classes: Vec<NodeId>,
    /// `ImportStatement` nodes for the sub-modules this module imports.
    pub imports: Vec<NodeId>,
    /// Module-global symbol names in index order. Filled by the scope
    /// analyzer; index 0 is reserved for "undefined".
    pub global_names: Vec<String>,
    temp_counter: u32,
}

impl Context {
    pub fn new(name: impl Into<String>) -> Self {
        Context {
            name: name.into(),
            statements: Vec::new(),
            functions: Vec::new(),
            classes: Vec::new(),
            imports: Vec::new(),
            global_names: Vec::new(),
            temp_counter: 0,
        }
    }

    /// A fresh flattener temporary name.
    pub fn get_temp(&mut self) -> String {
        self.temp_counter += 1;
        format!("temp_{:02}", self.temp_counter)
    }

    /// Index of a module-global symbol, once the scope pass has run.
    pub fn global_index(&self, name: &str) -> Option<u32> {
        self.global_names
            .iter()
            .position(|n| n == name)
            .map(|i| i as u32)
    }
}

/// A completed translation unit: the module's context plus its flattened
/// top-level statements.
#[derive(Debug)]
pub struct Module {
    pub ctx: Context,
    pub stmts: Vec<NodeId>,
}

impl Session {
    /// An interned integer constant node. Registers the value so the emitter
    /// writes one singleton definition per distinct literal.
    pub fn int_const(&mut self, value: i64) -> NodeId {
        self.ints.add(value);
        self.graph.node(NodeKind::IntConst(value))
    }

    /// An interned string constant node.
    pub fn string_const(&mut self, value: &str) -> NodeId {
        let id = self.strings.add(value);
        self.graph.node(NodeKind::StringConst(id))
    }

    /// An interned byte-string constant node.
    pub fn bytes_const(&mut self, value: &[u8]) -> NodeId {
        let id = self.bytes.add(value);
        self.graph.node(NodeKind::BytesConst(id))
    }

    /// A `Load` of a not-yet-bound name.
    pub fn load(&mut self, name: &str) -> NodeId {
        self.graph.node(NodeKind::Load {
            name: name.to_string(),
            binding: None,
        })
    }

    /// A `Store` of `expr` under a not-yet-bound name.
    pub fn store(&mut self, name: &str, expr: NodeId) -> NodeId {
        let edge = self.graph.edge(expr);
        self.graph.node(NodeKind::Store {
            name: name.to_string(),
            binding: None,
            expr: edge,
        })
    }

    pub fn identifier(&mut self, name: &str) -> NodeId {
        self.graph.node(NodeKind::Identifier(name.to_string()))
    }

    pub fn singleton_ref(&mut self, symbol: impl Into<String>) -> NodeId {
        self.graph.node(NodeKind::SingletonRef(symbol.into()))
    }

    /// A direct method call on a runtime object.
    pub fn method_call(
        &mut self,
        obj: NodeId,
        method: &'static str,
        args: Vec<NodeId>,
    ) -> NodeId {
        let obj = self.graph.edge(obj);
        let args = args.into_iter().map(|a| self.graph.edge(a)).collect();
        self.graph.node(NodeKind::MethodCall { obj, method, args })
    }
}

/// Append a reduced statement to the current buffer.
///
/// The statement is reduced first; reductions may themselves append auxiliary
/// statements, which land ahead of the statement they support.
pub fn add_statement(sess: &mut Session, ctx: &mut Context, stmt: NodeId) {
    reduce::reduce_stmt(sess, ctx, stmt);
}

/// Flatten a statement block in its own buffer, restoring the caller's
/// buffer afterwards.
pub fn flatten_block(sess: &mut Session, ctx: &mut Context, stmts: &[NodeId]) -> Block {
    let saved = std::mem::take(&mut ctx.statements);
    for &stmt in stmts {
        add_statement(sess, ctx, stmt);
    }
    std::mem::replace(&mut ctx.statements, saved)
}

/// Run `f` with a fresh statement buffer, returning the statements it
/// accumulated alongside its result.
pub fn with_buffer<R>(
    sess: &mut Session,
    ctx: &mut Context,
    f: impl FnOnce(&mut Session, &mut Context) -> R,
) -> (Vec<NodeId>, R) {
    let saved = std::mem::take(&mut ctx.statements);
    let result = f(sess, ctx);
    let stmts = std::mem::replace(&mut ctx.statements, saved);
    (stmts, result)
}

/// Reduce the child of `edge` and, unless the slot is marked `no_flatten` or
/// the child is already atomic, hoist it into a fresh temporary so only atoms
/// remain inline.
///
/// When the reduction produces a substitute node, every use of the original
/// is forwarded to it — not just `edge`. An operand shared by several edges
/// (the interior term of a chained comparison, say) is therefore reduced and
/// evaluated exactly once; the remaining edges find the substitute, or the
/// hoisted `Load`, already in place.
pub fn flatten_edge(sess: &mut Session, ctx: &mut Context, edge: EdgeId, no_flatten: bool) {
    let child = sess.graph.target(edge);
    let reduced = reduce::reduce_expr(sess, ctx, child);
    if reduced != child {
        sess.graph.forward(child, reduced);
    }
    if no_flatten || sess.graph.is_atom(reduced) {
        return;
    }
    hoist(sess, ctx, reduced);
}

/// Emit `Store(temp_NN, value)` into the current buffer and return the
/// matching `Load(temp_NN)` atom.
///
/// Every existing use of `value` is forwarded to the load, so an operand
/// shared by several edges (the middle term of a chained comparison, say) is
/// evaluated exactly once.
pub fn hoist(sess: &mut Session, ctx: &mut Context, value: NodeId) -> NodeId {
    let temp = ctx.get_temp();
    let load = sess.graph.node(NodeKind::Load {
        name: temp.clone(),
        binding: None,
    });
    sess.graph.forward(value, load);
    let store = sess.store(&temp, value);
    ctx.statements.push(store);
    load
}

/// True for constant atoms whose evaluation has no observable effect, so a
/// bare expression statement of one (a docstring, say) can be dropped.
pub fn is_effect_free(sess: &Session, node: NodeId) -> bool {
    matches!(
        sess.graph.kind(node),
        NodeKind::NullConst
            | NodeKind::NoneConst
            | NodeKind::BoolConst(_)
            | NodeKind::IntConst(_)
            | NodeKind::StringConst(_)
            | NodeKind::BytesConst(_)
            | NodeKind::IntLiteral(_)
            | NodeKind::Identifier(_)
            | NodeKind::SingletonRef(_)
    )
}

/// Re-point a `Load`/`Store` at a resolved binding. Used by the scope pass.
pub fn bind(sess: &mut Session, node: NodeId, binding: Binding) {
    match sess.graph.kind_mut(node) {
        NodeKind::Load { binding: slot, .. } | NodeKind::Store { binding: slot, .. } => {
            *slot = Some(binding);
        }
        _ => panic!("bind called on a node without a name slot"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn temps_are_monotonic_and_zero_padded() {
        let mut ctx = Context::new("main");
        assert_eq!(ctx.get_temp(), "temp_01");
        assert_eq!(ctx.get_temp(), "temp_02");
        for _ in 0..8 {
            ctx.get_temp();
        }
        assert_eq!(ctx.get_temp(), "temp_11");
    }

    #[test]
    fn hoist_emits_store_and_returns_load() {
        let mut sess = Session::new();
        let mut ctx = Context::new("main");
        let lhs = sess.load("a");
        let rhs = sess.load("b");
        let le = sess.graph.edge(lhs);
        let re = sess.graph.edge(rhs);
        let op = sess.graph.node(NodeKind::BinaryOp {
            op: "__add__",
            lhs: le,
            rhs: re,
        });
        let atom = hoist(&mut sess, &mut ctx, op);
        assert_eq!(ctx.statements.len(), 1);
        match sess.graph.kind(ctx.statements[0]) {
            NodeKind::Store { name, .. } => assert_eq!(name, "temp_01"),
            other => panic!("expected Store, got {other:?}"),
        }
        match sess.graph.kind(atom) {
            NodeKind::Load { name, .. } => assert_eq!(name, "temp_01"),
            other => panic!("expected Load, got {other:?}"),
        }
    }
}
