//! The intermediate syntax graph.
//!
//! Translation lowers the host AST into a graph of tagged nodes before
//! flattening. Nodes live in an arena keyed by [`NodeId`]; every value-typed
//! child slot is an [`EdgeId`] into a central edge table, and each node keeps
//! a use list of the edges currently pointing at it, so a reduction can
//! redirect every use of a node with [`Graph::forward`].
//!
//! Slot conventions:
//! - **edge** slots (`EdgeId`) carry values and participate in use lists and
//!   forwarding;
//! - **block** slots (`Vec<NodeId>`) are statement sequences flattened in
//!   their own buffer;
//! - everything else is a plain attribute.
//!
//! A node is an *atom* when it has no edge slots at all (identifiers, loads,
//! interned-constant references). Only atoms may appear inline in emitted C++
//! expressions; the flattener hoists everything else into a temporary first.

/// Index of a node in the graph arena.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct NodeId(pub u32);

/// Index of an edge in the graph's edge table.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct EdgeId(pub u32);

impl NodeId {
    /// Placeholder parent for edges created before their owning node.
    pub const UNSET: NodeId = NodeId(u32::MAX);
}

/// A statement sequence belonging to an enclosed scope.
pub type Block = Vec<NodeId>;

/// Where a name lives, resolved by the scope analyzer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Binding {
    /// Module-level symbol table slot. Index 0 is reserved for "undefined".
    Global(u32),
    /// Slot in the current function frame.
    Local(u32),
    /// Attribute of the class object under construction.
    ClassAttr,
}

/// The loop variable of a `for` or comprehension.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ForTarget {
    Name(String),
    /// A flat tuple of names; nested patterns are rejected at translate time.
    Tuple(Vec<String>),
}

/// Which collection a comprehension builds.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CompKind {
    List,
    Set,
    Dict,
}

/// `and` / `or`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BoolSense {
    And,
    Or,
}

/// One positional argument at a call site; `star` marks `*expr`.
#[derive(Debug, Clone, Copy)]
pub struct CallArg {
    pub star: bool,
    pub value: EdgeId,
}

/// One keyword argument at a call site; `name == None` marks `**expr`.
#[derive(Debug, Clone)]
pub struct Keyword {
    pub name: Option<String>,
    pub value: EdgeId,
}

/// One declared parameter of a function definition.
#[derive(Debug, Clone)]
pub struct Param {
    pub name: String,
    pub default: Option<EdgeId>,
}

/// A tagged syntax-graph node.
#[derive(Debug, Clone)]
pub enum NodeKind {
    // --- Constants -------------------------------------------------------
    /// The raw C++ `NULL` (no value / undefined).
    NullConst,
    /// The Python `None` singleton.
    NoneConst,
    BoolConst(bool),
    /// An interned integer literal.
    IntConst(i64),
    /// An interned string literal, by dense interner id.
    StringConst(u32),
    /// An interned byte-string literal, by dense interner id.
    BytesConst(u32),
    /// A raw C++ integer, used for slot indices and arities.
    IntLiteral(i64),

    // --- References ------------------------------------------------------
    /// A raw C++ identifier (temporaries, function parameters).
    Identifier(String),
    /// A raw C++ expression naming a global singleton.
    SingletonRef(String),
    /// Arena-allocating object construction: `new (alloc) class(args...)`.
    Ref { class: &'static str, args: Vec<EdgeId> },

    // --- Access ----------------------------------------------------------
    Load { name: String, binding: Option<Binding> },
    Store { name: String, binding: Option<Binding>, expr: EdgeId },
    StoreAttr { obj: EdgeId, attr: EdgeId, expr: EdgeId },
    StoreSubscript { obj: EdgeId, index: EdgeId, expr: EdgeId },
    /// Direct slot write into a freshly constructed collection.
    StoreSubscriptDirect { obj: EdgeId, index: EdgeId, expr: EdgeId },
    DeleteSubscript { obj: EdgeId, index: EdgeId },
    Subscript { obj: EdgeId, index: EdgeId },
    Attribute { obj: EdgeId, attr: EdgeId },
    Slice { obj: EdgeId, lower: EdgeId, upper: EdgeId, step: EdgeId },

    // --- Operators -------------------------------------------------------
    UnaryOp { op: &'static str, operand: EdgeId },
    BinaryOp { op: &'static str, lhs: EdgeId, rhs: EdgeId },

    // --- Control ---------------------------------------------------------
    If { test: EdgeId, body: Block, orelse: Block },
    /// Before reduction `test` holds the loop condition; reduction folds it
    /// into the body and leaves `test` empty.
    While { test: Option<EdgeId>, body: Block },
    For { target: ForTarget, iter: EdgeId, body: Block },
    Break,
    Continue,
    Return { value: Option<EdgeId> },
    Assert { test: EdgeId, line: u32 },
    Raise { expr: EdgeId, line: u32 },

    // --- Derived expressions (reduced away during flattening) ------------
    IfExp { test: EdgeId, body: EdgeId, orelse: EdgeId },
    BoolOp { op: BoolSense, values: Vec<EdgeId> },
    Comprehension {
        kind: CompKind,
        target: ForTarget,
        iter: EdgeId,
        ifs: Vec<EdgeId>,
        /// The element (list/set) or the value (dict).
        elt: EdgeId,
        /// The key, for dict comprehensions.
        key: Option<EdgeId>,
    },
    /// Truth test: `test_truth(e)`, or `!test_truth(e)` when `sense` is false.
    Test { expr: EdgeId, sense: bool },
    /// Null check: `(e != NULL)`, or `(e == NULL)` when `sense` is false.
    TestNonNull { expr: EdgeId, sense: bool },

    // --- Collections -----------------------------------------------------
    List { items: Vec<EdgeId> },
    Tuple { items: Vec<EdgeId> },
    /// A tuple built from an arbitrary iterable (starred call arguments).
    TupleFromIter { iter: EdgeId },
    Dict { keys: Vec<EdgeId>, values: Vec<EdgeId> },
    Set { items: Vec<EdgeId> },

    // --- Calls -----------------------------------------------------------
    /// A source-level call site, before argument normalization.
    CallSite { func: EdgeId, args: Vec<CallArg>, keywords: Vec<Keyword> },
    /// A normalized call: `func->__call__(args_tuple, kwargs_or_null)`.
    Call { func: EdgeId, args: EdgeId, kwargs: EdgeId },
    /// A direct C++ method invocation on a runtime object.
    MethodCall { obj: EdgeId, method: &'static str, args: Vec<EdgeId> },

    // --- Definitions -----------------------------------------------------
    FunctionDef {
        /// The Python-level name the function is bound under.
        name: String,
        /// The flat C++ name (class methods are mangled `Class__method`).
        emit_name: String,
        arguments: NodeId,
        body: Block,
        /// Filled by the scope analyzer.
        local_count: u32,
        /// Whether the body references any module-global name.
        uses_globals: bool,
    },
    ClassDef {
        /// The Python-level name the class is bound under.
        name: String,
        /// The flat C++ name, unique program-wide.
        emit_name: String,
        body: Block,
    },
    ImportStatement {
        /// `Some` for `import X [as a]`; `None` for `from X import ...`.
        alias: Option<String>,
        /// `from X import *`.
        star: bool,
        /// `(name, asname)` pairs for `from X import a as b, ...`.
        names: Vec<(String, String)>,
        /// Index of the translated module in the session's module list.
        module: usize,
    },
    Arguments {
        params: Vec<Param>,
        vararg: Option<String>,
        kwonly: Vec<Param>,
    },
    Global(Vec<String>),

    // --- Emission primitives ---------------------------------------------
    /// A raw C++ local declaration/assignment: `node *target = expr`.
    Assign { target: String, expr: EdgeId, declare: bool },
    /// Push a value onto the garbage collector's explicit root stack.
    PushTemp { expr: EdgeId },
    PopTemp,
    CollectGarbage,
}

/// An edge: a directed reference from a parent node's slot to a child node.
#[derive(Debug, Clone, Copy)]
pub struct EdgeData {
    pub parent: NodeId,
    pub target: NodeId,
}

#[derive(Debug)]
pub struct Node {
    pub kind: NodeKind,
    /// Incoming edges; kept in sync by `set_target` and `forward`.
    pub uses: Vec<EdgeId>,
}

/// Arena holding every node and edge of one translator run.
#[derive(Debug, Default)]
pub struct Graph {
    nodes: Vec<Node>,
    edges: Vec<EdgeData>,
}

impl Graph {
    pub fn new() -> Self {
        Self::default()
    }

    /// Create an edge pointing at `target`. The parent back-link is patched
    /// in when the owning node is created with [`Graph::node`].
    pub fn edge(&mut self, target: NodeId) -> EdgeId {
        let id = EdgeId(self.edges.len() as u32);
        self.edges.push(EdgeData {
            parent: NodeId::UNSET,
            target,
        });
        self.nodes[target.0 as usize].uses.push(id);
        id
    }

    /// Add a node to the arena, claiming ownership of every edge named by
    /// its slots.
    pub fn node(&mut self, kind: NodeKind) -> NodeId {
        let id = NodeId(self.nodes.len() as u32);
        for edge in kind_edges(&kind) {
            self.edges[edge.0 as usize].parent = id;
        }
        self.nodes.push(Node {
            kind,
            uses: Vec::new(),
        });
        id
    }

    pub fn kind(&self, id: NodeId) -> &NodeKind {
        &self.nodes[id.0 as usize].kind
    }

    pub fn kind_mut(&mut self, id: NodeId) -> &mut NodeKind {
        &mut self.nodes[id.0 as usize].kind
    }

    pub fn uses(&self, id: NodeId) -> &[EdgeId] {
        &self.nodes[id.0 as usize].uses
    }

    pub fn target(&self, edge: EdgeId) -> NodeId {
        self.edges[edge.0 as usize].target
    }

    pub fn parent(&self, edge: EdgeId) -> NodeId {
        self.edges[edge.0 as usize].parent
    }

    /// Redirect `edge` at `new`, maintaining both use lists.
    pub fn set_target(&mut self, edge: EdgeId, new: NodeId) {
        let old = self.edges[edge.0 as usize].target;
        if old == new {
            return;
        }
        let uses = &mut self.nodes[old.0 as usize].uses;
        if let Some(pos) = uses.iter().position(|&e| e == edge) {
            uses.remove(pos);
        }
        self.edges[edge.0 as usize].target = new;
        self.nodes[new.0 as usize].uses.push(edge);
    }

    /// Redirect every edge currently pointing at `old` to `new`.
    ///
    /// Used when a reduction produces a direct substitute for a node.
    pub fn forward(&mut self, old: NodeId, new: NodeId) {
        if old == new {
            return;
        }
        let uses = std::mem::take(&mut self.nodes[old.0 as usize].uses);
        for &edge in &uses {
            self.edges[edge.0 as usize].target = new;
        }
        self.nodes[new.0 as usize].uses.extend(uses);
    }

    /// Whether the node can appear inline in an emitted C++ expression.
    pub fn is_atom(&self, id: NodeId) -> bool {
        matches!(
            self.kind(id),
            NodeKind::NullConst
                | NodeKind::NoneConst
                | NodeKind::BoolConst(_)
                | NodeKind::IntConst(_)
                | NodeKind::StringConst(_)
                | NodeKind::BytesConst(_)
                | NodeKind::IntLiteral(_)
                | NodeKind::Identifier(_)
                | NodeKind::SingletonRef(_)
                | NodeKind::Load { .. }
                | NodeKind::Break
                | NodeKind::Continue
        )
    }

    /// Direct children of a node: edge targets in slot order, then the
    /// statements of each block slot, then structural node slots.
    pub fn children(&self, id: NodeId) -> Vec<NodeId> {
        let kind = self.kind(id);
        let mut out: Vec<NodeId> = kind_edges(kind)
            .into_iter()
            .map(|e| self.target(e))
            .collect();
        match kind {
            NodeKind::If { body, orelse, .. } => {
                out.extend(body.iter().copied());
                out.extend(orelse.iter().copied());
            }
            NodeKind::While { body, .. } | NodeKind::For { body, .. } => {
                out.extend(body.iter().copied());
            }
            NodeKind::FunctionDef {
                arguments, body, ..
            } => {
                out.push(*arguments);
                out.extend(body.iter().copied());
            }
            NodeKind::ClassDef { body, .. } => {
                out.extend(body.iter().copied());
            }
            _ => {}
        }
        out
    }

    /// Preorder walk of a subtree: the node itself, then every descendant
    /// reachable through edge, edge-list, and block slots, in stable order.
    pub fn iterate_subtree(&self, root: NodeId) -> Vec<NodeId> {
        let mut out = Vec::new();
        let mut stack = vec![root];
        while let Some(id) = stack.pop() {
            out.push(id);
            let mut children = self.children(id);
            children.reverse();
            stack.extend(children);
        }
        out
    }

    pub fn node_count(&self) -> usize {
        self.nodes.len()
    }
}

/// Every edge slot of a node kind, in declared (evaluation) order.
pub fn kind_edges(kind: &NodeKind) -> Vec<EdgeId> {
    match kind {
        NodeKind::NullConst
        | NodeKind::NoneConst
        | NodeKind::BoolConst(_)
        | NodeKind::IntConst(_)
        | NodeKind::StringConst(_)
        | NodeKind::BytesConst(_)
        | NodeKind::IntLiteral(_)
        | NodeKind::Identifier(_)
        | NodeKind::SingletonRef(_)
        | NodeKind::Load { .. }
        | NodeKind::Break
        | NodeKind::Continue
        | NodeKind::Global(_)
        | NodeKind::ImportStatement { .. }
        | NodeKind::ClassDef { .. }
        | NodeKind::PopTemp
        | NodeKind::CollectGarbage => Vec::new(),

        NodeKind::Ref { args, .. } => args.clone(),
        NodeKind::Store { expr, .. } => vec![*expr],
        NodeKind::StoreAttr { obj, attr, expr } => vec![*obj, *attr, *expr],
        NodeKind::StoreSubscript { obj, index, expr }
        | NodeKind::StoreSubscriptDirect { obj, index, expr } => vec![*obj, *index, *expr],
        NodeKind::DeleteSubscript { obj, index } | NodeKind::Subscript { obj, index } => {
            vec![*obj, *index]
        }
        NodeKind::Attribute { obj, attr } => vec![*obj, *attr],
        NodeKind::Slice {
            obj,
            lower,
            upper,
            step,
        } => vec![*obj, *lower, *upper, *step],
        NodeKind::UnaryOp { operand, .. } => vec![*operand],
        NodeKind::BinaryOp { lhs, rhs, .. } => vec![*lhs, *rhs],
        NodeKind::If { test, .. } => vec![*test],
        NodeKind::While { test, .. } => test.iter().copied().collect(),
        NodeKind::For { iter, .. } => vec![*iter],
        NodeKind::Return { value } => value.iter().copied().collect(),
        NodeKind::Assert { test, .. } => vec![*test],
        NodeKind::Raise { expr, .. } => vec![*expr],
        NodeKind::IfExp { test, body, orelse } => vec![*test, *body, *orelse],
        NodeKind::BoolOp { values, .. } => values.clone(),
        NodeKind::Comprehension {
            iter,
            ifs,
            elt,
            key,
            ..
        } => {
            let mut edges = vec![*iter];
            edges.extend(ifs.iter().copied());
            edges.extend(key.iter().copied());
            edges.push(*elt);
            edges
        }
        NodeKind::Test { expr, .. } | NodeKind::TestNonNull { expr, .. } => vec![*expr],
        NodeKind::List { items } | NodeKind::Tuple { items } | NodeKind::Set { items } => {
            items.clone()
        }
        NodeKind::TupleFromIter { iter } => vec![*iter],
        NodeKind::Dict { keys, values } => {
            // Source order: key then value for each item.
            let mut edges = Vec::with_capacity(keys.len() * 2);
            for (k, v) in keys.iter().zip(values.iter()) {
                edges.push(*k);
                edges.push(*v);
            }
            edges
        }
        NodeKind::CallSite {
            func,
            args,
            keywords,
        } => {
            let mut edges = vec![*func];
            edges.extend(args.iter().map(|a| a.value));
            edges.extend(keywords.iter().map(|k| k.value));
            edges
        }
        NodeKind::Call { func, args, kwargs } => vec![*func, *args, *kwargs],
        NodeKind::MethodCall { obj, args, .. } => {
            let mut edges = vec![*obj];
            edges.extend(args.iter().copied());
            edges
        }
        NodeKind::FunctionDef { .. } => Vec::new(),
        NodeKind::Arguments { params, kwonly, .. } => params
            .iter()
            .chain(kwonly.iter())
            .filter_map(|p| p.default)
            .collect(),
        NodeKind::Assign { expr, .. } => vec![*expr],
        NodeKind::PushTemp { expr } => vec![*expr],
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn load(g: &mut Graph, name: &str) -> NodeId {
        g.node(NodeKind::Load {
            name: name.to_string(),
            binding: None,
        })
    }

    #[test]
    fn edges_register_in_use_lists() {
        let mut g = Graph::new();
        let a = load(&mut g, "a");
        let b = load(&mut g, "b");
        let ea = g.edge(a);
        let eb = g.edge(b);
        let op = g.node(NodeKind::BinaryOp {
            op: "__add__",
            lhs: ea,
            rhs: eb,
        });
        assert_eq!(g.uses(a), &[ea]);
        assert_eq!(g.uses(b), &[eb]);
        assert_eq!(g.parent(ea), op);
        assert_eq!(g.parent(eb), op);
    }

    #[test]
    fn set_target_moves_use_list_entry() {
        let mut g = Graph::new();
        let a = load(&mut g, "a");
        let b = load(&mut g, "b");
        let e = g.edge(a);
        g.node(NodeKind::UnaryOp {
            op: "__neg__",
            operand: e,
        });
        g.set_target(e, b);
        assert!(g.uses(a).is_empty());
        assert_eq!(g.uses(b), &[e]);
        assert_eq!(g.target(e), b);
    }

    #[test]
    fn forward_redirects_every_use() {
        let mut g = Graph::new();
        let old = load(&mut g, "old");
        let new = load(&mut g, "new");
        let e1 = g.edge(old);
        let e2 = g.edge(old);
        g.node(NodeKind::BinaryOp {
            op: "__mul__",
            lhs: e1,
            rhs: e2,
        });
        g.forward(old, new);
        assert!(g.uses(old).is_empty());
        assert_eq!(g.uses(new), &[e1, e2]);
        assert_eq!(g.target(e1), new);
        assert_eq!(g.target(e2), new);
    }

    #[test]
    fn subtree_iteration_is_preorder_in_slot_order() {
        let mut g = Graph::new();
        let a = load(&mut g, "a");
        let b = load(&mut g, "b");
        let ea = g.edge(a);
        let eb = g.edge(b);
        let op = g.node(NodeKind::BinaryOp {
            op: "__sub__",
            lhs: ea,
            rhs: eb,
        });
        let eop = g.edge(op);
        let store = g.node(NodeKind::Store {
            name: "x".to_string(),
            binding: None,
            expr: eop,
        });
        assert_eq!(g.iterate_subtree(store), vec![store, op, a, b]);
    }

    #[test]
    fn atoms_have_no_edge_slots() {
        let mut g = Graph::new();
        let l = load(&mut g, "x");
        let i = g.node(NodeKind::Identifier("temp_01".to_string()));
        assert!(g.is_atom(l));
        assert!(g.is_atom(i));
        let e = g.edge(l);
        let op = g.node(NodeKind::UnaryOp {
            op: "__not__",
            operand: e,
        });
        assert!(!g.is_atom(op));
    }
}
