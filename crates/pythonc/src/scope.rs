//! Scope analysis: classifies every name reference and assigns dense indices.
//!
//! Runs once per module, after flattening. Pass 1 walks each function and
//! class body: names with an explicit `global` declaration, plus names loaded
//! but never stored, are module globals; everything else is local (or a class
//! attribute inside a class body). Local indices are assigned over the sorted
//! name set. Pass 2 accumulates the module-level names together with every
//! scope's surfaced globals and assigns global indices the same way, with
//! index 0 reserved for "undefined".

use std::collections::BTreeSet;

use crate::context::{Context, Module, bind};
use crate::intern::Session;
use crate::syntax::{Binding, NodeId, NodeKind};

/// A `Load` or `Store` waiting for a module-global index.
struct PendingGlobal {
    node: NodeId,
    name: String,
}

/// Bind every name in the module and return the completed translation unit.
pub fn analyze_module(sess: &mut Session, mut ctx: Context, stmts: Vec<NodeId>) -> Module {
    let mut accumulated: BTreeSet<String> = BTreeSet::new();
    let mut pending: Vec<PendingGlobal> = Vec::new();

    let functions = ctx.functions.clone();
    for func in functions {
        let surfaced = analyze_function(sess, func, &mut pending);
        accumulated.extend(surfaced);
    }

    let classes = ctx.classes.clone();
    for class in classes {
        let surfaced = analyze_class(sess, class, &mut pending);
        accumulated.extend(surfaced);
    }

    for &stmt in &stmts {
        for node in sess.graph.iterate_subtree(stmt) {
            match sess.graph.kind(node) {
                NodeKind::Load { name, .. } | NodeKind::Store { name, .. } => {
                    accumulated.insert(name.clone());
                    pending.push(PendingGlobal {
                        node,
                        name: name.clone(),
                    });
                }
                _ => {}
            }
        }
    }

    ctx.global_names = Vec::with_capacity(accumulated.len() + 1);
    ctx.global_names.push("<undefined>".to_string());
    ctx.global_names.extend(accumulated);

    for entry in pending {
        let idx = ctx.global_index(&entry.name).unwrap_or(0);
        bind(sess, entry.node, Binding::Global(idx));
    }

    Module { ctx, stmts }
}

/// Collected name references of one scope body.
struct NameRefs {
    loads: BTreeSet<String>,
    stores: BTreeSet<String>,
    declared: BTreeSet<String>,
    refs: Vec<(NodeId, String)>,
}

fn collect_refs(sess: &Session, body: &[NodeId]) -> NameRefs {
    let mut out = NameRefs {
        loads: BTreeSet::new(),
        stores: BTreeSet::new(),
        declared: BTreeSet::new(),
        refs: Vec::new(),
    };
    for &stmt in body {
        for node in sess.graph.iterate_subtree(stmt) {
            match sess.graph.kind(node) {
                NodeKind::Load { name, .. } => {
                    out.loads.insert(name.clone());
                    out.refs.push((node, name.clone()));
                }
                NodeKind::Store { name, .. } => {
                    out.stores.insert(name.clone());
                    out.refs.push((node, name.clone()));
                }
                NodeKind::Global(names) => {
                    out.declared.extend(names.iter().cloned());
                }
                _ => {}
            }
        }
    }
    out
}

fn analyze_function(
    sess: &mut Session,
    func: NodeId,
    pending: &mut Vec<PendingGlobal>,
) -> BTreeSet<String> {
    let body = match sess.graph.kind(func) {
        NodeKind::FunctionDef { body, .. } => body.clone(),
        other => panic!("analyze_function on {other:?}"),
    };
    let refs = collect_refs(sess, &body);

    let mut globals: BTreeSet<String> = refs.declared.clone();
    globals.extend(refs.loads.difference(&refs.stores).cloned());
    let locals: Vec<String> = refs
        .loads
        .union(&refs.stores)
        .filter(|name| !globals.contains(*name))
        .cloned()
        .collect();

    let mut uses_globals = false;
    for (node, name) in refs.refs {
        if let Some(idx) = locals.iter().position(|l| *l == name) {
            bind(sess, node, Binding::Local(idx as u32));
        } else {
            uses_globals = true;
            pending.push(PendingGlobal { node, name });
        }
    }

    match sess.graph.kind_mut(func) {
        NodeKind::FunctionDef {
            local_count,
            uses_globals: flag,
            ..
        } => {
            *local_count = locals.len() as u32;
            *flag = uses_globals;
        }
        _ => unreachable!(),
    }
    globals
}

/// Class bodies have no locals: stored names become class attributes, and a
/// load resolves to the class attribute when the body also stores the name,
/// otherwise to a module global.
fn analyze_class(
    sess: &mut Session,
    class: NodeId,
    pending: &mut Vec<PendingGlobal>,
) -> BTreeSet<String> {
    let body = match sess.graph.kind(class) {
        NodeKind::ClassDef { body, .. } => body.clone(),
        other => panic!("analyze_class on {other:?}"),
    };
    let refs = collect_refs(sess, &body);

    let mut surfaced = BTreeSet::new();
    for (node, name) in refs.refs {
        let is_store = matches!(sess.graph.kind(node), NodeKind::Store { .. });
        let is_attr =
            (is_store || refs.stores.contains(&name)) && !refs.declared.contains(&name);
        if is_attr {
            bind(sess, node, Binding::ClassAttr);
        } else {
            surfaced.insert(name.clone());
            pending.push(PendingGlobal { node, name });
        }
    }
    surfaced
}

#[cfg(test)]
mod tests {
    use super::*;

    fn store(sess: &mut Session, name: &str) -> NodeId {
        let value = sess.graph.node(NodeKind::NoneConst);
        sess.store(name, value)
    }

    #[test]
    fn module_globals_are_sorted_with_reserved_zero() {
        let mut sess = Session::new();
        let ctx = Context::new("m");
        let s1 = store(&mut sess, "zebra");
        let s2 = store(&mut sess, "apple");
        let module = analyze_module(&mut sess, ctx, vec![s1, s2]);
        assert_eq!(
            module.ctx.global_names,
            vec!["<undefined>", "apple", "zebra"]
        );
        match sess.graph.kind(s1) {
            NodeKind::Store { binding, .. } => assert_eq!(*binding, Some(Binding::Global(2))),
            _ => unreachable!(),
        }
        match sess.graph.kind(s2) {
            NodeKind::Store { binding, .. } => assert_eq!(*binding, Some(Binding::Global(1))),
            _ => unreachable!(),
        }
    }

    #[test]
    fn function_locals_get_contiguous_sorted_indices() {
        let mut sess = Session::new();
        let mut ctx = Context::new("m");

        // def f(): b = None; a = None; return g
        let s_b = store(&mut sess, "b");
        let s_a = store(&mut sess, "a");
        let g_load = sess.load("g");
        let value = sess.graph.edge(g_load);
        let ret = sess.graph.node(NodeKind::Return { value: Some(value) });
        let arguments = sess.graph.node(NodeKind::Arguments {
            params: vec![],
            vararg: None,
            kwonly: vec![],
        });
        let func = sess.graph.node(NodeKind::FunctionDef {
            name: "f".to_string(),
            emit_name: "f".to_string(),
            arguments,
            body: vec![s_b, s_a, ret],
            local_count: 0,
            uses_globals: false,
        });
        ctx.functions.push(func);

        let module = analyze_module(&mut sess, ctx, vec![]);

        match sess.graph.kind(s_a) {
            NodeKind::Store { binding, .. } => assert_eq!(*binding, Some(Binding::Local(0))),
            _ => unreachable!(),
        }
        match sess.graph.kind(s_b) {
            NodeKind::Store { binding, .. } => assert_eq!(*binding, Some(Binding::Local(1))),
            _ => unreachable!(),
        }
        // g surfaced to the module table.
        match sess.graph.kind(g_load) {
            NodeKind::Load { binding, .. } => assert_eq!(*binding, Some(Binding::Global(1))),
            _ => unreachable!(),
        }
        match sess.graph.kind(func) {
            NodeKind::FunctionDef {
                local_count,
                uses_globals,
                ..
            } => {
                assert_eq!(*local_count, 2);
                assert!(*uses_globals);
            }
            _ => unreachable!(),
        }
        assert_eq!(module.ctx.global_names, vec!["<undefined>", "g"]);
    }

    #[test]
    fn global_declaration_overrides_store() {
        let mut sess = Session::new();
        let mut ctx = Context::new("m");

        // def f(): global x; x = None
        let decl = sess.graph.node(NodeKind::Global(vec!["x".to_string()]));
        let s_x = store(&mut sess, "x");
        let arguments = sess.graph.node(NodeKind::Arguments {
            params: vec![],
            vararg: None,
            kwonly: vec![],
        });
        let func = sess.graph.node(NodeKind::FunctionDef {
            name: "f".to_string(),
            emit_name: "f".to_string(),
            arguments,
            body: vec![decl, s_x],
            local_count: 0,
            uses_globals: false,
        });
        ctx.functions.push(func);

        let module = analyze_module(&mut sess, ctx, vec![]);
        match sess.graph.kind(s_x) {
            NodeKind::Store { binding, .. } => assert_eq!(*binding, Some(Binding::Global(1))),
            _ => unreachable!(),
        }
        assert_eq!(module.ctx.global_names, vec!["<undefined>", "x"]);
    }
}
