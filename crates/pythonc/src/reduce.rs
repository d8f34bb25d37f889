//! Reduction rules: per-variant rewrites applied during flattening.
//!
//! Each rule rewrites one node into simpler nodes, emitting auxiliary
//! statements into the current buffer as it goes. A rule that produces a
//! substitute node hands it back to the reduction loop, which keeps reducing
//! until the result is stable. After reduction only primitive control flow
//! (`If`, `While`, `Break`, `Continue`), stores, and atomic operands remain;
//! comprehensions, `for` loops, bool-ops, conditional expressions, and
//! collection literals are all gone.

use crate::context::{
    Context, flatten_block, flatten_edge, hoist, is_effect_free, with_buffer,
};
use crate::intern::Session;
use crate::syntax::{
    BoolSense, CallArg, CompKind, EdgeId, ForTarget, Keyword, NodeId, NodeKind, Param,
};

/// Reduce a statement node, appending the result (and any auxiliary
/// statements) to the current buffer.
pub fn reduce_stmt(sess: &mut Session, ctx: &mut Context, stmt: NodeId) {
    let kind = sess.graph.kind(stmt).clone();
    match kind {
        NodeKind::Store { expr, .. } => {
            flatten_edge(sess, ctx, expr, true);
            ctx.statements.push(stmt);
        }

        NodeKind::StoreAttr { obj, expr, .. } => {
            // Python evaluates the assigned value before the target base.
            flatten_edge(sess, ctx, expr, true);
            flatten_edge(sess, ctx, obj, false);
            ctx.statements.push(stmt);
        }

        NodeKind::StoreSubscript { obj, index, expr } => {
            flatten_edge(sess, ctx, expr, true);
            flatten_edge(sess, ctx, obj, false);
            flatten_edge(sess, ctx, index, false);
            ctx.statements.push(stmt);
        }

        NodeKind::DeleteSubscript { obj, index } => {
            flatten_edge(sess, ctx, obj, false);
            flatten_edge(sess, ctx, index, false);
            ctx.statements.push(stmt);
        }

        NodeKind::If { test, body, orelse } => {
            flatten_edge(sess, ctx, test, true);
            let new_if = build_if(sess, ctx, test, &body, &orelse);
            ctx.statements.push(new_if);
        }

        NodeKind::While { test, body } => {
            let test = test.expect("surface while statement without a condition");
            // The condition is re-evaluated at the top of every iteration, so
            // its supporting statements become the head of the loop body.
            let (mut new_body, ()) = with_buffer(sess, ctx, |sess, ctx| {
                flatten_edge(sess, ctx, test, true);
            });
            let cond = sess.graph.target(test);
            new_body.push(break_unless(sess, cond, TestMode::Truth));
            new_body.extend(flatten_block(sess, ctx, &body));
            new_body.push(sess.graph.node(NodeKind::CollectGarbage));
            let lowered = sess.graph.node(NodeKind::While {
                test: None,
                body: new_body,
            });
            ctx.statements.push(lowered);
        }

        NodeKind::For { target, iter, body } => {
            flatten_edge(sess, ctx, iter, false);
            let iter_atom = sess.graph.target(iter);
            let inner = flatten_block(sess, ctx, &body);
            lower_loop(sess, ctx, iter_atom, &target, inner);
        }

        NodeKind::Return { value } => {
            if let Some(value) = value {
                flatten_edge(sess, ctx, value, true);
            }
            ctx.statements.push(stmt);
        }

        NodeKind::Assert { test, .. } => {
            flatten_edge(sess, ctx, test, true);
            ctx.statements.push(stmt);
        }

        NodeKind::Raise { expr, .. } => {
            flatten_edge(sess, ctx, expr, true);
            ctx.statements.push(stmt);
        }

        NodeKind::FunctionDef { .. } => reduce_function_def(sess, ctx, stmt),
        NodeKind::ClassDef { .. } => reduce_class_def(sess, ctx, stmt),
        NodeKind::ImportStatement { .. } => reduce_import(sess, ctx, stmt),

        NodeKind::Assign { expr, .. } => {
            flatten_edge(sess, ctx, expr, true);
            ctx.statements.push(stmt);
        }

        NodeKind::Break
        | NodeKind::Continue
        | NodeKind::Global(_)
        | NodeKind::PushTemp { .. }
        | NodeKind::PopTemp
        | NodeKind::CollectGarbage => {
            ctx.statements.push(stmt);
        }

        // Anything else is an expression in statement position. Constant
        // atoms (docstrings and the like) evaluate to nothing and are
        // dropped; everything else is kept for its effects.
        _ => {
            let reduced = reduce_expr(sess, ctx, stmt);
            if !is_effect_free(sess, reduced) {
                ctx.statements.push(reduced);
            }
        }
    }
}

/// Reduce an expression node until stable, emitting auxiliary statements into
/// the current buffer. The result still has to be hoisted by the caller if an
/// atom is required.
pub fn reduce_expr(sess: &mut Session, ctx: &mut Context, node: NodeId) -> NodeId {
    let mut node = node;
    loop {
        if sess.graph.is_atom(node) {
            return node;
        }
        let kind = sess.graph.kind(node).clone();
        match kind {
            NodeKind::BinaryOp { op, lhs, rhs } => {
                let l = sess.graph.target(lhs);
                let r = sess.graph.target(rhs);
                if let Some(folded) = fold_binary(sess, op, l, r) {
                    node = folded;
                    continue;
                }
                flatten_edge(sess, ctx, lhs, false);
                flatten_edge(sess, ctx, rhs, false);
                return node;
            }

            NodeKind::UnaryOp { op, operand } => {
                let value = sess.graph.target(operand);
                if let Some(folded) = fold_unary(sess, op, value) {
                    node = folded;
                    continue;
                }
                flatten_edge(sess, ctx, operand, false);
                return node;
            }

            NodeKind::List { items } => {
                return reduce_sequence(sess, ctx, "list", &items);
            }
            NodeKind::Tuple { items } => {
                return reduce_sequence(sess, ctx, "tuple", &items);
            }

            NodeKind::Set { items } => {
                for &item in &items {
                    flatten_edge(sess, ctx, item, false);
                }
                let result = alloc_collection(sess, ctx, "set", items.len());
                for &item in &items {
                    let value = sess.graph.target(item);
                    let call = sess.method_call(result, "add", vec![value]);
                    ctx.statements.push(call);
                }
                return result;
            }

            NodeKind::Dict { keys, values } => {
                for (&k, &v) in keys.iter().zip(values.iter()) {
                    flatten_edge(sess, ctx, k, false);
                    flatten_edge(sess, ctx, v, false);
                }
                let result = alloc_collection(sess, ctx, "dict", keys.len());
                for (&k, &v) in keys.iter().zip(values.iter()) {
                    let key = sess.graph.target(k);
                    let value = sess.graph.target(v);
                    let obj = sess.graph.edge(result);
                    let index = sess.graph.edge(key);
                    let expr = sess.graph.edge(value);
                    let store = sess
                        .graph
                        .node(NodeKind::StoreSubscript { obj, index, expr });
                    ctx.statements.push(store);
                }
                return result;
            }

            NodeKind::TupleFromIter { iter } => {
                flatten_edge(sess, ctx, iter, false);
                return node;
            }

            NodeKind::Comprehension {
                kind,
                target,
                iter,
                ifs,
                elt,
                key,
            } => {
                return reduce_comprehension(sess, ctx, kind, &target, iter, &ifs, elt, key);
            }

            NodeKind::IfExp { test, body, orelse } => {
                flatten_edge(sess, ctx, test, true);
                let temp = ctx.get_temp();
                let null = sess.graph.node(NodeKind::NullConst);
                let init = sess.store(&temp, null);
                ctx.statements.push(init);

                let (mut true_stmts, ()) = with_buffer(sess, ctx, |sess, ctx| {
                    flatten_edge(sess, ctx, body, true);
                });
                let true_value = sess.graph.target(body);
                true_stmts.push(sess.store(&temp, true_value));

                let (mut false_stmts, ()) = with_buffer(sess, ctx, |sess, ctx| {
                    flatten_edge(sess, ctx, orelse, true);
                });
                let false_value = sess.graph.target(orelse);
                false_stmts.push(sess.store(&temp, false_value));

                let cond = sess.graph.target(test);
                let cond_edge = sess.graph.edge(cond);
                let test_node = sess.graph.node(NodeKind::Test {
                    expr: cond_edge,
                    sense: true,
                });
                let test_edge = sess.graph.edge(test_node);
                let if_node = sess.graph.node(NodeKind::If {
                    test: test_edge,
                    body: true_stmts,
                    orelse: false_stmts,
                });
                ctx.statements.push(if_node);
                return sess.load(&temp);
            }

            NodeKind::BoolOp { op, values } => {
                let temp = ctx.get_temp();
                flatten_edge(sess, ctx, values[0], true);
                let first = sess.graph.target(values[0]);
                let init = sess.store(&temp, first);
                ctx.statements.push(init);

                // `a and b`: overwrite while the accumulator is truthy.
                // `a or b`: the branches of the test are swapped, so the
                // overwrite happens while the accumulator is falsy.
                for &value in &values[1..] {
                    let (mut stmts, ()) = with_buffer(sess, ctx, |sess, ctx| {
                        flatten_edge(sess, ctx, value, true);
                    });
                    let rhs = sess.graph.target(value);
                    stmts.push(sess.store(&temp, rhs));
                    let acc = sess.load(&temp);
                    let acc_edge = sess.graph.edge(acc);
                    let test_node = sess.graph.node(NodeKind::Test {
                        expr: acc_edge,
                        sense: op == BoolSense::And,
                    });
                    let test_edge = sess.graph.edge(test_node);
                    let if_node = sess.graph.node(NodeKind::If {
                        test: test_edge,
                        body: stmts,
                        orelse: Vec::new(),
                    });
                    ctx.statements.push(if_node);
                }
                return sess.load(&temp);
            }

            NodeKind::CallSite {
                func,
                args,
                keywords,
            } => {
                return reduce_call_site(sess, ctx, func, &args, &keywords);
            }

            NodeKind::Call { func, args, kwargs } => {
                flatten_edge(sess, ctx, func, false);
                flatten_edge(sess, ctx, args, false);
                flatten_edge(sess, ctx, kwargs, false);
                return node;
            }

            NodeKind::MethodCall { obj, args, .. } => {
                flatten_edge(sess, ctx, obj, false);
                for &arg in &args {
                    flatten_edge(sess, ctx, arg, false);
                }
                return node;
            }

            NodeKind::Ref { args, .. } => {
                for &arg in &args {
                    flatten_edge(sess, ctx, arg, false);
                }
                return node;
            }

            NodeKind::Attribute { obj, .. } => {
                flatten_edge(sess, ctx, obj, false);
                return node;
            }

            NodeKind::Subscript { obj, index } => {
                flatten_edge(sess, ctx, obj, false);
                flatten_edge(sess, ctx, index, false);
                return node;
            }

            NodeKind::Slice {
                obj,
                lower,
                upper,
                step,
            } => {
                flatten_edge(sess, ctx, obj, false);
                flatten_edge(sess, ctx, lower, false);
                flatten_edge(sess, ctx, upper, false);
                flatten_edge(sess, ctx, step, false);
                return node;
            }

            NodeKind::Test { expr, .. } | NodeKind::TestNonNull { expr, .. } => {
                flatten_edge(sess, ctx, expr, true);
                return node;
            }

            other => panic!("statement node in expression position: {other:?}"),
        }
    }
}

// ---------------------------------------------------------------------------
// Collection and call lowering
// ---------------------------------------------------------------------------

/// `Store(temp, Ref(class, [n]))`, returning the `Load(temp)` atom.
fn alloc_collection(sess: &mut Session, ctx: &mut Context, class: &'static str, len: usize) -> NodeId {
    let cap = sess.graph.node(NodeKind::IntLiteral(len as i64));
    let cap_edge = sess.graph.edge(cap);
    let r = sess.graph.node(NodeKind::Ref {
        class,
        args: vec![cap_edge],
    });
    hoist(sess, ctx, r)
}

/// List/tuple literal: direct slot stores into a fresh collection.
fn reduce_sequence(
    sess: &mut Session,
    ctx: &mut Context,
    class: &'static str,
    items: &[EdgeId],
) -> NodeId {
    for &item in items {
        flatten_edge(sess, ctx, item, false);
    }
    let result = alloc_collection(sess, ctx, class, items.len());
    for (i, &item) in items.iter().enumerate() {
        let value = sess.graph.target(item);
        let obj = sess.graph.edge(result);
        let idx = sess.graph.node(NodeKind::IntLiteral(i as i64));
        let index = sess.graph.edge(idx);
        let expr = sess.graph.edge(value);
        let store = sess
            .graph
            .node(NodeKind::StoreSubscriptDirect { obj, index, expr });
        ctx.statements.push(store);
    }
    result
}

enum TestMode {
    /// Break when `test_truth(value)` is false.
    Truth,
    /// Break when `value` is NULL.
    NonNull,
}

/// `if (!<test>) break;`
fn break_unless(sess: &mut Session, value: NodeId, mode: TestMode) -> NodeId {
    let expr = sess.graph.edge(value);
    let test_node = match mode {
        TestMode::Truth => sess.graph.node(NodeKind::Test { expr, sense: false }),
        TestMode::NonNull => sess
            .graph
            .node(NodeKind::TestNonNull { expr, sense: false }),
    };
    let test = sess.graph.edge(test_node);
    let brk = sess.graph.node(NodeKind::Break);
    sess.graph.node(NodeKind::If {
        test,
        body: vec![brk],
        orelse: Vec::new(),
    })
}

/// Rebuild an `If` statement with a truth-wrapped condition and flattened
/// branch blocks.
fn build_if(
    sess: &mut Session,
    ctx: &mut Context,
    test: EdgeId,
    body: &[NodeId],
    orelse: &[NodeId],
) -> NodeId {
    let cond = sess.graph.target(test);
    let cond_edge = sess.graph.edge(cond);
    let test_node = sess.graph.node(NodeKind::Test {
        expr: cond_edge,
        sense: true,
    });
    let test_edge = sess.graph.edge(test_node);
    let body = flatten_block(sess, ctx, body);
    let orelse = flatten_block(sess, ctx, orelse);
    sess.graph.node(NodeKind::If {
        test: test_edge,
        body,
        orelse,
    })
}

/// Shared iterator lowering for `for` statements and comprehensions:
///
/// ```text
/// node *temp_it = <iterable>->__iter__();
/// push_temp_root(temp_it);
/// while (1) {
///     node *temp_item = temp_it->next();
///     if (temp_item == NULL) break;
///     <unpack target>
///     <inner statements>
///     collect_garbage(ctx);
/// }
/// pop_temp_root();
/// ```
///
/// The iterator lives in a raw C++ local, so it is pushed onto the explicit
/// root stack to survive the collection at the bottom of every iteration.
fn lower_loop(
    sess: &mut Session,
    ctx: &mut Context,
    iterable: NodeId,
    target: &ForTarget,
    inner: Vec<NodeId>,
) {
    let it = ctx.get_temp();
    let iter_call = sess.method_call(iterable, "__iter__", vec![]);
    let iter_edge = sess.graph.edge(iter_call);
    let decl = sess.graph.node(NodeKind::Assign {
        target: it.clone(),
        expr: iter_edge,
        declare: true,
    });
    ctx.statements.push(decl);

    let it_ref = sess.identifier(&it);
    let push_edge = sess.graph.edge(it_ref);
    let push = sess.graph.node(NodeKind::PushTemp { expr: push_edge });
    ctx.statements.push(push);

    let mut body = Vec::new();
    let item = ctx.get_temp();
    let it_ref = sess.identifier(&it);
    let next_call = sess.method_call(it_ref, "next", vec![]);
    let next_edge = sess.graph.edge(next_call);
    body.push(sess.graph.node(NodeKind::Assign {
        target: item.clone(),
        expr: next_edge,
        declare: true,
    }));
    let item_ref = sess.identifier(&item);
    body.push(break_unless(sess, item_ref, TestMode::NonNull));

    match target {
        ForTarget::Name(name) => {
            let item_ref = sess.identifier(&item);
            body.push(sess.store(name, item_ref));
        }
        ForTarget::Tuple(names) => {
            for (i, name) in names.iter().enumerate() {
                let item_ref = sess.identifier(&item);
                let idx = sess.graph.node(NodeKind::IntLiteral(i as i64));
                let get = sess.method_call(item_ref, "__getitem__", vec![idx]);
                body.push(sess.store(name, get));
            }
        }
    }

    body.extend(inner);
    body.push(sess.graph.node(NodeKind::CollectGarbage));

    let lowered = sess.graph.node(NodeKind::While { test: None, body });
    ctx.statements.push(lowered);
    ctx.statements.push(sess.graph.node(NodeKind::PopTemp));
}

#[allow(clippy::too_many_arguments)]
fn reduce_comprehension(
    sess: &mut Session,
    ctx: &mut Context,
    kind: CompKind,
    target: &ForTarget,
    iter: EdgeId,
    ifs: &[EdgeId],
    elt: EdgeId,
    key: Option<EdgeId>,
) -> NodeId {
    let class = match kind {
        CompKind::List => "list",
        CompKind::Set => "set",
        CompKind::Dict => "dict",
    };
    let result = alloc_collection(sess, ctx, class, 0);
    let result_name = match sess.graph.kind(result) {
        NodeKind::Load { name, .. } => name.clone(),
        _ => unreachable!(),
    };

    flatten_edge(sess, ctx, iter, false);
    let iterable = sess.graph.target(iter);

    let (inner, ()) = with_buffer(sess, ctx, |sess, ctx| {
        // Filter conditions skip to the next iteration when false.
        for &cond in ifs {
            flatten_edge(sess, ctx, cond, true);
            let value = sess.graph.target(cond);
            let expr = sess.graph.edge(value);
            let test_node = sess.graph.node(NodeKind::Test { expr, sense: false });
            let test = sess.graph.edge(test_node);
            let cont = sess.graph.node(NodeKind::Continue);
            let skip = sess.graph.node(NodeKind::If {
                test,
                body: vec![cont],
                orelse: Vec::new(),
            });
            ctx.statements.push(skip);
        }

        if let Some(key) = key {
            flatten_edge(sess, ctx, key, false);
        }
        flatten_edge(sess, ctx, elt, false);
        let value = sess.graph.target(elt);
        let acc = sess.load(&result_name);
        let stmt = match (kind, key) {
            (CompKind::List, _) => sess.method_call(acc, "append", vec![value]),
            (CompKind::Set, _) => sess.method_call(acc, "add", vec![value]),
            (CompKind::Dict, Some(key)) => {
                let key_value = sess.graph.target(key);
                let obj = sess.graph.edge(acc);
                let index = sess.graph.edge(key_value);
                let expr = sess.graph.edge(value);
                sess.graph
                    .node(NodeKind::StoreSubscript { obj, index, expr })
            }
            (CompKind::Dict, None) => unreachable!("dict comprehension without a key"),
        };
        ctx.statements.push(stmt);
    });

    lower_loop(sess, ctx, iterable, target, inner);
    sess.load(&result_name)
}

/// Normalize a source-level call site into `Call(func, args_tuple, kwargs)`.
fn reduce_call_site(
    sess: &mut Session,
    ctx: &mut Context,
    func: EdgeId,
    args: &[CallArg],
    keywords: &[Keyword],
) -> NodeId {
    flatten_edge(sess, ctx, func, false);
    let func_atom = sess.graph.target(func);

    let has_star = args.iter().any(|a| a.star);
    let args_atom = if has_star {
        // Accumulate into a list, then snapshot it as the argument tuple.
        let acc = alloc_collection(sess, ctx, "list", 0);
        for arg in args {
            flatten_edge(sess, ctx, arg.value, false);
            let value = sess.graph.target(arg.value);
            let method = if arg.star { "extend" } else { "append" };
            let call = sess.method_call(acc, method, vec![value]);
            ctx.statements.push(call);
        }
        let iter_edge = sess.graph.edge(acc);
        let from_iter = sess.graph.node(NodeKind::TupleFromIter { iter: iter_edge });
        hoist(sess, ctx, from_iter)
    } else {
        for arg in args {
            flatten_edge(sess, ctx, arg.value, false);
        }
        let tuple = alloc_collection(sess, ctx, "tuple", args.len());
        for (i, arg) in args.iter().enumerate() {
            let value = sess.graph.target(arg.value);
            let obj = sess.graph.edge(tuple);
            let idx = sess.graph.node(NodeKind::IntLiteral(i as i64));
            let index = sess.graph.edge(idx);
            let expr = sess.graph.edge(value);
            let store = sess
                .graph
                .node(NodeKind::StoreSubscriptDirect { obj, index, expr });
            ctx.statements.push(store);
        }
        tuple
    };

    let kwargs_atom = if keywords.is_empty() {
        sess.graph.node(NodeKind::NullConst)
    } else {
        let acc = alloc_collection(sess, ctx, "dict", keywords.len());
        for kw in keywords {
            flatten_edge(sess, ctx, kw.value, false);
            let value = sess.graph.target(kw.value);
            match &kw.name {
                Some(name) => {
                    let key = sess.string_const(name);
                    let obj = sess.graph.edge(acc);
                    let index = sess.graph.edge(key);
                    let expr = sess.graph.edge(value);
                    let store = sess
                        .graph
                        .node(NodeKind::StoreSubscript { obj, index, expr });
                    ctx.statements.push(store);
                }
                None => {
                    let call = sess.method_call(acc, "update", vec![value]);
                    ctx.statements.push(call);
                }
            }
        }
        acc
    };

    let func_edge = sess.graph.edge(func_atom);
    let args_edge = sess.graph.edge(args_atom);
    let kwargs_edge = sess.graph.edge(kwargs_atom);
    sess.graph.node(NodeKind::Call {
        func: func_edge,
        args: args_edge,
        kwargs: kwargs_edge,
    })
}

// ---------------------------------------------------------------------------
// Definitions
// ---------------------------------------------------------------------------

fn reduce_function_def(sess: &mut Session, ctx: &mut Context, node: NodeId) {
    let NodeKind::FunctionDef {
        name,
        emit_name,
        arguments,
        body,
        ..
    } = sess.graph.kind(node).clone()
    else {
        unreachable!()
    };
    let NodeKind::Arguments {
        params,
        vararg,
        kwonly,
    } = sess.graph.kind(arguments).clone()
    else {
        unreachable!()
    };

    let mut prologue = Vec::new();
    let required = params.iter().filter(|p| p.default.is_none()).count();
    let max = if vararg.is_some() {
        -1
    } else {
        params.len() as i64
    };
    let args_ref = sess.identifier("args");
    let min_lit = sess.graph.node(NodeKind::IntLiteral(required as i64));
    let max_lit = sess.graph.node(NodeKind::IntLiteral(max));
    prologue.push(sess.method_call(args_ref, "check_arg_count", vec![min_lit, max_lit]));

    for (i, param) in params.iter().enumerate() {
        prologue.push(bind_param(sess, param, Some(i)));
    }
    if let Some(vararg) = &vararg {
        let args_ref = sess.identifier("args");
        let skip = sess.graph.node(NodeKind::IntLiteral(params.len() as i64));
        let tail = sess.method_call(args_ref, "tail", vec![skip]);
        prologue.push(sess.store(vararg, tail));
    }
    for param in &kwonly {
        prologue.push(bind_param(sess, param, None));
    }

    let mut new_body = prologue;
    new_body.extend(flatten_block(sess, ctx, &body));

    *sess.graph.kind_mut(node) = NodeKind::FunctionDef {
        name: name.clone(),
        emit_name: emit_name.clone(),
        arguments,
        body: new_body,
        local_count: 0,
        uses_globals: false,
    };
    ctx.functions.push(node);

    let handle = sess.identifier(&format!("fn_{emit_name}"));
    let handle_edge = sess.graph.edge(handle);
    let func_obj = sess.graph.node(NodeKind::Ref {
        class: "function_def",
        args: vec![handle_edge],
    });
    let store = sess.store(&name, func_obj);
    ctx.statements.push(store);
}

/// One parameter-binding store of the function prologue. Positional
/// parameters fall back to a keyword argument and then their default;
/// keyword-only parameters skip the positional lookup. A NULL default marks
/// a required parameter, which the runtime reports when absent.
fn bind_param(sess: &mut Session, param: &Param, position: Option<usize>) -> NodeId {
    let default = match param.default {
        Some(edge) => sess.graph.target(edge),
        None => sess.graph.node(NodeKind::NullConst),
    };
    let name_const = sess.string_const(&param.name);
    let kwargs_ref = sess.identifier("kwargs");
    let args_ref = sess.identifier("args");
    let call = match position {
        Some(i) => {
            let idx = sess.graph.node(NodeKind::IntLiteral(i as i64));
            sess.method_call(
                args_ref,
                "get_arg",
                vec![idx, name_const, default, kwargs_ref],
            )
        }
        None => sess.method_call(args_ref, "get_kwonly", vec![name_const, default, kwargs_ref]),
    };
    sess.store(&param.name, call)
}

fn reduce_class_def(sess: &mut Session, ctx: &mut Context, node: NodeId) {
    let NodeKind::ClassDef {
        name,
        emit_name,
        body,
    } = sess.graph.kind(node).clone()
    else {
        unreachable!()
    };
    let flat = flatten_block(sess, ctx, &body);
    *sess.graph.kind_mut(node) = NodeKind::ClassDef {
        name: name.clone(),
        emit_name: emit_name.clone(),
        body: flat,
    };
    ctx.classes.push(node);

    // Executing the class statement runs the body once and binds the class
    // object; `__create__` returns the singleton.
    let singleton = sess.singleton_ref(format!("{emit_name}_singleton.__create__(ctx, globals)"));
    let store = sess.store(&name, singleton);
    ctx.statements.push(store);
}

fn reduce_import(sess: &mut Session, ctx: &mut Context, node: NodeId) {
    let NodeKind::ImportStatement {
        alias,
        star,
        names,
        module,
    } = sess.graph.kind(node).clone()
    else {
        unreachable!()
    };
    ctx.imports.push(node);

    let module_name = sess.modules[module].ctx.name.clone();
    if let Some(alias) = alias {
        let singleton = sess.singleton_ref(format!("(node *)&module_{module_name}_singleton"));
        let store = sess.store(&alias, singleton);
        ctx.statements.push(store);
        return;
    }

    let globals = sess.modules[module].ctx.global_names.clone();
    if star {
        // Index 0 is the reserved "undefined" slot; underscore-prefixed names
        // and flattener temporaries are not exported.
        for (idx, name) in globals.iter().enumerate().skip(1) {
            if name.starts_with('_') || name.starts_with("temp_") {
                continue;
            }
            let value = sess.singleton_ref(format!("ctx_{module_name}->load({idx})"));
            let store = sess.store(name, value);
            ctx.statements.push(store);
        }
    } else {
        for (name, asname) in &names {
            // Presence was validated when the import was translated.
            if let Some(idx) = globals.iter().position(|g| g == name) {
                let value = sess.singleton_ref(format!("ctx_{module_name}->load({idx})"));
                let store = sess.store(asname, value);
                ctx.statements.push(store);
            }
        }
    }
}

// ---------------------------------------------------------------------------
// Constant folding
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy)]
enum Folded {
    Int(i64),
    Bool(bool),
    Str(u32),
    Bytes(u32),
}

fn as_folded(sess: &Session, node: NodeId) -> Option<Folded> {
    match sess.graph.kind(node) {
        NodeKind::IntConst(v) => Some(Folded::Int(*v)),
        NodeKind::BoolConst(b) => Some(Folded::Bool(*b)),
        NodeKind::StringConst(id) => Some(Folded::Str(*id)),
        NodeKind::BytesConst(id) => Some(Folded::Bytes(*id)),
        _ => None,
    }
}

/// Python floor division; `None` on division by zero or overflow.
fn py_floordiv(a: i64, b: i64) -> Option<i64> {
    if b == 0 {
        return None;
    }
    let q = a.checked_div(b)?;
    let r = a.checked_rem(b)?;
    if r != 0 && ((r < 0) != (b < 0)) {
        Some(q - 1)
    } else {
        Some(q)
    }
}

/// Python modulo: the result takes the sign of the divisor.
fn py_mod(a: i64, b: i64) -> Option<i64> {
    if b == 0 {
        return None;
    }
    let r = a.checked_rem(b)?;
    if r != 0 && ((r < 0) != (b < 0)) {
        Some(r + b)
    } else {
        Some(r)
    }
}

fn fold_int_op(op: &str, a: i64, b: i64) -> Option<Folded> {
    let v = match op {
        "__add__" => a.checked_add(b)?,
        "__sub__" => a.checked_sub(b)?,
        "__mul__" => a.checked_mul(b)?,
        "__floordiv__" => py_floordiv(a, b)?,
        "__mod__" => py_mod(a, b)?,
        "__pow__" => {
            let exp = u32::try_from(b).ok()?;
            a.checked_pow(exp)?
        }
        "__and__" => a & b,
        "__or__" => a | b,
        "__xor__" => a ^ b,
        "__lshift__" => {
            if !(0..=62).contains(&b) {
                return None;
            }
            a.checked_mul(1i64.checked_shl(b as u32)?)?
        }
        "__rshift__" => {
            if !(0..=63).contains(&b) {
                return None;
            }
            a >> b
        }
        "__eq__" => return Some(Folded::Bool(a == b)),
        "__ne__" => return Some(Folded::Bool(a != b)),
        "__lt__" => return Some(Folded::Bool(a < b)),
        "__lte__" => return Some(Folded::Bool(a <= b)),
        "__gt__" => return Some(Folded::Bool(a > b)),
        "__gte__" => return Some(Folded::Bool(a >= b)),
        _ => return None,
    };
    Some(Folded::Int(v))
}

/// Fold a binary operation over two constant operands at translate time.
/// Returns `None` (leaving the node unchanged) whenever the result is not
/// representable; failures are silent by design of the subset.
fn fold_binary(sess: &mut Session, op: &str, lhs: NodeId, rhs: NodeId) -> Option<NodeId> {
    let l = as_folded(sess, lhs)?;
    let r = as_folded(sess, rhs)?;

    // Bools participate in arithmetic as 0/1, matching the host semantics.
    let as_int = |f: Folded| match f {
        Folded::Int(v) => Some(v),
        Folded::Bool(b) => Some(i64::from(b)),
        _ => None,
    };

    let folded = match (l, r) {
        (Folded::Str(a), Folded::Str(b)) => {
            let sa = sess.strings.value(a).to_string();
            let sb = sess.strings.value(b).to_string();
            match op {
                "__add__" => {
                    let joined = format!("{sa}{sb}");
                    return Some(sess.string_const(&joined));
                }
                "__eq__" => Folded::Bool(sa == sb),
                "__ne__" => Folded::Bool(sa != sb),
                "__lt__" => Folded::Bool(sa < sb),
                "__lte__" => Folded::Bool(sa <= sb),
                "__gt__" => Folded::Bool(sa > sb),
                "__gte__" => Folded::Bool(sa >= sb),
                _ => return None,
            }
        }
        (Folded::Str(a), _) if op == "__mul__" => {
            let count = usize::try_from(as_int(r)?).ok()?;
            if count.checked_mul(sess.strings.value(a).len())? > (1usize << 20) {
                return None;
            }
            let repeated = sess.strings.value(a).repeat(count);
            return Some(sess.string_const(&repeated));
        }
        (Folded::Bytes(a), Folded::Bytes(b)) if op == "__add__" => {
            let mut joined = sess.bytes.value(a).to_vec();
            joined.extend_from_slice(sess.bytes.value(b));
            return Some(sess.bytes_const(&joined));
        }
        _ => {
            let a = as_int(l)?;
            let b = as_int(r)?;
            fold_int_op(op, a, b)?
        }
    };

    Some(match folded {
        Folded::Int(v) => sess.int_const(v),
        Folded::Bool(b) => sess.graph.node(NodeKind::BoolConst(b)),
        Folded::Str(_) | Folded::Bytes(_) => unreachable!(),
    })
}

fn fold_unary(sess: &mut Session, op: &str, value: NodeId) -> Option<NodeId> {
    match (op, sess.graph.kind(value).clone()) {
        ("__neg__", NodeKind::IntConst(v)) => Some(sess.int_const(v.checked_neg()?)),
        ("__invert__", NodeKind::IntConst(v)) => Some(sess.int_const(!v)),
        ("__not__", NodeKind::BoolConst(b)) => Some(sess.graph.node(NodeKind::BoolConst(!b))),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn floor_division_matches_python() {
        assert_eq!(py_floordiv(7, 2), Some(3));
        assert_eq!(py_floordiv(-7, 2), Some(-4));
        assert_eq!(py_floordiv(7, -2), Some(-4));
        assert_eq!(py_floordiv(-7, -2), Some(3));
        assert_eq!(py_floordiv(1, 0), None);
    }

    #[test]
    fn modulo_takes_divisor_sign() {
        assert_eq!(py_mod(7, 3), Some(1));
        assert_eq!(py_mod(-7, 3), Some(2));
        assert_eq!(py_mod(7, -3), Some(-2));
        assert_eq!(py_mod(1, 0), None);
    }

    #[test]
    fn folding_addition_interns_the_result() {
        let mut sess = Session::new();
        let a = sess.int_const(1);
        let b = sess.int_const(2);
        let folded = fold_binary(&mut sess, "__add__", a, b).unwrap();
        match sess.graph.kind(folded) {
            NodeKind::IntConst(3) => {}
            other => panic!("expected IntConst(3), got {other:?}"),
        }
        assert!(sess.ints.contains(3));
    }

    #[test]
    fn overflow_is_left_for_the_runtime() {
        let mut sess = Session::new();
        let a = sess.int_const(i64::MAX);
        let b = sess.int_const(1);
        assert!(fold_binary(&mut sess, "__add__", a, b).is_none());
    }
}
