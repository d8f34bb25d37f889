//! AST translation: lowers the host Python AST into the syntax graph.
//!
//! This is the **only** module (together with its import helpers) that
//! imports `ruff_python_parser`. It walks the AST once per module,
//! constructing unreduced graph nodes; operator normalization, comparison
//! unchaining, and the `in`/`not in` operand swap happen here, while all
//! structural lowering is left to the reduction pass.

use std::path::{Path, PathBuf};

use ruff_python_ast::{self as ast, Expr, Stmt};
use ruff_python_parser::parse_module;
use ruff_text_size::Ranged;

use crate::context::{Context, flatten_block};
use crate::error::{Error, Result};
use crate::intern::Session;
use crate::syntax::{
    BoolSense, CallArg, CompKind, ForTarget, Keyword, NodeId, NodeKind, Param,
};
use crate::{builtins, imports, scope};

/// Translate one module's source into a completed [`crate::context::Module`],
/// returning its index in the session's module list.
///
/// The pipeline per module is: parse, visit (this file), flatten, scope
/// analysis. Imported modules complete recursively during the visit, so they
/// always precede their importer in the module list.
pub fn translate_module(
    sess: &mut Session,
    name: &str,
    source: &str,
    dir: &Path,
    is_prelude: bool,
) -> Result<usize> {
    let parsed = parse_module(source).map_err(|e| Error::Parse(e.to_string()))?;
    let module = parsed.into_syntax();

    let mut translator = Translator {
        sess,
        ctx: Context::new(name),
        source,
        dir: dir.to_path_buf(),
        class_name: None,
        in_function: false,
    };

    let mut stmts = Vec::new();
    if is_prelude {
        // The prelude is where the native registry surfaces as Python names.
        stmts.extend(builtins::registry_stores(translator.sess));
    } else {
        let prelude = imports::prelude_index(translator.sess);
        stmts.push(translator.sess.graph.node(NodeKind::ImportStatement {
            alias: None,
            star: true,
            names: Vec::new(),
            module: prelude,
        }));
    }
    for stmt in &module.body {
        translator.visit_stmt(stmt, &mut stmts)?;
    }

    let Translator { mut ctx, .. } = translator;
    let flat = flatten_block(sess, &mut ctx, &stmts);
    let module = scope::analyze_module(sess, ctx, flat);
    sess.modules.push(module);
    Ok(sess.modules.len() - 1)
}

pub struct Translator<'a> {
    pub sess: &'a mut Session,
    pub ctx: Context,
    source: &'a str,
    /// Directory of the file being translated; head of the import search path.
    pub dir: PathBuf,
    /// `Some` while visiting a class body.
    class_name: Option<String>,
    /// Whether a function body is being visited.
    in_function: bool,
}

impl<'a> Translator<'a> {
    /// 1-based source line of a node.
    pub fn line(&self, node: &impl Ranged) -> u32 {
        let offset = node.range().start().to_u32() as usize;
        let offset = offset.min(self.source.len());
        self.source[..offset].bytes().filter(|&b| b == b'\n').count() as u32 + 1
    }

    fn unsupported<T>(&self, node: &impl Ranged, message: impl Into<String>) -> Result<T> {
        Err(Error::unsupported(self.line(node), message))
    }

    fn unique_emit_name(&mut self, base: &str) -> String {
        if self.sess.fn_names.insert(base.to_string()) {
            return base.to_string();
        }
        let mut n = 2;
        loop {
            let candidate = format!("{base}_{n}");
            if self.sess.fn_names.insert(candidate.clone()) {
                return candidate;
            }
            n += 1;
        }
    }

    // -----------------------------------------------------------------------
    // Statements
    // -----------------------------------------------------------------------

    pub fn visit_block(&mut self, body: &[Stmt]) -> Result<Vec<NodeId>> {
        let mut out = Vec::new();
        for stmt in body {
            self.visit_stmt(stmt, &mut out)?;
        }
        Ok(out)
    }

    pub fn visit_stmt(&mut self, stmt: &Stmt, out: &mut Vec<NodeId>) -> Result<()> {
        match stmt {
            Stmt::Expr(expr_stmt) => {
                let node = self.expr(&expr_stmt.value)?;
                out.push(node);
            }

            Stmt::Assign(assign) => {
                if assign.targets.len() != 1 {
                    return self.unsupported(stmt, "chained assignment");
                }
                let value = self.expr(&assign.value)?;
                self.store_target(&assign.targets[0], value, out, true)?;
            }

            Stmt::AugAssign(aug) => {
                let op = translate_aug_op(&aug.op)
                    .ok_or_else(|| Error::unsupported(self.line(stmt), "matrix multiplication"))?;
                let value = self.expr(&aug.value)?;
                self.aug_target(&aug.target, op, value, out)?;
            }

            Stmt::AnnAssign(_) => {
                return self.unsupported(stmt, "annotated assignment");
            }

            Stmt::If(if_stmt) => {
                let node = self.translate_if(&if_stmt.test, &if_stmt.body, &if_stmt.elif_else_clauses)?;
                out.push(node);
            }

            Stmt::While(while_stmt) => {
                if !while_stmt.orelse.is_empty() {
                    return self.unsupported(stmt, "else clause on while loop");
                }
                let test = self.expr(&while_stmt.test)?;
                let test = self.sess.graph.edge(test);
                let body = self.visit_block(&while_stmt.body)?;
                out.push(self.sess.graph.node(NodeKind::While {
                    test: Some(test),
                    body,
                }));
            }

            Stmt::For(for_stmt) => {
                if for_stmt.is_async {
                    return self.unsupported(stmt, "async for");
                }
                if !for_stmt.orelse.is_empty() {
                    return self.unsupported(stmt, "else clause on for loop");
                }
                let target = self.for_target(&for_stmt.target)?;
                let iter = self.expr(&for_stmt.iter)?;
                let iter = self.sess.graph.edge(iter);
                let body = self.visit_block(&for_stmt.body)?;
                out.push(self.sess.graph.node(NodeKind::For { target, iter, body }));
            }

            Stmt::FunctionDef(func_def) => {
                let node = self.translate_function_def(func_def)?;
                out.push(node);
            }

            Stmt::ClassDef(class_def) => {
                let node = self.translate_class_def(class_def)?;
                out.push(node);
            }

            Stmt::Return(ret) => {
                let value = match &ret.value {
                    Some(expr) => {
                        let node = self.expr(expr)?;
                        Some(self.sess.graph.edge(node))
                    }
                    None => None,
                };
                out.push(self.sess.graph.node(NodeKind::Return { value }));
            }

            Stmt::Pass(_) => {}

            Stmt::Break(_) => out.push(self.sess.graph.node(NodeKind::Break)),
            Stmt::Continue(_) => out.push(self.sess.graph.node(NodeKind::Continue)),

            Stmt::Global(global) => {
                let names = global.names.iter().map(|n| n.to_string()).collect();
                out.push(self.sess.graph.node(NodeKind::Global(names)));
            }

            Stmt::Nonlocal(_) => {
                return self.unsupported(stmt, "nonlocal declarations");
            }

            Stmt::Delete(delete) => {
                for target in &delete.targets {
                    match target {
                        Expr::Subscript(sub) if !matches!(sub.slice.as_ref(), Expr::Slice(_)) => {
                            let obj = self.expr(&sub.value)?;
                            let index = self.expr(&sub.slice)?;
                            let obj = self.sess.graph.edge(obj);
                            let index = self.sess.graph.edge(index);
                            out.push(
                                self.sess
                                    .graph
                                    .node(NodeKind::DeleteSubscript { obj, index }),
                            );
                        }
                        _ => return self.unsupported(stmt, "delete is only supported on subscripts"),
                    }
                }
            }

            Stmt::Assert(assert_stmt) => {
                // The failure message is not representable without exceptions;
                // the emitted error already carries the source line.
                let line = self.line(stmt);
                let test = self.expr(&assert_stmt.test)?;
                let test = self.sess.graph.edge(test);
                out.push(self.sess.graph.node(NodeKind::Assert { test, line }));
            }

            Stmt::Raise(raise) => {
                if raise.cause.is_some() {
                    return self.unsupported(stmt, "raise ... from ...");
                }
                let line = self.line(stmt);
                match &raise.exc {
                    Some(exc) => {
                        let expr = self.expr(exc)?;
                        let expr = self.sess.graph.edge(expr);
                        out.push(self.sess.graph.node(NodeKind::Raise { expr, line }));
                    }
                    None => return self.unsupported(stmt, "bare raise"),
                }
            }

            Stmt::Import(import) => {
                imports::visit_import(self, import, out)?;
            }

            Stmt::ImportFrom(import_from) => {
                imports::visit_import_from(self, import_from, out)?;
            }

            Stmt::With(with_stmt) => {
                self.translate_with(with_stmt, out)?;
            }

            Stmt::Try(_) => {
                return self.unsupported(stmt, "try statements are not translatable");
            }

            _ => {
                return self.unsupported(
                    stmt,
                    format!("statement not supported: {:?}", std::mem::discriminant(stmt)),
                );
            }
        }
        Ok(())
    }

    /// `with E as x: body` runs the body with `x` bound to `E`, closing the
    /// manager afterwards. Only the single-target file-like form is in the
    /// subset; there is no unwinding to protect against.
    fn translate_with(&mut self, with_stmt: &ast::StmtWith, out: &mut Vec<NodeId>) -> Result<()> {
        if with_stmt.is_async {
            return self.unsupported(with_stmt, "async with");
        }
        if with_stmt.items.len() != 1 {
            return self.unsupported(with_stmt, "multiple context managers");
        }
        let item = &with_stmt.items[0];
        let name = match &item.optional_vars {
            Some(var) => match var.as_ref() {
                Expr::Name(name) => name.id.to_string(),
                _ => return self.unsupported(with_stmt, "with target must be a name"),
            },
            None => self.ctx.get_temp(),
        };
        let manager = self.expr(&item.context_expr)?;
        out.push(self.sess.store(&name, manager));
        let body = self.visit_block(&with_stmt.body)?;
        out.extend(body);
        let load = self.sess.load(&name);
        out.push(self.sess.method_call(load, "close", vec![]));
        Ok(())
    }

    fn translate_if(
        &mut self,
        test: &Expr,
        body: &[Stmt],
        clauses: &[ast::ElifElseClause],
    ) -> Result<NodeId> {
        let test = self.expr(test)?;
        let test = self.sess.graph.edge(test);
        let body = self.visit_block(body)?;
        let orelse = match clauses.split_first() {
            None => Vec::new(),
            Some((clause, rest)) => match &clause.test {
                Some(elif_test) => {
                    vec![self.translate_if(elif_test, &clause.body, rest)?]
                }
                None => self.visit_block(&clause.body)?,
            },
        };
        Ok(self.sess.graph.node(NodeKind::If { test, body, orelse }))
    }

    /// Store `value` into an assignment target. Tuple targets are exploded
    /// through a hidden temporary, one subscript per element.
    fn store_target(
        &mut self,
        target: &Expr,
        value: NodeId,
        out: &mut Vec<NodeId>,
        allow_tuple: bool,
    ) -> Result<()> {
        match target {
            Expr::Name(name) => {
                out.push(self.sess.store(name.id.as_str(), value));
            }

            Expr::Attribute(attr) => {
                let obj = self.expr(&attr.value)?;
                let attr_const = self.sess.string_const(attr.attr.as_str());
                let obj = self.sess.graph.edge(obj);
                let attr_edge = self.sess.graph.edge(attr_const);
                let expr = self.sess.graph.edge(value);
                out.push(self.sess.graph.node(NodeKind::StoreAttr {
                    obj,
                    attr: attr_edge,
                    expr,
                }));
            }

            Expr::Subscript(sub) => {
                if matches!(sub.slice.as_ref(), Expr::Slice(_)) {
                    return self.unsupported(target, "slice assignment");
                }
                let obj = self.expr(&sub.value)?;
                let index = self.expr(&sub.slice)?;
                let obj = self.sess.graph.edge(obj);
                let index = self.sess.graph.edge(index);
                let expr = self.sess.graph.edge(value);
                out.push(
                    self.sess
                        .graph
                        .node(NodeKind::StoreSubscript { obj, index, expr }),
                );
            }

            Expr::Tuple(ast::ExprTuple { elts, .. }) | Expr::List(ast::ExprList { elts, .. }) => {
                if !allow_tuple {
                    return self.unsupported(target, "nested tuple unpacking in assignment");
                }
                let temp = self.ctx.get_temp();
                out.push(self.sess.store(&temp, value));
                for (i, elt) in elts.iter().enumerate() {
                    let load = self.sess.load(&temp);
                    let index = self.sess.int_const(i as i64);
                    let obj = self.sess.graph.edge(load);
                    let index = self.sess.graph.edge(index);
                    let item = self.sess.graph.node(NodeKind::Subscript { obj, index });
                    self.store_target(elt, item, out, false)?;
                }
            }

            _ => return self.unsupported(target, "assignment target not supported"),
        }
        Ok(())
    }

    /// `x OP= y` rewritten as `x = x __iOP__ y`. Not in-place: augmented
    /// assignment on a mutable container rebinds rather than mutates, and
    /// attribute/subscript targets evaluate their base twice.
    fn aug_target(
        &mut self,
        target: &Expr,
        op: &'static str,
        value: NodeId,
        out: &mut Vec<NodeId>,
    ) -> Result<()> {
        match target {
            Expr::Name(name) => {
                let load = self.sess.load(name.id.as_str());
                let lhs = self.sess.graph.edge(load);
                let rhs = self.sess.graph.edge(value);
                let binop = self.sess.graph.node(NodeKind::BinaryOp { op, lhs, rhs });
                out.push(self.sess.store(name.id.as_str(), binop));
            }

            Expr::Attribute(attr) => {
                let base_store = self.expr(&attr.value)?;
                let base_load = self.expr(&attr.value)?;
                let attr_load = self.sess.string_const(attr.attr.as_str());
                let attr_store = self.sess.string_const(attr.attr.as_str());
                let obj = self.sess.graph.edge(base_load);
                let attr_edge = self.sess.graph.edge(attr_load);
                let current = self.sess.graph.node(NodeKind::Attribute {
                    obj,
                    attr: attr_edge,
                });
                let lhs = self.sess.graph.edge(current);
                let rhs = self.sess.graph.edge(value);
                let binop = self.sess.graph.node(NodeKind::BinaryOp { op, lhs, rhs });
                let obj = self.sess.graph.edge(base_store);
                let attr_edge = self.sess.graph.edge(attr_store);
                let expr = self.sess.graph.edge(binop);
                out.push(self.sess.graph.node(NodeKind::StoreAttr {
                    obj,
                    attr: attr_edge,
                    expr,
                }));
            }

            Expr::Subscript(sub) => {
                if matches!(sub.slice.as_ref(), Expr::Slice(_)) {
                    return self.unsupported(target, "augmented slice assignment");
                }
                let base_store = self.expr(&sub.value)?;
                let base_load = self.expr(&sub.value)?;
                let index_store = self.expr(&sub.slice)?;
                let index_load = self.expr(&sub.slice)?;
                let obj = self.sess.graph.edge(base_load);
                let index = self.sess.graph.edge(index_load);
                let current = self.sess.graph.node(NodeKind::Subscript { obj, index });
                let lhs = self.sess.graph.edge(current);
                let rhs = self.sess.graph.edge(value);
                let binop = self.sess.graph.node(NodeKind::BinaryOp { op, lhs, rhs });
                let obj = self.sess.graph.edge(base_store);
                let index = self.sess.graph.edge(index_store);
                let expr = self.sess.graph.edge(binop);
                out.push(
                    self.sess
                        .graph
                        .node(NodeKind::StoreSubscript { obj, index, expr }),
                );
            }

            _ => return self.unsupported(target, "augmented assignment target not supported"),
        }
        Ok(())
    }

    fn for_target(&mut self, target: &Expr) -> Result<ForTarget> {
        match target {
            Expr::Name(name) => Ok(ForTarget::Name(name.id.to_string())),
            Expr::Tuple(tuple) => {
                let mut names = Vec::new();
                for elt in &tuple.elts {
                    match elt {
                        Expr::Name(name) => names.push(name.id.to_string()),
                        _ => {
                            return self
                                .unsupported(target, "loop target must be a name or flat tuple of names");
                        }
                    }
                }
                Ok(ForTarget::Tuple(names))
            }
            _ => self.unsupported(target, "loop target must be a name or flat tuple of names"),
        }
    }

    // -----------------------------------------------------------------------
    // Definitions
    // -----------------------------------------------------------------------

    fn translate_function_def(&mut self, func_def: &ast::StmtFunctionDef) -> Result<NodeId> {
        if func_def.is_async {
            return self.unsupported(func_def, "async functions");
        }
        for decorator in &func_def.decorator_list {
            match &decorator.expression {
                Expr::Name(name) if name.id.as_str() == "builtin" => {}
                _ => return self.unsupported(func_def, "decorators other than @builtin"),
            }
        }
        if func_def.type_params.is_some() {
            return self.unsupported(func_def, "type parameters");
        }

        let parameters = &func_def.parameters;
        if parameters.kwarg.is_some() {
            return self.unsupported(func_def, "**kwargs parameters");
        }
        let mut params = Vec::new();
        for arg in parameters.posonlyargs.iter().chain(parameters.args.iter()) {
            params.push(self.translate_param(arg)?);
        }
        let vararg = parameters.vararg.as_ref().map(|v| v.name.to_string());
        let mut kwonly = Vec::new();
        for arg in &parameters.kwonlyargs {
            kwonly.push(self.translate_param(arg)?);
        }

        let name = func_def.name.to_string();
        let base = match &self.class_name {
            Some(class) => format!("{class}__{name}"),
            None => name.clone(),
        };
        let emit_name = self.unique_emit_name(&base);

        // Class bodies nest no further; the method body is ordinary code.
        let saved_class = self.class_name.take();
        let saved_in_function = self.in_function;
        self.in_function = true;
        let body = self.visit_block(&func_def.body);
        self.in_function = saved_in_function;
        self.class_name = saved_class;
        let body = body?;

        let arguments = self.sess.graph.node(NodeKind::Arguments {
            params,
            vararg,
            kwonly,
        });
        Ok(self.sess.graph.node(NodeKind::FunctionDef {
            name,
            emit_name,
            arguments,
            body,
            local_count: 0,
            uses_globals: false,
        }))
    }

    fn translate_param(&mut self, arg: &ast::ParameterWithDefault) -> Result<Param> {
        let name = arg.parameter.name.to_string();
        let default = match &arg.default {
            Some(default) => {
                let node = self.const_default(default)?;
                Some(self.sess.graph.edge(node))
            }
            None => None,
        };
        Ok(Param { name, default })
    }

    /// Parameter defaults are bound in the emitted prologue, so only constant
    /// expressions are representable.
    fn const_default(&mut self, expr: &Expr) -> Result<NodeId> {
        match expr {
            Expr::NoneLiteral(_) => Ok(self.sess.graph.node(NodeKind::NoneConst)),
            Expr::BooleanLiteral(b) => Ok(self.sess.graph.node(NodeKind::BoolConst(b.value))),
            Expr::NumberLiteral(n) => match &n.value {
                ast::Number::Int(i) => match i.as_i64() {
                    Some(v) => Ok(self.sess.int_const(v)),
                    None => self.unsupported(expr, "integer literal too large"),
                },
                _ => self.unsupported(expr, "float literals"),
            },
            Expr::StringLiteral(s) => {
                let text = s.value.to_string();
                Ok(self.sess.string_const(&text))
            }
            Expr::UnaryOp(unary) if matches!(unary.op, ast::UnaryOp::USub) => {
                let node = self.const_default(&unary.operand)?;
                match self.sess.graph.kind(node) {
                    NodeKind::IntConst(v) => {
                        let v = *v;
                        Ok(self.sess.int_const(-v))
                    }
                    _ => self.unsupported(expr, "non-constant parameter default"),
                }
            }
            _ => self.unsupported(expr, "non-constant parameter default"),
        }
    }

    fn translate_class_def(&mut self, class_def: &ast::StmtClassDef) -> Result<NodeId> {
        if self.class_name.is_some() {
            return self.unsupported(class_def, "nested class definitions");
        }
        if self.in_function {
            return self.unsupported(class_def, "class definitions inside functions");
        }
        if let Some(arguments) = &class_def.arguments
            && !(arguments.args.is_empty() && arguments.keywords.is_empty())
        {
            return self.unsupported(class_def, "class bases and keywords");
        }
        if !class_def.decorator_list.is_empty() {
            return self.unsupported(class_def, "class decorators");
        }
        if class_def.type_params.is_some() {
            return self.unsupported(class_def, "type parameters");
        }

        let name = class_def.name.to_string();
        let emit_name = self.unique_emit_name(&name);
        self.class_name = Some(name.clone());
        let body = self.visit_block(&class_def.body);
        self.class_name = None;
        Ok(self.sess.graph.node(NodeKind::ClassDef {
            name,
            emit_name,
            body: body?,
        }))
    }

    // -----------------------------------------------------------------------
    // Expressions
    // -----------------------------------------------------------------------

    pub fn expr(&mut self, expr: &Expr) -> Result<NodeId> {
        match expr {
            Expr::NoneLiteral(_) => Ok(self.sess.graph.node(NodeKind::NoneConst)),

            Expr::BooleanLiteral(b) => Ok(self.sess.graph.node(NodeKind::BoolConst(b.value))),

            Expr::NumberLiteral(n) => match &n.value {
                ast::Number::Int(i) => match i.as_i64() {
                    Some(v) => Ok(self.sess.int_const(v)),
                    None => self.unsupported(expr, "integer literal too large"),
                },
                ast::Number::Float(_) => self.unsupported(expr, "float literals"),
                ast::Number::Complex { .. } => self.unsupported(expr, "complex literals"),
            },

            Expr::StringLiteral(s) => {
                let text = s.value.to_string();
                Ok(self.sess.string_const(&text))
            }

            Expr::BytesLiteral(b) => {
                let data: Vec<u8> = b.value.bytes().collect();
                Ok(self.sess.bytes_const(&data))
            }

            Expr::FString(_) => self.unsupported(expr, "f-strings"),
            Expr::EllipsisLiteral(_) => self.unsupported(expr, "ellipsis"),

            Expr::Name(name) => Ok(self.sess.load(name.id.as_str())),

            Expr::List(list) => {
                let items = self.expr_edges(&list.elts)?;
                Ok(self.sess.graph.node(NodeKind::List { items }))
            }

            Expr::Tuple(tuple) => {
                let items = self.expr_edges(&tuple.elts)?;
                Ok(self.sess.graph.node(NodeKind::Tuple { items }))
            }

            Expr::Set(set) => {
                let items = self.expr_edges(&set.elts)?;
                Ok(self.sess.graph.node(NodeKind::Set { items }))
            }

            Expr::Dict(dict) => {
                let mut keys = Vec::new();
                let mut values = Vec::new();
                for item in &dict.items {
                    let Some(key) = &item.key else {
                        return self.unsupported(expr, "dict unpacking in literals");
                    };
                    let key = self.expr(key)?;
                    let value = self.expr(&item.value)?;
                    keys.push(self.sess.graph.edge(key));
                    values.push(self.sess.graph.edge(value));
                }
                Ok(self.sess.graph.node(NodeKind::Dict { keys, values }))
            }

            Expr::BinOp(binop) => {
                let op = translate_binop(&binop.op)
                    .ok_or_else(|| Error::unsupported(self.line(expr), "matrix multiplication"))?;
                let lhs = self.expr(&binop.left)?;
                let rhs = self.expr(&binop.right)?;
                let lhs = self.sess.graph.edge(lhs);
                let rhs = self.sess.graph.edge(rhs);
                Ok(self.sess.graph.node(NodeKind::BinaryOp { op, lhs, rhs }))
            }

            Expr::UnaryOp(unary) => {
                let op = match unary.op {
                    ast::UnaryOp::Not => "__not__",
                    ast::UnaryOp::USub => "__neg__",
                    ast::UnaryOp::UAdd => "__pos__",
                    ast::UnaryOp::Invert => "__invert__",
                };
                let operand = self.expr(&unary.operand)?;
                let operand = self.sess.graph.edge(operand);
                Ok(self.sess.graph.node(NodeKind::UnaryOp { op, operand }))
            }

            Expr::BoolOp(boolop) => {
                let op = match boolop.op {
                    ast::BoolOp::And => BoolSense::And,
                    ast::BoolOp::Or => BoolSense::Or,
                };
                let values = self.expr_edges(&boolop.values)?;
                Ok(self.sess.graph.node(NodeKind::BoolOp { op, values }))
            }

            Expr::Compare(cmp) => self.translate_compare(cmp),

            Expr::If(ifexp) => {
                let test = self.expr(&ifexp.test)?;
                let body = self.expr(&ifexp.body)?;
                let orelse = self.expr(&ifexp.orelse)?;
                let test = self.sess.graph.edge(test);
                let body = self.sess.graph.edge(body);
                let orelse = self.sess.graph.edge(orelse);
                Ok(self.sess.graph.node(NodeKind::IfExp { test, body, orelse }))
            }

            Expr::Call(call) => self.translate_call(call),

            Expr::Subscript(sub) => {
                let obj = self.expr(&sub.value)?;
                if let Expr::Slice(slice) = sub.slice.as_ref() {
                    let lower = self.slice_bound(slice.lower.as_deref())?;
                    let upper = self.slice_bound(slice.upper.as_deref())?;
                    let step = self.slice_bound(slice.step.as_deref())?;
                    let obj = self.sess.graph.edge(obj);
                    Ok(self.sess.graph.node(NodeKind::Slice {
                        obj,
                        lower,
                        upper,
                        step,
                    }))
                } else {
                    let index = self.expr(&sub.slice)?;
                    let obj = self.sess.graph.edge(obj);
                    let index = self.sess.graph.edge(index);
                    Ok(self.sess.graph.node(NodeKind::Subscript { obj, index }))
                }
            }

            Expr::Attribute(attr) => {
                let obj = self.expr(&attr.value)?;
                let attr_const = self.sess.string_const(attr.attr.as_str());
                let obj = self.sess.graph.edge(obj);
                let attr_edge = self.sess.graph.edge(attr_const);
                Ok(self.sess.graph.node(NodeKind::Attribute {
                    obj,
                    attr: attr_edge,
                }))
            }

            Expr::ListComp(comp) => {
                self.translate_comprehension(CompKind::List, &comp.elt, None, &comp.generators)
            }
            Expr::SetComp(comp) => {
                self.translate_comprehension(CompKind::Set, &comp.elt, None, &comp.generators)
            }
            Expr::DictComp(comp) => self.translate_comprehension(
                CompKind::Dict,
                &comp.value,
                comp.key.as_deref(),
                &comp.generators,
            ),
            // Generator expressions are materialized eagerly, like list
            // comprehensions.
            Expr::Generator(genexp) => {
                self.translate_comprehension(CompKind::List, &genexp.elt, None, &genexp.generators)
            }

            Expr::Starred(_) => self.unsupported(expr, "starred expression outside a call"),
            Expr::Lambda(_) => self.unsupported(expr, "lambda expressions"),
            Expr::Named(_) => self.unsupported(expr, "assignment expressions"),

            _ => self.unsupported(
                expr,
                format!("expression not supported: {:?}", std::mem::discriminant(expr)),
            ),
        }
    }

    fn expr_edges(&mut self, exprs: &[Expr]) -> Result<Vec<crate::syntax::EdgeId>> {
        let mut edges = Vec::with_capacity(exprs.len());
        for e in exprs {
            let node = self.expr(e)?;
            edges.push(self.sess.graph.edge(node));
        }
        Ok(edges)
    }

    fn slice_bound(&mut self, bound: Option<&Expr>) -> Result<crate::syntax::EdgeId> {
        let node = match bound {
            Some(expr) => self.expr(expr)?,
            None => self.sess.graph.node(NodeKind::NullConst),
        };
        Ok(self.sess.graph.edge(node))
    }

    /// Comparisons map onto a fixed dunder set. `in`/`not in` take their
    /// operands (needle, haystack) in source order but dispatch on the
    /// haystack, so the operands swap. Chains unchain into an `and` over the
    /// adjacent pairs: each interior operand node is shared by two comparison
    /// edges, and flattening forwards every use of a reduced operand to its
    /// hoisted temporary, so the operand is evaluated exactly once, left to
    /// right, before the first comparison that needs it.
    fn translate_compare(&mut self, cmp: &ast::ExprCompare) -> Result<NodeId> {
        let mut operands = vec![self.expr(&cmp.left)?];
        for comparator in &cmp.comparators {
            operands.push(self.expr(comparator)?);
        }

        let mut comparisons = Vec::new();
        for (i, op) in cmp.ops.iter().enumerate() {
            let (op, swap) = translate_cmpop(op);
            let (mut lhs, mut rhs) = (operands[i], operands[i + 1]);
            if swap {
                std::mem::swap(&mut lhs, &mut rhs);
            }
            let lhs = self.sess.graph.edge(lhs);
            let rhs = self.sess.graph.edge(rhs);
            comparisons.push(self.sess.graph.node(NodeKind::BinaryOp { op, lhs, rhs }));
        }

        if comparisons.len() == 1 {
            return Ok(comparisons[0]);
        }
        let values = comparisons
            .into_iter()
            .map(|c| self.sess.graph.edge(c))
            .collect();
        Ok(self.sess.graph.node(NodeKind::BoolOp {
            op: BoolSense::And,
            values,
        }))
    }

    fn translate_call(&mut self, call: &ast::ExprCall) -> Result<NodeId> {
        let func = self.expr(&call.func)?;
        let func = self.sess.graph.edge(func);

        let mut args = Vec::new();
        for arg in call.arguments.args.iter() {
            match arg {
                Expr::Starred(starred) => {
                    let value = self.expr(&starred.value)?;
                    args.push(CallArg {
                        star: true,
                        value: self.sess.graph.edge(value),
                    });
                }
                _ => {
                    let value = self.expr(arg)?;
                    args.push(CallArg {
                        star: false,
                        value: self.sess.graph.edge(value),
                    });
                }
            }
        }

        let mut keywords = Vec::new();
        for kw in call.arguments.keywords.iter() {
            let value = self.expr(&kw.value)?;
            keywords.push(Keyword {
                name: kw.arg.as_ref().map(|name| name.to_string()),
                value: self.sess.graph.edge(value),
            });
        }

        Ok(self.sess.graph.node(NodeKind::CallSite {
            func,
            args,
            keywords,
        }))
    }

    fn translate_comprehension(
        &mut self,
        kind: CompKind,
        elt: &Expr,
        key: Option<&Expr>,
        generators: &[ast::Comprehension],
    ) -> Result<NodeId> {
        if generators.len() != 1 {
            return self.unsupported(elt, "nested comprehension generators");
        }
        let generator = &generators[0];
        if generator.is_async {
            return self.unsupported(elt, "async comprehensions");
        }

        let target = self.for_target(&generator.target)?;
        let iter = self.expr(&generator.iter)?;
        let iter = self.sess.graph.edge(iter);
        let mut ifs = Vec::new();
        for cond in &generator.ifs {
            let node = self.expr(cond)?;
            ifs.push(self.sess.graph.edge(node));
        }
        let key = match key {
            Some(key) => {
                let node = self.expr(key)?;
                Some(self.sess.graph.edge(node))
            }
            None => None,
        };
        let elt = self.expr(elt)?;
        let elt = self.sess.graph.edge(elt);

        Ok(self.sess.graph.node(NodeKind::Comprehension {
            kind,
            target,
            iter,
            ifs,
            elt,
            key,
        }))
    }
}

// ---------------------------------------------------------------------------
// Operator tables
// ---------------------------------------------------------------------------

/// Binary operators normalize to the runtime's dunder method names.
fn translate_binop(op: &ast::Operator) -> Option<&'static str> {
    Some(match op {
        ast::Operator::Add => "__add__",
        ast::Operator::Sub => "__sub__",
        ast::Operator::Mult => "__mul__",
        ast::Operator::Div => "__truediv__",
        ast::Operator::FloorDiv => "__floordiv__",
        ast::Operator::Mod => "__mod__",
        ast::Operator::Pow => "__pow__",
        ast::Operator::BitOr => "__or__",
        ast::Operator::BitXor => "__xor__",
        ast::Operator::BitAnd => "__and__",
        ast::Operator::LShift => "__lshift__",
        ast::Operator::RShift => "__rshift__",
        ast::Operator::MatMult => return None,
    })
}

fn translate_aug_op(op: &ast::Operator) -> Option<&'static str> {
    Some(match op {
        ast::Operator::Add => "__iadd__",
        ast::Operator::Sub => "__isub__",
        ast::Operator::Mult => "__imul__",
        ast::Operator::Div => "__itruediv__",
        ast::Operator::FloorDiv => "__ifloordiv__",
        ast::Operator::Mod => "__imod__",
        ast::Operator::Pow => "__ipow__",
        ast::Operator::BitOr => "__ior__",
        ast::Operator::BitXor => "__ixor__",
        ast::Operator::BitAnd => "__iand__",
        ast::Operator::LShift => "__ilshift__",
        ast::Operator::RShift => "__irshift__",
        ast::Operator::MatMult => return None,
    })
}

/// Comparison operator → (dunder, swap operands).
fn translate_cmpop(op: &ast::CmpOp) -> (&'static str, bool) {
    match op {
        ast::CmpOp::Eq => ("__eq__", false),
        ast::CmpOp::NotEq => ("__ne__", false),
        ast::CmpOp::Lt => ("__lt__", false),
        ast::CmpOp::LtE => ("__lte__", false),
        ast::CmpOp::Gt => ("__gt__", false),
        ast::CmpOp::GtE => ("__gte__", false),
        ast::CmpOp::In => ("__contains__", true),
        ast::CmpOp::NotIn => ("__ncontains__", true),
        ast::CmpOp::Is => ("__is__", false),
        ast::CmpOp::IsNot => ("__isnot__", false),
    }
}
