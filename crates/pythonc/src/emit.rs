//! The emitter: serializes the flattened syntax graph to C++ source text.
//!
//! Output order: preamble (includes, forward declarations, allocator, X-macro
//! registry lists, `#include "backend.cpp"`), wrappers for built-in functions
//! and methods, callable singletons, built-in module classes, interned
//! constant definitions, then one section per module (symbol table, context,
//! functions, classes, init function) with imported modules first, and
//! finally `main`, which populates `sys.argv` and inlines the root module's
//! statements.

use std::fmt::Write;

use crate::alloc;
use crate::builtins::{self, Arity};
use crate::context::Module;
use crate::intern::{BytesTable, IntTable, Session, StringTable};
use crate::methods;
use crate::modules;
use crate::syntax::{Binding, NodeId, NodeKind};

/// Emit the complete C++ program for a finished session.
pub fn emit(sess: &Session) -> String {
    let mut emitter = Emitter {
        sess,
        out: String::new(),
    };
    emitter.write_preamble();
    emitter.write_wrappers();
    emitter.write_builtin_modules();
    emitter.write_constants();
    for (idx, module) in sess.modules.iter().enumerate() {
        emitter.write_module(idx, module);
    }
    emitter.write_main();
    emitter.out
}

struct Emitter<'a> {
    sess: &'a Session,
    out: String,
}

impl<'a> Emitter<'a> {
    // -------------------------------------------------------------------
    // Expression and statement serialization
    // -------------------------------------------------------------------

    fn expr(&self, id: NodeId) -> String {
        let g = &self.sess.graph;
        match g.kind(id) {
            NodeKind::NullConst => "NULL".to_string(),
            NodeKind::NoneConst => "(&none_singleton)".to_string(),
            NodeKind::BoolConst(true) => "(&bool_singleton_true)".to_string(),
            NodeKind::BoolConst(false) => "(&bool_singleton_false)".to_string(),
            NodeKind::IntConst(v) => format!("(&{})", IntTable::singleton_name(*v)),
            NodeKind::StringConst(id) => format!("(&{})", StringTable::singleton_name(*id)),
            NodeKind::BytesConst(id) => format!("(&{})", BytesTable::singleton_name(*id)),
            NodeKind::IntLiteral(v) => v.to_string(),
            NodeKind::Identifier(name) => name.clone(),
            NodeKind::SingletonRef(symbol) => symbol.clone(),

            NodeKind::Ref { class, args } => {
                let args: Vec<String> =
                    args.iter().map(|&e| self.expr(g.target(e))).collect();
                format!(
                    "(new(alloc.alloc_obj<{class}>()) {class}({}))",
                    args.join(", ")
                )
            }

            NodeKind::Load { name, binding } => match binding {
                Some(Binding::Global(idx)) => format!("globals->load({idx})"),
                Some(Binding::Local(idx)) => format!("ctx->load({idx})"),
                Some(Binding::ClassAttr) => format!("this->getattr(\"{name}\")"),
                None => panic!("unbound load of '{name}' reached the emitter"),
            },

            NodeKind::Subscript { obj, index } => format!(
                "{}->__getitem__({})",
                self.expr(g.target(*obj)),
                self.expr(g.target(*index))
            ),
            NodeKind::Attribute { obj, attr } => format!(
                "{}->__getattr__({})",
                self.expr(g.target(*obj)),
                self.expr(g.target(*attr))
            ),
            NodeKind::Slice {
                obj,
                lower,
                upper,
                step,
            } => format!(
                "{}->__slice__({}, {}, {})",
                self.expr(g.target(*obj)),
                self.expr(g.target(*lower)),
                self.expr(g.target(*upper)),
                self.expr(g.target(*step))
            ),

            NodeKind::UnaryOp { op, operand } => {
                format!("{}->{op}()", self.expr(g.target(*operand)))
            }
            NodeKind::BinaryOp { op, lhs, rhs } => format!(
                "{}->{op}({})",
                self.expr(g.target(*lhs)),
                self.expr(g.target(*rhs))
            ),

            NodeKind::Test { expr, sense } => {
                let text = format!("test_truth({})", self.expr(g.target(*expr)));
                if *sense { text } else { format!("!{text}") }
            }
            NodeKind::TestNonNull { expr, sense } => {
                let op = if *sense { "!=" } else { "==" };
                format!("({} {op} NULL)", self.expr(g.target(*expr)))
            }

            NodeKind::TupleFromIter { iter } => {
                format!("tuple_from_iter({})", self.expr(g.target(*iter)))
            }

            NodeKind::Call { func, args, kwargs } => format!(
                "{}->__call__({}, {})",
                self.expr(g.target(*func)),
                self.expr(g.target(*args)),
                self.expr(g.target(*kwargs))
            ),
            NodeKind::MethodCall { obj, method, args } => {
                let args: Vec<String> =
                    args.iter().map(|&e| self.expr(g.target(e))).collect();
                format!(
                    "{}->{method}({})",
                    self.expr(g.target(*obj)),
                    args.join(", ")
                )
            }

            other => panic!("unreduced node reached expression emission: {other:?}"),
        }
    }

    /// Serialize one statement; `None` for scope-only markers.
    fn stmt(&self, id: NodeId) -> Option<String> {
        let g = &self.sess.graph;
        Some(match g.kind(id) {
            NodeKind::Global(_) => return None,

            NodeKind::Store {
                name,
                binding,
                expr,
            } => {
                let value = self.expr(g.target(*expr));
                match binding {
                    Some(Binding::Global(idx)) => format!("globals->store({idx}, {value})"),
                    Some(Binding::Local(idx)) => format!("ctx->store({idx}, {value})"),
                    Some(Binding::ClassAttr) => {
                        format!("this->setattr(\"{name}\", {value})")
                    }
                    None => panic!("unbound store of '{name}' reached the emitter"),
                }
            }

            NodeKind::StoreAttr { obj, attr, expr } => format!(
                "{}->__setattr__({}, {})",
                self.expr(g.target(*obj)),
                self.expr(g.target(*attr)),
                self.expr(g.target(*expr))
            ),
            NodeKind::StoreSubscript { obj, index, expr } => format!(
                "{}->__setitem__({}, {})",
                self.expr(g.target(*obj)),
                self.expr(g.target(*index)),
                self.expr(g.target(*expr))
            ),
            NodeKind::StoreSubscriptDirect { obj, index, expr } => format!(
                "{}->set_item_direct({}, {})",
                self.expr(g.target(*obj)),
                self.expr(g.target(*index)),
                self.expr(g.target(*expr))
            ),
            NodeKind::DeleteSubscript { obj, index } => format!(
                "{}->__delitem__({})",
                self.expr(g.target(*obj)),
                self.expr(g.target(*index))
            ),

            NodeKind::Assign {
                target,
                expr,
                declare,
            } => {
                let value = self.expr(g.target(*expr));
                if *declare {
                    format!("node *{target} = {value}")
                } else {
                    format!("{target} = {value}")
                }
            }

            NodeKind::If { test, body, orelse } => {
                let mut text = format!(
                    "if ({}) {{\n{}\n}}",
                    self.expr(g.target(*test)),
                    self.block(body, "    ")
                );
                if !orelse.is_empty() {
                    let _ = write!(text, " else {{\n{}\n}}", self.block(orelse, "    "));
                }
                text
            }

            NodeKind::While { test, body } => {
                debug_assert!(test.is_none(), "unreduced while reached the emitter");
                format!("while (1) {{\n{}\n}}", self.block(body, "    "))
            }

            NodeKind::Break => "break".to_string(),
            NodeKind::Continue => "continue".to_string(),
            NodeKind::Return { value } => match value {
                Some(value) => format!("return {}", self.expr(g.target(*value))),
                None => "return NULL".to_string(),
            },

            NodeKind::Assert { test, line } => format!(
                "if (!test_truth({})) {{\n    error(\"assert failed at line {line}\");\n}}",
                self.expr(g.target(*test))
            ),
            NodeKind::Raise { expr, line } => {
                format!("raise_exception({}, {line})", self.expr(g.target(*expr)))
            }

            NodeKind::PushTemp { expr } => {
                format!("push_temp_root({})", self.expr(g.target(*expr)))
            }
            NodeKind::PopTemp => "pop_temp_root()".to_string(),
            NodeKind::CollectGarbage => "collect_garbage(ctx)".to_string(),

            // Expression kept in statement position for its effects.
            _ => self.expr(id),
        })
    }

    /// Join statements with newlines: indent prefix on the first line, `;`
    /// suffix unless the statement already ends in a block.
    fn block(&self, stmts: &[NodeId], indent: &str) -> String {
        let mut lines = Vec::new();
        for &stmt in stmts {
            if let Some(text) = self.stmt(stmt) {
                let suffix = if text.ends_with('}') { "" } else { ";" };
                lines.push(format!("{indent}{text}{suffix}"));
            }
        }
        lines.join("\n")
    }

    // -------------------------------------------------------------------
    // Preamble
    // -------------------------------------------------------------------

    fn write_preamble(&mut self) {
        self.out.push_str(
            "#include <assert.h>\n\
             #include <inttypes.h>\n\
             #include <stdarg.h>\n\
             #include <stddef.h>\n\
             #include <stdint.h>\n\
             #include <stdio.h>\n\
             #include <stdlib.h>\n\
             #include <string.h>\n\
             #include <algorithm>\n\
             #include <map>\n\
             #include <set>\n\
             #include <sstream>\n\
             #include <string>\n\
             #include <vector>\n\
             \n\
             class node;\n\
             class tuple;\n\
             class list;\n\
             class dict;\n\
             class file;\n\
             class string_const;\n\
             class context;\n",
        );

        alloc::write_allocator(&mut self.out);
        self.write_registry_lists();
        self.out.push_str("\n#include \"backend.cpp\"\n");
    }

    /// X-macro lists the runtime expands into forward declarations and
    /// method lookup tables.
    fn write_registry_lists(&mut self) {
        let mut line = String::from("\n#define LIST_BUILTIN_CLASSES(x)");
        for (class, _) in builtins::CLASSES {
            let _ = write!(line, " x({class})");
        }
        self.out.push_str(&line);

        let mut line = String::from("\n#define LIST_HIDDEN_CLASSES(x)");
        for class in builtins::HIDDEN_CLASSES {
            let _ = write!(line, " x({class})");
        }
        self.out.push_str(&line);

        let mut line = String::from("\n#define LIST_BUILTIN_FUNCTIONS(x)");
        for func in builtins::FUNCTIONS {
            let _ = write!(line, " x({})", func.name);
        }
        self.out.push_str(&line);

        let mut line = String::from("\n#define LIST_METHOD_CLASSES(x)");
        for class in methods::METHOD_CLASSES {
            let _ = write!(line, " x({class})");
        }
        self.out.push_str(&line);

        for &class in methods::METHOD_CLASSES {
            let mut line = format!("\n#define LIST_{class}_METHODS(x)");
            for method in methods::methods_of(class) {
                let _ = write!(line, " x({class}, {})", method.name);
            }
            self.out.push_str(&line);
        }
        self.out.push('\n');
    }

    // -------------------------------------------------------------------
    // Wrappers and singletons
    // -------------------------------------------------------------------

    fn write_arity_check(&mut self, label: &str, arity: Arity, receiver: bool) {
        let len = if receiver {
            "args->len() - 1"
        } else {
            "args->len()"
        };
        match arity {
            Arity::Exact(n) => {
                let _ = writeln!(
                    self.out,
                    "    if ({len} != {n})\n        error(\"wrong number of arguments to {label}\");"
                );
            }
            Arity::Range(0, max) => {
                let _ = writeln!(
                    self.out,
                    "    if ({len} > {max})\n        error(\"wrong number of arguments to {label}\");"
                );
            }
            Arity::Range(min, max) => {
                let _ = writeln!(
                    self.out,
                    "    if ({len} < {min} || {len} > {max})\n        error(\"wrong number of arguments to {label}\");"
                );
            }
            Arity::Variadic => {}
        }
    }

    fn write_kwargs_check(&mut self, label: &str) {
        let _ = writeln!(
            self.out,
            "    if (kwargs && kwargs->len())\n        error(\"{label} does not accept keyword arguments\");"
        );
    }

    /// Positional argument expressions for a non-receiver wrapper.
    fn arg_exprs(arity: Arity, offset: u32) -> Vec<String> {
        match arity {
            Arity::Exact(n) => (0..n)
                .map(|i| format!("args->__getitem__({})", i + offset))
                .collect(),
            Arity::Range(_, max) => (0..max)
                .map(|i| {
                    format!(
                        "args->len() > {} ? args->__getitem__({}) : NULL",
                        i + offset,
                        i + offset
                    )
                })
                .collect(),
            Arity::Variadic => vec!["args".to_string()],
        }
    }

    fn write_wrappers(&mut self) {
        self.out.push_str("\n// Built-in function wrappers\n");
        for func in builtins::FUNCTIONS {
            let name = func.name;
            let label = format!("{name}()");
            let _ = writeln!(
                self.out,
                "node *wrapped_builtin_{name}(tuple *args, dict *kwargs) {{"
            );
            self.write_kwargs_check(&label);
            self.write_arity_check(&label, func.arity, false);
            let args = Self::arg_exprs(func.arity, 0).join(", ");
            let _ = writeln!(self.out, "    return builtin_{name}({args});\n}}");
        }

        self.out.push_str("\n// Built-in method wrappers\n");
        for method in methods::METHODS {
            let class = method.class;
            let name = method.name;
            let label = format!("{class}.{name}()");
            let cpp = methods::cpp_type(class);
            let check = methods::check_fn(class);
            let _ = writeln!(
                self.out,
                "node *wrapped_method_{class}_{name}(tuple *args, dict *kwargs) {{"
            );
            self.write_kwargs_check(&label);
            self.write_arity_check(&label, method.arity, true);
            let _ = writeln!(
                self.out,
                "    node *self = args->__getitem__(0);\n    if (!self->{check}())\n        error(\"bad argument to {label}\");"
            );
            let args = Self::arg_exprs(method.arity, 1).join(", ");
            let _ = writeln!(self.out, "    return (({cpp} *)self)->{name}({args});\n}}");
        }

        self.out.push_str("\n// Built-in class constructors\n");
        for &(class, arity) in builtins::CLASSES {
            let label = format!("{class}()");
            let _ = writeln!(
                self.out,
                "node *class_init_{class}(tuple *args, dict *kwargs) {{"
            );
            self.write_kwargs_check(&label);
            self.write_arity_check(&label, arity, false);
            let _ = writeln!(self.out, "    return {class}_init(args);\n}}");
        }

        self.out.push_str("\n// Callable singletons\n");
        for func in builtins::FUNCTIONS {
            let name = func.name;
            let _ = writeln!(
                self.out,
                "function_def builtin_{name}_singleton(wrapped_builtin_{name});"
            );
        }
        for &(class, _) in builtins::CLASSES {
            let _ = writeln!(
                self.out,
                "class_def class_{class}_singleton(\"{class}\", class_init_{class});"
            );
        }
    }

    fn write_builtin_modules(&mut self) {
        for module in modules::MODULES {
            let name = module.name;
            let _ = writeln!(self.out, "\nclass module_{name} : public node {{\npublic:");
            for attr in module.attrs {
                let _ = writeln!(self.out, "    {}a_{};", attr.cpp_type, attr.name);
            }
            let _ = writeln!(self.out, "    module_{name}() {{");
            for attr in module.attrs {
                let _ = writeln!(self.out, "        a_{} = {};", attr.name, attr.init);
            }
            self.out.push_str("    }\n");
            self.out
                .push_str("    node *__getattr__(node *key) {\n        const char *k = key->c_str();\n");
            for attr in module.attrs {
                let _ = writeln!(
                    self.out,
                    "        if (!strcmp(k, \"{0}\")) return (node *)a_{0};",
                    attr.name
                );
            }
            let _ = writeln!(
                self.out,
                "        error(\"module '{name}' has no attribute '%s'\", k);\n        return NULL;\n    }}\n}} module_{name}_singleton;"
            );
        }
    }

    // -------------------------------------------------------------------
    // Interned constants
    // -------------------------------------------------------------------

    fn write_constants(&mut self) {
        self.out.push_str("\n// Interned constants\n");
        for value in self.sess.ints.iter() {
            let _ = writeln!(
                self.out,
                "int_const {}({value}ll);",
                IntTable::singleton_name(value)
            );
        }
        let strings: Vec<(u32, String, u64)> = self
            .sess
            .strings
            .iter()
            .map(|(id, s, h)| (id, escape_cpp(s.as_bytes()), h))
            .collect();
        for (id, escaped, hash) in strings {
            let _ = writeln!(
                self.out,
                "string_const {}(\"{escaped}\", 0x{hash:016x}ull);",
                StringTable::singleton_name(id)
            );
        }
        let byte_strings: Vec<(u32, String, usize)> = self
            .sess
            .bytes
            .iter()
            .map(|(id, b)| (id, escape_cpp(b), b.len()))
            .collect();
        for (id, escaped, len) in byte_strings {
            let _ = writeln!(
                self.out,
                "bytes_const {}(\"{escaped}\", {len});",
                BytesTable::singleton_name(id)
            );
        }
    }

    // -------------------------------------------------------------------
    // Modules
    // -------------------------------------------------------------------

    fn write_module(&mut self, idx: usize, module: &Module) {
        let name = &module.ctx.name;
        let n_syms = module.ctx.global_names.len();
        let _ = writeln!(self.out, "\n// module {name}");
        let _ = writeln!(self.out, "node *mod_syms_{name}[{n_syms}];");
        let _ = writeln!(
            self.out,
            "context ctx_{name}_storage({n_syms}, mod_syms_{name});\ncontext *ctx_{name} = &ctx_{name}_storage;"
        );
        self.write_module_singleton(module);

        let functions = module.ctx.functions.clone();
        for func in functions {
            self.write_function(name, func);
        }
        let classes = module.ctx.classes.clone();
        for class in classes {
            self.write_class(class);
        }

        let is_root = idx == self.sess.root_module();
        if !is_root {
            let body = self.block(&module.stmts, "    ");
            let _ = writeln!(
                self.out,
                "\nstatic void init_{name}() {{\n    context *ctx = ctx_{name};\n    context *globals = ctx_{name};\n{body}\n}}"
            );
        }
    }

    /// The object `import M` binds: attribute lookup resolves against the
    /// module's symbol table.
    fn write_module_singleton(&mut self, module: &Module) {
        let name = &module.ctx.name;
        let _ = writeln!(
            self.out,
            "class module_{name} : public node {{\npublic:\n    node *__getattr__(node *key) {{\n        const char *k = key->c_str();"
        );
        for (idx, global) in module.ctx.global_names.iter().enumerate().skip(1) {
            if global.starts_with("temp_") {
                continue;
            }
            let _ = writeln!(
                self.out,
                "        if (!strcmp(k, \"{global}\")) return ctx_{name}->load({idx});"
            );
        }
        let _ = writeln!(
            self.out,
            "        error(\"module '{name}' has no attribute '%s'\", k);\n        return NULL;\n    }}\n}} module_{name}_singleton;"
        );
    }

    fn write_function(&mut self, module_name: &str, func: NodeId) {
        let NodeKind::FunctionDef {
            emit_name,
            body,
            local_count,
            uses_globals,
            ..
        } = self.sess.graph.kind(func).clone()
        else {
            panic!("write_function on a non-function node");
        };
        let slots = local_count.max(1);
        let _ = writeln!(
            self.out,
            "\nstatic node *fn_{emit_name}(tuple *args, dict *kwargs) {{"
        );
        let _ = writeln!(
            self.out,
            "    node *local_syms[{slots}];\n    context frame({local_count}, local_syms);\n    context *ctx = &frame;"
        );
        if uses_globals {
            let _ = writeln!(self.out, "    context *globals = ctx_{module_name};");
        }
        let body = self.block(&body, "    ");
        let _ = writeln!(self.out, "{body}\n    return NULL;\n}}");
    }

    fn write_class(&mut self, class: NodeId) {
        let NodeKind::ClassDef {
            name,
            emit_name,
            body,
        } = self.sess.graph.kind(class).clone()
        else {
            panic!("write_class on a non-class node");
        };
        let body = self.block(&body, "        ");
        let _ = writeln!(
            self.out,
            "\nclass class_{emit_name} : public class_def {{\npublic:\n    class_{emit_name}() : class_def(\"{name}\") {{}}\n    node *__create__(context *ctx, context *globals) {{\n{body}\n        return (node *)this;\n    }}\n}} {emit_name}_singleton;"
        );
    }

    // -------------------------------------------------------------------
    // main
    // -------------------------------------------------------------------

    fn write_main(&mut self) {
        let root = self.sess.root_module();
        let root_name = self.sess.modules[root].ctx.name.clone();
        self.out.push_str("\nint main(int argc, char *argv[]) {\n");
        self.out.push_str(
            "    for (int i = 0; i < argc; i++)\n        module_sys_singleton.a_argv->append(new(alloc.alloc_obj<string_const>()) string_const(argv[i]));\n",
        );
        for (idx, module) in self.sess.modules.iter().enumerate() {
            if idx != root {
                let _ = writeln!(self.out, "    init_{}();", module.ctx.name);
            }
        }
        let _ = writeln!(
            self.out,
            "    context *ctx = ctx_{root_name};\n    context *globals = ctx_{root_name};"
        );
        let stmts = self.sess.modules[root].stmts.clone();
        let body = self.block(&stmts, "    ");
        let _ = writeln!(self.out, "{body}\n    return 0;\n}}");
    }
}

/// Escape bytes for a C++ string literal. Non-printable bytes use three-digit
/// octal escapes, which cannot swallow a following digit the way `\x` does.
fn escape_cpp(data: &[u8]) -> String {
    let mut out = String::with_capacity(data.len());
    for &b in data {
        match b {
            b'"' => out.push_str("\\\""),
            b'\\' => out.push_str("\\\\"),
            b'\n' => out.push_str("\\n"),
            b'\t' => out.push_str("\\t"),
            b'\r' => out.push_str("\\r"),
            0x20..=0x7e => out.push(b as char),
            _ => {
                let _ = write!(out, "\\{:03o}", b);
            }
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn escaping_uses_octal_for_non_printables() {
        assert_eq!(escape_cpp(b"ab"), "ab");
        assert_eq!(escape_cpp(b"a\"b\\c"), "a\\\"b\\\\c");
        assert_eq!(escape_cpp(b"\n\t"), "\\n\\t");
        assert_eq!(escape_cpp(&[0x01, b'2']), "\\0012");
        assert_eq!(escape_cpp(&[0xff]), "\\377");
    }
}
