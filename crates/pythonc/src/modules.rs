//! Built-in modules of the registry.
//!
//! Exactly one built-in module exists: `sys`, exposing `argv`, `stdin`, and
//! `stdout`. The emitter writes a module class per entry whose constructor
//! evaluates the attribute initializers and whose `__getattr__` resolves the
//! attribute table, erroring on a miss.

pub struct BuiltinAttr {
    pub name: &'static str,
    /// C++ type of the stored member.
    pub cpp_type: &'static str,
    /// Initializer expression in the runtime's vocabulary.
    pub init: &'static str,
}

pub struct BuiltinModule {
    pub name: &'static str,
    pub attrs: &'static [BuiltinAttr],
}

pub const MODULES: &[BuiltinModule] = &[BuiltinModule {
    name: "sys",
    attrs: &[
        BuiltinAttr {
            name: "argv",
            cpp_type: "list *",
            init: "new(alloc.alloc_obj<list>()) list(0)",
        },
        BuiltinAttr {
            name: "stdin",
            cpp_type: "file *",
            init: "new(alloc.alloc_obj<file>()) file(stdin)",
        },
        BuiltinAttr {
            name: "stdout",
            cpp_type: "file *",
            init: "new(alloc.alloc_obj<file>()) file(stdout)",
        },
    ],
}];

pub fn is_builtin_module(name: &str) -> bool {
    MODULES.iter().any(|m| m.name == name)
}
