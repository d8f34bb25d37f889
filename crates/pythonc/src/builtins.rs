//! The native half of the built-in registry.
//!
//! Most of Python's builtins are written in Python and live in the embedded
//! prelude; this table describes the functions and classes that must exist as
//! C++ because they reach into the runtime's representation. The emitter
//! turns each entry into a `wrapped_builtin_*` function that validates
//! kwargs, enforces arity, and calls the runtime implementation, plus a
//! singleton callable object the prelude module binds under the Python name.

use crate::intern::Session;
use crate::syntax::NodeId;

/// Call arity of a built-in function, method, or constructor, excluding any
/// receiver.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Arity {
    /// Exactly this many arguments.
    Exact(u32),
    /// Between `min` and `max` arguments; optional slots arrive as NULL.
    Range(u32, u32),
    /// Any number of arguments; the wrapper forwards the argument tuple.
    Variadic,
}

pub struct BuiltinFn {
    pub name: &'static str,
    pub arity: Arity,
}

/// Built-in functions backed by the C++ runtime.
pub const FUNCTIONS: &[BuiltinFn] = &[
    BuiltinFn { name: "chr", arity: Arity::Exact(1) },
    BuiltinFn { name: "id", arity: Arity::Exact(1) },
    BuiltinFn { name: "isinstance", arity: Arity::Exact(2) },
    BuiltinFn { name: "iter", arity: Arity::Exact(1) },
    BuiltinFn { name: "len", arity: Arity::Exact(1) },
    BuiltinFn { name: "next", arity: Arity::Range(1, 2) },
    BuiltinFn { name: "open", arity: Arity::Range(1, 2) },
    BuiltinFn { name: "ord", arity: Arity::Exact(1) },
    BuiltinFn { name: "range", arity: Arity::Range(1, 3) },
    BuiltinFn { name: "repr", arity: Arity::Exact(1) },
    BuiltinFn { name: "sorted", arity: Arity::Exact(1) },
];

/// Built-in classes, constructible by name. The wrapper dispatches to the
/// runtime's `<name>_init`.
pub const CLASSES: &[(&str, Arity)] = &[
    ("bool", Arity::Range(0, 1)),
    ("bytes", Arity::Range(0, 1)),
    ("dict", Arity::Range(0, 1)),
    ("int", Arity::Range(0, 2)),
    ("list", Arity::Range(0, 1)),
    ("set", Arity::Range(0, 1)),
    ("str", Arity::Range(0, 1)),
    ("tuple", Arity::Range(0, 1)),
    ("type", Arity::Exact(1)),
];

/// Classes surfaced by `type(x)` but not constructible by name.
pub const HIDDEN_CLASSES: &[&str] = &["NoneType", "file", "function", "method", "module"];

/// The statements that bind every native builtin into the prelude module's
/// globals, so `from __builtins__ import *` exposes them everywhere.
pub fn registry_stores(sess: &mut Session) -> Vec<NodeId> {
    let mut stores = Vec::new();
    for func in FUNCTIONS {
        let singleton = sess.singleton_ref(format!("(node *)&builtin_{}_singleton", func.name));
        stores.push(sess.store(func.name, singleton));
    }
    for (class, _) in CLASSES {
        let singleton = sess.singleton_ref(format!("(node *)&class_{class}_singleton"));
        stores.push(sess.store(class, singleton));
    }
    stores
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn tables_are_sorted_by_name() {
        let names: Vec<&str> = FUNCTIONS.iter().map(|f| f.name).collect();
        let mut sorted = names.clone();
        sorted.sort_unstable();
        assert_eq!(names, sorted);

        let classes: Vec<&str> = CLASSES.iter().map(|(name, _)| *name).collect();
        let mut sorted = classes.clone();
        sorted.sort_unstable();
        assert_eq!(classes, sorted);
    }
}
