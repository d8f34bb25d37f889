//! Per-class method tables of the built-in registry.
//!
//! The emitter turns each entry into a `wrapped_method_<class>_<name>`
//! function that rejects kwargs, checks the receiver's type, casts, and calls
//! the runtime implementation. The X-macro lists in the preamble let the
//! runtime build its method lookup tables from the same data.

use crate::builtins::Arity;

pub struct Method {
    pub class: &'static str,
    pub name: &'static str,
    pub arity: Arity,
}

const fn method(class: &'static str, name: &'static str, arity: Arity) -> Method {
    Method { class, name, arity }
}

/// Methods grouped by class, classes and names both in sorted order.
pub const METHODS: &[Method] = &[
    method("dict", "clear", Arity::Exact(0)),
    method("dict", "copy", Arity::Exact(0)),
    method("dict", "get", Arity::Range(1, 2)),
    method("dict", "items", Arity::Exact(0)),
    method("dict", "keys", Arity::Exact(0)),
    method("dict", "pop", Arity::Range(1, 2)),
    method("dict", "update", Arity::Exact(1)),
    method("dict", "values", Arity::Exact(0)),
    method("file", "close", Arity::Exact(0)),
    method("file", "read", Arity::Range(0, 1)),
    method("file", "readlines", Arity::Exact(0)),
    method("file", "write", Arity::Exact(1)),
    method("list", "append", Arity::Exact(1)),
    method("list", "count", Arity::Exact(1)),
    method("list", "extend", Arity::Exact(1)),
    method("list", "index", Arity::Exact(1)),
    method("list", "insert", Arity::Exact(2)),
    method("list", "pop", Arity::Range(0, 1)),
    method("list", "remove", Arity::Exact(1)),
    method("list", "reverse", Arity::Exact(0)),
    method("list", "sort", Arity::Exact(0)),
    method("set", "add", Arity::Exact(1)),
    method("set", "clear", Arity::Exact(0)),
    method("set", "discard", Arity::Exact(1)),
    method("set", "remove", Arity::Exact(1)),
    method("set", "update", Arity::Exact(1)),
    method("str", "endswith", Arity::Exact(1)),
    method("str", "find", Arity::Range(1, 2)),
    method("str", "join", Arity::Exact(1)),
    method("str", "lower", Arity::Exact(0)),
    method("str", "replace", Arity::Exact(2)),
    method("str", "split", Arity::Range(0, 2)),
    method("str", "startswith", Arity::Exact(1)),
    method("str", "strip", Arity::Range(0, 1)),
    method("str", "upper", Arity::Exact(0)),
    method("tuple", "count", Arity::Exact(1)),
    method("tuple", "index", Arity::Exact(1)),
];

/// The classes that carry method tables, in emission order.
pub const METHOD_CLASSES: &[&str] = &["dict", "file", "list", "set", "str", "tuple"];

/// The C++ runtime class a registry class name casts to.
pub fn cpp_type(class: &str) -> &'static str {
    match class {
        "str" => "string_const",
        "bytes" => "bytes_const",
        "int" => "int_const",
        "bool" => "bool_const",
        "dict" => "dict",
        "file" => "file",
        "list" => "list",
        "set" => "set",
        "tuple" => "tuple",
        other => panic!("no runtime type for class '{other}'"),
    }
}

/// The runtime predicate that checks a receiver's type.
pub fn check_fn(class: &str) -> &'static str {
    match class {
        "str" => "is_string",
        "bytes" => "is_bytes",
        "dict" => "is_dict",
        "file" => "is_file",
        "list" => "is_list",
        "set" => "is_set",
        "tuple" => "is_tuple",
        other => panic!("no type predicate for class '{other}'"),
    }
}

pub fn methods_of(class: &str) -> impl Iterator<Item = &'static Method> {
    METHODS.iter().filter(move |m| m.class == class)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn every_method_class_is_listed() {
        for m in METHODS {
            assert!(
                METHOD_CLASSES.contains(&m.class),
                "method table for unlisted class {}",
                m.class
            );
        }
    }

    #[test]
    fn methods_are_grouped_and_sorted() {
        let keys: Vec<(&str, &str)> = METHODS.iter().map(|m| (m.class, m.name)).collect();
        let mut sorted = keys.clone();
        sorted.sort_unstable();
        assert_eq!(keys, sorted);
    }
}
