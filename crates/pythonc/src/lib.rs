//! Pythonc - an ahead-of-time Python 3 to C++ translator
//!
//! Pythonc accepts a subset of Python 3 and emits a single self-contained C++
//! source file which, compiled together with the hand-written runtime
//! (`backend.cpp`), reproduces the program's behavior.
//!
//! # Pipeline
//!
//! 1. **Translate**: the host AST (parsed with `ruff_python_parser`) is
//!    lowered into an intermediate syntax graph of tagged nodes with
//!    use-list back-edges.
//! 2. **Flatten**: each statement is reduced to atomic three-address form;
//!    comprehensions, loops, bool-ops, and collection literals lower to
//!    primitive control flow, and every non-atomic subexpression is hoisted
//!    into a `temp_NN` store, preserving left-to-right evaluation order.
//! 3. **Scope analysis**: every name reference is classified as
//!    module-global, function-local, or class-attribute and given a dense
//!    index into its scope's symbol table.
//! 4. **Emit**: the graph is serialized as C++ together with the allocator,
//!    the built-in registry wrappers, and one interned definition per
//!    distinct literal.
//!
//! # Quick start
//!
//! ```no_run
//! let cpp = pythonc::translate_source("program", "print(1 + 2)").unwrap();
//! std::fs::write("program.cpp", cpp).unwrap();
//! ```
//!
//! # Supported subset
//!
//! Integers, booleans, strings, bytes, lists, tuples, dicts, sets; `if`,
//! `while`, `for`, `break`, `continue`; functions with defaults, `*args`,
//! and keyword-only parameters; single-inheritance-free classes; list, set,
//! dict, and generator comprehensions (eagerly materialized); `import` and
//! `from ... import` with static path resolution; `global`, `assert`,
//! `raise <expr>`, `del x[i]`, augmented assignment, tuple unpacking, and
//! the `with ... as name` form.
//!
//! # Not supported
//!
//! Floating point, `try`/`except`, generators as coroutines, multiple
//! inheritance, decorators other than `@builtin`, f-strings, and lambdas.
//! Unsupported syntax is rejected at translate time with the source line.

mod alloc;
mod builtins;
mod context;
mod emit;
mod error;
mod imports;
mod intern;
mod methods;
mod modules;
mod prelude;
mod reduce;
mod scope;
mod syntax;
mod translate;

pub use error::{Error, Result};
pub use imports::{translate_file, translate_source};
