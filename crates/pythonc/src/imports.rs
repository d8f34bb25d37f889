//! Import resolution.
//!
//! `import X` first checks the built-in module table, then searches the
//! input file's directory and the working directory for `X.py` and
//! recursively translates it. A session-wide map of already-imported
//! absolute paths deduplicates repeated imports; a module in flight is
//! marked with a sentinel so cycles surface as errors instead of recursion.

use std::fs;
use std::path::{Path, PathBuf};

use ruff_python_ast as ast;

use crate::error::{Error, Result};
use crate::intern::Session;
use crate::modules;
use crate::prelude;
use crate::syntax::{NodeId, NodeKind};
use crate::translate::{Translator, translate_module};

/// Sentinel module index for an import still being translated.
const IN_PROGRESS: usize = usize::MAX;

/// The pseudo-path the embedded prelude is registered under.
fn prelude_path() -> PathBuf {
    PathBuf::from("<__builtins__>")
}

/// Translate the embedded `__builtins__` prelude once per session.
pub fn ensure_prelude(sess: &mut Session) -> Result<usize> {
    if let Some(&idx) = sess.imported.get(&prelude_path()) {
        return Ok(idx);
    }
    sess.imported.insert(prelude_path(), IN_PROGRESS);
    let idx = translate_module(sess, "__builtins__", prelude::SOURCE, Path::new("."), true)?;
    sess.imported.insert(prelude_path(), idx);
    Ok(idx)
}

/// Index of the prelude module. Only valid after [`ensure_prelude`].
pub fn prelude_index(sess: &Session) -> usize {
    match sess.imported.get(&prelude_path()) {
        Some(&idx) if idx != IN_PROGRESS => idx,
        _ => panic!("prelude requested before it was translated"),
    }
}

/// `import X [as a]`.
pub fn visit_import(
    t: &mut Translator,
    stmt: &ast::StmtImport,
    out: &mut Vec<NodeId>,
) -> Result<()> {
    for alias in &stmt.names {
        let name = alias.name.to_string();
        let asname = alias
            .asname
            .as_ref()
            .map_or_else(|| name.clone(), |a| a.to_string());
        if name.contains('.') {
            return Err(Error::unsupported(t.line(stmt), "dotted imports"));
        }
        if modules::is_builtin_module(&name) {
            let singleton = t
                .sess
                .singleton_ref(format!("(node *)&module_{name}_singleton"));
            out.push(t.sess.store(&asname, singleton));
            continue;
        }
        let module = resolve_module(t, &name, t.line(stmt))?;
        out.push(t.sess.graph.node(NodeKind::ImportStatement {
            alias: Some(asname),
            star: false,
            names: Vec::new(),
            module,
        }));
    }
    Ok(())
}

/// `from X import a [as b], ...` and `from X import *`.
pub fn visit_import_from(
    t: &mut Translator,
    stmt: &ast::StmtImportFrom,
    out: &mut Vec<NodeId>,
) -> Result<()> {
    if stmt.level != 0 {
        return Err(Error::unsupported(t.line(stmt), "relative imports"));
    }
    let Some(module_name) = &stmt.module else {
        return Err(Error::unsupported(t.line(stmt), "relative imports"));
    };
    let module_name = module_name.to_string();
    if modules::is_builtin_module(&module_name) {
        return Err(Error::unsupported(
            t.line(stmt),
            format!("from-import on built-in module '{module_name}'"),
        ));
    }

    let module = if module_name == "__builtins__" {
        prelude_index(t.sess)
    } else {
        resolve_module(t, &module_name, t.line(stmt))?
    };

    let star = stmt.names.len() == 1 && stmt.names[0].name.as_str() == "*";
    if star {
        out.push(t.sess.graph.node(NodeKind::ImportStatement {
            alias: None,
            star: true,
            names: Vec::new(),
            module,
        }));
        return Ok(());
    }

    let mut names = Vec::new();
    for alias in &stmt.names {
        let name = alias.name.to_string();
        let asname = alias
            .asname
            .as_ref()
            .map_or_else(|| name.clone(), |a| a.to_string());
        if t.sess.modules[module].ctx.global_index(&name).is_none() {
            return Err(Error::unsupported(
                t.line(stmt),
                format!("cannot import name '{name}' from '{module_name}'"),
            ));
        }
        names.push((name, asname));
    }
    out.push(t.sess.graph.node(NodeKind::ImportStatement {
        alias: None,
        star: false,
        names,
        module,
    }));
    Ok(())
}

/// Locate `name.py` on the search path and translate it (once).
fn resolve_module(t: &mut Translator, name: &str, line: u32) -> Result<usize> {
    let candidates = [t.dir.join(format!("{name}.py")), PathBuf::from(format!("{name}.py"))];
    let path = candidates
        .iter()
        .find(|p| p.is_file())
        .ok_or_else(|| Error::Import {
            line,
            module: name.to_string(),
        })?;
    let canonical = path.canonicalize().unwrap_or_else(|_| path.clone());

    match t.sess.imported.get(&canonical) {
        Some(&IN_PROGRESS) => {
            return Err(Error::unsupported(
                line,
                format!("circular import of '{name}'"),
            ));
        }
        Some(&idx) => return Ok(idx),
        None => {}
    }

    let source = fs::read_to_string(path)?;
    let dir = path
        .parent()
        .map_or_else(|| PathBuf::from("."), Path::to_path_buf);
    let module_name = unique_module_name(t.sess, name);

    t.sess.imported.insert(canonical.clone(), IN_PROGRESS);
    let idx = translate_module(t.sess, &module_name, &source, &dir, false)?;
    t.sess.imported.insert(canonical, idx);
    Ok(idx)
}

/// Sanitize a module name into a C++ identifier fragment, unique within the
/// session.
fn unique_module_name(sess: &Session, name: &str) -> String {
    let mut base: String = name
        .chars()
        .map(|c| if c.is_ascii_alphanumeric() || c == '_' { c } else { '_' })
        .collect();
    if base.chars().next().is_some_and(|c| c.is_ascii_digit()) {
        base.insert(0, '_');
    }
    let taken = |name: &str| {
        modules::is_builtin_module(name) || sess.modules.iter().any(|m| m.ctx.name == name)
    };
    if !taken(&base) {
        return base;
    }
    let mut n = 2;
    loop {
        let candidate = format!("{base}_{n}");
        if !taken(&candidate) {
            return candidate;
        }
        n += 1;
    }
}

// ---------------------------------------------------------------------------
// Whole-program entry points
// ---------------------------------------------------------------------------

/// Translate a program from source text (imports resolve against the working
/// directory) and emit the C++ output.
pub fn translate_source(name: &str, source: &str) -> Result<String> {
    let mut sess = Session::new();
    ensure_prelude(&mut sess)?;
    let root = unique_module_name(&sess, name);
    translate_module(&mut sess, &root, source, Path::new("."), false)?;
    Ok(crate::emit::emit(&sess))
}

/// Translate a program from a file and emit the C++ output.
pub fn translate_file(path: &Path) -> Result<String> {
    let source = fs::read_to_string(path)?;
    let stem = path
        .file_stem()
        .ok_or_else(|| Error::BadPath(path.to_path_buf()))?
        .to_string_lossy()
        .into_owned();
    let dir = path
        .parent()
        .map_or_else(|| PathBuf::from("."), Path::to_path_buf);

    let mut sess = Session::new();
    ensure_prelude(&mut sess)?;
    if let Ok(canonical) = path.canonicalize() {
        // The root program itself counts as imported, so a self-import is
        // reported as a cycle rather than translated twice.
        sess.imported.insert(canonical, IN_PROGRESS);
    }
    let root = unique_module_name(&sess, &stem);
    translate_module(&mut sess, &root, &source, &dir, false)?;
    Ok(crate::emit::emit(&sess))
}
