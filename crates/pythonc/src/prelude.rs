//! The `__builtins__` prelude: builtins written in the translated subset.
//!
//! Every translated module behaves as if `from __builtins__ import *` were
//! its first statement. The natives bound by the registry (`len`, `iter`,
//! `next`, the type constructors, …) cover what needs the runtime's
//! representation; the rest of the builtin surface is ordinary Python,
//! translated through the normal import machinery.

pub const SOURCE: &str = r#"import sys

def print(*args, sep=None, end=None, file=None):
    if sep is None:
        sep = ' '
    if end is None:
        end = '\n'
    if file is None:
        file = sys.stdout
    file.write(sep.join([str(a) for a in args]) + end)

def abs(x):
    return -x if x < 0 else x

def any(iterable):
    for element in iterable:
        if element:
            return True
    return False

def all(iterable):
    for element in iterable:
        if not element:
            return False
    return True

def enumerate(iterable, start=0):
    result = []
    index = start
    for element in iterable:
        result.append((index, element))
        index = index + 1
    return result

def zip(*iterables):
    result = []
    iterators = [iter(it) for it in iterables]
    if len(iterators) == 0:
        return result
    while True:
        row = []
        for it in iterators:
            value = next(it, None)
            if value is None:
                return result
            row.append(value)
        result.append(tuple(row))

def map(function, iterable):
    return [function(element) for element in iterable]

def filter(function, iterable):
    result = []
    for element in iterable:
        if function(element):
            result.append(element)
    return result

def reversed(sequence):
    result = []
    index = len(sequence) - 1
    while index >= 0:
        result.append(sequence[index])
        index = index - 1
    return result

def min(*args):
    assert len(args) > 0
    items = args[0] if len(args) == 1 else args
    best = None
    first = True
    for element in items:
        if first:
            best = element
            first = False
        elif element < best:
            best = element
    assert not first
    return best

def max(*args):
    assert len(args) > 0
    items = args[0] if len(args) == 1 else args
    best = None
    first = True
    for element in items:
        if first:
            best = element
            first = False
        elif element > best:
            best = element
    assert not first
    return best

def sum(iterable, start=0):
    total = start
    for element in iterable:
        total = total + element
    return total
"#;
