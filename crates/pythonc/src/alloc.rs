//! Allocator glue embedded in the emitted C++.
//!
//! The generated program carves 2 MiB chunks from the OS into aligned 16 KiB
//! blocks. Each block serves one object size class and holds as many objects
//! as fit next to a same-sized liveness bitmap, a next-block pointer, and
//! padding. The unused tail bits of the last bitmap word are pre-set to
//! "live" so they are never handed out.

use std::fmt::Write;

pub const BLOCK_SIZE_POW2: u64 = 14;
pub const BLOCK_SIZE: u64 = 1 << BLOCK_SIZE_POW2;
pub const CHUNK_SIZE: u64 = 1 << 21;
/// Object size classes, matching the runtime object sizes.
pub const OBJ_SIZES: [u64; 4] = [16, 24, 32, 56];

/// Derived layout of one size class's arena block.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SizeClass {
    pub obj_size: u64,
    pub n_objects: u64,
    pub n_live_words: u64,
    pub padding: u64,
}

pub fn size_class(obj_size: u64) -> SizeClass {
    let capacity = BLOCK_SIZE - 8;
    let n_objects = capacity * 8 / (obj_size * 8 + 1);
    let n_live_words = n_objects.div_ceil(64);
    let padding = capacity - (n_objects * obj_size + n_live_words * 8);
    SizeClass {
        obj_size,
        n_objects,
        n_live_words,
        padding,
    }
}

/// Write the allocator classes and the `allocator` facade.
pub fn write_allocator(out: &mut String) {
    write!(
        out,
        r#"
#define BLOCK_SIZE ({block_size})
#define CHUNK_SIZE ({chunk_size})

typedef unsigned char byte;

static inline uint32_t bitscan64(uint64_t r) {{
    asm ("bsfq %0, %0" : "=r" (r) : "0" (r));
    return r;
}}

static byte *alloc_chunk_start, *alloc_chunk_end;

static inline void alloc_chunk() {{
    alloc_chunk_start = new byte[CHUNK_SIZE];
    alloc_chunk_end = alloc_chunk_start + CHUNK_SIZE;
    // Align the start of the chunk
    alloc_chunk_start = (byte *)(((uint64_t)alloc_chunk_start + BLOCK_SIZE - 1) & ~(uint64_t)(BLOCK_SIZE - 1));
}}
"#,
        block_size = BLOCK_SIZE,
        chunk_size = CHUNK_SIZE,
    )
    .unwrap();

    for &obj_size in &OBJ_SIZES {
        let sc = size_class(obj_size);
        write!(
            out,
            r#"
class arena_block_{obj_size} {{
public:
    static const uint64_t obj_size = {obj_size};
    static const uint64_t n_objects = {n_objects};
    static const uint64_t n_live = {n_live};

    byte data[n_objects][obj_size];
    uint64_t live_bits[n_live];
    arena_block_{obj_size} *next_block;
    byte padding[{padding}];

    static arena_block_{obj_size} *head;

    static inline arena_block_{obj_size} *alloc_block() {{
        if (alloc_chunk_end - alloc_chunk_start < BLOCK_SIZE)
            alloc_chunk();

        arena_block_{obj_size} *p = (arena_block_{obj_size} *)alloc_chunk_start;
        alloc_chunk_start += BLOCK_SIZE;
        p->mark_dead();
        return p;
    }}

    static void *alloc_obj() {{
        arena_block_{obj_size} *block = arena_block_{obj_size}::head;
        void *p = block->get_next_obj();
        if (!p) {{
            block = alloc_block();
            block->next_block = arena_block_{obj_size}::head;
            arena_block_{obj_size}::head = block;
            p = block->get_next_obj();
        }}
        return p;
    }}

    void mark_dead() {{
        for (uint32_t t = 0; t < n_live - 1; t++)
            this->live_bits[t] = 0;
        // Bits past the end of the block must never be handed out, so they
        // stay permanently live.
        this->live_bits[n_live - 1] = -1ull << (n_objects & 63);
    }}
    void *get_next_obj() {{
        for (uint32_t t = 0; t < n_live; t++) {{
            uint64_t dead = ~this->live_bits[t];
            if (dead) {{
                uint32_t bit = bitscan64(dead);
                uint32_t idx = t * 64 + bit;
                this->live_bits[t] |= (1ull << bit);
                return (void *)this->data[idx];
            }}
        }}
        return NULL;
    }}
    bool mark_live(void *object) {{
        uint32_t idx = ((uint64_t)object & (BLOCK_SIZE - 1)) / obj_size;
        uint32_t t = idx / 64;
        uint64_t bit = 1ull << (idx & 63);
        bool already_live = (this->live_bits[t] & bit) != 0ull;
        this->live_bits[t] |= bit;
        return already_live;
    }}
}};
arena_block_{obj_size} *arena_block_{obj_size}::head;
"#,
            obj_size = obj_size,
            n_objects = sc.n_objects,
            n_live = sc.n_live_words,
            padding = sc.padding,
        )
        .unwrap();
    }

    out.push_str("\nclass allocator {\npublic:\n    allocator() {\n");
    for &obj_size in &OBJ_SIZES {
        writeln!(
            out,
            "        arena_block_{obj_size}::head = arena_block_{obj_size}::alloc_block();"
        )
        .unwrap();
        writeln!(out, "        arena_block_{obj_size}::head->next_block = NULL;").unwrap();
    }
    out.push_str("    }\n\n    template<class T>\n    T *alloc_obj() {\n        switch (sizeof(T)) {\n");
    for &obj_size in &OBJ_SIZES {
        writeln!(
            out,
            "        case {obj_size}: return (T *)arena_block_{obj_size}::alloc_obj();"
        )
        .unwrap();
    }
    out.push_str(
        "        default: assert(!\"bad obj size\"); return NULL;\n        }\n    }\n\n    void mark_dead() {\n",
    );
    for &obj_size in &OBJ_SIZES {
        writeln!(
            out,
            "        for (arena_block_{obj_size} *p = arena_block_{obj_size}::head; p; p = p->next_block)"
        )
        .unwrap();
        out.push_str("            p->mark_dead();\n");
    }
    out.push_str(
        "    }\n\n    template<size_t bytes>\n    bool mark_live(void *object) {\n        void *block = (void *)((uint64_t)object & ~(uint64_t)(BLOCK_SIZE - 1));\n        switch (bytes) {\n",
    );
    for &obj_size in &OBJ_SIZES {
        writeln!(
            out,
            "        case {obj_size}: return ((arena_block_{obj_size} *)block)->mark_live(object);"
        )
        .unwrap();
    }
    out.push_str(
        "        default: assert(!\"bad obj size\"); return false;\n        }\n    }\n} alloc;\n",
    );
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn size_classes_fill_the_block() {
        for &obj_size in &OBJ_SIZES {
            let sc = size_class(obj_size);
            // data + bitmap + next pointer + padding must exactly fill a block
            let total = sc.n_objects * sc.obj_size + sc.n_live_words * 8 + 8 + sc.padding;
            assert_eq!(total, BLOCK_SIZE, "size class {obj_size}");
            // the bitmap covers every object
            assert!(sc.n_live_words * 64 >= sc.n_objects);
        }
    }

    #[test]
    fn known_layouts() {
        assert_eq!(
            size_class(16),
            SizeClass {
                obj_size: 16,
                n_objects: 1015,
                n_live_words: 16,
                padding: 8
            }
        );
        assert_eq!(
            size_class(56),
            SizeClass {
                obj_size: 56,
                n_objects: 291,
                n_live_words: 5,
                padding: 40
            }
        );
    }

    #[test]
    fn emitted_allocator_names_every_size_class() {
        let mut out = String::new();
        write_allocator(&mut out);
        for &obj_size in &OBJ_SIZES {
            assert!(out.contains(&format!("class arena_block_{obj_size}")));
        }
        assert!(out.contains("bitscan64"));
        assert!(out.contains("} alloc;"));
    }
}
