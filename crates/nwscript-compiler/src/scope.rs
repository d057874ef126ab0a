//! Lexical scopes mapped onto stack slots.
//!
//! Blocks live in an arena ([`CodeRoot`]) and point at their parent by
//! index. Each block belongs to a frame: block 0 is the global frame, and
//! every function body gets a fresh frame whose depth starts at 0 and whose
//! lookups fall back to the globals.
//!
//! Depths and slots are counted in cells relative to the frame base. A
//! binding never moves; its offset from the top of the stack is recomputed
//! from the current depth at every reference:
//!
//! ```text
//! SP-relative bytes = (slot - depth) * 4
//! BP-relative bytes = (slot - bp_base) * 4
//! ```

use crate::error::CompileErrorKind;
use indexmap::IndexMap;
use nwscript_types::{Kind, SLOT_BYTES};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BlockId(usize);

/// The global block.
pub const ROOT: BlockId = BlockId(0);

/// Where a resolved binding lives.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Storage {
    /// In the current frame, addressed relative to the stack pointer.
    Stack { slot: u32 },
    /// In the global frame, reached from a function through the base pointer.
    Global { slot: u32 },
}

impl Storage {
    pub fn slot(self) -> u32 {
        match self {
            Storage::Stack { slot } | Storage::Global { slot } => slot,
        }
    }

    /// Same storage class, `cells` further into the value.
    pub fn offset_by(self, cells: u32) -> Storage {
        match self {
            Storage::Stack { slot } => Storage::Stack { slot: slot + cells },
            Storage::Global { slot } => Storage::Global { slot: slot + cells },
        }
    }
}

#[derive(Debug, Clone)]
struct Binding {
    slot: u32,
    kind: Kind,
}

#[derive(Debug)]
struct CodeBlock {
    parent: Option<BlockId>,
    names: IndexMap<String, Binding>,
    entry_depth: u32,
    depth: u32,
    frame: usize,
}

/// Arena of scope blocks for one compilation unit.
#[derive(Debug)]
pub struct CodeRoot {
    blocks: Vec<CodeBlock>,
    frames: usize,
    bp_base: u32,
}

impl Default for CodeRoot {
    fn default() -> Self {
        Self::new()
    }
}

impl CodeRoot {
    pub fn new() -> Self {
        Self {
            blocks: vec![CodeBlock {
                parent: None,
                names: IndexMap::new(),
                entry_depth: 0,
                depth: 0,
                frame: 0,
            }],
            frames: 1,
            bp_base: 0,
        }
    }

    /// Open a block nested in `parent`, starting at the parent's depth.
    pub fn enter_block(&mut self, parent: BlockId) -> BlockId {
        let (depth, frame) = {
            let block = &self.blocks[parent.0];
            (block.depth, block.frame)
        };
        self.push_block(CodeBlock {
            parent: Some(parent),
            names: IndexMap::new(),
            entry_depth: depth,
            depth,
            frame,
        })
    }

    /// Open a function frame. Lookups that miss fall back to the globals.
    pub fn enter_frame(&mut self) -> BlockId {
        let frame = self.frames;
        self.frames += 1;
        self.push_block(CodeBlock {
            parent: Some(ROOT),
            names: IndexMap::new(),
            entry_depth: 0,
            depth: 0,
            frame,
        })
    }

    fn push_block(&mut self, block: CodeBlock) -> BlockId {
        let id = BlockId(self.blocks.len());
        self.blocks.push(block);
        id
    }

    /// Bind `name` to the next `width` cells of `block`.
    pub fn declare(&mut self, block: BlockId, name: &str, kind: Kind, width: u32) -> Result<u32, CompileErrorKind> {
        let block = &mut self.blocks[block.0];
        if block.names.contains_key(name) {
            return Err(CompileErrorKind::DuplicateDeclaration(name.to_string()));
        }
        let slot = block.depth;
        block.depth += width;
        block.names.insert(name.to_string(), Binding { slot, kind });
        Ok(slot)
    }

    /// Bind `name` to `slot`, cells already counted in the block's depth.
    pub fn declare_reserved(&mut self, block: BlockId, name: &str, kind: Kind, slot: u32) -> Result<(), CompileErrorKind> {
        let block = &mut self.blocks[block.0];
        if block.names.contains_key(name) {
            return Err(CompileErrorKind::DuplicateDeclaration(name.to_string()));
        }
        block.names.insert(name.to_string(), Binding { slot, kind });
        Ok(())
    }

    /// Find `name`, innermost block first.
    pub fn resolve(&self, block: BlockId, name: &str) -> Result<(Storage, Kind), CompileErrorKind> {
        let frame = self.blocks[block.0].frame;
        let mut current = Some(block);
        while let Some(id) = current {
            let candidate = &self.blocks[id.0];
            if let Some(binding) = candidate.names.get(name) {
                let storage = if candidate.frame == frame {
                    Storage::Stack { slot: binding.slot }
                } else {
                    Storage::Global { slot: binding.slot }
                };
                return Ok((storage, binding.kind.clone()));
            }
            current = candidate.parent;
        }
        Err(CompileErrorKind::UndeclaredIdentifier(name.to_string()))
    }

    pub fn current_depth(&self, block: BlockId) -> u32 {
        self.blocks[block.0].depth
    }

    /// Track `width` cells pushed by an expression.
    pub fn push_temp(&mut self, block: BlockId, width: u32) {
        self.blocks[block.0].depth += width;
    }

    /// Track `width` cells popped.
    pub fn pop_temp(&mut self, block: BlockId, width: u32) {
        let block = &mut self.blocks[block.0];
        debug_assert!(block.depth >= width, "popped below frame base");
        block.depth -= width;
    }

    /// Close `block`, returning the number of cells it leaves on the stack.
    pub fn exit_block(&mut self, block: BlockId) -> u32 {
        let block = &self.blocks[block.0];
        block.depth - block.entry_depth
    }

    /// Fix the base pointer once globals are laid out and `SAVEBP` pushed.
    pub fn set_bp_base(&mut self, bp_base: u32) {
        self.bp_base = bp_base;
    }

    /// Byte offset of `storage` as seen from `block`.
    pub fn byte_offset(&self, block: BlockId, storage: Storage) -> i32 {
        let base = match storage {
            Storage::Stack { .. } => self.current_depth(block),
            Storage::Global { .. } => self.bp_base,
        };
        (storage.slot() as i32 - base as i32) * SLOT_BYTES
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_declarators_take_consecutive_slots() {
        let mut root = CodeRoot::new();
        let frame = root.enter_frame();
        assert_eq!(root.declare(frame, "x", Kind::Int, 1).unwrap(), 0);
        assert_eq!(root.declare(frame, "v", Kind::Vector, 3).unwrap(), 1);
        assert_eq!(root.declare(frame, "y", Kind::Int, 1).unwrap(), 4);
        assert_eq!(root.current_depth(frame), 5);
    }

    #[test]
    fn test_duplicate_only_in_same_block() {
        let mut root = CodeRoot::new();
        let frame = root.enter_frame();
        root.declare(frame, "x", Kind::Int, 1).unwrap();
        assert_eq!(
            root.declare(frame, "x", Kind::Int, 1),
            Err(CompileErrorKind::DuplicateDeclaration("x".into()))
        );

        let inner = root.enter_block(frame);
        assert_eq!(root.declare(inner, "x", Kind::Float, 1).unwrap(), 1);
        assert_eq!(root.resolve(inner, "x").unwrap(), (Storage::Stack { slot: 1 }, Kind::Float));
        assert_eq!(root.exit_block(inner), 1);
        assert_eq!(root.resolve(frame, "x").unwrap(), (Storage::Stack { slot: 0 }, Kind::Int));
    }

    #[test]
    fn test_offsets_follow_depth() {
        let mut root = CodeRoot::new();
        let frame = root.enter_frame();
        root.declare(frame, "x", Kind::Int, 1).unwrap();
        let (storage, _) = root.resolve(frame, "x").unwrap();
        assert_eq!(root.byte_offset(frame, storage), -4);
        root.push_temp(frame, 2);
        assert_eq!(root.byte_offset(frame, storage), -12);
        root.pop_temp(frame, 2);
        assert_eq!(root.byte_offset(frame, storage), -4);
    }

    #[test]
    fn test_globals_reached_through_base_pointer() {
        let mut root = CodeRoot::new();
        root.declare(ROOT, "g1", Kind::Int, 1).unwrap();
        root.declare(ROOT, "g2", Kind::Int, 1).unwrap();
        root.set_bp_base(root.current_depth(ROOT) + 1);

        let frame = root.enter_frame();
        let (storage, _) = root.resolve(frame, "g1").unwrap();
        assert_eq!(storage, Storage::Global { slot: 0 });
        assert_eq!(root.byte_offset(frame, storage), -12);

        let (storage, _) = root.resolve(ROOT, "g2").unwrap();
        assert_eq!(storage, Storage::Stack { slot: 1 });
    }

    #[test]
    fn test_undeclared() {
        let root = CodeRoot::new();
        assert_eq!(
            root.resolve(ROOT, "nope"),
            Err(CompileErrorKind::UndeclaredIdentifier("nope".into()))
        );
    }
}
