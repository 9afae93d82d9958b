//! Opaque data types.
//!
//! Foreign objects appear to programs as ordinary nodes: an
//! `OpaqueData` node carries a type id into this registry plus two
//! payload slots the type interprets for itself. Each registered type
//! supplies eval/mark/sweep hooks; sweep runs when the node is
//! reclaimed, so resources release with their node.
//!
//! Shipped types: `file` (a stream handle; the slot indexes the
//! type's handle table; sweeping closes owned files but never the
//! three standard streams) and `fpos` (a stream position token stored
//! inline in the slot).

use std::any::Any;
use std::fs::{File, OpenOptions};
use std::hash::BuildHasherDefault;
use std::io::{Read, Seek, SeekFrom, Write};

use indexmap::IndexMap;
use rustc_hash::FxHasher;

use crate::ast::NodeId;

type FxIndexMap<K, V> = IndexMap<K, V, BuildHasherDefault<FxHasher>>;

/// Hooks for one opaque type.
pub trait OpaqueType: Any {
    fn name(&self) -> &'static str;

    /// Evaluation hook; opaque data is normally self-evaluating.
    fn eval(&mut self, node: NodeId) -> NodeId {
        node
    }

    /// Report nodes reachable from a slot to the mark phase.
    fn mark(&self, _slot: u64, _mark: &mut dyn FnMut(NodeId)) {}

    /// Release resources attached to a slot before reclamation.
    fn sweep(&mut self, _slot: u64) {}

    fn as_any_mut(&mut self) -> &mut dyn Any;
}

/// The registry: insertion-ordered, indexed by name; the position is
/// the type id stored in nodes.
#[derive(Default)]
pub struct OdtRegistry {
    types: FxIndexMap<&'static str, Box<dyn OpaqueType>>,
}

impl OdtRegistry {
    pub fn new() -> Self {
        OdtRegistry { types: FxIndexMap::default() }
    }

    /// Register a type, returning its id. Re-registering a name
    /// returns the existing id.
    pub fn register(&mut self, ty: Box<dyn OpaqueType>) -> u32 {
        let name = ty.name();
        if let Some(index) = self.types.get_index_of(name) {
            return index as u32;
        }
        self.types.insert(name, ty);
        (self.types.len() - 1) as u32
    }

    pub fn id_of(&self, name: &str) -> Option<u32> {
        self.types.get_index_of(name).map(|i| i as u32)
    }

    pub fn name_of(&self, id: u32) -> &'static str {
        self.types
            .get_index(id as usize)
            .map(|(name, _)| *name)
            .unwrap_or("")
    }

    pub fn eval(&mut self, id: u32, node: NodeId) -> NodeId {
        match self.types.get_index_mut(id as usize) {
            Some((_, ty)) => ty.eval(node),
            None => node,
        }
    }

    pub fn mark(&self, id: u32, slot: u64, mark: &mut dyn FnMut(NodeId)) {
        if let Some((_, ty)) = self.types.get_index(id as usize) {
            ty.mark(slot, mark);
        }
    }

    pub fn sweep(&mut self, id: u32, slot: u64) {
        if let Some((_, ty)) = self.types.get_index_mut(id as usize) {
            ty.sweep(slot);
        }
    }

    pub fn downcast_mut<T: OpaqueType>(&mut self, id: u32) -> Option<&mut T> {
        self.types
            .get_index_mut(id as usize)
            .and_then(|(_, ty)| ty.as_any_mut().downcast_mut::<T>())
    }
}

// ---- the file type ------------------------------------------------

#[derive(Debug)]
enum Stream {
    Stdin,
    Stdout,
    Stderr,
    Owned(File),
}

/// One open stream plus its sticky status flags.
#[derive(Debug)]
pub struct FileHandle {
    stream: Stream,
    eof: bool,
    error: bool,
}

impl FileHandle {
    /// Read bytes up to (and consuming) a newline or end of input.
    pub fn read_chunk(&mut self) -> String {
        let mut out = Vec::new();
        let mut byte = [0u8; 1];
        loop {
            let got = match &mut self.stream {
                Stream::Stdin => std::io::stdin().read(&mut byte),
                Stream::Owned(f) => f.read(&mut byte),
                Stream::Stdout | Stream::Stderr => {
                    self.error = true;
                    return String::new();
                }
            };
            match got {
                Ok(0) => {
                    self.eof = true;
                    break;
                }
                Ok(_) => {
                    if byte[0] == b'\n' {
                        break;
                    }
                    out.push(byte[0]);
                }
                Err(_) => {
                    self.error = true;
                    break;
                }
            }
        }
        String::from_utf8_lossy(&out).into_owned()
    }

    pub fn write_str(&mut self, s: &str) -> bool {
        let result = match &mut self.stream {
            Stream::Stdout => std::io::stdout().write_all(s.as_bytes()),
            Stream::Stderr => std::io::stderr().write_all(s.as_bytes()),
            Stream::Owned(f) => f.write_all(s.as_bytes()),
            Stream::Stdin => {
                self.error = true;
                return false;
            }
        };
        if result.is_err() {
            self.error = true;
        }
        result.is_ok()
    }

    pub fn flush(&mut self) {
        let _ = match &mut self.stream {
            Stream::Stdout => std::io::stdout().flush(),
            Stream::Stderr => std::io::stderr().flush(),
            Stream::Owned(f) => f.flush(),
            Stream::Stdin => Ok(()),
        };
    }

    pub fn rewind(&mut self) -> bool {
        match &mut self.stream {
            Stream::Owned(f) => {
                self.eof = false;
                f.seek(SeekFrom::Start(0)).is_ok()
            }
            _ => false,
        }
    }

    pub fn position(&mut self) -> Option<u64> {
        match &mut self.stream {
            Stream::Owned(f) => f.stream_position().ok(),
            _ => None,
        }
    }

    pub fn set_position(&mut self, pos: u64) -> bool {
        match &mut self.stream {
            Stream::Owned(f) => {
                self.eof = false;
                f.seek(SeekFrom::Start(pos)).is_ok()
            }
            _ => false,
        }
    }

    pub fn is_eof(&self) -> bool {
        self.eof
    }

    pub fn is_error(&self) -> bool {
        self.error
    }

    pub fn clear_status(&mut self) {
        self.eof = false;
        self.error = false;
    }
}

/// The `file` opaque type: a table of open handles. A slot word
/// carries the table index in its low half and a per-slot generation
/// in its high half, so a stale node sweeping after manual close can
/// never release a recycled slot's new occupant.
#[derive(Default)]
pub struct FileType {
    handles: Vec<Option<FileHandle>>,
    generations: Vec<u32>,
    free: Vec<usize>,
}

fn slot_word(index: usize, generation: u32) -> u64 {
    ((generation as u64) << 32) | index as u64
}

impl FileType {
    pub const NAME: &'static str = "file";

    pub fn new() -> Self {
        FileType::default()
    }

    fn unpack(&self, slot: u64) -> Option<usize> {
        let index = (slot & 0xFFFF_FFFF) as usize;
        let generation = (slot >> 32) as u32;
        if self.generations.get(index) == Some(&generation) {
            Some(index)
        } else {
            None
        }
    }

    /// Open a stream. `<`, `>` and `>>` name the standard streams;
    /// anything else resolves through the filesystem with a C-style
    /// mode string (`r`, `w`, `a`, with optional `+`).
    pub fn open(&mut self, name: &str, mode: &str) -> Option<u64> {
        let stream = match name {
            "<" if mode.starts_with('r') => Stream::Stdin,
            ">" if mode.starts_with('w') => Stream::Stdout,
            ">>" if mode.starts_with('w') => Stream::Stderr,
            "<" | ">" | ">>" => return None,
            _ => {
                let mut opts = OpenOptions::new();
                let update = mode.contains('+');
                match mode.chars().next() {
                    Some('r') => {
                        opts.read(true).write(update);
                    }
                    Some('w') => {
                        opts.read(update).write(true).create(true).truncate(true);
                    }
                    Some('a') => {
                        opts.read(update).append(true).create(true);
                    }
                    _ => return None,
                }
                Stream::Owned(opts.open(name).ok()?)
            }
        };
        let handle = FileHandle { stream, eof: false, error: false };
        let index = match self.free.pop() {
            Some(index) => {
                self.handles[index] = Some(handle);
                index
            }
            None => {
                self.handles.push(Some(handle));
                self.generations.push(0);
                self.handles.len() - 1
            }
        };
        Some(slot_word(index, self.generations[index]))
    }

    pub fn get(&mut self, slot: u64) -> Option<&mut FileHandle> {
        let index = self.unpack(slot)?;
        self.handles.get_mut(index)?.as_mut()
    }

    /// Close a handle. The standard streams are left open but their
    /// slot is released.
    pub fn close(&mut self, slot: u64) {
        if let Some(index) = self.unpack(slot) {
            if self.handles[index].take().is_some() {
                self.generations[index] += 1;
                self.free.push(index);
            }
        }
    }
}

impl OpaqueType for FileType {
    fn name(&self) -> &'static str {
        FileType::NAME
    }

    fn sweep(&mut self, slot: u64) {
        // Owned files close on drop; standard streams just vacate.
        self.close(slot);
    }

    fn as_any_mut(&mut self) -> &mut dyn Any {
        self
    }
}

/// The `fpos` opaque type: the position token lives inline in the
/// node's slot, so there is nothing to mark or sweep.
#[derive(Default)]
pub struct FilePosType;

impl FilePosType {
    pub const NAME: &'static str = "fpos";
}

impl OpaqueType for FilePosType {
    fn name(&self) -> &'static str {
        FilePosType::NAME
    }

    fn as_any_mut(&mut self) -> &mut dyn Any {
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_registry_ids_are_stable() {
        let mut reg = OdtRegistry::new();
        let file = reg.register(Box::new(FileType::new()));
        let fpos = reg.register(Box::new(FilePosType));
        assert_eq!(file, 0);
        assert_eq!(fpos, 1);
        assert_eq!(reg.id_of("file"), Some(0));
        assert_eq!(reg.id_of("fpos"), Some(1));
        assert_eq!(reg.name_of(1), "fpos");
        assert_eq!(reg.name_of(99), "");

        // Re-registering is idempotent.
        assert_eq!(reg.register(Box::new(FileType::new())), 0);
    }

    #[test]
    fn test_file_slots_recycle_with_fresh_generation() {
        let mut ft = FileType::new();
        let a = ft.open(">", "w").unwrap();
        ft.close(a);
        let b = ft.open(">>", "w").unwrap();
        // Same table index, new generation: the stale word is dead.
        assert_ne!(a, b);
        assert!(ft.get(a).is_none());
        assert!(ft.get(b).is_some());
        // Closing through the stale word must not touch the occupant.
        ft.close(a);
        assert!(ft.get(b).is_some());
    }

    #[test]
    fn test_owned_file_roundtrip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("t.txt");
        let path = path.to_str().unwrap();

        let mut ft = FileType::new();
        let w = ft.open(path, "w").unwrap();
        assert!(ft.get(w).unwrap().write_str("line one\nline two\n"));
        ft.close(w);

        let r = ft.open(path, "r").unwrap();
        let h = ft.get(r).unwrap();
        assert_eq!(h.read_chunk(), "line one");
        assert_eq!(h.read_chunk(), "line two");
        assert!(!h.is_eof());
        assert_eq!(h.read_chunk(), "");
        assert!(h.is_eof());
        assert!(h.rewind());
        assert_eq!(h.read_chunk(), "line one");
    }
}
