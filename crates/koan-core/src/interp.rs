//! The interpreter.
//!
//! One [`Interp`] owns everything the evaluator touches: the heap, the
//! operator table, the global and system scopes, the interned sources
//! with their per-source static environments, the current
//! statics/locals registers, the opaque-type registry and the import
//! search paths. Construction installs the whole builtin surface;
//! [`Interp::process`] then runs the parse-evaluate-collect loop over
//! a piece of source text, collecting only at the safe points between
//! top-level expressions.

use std::hash::BuildHasherDefault;

use indexmap::IndexSet;
use koan_util::{memhash, Sloc};
use rustc_hash::FxHasher;
use tracing::debug;

use crate::ast::{Attr, Kind, NodeId};
use crate::builtins::{self, OpIdx};
use crate::errors::{ErrorKind, LoadError};
use crate::heap::Heap;
use crate::odt::OdtRegistry;
use crate::parser::{node_from_lexeme, Parser};
use crate::strings::StrId;

type FxIndexSet<T> = IndexSet<T, BuildHasherDefault<FxHasher>>;

/// Construction options.
#[derive(Clone, Copy, Debug, Default)]
pub struct Options {
    /// Install the floating-point math family into the globals.
    pub math: bool,
}

pub struct Interp {
    pub heap: Heap,
    pub odt: OdtRegistry,
    /// The operator table the parser reads precedences from.
    pub operators: NodeId,
    /// User-facing top-level scope.
    pub globals: NodeId,
    /// Builtin functions and constants.
    pub system_env: NodeId,
    /// Interned source paths; the index is a sloc's source field.
    pub sources: NodeId,
    source_envs: Vec<NodeId>,
    /// Per-source persistent scope register, swapped across calls.
    pub statics: NodeId,
    /// Current call scope register; ZEN outside any call.
    pub locals: NodeId,
    /// Ordered unique directories consulted by import.
    pub search_paths: FxIndexSet<String>,
    pub opidx: OpIdx,
    /// Registered ids of the shipped opaque types.
    pub(crate) file_type: u32,
    pub(crate) fpos_type: u32,
    /// Pre-allocated OutOfMemory value, returned on budget exhaustion.
    oom: NodeId,
}

impl Interp {
    pub fn new(options: Options) -> Self {
        let mut heap = Heap::new();

        // Bootstrap nodes created here are permanent roots.
        let oom_kind = Kind::Error(ErrorKind::OutOfMemory);
        let oom = heap
            .try_new_node(Sloc::NONE, oom_kind)
            .expect("fresh heap cannot be over budget");

        let mut interp = Interp {
            heap,
            odt: OdtRegistry::new(),
            operators: NodeId::ZEN,
            globals: NodeId::ZEN,
            system_env: NodeId::ZEN,
            sources: NodeId::ZEN,
            source_envs: Vec::new(),
            statics: NodeId::ZEN,
            locals: NodeId::ZEN,
            search_paths: FxIndexSet::default(),
            opidx: OpIdx::default(),
            file_type: u32::MAX,
            fpos_type: u32::MAX,
            oom,
        };

        interp.operators = interp.new_env(Sloc::NONE, NodeId::ZEN);
        interp.system_env = interp.new_env(Sloc::NONE, NodeId::ZEN);
        interp.globals = interp.new_env(Sloc::NONE, interp.system_env);
        interp.sources = interp.new_env(Sloc::NONE, NodeId::ZEN);

        // The statics register starts as the interactive source's
        // static environment.
        interp.add_source("<>");
        interp.statics = interp.new_env(Sloc::NONE, interp.globals);
        let base = interp.source_env(0);
        interp.set_env_map(interp.statics, base);

        builtins::install(&mut interp, options);

        // Everything installed so far is reachable from the named
        // roots; drop the construction temporaries.
        interp.heap.gc_revert(0);
        interp
    }

    // ---- small accessors ------------------------------------------

    #[inline]
    pub fn kind(&self, id: NodeId) -> Kind {
        self.heap.kind(id)
    }

    #[inline]
    pub fn attr(&self, id: NodeId) -> Attr {
        self.heap.attr(id)
    }

    #[inline]
    pub fn sloc(&self, id: NodeId) -> Sloc {
        self.heap.sloc(id)
    }

    #[inline]
    pub fn str(&self, id: StrId) -> &str {
        self.heap.str(id)
    }

    #[inline]
    pub fn is_error(&self, id: NodeId) -> bool {
        matches!(self.kind(id), Kind::Error(_))
    }

    /// Allocate a node; on budget exhaustion yield the pre-allocated
    /// OutOfMemory value.
    pub fn new_node(&mut self, sloc: Sloc, kind: Kind) -> NodeId {
        match self.heap.try_new_node(sloc, kind) {
            Some(id) => id,
            None => self.oom,
        }
    }

    pub fn dup_node(&mut self, sloc: Sloc, id: NodeId) -> NodeId {
        match self.heap.try_dup_node(sloc, id) {
            Some(id) => id,
            None => self.oom,
        }
    }

    /// Duplicate a reference (sharing name and referent).
    pub fn dup_ref(&mut self, sloc: Sloc, id: NodeId) -> NodeId {
        self.dup_node(sloc, id)
    }

    pub fn error(&mut self, sloc: Sloc, kind: ErrorKind) -> NodeId {
        self.new_node(sloc, Kind::Error(kind))
    }

    pub fn new_string_node(&mut self, sloc: Sloc, s: &str) -> NodeId {
        let sid = self.heap.new_str(s);
        self.new_node(sloc, Kind::String(sid))
    }

    pub fn new_identifier(&mut self, sloc: Sloc, name: &str) -> NodeId {
        let hash = memhash(name.as_bytes(), 0);
        let sid = self.heap.new_str(name);
        self.new_node(sloc, Kind::Identifier { name: sid, hash })
    }

    // ---- environments ---------------------------------------------

    pub fn new_env(&mut self, sloc: Sloc, outer: NodeId) -> NodeId {
        let map = self.heap.new_map();
        self.new_node(sloc, Kind::Environment { map, outer })
    }

    /// A new environment node sharing `env`'s map under a different
    /// outer link.
    pub fn link_env(&mut self, sloc: Sloc, env: NodeId, outer: NodeId) -> NodeId {
        match self.kind(env) {
            Kind::Environment { map, .. } => {
                self.new_node(sloc, Kind::Environment { map, outer })
            }
            _ => env,
        }
    }

    fn set_env_map(&mut self, env: NodeId, from: NodeId) {
        if let (Kind::Environment { outer, .. }, Kind::Environment { map, .. }) =
            (self.kind(env), self.kind(from))
        {
            self.heap.node_mut(env).kind = Kind::Environment { map, outer };
        }
    }

    /// The statics register's current map (saved around calls).
    pub fn statics_map(&self) -> Option<crate::heap::EnvId> {
        match self.kind(self.statics) {
            Kind::Environment { map, .. } => Some(map),
            _ => None,
        }
    }

    /// Point the statics register at a callee's source environment.
    pub fn set_statics_map_from(&mut self, source_env: NodeId) {
        let statics = self.statics;
        self.set_env_map(statics, source_env);
    }

    pub fn restore_statics_map(&mut self, saved: Option<crate::heap::EnvId>) {
        if let (Some(map), Kind::Environment { outer, .. }) = (saved, self.kind(self.statics)) {
            let statics = self.statics;
            self.heap.node_mut(statics).kind = Kind::Environment { map, outer };
        }
    }

    // ---- operator table -------------------------------------------

    /// The operator at a table index, or ZEN.
    pub fn getopr(&self, index: u32) -> NodeId {
        match self.kind(self.operators) {
            Kind::Environment { map, .. } => self
                .heap
                .map(map)
                .at(index as usize)
                .unwrap_or(NodeId::ZEN),
            _ => NodeId::ZEN,
        }
    }

    /// The display name of the operator at a table index.
    pub fn getops(&self, index: u32) -> &str {
        let op = self.getopr(index);
        match self.kind(op).name() {
            Some(s) => self.str(s),
            None => "(+)",
        }
    }

    // ---- sources --------------------------------------------------

    /// Intern a source path, returning its 20-bit id.
    pub fn add_source(&mut self, path: &str) -> u32 {
        let hash = memhash(path.as_bytes(), 0);
        if let Some(index) = self.locate(self.sources, hash, path) {
            return index as u32;
        }
        let top = self.heap.stack_top();
        let node = self.new_string_node(Sloc::NONE, path);
        let index = self.define(self.sources, hash, node, Attr::NO_ASSIGN);
        self.heap.gc_revert(top);
        index.unwrap_or(0) as u32
    }

    pub fn source_name(&self, source: u32) -> &str {
        let node = match self.kind(self.sources) {
            Kind::Environment { map, .. } => {
                self.heap.map(map).at(source as usize).unwrap_or(NodeId::ZEN)
            }
            _ => NodeId::ZEN,
        };
        match self.kind(node) {
            Kind::String(s) => self.str(s),
            _ => "<>",
        }
    }

    /// The persistent static environment of a source, created on first
    /// use with the globals as its outer scope.
    pub fn source_env(&mut self, source: u32) -> NodeId {
        let index = source as usize;
        while self.source_envs.len() <= index {
            let env = self.new_env(Sloc::NONE, self.globals);
            self.source_envs.push(env);
        }
        self.source_envs[index]
    }

    // ---- collection -----------------------------------------------

    fn roots(&self) -> Vec<NodeId> {
        let mut roots = vec![
            self.operators,
            self.globals,
            self.system_env,
            self.sources,
            self.statics,
            self.locals,
            self.oom,
        ];
        roots.extend_from_slice(&self.source_envs);
        roots
    }

    /// Collect now, regardless of the threshold.
    pub fn run_gc(&mut self) {
        let roots = self.roots();
        self.heap.collect(&roots, &mut self.odt);
    }

    /// A safe point: collect if the heap has grown past its threshold.
    pub fn gc_safepoint(&mut self) {
        if self.heap.wants_collect() {
            self.run_gc();
        }
    }

    // ---- imports --------------------------------------------------

    /// Resolve and read a source file: the literal path first, then
    /// with the `.koan` extension, then each search path in order.
    /// Absolute and explicitly relative paths skip the search list.
    pub fn map_source_file(&self, path: &str) -> Result<String, LoadError> {
        let direct = std::path::Path::new(path).is_absolute()
            || path.starts_with("./")
            || path.starts_with("../");
        let has_ext = path.ends_with(".koan");

        let mut candidates = Vec::new();
        candidates.push(path.to_string());
        if !has_ext {
            candidates.push(format!("{}.koan", path));
        }
        if !direct {
            for dir in &self.search_paths {
                candidates.push(format!("{}/{}", dir.trim_end_matches('/'), path));
                if !has_ext {
                    candidates.push(format!("{}/{}.koan", dir.trim_end_matches('/'), path));
                }
            }
        }

        let mut last_io = None;
        for candidate in &candidates {
            match std::fs::read_to_string(candidate) {
                Ok(text) => return Ok(text),
                Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
                Err(e) => last_io = Some((candidate.clone(), e)),
            }
        }
        match last_io {
            Some((path, source)) => Err(LoadError::Map { path, source }),
            None => Err(LoadError::NotFound { path: path.to_string() }),
        }
    }

    /// Import a source file: resolve it, evaluate it statement by
    /// statement in the globals (with the statics register following
    /// the imported source), collecting between statements. Returns
    /// the last statement's value; an error value stops the walk.
    pub fn import_file(&mut self, path: &str) -> Result<NodeId, LoadError> {
        let text = self.map_source_file(path)?;
        let source = self.add_source(path);
        let source_statics = self.source_env(source);
        let saved = self.statics_map();
        self.set_statics_map_from(source_statics);

        let globals = self.globals;
        let ts = self.heap.stack_top();
        let mut line = 1u32;
        let mut at = 0usize;
        let mut result = NodeId::ZEN;

        while at < text.len() {
            let (ast, consumed, new_line) = self.parse_text(&text[at..], source, line, false);
            line = new_line;
            at += consumed;
            if consumed == 0 {
                break;
            }
            if !ast.is_zen() {
                result = self.eval(globals, ast);
            }
            self.heap.gc_return(ts, result);
            self.run_gc();
            if self.is_error(result) {
                break;
            }
        }

        self.restore_statics_map(saved);
        Ok(result)
    }

    pub fn add_search_path(&mut self, path: &str) {
        let normalised = if path.ends_with('/') {
            path.to_string()
        } else {
            format!("{}/", path)
        };
        self.search_paths.insert(normalised);
    }

    // ---- the driver loop ------------------------------------------

    /// Parse and evaluate `text` one top-level sequence at a time,
    /// reporting each result. Collection runs at the safe point after
    /// each expression. The line counter carries across calls so the
    /// REPL keeps honest line numbers.
    pub fn process<F>(&mut self, text: &str, source: u32, line: &mut u32, mut on_result: F)
    where
        F: FnMut(&mut Interp, NodeId),
    {
        let ts = self.heap.stack_top();
        let env = self.source_env(source);
        self.set_env_map(self.statics, env);

        let mut at = 0usize;
        while at < text.len() {
            let (ast, consumed) = {
                let mut parser = Parser::new(self, &text[at..], source, *line, node_from_lexeme);
                let ast = parser.parse_sequence_top();
                *line = parser.line();
                (ast, parser.position())
            };
            at += consumed;
            if consumed == 0 {
                break;
            }

            debug!(source, line = *line, "top-level expression");
            let result = self.refeval(env, ast);
            on_result(self, result);

            self.heap.gc_return(ts, result);
            self.run_gc();
        }

        self.heap.gc_revert(ts);
        self.run_gc();
    }

    /// Evaluate a whole script, returning the last result. The result
    /// stays rooted on the shadow stack.
    pub fn eval_source(&mut self, text: &str) -> NodeId {
        let ts = self.heap.stack_top();
        let env = self.source_env(0);
        self.set_env_map(self.statics, env);

        let mut line = 1u32;
        let mut at = 0usize;
        let mut last = NodeId::ZEN;
        while at < text.len() {
            let (ast, consumed) = {
                let mut parser = Parser::new(self, &text[at..], 0, line, node_from_lexeme);
                let ast = parser.parse_sequence_top();
                line = parser.line();
                (ast, parser.position())
            };
            at += consumed;
            if consumed == 0 {
                break;
            }

            let result = self.refeval(env, ast);
            last = self.heap.gc_return(ts, result);
            self.run_gc();
        }
        last
    }
}
