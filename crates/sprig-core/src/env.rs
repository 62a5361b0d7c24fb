use std::cell::RefCell;
use std::rc::Rc;

use hashbrown::HashMap as SpurMap;
use lasso::Spur;

use crate::value::{intern, resolve, Value};

/// Which frame a binding form writes to, or a variable opcode reads from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Target {
    Local,
    Global,
    Closure,
}

impl Target {
    /// The keyword that introduces a binding form for this target.
    pub fn keyword(self) -> &'static str {
        match self {
            Target::Local => "set",
            Target::Global => "setg",
            Target::Closure => "setc",
        }
    }

    pub fn from_keyword(word: &str) -> Option<Target> {
        match word {
            "set" => Some(Target::Local),
            "setg" => Some(Target::Global),
            "setc" => Some(Target::Closure),
            _ => None,
        }
    }
}

/// One name → value mapping. Frames are shared: a closure and the call that
/// created it hold the same frame, so writes through either are visible to both.
#[derive(Debug, Clone, Default)]
pub struct Frame(Rc<RefCell<SpurMap<Spur, Value>>>);

impl Frame {
    pub fn new() -> Self {
        Frame::default()
    }

    pub fn get(&self, name: Spur) -> Option<Value> {
        self.0.borrow().get(&name).cloned()
    }

    pub fn set(&self, name: Spur, val: Value) {
        self.0.borrow_mut().insert(name, val);
    }

    pub fn contains(&self, name: Spur) -> bool {
        self.0.borrow().contains_key(&name)
    }

    pub fn len(&self) -> usize {
        self.0.borrow().len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.borrow().is_empty()
    }

    /// Snapshot of the frame's bindings with names resolved.
    pub fn bindings(&self) -> Vec<(String, Value)> {
        self.0
            .borrow()
            .iter()
            .map(|(name, val)| (resolve(*name), val.clone()))
            .collect()
    }

    pub fn ptr_eq(&self, other: &Frame) -> bool {
        Rc::ptr_eq(&self.0, &other.0)
    }
}

/// An ordered chain of frames, innermost first. The last frame is always the
/// global frame; at top level it is also the only frame.
#[derive(Debug, Clone)]
pub struct Env {
    frames: Vec<Frame>,
}

impl Env {
    /// A fresh top-level environment holding only an empty global frame.
    pub fn new() -> Self {
        Env {
            frames: vec![Frame::new()],
        }
    }

    /// Build a chain from explicit frames. An empty list gets a fresh global frame.
    pub fn from_frames(frames: Vec<Frame>) -> Self {
        if frames.is_empty() {
            return Env::new();
        }
        Env { frames }
    }

    pub fn frames(&self) -> &[Frame] {
        &self.frames
    }

    pub fn depth(&self) -> usize {
        self.frames.len()
    }

    pub fn local(&self) -> &Frame {
        &self.frames[0]
    }

    pub fn global(&self) -> &Frame {
        &self.frames[self.frames.len() - 1]
    }

    /// The frame directly enclosing the local one; the only frame at top level.
    pub fn closure(&self) -> &Frame {
        self.frames.get(1).unwrap_or(&self.frames[0])
    }

    /// Every frame except the global one, as captured by a lambda.
    pub fn captured(&self) -> Vec<Frame> {
        self.frames[..self.frames.len() - 1].to_vec()
    }

    pub fn frame(&self, target: Target) -> &Frame {
        match target {
            Target::Local => self.local(),
            Target::Global => self.global(),
            Target::Closure => self.closure(),
        }
    }

    /// Look a name up through the whole chain, innermost first.
    pub fn get(&self, name: Spur) -> Option<Value> {
        self.frames.iter().find_map(|frame| frame.get(name))
    }

    pub fn get_str(&self, name: &str) -> Option<Value> {
        self.get(intern(name))
    }

    /// Write to exactly one frame.
    pub fn assign(&self, target: Target, name: Spur, val: Value) {
        self.frame(target).set(name, val);
    }

    /// Read for a variable opcode: `Local` searches the whole chain, the
    /// others read their single frame.
    pub fn read(&self, target: Target, name: Spur) -> Option<Value> {
        match target {
            Target::Local => self.get(name),
            other => self.frame(other).get(name),
        }
    }

    pub fn set_str(&self, name: &str, val: Value) {
        self.local().set(intern(name), val);
    }
}

impl Default for Env {
    fn default() -> Self {
        Self::new()
    }
}
