use crate::error::{VaultError, VaultResult};
use indexmap::IndexMap;
use vault_val::{FrameId, Value, VaultStr};

/// State of a local name
#[derive(Debug, PartialEq)]
pub enum Binding {
    Live(Value),
    /// The value was moved out; reading the name is a use after move
    Moved,
}

/// Local bindings of one call frame
#[derive(Debug)]
pub struct Frame {
    pub id: FrameId,
    pub locals: IndexMap<VaultStr, Binding>,
}

impl Frame {
    fn new(id: FrameId) -> Self {
        Self {
            id,
            locals: IndexMap::new(),
        }
    }

    pub fn get(&self, name: &str) -> VaultResult<&Value> {
        match self.locals.get(name) {
            Some(Binding::Live(value)) => Ok(value),
            Some(Binding::Moved) => Err(VaultError::UseAfterMove { name: name.into() }),
            None => Err(VaultError::UnknownBinding { name: name.into() }),
        }
    }

    pub fn get_mut(&mut self, name: &str) -> VaultResult<&mut Value> {
        match self.locals.get_mut(name) {
            Some(Binding::Live(value)) => Ok(value),
            Some(Binding::Moved) => Err(VaultError::UseAfterMove { name: name.into() }),
            None => Err(VaultError::UnknownBinding { name: name.into() }),
        }
    }
}

/// Call stack of the running transaction.
///
/// Frame ids keep growing for the lifetime of the stack, so an id is never
/// handed out twice and a reference tagged with a dead frame stays dead.
#[derive(Debug)]
pub struct FrameStack {
    frames: Vec<Frame>,
    next: u32,
}

impl Default for FrameStack {
    fn default() -> Self {
        Self::new()
    }
}

impl FrameStack {
    pub fn new() -> Self {
        Self {
            frames: Vec::new(),
            next: 1,
        }
    }

    pub fn push(&mut self, limit: usize) -> VaultResult<FrameId> {
        if self.frames.len() >= limit {
            return Err(VaultError::FrameDepthExceeded { limit });
        }
        let id = FrameId(self.next);
        self.next += 1;
        self.frames.push(Frame::new(id));
        Ok(id)
    }

    /// Pop `id`, which must be the innermost frame
    pub fn pop(&mut self, id: FrameId) -> VaultResult<Frame> {
        let mismatch = |found: Option<FrameId>| VaultError::FrameMismatch {
            expected: id.to_string(),
            found: found.map_or_else(|| "no frame".to_string(), |f| f.to_string()),
        };
        let top = self.current();
        if top != Some(id) {
            return Err(mismatch(top));
        }
        self.frames.pop().ok_or_else(|| mismatch(None))
    }

    pub fn current(&self) -> Option<FrameId> {
        self.frames.last().map(|f| f.id)
    }

    pub fn outermost(&self) -> Option<FrameId> {
        self.frames.first().map(|f| f.id)
    }

    pub fn contains(&self, id: FrameId) -> bool {
        self.frames.iter().any(|f| f.id == id)
    }

    pub fn get(&self, id: FrameId) -> VaultResult<&Frame> {
        self.frames
            .iter()
            .rev()
            .find(|f| f.id == id)
            .ok_or_else(|| VaultError::FrameMismatch {
                expected: id.to_string(),
                found: "no such frame".into(),
            })
    }

    pub fn get_mut(&mut self, id: FrameId) -> VaultResult<&mut Frame> {
        self.frames
            .iter_mut()
            .rev()
            .find(|f| f.id == id)
            .ok_or_else(|| VaultError::FrameMismatch {
                expected: id.to_string(),
                found: "no such frame".into(),
            })
    }

    pub fn depth(&self) -> usize {
        self.frames.len()
    }

    pub fn clear(&mut self) {
        self.frames.clear();
    }
}
