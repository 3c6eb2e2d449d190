//! Hierarchical variable bindings.
//!
//! A [`RuntimeContext`] owns a mutable local map and a chain of immutable
//! parent frames. Creating a child freezes the current local bindings into a
//! shared [`ContextSnapshot`]; writes in the child never reach that frame, and
//! two children spawned from the same snapshot cannot see each other.
//!
//! Lookup order: local → parent frames → published symbols.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use tokio::time::Instant;

use crate::ast::{Expression, ObjectDescriptor};
use crate::eval::{self, EvalError};
use crate::events::Emission;
use crate::services::Services;
use crate::value::Value;

#[derive(Debug)]
struct Frame {
    name: String,
    bindings: HashMap<String, Value>,
    parent: Option<Arc<Frame>>,
}

/// A frozen scope that any number of children may be spawned from,
/// concurrently.
#[derive(Clone)]
pub struct ContextSnapshot {
    frame: Arc<Frame>,
    services: Arc<Services>,
}

impl ContextSnapshot {
    /// Create an independent child with a fresh outbox.
    pub fn spawn(&self, name: impl Into<String>) -> RuntimeContext {
        RuntimeContext {
            name: name.into(),
            local: HashMap::new(),
            parent: Some(self.frame.clone()),
            frozen: None,
            services: self.services.clone(),
            outbox: Outbox::default(),
            deadline: None,
        }
    }

    pub fn name(&self) -> &str {
        &self.frame.name
    }
}

/// Emissions collected during one invocation. Shared by every context
/// derived from the invocation's root.
#[derive(Clone, Default)]
pub struct Outbox(Arc<Mutex<Vec<Emission>>>);

impl Outbox {
    pub fn push(&self, emission: Emission) {
        self.0.lock().unwrap_or_else(|e| e.into_inner()).push(emission);
    }

    pub fn drain(&self) -> Vec<Emission> {
        std::mem::take(&mut *self.0.lock().unwrap_or_else(|e| e.into_inner()))
    }

    pub fn len(&self) -> usize {
        self.0.lock().unwrap_or_else(|e| e.into_inner()).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[derive(Debug, thiserror::Error)]
#[error("deadline exceeded in '{context}'")]
pub struct DeadlineExceeded {
    pub context: String,
}

pub struct RuntimeContext {
    name: String,
    local: HashMap<String, Value>,
    parent: Option<Arc<Frame>>,
    /// Cached snapshot of `local`; cleared on every write.
    frozen: Option<Arc<Frame>>,
    services: Arc<Services>,
    outbox: Outbox,
    deadline: Option<Instant>,
}

impl RuntimeContext {
    /// A root context with no parent.
    pub fn new(name: impl Into<String>, services: Arc<Services>) -> Self {
        Self {
            name: name.into(),
            local: HashMap::new(),
            parent: None,
            frozen: None,
            services,
            outbox: Outbox::default(),
            deadline: None,
        }
    }

    pub fn with_deadline(mut self, deadline: Option<Instant>) -> Self {
        self.deadline = deadline;
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn services(&self) -> &Arc<Services> {
        &self.services
    }

    pub fn outbox(&self) -> &Outbox {
        &self.outbox
    }

    pub fn deadline(&self) -> Option<Instant> {
        self.deadline
    }

    /// Write to the local scope. Rebinding overwrites.
    pub fn bind(&mut self, name: impl Into<String>, value: Value) {
        self.frozen = None;
        self.local.insert(name.into(), value);
    }

    /// Walk local → parents → published symbols. `None` when missing.
    pub fn resolve(&self, name: &str) -> Option<Value> {
        if let Some(v) = self.local.get(name) {
            return Some(v.clone());
        }
        let mut frame = self.parent.as_deref();
        while let Some(f) = frame {
            if let Some(v) = f.bindings.get(name) {
                return Some(v.clone());
            }
            frame = f.parent.as_deref();
        }
        self.services.symbols.get(name)
    }

    pub fn is_bound_locally(&self, name: &str) -> bool {
        self.local.contains_key(name)
    }

    /// Freeze the current bindings so children can be spawned from them.
    pub fn snapshot(&mut self) -> ContextSnapshot {
        let frame = match &self.frozen {
            Some(frame) => frame.clone(),
            None => {
                let frame = Arc::new(Frame {
                    name: self.name.clone(),
                    bindings: self.local.clone(),
                    parent: self.parent.clone(),
                });
                self.frozen = Some(frame.clone());
                frame
            }
        };
        ContextSnapshot {
            frame,
            services: self.services.clone(),
        }
    }

    /// A nested scope for a loop iteration or match arm. Shares this
    /// context's outbox and deadline.
    pub fn child(&mut self, name: impl Into<String>) -> RuntimeContext {
        let snapshot = self.snapshot();
        let mut child = snapshot.spawn(name);
        child.outbox = self.outbox.clone();
        child.deadline = self.deadline;
        child
    }

    /// Copy a value into the process-wide symbol table.
    pub fn publish(&self, name: impl Into<String>, value: Value) {
        self.services.symbols.publish(name, value);
    }

    pub fn emit(&self, emission: Emission) {
        self.outbox.push(emission);
    }

    pub fn check_deadline(&self) -> Result<(), DeadlineExceeded> {
        match self.deadline {
            Some(deadline) if Instant::now() >= deadline => Err(DeadlineExceeded {
                context: self.name.clone(),
            }),
            _ => Ok(()),
        }
    }

    pub fn evaluate(&self, expr: &Expression) -> Result<Value, EvalError> {
        eval::evaluate(expr, self)
    }

    pub fn resolve_object(&self, object: &ObjectDescriptor) -> Result<Value, EvalError> {
        self.evaluate(&object.source)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn root() -> RuntimeContext {
        RuntimeContext::new("app", Arc::new(Services::default()))
    }

    #[test]
    fn resolve_walks_up_the_parent_chain() {
        let mut parent = root();
        parent.bind("user", Value::from("ada"));
        let mut child = parent.child("handler");
        let grandchild = child.child("iteration");
        assert_eq!(grandchild.resolve("user"), Some(Value::from("ada")));
        assert_eq!(grandchild.resolve("missing"), None);
    }

    #[test]
    fn child_writes_stay_local() {
        let mut parent = root();
        parent.bind("x", Value::Int(1));
        let mut child = parent.child("c");
        child.bind("x", Value::Int(2));
        child.bind("y", Value::Int(3));
        assert_eq!(child.resolve("x"), Some(Value::Int(2)));
        assert_eq!(parent.resolve("x"), Some(Value::Int(1)));
        assert_eq!(parent.resolve("y"), None);
    }

    #[test]
    fn siblings_do_not_observe_each_other() {
        let mut parent = root();
        parent.bind("shared", Value::Bool(true));
        let snapshot = parent.snapshot();
        let mut a = snapshot.spawn("a");
        let mut b = snapshot.spawn("b");
        a.bind("mine", Value::from("a"));
        b.bind("mine", Value::from("b"));
        assert_eq!(a.resolve("mine"), Some(Value::from("a")));
        assert_eq!(b.resolve("mine"), Some(Value::from("b")));
        assert_eq!(a.resolve("shared"), Some(Value::Bool(true)));
    }

    #[test]
    fn parent_writes_after_snapshot_are_invisible_to_existing_children() {
        let mut parent = root();
        parent.bind("v", Value::Int(1));
        let child = parent.child("c");
        parent.bind("v", Value::Int(2));
        assert_eq!(child.resolve("v"), Some(Value::Int(1)));
        assert_eq!(parent.child("c2").resolve("v"), Some(Value::Int(2)));
    }

    #[test]
    fn rebinding_overwrites() {
        let mut ctx = root();
        ctx.bind("v", Value::Int(1));
        ctx.bind("v", Value::Int(2));
        assert_eq!(ctx.resolve("v"), Some(Value::Int(2)));
    }

    #[test]
    fn published_symbols_are_the_last_resort() {
        let mut ctx = root();
        ctx.publish("config", Value::from("global"));
        let child = ctx.child("c");
        assert_eq!(child.resolve("config"), Some(Value::from("global")));
    }

    #[test]
    fn children_share_the_outbox() {
        let mut ctx = root();
        let child = ctx.child("c");
        child.emit(Emission::Event(crate::events::Event::new("E", Value::Null)));
        assert_eq!(ctx.outbox().len(), 1);
    }

    #[tokio::test]
    async fn elapsed_deadline_is_reported() {
        let ctx = root().with_deadline(Some(Instant::now()));
        assert!(ctx.check_deadline().is_err());
        assert!(root().check_deadline().is_ok());
    }
}
