//! The dispatcher's stack of open contexts.
//!
//! Every frame finalizes its context exactly once: when closed explicitly,
//! or when dropped.

use super::Context;
use std::sync::Arc;
use tracing::{debug, warn};

/// One open context.
pub struct Frame {
    context: Arc<dyn Context>,
    closed: bool,
}

impl Frame {
    pub fn open(context: Arc<dyn Context>) -> Self {
        debug!(context = context.name(), "Opened context");
        Self {
            context,
            closed: false,
        }
    }

    pub fn context(&self) -> &Arc<dyn Context> {
        &self.context
    }

    /// Finalizes the context, returning the finalizer's error.
    pub fn close(mut self) -> anyhow::Result<()> {
        self.closed = true;
        debug!(context = self.context.name(), "Closed context");
        self.context.finalize()
    }
}

impl Drop for Frame {
    fn drop(&mut self) {
        if self.closed {
            return;
        }
        self.closed = true;
        debug!(context = self.context.name(), "Closed context");
        if let Err(e) = self.context.finalize() {
            warn!(context = self.context.name(), error = %e, "Context finalizer failed");
        }
    }
}

impl std::fmt::Debug for Frame {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Frame")
            .field("context", &self.context.name())
            .field("closed", &self.closed)
            .finish()
    }
}

/// Stack of open contexts, root at the bottom.
///
/// An empty stack (`ContextStack::default()`) is used for contexts opened
/// while resolving a path, before they are committed to the shell.
#[derive(Debug, Default)]
pub struct ContextStack {
    frames: Vec<Frame>,
}

impl ContextStack {
    /// Creates a stack holding only the root context.
    pub fn new(root: Arc<dyn Context>) -> Self {
        Self {
            frames: vec![Frame::open(root)],
        }
    }

    pub fn push(&mut self, frame: Frame) {
        self.frames.push(frame);
    }

    /// Moves every frame out without finalizing, oldest first.
    pub fn into_frames(mut self) -> Vec<Frame> {
        std::mem::take(&mut self.frames)
    }

    /// Pops and finalizes the top context.
    ///
    /// Returns `None` on an empty stack, otherwise the finalizer's result.
    pub fn pop(&mut self) -> Option<anyhow::Result<()>> {
        self.frames.pop().map(Frame::close)
    }

    /// Pops down to `depth` frames, newest first. All frames are popped
    /// even if a finalizer fails; the first failure is returned.
    pub fn truncate(&mut self, depth: usize) -> anyhow::Result<()> {
        let mut first_error = None;
        while self.frames.len() > depth {
            if let Some(Err(e)) = self.pop() {
                warn!(error = %e, "Context finalizer failed");
                first_error.get_or_insert(e);
            }
        }
        first_error.map_or(Ok(()), Err)
    }

    /// Pops every frame, root included.
    pub fn clear(&mut self) -> anyhow::Result<()> {
        self.truncate(0)
    }

    pub fn top(&self) -> Option<&Arc<dyn Context>> {
        self.frames.last().map(Frame::context)
    }

    pub fn depth(&self) -> usize {
        self.frames.len()
    }

    pub fn is_empty(&self) -> bool {
        self.frames.is_empty()
    }

    /// Context names from the root to the top.
    pub fn names(&self) -> Vec<&str> {
        self.frames.iter().map(|f| f.context().name()).collect()
    }

    /// Dotted path from the root to the top, e.g. `root.kv`.
    pub fn path(&self) -> String {
        self.names().join(".")
    }
}

impl Drop for ContextStack {
    fn drop(&mut self) {
        // Newest first; Vec would drop oldest first.
        while let Some(frame) = self.frames.pop() {
            drop(frame);
        }
    }
}
