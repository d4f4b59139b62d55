use crate::{Error, NativeTransaction, Result};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum IsolationLevel {
    ReadUncommitted,
    #[default]
    ReadCommitted,
    RepeatableRead,
    Serializable,
}

/// Handle to one open nested transaction, returned by
/// [`TransactionStack::open`] and required to complete it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TransactionToken {
    id: u64,
}

struct TransactionNode {
    id: u64,
    native: Box<dyn NativeTransaction>,
}

/// Nested-transaction stack for one logical call chain. Nested data-access
/// calls join the innermost open node without explicit handle-passing;
/// completion is strictly LIFO.
#[derive(Default)]
pub struct TransactionStack {
    nodes: Vec<TransactionNode>,
    next_id: u64,
}

impl TransactionStack {
    pub fn new() -> Self {
        Self::default()
    }

    /// Push a freshly begun native transaction; it becomes the current
    /// innermost node.
    pub fn open(&mut self, native: Box<dyn NativeTransaction>) -> TransactionToken {
        let id = self.next_id;
        self.next_id += 1;
        self.nodes.push(TransactionNode { id, native });
        TransactionToken { id }
    }

    /// Commit or roll back the node behind `token`. Only the innermost node
    /// may complete; completing an inner-still-open outer node is a usage
    /// error. Completing an already-closed node is a no-op.
    pub fn complete(&mut self, token: TransactionToken, commit: bool) -> Result<()> {
        let Some(position) = self.nodes.iter().position(|n| n.id == token.id) else {
            return Ok(());
        };
        if position != self.nodes.len() - 1 {
            return Err(Error::msg(
                "Cannot complete a transaction while a nested transaction is still open",
            ));
        }
        let mut node = self.nodes.pop().expect("position was just found");
        if commit {
            node.native.commit()
        } else {
            node.native.rollback()
        }
    }

    /// The innermost open native transaction, if any.
    pub fn current_mut(&mut self) -> Option<&mut (dyn NativeTransaction + 'static)> {
        self.nodes.last_mut().map(|n| n.native.as_mut())
    }

    pub fn depth(&self) -> usize {
        self.nodes.len()
    }

    /// True when `token` refers to the current innermost node.
    pub fn is_current(&self, token: TransactionToken) -> bool {
        self.nodes.last().is_some_and(|n| n.id == token.id)
    }
}
