use serde::{Deserialize, Serialize};
use std::collections::HashSet;

use crate::domain::CommitmentToken;

/// Write-once set of consumed commitment tokens
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CommitmentRegistry {
    used: HashSet<CommitmentToken>,
}

impl CommitmentRegistry {
    pub fn is_used(&self, token: &CommitmentToken) -> bool {
        self.used.contains(token)
    }

    /// Mark `token` consumed. Returns false if it already was.
    pub fn consume(&mut self, token: CommitmentToken) -> bool {
        self.used.insert(token)
    }

    /// Only used to unwind a consumption inside an uncommitted transaction
    pub(crate) fn release(&mut self, token: &CommitmentToken) {
        self.used.remove(token);
    }

    pub fn len(&self) -> usize {
        self.used.len()
    }

    pub fn is_empty(&self) -> bool {
        self.used.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_token_consumed_once() {
        let mut registry = CommitmentRegistry::default();
        let token = CommitmentToken::new("abc");

        assert!(!registry.is_used(&token));
        assert!(registry.consume(token.clone()));
        assert!(registry.is_used(&token));
        assert!(!registry.consume(token));
        assert_eq!(registry.len(), 1);
    }
}
