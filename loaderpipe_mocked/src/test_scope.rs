//! Stand-in lifecycle owners for tests

use std::any::Any;
use std::sync::Arc;

use loaderpipe::{Scope, ScopeKind};

#[derive(Debug)]
pub struct TestScope {
    kind: ScopeKind,
    label: String,
}

impl TestScope {
    #[must_use]
    pub fn new(kind: ScopeKind, label: impl Into<String>) -> Self {
        Self {
            kind,
            label: label.into(),
        }
    }

    #[must_use]
    pub fn activity(label: impl Into<String>) -> Arc<Self> {
        Arc::new(Self::new(ScopeKind::Activity, label))
    }

    #[must_use]
    pub fn fragment(label: impl Into<String>) -> Arc<Self> {
        Arc::new(Self::new(ScopeKind::Fragment, label))
    }

    #[must_use]
    pub fn label(&self) -> &str {
        &self.label
    }
}

impl Scope for TestScope {
    fn kind(&self) -> ScopeKind {
        self.kind
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}
