use std::collections::HashMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use super::id::SignalId;

/// The origin chain and tenancy carried alongside every signal payload.
///
/// Every signal except a root command has a non-empty `parent_signal_id`
/// (§3 invariant: "every signal has exactly one parent origin"). Storage and
/// transport calls take `tenant_id` explicitly from here rather than reading
/// it off thread-local state, per the REDESIGN FLAGS in §9.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Context {
    pub parent_signal_id: Option<SignalId>,
    pub actor_id: Option<String>,
    pub tenant_id: Option<String>,
    pub external: bool,
    pub timestamp: DateTime<Utc>,
    pub enrichments: HashMap<String, Value>,
}

impl Context {
    /// Build the context for a root command: no parent, not external.
    pub fn root(actor_id: impl Into<String>) -> Self {
        Self {
            parent_signal_id: None,
            actor_id: Some(actor_id.into()),
            tenant_id: None,
            external: false,
            timestamp: Utc::now(),
            enrichments: HashMap::new(),
        }
    }

    /// Build the context for a signal descending from `parent`.
    pub fn child_of(parent_signal_id: SignalId, parent: &Context) -> Self {
        Self {
            parent_signal_id: Some(parent_signal_id),
            actor_id: parent.actor_id.clone(),
            tenant_id: parent.tenant_id.clone(),
            external: parent.external,
            timestamp: Utc::now(),
            enrichments: HashMap::new(),
        }
    }

    pub fn with_tenant(mut self, tenant_id: impl Into<String>) -> Self {
        self.tenant_id = Some(tenant_id.into());
        self
    }

    pub fn with_enrichment(mut self, key: impl Into<String>, value: Value) -> Self {
        self.enrichments.insert(key.into(), value);
        self
    }

    /// `false` only for a root command; every other signal must carry a parent.
    pub fn has_origin(&self) -> bool {
        self.parent_signal_id.is_some()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn root_context_has_no_origin() {
        let ctx = Context::root("user-1");
        assert!(!ctx.has_origin());
    }

    #[test]
    fn child_context_inherits_tenant_and_actor() {
        let parent = Context::root("user-1").with_tenant("acme");
        let child = Context::child_of(SignalId::new(), &parent);
        assert!(child.has_origin());
        assert_eq!(child.tenant_id.as_deref(), Some("acme"));
        assert_eq!(child.actor_id.as_deref(), Some("user-1"));
    }
}
