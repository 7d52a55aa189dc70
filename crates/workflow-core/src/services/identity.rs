//! Static identity provider backed by the configured actor list

use crate::config::WorkflowConfig;
use crate::error::Result;
use crate::workflow::traits::IdentityProvider;
use async_trait::async_trait;
use std::collections::{BTreeMap, BTreeSet};
use workflow_types::{ActorId, Role};

/// Resolves actors from a fixed table. Unknown actors hold no roles.
#[derive(Debug, Clone, Default)]
pub struct StaticIdentityProvider {
    actors: BTreeMap<ActorId, BTreeSet<Role>>,
}

impl StaticIdentityProvider {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_config(config: &WorkflowConfig) -> Self {
        let actors = config
            .identities
            .iter()
            .map(|(actor, roles)| (ActorId::from(actor.as_str()), roles.clone()))
            .collect();
        Self { actors }
    }

    pub fn with_actor(
        mut self,
        actor: impl Into<ActorId>,
        roles: impl IntoIterator<Item = Role>,
    ) -> Self {
        self.actors
            .entry(actor.into())
            .or_default()
            .extend(roles);
        self
    }

    pub fn len(&self) -> usize {
        self.actors.len()
    }

    pub fn is_empty(&self) -> bool {
        self.actors.is_empty()
    }
}

#[async_trait]
impl IdentityProvider for StaticIdentityProvider {
    async fn resolve_actor_roles(&self, actor: &ActorId) -> Result<BTreeSet<Role>> {
        match self.actors.get(actor) {
            Some(roles) => Ok(roles.clone()),
            None => {
                log::debug!("Actor {} is not configured, resolving to no roles", actor);
                Ok(BTreeSet::new())
            }
        }
    }
}
