//! Conversation registry.
//!
//! A [`ConversationSet`] owns every live conversation of one session, keyed
//! by conversation id. A registry-wide [`discard_all`](ConversationSet::discard_all)
//! poisons the set: the first reason sticks, every tracked conversation is
//! discarded, and any conversation created afterwards is discarded on the
//! spot without ever being registered. The poison/insert window is covered by
//! one mutex so the two can never interleave into a post-poison live
//! conversation.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use super::conversation::{Conversation, ConversationHandler, DiscardReason};
use super::generator::{ConversationId, IdGenerator};
use crate::error::Result;
use crate::service::Service;

struct SetInner {
    conversations: HashMap<ConversationId, Arc<Conversation>>,
    poison: Option<DiscardReason>,
}

/// Registry of the in-flight conversations of one session.
pub struct ConversationSet {
    set_id: u64,
    ids: IdGenerator,
    inner: Mutex<SetInner>,
}

impl ConversationSet {
    /// Create a set, drawing its identity from the shared allocator.
    ///
    /// Every set in the process takes its `set_id` from the same generator,
    /// injected here so no two sets ever share one.
    pub fn new(set_ids: &IdGenerator) -> Result<Self> {
        Ok(Self {
            set_id: set_ids.next_id()?,
            ids: IdGenerator::new(),
            inner: Mutex::new(SetInner {
                conversations: HashMap::new(),
                poison: None,
            }),
        })
    }

    /// This set's process-unique identity.
    pub fn set_id(&self) -> u64 {
        self.set_id
    }

    /// Create and register a conversation.
    ///
    /// On a poisoned set the conversation is created, immediately discarded
    /// with the stored reason and never inserted; the caller receives it in a
    /// terminal state.
    pub async fn new_conversation(
        &self,
        service: Arc<dyn Service>,
        handler: Box<dyn ConversationHandler>,
    ) -> Result<Arc<Conversation>> {
        let id = ConversationId::new(self.ids.next_id()?);
        let conversation = Arc::new(Conversation::new(id, service, handler));

        let poison = {
            let mut inner = self.inner.lock().unwrap();
            match &inner.poison {
                Some(reason) => Some(reason.clone()),
                None => {
                    inner.conversations.insert(id, conversation.clone());
                    None
                }
            }
        };

        if let Some(reason) = poison {
            tracing::debug!(
                "Set {} is discarded; conversation {} discarded on creation",
                self.set_id,
                id
            );
            conversation.discard(reason).await?;
        }
        Ok(conversation)
    }

    /// Look up a tracked conversation.
    pub fn get(&self, id: ConversationId) -> Option<Arc<Conversation>> {
        self.inner.lock().unwrap().conversations.get(&id).cloned()
    }

    /// Number of tracked conversations.
    pub fn len(&self) -> usize {
        self.inner.lock().unwrap().conversations.len()
    }

    /// Whether the set tracks no conversations.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Whether [`discard_all`](Self::discard_all) has poisoned this set.
    pub fn is_discarded(&self) -> bool {
        self.inner.lock().unwrap().poison.is_some()
    }

    /// Discard every tracked conversation and poison the set.
    ///
    /// Idempotent: the first caller's reason wins and is applied to every
    /// conversation created later; concurrent callers agree on that single
    /// reason. Individual discard failures are logged and do not stop the
    /// sweep.
    pub async fn discard_all(&self, reason: DiscardReason) {
        let (reason, drained) = {
            let mut inner = self.inner.lock().unwrap();
            if inner.poison.is_none() {
                inner.poison = Some(reason);
            }
            let reason = inner
                .poison
                .clone()
                .unwrap_or_else(|| DiscardReason::new("conversation set discarded"));
            let drained: Vec<Arc<Conversation>> =
                inner.conversations.drain().map(|(_, c)| c).collect();
            (reason, drained)
        };

        for conversation in drained {
            if let Err(err) = conversation.discard(reason.clone()).await {
                tracing::warn!(
                    "Set {}: discard of conversation {} failed: {}",
                    self.set_id,
                    conversation.id(),
                    err
                );
            }
        }
    }
}

impl std::fmt::Debug for ConversationSet {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ConversationSet")
            .field("set_id", &self.set_id)
            .field("len", &self.len())
            .field("discarded", &self.is_discarded())
            .finish()
    }
}
