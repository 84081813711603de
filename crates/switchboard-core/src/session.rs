//! Session registry: one conversation id per variant, reset when the variant or actor changes.
//!
//! States are `NoSession` and `ActiveSession(id, variant)`. Only a confirmed turn writes an
//! id; [`SessionRegistry::resolve`] proposes one without persisting it, so a failed turn
//! leaves the registry exactly as it was. Every reset (variant change, end, logout, actor
//! change) bumps a generation; a ticket from an older generation can no longer be confirmed.

use crate::error::StoreError;
use crate::shared::{now_ms, BackendVariant};
use crate::store::KvPort;
use serde::{Deserialize, Serialize};
use std::sync::{Arc, Mutex, MutexGuard};
use uuid::Uuid;

const SESSION_PREFIX: &str = "session/";
const KEY_ACTIVE_VARIANT: &str = "session/active_variant";
const KEY_ACTOR: &str = "session/actor";

fn session_key(variant: BackendVariant) -> String {
    format!("{}{}", SESSION_PREFIX, variant.wire_name())
}

/// A live conversation under one variant.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConversationSession {
    pub id: String,
    pub variant: BackendVariant,
    pub created_at_ms: i64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub actor: Option<String>,
}

/// Session id proposed for the next turn.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionTicket {
    pub id: String,
    pub variant: BackendVariant,
    /// True when no session existed and `id` was just generated.
    pub fresh: bool,
    generation: u64,
}

/// Conversation ids behind a [`KvPort`]. Compound updates are serialized by an internal lock,
/// which also guards the reset generation.
pub struct SessionRegistry {
    port: Arc<dyn KvPort>,
    generation: Mutex<u64>,
}

impl SessionRegistry {
    /// Registry over `port` without restart handling.
    pub fn new(port: Arc<dyn KvPort>) -> Self {
        Self {
            port,
            generation: Mutex::new(0),
        }
    }

    /// Registry over previously persisted state. Sessions of variants that do not survive a
    /// restart are dropped, and so is every session when the stored actor differs from `actor`.
    pub fn open(port: Arc<dyn KvPort>, actor: Option<&str>) -> Result<Self, StoreError> {
        let registry = Self::new(port);
        for variant in BackendVariant::ALL {
            let Some(session) = registry.load(variant)? else {
                continue;
            };
            if !variant.persists_session() {
                registry.port.clear(&session_key(variant))?;
            } else if session.actor.as_deref() != actor {
                tracing::info!(target: "switchboard::session", variant = %variant, "actor changed; dropping persisted session");
                registry.port.clear(&session_key(variant))?;
            } else {
                tracing::debug!(target: "switchboard::session", variant = %variant, session_id = %session.id, "resuming persisted session");
            }
        }
        match actor {
            Some(a) => registry.port.set(KEY_ACTOR, a)?,
            None => registry.port.clear(KEY_ACTOR)?,
        }
        Ok(registry)
    }

    /// Registry over persisted state for the actor recorded by the previous run.
    pub fn restore(port: Arc<dyn KvPort>) -> Result<Self, StoreError> {
        let actor = port.get(KEY_ACTOR)?;
        Self::open(port, actor.as_deref())
    }

    fn guard(&self) -> MutexGuard<'_, u64> {
        self.generation.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn load(&self, variant: BackendVariant) -> Result<Option<ConversationSession>, StoreError> {
        let key = session_key(variant);
        let Some(raw) = self.port.get(&key)? else {
            return Ok(None);
        };
        let session: ConversationSession = serde_json::from_str(&raw).map_err(|e| StoreError::Corrupt {
            key: key.clone(),
            message: e.to_string(),
        })?;
        // A record filed under the wrong key is never handed to another variant.
        if session.variant != variant {
            self.port.clear(&key)?;
            return Ok(None);
        }
        Ok(Some(session))
    }

    fn store(&self, session: &ConversationSession) -> Result<(), StoreError> {
        let raw = serde_json::to_string(session).map_err(|e| StoreError::Corrupt {
            key: session_key(session.variant),
            message: e.to_string(),
        })?;
        self.port.set(&session_key(session.variant), &raw)
    }

    /// Authenticated actor the sessions belong to.
    pub fn actor(&self) -> Result<Option<String>, StoreError> {
        self.port.get(KEY_ACTOR)
    }

    fn clear_sessions(&self) -> Result<(), StoreError> {
        for variant in BackendVariant::ALL {
            self.port.clear(&session_key(variant))?;
        }
        Ok(())
    }

    /// Variant the UI currently targets; Direct until told otherwise.
    pub fn active_variant(&self) -> Result<BackendVariant, StoreError> {
        match self.port.get(KEY_ACTIVE_VARIANT)? {
            None => Ok(BackendVariant::Direct),
            Some(raw) => raw.parse().map_err(|e: crate::error::DispatchError| StoreError::Corrupt {
                key: KEY_ACTIVE_VARIANT.to_string(),
                message: e.to_string(),
            }),
        }
    }

    /// Live session of the active variant, if any.
    pub fn active(&self) -> Result<Option<ConversationSession>, StoreError> {
        let _g = self.guard();
        self.load(self.active_variant()?)
    }

    pub fn get(&self, variant: BackendVariant) -> Result<Option<ConversationSession>, StoreError> {
        let _g = self.guard();
        self.load(variant)
    }

    /// Makes `variant` active. On change every session is discarded so no id crosses over.
    /// Returns whether the variant changed.
    pub fn switch_variant(&self, variant: BackendVariant) -> Result<bool, StoreError> {
        let mut generation = self.guard();
        self.switch_locked(&mut generation, variant)
    }

    fn switch_locked(&self, generation: &mut u64, variant: BackendVariant) -> Result<bool, StoreError> {
        let previous = self.active_variant()?;
        let stored = self.port.get(KEY_ACTIVE_VARIANT)?.is_some();
        if previous == variant && stored {
            return Ok(false);
        }
        self.clear_sessions()?;
        *generation += 1;
        self.port.set(KEY_ACTIVE_VARIANT, variant.wire_name())?;
        if previous != variant {
            tracing::info!(target: "switchboard::session", from = %previous, to = %variant, "variant changed; session reset");
        }
        Ok(previous != variant)
    }

    /// Id for the next turn under `variant`, without persisting anything.
    /// Switches variant first when it differs from the active one.
    pub fn resolve(&self, variant: BackendVariant) -> Result<SessionTicket, StoreError> {
        let mut generation = self.guard();
        self.switch_locked(&mut generation, variant)?;
        let (id, fresh) = match self.load(variant)? {
            Some(session) => (session.id, false),
            None => (Uuid::new_v4().to_string(), true),
        };
        Ok(SessionTicket {
            id,
            variant,
            fresh,
            generation: *generation,
        })
    }

    /// Existing session under `variant`, or a new persisted one.
    pub fn get_or_create(&self, variant: BackendVariant) -> Result<ConversationSession, StoreError> {
        let mut generation = self.guard();
        self.switch_locked(&mut generation, variant)?;
        if let Some(session) = self.load(variant)? {
            return Ok(session);
        }
        let session = ConversationSession {
            id: Uuid::new_v4().to_string(),
            variant,
            created_at_ms: now_ms(),
            actor: self.actor()?,
        };
        self.store(&session)?;
        tracing::debug!(target: "switchboard::session", variant = %variant, session_id = %session.id, "session created");
        Ok(session)
    }

    /// Records `id` as the live session after the successful turn `ticket` was issued for.
    /// A different id than the stored one (downstream rotation, or the first turn) replaces it.
    /// Ignored when the registry was reset since the ticket was issued, so a late reply cannot
    /// revive an ended or stale id.
    pub fn confirm(&self, ticket: &SessionTicket, id: &str) -> Result<Option<ConversationSession>, StoreError> {
        let generation = self.guard();
        let variant = ticket.variant;
        if *generation != ticket.generation {
            tracing::debug!(target: "switchboard::session", variant = %variant, "session reset during turn; reply not recorded");
            return Ok(None);
        }
        if self.active_variant()? != variant || id.trim().is_empty() {
            return Ok(None);
        }
        if let Some(existing) = self.load(variant)? {
            if existing.id == id {
                return Ok(Some(existing));
            }
            tracing::info!(target: "switchboard::session", variant = %variant, "downstream rotated session id");
        }
        let session = ConversationSession {
            id: id.to_string(),
            variant,
            created_at_ms: now_ms(),
            actor: self.actor()?,
        };
        self.store(&session)?;
        Ok(Some(session))
    }

    /// Explicit "end session": the next multi-turn call starts a fresh id.
    pub fn end_session(&self) -> Result<(), StoreError> {
        let mut generation = self.guard();
        let variant = self.active_variant()?;
        self.port.clear(&session_key(variant))?;
        *generation += 1;
        tracing::info!(target: "switchboard::session", variant = %variant, "session ended");
        Ok(())
    }

    /// Records the authenticated actor; a different actor invalidates every session.
    pub fn set_actor(&self, actor: Option<&str>) -> Result<(), StoreError> {
        let mut generation = self.guard();
        if self.actor()?.as_deref() == actor {
            return Ok(());
        }
        self.clear_sessions()?;
        *generation += 1;
        match actor {
            Some(a) => self.port.set(KEY_ACTOR, a),
            None => self.port.clear(KEY_ACTOR),
        }
    }

    /// Logout: every session and the actor marker are removed.
    pub fn clear(&self) -> Result<(), StoreError> {
        let mut generation = self.guard();
        self.clear_sessions()?;
        *generation += 1;
        self.port.clear(KEY_ACTOR)?;
        tracing::info!(target: "switchboard::session", "sessions cleared");
        Ok(())
    }
}
