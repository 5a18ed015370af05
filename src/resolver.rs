// Copyright (c) 2024-2026 Nervosys LLC
// SPDX-License-Identifier: Apache-2.0
//! Conflict Resolution
//!
//! Pure dispatch from a detected conflict and a strategy to a resolved
//! record. The `ask_user` strategy is the one impure case: it awaits a
//! caller-supplied hook, bounded by a timeout, and falls back to server-wins
//! when no decision arrives.

use crate::models::{Conflict, ConflictStrategy};
use futures_util::future::BoxFuture;
use serde_json::Value;
use std::sync::Arc;
use std::time::Duration;

/// Caller-supplied decision hook for the `ask_user` strategy. Returning
/// `None` declines to decide and triggers the server-wins fallback.
pub type ResolutionHook = Arc<dyn Fn(Conflict) -> BoxFuture<'static, Option<Value>> + Send + Sync>;

/// Resolve a conflict with one of the synchronous strategies. `ask_user`
/// resolves to the server-wins fallback here; callers with a hook should use
/// [`resolve_with_hook`].
pub fn resolve(strategy: ConflictStrategy, conflict: &Conflict) -> Value {
    match strategy {
        ConflictStrategy::ServerWins | ConflictStrategy::AskUser => conflict.remote_data.clone(),
        ConflictStrategy::ClientWins => conflict.local_data.clone(),
        ConflictStrategy::Merge => shallow_merge(&conflict.remote_data, &conflict.local_data),
    }
}

/// Resolve, consulting the hook for `ask_user`. The hook gets `timeout` to
/// answer; on timeout, a declined decision, or no hook at all, the server
/// copy wins.
pub async fn resolve_with_hook(
    strategy: ConflictStrategy,
    conflict: &Conflict,
    hook: Option<&ResolutionHook>,
    timeout: Duration,
) -> Value {
    if strategy != ConflictStrategy::AskUser {
        return resolve(strategy, conflict);
    }
    let Some(hook) = hook else {
        log::warn!(
            "No resolution hook set for ask_user conflict on '{}', falling back to server_wins",
            conflict.entity_id
        );
        return conflict.remote_data.clone();
    };
    match tokio::time::timeout(timeout, hook(conflict.clone())).await {
        Ok(Some(resolved)) => resolved,
        Ok(None) => {
            log::info!(
                "Resolution hook declined conflict on '{}', falling back to server_wins",
                conflict.entity_id
            );
            conflict.remote_data.clone()
        }
        Err(_) => {
            log::warn!(
                "Resolution hook timed out after {:?} for '{}', falling back to server_wins",
                timeout,
                conflict.entity_id
            );
            conflict.remote_data.clone()
        }
    }
}

/// Shallow merge: `base` fields with `overlay` fields written over them.
/// Nested objects are replaced wholesale, not deep-merged. Non-object inputs
/// resolve to the overlay.
pub fn shallow_merge(base: &Value, overlay: &Value) -> Value {
    match (base.as_object(), overlay.as_object()) {
        (Some(base_obj), Some(overlay_obj)) => {
            let mut merged = base_obj.clone();
            for (key, value) in overlay_obj {
                merged.insert(key.clone(), value.clone());
            }
            Value::Object(merged)
        }
        _ => overlay.clone(),
    }
}
