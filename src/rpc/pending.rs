//! Pending-call table: outbound calls waiting for the peer's response.

use crate::rpc::call::RpcCall;
use serde_json::Value;
use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard};

/// Table key for a request id.
///
/// Every id is keyed by its serialized JSON form. Strings keep their quotes,
/// so `"1"` and `1` stay distinct.
pub fn pending_key(id: &Value) -> String {
    id.to_string()
}

/// In-flight outbound calls keyed by request id.
///
/// Every operation takes the lock for the single read-modify-write it
/// performs; the lock is never held while a call is completed.
#[derive(Default)]
pub struct PendingCalls {
    calls: Mutex<HashMap<String, RpcCall>>,
}

impl PendingCalls {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, HashMap<String, RpcCall>> {
        self.calls
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Track `call` under `id`. Returns the call previously stored under the
    /// same id, if any.
    pub fn insert(&self, id: &Value, call: RpcCall) -> Option<RpcCall> {
        self.lock().insert(pending_key(id), call)
    }

    /// Remove and return the call stored under `id`.
    pub fn remove(&self, id: &Value) -> Option<RpcCall> {
        self.lock().remove(&pending_key(id))
    }

    /// Remove the entry under `id` only if it still holds `call`.
    pub fn remove_call(&self, id: &Value, call: &RpcCall) -> bool {
        let mut calls = self.lock();
        let key = pending_key(id);
        match calls.get(&key) {
            Some(stored) if stored.same_as(call) => {
                calls.remove(&key);
                true
            }
            _ => false,
        }
    }

    pub fn contains(&self, id: &Value) -> bool {
        self.lock().contains_key(&pending_key(id))
    }

    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }

    /// Empty the table, returning every call that was waiting.
    pub fn drain(&self) -> Vec<RpcCall> {
        self.lock().drain().map(|(_, call)| call).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::Identity;
    use serde_json::json;

    const PING: Identity = Identity::new("Ping");

    fn call(id: Value) -> RpcCall {
        RpcCall::with_params(PING, Some(id), json!({}))
    }

    #[test]
    fn test_insert_and_remove_once() {
        let pending = PendingCalls::new();
        let id = json!("id-1");
        pending.insert(&id, call(id.clone()));

        assert!(pending.contains(&id));
        assert_eq!(pending.len(), 1);
        assert!(pending.remove(&id).is_some());
        // 二度目の削除は何も返さない
        assert!(pending.remove(&id).is_none());
        assert!(pending.is_empty());
    }

    #[test]
    fn test_string_and_number_ids_are_distinct() {
        let pending = PendingCalls::new();
        let number = call(json!(1));
        let string = call(json!("1"));
        pending.insert(&json!(1), number.clone());

        assert!(pending.contains(&json!(1)));
        assert!(!pending.contains(&json!("1")));

        // 文字列の"1"を登録しても数値の1は置き換えられない
        assert!(pending.insert(&json!("1"), string.clone()).is_none());
        assert_eq!(pending.len(), 2);
        assert!(pending.remove(&json!("1")).unwrap().same_as(&string));
        assert!(pending.remove(&json!(1)).unwrap().same_as(&number));
    }

    #[test]
    fn test_remove_call_checks_identity_of_entry() {
        let pending = PendingCalls::new();
        let id = json!("dup");
        let first = call(id.clone());
        let second = call(id.clone());

        pending.insert(&id, first.clone());
        let replaced = pending.insert(&id, second.clone());
        assert!(replaced.unwrap().same_as(&first));

        assert!(!pending.remove_call(&id, &first));
        assert!(pending.remove_call(&id, &second));
    }

    #[test]
    fn test_drain() {
        let pending = PendingCalls::new();
        pending.insert(&json!("a"), call(json!("a")));
        pending.insert(&json!("b"), call(json!("b")));

        assert_eq!(pending.drain().len(), 2);
        assert!(pending.is_empty());
    }
}
