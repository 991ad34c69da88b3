//! Method registry: `method name <-> identity`, plus the factory used to
//! instantiate a call or event from an inbound request.

use crate::config::CollisionPolicy;
use crate::core::Identity;
use crate::error::{RpcError, RpcResult};
use crate::jsonrpc::types::Request;
use crate::rpc::codec::{DefaultMethodNameProvider, MethodNameProvider};
use std::collections::HashMap;
use std::sync::{Arc, RwLock, RwLockReadGuard, RwLockWriteGuard};

/// Builds a call or event instance from an inbound request.
pub type Factory<E> = Arc<dyn Fn(Request) -> E + Send + Sync>;

/// A registered method.
pub struct RegistryEntry<E> {
    identity: Identity,
    factory: Factory<E>,
    listeners: usize,
}

impl<E> RegistryEntry<E> {
    pub fn identity(&self) -> Identity {
        self.identity
    }

    pub fn build(&self, request: Request) -> E {
        (self.factory)(request)
    }
}

impl<E> Clone for RegistryEntry<E> {
    fn clone(&self) -> Self {
        Self {
            identity: self.identity,
            factory: self.factory.clone(),
            listeners: self.listeners,
        }
    }
}

/// Registry of the identities that currently have local handlers.
///
/// Each registration of an identity counts one handler; the mapping is
/// removed when the last one is unregistered.
pub struct MethodRegistry<E> {
    entries: RwLock<HashMap<String, RegistryEntry<E>>>,
    names: Arc<dyn MethodNameProvider>,
    policy: CollisionPolicy,
}

impl<E> MethodRegistry<E> {
    pub fn new(policy: CollisionPolicy) -> Self {
        Self::with_provider(policy, Arc::new(DefaultMethodNameProvider))
    }

    pub fn with_provider(policy: CollisionPolicy, names: Arc<dyn MethodNameProvider>) -> Self {
        Self {
            entries: RwLock::new(HashMap::new()),
            names,
            policy,
        }
    }

    fn read(&self) -> RwLockReadGuard<'_, HashMap<String, RegistryEntry<E>>> {
        self.entries
            .read()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn write(&self) -> RwLockWriteGuard<'_, HashMap<String, RegistryEntry<E>>> {
        self.entries
            .write()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    pub fn method_name(&self, identity: &Identity) -> String {
        self.names.method_name(identity)
    }

    /// Record one more handler for `identity`.
    pub fn register(&self, identity: Identity, factory: Factory<E>) -> RpcResult<String> {
        let method = self.method_name(&identity);
        let mut entries = self.write();

        if let Some(entry) = entries.get_mut(&method) {
            if entry.identity == identity {
                entry.listeners += 1;
                return Ok(method);
            }
            match self.policy {
                CollisionPolicy::Reject => {
                    return Err(RpcError::MethodCollision {
                        method,
                        existing: entry.identity.to_string(),
                        incoming: identity.to_string(),
                    });
                }
                CollisionPolicy::Replace => {
                    log::warn!(
                        "Method '{}' now maps to {} (was {})",
                        method,
                        identity,
                        entry.identity
                    );
                }
            }
        }

        entries.insert(
            method.clone(),
            RegistryEntry {
                identity,
                factory,
                listeners: 1,
            },
        );
        log::debug!("Registered method '{}' for {}", method, identity);
        Ok(method)
    }

    /// Drop one handler for `identity`. Returns `true` when the mapping was
    /// removed.
    pub fn unregister(&self, identity: Identity) -> bool {
        let method = self.method_name(&identity);
        let mut entries = self.write();

        let Some(entry) = entries.get_mut(&method) else {
            return false;
        };
        // 別のidentityに上書きされたエントリは触らない
        if entry.identity != identity {
            return false;
        }

        entry.listeners = entry.listeners.saturating_sub(1);
        if entry.listeners == 0 {
            entries.remove(&method);
            log::debug!("Unregistered method '{}'", method);
            return true;
        }
        false
    }

    pub fn lookup(&self, method: &str) -> Option<RegistryEntry<E>> {
        self.read().get(method).cloned()
    }

    pub fn identity_for(&self, method: &str) -> Option<Identity> {
        self.read().get(method).map(|entry| entry.identity)
    }

    /// Instantiate the registered call/event for `request`, if its method is known.
    pub fn build(&self, request: Request) -> Option<E> {
        let method = request.method.clone()?;
        let entry = self.lookup(&method)?;
        Some(entry.build(request))
    }

    pub fn contains(&self, method: &str) -> bool {
        self.read().contains_key(method)
    }

    pub fn len(&self) -> usize {
        self.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.read().is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::rpc::call::RpcCall;

    const SAY_HELLO: Identity = Identity::new("SayHello");
    const NESTED: Identity = Identity::new("Greeter$SayHello");
    // 同じメソッド名になる別のidentity
    const LOWER: Identity = Identity::new("sayHello");

    fn call_factory(identity: Identity) -> Factory<RpcCall> {
        Arc::new(move |request| RpcCall::from_request(identity, request))
    }

    #[test]
    fn test_lookup_after_register_and_unregister() {
        let registry = MethodRegistry::new(CollisionPolicy::Replace);
        let method = registry.register(SAY_HELLO, call_factory(SAY_HELLO)).unwrap();

        assert_eq!(method, "sayHello");
        assert_eq!(registry.identity_for(&SAY_HELLO.method_name()), Some(SAY_HELLO));

        assert!(registry.unregister(SAY_HELLO));
        assert_eq!(registry.identity_for(&SAY_HELLO.method_name()), None);
        assert!(registry.is_empty());
    }

    #[test]
    fn test_mapping_survives_until_last_handler_is_gone() {
        let registry = MethodRegistry::new(CollisionPolicy::Replace);
        registry.register(NESTED, call_factory(NESTED)).unwrap();
        registry.register(NESTED, call_factory(NESTED)).unwrap();

        assert!(!registry.unregister(NESTED));
        assert!(registry.contains("greeter.sayHello"));
        assert!(registry.unregister(NESTED));
        assert!(!registry.contains("greeter.sayHello"));
    }

    #[test]
    fn test_collision_replace_keeps_latest() {
        let registry = MethodRegistry::new(CollisionPolicy::Replace);
        registry.register(SAY_HELLO, call_factory(SAY_HELLO)).unwrap();
        registry.register(LOWER, call_factory(LOWER)).unwrap();

        assert_eq!(registry.identity_for("sayHello"), Some(LOWER));
        // 上書きされた側の解除はマッピングを消さない
        assert!(!registry.unregister(SAY_HELLO));
        assert_eq!(registry.identity_for("sayHello"), Some(LOWER));
    }

    #[test]
    fn test_collision_reject() {
        let registry = MethodRegistry::new(CollisionPolicy::Reject);
        registry.register(SAY_HELLO, call_factory(SAY_HELLO)).unwrap();

        let result = registry.register(LOWER, call_factory(LOWER));
        assert!(matches!(result, Err(RpcError::MethodCollision { .. })));
        assert_eq!(registry.identity_for("sayHello"), Some(SAY_HELLO));
    }

    #[test]
    fn test_build_uses_registered_factory() {
        let registry = MethodRegistry::new(CollisionPolicy::Replace);
        registry.register(SAY_HELLO, call_factory(SAY_HELLO)).unwrap();

        let request = Request::new(None, Some("sayHello".to_string()), None);
        let call = registry.build(request).unwrap();
        assert_eq!(call.identity(), SAY_HELLO);

        let unknown = Request::new(None, Some("nope".to_string()), None);
        assert!(registry.build(unknown).is_none());
    }
}
