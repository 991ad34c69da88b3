//! Method name codec.
//!
//! Maps a call/event identity to its wire method name: every `$` in the
//! short name becomes `.`, and the first character of each segment is
//! lowercased. `SandboxNamespace$SayHello` becomes `sandboxNamespace.sayHello`.

use crate::core::Identity;

/// Separator between nesting levels in an identity short name.
pub const NESTING_SEPARATOR: char = '$';

/// Derive the wire method name from an identity short name.
pub fn method_name_for(short_name: &str) -> String {
    let mut name = String::with_capacity(short_name.len());
    let mut begin = true;
    for ch in short_name.chars() {
        if ch == NESTING_SEPARATOR {
            name.push('.');
            begin = true;
        } else if begin {
            name.extend(ch.to_lowercase());
            begin = false;
        } else {
            name.push(ch);
        }
    }
    name
}

impl Identity {
    /// Wire method name of this identity.
    pub fn method_name(&self) -> String {
        method_name_for(self.short_name())
    }
}

/// Translates identities to method names.
pub trait MethodNameProvider: Send + Sync {
    fn method_name(&self, identity: &Identity) -> String;
}

/// Applies [`method_name_for`].
#[derive(Debug, Clone, Copy, Default)]
pub struct DefaultMethodNameProvider;

impl MethodNameProvider for DefaultMethodNameProvider {
    fn method_name(&self, identity: &Identity) -> String {
        identity.method_name()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_simple_name() {
        assert_eq!(method_name_for("SayHello"), "sayHello");
    }

    #[test]
    fn test_nested_name() {
        assert_eq!(method_name_for("Outer$Inner"), "outer.inner");
        assert_eq!(
            method_name_for("SandboxNamespace$SayHello"),
            "sandboxNamespace.sayHello"
        );
    }

    #[test]
    fn test_only_first_character_is_lowered() {
        assert_eq!(method_name_for("HTTPServer$GetURL"), "hTTPServer.getURL");
        assert_eq!(method_name_for("already$lower"), "already.lower");
    }

    #[test]
    fn test_deterministic() {
        let identity = Identity::new("Files$ListAll");
        assert_eq!(identity.method_name(), identity.method_name());
        assert_eq!(
            DefaultMethodNameProvider.method_name(&identity),
            "files.listAll"
        );
    }
}
