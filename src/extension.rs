//! The process-wide extension registry: a mapping from YAML tag to a
//! deserializer for that tag's schema.
//!
//! Registration is expected to happen once, near process startup, before
//! any files are opened (see the open question on initialization order in
//! the design notes). The registry is behind a [`std::sync::OnceLock`]
//! guarding a [`std::sync::Mutex`]; the mutex exists only because statics
//! must be `Sync`, not because concurrent registration is a supported
//! pattern.

use std::any::Any;
use std::collections::HashMap;
use std::sync::{Mutex, OnceLock};

use crate::error::ValueError;
use crate::value::Value;

type DeserializeFn = Box<dyn for<'doc> Fn(&Value<'doc>) -> Result<Box<dyn Any>, ValueError> + Send + Sync>;

/// Information about the software that defined an extension, mirroring
/// the `software` mapping ASDF schemas attach to extension tags.
#[derive(Debug, Clone, Default)]
pub struct SoftwareInfo {
    pub name: String,
    pub version: String,
}

struct Extension {
    #[allow(dead_code)]
    software: SoftwareInfo,
    deserialize: DeserializeFn,
}

#[derive(Default)]
pub struct Registry {
    extensions: Mutex<HashMap<String, Extension>>,
}

fn canonicalize(tag: &str) -> String {
    if tag.starts_with("tag:") {
        tag.to_string()
    } else {
        format!("tag:{tag}")
    }
}

impl Registry {
    /// Register a deserializer for `tag`. Re-registering the same tag
    /// replaces the previous handler and logs a warning (there is no
    /// per-file context to route the warning through at this scope, so it
    /// goes straight to the `log` facade).
    pub fn register<T: 'static>(
        &self,
        tag: &str,
        software: SoftwareInfo,
        deserialize: impl for<'doc> Fn(&Value<'doc>) -> Result<T, ValueError> + Send + Sync + 'static,
    ) {
        let key = canonicalize(tag);
        let wrapped: DeserializeFn = Box::new(move |v| deserialize(v).map(|t| Box::new(t) as Box<dyn Any>));
        let mut map = self.extensions.lock().unwrap();
        if map.contains_key(&key) {
            log::warn!(target: "asdf", "replacing extension already registered for tag {key:?}");
        }
        map.insert(key, Extension { software, deserialize: wrapped });
    }

    pub fn is_registered(&self, tag: &str) -> bool {
        self.extensions.lock().unwrap().contains_key(&canonicalize(tag))
    }

    pub fn deserialize<T: 'static>(&self, tag: &str, value: &Value<'_>) -> Result<Box<T>, ValueError> {
        let key = canonicalize(tag);
        let map = self.extensions.lock().unwrap();
        let ext = map
            .get(&key)
            .ok_or_else(|| ValueError::UnknownExtension(key.clone()))?;
        let boxed_any = (ext.deserialize)(value)?;
        boxed_any
            .downcast::<T>()
            .map_err(|_| ValueError::ExtensionFailed(format!("tag {key:?} produced an unexpected type")))
    }
}

static REGISTRY: OnceLock<Registry> = OnceLock::new();

/// The process-wide extension registry.
pub fn registry() -> &'static Registry {
    REGISTRY.get_or_init(Registry::default)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn canonicalizes_bare_tags() {
        assert_eq!(canonicalize("example.org/foo-1.0.0"), "tag:example.org/foo-1.0.0");
        assert_eq!(canonicalize("tag:example.org/foo-1.0.0"), "tag:example.org/foo-1.0.0");
    }
}
