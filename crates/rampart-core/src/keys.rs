//! Key naming conventions shared by every instance.

/// Prefix for lock keys.
pub const LOCK_PREFIX: &str = "lock:";

/// Prefix for remote filter bit fields.
pub const BLOOM_PREFIX: &str = "bloom:";

/// Store key of a named filter. Names that already carry the prefix are
/// left alone.
pub fn filter_key(name: &str) -> String {
    if name.starts_with(BLOOM_PREFIX) {
        name.to_string()
    } else {
        format!("{}{}", BLOOM_PREFIX, name)
    }
}

/// `namespace:suffix`
pub fn namespaced(namespace: &str, suffix: &str) -> String {
    format!("{}:{}", namespace, suffix)
}

/// Counter key used by the reentrant lock for one holder.
pub fn reentrant_counter_key(lock_key: &str, holder: &str) -> String {
    format!("{}:{}", lock_key, holder)
}
