#![allow(dead_code)]

/// Deterministic set of product-style keys.
pub fn sku_keys(range: std::ops::Range<u32>) -> Vec<String> {
    range.map(|i| format!("sku:{}", i)).collect()
}

/// Keys from a disjoint namespace, used to probe for false positives.
pub fn absent_keys(count: u32) -> Vec<String> {
    (0..count).map(|i| format!("ghost:{}", i)).collect()
}
