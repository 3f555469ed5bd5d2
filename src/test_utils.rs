//! Test utilities for property-based testing
//!
//! This module provides generators and helpers for proptest.

#[cfg(test)]
pub mod generators {
    use proptest::prelude::*;

    /// Generate a valid VHDL library name (lowercase identifier)
    pub fn library_name() -> impl Strategy<Value = String> {
        "[a-z][a-z0-9_]{0,12}[a-z0-9]"
            .prop_filter("Reserved library names", |s| {
                !matches!(s.as_str(), "ieee" | "std" | "work")
            })
    }

    /// Generate a VHDL source file name
    pub fn vhdl_file_name() -> impl Strategy<Value = String> {
        "[a-z][a-z0-9_]{0,15}".prop_map(|stem| format!("{stem}.vhd"))
    }

    /// Generate a valid SHA256 fingerprint (64 hex characters)
    pub fn sha256_hash() -> impl Strategy<Value = String> {
        "[0-9a-f]{64}"
    }

    /// Generate edges `(consumer, provider)` of a DAG over `n` nodes
    ///
    /// Providers always have a lower index than consumers.
    pub fn dag_edges(n: usize) -> impl Strategy<Value = Vec<(usize, usize)>> {
        let pairs: Vec<(usize, usize)> = (1..n).flat_map(|c| (0..c).map(move |p| (c, p))).collect();
        proptest::sample::subsequence(pairs.clone(), 0..=pairs.len())
    }

    /// Generate a permutation of `0..n`
    pub fn permutation(n: usize) -> impl Strategy<Value = Vec<usize>> {
        Just((0..n).collect::<Vec<_>>()).prop_shuffle()
    }
}

#[cfg(test)]
mod tests {
    use super::generators::*;
    use crate::config::defaults::MIN_PROPTEST_ITERATIONS;
    use proptest::prelude::*;

    proptest! {
        #![proptest_config(ProptestConfig::with_cases(MIN_PROPTEST_ITERATIONS))]

        #[test]
        fn test_library_name_generator(name in library_name()) {
            prop_assert!(name.len() >= 2);
            prop_assert!(name.chars().all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || c == '_'));
            prop_assert!(name != "work");
        }

        #[test]
        fn test_vhdl_file_name_generator(name in vhdl_file_name()) {
            prop_assert!(name.ends_with(".vhd"));
        }

        #[test]
        fn test_sha256_hash_generator(hash in sha256_hash()) {
            prop_assert_eq!(hash.len(), 64);
            prop_assert!(hash.chars().all(|c| c.is_ascii_hexdigit()));
        }

        #[test]
        fn test_dag_edges_point_backwards(edges in dag_edges(6)) {
            for (consumer, provider) in edges {
                prop_assert!(provider < consumer);
            }
        }

        #[test]
        fn test_permutation_generator(perm in permutation(5)) {
            let mut sorted = perm.clone();
            sorted.sort_unstable();
            prop_assert_eq!(sorted, vec![0, 1, 2, 3, 4]);
        }
    }
}
