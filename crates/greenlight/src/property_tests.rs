//! Property-based tests for engine invariants.
//!
//! - Publication order respects every in-set dependency edge.
//! - Publication order is deterministic and a permutation of its input.

use proptest::prelude::*;

use crate::target::crates_io::{CratePackage, publish_order};

/// Generate an acyclic package set: raw edges are filtered so a package
/// may only depend on packages with a smaller index; some packages also
/// depend on names outside the set.
fn package_set() -> impl Strategy<Value = Vec<CratePackage>> {
    (
        1usize..12,
        prop::collection::vec((0usize..12, 0usize..12), 0..30),
        prop::bool::ANY,
    )
        .prop_map(|(count, raw_edges, external)| {
            (0..count)
                .map(|index| {
                    let mut dependencies: Vec<String> = raw_edges
                        .iter()
                        .filter(|(from, to)| *from == index && *to < index)
                        .map(|(_, to)| format!("pkg-{to}"))
                        .collect();
                    if external && index % 2 == 0 {
                        dependencies.push("serde".to_string());
                    }
                    CratePackage {
                        name: format!("pkg-{index}"),
                        dependencies,
                    }
                })
                .collect()
        })
}

proptest! {
    /// Every in-set dependency is published before its dependent.
    #[test]
    fn dependencies_precede_dependents(packages in package_set()) {
        let order = publish_order(&packages).expect("acyclic by construction");
        let position: std::collections::HashMap<&str, usize> = order
            .iter()
            .enumerate()
            .map(|(index, name)| (name.as_str(), index))
            .collect();
        for package in &packages {
            for dep in &package.dependencies {
                let Some(dep_position) = position.get(dep.as_str()) else {
                    continue; // external dependency
                };
                prop_assert!(
                    *dep_position < position[package.name.as_str()],
                    "{} must precede {}",
                    dep,
                    package.name
                );
            }
        }
    }

    /// The order is a permutation of the input and stable across runs.
    #[test]
    fn order_is_deterministic_permutation(packages in package_set()) {
        let first = publish_order(&packages).expect("order");
        let second = publish_order(&packages).expect("order");
        prop_assert_eq!(&first, &second);

        let mut sorted = first.clone();
        sorted.sort();
        let mut names: Vec<String> = packages.iter().map(|p| p.name.clone()).collect();
        names.sort();
        prop_assert_eq!(sorted, names);
    }
}
