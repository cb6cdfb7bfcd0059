//! Property tests for aggregation determinism.
//!
//! Merging many units must not depend on the order the scan visits them:
//!
//! - units that never disagree on content produce the same path → content
//!   mapping (spelling included) for every visit order;
//! - class files placed by the closure count as content: units may carry
//!   their own copies, and disagreements are found whichever side lands
//!   first;
//! - units that do disagree produce the same set of conflicting paths;
//! - merging a unit twice changes nothing;
//! - allowed-duplicate paths never conflict, whatever their content.

#![allow(clippy::all, clippy::pedantic, clippy::nursery)]

use std::collections::BTreeSet;

use proptest::prelude::*;

use super::*;
use crate::config::FilterKind;
use crate::model::Asset;
use crate::registry::ClassDescriptor;

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

/// Path spellings drawn from a small pool so units overlap often. Several
/// entries differ only by case, and some are class files of generated
/// classes.
const PATHS: [&str; 10] = [
    "/x.txt",
    "/X.txt",
    "/y.txt",
    "/META-INF/app.xml",
    "/meta-inf/APP.xml",
    "/WEB-INF/lib/shared.jar",
    "/WEB-INF/web.xml",
    "/WEB-INF/classes/gen/Unit0Test.class",
    "/web-inf/classes/gen/unit1test.class",
    "/WEB-INF/classes/gen/Unit2Test.class",
];

const CONTENTS: [&str; 3] = ["hello", "goodbye", "world"];

fn class(i: usize) -> ClassName {
    ClassName::new(&format!("gen.Unit{i}Test")).unwrap()
}

/// Content every agreeing contributor uses for `path`.
fn agreed_content(path: &ArchivePath) -> Asset {
    Asset::from(format!("content of {}", path.fold_key()).as_str())
}

/// One generated class: its unit and, optionally, its own bytecode.
#[derive(Clone, Debug)]
struct GenClass {
    unit: ArtifactStore,
    bytecode: Option<Asset>,
}

/// Build a registry with one class per entry, each returning its unit and
/// carrying its bytecode.
fn registry_for(classes: &[GenClass]) -> ClassRegistry {
    let mut reg = ClassRegistry::new();
    for (i, generated) in classes.iter().enumerate() {
        let unit = generated.unit.clone();
        let factory = move || -> anyhow::Result<ArtifactStore> { Ok(unit.clone()) };
        let mut descriptor = ClassDescriptor::new(class(i)).factory(factory);
        if let Some(bytes) = &generated.bytecode {
            descriptor = descriptor.bytecode(bytes.clone());
        }
        reg.register(descriptor).unwrap();
    }
    reg
}

/// Classes whose content is a function of the case-folded path, class files
/// included: they may spell paths differently but never disagree.
fn agreeing_classes() -> impl Strategy<Value = Vec<GenClass>> {
    prop::collection::vec(
        (prop::collection::btree_set(0..PATHS.len(), 1..5), any::<bool>()),
        2..6,
    )
    .prop_map(|classes| {
        classes
            .into_iter()
            .enumerate()
            .map(|(i, (idxs, with_bytecode))| {
                let mut unit = ArtifactStore::new(format!("u{i}.war"));
                for idx in idxs {
                    let path = ArchivePath::new(PATHS[idx]).unwrap();
                    let content = agreed_content(&path);
                    unit.add_if_absent(path, content);
                }
                let bytecode = with_bytecode
                    .then(|| agreed_content(&artifact::class_file_entry(&class(i)).unwrap()));
                GenClass { unit, bytecode }
            })
            .collect()
    })
}

/// Classes with arbitrary content per path and arbitrary bytecode.
fn arbitrary_classes() -> impl Strategy<Value = Vec<GenClass>> {
    prop::collection::vec(
        (
            prop::collection::btree_map(0..PATHS.len(), 0..CONTENTS.len(), 1..5),
            prop::option::of(0..CONTENTS.len()),
        ),
        2..6,
    )
    .prop_map(|classes| {
        classes
            .into_iter()
            .enumerate()
            .map(|(i, (entries, bytecode))| {
                let mut unit = ArtifactStore::new(format!("u{i}.war"));
                for (idx, content) in entries {
                    unit.add_if_absent(
                        ArchivePath::new(PATHS[idx]).unwrap(),
                        Asset::from(CONTENTS[content]),
                    );
                }
                GenClass {
                    unit,
                    bytecode: bytecode.map(|c| Asset::from(CONTENTS[c])),
                }
            })
            .collect()
    })
}

/// Visit orders: identity plus a shuffled permutation.
fn with_order(
    classes: impl Strategy<Value = Vec<GenClass>>,
) -> impl Strategy<Value = (Vec<GenClass>, Vec<usize>)> {
    classes.prop_flat_map(|classes| {
        let order: Vec<usize> = (0..classes.len()).collect();
        (Just(classes), Just(order).prop_shuffle())
    })
}

fn snapshot(store: &ArtifactStore) -> Vec<(String, Vec<u8>)> {
    store
        .iter()
        .map(|(p, a)| (p.to_string(), a.bytes().to_vec()))
        .collect()
}

fn run(reg: &ClassRegistry, filter: FilterKind, order: &[usize]) -> Result<Aggregation, AggregateError> {
    let config = MultisuiteConfig {
        filter,
        allowed_duplicates: Some(Vec::new()),
        ..MultisuiteConfig::default()
    };
    Aggregator::from_config(reg, &config)
        .unwrap()
        .aggregate_classes(order.iter().map(|&i| class(i)))
}

fn conflict_keys(result: &Result<Aggregation, AggregateError>) -> BTreeSet<String> {
    match result {
        Ok(out) => out.report.conflicts.iter().map(|c| c.path.fold_key()).collect(),
        Err(err) => err.conflict_paths().into_iter().map(ArchivePath::fold_key).collect(),
    }
}

// ---------------------------------------------------------------------------
// Properties
// ---------------------------------------------------------------------------

proptest! {
    #![proptest_config(ProptestConfig::with_cases(100))]

    #[test]
    fn agreeing_classes_merge_identically_in_any_order((classes, order) in with_order(agreeing_classes())) {
        let reg = registry_for(&classes);
        let identity: Vec<usize> = (0..classes.len()).collect();
        let baseline = run(&reg, FilterKind::Fail, &identity).unwrap();
        let shuffled = run(&reg, FilterKind::Fail, &order).unwrap();

        prop_assert_eq!(snapshot(baseline.artifact.store()), snapshot(shuffled.artifact.store()));
        prop_assert!(shuffled.report.conflicts.is_empty());
        prop_assert!(shuffled.report.warnings.is_empty());
    }

    #[test]
    fn conflicting_path_set_is_order_independent((classes, order) in with_order(arbitrary_classes())) {
        let reg = registry_for(&classes);
        let identity: Vec<usize> = (0..classes.len()).collect();
        let reversed: Vec<usize> = identity.iter().rev().copied().collect();

        let baseline = conflict_keys(&run(&reg, FilterKind::Fail, &identity));
        prop_assert_eq!(&baseline, &conflict_keys(&run(&reg, FilterKind::Fail, &order)));
        prop_assert_eq!(&baseline, &conflict_keys(&run(&reg, FilterKind::Fail, &reversed)));

        // The warn policy flags the same paths without failing.
        let warned: BTreeSet<String> = run(&reg, FilterKind::Warn, &order)
            .unwrap()
            .report
            .warnings
            .iter()
            .map(|c| c.path.fold_key())
            .collect();
        prop_assert_eq!(&baseline, &warned);
    }

    #[test]
    fn merging_twice_changes_nothing(classes in arbitrary_classes()) {
        let reg = registry_for(&classes);
        let once: Vec<usize> = (0..classes.len()).collect();
        let twice: Vec<usize> = once.iter().chain(once.iter()).copied().collect();

        let first = run(&reg, FilterKind::Warn, &once).unwrap();
        let second = run(&reg, FilterKind::Warn, &twice).unwrap();
        prop_assert_eq!(snapshot(first.artifact.store()), snapshot(second.artifact.store()));
        prop_assert_eq!(first.artifact.required_count(), second.artifact.required_count());
    }

    #[test]
    fn allowed_duplicates_never_conflict(stamps in prop::collection::vec("[a-z0-9]{1,8}", 2..6)) {
        let classes: Vec<GenClass> = stamps
            .iter()
            .enumerate()
            .map(|(i, stamp)| GenClass {
                unit: ArtifactStore::from_entries(
                    format!("u{i}.war"),
                    [
                        ("/WEB-INF/classes/timestamp.txt", stamp.as_str()),
                        ("/WEB-INF/classes/TEST-CONTEXTS.properties", stamp.as_str()),
                    ],
                )
                .unwrap(),
                bytecode: None,
            })
            .collect();
        let reg = registry_for(&classes);
        let order: Vec<usize> = (0..classes.len()).collect();

        let out = Aggregator::from_config(
            &reg,
            &MultisuiteConfig { filter: FilterKind::Fail, ..MultisuiteConfig::default() },
        )
        .unwrap()
        .aggregate_classes(order.iter().map(|&i| class(i)))
        .unwrap();

        prop_assert!(out.report.conflicts.is_empty());
        let kept = out
            .artifact
            .store()
            .get(&ArchivePath::new("/WEB-INF/classes/timestamp.txt").unwrap())
            .unwrap();
        prop_assert_eq!(kept.bytes(), stamps[0].as_bytes());
    }
}
