//! Directory-backed projects: partitions, reloads and derived results.

use std::collections::BTreeMap;
use std::fs;

use reasonflow::ast::builders::{fact, RuleBuilder};
use reasonflow::storage::{DirectoryStore, StorageLayout, DEFAULT_BLOCK_SIZE};
use reasonflow::{Config, EngineError, FactSource, Predicate, Reasoner, Relation, Tuple};
use tempfile::TempDir;

fn edges(from: i64, to: i64) -> BTreeMap<Predicate, Relation> {
    let relation: Relation = (from..to).map(|i| Tuple::ints(&[i, i + 1])).collect();
    BTreeMap::from([(Predicate::new("edge", 2), relation)])
}

fn directory_reasoner(dir: &TempDir) -> Reasoner {
    let mut config = Config::with_project_dir(dir.path());
    config.evaluation.workers = 1;
    Reasoner::new(config).unwrap()
}

#[test]
fn test_predicate_promoted_at_block_threshold() {
    let dir = TempDir::new().unwrap();
    let mut r = directory_reasoner(&dir);

    // Ten small batches stay in the shared partition
    for batch in 0..10 {
        r.import_batch(edges(batch * 100, batch * 100 + 100)).unwrap();
    }
    let partitions = r.facts().partitions().unwrap();
    assert_eq!(partitions.get("edge").unwrap().count, 1000);
    assert_eq!(partitions.location_of("edge"), 0);
    assert!(dir.path().join("facts/0/edge_2.jsonl").exists());

    // Crossing 1024 moves it to a dedicated location
    r.import_batch(edges(1000, 1024)).unwrap();
    let partitions = r.facts().partitions().unwrap();
    assert_eq!(partitions.block_size(), DEFAULT_BLOCK_SIZE);
    assert_eq!(partitions.location_of("edge"), 1);
    assert!(dir.path().join("facts/1/edge_2.jsonl").exists());
    assert!(!dir.path().join("facts/0/edge_2.jsonl").exists());
}

#[test]
fn test_facts_and_derivations_survive_reopen() {
    let dir = TempDir::new().unwrap();
    {
        let mut r = directory_reasoner(&dir);
        r.import_facts(&[fact("edge", &[1, 2]), fact("edge", &[2, 3])])
            .unwrap();
        let program = vec![
            RuleBuilder::new("path")
                .head_vars(["X", "Y"])
                .body_atom("edge", ["X", "Y"])
                .build(),
            RuleBuilder::new("path")
                .head_vars(["X", "Z"])
                .body_atom("path", ["X", "Y"])
                .body_atom("edge", ["Y", "Z"])
                .build(),
        ];
        r.evaluate(&program).unwrap();
    }

    let reopened = DirectoryStore::open(dir.path(), DEFAULT_BLOCK_SIZE).unwrap();
    assert_eq!(reopened.count(&Predicate::new("edge", 2)).unwrap(), 2);
    assert_eq!(reopened.count(&Predicate::new("path", 2)).unwrap(), 3);

    // One result directory per derived predicate of the stratum
    let inferences = dir.path().join("inferences/path");
    let runs: Vec<_> = fs::read_dir(&inferences).unwrap().collect();
    assert_eq!(runs.len(), 1);
    let run = runs[0].as_ref().unwrap().path();
    assert!(run
        .file_name()
        .unwrap()
        .to_string_lossy()
        .starts_with("path_s0_i"));
    let part = fs::read_to_string(run.join("part-00000.jsonl")).unwrap();
    assert_eq!(part.lines().count(), 3);
}

fn run_dirs(dir: &TempDir, predicate: &str) -> Vec<String> {
    fs::read_dir(dir.path().join("inferences").join(predicate))
        .unwrap()
        .map(|entry| entry.unwrap().file_name().to_string_lossy().into_owned())
        .collect()
}

#[test]
fn test_result_flow_id_names_the_deriving_rule() {
    let dir = TempDir::new().unwrap();
    let mut r = directory_reasoner(&dir);
    r.import_facts(&[fact("base", &[1])]).unwrap();

    // Rule 0 derives zeta, rule 1 derives alpha; result names sort the other way
    let program = vec![
        RuleBuilder::new("zeta")
            .head_vars(["X"])
            .body_atom("base", ["X"])
            .build(),
        RuleBuilder::new("alpha")
            .head_vars(["X"])
            .body_atom("base", ["X"])
            .build(),
    ];
    r.evaluate(&program).unwrap();

    let zeta = run_dirs(&dir, "zeta");
    let alpha = run_dirs(&dir, "alpha");
    assert_eq!(zeta.len(), 1);
    assert_eq!(alpha.len(), 1);
    assert!(zeta[0].starts_with("zeta_s0_i") && zeta[0].ends_with("_r0"), "{zeta:?}");
    assert!(alpha[0].starts_with("alpha_s0_i") && alpha[0].ends_with("_r1"), "{alpha:?}");
}

#[test]
fn test_staging_collision_surfaces_as_concurrent_write() {
    let dir = TempDir::new().unwrap();
    let mut r = directory_reasoner(&dir);
    let layout = StorageLayout::new(dir.path());
    fs::create_dir_all(layout.staging_dir()).unwrap();
    fs::write(layout.staging_file("_predicates.tmp"), b"held by another importer").unwrap();

    let err = r.import_batch(edges(0, 3)).unwrap_err();
    assert!(matches!(err, EngineError::ConcurrentWrite(_)));
}

#[test]
fn test_corrupt_fact_file_is_an_evaluation_error() {
    let dir = TempDir::new().unwrap();
    fs::create_dir_all(dir.path().join("facts/0")).unwrap();
    fs::write(dir.path().join("facts/0/edge_2.jsonl"), "not json\n").unwrap();

    let mut config = Config::with_project_dir(dir.path());
    config.evaluation.workers = 1;
    assert!(matches!(
        Reasoner::new(config),
        Err(EngineError::Evaluation { .. })
    ));
}
