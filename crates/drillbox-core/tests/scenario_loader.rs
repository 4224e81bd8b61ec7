//! Catalog loading against real scenario trees on disk.

use std::fs;
use std::path::Path;

use rand::rngs::StdRng;
use rand::SeedableRng;

use drillbox_core::scenario::{
    Category, Difficulty, Distribution, ScenarioCatalog, ScenarioError, ValidationCheck,
};

fn write(root: &Path, rel: &str, body: &str) {
    let path = root.join(rel);
    fs::create_dir_all(path.parent().unwrap()).unwrap();
    fs::write(path, body).unwrap();
}

fn scenario_yaml(id: &str, category: &str, difficulty: &str, distribution: Option<&str>) -> String {
    let dist = distribution
        .map(|d| format!("distribution: {d}\n"))
        .unwrap_or_default();
    format!(
        r#"id: {id}
category: {category}
difficulty: {difficulty}
task: Practice task {id}
points: 10
{dist}validation:
  checks:
    - type: command
      command: "true"
"#
    )
}

fn tree() -> tempfile::TempDir {
    let dir = tempfile::tempdir().unwrap();
    let root = dir.path();
    write(root, "networking/net-001.yaml", &scenario_yaml("net-001", "networking", "easy", None));
    write(
        root,
        "networking/net-002.yml",
        &scenario_yaml("net-002", "networking", "hard", Some("rocky")),
    );
    write(root, "storage/sto-001.yaml", &scenario_yaml("sto-001", "storage", "medium", None));
    write(
        root,
        "users/usr-001.yaml",
        &scenario_yaml("usr-001", "users_groups", "easy", Some("ubuntu")),
    );
    write(root, "README.md", "not a scenario");
    dir
}

// -------------------------------------------------------------------------
// Loading and indexing
// -------------------------------------------------------------------------

#[test]
fn test_loads_nested_tree_and_ignores_other_files() {
    let dir = tree();
    let catalog = ScenarioCatalog::new(dir.path());
    assert_eq!(catalog.load_all().unwrap(), 4);
    assert_eq!(
        catalog.categories().unwrap(),
        vec![Category::Networking, Category::Storage, Category::UsersGroups]
    );
    assert_eq!(catalog.count(Some(Category::Networking)).unwrap(), 2);
    assert!(catalog.get("sto-001").unwrap().is_some());
    assert!(catalog.get("missing").unwrap().is_none());
}

#[test]
fn test_invalid_definitions_are_skipped_while_siblings_load() {
    let dir = tree();
    let root = dir.path();
    write(
        root,
        "storage/broken.yaml",
        "id: sto-bad\ncategory: storage\ndifficulty: easy\npoints: -5\n",
    );
    write(root, "storage/garbage.yaml", "id: [unterminated\n");
    write(
        root,
        "storage/unknown-check.yaml",
        r#"id: sto-weird
category: storage
difficulty: easy
task: weird
points: 5
validation:
  checks:
    - type: telepathy
"#,
    );

    let catalog = ScenarioCatalog::new(root);
    assert_eq!(catalog.load_all().unwrap(), 4);
    assert!(catalog.get("sto-bad").unwrap().is_none());
    assert!(catalog.get("sto-weird").unwrap().is_none());
    assert!(catalog.get("sto-001").unwrap().is_some());
}

#[test]
fn test_multi_document_and_list_files() {
    let dir = tempfile::tempdir().unwrap();
    let multi = format!(
        "{}---\n{}",
        scenario_yaml("ops-001", "operations_deployment", "easy", None),
        scenario_yaml("ops-002", "operations_deployment", "medium", None)
    );
    write(dir.path(), "ops.yaml", &multi);

    let catalog = ScenarioCatalog::new(dir.path());
    assert_eq!(catalog.load_all().unwrap(), 2);
    assert_eq!(catalog.count(Some(Category::OperationsDeployment)).unwrap(), 2);
}

#[test]
fn test_duplicate_id_last_definition_wins() {
    let dir = tempfile::tempdir().unwrap();
    write(dir.path(), "a.yaml", &scenario_yaml("dup-001", "storage", "easy", None));
    write(dir.path(), "b.yaml", &scenario_yaml("dup-001", "storage", "hard", None));

    let catalog = ScenarioCatalog::new(dir.path());
    assert_eq!(catalog.load_all().unwrap(), 1);
    let scenario = catalog.get("dup-001").unwrap().unwrap();
    assert_eq!(scenario.difficulty, Difficulty::Hard);

    let listed = catalog.list(Some(Category::Storage), None).unwrap();
    let levels: Vec<_> = listed.iter().map(|s| s.difficulty).collect();
    assert_eq!(levels, vec![Difficulty::Easy, Difficulty::Hard]);
    assert_eq!(catalog.count(Some(Category::Storage)).unwrap(), 2);
}

#[test]
fn test_duplicate_in_other_category_stays_listed() {
    let dir = tempfile::tempdir().unwrap();
    write(dir.path(), "a.yaml", &scenario_yaml("dup-002", "storage", "easy", None));
    write(dir.path(), "b.yaml", &scenario_yaml("dup-002", "networking", "easy", None));

    let catalog = ScenarioCatalog::new(dir.path());
    assert_eq!(
        catalog.categories().unwrap(),
        vec![Category::Networking, Category::Storage]
    );
    assert_eq!(catalog.count(Some(Category::Storage)).unwrap(), 1);
    assert_eq!(
        catalog.get("dup-002").unwrap().unwrap().category,
        Category::Networking
    );
}

#[test]
fn test_missing_root_is_reported() {
    let catalog = ScenarioCatalog::new("/definitely/not/here");
    assert!(matches!(
        catalog.load_all(),
        Err(ScenarioError::RootMissing(_))
    ));
}

// -------------------------------------------------------------------------
// Filtering and selection
// -------------------------------------------------------------------------

#[test]
fn test_list_filters_never_disagree() {
    let dir = tree();
    let catalog = ScenarioCatalog::new(dir.path());

    for scenario in catalog.list(Some(Category::Networking), None).unwrap() {
        assert_eq!(scenario.category, Category::Networking);
    }
    let easy = catalog.list(None, Some(Difficulty::Easy)).unwrap();
    assert_eq!(easy.len(), 2);
    assert!(easy.iter().all(|s| s.difficulty == Difficulty::Easy));
}

#[test]
fn test_distribution_affinity_in_random_pick() {
    let dir = tree();
    let catalog = ScenarioCatalog::new(dir.path());
    let mut rng = StdRng::seed_from_u64(7);

    for _ in 0..20 {
        let picked = catalog
            .pick_random_with(&mut rng, None, None, Some(Distribution::Centos))
            .unwrap();
        assert!(picked.distribution.is_none(), "{} is pinned", picked.id);
    }

    let rocky = catalog
        .pick_random_with(
            &mut rng,
            Some(Category::Networking),
            Some(Difficulty::Hard),
            Some(Distribution::Rocky),
        )
        .unwrap();
    assert_eq!(rocky.id, "net-002");

    let err = catalog
        .pick_random_with(
            &mut rng,
            Some(Category::UsersGroups),
            None,
            Some(Distribution::Centos),
        )
        .unwrap_err();
    assert!(matches!(err, ScenarioError::NoMatch(_)));
}

// -------------------------------------------------------------------------
// Templating and linting
// -------------------------------------------------------------------------

#[test]
fn test_template_variables_render_consistently_within_a_file() {
    let dir = tempfile::tempdir().unwrap();
    write(
        dir.path(),
        "tpl.yaml",
        r#"id: tpl-001
category: essential_commands
difficulty: easy
task: "Create /tmp/{{ random_file }}"
points: 5
validation:
  checks:
    - type: file
      path: "/tmp/{{random_file}}"
"#,
    );

    let catalog = ScenarioCatalog::new(dir.path());
    let scenario = catalog.get("tpl-001").unwrap().unwrap();
    assert!(!scenario.task.contains("{{"));

    let ValidationCheck::File(check) = &scenario.validation.checks[0] else {
        panic!("expected a file check");
    };
    assert!(scenario.task.ends_with(check.path.as_str()));
}

#[test]
fn test_check_file_lists_problems() {
    let dir = tempfile::tempdir().unwrap();
    write(
        dir.path(),
        "bad.yaml",
        "id: bad-001\ncategory: cooking\ndifficulty: easy\ntask: x\npoints: 0\n",
    );
    write(dir.path(), "good.yaml", &scenario_yaml("ok-001", "storage", "easy", None));

    let catalog = ScenarioCatalog::new(dir.path());
    let problems = catalog.check_file(&dir.path().join("bad.yaml")).unwrap();
    assert!(problems.len() >= 3, "{problems:?}");
    assert!(problems.iter().all(|p| p.starts_with("bad-001: ")));
    assert!(problems.iter().any(|p| p.contains("points must be a positive integer")));

    assert!(catalog
        .check_file(&dir.path().join("good.yaml"))
        .unwrap()
        .is_empty());
}
