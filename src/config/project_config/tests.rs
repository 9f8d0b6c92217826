use super::*;

#[test]
fn test_defaults() {
    let config = BugtrailConfig::default();
    assert_eq!(config.project.repo_path, PathBuf::from("."));
    assert_eq!(config.project.source_extension, ".java");
    assert_eq!(config.szz.window_size, 3);
    assert!((config.szz.default_proportion - 0.01).abs() < f64::EPSILON);
    assert_eq!(config.szz.match_policy, MatchPolicy::All);
    assert_eq!(config.validation.release_index_column, "ReleaseIndex");
    assert_eq!(config.validation.metadata_columns.len(), 6);
    assert_eq!(config.dataset.output_path("BOOKKEEPER"), PathBuf::from("BOOKKEEPER_dataset.csv"));
}

#[test]
fn test_partial_file_keeps_defaults() {
    let toml = r#"
[project]
key = "AVRO"

[szz]
window_size = 5
estimator = "fixed"
match_policy = "first"

[validation]
classifiers = ["knn"]
"#;
    let config = BugtrailConfig::from_toml(toml, Path::new("bugtrail.toml")).unwrap();
    assert_eq!(config.project.key, "AVRO");
    assert_eq!(config.project.test_path_marker, "/test/");
    assert_eq!(config.szz.window_size, 5);
    assert_eq!(config.szz.estimator, EstimatorKind::Fixed);
    assert_eq!(config.szz.match_policy, MatchPolicy::First);
    assert_eq!(config.szz.fix_commit_grace_days, 1);
    assert_eq!(config.validation.classifiers, vec!["knn"]);
    assert_eq!(config.validation.sampling.len(), 3);
}

#[test]
fn test_invalid_toml_names_the_file() {
    let err = BugtrailConfig::from_toml("[szz\nwindow_size = ", Path::new("conf/bad.toml"))
        .unwrap_err();
    assert!(matches!(err, ConfigError::Parse { .. }));
    assert!(err.to_string().contains("conf/bad.toml"));
}

#[test]
fn test_out_of_range_values_rejected() {
    let err = BugtrailConfig::from_toml("[szz]\nwindow_size = 0\n", Path::new("b.toml")).unwrap_err();
    assert!(matches!(err, ConfigError::Invalid { field: "szz.window_size", .. }));

    let err = BugtrailConfig::from_toml("[dataset]\nsnoring_discard_ratio = 1.5\n", Path::new("b.toml"))
        .unwrap_err();
    assert!(matches!(err, ConfigError::Invalid { field: "dataset.snoring_discard_ratio", .. }));
}

#[test]
fn test_load_config_missing_file_uses_defaults() {
    let dir = tempfile::tempdir().unwrap();
    let config = load_config(None, dir.path()).unwrap();
    assert_eq!(config.issues.page_size, 100);
}

#[test]
fn test_load_config_explicit_missing_file_is_error() {
    let dir = tempfile::tempdir().unwrap();
    let err = load_config(Some(&dir.path().join("nope.toml")), dir.path()).unwrap_err();
    assert!(matches!(err, ConfigError::Read { .. }));
}

#[test]
fn test_load_config_from_directory() {
    let dir = tempfile::tempdir().unwrap();
    std::fs::write(
        dir.path().join(CONFIG_FILE_NAME),
        "[issues]\nsnapshot = \"issues.json\"\n",
    )
    .unwrap();
    let config = load_config(None, dir.path()).unwrap();
    assert_eq!(config.issues.snapshot, Some(PathBuf::from("issues.json")));
}
