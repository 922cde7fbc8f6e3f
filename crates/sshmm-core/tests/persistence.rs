//! Saving and loading model files.

use sshmm_core::{
    load_models, save_models, ApplianceQuantization, Decoder, ErrorCategory, Indexing,
    ModelConfig, ModelError, SparseViterbi, SuperStateHmm,
};

fn fold(hidden: &[[usize; 2]], observations: &[usize], config: ModelConfig) -> SuperStateHmm {
    let mut model = SuperStateHmm::with_config(
        vec![
            ApplianceQuantization::new("fridge", vec![0, 4], vec![0, 0, 1, 1, 1]),
            ApplianceQuantization::new("washer", vec![0, 6, 12], vec![0, 0, 0, 1, 1, 1, 1, 2]),
        ],
        (0..17).map(f64::from).collect(),
        config,
    )
    .unwrap();
    model.train(observations, hidden).unwrap();
    model
}

fn folds() -> Vec<SuperStateHmm> {
    vec![
        fold(
            &[[0, 0], [1, 0], [1, 1], [0, 2], [1, 2], [0, 0]],
            &[0, 4, 10, 12, 16, 0],
            ModelConfig::default(),
        ),
        fold(
            &[[0, 0], [0, 1], [1, 1], [1, 0], [0, 0]],
            &[0, 6, 10, 4, 0],
            ModelConfig::default().with_indexing(Indexing::None, Indexing::Full, Indexing::Hashing),
        ),
    ]
}

#[test]
fn saved_folds_load_back_identically() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("models.json");
    let models = folds();

    save_models(&path, &models).unwrap();
    let loaded = load_models(&path).unwrap();

    assert_eq!(loaded.len(), models.len());
    for (before, after) in models.iter().zip(&loaded) {
        assert_eq!(after.parameters().unwrap(), before.parameters().unwrap());
        assert_eq!(after.appliances(), before.appliances());
        assert_eq!(after.state_counts(), before.state_counts());
        assert_eq!(after.super_state_count(), before.super_state_count());
        assert_eq!(after.observation_labels(), before.observation_labels());
    }
}

#[test]
fn loaded_models_decode_like_the_saved_ones() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("models.json");
    let models = folds();
    save_models(&path, &models).unwrap();
    let loaded = load_models(&path).unwrap();

    for (before, after) in models.iter().zip(&loaded) {
        for y0 in 0..17 {
            for y1 in 0..17 {
                let want = SparseViterbi.decode(before, y0, y1).unwrap();
                let got = SparseViterbi.decode(after, y0, y1).unwrap();
                assert_eq!(got, want, "pair ({y0}, {y1})");
            }
        }
    }
}

#[test]
fn empty_fold_lists_round_trip() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("none.json");
    save_models(&path, &[]).unwrap();
    assert!(load_models(&path).unwrap().is_empty());
}

#[test]
fn missing_files_report_their_path() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("absent.json");
    let err = load_models(&path).unwrap_err();
    assert_eq!(err.category(), ErrorCategory::Io);
    match err {
        ModelError::Io { path: reported, .. } => assert_eq!(reported, path),
        other => panic!("unexpected error: {other}"),
    }
}

#[test]
fn corrupt_files_fail_to_load() {
    let dir = tempfile::tempdir().unwrap();

    let truncated = dir.path().join("truncated.json");
    let text = serde_json::to_string(&folds()).unwrap();
    std::fs::write(&truncated, &text[..text.len() / 2]).unwrap();
    assert!(matches!(load_models(&truncated), Err(ModelError::Json(_))));

    let inconsistent = dir.path().join("inconsistent.json");
    let mut value = serde_json::to_value(&folds()).unwrap();
    value[1]["K"] = serde_json::json!(7);
    std::fs::write(&inconsistent, value.to_string()).unwrap();
    let err = load_models(&inconsistent).unwrap_err();
    assert!(matches!(err, ModelError::InvalidRecord(_)));
    assert_eq!(err.category(), ErrorCategory::Persistence);
}

#[test]
fn saving_into_a_missing_directory_fails() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("no-such-dir").join("models.json");
    assert!(matches!(
        save_models(&path, &folds()),
        Err(ModelError::Io { .. })
    ));
}
