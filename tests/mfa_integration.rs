// In tests/mfa_integration.rs

use efficient_mfa::{
    Column, ColumnKind, DataTable, ErrorKind, GroupModel, Groups, LabeledMatrix, Mfa, MfaConfig,
    MfaError, SvdSolver,
};
use ndarray::Array2;
use ndarray_rand::rand_distr::Uniform;
use ndarray_rand::RandomExt;
use rand::SeedableRng;
use rand_chacha::ChaCha8Rng;
use tempfile::NamedTempFile;

const DEFAULT_FLOAT_TOLERANCE_F64: f64 = 1e-10;

fn assert_matrices_are_close(left: &LabeledMatrix, right: &LabeledMatrix, tolerance: f64, context: &str) {
    assert_eq!(left.index(), right.index(), "Row labels differ for {}", context);
    assert_eq!(left.columns(), right.columns(), "Column labels differ for {}", context);
    for ((idx, a), b) in left.values().indexed_iter().zip(right.values().iter()) {
        assert!(
            (a - b).abs() < tolerance,
            "Mismatch at {:?} for {}: {} vs {} (diff: {})",
            idx,
            context,
            a,
            b,
            (a - b).abs()
        );
    }
}

/// 100-row table: G1 holds three numeric columns, G2 two categorical ones.
fn survey_table(n_rows: usize, seed: u64) -> DataTable {
    let mut rng = ChaCha8Rng::seed_from_u64(seed);
    let numeric = Array2::random_using((n_rows, 3), Uniform::new(-5.0, 5.0), &mut rng);
    let mut columns: Vec<(String, Column)> = numeric
        .columns()
        .into_iter()
        .enumerate()
        .map(|(j, values)| (format!("x{}", j), Column::numeric(values.to_vec())))
        .collect();
    columns.push((
        "letter".to_string(),
        Column::categorical((0..n_rows).map(|i| ["a", "b", "c"][i % 3])),
    ));
    columns.push((
        "axis".to_string(),
        Column::categorical((0..n_rows).map(|i| ["x", "y"][(i / 3) % 2])),
    ));
    DataTable::from_columns(columns).unwrap()
}

fn survey_groups() -> Groups {
    Groups::new()
        .with_group("G1", ["x0", "x1", "x2"])
        .with_group("G2", ["letter", "axis"])
}

fn fitted_model(table: &DataTable) -> Mfa {
    let mut mfa = Mfa::new(MfaConfig::new(survey_groups()));
    mfa.fit(table).unwrap();
    mfa
}

#[test]
fn test_end_to_end_hundred_rows() {
    let table = survey_table(100, 42);
    let mut mfa = Mfa::new(MfaConfig::new(survey_groups()));
    let scores = mfa.fit_transform(&table).unwrap();

    assert_eq!(scores.nrows(), 100);
    assert_eq!(scores.ncols(), mfa.config().decomposition.n_components);
    assert_eq!(scores.columns(), &["component_0", "component_1"]);
    assert_eq!(scores.index(), table.row_labels().as_slice());
    assert!(scores.values().iter().all(|v| v.is_finite()));

    assert_eq!(mfa.partial_models().unwrap().len(), 2);
    assert_eq!(mfa.partial_model("G1").unwrap().kind(), ColumnKind::Numeric);
    assert_eq!(mfa.partial_model("G2").unwrap().kind(), ColumnKind::Categorical);

    let ratio = mfa.explained_variance_ratio().unwrap();
    assert!(ratio.iter().all(|r| (0.0..=1.0).contains(r)));
    assert!(mfa.eigenvalues().unwrap()[0] >= mfa.eigenvalues().unwrap()[1]);
}

#[test]
fn test_mixed_group_fails_naming_the_group() {
    let table = DataTable::from_columns(vec![
        ("num".to_string(), Column::numeric(vec![1.0, 2.0, 3.0, 4.0])),
        ("txt".to_string(), Column::categorical(["p", "q", "p", "q"])),
    ])
    .unwrap();
    let groups = Groups::new().with_group("G1", ["num", "txt"]);
    let mut mfa = Mfa::new(MfaConfig::new(groups));
    let err = mfa.fit(&table).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Validation);
    assert!(err.to_string().contains("G1"), "error should name G1: {}", err);
    assert!(!mfa.is_fitted());
}

#[test]
fn test_missing_groups_is_a_configuration_error_for_any_shape() {
    for table in [DataTable::new(), survey_table(10, 1)] {
        let mut mfa = Mfa::new(MfaConfig::default());
        let err = mfa.fit(&table).unwrap_err();
        assert_eq!(err, MfaError::MissingGroups);
        assert_eq!(err.kind(), ErrorKind::Configuration);
    }
}

#[test]
fn test_transform_before_fit_is_not_fitted() {
    let table = survey_table(10, 2);
    let mfa = Mfa::new(MfaConfig::new(survey_groups()));
    assert_eq!(mfa.transform(&table).unwrap_err(), MfaError::NotFitted);
    assert_eq!(mfa.global_table(&table).unwrap_err(), MfaError::NotFitted);
    assert_eq!(
        mfa.column_correlation(&table, true).unwrap_err().kind(),
        ErrorKind::NotFitted
    );
    assert!(mfa.global_decomposition().is_none());
}

#[test]
fn test_transform_is_idempotent() {
    let table = survey_table(100, 3);
    let mfa = fitted_model(&table);
    let first = mfa.transform(&table).unwrap();
    let second = mfa.transform(&table).unwrap();
    assert_eq!(first, second);
}

#[test]
fn test_scores_scale_by_square_root_of_row_count() {
    let table = survey_table(100, 4);
    let mfa = fitted_model(&table);
    let decomposition = mfa.global_decomposition().unwrap();

    let scores = mfa.transform(&table).unwrap();
    let global = mfa.global_table(&table).unwrap();
    let direct = decomposition.transform(global.values().view()).unwrap();
    for (s, d) in scores.values().iter().zip(direct.iter()) {
        assert!((s - d * 10.0).abs() < DEFAULT_FLOAT_TOLERANCE_F64, "{} vs {}", s, d * 10.0);
    }

    // rows project independently, so a subset differs only by the row-count factor
    let rows: Vec<usize> = (0..100).step_by(4).collect();
    let subset = table.select_rows(&rows).unwrap();
    let subset_scores = mfa.transform(&subset).unwrap();
    assert_eq!(subset_scores.nrows(), 25);
    assert_eq!(subset_scores.index()[1], "4");
    for (r, &row) in rows.iter().enumerate() {
        for c in 0..subset_scores.ncols() {
            let expected = scores.values()[[row, c]] * (25.0_f64).sqrt() / 10.0;
            assert!((subset_scores.values()[[r, c]] - expected).abs() < DEFAULT_FLOAT_TOLERANCE_F64);
        }
    }
}

#[test]
fn test_numeric_representation_round_trips_to_original_values() {
    let table = survey_table(100, 5);
    let mfa = fitted_model(&table);
    let model = mfa.partial_model("G1").unwrap();
    let representation = model.representation(&table).unwrap();
    let GroupModel::Numeric(numeric) = model else {
        panic!("G1 should be numeric");
    };
    let restored = numeric
        .scaler()
        .inverse_transform(representation.values().view())
        .unwrap();
    let original = table.numeric_block(model.columns()).unwrap();
    for (a, b) in restored.iter().zip(original.iter()) {
        assert!((a - b).abs() < DEFAULT_FLOAT_TOLERANCE_F64);
    }
}

#[test]
fn test_categorical_representation_is_one_hot() {
    let table = survey_table(100, 6);
    let mfa = fitted_model(&table);
    let representation = mfa.partial_model("G2").unwrap().representation(&table).unwrap();
    assert_eq!(
        representation.columns(),
        &["letter_a", "letter_b", "letter_c", "axis_x", "axis_y"]
    );
    let Some(Column::Categorical(letters)) = table.column("letter") else {
        panic!("letter should be categorical");
    };
    for (i, letter) in letters.iter().enumerate() {
        let row = representation.values().row(i);
        assert_eq!(row.iter().filter(|v| **v == 1.0).count(), 2);
        assert_eq!(row.iter().filter(|v| **v == 0.0).count(), 3);
        let hot = representation.column(&format!("letter_{}", letter)).unwrap();
        assert_eq!(hot[i], 1.0);
    }
}

#[test]
fn test_column_correlation_covers_every_global_column() {
    let table = survey_table(100, 7);
    let mfa = fitted_model(&table);
    let cached = mfa.column_correlation(&table, true).unwrap();
    let projected = mfa.column_correlation(&table, false).unwrap();

    assert_eq!(cached.index(), mfa.global_columns().unwrap());
    assert_eq!(cached.columns(), &["component_0", "component_1"]);
    assert_eq!(cached.index()[0], "G1/x0");
    assert_matrices_are_close(&cached, &projected, 1e-9, "cached vs projected correlation");
    assert!(cached.values().iter().all(|v| (-1.0..=1.0).contains(v)));

    let subset = table.select_rows(&[0, 1, 2, 3, 4, 5, 6, 7]).unwrap();
    assert!(matches!(
        mfa.column_correlation(&subset, true),
        Err(MfaError::DimensionMismatch { expected: 100, actual: 8 })
    ));
}

#[test]
fn test_unseen_category_transforms_to_finite_scores() {
    let table = survey_table(30, 8);
    let mfa = fitted_model(&table);
    let fresh = DataTable::from_columns(vec![
        ("x0".to_string(), Column::numeric(vec![0.5, -1.0])),
        ("x1".to_string(), Column::numeric(vec![2.0, 0.0])),
        ("x2".to_string(), Column::numeric(vec![-3.0, 1.5])),
        ("letter".to_string(), Column::categorical(["z", "a"])),
        ("axis".to_string(), Column::categorical(["x", "y"])),
    ])
    .unwrap()
    .with_index(vec!["new0".to_string(), "new1".to_string()])
    .unwrap();
    let scores = mfa.transform(&fresh).unwrap();
    assert_eq!(scores.index(), &["new0", "new1"]);
    assert!(scores.values().iter().all(|v| v.is_finite()));
}

#[test]
fn test_transform_rejects_retyped_columns() {
    let table = survey_table(30, 9);
    let mfa = fitted_model(&table);
    let retyped = DataTable::from_columns(vec![
        ("x0".to_string(), Column::numeric(vec![0.0])),
        ("x1".to_string(), Column::categorical(["oops"])),
        ("x2".to_string(), Column::numeric(vec![0.0])),
        ("letter".to_string(), Column::categorical(["a"])),
        ("axis".to_string(), Column::categorical(["x"])),
    ])
    .unwrap();
    let err = mfa.transform(&retyped).unwrap_err();
    assert_eq!(
        err,
        MfaError::ColumnTypeMismatch {
            column: "x1".to_string(),
            expected: ColumnKind::Numeric
        }
    );
}

#[test]
fn test_covariance_solver_matches_full_solver() {
    let table = survey_table(100, 10);
    let mut full = Mfa::new(MfaConfig::new(survey_groups()).solver(SvdSolver::Full));
    let mut covariance = Mfa::new(
        MfaConfig::new(survey_groups())
            .solver(SvdSolver::Covariance)
            .batch_size(Some(16)),
    );
    full.fit(&table).unwrap();
    covariance.fit(&table).unwrap();

    // G2's two categorical columns are independent, so its principal inertias
    // tie and individual axes are not unique; compare basis-free quantities.
    assert_matrices_are_close(
        &full.global_table(&table).unwrap(),
        &covariance.global_table(&table).unwrap(),
        1e-8,
        "full vs covariance global table",
    );
    let (a, b) = (full.eigenvalues().unwrap(), covariance.eigenvalues().unwrap());
    for (x, y) in a.iter().zip(b.iter()) {
        assert!((x - y).abs() < 1e-8, "eigenvalue {} vs {}", x, y);
    }
}

#[test]
fn test_whitening_only_affects_global_scores() {
    let table = survey_table(100, 12);
    let mut plain = Mfa::new(MfaConfig::new(survey_groups()).solver(SvdSolver::Full));
    let mut whitened = Mfa::new(MfaConfig::new(survey_groups()).solver(SvdSolver::Full).whiten(true));
    plain.fit(&table).unwrap();
    whitened.fit(&table).unwrap();

    // group analyses and their weights do not depend on whitening
    let plain_g2 = plain.partial_model("G2").unwrap();
    let whitened_g2 = whitened.partial_model("G2").unwrap();
    let (s_plain, s_whitened) = (
        plain_g2.dominant_singular_value().unwrap(),
        whitened_g2.dominant_singular_value().unwrap(),
    );
    assert!((s_plain - s_whitened).abs() < DEFAULT_FLOAT_TOLERANCE_F64, "{} vs {}", s_plain, s_whitened);
    assert_matrices_are_close(
        &plain_g2.representation(&table).unwrap(),
        &whitened_g2.representation(&table).unwrap(),
        DEFAULT_FLOAT_TOLERANCE_F64,
        "G2 representation",
    );
    let (GroupModel::Categorical(a), GroupModel::Categorical(b)) = (plain_g2, whitened_g2) else {
        panic!("G2 should be categorical");
    };
    let (mca_plain, mca_whitened) = (a.mca().fit_scores().unwrap(), b.mca().fit_scores().unwrap());
    for (x, y) in mca_plain.iter().zip(mca_whitened.iter()) {
        assert!((x - y).abs() < DEFAULT_FLOAT_TOLERANCE_F64, "MCA score {} vs {}", x, y);
    }

    let global = whitened.global_table(&table).unwrap();
    assert_matrices_are_close(
        &plain.global_table(&table).unwrap(),
        &global,
        DEFAULT_FLOAT_TOLERANCE_F64,
        "global table",
    );

    // whitened row scores are sqrt(n) times the whitened global PCA scores
    let scores = whitened.transform(&table).unwrap();
    let direct = whitened
        .global_decomposition()
        .unwrap()
        .transform(global.values().view())
        .unwrap();
    for (s, d) in scores.values().iter().zip(direct.iter()) {
        assert!((s - d * 10.0).abs() < DEFAULT_FLOAT_TOLERANCE_F64, "{} vs {}", s, d * 10.0);
    }

    // each whitened score column has sample variance n, and is the plain
    // column divided by the square root of its explained variance
    let plain_scores = plain.transform(&table).unwrap();
    let explained_variance = plain.global_decomposition().unwrap().explained_variance().unwrap();
    for (c, column) in scores.values().columns().into_iter().enumerate() {
        let variance = column.var(1.0);
        assert!((variance - 100.0).abs() < 1e-8, "component {} variance {}", c, variance);
        for (w, p) in column.iter().zip(plain_scores.values().column(c)) {
            let expected = p / explained_variance[c].sqrt();
            assert!((w - expected).abs() < 1e-8, "{} vs {}", w, expected);
        }
    }
}

#[test]
fn test_save_and_load_model() -> Result<(), Box<dyn std::error::Error>> {
    let table = survey_table(60, 11);
    let mfa = fitted_model(&table);

    let temp_file = NamedTempFile::new()?;
    mfa.save_model(temp_file.path())?;
    let loaded = Mfa::load_model(temp_file.path())?;

    assert_eq!(loaded, mfa);
    assert_eq!(loaded.transform(&table)?, mfa.transform(&table)?);
    Ok(())
}

#[test]
fn test_persistence_errors() -> Result<(), Box<dyn std::error::Error>> {
    let unfitted = Mfa::new(MfaConfig::new(survey_groups()));
    let temp_file = NamedTempFile::new()?;
    assert_eq!(unfitted.save_model(temp_file.path()).unwrap_err(), MfaError::NotFitted);

    std::fs::write(temp_file.path(), b"definitely not a model")?;
    let err = Mfa::load_model(temp_file.path()).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Persistence);

    let missing = Mfa::load_model("a_surely_non_existent_file.mfa_model").unwrap_err();
    assert_eq!(missing.kind(), ErrorKind::Persistence);
    Ok(())
}
