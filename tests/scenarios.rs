use hestat_core::circuit::Circuit;
use hestat_core::encoder::VectorEncoder;
use hestat_core::pipeline::run;
use hestat_core::{
    ArithmeticBackend, ClearBackend, Operands, PackingScheme, PipelineConfig, ScalingContext, SchemeParams,
    Statistic, StatsError, VarianceMethod,
};
use proptest::prelude::*;

const SCHEMES: [PackingScheme; 2] = [PackingScheme::Slot, PackingScheme::Coefficient];

fn toy(statistic: Statistic, scheme: PackingScheme) -> PipelineConfig {
    PipelineConfig::new(statistic, scheme).with_params(SchemeParams::toy())
}

fn toy_scaling() -> ScalingContext {
    ScalingContext::new(81, 8091, 65537).unwrap()
}

/// Every configuration a statistic can run under with toy parameters.
fn variants(statistic: Statistic) -> Vec<PipelineConfig> {
    let mut configs: Vec<_> = SCHEMES.iter().map(|&s| toy(statistic, s)).collect();
    configs.push(toy(statistic, PackingScheme::Coefficient).with_scaling(toy_scaling()));
    configs
}

#[test]
fn sum_of_four() {
    for config in variants(Statistic::Sum) {
        let outcome = run(&config, &Operands::Single(vec![1, 2, 3, 4])).unwrap();
        assert_eq!(outcome.value(), 10.0, "{}", config.label());
        assert_eq!(outcome.depth, 0);
    }
    let slot = run(&toy(Statistic::Sum, PackingScheme::Slot), &Operands::Single(vec![1, 2, 3, 4])).unwrap();
    assert_eq!(slot.rotation_offsets, vec![1, 2]);
    assert_eq!(slot.output_index, 0);
}

#[test]
fn inner_product_of_two_pairs() {
    for config in variants(Statistic::InnerProduct) {
        let outcome = run(&config, &Operands::Pair(vec![1, 2], vec![3, 4])).unwrap();
        assert_eq!(outcome.value(), 11.0, "{}", config.label());
        assert_eq!(outcome.depth, 1);
    }
    let coef = run(
        &toy(Statistic::InnerProduct, PackingScheme::Coefficient),
        &Operands::Pair(vec![1, 2], vec![3, 4]),
    )
    .unwrap();
    assert!(coef.rotation_offsets.is_empty());
    assert_eq!(coef.output_index, 1);
}

#[test]
fn mean_of_one_to_eight() {
    for config in variants(Statistic::Mean) {
        let outcome = run(&config, &Operands::Single((1..=8).collect())).unwrap();
        assert_eq!(outcome.value(), 4.5, "{}", config.label());
        assert_eq!(outcome.decoded.divisor, 8);
    }
}

#[test]
fn population_variance() {
    let data = vec![2, 4, 4, 4, 5, 5, 7, 9];
    for config in variants(Statistic::Variance) {
        let outcome = run(&config, &Operands::Single(data.clone())).unwrap();
        assert_eq!(outcome.value(), 4.0, "{}", config.label());
        assert_eq!(outcome.depth, 1);
    }

    let deviation = PipelineConfig::new(Statistic::Variance, PackingScheme::Slot)
        .with_params(SchemeParams {
            ring_dim: 16,
            ..SchemeParams::standard()
        })
        .with_variance_method(VarianceMethod::Deviation);
    let outcome = run(&deviation, &Operands::Single(data)).unwrap();
    assert_eq!(outcome.value(), 4.0);
    assert_eq!(outcome.decoded.divisor, 512);
}

#[test]
fn scaling_round_trip() {
    let s = ScalingContext::new(81, 8091, 65537).unwrap();
    let scaled = s.pre_process(&[12345]);
    assert_eq!(s.post_process(&scaled), vec![12345]);
}

#[test]
fn standard_parameters_end_to_end() {
    let values: Vec<i64> = (1..=8).collect();
    let mean = PipelineConfig::new(Statistic::Mean, PackingScheme::Coefficient).with_scaling(ScalingContext::standard());
    assert_eq!(run(&mean, &Operands::Single(values.clone())).unwrap().value(), 4.5);
    let variance = PipelineConfig::new(Statistic::Variance, PackingScheme::Slot);
    assert_eq!(run(&variance, &Operands::Single(vec![2, 4, 4, 4, 5, 5, 7, 9])).unwrap().value(), 4.0);
}

#[test]
fn sharded_inputs() {
    // ring dimension 16: 40 elements span three slot shards and five
    // coefficient-variance shards
    let values: Vec<i64> = (0..40).map(|i| i % 5 - 2).collect();
    let n = values.len() as f64;
    let mean = values.iter().sum::<i64>() as f64 / n;
    let var = values.iter().map(|&v| (v as f64 - mean).powi(2)).sum::<f64>() / n;
    for config in variants(Statistic::Variance) {
        let outcome = run(&config, &Operands::Single(values.clone())).unwrap();
        assert!((outcome.value() - var).abs() < 1e-9, "{}", config.label());
    }
    for config in variants(Statistic::Mean) {
        let outcome = run(&config, &Operands::Single(values.clone())).unwrap();
        assert!((outcome.value() - mean).abs() < 1e-9, "{}", config.label());
    }
}

#[test]
fn depth_guard_rejects_three_sequential_products() {
    let mut c = Circuit::new();
    let x = c.input();
    let x2 = c.mul(x, x);
    let x4 = c.mul(x2, x2);
    let x8 = c.mul(x4, x4);
    c.set_output(x8);

    let backend = ClearBackend::keygen(SchemeParams::toy(), &[]).unwrap();
    let ct = VectorEncoder::new(backend.params(), PackingScheme::Slot)
        .encode(&[2])
        .unwrap()
        .encrypt(&backend)
        .unwrap()
        .ciphertext;
    let err = c.evaluate(&backend, vec![ct]).unwrap_err();
    assert!(matches!(err, StatsError::DepthExceeded { required: 3, budget: 2 }));
}

#[test]
fn error_taxonomy() {
    let empty = run(&toy(Statistic::Sum, PackingScheme::Slot), &Operands::Single(vec![]));
    assert!(matches!(empty, Err(StatsError::InputShape(_))));

    let mismatched = run(
        &toy(Statistic::InnerProduct, PackingScheme::Coefficient),
        &Operands::Pair(vec![1, 2, 3], vec![1, 2]),
    );
    assert!(matches!(mismatched, Err(StatsError::InputShape(_))));

    // 8² · 100² exceeds (65537 − 1) / 2
    let overflow = run(
        &toy(Statistic::Variance, PackingScheme::Slot),
        &Operands::Single(vec![100, 0, 0, 0, 0, 0, 0, 0]),
    );
    assert!(matches!(overflow, Err(StatsError::EncodingOverflow(_))));

    let encoder = VectorEncoder::new(&SchemeParams::toy(), PackingScheme::Slot);
    let too_long: Vec<i64> = (0..17).collect();
    assert!(matches!(encoder.encode(&too_long), Err(StatsError::EncodingOverflow(_))));

    let backend = ClearBackend::keygen(SchemeParams::toy(), &[]).unwrap();
    let ct = encoder.encode(&[1, 2]).unwrap().encrypt(&backend).unwrap().ciphertext;
    assert!(matches!(backend.rotate(&ct, 1), Err(StatsError::Backend(_))));
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(24))]

    #[test]
    fn encrypt_decrypt_round_trip(values in proptest::collection::vec(-1000i64..1000, 1..17)) {
        let params = SchemeParams::toy();
        let backend = ClearBackend::keygen(params, &[]).unwrap();
        for scheme in SCHEMES {
            let encoded = VectorEncoder::new(&params, scheme).encode(&values).unwrap();
            let ct = encoded.encrypt(&backend).unwrap().ciphertext;
            prop_assert_eq!(backend.decrypt(&ct).unwrap(), encoded.to_plaintext(&params).unwrap());
        }
    }

    #[test]
    fn sum_matches_cleartext(values in proptest::collection::vec(-400i64..400, 1..60)) {
        let expected = values.iter().sum::<i64>() as f64;
        for config in variants(Statistic::Sum) {
            let outcome = run(&config, &Operands::Single(values.clone())).unwrap();
            prop_assert_eq!(outcome.value(), expected);
        }
    }

    #[test]
    fn inner_product_matches_cleartext(
        pairs in proptest::collection::vec((-40i64..40, -40i64..40), 1..20)
    ) {
        let (v, w): (Vec<i64>, Vec<i64>) = pairs.into_iter().unzip();
        let expected = v.iter().zip(&w).map(|(a, b)| a * b).sum::<i64>() as f64;
        for config in variants(Statistic::InnerProduct) {
            let outcome = run(&config, &Operands::Pair(v.clone(), w.clone())).unwrap();
            prop_assert_eq!(outcome.value(), expected);
        }
    }

    #[test]
    fn scaling_inverts(x in any::<i32>()) {
        let s = ScalingContext::new(81, 8091, 65537).unwrap();
        let x = i64::from(x);
        let back = s.post_process(&s.pre_process(&[x, x, x]));
        let expected = x.rem_euclid(65537) as u64;
        prop_assert_eq!(back, vec![expected; 3]);
    }
}
