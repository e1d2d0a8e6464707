#[cfg(test)]
mod forest_tests {
    use argot::errors::ArgotError;
    use argot::graph::windows::WindowKey;
    use argot::graph::SubPath;
    use argot::index::{
        false_negative_probability, false_positive_probability, optimise, LshForest,
    };

    fn key(id: &str, graph_id: usize, sketch: Vec<u64>) -> WindowKey {
        WindowKey {
            graph_id,
            node: 1,
            offset: 0,
            sub_path: SubPath::from_slice(&[1, 2]),
            reference_path: 0,
            id: id.to_string(),
            sketch,
        }
    }

    #[test]
    fn optimised_parameters_minimise_the_error_sum() {
        let (k, l, fp, fn_) = optimise(128, 0.99);
        assert!(k >= 1 && l >= 1);
        assert!(k * l <= 128);

        // exhaustive check over the feasible region
        let best = fp + fn_;
        for candidate_l in 1..=128usize {
            for candidate_k in 1..=128usize {
                if candidate_k * candidate_l > 128 {
                    break;
                }
                let error = false_positive_probability(candidate_k, candidate_l, 0.99)
                    + false_negative_probability(candidate_k, candidate_l, 0.99);
                assert!(
                    best <= error + 1e-12,
                    "({}, {}) beats the optimiser's ({}, {})",
                    candidate_k,
                    candidate_l,
                    k,
                    l
                );
            }
        }
    }

    #[test]
    fn query_returns_every_key_with_the_same_sketch() {
        let mut forest = LshForest::new(8, 0.9);
        let sketch: Vec<u64> = (100..108).collect();
        let other: Vec<u64> = (900..908).collect();
        forest.add(key("0:1:0", 0, sketch.clone())).unwrap();
        forest.add(key("0:1:0:1", 0, sketch.clone())).unwrap();
        forest.add(key("1:9:4", 1, other)).unwrap();
        forest.index();

        let mut hits = forest.query(&sketch).unwrap();
        hits.sort();
        assert_eq!(hits, vec!["0:1:0".to_string(), "0:1:0:1".to_string()]);

        // the structured keys survive, minus their sketches
        let stored = forest.get_key("0:1:0").unwrap();
        assert_eq!(stored.graph_id, 0);
        assert!(stored.sketch.is_empty());
        assert_eq!(stored.sub_path.as_slice(), &[1, 2]);
    }

    #[test]
    fn unrelated_sketches_do_not_collide() {
        let mut forest = LshForest::new(8, 0.9);
        forest.add(key("0:1:0", 0, (100..108).collect())).unwrap();
        forest.index();
        let probe: Vec<u64> = (500..508).collect();
        assert!(forest.query(&probe).unwrap().is_empty());
    }

    #[test]
    fn query_before_indexing_is_a_usage_error() {
        let mut forest = LshForest::new(8, 0.9);
        forest.add(key("0:1:0", 0, (100..108).collect())).unwrap();
        assert!(matches!(
            forest.query(&(100..108).collect::<Vec<u64>>()),
            Err(ArgotError::IndexNotFinalised)
        ));
    }

    #[test]
    fn add_after_indexing_is_rejected() {
        let mut forest = LshForest::new(8, 0.9);
        forest.index();
        assert!(matches!(
            forest.add(key("0:1:0", 0, (100..108).collect())),
            Err(ArgotError::IndexFinalised)
        ));
    }

    #[test]
    fn oversized_sketches_are_rejected() {
        let mut forest = LshForest::new(8, 0.9);
        assert!(matches!(
            forest.add(key("0:1:0", 0, (0..12).collect())),
            Err(ArgotError::SketchSizeMismatch { expected: 8, got: 12 })
        ));
    }

    #[test]
    fn under_filled_bottom_k_sketches_are_tolerated() {
        // a low-complexity window yields fewer distinct hashes than the
        // sketch size; only the complete bands are indexed
        let mut forest = LshForest::new(16, 0.9);
        let (k, _) = forest.settings();
        let partial: Vec<u64> = (100..100 + k as u64).collect();
        assert!(forest.add(key("0:5:0", 0, partial.clone())).unwrap());
        // too short to fill even one band: skipped, never fatal
        assert!(!forest.add(key("0:6:0", 0, vec![7])).unwrap());
        forest.index();

        // the partially banded key is still found by its own sketch
        assert_eq!(forest.query(&partial).unwrap(), vec!["0:5:0".to_string()]);
        // an unbandable query sketch matches nothing instead of erroring
        assert!(forest.query(&[7]).unwrap().is_empty());
        // the skipped key was never registered
        assert!(forest.get_key("0:6:0").is_err());
    }

    #[test]
    fn unknown_keys_signal_a_corrupt_index() {
        let mut forest = LshForest::new(8, 0.9);
        forest.index();
        assert!(matches!(
            forest.get_key("9:9:9"),
            Err(ArgotError::KeyNotFound(_))
        ));
    }
}
