#[cfg(test)]
mod pipeline_tests {
    use argot::graph::gfa::msa_to_gfa;
    use argot::graph::Graph;
    use argot::index::store::GraphStore;
    use argot::index::LshForest;
    use argot::pipeline::sketch::{GraphPruner, ReadMapper};
    use argot::pipeline::{Pipeline, BUFFER_SIZE};
    use argot::sketch::sketch_sequence;
    use crossbeam_channel::bounded;
    use tempfile::TempDir;

    /// Build a graph from an MSA, window it and index the windows.
    fn build_index(
        msa: &[(String, Vec<u8>)],
        window: usize,
        k: usize,
        sketch_size: usize,
        threshold: f64,
    ) -> (Graph, LshForest) {
        let gfa = msa_to_gfa(msa).unwrap();
        let graph = Graph::from_gfa(&gfa, 0).unwrap();
        let windows = graph.window_graph(window, k, sketch_size, true).unwrap();
        let mut forest = LshForest::new(sketch_size, threshold);
        for window in windows {
            forest.add(window).unwrap();
        }
        forest.index();
        (graph, forest)
    }

    /// A single-path graph queried with its own windows.
    #[test]
    fn single_path_graph_is_fully_covered_by_its_own_reads() {
        let msa = vec![("blaZ-1".to_string(), b"ACGTACGTACGT".to_vec())];
        let (window, k, sketch_size) = (8usize, 4usize, 16usize);
        let (mut graph, forest) = build_index(&msa, window, k, sketch_size, 0.99);

        // one read per indexed window
        let reference = graph.path_sequence(0);
        let mut hits_total = 0u64;
        for start in 0..=reference.len() - window {
            let read = &reference[start..start + window];
            let sketch = sketch_sequence(read, k, sketch_size, true, None).unwrap();
            let hits = forest.query(&sketch).unwrap();
            // the window indexed at this position shares the read's sketch,
            // so at least one hit must come back
            assert!(!hits.is_empty(), "window at {} found nothing", start);
            for hit in hits {
                let key = forest.get_key(&hit).unwrap();
                graph
                    .increment_sub_path(&key.sub_path, key.offset, read.len(), k)
                    .unwrap();
                hits_total += 1;
            }
        }

        // every hit projects exactly window - k + 1 k-mers
        assert!((graph.kmer_total - (hits_total * 5) as f64).abs() < 1e-9);
        // the reads tile the whole reference, so every base is covered
        for node in graph.nodes.iter().flatten() {
            assert_eq!(node.coverage.count_ones(), node.sequence.len());
        }
    }

    /// Two alleles diverging in the middle; reads from allele A must weight
    /// A's branch and leave B prunable.
    #[test]
    fn reads_from_one_allele_prune_the_other() {
        let prefix = b"GATTACAGGCTAACGTTCAG".to_vec();
        let suffix = b"CTGAGTTCGATACCGGTAAC".to_vec();
        // the blocks disagree at every single column, so the MSA keeps them
        // in separate branch segments
        let block_a = b"ACGGTCAAGGCTTAACGGATCCTGAAGTCC".to_vec();
        let block_b = b"TGCCAGTTCCGAATTGCCTAGGACTTCAGG".to_vec();
        let seq_a: Vec<u8> = [prefix.clone(), block_a, suffix.clone()].concat();
        let seq_b: Vec<u8> = [prefix, block_b, suffix].concat();
        let msa = vec![
            ("allele-A".to_string(), seq_a),
            ("allele-B".to_string(), seq_b),
        ];

        let (window, k, sketch_size) = (20usize, 7usize, 12usize);
        let (mut graph, forest) = build_index(&msa, window, k, sketch_size, 0.99);
        // prefix node, one branch node per allele, suffix node
        assert_eq!(graph.nodes.len(), 4);
        let branch_a = graph.node(2).unwrap().segment_id;
        let branch_b = graph.node(3).unwrap().segment_id;

        // map every window of allele A as a read
        let reference = graph.path_sequence(0);
        for start in 0..=reference.len() - window {
            let read = &reference[start..start + window];
            let sketch = sketch_sequence(read, k, sketch_size, true, None).unwrap();
            let hits = forest.query(&sketch).unwrap();
            assert!(!hits.is_empty());
            for hit in hits {
                let key = forest.get_key(&hit).unwrap();
                graph
                    .increment_sub_path(&key.sub_path, key.offset, read.len(), k)
                    .unwrap();
            }
        }

        // the divergent block of A accumulated mass; B's stayed unsupported
        let mass_a = graph.node(branch_a).unwrap().kmer_mass;
        let mass_b = graph.node(branch_b).unwrap().kmer_mass;
        assert!(mass_a > mass_b);
        assert!(mass_a / 30.0 >= 0.5);
        assert!(mass_b / 30.0 < 0.5);

        assert!(graph.prune(0.5, 0.5));
        assert_eq!(graph.surviving_path_ids(), vec![0]);
        assert_eq!(graph.path_lengths[&1], 0);
        assert!(graph.node(branch_b).is_none());
        assert!(graph.node(branch_a).is_some());
    }

    /// A bottom-k index over a reference with a homopolymer stretch: windows
    /// inside the stretch hold a single distinct canonical k-mer, so their
    /// sketches cannot fill a band. Building and mapping must both carry on.
    #[test]
    fn bottom_k_indexing_tolerates_low_complexity_windows() {
        let seq: Vec<u8> = [
            b"ACGGTCAAGGCTTAACGGAT".to_vec(),
            vec![b'A'; 30],
            b"CTGAGTTCGATACCGGTAAC".to_vec(),
        ]
        .concat();
        let msa = vec![("blaT-1".to_string(), seq)];
        let (window, k, sketch_size) = (20usize, 7usize, 12usize);

        let gfa = msa_to_gfa(&msa).unwrap();
        let mut graph = Graph::from_gfa(&gfa, 0).unwrap();
        let windows = graph.window_graph(window, k, sketch_size, false).unwrap();
        let mut forest = LshForest::new(sketch_size, 0.99);
        let mut indexed = 0u64;
        let mut skipped = 0u64;
        for window_key in windows {
            if forest.add(window_key).unwrap() {
                indexed += 1;
            } else {
                skipped += 1;
            }
        }
        // the complex flanks index; the homopolymer interior is skipped
        assert!(indexed > 0);
        assert!(skipped > 0);
        forest.index();

        // mapping every window of the reference must not abort on the
        // under-filled sketches from the homopolymer
        let reference = graph.path_sequence(0);
        let mut hits_total = 0u64;
        for start in 0..=reference.len() - window {
            let read = &reference[start..start + window];
            let sketch = sketch_sequence(read, k, sketch_size, false, None).unwrap();
            for hit in forest.query(&sketch).unwrap() {
                let key = forest.get_key(&hit).unwrap();
                graph
                    .increment_sub_path(&key.sub_path, key.offset, read.len(), k)
                    .unwrap();
                hits_total += 1;
            }
        }
        // the fully complex flank windows find their own keys
        assert!(hits_total > 0);

        // a pure homopolymer read sketches to one hash and simply misses
        let read = vec![b'A'; 20];
        let sketch = sketch_sequence(&read, k, sketch_size, false, None).unwrap();
        assert_eq!(sketch.len(), 1);
        assert!(forest.query(&sketch).unwrap().is_empty());
    }

    /// The same single-path scenario, driven through the mapping stage and
    /// pruner instead of direct calls.
    #[test]
    fn mapping_stage_projects_reads_onto_the_graphs() {
        let msa = vec![("blaZ-1".to_string(), b"ACGTACGTACGT".to_vec())];
        let (window, k, sketch_size) = (8usize, 4usize, 16usize);
        let (graph, forest) = build_index(&msa, window, k, sketch_size, 0.99);
        let reference = graph.path_sequence(0);
        let mut store = GraphStore::default();
        store.insert(0, graph);

        let (read_tx, read_rx) = bounded(BUFFER_SIZE);
        let (graph_tx, graph_rx) = bounded(BUFFER_SIZE);
        let graph_dir = TempDir::new().unwrap();

        let mut pipeline = Pipeline::new();
        pipeline.add(Box::new(ReadMapper::new(
            k, sketch_size, true, window, 2, false, forest, store, read_rx, graph_tx,
        )));
        pipeline.add(Box::new(GraphPruner::new(
            0.5,
            0.5,
            graph_dir.path().to_path_buf(),
            graph_rx,
        )));

        // feed the reads and close the channel so the pipeline can drain
        for start in 0..=reference.len() - window {
            read_tx.send(reference[start..start + window].to_vec()).unwrap();
        }
        // a read shorter than k is dropped, not fatal
        read_tx.send(b"ACG".to_vec()).unwrap();
        drop(read_tx);

        pipeline.run().unwrap();

        // the pruned, weighted graph was written out as GFA
        let written = graph_dir.path().join("argot-graph-0.gfa");
        assert!(written.is_file());
        let contents = std::fs::read_to_string(written).unwrap();
        assert!(contents.contains("KC:i:"));
        assert!(contents.contains("blaZ-1"));
    }
}
