#[cfg(test)]
mod em_tests {
    use argot::graph::em::{resolve_haplotypes, EmOptions, EmResult};
    use argot::graph::gfa::Gfa;
    use argot::graph::Graph;

    fn options() -> EmOptions {
        EmOptions {
            min_iterations: 50,
            max_iterations: 10_000,
            abundance_cutoff: 0.05,
        }
    }

    fn set_mass(graph: &mut Graph, segment: u64, mass: f64) {
        let slot = graph.node_lookup[&segment];
        graph.nodes[slot].as_mut().unwrap().kmer_mass = mass;
    }

    /// Two paths with no shared nodes.
    fn disjoint_graph() -> Graph {
        let text = "\
S\t1\tACGT
S\t2\tCCCC
S\t3\tGGGG
S\t4\tTTTT
L\t1\t+\t2\t+\t0M
L\t3\t+\t4\t+\t0M
P\tallele-A\t1+,2+\t4M,4M
P\tallele-B\t3+,4+\t4M,4M
";
        Graph::from_gfa(&Gfa::parse(text.as_bytes()).unwrap(), 0).unwrap()
    }

    /// Two paths sharing one node: A = [1, 2], B = [3, 2].
    fn shared_node_graph() -> Graph {
        let text = "\
S\t1\tAAAA
S\t2\tCCCC
S\t3\tGGGG
L\t1\t+\t2\t+\t0M
L\t3\t+\t2\t+\t0M
P\tallele-A\t1+,2+\t4M,4M
P\tallele-B\t3+,2+\t4M,4M
";
        Graph::from_gfa(&Gfa::parse(text.as_bytes()).unwrap(), 0).unwrap()
    }

    fn called(result: &EmResult, name: &str) -> f64 {
        result
            .calls
            .iter()
            .find(|c| c.name == name)
            .map(|c| c.abundance)
            .unwrap_or(0.0)
    }

    #[test]
    fn recovers_a_synthetic_mixture() {
        // inject masses for a 0.7 / 0.3 mixture over two disjoint paths
        let mut graph = disjoint_graph();
        set_mass(&mut graph, 1, 350.0);
        set_mass(&mut graph, 2, 350.0);
        set_mass(&mut graph, 3, 150.0);
        set_mass(&mut graph, 4, 150.0);
        graph.kmer_total = 1000.0;

        let result = resolve_haplotypes(&graph, graph.kmer_total, &options());
        assert_eq!(result.calls.len(), 2);
        assert!((called(&result, "allele-A") - 0.7).abs() <= 0.02);
        assert!((called(&result, "allele-B") - 0.3).abs() <= 0.02);
        // the dominant path is reported first
        assert_eq!(result.calls[0].name, "allele-A");
    }

    #[test]
    fn abundances_sum_to_one() {
        let mut graph = shared_node_graph();
        set_mass(&mut graph, 1, 590.5611);
        set_mass(&mut graph, 2, 200.0);
        set_mass(&mut graph, 3, 209.4389);
        graph.kmer_total = 1000.0;

        let result = resolve_haplotypes(&graph, graph.kmer_total, &options());
        let total: f64 = result.calls.iter().map(|c| c.abundance).sum();
        assert!((total - 1.0).abs() < 1e-9);
    }

    #[test]
    fn shared_mass_is_split_by_the_unique_evidence() {
        // these masses are self-consistent with a 0.7 / 0.3 mixture where
        // 200 of the 1000 k-mers sit on the shared node
        let mut graph = shared_node_graph();
        set_mass(&mut graph, 1, 590.5611);
        set_mass(&mut graph, 2, 200.0);
        set_mass(&mut graph, 3, 209.4389);
        graph.kmer_total = 1000.0;

        let result = resolve_haplotypes(&graph, graph.kmer_total, &options());
        assert_eq!(result.calls.len(), 2);
        assert!((called(&result, "allele-A") - 0.7).abs() <= 0.02);
        assert!((called(&result, "allele-B") - 0.3).abs() <= 0.02);
    }

    #[test]
    fn sub_cutoff_paths_are_dropped_and_survivors_renormalised() {
        let mut graph = disjoint_graph();
        set_mass(&mut graph, 1, 490.0);
        set_mass(&mut graph, 2, 490.0);
        set_mass(&mut graph, 3, 10.0);
        set_mass(&mut graph, 4, 10.0);
        graph.kmer_total = 1000.0;

        let result = resolve_haplotypes(&graph, graph.kmer_total, &options());
        assert_eq!(result.calls.len(), 1);
        assert_eq!(result.calls[0].name, "allele-A");
        assert!((result.calls[0].abundance - 1.0).abs() < 1e-9);
    }

    #[test]
    fn a_graph_with_no_surviving_paths_yields_no_calls() {
        let mut graph = disjoint_graph();
        for length in graph.path_lengths.values_mut() {
            *length = 0;
        }
        let result = resolve_haplotypes(&graph, graph.kmer_total, &options());
        assert!(result.calls.is_empty());
    }

    #[test]
    fn convergence_failure_returns_the_last_iterate() {
        // a single iteration cannot converge, but the result is still usable
        let mut graph = disjoint_graph();
        set_mass(&mut graph, 1, 350.0);
        set_mass(&mut graph, 2, 350.0);
        set_mass(&mut graph, 3, 150.0);
        set_mass(&mut graph, 4, 150.0);
        graph.kmer_total = 1000.0;

        let opts = EmOptions {
            min_iterations: 1,
            max_iterations: 1,
            abundance_cutoff: 0.05,
        };
        let result = resolve_haplotypes(&graph, graph.kmer_total, &opts);
        assert_eq!(result.iterations, 1);
        assert_eq!(result.calls.len(), 2);
    }
}
