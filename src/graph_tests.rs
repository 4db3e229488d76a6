// Copyright (c) 2025 Erick Bourgeois, firestoned
// SPDX-License-Identifier: MIT

//! Unit tests for `graph.rs`

#[cfg(test)]
mod tests {
    use crate::errors::GraphError;
    use crate::graph::DependencyGraph;

    fn build(vertices: &[(&str, &[&str])]) -> DependencyGraph {
        let mut graph = DependencyGraph::new();
        for (name, _) in vertices {
            graph.add_vertex(name).unwrap();
        }
        for (name, deps) in vertices {
            for dep in *deps {
                graph.add_edge(name, dep).unwrap();
            }
        }
        graph
    }

    #[test]
    fn test_sort_is_deterministic() {
        let graph = build(&[
            ("a", &["c"]),
            ("b", &[]),
            ("c", &["b"]),
            ("d", &["e"]),
            ("e", &[]),
        ]);

        let expected = vec!["b", "c", "a", "e", "d"];
        for _ in 0..10 {
            assert_eq!(graph.topological_sort().unwrap(), expected);
        }
    }

    #[test]
    fn test_independent_vertices_keep_insertion_order() {
        let graph = build(&[("z", &[]), ("y", &[]), ("x", &[])]);
        assert_eq!(graph.topological_sort().unwrap(), vec!["z", "y", "x"]);
    }

    #[test]
    fn test_diamond_emits_shared_dependency_once() {
        let graph = build(&[
            ("app", &["left", "right"]),
            ("left", &["base"]),
            ("right", &["base"]),
            ("base", &[]),
        ]);
        assert_eq!(
            graph.topological_sort().unwrap(),
            vec!["base", "left", "right", "app"]
        );
    }

    #[test]
    fn test_dependencies_precede_dependents() {
        let edges: &[(&str, &[&str])] = &[
            ("web", &["db", "cache"]),
            ("worker", &["queue", "db"]),
            ("db", &["secret"]),
            ("cache", &[]),
            ("queue", &["secret"]),
            ("secret", &[]),
        ];
        let order = build(edges).topological_sort().unwrap();
        let pos = |n: &str| order.iter().position(|v| v == n).unwrap();

        for (name, deps) in edges {
            for dep in *deps {
                assert!(pos(dep) < pos(name), "{dep} must precede {name}");
            }
        }
    }

    #[test]
    fn test_self_cycle() {
        let graph = build(&[("a", &["a"])]);
        assert_eq!(
            graph.topological_sort(),
            Err(GraphError::CycleDetected {
                path: vec!["a".into(), "a".into()]
            })
        );
    }

    #[test]
    fn test_two_cycle() {
        let graph = build(&[("a", &["b"]), ("b", &["a"])]);
        assert_eq!(
            graph.topological_sort(),
            Err(GraphError::CycleDetected {
                path: vec!["a".into(), "b".into(), "a".into()]
            })
        );
    }

    #[test]
    fn test_long_cycle_reports_only_cycle_members() {
        let graph = build(&[
            ("entry", &["a"]),
            ("a", &["b"]),
            ("b", &["c"]),
            ("c", &["d"]),
            ("d", &["b"]),
        ]);
        assert_eq!(
            graph.topological_sort(),
            Err(GraphError::CycleDetected {
                path: vec!["b".into(), "c".into(), "d".into(), "b".into()]
            })
        );
    }

    #[test]
    fn test_duplicate_vertex_rejected() {
        let mut graph = DependencyGraph::new();
        graph.add_vertex("a").unwrap();
        assert_eq!(
            graph.add_vertex("a"),
            Err(GraphError::DuplicateVertex("a".into()))
        );
        assert_eq!(graph.len(), 1);
    }

    #[test]
    fn test_edge_to_unknown_vertex_rejected() {
        let mut graph = DependencyGraph::new();
        graph.add_vertex("a").unwrap();
        assert_eq!(
            graph.add_edge("a", "missing"),
            Err(GraphError::UnknownVertex("missing".into()))
        );
        assert_eq!(
            graph.add_edge("missing", "a"),
            Err(GraphError::UnknownVertex("missing".into()))
        );
    }

    #[test]
    fn test_duplicate_edge_is_ignored() {
        let mut graph = build(&[("a", &["b"]), ("b", &[])]);
        graph.add_edge("a", "b").unwrap();
        assert_eq!(graph.topological_sort().unwrap(), vec!["b", "a"]);
    }

    #[test]
    fn test_empty_graph() {
        let graph = DependencyGraph::new();
        assert!(graph.is_empty());
        assert!(graph.topological_sort().unwrap().is_empty());
    }
}
