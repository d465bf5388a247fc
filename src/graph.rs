//! Relationship Graph
//!
//! Folds edge rows into a weighted, deduplicated graph and serializes it as
//! DOT text for an external renderer.
//!
//! - node weight: number of edge rows touching the node
//! - pair multiplicity: number of edge rows sharing the same canonical pair

use std::collections::BTreeMap;
use std::fmt::Write;

use crate::events::{canonical_pair, Edge};

/// Aggregated graph, ordered by name for stable output
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SocialGraph {
    pub nodes: BTreeMap<String, usize>,
    pub pairs: BTreeMap<(String, String), usize>,
}

impl SocialGraph {
    pub fn from_edges(edges: &[Edge]) -> Self {
        let mut graph = Self::default();

        for edge in edges {
            let (a, b) = canonical_pair(&edge.pseudo_a, &edge.pseudo_b);

            *graph.nodes.entry(a.to_string()).or_insert(0) += 1;
            if a != b {
                *graph.nodes.entry(b.to_string()).or_insert(0) += 1;
            }

            *graph
                .pairs
                .entry((a.to_string(), b.to_string()))
                .or_insert(0) += 1;
        }

        graph
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    /// DOT text: one statement per node, one per distinct pair
    pub fn to_dot(&self) -> String {
        let mut out = String::from("graph {\n");

        for (name, weight) in &self.nodes {
            let _ = writeln!(
                out,
                "  {} [weight={}, label={}];",
                quote(name),
                weight,
                quote(&format!("{}\n{}", name, messages_label(*weight)))
            );
        }

        for ((a, b), count) in &self.pairs {
            let _ = writeln!(
                out,
                "  {} -- {} [weight={}, label={}];",
                quote(a),
                quote(b),
                count,
                quote(&messages_label(*count))
            );
        }

        out.push('}');
        out
    }
}

/// Serialize every edge row into DOT text
pub fn serialize(edges: &[Edge]) -> String {
    SocialGraph::from_edges(edges).to_dot()
}

fn messages_label(count: usize) -> String {
    format!("{} message(s)", count)
}

fn quote(s: &str) -> String {
    let mut quoted = String::with_capacity(s.len() + 2);
    quoted.push('"');
    for c in s.chars() {
        match c {
            '"' => quoted.push_str("\\\""),
            '\\' => quoted.push_str("\\\\"),
            '\n' => quoted.push_str("\\n"),
            _ => quoted.push(c),
        }
    }
    quoted.push('"');
    quoted
}

#[cfg(test)]
mod tests {
    use super::*;

    fn edges(pairs: &[(&str, &str)]) -> Vec<Edge> {
        pairs.iter().map(|(a, b)| Edge::new(a, b)).collect()
    }

    #[test]
    fn test_weights_and_multiplicity() {
        let graph = SocialGraph::from_edges(&edges(&[
            ("alice", "bob"),
            ("bob", "alice"),
            ("alice", "carol"),
        ]));

        assert_eq!(graph.nodes["alice"], 3);
        assert_eq!(graph.nodes["bob"], 2);
        assert_eq!(graph.nodes["carol"], 1);
        assert_eq!(graph.pairs.len(), 2);
        assert_eq!(graph.pairs[&("alice".to_string(), "bob".to_string())], 2);
    }

    #[test]
    fn test_dot_output() {
        let dot = serialize(&edges(&[("bob", "alice"), ("alice", "bob")]));

        assert_eq!(
            dot,
            concat!(
                "graph {\n",
                "  \"alice\" [weight=2, label=\"alice\\n2 message(s)\"];\n",
                "  \"bob\" [weight=2, label=\"bob\\n2 message(s)\"];\n",
                "  \"alice\" -- \"bob\" [weight=2, label=\"2 message(s)\"];\n",
                "}"
            )
        );
    }

    #[test]
    fn test_each_pair_emitted_once() {
        let dot = serialize(&edges(&[("a", "b"), ("b", "a"), ("a", "b"), ("b", "c")]));
        assert_eq!(dot.matches(" -- ").count(), 2);
        assert!(dot.contains("\"a\" -- \"b\" [weight=3"));
    }

    #[test]
    fn test_self_loop_counts_once() {
        let graph = SocialGraph::from_edges(&edges(&[("alice", "alice")]));
        assert_eq!(graph.nodes["alice"], 1);
    }

    #[test]
    fn test_empty_graph() {
        assert_eq!(serialize(&[]), "graph {\n}");
        assert!(SocialGraph::from_edges(&[]).is_empty());
    }

    #[test]
    fn test_quotes_escaped() {
        let dot = serialize(&edges(&[("we\"ird", "x\\y")]));
        assert!(dot.contains("\"we\\\"ird\""));
        assert!(dot.contains("\"x\\\\y\""));
    }
}
