//! Directed Graph Markup Language (DGML) model for state snapshots.

use std::fmt::Write as _;
use std::io;

use serde::Serialize;

pub type NodeId = usize;

#[derive(Debug, Clone, Serialize)]
pub struct DgmlNode {
    pub id: NodeId,
    pub label: String,
    /// Container nodes are drawn as expandable groups.
    pub is_group: bool,
    pub color: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct DgmlLink {
    pub source: NodeId,
    pub target: NodeId,
    pub label: Option<String>,
    /// Containment links connect a group node to its members.
    pub contains: bool,
}

/// In-memory DGML graph. Snapshots append to it; nothing is validated.
#[derive(Debug, Clone, Default, Serialize)]
pub struct DgmlGraph {
    pub nodes: Vec<DgmlNode>,
    pub links: Vec<DgmlLink>,
}

impl DgmlGraph {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_node(&mut self, label: impl Into<String>, color: Option<&str>) -> NodeId {
        self.push_node(label.into(), false, color)
    }

    pub fn add_group(&mut self, label: impl Into<String>, color: Option<&str>) -> NodeId {
        self.push_node(label.into(), true, color)
    }

    fn push_node(&mut self, label: String, is_group: bool, color: Option<&str>) -> NodeId {
        let id = self.nodes.len();
        self.nodes.push(DgmlNode {
            id,
            label,
            is_group,
            color: color.map(str::to_string),
        });
        id
    }

    pub fn add_link(&mut self, source: NodeId, target: NodeId, label: Option<&str>) {
        self.links.push(DgmlLink {
            source,
            target,
            label: label.map(str::to_string),
            contains: false,
        });
    }

    pub fn add_to_group(&mut self, group: NodeId, member: NodeId) {
        self.links.push(DgmlLink {
            source: group,
            target: member,
            label: None,
            contains: true,
        });
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    /// Render as a DGML document.
    pub fn to_xml(&self) -> String {
        let mut out = String::new();
        out.push_str("<?xml version=\"1.0\" encoding=\"utf-8\"?>\n");
        out.push_str("<DirectedGraph xmlns=\"http://schemas.microsoft.com/vs/2009/dgml\">\n");

        out.push_str("  <Nodes>\n");
        for node in &self.nodes {
            let _ = write!(out, "    <Node Id=\"n{}\" Label=\"{}\"", node.id, escape(&node.label));
            if node.is_group {
                out.push_str(" Group=\"Expanded\"");
            }
            if let Some(color) = &node.color {
                let _ = write!(out, " Background=\"{}\"", escape(color));
            }
            out.push_str(" />\n");
        }
        out.push_str("  </Nodes>\n");

        out.push_str("  <Links>\n");
        for link in &self.links {
            let _ = write!(out, "    <Link Source=\"n{}\" Target=\"n{}\"", link.source, link.target);
            if link.contains {
                out.push_str(" Category=\"Contains\"");
            }
            if let Some(label) = &link.label {
                let _ = write!(out, " Label=\"{}\"", escape(label));
            }
            out.push_str(" />\n");
        }
        out.push_str("  </Links>\n");

        out.push_str("</DirectedGraph>\n");
        out
    }

    pub fn write_to<W: io::Write>(&self, mut writer: W) -> io::Result<()> {
        writer.write_all(self.to_xml().as_bytes())
    }
}

fn escape(value: &str) -> String {
    let mut out = String::with_capacity(value.len());
    for c in value.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&apos;"),
            c => out.push(c),
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn xml_contains_nodes_and_links() {
        let mut graph = DgmlGraph::new();
        let g = graph.add_group("Group #0.1", Some("#FFE0E0"));
        let t = graph.add_node("physics", None);
        graph.add_to_group(g, t);
        graph.add_link(g, t, Some("runs"));

        let xml = graph.to_xml();
        assert!(xml.contains("<Node Id=\"n0\" Label=\"Group #0.1\" Group=\"Expanded\" Background=\"#FFE0E0\" />"));
        assert!(xml.contains("<Node Id=\"n1\" Label=\"physics\" />"));
        assert!(xml.contains("Category=\"Contains\""));
        assert!(xml.contains("Label=\"runs\""));
        assert!(xml.trim_end().ends_with("</DirectedGraph>"));
    }

    #[test]
    fn labels_are_escaped() {
        let mut graph = DgmlGraph::new();
        graph.add_node("a < b & \"c\"", None);
        assert!(graph.to_xml().contains("a &lt; b &amp; &quot;c&quot;"));
    }

    #[test]
    fn write_to_matches_to_xml() {
        let mut graph = DgmlGraph::new();
        graph.add_node("solo", None);
        let mut buf = Vec::new();
        graph.write_to(&mut buf).unwrap();
        assert_eq!(String::from_utf8(buf).unwrap(), graph.to_xml());
    }
}
