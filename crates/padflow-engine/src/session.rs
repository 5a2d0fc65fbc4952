//! Editor session protocol
//!
//! An editor talks to one [`EditorSession`] over a duplex channel. Every
//! request is answered with exactly one response; structural requests
//! answer with the full graph so the editor never has to patch its copy.

use serde::{Deserialize, Serialize};
use tokio::io::{AsyncBufRead, AsyncBufReadExt, AsyncWrite, AsyncWriteExt};
use tokio::sync::mpsc;

use crate::edit::GraphEdit;
use crate::error::Result;
use crate::graph::{Graph, GraphNote};
use crate::registry::LibraryEntry;
use crate::snapshot::GraphSnapshot;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum EditorRequest {
    GetNodeLibrary,
    LoadFromSnapshot { graph: GraphSnapshot },
    Edit { edit: GraphEdit },
    Undo,
    Redo,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum EditorResponse {
    FullGraph {
        graph: GraphSnapshot,
        notes: Vec<GraphNote>,
        can_undo: bool,
        can_redo: bool,
    },
    NodeLibrary {
        nodes: Vec<LibraryEntry>,
        subgraphs: Vec<String>,
    },
    Error {
        message: String,
        /// The graph refused the request and is unchanged
        rejected: bool,
    },
}

pub struct EditorSession {
    graph: Graph,
}

impl EditorSession {
    pub fn new(graph: Graph) -> Self {
        Self { graph }
    }

    pub fn graph(&self) -> &Graph {
        &self.graph
    }

    pub fn into_graph(self) -> Graph {
        self.graph
    }

    /// Answer one request
    pub fn handle(&mut self, request: EditorRequest) -> EditorResponse {
        let result = match request {
            EditorRequest::GetNodeLibrary => return self.node_library(),
            EditorRequest::LoadFromSnapshot { graph } => self.graph.load_from_snapshot(&graph).map(|_| ()),
            EditorRequest::Edit { edit } => self.graph.apply_edit(edit).map(|_| ()),
            EditorRequest::Undo => self.graph.undo().map(|_| ()),
            EditorRequest::Redo => self.graph.redo().map(|_| ()),
        };

        match result {
            Ok(()) => self.full_graph(),
            Err(e) => EditorResponse::Error {
                rejected: e.is_rejection(),
                message: e.to_string(),
            },
        }
    }

    /// Serve requests from `requests` until either side closes
    pub async fn serve(
        &mut self,
        mut requests: mpsc::Receiver<EditorRequest>,
        responses: mpsc::Sender<EditorResponse>,
    ) {
        while let Some(request) = requests.recv().await {
            let response = self.handle(request);
            if responses.send(response).await.is_err() {
                log::debug!("Editor disconnected");
                break;
            }
        }
    }

    /// Serve newline-delimited JSON requests, writing one JSON response per line
    pub async fn serve_json_lines<R, W>(&mut self, reader: R, mut writer: W) -> Result<()>
    where
        R: AsyncBufRead + Unpin,
        W: AsyncWrite + Unpin,
    {
        let mut lines = reader.lines();
        while let Some(line) = lines.next_line().await? {
            if line.trim().is_empty() {
                continue;
            }
            let response = match serde_json::from_str::<EditorRequest>(&line) {
                Ok(request) => self.handle(request),
                Err(e) => {
                    log::warn!("Malformed editor request: {}", e);
                    EditorResponse::Error {
                        message: format!("malformed request: {}", e),
                        rejected: false,
                    }
                }
            };

            let mut encoded = serde_json::to_vec(&response)?;
            encoded.push(b'\n');
            writer.write_all(&encoded).await?;
            writer.flush().await?;
        }
        Ok(())
    }

    fn full_graph(&self) -> EditorResponse {
        EditorResponse::FullGraph {
            graph: self.graph.to_snapshot(),
            notes: self.graph.notes(),
            can_undo: self.graph.can_undo(),
            can_redo: self.graph.can_redo(),
        }
    }

    fn node_library(&self) -> EditorResponse {
        let library = self.graph.library();
        EditorResponse::NodeLibrary {
            nodes: library.entries(),
            subgraphs: library
                .subgraph_repository()
                .map(|repository| repository.list())
                .unwrap_or_default(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing;
    use serde_json::json;

    #[test]
    fn test_edit_returns_full_graph() {
        let mut session = EditorSession::new(testing::graph());
        let response = session.handle(EditorRequest::Edit {
            edit: GraphEdit::insert("a", "Constant"),
        });

        match response {
            EditorResponse::FullGraph { graph, can_undo, .. } => {
                assert_eq!(graph.nodes.len(), 1);
                assert!(can_undo);
            }
            other => panic!("unexpected response {:?}", other),
        }
    }

    #[test]
    fn test_rejection_is_flagged() {
        let mut session = EditorSession::new(testing::graph());
        session.handle(EditorRequest::Edit {
            edit: GraphEdit::insert("a", "Constant"),
        });
        session.handle(EditorRequest::Edit {
            edit: GraphEdit::insert("t", "Text"),
        });

        let response = session.handle(EditorRequest::Edit {
            edit: GraphEdit::connect("a", "value", "t", "input"),
        });
        assert!(matches!(response, EditorResponse::Error { rejected: true, .. }));
        assert_eq!(session.graph().to_snapshot().links(), Vec::new());
    }

    #[test]
    fn test_node_library_lists_types() {
        let mut session = EditorSession::new(testing::graph());
        match session.handle(EditorRequest::GetNodeLibrary) {
            EditorResponse::NodeLibrary { nodes, subgraphs } => {
                assert!(nodes.iter().any(|n| n.node_type == "Relay"));
                assert!(subgraphs.is_empty());
            }
            other => panic!("unexpected response {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_channel_session() {
        let (request_tx, request_rx) = mpsc::channel(4);
        let (response_tx, mut response_rx) = mpsc::channel(4);
        let mut session = EditorSession::new(testing::graph());

        request_tx
            .send(EditorRequest::Edit {
                edit: GraphEdit::insert("r", "Relay"),
            })
            .await
            .unwrap();
        request_tx.send(EditorRequest::Undo).await.unwrap();
        drop(request_tx);

        session.serve(request_rx, response_tx).await;

        assert!(matches!(
            response_rx.recv().await,
            Some(EditorResponse::FullGraph { .. })
        ));
        match response_rx.recv().await {
            Some(EditorResponse::FullGraph { graph, can_redo, .. }) => {
                assert!(graph.nodes.is_empty());
                assert!(can_redo);
            }
            other => panic!("unexpected response {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_json_lines() {
        let input = concat!(
            r#"{"type": "edit", "edit": {"type": "insert_node", "id": "a", "node_type": "Constant"}}"#,
            "\n",
            "not json\n",
            r#"{"type": "get_node_library"}"#,
            "\n"
        );
        let mut output = Vec::new();
        let mut session = EditorSession::new(testing::graph());
        session
            .serve_json_lines(input.as_bytes(), &mut output)
            .await
            .unwrap();

        let responses: Vec<serde_json::Value> = String::from_utf8(output)
            .unwrap()
            .lines()
            .map(|line| serde_json::from_str(line).unwrap())
            .collect();
        assert_eq!(responses.len(), 3);
        assert_eq!(responses[0]["type"], json!("full_graph"));
        assert_eq!(responses[1]["type"], json!("error"));
        assert_eq!(responses[1]["rejected"], json!(false));
        assert_eq!(responses[2]["type"], json!("node_library"));
    }
}
