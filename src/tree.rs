//! Nested repository tree and its flattening.
//!
//! The tree maps path segments to either a nested folder (keys end in `/`)
//! or a file leaf. In serialized form a leaf is an object carrying
//! `"type": "file"`; anything else is a folder. Entry order is preserved in
//! both directions so flattening is deterministic.

use serde::de::{MapAccess, Visitor};
use serde::ser::SerializeMap;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::fmt;

use crate::models::FileDescriptor;

/// Ordered mapping from path segment to sub-tree or file.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RepositoryTree {
    entries: Vec<(String, TreeNode)>,
}

#[derive(Debug, Clone, PartialEq)]
pub enum TreeNode {
    Folder(RepositoryTree),
    File(FileDescriptor),
}

impl RepositoryTree {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn entries(&self) -> impl Iterator<Item = (&str, &TreeNode)> {
        self.entries.iter().map(|(k, v)| (k.as_str(), v))
    }

    /// Builds a nested tree from a flat listing, in listing order.
    ///
    /// Each intermediate folder becomes a `"<name>/"` key. A path listed
    /// twice keeps its first descriptor.
    pub fn from_files(files: impl IntoIterator<Item = FileDescriptor>) -> Self {
        let mut root = RepositoryTree::new();
        for file in files {
            let segments: Vec<String> = file.path.split('/').map(str::to_string).collect();
            let Some((leaf, folders)) = segments.split_last() else {
                continue;
            };
            let mut cursor = &mut root;
            for folder in folders {
                cursor = cursor.folder_mut(format!("{}/", folder));
            }
            if cursor.position(leaf).is_none() {
                cursor.entries.push((leaf.clone(), TreeNode::File(file)));
            }
        }
        root
    }

    fn position(&self, key: &str) -> Option<usize> {
        self.entries.iter().position(|(k, _)| k == key)
    }

    fn folder_mut(&mut self, key: String) -> &mut RepositoryTree {
        let idx = match self.position(&key) {
            Some(idx) if matches!(self.entries[idx].1, TreeNode::Folder(_)) => idx,
            _ => {
                self.entries
                    .push((key, TreeNode::Folder(RepositoryTree::new())));
                self.entries.len() - 1
            }
        };
        match &mut self.entries[idx].1 {
            TreeNode::Folder(tree) => tree,
            TreeNode::File(_) => unreachable!("index points at a folder entry"),
        }
    }

    /// Flattens the tree into descriptors annotated with their folder.
    pub fn flatten(&self) -> Vec<FileDescriptor> {
        let mut out = Vec::new();
        self.flatten_into("", &mut out);
        out
    }

    fn flatten_into(&self, parent: &str, out: &mut Vec<FileDescriptor>) {
        for (key, node) in &self.entries {
            match node {
                TreeNode::Folder(sub) => sub.flatten_into(&format!("{}{}", parent, key), out),
                TreeNode::File(file) => out.push(FileDescriptor {
                    folder: parent.to_string(),
                    ..file.clone()
                }),
            }
        }
    }

    /// Number of file leaves.
    pub fn file_count(&self) -> usize {
        self.entries
            .iter()
            .map(|(_, node)| match node {
                TreeNode::Folder(sub) => sub.file_count(),
                TreeNode::File(_) => 1,
            })
            .sum()
    }
}

// Serialized leaves carry the `type = "file"` marker.
#[derive(Serialize)]
struct LeafOut<'a> {
    path: &'a str,
    #[serde(rename = "type")]
    kind: &'static str,
    ext: &'a str,
    size_kb: f64,
    url: &'a str,
}

#[derive(Deserialize)]
struct LeafIn {
    #[serde(rename = "type")]
    #[allow(dead_code)]
    kind: LeafKind,
    path: String,
    #[serde(default)]
    ext: Option<String>,
    #[serde(default)]
    size_kb: f64,
    url: String,
}

#[derive(Deserialize)]
enum LeafKind {
    #[serde(rename = "file")]
    File,
}

#[derive(Deserialize)]
#[serde(untagged)]
enum NodeIn {
    File(LeafIn),
    Folder(RepositoryTree),
}

impl Serialize for RepositoryTree {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(self.entries.len()))?;
        for (key, node) in &self.entries {
            match node {
                TreeNode::Folder(sub) => map.serialize_entry(key, sub)?,
                TreeNode::File(f) => map.serialize_entry(
                    key,
                    &LeafOut {
                        path: &f.path,
                        kind: "file",
                        ext: &f.extension,
                        size_kb: f.size_kb,
                        url: &f.content_url,
                    },
                )?,
            }
        }
        map.end()
    }
}

struct TreeVisitor;

impl<'de> Visitor<'de> for TreeVisitor {
    type Value = RepositoryTree;

    fn expecting(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.write_str("a map of path segments to folders or file leaves")
    }

    fn visit_map<A: MapAccess<'de>>(self, mut access: A) -> Result<Self::Value, A::Error> {
        let mut entries = Vec::with_capacity(access.size_hint().unwrap_or(0));
        while let Some((key, node)) = access.next_entry::<String, NodeIn>()? {
            let node = match node {
                NodeIn::Folder(sub) => TreeNode::Folder(sub),
                NodeIn::File(leaf) => {
                    let mut file = FileDescriptor::new(leaf.path, leaf.size_kb, leaf.url);
                    if let Some(ext) = leaf.ext {
                        file.extension = ext.to_lowercase();
                    }
                    TreeNode::File(file)
                }
            };
            entries.push((key, node));
        }
        Ok(RepositoryTree { entries })
    }
}

impl<'de> Deserialize<'de> for RepositoryTree {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        deserializer.deserialize_map(TreeVisitor)
    }
}
