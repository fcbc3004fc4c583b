//! In-memory remote filesystem the simulated peer answers requests
//! against. Paths are plain strings in the same "VOL:dir/name" shape
//! `FPATH` returns on the wire; there is no separate inode layer.

use std::collections::HashMap;

#[derive(Debug, Clone)]
pub enum Node {
    File(Vec<u8>),
    Dir(Vec<String>),
    Link(String),
}

pub struct SimFs {
    root: String,
    nodes: HashMap<String, Node>,
}

impl SimFs {
    /// A fresh volume with nothing but an empty root directory.
    pub fn new(volume_name: &str) -> Self {
        let root = format!("{volume_name}:");
        let mut nodes = HashMap::new();
        nodes.insert(root.clone(), Node::Dir(Vec::new()));
        Self { root, nodes }
    }

    pub fn root(&self) -> &str {
        &self.root
    }

    fn split(path: &str) -> (String, String) {
        if let Some(idx) = path.rfind('/') {
            (path[..idx].to_string(), path[idx + 1..].to_string())
        } else {
            let colon = path.find(':').expect("every path carries a volume prefix");
            (path[..=colon].to_string(), path[colon + 1..].to_string())
        }
    }

    fn link_child(&mut self, path: &str) {
        let (parent, name) = Self::split(path);
        if let Some(Node::Dir(children)) = self.nodes.get_mut(&parent) {
            if !children.iter().any(|c| c == &name) {
                children.push(name);
            }
        }
    }

    fn unlink_child(&mut self, path: &str) {
        let (parent, name) = Self::split(path);
        if let Some(Node::Dir(children)) = self.nodes.get_mut(&parent) {
            children.retain(|c| c != &name);
        }
    }

    pub fn mkdir(&mut self, path: &str) {
        self.nodes.insert(path.to_string(), Node::Dir(Vec::new()));
        self.link_child(path);
    }

    pub fn write_file(&mut self, path: &str, data: &[u8]) {
        self.nodes.insert(path.to_string(), Node::File(data.to_vec()));
        self.link_child(path);
    }

    pub fn symlink(&mut self, path: &str, target: &str) {
        self.nodes.insert(path.to_string(), Node::Link(target.to_string()));
        self.link_child(path);
    }

    pub fn exists(&self, path: &str) -> bool {
        self.nodes.contains_key(path)
    }

    pub fn read_file(&self, path: &str) -> Option<&[u8]> {
        match self.nodes.get(path) {
            Some(Node::File(data)) => Some(data),
            _ => None,
        }
    }

    pub(crate) fn node(&self, path: &str) -> Option<&Node> {
        self.nodes.get(path)
    }

    pub(crate) fn node_mut(&mut self, path: &str) -> Option<&mut Node> {
        self.nodes.get_mut(path)
    }

    pub(crate) fn create(&mut self, path: &str, node: Node) {
        self.nodes.insert(path.to_string(), node);
        self.link_child(path);
    }

    pub(crate) fn remove(&mut self, path: &str) -> Option<Node> {
        let removed = self.nodes.remove(path);
        if removed.is_some() {
            self.unlink_child(path);
        }
        removed
    }

    /// `false` when `new_path` is already occupied; the rename is not
    /// performed in that case.
    pub(crate) fn rename(&mut self, old_path: &str, new_path: &str) -> bool {
        if self.nodes.contains_key(new_path) {
            return false;
        }
        let Some(node) = self.nodes.remove(old_path) else {
            return false;
        };
        self.unlink_child(old_path);
        self.nodes.insert(new_path.to_string(), node);
        self.link_child(new_path);
        true
    }

    pub(crate) fn children(&self, path: &str) -> Vec<String> {
        match self.nodes.get(path) {
            Some(Node::Dir(children)) => children.clone(),
            _ => Vec::new(),
        }
    }

    /// Join a parent path with a request `name`, honoring an absolute
    /// (`"Vol:..."`) override and an empty name meaning "reopen the
    /// same object".
    pub(crate) fn resolve(&self, parent_path: &str, name: &str) -> String {
        if name.is_empty() {
            return parent_path.to_string();
        }
        if name.contains(':') {
            return name.to_string();
        }
        if parent_path.ends_with(':') {
            format!("{parent_path}{name}")
        } else {
            format!("{parent_path}/{name}")
        }
    }
}
