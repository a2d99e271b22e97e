//! Code-point keyed trie backed by a node arena.
//!
//! Every edge is one `char`. Besides the generic string set/map operations each node carries
//! the directory metadata used by the namespace (`files`, `subdirs`), see `directory.rs`.

use std::collections::BTreeMap;

pub type NodeId = usize;

const ROOT: NodeId = 0;

#[derive(Debug, Clone)]
pub(crate) struct Node<T> {
    /// true if an inserted string terminates here
    pub(crate) leaf: bool,
    pub(crate) value: Option<T>,
    pub(crate) files: BTreeMap<String, T>,
    /// child directory base names in insertion order
    pub(crate) subdirs: Vec<String>,
    pub(crate) children: BTreeMap<char, NodeId>,
}

impl<T> Default for Node<T> {
    fn default() -> Self {
        Self {
            leaf: false,
            value: None,
            files: BTreeMap::new(),
            subdirs: Vec::new(),
            children: BTreeMap::new(),
        }
    }
}

impl<T> Node<T> {
    fn is_prunable(&self) -> bool {
        !self.leaf
            && self.value.is_none()
            && self.children.is_empty()
            && self.files.is_empty()
            && self.subdirs.is_empty()
    }
}

#[derive(Debug, Clone)]
pub struct Trie<T> {
    pub(crate) nodes: Vec<Node<T>>,
    free: Vec<NodeId>,
}

impl<T> Default for Trie<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T> Trie<T> {
    pub fn new() -> Self {
        Self {
            nodes: vec![Node::default()],
            free: Vec::new(),
        }
    }

    fn alloc(&mut self) -> NodeId {
        match self.free.pop() {
            Some(id) => {
                self.nodes[id] = Node::default();
                id
            }
            None => {
                self.nodes.push(Node::default());
                self.nodes.len() - 1
            }
        }
    }

    fn release(&mut self, id: NodeId) {
        self.nodes[id] = Node::default();
        self.free.push(id);
    }

    /// Node reached by walking `s` from the root, leaf or not. The empty string is the root.
    pub(crate) fn find(&self, s: &str) -> Option<NodeId> {
        s.chars()
            .try_fold(ROOT, |node, c| self.nodes[node].children.get(&c).copied())
    }

    /// Like `find` but only answers for nodes where an inserted string ends.
    pub(crate) fn includes(&self, s: &str) -> Option<NodeId> {
        self.find(s).filter(|&id| self.nodes[id].leaf)
    }

    /// Walks `s`, creating missing nodes, without touching the leaf flag.
    pub(crate) fn ensure_path(&mut self, s: &str) -> NodeId {
        let mut node = ROOT;
        for c in s.chars() {
            node = match self.nodes[node].children.get(&c) {
                Some(&child) => child,
                None => {
                    let child = self.alloc();
                    self.nodes[node].children.insert(c, child);
                    child
                }
            };
        }
        node
    }

    /// Inserts `s` and returns the node where it ends.
    pub(crate) fn add_runes(&mut self, s: &str) -> NodeId {
        let node = self.ensure_path(s);
        self.nodes[node].leaf = true;
        node
    }

    /// Ids of the nodes along `s`, root first. `None` if the path is not in the trie.
    fn path_ids(&self, s: &str) -> Option<Vec<(char, NodeId)>> {
        let mut ids = Vec::with_capacity(s.len());
        let mut node = ROOT;
        for c in s.chars() {
            node = *self.nodes[node].children.get(&c)?;
            ids.push((c, node));
        }
        Some(ids)
    }

    /// Removes now-empty nodes along `s`, deepest first, stopping at the first node still
    /// in use.
    pub(crate) fn prune(&mut self, s: &str) {
        let Some(ids) = self.path_ids(s) else {
            return;
        };
        for index in (0..ids.len()).rev() {
            let (c, node) = ids[index];
            if !self.nodes[node].is_prunable() {
                break;
            }
            let parent = if index == 0 { ROOT } else { ids[index - 1].1 };
            self.nodes[parent].children.remove(&c);
            self.release(node);
        }
    }

    /// Detaches the edge `c` below the node at `s`, returning the subtree it pointed to.
    /// Nodes left empty along `s` are pruned.
    pub(crate) fn detach_child(&mut self, s: &str, c: char) -> Option<NodeId> {
        let parent = self.find(s)?;
        let child = self.nodes[parent].children.remove(&c)?;
        self.prune(s);
        Some(child)
    }

    /// Hangs `subtree` below the node at `s` under edge `c`, creating the path as needed.
    /// Returns false without attaching if the edge is already taken.
    pub(crate) fn attach_child(&mut self, s: &str, c: char, subtree: NodeId) -> bool {
        let parent = self.ensure_path(s);
        if self.nodes[parent].children.contains_key(&c) {
            return false;
        }
        self.nodes[parent].children.insert(c, subtree);
        true
    }

    /// Adds a string. Already present strings are left as they are.
    pub fn add_string(&mut self, s: &str) {
        if s.is_empty() {
            return;
        }
        self.add_runes(s);
    }

    /// Adds a string with an associated value, replacing the value if the string is present.
    pub fn add_value(&mut self, s: &str, value: T) {
        if s.is_empty() {
            return;
        }
        let node = self.add_runes(s);
        self.nodes[node].value = Some(value);
    }

    /// Removes a string and its value. Returns true if the trie is empty afterwards.
    pub fn remove(&mut self, s: &str) -> bool {
        if !s.is_empty() {
            if let Some(node) = self.includes(s) {
                self.nodes[node].leaf = false;
                self.nodes[node].value = None;
                self.prune(s);
            }
        }
        self.nodes[ROOT].children.is_empty()
    }

    pub fn contains(&self, s: &str) -> bool {
        !s.is_empty() && self.includes(s).is_some()
    }

    /// `None` if the string is absent, `Some(None)` if present without a value.
    pub fn get_value(&self, s: &str) -> Option<Option<&T>> {
        if s.is_empty() {
            return None;
        }
        self.includes(s).map(|node| self.nodes[node].value.as_ref())
    }

    /// Every inserted string, sorted.
    pub fn members(&self) -> Vec<String> {
        let mut members = Vec::new();
        let mut stack = vec![(ROOT, String::new())];
        while let Some((node, prefix)) = stack.pop() {
            if self.nodes[node].leaf {
                members.push(prefix.clone());
            }
            for (&c, &child) in &self.nodes[node].children {
                let mut next = prefix.clone();
                next.push(c);
                stack.push((child, next));
            }
        }
        members.sort();
        members
    }

    /// Number of nodes reachable from the root, the root itself excluded.
    pub fn size(&self) -> usize {
        let mut count = 0;
        let mut stack = vec![ROOT];
        while let Some(node) = stack.pop() {
            count += self.nodes[node].children.len();
            stack.extend(self.nodes[node].children.values().copied());
        }
        count
    }

    /// Every inserted string that is a prefix of `s`, shortest first.
    pub fn all_substrings(&self, s: &str) -> Vec<String> {
        self.all_substrings_and_values(s)
            .into_iter()
            .map(|(prefix, _)| prefix)
            .collect()
    }

    /// Like `all_substrings`, paired with each prefix's value.
    pub fn all_substrings_and_values(&self, s: &str) -> Vec<(String, Option<&T>)> {
        let mut found = Vec::new();
        let mut node = ROOT;
        for (pos, c) in s.char_indices() {
            let Some(&child) = self.nodes[node].children.get(&c) else {
                break;
            };
            if self.nodes[child].leaf {
                found.push((
                    s[..pos + c.len_utf8()].to_owned(),
                    self.nodes[child].value.as_ref(),
                ));
            }
            node = child;
        }
        found
    }
}
