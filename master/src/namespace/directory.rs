//! Directory and file operations over the trie.
//!
//! A directory lives on the node reached by its path with a trailing `/`, so the file
//! `/a/b` (an entry in the `files` map of `/a/`) never collides with the directory `/a/b/`.

use std::collections::BTreeMap;

use utilities::error::FsError;
use utilities::logger::trace;

use super::path::{self, ROOT};
use super::trie::{NodeId, Trie};

impl<T> Trie<T> {
    fn dir_node(&self, key: &str) -> Option<NodeId> {
        self.includes(key)
    }

    fn parent_dir(&self, parent_key: &str) -> Result<NodeId, FsError> {
        self.dir_node(parent_key)
            .ok_or_else(|| FsError::NotFound(format!("directory {parent_key} does not exist")))
    }

    pub fn has_root(&self) -> bool {
        self.dir_node(ROOT).is_some()
    }

    pub fn is_dir(&self, path: &str) -> bool {
        path::dir_key(path)
            .map(|key| self.dir_node(&key).is_some())
            .unwrap_or(false)
    }

    pub fn is_file(&self, path: &str) -> bool {
        self.get_file(path).is_ok()
    }

    /// Creates one directory. The root has to be created first, and only once.
    pub fn add_dir(&mut self, dir_path: &str) -> Result<(), FsError> {
        let key = path::dir_key(dir_path)?;
        if self.dir_node(&key).is_some() {
            return Err(FsError::AlreadyExists(format!("directory {key} already exists")));
        }
        if key == ROOT {
            self.add_runes(ROOT);
            return Ok(());
        }
        let (parent_key, name) = path::split(dir_path)?;
        let parent = self.parent_dir(&parent_key)?;
        if self.nodes[parent].files.contains_key(&name) {
            return Err(FsError::AlreadyExists(format!(
                "{parent_key}{name} already exists as a file"
            )));
        }
        trace!(%parent_key, %name, "adding directory");
        self.add_runes(&key);
        self.nodes[parent].subdirs.push(name);
        Ok(())
    }

    /// Removes an empty, non-root directory.
    pub fn remove_dir(&mut self, dir_path: &str) -> Result<(), FsError> {
        let key = path::dir_key(dir_path)?;
        if key == ROOT {
            return Err(FsError::BadPath("cannot remove the root directory".to_owned()));
        }
        let node = self
            .dir_node(&key)
            .ok_or_else(|| FsError::NotFound(format!("directory {key} does not exist")))?;
        if !self.nodes[node].subdirs.is_empty() || !self.nodes[node].files.is_empty() {
            return Err(FsError::NotEmpty(format!("directory {key} is not empty")));
        }
        let (parent_key, name) = path::split(dir_path)?;
        let parent = self.parent_dir(&parent_key)?;
        self.remove(&key);
        self.nodes[parent].subdirs.retain(|subdir| *subdir != name);
        Ok(())
    }

    /// Re-parents the directory subtree at `old_path` to `new_path`. Every check runs before
    /// anything is mutated.
    pub fn move_dir(&mut self, old_path: &str, new_path: &str) -> Result<(), FsError> {
        let old_key = path::dir_key(old_path)?;
        let new_key = path::dir_key(new_path)?;
        if old_key == ROOT || new_key == ROOT {
            return Err(FsError::BadPath("cannot move the root directory".to_owned()));
        }
        if self.dir_node(&new_key).is_some() {
            return Err(FsError::AlreadyExists(format!("directory {new_key} already exists")));
        }
        if self.dir_node(&old_key).is_none() {
            return Err(FsError::NotFound(format!("directory {old_key} does not exist")));
        }
        if new_key.starts_with(&old_key) {
            return Err(FsError::BadPath(format!(
                "cannot move {old_key} inside itself"
            )));
        }
        let (old_parent_key, old_name) = path::split(old_path)?;
        let (new_parent_key, new_name) = path::split(new_path)?;
        let old_parent = self.parent_dir(&old_parent_key)?;
        let new_parent = self.parent_dir(&new_parent_key)?;
        if self.nodes[new_parent].files.contains_key(&new_name) {
            return Err(FsError::AlreadyExists(format!(
                "{new_parent_key}{new_name} already exists as a file"
            )));
        }

        let old_stem = &old_key[..old_key.len() - 1];
        let new_stem = &new_key[..new_key.len() - 1];
        let subtree = self.detach_child(old_stem, '/').ok_or_else(|| {
            FsError::Internal(format!("directory {old_key} vanished while moving"))
        })?;
        if !self.attach_child(new_stem, '/', subtree) {
            return Err(FsError::Internal(format!(
                "edge below {new_stem} taken while moving"
            )));
        }
        self.nodes[old_parent].subdirs.retain(|subdir| *subdir != old_name);
        self.nodes[new_parent].subdirs.push(new_name);
        Ok(())
    }

    pub fn add_file(&mut self, file_path: &str, file: T) -> Result<(), FsError> {
        let (dir_key, name) = path::split_file(file_path)?;
        let dir = self.parent_dir(&dir_key)?;
        let node = &mut self.nodes[dir];
        if node.files.contains_key(&name) || node.subdirs.contains(&name) {
            return Err(FsError::AlreadyExists(format!("{file_path} already exists")));
        }
        node.files.insert(name, file);
        Ok(())
    }

    /// Removes a file entry and hands back what was stored under it.
    pub fn delete_file(&mut self, file_path: &str) -> Result<T, FsError> {
        let (dir_key, name) = path::split_file(file_path)?;
        let dir = self.parent_dir(&dir_key)?;
        self.nodes[dir]
            .files
            .remove(&name)
            .ok_or_else(|| FsError::NotFound(format!("file {file_path} does not exist")))
    }

    pub fn get_file(&self, file_path: &str) -> Result<&T, FsError> {
        self.query_file(file_path)?
            .ok_or_else(|| FsError::NotFound(format!("file {file_path} does not exist")))
    }

    pub fn get_file_mut(&mut self, file_path: &str) -> Result<&mut T, FsError> {
        let (dir_key, name) = path::split_file(file_path)?;
        let dir = self.parent_dir(&dir_key)?;
        self.nodes[dir]
            .files
            .get_mut(&name)
            .ok_or_else(|| FsError::NotFound(format!("file {file_path} does not exist")))
    }

    /// `Err(NotFound)` when the directory is missing, `Ok(None)` when only the file is.
    pub fn query_file(&self, file_path: &str) -> Result<Option<&T>, FsError> {
        let (dir_key, name) = path::split_file(file_path)?;
        let dir = self.parent_dir(&dir_key)?;
        Ok(self.nodes[dir].files.get(&name))
    }

    /// Moves a file entry to a new path in an existing directory.
    pub fn move_file(&mut self, old_path: &str, new_path: &str) -> Result<(), FsError> {
        let (new_dir_key, new_name) = path::split_file(new_path)?;
        let new_dir = self.parent_dir(&new_dir_key)?;
        if self.nodes[new_dir].files.contains_key(&new_name)
            || self.nodes[new_dir].subdirs.contains(&new_name)
        {
            return Err(FsError::AlreadyExists(format!("{new_path} already exists")));
        }
        let file = self.delete_file(old_path)?;
        self.nodes[new_dir].files.insert(new_name, file);
        Ok(())
    }

    /// Subdirectory names (insertion order) and the file map of a directory.
    pub fn read_dir(&self, dir_path: &str) -> Result<(&[String], &BTreeMap<String, T>), FsError> {
        let key = path::dir_key(dir_path)?;
        let node = self
            .dir_node(&key)
            .ok_or_else(|| FsError::NotFound(format!("directory {key} does not exist")))?;
        Ok((&self.nodes[node].subdirs, &self.nodes[node].files))
    }

    /// Every file in the tree with its full path, walking directories depth first.
    pub fn files(&self) -> Vec<(String, &T)> {
        let mut found = Vec::new();
        if !self.has_root() {
            return found;
        }
        let mut stack = vec![ROOT.to_owned()];
        while let Some(key) = stack.pop() {
            let Ok((subdirs, files)) = self.read_dir(&key) else {
                continue;
            };
            for (name, file) in files {
                found.push((format!("{key}{name}"), file));
            }
            for subdir in subdirs {
                stack.push(format!("{key}{subdir}/"));
            }
        }
        found
    }
}
