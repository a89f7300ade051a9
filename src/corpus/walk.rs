//! Feeding the corpus from git: resolve a ref to a tree and ingest every
//! blob under it.

use std::collections::BTreeMap;

use anyhow::{Context, Result};
use git2::{ObjectType, Repository, TreeEntry};

use super::{BlobId, CorpusBuilder};

impl CorpusBuilder {
    /// Walk the tree at `ref_name` (a ref name, short name, or hex oid),
    /// ingesting every blob under it. Top-level entries named in
    /// `order_root` (whitespace-separated) are visited first, in that
    /// order; the remaining entries follow lexicographically.
    pub fn walk_ref(&mut self, repo: &Repository, ref_name: &str, order_root: &str) -> Result<()> {
        let object = repo
            .revparse_single(ref_name)
            .with_context(|| format!("cannot resolve ref '{}'", ref_name))?;
        let commit = object
            .peel_to_commit()
            .with_context(|| format!("ref '{}' does not point at a commit", ref_name))?;
        let tree = commit.tree().context("commit has no tree")?;

        let entries: Vec<TreeEntry> = tree.iter().collect();
        let mut by_name: BTreeMap<String, usize> = entries
            .iter()
            .enumerate()
            .filter_map(|(i, e)| e.name().map(|n| (n.to_string(), i)))
            .collect();

        let mut ordered: Vec<usize> = Vec::new();
        for dir in order_root.split_whitespace() {
            if let Some(i) = by_name.remove(dir) {
                ordered.push(i);
            }
        }
        ordered.extend(by_name.into_values());

        for i in ordered {
            self.walk_entry(repo, ref_name, "", &entries[i])?;
        }
        Ok(())
    }

    fn walk_entry(
        &mut self,
        repo: &Repository,
        ref_name: &str,
        prefix: &str,
        entry: &TreeEntry,
    ) -> Result<()> {
        let Some(name) = entry.name() else {
            return Ok(()); // non-UTF-8 path
        };
        let path = format!("{}{}", prefix, name);

        match entry.kind() {
            Some(ObjectType::Tree) => {
                let obj = entry
                    .to_object(repo)
                    .with_context(|| format!("cannot load tree '{}'", path))?;
                let subtree = obj.peel_to_tree()?;
                let child_prefix = format!("{}/", path);
                for child in subtree.iter() {
                    self.walk_entry(repo, ref_name, &child_prefix, &child)?;
                }
            }
            Some(ObjectType::Blob) => {
                let obj = entry
                    .to_object(repo)
                    .with_context(|| format!("cannot load blob '{}'", path))?;
                let blob = obj.as_blob().context("object is not a blob")?;
                self.ingest_with_id(
                    BlobId::from_oid(entry.id()),
                    ref_name,
                    &path,
                    blob.content(),
                )?;
            }
            _ => {} // commits (submodules) and unknown kinds
        }
        Ok(())
    }
}
