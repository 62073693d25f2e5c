/**
 * The filesystem handle.
 * Binds the public tree, the private tree and its forest, and
 *  the root header that links them, over one block store. All
 *  mutations run through here: resolve the path into the right
 *  subtree, rewrite its spine, then commit a new root header
 *  whose `previous` points at the superseded root.
 * A handle is not safe for concurrent mutation; read-only calls
 *  against a committed root may run in parallel. Dropping a
 *  mutation future mid-flight strands orphan blocks at worst —
 *  the externally persisted root only changes at commit.
 */
mod external;
mod local;

use bytes::Bytes;
use serde::{Deserialize, Serialize};

use crate::crypto::Namefilter;
use crate::error::FsError;
use crate::history::{private_history, public_history, HistoryEntry, HISTORY_HORIZON};
use crate::linked_data::{BlockEncoded, Cid, Link};
use crate::merge::{
    classify, merge_private, merge_public, ConflictPolicy, MergeResult, MergeType, SyncStatus,
    MERGE_SEARCH_HORIZON,
};
use crate::node::{FileInput, Metadata, Node, Path, PRIVATE_ROOT, PUBLIC_ROOT};
use crate::private::{PrivateForest, PrivateLink, PrivateNode, PrivateTree};
use crate::public::{PublicNode, PublicTree};
use crate::store::BlockStore;

pub use external::RootState;
pub use local::{LocalEntry, LocalFs, OsFs};

/// Options accepted by every mutation. With `commit` unset, new spine
/// nodes get locally computed CIDs but are not persisted.
#[derive(Debug, Clone, Copy)]
pub struct MutationOptions {
    pub commit: bool,
}

impl Default for MutationOptions {
    fn default() -> Self {
        MutationOptions { commit: true }
    }
}

/// A resolved node from either subtree.
#[derive(Debug, Clone)]
pub enum NodeRef {
    Public(PublicNode),
    Private(PrivateNode),
}

impl NodeRef {
    pub fn is_file(&self) -> bool {
        match self {
            NodeRef::Public(node) => node.metadata().is_file,
            NodeRef::Private(node) => node.metadata().is_file,
        }
    }

    pub fn as_public(&self) -> Option<&PublicNode> {
        match self {
            NodeRef::Public(node) => Some(node),
            NodeRef::Private(_) => None,
        }
    }

    pub fn as_private(&self) -> Option<&PrivateNode> {
        match self {
            NodeRef::Private(node) => Some(node),
            NodeRef::Public(_) => None,
        }
    }
}

impl Node for NodeRef {
    fn cid(&self) -> Option<Cid> {
        match self {
            NodeRef::Public(node) => node.cid(),
            NodeRef::Private(node) => node.cid(),
        }
    }

    fn name(&self) -> &str {
        match self {
            NodeRef::Public(node) => node.name(),
            NodeRef::Private(node) => node.name(),
        }
    }

    fn metadata(&self) -> &Metadata {
        match self {
            NodeRef::Public(node) => node.metadata(),
            NodeRef::Private(node) => node.metadata(),
        }
    }

    fn previous(&self) -> Option<Cid> {
        match self {
            NodeRef::Public(node) => node.previous(),
            NodeRef::Private(node) => node.previous(),
        }
    }

    fn size(&self) -> u64 {
        match self {
            NodeRef::Public(node) => node.size(),
            NodeRef::Private(node) => node.size(),
        }
    }
}

/// The top-level node: links the public tree and the private forest,
/// and chains root versions through `previous`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
struct RootHeader {
    metadata: Cid,
    previous: Option<Cid>,
    merge: Option<Cid>,
    height: u64,
    public: Link,
    private: Cid,
    size: u64,
}

impl BlockEncoded for RootHeader {}

pub struct FileSystem {
    store: BlockStore,
    cid: Option<Cid>,
    previous: Option<Cid>,
    merge: Option<Cid>,
    metadata: Metadata,
    height: u64,
    public: PublicTree,
    private: PrivateTree,
    forest: PrivateForest,
}

impl FileSystem {
    /// Create and commit an empty filesystem
    pub async fn init(store: BlockStore) -> Result<Self, FsError> {
        let mut public = PublicTree::new(store.clone(), PUBLIC_ROOT);
        public.put(true).await?;

        let mut forest = PrivateForest::new(store.clone());
        let mut private = PrivateTree::new(store.clone(), PRIVATE_ROOT, &Namefilter::empty());
        private.put(&mut forest, true).await?;

        let mut fs = FileSystem {
            store,
            cid: None,
            previous: None,
            merge: None,
            metadata: Metadata::new_dir(),
            height: 0,
            public,
            private,
            forest,
        };
        fs.commit_root(true).await?;
        tracing::debug!("initialized filesystem at {:?}", fs.cid);
        Ok(fs)
    }

    /// Open a filesystem from externally persisted state
    pub async fn load(store: BlockStore, state: &RootState) -> Result<Self, FsError> {
        let header: RootHeader = store.get_node(&state.root_cid).await?;
        let metadata: Metadata = store.get_node(&header.metadata).await?;
        let public = PublicTree::load(store.clone(), PUBLIC_ROOT, header.public.cid).await?;
        let forest = PrivateForest::load(store.clone(), header.private).await?;
        let private = PrivateTree::load_root(
            store.clone(),
            &forest,
            PRIVATE_ROOT,
            &state.private_root_name,
            &state.root_key,
        )
        .await?;

        Ok(FileSystem {
            store,
            cid: Some(state.root_cid),
            previous: header.previous,
            merge: header.merge,
            metadata,
            height: header.height,
            public,
            private,
            forest,
        })
    }

    /// Open the filesystem recorded in a state file, or create a fresh
    /// one and write the file
    pub async fn load_or_create(
        store: BlockStore,
        state_path: &std::path::Path,
    ) -> Result<Self, FsError> {
        match RootState::load(state_path).await? {
            Some(state) => Self::load(store, &state).await,
            None => {
                tracing::debug!("creating external state file: {:?}", state_path);
                let fs = Self::init(store).await?;
                fs.root_state()?.write(state_path).await?;
                Ok(fs)
            }
        }
    }

    pub fn store(&self) -> &BlockStore {
        &self.store
    }

    /// Root CID of the most recent commit
    pub fn cid(&self) -> Option<Cid> {
        self.cid
    }

    pub fn height(&self) -> u64 {
        self.height
    }

    /// The values the host must persist to reopen this filesystem
    pub fn root_state(&self) -> Result<RootState, FsError> {
        let root_cid = self
            .cid
            .ok_or_else(|| FsError::NotFound("filesystem has not been committed".to_string()))?;
        Ok(RootState {
            root_cid,
            root_key: self.private.key(),
            private_root_name: self.private.private_name(),
        })
    }

    /// Write file content at a path, creating intermediate directories
    pub async fn write(
        &mut self,
        path: &str,
        content: impl Into<FileInput>,
        opts: MutationOptions,
    ) -> Result<(), FsError> {
        let path = Path::parse(path)?;
        let (realm, rest) = path.split_root()?;
        if rest.is_empty() {
            return Err(FsError::NotAFile(path.to_string()));
        }
        match realm {
            PUBLIC_ROOT => {
                self.public.write(rest, content.into(), opts.commit).await?;
            }
            _ => {
                self.private
                    .write(&mut self.forest, rest, content.into(), opts.commit)
                    .await?;
            }
        }
        self.commit_root(opts.commit).await
    }

    /// Create a directory, creating missing intermediates
    pub async fn mkdir(&mut self, path: &str, opts: MutationOptions) -> Result<(), FsError> {
        let path = Path::parse(path)?;
        let (realm, rest) = path.split_root()?;
        if rest.is_empty() {
            return Err(anyhow::anyhow!("directory already exists: {}", path).into());
        }
        match realm {
            PUBLIC_ROOT => {
                self.public.mkdir(rest, opts.commit).await?;
            }
            _ => {
                self.private
                    .mkdir(&mut self.forest, rest, opts.commit)
                    .await?;
            }
        }
        self.commit_root(opts.commit).await
    }

    /// Remove the link at a path. Superseded blocks stay in the store
    /// for history.
    pub async fn rm(&mut self, path: &str, opts: MutationOptions) -> Result<(), FsError> {
        let path = Path::parse(path)?;
        let (realm, rest) = path.split_root()?;
        if rest.is_empty() {
            return Err(anyhow::anyhow!("cannot remove subtree root: {}", path).into());
        }
        match realm {
            PUBLIC_ROOT => {
                self.public.rm(rest, opts.commit).await?;
            }
            _ => {
                self.private.rm(&mut self.forest, rest, opts.commit).await?;
            }
        }
        self.commit_root(opts.commit).await
    }

    /// Resolve a path to a node
    pub async fn get(&self, path: &str) -> Result<NodeRef, FsError> {
        let path = Path::parse(path)?;
        let (realm, rest) = path.split_root()?;
        match realm {
            PUBLIC_ROOT => Ok(NodeRef::Public(self.public.get(rest).await?)),
            _ => Ok(NodeRef::Private(
                self.private.get(rest).await?,
            )),
        }
    }

    /// Read a file's content
    pub async fn cat(&self, path: &str) -> Result<Bytes, FsError> {
        match self.get(path).await? {
            NodeRef::Public(PublicNode::File(file)) => file.content().await,
            NodeRef::Private(PrivateNode::File(file)) => file.content().await,
            _ => Err(FsError::NotAFile(path.to_string())),
        }
    }

    /// List a directory's children. The empty path lists the root's
    /// two subtrees.
    pub async fn ls(&self, path: &str) -> Result<Vec<Link>, FsError> {
        let path = Path::parse(path)?;
        if path.is_empty() {
            let private_cid = self
                .private
                .cid()
                .ok_or_else(|| FsError::NotFound(PRIVATE_ROOT.to_string()))?;
            return Ok(vec![
                self.public.to_link()?,
                Link::new(PRIVATE_ROOT, private_cid, self.private.size(), false),
            ]);
        }
        let (realm, rest) = path.split_root()?;
        match realm {
            PUBLIC_ROOT => {
                let node = self.public.get(rest).await?;
                let tree = node
                    .into_tree()
                    .ok_or_else(|| FsError::NotADirectory(path.to_string()))?;
                Ok(tree.children().cloned().collect())
            }
            _ => {
                let node = self.private.get(rest).await?;
                let tree = node
                    .into_tree()
                    .ok_or_else(|| FsError::NotADirectory(path.to_string()))?;
                let links = tree
                    .links()
                    .iter()
                    .map(|(name, link)| {
                        Link::new(name.clone(), link.cid, link.size, link.is_file)
                    })
                    .collect();
                Ok(links)
            }
        }
    }

    /// Copy a node to a new path within the filesystem. Same-subtree
    /// copies splice the existing link; copies across the
    /// public/private boundary materialize content. A subtree cannot
    /// be copied into itself.
    pub async fn cp(&mut self, dst: &str, src: &str, opts: MutationOptions) -> Result<(), FsError> {
        let dst = Path::parse(dst)?;
        let src = Path::parse(src)?;
        if dst.starts_with(&src) {
            return Err(FsError::InvalidPath(format!(
                "cannot copy {} into its own subtree {}",
                src, dst
            )));
        }
        let (dst_realm, dst_rest) = dst.split_root()?;
        let (src_realm, src_rest) = src.split_root()?;
        if dst_rest.is_empty() {
            return Err(FsError::InvalidPath(format!(
                "destination {} is a subtree root",
                dst
            )));
        }

        if dst_realm != src_realm {
            return self.cp_across(&src, &dst, opts).await;
        }

        match dst_realm {
            PUBLIC_ROOT => {
                let node = self.public.get(src_rest).await?;
                let (link, info) = match &node {
                    PublicNode::Tree(tree) => (tree.to_link()?, tree.skeleton_info()?),
                    PublicNode::File(file) => (file.to_link()?, file.skeleton_info()?),
                };
                self.public.graft(dst_rest, link, info, opts.commit).await?;
            }
            _ => {
                let node = self.private.get(src_rest).await?;
                let cid = node
                    .cid()
                    .ok_or_else(|| FsError::NotFound(src.to_string()))?;
                let (link, info) = match &node {
                    PrivateNode::Tree(tree) => (
                        PrivateLink {
                            ratchet: tree.ratchet().clone(),
                            name: tree.private_name(),
                            cid,
                            size: tree.size(),
                            is_file: false,
                        },
                        tree.skeleton_info()?,
                    ),
                    PrivateNode::File(file) => (
                        PrivateLink {
                            ratchet: file.ratchet().clone(),
                            name: file.private_name(),
                            cid,
                            size: file.size(),
                            is_file: true,
                        },
                        file.skeleton_info()?,
                    ),
                };
                self.private
                    .graft(&mut self.forest, dst_rest, link, info, opts.commit)
                    .await?;
            }
        }
        self.commit_root(opts.commit).await
    }

    /// Copy a file or directory tree in from the host filesystem
    /// through a read-only adapter
    pub async fn cp_local(
        &mut self,
        dst: &str,
        src: &std::path::Path,
        local: &dyn LocalFs,
        opts: MutationOptions,
    ) -> Result<(), FsError> {
        if local.is_dir(src).await? {
            match self.get(dst).await {
                Err(FsError::NotFound(_)) => self.mkdir(dst, opts).await?,
                Err(err) => return Err(err),
                Ok(_) => {}
            }
            for entry in local.read_dir(src).await? {
                let child_dst = format!("{}/{}", dst.trim_end_matches('/'), entry.name);
                Box::pin(self.cp_local(&child_dst, &src.join(&entry.name), local, opts)).await?;
            }
            Ok(())
        } else {
            let stream = local.open(src).await?;
            self.write(dst, FileInput::Stream(stream), opts).await
        }
    }

    async fn cp_across(
        &mut self,
        src: &Path,
        dst: &Path,
        opts: MutationOptions,
    ) -> Result<(), FsError> {
        let node = self.get(&src.to_string()).await?;
        if node.is_file() {
            let content = self.cat(&src.to_string()).await?;
            self.write(&dst.to_string(), content, opts).await
        } else {
            match self.get(&dst.to_string()).await {
                Err(FsError::NotFound(_)) => self.mkdir(&dst.to_string(), opts).await?,
                Err(err) => return Err(err),
                Ok(_) => {}
            }
            let children = self.ls(&src.to_string()).await?;
            for child in children {
                Box::pin(self.cp_across(&src.join(&child.name), &dst.join(&child.name), opts))
                    .await?;
            }
            Ok(())
        }
    }

    /// Walk the `previous` chain of the node at a path, newest first.
    /// The empty path walks root commits. `limit` of `-1` returns all
    /// generations.
    pub async fn history(&self, path: &str, limit: i64) -> Result<Vec<HistoryEntry>, FsError> {
        let path = Path::parse(path)?;
        if path.is_empty() {
            return self.root_history(limit).await;
        }
        let (realm, rest) = path.split_root()?;
        match realm {
            PUBLIC_ROOT => {
                let node = self.public.get(rest).await?;
                let cid = node
                    .cid()
                    .ok_or_else(|| FsError::NotFound(path.to_string()))?;
                public_history(&self.store, cid, limit).await
            }
            _ => {
                let node = self.private.get(rest).await?;
                private_history(&self.store, &node, limit).await
            }
        }
    }

    async fn root_history(&self, limit: i64) -> Result<Vec<HistoryEntry>, FsError> {
        let mut entries = Vec::new();
        let mut next = self.cid;
        while let Some(cid) = next {
            if (limit >= 0 && entries.len() as i64 >= limit) || entries.len() >= HISTORY_HORIZON {
                break;
            }
            let header: RootHeader = self.store.get_node(&cid).await?;
            let metadata: Metadata = self.store.get_node(&header.metadata).await?;
            entries.push(HistoryEntry {
                cid,
                key: None,
                private_name: None,
                metadata,
                size: header.size,
            });
            next = header.previous;
        }
        Ok(entries)
    }

    /// Merge a remote filesystem state into this one. The remote's
    /// blocks must be resolvable from this store.
    ///
    /// Outcomes follow distributed-VCS conventions: equal roots are
    /// `InSync`; a remote already contained in local history is
    /// `LocalAhead`; a remote strictly ahead is adopted wholesale as a
    /// `FastForward`; diverged histories produce a `MergeCommit` whose
    /// root links both parents. Unrelated histories fail with
    /// `NoCommonHistory`.
    pub async fn merge(
        &mut self,
        remote: &RootState,
        policy: ConflictPolicy,
    ) -> Result<MergeResult, FsError> {
        let local_cid = self
            .cid
            .ok_or_else(|| FsError::NotFound("filesystem has not been committed".to_string()))?;

        let l_chain = self.root_chain(local_cid).await?;
        let r_chain = self.root_chain(remote.root_cid).await?;

        match classify(&l_chain, &r_chain)? {
            SyncStatus::InSync => Ok(self.merge_result(MergeType::InSync)),
            SyncStatus::LocalAhead => Ok(self.merge_result(MergeType::LocalAhead)),
            SyncStatus::RemoteAhead => {
                let adopted = FileSystem::load(self.store.clone(), remote).await?;
                *self = adopted;
                Ok(self.merge_result(MergeType::FastForward))
            }
            SyncStatus::Diverged(divergence) => {
                tracing::debug!(
                    "merge commit: local {} and remote {} diverged at {}",
                    local_cid,
                    remote.root_cid,
                    divergence.lca
                );
                let r_header: RootHeader = self.store.get_node(&remote.root_cid).await?;
                let r_public =
                    PublicTree::load(self.store.clone(), PUBLIC_ROOT, r_header.public.cid).await?;
                let r_forest = PrivateForest::load(self.store.clone(), r_header.private).await?;
                self.forest.absorb(&r_forest);
                let r_private = PrivateTree::load_root(
                    self.store.clone(),
                    &self.forest,
                    PRIVATE_ROOT,
                    &remote.private_root_name,
                    &remote.root_key,
                )
                .await?;

                let (merged_public, _) =
                    merge_public(&self.public, &r_public, policy, true).await?;
                let (merged_private, _) =
                    merge_private(&self.private, &r_private, &mut self.forest, policy, true)
                        .await?;

                self.public = merged_public;
                self.private = merged_private;
                self.merge = Some(remote.root_cid);
                self.commit_root(true).await?;
                Ok(self.merge_result(MergeType::MergeCommit))
            }
        }
    }

    fn merge_result(&self, kind: MergeType) -> MergeResult {
        MergeResult {
            kind,
            cid: self.cid.expect("merge ran against a committed root"),
            size: self.public.size() + self.private.size(),
            is_file: false,
        }
    }

    async fn root_chain(&self, cid: Cid) -> Result<Vec<Cid>, FsError> {
        let mut cids = Vec::new();
        let mut next = Some(cid);
        while let Some(cid) = next {
            if cids.len() >= MERGE_SEARCH_HORIZON {
                break;
            }
            cids.push(cid);
            let header: RootHeader = self.store.get_node(&cid).await?;
            next = header.previous;
        }
        Ok(cids)
    }

    /// Rebuild and (optionally) persist the root header over the
    /// current subtree states
    async fn commit_root(&mut self, commit: bool) -> Result<(), FsError> {
        let forest_cid = self.forest.put(commit).await?;
        self.metadata = self.metadata.updated();
        let metadata_cid = self.store.put_node(&self.metadata, commit).await?;
        let public_link = self.public.to_link()?;

        if self.cid.is_some() {
            self.height += 1;
        }
        let header = RootHeader {
            metadata: metadata_cid,
            previous: self.cid,
            merge: self.merge.take(),
            height: self.height,
            public: public_link.clone(),
            private: forest_cid,
            size: public_link.size + self.private.size(),
        };
        let cid = self.store.put_node(&header, commit).await?;
        tracing::debug!("committed root {} at height {}", cid, self.height);

        self.previous = self.cid;
        self.cid = Some(cid);
        Ok(())
    }
}
