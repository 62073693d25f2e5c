/**
 * Error surface of the filesystem core.
 */
pub mod error;
/**
 * Internal wrapper around IPLD: CIDs, links, and the DAG-CBOR
 *  block codec.
 */
pub mod linked_data;
/**
 * CID-keyed block storage over the grove-store blob layer.
 */
pub mod store;
/**
 * Cryptographic types and operations.
 *  - Symmetric content keys
 *  - The forward-secret ratchet
 *  - Bloom-filter name tags
 */
pub mod crypto;
/**
 * Shared node vocabulary: metadata, skeletons, paths, and the
 *  capability trait all four node shapes implement.
 */
pub mod node;
/**
 * The plaintext subtree: public files and trees.
 */
pub mod public;
/**
 * The encrypted subtree: private files, trees, and the forest
 *  they are indexed in.
 */
pub mod private;
/**
 * History traversal over previous-version links.
 */
pub mod history;
/**
 * Three-way merge between divergent filesystem histories.
 */
pub mod merge;
/**
 * The filesystem handle binding everything together, plus the
 *  externally persisted root state and the host import adapter.
 */
pub mod fs;

pub mod prelude {
    pub use crate::error::FsError;
    pub use crate::fs::{FileSystem, MutationOptions, NodeRef, RootState};
    pub use crate::history::HistoryEntry;
    pub use crate::linked_data::{Cid, Link};
    pub use crate::merge::{ConflictPolicy, MergeResult, MergeType};
    pub use crate::node::{Node, Path};
    pub use crate::store::BlockStore;
}
