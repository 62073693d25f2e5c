//! Shared test utilities for filesystem integration tests
#![allow(dead_code)]

use grove_fs::prelude::*;

/// Set up a fresh in-memory filesystem
pub async fn setup_fs() -> FileSystem {
    let store = BlockStore::memory().await.unwrap();
    FileSystem::init(store).await.unwrap()
}

/// Open a second handle onto the same store at the same root, the way
/// a remote writer would after syncing
pub async fn fork_fs(fs: &FileSystem) -> FileSystem {
    FileSystem::load(fs.store().clone(), &fs.root_state().unwrap())
        .await
        .unwrap()
}

pub fn segments(path: &str) -> Vec<String> {
    path.split('/').map(str::to_string).collect()
}

/// Child names of a listing, sorted
pub fn names(links: &[Link]) -> Vec<String> {
    let mut names: Vec<String> = links.iter().map(|l| l.name.clone()).collect();
    names.sort();
    names
}

pub fn opts() -> MutationOptions {
    MutationOptions::default()
}
