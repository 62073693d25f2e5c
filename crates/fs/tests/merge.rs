mod common;

use common::{fork_fs, names, opts, segments, setup_fs};
use grove_fs::merge::merge_public;
use grove_fs::prelude::*;
use grove_fs::public::{PublicHeader, PublicTree};

async fn tree_with(store: &BlockStore, files: &[(&str, &str)]) -> PublicTree {
    let mut tree = PublicTree::new(store.clone(), "");
    for (path, content) in files {
        tree.write(&segments(path), (*content).into(), true)
            .await
            .unwrap();
    }
    tree
}

async fn file_contents(tree: &PublicTree, path: &str) -> Vec<u8> {
    let node = tree.get(&segments(path)).await.unwrap();
    let file = node.as_file().expect("expected a file");
    file.content().await.unwrap().to_vec()
}

fn child_names(tree: &PublicTree) -> Vec<String> {
    tree.links().keys().cloned().collect()
}

#[tokio::test]
async fn test_no_common_history() {
    let store = BlockStore::memory().await.unwrap();
    let a = tree_with(&store, &[("hello.txt", "hello!")]).await;
    let b = tree_with(&store, &[("other.txt", "other")]).await;

    let err = merge_public(&a, &b, ConflictPolicy::default(), true)
        .await
        .unwrap_err();
    assert!(matches!(err, FsError::NoCommonHistory));
}

#[tokio::test]
async fn test_in_sync() {
    let store = BlockStore::memory().await.unwrap();
    let a = tree_with(&store, &[("hello.txt", "hello!")]).await;

    let (merged, kind) = merge_public(&a, &a, ConflictPolicy::default(), true)
        .await
        .unwrap();
    assert_eq!(kind, MergeType::InSync);
    assert_eq!(merged.cid(), a.cid());
}

#[tokio::test]
async fn test_fast_forward() {
    let store = BlockStore::memory().await.unwrap();
    let a = tree_with(&store, &[("hello.txt", "hello!")]).await;

    // remote picks up from a's state and moves ahead
    let mut b = PublicTree::load(store.clone(), "", a.cid().unwrap())
        .await
        .unwrap();
    b.write(&segments("goodbye.txt"), "goodbye!".into(), true)
        .await
        .unwrap();

    let (merged, kind) = merge_public(&a, &b, ConflictPolicy::default(), true)
        .await
        .unwrap();
    assert_eq!(kind, MergeType::FastForward);
    assert_eq!(merged.cid(), b.cid());
}

#[tokio::test]
async fn test_local_ahead() {
    let store = BlockStore::memory().await.unwrap();
    let mut a = tree_with(&store, &[("hello.txt", "hello!")]).await;

    let b = PublicTree::load(store.clone(), "", a.cid().unwrap())
        .await
        .unwrap();

    a.write(&segments("goodbye.txt"), "goodbye!".into(), true)
        .await
        .unwrap();

    let (merged, kind) = merge_public(&a, &b, ConflictPolicy::default(), true)
        .await
        .unwrap();
    assert_eq!(kind, MergeType::LocalAhead);
    assert_eq!(merged.cid(), a.cid());
}

#[tokio::test]
async fn test_no_conflict_merge() {
    let store = BlockStore::memory().await.unwrap();
    let mut a = tree_with(&store, &[("hello.txt", "hello!")]).await;

    let mut b = PublicTree::load(store.clone(), "", a.cid().unwrap())
        .await
        .unwrap();

    a.write(&segments("bonjour.txt"), "bonjour!".into(), true)
        .await
        .unwrap();
    b.write(&segments("goodbye.txt"), "goodbye!".into(), true)
        .await
        .unwrap();

    let (merged, kind) = merge_public(&a, &b, ConflictPolicy::default(), true)
        .await
        .unwrap();
    assert_eq!(kind, MergeType::MergeCommit);
    assert_eq!(
        child_names(&merged),
        vec![
            "bonjour.txt".to_string(),
            "goodbye.txt".to_string(),
            "hello.txt".to_string(),
        ]
    );
    assert_eq!(file_contents(&merged, "hello.txt").await, b"hello!");
    assert_eq!(file_contents(&merged, "goodbye.txt").await, b"goodbye!");
    assert_eq!(file_contents(&merged, "bonjour.txt").await, b"bonjour!");

    // the merge is an auditable commit point: previous is the local
    // head, merge is the remote head
    let header: PublicHeader = store.get_node(&merged.cid().unwrap()).await.unwrap();
    assert_eq!(header.previous, a.cid());
    assert_eq!(header.merge, b.cid());
}

#[tokio::test]
async fn test_remote_overwrites_local_file() {
    let store = BlockStore::memory().await.unwrap();
    let mut a = tree_with(&store, &[("hello.txt", "hello!")]).await;

    let mut b = PublicTree::load(store.clone(), "", a.cid().unwrap())
        .await
        .unwrap();
    b.write(
        &segments("hello.txt"),
        "hello **2**, written on remote".into(),
        true,
    )
    .await
    .unwrap();

    // diverge local with an unrelated add
    a.write(&segments("goodbye.txt"), "goodbye!".into(), true)
        .await
        .unwrap();

    let (merged, kind) = merge_public(&a, &b, ConflictPolicy::default(), true)
        .await
        .unwrap();
    assert_eq!(kind, MergeType::MergeCommit);
    assert_eq!(
        child_names(&merged),
        vec!["goodbye.txt".to_string(), "hello.txt".to_string()]
    );
    assert_eq!(
        file_contents(&merged, "hello.txt").await,
        b"hello **2**, written on remote"
    );
}

#[tokio::test]
async fn test_local_overwrites_remote_file() {
    let store = BlockStore::memory().await.unwrap();
    let mut a = tree_with(&store, &[("hello.txt", "hello!")]).await;

    let mut b = PublicTree::load(store.clone(), "", a.cid().unwrap())
        .await
        .unwrap();
    b.write(&segments("hello.txt"), "hello **2** (remote)".into(), true)
        .await
        .unwrap();

    // local has more commits on the file, so it wins
    a.write(&segments("hello.txt"), "hello **2**".into(), true)
        .await
        .unwrap();
    a.write(&segments("hello.txt"), "hello **3**".into(), true)
        .await
        .unwrap();

    let (merged, kind) = merge_public(&a, &b, ConflictPolicy::default(), true)
        .await
        .unwrap();
    assert_eq!(kind, MergeType::MergeCommit);
    assert_eq!(child_names(&merged), vec!["hello.txt".to_string()]);
    assert_eq!(file_contents(&merged, "hello.txt").await, b"hello **3**");
}

#[tokio::test]
async fn test_remote_deletes_local_file() {
    let store = BlockStore::memory().await.unwrap();
    let mut a = tree_with(&store, &[("hello.txt", "hello!")]).await;

    let mut b = PublicTree::load(store.clone(), "", a.cid().unwrap())
        .await
        .unwrap();
    b.rm(&segments("hello.txt"), true).await.unwrap();

    a.write(&segments("goodbye.txt"), "goodbye!".into(), true)
        .await
        .unwrap();

    let (merged, kind) = merge_public(&a, &b, ConflictPolicy::default(), true)
        .await
        .unwrap();
    assert_eq!(kind, MergeType::MergeCommit);
    assert_eq!(child_names(&merged), vec!["goodbye.txt".to_string()]);
}

#[tokio::test]
async fn test_delete_loses_to_edit() {
    let store = BlockStore::memory().await.unwrap();
    let mut a = tree_with(&store, &[("hello.txt", "hello!")]).await;

    let mut b = PublicTree::load(store.clone(), "", a.cid().unwrap())
        .await
        .unwrap();
    b.rm(&segments("hello.txt"), true).await.unwrap();

    // local edited the file the remote deleted: the edit survives
    a.write(&segments("hello.txt"), "hello, edited".into(), true)
        .await
        .unwrap();

    let (merged, kind) = merge_public(&a, &b, ConflictPolicy::default(), true)
        .await
        .unwrap();
    assert_eq!(kind, MergeType::MergeCommit);
    assert_eq!(child_names(&merged), vec!["hello.txt".to_string()]);
    assert_eq!(file_contents(&merged, "hello.txt").await, b"hello, edited");
}

#[tokio::test]
async fn test_both_delete() {
    let store = BlockStore::memory().await.unwrap();
    let mut a = tree_with(&store, &[("hello.txt", "hello!"), ("keep.txt", "keep")]).await;

    let mut b = PublicTree::load(store.clone(), "", a.cid().unwrap())
        .await
        .unwrap();
    a.rm(&segments("hello.txt"), true).await.unwrap();
    b.rm(&segments("hello.txt"), true).await.unwrap();

    let (merged, kind) = merge_public(&a, &b, ConflictPolicy::default(), true)
        .await
        .unwrap();
    assert_eq!(kind, MergeType::MergeCommit);
    assert_eq!(child_names(&merged), vec!["keep.txt".to_string()]);
}

#[tokio::test]
async fn test_nested_directories_merge_recursively() {
    let store = BlockStore::memory().await.unwrap();
    let mut a = tree_with(&store, &[("dir/base.txt", "base")]).await;

    let mut b = PublicTree::load(store.clone(), "", a.cid().unwrap())
        .await
        .unwrap();

    a.write(&segments("dir/from_a.txt"), "a".into(), true)
        .await
        .unwrap();
    b.write(&segments("dir/from_b.txt"), "b".into(), true)
        .await
        .unwrap();

    let (merged, kind) = merge_public(&a, &b, ConflictPolicy::default(), true)
        .await
        .unwrap();
    assert_eq!(kind, MergeType::MergeCommit);

    let dir = merged.get(&segments("dir")).await.unwrap();
    let dir = dir.as_tree().unwrap();
    assert_eq!(
        child_names(dir),
        vec![
            "base.txt".to_string(),
            "from_a.txt".to_string(),
            "from_b.txt".to_string(),
        ]
    );
}

#[tokio::test]
async fn test_merge_commutes_up_to_cid() {
    let store = BlockStore::memory().await.unwrap();
    let mut a = tree_with(&store, &[("hello.txt", "hello!")]).await;

    let mut b = PublicTree::load(store.clone(), "", a.cid().unwrap())
        .await
        .unwrap();

    a.write(&segments("shared.txt"), "from a".into(), true)
        .await
        .unwrap();
    a.write(&segments("only_a.txt"), "a".into(), true)
        .await
        .unwrap();
    b.write(&segments("shared.txt"), "from b".into(), true)
        .await
        .unwrap();
    b.write(&segments("only_b.txt"), "b".into(), true)
        .await
        .unwrap();

    let (ab, _) = merge_public(&a, &b, ConflictPolicy::default(), true)
        .await
        .unwrap();
    let (ba, _) = merge_public(&b, &a, ConflictPolicy::default(), true)
        .await
        .unwrap();

    assert_eq!(child_names(&ab), child_names(&ba));
    for name in child_names(&ab) {
        assert_eq!(
            file_contents(&ab, &name).await,
            file_contents(&ba, &name).await,
            "contents diverged at {}",
            name
        );
    }
}

#[tokio::test]
async fn test_type_conflict_policy() {
    let store = BlockStore::memory().await.unwrap();
    let mut a = tree_with(&store, &[("base.txt", "base")]).await;

    let mut b = PublicTree::load(store.clone(), "", a.cid().unwrap())
        .await
        .unwrap();

    a.write(&segments("clash"), "a file".into(), true)
        .await
        .unwrap();
    b.mkdir(&segments("clash"), true).await.unwrap();

    let err = merge_public(&a, &b, ConflictPolicy::Fail, true)
        .await
        .unwrap_err();
    assert!(matches!(err, FsError::TypeConflict(name) if name == "clash"));

    // the default policy resolves it deterministically instead
    let (merged, kind) = merge_public(&a, &b, ConflictPolicy::DeeperWins, true)
        .await
        .unwrap();
    assert_eq!(kind, MergeType::MergeCommit);
    assert!(merged.links().contains_key("clash"));
}

#[tokio::test]
async fn test_filesystem_merge_in_sync_and_fast_forward() {
    let mut fs = setup_fs().await;
    fs.write("public/hello.txt", "hello!", opts()).await.unwrap();

    // in sync with itself
    let state = fs.root_state().unwrap();
    let result = fs.merge(&state, ConflictPolicy::default()).await.unwrap();
    assert_eq!(result.kind, MergeType::InSync);

    // remote moves ahead, local fast-forwards to it
    let mut remote = fork_fs(&fs).await;
    remote
        .write("public/goodbye.txt", "goodbye!", opts())
        .await
        .unwrap();
    let remote_state = remote.root_state().unwrap();

    let result = fs
        .merge(&remote_state, ConflictPolicy::default())
        .await
        .unwrap();
    assert_eq!(result.kind, MergeType::FastForward);
    assert_eq!(fs.cid(), remote.cid());
    assert_eq!(fs.cat("public/goodbye.txt").await.unwrap().as_ref(), b"goodbye!");

    // and the other direction reports local ahead
    let result = remote
        .merge(&state, ConflictPolicy::default())
        .await
        .unwrap();
    assert_eq!(result.kind, MergeType::LocalAhead);
}

#[tokio::test]
async fn test_filesystem_merge_commit_spans_both_subtrees() {
    let mut fs = setup_fs().await;
    fs.write("public/hello.txt", "hello!", opts()).await.unwrap();
    fs.write("private/secret.txt", "hush", opts()).await.unwrap();

    let mut remote = fork_fs(&fs).await;

    fs.write("public/bonjour.txt", "bonjour!", opts())
        .await
        .unwrap();
    fs.write("private/from_local.txt", "local secret", opts())
        .await
        .unwrap();
    remote
        .write("public/goodbye.txt", "goodbye!", opts())
        .await
        .unwrap();
    remote
        .write("private/from_remote.txt", "remote secret", opts())
        .await
        .unwrap();

    let result = fs
        .merge(&remote.root_state().unwrap(), ConflictPolicy::default())
        .await
        .unwrap();
    assert_eq!(result.kind, MergeType::MergeCommit);

    assert_eq!(
        names(&fs.ls("public").await.unwrap()),
        vec![
            "bonjour.txt".to_string(),
            "goodbye.txt".to_string(),
            "hello.txt".to_string(),
        ]
    );
    assert_eq!(
        names(&fs.ls("private").await.unwrap()),
        vec![
            "from_local.txt".to_string(),
            "from_remote.txt".to_string(),
            "secret.txt".to_string(),
        ]
    );
    assert_eq!(fs.cat("private/from_remote.txt").await.unwrap().as_ref(), b"remote secret");
    assert_eq!(fs.cat("private/secret.txt").await.unwrap().as_ref(), b"hush");

    // the merged filesystem reopens cleanly from its new state
    let reopened = FileSystem::load(fs.store().clone(), &fs.root_state().unwrap())
        .await
        .unwrap();
    assert_eq!(
        reopened.cat("private/from_local.txt").await.unwrap().as_ref(),
        b"local secret"
    );
}

#[tokio::test]
async fn test_filesystem_merge_unrelated_fails() {
    let mut fs = setup_fs().await;
    fs.write("public/a.txt", "a", opts()).await.unwrap();

    // an unrelated filesystem in the same store shares no root history
    let mut other = FileSystem::init(fs.store().clone()).await.unwrap();
    other.write("public/b.txt", "b", opts()).await.unwrap();

    let err = fs
        .merge(&other.root_state().unwrap(), ConflictPolicy::default())
        .await
        .unwrap_err();
    assert!(matches!(err, FsError::NoCommonHistory));
}
