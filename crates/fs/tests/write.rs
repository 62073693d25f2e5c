mod common;

use common::{names, opts, setup_fs};
use grove_fs::fs::OsFs;
use grove_fs::prelude::*;

#[tokio::test]
async fn test_write_and_cat() {
    let mut fs = setup_fs().await;

    let data = b"Hello, world!";
    fs.write("public/test.txt", data.to_vec(), opts())
        .await
        .unwrap();

    assert_eq!(fs.cat("public/test.txt").await.unwrap().as_ref(), data);
}

#[tokio::test]
async fn test_overwrite() {
    let mut fs = setup_fs().await;

    fs.write("public/file.txt", "first", opts()).await.unwrap();
    fs.write("public/file.txt", "second", opts()).await.unwrap();

    assert_eq!(fs.cat("public/file.txt").await.unwrap().as_ref(), b"second");
    assert_eq!(names(&fs.ls("public").await.unwrap()), vec!["file.txt".to_string()]);
}

#[tokio::test]
async fn test_root_listing() {
    let fs = setup_fs().await;

    let listing = fs.ls("").await.unwrap();
    assert_eq!(
        names(&listing),
        vec!["private".to_string(), "public".to_string()]
    );
    assert!(listing.iter().all(|l| !l.is_file));
}

#[tokio::test]
async fn test_mkdir_and_ls() {
    let mut fs = setup_fs().await;

    fs.mkdir("public/a/b/c", opts()).await.unwrap();

    // every intermediate appears in its parent's listing
    assert_eq!(names(&fs.ls("public").await.unwrap()), vec!["a".to_string()]);
    assert_eq!(names(&fs.ls("public/a").await.unwrap()), vec!["b".to_string()]);
    assert_eq!(names(&fs.ls("public/a/b").await.unwrap()), vec!["c".to_string()]);
    assert!(fs.ls("public/a/b/c").await.unwrap().is_empty());
}

#[tokio::test]
async fn test_mkdir_on_file_prefix_fails() {
    let mut fs = setup_fs().await;
    fs.write("public/blocker", "x", opts()).await.unwrap();

    assert!(matches!(
        fs.mkdir("public/blocker/sub", opts()).await,
        Err(FsError::NotADirectory(_))
    ));
    assert!(matches!(
        fs.write("public/blocker/file.txt", "y", opts()).await,
        Err(FsError::NotADirectory(_))
    ));
}

#[tokio::test]
async fn test_error_cases() {
    let mut fs = setup_fs().await;
    fs.write("public/dir/file.txt", "data", opts()).await.unwrap();

    // missing paths
    assert!(matches!(
        fs.cat("public/does_not_exist.txt").await,
        Err(FsError::NotFound(_))
    ));
    assert!(matches!(
        fs.rm("public/does_not_exist.txt", opts()).await,
        Err(FsError::NotFound(_))
    ));

    // type mismatches
    assert!(matches!(
        fs.cat("public/dir").await,
        Err(FsError::NotAFile(_))
    ));
    assert!(matches!(
        fs.ls("public/dir/file.txt").await,
        Err(FsError::NotADirectory(_))
    ));
    assert!(matches!(
        fs.write("public/dir", "overwrite a dir", opts()).await,
        Err(FsError::NotAFile(_))
    ));

    // malformed paths
    assert!(matches!(
        fs.write("elsewhere/file.txt", "x", opts()).await,
        Err(FsError::InvalidPath(_))
    ));
    assert!(matches!(
        fs.write("public/../etc/passwd", "x", opts()).await,
        Err(FsError::InvalidPath(_))
    ));
}

#[tokio::test]
async fn test_rm_subtree_in_one_step() {
    let mut fs = setup_fs().await;

    fs.write("public/project/src/main.rs", "fn main() {}", opts())
        .await
        .unwrap();
    fs.write("public/project/README.md", "readme", opts())
        .await
        .unwrap();
    fs.write("public/keep.txt", "keep", opts()).await.unwrap();

    fs.rm("public/project", opts()).await.unwrap();

    assert_eq!(names(&fs.ls("public").await.unwrap()), vec!["keep.txt".to_string()]);
    assert!(matches!(
        fs.cat("public/project/README.md").await,
        Err(FsError::NotFound(_))
    ));
}

#[tokio::test]
async fn test_streamed_write() {
    let mut fs = setup_fs().await;

    let chunks: Vec<std::io::Result<bytes::Bytes>> = (0..64)
        .map(|n| Ok(bytes::Bytes::from(vec![n as u8; 4096])))
        .collect();
    let stream: grove_fs::node::ByteStream = Box::new(futures::stream::iter(chunks));

    fs.write("public/big.bin", grove_fs::node::FileInput::Stream(stream), opts())
        .await
        .unwrap();

    let content = fs.cat("public/big.bin").await.unwrap();
    assert_eq!(content.len(), 64 * 4096);
    assert_eq!(content[0], 0);
    assert_eq!(content[content.len() - 1], 63);
}

#[tokio::test]
async fn test_cp_within_subtree() {
    let mut fs = setup_fs().await;

    fs.write("public/docs/a.txt", "alpha", opts()).await.unwrap();
    fs.write("public/docs/sub/b.txt", "beta", opts()).await.unwrap();

    fs.cp("public/backup", "public/docs", opts()).await.unwrap();

    assert_eq!(fs.cat("public/backup/a.txt").await.unwrap().as_ref(), b"alpha");
    assert_eq!(
        fs.cat("public/backup/sub/b.txt").await.unwrap().as_ref(),
        b"beta"
    );

    // the copy is by link: both paths reference the same blocks
    let original = fs.get("public/docs").await.unwrap();
    let copy = fs.get("public/backup").await.unwrap();
    assert_eq!(original.cid(), copy.cid());

    // the source is untouched by later writes to the copy
    fs.write("public/backup/new.txt", "only here", opts())
        .await
        .unwrap();
    assert!(matches!(
        fs.cat("public/docs/new.txt").await,
        Err(FsError::NotFound(_))
    ));
}

#[tokio::test]
async fn test_cp_into_own_subtree_rejected() {
    let mut fs = setup_fs().await;
    fs.write("public/docs/a.txt", "alpha", opts()).await.unwrap();

    assert!(matches!(
        fs.cp("public/docs/inner", "public/docs", opts()).await,
        Err(FsError::InvalidPath(_))
    ));
    assert!(matches!(
        fs.cp("public/docs", "public/docs", opts()).await,
        Err(FsError::InvalidPath(_))
    ));
}

#[tokio::test]
async fn test_cp_across_subtrees_materializes() {
    let mut fs = setup_fs().await;

    fs.write("private/vault/secret.txt", "now public", opts())
        .await
        .unwrap();
    fs.cp("public/released", "private/vault", opts())
        .await
        .unwrap();

    assert_eq!(
        fs.cat("public/released/secret.txt").await.unwrap().as_ref(),
        b"now public"
    );

    // and the reverse direction
    fs.write("public/plain.txt", "go dark", opts()).await.unwrap();
    fs.cp("private/imported.txt", "public/plain.txt", opts())
        .await
        .unwrap();
    assert_eq!(
        fs.cat("private/imported.txt").await.unwrap().as_ref(),
        b"go dark"
    );
}

#[tokio::test]
async fn test_cp_local_imports_host_tree() {
    let dir = tempfile::TempDir::new().unwrap();
    tokio::fs::write(dir.path().join("top.txt"), b"top")
        .await
        .unwrap();
    tokio::fs::create_dir(dir.path().join("nested"))
        .await
        .unwrap();
    tokio::fs::write(dir.path().join("nested").join("inner.txt"), b"inner")
        .await
        .unwrap();

    let mut fs = setup_fs().await;
    fs.cp_local("public/imported", dir.path(), &OsFs, opts())
        .await
        .unwrap();

    assert_eq!(
        names(&fs.ls("public/imported").await.unwrap()),
        vec!["nested".to_string(), "top.txt".to_string()]
    );
    assert_eq!(fs.cat("public/imported/top.txt").await.unwrap().as_ref(), b"top");
    assert_eq!(
        fs.cat("public/imported/nested/inner.txt").await.unwrap().as_ref(),
        b"inner"
    );
}

#[tokio::test]
async fn test_persistence_across_reopen() {
    let mut fs = setup_fs().await;
    fs.write("public/kept.txt", "still here", opts()).await.unwrap();

    let store = fs.store().clone();
    let state = fs.root_state().unwrap();
    drop(fs);

    let fs = FileSystem::load(store, &state).await.unwrap();
    assert_eq!(fs.cat("public/kept.txt").await.unwrap().as_ref(), b"still here");
}

#[tokio::test]
async fn test_state_file_round_trip() {
    let dir = tempfile::TempDir::new().unwrap();
    let state_path = dir.path().join("grove.json");

    let store = BlockStore::memory().await.unwrap();
    let mut fs = FileSystem::load_or_create(store.clone(), &state_path)
        .await
        .unwrap();
    fs.write("public/hello.txt", "hello!", opts()).await.unwrap();
    fs.root_state().unwrap().write(&state_path).await.unwrap();

    let reopened = FileSystem::load_or_create(store, &state_path).await.unwrap();
    assert_eq!(
        reopened.cat("public/hello.txt").await.unwrap().as_ref(),
        b"hello!"
    );
}

#[tokio::test]
async fn test_uncommitted_mutation_leaves_store_untouched() {
    let mut fs = setup_fs().await;
    fs.write("public/real.txt", "committed", opts()).await.unwrap();

    let committed_root = fs.cid().unwrap();
    let store = fs.store().clone();

    fs.write(
        "public/draft.txt",
        "uncommitted",
        MutationOptions { commit: false },
    )
    .await
    .unwrap();

    let dry_root = fs.cid().unwrap();
    assert_ne!(committed_root, dry_root);

    // the dry-run root was never written; the committed one remains
    assert!(!store.has(&dry_root).await.unwrap());
    assert!(store.has(&committed_root).await.unwrap());
}

#[tokio::test]
async fn test_heights_climb_with_commits() {
    let mut fs = setup_fs().await;
    let start = fs.height();

    fs.write("public/one", "1", opts()).await.unwrap();
    fs.write("public/two", "2", opts()).await.unwrap();

    assert_eq!(fs.height(), start + 2);
}
