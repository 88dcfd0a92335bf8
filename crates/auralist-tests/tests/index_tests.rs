//! Crawler scenarios against the shared catalog

use auralist_catalog::CatalogStore;
use auralist_index::{Crawler, CrawlerConfig, HashService};
use auralist_tests::test_utils::LOCAL_HOST;
use auralist_tests::{generate_test_data, TestDataPattern, TestWorld};

#[tokio::test]
async fn test_indexing_twice_adds_nothing() {
    let world = TestWorld::new();
    world.write("a/one.mp3", &generate_test_data(100, TestDataPattern::Random));
    world.write("a/b/two.mp3", &generate_test_data(200, TestDataPattern::Realistic));
    world.write("three.ogg", b"");

    let first = world.index().await;
    let second = world.index().await;

    assert_eq!(first.files_indexed, 3);
    assert_eq!(second.files_indexed, 0);
    assert_eq!(second.files_known, 3);
    assert_eq!(world.catalog.count().await.unwrap(), 3);
}

#[tokio::test]
async fn test_new_files_join_an_indexed_tree() {
    let world = TestWorld::new();
    world.write("one.mp3", b"first");
    world.index().await;

    world.write("two.mp3", b"second");
    let stats = world.index().await;

    assert_eq!(stats.files_indexed, 1);
    assert_eq!(stats.files_known, 1);
    assert_eq!(world.pending().await.len(), 2);
}

#[tokio::test]
async fn test_extension_allow_list_is_case_insensitive() {
    let world = TestWorld::new();
    world.write("loud.MP3", b"a");
    world.write("quiet.mp3", b"b");
    world.write("notes.txt", b"c");

    let mut config = CrawlerConfig::new(&world.local_root, LOCAL_HOST);
    config.extensions = vec!["mp3".to_string()];
    let stats = Crawler::new(world.catalog.clone(), config)
        .index()
        .await
        .unwrap();

    assert_eq!(stats.files_indexed, 2);
    assert_eq!(stats.files_filtered, 1);
    let mut names: Vec<String> = world
        .pending()
        .await
        .into_iter()
        .map(|record| record.relative_path)
        .collect();
    names.sort();
    assert_eq!(names, vec!["loud.MP3", "quiet.mp3"]);
}

#[tokio::test]
async fn test_records_describe_their_files() {
    let world = TestWorld::new();
    let data = generate_test_data(1000, TestDataPattern::Random);
    let path = world.write("album/track.flac", &data);
    world.index().await;

    let record = world.pending_record("album/track.flac").await;

    assert_eq!(record.local_path(), path);
    assert_eq!(record.size_bytes, 1000);
    assert_eq!(record.extension, "flac");
    assert_eq!(record.file_name, "track.flac");
    assert_eq!(record.crc32, HashService::crc32(&path).unwrap());
    assert_eq!(record.path_hash, HashService::path_hash("album/track.flac"));
    assert!(record.strong_digest.is_none());
    assert!(!record.is_verified());
}

/// The path hash is only a pre-filter: a colliding record hides a new file from the crawl.
/// Nothing downstream trusts it for content decisions, which always compare digests.
#[tokio::test]
async fn test_path_hash_collision_hides_new_file() {
    let world = TestWorld::new();
    world.write("decoy.mp3", b"decoy");
    world.index().await;

    let mut forged = world.pending_record("decoy.mp3").await;
    forged.id = uuid::Uuid::new_v4();
    forged.path_hash = HashService::path_hash("victim.mp3");
    world.catalog.upsert(vec![forged]).await.unwrap();

    world.write("victim.mp3", b"victim");
    let stats = world.index().await;

    assert_eq!(stats.files_indexed, 0);
    assert_eq!(stats.files_known, 2);
    assert!(world
        .pending()
        .await
        .iter()
        .all(|record| record.relative_path != "victim.mp3"));
}

#[tokio::test]
async fn test_other_hosts_do_not_suppress_indexing() {
    let world = TestWorld::new();
    world.write("shared.mp3", b"bytes");

    let elsewhere = Crawler::new(
        world.catalog.clone(),
        CrawlerConfig::new(&world.local_root, "laptop"),
    );
    elsewhere.index().await.unwrap();

    let stats = world.index().await;
    assert_eq!(stats.files_indexed, 1);
    assert_eq!(world.catalog.count().await.unwrap(), 2);
}

#[cfg(target_os = "linux")]
#[tokio::test]
async fn test_non_utf8_names_never_strand_pending_records() {
    use std::os::unix::ffi::OsStrExt;

    let world = TestWorld::new();
    world.write("ok.mp3", b"fine");
    let latin1 = world.local_root.join(std::ffi::OsStr::from_bytes(b"caf\xe9.mp3"));
    std::fs::write(&latin1, b"encoded elsewhere").unwrap();

    let stats = world.index().await;
    assert_eq!(stats.files_indexed, 1);
    assert_eq!(stats.paths_skipped, 1);

    let engine = world.engine(auralist_tests::settings(1024));
    let synced = engine.run_once().await.unwrap();
    assert_eq!(synced.uploaded, 1);
    assert_eq!(synced.failed, 0);
    assert!(world.pending().await.is_empty());
}
