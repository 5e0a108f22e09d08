use ifcore::{Config, Index, IndexBuilder};
use test_log::test;

/// Forces several accumulator dumps (tiny `memory` budget, tiny
/// `pyramid_width`) so the build exercises the pyramid scheduler's
/// merge-trigger path rather than finishing with a single run.
#[test]
fn many_small_documents_trigger_intermediate_merges() -> ifcore::Result<()> {
    let dir = tempfile::tempdir()?;

    let config = Config::default()
        .with_tablesize(64)
        .with_memory(1)
        .with_pyramid_width(2)
        .with_max_filesize(1 << 20)
        .with_fd_limit(32);

    let mut builder = IndexBuilder::create(dir.path(), config, "pyramid-trigger")?;
    builder.add_repo(0, "collection.trecweb");

    for doc in 0..20u64 {
        builder.add_doc(0, doc, 10, false, format!("doc-{doc}"), "text/plain")?;
        builder.add_word(b"common", 0)?;
        builder.add_word(format!("term{}", doc % 5).as_bytes(), 1)?;
        builder.commit_doc()?;
    }

    let built = builder.finish()?;
    assert_eq!(built.documents, 20);
    // "common" plus five distinct "termN" values.
    assert_eq!(built.distinct_terms, 6);

    let mut index = Index::open(dir.path())?;
    assert_eq!(index.stats().documents, 20);
    for doc in 0..20u64 {
        let record = index.fetch_doc(doc)?;
        assert_eq!(record.aux_id, format!("doc-{doc}"));
    }

    Ok(())
}
