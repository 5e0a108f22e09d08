use ifcore::{Config, Index, IndexBuilder};
use test_log::test;

#[test]
fn round_trips_summary_statistics_across_a_build_and_reopen() -> ifcore::Result<()> {
    let dir = tempfile::tempdir()?;

    let mut builder = IndexBuilder::create(dir.path(), Config::default(), "round-trip")?;
    builder.add_repo(0, "collection.trecweb");

    let docs = [
        ("the quick brown fox", "WT01-B01-1"),
        ("the lazy dog sleeps", "WT01-B01-2"),
        ("quick foxes and lazy dogs", "WT01-B01-3"),
    ];

    for (i, (text, aux_id)) in docs.iter().enumerate() {
        builder.add_doc(0, (i * 100) as u64, text.len() as u64, false, *aux_id, "text/plain")?;
        for (wordno, word) in text.split_whitespace().enumerate() {
            builder.add_word(word.as_bytes(), wordno as u64)?;
        }
        builder.commit_doc()?;
    }

    let built = builder.finish()?;
    assert_eq!(built.documents, 3);

    let mut index = Index::open(dir.path())?;
    let stats = index.stats();

    assert_eq!(stats.documents, built.documents);
    assert_eq!(index.params().terms, built.distinct_terms as u32);
    assert_eq!(index.params().repos_entries.len(), 1);

    for (i, (_, aux_id)) in docs.iter().enumerate() {
        let record = index.fetch_doc(i as u64)?;
        assert_eq!(&record.aux_id, aux_id);
    }

    Ok(())
}
