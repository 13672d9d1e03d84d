//! Offline index build phase.
//!
//! Indexes are built before any query runs and never updated afterwards. For
//! clustered indexes the relation file itself is rewritten sorted by the
//! indexed attribute first, so that index order and file order match and
//! index scans can stream the file forward.

use std::{fs, path::Path};

use tracing::info;

use crate::{
    db::{DbError, IndexMetadata, RelationMetadata},
    paging::{io::FileOps, reader::TupleReader, writer::TupleWriter},
    storage::{btree::BPlusTree, tuple::RecordId},
};

/// Builds the index described by `index` over `relation` and writes it to
/// [`IndexMetadata::path`].
pub fn build_index<F: FileOps>(
    relation: &RelationMetadata,
    index: &IndexMetadata,
    page_size: usize,
) -> Result<BPlusTree, DbError> {
    if index.clustered {
        sort_relation_file::<F>(&relation.path, index.attribute, page_size)?;
    }

    let mut reader = TupleReader::<F>::open(&relation.path, page_size)?;
    let mut pairs: Vec<(i32, RecordId)> = Vec::new();

    while let Some((record_id, tuple)) = reader.next_with_record_id()? {
        let Some(key) = tuple.get(index.attribute) else {
            return Err(DbError::Corrupted(format!(
                "tuple {record_id} of relation {} has {} attributes, index on {} needs attribute {}",
                relation.name,
                tuple.len(),
                index.column,
                index.attribute
            )));
        };

        pairs.push((*key, record_id));
    }

    let tree = BPlusTree::bulk_load(index.order, pairs)?;

    if let Some(parent) = index.path.parent() {
        fs::create_dir_all(parent)?;
    }

    tree.write(F::create(&index.path)?, page_size)?;

    info!(
        relation = %relation.name,
        attribute = %index.column,
        clustered = index.clustered,
        leaves = tree.leaves.len(),
        root = tree.root_address(),
        "built index"
    );

    Ok(tree)
}

/// Rewrites the relation at `path` sorted by `attribute`.
///
/// The sort is stable, so tuples with equal keys keep their relative order.
/// This runs offline and loads the whole relation in memory.
pub fn sort_relation_file<F: FileOps>(
    path: &Path,
    attribute: usize,
    page_size: usize,
) -> Result<(), DbError> {
    let mut tuples = TupleReader::<F>::open(path, page_size)?.read_all()?;

    if let Some(tuple) = tuples.iter().find(|tuple| tuple.len() <= attribute) {
        return Err(DbError::Corrupted(format!(
            "cannot sort {} by attribute {attribute}, found tuple of width {}",
            path.display(),
            tuple.len()
        )));
    }

    tuples.sort_by_key(|tuple| tuple[attribute]);

    let mut writer = TupleWriter::<F>::create(path, page_size)?;

    for tuple in &tuples {
        writer.write_tuple(tuple)?;
    }

    writer.close()
}

#[cfg(test)]
mod tests {
    use std::{fs::File, path::Path};

    use super::{build_index, sort_relation_file};
    use crate::{
        db::{DbError, IndexMetadata, RelationMetadata},
        paging::{reader::TupleReader, writer::TupleWriter},
        storage::{btree::IndexReader, tuple::Tuple},
    };

    const PAGE_SIZE: usize = 64;

    fn write_relation(path: &Path, tuples: &[Tuple]) -> Result<(), DbError> {
        let mut writer = TupleWriter::<File>::create(path, PAGE_SIZE)?;

        for tuple in tuples {
            writer.write_tuple(tuple)?;
        }

        writer.close()
    }

    fn metadata(dir: &Path, clustered: bool) -> (RelationMetadata, IndexMetadata) {
        let relation = RelationMetadata {
            name: "R".into(),
            attributes: vec!["a".into(), "b".into()],
            path: dir.join("data").join("R"),
        };

        let index = IndexMetadata {
            table: "R".into(),
            column: "b".into(),
            attribute: 1,
            clustered,
            order: 1,
            path: dir.join("indexes").join("R.b"),
        };

        (relation, index)
    }

    fn sample() -> Vec<Tuple> {
        vec![vec![1, 30], vec![2, 10], vec![3, 20], vec![4, 10], vec![5, 40]]
    }

    #[test]
    fn unclustered_index_points_to_original_positions() -> Result<(), DbError> {
        let dir = tempfile::tempdir()?;
        let (relation, index) = metadata(dir.path(), false);

        std::fs::create_dir_all(dir.path().join("data"))?;
        write_relation(&relation.path, &sample())?;

        build_index::<File>(&relation, &index, PAGE_SIZE)?;

        let mut tree = IndexReader::<File>::open(&index.path, PAGE_SIZE)?;
        assert_eq!(tree.keys()?, vec![10, 20, 30, 40]);

        // Relation file untouched.
        let mut reader = TupleReader::<File>::open(&relation.path, PAGE_SIZE)?;
        assert_eq!(reader.read_all()?, sample());

        // Key 10 maps to tuples (2, 10) and (4, 10) in file order.
        let (_, leaf) = tree.find_leaf_by_key(10)?;
        let entry = &leaf.entries[leaf.lower_bound(10).expect("key exists")];

        let tuples = entry
            .record_ids
            .iter()
            .map(|record_id| {
                reader.seek(*record_id);
                reader.try_next()
            })
            .collect::<Result<Vec<_>, _>>()?;

        assert_eq!(tuples, vec![Some(vec![2, 10]), Some(vec![4, 10])]);

        Ok(())
    }

    #[test]
    fn clustered_index_sorts_relation() -> Result<(), DbError> {
        let dir = tempfile::tempdir()?;
        let (relation, index) = metadata(dir.path(), true);

        std::fs::create_dir_all(dir.path().join("data"))?;
        write_relation(&relation.path, &sample())?;

        let tree = build_index::<File>(&relation, &index, PAGE_SIZE)?;
        assert_eq!(tree.leaves.iter().map(|l| l.entries.len()).sum::<usize>(), 4);

        let mut reader = TupleReader::<File>::open(&relation.path, PAGE_SIZE)?;
        assert_eq!(
            reader.read_all()?,
            vec![vec![2, 10], vec![4, 10], vec![3, 20], vec![1, 30], vec![5, 40]]
        );

        Ok(())
    }

    #[test]
    fn sort_relation_rejects_narrow_tuples() -> Result<(), DbError> {
        let dir = tempfile::tempdir()?;
        let path = dir.path().join("R");
        write_relation(&path, &[vec![1], vec![2]])?;

        assert!(matches!(
            sort_relation_file::<File>(&path, 3, PAGE_SIZE),
            Err(DbError::Corrupted(_))
        ));

        Ok(())
    }
}
