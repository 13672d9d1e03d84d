//! Disk B+Tree index. See [`BPlusTree`] for details.
//!
//! Indexes are built once, in bulk, from a relation that doesn't change
//! afterwards, so there's no insert or delete. The tree is built bottom-up in
//! memory and then serialized one node per page:
//!
//! ```text
//! PAGE    CONTENT
//!       +---------------------------------------------+
//!     0 | [root address] [number of leaves] [order]   |  header
//!       +---------------------------------------------+
//!     1 | [0] [entries] [key] [n] [page slot]*n ...   |  leaf
//!       +---------------------------------------------+
//!   ... | ...                                         |  more leaves
//!       +---------------------------------------------+
//! L + 1 | [1] [keys] [key]*keys [child]*(keys + 1)    |  index node
//!       +---------------------------------------------+
//!   ... | ...                                         |  root is last
//!       +---------------------------------------------+
//! ```
//!
//! Leaves occupy addresses `1..=L` in key order, which means that walking the
//! leaves left to right only requires incrementing the address. Any address
//! greater than `L` is an index node.

use std::{
    io::{Read, Seek, Write},
    path::Path,
};

use crate::{
    config::ConfigError,
    db::DbError,
    paging::{
        io::{FileOps, PageIo},
        page::read_i32,
    },
    storage::tuple::{RecordId, ATTRIBUTE_SIZE},
};

/// Page number of a node inside the index file.
pub type NodeAddress = u32;

/// Discriminator stored at the beginning of leaf pages.
const LEAF_NODE: i32 = 0;

/// Discriminator stored at the beginning of index pages.
const INDEX_NODE: i32 = 1;

/// One distinct key and every tuple that has it.
#[derive(Debug, PartialEq, Eq, Clone)]
pub struct RecordEntry {
    pub key: i32,
    pub record_ids: Vec<RecordId>,
}

#[derive(Debug, PartialEq, Eq, Clone, Default)]
pub struct LeafNode {
    pub entries: Vec<RecordEntry>,
}

impl LeafNode {
    /// Position of the first entry whose key is `>= key`.
    pub fn lower_bound(&self, key: i32) -> Option<usize> {
        let i = self.entries.partition_point(|entry| entry.key < key);
        (i < self.entries.len()).then_some(i)
    }

    pub fn keys(&self) -> impl Iterator<Item = i32> + '_ {
        self.entries.iter().map(|entry| entry.key)
    }
}

/// Internal node. `children.len() == keys.len() + 1` always holds.
#[derive(Debug, PartialEq, Eq, Clone)]
pub struct IndexNode {
    pub keys: Vec<i32>,
    pub children: Vec<NodeAddress>,
}

impl IndexNode {
    /// Returns the child whose key range contains `key`: the first child `i`
    /// such that `key < keys[i]`, or the last child otherwise.
    pub fn find_child_by_key(&self, key: i32) -> NodeAddress {
        let i = self.keys.partition_point(|k| *k <= key);
        self.children[i]
    }
}

#[derive(Debug, PartialEq, Eq, Clone)]
pub enum Node {
    Leaf(LeafNode),
    Index(IndexNode),
}

impl Node {
    /// Serializes the node into exactly `page_size` bytes.
    pub fn serialize(&self, page_size: usize) -> Result<Vec<u8>, ConfigError> {
        let mut ints: Vec<i32> = Vec::new();

        match self {
            Node::Leaf(leaf) => {
                ints.push(LEAF_NODE);
                ints.push(leaf.entries.len() as i32);

                for entry in &leaf.entries {
                    ints.push(entry.key);
                    ints.push(entry.record_ids.len() as i32);

                    for record_id in &entry.record_ids {
                        ints.push(record_id.page as i32);
                        ints.push(record_id.slot as i32);
                    }
                }
            }

            Node::Index(index) => {
                ints.push(INDEX_NODE);
                ints.push(index.keys.len() as i32);
                ints.extend_from_slice(&index.keys);
                ints.extend(index.children.iter().map(|child| *child as i32));
            }
        }

        let size = ints.len() * ATTRIBUTE_SIZE;

        if size > page_size {
            return Err(ConfigError::NodeTooLarge { size, page_size });
        }

        let mut buf: Vec<u8> = ints.iter().flat_map(|int| int.to_be_bytes()).collect();
        buf.resize(page_size, 0);

        Ok(buf)
    }

    /// Parses the node stored at `address`. Only the first `read` bytes of
    /// `buf` are valid.
    pub fn deserialize(address: NodeAddress, buf: &[u8], read: usize) -> Result<Self, DbError> {
        let mut ints = Ints {
            buf: &buf[..read],
            offset: 0,
            address,
        };

        match ints.next()? {
            LEAF_NODE => {
                let len = ints.next_len()?;
                let mut entries = Vec::new();

                for _ in 0..len {
                    let key = ints.next()?;
                    let n = ints.next_len()?;
                    let mut record_ids = Vec::new();

                    for _ in 0..n {
                        let page = ints.next_len()? as u32;
                        let slot = ints.next_len()? as u32;
                        record_ids.push(RecordId::new(page, slot));
                    }

                    entries.push(RecordEntry { key, record_ids });
                }

                Ok(Node::Leaf(LeafNode { entries }))
            }

            INDEX_NODE => {
                let len = ints.next_len()?;

                let keys: Vec<i32> = (0..len).map(|_| ints.next()).collect::<Result<_, _>>()?;
                let children: Vec<NodeAddress> = (0..=len)
                    .map(|_| ints.next_len().map(|child| child as NodeAddress))
                    .collect::<Result<_, _>>()?;

                Ok(Node::Index(IndexNode { keys, children }))
            }

            other => Err(DbError::Corrupted(format!(
                "B+Tree node {address} has unknown node type {other}"
            ))),
        }
    }
}

/// Sequential reader of big endian integers with bounds checking.
struct Ints<'b> {
    buf: &'b [u8],
    offset: usize,
    address: NodeAddress,
}

impl Ints<'_> {
    fn next(&mut self) -> Result<i32, DbError> {
        if self.offset + ATTRIBUTE_SIZE > self.buf.len() {
            return Err(DbError::Corrupted(format!(
                "B+Tree node {} ends unexpectedly at byte {}",
                self.address, self.offset
            )));
        }

        let int = read_i32(self.buf, self.offset);
        self.offset += ATTRIBUTE_SIZE;

        Ok(int)
    }

    /// Reads an integer that can't be negative (lengths, addresses).
    fn next_len(&mut self) -> Result<usize, DbError> {
        let int = self.next()?;

        usize::try_from(int).map_err(|_| {
            DbError::Corrupted(format!(
                "B+Tree node {} contains negative length or address {int}",
                self.address
            ))
        })
    }
}

/// Contents of page zero.
#[derive(Debug, PartialEq, Eq, Clone, Copy)]
pub struct TreeHeader {
    pub root: NodeAddress,
    pub leaves: u32,
    pub order: u32,
}

/// Bulk loaded B+Tree of order `d`.
///
/// # Leaves
///
/// Leaves store up to `2d` [`RecordEntry`] instances, one per distinct key.
/// They are filled left to right, `2d` entries at a time. The only exception
/// is the end of the input: if after filling a node there would be a last node
/// with less than `d` entries, that is when the remaining count is in the
/// exclusive range `(2d, 3d)`, the remaining entries are split in half between
/// the last two nodes instead. So with `d = 2` and 9 entries we get:
///
/// ```text
/// [4] [2] [3]
/// ```
///
/// Instead of `[4] [4] [1]`, where the last leaf would be underfull.
///
/// # Index Nodes
///
/// Each level above the leaves is built the same way but with children:
/// up to `2d + 1` per node, rebalancing the last two nodes when the remaining
/// count falls in `(2d + 1, 3d + 2)`. Keys of an index node are the smallest
/// keys of every child subtree except the first one. Levels are built until
/// one of them contains a single node, the root. Even a tree with only one
/// leaf gets an index root with no keys and one child.
#[derive(Debug, PartialEq, Clone)]
pub struct BPlusTree {
    pub order: usize,
    /// Leaves in key order. Leaf `i` lives at address `i + 1`.
    pub leaves: Vec<LeafNode>,
    /// Index levels from bottom to top. The last level contains only the
    /// root.
    pub levels: Vec<Vec<IndexNode>>,
}

impl BPlusTree {
    /// Builds the tree from unsorted `(key, record id)` pairs.
    ///
    /// Pairs are sorted by key with a stable sort, so record ids that share
    /// a key keep the order in which they were given.
    pub fn bulk_load(order: usize, mut pairs: Vec<(i32, RecordId)>) -> Result<Self, ConfigError> {
        if order == 0 {
            return Err(ConfigError::InvalidOrder(order));
        }

        pairs.sort_by_key(|(key, _)| *key);

        let mut entries: Vec<RecordEntry> = Vec::new();

        for (key, record_id) in pairs {
            match entries.last_mut() {
                Some(entry) if entry.key == key => entry.record_ids.push(record_id),
                _ => entries.push(RecordEntry {
                    key,
                    record_ids: vec![record_id],
                }),
            }
        }

        let mut leaves = Vec::new();
        let mut remaining = entries.into_iter();

        for size in node_sizes(remaining.len(), 2 * order, order) {
            leaves.push(LeafNode {
                entries: remaining.by_ref().take(size).collect(),
            });
        }

        if leaves.is_empty() {
            leaves.push(LeafNode::default());
        }

        // (address, smallest key in subtree) of every node in the level below.
        let mut below: Vec<(NodeAddress, Option<i32>)> = leaves
            .iter()
            .enumerate()
            .map(|(i, leaf)| (i as NodeAddress + 1, leaf.keys().next()))
            .collect();

        let mut next_address = leaves.len() as NodeAddress + 1;
        let mut levels = Vec::new();

        loop {
            let mut level = Vec::new();
            let mut above = Vec::new();
            let mut children = below.into_iter();

            for size in node_sizes(children.len(), 2 * order + 1, order + 1) {
                let group: Vec<_> = children.by_ref().take(size).collect();

                let node = IndexNode {
                    keys: group[1..].iter().filter_map(|(_, key)| *key).collect(),
                    children: group.iter().map(|(address, _)| *address).collect(),
                };

                above.push((next_address, group[0].1));
                next_address += 1;
                level.push(node);
            }

            levels.push(level);

            if above.len() == 1 {
                break;
            }

            below = above;
        }

        Ok(Self {
            order,
            leaves,
            levels,
        })
    }

    /// Total number of nodes, which is also the address of the root.
    pub fn root_address(&self) -> NodeAddress {
        (self.leaves.len() + self.levels.iter().map(Vec::len).sum::<usize>()) as NodeAddress
    }

    pub fn header(&self) -> TreeHeader {
        TreeHeader {
            root: self.root_address(),
            leaves: self.leaves.len() as u32,
            order: self.order as u32,
        }
    }

    /// Writes the header and every node to `io`.
    pub fn write<W: Write + Seek>(&self, io: W, page_size: usize) -> Result<(), DbError> {
        let mut io = PageIo::new(io, page_size);

        let header = self.header();
        let mut page: Vec<u8> = [header.root, header.leaves, header.order]
            .iter()
            .flat_map(|int| (*int as i32).to_be_bytes())
            .collect();
        page.resize(page_size, 0);

        io.write(0, &page)?;

        let mut address: NodeAddress = 1;

        for leaf in &self.leaves {
            io.write(address, &Node::Leaf(leaf.clone()).serialize(page_size)?)?;
            address += 1;
        }

        for node in self.levels.iter().flatten() {
            io.write(address, &Node::Index(node.clone()).serialize(page_size)?)?;
            address += 1;
        }

        io.flush()?;

        Ok(())
    }
}

/// Splits `total` items into nodes of at most `max` items, making sure the
/// last node doesn't end up with less than `min` (unless there's only one
/// node).
fn node_sizes(total: usize, max: usize, min: usize) -> Vec<usize> {
    let mut sizes = Vec::new();
    let mut remaining = total;

    while remaining > 0 {
        if remaining > max && remaining < max + min {
            sizes.push(remaining / 2);
            sizes.push(remaining - remaining / 2);
            break;
        }

        let size = remaining.min(max);
        sizes.push(size);
        remaining -= size;
    }

    sizes
}

/// Read-only access to a serialized [`BPlusTree`].
pub struct IndexReader<I> {
    io: PageIo<I>,
    buf: Vec<u8>,
    header: TreeHeader,
}

impl<F: FileOps> IndexReader<F> {
    pub fn open(path: impl AsRef<Path>, page_size: usize) -> Result<Self, DbError> {
        Self::new(F::open(path)?, page_size)
    }
}

impl<I: Read + Seek> IndexReader<I> {
    /// Reads the header page.
    pub fn new(io: I, page_size: usize) -> Result<Self, DbError> {
        let mut io = PageIo::new(io, page_size);
        let mut buf = vec![0; page_size];

        let read = io.read(0, &mut buf)?;

        if read < 3 * ATTRIBUTE_SIZE {
            return Err(DbError::Corrupted(format!(
                "B+Tree header is {read} bytes long"
            )));
        }

        let ints: Vec<i32> = (0..3).map(|i| read_i32(&buf, i * ATTRIBUTE_SIZE)).collect();

        if ints.iter().any(|int| *int < 0) || ints[1] == 0 || ints[0] <= ints[1] {
            return Err(DbError::Corrupted(format!(
                "invalid B+Tree header: root {}, leaves {}, order {}",
                ints[0], ints[1], ints[2]
            )));
        }

        let header = TreeHeader {
            root: ints[0] as NodeAddress,
            leaves: ints[1] as u32,
            order: ints[2] as u32,
        };

        Ok(Self { io, buf, header })
    }

    pub fn header(&self) -> TreeHeader {
        self.header
    }

    fn is_leaf_address(&self, address: NodeAddress) -> bool {
        address <= self.header.leaves
    }

    /// Reads the node at `address` and checks that its type matches the
    /// position it occupies in the file.
    pub fn read_node(&mut self, address: NodeAddress) -> Result<Node, DbError> {
        if address == 0 || address > self.header.root {
            return Err(DbError::Corrupted(format!(
                "B+Tree node address {address} out of range 1..={}",
                self.header.root
            )));
        }

        let read = self.io.read(address, &mut self.buf)?;

        if read < self.io.page_size {
            return Err(DbError::Corrupted(format!(
                "B+Tree node {address} is {read} bytes long, expected {}",
                self.io.page_size
            )));
        }

        let node = Node::deserialize(address, &self.buf, read)?;

        match (&node, self.is_leaf_address(address)) {
            (Node::Leaf(_), true) | (Node::Index(_), false) => Ok(node),
            (Node::Leaf(_), false) => Err(DbError::Corrupted(format!(
                "expected index node at address {address} but found a leaf"
            ))),
            (Node::Index(_), true) => Err(DbError::Corrupted(format!(
                "expected leaf node at address {address} but found an index node"
            ))),
        }
    }

    /// Reads the leaf at `address`.
    pub fn read_leaf(&mut self, address: NodeAddress) -> Result<LeafNode, DbError> {
        match self.read_node(address)? {
            Node::Leaf(leaf) => Ok(leaf),
            Node::Index(_) => Err(DbError::Corrupted(format!(
                "expected leaf node at address {address}"
            ))),
        }
    }

    /// Descends from the root to the leaf whose range contains `key`.
    pub fn find_leaf_by_key(&mut self, key: i32) -> Result<(NodeAddress, LeafNode), DbError> {
        let mut address = self.header.root;

        loop {
            match self.read_node(address)? {
                Node::Leaf(leaf) => return Ok((address, leaf)),
                Node::Index(node) => address = node.find_child_by_key(key),
            }
        }
    }

    /// Leftmost leaf, which is always at address 1.
    pub fn first_leaf(&mut self) -> Result<(NodeAddress, LeafNode), DbError> {
        Ok((1, self.read_leaf(1)?))
    }

    /// Leaf that comes after `address`, or [`None`] past the last one.
    pub fn next_leaf(
        &mut self,
        address: NodeAddress,
    ) -> Result<Option<(NodeAddress, LeafNode)>, DbError> {
        let next = address + 1;

        if !self.is_leaf_address(next) {
            return Ok(None);
        }

        Ok(Some((next, self.read_leaf(next)?)))
    }

    /// Finds the first entry with key `>= low`, or the very first entry if
    /// there's no lower bound. Returns the leaf address, the leaf itself and
    /// the entry position.
    pub fn lower_bound(
        &mut self,
        low: Option<i32>,
    ) -> Result<Option<(NodeAddress, LeafNode, usize)>, DbError> {
        let (mut address, mut leaf) = match low {
            Some(key) => self.find_leaf_by_key(key)?,
            None => self.first_leaf()?,
        };

        loop {
            let position = match low {
                Some(key) => leaf.lower_bound(key),
                None => (!leaf.entries.is_empty()).then_some(0),
            };

            if let Some(position) = position {
                return Ok(Some((address, leaf, position)));
            }

            match self.next_leaf(address)? {
                Some((next_address, next_leaf)) => {
                    address = next_address;
                    leaf = next_leaf;
                }
                None => return Ok(None),
            }
        }
    }

    /// Every key in the tree, walking leaves left to right.
    pub fn keys(&mut self) -> Result<Vec<i32>, DbError> {
        let mut keys = Vec::new();
        let mut current = Some(self.first_leaf()?);

        while let Some((address, leaf)) = current {
            keys.extend(leaf.keys());
            current = self.next_leaf(address)?;
        }

        Ok(keys)
    }
}

#[cfg(test)]
mod tests {
    use std::io;

    use rand::{rngs::StdRng, seq::SliceRandom, Rng, SeedableRng};

    use super::{node_sizes, BPlusTree, IndexNode, IndexReader, LeafNode, Node, RecordEntry};
    use crate::{config::ConfigError, db::DbError, storage::tuple::RecordId};

    const PAGE_SIZE: usize = 4096;

    fn pairs(keys: impl IntoIterator<Item = i32>) -> Vec<(i32, RecordId)> {
        keys.into_iter()
            .enumerate()
            .map(|(i, key)| (key, RecordId::new(i as u32 / 10, i as u32 % 10)))
            .collect()
    }

    fn write(tree: &BPlusTree) -> Result<IndexReader<io::Cursor<Vec<u8>>>, DbError> {
        let mut buf = io::Cursor::new(Vec::new());
        tree.write(&mut buf, PAGE_SIZE)?;
        IndexReader::new(io::Cursor::new(buf.into_inner()), PAGE_SIZE)
    }

    #[test]
    fn node_sizes_rebalance_the_tail() {
        // d = 2, leaves hold up to 4 entries.
        assert_eq!(node_sizes(8, 4, 2), vec![4, 4]);
        assert_eq!(node_sizes(9, 4, 2), vec![4, 2, 3]);
        assert_eq!(node_sizes(10, 4, 2), vec![4, 4, 2]);
        assert_eq!(node_sizes(5, 4, 2), vec![2, 3]);
        assert_eq!(node_sizes(3, 4, 2), vec![3]);
        assert_eq!(node_sizes(0, 4, 2), Vec::<usize>::new());
        // Index nodes with d = 2 hold up to 5 children.
        assert_eq!(node_sizes(7, 5, 3), vec![3, 4]);
        assert_eq!(node_sizes(8, 5, 3), vec![5, 3]);
    }

    #[test]
    fn find_child_by_key() {
        let node = IndexNode {
            keys: vec![10, 20],
            children: vec![1, 2, 3],
        };

        assert_eq!(node.find_child_by_key(5), 1);
        assert_eq!(node.find_child_by_key(10), 2);
        assert_eq!(node.find_child_by_key(19), 2);
        assert_eq!(node.find_child_by_key(20), 3);
        assert_eq!(node.find_child_by_key(1000), 3);
    }

    #[test]
    fn small_tree_structure() -> Result<(), ConfigError> {
        let tree = BPlusTree::bulk_load(1, pairs([5, 1, 3, 2, 4]))?;

        let leaf_keys: Vec<Vec<i32>> = tree.leaves.iter().map(|l| l.keys().collect()).collect();

        // d = 1 allows a single entry in the last leaf.
        assert_eq!(leaf_keys, vec![vec![1, 2], vec![3, 4], vec![5]]);

        assert_eq!(tree.levels.len(), 1);
        assert_eq!(
            tree.levels[0],
            vec![IndexNode {
                keys: vec![3, 5],
                children: vec![1, 2, 3],
            }]
        );
        assert_eq!(tree.root_address(), 4);

        Ok(())
    }

    #[test]
    fn duplicates_are_grouped_in_order() -> Result<(), ConfigError> {
        let tree = BPlusTree::bulk_load(
            2,
            vec![
                (7, RecordId::new(0, 0)),
                (3, RecordId::new(0, 1)),
                (7, RecordId::new(0, 2)),
                (7, RecordId::new(1, 0)),
            ],
        )?;

        assert_eq!(
            tree.leaves,
            vec![LeafNode {
                entries: vec![
                    RecordEntry {
                        key: 3,
                        record_ids: vec![RecordId::new(0, 1)],
                    },
                    RecordEntry {
                        key: 7,
                        record_ids: vec![
                            RecordId::new(0, 0),
                            RecordId::new(0, 2),
                            RecordId::new(1, 0)
                        ],
                    },
                ],
            }]
        );

        Ok(())
    }

    #[test]
    fn children_count_invariant() -> Result<(), ConfigError> {
        let tree = BPlusTree::bulk_load(2, pairs(0..500))?;

        for node in tree.levels.iter().flatten() {
            assert_eq!(node.children.len(), node.keys.len() + 1);
        }

        for leaf in &tree.leaves[..tree.leaves.len() - 1] {
            assert!(leaf.entries.len() >= 2 && leaf.entries.len() <= 4);
        }

        assert_eq!(tree.levels.last().map(Vec::len), Some(1));

        Ok(())
    }

    #[test]
    fn serialized_leaves_are_sorted() -> Result<(), DbError> {
        let mut rng = StdRng::seed_from_u64(42);
        let mut keys: Vec<i32> = (0..2000).map(|_| rng.gen_range(-500..500)).collect();

        let tree = BPlusTree::bulk_load(3, pairs(keys.clone()))?;
        let mut reader = write(&tree)?;

        keys.sort();
        keys.dedup();

        assert_eq!(reader.keys()?, keys);

        Ok(())
    }

    #[test]
    fn find_leaf_brackets_key() -> Result<(), DbError> {
        let mut keys: Vec<i32> = (0..300).map(|i| i * 2).collect();
        keys.shuffle(&mut StdRng::seed_from_u64(7));

        let tree = BPlusTree::bulk_load(2, pairs(keys))?;
        let mut reader = write(&tree)?;

        for key in [-1, 0, 1, 37, 298, 299, 598, 1000] {
            let (address, leaf) = reader.find_leaf_by_key(key)?;

            let first = leaf.entries.first().map(|e| e.key).unwrap_or(i32::MIN);
            let last = leaf.entries.last().map(|e| e.key).unwrap_or(i32::MAX);

            // Either the key falls inside the leaf or it's in the gap before
            // the next leaf.
            let next_first = reader
                .next_leaf(address)?
                .and_then(|(_, next)| next.entries.first().map(|e| e.key));

            assert!(first <= key || address == 1, "key {key} before leaf {address}");
            assert!(
                key <= last || next_first.map_or(true, |next| key < next),
                "key {key} after leaf {address}"
            );
        }

        Ok(())
    }

    #[test]
    fn lower_bound_crosses_leaves() -> Result<(), DbError> {
        let tree = BPlusTree::bulk_load(1, pairs([10, 20, 30, 40, 50]))?;
        let mut reader = write(&tree)?;

        let (_, leaf, position) = reader.lower_bound(Some(21))?.expect("30 >= 21");
        assert_eq!(leaf.entries[position].key, 30);

        let (address, leaf, position) = reader.lower_bound(None)?.expect("not empty");
        assert_eq!((address, leaf.entries[position].key), (1, 10));

        assert!(reader.lower_bound(Some(51))?.is_none());

        Ok(())
    }

    #[test]
    fn empty_tree() -> Result<(), DbError> {
        let tree = BPlusTree::bulk_load(2, Vec::new())?;
        let mut reader = write(&tree)?;

        assert_eq!(reader.header().leaves, 1);
        assert_eq!(reader.keys()?, Vec::<i32>::new());
        assert!(reader.lower_bound(Some(0))?.is_none());

        Ok(())
    }

    #[test]
    fn wrong_node_type_is_corruption() -> Result<(), DbError> {
        let tree = BPlusTree::bulk_load(1, pairs(0..10))?;

        let mut buf = io::Cursor::new(Vec::new());
        tree.write(&mut buf, PAGE_SIZE)?;
        let mut bytes = buf.into_inner();

        // Flip the discriminator of leaf 1 into an index node.
        bytes[PAGE_SIZE + 3] = 1;

        let mut reader = IndexReader::new(io::Cursor::new(bytes), PAGE_SIZE)?;
        assert!(matches!(reader.read_node(1), Err(DbError::Corrupted(_))));
        assert!(matches!(reader.read_node(999), Err(DbError::Corrupted(_))));

        Ok(())
    }

    #[test]
    fn truncated_file_is_corruption() -> Result<(), DbError> {
        let tree = BPlusTree::bulk_load(1, pairs(0..10))?;
        let root = tree.root_address() as usize;

        let mut buf = io::Cursor::new(Vec::new());
        tree.write(&mut buf, PAGE_SIZE)?;
        let bytes = buf.into_inner();

        // Root page cut in half.
        let mut short_root = bytes.clone();
        short_root.truncate(root * PAGE_SIZE + PAGE_SIZE / 2);
        let mut reader = IndexReader::new(io::Cursor::new(short_root), PAGE_SIZE)?;
        assert!(matches!(reader.find_leaf_by_key(5), Err(DbError::Corrupted(_))));
        assert!(matches!(reader.read_node(1), Ok(Node::Leaf(_))));

        // Second leaf cut after a few bytes, everything after it is gone.
        let mut short_leaf = bytes.clone();
        short_leaf.truncate(2 * PAGE_SIZE + 8);
        let mut reader = IndexReader::new(io::Cursor::new(short_leaf), PAGE_SIZE)?;
        assert!(matches!(reader.read_leaf(2), Err(DbError::Corrupted(_))));

        // Header shorter than its three integers.
        let mut short_header = bytes;
        short_header.truncate(8);
        assert!(matches!(
            IndexReader::new(io::Cursor::new(short_header), PAGE_SIZE),
            Err(DbError::Corrupted(_))
        ));

        Ok(())
    }

    #[test]
    fn node_too_large() {
        let leaf = Node::Leaf(LeafNode {
            entries: vec![RecordEntry {
                key: 1,
                record_ids: vec![RecordId::new(0, 0); 10],
            }],
        });

        assert!(matches!(
            leaf.serialize(32),
            Err(ConfigError::NodeTooLarge { .. })
        ));
    }

    #[test]
    fn node_round_trip() -> Result<(), DbError> {
        let node = Node::Index(IndexNode {
            keys: vec![-4, 9],
            children: vec![1, 2, 3],
        });

        let buf = node.serialize(64)?;
        assert_eq!(Node::deserialize(5, &buf, buf.len())?, node);

        Ok(())
    }
}
