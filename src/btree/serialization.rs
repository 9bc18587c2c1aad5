//! Page layouts for B+ tree nodes and the index meta page

use crate::file::{PAGE_SIZE, Page, PageId, TableId};
use crate::record::{RecordError, RecordId, Value, get_i32, get_u8, put_i32};

use super::error::{BTreeError, BTreeResult};
use super::node::{BPlusNode, InternalNode, LeafNode};

/// Magic number for index files: "BTRE" in ASCII
pub const MAGIC_NUMBER: u32 = 0x42545245;

/// Current index file version
pub const VERSION: u32 = 1;

const INTERNAL_MARKER: u8 = 0;
const LEAF_MARKER: u8 = 1;
const NO_PAGE: i32 = -1;

/// Metadata stored in page 0 of an index file
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TreeMetadata {
    pub order: usize,
    pub root: Option<PageId>,
    pub entry_count: u64,
}

/// Write metadata into a (meta) page
pub fn serialize_metadata(metadata: &TreeMetadata, page: &mut Page) {
    let buf = page.data_mut();
    buf.fill(0);
    buf[0..4].copy_from_slice(&MAGIC_NUMBER.to_le_bytes());
    buf[4..8].copy_from_slice(&VERSION.to_le_bytes());
    buf[8..12].copy_from_slice(&(metadata.order as u32).to_le_bytes());
    buf[12..16].copy_from_slice(&page_ref(metadata.root).to_le_bytes());
    buf[16..24].copy_from_slice(&metadata.entry_count.to_le_bytes());
}

/// Read metadata from page 0
pub fn deserialize_metadata(file: TableId, page: &Page) -> BTreeResult<TreeMetadata> {
    let buf = page.data();
    let invalid = |reason: String| BTreeError::InvalidMetaPage { file, reason };

    let magic = u32::from_le_bytes([buf[0], buf[1], buf[2], buf[3]]);
    if magic != MAGIC_NUMBER {
        return Err(invalid(format!("bad magic number {:#010x}", magic)));
    }
    let version = u32::from_le_bytes([buf[4], buf[5], buf[6], buf[7]]);
    if version != VERSION {
        return Err(invalid(format!("unsupported version {}", version)));
    }
    let order = u32::from_le_bytes([buf[8], buf[9], buf[10], buf[11]]) as usize;
    let root = i32::from_le_bytes([buf[12], buf[13], buf[14], buf[15]]);
    let root = if root == NO_PAGE {
        None
    } else if root > 0 {
        Some(root as PageId)
    } else {
        return Err(invalid(format!("root page {}", root)));
    };
    let mut count = [0u8; 8];
    count.copy_from_slice(&buf[16..24]);

    Ok(TreeMetadata {
        order,
        root,
        entry_count: u64::from_le_bytes(count),
    })
}

/// Encode a node into a page.
///
/// Leaf: `[1][count i32][next i32][(tagged key, packed rid i32)]*`
/// Internal: `[0][key count i32][tagged key]*[child count i32][child i32]*`
pub fn serialize_node(node: &BPlusNode, page: &mut Page) -> BTreeResult<()> {
    let mut out = Vec::with_capacity(PAGE_SIZE);
    match node {
        BPlusNode::Leaf(leaf) => {
            out.push(LEAF_MARKER);
            put_i32(&mut out, leaf.keys.len() as i32);
            put_i32(&mut out, page_ref(leaf.next));
            for (key, rid) in leaf.keys.iter().zip(&leaf.values) {
                key.encode_into(&mut out);
                put_i32(&mut out, rid.pack() as i32);
            }
        }
        BPlusNode::Internal(internal) => {
            out.push(INTERNAL_MARKER);
            put_i32(&mut out, internal.keys.len() as i32);
            for key in &internal.keys {
                key.encode_into(&mut out);
            }
            put_i32(&mut out, internal.children.len() as i32);
            for &child in &internal.children {
                put_i32(&mut out, child as i32);
            }
        }
    }

    if out.len() > PAGE_SIZE {
        return Err(BTreeError::NodeOverflow {
            page_id: page.page_id(),
            size: out.len(),
        });
    }

    let buf = page.data_mut();
    buf.fill(0);
    buf[..out.len()].copy_from_slice(&out);
    Ok(())
}

/// Decode the node stored in a page
pub fn deserialize_node(page: &Page) -> BTreeResult<BPlusNode> {
    let page_id = page.page_id();
    let buf = page.data();
    let corrupt = |reason: String| BTreeError::Corruption { page_id, reason };
    let truncated = |e: RecordError| corrupt(e.to_string());
    let mut pos = 0;

    let marker = get_u8(buf, &mut pos).map_err(truncated)?;
    match marker {
        LEAF_MARKER => {
            let count = read_count(buf, &mut pos).map_err(&corrupt)?;
            let next = get_i32(buf, &mut pos).map_err(truncated)?;
            let next = match next {
                NO_PAGE => None,
                n if n > 0 => Some(n as PageId),
                n => return Err(corrupt(format!("next leaf {}", n))),
            };

            let mut leaf = LeafNode {
                keys: Vec::with_capacity(count),
                values: Vec::with_capacity(count),
                next,
            };
            for _ in 0..count {
                leaf.keys.push(Value::decode(buf, &mut pos).map_err(truncated)?);
                let packed = get_i32(buf, &mut pos).map_err(truncated)?;
                leaf.values.push(RecordId::unpack(packed as u32));
            }
            Ok(BPlusNode::Leaf(leaf))
        }
        INTERNAL_MARKER => {
            let key_count = read_count(buf, &mut pos).map_err(&corrupt)?;
            let mut keys = Vec::with_capacity(key_count);
            for _ in 0..key_count {
                keys.push(Value::decode(buf, &mut pos).map_err(truncated)?);
            }

            let child_count = read_count(buf, &mut pos).map_err(&corrupt)?;
            if child_count != key_count + 1 {
                return Err(corrupt(format!(
                    "{} children for {} keys",
                    child_count, key_count
                )));
            }
            let mut children = Vec::with_capacity(child_count);
            for _ in 0..child_count {
                let child = get_i32(buf, &mut pos).map_err(truncated)?;
                if child <= 0 {
                    return Err(corrupt(format!("child page {}", child)));
                }
                children.push(child as PageId);
            }
            Ok(BPlusNode::Internal(InternalNode { keys, children }))
        }
        other => Err(corrupt(format!("unknown node marker {}", other))),
    }
}

/// Read a non-negative element count that could fit in a page
fn read_count(buf: &[u8], pos: &mut usize) -> Result<usize, String> {
    let count = get_i32(buf, pos).map_err(|e| e.to_string())?;
    if count < 0 || count as usize > PAGE_SIZE {
        return Err(format!("element count {}", count));
    }
    Ok(count as usize)
}

fn page_ref(page: Option<PageId>) -> i32 {
    page.map(|id| id as i32).unwrap_or(NO_PAGE)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_metadata_layout() {
        let meta = TreeMetadata {
            order: 4,
            root: Some(3),
            entry_count: 17,
        };
        let mut page = Page::zeroed(5, 0);
        serialize_metadata(&meta, &mut page);

        assert_eq!(&page.data()[0..4], &MAGIC_NUMBER.to_le_bytes());
        assert_eq!(deserialize_metadata(5, &page).unwrap(), meta);

        let empty = TreeMetadata {
            root: None,
            ..meta
        };
        serialize_metadata(&empty, &mut page);
        assert_eq!(page.read_i32(12), -1);
        assert_eq!(deserialize_metadata(5, &page).unwrap().root, None);
    }

    #[test]
    fn test_metadata_rejects_zero_page() {
        let page = Page::zeroed(5, 0);
        assert!(matches!(
            deserialize_metadata(5, &page),
            Err(BTreeError::InvalidMetaPage { file: 5, .. })
        ));
    }

    #[test]
    fn test_leaf_layout() {
        let mut leaf = LeafNode::with_entries(
            vec![Value::Int(7), Value::from("k")],
            vec![RecordId::new(1, 2), RecordId::new(3, 4)],
        );
        leaf.next = Some(6);
        let node = BPlusNode::Leaf(leaf);

        let mut page = Page::zeroed(5, 2);
        serialize_node(&node, &mut page).unwrap();
        assert_eq!(page.data()[0], LEAF_MARKER);
        assert_eq!(i32::from_le_bytes(page.data()[1..5].try_into().unwrap()), 2);
        assert_eq!(i32::from_le_bytes(page.data()[5..9].try_into().unwrap()), 6);

        assert_eq!(deserialize_node(&page).unwrap(), node);
    }

    #[test]
    fn test_internal_node_decodes() {
        let node = BPlusNode::Internal(InternalNode::new(
            vec![Value::Int(10), Value::Int(20)],
            vec![1, 2, 3],
        ));
        let mut page = Page::zeroed(5, 4);
        serialize_node(&node, &mut page).unwrap();
        assert_eq!(page.data()[0], INTERNAL_MARKER);
        assert_eq!(deserialize_node(&page).unwrap(), node);
    }

    #[test]
    fn test_overflowing_node() {
        let big = "x".repeat(PAGE_SIZE);
        let node = BPlusNode::Leaf(LeafNode::with_entries(
            vec![Value::from(big)],
            vec![RecordId::new(1, 0)],
        ));
        let mut page = Page::zeroed(5, 1);
        assert!(matches!(
            serialize_node(&node, &mut page),
            Err(BTreeError::NodeOverflow { page_id: 1, .. })
        ));
    }

    #[test]
    fn test_corrupt_nodes() {
        let mut page = Page::zeroed(5, 1);
        page.data_mut()[0] = 7;
        assert!(matches!(
            deserialize_node(&page),
            Err(BTreeError::Corruption { page_id: 1, .. })
        ));

        // A zero page reads as an internal node without children
        let page = Page::zeroed(5, 1);
        assert!(deserialize_node(&page).is_err());

        // Leaf claiming more entries than the page holds
        let mut page = Page::zeroed(5, 1);
        page.data_mut()[0] = LEAF_MARKER;
        page.data_mut()[1..5].copy_from_slice(&1000i32.to_le_bytes());
        page.data_mut()[5..9].copy_from_slice(&(-1i32).to_le_bytes());
        assert!(deserialize_node(&page).is_err());
    }
}
