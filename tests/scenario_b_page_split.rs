//! `spec.md` §8 Scenario B: "near-full page split" — with a vector
//! dimension chosen so exactly 5 nodes fit per page, inserting 11
//! vectors produces 3 data pages chained 1->2->3->INVALID with the
//! superblock's node count at 11.
//!
//! Page placement is exercised directly against [`Page`]/[`FileHost`]
//! rather than through a full `build()` call, mirroring
//! `index/build.rs`'s step 2-3 placement loop so the dimension
//! arithmetic below is deterministic and independent of the geometric
//! layer-assignment draw.

use hnswpage::buffer::{BufferManager, PageGuard};
use hnswpage::hnsw::node::Node;
use hnswpage::row_id::RowId;
use hnswpage::slot::INVALID_BLOCK;
use hnswpage::vector::Vector;

const M: u32 = 2;
const DIM: usize = 350;

fn sample_node(i: u32) -> Node {
    Node::new(RowId::from_page_offset(i, 0), 0, Vector::F32(vec![i as f32; DIM]))
}

#[test]
fn eleven_level_zero_nodes_split_across_three_pages() {
    let dir = tempfile::tempdir().unwrap();
    let host = hnswpage::buffer::FileHost::open_at(dir.path().join("pages.db"), dir.path().join("wal.log")).unwrap();

    // Block 0 reserved for the superblock, exactly as `build()` does.
    host.allocate().unwrap();

    let first = host.allocate().unwrap();
    let mut current_block = first.block();
    let mut current_page = first.page().clone();
    let mut chain = vec![current_block];
    let mut total_items = 0u32;

    for i in 0..11u32 {
        let node = sample_node(i);
        let tuple_len = hnswpage::hnsw::node::node_encoded_len(node.level, M, node.vector.to_bytes().len());
        assert_eq!(tuple_len, 1442, "sanity: node size matches the picked dim/M");

        if !current_page.can_fit(tuple_len) {
            host.write_block(current_block, &current_page).unwrap();
            let next = host.allocate().unwrap();
            let mut area = current_page.special_area();
            area.next_block = next.block();
            current_page.set_special_area(area);
            host.write_block(current_block, &current_page).unwrap();

            current_block = next.block();
            current_page = next.page().clone();
            chain.push(current_block);
        }

        current_page.append_node(i, &node, M).unwrap();
        total_items += 1;
    }
    host.write_block(current_block, &current_page).unwrap();

    assert_eq!(chain, vec![1, 2, 3], "expected exactly 3 data pages");
    assert_eq!(total_items, 11);

    let page1 = host.read_shared(1).unwrap();
    let page2 = host.read_shared(2).unwrap();
    let page3 = host.read_shared(3).unwrap();
    assert_eq!(page1.page().item_count(), 5);
    assert_eq!(page2.page().item_count(), 5);
    assert_eq!(page3.page().item_count(), 1);

    assert_eq!(page1.page().special_area().next_block, 2);
    assert_eq!(page2.page().special_area().next_block, 3);
    assert_eq!(page3.page().special_area().next_block, INVALID_BLOCK);

    let last_data_block = current_block;
    assert_eq!(last_data_block, 3, "last_data_block must be the third page");
}
