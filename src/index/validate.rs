//! Index validation: walks the `next_block` chain checking the
//! universal invariants `spec.md` §8 requires to hold after any
//! committed operation. Grounded on
//! `original_source/src/hnsw/validate_index.c`'s crawl-and-assert
//! structure, exposed here as a library function and (`main.rs`) a
//! `validate` CLI subcommand.

use std::collections::HashSet;

use crate::buffer::{BufferManager, FileHost, PageGuard};
use crate::error::{PageError, Result};
use crate::header::IndexHeader;
use crate::slot::{Slot, INVALID_BLOCK};

/// One violation of a universal invariant (`spec.md` §8), numbered to
/// match the spec's own enumeration so a report reads back against it
/// directly.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Violation {
    pub invariant: u8,
    pub detail: String,
}

/// A validation pass's outcome: every node visited plus any violations
/// found. An empty `violations` list means the index is consistent.
#[derive(Clone, Debug, Default)]
pub struct ValidationReport {
    pub nodes_visited: u32,
    pub violations: Vec<Violation>,
}

impl ValidationReport {
    pub fn is_clean(&self) -> bool {
        self.violations.is_empty()
    }
}

/// Crawl every data page reachable from block 1 via `next_block`,
/// checking the five universal invariants (`spec.md` §8):
/// 1. every neighbor slot decodes to a real node whose level covers the
///    edge's level,
/// 2. no neighbor list has duplicates or self-references,
/// 3. `num_nodes` matches the count of node items across the chain,
/// 4. the entry slot is `INVALID` iff the index is empty, else
///    references a max-level node,
/// 5. (not checked here — an edge-rewrite property, exercised by the
///    `build` module's `edge_rewrite_is_idempotent` test instead).
pub fn validate(host: &FileHost) -> Result<ValidationReport> {
    let header_guard = host.read_shared(0)?;
    let header = IndexHeader::read_from_page(header_guard.page())?;
    drop(header_guard);

    let mut report = ValidationReport::default();

    if header.is_empty() {
        if header.last_data_block != INVALID_BLOCK {
            report.violations.push(Violation {
                invariant: 4,
                detail: "num_nodes == 0 but last_data_block is not INVALID".into(),
            });
        }
        if !header.entry_slot.is_invalid() {
            report.violations.push(Violation {
                invariant: 4,
                detail: "num_nodes == 0 but entry_slot is not INVALID".into(),
            });
        }
        return Ok(report);
    }

    let mut max_level_seen: u8 = 0;
    let mut max_level_slots: Vec<Slot> = Vec::new();
    let mut block = 1u32;
    let mut visited_blocks = HashSet::new();

    while block != INVALID_BLOCK {
        if !visited_blocks.insert(block) {
            report.violations.push(Violation {
                invariant: 3,
                detail: format!("next_block chain cycles back to block {block}"),
            });
            break;
        }
        let guard = host.read_shared(block)?;
        let page = guard.page();
        let item_count = page.item_count();

        for offset in 0..item_count {
            let decoded = match page.decode_node(offset, header.m, &header.quantization, header.dim as usize) {
                Ok(d) => d,
                Err(PageError::InvariantViolation { detail, .. }) => {
                    report.violations.push(Violation { invariant: 1, detail });
                    continue;
                }
                Err(e) => return Err(e.into()),
            };
            report.nodes_visited += 1;
            let slot = Slot::from_tid(block, offset);

            if decoded.level > max_level_seen {
                max_level_seen = decoded.level;
                max_level_slots.clear();
                max_level_slots.push(slot);
            } else if decoded.level == max_level_seen {
                max_level_slots.push(slot);
            }

            for (level, neighbors) in decoded.neighbor_lists.iter().enumerate() {
                let mut seen = HashSet::new();
                for &n in neighbors {
                    if n == slot {
                        report.violations.push(Violation {
                            invariant: 2,
                            detail: format!("node at {slot:?} references itself at level {level}"),
                        });
                        continue;
                    }
                    if !seen.insert(n) {
                        report.violations.push(Violation {
                            invariant: 2,
                            detail: format!("node at {slot:?} has a duplicate neighbor at level {level}"),
                        });
                        continue;
                    }
                    match read_node(host, n, &header) {
                        Ok(neighbor) => {
                            if (neighbor.level as usize) < level {
                                report.violations.push(Violation {
                                    invariant: 1,
                                    detail: format!("neighbor {n:?} at level {level} has level {}", neighbor.level),
                                });
                            }
                        }
                        Err(_) => {
                            report.violations.push(Violation {
                                invariant: 1,
                                detail: format!("neighbor slot {n:?} at level {level} does not decode to a node"),
                            });
                        }
                    }
                }
            }
        }

        block = page.special_area().next_block;
    }

    if report.nodes_visited != header.num_nodes {
        report.violations.push(Violation {
            invariant: 3,
            detail: format!("header.num_nodes == {} but chain holds {} nodes", header.num_nodes, report.nodes_visited),
        });
    }

    if header.entry_slot.is_invalid() {
        report.violations.push(Violation {
            invariant: 4,
            detail: "num_nodes > 0 but entry_slot is INVALID".into(),
        });
    } else if !max_level_slots.contains(&header.entry_slot) {
        report.violations.push(Violation {
            invariant: 4,
            detail: format!("entry_slot {:?} does not reference a max-level ({}) node", header.entry_slot, max_level_seen),
        });
    }

    Ok(report)
}

fn read_node(host: &FileHost, slot: Slot, header: &IndexHeader) -> Result<crate::page::DecodedTuple> {
    let guard = host.read_shared(slot.block())?;
    Ok(guard.page().decode_node(slot.offset(), header.m, &header.quantization, header.dim as usize)?)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::hnsw::HnswParams;
    use crate::index::build;
    use crate::row_id::RowId;
    use crate::vector::{Metric, Quantization, Vector};

    fn temp_host() -> (tempfile::TempDir, FileHost) {
        let dir = tempfile::tempdir().unwrap();
        let host = FileHost::open_at(dir.path().join("pages.db"), dir.path().join("wal.log")).unwrap();
        (dir, host)
    }

    #[test]
    fn a_freshly_built_index_validates_cleanly() {
        let (_dir, host) = temp_host();
        let params = HnswParams::new(4, 16, 16).unwrap();
        let tuples: Vec<_> = (0..20u8)
            .map(|i| (RowId::new([i, 0, 0, 0, 0, 0]), Vector::F32(vec![i as f32, (i % 5) as f32])))
            .collect();
        build::build(&host, &params, Metric::L2Sq, Quantization::F32, 2, params.seed, tuples).unwrap();

        let report = validate(&host).unwrap();
        assert!(report.is_clean(), "violations: {:?}", report.violations);
        assert_eq!(report.nodes_visited, 20);
    }

    #[test]
    fn an_empty_index_validates_cleanly() {
        let (_dir, host) = temp_host();
        let params = HnswParams::default();
        build::build_empty(&host, &params, Metric::L2Sq, Quantization::F32, 3).unwrap();
        let report = validate(&host).unwrap();
        assert!(report.is_clean());
        assert_eq!(report.nodes_visited, 0);
    }

    #[test]
    fn a_self_referencing_neighbor_is_flagged() {
        let (_dir, host) = temp_host();
        let params = HnswParams::new(4, 16, 16).unwrap();
        build::build(
            &host,
            &params,
            Metric::L2Sq,
            Quantization::F32,
            1,
            params.seed,
            vec![(RowId::new([0; 6]), Vector::F32(vec![0.0]))],
        )
        .unwrap();

        let mut page = host.read_exclusive(1).unwrap().page().clone();
        page.rewrite_neighbors(0, 0, params.m, &[Slot::from_tid(1, 0)]).unwrap();
        host.write_block(1, &page).unwrap();

        let report = validate(&host).unwrap();
        assert!(!report.is_clean());
        assert!(report.violations.iter().any(|v| v.invariant == 2));
    }
}
