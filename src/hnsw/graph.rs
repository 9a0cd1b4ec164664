//! The HNSW algorithm itself: layer assignment (`params.rs`), greedy
//! descent, bounded beam search, and heuristic neighbor pruning
//! (`spec.md` §4.1). Generic over [`Retriever`] so the same code drives
//! both the in-memory bulk-build graph and a page-backed incremental
//! insert, per the redesign note in `spec.md` §9: "the graph engine
//! takes this trait object and never knows about pages directly".
//!
//! Grounded on the teacher's `vector/custom_hnsw/index.rs`
//! (`insert_into_graph`, `select_neighbors_heuristic`, `search_layer`),
//! reworked so every neighbor dereference goes through a [`Retriever`]
//! instead of indexing a resident `Vec<HNSWNode>` directly.

use std::cell::RefCell;
use std::cmp::Reverse;
use std::collections::{BinaryHeap, HashSet};

use ordered_float::OrderedFloat;
use rand::Rng;

use crate::error::{GraphError, Result};
use crate::hnsw::params::{assign_level, HnswParams};
use crate::retriever::Retriever;
use crate::row_id::RowId;
use crate::slot::Slot;
use crate::vector::{Metric, Vector};

/// A candidate in a beam-search frontier: a distance to some fixed query
/// point plus the slot it was computed against. Ordered by `(distance,
/// slot)`, which is both a valid min/max-heap key and the deterministic
/// tie-break `spec.md` §4.1 calls for ("break by lower slot identifier").
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord)]
pub struct Candidate {
    pub distance: OrderedFloat<f32>,
    pub slot: Slot,
}

impl Candidate {
    pub fn new(distance: f32, slot: Slot) -> Self {
        Candidate {
            distance: OrderedFloat(distance),
            slot,
        }
    }
}

/// The mutable runtime state a graph carries across inserts: the entry
/// point and the level it sits on (`spec.md` §3 "Index header
/// invariants": "references a node with level equal to the maximum
/// level present").
#[derive(Clone, Copy, Debug, Default)]
pub struct GraphState {
    pub entry_point: Option<Slot>,
    pub max_level: u8,
}

/// Greedy descent (`spec.md` §4.1 step 2): starting at `entry`, on each
/// level from `from_level` down to `to_level`, repeatedly replace the
/// current node with any neighbor strictly closer to `query`, until no
/// neighbor improves, then drop a level.
pub fn greedy_descent<R: Retriever>(
    retriever: &mut R,
    metric: Metric,
    query: &Vector,
    entry: Slot,
    from_level: u8,
    to_level: u8,
) -> Result<Slot> {
    let mut current = entry;
    let mut current_dist = metric.distance(query, &retriever.vector(current)?);
    let mut level = from_level;
    loop {
        loop {
            let mut improved = None;
            for neighbor in retriever.neighbors(current, level)? {
                if neighbor.is_invalid() {
                    continue;
                }
                let d = metric.distance(query, &retriever.vector(neighbor)?);
                if d < current_dist {
                    current_dist = d;
                    improved = Some(neighbor);
                }
            }
            match improved {
                Some(next) => current = next,
                None => break,
            }
        }
        if level == to_level {
            break;
        }
        level -= 1;
    }
    Ok(current)
}

/// Scratch structures one `search_layer` call needs: the visited set,
/// candidate min-heap, and result max-heap. Reused across calls on the
/// same thread (`SPEC_FULL.md` §4.1 "Thread-local query scratch
/// buffers", grounded on the teacher's `custom_hnsw/query_buffers.rs`)
/// to avoid a fresh heap allocation per beam-search call; cleared, never
/// resized down, at the start of each use. Purely a performance
/// concern — every caller still sees a query-scoped, empty-on-entry
/// set of buffers.
#[derive(Default)]
struct QueryBuffers {
    visited: HashSet<Slot>,
    candidates: BinaryHeap<Reverse<Candidate>>,
    results: BinaryHeap<Candidate>,
}

thread_local! {
    static QUERY_BUFFERS: RefCell<QueryBuffers> = RefCell::new(QueryBuffers::default());
}

/// Bounded beam search at a single level (`spec.md` §4.1 step 3 /
/// §4.1 "Search algorithm" step 2). Returns up to `ef` results sorted
/// ascending by distance to `query`.
pub fn search_layer<R: Retriever>(
    retriever: &mut R,
    metric: Metric,
    query: &Vector,
    entry_points: &[Slot],
    ef: usize,
    level: u8,
) -> Result<Vec<Candidate>> {
    QUERY_BUFFERS.with(|cell| {
        let mut buffers = cell.borrow_mut();
        buffers.visited.clear();
        buffers.candidates.clear();
        buffers.results.clear();
        search_layer_with(retriever, metric, query, entry_points, ef, level, &mut *buffers)
    })
}

fn search_layer_with<R: Retriever>(
    retriever: &mut R,
    metric: Metric,
    query: &Vector,
    entry_points: &[Slot],
    ef: usize,
    level: u8,
    buffers: &mut QueryBuffers,
) -> Result<Vec<Candidate>> {
    let visited = &mut buffers.visited;
    let candidates = &mut buffers.candidates;
    let results = &mut buffers.results;
    visited.extend(entry_points.iter().copied());

    for &ep in entry_points {
        let d = metric.distance(query, &retriever.vector(ep)?);
        let c = Candidate::new(d, ep);
        candidates.push(Reverse(c));
        results.push(c);
    }

    while let Some(Reverse(current)) = candidates.pop() {
        if let Some(worst) = results.peek() {
            if results.len() >= ef && current.distance > worst.distance {
                break;
            }
        }
        for neighbor in retriever.neighbors(current.slot, level)? {
            if neighbor.is_invalid() || !visited.insert(neighbor) {
                continue;
            }
            let d = metric.distance(query, &retriever.vector(neighbor)?);
            let c = Candidate::new(d, neighbor);

            if results.len() < ef {
                candidates.push(Reverse(c));
                results.push(c);
            } else if let Some(&worst) = results.peek() {
                if c.distance < worst.distance {
                    results.pop();
                    results.push(c);
                    candidates.push(Reverse(c));
                }
            }
        }
    }

    Ok(results.clone().into_sorted_vec())
}

/// Heuristic neighbor selection (`spec.md` §4.1 step 3, bullet 2):
/// `candidates` must already be sorted ascending by distance to the
/// point being connected. Keeps the closest candidate unconditionally;
/// admits each further candidate `c` only if it is closer to every
/// already-kept neighbor `k` than `k` is to `c` — rejecting candidates
/// that are redundant with (near-collinear to) a neighbor already kept.
pub fn select_neighbors_heuristic<R: Retriever>(
    retriever: &mut R,
    metric: Metric,
    candidates: Vec<Candidate>,
    cap: usize,
) -> Result<Vec<Candidate>> {
    let mut selected: Vec<Candidate> = Vec::new();
    for c in candidates {
        if selected.len() >= cap {
            break;
        }
        let c_vector = retriever.vector(c.slot)?;
        let mut keep = true;
        for k in &selected {
            let k_vector = retriever.vector(k.slot)?;
            if metric.distance(&c_vector, &k_vector) < c.distance.into_inner() {
                keep = false;
                break;
            }
        }
        if keep {
            selected.push(c);
        }
    }
    Ok(selected)
}

/// Insert a new vector into the graph (`spec.md` §4.1 "Insert
/// algorithm"). Returns the slot the retriever assigned the new node.
pub fn insert<R: Retriever>(
    retriever: &mut R,
    state: &mut GraphState,
    params: &HnswParams,
    metric: Metric,
    label: RowId,
    vector: Vector,
    rng: &mut impl Rng,
) -> Result<Slot> {
    let level = assign_level(rng, params);
    let new_slot = retriever.allocate(label, level, vector.clone())?;

    let Some(entry) = state.entry_point else {
        state.entry_point = Some(new_slot);
        state.max_level = level;
        return Ok(new_slot);
    };

    let mut ep = entry;
    if state.max_level > level {
        ep = greedy_descent(retriever, metric, &vector, ep, state.max_level, level + 1)?;
    }

    let top = level.min(state.max_level);
    for l in (0..=top).rev() {
        let results = search_layer(retriever, metric, &vector, &[ep], params.ef_construction as usize, l)?;
        let cap = params.neighbor_cap(l);
        let selected = select_neighbors_heuristic(retriever, metric, results.clone(), cap)?;
        let selected_slots: Vec<Slot> = selected.iter().map(|c| c.slot).collect();
        retriever.set_neighbors(new_slot, l, &selected_slots)?;

        for k_cand in &selected {
            let k = k_cand.slot;
            let mut k_neighbors = retriever.neighbors(k, l)?;
            if k_neighbors.contains(&new_slot) {
                continue;
            }
            let k_cap = params.neighbor_cap(l);
            if k_neighbors.len() < k_cap {
                k_neighbors.push(new_slot);
                retriever.set_neighbors(k, l, &k_neighbors)?;
            } else {
                let k_vector = retriever.vector(k)?;
                let mut rewritten: Vec<Candidate> = Vec::with_capacity(k_neighbors.len() + 1);
                for s in &k_neighbors {
                    let d = metric.distance(&k_vector, &retriever.vector(*s)?);
                    rewritten.push(Candidate::new(d, *s));
                }
                rewritten.push(Candidate::new(metric.distance(&k_vector, &vector), new_slot));
                rewritten.sort();
                let pruned = select_neighbors_heuristic(retriever, metric, rewritten, k_cap)?;
                let pruned_slots: Vec<Slot> = pruned.iter().map(|c| c.slot).collect();
                retriever.set_neighbors(k, l, &pruned_slots)?;
            }
        }

        if let Some(best) = results.first() {
            ep = best.slot;
        }
    }

    if level > state.max_level {
        state.entry_point = Some(new_slot);
        state.max_level = level;
    }

    Ok(new_slot)
}

/// K-nearest-neighbor search (`spec.md` §4.1 "Search algorithm").
/// Returns up to `k` `(label, distance)` pairs sorted ascending by
/// distance, with ties broken by slot (`spec.md` §4.1 "Tie-breaking").
pub fn search<R: Retriever>(
    retriever: &mut R,
    state: &GraphState,
    params: &HnswParams,
    metric: Metric,
    query: &Vector,
    k: usize,
) -> Result<Vec<(RowId, f32)>> {
    let Some(entry) = state.entry_point else {
        return Ok(Vec::new());
    };
    if k == 0 {
        return Err(GraphError::InvalidSearchParams {
            k,
            ef: params.ef_search as usize,
        }
        .into());
    }

    let mut ep = entry;
    if state.max_level > 0 {
        ep = greedy_descent(retriever, metric, query, ep, state.max_level, 1)?;
    }

    let ef = k.max(params.ef_search as usize);
    let results = search_layer(retriever, metric, query, &[ep], ef, 0)?;

    let mut out = Vec::with_capacity(k.min(results.len()));
    for c in results.into_iter().take(k) {
        out.push((retriever.label(c.slot)?, c.distance.into_inner()));
    }
    Ok(out)
}
