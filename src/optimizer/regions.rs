//! Region analysis: building the structure tree.
//!
//! Discovers natural loops from back edges, nests them by body containment
//! and produces the [`Structure`] recorded on the flow graph. The driver
//! caches the first build's loop census to gate complexity thresholds; the
//! tree itself is dropped whenever the graph mutates.

use std::collections::HashSet;

use crate::ir::{BlockId, Cfg, Region, Structure};

#[derive(Debug)]
struct LoopInfo {
    header: BlockId,
    body: HashSet<BlockId>,
}

/// Runs region analysis over `cfg`.
#[must_use]
pub fn analyze(cfg: &Cfg) -> Structure {
    // Merge back edges sharing a header into one natural loop.
    let mut loops: Vec<LoopInfo> = Vec::new();
    for (header, latch) in cfg.back_edges() {
        let body = cfg.natural_loop_body(header, latch);
        match loops.iter_mut().find(|l| l.header == header) {
            Some(existing) => existing.body.extend(body),
            None => loops.push(LoopInfo { header, body }),
        }
    }

    // Inner loops first so parents can claim their children.
    loops.sort_by_key(|l| l.body.len());

    let mut regions: Vec<Option<Region>> = Vec::with_capacity(loops.len());
    let mut claimed: Vec<HashSet<BlockId>> = Vec::with_capacity(loops.len());
    for index in 0..loops.len() {
        let mut children: Vec<Region> = Vec::new();
        let mut covered: HashSet<BlockId> = HashSet::new();

        // Adopt already-built loops strictly contained in this body.
        for inner in 0..index {
            if regions[inner].is_some() && claimed[inner].is_subset(&loops[index].body) {
                covered.extend(claimed[inner].iter().copied());
                children.push(regions[inner].take().expect("inner region present"));
            }
        }

        // Remaining body blocks are leaves, header first.
        let mut leaves: Vec<BlockId> = loops[index]
            .body
            .iter()
            .copied()
            .filter(|b| !covered.contains(b))
            .collect();
        leaves.sort();
        if let Some(position) = leaves.iter().position(|&b| b == loops[index].header) {
            let header = leaves.remove(position);
            children.insert(0, Region::Block(header));
        }
        children.extend(leaves.into_iter().map(Region::Block));

        regions.push(Some(Region::Region {
            natural_loop: true,
            header: Some(loops[index].header),
            children,
        }));
        claimed.push(loops[index].body.clone());
    }

    // Root region: top-level loops plus every block outside all loops.
    let mut in_loop: HashSet<BlockId> = HashSet::new();
    for info in &loops {
        in_loop.extend(info.body.iter().copied());
    }
    let mut children: Vec<Region> = Vec::new();
    let mut free: Vec<BlockId> = cfg.live_blocks().filter(|b| !in_loop.contains(b)).collect();
    free.sort();
    children.extend(free.into_iter().map(Region::Block));
    for region in regions.into_iter().flatten() {
        children.push(region);
    }

    Structure {
        root: Region::Region {
            natural_loop: false,
            header: None,
            children,
        },
    }
}
