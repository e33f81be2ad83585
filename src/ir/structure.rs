//! Hierarchical region decomposition recorded on the flow graph.
//!
//! A structure tree is the result of region analysis: every block is a leaf,
//! natural loops become regions marked as such, and the whole method is the
//! root region. The driver caches loop and block censuses from the first
//! build and uses them to gate complexity thresholds; any flow-graph
//! mutation drops the tree so the next structure-hungry pass rebuilds it.

use crate::ir::BlockId;

/// One node of the structure tree.
#[derive(Debug, Clone)]
pub enum Region {
    /// A leaf region wrapping a single block.
    Block(BlockId),
    /// A composite region.
    Region {
        /// Is this region a natural loop?
        natural_loop: bool,
        /// The loop header when this region is a natural loop.
        header: Option<BlockId>,
        /// Nested regions, headers first.
        children: Vec<Region>,
    },
}

impl Region {
    fn count_loops_into(&self, total: &mut u32) {
        if let Region::Region {
            natural_loop,
            children,
            ..
        } = self
        {
            if *natural_loop {
                *total += 1;
            }
            for child in children {
                child.count_loops_into(total);
            }
        }
    }
}

/// The structure tree of one method.
#[derive(Debug, Clone)]
pub struct Structure {
    /// Root region spanning the whole method.
    pub root: Region,
}

impl Structure {
    /// Number of natural-loop regions anywhere in the tree.
    #[must_use]
    pub fn count_loops(&self) -> u32 {
        let mut total = 0;
        self.root.count_loops_into(&mut total);
        total
    }

    /// Depth-first iteration over the headers of natural-loop regions.
    #[must_use]
    pub fn loop_headers(&self) -> Vec<BlockId> {
        fn visit(region: &Region, out: &mut Vec<BlockId>) {
            if let Region::Region {
                natural_loop,
                header,
                children,
            } = region
            {
                if *natural_loop {
                    if let Some(h) = header {
                        out.push(*h);
                    }
                }
                for child in children {
                    visit(child, out);
                }
            }
        }
        let mut out = Vec::new();
        visit(&self.root, &mut out);
        out
    }
}
