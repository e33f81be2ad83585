//! Value-number information.
//!
//! Assigns every node a number such that nodes with equal numbers compute
//! equal values. Loads are numbered position-sensitively (symbol reference
//! plus the store epoch at the point of the load), so commoning across an
//! intervening store is never suggested. Pure expressions — constants and
//! arithmetic — share numbers within a block in the *local* flavor and
//! across the whole method in the *global* flavor.
//!
//! Two build algorithms produce the same relation and are selectable per
//! compilation: a hash build that interns structural keys directly, and a
//! partition build that starts from shallow classes and refines by child
//! signatures until stable. Keeping both mirrors production pipelines
//! where the partition build is the default and the hash build the
//! alternative the compilation can opt into.

use rustc_hash::FxHashMap;

use crate::ir::{Method, NodeId, Opcode};

/// Which value-number build algorithm a compilation uses.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VnBuildKind {
    /// Partition refinement; the default.
    Partition,
    /// Structural hashing.
    Hash,
}

/// Where a load reads from: its reference and the store epoch at that
/// program point.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
struct LoadContext {
    symref: u32,
    block: u32,
    epoch: u32,
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
enum VnKey {
    Const(i64),
    Arith(u8, Vec<u32>),
    Load(LoadContext),
    Unique(u32),
}

/// Value numbers for one method.
#[derive(Debug)]
pub struct ValueNumberInfo {
    kind: VnBuildKind,
    has_globals: bool,
    valid: bool,
    numbers: FxHashMap<NodeId, u32>,
}

impl ValueNumberInfo {
    /// Builds value numbers for `method`.
    #[must_use]
    pub fn build(
        method: &Method,
        kind: VnBuildKind,
        requires_globals: bool,
        prefers_globals: bool,
    ) -> Self {
        let global = requires_globals || prefers_globals;
        let numbers = match kind {
            VnBuildKind::Hash => build_hash(method, global),
            VnBuildKind::Partition => build_partition(method, global),
        };
        Self {
            kind,
            has_globals: global,
            valid: true,
            numbers,
        }
    }

    /// Which algorithm produced this information.
    #[must_use]
    pub fn build_kind(&self) -> VnBuildKind {
        self.kind
    }

    /// Do pure expressions share numbers across blocks?
    #[must_use]
    pub fn has_globals_value_numbers(&self) -> bool {
        self.has_globals
    }

    /// Did the build complete with usable information?
    #[must_use]
    pub fn is_valid(&self) -> bool {
        self.valid
    }

    /// The value number of `node`, if it was numbered.
    #[must_use]
    pub fn vn(&self, node: NodeId) -> Option<u32> {
        self.numbers.get(&node).copied()
    }

    /// Do two nodes provably compute the same value?
    #[must_use]
    pub fn share_value(&self, a: NodeId, b: NodeId) -> bool {
        match (self.vn(a), self.vn(b)) {
            (Some(x), Some(y)) => x == y,
            _ => false,
        }
    }
}

fn arith_discriminant(opcode: Opcode) -> u8 {
    match opcode {
        Opcode::IAdd => 1,
        Opcode::ISub => 2,
        Opcode::IMul => 3,
        _ => 0,
    }
}

/// Evaluation-ordered nodes per block plus each load's context.
fn survey(method: &Method) -> (Vec<NodeId>, FxHashMap<NodeId, LoadContext>) {
    let mut order = Vec::new();
    let mut contexts = FxHashMap::default();
    for block in method.cfg.live_blocks() {
        let mut epochs: FxHashMap<u32, u32> = FxHashMap::default();
        let mut stack = Vec::new();
        for &root in &method.cfg.block(block).trees {
            post_order(method, root, &mut stack);
        }
        for &node in &stack {
            match method.pool.node(node).opcode {
                Opcode::ILoad(symref) => {
                    let epoch = *epochs.entry(symref.index() as u32).or_insert(0);
                    contexts.insert(
                        node,
                        LoadContext {
                            symref: symref.index() as u32,
                            block: block.index() as u32,
                            epoch,
                        },
                    );
                }
                Opcode::IStore(symref) => {
                    // A store opens a new epoch for every aliasing symref.
                    let target = method.symrefs.symref(symref);
                    for (id, entry) in method.symrefs.iter() {
                        let other = entry;
                        if other.symbol == target.symbol && other.offset == target.offset {
                            *epochs.entry(id.index() as u32).or_insert(0) += 1;
                        }
                    }
                }
                _ => {}
            }
        }
        order.extend(stack);
    }
    (order, contexts)
}

fn post_order(method: &Method, root: NodeId, out: &mut Vec<NodeId>) {
    for index in 0..method.pool.node(root).children.len() {
        let child = method.pool.node(root).children[index];
        post_order(method, child, out);
    }
    out.push(root);
}

fn shallow_key(
    method: &Method,
    node: NodeId,
    contexts: &FxHashMap<NodeId, LoadContext>,
    global: bool,
    block_of: u32,
    unique: &mut u32,
) -> VnKey {
    match method.pool.node(node).opcode {
        Opcode::IConst(value) => {
            if global {
                VnKey::Const(value)
            } else {
                VnKey::Arith(0, vec![block_of, value as u32, (value >> 32) as u32])
            }
        }
        Opcode::ILoad(_) => VnKey::Load(contexts[&node]),
        opcode if opcode.is_arithmetic() => VnKey::Arith(arith_discriminant(opcode), Vec::new()),
        _ => {
            *unique += 1;
            VnKey::Unique(*unique)
        }
    }
}

fn build_hash(method: &Method, global: bool) -> FxHashMap<NodeId, u32> {
    let (order, contexts) = survey(method);
    let mut numbers: FxHashMap<NodeId, u32> = FxHashMap::default();
    let mut interned: FxHashMap<(u32, VnKey), u32> = FxHashMap::default();
    let mut next = 1u32;

    // Block scope 0 is shared; local builds scope pure keys per block.
    let block_of: FxHashMap<NodeId, u32> = {
        let mut map = FxHashMap::default();
        for block in method.cfg.live_blocks() {
            let mut stack = Vec::new();
            for &root in &method.cfg.block(block).trees {
                post_order(method, root, &mut stack);
            }
            for node in stack {
                map.insert(node, block.index() as u32);
            }
        }
        map
    };

    let mut unique = 0u32;
    for node in order {
        let opcode = method.pool.node(node).opcode;
        let scope = if global { 0 } else { block_of[&node] };
        let key = match opcode {
            Opcode::IConst(value) => VnKey::Const(value),
            Opcode::ILoad(_) => VnKey::Load(contexts[&node]),
            _ if opcode.is_arithmetic() => {
                let children: Vec<u32> = method
                    .pool
                    .node(node)
                    .children
                    .iter()
                    .map(|c| numbers[c])
                    .collect();
                VnKey::Arith(arith_discriminant(opcode), children)
            }
            _ => {
                unique += 1;
                VnKey::Unique(unique)
            }
        };
        let number = *interned.entry((scope, key)).or_insert_with(|| {
            let n = next;
            next += 1;
            n
        });
        numbers.insert(node, number);
    }
    numbers
}

fn build_partition(method: &Method, global: bool) -> FxHashMap<NodeId, u32> {
    let (order, contexts) = survey(method);
    if order.is_empty() {
        return FxHashMap::default();
    }

    // Initial partition by shallow shape.
    let block_of: FxHashMap<NodeId, u32> = {
        let mut map = FxHashMap::default();
        for block in method.cfg.live_blocks() {
            let mut stack = Vec::new();
            for &root in &method.cfg.block(block).trees {
                post_order(method, root, &mut stack);
            }
            for node in stack {
                map.insert(node, block.index() as u32);
            }
        }
        map
    };

    let mut unique = 0u32;
    let mut class_of: FxHashMap<NodeId, u32> = FxHashMap::default();
    {
        let mut interned: FxHashMap<VnKey, u32> = FxHashMap::default();
        let mut next = 1u32;
        for &node in &order {
            let key = shallow_key(method, node, &contexts, global, block_of[&node], &mut unique);
            let class = *interned.entry(key).or_insert_with(|| {
                let n = next;
                next += 1;
                n
            });
            class_of.insert(node, class);
        }
    }

    // Refine by child signatures until stable.
    loop {
        let mut interned: FxHashMap<(u32, Vec<u32>), u32> = FxHashMap::default();
        let mut next = 1u32;
        let mut refined: FxHashMap<NodeId, u32> = FxHashMap::default();
        for &node in &order {
            let children: Vec<u32> = method
                .pool
                .node(node)
                .children
                .iter()
                .map(|c| refined.get(c).copied().unwrap_or(class_of[c]))
                .collect();
            let signature = (class_of[&node], children);
            let class = *interned.entry(signature).or_insert_with(|| {
                let n = next;
                next += 1;
                n
            });
            refined.insert(node, class);
        }
        if refined == class_of {
            break;
        }
        class_of = refined;
    }
    class_of
}
