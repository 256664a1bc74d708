//! Flood-fill light propagation over resident chunks.
//!
//! Light values are 0..=15 and fall off by exactly one per hop through the
//! six hex neighbors plus the cells above and below. Two FIFO worklists hold
//! pending additions and removals; removals always drain first.

use hexworld_common::VoxelPos;
use std::collections::VecDeque;
use tracing::trace;

use crate::blocks::{BlockRegistry, BlockSource};
use crate::chunk::MAX_LIGHT;

/// Light falloff per hop.
pub const LIGHT_FALLOFF: u8 = 1;

/// Global view of blocks and light the engine propagates through.
///
/// Implemented by the chunk manager. Cells in absent chunks read as air
/// and dark, and writes to them are dropped.
pub trait LightField: BlockSource {
    /// Light level at a global position.
    fn light_at(&self, pos: VoxelPos) -> u8;

    /// Stores a light level at a global position.
    fn set_light_at(&mut self, pos: VoxelPos, level: u8);

    /// Whether the position belongs to a resident chunk.
    fn is_loaded(&self, pos: VoxelPos) -> bool;
}

/// A queued propagation step.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LightNode {
    /// Cell
    pub pos: VoxelPos,
    /// Light carried by the cell when queued
    pub level: u8,
}

/// Counters from one [`LightEngine::update`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct LightUpdate {
    /// Cells zeroed by removal
    pub darkened: usize,
    /// Cells raised by addition
    pub lit: usize,
}

/// Incremental light propagator.
#[derive(Debug, Default)]
pub struct LightEngine {
    add_queue: VecDeque<LightNode>,
    remove_queue: VecDeque<LightNode>,
    /// Sources zeroed during removal, re-lit once removal drains
    darkened_sources: Vec<LightNode>,
}

impl LightEngine {
    /// Creates an engine with empty queues.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Queues a cell whose light should spread.
    pub fn queue_add(&mut self, pos: VoxelPos, level: u8) {
        self.add_queue.push_back(LightNode { pos, level });
    }

    /// Queues a cell whose former light should be withdrawn.
    pub fn queue_remove(&mut self, pos: VoxelPos, level: u8) {
        self.remove_queue.push_back(LightNode { pos, level });
    }

    /// Pending `(additions, removals)`.
    #[must_use]
    pub fn pending(&self) -> (usize, usize) {
        (self.add_queue.len(), self.remove_queue.len())
    }

    /// Drains removals, then additions.
    pub fn update<F>(&mut self, field: &mut F, blocks: &BlockRegistry) -> LightUpdate
    where
        F: LightField + ?Sized,
    {
        let darkened = self.propagate_remove(field, blocks);
        let lit = self.propagate_add(field, blocks);
        LightUpdate { darkened, lit }
    }

    /// Breadth-first spread of queued light. Returns the number of cells raised.
    pub fn propagate_add<F>(&mut self, field: &mut F, blocks: &BlockRegistry) -> usize
    where
        F: LightField + ?Sized,
    {
        let mut lit = 0;
        while let Some(node) = self.add_queue.pop_front() {
            // A seed whose cell was darkened after queueing spreads nothing.
            let level = node.level.min(field.light_at(node.pos));
            if level <= LIGHT_FALLOFF {
                continue;
            }
            let next = level - LIGHT_FALLOFF;
            for neighbor in node.pos.neighbors() {
                if !field.is_loaded(neighbor)
                    || !blocks.is_light_permeable(field.block_at(neighbor))
                {
                    continue;
                }
                if field.light_at(neighbor) < next {
                    field.set_light_at(neighbor, next);
                    self.add_queue.push_back(LightNode {
                        pos: neighbor,
                        level: next,
                    });
                    lit += 1;
                }
            }
        }
        lit
    }

    /// Withdraws queued light. Neighbors dimmer than the withdrawn value are
    /// zeroed and followed; brighter or equal ones are re-seeded for
    /// addition. Returns the number of cells zeroed.
    pub fn propagate_remove<F>(&mut self, field: &mut F, blocks: &BlockRegistry) -> usize
    where
        F: LightField + ?Sized,
    {
        let mut darkened = 0;
        while let Some(node) = self.remove_queue.pop_front() {
            for neighbor in node.pos.neighbors() {
                if !field.is_loaded(neighbor) {
                    continue;
                }
                let level = field.light_at(neighbor);
                if level == 0 {
                    continue;
                }
                if level < node.level {
                    field.set_light_at(neighbor, 0);
                    self.remove_queue.push_back(LightNode {
                        pos: neighbor,
                        level,
                    });
                    darkened += 1;

                    let emitted = blocks.light_level(field.block_at(neighbor));
                    if emitted > 0 {
                        self.darkened_sources.push(LightNode {
                            pos: neighbor,
                            level: emitted,
                        });
                    }
                } else {
                    self.add_queue.push_back(LightNode {
                        pos: neighbor,
                        level,
                    });
                }
            }
        }

        for source in self.darkened_sources.drain(..) {
            if field.light_at(source.pos) < source.level {
                field.set_light_at(source.pos, source.level);
            }
            self.add_queue.push_back(source);
        }
        darkened
    }

    /// Updates the field after the block at `pos` changed from `old_id` to
    /// `new_id`. Runs removal then addition before returning.
    pub fn on_block_changed<F>(
        &mut self,
        field: &mut F,
        blocks: &BlockRegistry,
        pos: VoxelPos,
        old_id: u8,
        new_id: u8,
    ) -> LightUpdate
    where
        F: LightField + ?Sized,
    {
        let old_emit = blocks.light_level(old_id);
        let new_emit = blocks.light_level(new_id);
        let current = field.light_at(pos);

        if old_emit > 0 {
            field.set_light_at(pos, 0);
            self.queue_remove(pos, current.max(old_emit));
        }

        if new_emit > 0 {
            let level = if old_emit > 0 {
                new_emit
            } else {
                new_emit.max(current)
            }
            .min(MAX_LIGHT);
            field.set_light_at(pos, level);
            self.queue_add(pos, level);
        } else if !blocks.is_light_permeable(new_id) {
            if current > 0 && old_emit == 0 {
                field.set_light_at(pos, 0);
                self.queue_remove(pos, current);
            }
        } else if !blocks.is_light_permeable(old_id) {
            for neighbor in pos.neighbors() {
                let level = field.light_at(neighbor);
                if level > LIGHT_FALLOFF {
                    self.queue_add(neighbor, level);
                }
            }
        }

        let update = self.update(field, blocks);
        trace!(
            "Light update at {pos}: {} darkened, {} lit",
            update.darkened,
            update.lit
        );
        update
    }
}

#[cfg(test)]
pub(crate) mod testing {
    //! A bounded in-memory light field.

    use super::*;
    use std::collections::HashMap;

    /// Blocks and light in a box of columns `|q|, |r| <= radius`.
    #[derive(Debug, Default)]
    pub(crate) struct GridField {
        pub(crate) radius: i32,
        pub(crate) blocks: HashMap<VoxelPos, u8>,
        pub(crate) light: HashMap<VoxelPos, u8>,
    }

    impl GridField {
        pub(crate) fn new(radius: i32) -> Self {
            Self {
                radius,
                ..Self::default()
            }
        }

        pub(crate) fn fill(&mut self, id: u8, ys: std::ops::RangeInclusive<i32>) {
            for q in -self.radius..=self.radius {
                for r in -self.radius..=self.radius {
                    for y in ys.clone() {
                        self.blocks.insert(VoxelPos::new(q, r, y), id);
                    }
                }
            }
        }

        pub(crate) fn set_block(&mut self, pos: VoxelPos, id: u8) {
            self.blocks.insert(pos, id);
        }

        pub(crate) fn lit_cells(&self) -> usize {
            self.light.values().filter(|&&l| l > 0).count()
        }
    }

    impl BlockSource for GridField {
        fn block_at(&self, pos: VoxelPos) -> u8 {
            self.blocks.get(&pos).copied().unwrap_or(0)
        }
    }

    impl LightField for GridField {
        fn light_at(&self, pos: VoxelPos) -> u8 {
            self.light.get(&pos).copied().unwrap_or(0)
        }

        fn set_light_at(&mut self, pos: VoxelPos, level: u8) {
            if self.is_loaded(pos) {
                self.light.insert(pos, level);
            }
        }

        fn is_loaded(&self, pos: VoxelPos) -> bool {
            pos.q.abs() <= self.radius && pos.r.abs() <= self.radius && pos.in_height_range()
        }
    }
}
