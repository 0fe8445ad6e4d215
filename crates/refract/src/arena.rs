// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Frame-scoped scratch allocator for the comparator.
//!
//! `mark_frame`/`clear` bracket one top-level operation; buffers lent inside
//! the frame are invalidated by `clear` but keep their capacity, so a long
//! run of per-field marshal/compare steps touches the heap only while the
//! high-water mark grows.

/// Stack-discipline scratch buffer allocator.
///
/// Each frame owns a pair of byte buffers sized on demand. Frames nest;
/// `clear` drops back to the state of the matching `mark_frame`.
#[derive(Debug, Default)]
pub struct FrameArena {
    bufs: Vec<Vec<u8>>,
    live: usize,
    marks: Vec<usize>,
}

impl FrameArena {
    pub fn new() -> Self {
        Self::default()
    }

    /// Opens a new frame; must be balanced by [`clear`](Self::clear).
    pub fn mark_frame(&mut self) {
        self.marks.push(self.live);
        self.live += 2;
        while self.bufs.len() < self.live {
            self.bufs.push(Vec::new());
        }
    }

    /// Closes the current frame, invalidating its scratch buffers.
    /// Capacity is retained for reuse.
    pub fn clear(&mut self) {
        self.live = self.marks.pop().unwrap_or(0);
    }

    /// Number of open frames.
    pub fn depth(&self) -> usize {
        self.marks.len()
    }

    /// Two cleared scratch buffers belonging to the current frame.
    ///
    /// The borrows end before the next call; contents do not survive a
    /// second `scratch_pair` call within the same frame.
    pub fn scratch_pair(&mut self) -> (&mut Vec<u8>, &mut Vec<u8>) {
        if self.live < 2 {
            // No frame open yet; behave as an implicit outermost frame.
            self.marks.push(0);
            self.live = 2;
            while self.bufs.len() < self.live {
                self.bufs.push(Vec::new());
            }
            self.marks.pop();
        }
        let (head, tail) = self.bufs.split_at_mut(self.live - 1);
        let a = &mut head[self.live - 2];
        let b = &mut tail[0];
        a.clear();
        b.clear();
        (a, b)
    }
}
