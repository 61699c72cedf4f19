//! Power-on sequences that bring a whole face from blank to the live time.
//!
//! `cascade` flips each cell once, left to right. `rattle` spins every cell
//! through random digits on a decelerating schedule before a final settling
//! flip. Both resolve when the face has landed.

use super::cell::{FlapCell, Motion};
use crate::common::PLACEHOLDER;
use rand::seq::SliceRandom;
use serde::Deserialize;
use std::time::Duration;
use tokio::task::JoinSet;
use tokio::time::{sleep, sleep_until, Instant};
use tracing::{trace, warn};

/// Characters a rattling cell cycles through.
pub const RATTLE_CHARS: [char; 10] = ['0', '1', '2', '3', '4', '5', '6', '7', '8', '9'];

/// Delay after each random character: fast at first, then slowing.
pub const RATTLE_INTERVALS_MS: [u64; 9] = [25, 28, 32, 38, 48, 62, 82, 110, 150];

/// The available power-on strategies.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Sequence {
    Cascade,
    Rattle,
}

impl Sequence {
    /// Runs the sequence over `cells`, landing cell `i` on `targets[i]`.
    pub async fn run(self, cells: &[FlapCell], targets: &[char], stagger: Duration) {
        match self {
            Sequence::Cascade => cascade(cells, targets, stagger).await,
            Sequence::Rattle => rattle(cells, targets, stagger).await,
        }
    }
}

fn offset(stagger: Duration, index: usize) -> Duration {
    stagger.saturating_mul(u32::try_from(index).unwrap_or(u32::MAX))
}

/// Flips cell `i` from the placeholder to `targets[i]` after `i * stagger`.
///
/// Completes when the last cell's motion has finished.
pub async fn cascade(cells: &[FlapCell], targets: &[char], stagger: Duration) {
    let start = Instant::now();
    let mut last = None;
    for (i, (cell, &target)) in cells.iter().zip(targets).enumerate() {
        sleep_until(start + offset(stagger, i)).await;
        last = cell.flip(PLACEHOLDER, target).await;
    }
    if let Some(handle) = last {
        handle.finished().await;
    }
}

/// Rattles every cell concurrently, cell `i` starting after `i * stagger`.
///
/// Completes when every cell has settled.
pub async fn rattle(cells: &[FlapCell], targets: &[char], stagger: Duration) {
    let mut landing = JoinSet::new();
    for (i, (cell, &target)) in cells.iter().zip(targets).enumerate() {
        let cell = cell.clone();
        let delay = offset(stagger, i);
        landing.spawn(async move {
            sleep(delay).await;
            rattle_cell(&cell, target).await;
        });
    }
    while let Some(result) = landing.join_next().await {
        if let Err(err) = result {
            warn!("rattle task failed: {err}");
        }
    }
}

/// Spins one cell through random digits, then settles on `target`.
pub async fn rattle_cell(cell: &FlapCell, target: char) {
    for step in RATTLE_INTERVALS_MS {
        let ch = RATTLE_CHARS
            .choose(&mut rand::thread_rng())
            .copied()
            .unwrap_or('0');
        cell.set_all(ch).await;
        sleep(Duration::from_millis(step)).await;
    }

    let current = cell.current().await;
    trace!(cell = ?cell.id(), %current, %target, "rattle settling");
    if let Some(handle) = cell.flip_with(current, target, Motion::Settle).await {
        handle.finished().await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::common::{CellId, FaceId, BLANK};
    use crate::render::{FaceLayout, HeadlessRenderer, MotionMode, Renderer};
    use slotmap::SlotMap;
    use std::sync::Arc;

    fn face_cells(renderer: &Arc<HeadlessRenderer>, count: usize) -> Vec<FlapCell> {
        let face = SlotMap::<FaceId, ()>::with_key().insert(());
        renderer.attach_face(face, &FaceLayout::new("TEST", count, true));
        (0..count)
            .map(|i| FlapCell::new(CellId::new(face, i), PLACEHOLDER, renderer.clone()))
            .collect()
    }

    async fn shown(cells: &[FlapCell]) -> Vec<char> {
        let mut out = Vec::new();
        for cell in cells {
            out.push(cell.slots().await.bottom_static);
        }
        out
    }

    #[tokio::test(start_paused = true)]
    async fn cascade_lands_every_cell_from_placeholder() {
        let renderer = Arc::new(HeadlessRenderer::new(MotionMode::Timed(
            Duration::from_millis(300),
        )));
        let cells = face_cells(&renderer, 4);
        let targets = [BLANK, '9', '0', '5'];

        let started = Instant::now();
        cascade(&cells, &targets, Duration::from_millis(40)).await;

        // Last cell starts at 3 * 40ms and takes 300ms to land.
        assert!(started.elapsed() >= Duration::from_millis(420));
        assert_eq!(shown(&cells).await, targets.to_vec());
        let motions = renderer.motions();
        assert_eq!(motions.len(), 4);
        assert!(motions.iter().all(|(_, m)| *m == Motion::Flip));
        let order: Vec<usize> = motions.iter().map(|(id, _)| id.index).collect();
        assert_eq!(order, vec![0, 1, 2, 3]);
    }

    #[tokio::test(start_paused = true)]
    async fn rattle_always_lands_on_target() {
        let renderer = Arc::new(HeadlessRenderer::new(MotionMode::Timed(
            Duration::from_millis(300),
        )));
        let cells = face_cells(&renderer, 6);
        let targets = ['1', '2', '3', '4', '5', '9'];

        for _ in 0..5 {
            rattle(&cells, &targets, Duration::from_millis(40)).await;
            assert_eq!(shown(&cells).await, targets.to_vec());
            for cell in &cells {
                assert!(!cell.is_flipping().await);
            }
        }
    }

    #[tokio::test(start_paused = true)]
    async fn rattle_settles_with_the_settle_motion_only() {
        let renderer = Arc::new(HeadlessRenderer::new(MotionMode::Immediate));
        let cells = face_cells(&renderer, 2);
        let started = Instant::now();
        rattle(&cells, &['3', '0'], Duration::from_millis(40)).await;

        let schedule: u64 = RATTLE_INTERVALS_MS.iter().sum();
        assert!(started.elapsed() >= Duration::from_millis(schedule + 40));
        let motions = renderer.motions();
        assert_eq!(motions.len(), 2);
        assert!(motions.iter().all(|(_, m)| *m == Motion::Settle));
    }

    #[test]
    fn sequence_names_deserialize() {
        let seq: Sequence = serde_json::from_str("\"cascade\"").unwrap();
        assert_eq!(seq, Sequence::Cascade);
    }
}
