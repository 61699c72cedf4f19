//! The flip cell state machine.
//!
//! A cell owns four character slots and an "animating" flag. `flip` moves it
//! from `Idle` to `Flipping`, asks the renderer for a motion, and returns to
//! `Idle` once the renderer reports the motion finished. The slots here are
//! the source of truth; the renderer only draws what it is handed.

use crate::common::CellId;
use crate::render::Renderer;
use std::fmt;
use std::sync::Arc;
use tokio::sync::{oneshot, Mutex};
use tracing::trace;

/// Which motion curve the renderer should play.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Motion {
    /// The regular half-card rotation.
    Flip,
    /// The bouncier landing used at the end of a power-on rattle.
    Settle,
}

/// The four character layers of a cell plus its animation state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CellSlots {
    pub top_static: char,
    pub bottom_static: char,
    pub top_flap: char,
    pub bottom_flap: char,
    /// `Some` while a motion is in flight.
    pub motion: Option<Motion>,
}

impl CellSlots {
    pub fn filled(ch: char) -> Self {
        Self {
            top_static: ch,
            bottom_static: ch,
            top_flap: ch,
            bottom_flap: ch,
            motion: None,
        }
    }

    pub fn is_flipping(&self) -> bool {
        self.motion.is_some()
    }
}

/// One-shot notification a renderer fires when a triggered motion ends.
///
/// Dropping it without calling `finish` also releases the cell.
#[derive(Debug)]
pub struct MotionDone(oneshot::Sender<()>);

impl MotionDone {
    pub fn new(sender: oneshot::Sender<()>) -> Self {
        Self(sender)
    }

    pub fn finish(self) {
        self.0.send(()).ok();
    }
}

/// Resolves once an accepted flip has settled on its new character.
#[derive(Debug)]
pub struct FlipHandle {
    finished: oneshot::Receiver<()>,
}

impl FlipHandle {
    pub async fn finished(self) {
        self.finished.await.ok();
    }
}

/// A handle to one flap cell. Clones share the same slots.
#[derive(Clone)]
pub struct FlapCell {
    id: CellId,
    slots: Arc<Mutex<CellSlots>>,
    renderer: Arc<dyn Renderer>,
}

impl FlapCell {
    /// Creates a cell showing `initial` on every layer and draws it.
    pub fn new(id: CellId, initial: char, renderer: Arc<dyn Renderer>) -> Self {
        let slots = CellSlots::filled(initial);
        renderer.draw_cell(id, &slots);
        Self {
            id,
            slots: Arc::new(Mutex::new(slots)),
            renderer,
        }
    }

    pub fn id(&self) -> CellId {
        self.id
    }

    pub async fn slots(&self) -> CellSlots {
        *self.slots.lock().await
    }

    /// The character revealed on the upper half.
    pub async fn current(&self) -> char {
        self.slots.lock().await.top_static
    }

    pub async fn is_flipping(&self) -> bool {
        self.slots.lock().await.is_flipping()
    }

    /// Writes `ch` to all four layers without animating.
    ///
    /// Ignores the flipping guard; an in-flight motion still settles on its
    /// own target afterwards.
    pub async fn set_all(&self, ch: char) {
        let mut slots = self.slots.lock().await;
        slots.top_static = ch;
        slots.bottom_static = ch;
        slots.top_flap = ch;
        slots.bottom_flap = ch;
        self.renderer.draw_cell(self.id, &slots);
    }

    /// Flips from `old` to `new` with the regular motion.
    ///
    /// Returns `None` when the cell is already flipping; the request is
    /// dropped, not queued.
    pub async fn flip(&self, old: char, new: char) -> Option<FlipHandle> {
        self.flip_with(old, new, Motion::Flip).await
    }

    pub async fn flip_with(&self, old: char, new: char, motion: Motion) -> Option<FlipHandle> {
        let mut slots = self.slots.lock().await;
        if slots.is_flipping() {
            trace!(cell = ?self.id, %new, "flip dropped, cell busy");
            return None;
        }

        slots.top_static = new;
        slots.top_flap = old;
        slots.bottom_flap = new;
        slots.motion = Some(motion);
        self.renderer.draw_cell(self.id, &slots);

        let (done_tx, done_rx) = oneshot::channel();
        let (finished_tx, finished_rx) = oneshot::channel();
        self.renderer
            .start_motion(self.id, motion, MotionDone::new(done_tx));
        drop(slots);
        trace!(cell = ?self.id, %old, %new, ?motion, "flip started");

        let cell = self.clone();
        tokio::spawn(async move {
            done_rx.await.ok();
            cell.land(new).await;
            finished_tx.send(()).ok();
        });

        Some(FlipHandle {
            finished: finished_rx,
        })
    }

    async fn land(&self, new: char) {
        let mut slots = self.slots.lock().await;
        slots.bottom_static = new;
        slots.top_flap = new;
        slots.motion = None;
        self.renderer.draw_cell(self.id, &slots);
    }
}

impl fmt::Debug for FlapCell {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FlapCell").field("id", &self.id).finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::common::{FaceId, PLACEHOLDER};
    use crate::render::{FaceLayout, HeadlessRenderer, MotionMode};
    use slotmap::SlotMap;

    fn setup(mode: MotionMode) -> (Arc<HeadlessRenderer>, FlapCell) {
        let renderer = Arc::new(HeadlessRenderer::new(mode));
        let face = SlotMap::<FaceId, ()>::with_key().insert(());
        renderer.attach_face(face, &FaceLayout::new("TEST", 1, true));
        let cell = FlapCell::new(CellId::new(face, 0), PLACEHOLDER, renderer.clone());
        (renderer, cell)
    }

    #[tokio::test]
    async fn accepted_flip_sets_layers_then_lands() {
        let (renderer, cell) = setup(MotionMode::Manual);

        let handle = cell.flip('4', '5').await.expect("idle cell accepts");
        let slots = cell.slots().await;
        assert_eq!(slots.top_static, '5');
        assert_eq!(slots.top_flap, '4');
        assert_eq!(slots.bottom_flap, '5');
        assert_eq!(slots.bottom_static, PLACEHOLDER);
        assert_eq!(slots.motion, Some(Motion::Flip));

        assert_eq!(renderer.finish_pending(), 1);
        handle.finished().await;

        let slots = cell.slots().await;
        assert_eq!(slots, CellSlots::filled('5'));
        assert!(!cell.is_flipping().await);
    }

    #[tokio::test]
    async fn flip_while_flipping_is_a_no_op() {
        let (renderer, cell) = setup(MotionMode::Manual);

        let first = cell.flip('1', '2').await.expect("accepted");
        let before = cell.slots().await;
        assert!(cell.flip('2', '3').await.is_none());
        assert_eq!(cell.slots().await, before);
        assert_eq!(renderer.motions().len(), 1);

        renderer.finish_pending();
        first.finished().await;
        assert_eq!(cell.current().await, '2');
        assert_eq!(cell.slots().await.bottom_static, '2');
    }

    #[tokio::test]
    async fn equal_characters_still_animate() {
        let (renderer, cell) = setup(MotionMode::Immediate);
        let handle = cell.flip('7', '7').await.expect("accepted");
        handle.finished().await;
        assert_eq!(renderer.motions(), vec![(cell.id(), Motion::Flip)]);
    }

    #[tokio::test]
    async fn dropped_motion_notification_releases_cell() {
        let (renderer, cell) = setup(MotionMode::Manual);
        let handle = cell.flip('1', '2').await.expect("accepted");
        renderer.discard_pending();
        handle.finished().await;
        assert!(!cell.is_flipping().await);
    }

    #[tokio::test]
    async fn set_all_bypasses_the_guard() {
        let (renderer, cell) = setup(MotionMode::Manual);
        let _handle = cell.flip('1', '2').await;
        cell.set_all('8').await;
        assert_eq!(cell.current().await, '8');
        assert!(cell.is_flipping().await);
        renderer.finish_pending();
    }
}
