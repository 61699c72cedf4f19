//! One clock face and the per-second reconciliation that keeps it current.

use crate::common::{CellId, City, Digits, FaceId, Rgb, PLACEHOLDER};
use crate::components::cell::FlapCell;
use crate::components::sequencer::Sequence;
use crate::diff::diff;
use crate::render::{FaceLayout, Renderer};
use crate::time::{period_color_at, sample_at};
use crate::weather::WeatherBadge;
use chrono::{DateTime, Utc};
use chrono_tz::Tz;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tracing::trace;

/// A row of flap cells plus its period label and badges.
pub struct ClockFace {
    id: FaceId,
    city: City,
    tz: Tz,
    cells: Vec<FlapCell>,
    period: String,
    tint: Rgb,
    day_badge: Option<String>,
    weather: Option<WeatherBadge>,
    renderer: Arc<dyn Renderer>,
}

impl ClockFace {
    /// Builds a face of `cell_count` placeholder cells and attaches it.
    pub fn build(
        id: FaceId,
        city: City,
        tz: Tz,
        cell_count: usize,
        primary: bool,
        renderer: Arc<dyn Renderer>,
    ) -> Self {
        renderer.attach_face(id, &FaceLayout::new(city.name.clone(), cell_count, primary));
        let cells = (0..cell_count)
            .map(|index| FlapCell::new(CellId::new(id, index), PLACEHOLDER, renderer.clone()))
            .collect();
        Self {
            id,
            city,
            tz,
            cells,
            period: String::new(),
            tint: Rgb(0, 0, 0),
            day_badge: None,
            weather: None,
            renderer,
        }
    }

    pub fn id(&self) -> FaceId {
        self.id
    }

    pub fn city(&self) -> &City {
        &self.city
    }

    pub fn tz(&self) -> Tz {
        self.tz
    }

    pub fn cells(&self) -> &[FlapCell] {
        &self.cells
    }

    pub fn period(&self) -> &str {
        &self.period
    }

    pub fn day_badge(&self) -> Option<&str> {
        self.day_badge.as_deref()
    }

    pub fn weather(&self) -> Option<&WeatherBadge> {
        self.weather.as_ref()
    }

    /// Writes the period label directly; labels never animate.
    pub fn set_period(&mut self, text: &str) {
        self.period = text.to_string();
        self.renderer.set_period(self.id, &self.period, self.tint);
    }

    /// Recolours the period label for the local hour at `now`.
    pub fn apply_tint(&mut self, now: DateTime<Utc>) {
        self.tint = period_color_at(self.tz, now);
        self.renderer.set_period(self.id, &self.period, self.tint);
    }

    pub fn set_day_badge(&mut self, badge: Option<String>) {
        self.renderer.set_day_badge(self.id, badge.as_deref());
        self.day_badge = badge;
    }

    pub fn set_weather(&mut self, badge: WeatherBadge) {
        self.renderer.set_weather(self.id, &badge);
        self.weather = Some(badge);
    }

    /// Brings the face to the time at `now` and returns the shown digits.
    ///
    /// With no `previous` digits every cell snaps without animating.
    /// Otherwise only changed cells flip. Flips are not awaited.
    pub async fn reconcile(&mut self, previous: Option<&[char]>, now: DateTime<Utc>) -> Digits {
        let sample = sample_at(self.tz, now);
        let digits = sample.truncated(self.cells.len());

        match previous {
            None => {
                for (cell, &ch) in self.cells.iter().zip(&digits) {
                    cell.set_all(ch).await;
                }
                self.set_period(sample.period.as_str());
            }
            Some(previous) => {
                for index in diff(Some(previous), &digits) {
                    let (Some(cell), Some(&new)) = (self.cells.get(index), digits.get(index)) else {
                        continue;
                    };
                    let old = previous.get(index).copied().unwrap_or(PLACEHOLDER);
                    cell.flip(old, new).await;
                }
                if self.period != sample.period.as_str() {
                    self.set_period(sample.period.as_str());
                }
            }
        }
        digits
    }

    /// Sets the period label now and returns the power-on animation for the
    /// digits at `now`, together with those target digits.
    pub fn power_on(
        &mut self,
        sequence: Sequence,
        stagger: Duration,
        now: DateTime<Utc>,
    ) -> (Digits, impl Future<Output = ()> + Send + 'static) {
        let sample = sample_at(self.tz, now);
        let targets = sample.truncated(self.cells.len());
        self.set_period(sample.period.as_str());

        let cells = self.cells.clone();
        let run_targets = targets.clone();
        let animation = async move { sequence.run(&cells, &run_targets, stagger).await };
        (targets, animation)
    }

    pub fn detach(&self) {
        self.renderer.detach_face(self.id);
    }
}

/// Owns a face and threads its last shown digits from tick to tick.
pub struct ClockController {
    face: ClockFace,
    previous: Option<Digits>,
}

impl ClockController {
    pub fn new(face: ClockFace) -> Self {
        Self {
            face,
            previous: None,
        }
    }

    pub fn face(&self) -> &ClockFace {
        &self.face
    }

    pub fn face_mut(&mut self) -> &mut ClockFace {
        &mut self.face
    }

    pub fn previous(&self) -> Option<&[char]> {
        self.previous.as_deref()
    }

    /// One reconciliation step.
    pub async fn tick(&mut self, now: DateTime<Utc>) {
        let previous = self.previous.take();
        let digits = self.face.reconcile(previous.as_deref(), now).await;
        let shown: String = digits.iter().collect();
        trace!(face = %self.face.city.name, digits = %shown, "reconciled");
        self.previous = Some(digits);
    }

    /// Starts power-on; the next tick diffs against the power-on targets.
    pub fn power_on(
        &mut self,
        sequence: Sequence,
        stagger: Duration,
        now: DateTime<Utc>,
    ) -> impl Future<Output = ()> + Send + 'static {
        let (targets, animation) = self.face.power_on(sequence, stagger, now);
        self.previous = Some(targets);
        animation
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::common::BLANK;
    use crate::render::{HeadlessRenderer, MotionMode};
    use chrono::TimeZone;
    use slotmap::SlotMap;

    fn at(h: u32, m: u32, s: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 3, 10, h, m, s).unwrap()
    }

    fn controller(renderer: &Arc<HeadlessRenderer>, cells: usize) -> ClockController {
        let id = SlotMap::<FaceId, ()>::with_key().insert(());
        ClockController::new(ClockFace::build(
            id,
            City::new("UTC", "UTC"),
            Tz::UTC,
            cells,
            true,
            renderer.clone(),
        ))
    }

    #[tokio::test]
    async fn first_tick_snaps_without_motion() {
        let renderer = Arc::new(HeadlessRenderer::new(MotionMode::Manual));
        let mut clock = controller(&renderer, 6);

        clock.tick(at(9, 5, 7)).await;

        let frame = renderer.face(clock.face().id()).unwrap();
        assert_eq!(frame.text(), format!("{BLANK}90507"));
        assert_eq!(frame.period, "AM");
        assert_eq!(renderer.motion_count(), 0);
        assert_eq!(clock.previous(), Some(&[BLANK, '9', '0', '5', '0', '7'][..]));
    }

    #[tokio::test]
    async fn next_second_flips_only_the_changed_cell() {
        let renderer = Arc::new(HeadlessRenderer::new(MotionMode::Manual));
        let mut clock = controller(&renderer, 6);
        clock.tick(at(9, 5, 7)).await;

        clock.tick(at(9, 5, 8)).await;

        let motions = renderer.motions();
        assert_eq!(motions.len(), 1);
        assert_eq!(motions[0].0.index, 5);
        let slots = clock.face().cells()[5].slots().await;
        assert_eq!((slots.top_flap, slots.bottom_flap), ('7', '8'));
        renderer.finish_pending();
    }

    #[tokio::test]
    async fn hidden_seconds_truncate_to_four_cells() {
        let renderer = Arc::new(HeadlessRenderer::new(MotionMode::Manual));
        let mut clock = controller(&renderer, 4);
        clock.tick(at(9, 5, 7)).await;
        clock.tick(at(9, 5, 8)).await;

        assert_eq!(clock.previous().map(<[char]>::len), Some(4));
        assert_eq!(renderer.motion_count(), 0);
    }

    #[tokio::test]
    async fn period_changes_without_animation() {
        let renderer = Arc::new(HeadlessRenderer::new(MotionMode::Immediate));
        let mut clock = controller(&renderer, 4);
        clock.tick(at(11, 59, 59)).await;
        clock.tick(at(12, 0, 0)).await;

        assert_eq!(clock.face().period(), "PM");
        // H1, M10 and M1 change: 11:59 -> 12:00.
        assert_eq!(renderer.motion_count(), 3);
    }

    #[tokio::test]
    async fn busy_cells_drop_the_tick_and_catch_up_later() {
        let renderer = Arc::new(HeadlessRenderer::new(MotionMode::Manual));
        let mut clock = controller(&renderer, 6);
        clock.tick(at(9, 5, 7)).await;
        clock.tick(at(9, 5, 8)).await;
        // Cell 5 is still flipping to '8'; the '9' request is dropped.
        clock.tick(at(9, 5, 9)).await;
        assert_eq!(renderer.motion_count(), 1);

        renderer.finish_pending();
        let cell = clock.face().cells()[5].clone();
        while cell.is_flipping().await {
            tokio::task::yield_now().await;
        }
        clock.tick(at(9, 5, 10)).await;
        // S10 and S1 both differ from the last threaded digits.
        assert_eq!(renderer.motion_count(), 3);
        renderer.finish_pending();
    }
}
