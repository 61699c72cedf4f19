//! The visual layer contract and the bundled renderers.
//!
//! The engine decides what each face shows and when a cell flips; a
//! `Renderer` only draws it. `HeadlessRenderer` keeps the frame in memory
//! and is what tests and embedders use. `TerminalRenderer` prints the wall.

use crate::common::{CellId, FaceId, Rgb, PLACEHOLDER};
use crate::components::cell::{CellSlots, Motion, MotionDone};
use crate::weather::WeatherBadge;
use colored::Colorize;
use slotmap::SecondaryMap;
use std::io::Write;
use std::sync::{Mutex, MutexGuard, PoisonError};
use std::time::Duration;

/// Static description of a face handed to the renderer when it is built.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FaceLayout {
    pub label: String,
    pub cells: usize,
    pub primary: bool,
}

impl FaceLayout {
    pub fn new(label: impl Into<String>, cells: usize, primary: bool) -> Self {
        Self {
            label: label.into(),
            cells,
            primary,
        }
    }
}

/// Everything the engine needs from a visual layer.
///
/// Calls addressing a face that is not attached must be ignored; late
/// motion notifications from a rebuilt wall arrive that way.
pub trait Renderer: Send + Sync {
    fn attach_face(&self, face: FaceId, layout: &FaceLayout);

    fn detach_face(&self, face: FaceId);

    fn draw_cell(&self, cell: CellId, slots: &CellSlots);

    /// Starts the motion for a flipping cell. `done` must eventually be
    /// finished (or dropped) exactly once.
    fn start_motion(&self, cell: CellId, motion: Motion, done: MotionDone);

    fn set_period(&self, face: FaceId, text: &str, color: Rgb);

    /// Shows the day-offset badge, or hides it with `None`.
    fn set_day_badge(&self, face: FaceId, badge: Option<&str>);

    fn set_weather(&self, face: FaceId, badge: &WeatherBadge);

    /// Called once at the end of every reconciliation tick.
    fn present(&self) {}
}

/// The drawn state of one face.
#[derive(Debug, Clone, PartialEq)]
pub struct FaceFrame {
    pub layout: FaceLayout,
    pub cells: Vec<CellSlots>,
    pub period: String,
    pub period_color: Option<Rgb>,
    pub day_badge: Option<String>,
    pub weather: Option<WeatherBadge>,
}

impl FaceFrame {
    fn new(layout: &FaceLayout) -> Self {
        Self {
            layout: layout.clone(),
            cells: vec![CellSlots::filled(PLACEHOLDER); layout.cells],
            period: String::new(),
            period_color: None,
            day_badge: None,
            weather: None,
        }
    }

    /// The characters revealed on the upper halves, left to right.
    pub fn text(&self) -> String {
        self.cells.iter().map(|slots| slots.top_static).collect()
    }

    pub fn is_animating(&self) -> bool {
        self.cells.iter().any(CellSlots::is_flipping)
    }

    /// `HH:MM[:SS] AM` with badges appended.
    pub fn to_plain_line(&self) -> String {
        let mut line = format!("{:<14}{} {}", self.layout.label, self.grouped_digits(), self.period);
        if let Some(day) = &self.day_badge {
            line.push_str(&format!("  {day}"));
        }
        if let Some(weather) = &self.weather {
            line.push_str(&format!("  {weather}"));
        }
        line
    }

    fn grouped_digits(&self) -> String {
        let mut out = String::new();
        for (i, slots) in self.cells.iter().enumerate() {
            if i > 0 && i % 2 == 0 {
                out.push(':');
            }
            out.push(slots.top_static);
        }
        out
    }
}

/// How `HeadlessRenderer` completes motions.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MotionMode {
    /// Finish inside `start_motion`.
    Immediate,
    /// Finish after a timer, like a stylesheet animation.
    Timed(Duration),
    /// Hold notifications until `finish_pending` is called.
    Manual,
}

#[derive(Default)]
struct Frame {
    faces: SecondaryMap<FaceId, FaceFrame>,
    order: Vec<FaceId>,
    motions: Vec<(CellId, Motion)>,
    pending: Vec<MotionDone>,
    presents: usize,
}

/// Keeps the drawn wall in memory and records every motion it is asked for.
pub struct HeadlessRenderer {
    mode: MotionMode,
    record_motions: bool,
    frame: Mutex<Frame>,
}

impl HeadlessRenderer {
    pub fn new(mode: MotionMode) -> Self {
        Self {
            mode,
            record_motions: true,
            frame: Mutex::new(Frame::default()),
        }
    }

    /// Stops recording motions. Long-running embedders use this so the log
    /// cannot grow.
    pub fn without_motion_log(mut self) -> Self {
        self.record_motions = false;
        self
    }

    fn frame(&self) -> MutexGuard<'_, Frame> {
        self.frame.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn face(&self, face: FaceId) -> Option<FaceFrame> {
        self.frame().faces.get(face).cloned()
    }

    /// Attached faces in attach order.
    pub fn faces(&self) -> Vec<(FaceId, FaceFrame)> {
        let frame = self.frame();
        frame
            .order
            .iter()
            .filter_map(|&id| frame.faces.get(id).map(|f| (id, f.clone())))
            .collect()
    }

    pub fn motions(&self) -> Vec<(CellId, Motion)> {
        self.frame().motions.clone()
    }

    pub fn motion_count(&self) -> usize {
        self.frame().motions.len()
    }

    pub fn clear_motions(&self) {
        self.frame().motions.clear();
    }

    pub fn presents(&self) -> usize {
        self.frame().presents
    }

    /// Finishes every held motion, returning how many there were.
    pub fn finish_pending(&self) -> usize {
        let pending = std::mem::take(&mut self.frame().pending);
        let count = pending.len();
        pending.into_iter().for_each(MotionDone::finish);
        count
    }

    /// Drops held notifications without finishing them.
    pub fn discard_pending(&self) {
        self.frame().pending.clear();
    }

    /// The wall as plain text, one face per line.
    pub fn render_plain(&self) -> String {
        self.faces()
            .iter()
            .map(|(_, face)| face.to_plain_line())
            .collect::<Vec<_>>()
            .join("\n")
    }
}

impl Renderer for HeadlessRenderer {
    fn attach_face(&self, face: FaceId, layout: &FaceLayout) {
        let mut frame = self.frame();
        frame.faces.insert(face, FaceFrame::new(layout));
        frame.order.push(face);
    }

    fn detach_face(&self, face: FaceId) {
        let mut frame = self.frame();
        frame.faces.remove(face);
        frame.order.retain(|&id| id != face);
    }

    fn draw_cell(&self, cell: CellId, slots: &CellSlots) {
        if let Some(target) = self
            .frame()
            .faces
            .get_mut(cell.face)
            .and_then(|face| face.cells.get_mut(cell.index))
        {
            *target = *slots;
        }
    }

    fn start_motion(&self, cell: CellId, motion: Motion, done: MotionDone) {
        if self.record_motions {
            self.frame().motions.push((cell, motion));
        }
        match self.mode {
            MotionMode::Immediate => done.finish(),
            MotionMode::Timed(duration) => {
                tokio::spawn(async move {
                    tokio::time::sleep(duration).await;
                    done.finish();
                });
            }
            MotionMode::Manual => self.frame().pending.push(done),
        }
    }

    fn set_period(&self, face: FaceId, text: &str, color: Rgb) {
        if let Some(face) = self.frame().faces.get_mut(face) {
            face.period = text.to_string();
            face.period_color = Some(color);
        }
    }

    fn set_day_badge(&self, face: FaceId, badge: Option<&str>) {
        if let Some(face) = self.frame().faces.get_mut(face) {
            face.day_badge = badge.map(str::to_string);
        }
    }

    fn set_weather(&self, face: FaceId, badge: &WeatherBadge) {
        if let Some(face) = self.frame().faces.get_mut(face) {
            face.weather = Some(*badge);
        }
    }

    fn present(&self) {
        self.frame().presents += 1;
    }
}

/// Redraws the wall in place on stdout after every tick.
pub struct TerminalRenderer {
    inner: HeadlessRenderer,
    printed: Mutex<usize>,
}

impl TerminalRenderer {
    pub fn new(motion: Duration) -> Self {
        Self {
            inner: HeadlessRenderer::new(MotionMode::Timed(motion)).without_motion_log(),
            printed: Mutex::new(0),
        }
    }

    fn colored_line(face: &FaceFrame) -> String {
        let label = if face.layout.primary {
            format!("{:<14}", face.layout.label).bold().to_string()
        } else {
            format!("{:<14}", face.layout.label).dimmed().to_string()
        };
        let mut digits = String::new();
        for (i, slots) in face.cells.iter().enumerate() {
            if i > 0 && i % 2 == 0 {
                digits.push_str(&":".dimmed().to_string());
            }
            let ch = slots.top_static.to_string();
            if slots.is_flipping() {
                digits.push_str(&ch.yellow().to_string());
            } else {
                digits.push_str(&ch.bright_white().bold().to_string());
            }
        }
        let period = match face.period_color {
            Some(Rgb(r, g, b)) => face.period.truecolor(r, g, b).to_string(),
            None => face.period.clone(),
        };
        let mut line = format!("{label}{digits} {period}");
        if let Some(day) = &face.day_badge {
            line.push_str(&format!("  {}", day.on_bright_black()));
        }
        if let Some(weather) = &face.weather {
            line.push_str(&format!("  {}", weather.to_string().cyan()));
        }
        line
    }
}

impl Renderer for TerminalRenderer {
    fn attach_face(&self, face: FaceId, layout: &FaceLayout) {
        self.inner.attach_face(face, layout);
    }

    fn detach_face(&self, face: FaceId) {
        self.inner.detach_face(face);
    }

    fn draw_cell(&self, cell: CellId, slots: &CellSlots) {
        self.inner.draw_cell(cell, slots);
    }

    fn start_motion(&self, cell: CellId, motion: Motion, done: MotionDone) {
        self.inner.start_motion(cell, motion, done);
    }

    fn set_period(&self, face: FaceId, text: &str, color: Rgb) {
        self.inner.set_period(face, text, color);
    }

    fn set_day_badge(&self, face: FaceId, badge: Option<&str>) {
        self.inner.set_day_badge(face, badge);
    }

    fn set_weather(&self, face: FaceId, badge: &WeatherBadge) {
        self.inner.set_weather(face, badge);
    }

    fn present(&self) {
        let lines: Vec<String> = self
            .inner
            .faces()
            .iter()
            .map(|(_, face)| Self::colored_line(face))
            .collect();
        let mut printed = self.printed.lock().unwrap_or_else(PoisonError::into_inner);
        let mut out = std::io::stdout().lock();
        if *printed > 0 {
            write!(out, "\x1b[{}A", *printed).ok();
        }
        for line in &lines {
            writeln!(out, "\x1b[2K{line}").ok();
        }
        out.flush().ok();
        *printed = lines.len();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::weather::{TempUnit, WeatherIcon};
    use slotmap::SlotMap;

    #[test]
    fn detached_faces_ignore_late_draws() {
        let renderer = HeadlessRenderer::new(MotionMode::Immediate);
        let mut keys = SlotMap::<FaceId, ()>::with_key();
        let old = keys.insert(());
        renderer.attach_face(old, &FaceLayout::new("OLD", 4, true));
        renderer.detach_face(old);
        keys.remove(old);
        let new = keys.insert(());
        renderer.attach_face(new, &FaceLayout::new("NEW", 4, true));

        renderer.draw_cell(CellId::new(old, 0), &CellSlots::filled('9'));
        let face = renderer.face(new).unwrap();
        assert_eq!(face.text(), PLACEHOLDER.to_string().repeat(4));
        assert!(renderer.face(old).is_none());
    }

    #[test]
    fn plain_line_groups_digits_and_badges() {
        let renderer = HeadlessRenderer::new(MotionMode::Immediate);
        let face = SlotMap::<FaceId, ()>::with_key().insert(());
        renderer.attach_face(face, &FaceLayout::new("AUCKLAND", 4, false));
        for (i, ch) in ['1', '0', '4', '5'].into_iter().enumerate() {
            renderer.draw_cell(CellId::new(face, i), &CellSlots::filled(ch));
        }
        renderer.set_period(face, "PM", Rgb(0, 0, 0));
        renderer.set_day_badge(face, Some("WED"));
        renderer.set_weather(
            face,
            &WeatherBadge {
                icon: WeatherIcon::Rain,
                temperature: 18,
                unit: TempUnit::Celsius,
            },
        );
        assert_eq!(
            renderer.render_plain(),
            "AUCKLAND      10:45 PM  WED  rain 18°C"
        );
    }

    #[tokio::test]
    async fn manual_motions_wait_for_release() {
        let renderer = HeadlessRenderer::new(MotionMode::Manual);
        let face = SlotMap::<FaceId, ()>::with_key().insert(());
        let (tx, mut rx) = tokio::sync::oneshot::channel();
        renderer.start_motion(CellId::new(face, 0), Motion::Flip, MotionDone::new(tx));
        assert!(rx.try_recv().is_err());
        assert_eq!(renderer.finish_pending(), 1);
        assert!(rx.await.is_ok());
    }

    #[tokio::test]
    async fn unlogged_motions_still_finish() {
        let renderer = HeadlessRenderer::new(MotionMode::Immediate).without_motion_log();
        let face = SlotMap::<FaceId, ()>::with_key().insert(());
        for _ in 0..3 {
            let (tx, rx) = tokio::sync::oneshot::channel();
            renderer.start_motion(CellId::new(face, 0), Motion::Flip, MotionDone::new(tx));
            assert!(rx.await.is_ok());
        }
        assert_eq!(renderer.motion_count(), 0);
    }
}
