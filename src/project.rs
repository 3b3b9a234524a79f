use egui::Pos2;
use image::{Rgba, RgbaImage};
use std::path::{Path, PathBuf};

use crate::canvas::{Paint, PaintSurface, TemplateSource};
use crate::components::history::HistoryManager;
use crate::components::patterns::{PatternKind, PatternTileCache};
use crate::components::tools::{BrushEngine, BrushKind, BrushSettings, StrokeStyle, Tool};
use crate::input::{Gesture, PointerEvent, PointerPhase};
use crate::io;
use crate::ops::fill::FloodFillEngine;
use crate::ops::templates::BuiltinTemplate;
use crate::settings::PaintSettings;
use crate::viewport::Viewport;

/// One colouring page and everything that acts on it.
pub struct Session {
    pub surface: PaintSurface,
    pub viewport: Viewport,
    pub history: HistoryManager,
    pub brushes: BrushEngine,
    pub fill: FloodFillEngine,
    pub patterns: PatternTileCache,
    pub tool: BrushSettings,
    gesture: Gesture,
    /// Display name of the current template.
    pub name: String,
    pub is_dirty: bool,
}

impl Session {
    /// A session sized for a `css_w` × `css_h` display at `dpr`.
    pub fn new(css_w: f32, css_h: f32, dpr: f32, prefs: &PaintSettings) -> Self {
        let mut tool = BrushSettings {
            color: prefs.color,
            size: prefs.brush_size,
            bucket_pattern: prefs.bucket_pattern,
            ..Default::default()
        };
        tool.set_opacity_percent(prefs.opacity);

        let mut session = Self {
            surface: PaintSurface::new(TemplateSource::Builtin(prefs.template)),
            viewport: Viewport::new(css_w, css_h, dpr),
            history: HistoryManager::new(prefs.max_undo),
            brushes: BrushEngine::new(),
            fill: FloodFillEngine::new(prefs.fill_tolerance),
            patterns: PatternTileCache::new(),
            tool,
            gesture: Gesture::Idle,
            name: prefs.template.label().to_string(),
            is_dirty: false,
        };
        session.resize_to_display(css_w, css_h, dpr);
        session
    }

    pub fn gesture(&self) -> Gesture {
        self.gesture
    }

    pub fn mark_dirty(&mut self) {
        self.is_dirty = true;
    }

    pub fn mark_clean(&mut self) {
        self.is_dirty = false;
    }

    /// Title with a dirty marker.
    pub fn display_title(&self) -> String {
        if self.is_dirty {
            format!("{}*", self.name)
        } else {
            self.name.clone()
        }
    }

    // ========================================================================
    // TOOL STATE
    // ========================================================================

    pub fn set_tool(&mut self, tool: Tool) {
        self.tool.tool = tool;
    }

    pub fn set_brush(&mut self, brush: BrushKind) {
        self.tool.brush = brush;
    }

    pub fn set_color(&mut self, color: Rgba<u8>) {
        self.tool.color = color;
        self.patterns.invalidate();
    }

    pub fn set_pattern(&mut self, pattern: Option<PatternKind>) {
        self.tool.pattern = pattern;
        self.patterns.invalidate();
    }

    pub fn set_size(&mut self, size: f32) {
        if size.is_finite() && size > 0.0 {
            self.tool.size = size;
        }
    }

    pub fn set_opacity_percent(&mut self, percent: f32) {
        self.tool.set_opacity_percent(percent);
    }

    /// Paint source for strokes: the pattern tile if one is selected.
    pub fn current_paint(&mut self) -> Paint {
        match self.tool.pattern {
            Some(kind) => Paint::Pattern(self.patterns.ensure(kind, self.tool.color)),
            None => Paint::Solid(self.tool.color),
        }
    }

    fn bucket_paint(&mut self) -> Paint {
        if self.tool.bucket_pattern {
            self.current_paint()
        } else {
            Paint::Solid(self.tool.color)
        }
    }

    /// Copy persisted preferences onto the live engines.
    pub fn apply_settings(&mut self, prefs: &PaintSettings) {
        self.history.set_max_undo(prefs.max_undo);
        self.fill.set_tolerance(prefs.fill_tolerance);
        self.set_size(prefs.brush_size);
        self.set_opacity_percent(prefs.opacity);
        self.set_color(prefs.color);
        self.tool.bucket_pattern = prefs.bucket_pattern;
    }

    /// Write the live engine state back into `prefs`.
    pub fn store_settings(&self, prefs: &mut PaintSettings) {
        prefs.max_undo = self.history.max_undo();
        prefs.fill_tolerance = self.fill.tolerance();
        prefs.brush_size = self.tool.size;
        prefs.opacity = self.tool.opacity_percent();
        prefs.color = self.tool.color;
        prefs.bucket_pattern = self.tool.bucket_pattern;
        if let TemplateSource::Builtin(t) = self.surface.template() {
            prefs.template = *t;
        }
    }

    // ========================================================================
    // POINTER INPUT
    // ========================================================================

    /// Route one pointer event. Returns `true` if the view or the page changed.
    pub fn handle_pointer(&mut self, ev: PointerEvent) -> bool {
        if let Some(dy) = ev.wheel_delta {
            self.viewport.zoom_wheel(dy, ev.primary);
            return dy != 0.0;
        }

        if let Some(second) = ev.secondary {
            return self.handle_pinch(ev.phase, (ev.primary, second));
        }

        if let Gesture::Pinching { .. } = self.gesture {
            // The remaining finger after a pinch never draws
            if ev.phase == PointerPhase::Down {
                self.gesture = Gesture::Idle;
            } else {
                if matches!(ev.phase, PointerPhase::Up | PointerPhase::Leave) {
                    self.gesture = Gesture::Idle;
                }
                return false;
            }
        }

        match ev.phase {
            PointerPhase::Down => self.pointer_down(ev.primary),
            PointerPhase::Move => self.pointer_move(ev.primary, ev.button_down),
            PointerPhase::Up => self.finish_gesture(),
            PointerPhase::Leave => {
                if ev.button_down {
                    false
                } else {
                    self.finish_gesture()
                }
            }
        }
    }

    fn handle_pinch(&mut self, phase: PointerPhase, contacts: (Pos2, Pos2)) -> bool {
        if matches!(phase, PointerPhase::Up | PointerPhase::Leave) {
            self.gesture = Gesture::Idle;
            return false;
        }
        let mut changed = false;
        if self.gesture == Gesture::Drawing {
            changed |= self.finish_gesture();
        }
        if let Gesture::Pinching { prev } = self.gesture {
            self.viewport.pinch(prev, contacts);
            changed = true;
        }
        self.gesture = Gesture::Pinching { prev: contacts };
        changed
    }

    fn pointer_down(&mut self, at: Pos2) -> bool {
        if self.gesture == Gesture::Drawing {
            self.finish_gesture();
        }
        match self.tool.tool {
            Tool::Pan => {
                self.gesture = Gesture::Panning {
                    start: at,
                    initial_pan: self.viewport.pan(),
                };
                false
            }
            Tool::Bucket => {
                self.gesture = Gesture::Idle;
                let scene = self.viewport.screen_to_scene(at);
                self.fill_at(scene)
            }
            Tool::Brush | Tool::Eraser => {
                let unit = self.viewport.stroke_unit(self.tool.size);
                let style = if self.tool.tool == Tool::Eraser {
                    StrokeStyle::eraser(unit)
                } else {
                    let paint = self.current_paint();
                    StrokeStyle::brush(&self.tool, paint, unit)
                };
                let scene = self.viewport.screen_to_scene(at);
                self.brushes.begin_stroke(scene, style, self.surface.paint());
                self.gesture = Gesture::Drawing;
                false
            }
        }
    }

    fn pointer_move(&mut self, at: Pos2, button_down: bool) -> bool {
        match self.gesture {
            Gesture::Panning { start, initial_pan } if button_down => {
                let pan = initial_pan + (at - start);
                self.viewport.set_pan(pan.x, pan.y);
                true
            }
            // The release was missed; end the stroke where it last drew.
            Gesture::Drawing if !button_down => self.finish_gesture(),
            Gesture::Drawing => {
                let scene = self.viewport.screen_to_scene(at);
                self.brushes.stroke_to(scene, self.surface.paint_mut())
            }
            _ => false,
        }
    }

    fn finish_gesture(&mut self) -> bool {
        let was = std::mem::take(&mut self.gesture);
        if was != Gesture::Drawing {
            return false;
        }
        let committed = self.brushes.end_stroke(self.surface.paint(), &mut self.history);
        if committed {
            self.mark_dirty();
        }
        committed
    }

    // ========================================================================
    // PAGE OPERATIONS
    // ========================================================================

    /// Flood fill at a scene-pixel position with the bucket paint.
    pub fn fill_at(&mut self, scene: Pos2) -> bool {
        let paint = self.bucket_paint();
        let filled = self.fill.fill(
            &mut self.surface,
            scene.x.floor() as i64,
            scene.y.floor() as i64,
            &paint,
            &mut self.history,
        );
        if filled {
            self.mark_dirty();
        }
        filled
    }

    pub fn undo(&mut self) -> bool {
        self.cancel_gesture();
        self.history.undo(self.surface.paint_mut())
    }

    pub fn redo(&mut self) -> bool {
        self.cancel_gesture();
        self.history.redo(self.surface.paint_mut())
    }

    fn cancel_gesture(&mut self) {
        self.brushes.cancel();
        self.gesture = Gesture::Idle;
    }

    /// New display geometry. Any stroke in flight is dropped and history restarts.
    pub fn resize_to_display(&mut self, css_w: f32, css_h: f32, dpr: f32) {
        self.cancel_gesture();
        self.viewport.resize_to_display(css_w, css_h, dpr);
        self.surface.resize(
            css_w,
            css_h,
            self.viewport.device_pixel_ratio(),
            &mut self.history,
        );
    }

    /// Load a built-in template. History restarts and the view goes back to fit.
    pub fn set_template(&mut self, template: BuiltinTemplate, clear_paint: bool) {
        self.cancel_gesture();
        self.surface.set_template(template, clear_paint, &mut self.history);
        self.viewport.reset_view();
        self.name = template.label().to_string();
        self.mark_clean();
    }

    pub fn import_template(&mut self, name: &str, image: RgbaImage, clear_paint: bool) {
        self.cancel_gesture();
        self.surface.import_template(image, clear_paint, &mut self.history);
        self.viewport.reset_view();
        self.name = name.to_string();
        self.mark_clean();
    }

    pub fn clear_paint(&mut self) {
        self.cancel_gesture();
        self.surface.clear_paint(&mut self.history);
        self.mark_dirty();
    }

    /// Store the flattened page in the save slot under `dir`.
    pub fn save_slot(&mut self, dir: &Path) -> io::Result<PathBuf> {
        let path = io::save_latest(&self.surface.export_flattened(), dir)?;
        self.mark_clean();
        Ok(path)
    }

    /// Bring back the save slot as the template, with a fresh paint layer.
    pub fn load_slot(&mut self, dir: &Path) -> io::Result<()> {
        let img = io::load_latest(dir)?;
        self.cancel_gesture();
        self.surface.load_flattened_as_template(img, &mut self.history);
        self.mark_clean();
        Ok(())
    }

    pub fn export(&self, path: &Path) -> io::Result<()> {
        io::save_png(&self.surface.export_flattened(), path)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::canvas::WHITE;
    use egui::Vec2;

    const RED: Rgba<u8> = Rgba([255, 0, 0, 255]);

    fn blank_session(w: f32, h: f32) -> Session {
        let prefs = PaintSettings {
            template: BuiltinTemplate::Blank,
            color: RED,
            ..Default::default()
        };
        let mut s = Session::new(w, h, 1.0, &prefs);
        s.brushes = BrushEngine::with_seed(1);
        s
    }

    fn drag(s: &mut Session, from: Pos2, to: Pos2) {
        s.handle_pointer(PointerEvent::down(from));
        s.handle_pointer(PointerEvent::moved(to, true));
        s.handle_pointer(PointerEvent::up(to));
    }

    #[test]
    fn starts_with_a_baseline_only() {
        let s = blank_session(50.0, 40.0);
        assert_eq!((s.surface.width(), s.surface.height()), (50, 40));
        assert_eq!(s.history.undo_count(), 1);
        assert!(!s.history.can_undo());
    }

    #[test]
    fn a_drag_commits_one_snapshot_and_undoes() {
        let mut s = blank_session(60.0, 60.0);
        drag(&mut s, Pos2::new(10.0, 30.0), Pos2::new(50.0, 30.0));
        assert_eq!(s.history.undo_count(), 2);
        assert_eq!(s.surface.paint().pixel(30, 30), Some(RED));
        assert!(s.is_dirty);

        assert!(s.undo());
        assert!(!s.surface.has_any_paint());
        assert!(s.redo());
        assert_eq!(s.surface.paint().pixel(30, 30), Some(RED));
    }

    #[test]
    fn strokes_follow_the_view_transform() {
        let mut s = blank_session(100.0, 100.0);
        s.viewport.set_zoom(2.0, Pos2::ZERO);
        drag(&mut s, Pos2::new(20.0, 40.0), Pos2::new(60.0, 40.0));
        // screen y 40 at scale 2 is scene row 20
        assert_eq!(s.surface.paint().pixel(20, 20), Some(RED));
        assert_eq!(s.surface.paint().pixel(20, 40).map(|p| p[3]), Some(0));
    }

    #[test]
    fn hover_move_after_a_lost_release_ends_the_stroke() {
        let mut s = blank_session(60.0, 60.0);
        s.handle_pointer(PointerEvent::down(Pos2::new(5.0, 30.0)));
        let before = s.surface.paint().clone();
        assert!(s.handle_pointer(PointerEvent::moved(Pos2::new(50.0, 30.0), false)));
        assert!(s.gesture().is_idle());
        assert_eq!(s.history.undo_count(), 2);
        assert_eq!(s.surface.paint(), &before);
        assert!(!s.handle_pointer(PointerEvent::moved(Pos2::new(55.0, 40.0), false)));
        assert_eq!(s.surface.paint(), &before);
    }

    #[test]
    fn tap_within_one_frame_commits() {
        let mut s = blank_session(40.0, 40.0);
        s.handle_pointer(PointerEvent::down(Pos2::new(20.0, 20.0)));
        s.handle_pointer(PointerEvent::up(Pos2::new(20.0, 20.0)));
        assert!(s.gesture().is_idle());
        let after = s.surface.paint().clone();
        s.handle_pointer(PointerEvent::moved(Pos2::new(35.0, 35.0), false));
        assert_eq!(s.surface.paint(), &after);
    }

    #[test]
    fn template_change_restarts_history_and_view() {
        let mut s = blank_session(60.0, 60.0);
        drag(&mut s, Pos2::new(5.0, 30.0), Pos2::new(50.0, 30.0));
        s.viewport.set_zoom(2.0, Pos2::new(10.0, 10.0));
        assert!(s.history.can_undo());

        s.set_template(BuiltinTemplate::House, false);
        assert!(s.surface.has_any_paint());
        assert!(!s.history.can_undo());
        assert!(!s.undo());
        assert!(s.surface.has_any_paint());
        assert_eq!(s.viewport.scale(), 1.0);
        assert_eq!(s.name, BuiltinTemplate::House.label());

        drag(&mut s, Pos2::new(5.0, 10.0), Pos2::new(50.0, 10.0));
        s.set_template(BuiltinTemplate::Fish, true);
        assert!(!s.surface.has_any_paint());
        assert_eq!(s.history.undo_count(), 1);
    }

    #[test]
    fn leave_without_button_ends_the_stroke() {
        let mut s = blank_session(40.0, 40.0);
        s.handle_pointer(PointerEvent::down(Pos2::new(5.0, 5.0)));
        s.handle_pointer(PointerEvent::moved(Pos2::new(30.0, 5.0), true));
        assert!(!s.handle_pointer(PointerEvent::leave(Pos2::new(30.0, 5.0), true)));
        assert_eq!(s.gesture(), Gesture::Drawing);
        assert!(s.handle_pointer(PointerEvent::leave(Pos2::new(30.0, 5.0), false)));
        assert!(s.gesture().is_idle());
        assert_eq!(s.history.undo_count(), 2);
    }

    #[test]
    fn second_contact_commits_and_pinches() {
        let mut s = blank_session(100.0, 100.0);
        s.handle_pointer(PointerEvent::down(Pos2::new(10.0, 10.0)));
        s.handle_pointer(PointerEvent::moved(Pos2::new(40.0, 10.0), true));
        s.handle_pointer(PointerEvent::touch(
            PointerPhase::Down,
            Pos2::new(40.0, 50.0),
            Pos2::new(60.0, 50.0),
        ));
        assert_eq!(s.history.undo_count(), 2);
        assert!(!s.brushes.is_active());

        s.handle_pointer(PointerEvent::touch(
            PointerPhase::Move,
            Pos2::new(30.0, 50.0),
            Pos2::new(70.0, 50.0),
        ));
        assert!((s.viewport.scale() - 2.0).abs() < 1e-5);

        // Lifting one finger does not draw with the other
        s.handle_pointer(PointerEvent::moved(Pos2::new(80.0, 80.0), true));
        s.handle_pointer(PointerEvent::up(Pos2::new(80.0, 80.0)));
        assert_eq!(s.history.undo_count(), 2);
    }

    #[test]
    fn pan_tool_drags_the_view() {
        let mut s = blank_session(100.0, 100.0);
        s.set_tool(Tool::Pan);
        drag(&mut s, Pos2::new(10.0, 10.0), Pos2::new(25.0, 5.0));
        assert_eq!(s.viewport.pan(), Vec2::new(15.0, -5.0));
        assert!(!s.surface.has_any_paint());
        assert_eq!(s.history.undo_count(), 1);
    }

    #[test]
    fn wheel_zooms_at_the_pointer() {
        let mut s = blank_session(100.0, 100.0);
        let anchor = Pos2::new(30.0, 70.0);
        let before = s.viewport.screen_to_scene(anchor);
        assert!(s.handle_pointer(PointerEvent::wheel(anchor, -120.0)));
        assert!((s.viewport.scale() - 1.1).abs() < 1e-5);
        let after = s.viewport.screen_to_scene(anchor);
        assert!((before - after).length() < 1e-3);
    }

    #[test]
    fn bucket_fills_on_pointer_down() {
        let mut s = blank_session(30.0, 30.0);
        s.set_tool(Tool::Bucket);
        assert!(s.handle_pointer(PointerEvent::down(Pos2::new(3.0, 3.0))));
        assert!(s.surface.paint().image().pixels().all(|p| *p == RED));
        assert_eq!(s.history.undo_count(), 2);
    }

    #[test]
    fn bucket_uses_pattern_only_when_enabled() {
        let mut s = blank_session(48.0, 48.0);
        s.set_pattern(Some(PatternKind::Dots));
        s.tool.bucket_pattern = false;
        assert!(s.fill_at(Pos2::new(1.0, 1.0)));
        assert!(s.surface.paint().image().pixels().all(|p| *p == RED));

        s.clear_paint();
        s.tool.bucket_pattern = true;
        assert!(s.fill_at(Pos2::new(1.0, 1.0)));
        assert_eq!(s.surface.paint().pixel(8, 8), Some(RED));
        assert_eq!(s.surface.paint().pixel(16, 16).map(|p| p[3]), Some(0));
    }

    #[test]
    fn colour_change_invalidates_the_tile() {
        let mut s = blank_session(10.0, 10.0);
        s.set_pattern(Some(PatternKind::Stripes));
        let _ = s.current_paint();
        assert!(s.patterns.is_cached(PatternKind::Stripes, RED));
        s.set_color(WHITE);
        assert!(!s.patterns.is_cached(PatternKind::Stripes, RED));
    }

    #[test]
    fn resize_drops_the_stroke_and_history() {
        let mut s = blank_session(40.0, 40.0);
        drag(&mut s, Pos2::new(5.0, 5.0), Pos2::new(30.0, 5.0));
        s.handle_pointer(PointerEvent::down(Pos2::new(5.0, 20.0)));
        s.resize_to_display(30.0, 20.0, 2.0);
        assert!(!s.brushes.is_active());
        assert!(s.gesture().is_idle());
        assert_eq!((s.surface.width(), s.surface.height()), (60, 40));
        assert_eq!(s.history.undo_count(), 1);
        assert_eq!(s.viewport.scale(), 1.0);
    }

    #[test]
    fn settings_round_trip_through_the_session() {
        let mut s = blank_session(10.0, 10.0);
        let prefs = PaintSettings {
            max_undo: 5,
            fill_tolerance: 30.0,
            brush_size: 4.0,
            opacity: 49.0,
            ..Default::default()
        };
        s.apply_settings(&prefs);
        let mut out = PaintSettings::default();
        s.store_settings(&mut out);
        assert_eq!(out.max_undo, 5);
        assert_eq!(out.fill_tolerance, 30.0);
        assert_eq!(out.brush_size, 4.0);
        assert!((out.opacity - 49.0).abs() < 1e-3);
        assert_eq!(out.template, BuiltinTemplate::Blank);
    }
}
