use eframe::egui;
use egui::{Color32, ColorImage, Pos2, Rect, TextureHandle, TextureOptions, Vec2};
use image::{Rgba, RgbaImage};
use std::collections::BTreeMap;
use std::path::PathBuf;

use crate::components::patterns::PatternKind;
use crate::components::tools::{BrushKind, Tool};
use crate::input::{PointerEvent, PointerPhase};
use crate::io::{self, CATEGORIES, FileTemplateStore, TemplateRecord, TemplateStore};
use crate::ops::templates::BuiltinTemplate;
use crate::project::Session;
use crate::settings::{PaintSettings, parse_hex_color};
use crate::{log_err, log_info, log_warn};

/// Big swatches shown instead of the colour picker in child mode.
const CHILD_COLORS: &[&str] = &[
    "#FF0000", "#FFA500", "#FFFF00", "#008000", "#0000FF", "#4B0082", "#EE82EE",
    "#FFC0CB", "#800000", "#00FFFF", "#FFD700", "#C0C0C0", "#000000", "#FFFFFF",
];

const TOAST_SECONDS: f64 = 2.5;

/// A template waiting on the "clear current colouring?" question.
enum NewTemplate {
    Builtin(BuiltinTemplate),
    Imported { name: String, image: RgbaImage },
}

/// Key of what the canvas texture currently shows.
#[derive(Clone, Copy, PartialEq)]
struct TextureKey {
    generation: u64,
    scale: f32,
    pan: Vec2,
    buffer: (u32, u32),
}

pub struct ColorbookApp {
    session: Option<Session>,
    prefs: PaintSettings,
    store: Option<FileTemplateStore>,
    data_dir: PathBuf,

    canvas_texture: Option<TextureHandle>,
    texture_key: Option<TextureKey>,
    /// CSS size and dpr the session was last laid out for.
    display: (Vec2, f32),
    pointer_inside: bool,
    touches: BTreeMap<egui::TouchId, Pos2>,

    gallery_category: String,
    import_category: String,
    pending_template: Option<NewTemplate>,
    confirm_wipe: bool,
    toast: Option<(String, f64)>,
}

impl ColorbookApp {
    pub fn new(_cc: &eframe::CreationContext<'_>) -> Self {
        let prefs = PaintSettings::load();
        let store = match FileTemplateStore::open(FileTemplateStore::default_path()) {
            Ok(s) => Some(s),
            Err(e) => {
                log_err!("Template store unavailable: {}", e);
                None
            }
        };
        Self {
            session: None,
            prefs,
            store,
            data_dir: crate::logger::app_data_dir(),
            canvas_texture: None,
            texture_key: None,
            display: (Vec2::ZERO, 0.0),
            pointer_inside: false,
            touches: BTreeMap::new(),
            gallery_category: "all".to_string(),
            import_category: "uncategorized".to_string(),
            pending_template: None,
            confirm_wipe: false,
            toast: None,
        }
    }

    fn show_toast(&mut self, ctx: &egui::Context, msg: impl Into<String>) {
        self.toast = Some((msg.into(), ctx.input(|i| i.time)));
    }

    // ========================================================================
    // TOOLBAR
    // ========================================================================

    fn toolbar(&mut self, ui: &mut egui::Ui) {
        let child = self.prefs.child_mode;
        let mut messages: Vec<String> = Vec::new();
        let mut chosen_template = None;
        let Some(session) = self.session.as_mut() else { return };

        ui.horizontal_wrapped(|ui| {
            for tool in Tool::all() {
                if ui.selectable_label(session.tool.tool == *tool, tool.label()).clicked() {
                    session.set_tool(*tool);
                }
            }
            ui.separator();

            if !child {
                for brush in BrushKind::all() {
                    if ui.selectable_label(session.tool.brush == *brush, brush.label()).clicked() {
                        session.set_brush(*brush);
                        session.set_tool(Tool::Brush);
                    }
                }
                ui.separator();
            }

            if ui.selectable_label(session.tool.pattern.is_none(), "Solid").clicked() {
                session.set_pattern(None);
            }
            for kind in PatternKind::all() {
                if ui.selectable_label(session.tool.pattern == Some(*kind), kind.label()).clicked() {
                    session.set_pattern(Some(*kind));
                }
            }
            ui.checkbox(&mut session.tool.bucket_pattern, "Fill with pattern");
            ui.separator();

            if child {
                for hex in CHILD_COLORS {
                    let Some(c) = parse_hex_color(hex) else { continue };
                    let fill = Color32::from_rgb(c[0], c[1], c[2]);
                    let selected = session.tool.color == c;
                    let button = egui::Button::new("")
                        .fill(fill)
                        .min_size(Vec2::splat(if selected { 30.0 } else { 24.0 }));
                    if ui.add(button).clicked() {
                        session.set_color(c);
                    }
                }
            } else {
                let c = session.tool.color;
                let mut color = Color32::from_rgb(c[0], c[1], c[2]);
                if ui.color_edit_button_srgba(&mut color).changed() {
                    session.set_color(Rgba([color.r(), color.g(), color.b(), 255]));
                }
                let mut size = session.tool.size;
                if ui.add(egui::Slider::new(&mut size, 1.0..=80.0).text("Size")).changed() {
                    session.set_size(size);
                }
                let mut opacity = session.tool.opacity_percent();
                if ui
                    .add(egui::Slider::new(&mut opacity, 1.0..=100.0).text("Opacity %"))
                    .changed()
                {
                    session.set_opacity_percent(opacity);
                }
            }
        });

        ui.horizontal_wrapped(|ui| {
            if ui.add_enabled(session.history.can_undo(), egui::Button::new("Undo")).clicked() {
                session.undo();
            }
            if ui.add_enabled(session.history.can_redo(), egui::Button::new("Redo")).clicked() {
                session.redo();
            }
            ui.separator();
            if ui.button("−").clicked() {
                session.viewport.zoom_out();
            }
            ui.label(format!("{:.0}%", session.viewport.scale() * 100.0));
            if ui.button("+").clicked() {
                session.viewport.zoom_in();
            }
            if ui.button("Fit").clicked() {
                session.viewport.reset_view();
            }
            ui.separator();

            for t in BuiltinTemplate::all() {
                if ui.button(t.label()).clicked() {
                    chosen_template = Some(*t);
                }
            }
            ui.separator();

            if ui.button("Clear colouring").clicked() {
                session.clear_paint();
            }
            if ui.button("Clear all").clicked() {
                self.confirm_wipe = true;
            }
            ui.separator();

            if ui.button("Save").clicked() {
                match session.save_slot(&self.data_dir) {
                    Ok(_) => messages.push("Saved".to_string()),
                    Err(e) => messages.push(format!("Save failed: {}", e)),
                }
            }
            if ui.button("Load").clicked() {
                match session.load_slot(&self.data_dir) {
                    Ok(()) => messages.push("Loaded last save".to_string()),
                    Err(io::StoreError::NotFound(_)) => messages.push("Nothing saved yet".to_string()),
                    Err(e) => messages.push(format!("Load failed: {}", e)),
                }
            }
            if ui.button("Export PNG").clicked()
                && let Some(path) = io::pick_export_path(&format!("{}.png", session.name))
            {
                match session.export(&path) {
                    Ok(()) => messages.push(format!("Exported {}", path.display())),
                    Err(e) => messages.push(format!("Export failed: {}", e)),
                }
            }
            ui.separator();
            ui.checkbox(&mut self.prefs.child_mode, "Child mode");
        });

        if let Some(t) = chosen_template {
            self.begin_template(NewTemplate::Builtin(t));
        }
        let ctx = ui.ctx().clone();
        for m in messages {
            self.show_toast(&ctx, m);
        }
    }

    // ========================================================================
    // GALLERY
    // ========================================================================

    fn gallery(&mut self, ui: &mut egui::Ui) {
        ui.heading("Templates");
        egui::ComboBox::from_id_source("gallery_category")
            .selected_text(self.gallery_category.clone())
            .show_ui(ui, |ui| {
                for c in CATEGORIES {
                    ui.selectable_value(&mut self.gallery_category, c.to_string(), *c);
                }
            });
        ui.separator();

        let records = match &self.store {
            Some(store) => store.get_all(&self.gallery_category).unwrap_or_default(),
            None => {
                ui.label("Store unavailable");
                Vec::new()
            }
        };

        let mut open: Option<TemplateRecord> = None;
        let mut delete: Option<String> = None;
        egui::ScrollArea::vertical().max_height(ui.available_height() - 90.0).show(ui, |ui| {
            if records.is_empty() {
                ui.weak("No saved templates");
            }
            for r in &records {
                ui.horizontal(|ui| {
                    if ui.button(&r.name).on_hover_text(&r.category).clicked() {
                        open = Some(r.clone());
                    }
                    if ui.small_button("✕").clicked() {
                        delete = Some(r.name.clone());
                    }
                });
            }
        });

        ui.separator();
        egui::ComboBox::from_id_source("import_category")
            .selected_text(self.import_category.clone())
            .show_ui(ui, |ui| {
                for c in CATEGORIES.iter().filter(|c| **c != "all") {
                    ui.selectable_value(&mut self.import_category, c.to_string(), *c);
                }
            });
        if ui.button("Import image…").clicked() {
            self.import_from_dialog(ui.ctx());
        }

        if let Some(record) = open {
            match record.decode() {
                Ok(img) => self.begin_template(NewTemplate::Imported {
                    name: record.name,
                    image: img,
                }),
                Err(e) => {
                    let ctx = ui.ctx().clone();
                    self.show_toast(&ctx, format!("Could not open '{}': {}", record.name, e));
                }
            }
        }
        if let Some(name) = delete
            && let Some(store) = self.store.as_mut()
            && let Err(e) = store.delete(&name)
        {
            log_warn!("Delete '{}' failed: {}", name, e);
        }
    }

    fn import_from_dialog(&mut self, ctx: &egui::Context) {
        let Some(path) = io::pick_image_file() else { return };
        let bytes = match std::fs::read(&path) {
            Ok(b) => b,
            Err(e) => {
                self.show_toast(ctx, format!("Could not read file: {}", e));
                return;
            }
        };
        let img = match io::decode_image(&bytes) {
            Ok(img) => img,
            Err(e) => {
                self.show_toast(ctx, format!("Not an image: {}", e));
                return;
            }
        };
        let name = io::template_name_for(&path.to_string_lossy());
        if let Some(store) = self.store.as_mut()
            && let Err(e) = store.put(TemplateRecord::new(name.clone(), bytes, self.import_category.clone()))
        {
            log_err!("Storing template '{}' failed: {}", name, e);
            self.show_toast(ctx, format!("Could not store template: {}", e));
        }
        self.begin_template(NewTemplate::Imported { name, image: img });
    }

    /// Ask before replacing a coloured page; switch straight away otherwise.
    fn begin_template(&mut self, new: NewTemplate) {
        let Some(session) = self.session.as_mut() else { return };
        if session.surface.has_any_paint() {
            self.pending_template = Some(new);
        } else {
            Self::load_template(session, new, true);
        }
    }

    fn load_template(session: &mut Session, new: NewTemplate, clear_paint: bool) {
        match new {
            NewTemplate::Builtin(t) => session.set_template(t, clear_paint),
            NewTemplate::Imported { name, image } => session.import_template(&name, image, clear_paint),
        }
    }

    fn dialogs(&mut self, ctx: &egui::Context) {
        if self.pending_template.is_some() {
            let mut answer: Option<bool> = None;
            egui::Window::new("New template")
                .collapsible(false)
                .resizable(false)
                .anchor(egui::Align2::CENTER_CENTER, Vec2::ZERO)
                .show(ctx, |ui| {
                    ui.label("Clear the current colouring?");
                    ui.horizontal(|ui| {
                        if ui.button("Clear").clicked() {
                            answer = Some(true);
                        }
                        if ui.button("Keep").clicked() {
                            answer = Some(false);
                        }
                    });
                });
            if let Some(clear) = answer
                && let Some(new) = self.pending_template.take()
                && let Some(session) = self.session.as_mut()
            {
                Self::load_template(session, new, clear);
            }
        }

        if self.confirm_wipe {
            egui::Window::new("Clear all")
                .collapsible(false)
                .resizable(false)
                .anchor(egui::Align2::CENTER_CENTER, Vec2::ZERO)
                .show(ctx, |ui| {
                    ui.label("Remove the colouring and the template?");
                    ui.horizontal(|ui| {
                        if ui.button("Clear all").clicked() {
                            if let Some(session) = self.session.as_mut() {
                                session.surface.wipe_all();
                                session.mark_dirty();
                            }
                            self.confirm_wipe = false;
                        }
                        if ui.button("Cancel").clicked() {
                            self.confirm_wipe = false;
                        }
                    });
                });
        }
    }

    // ========================================================================
    // CANVAS
    // ========================================================================

    fn canvas(&mut self, ui: &mut egui::Ui) {
        let (rect, _response) = ui.allocate_exact_size(ui.available_size(), egui::Sense::click_and_drag());
        let ctx = ui.ctx().clone();
        let dpr = ctx.pixels_per_point();
        let css = rect.size();

        match self.session.as_mut() {
            None => {
                self.session = Some(Session::new(css.x, css.y, dpr, &self.prefs));
                self.display = (css, dpr);
            }
            Some(session) => {
                if (css - self.display.0).length() > 0.5 || (dpr - self.display.1).abs() > f32::EPSILON {
                    log_info!("Display changed to {:.0}x{:.0} @ {}", css.x, css.y, dpr);
                    session.resize_to_display(css.x, css.y, dpr);
                    self.display = (css, dpr);
                }
            }
        }

        self.route_input(&ctx, rect);

        let Some(session) = self.session.as_ref() else { return };
        let key = TextureKey {
            generation: session.surface.generation(),
            scale: session.viewport.scale(),
            pan: session.viewport.pan(),
            buffer: session.viewport.buffer_size(),
        };
        if self.texture_key != Some(key) || self.canvas_texture.is_none() {
            let frame = session.surface.composite(&session.viewport);
            let size = [frame.width() as usize, frame.height() as usize];
            let image = ColorImage::from_rgba_unmultiplied(size, frame.as_raw());
            match self.canvas_texture.as_mut() {
                Some(tex) => tex.set(image, TextureOptions::NEAREST),
                None => {
                    self.canvas_texture = Some(ctx.load_texture("canvas", image, TextureOptions::NEAREST));
                }
            }
            self.texture_key = Some(key);
        }
        if let Some(tex) = &self.canvas_texture {
            let uv = Rect::from_min_max(Pos2::ZERO, Pos2::new(1.0, 1.0));
            ui.painter().image(tex.id(), rect, uv, Color32::WHITE);
        }
    }

    /// Translate this frame's egui input into `PointerEvent`s.
    fn route_input(&mut self, ctx: &egui::Context, rect: Rect) {
        let Some(session) = self.session.as_mut() else { return };
        let local = |p: Pos2| Pos2::new(p.x - rect.min.x, p.y - rect.min.y);

        // Touch contacts, for pinch
        let events = ctx.input(|i| i.events.clone());
        let prev_count = self.touches.len();
        track_touches(
            &mut self.touches,
            events.iter().filter_map(|ev| match ev {
                egui::Event::Touch { id, phase, pos, .. } => Some((*id, *phase, local(*pos))),
                _ => None,
            }),
        );
        if self.touches.len() >= 2 {
            let mut contacts = self.touches.values().copied();
            let (a, b) = (contacts.next().unwrap_or_default(), contacts.next().unwrap_or_default());
            let phase = if prev_count < 2 { PointerPhase::Down } else { PointerPhase::Move };
            session.handle_pointer(PointerEvent::touch(phase, a, b));
            return;
        }
        if prev_count >= 2 {
            let at = self.touches.values().next().copied().unwrap_or_default();
            session.handle_pointer(PointerEvent::touch(PointerPhase::Up, at, at));
        }

        let (hover, pressed, down, released, moved, scroll, zoom) = ctx.input(|i| {
            (
                i.pointer.hover_pos(),
                i.pointer.primary_pressed(),
                i.pointer.primary_down(),
                i.pointer.primary_released(),
                i.pointer.delta() != Vec2::ZERO,
                i.scroll_delta.y,
                i.zoom_delta(),
            )
        });
        let inside = hover.is_some_and(|p| rect.contains(p));
        let at = local(hover.unwrap_or(rect.min));

        if inside && zoom != 1.0 {
            let scale = session.viewport.scale();
            session.viewport.set_zoom(scale * zoom, at);
        } else if inside && scroll != 0.0 {
            session.handle_pointer(PointerEvent::wheel(at, -scroll));
        }

        // A tap can press and release within one frame.
        if pressed && inside {
            session.handle_pointer(PointerEvent::down(at));
        } else if moved && (inside || down) {
            session.handle_pointer(PointerEvent::moved(at, down));
        }
        if released {
            session.handle_pointer(PointerEvent::up(at));
        }
        if self.pointer_inside && !inside {
            session.handle_pointer(PointerEvent::leave(at, down));
        }
        self.pointer_inside = inside;
    }

    fn shortcuts(&mut self, ctx: &egui::Context) {
        let Some(session) = self.session.as_mut() else { return };
        let (undo, redo) = ctx.input(|i| {
            let cmd = i.modifiers.command;
            (
                cmd && !i.modifiers.shift && i.key_pressed(egui::Key::Z),
                cmd && (i.key_pressed(egui::Key::Y) || (i.modifiers.shift && i.key_pressed(egui::Key::Z))),
            )
        });
        if undo {
            session.undo();
        }
        if redo {
            session.redo();
        }
    }
}

impl eframe::App for ColorbookApp {
    fn update(&mut self, ctx: &egui::Context, _frame: &mut eframe::Frame) {
        if let Some(session) = &self.session {
            ctx.send_viewport_cmd(egui::ViewportCommand::Title(format!(
                "Colorbook - {}",
                session.display_title()
            )));
        }

        if ctx.input(|i| i.viewport().close_requested()) {
            if let Some(session) = &self.session {
                session.store_settings(&mut self.prefs);
            }
            self.prefs.save();
            log_info!("Closing");
        }

        self.shortcuts(ctx);

        egui::TopBottomPanel::top("toolbar").show(ctx, |ui| self.toolbar(ui));
        egui::SidePanel::left("gallery")
            .resizable(true)
            .default_width(180.0)
            .show(ctx, |ui| self.gallery(ui));
        egui::CentralPanel::default()
            .frame(egui::Frame::none())
            .show(ctx, |ui| self.canvas(ui));

        self.dialogs(ctx);

        let now = ctx.input(|i| i.time);
        if self.toast.as_ref().is_some_and(|(_, shown)| now - shown > TOAST_SECONDS) {
            self.toast = None;
        }
        if let Some((msg, _)) = &self.toast {
            egui::Area::new("toast")
                .anchor(egui::Align2::CENTER_BOTTOM, Vec2::new(0.0, -24.0))
                .show(ctx, |ui| {
                    egui::Frame::popup(ui.style()).show(ui, |ui| ui.label(msg.as_str()));
                });
            ctx.request_repaint();
        }
    }
}

/// Apply touch events to the set of live contacts, ordered by id.
fn track_touches(
    touches: &mut BTreeMap<egui::TouchId, Pos2>,
    events: impl IntoIterator<Item = (egui::TouchId, egui::TouchPhase, Pos2)>,
) {
    for (id, phase, pos) in events {
        match phase {
            egui::TouchPhase::Start | egui::TouchPhase::Move => {
                touches.insert(id, pos);
            }
            egui::TouchPhase::End | egui::TouchPhase::Cancel => {
                touches.remove(&id);
            }
        }
    }
}
