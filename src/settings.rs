use image::Rgba;
use std::path::PathBuf;

use crate::components::history::DEFAULT_MAX_UNDO;
use crate::components::tools::{DEFAULT_BRUSH_SIZE, DEFAULT_COLOR};
use crate::ops::fill::DEFAULT_TOLERANCE;
use crate::ops::templates::BuiltinTemplate;

const SETTINGS_FILE: &str = "colorbook_settings.cfg";

/// Persisted user preferences.
#[derive(Clone, Debug, PartialEq)]
pub struct PaintSettings {
    pub max_undo: usize,
    pub fill_tolerance: f32,
    /// Brush diameter in CSS pixels.
    pub brush_size: f32,
    /// Opacity slider, 0-100.
    pub opacity: f32,
    pub color: Rgba<u8>,
    pub template: BuiltinTemplate,
    pub bucket_pattern: bool,
    /// Big-swatch palette with fewer controls.
    pub child_mode: bool,
}

impl Default for PaintSettings {
    fn default() -> Self {
        Self {
            max_undo: DEFAULT_MAX_UNDO,
            fill_tolerance: DEFAULT_TOLERANCE,
            brush_size: DEFAULT_BRUSH_SIZE,
            opacity: 100.0,
            color: DEFAULT_COLOR,
            template: BuiltinTemplate::default(),
            bucket_pattern: true,
            child_mode: false,
        }
    }
}

/// `#rrggbb` (or `#rrggbbaa`) to a colour.
pub fn parse_hex_color(s: &str) -> Option<Rgba<u8>> {
    let hex = s.trim().strip_prefix('#').unwrap_or(s.trim());
    if !hex.is_ascii() {
        return None;
    }
    let byte = |i: usize| u8::from_str_radix(hex.get(i..i + 2)?, 16).ok();
    match hex.len() {
        6 => Some(Rgba([byte(0)?, byte(2)?, byte(4)?, 255])),
        8 => Some(Rgba([byte(0)?, byte(2)?, byte(4)?, byte(6)?])),
        _ => None,
    }
}

pub fn format_hex_color(c: Rgba<u8>) -> String {
    format!("#{:02x}{:02x}{:02x}", c[0], c[1], c[2])
}

impl PaintSettings {
    /// On Linux:   ~/.config/colorbook/colorbook_settings.cfg  (XDG_CONFIG_HOME respected)
    /// On Windows: %APPDATA%\Colorbook\colorbook_settings.cfg
    /// On macOS:   ~/Library/Application Support/Colorbook/colorbook_settings.cfg
    pub fn settings_path() -> Option<PathBuf> {
        #[cfg(target_os = "linux")]
        {
            let config_dir = std::env::var("XDG_CONFIG_HOME")
                .map(PathBuf::from)
                .unwrap_or_else(|_| {
                    let home = std::env::var("HOME").unwrap_or_else(|_| "~".to_string());
                    PathBuf::from(home).join(".config")
                })
                .join("colorbook");
            return Some(config_dir.join(SETTINGS_FILE));
        }
        #[cfg(target_os = "windows")]
        {
            let appdata = std::env::var("APPDATA")
                .or_else(|_| std::env::var("USERPROFILE"))
                .ok()?;
            return Some(PathBuf::from(appdata).join("Colorbook").join(SETTINGS_FILE));
        }
        #[cfg(target_os = "macos")]
        {
            let home = std::env::var("HOME").unwrap_or_else(|_| "~".to_string());
            return Some(
                PathBuf::from(home)
                    .join("Library")
                    .join("Application Support")
                    .join("Colorbook")
                    .join(SETTINGS_FILE),
            );
        }
        #[cfg(not(any(target_os = "linux", target_os = "windows", target_os = "macos")))]
        {
            std::env::current_exe()
                .ok()
                .and_then(|p| p.parent().map(|d| d.join(SETTINGS_FILE)))
        }
    }

    /// Parse `key=value` lines. Unknown keys and bad values keep their defaults.
    pub fn parse(content: &str) -> Self {
        let mut s = Self::default();
        for line in content.lines() {
            let Some((key, val)) = line.split_once('=') else { continue };
            let val = val.trim();
            match key.trim() {
                "max_undo" => {
                    if let Ok(n) = val.parse::<usize>()
                        && n > 0
                    {
                        s.max_undo = n;
                    }
                }
                "fill_tolerance" => {
                    if let Ok(t) = val.parse::<f32>()
                        && t.is_finite()
                        && t >= 0.0
                    {
                        s.fill_tolerance = t;
                    }
                }
                "brush_size" => {
                    if let Ok(v) = val.parse::<f32>()
                        && v.is_finite()
                        && v > 0.0
                    {
                        s.brush_size = v;
                    }
                }
                "opacity" => {
                    if let Ok(v) = val.parse::<f32>()
                        && v.is_finite()
                    {
                        s.opacity = v.clamp(0.0, 100.0);
                    }
                }
                "color" => {
                    if let Some(c) = parse_hex_color(val) {
                        s.color = c;
                    }
                }
                "template" => {
                    if let Ok(t) = val.parse() {
                        s.template = t;
                    }
                }
                "bucket_pattern" => s.bucket_pattern = val == "true",
                "child_mode" => s.child_mode = val == "true",
                _ => {}
            }
        }
        s
    }

    pub fn to_config_string(&self) -> String {
        format!(
            "max_undo={}\n\
             fill_tolerance={}\n\
             brush_size={}\n\
             opacity={}\n\
             color={}\n\
             template={}\n\
             bucket_pattern={}\n\
             child_mode={}\n",
            self.max_undo,
            self.fill_tolerance,
            self.brush_size,
            self.opacity,
            format_hex_color(self.color),
            self.template,
            self.bucket_pattern,
            self.child_mode,
        )
    }

    /// Load from disk, or defaults if the file is missing or unreadable.
    pub fn load() -> Self {
        let Some(path) = Self::settings_path() else { return Self::default() };
        let Ok(content) = std::fs::read_to_string(&path) else { return Self::default() };
        Self::parse(&content)
    }

    pub fn save(&self) {
        let Some(path) = Self::settings_path() else { return };
        if let Some(dir) = path.parent() {
            let _ = std::fs::create_dir_all(dir);
        }
        if let Err(e) = std::fs::write(&path, self.to_config_string()) {
            crate::log_warn!("Could not save settings to {}: {}", path.display(), e);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_the_engine() {
        let s = PaintSettings::default();
        assert_eq!(s.max_undo, 25);
        assert_eq!(s.fill_tolerance, 120.0);
        assert_eq!(s.brush_size, 12.0);
        assert_eq!(format_hex_color(s.color), "#ff4d6d");
        assert_eq!(s.template, BuiltinTemplate::Flower);
        assert!(s.bucket_pattern);
        assert!(!s.child_mode);
    }

    #[test]
    fn config_string_round_trips() {
        let s = PaintSettings {
            max_undo: 40,
            fill_tolerance: 60.0,
            brush_size: 7.5,
            opacity: 30.0,
            color: Rgba([1, 2, 3, 255]),
            template: BuiltinTemplate::Fish,
            bucket_pattern: false,
            child_mode: true,
        };
        assert_eq!(PaintSettings::parse(&s.to_config_string()), s);
    }

    #[test]
    fn bad_values_and_unknown_keys_fall_back() {
        let s = PaintSettings::parse(
            "max_undo=0\nfill_tolerance=-3\ncolor=#zzz\ntemplate=castle\nmystery=1\nno equals sign\nopacity=250\n",
        );
        let d = PaintSettings::default();
        assert_eq!(s.max_undo, d.max_undo);
        assert_eq!(s.fill_tolerance, d.fill_tolerance);
        assert_eq!(s.color, d.color);
        assert_eq!(s.template, d.template);
        assert_eq!(s.opacity, 100.0);
    }

    #[test]
    fn hex_colors() {
        assert_eq!(parse_hex_color("#FF0080"), Some(Rgba([255, 0, 128, 255])));
        assert_eq!(parse_hex_color("00ff0080"), Some(Rgba([0, 255, 0, 128])));
        assert_eq!(parse_hex_color("#12345"), None);
        assert_eq!(parse_hex_color("#ééé"), None);
    }
}
