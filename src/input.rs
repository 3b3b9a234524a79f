use egui::{Pos2, Vec2};

/// Where a pointer event sits in its gesture.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum PointerPhase {
    Down,
    Move,
    Up,
    Leave,
}

/// Mouse, pen and touch input folded into one shape. Positions are CSS pixels
/// relative to the canvas.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct PointerEvent {
    pub phase: PointerPhase,
    pub primary: Pos2,
    /// Second touch contact, if any. Reserved for pinch.
    pub secondary: Option<Pos2>,
    /// Scroll amount; negative scrolls up.
    pub wheel_delta: Option<f32>,
    pub button_down: bool,
}

impl PointerEvent {
    pub fn down(at: Pos2) -> Self {
        Self {
            phase: PointerPhase::Down,
            primary: at,
            secondary: None,
            wheel_delta: None,
            button_down: true,
        }
    }

    pub fn moved(at: Pos2, button_down: bool) -> Self {
        Self {
            phase: PointerPhase::Move,
            button_down,
            ..Self::down(at)
        }
    }

    pub fn up(at: Pos2) -> Self {
        Self {
            phase: PointerPhase::Up,
            button_down: false,
            ..Self::down(at)
        }
    }

    pub fn leave(at: Pos2, button_down: bool) -> Self {
        Self {
            phase: PointerPhase::Leave,
            button_down,
            ..Self::down(at)
        }
    }

    pub fn wheel(at: Pos2, delta_y: f32) -> Self {
        Self {
            phase: PointerPhase::Move,
            wheel_delta: Some(delta_y),
            button_down: false,
            ..Self::down(at)
        }
    }

    /// Two-contact event.
    pub fn touch(phase: PointerPhase, a: Pos2, b: Pos2) -> Self {
        Self {
            phase,
            secondary: Some(b),
            button_down: true,
            ..Self::down(a)
        }
    }
}

/// What the current pointer sequence is doing.
#[derive(Clone, Copy, Debug, PartialEq, Default)]
pub enum Gesture {
    #[default]
    Idle,
    Drawing,
    Panning {
        start: Pos2,
        initial_pan: Vec2,
    },
    Pinching {
        prev: (Pos2, Pos2),
    },
}

impl Gesture {
    pub fn is_idle(&self) -> bool {
        matches!(self, Gesture::Idle)
    }
}
