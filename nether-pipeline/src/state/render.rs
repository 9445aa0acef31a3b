//! Fixed-function render state payloads
//!
//! Defines the small value types stored in pipeline state groups: color,
//! alpha test, depth, culling, color mask and the user program handle.

use bitflags::bitflags;

/// RGBA color with float components in `0.0..=1.0`
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Color {
    pub red: f32,
    pub green: f32,
    pub blue: f32,
    pub alpha: f32,
}

impl Color {
    /// Opaque white, the default pipeline color
    pub const WHITE: Color = Color::new(1.0, 1.0, 1.0, 1.0);
    /// Transparent black, the default blend constant
    pub const TRANSPARENT: Color = Color::new(0.0, 0.0, 0.0, 0.0);

    pub const fn new(red: f32, green: f32, blue: f32, alpha: f32) -> Self {
        Self {
            red,
            green,
            blue,
            alpha,
        }
    }

    /// Build from 8-bit components
    pub fn from_u8(red: u8, green: u8, blue: u8, alpha: u8) -> Self {
        Self::new(
            red as f32 / 255.0,
            green as f32 / 255.0,
            blue as f32 / 255.0,
            alpha as f32 / 255.0,
        )
    }

    /// Alpha quantized to a byte, as the framebuffer would see it
    pub fn alpha_byte(&self) -> u8 {
        (self.alpha.clamp(0.0, 1.0) * 255.0).round() as u8
    }

    /// Components with `-0.0` folded into `0.0`, for hashing
    pub(crate) fn canonical(&self) -> [f32; 4] {
        [self.red, self.green, self.blue, self.alpha].map(canonical_f32)
    }
}

impl Default for Color {
    fn default() -> Self {
        Color::WHITE
    }
}

/// Folds `-0.0` into `0.0` so equal floats hash equally.
pub(crate) fn canonical_f32(value: f32) -> f32 {
    if value == 0.0 { 0.0 } else { value }
}

/// Whether blending is forced on, forced off or derived from other state
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
#[repr(u32)]
pub enum BlendEnable {
    Enabled = 1,
    Disabled = 2,
    /// Blend only when the rest of the pipeline implies transparency
    #[default]
    Automatic = 3,
}

impl BlendEnable {
    pub fn from_u32(value: u32) -> Option<Self> {
        match value {
            1 => Some(BlendEnable::Enabled),
            2 => Some(BlendEnable::Disabled),
            3 => Some(BlendEnable::Automatic),
            _ => None,
        }
    }
}

/// Comparison used by the alpha test and the depth test
///
/// Discriminants follow the GL enum values.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u32)]
pub enum CompareFunction {
    Never = 0x0200,
    Less = 0x0201,
    Equal = 0x0202,
    LessEqual = 0x0203,
    Greater = 0x0204,
    NotEqual = 0x0205,
    GreaterEqual = 0x0206,
    Always = 0x0207,
}

impl CompareFunction {
    pub fn from_u32(value: u32) -> Option<Self> {
        match value {
            0x0200 => Some(CompareFunction::Never),
            0x0201 => Some(CompareFunction::Less),
            0x0202 => Some(CompareFunction::Equal),
            0x0203 => Some(CompareFunction::LessEqual),
            0x0204 => Some(CompareFunction::Greater),
            0x0205 => Some(CompareFunction::NotEqual),
            0x0206 => Some(CompareFunction::GreaterEqual),
            0x0207 => Some(CompareFunction::Always),
            _ => None,
        }
    }
}

/// Depth test and depth write configuration
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct DepthState {
    pub test_enabled: bool,
    pub test_function: CompareFunction,
    pub write_enabled: bool,
    pub range_near: f32,
    pub range_far: f32,
}

impl Default for DepthState {
    fn default() -> Self {
        Self {
            test_enabled: false,
            test_function: CompareFunction::Less,
            write_enabled: true,
            range_near: 0.0,
            range_far: 1.0,
        }
    }
}

impl DepthState {
    /// Render equivalence: with testing off nothing else matters.
    pub fn equivalent(&self, other: &DepthState) -> bool {
        if !self.test_enabled && !other.test_enabled {
            return true;
        }
        self == other
    }
}

/// Cull mode for face culling
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
#[repr(u32)]
pub enum CullMode {
    /// No face culling
    #[default]
    None = 0,
    /// Cull front faces
    Front = 1,
    /// Cull back faces
    Back = 2,
    /// Cull everything
    Both = 3,
}

impl CullMode {
    pub fn from_u32(value: u32) -> Option<Self> {
        match value {
            0 => Some(CullMode::None),
            1 => Some(CullMode::Front),
            2 => Some(CullMode::Back),
            3 => Some(CullMode::Both),
            _ => None,
        }
    }
}

/// Vertex order that marks a triangle as front facing
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
#[repr(u32)]
pub enum Winding {
    Clockwise = 0,
    #[default]
    CounterClockwise = 1,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct CullFaceState {
    pub mode: CullMode,
    pub front_winding: Winding,
}

impl CullFaceState {
    /// Render equivalence: winding is irrelevant when nothing is culled.
    pub fn equivalent(&self, other: &CullFaceState) -> bool {
        if self.mode == CullMode::None && other.mode == CullMode::None {
            return true;
        }
        self == other
    }
}

bitflags! {
    /// Framebuffer channels that receive writes
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    pub struct ColorMask: u8 {
        const RED = 1 << 0;
        const GREEN = 1 << 1;
        const BLUE = 1 << 2;
        const ALPHA = 1 << 3;
    }
}

impl Default for ColorMask {
    fn default() -> Self {
        ColorMask::all()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct LogicOpsState {
    pub color_mask: ColorMask,
}

/// Handle to a user-supplied shader program
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ProgramHandle(pub u32);

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_depth_disabled_equivalence() {
        let a = DepthState::default();
        let b = DepthState {
            test_function: CompareFunction::Greater,
            write_enabled: false,
            range_near: 0.25,
            ..DepthState::default()
        };
        assert!(a.equivalent(&b));

        let c = DepthState {
            test_enabled: true,
            ..a
        };
        assert!(!c.equivalent(&b));
    }

    #[test]
    fn test_cull_none_ignores_winding() {
        let a = CullFaceState {
            mode: CullMode::None,
            front_winding: Winding::Clockwise,
        };
        let b = CullFaceState::default();
        assert!(a.equivalent(&b));

        let back = CullFaceState {
            mode: CullMode::Back,
            front_winding: Winding::Clockwise,
        };
        assert!(!back.equivalent(&CullFaceState {
            mode: CullMode::Back,
            ..CullFaceState::default()
        }));
    }

    #[test]
    fn test_from_u32_rejects_unknown() {
        assert_eq!(CompareFunction::from_u32(0x0203), Some(CompareFunction::LessEqual));
        assert_eq!(CompareFunction::from_u32(7), None);
        assert_eq!(CullMode::from_u32(2), Some(CullMode::Back));
        assert_eq!(BlendEnable::from_u32(0), None);
    }

    #[test]
    fn test_alpha_byte() {
        assert_eq!(Color::WHITE.alpha_byte(), 255);
        assert_eq!(Color::new(1.0, 1.0, 1.0, 0.999).alpha_byte(), 255);
        assert_eq!(Color::from_u8(0, 0, 0, 128).alpha_byte(), 128);
        assert_eq!(Color::TRANSPARENT.canonical(), [0.0; 4]);
    }
}
