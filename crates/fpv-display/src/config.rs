/// Buffer-swap throttling policy.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum VsyncMode {
    /// Decode and display as fast as possible.
    #[default]
    Unthrottled,
    /// Run at the display's refresh rate (typically 60 Hz).
    Full,
    /// Run at half the refresh rate (30 Hz).
    Half,
}

impl VsyncMode {
    /// Maps the conventional swap-interval flag {0, 1, 2}.
    pub fn from_interval(interval: u32) -> Option<Self> {
        match interval {
            0 => Some(Self::Unthrottled),
            1 => Some(Self::Full),
            2 => Some(Self::Half),
            _ => None,
        }
    }
}

/// Construction-time presenter configuration.
#[derive(Debug, Clone)]
pub struct DisplayConfig {
    pub width: u32,
    pub height: u32,
    pub vsync: VsyncMode,
}

impl Default for DisplayConfig {
    fn default() -> Self {
        Self {
            width: 1280,
            height: 720,
            vsync: VsyncMode::Unthrottled,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn swap_interval_flags_map_to_modes() {
        assert_eq!(VsyncMode::from_interval(0), Some(VsyncMode::Unthrottled));
        assert_eq!(VsyncMode::from_interval(1), Some(VsyncMode::Full));
        assert_eq!(VsyncMode::from_interval(2), Some(VsyncMode::Half));
        assert_eq!(VsyncMode::from_interval(3), None);
    }
}
