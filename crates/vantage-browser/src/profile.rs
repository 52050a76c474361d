use vantage_core::DeviceClass;

/// Viewport and emulation settings for one device class.
#[derive(Debug, Clone, PartialEq)]
pub struct DeviceProfile {
    pub user_agent: String,
    pub viewport_width: u32,
    pub viewport_height: u32,
    pub device_scale_factor: f64,
    pub mobile: bool,
    pub touch: bool,
}

impl DeviceProfile {
    /// Large fixed desktop viewport.
    pub fn desktop(user_agent: impl Into<String>) -> Self {
        Self {
            user_agent: user_agent.into(),
            viewport_width: 1920,
            viewport_height: 1080,
            device_scale_factor: 1.0,
            mobile: false,
            touch: false,
        }
    }

    /// Narrow phone viewport with touch input.
    pub fn mobile(user_agent: impl Into<String>) -> Self {
        Self {
            user_agent: user_agent.into(),
            viewport_width: 390,
            viewport_height: 844,
            device_scale_factor: 1.0,
            mobile: true,
            touch: true,
        }
    }

    pub fn for_device(device: DeviceClass, user_agent: impl Into<String>) -> Self {
        match device {
            DeviceClass::Desktop => Self::desktop(user_agent),
            DeviceClass::Mobile => Self::mobile(user_agent),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const UA: &str = "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36";

    #[test]
    fn test_desktop_profile() {
        let profile = DeviceProfile::for_device(DeviceClass::Desktop, UA);
        assert_eq!((profile.viewport_width, profile.viewport_height), (1920, 1080));
        assert!(!profile.mobile);
        assert!(!profile.touch);
    }

    #[test]
    fn test_mobile_profile() {
        let profile = DeviceProfile::for_device(DeviceClass::Mobile, UA);
        assert_eq!((profile.viewport_width, profile.viewport_height), (390, 844));
        assert!(profile.mobile);
        assert!(profile.touch);
        assert_eq!(profile.user_agent, UA);
    }
}
