//! OS permission checks
//!
//! macOS gates the two things this agent does behind separate privacy
//! switches:
//! - Input Monitoring, for the global event tap
//! - Accessibility, for synthetic key events and AXSelectedText
//!
//! Elsewhere both are reported as granted; failures surface when the tap or
//! synthesizer is created instead.

use serde::Serialize;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum PermissionState {
    Granted,
    Denied,
}

impl PermissionState {
    fn from_bool(granted: bool) -> Self {
        if granted {
            PermissionState::Granted
        } else {
            PermissionState::Denied
        }
    }
}

impl std::fmt::Display for PermissionState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            PermissionState::Granted => write!(f, "granted"),
            PermissionState::Denied => write!(f, "denied"),
        }
    }
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "snake_case")]
pub struct PermissionReport {
    pub input_monitoring: PermissionState,
    pub accessibility: PermissionState,
    pub guidance: Vec<String>,
}

impl PermissionReport {
    pub fn all_granted(&self) -> bool {
        self.input_monitoring == PermissionState::Granted
            && self.accessibility == PermissionState::Granted
    }
}

/// Collect the current permission state with guidance for anything missing
pub fn report() -> PermissionReport {
    build_report(has_input_monitoring(), has_accessibility())
}

fn build_report(input_monitoring: bool, accessibility: bool) -> PermissionReport {
    let mut guidance = Vec::new();
    if !input_monitoring {
        guidance.push(
            "Hotkeys are disabled. Grant access in System Settings > Privacy & Security > Input Monitoring."
                .to_string(),
        );
    }
    if !accessibility {
        guidance.push(
            "Answers cannot be typed. Grant access in System Settings > Privacy & Security > Accessibility."
                .to_string(),
        );
    }
    if guidance.is_empty() {
        guidance.push("Permissions look healthy.".to_string());
    }

    PermissionReport {
        input_monitoring: PermissionState::from_bool(input_monitoring),
        accessibility: PermissionState::from_bool(accessibility),
        guidance,
    }
}

#[cfg(target_os = "macos")]
mod macos {
    use core_foundation::base::TCFType;
    use core_foundation::boolean::CFBoolean;
    use core_foundation::dictionary::CFDictionary;
    use core_foundation::string::CFString;

    // IOHIDRequestType / IOHIDAccessType from IOKit/hid/IOHIDLib.h
    const IOHID_REQUEST_TYPE_LISTEN_EVENT: u32 = 1;
    const IOHID_ACCESS_TYPE_GRANTED: u32 = 0;

    #[link(name = "IOKit", kind = "framework")]
    extern "C" {
        fn IOHIDCheckAccess(request_type: u32) -> u32;
        fn IOHIDRequestAccess(request_type: u32) -> bool;
    }

    #[link(name = "ApplicationServices", kind = "framework")]
    extern "C" {
        fn AXIsProcessTrusted() -> bool;
        fn AXIsProcessTrustedWithOptions(options: core_foundation::base::CFTypeRef) -> bool;
    }

    pub fn input_monitoring() -> bool {
        unsafe { IOHIDCheckAccess(IOHID_REQUEST_TYPE_LISTEN_EVENT) == IOHID_ACCESS_TYPE_GRANTED }
    }

    pub fn accessibility() -> bool {
        unsafe { AXIsProcessTrusted() }
    }

    /// Trigger both system prompts
    pub fn request() {
        let key = CFString::new("AXTrustedCheckOptionPrompt");
        let value = CFBoolean::true_value();
        let options = CFDictionary::from_CFType_pairs(&[(key.as_CFType(), value.as_CFType())]);

        unsafe {
            AXIsProcessTrustedWithOptions(options.as_concrete_TypeRef() as _);
            IOHIDRequestAccess(IOHID_REQUEST_TYPE_LISTEN_EVENT);
        }
    }
}

/// Whether the global event tap may be created
pub fn has_input_monitoring() -> bool {
    #[cfg(target_os = "macos")]
    {
        macos::input_monitoring()
    }
    #[cfg(not(target_os = "macos"))]
    {
        true
    }
}

/// Whether synthetic input and the accessibility API are allowed
pub fn has_accessibility() -> bool {
    #[cfg(target_os = "macos")]
    {
        macos::accessibility()
    }
    #[cfg(not(target_os = "macos"))]
    {
        true
    }
}

/// Show the system permission prompts and open the relevant settings pane
pub fn request_access() {
    #[cfg(target_os = "macos")]
    {
        macos::request();
        if !has_accessibility() {
            let _ = std::process::Command::new("open")
                .arg("x-apple.systempreferences:com.apple.preference.security?Privacy_Accessibility")
                .spawn();
        }
    }
    #[cfg(not(target_os = "macos"))]
    {
        tracing::debug!("No permission prompts on this platform");
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_report_all_granted() {
        let report = build_report(true, true);
        assert!(report.all_granted());
        assert_eq!(report.guidance, vec!["Permissions look healthy.".to_string()]);
    }

    #[test]
    fn test_report_guidance_for_missing() {
        let report = build_report(false, true);
        assert_eq!(report.input_monitoring, PermissionState::Denied);
        assert!(!report.all_granted());
        assert_eq!(report.guidance.len(), 1);
        assert!(report.guidance[0].contains("Input Monitoring"));

        let report = build_report(false, false);
        assert_eq!(report.guidance.len(), 2);
    }

    #[test]
    fn test_report_serializes() {
        let json = serde_json::to_value(build_report(true, false)).unwrap();
        assert_eq!(json["input_monitoring"], "granted");
        assert_eq!(json["accessibility"], "denied");
    }

    #[cfg(not(target_os = "macos"))]
    #[test]
    fn test_non_macos_reports_granted() {
        assert!(report().all_granted());
    }
}
