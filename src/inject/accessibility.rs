//! Accessibility-API text insertion
//!
//! On macOS the focused UI element's `AXSelectedText` attribute can be set
//! directly, which inserts text at the caret without synthesising keys.
//! Not every element supports it; callers fall back to key events when
//! `try_set_focused_text` returns false. Other platforms have no writer.

use super::FocusedTextWriter;
use std::sync::Arc;

/// Writer that never succeeds
pub struct NoopWriter;

impl FocusedTextWriter for NoopWriter {
    fn try_set_focused_text(&self, _text: &str) -> bool {
        false
    }
}

/// The accessibility writer for this platform
pub fn platform_writer() -> Arc<dyn FocusedTextWriter> {
    #[cfg(target_os = "macos")]
    {
        Arc::new(macos::AxWriter)
    }
    #[cfg(not(target_os = "macos"))]
    {
        Arc::new(NoopWriter)
    }
}

#[cfg(target_os = "macos")]
mod macos {
    use super::FocusedTextWriter;
    use core_foundation::base::{CFRelease, CFTypeRef, TCFType};
    use core_foundation::string::{CFString, CFStringRef};
    use std::ffi::c_void;

    type AXUIElementRef = *const c_void;
    type AXError = i32;
    const K_AX_ERROR_SUCCESS: AXError = 0;

    #[link(name = "ApplicationServices", kind = "framework")]
    extern "C" {
        fn AXUIElementCreateSystemWide() -> AXUIElementRef;
        fn AXUIElementCopyAttributeValue(
            element: AXUIElementRef,
            attribute: CFStringRef,
            value: *mut CFTypeRef,
        ) -> AXError;
        fn AXUIElementSetAttributeValue(
            element: AXUIElementRef,
            attribute: CFStringRef,
            value: CFTypeRef,
        ) -> AXError;
    }

    /// Sets `AXSelectedText` on the system-wide focused element
    pub struct AxWriter;

    impl FocusedTextWriter for AxWriter {
        fn try_set_focused_text(&self, text: &str) -> bool {
            if !crate::permissions::has_accessibility() {
                return false;
            }

            let focused_attr = CFString::new("AXFocusedUIElement");
            let selected_attr = CFString::new("AXSelectedText");
            let value = CFString::new(text);

            unsafe {
                let system = AXUIElementCreateSystemWide();
                if system.is_null() {
                    return false;
                }

                let mut focused: CFTypeRef = std::ptr::null();
                let err = AXUIElementCopyAttributeValue(
                    system,
                    focused_attr.as_concrete_TypeRef(),
                    &mut focused,
                );
                CFRelease(system as CFTypeRef);
                if err != K_AX_ERROR_SUCCESS || focused.is_null() {
                    tracing::debug!("No focused accessibility element (AXError {})", err);
                    return false;
                }

                let err = AXUIElementSetAttributeValue(
                    focused as AXUIElementRef,
                    selected_attr.as_concrete_TypeRef(),
                    value.as_CFTypeRef(),
                );
                CFRelease(focused);

                if err != K_AX_ERROR_SUCCESS {
                    tracing::debug!("AXSelectedText not settable (AXError {})", err);
                    return false;
                }
                true
            }
        }
    }
}
