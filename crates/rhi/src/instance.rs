//! Vulkan instance management.
//!
//! This module handles VkInstance creation, the validation layer and its
//! optional enhanced features, and the debug messenger that forwards
//! validation output into `tracing`.
//!
//! # Example
//!
//! ```no_run
//! use harness_rhi::instance::{Instance, InstanceDesc, ValidationDesc};
//!
//! # fn example(surface_extensions: &[*const std::ffi::c_char]) -> harness_rhi::RhiResult<()> {
//! let instance = Instance::new(&InstanceDesc {
//!     extensions: surface_extensions,
//!     validation: Some(ValidationDesc::default()),
//!     ..Default::default()
//! })?;
//! assert!(instance.has_validation());
//! # Ok(())
//! # }
//! ```

use std::ffi::{CStr, c_char};
use std::sync::atomic::{AtomicU64, Ordering};

use ash::{Entry, vk};
use tracing::{debug, error, info, warn};

use crate::error::RhiError;

/// Error-severity messages received from the validation layer by any
/// instance in this process.
static VALIDATION_ERRORS: AtomicU64 = AtomicU64::new(0);

/// Number of validation errors reported so far in this process.
pub fn validation_error_count() -> u64 {
    VALIDATION_ERRORS.load(Ordering::Relaxed)
}

/// The Khronos validation layer name.
const VALIDATION_LAYER_NAME: &CStr = c"VK_LAYER_KHRONOS_validation";

/// Enhanced validation features layered on top of the core checks.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct ValidationDesc {
    pub best_practices: bool,
    pub gpu_assisted: bool,
    pub synchronization: bool,
}

impl Default for ValidationDesc {
    fn default() -> Self {
        Self {
            best_practices: true,
            gpu_assisted: true,
            synchronization: true,
        }
    }
}

impl ValidationDesc {
    /// Feature enables passed through `VkValidationFeaturesEXT`.
    pub fn enabled_features(&self) -> Vec<vk::ValidationFeatureEnableEXT> {
        let mut features = Vec::with_capacity(3);
        if self.best_practices {
            features.push(vk::ValidationFeatureEnableEXT::BEST_PRACTICES);
        }
        if self.gpu_assisted {
            features.push(vk::ValidationFeatureEnableEXT::GPU_ASSISTED);
        }
        if self.synchronization {
            features.push(vk::ValidationFeatureEnableEXT::SYNCHRONIZATION_VALIDATION);
        }
        features
    }
}

/// Parameters for [`Instance::new`].
#[derive(Clone, Copy, Debug)]
pub struct InstanceDesc<'a> {
    pub app_name: &'a CStr,
    /// Instance extensions required by the caller, typically the surface
    /// extensions of the windowing system. Empty for headless use.
    pub extensions: &'a [*const c_char],
    /// `Some` makes the validation layer mandatory.
    pub validation: Option<ValidationDesc>,
}

impl Default for InstanceDesc<'_> {
    fn default() -> Self {
        Self {
            app_name: c"Vulkan Harness",
            extensions: &[],
            validation: None,
        }
    }
}

/// Vulkan instance wrapper with optional validation layer support.
///
/// This struct manages the lifetime of the Vulkan instance and its associated
/// debug utilities. When dropped, the debug messenger is destroyed before the
/// instance.
pub struct Instance {
    /// Vulkan entry point loader
    entry: Entry,
    /// Vulkan instance handle
    instance: ash::Instance,
    /// Debug utils extension loader (only present when validation is enabled)
    debug_utils: Option<ash::ext::debug_utils::Instance>,
    /// Debug messenger handle (only present when validation is enabled)
    debug_messenger: Option<vk::DebugUtilsMessengerEXT>,
}

impl Instance {
    /// Creates a new Vulkan instance.
    ///
    /// # Errors
    ///
    /// Returns an error if:
    /// - Vulkan library cannot be loaded
    /// - Validation was requested and the Khronos layer is not installed
    /// - Instance creation fails
    /// - Debug messenger setup fails
    pub fn new(desc: &InstanceDesc<'_>) -> Result<Self, RhiError> {
        let entry = unsafe { Entry::load()? };

        if desc.validation.is_some() && !Self::is_validation_layer_available(&entry)? {
            error!("Validation requested but {VALIDATION_LAYER_NAME:?} is not installed");
            return Err(RhiError::MissingLayer(
                VALIDATION_LAYER_NAME.to_string_lossy().into_owned(),
            ));
        }

        let app_info = vk::ApplicationInfo::default()
            .application_name(desc.app_name)
            .application_version(vk::make_api_version(0, 0, 1, 0))
            .engine_name(c"No Engine")
            .engine_version(vk::make_api_version(0, 0, 1, 0))
            .api_version(vk::API_VERSION_1_2);

        let mut extensions = desc.extensions.to_vec();
        let mut layers = Vec::new();
        let feature_enables = desc
            .validation
            .map(|v| v.enabled_features())
            .unwrap_or_default();

        if desc.validation.is_some() {
            layers.push(VALIDATION_LAYER_NAME.as_ptr());
            extensions.push(ash::ext::debug_utils::NAME.as_ptr());
            if !feature_enables.is_empty() {
                extensions.push(ash::ext::validation_features::NAME.as_ptr());
            }
        }

        let mut validation_features =
            vk::ValidationFeaturesEXT::default().enabled_validation_features(&feature_enables);

        let mut create_info = vk::InstanceCreateInfo::default()
            .application_info(&app_info)
            .enabled_extension_names(&extensions)
            .enabled_layer_names(&layers);
        if !feature_enables.is_empty() {
            create_info = create_info.push_next(&mut validation_features);
        }

        let instance = unsafe { entry.create_instance(&create_info, None)? };

        info!(
            "Vulkan instance created (API 1.2, {} extension(s))",
            extensions.len()
        );

        let (debug_utils, debug_messenger) = if desc.validation.is_some() {
            let debug_utils = ash::ext::debug_utils::Instance::new(&entry, &instance);
            let messenger = match Self::setup_debug_messenger(&debug_utils) {
                Ok(messenger) => messenger,
                Err(e) => {
                    unsafe { instance.destroy_instance(None) };
                    return Err(e);
                }
            };
            info!(
                "Validation enabled with features {:?}",
                feature_enables
            );
            (Some(debug_utils), Some(messenger))
        } else {
            (None, None)
        };

        Ok(Self {
            entry,
            instance,
            debug_utils,
            debug_messenger,
        })
    }

    /// Returns the Vulkan instance handle.
    #[inline]
    pub fn handle(&self) -> &ash::Instance {
        &self.instance
    }

    /// Returns the Vulkan entry point loader.
    #[inline]
    pub fn entry(&self) -> &Entry {
        &self.entry
    }

    /// Returns whether validation layers are enabled.
    #[inline]
    pub fn has_validation(&self) -> bool {
        self.debug_messenger.is_some()
    }

    /// Checks if the Khronos validation layer is available.
    fn is_validation_layer_available(entry: &Entry) -> Result<bool, RhiError> {
        let available_layers = unsafe { entry.enumerate_instance_layer_properties()? };

        let found = available_layers.iter().any(|layer| {
            let layer_name = unsafe { CStr::from_ptr(layer.layer_name.as_ptr()) };
            layer_name == VALIDATION_LAYER_NAME
        });

        Ok(found)
    }

    /// Sets up the debug messenger for validation layer callbacks.
    fn setup_debug_messenger(
        debug_utils: &ash::ext::debug_utils::Instance,
    ) -> Result<vk::DebugUtilsMessengerEXT, RhiError> {
        let create_info = vk::DebugUtilsMessengerCreateInfoEXT::default()
            .message_severity(
                vk::DebugUtilsMessageSeverityFlagsEXT::WARNING
                    | vk::DebugUtilsMessageSeverityFlagsEXT::ERROR,
            )
            .message_type(
                vk::DebugUtilsMessageTypeFlagsEXT::GENERAL
                    | vk::DebugUtilsMessageTypeFlagsEXT::VALIDATION
                    | vk::DebugUtilsMessageTypeFlagsEXT::PERFORMANCE,
            )
            .pfn_user_callback(Some(debug_callback));

        let messenger = unsafe { debug_utils.create_debug_utils_messenger(&create_info, None)? };
        debug!("Debug messenger created");

        Ok(messenger)
    }
}

impl Drop for Instance {
    fn drop(&mut self) {
        unsafe {
            if let (Some(debug_utils), Some(messenger)) = (&self.debug_utils, self.debug_messenger)
            {
                debug_utils.destroy_debug_utils_messenger(messenger, None);
            }
            self.instance.destroy_instance(None);
        }
        info!("Vulkan instance destroyed");
    }
}

fn message_type_label(message_type: vk::DebugUtilsMessageTypeFlagsEXT) -> &'static str {
    if message_type.contains(vk::DebugUtilsMessageTypeFlagsEXT::VALIDATION) {
        "Validation"
    } else if message_type.contains(vk::DebugUtilsMessageTypeFlagsEXT::PERFORMANCE) {
        "Performance"
    } else if message_type.contains(vk::DebugUtilsMessageTypeFlagsEXT::GENERAL) {
        "General"
    } else {
        "Unknown"
    }
}

/// Forwards validation layer messages to `tracing`.
///
/// # Safety
///
/// Called by the Vulkan loader with a valid (or null) callback data pointer.
unsafe extern "system" fn debug_callback(
    message_severity: vk::DebugUtilsMessageSeverityFlagsEXT,
    message_type: vk::DebugUtilsMessageTypeFlagsEXT,
    p_callback_data: *const vk::DebugUtilsMessengerCallbackDataEXT<'_>,
    _user_data: *mut std::ffi::c_void,
) -> vk::Bool32 {
    if p_callback_data.is_null() {
        return vk::FALSE;
    }

    let callback_data = unsafe { &*p_callback_data };
    let message = if callback_data.p_message.is_null() {
        std::borrow::Cow::Borrowed("(no message)")
    } else {
        unsafe { CStr::from_ptr(callback_data.p_message).to_string_lossy() }
    };

    let type_str = message_type_label(message_type);

    match message_severity {
        vk::DebugUtilsMessageSeverityFlagsEXT::ERROR => {
            VALIDATION_ERRORS.fetch_add(1, Ordering::Relaxed);
            error!("[Vulkan {}] {}", type_str, message);
        }
        vk::DebugUtilsMessageSeverityFlagsEXT::WARNING => {
            warn!("[Vulkan {}] {}", type_str, message);
        }
        vk::DebugUtilsMessageSeverityFlagsEXT::INFO => {
            info!("[Vulkan {}] {}", type_str, message);
        }
        _ => {
            debug!("[Vulkan {}] {}", type_str, message);
        }
    }

    vk::FALSE
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_headless_instance_without_validation() {
        match Instance::new(&InstanceDesc::default()) {
            Ok(instance) => assert!(!instance.has_validation()),
            Err(RhiError::LoadingError(_)) | Err(RhiError::VulkanError(_)) => {
                eprintln!("Skipping test: Vulkan not available");
            }
            Err(e) => panic!("Unexpected error: {:?}", e),
        }
    }

    #[test]
    fn test_validation_is_mandatory_when_requested() {
        let desc = InstanceDesc {
            validation: Some(ValidationDesc::default()),
            ..Default::default()
        };
        match Instance::new(&desc) {
            Ok(instance) => assert!(instance.has_validation()),
            Err(RhiError::MissingLayer(name)) => {
                assert_eq!(name, "VK_LAYER_KHRONOS_validation");
            }
            Err(RhiError::LoadingError(_)) | Err(RhiError::VulkanError(_)) => {
                eprintln!("Skipping test: Vulkan not available");
            }
            Err(e) => panic!("Unexpected error: {:?}", e),
        }
    }

    #[test]
    fn test_validation_features() {
        assert_eq!(
            ValidationDesc::default().enabled_features(),
            vec![
                vk::ValidationFeatureEnableEXT::BEST_PRACTICES,
                vk::ValidationFeatureEnableEXT::GPU_ASSISTED,
                vk::ValidationFeatureEnableEXT::SYNCHRONIZATION_VALIDATION,
            ]
        );

        let sync_only = ValidationDesc {
            best_practices: false,
            gpu_assisted: false,
            synchronization: true,
        };
        assert_eq!(
            sync_only.enabled_features(),
            vec![vk::ValidationFeatureEnableEXT::SYNCHRONIZATION_VALIDATION]
        );
    }

    #[test]
    fn test_message_type_label_prefers_validation() {
        let mixed = vk::DebugUtilsMessageTypeFlagsEXT::GENERAL
            | vk::DebugUtilsMessageTypeFlagsEXT::VALIDATION;
        assert_eq!(message_type_label(mixed), "Validation");
        assert_eq!(
            message_type_label(vk::DebugUtilsMessageTypeFlagsEXT::PERFORMANCE),
            "Performance"
        );
    }
}
