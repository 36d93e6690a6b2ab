// Instance bring-up
//
// Responsibilities:
// - Layer / extension discovery (owned strings, no manual C string arrays)
// - Instance creation from an explicit description
// - Debug messenger routed into the diagnostics sink

use super::error::{InitError, InitResult};
use crate::diagnostics::{self, Diagnostic, Level};
use ash::extensions::ext::DebugUtils;
use ash::{vk, Entry};
use std::ffi::{c_char, CStr, CString};

pub const VALIDATION_LAYER: &str = "VK_LAYER_KHRONOS_validation";

/// Convert a fixed-size, NUL-terminated driver string
pub fn driver_string(raw: &[c_char]) -> String {
    let bytes: Vec<u8> = raw.iter().take_while(|&&c| c != 0).map(|&c| c as u8).collect();
    String::from_utf8_lossy(&bytes).into_owned()
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LayerInfo {
    pub name: String,
    pub description: String,
    /// Extensions this layer provides
    pub extensions: Vec<String>,
}

/// Everything the loader reports before an instance exists
#[derive(Debug, Clone, Default)]
pub struct LayerCatalog {
    pub layers: Vec<LayerInfo>,
    pub extensions: Vec<String>,
}

impl LayerCatalog {
    pub fn query(entry: &Entry) -> InitResult<Self> {
        let extensions = entry
            .enumerate_instance_extension_properties(None)
            .map_err(InitError::EnumerateExtensions)?
            .iter()
            .map(|ext| driver_string(&ext.extension_name))
            .collect();

        let mut layers = Vec::new();
        for props in entry
            .enumerate_instance_layer_properties()
            .map_err(InitError::EnumerateLayers)?
        {
            let name = driver_string(&props.layer_name);
            let layer_cstr = CString::new(name.clone()).map_err(|_| {
                InitError::EnumerateLayers(vk::Result::ERROR_INITIALIZATION_FAILED)
            })?;
            let layer_extensions = entry
                .enumerate_instance_extension_properties(Some(&layer_cstr))
                .map_err(InitError::EnumerateExtensions)?
                .iter()
                .map(|ext| driver_string(&ext.extension_name))
                .collect();

            layers.push(LayerInfo {
                name,
                description: driver_string(&props.description),
                extensions: layer_extensions,
            });
        }

        Ok(Self { layers, extensions })
    }

    pub fn has_layer(&self, name: &str) -> bool {
        self.layers.iter().any(|l| l.name == name)
    }

    /// Available globally or through one of `layers`
    pub fn has_extension(&self, name: &str, layers: &[String]) -> bool {
        self.extensions.iter().any(|e| e == name)
            || self
                .layers
                .iter()
                .filter(|l| layers.contains(&l.name))
                .any(|l| l.extensions.iter().any(|e| e == name))
    }

    /// Requested layers that are actually installed, in request order
    pub fn select_layers(&self, requested: &[String]) -> Vec<String> {
        let mut selected: Vec<String> = Vec::new();
        for name in requested {
            if selected.contains(name) {
                continue;
            }
            if self.has_layer(name) {
                selected.push(name.clone());
            } else {
                log::warn!("Instance layer {} is not installed, skipping", name);
            }
        }
        selected
    }

    pub fn log_summary(&self) {
        log::info!(
            "Loader reports {} layer(s) and {} instance extension(s)",
            self.layers.len(),
            self.extensions.len()
        );
        for layer in &self.layers {
            log::debug!("  layer {} ({} extensions): {}", layer.name, layer.extensions.len(), layer.description);
        }
        for ext in &self.extensions {
            log::debug!("  extension {}", ext);
        }
    }
}

/// Inputs to `vkCreateInstance`
#[derive(Clone, Debug)]
pub struct InstanceDesc {
    pub app_name: String,
    pub api_version: u32,
    pub layers: Vec<String>,
    pub extensions: Vec<String>,
    /// Installs a debug messenger when set
    pub debug_callback: vk::PFN_vkDebugUtilsMessengerCallbackEXT,
}

impl InstanceDesc {
    /// Resolve requested layers and extensions against what is installed.
    /// `required` must all be present; the debug messenger is dropped
    /// quietly when `VK_EXT_debug_utils` is missing.
    pub fn resolve(
        catalog: &LayerCatalog,
        app_name: &str,
        requested_layers: &[String],
        required: &[String],
        debug_callback: vk::PFN_vkDebugUtilsMessengerCallbackEXT,
    ) -> InitResult<Self> {
        let layers = catalog.select_layers(requested_layers);

        let mut extensions = Vec::with_capacity(required.len() + 1);
        for name in required {
            if !catalog.has_extension(name, &layers) {
                return Err(InitError::MissingExtension(name.clone()));
            }
            if !extensions.contains(name) {
                extensions.push(name.clone());
            }
        }

        let debug_name = debug_utils_name();
        let debug_callback = match debug_callback {
            Some(cb) if catalog.has_extension(&debug_name, &layers) => {
                if !extensions.contains(&debug_name) {
                    extensions.push(debug_name);
                }
                Some(cb)
            }
            Some(_) => {
                log::warn!("{} unavailable, validation messages will not be captured", debug_name);
                None
            }
            None => None,
        };

        Ok(Self {
            app_name: app_name.to_string(),
            api_version: vk::API_VERSION_1_0,
            layers,
            extensions,
            debug_callback,
        })
    }
}

fn debug_utils_name() -> String {
    DebugUtils::name().to_string_lossy().into_owned()
}

fn to_cstrings(names: &[String]) -> InitResult<Vec<CString>> {
    names
        .iter()
        .map(|n| CString::new(n.as_str()).map_err(|_| InitError::MissingExtension(n.clone())))
        .collect()
}

/// Instance plus its optional debug messenger
pub struct Instance {
    pub handle: ash::Instance,
    debug_utils: Option<(DebugUtils, vk::DebugUtilsMessengerEXT)>,
}

impl Instance {
    pub fn new(entry: &Entry, desc: &InstanceDesc) -> InitResult<Self> {
        log::info!(
            "Creating instance for '{}' with {} layer(s), {} extension(s)",
            desc.app_name,
            desc.layers.len(),
            desc.extensions.len()
        );

        let app_name = CString::new(desc.app_name.replace('\0', ""))
            .map_err(|_| InitError::CreateInstance(vk::Result::ERROR_INITIALIZATION_FAILED))?;
        let layers = to_cstrings(&desc.layers)?;
        let extensions = to_cstrings(&desc.extensions)?;
        let layer_ptrs: Vec<*const c_char> = layers.iter().map(|s| s.as_ptr()).collect();
        let extension_ptrs: Vec<*const c_char> = extensions.iter().map(|s| s.as_ptr()).collect();

        let app_info = vk::ApplicationInfo::builder()
            .application_name(&app_name)
            .application_version(vk::make_api_version(0, 0, 1, 0))
            .engine_name(&app_name)
            .engine_version(vk::make_api_version(0, 0, 1, 0))
            .api_version(desc.api_version);

        let create_info = vk::InstanceCreateInfo::builder()
            .application_info(&app_info)
            .enabled_layer_names(&layer_ptrs)
            .enabled_extension_names(&extension_ptrs);

        let handle = unsafe { entry.create_instance(&create_info, None) }
            .map_err(InitError::CreateInstance)?;

        let mut instance = Self {
            handle,
            debug_utils: None,
        };

        if let Some(callback) = desc.debug_callback {
            match Self::create_debug_messenger(entry, &instance.handle, callback) {
                Ok(pair) => instance.debug_utils = Some(pair),
                Err(e) => {
                    instance.destroy();
                    return Err(e);
                }
            }
        }

        Ok(instance)
    }

    fn create_debug_messenger(
        entry: &Entry,
        instance: &ash::Instance,
        callback: unsafe extern "system" fn(
            vk::DebugUtilsMessageSeverityFlagsEXT,
            vk::DebugUtilsMessageTypeFlagsEXT,
            *const vk::DebugUtilsMessengerCallbackDataEXT,
            *mut std::ffi::c_void,
        ) -> vk::Bool32,
    ) -> InitResult<(DebugUtils, vk::DebugUtilsMessengerEXT)> {
        let debug_utils = DebugUtils::new(entry, instance);

        let create_info = vk::DebugUtilsMessengerCreateInfoEXT::builder()
            .message_severity(
                vk::DebugUtilsMessageSeverityFlagsEXT::VERBOSE
                    | vk::DebugUtilsMessageSeverityFlagsEXT::INFO
                    | vk::DebugUtilsMessageSeverityFlagsEXT::WARNING
                    | vk::DebugUtilsMessageSeverityFlagsEXT::ERROR,
            )
            .message_type(
                vk::DebugUtilsMessageTypeFlagsEXT::GENERAL
                    | vk::DebugUtilsMessageTypeFlagsEXT::VALIDATION
                    | vk::DebugUtilsMessageTypeFlagsEXT::PERFORMANCE,
            )
            .pfn_user_callback(Some(callback));

        let messenger = unsafe { debug_utils.create_debug_utils_messenger(&create_info, None) }
            .map_err(InitError::CreateDebugMessenger)?;

        Ok((debug_utils, messenger))
    }

    pub fn destroy(&mut self) {
        unsafe {
            if let Some((debug_utils, messenger)) = self.debug_utils.take() {
                debug_utils.destroy_debug_utils_messenger(messenger, None);
            }
            self.handle.destroy_instance(None);
        }
    }
}

pub fn severity_level(severity: vk::DebugUtilsMessageSeverityFlagsEXT) -> Level {
    if severity.contains(vk::DebugUtilsMessageSeverityFlagsEXT::ERROR) {
        Level::Error
    } else if severity.contains(vk::DebugUtilsMessageSeverityFlagsEXT::WARNING) {
        Level::Warning
    } else if severity.contains(vk::DebugUtilsMessageSeverityFlagsEXT::INFO) {
        Level::Informational
    } else {
        Level::Verbose
    }
}

/// Validation layer output, forwarded to the diagnostics sink
pub unsafe extern "system" fn vulkan_debug_callback(
    message_severity: vk::DebugUtilsMessageSeverityFlagsEXT,
    message_type: vk::DebugUtilsMessageTypeFlagsEXT,
    p_callback_data: *const vk::DebugUtilsMessengerCallbackDataEXT,
    _p_user_data: *mut std::ffi::c_void,
) -> vk::Bool32 {
    if p_callback_data.is_null() || (*p_callback_data).p_message.is_null() {
        return vk::FALSE;
    }
    let message = CStr::from_ptr((*p_callback_data).p_message).to_string_lossy();

    diagnostics::emit(&Diagnostic {
        level: severity_level(message_severity),
        file: None,
        line: None,
        message: format_args!("[Vulkan {:?}] {}", message_type, message),
    });

    vk::FALSE
}

#[cfg(test)]
mod tests {
    use super::*;

    fn raw(name: &str) -> [c_char; 256] {
        let mut out = [0 as c_char; 256];
        for (dst, src) in out.iter_mut().zip(name.bytes()) {
            *dst = src as c_char;
        }
        out
    }

    fn catalog() -> LayerCatalog {
        LayerCatalog {
            layers: vec![LayerInfo {
                name: VALIDATION_LAYER.to_string(),
                description: "Khronos validation".to_string(),
                extensions: vec!["VK_EXT_debug_utils".to_string()],
            }],
            extensions: vec!["VK_KHR_surface".to_string(), "VK_KHR_xlib_surface".to_string()],
        }
    }

    fn required() -> Vec<String> {
        vec!["VK_KHR_surface".to_string(), "VK_KHR_xlib_surface".to_string()]
    }

    #[test]
    fn driver_string_stops_at_nul() {
        assert_eq!(driver_string(&raw("VK_KHR_surface")), "VK_KHR_surface");
        assert_eq!(driver_string(&[0; 4]), "");
    }

    #[test]
    fn zero_installed_layers_still_resolve() {
        let empty = LayerCatalog {
            layers: vec![],
            extensions: required(),
        };
        let desc = InstanceDesc::resolve(
            &empty,
            "Test",
            &[VALIDATION_LAYER.to_string()],
            &required(),
            Some(vulkan_debug_callback),
        )
        .unwrap();

        assert!(desc.layers.is_empty());
        assert_eq!(desc.extensions, required());
        assert!(desc.debug_callback.is_none());
    }

    #[test]
    fn missing_layers_are_skipped_and_duplicates_dropped() {
        let requested = vec![
            "VK_LAYER_LUNARG_api_dump".to_string(),
            VALIDATION_LAYER.to_string(),
            VALIDATION_LAYER.to_string(),
        ];
        assert_eq!(catalog().select_layers(&requested), vec![VALIDATION_LAYER.to_string()]);
    }

    #[test]
    fn debug_utils_can_come_from_an_enabled_layer() {
        let desc = InstanceDesc::resolve(
            &catalog(),
            "Test",
            &[VALIDATION_LAYER.to_string()],
            &required(),
            Some(vulkan_debug_callback),
        )
        .unwrap();

        assert!(desc.debug_callback.is_some());
        assert_eq!(desc.extensions.last().map(String::as_str), Some("VK_EXT_debug_utils"));
        assert_eq!(desc.api_version, vk::API_VERSION_1_0);
    }

    #[test]
    fn layer_extensions_do_not_count_when_layer_is_off() {
        let desc = InstanceDesc::resolve(&catalog(), "Test", &[], &required(), Some(vulkan_debug_callback)).unwrap();
        assert!(desc.debug_callback.is_none());
        assert!(!desc.extensions.iter().any(|e| e == "VK_EXT_debug_utils"));
    }

    #[test]
    fn missing_required_extension_fails_instance_stage() {
        let mut needs = required();
        needs.push("VK_KHR_wayland_surface".to_string());

        let err = InstanceDesc::resolve(&catalog(), "Test", &[], &needs, None).unwrap_err();
        assert!(matches!(&err, InitError::MissingExtension(name) if name == "VK_KHR_wayland_surface"));
        assert_eq!(err.stage(), crate::backend::stage::Stage::InstanceCreated);
    }

    #[test]
    fn severities_map_to_diagnostic_levels() {
        use vk::DebugUtilsMessageSeverityFlagsEXT as S;
        assert_eq!(severity_level(S::ERROR), Level::Error);
        assert_eq!(severity_level(S::WARNING), Level::Warning);
        assert_eq!(severity_level(S::INFO), Level::Informational);
        assert_eq!(severity_level(S::VERBOSE), Level::Verbose);
    }
}
