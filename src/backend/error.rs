// Bring-up errors
//
// One variant per driver call (or selection rule) that can stop bring-up.
// `stage()` names the stage whose step failed.

use super::stage::Stage;
use ash::vk;
use std::path::PathBuf;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum InitError {
    #[error("failed to load the Vulkan library: {0}")]
    LoadLibrary(#[from] ash::LoadingError),

    #[error("vkEnumerateInstanceLayerProperties failed: {0}")]
    EnumerateLayers(vk::Result),

    #[error("vkEnumerateInstanceExtensionProperties failed: {0}")]
    EnumerateExtensions(vk::Result),

    #[error("no surface extensions for this display: {0}")]
    UnsupportedDisplay(vk::Result),

    #[error("required instance extension {0} is not available")]
    MissingExtension(String),

    #[error("vkCreateInstance failed: {0}")]
    CreateInstance(vk::Result),

    #[error("vkCreateDebugUtilsMessengerEXT failed: {0}")]
    CreateDebugMessenger(vk::Result),

    #[error("window creation failed: {0}")]
    CreateWindow(#[from] winit::error::OsError),

    #[error("surface creation failed: {0}")]
    CreateSurface(vk::Result),

    #[error("vkEnumeratePhysicalDevices failed: {0}")]
    EnumeratePhysicalDevices(vk::Result),

    #[error("vkGetPhysicalDeviceSurfaceSupportKHR failed: {0}")]
    QueryPresentSupport(vk::Result),

    #[error("no Vulkan physical device found")]
    NoPhysicalDevice,

    #[error("none of the {devices} physical device(s) has a queue family with graphics and present support")]
    NoPresentableQueue { devices: usize },

    #[error("vkCreateDevice failed: {0}")]
    CreateDevice(vk::Result),

    #[error("querying surface capabilities failed: {0}")]
    QuerySurface(vk::Result),

    #[error("the surface reports no formats")]
    NoSurfaceFormat,

    #[error("surface format changed from {old:?} to {new:?}")]
    SurfaceFormatChanged { old: vk::Format, new: vk::Format },

    #[error("vkCreateSwapchainKHR failed: {0}")]
    CreateSwapchain(vk::Result),

    #[error("vkGetSwapchainImagesKHR failed: {0}")]
    GetSwapchainImages(vk::Result),

    #[error("vkCreateImageView failed: {0}")]
    CreateImageView(vk::Result),

    #[error("vkCreateRenderPass failed: {0}")]
    CreateRenderPass(vk::Result),

    #[error("vkCreateFramebuffer failed: {0}")]
    CreateFramebuffer(vk::Result),

    #[error("cannot read shader {path:?} (working directory {cwd:?}): {source}")]
    ReadShader {
        path: PathBuf,
        cwd: PathBuf,
        source: std::io::Error,
    },

    #[error("shader {path:?} is {len} bytes, not a whole number of 4-byte words")]
    MalformedShader { path: PathBuf, len: usize },

    #[error("vkCreateShaderModule failed: {0}")]
    CreateShaderModule(vk::Result),

    #[error("vkCreatePipelineLayout failed: {0}")]
    CreatePipelineLayout(vk::Result),

    #[error("vkCreateGraphicsPipelines failed: {0}")]
    CreatePipeline(vk::Result),

    #[error("vkCreateBuffer failed: {0}")]
    CreateBuffer(vk::Result),

    #[error("no memory type matches filter {type_bits:#b} with {flags:?}")]
    NoMemoryType {
        type_bits: u32,
        flags: vk::MemoryPropertyFlags,
    },

    #[error("vkAllocateMemory failed: {0}")]
    AllocateMemory(vk::Result),

    #[error("vkBindBufferMemory failed: {0}")]
    BindMemory(vk::Result),

    #[error("vkMapMemory failed: {0}")]
    MapMemory(vk::Result),

    #[error("vertex data read back from the buffer differs from what was written")]
    UploadMismatch,

    #[error("vkCreateCommandPool failed: {0}")]
    CreateCommandPool(vk::Result),

    #[error("vkAllocateCommandBuffers failed: {0}")]
    AllocateCommandBuffers(vk::Result),

    #[error("creating semaphores or fences failed: {0}")]
    CreateSyncObjects(vk::Result),

    #[error("vkDeviceWaitIdle failed: {0}")]
    WaitIdle(vk::Result),

    #[error("step into {0} ran before the resources it depends on existed")]
    OutOfOrder(Stage),
}

impl InitError {
    /// The stage whose step produced this error
    pub fn stage(&self) -> Stage {
        use InitError::*;
        match self {
            LoadLibrary(_) | EnumerateLayers(_) | EnumerateExtensions(_) => Stage::LayersQueried,
            UnsupportedDisplay(_) | MissingExtension(_) | CreateInstance(_) | CreateDebugMessenger(_) => {
                Stage::InstanceCreated
            }
            CreateWindow(_) => Stage::WindowCreated,
            CreateSurface(_) => Stage::SurfaceCreated,
            EnumeratePhysicalDevices(_) | QueryPresentSupport(_) | NoPhysicalDevice | NoPresentableQueue { .. } => {
                Stage::DeviceSelected
            }
            CreateDevice(_) => Stage::DeviceCreated,
            QuerySurface(_) | NoSurfaceFormat | SurfaceFormatChanged { .. } | CreateSwapchain(_) | WaitIdle(_) => {
                Stage::SwapChainCreated
            }
            GetSwapchainImages(_) | CreateImageView(_) => Stage::ImagesAcquired,
            CreateRenderPass(_)
            | CreateFramebuffer(_)
            | ReadShader { .. }
            | MalformedShader { .. }
            | CreateShaderModule(_)
            | CreatePipelineLayout(_)
            | CreatePipeline(_) => Stage::PipelineReady,
            CreateBuffer(_)
            | NoMemoryType { .. }
            | AllocateMemory(_)
            | BindMemory(_)
            | MapMemory(_)
            | UploadMismatch
            | CreateCommandPool(_)
            | AllocateCommandBuffers(_)
            | CreateSyncObjects(_) => Stage::Renderable,
            OutOfOrder(stage) => *stage,
        }
    }
}

pub type InitResult<T> = Result<T, InitError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn each_step_reports_its_own_stage() {
        let cases = [
            (InitError::EnumerateLayers(vk::Result::ERROR_INITIALIZATION_FAILED), Stage::LayersQueried),
            (InitError::CreateInstance(vk::Result::ERROR_INCOMPATIBLE_DRIVER), Stage::InstanceCreated),
            (InitError::CreateSurface(vk::Result::ERROR_SURFACE_LOST_KHR), Stage::SurfaceCreated),
            (InitError::NoPhysicalDevice, Stage::DeviceSelected),
            (InitError::CreateDevice(vk::Result::ERROR_DEVICE_LOST), Stage::DeviceCreated),
            (InitError::CreateSwapchain(vk::Result::ERROR_OUT_OF_DATE_KHR), Stage::SwapChainCreated),
            (InitError::CreateImageView(vk::Result::ERROR_OUT_OF_HOST_MEMORY), Stage::ImagesAcquired),
            (InitError::CreatePipeline(vk::Result::ERROR_OUT_OF_DEVICE_MEMORY), Stage::PipelineReady),
            (InitError::AllocateMemory(vk::Result::ERROR_OUT_OF_DEVICE_MEMORY), Stage::Renderable),
        ];

        for (error, stage) in cases {
            assert_eq!(error.stage(), stage, "{error}");
        }
    }

    #[test]
    fn messages_name_the_failing_call() {
        let error = InitError::CreateDevice(vk::Result::ERROR_FEATURE_NOT_PRESENT);
        assert!(error.to_string().starts_with("vkCreateDevice failed"));

        let error = InitError::NoPresentableQueue { devices: 2 };
        assert!(error.to_string().contains("2 physical device(s)"));
    }
}
