//! SPIR-V shader modules

use ash::{vk, Device};
use std::ffi::CStr;
use std::io::Cursor;
use std::path::Path;

use super::{VulkanError, VulkanResult};

/// Entry point used by every shader stage
pub(crate) const ENTRY_POINT: &CStr = unsafe { CStr::from_bytes_with_nul_unchecked(b"main\0") };

/// SPIR-V shader module wrapper with automatic resource management
///
/// Modules only need to live until the pipelines using them are created.
pub struct ShaderModule {
    device: Device,
    module: vk::ShaderModule,
}

impl ShaderModule {
    /// Create shader module from SPIR-V bytecode
    ///
    /// The byte length must be a multiple of four and start with the SPIR-V
    /// magic number.
    pub fn from_bytes(device: &Device, bytes: &[u8]) -> VulkanResult<Self> {
        log::debug!("[SHADER] Creating shader module from {} bytes", bytes.len());

        let words = ash::util::read_spv(&mut Cursor::new(bytes)).map_err(|e| {
            log::error!("[SHADER] Invalid SPIR-V: {}", e);
            VulkanError::InitializationFailed(format!("Invalid SPIR-V bytecode: {}", e))
        })?;

        let create_info = vk::ShaderModuleCreateInfo::builder().code(&words);

        let module = unsafe {
            device.create_shader_module(&create_info, None).map_err(|e| {
                log::error!("[SHADER] vkCreateShaderModule failed: {:?}", e);
                VulkanError::Api(e)
            })?
        };

        Ok(Self {
            device: device.clone(),
            module,
        })
    }

    /// Load shader from SPIR-V file
    pub fn from_file<P: AsRef<Path>>(device: &Device, path: P) -> VulkanResult<Self> {
        let path_ref = path.as_ref();
        log::debug!("[SHADER] Loading shader from: {:?}", path_ref);

        let bytes = std::fs::read(path_ref).map_err(|e| {
            log::error!("[SHADER] Failed to read shader file {:?}: {}", path_ref, e);
            VulkanError::InitializationFailed(format!("Failed to read shader file {:?}: {}", path_ref, e))
        })?;

        Self::from_bytes(device, &bytes)
    }

    /// Get shader module handle
    pub fn handle(&self) -> vk::ShaderModule {
        self.module
    }
}

impl Drop for ShaderModule {
    fn drop(&mut self) {
        unsafe {
            self.device.destroy_shader_module(self.module, None);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_read_spv_rejects_truncated_bytecode() {
        let bytes = [0x03u8, 0x02, 0x23];
        assert!(ash::util::read_spv(&mut Cursor::new(&bytes[..])).is_err());
    }

    #[test]
    fn test_entry_point_is_main() {
        assert_eq!(ENTRY_POINT.to_str().ok(), Some("main"));
    }
}
