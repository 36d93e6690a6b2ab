// Shader module loading
//
// SPIR-V is consumed as a flat array of 4-byte words (byte-swapped blobs are
// normalized by ash). Only the size is checked; the driver (or validation
// layer) judges the contents.

use super::device::Device;
use super::error::{InitError, InitResult};
use crate::diag;
use crate::diagnostics::Level;
use ash::util::read_spv;
use ash::vk;
use std::io::Cursor;
use std::path::{Path, PathBuf};

/// Split a SPIR-V blob into words; `None` when empty or not word-sized
pub fn spirv_words(bytes: &[u8]) -> Option<Vec<u32>> {
    if bytes.is_empty() {
        return None;
    }
    read_spv(&mut Cursor::new(bytes)).ok()
}

fn working_dir() -> PathBuf {
    std::env::current_dir().unwrap_or_default()
}

/// Read a compiled shader, logging where it was looked for
pub fn load_spirv(path: &Path) -> InitResult<Vec<u32>> {
    let resolved = if path.is_absolute() {
        path.to_path_buf()
    } else {
        working_dir().join(path)
    };
    diag!(Level::Informational, "Loading shader {}", resolved.display());

    let bytes = std::fs::read(&resolved).map_err(|source| {
        diag!(Level::Error, "Shader not readable at {}", resolved.display());
        InitError::ReadShader {
            path: path.to_path_buf(),
            cwd: working_dir(),
            source,
        }
    })?;

    spirv_words(&bytes).ok_or_else(|| InitError::MalformedShader {
        path: path.to_path_buf(),
        len: bytes.len(),
    })
}

pub fn create_shader_module(device: &Device, code: &[u32]) -> InitResult<vk::ShaderModule> {
    let create_info = vk::ShaderModuleCreateInfo::builder().code(code);
    unsafe { device.handle.create_shader_module(&create_info, None) }.map_err(InitError::CreateShaderModule)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn blob(words: &[u32], to_bytes: fn(u32) -> [u8; 4]) -> Vec<u8> {
        words.iter().flat_map(|&w| to_bytes(w)).collect()
    }

    #[test]
    fn words_keep_host_order() {
        let bytes = blob(&[0x0723_0203, 0x0001_0000], u32::to_ne_bytes);
        assert_eq!(spirv_words(&bytes), Some(vec![0x0723_0203, 0x0001_0000]));
    }

    #[test]
    fn byte_swapped_blob_is_normalized() {
        let swapped = |w: u32| w.swap_bytes().to_ne_bytes();
        let bytes = blob(&[0x0723_0203, 0x0001_0000], swapped);
        assert_eq!(spirv_words(&bytes), Some(vec![0x0723_0203, 0x0001_0000]));
    }

    #[test]
    fn partial_words_and_empty_blobs_are_rejected() {
        assert_eq!(spirv_words(&[]), None);
        assert_eq!(spirv_words(&[1, 2, 3]), None);
        assert_eq!(spirv_words(&[0; 9]), None);
    }

    #[test]
    fn contents_are_not_validated() {
        assert_eq!(spirv_words(&[0xff; 4]), Some(vec![u32::MAX]));
        assert_eq!(spirv_words(&[0; 8]), Some(vec![0, 0]));
    }

    #[test]
    fn missing_file_reports_path_and_working_directory() {
        let err = load_spirv(Path::new("no/such/shader.spv")).unwrap_err();
        match &err {
            InitError::ReadShader { path, cwd, source } => {
                assert_eq!(path, Path::new("no/such/shader.spv"));
                assert_eq!(cwd, &working_dir());
                assert_eq!(source.kind(), std::io::ErrorKind::NotFound);
            }
            other => panic!("unexpected error {other}"),
        }
        assert_eq!(err.stage(), crate::backend::stage::Stage::PipelineReady);
    }

    #[test]
    fn odd_sized_file_is_malformed() {
        let path = std::env::temp_dir().join(format!("vk-triangle-odd-{}.spv", std::process::id()));
        std::fs::write(&path, [0u8; 6]).unwrap();

        let err = load_spirv(&path).unwrap_err();
        std::fs::remove_file(&path).unwrap();
        assert!(matches!(err, InitError::MalformedShader { len: 6, .. }));
    }

    #[test]
    fn word_sized_file_loads() {
        let path = std::env::temp_dir().join(format!("vk-triangle-ok-{}.spv", std::process::id()));
        std::fs::write(&path, 0x0723_0203u32.to_ne_bytes()).unwrap();

        let words = load_spirv(&path).unwrap();
        std::fs::remove_file(&path).unwrap();
        assert_eq!(words, vec![0x0723_0203]);
    }
}
