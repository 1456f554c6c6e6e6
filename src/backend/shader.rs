// Shader module loading
//
// The two SPIR-V binaries are read fully into memory once at startup and
// kept around, so the pipeline can be rebuilt after a swapchain resize.

use super::error::{RenderError, Result};
use ash::vk;
use std::io::Cursor;
use std::path::Path;

/// SPIR-V words for the fixed pipeline's two stages
pub struct ShaderBinaries {
    pub vertex: Vec<u32>,
    pub fragment: Vec<u32>,
}

impl ShaderBinaries {
    pub fn load(vertex: &Path, fragment: &Path) -> Result<Self> {
        Ok(Self {
            vertex: read_spirv(vertex)?,
            fragment: read_spirv(fragment)?,
        })
    }
}

/// Read a whole SPIR-V file as 32-bit words
pub fn read_spirv(path: &Path) -> Result<Vec<u32>> {
    let to_error = |source| RenderError::ShaderLoad {
        path: path.display().to_string(),
        source,
    };

    let bytes = std::fs::read(path).map_err(to_error)?;
    let words = ash::util::read_spv(&mut Cursor::new(bytes)).map_err(to_error)?;

    log::debug!("Loaded shader {:?} ({} words)", path, words.len());
    Ok(words)
}

/// # Safety
/// The device must be valid.
pub unsafe fn create_shader_module(device: &ash::Device, code: &[u32]) -> Result<vk::ShaderModule> {
    let create_info = vk::ShaderModuleCreateInfo::default().code(code);

    device
        .create_shader_module(&create_info, None)
        .map_err(|result| RenderError::PipelineCreationFailed {
            stage: "shader module",
            result,
        })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    fn temp_file(name: &str, bytes: &[u8]) -> std::path::PathBuf {
        let path = std::env::temp_dir().join(format!("{}-{}", std::process::id(), name));
        let mut file = std::fs::File::create(&path).unwrap();
        file.write_all(bytes).unwrap();
        path
    }

    #[test]
    fn reads_little_endian_words() {
        // SPIR-V magic number followed by one more word
        let path = temp_file("ok.spv", &[0x03, 0x02, 0x23, 0x07, 0x00, 0x00, 0x01, 0x00]);

        let words = read_spirv(&path).unwrap();

        assert_eq!(words, vec![0x0723_0203, 0x0001_0000]);
        std::fs::remove_file(path).unwrap();
    }

    #[test]
    fn missing_file_names_the_path() {
        let err = read_spirv(Path::new("no/such/shader.spv")).unwrap_err();

        assert!(matches!(err, RenderError::ShaderLoad { .. }));
        assert!(err.to_string().contains("no/such/shader.spv"));
    }

    #[test]
    fn truncated_binary_is_rejected() {
        let path = temp_file("short.spv", &[0x03, 0x02, 0x23]);

        assert!(read_spirv(&path).is_err());
        std::fs::remove_file(path).unwrap();
    }
}
